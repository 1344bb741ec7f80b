//! Connection state machine.
//!
//! [`ChannelMachine`] owns no I/O. Each handler takes one input (session
//! change, transport event, timer tick) and returns the [`Effect`]s the
//! caller must perform, in order. This keeps every transition testable
//! without sockets or clocks.
//!
//! Every connection attempt gets a fresh generation number. Inputs tagged
//! with an older generation are ignored, so a late close, heartbeat tick, or
//! reconnect tick from a superseded connection can never act on the current
//! one.

use chrono::{DateTime, Utc};
use helpdesk_auth::Session;
use helpdesk_core::NotificationId;
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use tracing::{debug, info, trace, warn};

use crate::protocol::{self, EventKind, NotificationEvent, OutboundFrame};

/// Normal closure.
pub const CLOSE_NORMAL: u16 = 1000;
/// Reason sent when the client closes on logout or explicit disconnect.
pub const MANUAL_DISCONNECT: &str = "Manual disconnect";
/// Reason sent when a connection is no longer wanted because a newer one replaced it.
pub const SUPERSEDED: &str = "Superseded";

/// Lifecycle state of the notification channel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ChannelState {
    /// No connection and none wanted.
    #[default]
    Idle,
    /// Handshake in flight.
    Connecting,
    /// Connected; heartbeat running.
    Open,
    /// Close requested by the client (or a disconnect arrived mid-handshake),
    /// waiting for the transport to settle. A new session never waits here.
    Closing,
    /// Dropped unexpectedly; a reconnect is scheduled.
    ClosedWillRetry,
}

impl ChannelState {
    /// Short label for status lines.
    pub fn label(self) -> &'static str {
        match self {
            Self::Idle => "disconnected",
            Self::Connecting => "connecting",
            Self::Open => "connected",
            Self::Closing => "disconnecting",
            Self::ClosedWillRetry => "reconnecting",
        }
    }
}

/// Snapshot published for the connection indicator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ConnectionStatus {
    /// Current machine state.
    pub state: ChannelState,
    /// `true` only while [`ChannelState::Open`].
    pub connected: bool,
}

impl From<ChannelState> for ConnectionStatus {
    fn from(state: ChannelState) -> Self {
        Self {
            state,
            connected: state == ChannelState::Open,
        }
    }
}

/// Work the driver must carry out.
#[derive(Clone, Debug, PartialEq)]
pub enum Effect {
    /// Open a connection to `url`; report back under `generation`.
    Connect {
        /// Attempt number.
        generation: u64,
        /// Endpoint with the token query parameter.
        url: String,
    },
    /// Write a frame on the connection of `generation`.
    Send {
        /// Target connection.
        generation: u64,
        /// Frame to write.
        frame: OutboundFrame,
    },
    /// Close the connection of `generation`.
    Close {
        /// Target connection.
        generation: u64,
        /// Close code.
        code: u16,
        /// Close reason.
        reason: &'static str,
    },
    /// Start the periodic heartbeat for `generation`.
    StartHeartbeat {
        /// Connection the ticks belong to.
        generation: u64,
    },
    /// Stop the heartbeat.
    CancelHeartbeat,
    /// Arm the one-shot reconnect timer for `generation`.
    ScheduleReconnect {
        /// Attempt that failed.
        generation: u64,
    },
    /// Disarm the reconnect timer.
    CancelReconnect,
    /// Hand a notification event to the store.
    Deliver(NotificationEvent),
    /// Publish the new state.
    StatusChanged(ChannelState),
}

/// The channel's transition logic.
#[derive(Debug)]
pub struct ChannelMachine {
    endpoint: String,
    state: ChannelState,
    desired: Option<Session>,
    active: Option<Session>,
    generation: u64,
}

impl ChannelMachine {
    /// New idle machine connecting to `endpoint` when a session appears.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            state: ChannelState::Idle,
            desired: None,
            active: None,
            generation: 0,
        }
    }

    /// Current state.
    pub fn state(&self) -> ChannelState {
        self.state
    }

    /// Generation of the most recent connection attempt.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// The session the channel should be connected for, if any.
    pub fn desired(&self) -> Option<&Session> {
        self.desired.as_ref()
    }

    // ── session inputs ──────────────────────────────────────────────────

    /// The session store changed. `None` means logged out.
    pub fn session_changed(&mut self, next: Option<Session>) -> Vec<Effect> {
        let Some(next) = next else {
            return self.disconnect();
        };

        let same = self
            .active
            .as_ref()
            .is_some_and(|a| a.token == next.token && a.user.id == next.user.id);
        let live = matches!(
            self.state,
            ChannelState::Connecting | ChannelState::Open | ChannelState::ClosedWillRetry
        );
        self.desired = Some(next);
        if same && live {
            trace!(state = ?self.state, "session unchanged, nothing to do");
            return Vec::new();
        }

        match self.state {
            // Bumping the generation leaves the old socket's late close or
            // handshake result stale.
            ChannelState::Idle | ChannelState::Connecting | ChannelState::Closing => {
                self.connect(Vec::new())
            }
            ChannelState::Open => {
                info!("session changed, replacing notification connection");
                let effects = self.close_effects();
                self.connect(effects)
            }
            ChannelState::ClosedWillRetry => self.connect(vec![Effect::CancelReconnect]),
        }
    }

    /// Explicit disconnect, e.g. logout or shutdown.
    pub fn disconnect(&mut self) -> Vec<Effect> {
        self.desired = None;
        match self.state {
            ChannelState::Idle | ChannelState::Closing => Vec::new(),
            // The in-flight attempt is closed when it lands.
            ChannelState::Connecting => self.transition(ChannelState::Closing, Vec::new()),
            ChannelState::Open => {
                let effects = self.close_effects();
                self.transition(ChannelState::Closing, effects)
            }
            ChannelState::ClosedWillRetry => {
                self.active = None;
                self.transition(ChannelState::Idle, vec![Effect::CancelReconnect])
            }
        }
    }

    // ── transport inputs ────────────────────────────────────────────────

    /// The attempt `generation` completed its handshake.
    pub fn connected(&mut self, generation: u64) -> Vec<Effect> {
        let current = generation == self.generation;
        match self.state {
            ChannelState::Connecting if current => {
                info!(generation, "notification channel connected");
                self.transition(
                    ChannelState::Open,
                    vec![Effect::StartHeartbeat { generation }],
                )
            }
            ChannelState::Closing if current => {
                debug!(generation, "connection landed after disconnect, closing");
                vec![Effect::Close {
                    generation,
                    code: CLOSE_NORMAL,
                    reason: MANUAL_DISCONNECT,
                }]
            }
            _ => {
                debug!(generation, "late connection no longer wanted, closing");
                vec![Effect::Close {
                    generation,
                    code: CLOSE_NORMAL,
                    reason: SUPERSEDED,
                }]
            }
        }
    }

    /// The attempt `generation` failed before opening.
    pub fn connect_failed(&mut self, generation: u64) -> Vec<Effect> {
        if generation != self.generation {
            return Vec::new();
        }
        match self.state {
            ChannelState::Connecting => self.transition(
                ChannelState::ClosedWillRetry,
                vec![Effect::ScheduleReconnect { generation }],
            ),
            ChannelState::Closing => {
                self.active = None;
                self.transition(ChannelState::Idle, Vec::new())
            }
            _ => Vec::new(),
        }
    }

    /// The connection `generation` closed with `code`.
    pub fn closed(&mut self, generation: u64, code: u16) -> Vec<Effect> {
        if generation != self.generation {
            return Vec::new();
        }
        match self.state {
            ChannelState::Open | ChannelState::Connecting => {
                let mut effects = vec![Effect::CancelHeartbeat];
                if code == CLOSE_NORMAL {
                    info!(code, "notification channel closed by server");
                    self.active = None;
                    self.transition(ChannelState::Idle, effects)
                } else {
                    warn!(code, "notification channel dropped, will reconnect");
                    effects.push(Effect::ScheduleReconnect { generation });
                    self.transition(ChannelState::ClosedWillRetry, effects)
                }
            }
            ChannelState::Closing => {
                debug!(code, "notification channel close confirmed");
                self.active = None;
                self.transition(ChannelState::Idle, Vec::new())
            }
            ChannelState::Idle | ChannelState::ClosedWillRetry => Vec::new(),
        }
    }

    /// A text frame arrived on connection `generation`.
    pub fn frame(&mut self, generation: u64, text: &str) -> Vec<Effect> {
        if generation != self.generation || self.state != ChannelState::Open {
            return Vec::new();
        }
        let event = match protocol::decode(text) {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, "dropping undecodable frame");
                return Vec::new();
            }
        };
        if event.kind.is_notification() {
            debug!(kind = %event.kind, ticket_id = ?event.ticket_id, "notification received");
            return vec![Effect::Deliver(event)];
        }
        match &event.kind {
            EventKind::ConnectionEstablished => {
                debug!(message = %event.message, "server acknowledged connection");
            }
            EventKind::HeartbeatResponse => trace!("heartbeat acknowledged"),
            kind => debug!(kind = %kind, "ignoring unknown frame type"),
        }
        Vec::new()
    }

    // ── timer inputs ────────────────────────────────────────────────────

    /// The heartbeat for `generation` is due.
    pub fn heartbeat_due(&mut self, generation: u64, now: DateTime<Utc>) -> Vec<Effect> {
        if generation != self.generation || self.state != ChannelState::Open {
            return Vec::new();
        }
        vec![Effect::Send {
            generation,
            frame: OutboundFrame::Heartbeat { timestamp: now },
        }]
    }

    /// The reconnect delay after `generation` elapsed.
    pub fn reconnect_due(&mut self, generation: u64) -> Vec<Effect> {
        if generation != self.generation || self.state != ChannelState::ClosedWillRetry {
            return Vec::new();
        }
        if self.desired.is_some() {
            info!("reconnecting notification channel");
            self.connect(Vec::new())
        } else {
            self.active = None;
            self.transition(ChannelState::Idle, Vec::new())
        }
    }

    // ── commands ────────────────────────────────────────────────────────

    /// Tell the server a notification was read. Only possible while open.
    pub fn mark_as_read(&self, id: &NotificationId) -> Vec<Effect> {
        if self.state != ChannelState::Open {
            return Vec::new();
        }
        vec![Effect::Send {
            generation: self.generation,
            frame: OutboundFrame::MarkNotificationRead {
                notification_id: id.clone(),
            },
        }]
    }

    // ── helpers ─────────────────────────────────────────────────────────

    fn connect(&mut self, mut effects: Vec<Effect>) -> Vec<Effect> {
        let Some(session) = self.desired.clone() else {
            return self.transition(ChannelState::Idle, effects);
        };
        self.generation += 1;
        let url = endpoint_with_token(&self.endpoint, &session.token);
        debug!(
            generation = self.generation,
            endpoint = %self.endpoint,
            user_id = session.user.id,
            "connecting notification channel"
        );
        self.active = Some(session);
        effects.push(Effect::Connect {
            generation: self.generation,
            url,
        });
        self.transition(ChannelState::Connecting, effects)
    }

    fn close_effects(&self) -> Vec<Effect> {
        vec![
            Effect::CancelHeartbeat,
            Effect::CancelReconnect,
            Effect::Close {
                generation: self.generation,
                code: CLOSE_NORMAL,
                reason: MANUAL_DISCONNECT,
            },
        ]
    }

    fn transition(&mut self, next: ChannelState, mut effects: Vec<Effect>) -> Vec<Effect> {
        if self.state != next {
            trace!(from = ?self.state, to = ?next, "channel state");
            self.state = next;
            effects.push(Effect::StatusChanged(next));
        }
        effects
    }
}

/// Append the token as the `token` query parameter.
pub fn endpoint_with_token(endpoint: &str, token: &str) -> String {
    let sep = if endpoint.contains('?') { '&' } else { '?' };
    let encoded = utf8_percent_encode(token, NON_ALPHANUMERIC);
    format!("{endpoint}{sep}token={encoded}")
}
