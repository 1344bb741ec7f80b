//! The notification channel actor.
//!
//! [`spawn_channel`] starts a task that owns the [`ChannelMachine`], the
//! live connections, and the heartbeat and reconnect timers. Everything else
//! talks to it through a cloneable [`ChannelHandle`].
//!
//! The actor reads two mailboxes: commands from handles, and events it posts
//! to itself (connect results, inbound frames, timer ticks). Each event is
//! fed to the machine and the returned effects are applied before the next
//! one is read, so no two transitions ever interleave.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use helpdesk_auth::Session;
use helpdesk_core::NotificationId;
use helpdesk_settings::RealtimeSettings;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use crate::desktop::{Permission, SystemNotification, SystemNotifier};
use crate::errors::TransportError;
use crate::machine::{ChannelMachine, ChannelState, ConnectionStatus, Effect};
use crate::protocol::NotificationEvent;
use crate::store::{ReadFilter, SharedStore};
use crate::timers::Timer;
use crate::transport::{
    CLOSE_ABNORMAL, Connector, Link, OutboundMessage, TransportEvent, redact,
};

const EVENT_BUFFER: usize = 256;
const CLOSE_GRACE: Duration = Duration::from_secs(2);
const MIN_INTERVAL: Duration = Duration::from_millis(10);

/// Channel tuning.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelConfig {
    /// `WebSocket` endpoint, without the token.
    pub endpoint: String,
    /// Time between heartbeats while connected. Raised to 10 ms if shorter.
    pub heartbeat_interval: Duration,
    /// Delay before reconnecting after an unexpected close. Raised to 10 ms
    /// if shorter.
    pub reconnect_delay: Duration,
    /// Title used for system notifications.
    pub notification_title: String,
    /// Whether to show system notifications at all.
    pub system_notifications: bool,
}

impl ChannelConfig {
    /// Defaults for `endpoint`: 30 s heartbeat, 5 s reconnect delay.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            heartbeat_interval: Duration::from_secs(30),
            reconnect_delay: Duration::from_secs(5),
            notification_title: "Help Desk".into(),
            system_notifications: true,
        }
    }
}

impl ChannelConfig {
    /// Raise timings below [`MIN_INTERVAL`] to it. A zero heartbeat period
    /// cannot drive an interval, and a zero reconnect delay would spin.
    fn normalized(mut self) -> Self {
        if self.heartbeat_interval < MIN_INTERVAL {
            warn!(
                heartbeat_ms = u64::try_from(self.heartbeat_interval.as_millis()).unwrap_or(u64::MAX),
                "heartbeat interval too short, clamping"
            );
            self.heartbeat_interval = MIN_INTERVAL;
        }
        if self.reconnect_delay < MIN_INTERVAL {
            warn!(
                reconnect_ms = u64::try_from(self.reconnect_delay.as_millis()).unwrap_or(u64::MAX),
                "reconnect delay too short, clamping"
            );
            self.reconnect_delay = MIN_INTERVAL;
        }
        self
    }
}

impl From<&RealtimeSettings> for ChannelConfig {
    fn from(s: &RealtimeSettings) -> Self {
        Self {
            endpoint: s.ws_url.clone(),
            heartbeat_interval: s.heartbeat_interval(),
            reconnect_delay: s.reconnect_delay(),
            notification_title: s.notification_title.clone(),
            system_notifications: s.system_notifications,
        }
    }
}

enum Command {
    Session(Option<Session>),
    Disconnect,
    MarkRead(NotificationId),
    Shutdown(oneshot::Sender<()>),
}

enum Event {
    Connected { generation: u64, link: Link },
    ConnectFailed { generation: u64, error: TransportError },
    Transport { generation: u64, event: TransportEvent },
    HeartbeatDue(u64),
    ReconnectDue(u64),
    CloseExpired(u64),
}

/// Handle to a running channel. Cheap to clone.
///
/// The actor stops once every handle is dropped or [`shutdown`](Self::shutdown)
/// is called; either way it closes the connection first.
#[derive(Clone)]
pub struct ChannelHandle {
    commands: mpsc::UnboundedSender<Command>,
    store: SharedStore,
    status: watch::Receiver<ConnectionStatus>,
}

impl ChannelHandle {
    /// Feed a session change: `Some` connects (or reconnects with the new
    /// token), `None` disconnects.
    pub fn session_changed(&self, session: Option<Session>) {
        self.command(Command::Session(session));
    }

    /// Close the connection and stay idle until the next session change.
    pub fn disconnect(&self) {
        self.command(Command::Disconnect);
    }

    /// Mark a notification read locally, then tell the server if connected.
    ///
    /// Returns whether an unread entry flipped to read.
    pub fn mark_as_read(&self, id: &NotificationId) -> bool {
        let flipped = self.store.mark_as_read(id);
        self.command(Command::MarkRead(id.clone()));
        flipped
    }

    /// Mark every notification read. Local only.
    pub fn mark_all_as_read(&self) {
        self.store.mark_all_as_read();
    }

    /// Drop every notification. Local only.
    pub fn clear(&self) {
        self.store.clear();
    }

    /// The notification store the channel writes into.
    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    /// Notifications matching `filter`, newest first.
    pub fn notifications(&self, filter: ReadFilter) -> Vec<crate::store::Notification> {
        self.store.filter(filter)
    }

    /// Current state.
    pub fn state(&self) -> ChannelState {
        self.status.borrow().state
    }

    /// Whether the channel is open.
    pub fn is_connected(&self) -> bool {
        self.status.borrow().connected
    }

    /// Watch connection status changes.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.clone()
    }

    /// Close the connection and stop the actor. Resolves once it has stopped.
    pub async fn shutdown(&self) {
        let (tx, rx) = oneshot::channel();
        if self.commands.send(Command::Shutdown(tx)).is_ok() {
            let _ = rx.await;
        }
    }

    fn command(&self, command: Command) {
        if self.commands.send(command).is_err() {
            debug!("notification channel already stopped");
        }
    }
}

impl std::fmt::Debug for ChannelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelHandle")
            .field("status", &*self.status.borrow())
            .finish_non_exhaustive()
    }
}

/// Start the channel actor.
///
/// Asks `notifier` for permission once, if system notifications are enabled.
pub fn spawn_channel(
    config: ChannelConfig,
    connector: Arc<dyn Connector>,
    store: SharedStore,
    notifier: Arc<dyn SystemNotifier>,
) -> ChannelHandle {
    let config = config.normalized();
    if config.system_notifications && notifier.permission() == Permission::Default {
        let granted = notifier.request_permission();
        debug!(granted, "system notification permission requested");
    }

    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    let (event_tx, event_rx) = mpsc::channel(EVENT_BUFFER);
    let (status_tx, status_rx) = watch::channel(ConnectionStatus::default());

    let actor = ChannelActor {
        machine: ChannelMachine::new(config.endpoint.clone()),
        config,
        connector,
        store: store.clone(),
        notifier,
        events: event_tx,
        links: HashMap::new(),
        heartbeat: Timer::new("heartbeat"),
        reconnect: Timer::new("reconnect"),
        status: status_tx,
    };
    drop(tokio::spawn(actor.run(cmd_rx, event_rx)));

    ChannelHandle {
        commands: cmd_tx,
        store,
        status: status_rx,
    }
}

struct ChannelActor {
    config: ChannelConfig,
    machine: ChannelMachine,
    connector: Arc<dyn Connector>,
    store: SharedStore,
    notifier: Arc<dyn SystemNotifier>,
    events: mpsc::Sender<Event>,
    links: HashMap<u64, mpsc::Sender<OutboundMessage>>,
    heartbeat: Timer,
    reconnect: Timer,
    status: watch::Sender<ConnectionStatus>,
}

impl ChannelActor {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut events: mpsc::Receiver<Event>,
    ) {
        let ack = loop {
            tokio::select! {
                cmd = commands.recv() => match cmd {
                    Some(Command::Shutdown(ack)) => break Some(ack),
                    Some(cmd) => self.on_command(cmd),
                    None => break None,
                },
                Some(event) = events.recv() => self.on_event(event),
            }
        };

        self.close_and_drain(&mut events).await;
        info!("notification channel stopped");
        if let Some(ack) = ack {
            let _ = ack.send(());
        }
    }

    /// Disconnect and keep processing transport events until the close is
    /// confirmed or the grace period runs out.
    async fn close_and_drain(&mut self, events: &mut mpsc::Receiver<Event>) {
        let effects = self.machine.disconnect();
        self.apply(effects);

        let grace = tokio::time::sleep(CLOSE_GRACE);
        tokio::pin!(grace);
        while self.machine.state() != ChannelState::Idle {
            tokio::select! {
                () = &mut grace => {
                    warn!("close not confirmed in time, dropping connection");
                    break;
                }
                Some(event) = events.recv() => self.on_event(event),
            }
        }

        self.heartbeat.cancel();
        self.reconnect.cancel();
        self.links.clear();
        let _ = self.status.send_replace(ChannelState::Idle.into());
    }

    fn on_command(&mut self, command: Command) {
        let effects = match command {
            Command::Session(session) => self.machine.session_changed(session),
            Command::Disconnect => self.machine.disconnect(),
            Command::MarkRead(id) => self.machine.mark_as_read(&id),
            Command::Shutdown(_) => Vec::new(),
        };
        self.apply(effects);
    }

    fn on_event(&mut self, event: Event) {
        let effects = match event {
            Event::Connected { generation, link } => {
                self.attach(generation, link);
                self.machine.connected(generation)
            }
            Event::ConnectFailed { generation, error } => {
                warn!(generation, error = %error, "notification channel connect failed");
                self.machine.connect_failed(generation)
            }
            Event::Transport { generation, event } => match event {
                TransportEvent::Text(text) => self.machine.frame(generation, &text),
                TransportEvent::Closed { code, reason } => {
                    debug!(generation, code, reason = %reason, "connection closed");
                    let _ = self.links.remove(&generation);
                    self.machine.closed(generation, code)
                }
            },
            Event::HeartbeatDue(generation) => self.machine.heartbeat_due(generation, Utc::now()),
            Event::ReconnectDue(generation) => self.machine.reconnect_due(generation),
            Event::CloseExpired(generation) => {
                if self.links.remove(&generation).is_some() {
                    warn!(generation, "close not confirmed in time, dropping connection");
                    self.machine.closed(generation, CLOSE_ABNORMAL)
                } else {
                    Vec::new()
                }
            }
        };
        self.apply(effects);
    }

    /// Register a fresh connection and forward its inbound queue into the
    /// event mailbox, tagged with its generation.
    fn attach(&mut self, generation: u64, link: Link) {
        let Link {
            outbound,
            mut inbound,
        } = link;
        let _ = self.links.insert(generation, outbound);

        let events = self.events.clone();
        drop(tokio::spawn(async move {
            let mut saw_close = false;
            while let Some(event) = inbound.recv().await {
                saw_close = matches!(event, TransportEvent::Closed { .. });
                if events.send(Event::Transport { generation, event }).await.is_err() {
                    return;
                }
                if saw_close {
                    break;
                }
            }
            if !saw_close {
                let event = TransportEvent::Closed {
                    code: CLOSE_ABNORMAL,
                    reason: String::new(),
                };
                let _ = events.send(Event::Transport { generation, event }).await;
            }
        }));
    }

    fn apply(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Connect { generation, url } => self.spawn_connect(generation, url),
                Effect::Send { generation, frame } => match frame.encode() {
                    Ok(text) => self.write(generation, OutboundMessage::Text(text)),
                    Err(e) => warn!(error = %e, frame = frame.type_name(), "frame encode failed"),
                },
                Effect::Close {
                    generation,
                    code,
                    reason,
                } => {
                    self.write(
                        generation,
                        OutboundMessage::Close {
                            code,
                            reason: reason.to_owned(),
                        },
                    );
                    if self.links.contains_key(&generation) {
                        self.arm_close_deadline(generation);
                    }
                }
                Effect::StartHeartbeat { generation } => {
                    self.reconnect.cancel();
                    self.heartbeat.start_every(
                        self.config.heartbeat_interval,
                        self.events.clone(),
                        move || Event::HeartbeatDue(generation),
                    );
                }
                Effect::CancelHeartbeat => self.heartbeat.cancel(),
                Effect::ScheduleReconnect { generation } => {
                    self.heartbeat.cancel();
                    info!(
                        delay_ms = u64::try_from(self.config.reconnect_delay.as_millis())
                            .unwrap_or(u64::MAX),
                        "reconnect scheduled"
                    );
                    self.reconnect.start_after(
                        self.config.reconnect_delay,
                        self.events.clone(),
                        Event::ReconnectDue(generation),
                    );
                }
                Effect::CancelReconnect => self.reconnect.cancel(),
                Effect::Deliver(event) => self.deliver(event),
                Effect::StatusChanged(state) => {
                    info!(state = state.label(), "notification channel status");
                    let _ = self.status.send_replace(state.into());
                }
            }
        }
    }

    fn spawn_connect(&self, generation: u64, url: String) {
        let connector = Arc::clone(&self.connector);
        let events = self.events.clone();
        drop(tokio::spawn(async move {
            let event = match connector.connect(&url).await {
                Ok(link) => Event::Connected { generation, link },
                Err(error) => {
                    debug!(url = %redact(&url), "connect attempt failed");
                    Event::ConnectFailed { generation, error }
                }
            };
            let _ = events.send(event).await;
        }));
    }

    /// Drop the link of `generation` if its close is still unconfirmed after
    /// [`CLOSE_GRACE`].
    fn arm_close_deadline(&self, generation: u64) {
        let events = self.events.clone();
        drop(tokio::spawn(async move {
            tokio::time::sleep(CLOSE_GRACE).await;
            let _ = events.send(Event::CloseExpired(generation)).await;
        }));
    }

    fn write(&self, generation: u64, message: OutboundMessage) {
        let Some(tx) = self.links.get(&generation) else {
            debug!(generation, "no live connection for outbound frame");
            return;
        };
        if let Err(e) = tx.try_send(message) {
            warn!(generation, error = %e, "outbound frame dropped");
        }
    }

    fn deliver(&self, event: NotificationEvent) {
        let notification = self.store.add(event);
        if self.config.system_notifications && self.notifier.permission() == Permission::Granted {
            self.notifier.show(&SystemNotification {
                title: self.config.notification_title.clone(),
                body: notification.message.clone(),
                tag: notification.kind.as_str().to_owned(),
            });
        }
    }
}
