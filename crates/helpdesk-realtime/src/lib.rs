//! # helpdesk-realtime
//!
//! The help-desk client's real-time notification channel.
//!
//! - [`protocol`]: inbound event and outbound command frames (JSON over `WebSocket`)
//! - [`store`]: bounded, newest-first notification list with an unread counter
//! - [`machine`]: the connection state machine as a pure, effect-returning struct
//! - [`timers`]: named, cancellable heartbeat and reconnect tasks
//! - [`transport`]: the [`Connector`](transport::Connector) seam and its `tokio-tungstenite` implementation
//! - [`channel`]: the actor that drives the machine and owns connection + timers
//! - [`binding`]: ties the channel's lifecycle to the session store
//! - [`desktop`]: system-level notification display
//! - [`bell`]: presentation contract for the notification bell and page
//!
//! Connectivity problems never surface as errors from the channel; they are
//! state transitions visible through [`ChannelHandle::watch_state`].

#![deny(unsafe_code)]

pub mod bell;
pub mod binding;
pub mod channel;
pub mod desktop;
pub mod errors;
pub mod machine;
pub mod protocol;
pub mod store;
pub mod timers;
pub mod transport;

pub use binding::bind_session;
pub use channel::{ChannelConfig, ChannelHandle, spawn_channel};
pub use desktop::{LogNotifier, Permission, SystemNotification, SystemNotifier};
pub use errors::{ProtocolError, TransportError};
pub use machine::{ChannelState, ConnectionStatus};
pub use protocol::{EventKind, NotificationEvent, OutboundFrame};
pub use store::{Notification, NotificationStore, ReadFilter, SharedStore, StoreChange};
pub use transport::{Connector, WsConnector};
