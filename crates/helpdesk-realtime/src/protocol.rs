//! Wire format of the notification endpoint.
//!
//! Every frame is a JSON object with a mandatory string `type`.
//!
//! Inbound (server → client):
//!
//! | type | meaning |
//! |---|---|
//! | `connection_established` | greeting after the handshake |
//! | `heartbeat_response` | echo of a client heartbeat |
//! | `ticket_created`, `ticket_assigned`, `ticket_status_changed`, `new_comment`, `ticket_resolved`, `system_notification` | user-facing notifications |
//!
//! plus `message`, optional `ticket_id`, optional `timestamp`, and whatever
//! extra context the server attaches (title, priority, actor objects).
//!
//! Outbound (client → server): `heartbeat` and `mark_notification_read`.

use std::fmt;

use chrono::{DateTime, NaiveDateTime, Utc};
use helpdesk_core::NotificationId;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::errors::ProtocolError;

/// The `type` of an inbound frame.
///
/// Unrecognized values are kept as [`EventKind::Unknown`] so they can be
/// logged and skipped instead of failing the decode.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventKind {
    /// Server greeting after the socket is accepted.
    ConnectionEstablished,
    /// Server reply to a client heartbeat.
    HeartbeatResponse,
    /// A ticket was opened.
    TicketCreated,
    /// A ticket was assigned to someone.
    TicketAssigned,
    /// A ticket moved to another status.
    TicketStatusChanged,
    /// Someone commented on a ticket.
    NewComment,
    /// A ticket was resolved.
    TicketResolved,
    /// Free-form broadcast from administrators.
    SystemNotification,
    /// Anything else the server may send.
    Unknown(String),
}

impl EventKind {
    /// Wire name of the kind.
    pub fn as_str(&self) -> &str {
        match self {
            Self::ConnectionEstablished => "connection_established",
            Self::HeartbeatResponse => "heartbeat_response",
            Self::TicketCreated => "ticket_created",
            Self::TicketAssigned => "ticket_assigned",
            Self::TicketStatusChanged => "ticket_status_changed",
            Self::NewComment => "new_comment",
            Self::TicketResolved => "ticket_resolved",
            Self::SystemNotification => "system_notification",
            Self::Unknown(other) => other,
        }
    }

    /// Whether frames of this kind become entries in the notification list.
    pub fn is_notification(&self) -> bool {
        matches!(
            self,
            Self::TicketCreated
                | Self::TicketAssigned
                | Self::TicketStatusChanged
                | Self::NewComment
                | Self::TicketResolved
                | Self::SystemNotification
        )
    }
}

impl From<String> for EventKind {
    fn from(s: String) -> Self {
        match s.as_str() {
            "connection_established" => Self::ConnectionEstablished,
            "heartbeat_response" => Self::HeartbeatResponse,
            "ticket_created" => Self::TicketCreated,
            "ticket_assigned" => Self::TicketAssigned,
            "ticket_status_changed" => Self::TicketStatusChanged,
            "new_comment" => Self::NewComment,
            "ticket_resolved" => Self::TicketResolved,
            "system_notification" => Self::SystemNotification,
            _ => Self::Unknown(s),
        }
    }
}

impl From<EventKind> for String {
    fn from(kind: EventKind) -> Self {
        kind.as_str().to_owned()
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An inbound frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NotificationEvent {
    /// Frame type.
    #[serde(rename = "type")]
    pub kind: EventKind,
    /// Human-readable text.
    #[serde(default)]
    pub message: String,
    /// Ticket the event refers to.
    #[serde(
        default,
        deserialize_with = "lenient_ticket_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub ticket_id: Option<u64>,
    /// When the event happened, if the server said.
    #[serde(
        default,
        deserialize_with = "lenient_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub timestamp: Option<DateTime<Utc>>,
    /// Remaining fields, preserved verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl NotificationEvent {
    /// Build an event with just a kind and message.
    pub fn new(kind: EventKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            ticket_id: None,
            timestamp: None,
            extra: Map::new(),
        }
    }

    /// Attach a ticket reference.
    #[must_use]
    pub fn with_ticket(mut self, ticket_id: u64) -> Self {
        self.ticket_id = Some(ticket_id);
        self
    }

    /// Attach an event time.
    #[must_use]
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Ticket title, when the server included one.
    pub fn title(&self) -> Option<&str> {
        self.extra.get("title").and_then(Value::as_str)
    }
}

/// Decode one text frame.
pub fn decode(text: &str) -> Result<NotificationEvent, ProtocolError> {
    Ok(serde_json::from_str(text)?)
}

/// An outbound frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundFrame {
    /// Keep-alive, sent at a fixed interval while connected.
    Heartbeat {
        /// Client time of sending.
        timestamp: DateTime<Utc>,
    },
    /// Read receipt for a locally read notification.
    MarkNotificationRead {
        /// The local notification ID.
        notification_id: NotificationId,
    },
}

impl OutboundFrame {
    /// Wire name of the frame type.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Heartbeat { .. } => "heartbeat",
            Self::MarkNotificationRead { .. } => "mark_notification_read",
        }
    }

    /// Serialize to the JSON text sent on the socket.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Accept a number or a numeric string; anything else reads as absent.
fn lenient_ticket_id<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

/// Accept RFC 3339 or a zone-less ISO 8601 time (read as UTC); anything
/// else reads as absent so the receiver stamps the arrival time.
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) => parse_timestamp(&s),
        _ => None,
    })
}

/// Parse a server timestamp.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}
