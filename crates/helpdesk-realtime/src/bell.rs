//! View model for the notification bell and the notifications page.
//!
//! Pure functions over store snapshots. Rendering is up to the front end;
//! the console binary prints these rows as plain text.

use chrono::{DateTime, Utc};
use helpdesk_core::NotificationId;

use crate::channel::ChannelHandle;
use crate::machine::ConnectionStatus;
use crate::protocol::EventKind;
use crate::store::{Notification, ReadFilter};

/// Badge text for an unread count. `None` hides the badge.
pub fn badge_text(unread: usize) -> Option<String> {
    match unread {
        0 => None,
        1..=99 => Some(unread.to_string()),
        _ => Some("99+".to_owned()),
    }
}

/// Glyph shown next to a notification.
pub fn kind_icon(kind: &EventKind) -> &'static str {
    match kind {
        EventKind::TicketCreated => "🎫",
        EventKind::TicketAssigned => "👤",
        EventKind::TicketStatusChanged => "🔄",
        EventKind::NewComment => "💬",
        EventKind::TicketResolved => "✅",
        EventKind::SystemNotification => "🔔",
        _ => "📢",
    }
}

/// Age of `ts` relative to `now`: `now`, `5m ago`, `3h ago`, `2d ago`, or the
/// date once a week has passed.
pub fn relative_time(ts: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let age = now.signed_duration_since(ts);
    let minutes = age.num_minutes();
    let hours = age.num_hours();
    let days = age.num_days();
    if minutes < 1 {
        "now".to_owned()
    } else if minutes < 60 {
        format!("{minutes}m ago")
    } else if hours < 24 {
        format!("{hours}h ago")
    } else if days < 7 {
        format!("{days}d ago")
    } else {
        ts.format("%Y-%m-%d").to_string()
    }
}

/// Route of the ticket a notification points at.
pub fn ticket_route(notification: &Notification) -> Option<String> {
    notification.ticket_id.map(|id| format!("/tickets/{id}"))
}

/// Text for the persistent connection indicator.
pub fn status_line(status: ConnectionStatus) -> &'static str {
    if status.connected {
        "Connected to notifications"
    } else {
        status.state.label()
    }
}

/// One row of the bell dropdown or the notifications page.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BellRow {
    /// Notification to pass back to [`open`].
    pub id: NotificationId,
    /// Type glyph.
    pub icon: &'static str,
    /// Ticket title, when known.
    pub title: Option<String>,
    /// Message text.
    pub message: String,
    /// Relative age.
    pub age: String,
    /// Read flag.
    pub read: bool,
    /// Ticket link, when the notification refers to one.
    pub route: Option<String>,
}

impl BellRow {
    /// Row for `n` as seen at `now`.
    pub fn new(n: &Notification, now: DateTime<Utc>) -> Self {
        Self {
            id: n.id.clone(),
            icon: kind_icon(&n.kind),
            title: n.title().map(str::to_owned),
            message: n.message.clone(),
            age: relative_time(n.timestamp, now),
            read: n.read,
            route: ticket_route(n),
        }
    }
}

/// Everything the bell needs to render.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BellView {
    /// Unread badge, hidden when `None`.
    pub badge: Option<String>,
    /// Whether the channel is open (solid vs outline bell).
    pub connected: bool,
    /// Indicator text.
    pub status: &'static str,
    /// Newest first.
    pub rows: Vec<BellRow>,
}

impl BellView {
    /// Snapshot the channel at `now`.
    pub fn snapshot(channel: &ChannelHandle, now: DateTime<Utc>) -> Self {
        let status = *channel.watch_state().borrow();
        Self::build(
            &channel.store().list(),
            channel.store().unread_count(),
            status,
            now,
        )
    }

    /// Build from parts.
    pub fn build(
        notifications: &[Notification],
        unread: usize,
        status: ConnectionStatus,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            badge: badge_text(unread),
            connected: status.connected,
            status: status_line(status),
            rows: notifications.iter().map(|n| BellRow::new(n, now)).collect(),
        }
    }
}

/// Tab counts for the notifications page.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PageCounts {
    /// Everything.
    pub all: usize,
    /// Unread only.
    pub unread: usize,
    /// Read only.
    pub read: usize,
}

impl PageCounts {
    /// Count a list.
    pub fn of(notifications: &[Notification]) -> Self {
        let unread = notifications.iter().filter(|n| !n.read).count();
        Self {
            all: notifications.len(),
            unread,
            read: notifications.len() - unread,
        }
    }
}

/// Rows for the notifications page under `filter`.
pub fn page_rows(channel: &ChannelHandle, filter: ReadFilter, now: DateTime<Utc>) -> Vec<BellRow> {
    channel
        .notifications(filter)
        .iter()
        .map(|n| BellRow::new(n, now))
        .collect()
}

/// Click on a notification: mark it read if it is unread, then return the
/// ticket route to navigate to.
pub fn open(channel: &ChannelHandle, id: &NotificationId) -> Option<String> {
    let notification = channel.store().get(id)?;
    if !notification.read {
        let _ = channel.mark_as_read(id);
    }
    ticket_route(&notification)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use async_trait::async_trait;
    use chrono::{Duration, TimeZone};

    use crate::channel::{ChannelConfig, spawn_channel};
    use crate::desktop::DisabledNotifier;
    use crate::errors::TransportError;
    use crate::machine::ChannelState;
    use crate::protocol::NotificationEvent;
    use crate::store::{NotificationStore, SharedStore};
    use crate::transport::{Connector, Link};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap()
    }

    #[test]
    fn badge_thresholds() {
        assert_eq!(badge_text(0), None);
        assert_eq!(badge_text(1).as_deref(), Some("1"));
        assert_eq!(badge_text(99).as_deref(), Some("99"));
        assert_eq!(badge_text(100).as_deref(), Some("99+"));
    }

    #[test]
    fn icons_per_kind() {
        assert_eq!(kind_icon(&EventKind::TicketCreated), "🎫");
        assert_eq!(kind_icon(&EventKind::TicketResolved), "✅");
        assert_eq!(kind_icon(&EventKind::Unknown("x".into())), "📢");
        assert_eq!(kind_icon(&EventKind::HeartbeatResponse), "📢");
    }

    #[test]
    fn relative_time_buckets() {
        let n = now();
        assert_eq!(relative_time(n - Duration::seconds(59), n), "now");
        assert_eq!(relative_time(n - Duration::minutes(5), n), "5m ago");
        assert_eq!(relative_time(n - Duration::minutes(59), n), "59m ago");
        assert_eq!(relative_time(n - Duration::minutes(60), n), "1h ago");
        assert_eq!(relative_time(n - Duration::hours(23), n), "23h ago");
        assert_eq!(relative_time(n - Duration::hours(24), n), "1d ago");
        assert_eq!(relative_time(n - Duration::days(6), n), "6d ago");
        assert_eq!(relative_time(n - Duration::days(7), n), "2024-06-08");
    }

    #[test]
    fn future_timestamp_reads_as_now() {
        let n = now();
        assert_eq!(relative_time(n + Duration::minutes(3), n), "now");
    }

    #[test]
    fn view_from_store() {
        let mut store = NotificationStore::default();
        let event = NotificationEvent::new(EventKind::TicketAssigned, "Assigned to you").with_ticket(12);
        let _ = store.add_at(event, now() - Duration::minutes(2));
        let view = BellView::build(
            &store.list(),
            store.unread_count(),
            ConnectionStatus::from(ChannelState::Open),
            now(),
        );

        assert_eq!(view.badge.as_deref(), Some("1"));
        assert!(view.connected);
        assert_eq!(view.rows.len(), 1);
        assert_eq!(view.rows[0].icon, "👤");
        assert_eq!(view.rows[0].age, "2m ago");
        assert_eq!(view.rows[0].route.as_deref(), Some("/tickets/12"));
    }

    #[test]
    fn disconnected_status_line() {
        let view = BellView::build(&[], 0, ConnectionStatus::from(ChannelState::ClosedWillRetry), now());
        assert!(view.badge.is_none());
        assert!(!view.connected);
        assert_eq!(view.status, "reconnecting");
    }

    struct Unreachable;

    #[async_trait]
    impl Connector for Unreachable {
        async fn connect(&self, _url: &str) -> Result<Link, TransportError> {
            Err(TransportError::Connect("offline".into()))
        }
    }

    #[tokio::test]
    async fn open_marks_read_and_routes() {
        let channel = spawn_channel(
            ChannelConfig::new("ws://test/ws"),
            Arc::new(Unreachable),
            SharedStore::default(),
            Arc::new(DisabledNotifier),
        );
        let with_ticket = channel
            .store()
            .add(NotificationEvent::new(EventKind::TicketCreated, "t").with_ticket(7));
        let broadcast = channel
            .store()
            .add(NotificationEvent::new(EventKind::SystemNotification, "s"));

        assert_eq!(open(&channel, &with_ticket.id).as_deref(), Some("/tickets/7"));
        assert_eq!(open(&channel, &broadcast.id), None);
        assert_eq!(channel.store().unread_count(), 0);
        assert_eq!(open(&channel, &NotificationId::from("gone")), None);

        let rows = page_rows(&channel, ReadFilter::Read, now());
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].id, broadcast.id);
    }

    #[test]
    fn page_counts() {
        let mut store = NotificationStore::default();
        let a = store.add(NotificationEvent::new(EventKind::NewComment, "a"));
        let _ = store.add(NotificationEvent::new(EventKind::NewComment, "b"));
        let _ = store.add(NotificationEvent::new(EventKind::NewComment, "c"));
        let _ = store.mark_as_read(&a.id);
        assert_eq!(
            PageCounts::of(&store.list()),
            PageCounts {
                all: 3,
                unread: 2,
                read: 1
            }
        );
    }
}
