//! System-level notification display.
//!
//! The channel asks a [`SystemNotifier`] for permission once at startup and
//! shows one system notification per delivered event while permission is
//! granted. The notifier is a seam: the console binary logs to the terminal,
//! a desktop shell would call into the OS.

use parking_lot::Mutex;
use tracing::info;

/// Whether system notifications may be shown.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Permission {
    /// Not asked yet.
    #[default]
    Default,
    /// The user allowed notifications.
    Granted,
    /// The user refused notifications.
    Denied,
}

/// One system notification.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SystemNotification {
    /// Fixed application title.
    pub title: String,
    /// Notification message.
    pub body: String,
    /// Event type; notifications with the same tag replace each other.
    pub tag: String,
}

/// Displays system notifications.
pub trait SystemNotifier: Send + Sync {
    /// Current permission.
    fn permission(&self) -> Permission;

    /// Ask the user for permission. Only prompts while still
    /// [`Permission::Default`]; returns whether permission is granted.
    fn request_permission(&self) -> bool;

    /// Show a notification. Callers check [`permission`](Self::permission) first.
    fn show(&self, notification: &SystemNotification);
}

/// Never shows anything.
#[derive(Clone, Copy, Debug, Default)]
pub struct DisabledNotifier;

impl SystemNotifier for DisabledNotifier {
    fn permission(&self) -> Permission {
        Permission::Denied
    }

    fn request_permission(&self) -> bool {
        false
    }

    fn show(&self, _notification: &SystemNotification) {}
}

/// Writes notifications to the log. Grants itself permission when asked.
#[derive(Debug, Default)]
pub struct LogNotifier {
    permission: Mutex<Permission>,
}

impl LogNotifier {
    /// New notifier that has not been asked for permission yet.
    pub fn new() -> Self {
        Self::default()
    }
}

impl SystemNotifier for LogNotifier {
    fn permission(&self) -> Permission {
        *self.permission.lock()
    }

    fn request_permission(&self) -> bool {
        let mut permission = self.permission.lock();
        if *permission == Permission::Default {
            *permission = Permission::Granted;
        }
        *permission == Permission::Granted
    }

    fn show(&self, notification: &SystemNotification) {
        info!(
            title = %notification.title,
            tag = %notification.tag,
            "{}",
            notification.body
        );
    }
}
