//! The current authentication session.
//!
//! Token and user are stored together as a single `Option<Session>`, so a
//! watcher can never observe a token without its user or vice versa.

use std::fmt;
use std::sync::Arc;

use helpdesk_core::User;
use tokio::sync::watch;
use tracing::{debug, info};

/// An authenticated `(token, user)` pair.
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    /// Opaque bearer credential.
    pub token: String,
    /// The account the token belongs to.
    pub user: User,
}

impl Session {
    /// Pair a token with its user.
    #[must_use]
    pub fn new(token: impl Into<String>, user: User) -> Self {
        Self {
            token: token.into(),
            user,
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("token", &"<redacted>")
            .field("user", &self.user)
            .finish()
    }
}

/// Holds the current session and broadcasts every change.
///
/// Cheap to clone; all clones share the same state.
#[derive(Clone)]
pub struct SessionStore {
    tx: Arc<watch::Sender<Option<Session>>>,
}

impl SessionStore {
    /// Create an unauthenticated store.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Install a new session (login).
    pub fn establish(&self, token: impl Into<String>, user: User) {
        let session = Session::new(token, user);
        info!(user_id = session.user.id, username = %session.user.username, "session established");
        let _ = self.tx.send_replace(Some(session));
    }

    /// Replace the user of the active session. No-op when logged out.
    pub fn update_user(&self, user: User) {
        let _ = self.tx.send_if_modified(|current| match current {
            Some(session) if session.user != user => {
                debug!(user_id = user.id, "session user updated");
                session.user = user;
                true
            }
            _ => false,
        });
    }

    /// Swap the token after a refresh. No-op when logged out.
    pub fn replace_token(&self, token: impl Into<String>) {
        let token = token.into();
        let _ = self.tx.send_if_modified(|current| match current {
            Some(session) if session.token != token => {
                debug!(user_id = session.user.id, "session token replaced");
                session.token = token;
                true
            }
            _ => false,
        });
    }

    /// Drop the session (logout). No-op when already logged out.
    pub fn clear(&self) {
        let cleared = self.tx.send_if_modified(|current| current.take().is_some());
        if cleared {
            info!("session cleared");
        }
    }

    /// Snapshot of the current session.
    pub fn current(&self) -> Option<Session> {
        self.tx.borrow().clone()
    }

    /// Current bearer token, if authenticated.
    pub fn token(&self) -> Option<String> {
        self.tx.borrow().as_ref().map(|s| s.token.clone())
    }

    /// Current user, if authenticated.
    pub fn user(&self) -> Option<User> {
        self.tx.borrow().as_ref().map(|s| s.user.clone())
    }

    /// Whether a session is active.
    pub fn is_authenticated(&self) -> bool {
        self.tx.borrow().is_some()
    }

    /// Whether the current user is an admin.
    pub fn is_admin(&self) -> bool {
        self.tx.borrow().as_ref().is_some_and(|s| s.user.is_admin())
    }

    /// Whether the current user is a technician or admin.
    pub fn is_technician(&self) -> bool {
        self.tx.borrow().as_ref().is_some_and(|s| s.user.is_technician())
    }

    /// Whether the current user is a plain end user.
    pub fn is_plain_user(&self) -> bool {
        self.tx.borrow().as_ref().is_some_and(|s| s.user.is_plain_user())
    }

    /// Watch every session change. The receiver starts at the current value.
    pub fn subscribe(&self) -> watch::Receiver<Option<Session>> {
        self.tx.subscribe()
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use helpdesk_core::Role;

    fn tech() -> User {
        User::new(7, "ana", Role::Technician)
    }

    #[test]
    fn starts_unauthenticated() {
        let store = SessionStore::new();
        assert!(!store.is_authenticated());
        assert!(store.token().is_none());
        assert!(store.user().is_none());
    }

    #[test]
    fn establish_sets_pair() {
        let store = SessionStore::new();
        store.establish("tok", tech());
        let session = store.current().unwrap();
        assert_eq!(session.token, "tok");
        assert_eq!(session.user.username, "ana");
        assert!(store.is_technician());
        assert!(!store.is_admin());
    }

    #[test]
    fn clear_removes_pair() {
        let store = SessionStore::new();
        store.establish("tok", tech());
        store.clear();
        assert!(store.current().is_none());
        assert!(!store.is_technician());
    }

    #[tokio::test]
    async fn subscribers_see_login_and_logout() {
        let store = SessionStore::new();
        let mut rx = store.subscribe();
        assert!(rx.borrow_and_update().is_none());

        store.establish("tok", tech());
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().as_ref().unwrap().token, "tok");

        store.clear();
        rx.changed().await.unwrap();
        assert!(rx.borrow_and_update().is_none());
    }

    #[test]
    fn redundant_clear_does_not_notify() {
        let store = SessionStore::new();
        let rx = store.subscribe();
        store.clear();
        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn update_user_when_logged_out_is_noop() {
        let store = SessionStore::new();
        let rx = store.subscribe();
        store.update_user(tech());
        assert!(store.current().is_none());
        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn replace_token_keeps_user() {
        let store = SessionStore::new();
        store.establish("old", tech());
        store.replace_token("new");
        let session = store.current().unwrap();
        assert_eq!(session.token, "new");
        assert_eq!(session.user.id, 7);
    }

    #[test]
    fn debug_redacts_token() {
        let session = Session::new("secret-token", tech());
        let debug = format!("{session:?}");
        assert!(!debug.contains("secret-token"));
        assert!(debug.contains("<redacted>"));
    }
}
