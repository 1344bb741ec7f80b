//! Ties the channel's lifecycle to the session store.
//!
//! Login connects, logout disconnects, a token refresh reconnects with the
//! new token. The binding forwards every session value, including the one
//! present when it starts; deduplication is the machine's job.

use helpdesk_auth::SessionStore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::channel::ChannelHandle;

/// Forward session changes to `channel` until `shutdown` fires or the store
/// goes away, then disconnect.
pub fn bind_session(
    store: &SessionStore,
    channel: ChannelHandle,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    let mut sessions = store.subscribe();
    tokio::spawn(async move {
        let initial = sessions.borrow_and_update().clone();
        channel.session_changed(initial);

        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                changed = sessions.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let session = sessions.borrow_and_update().clone();
                    debug!(authenticated = session.is_some(), "session changed");
                    channel.session_changed(session);
                }
            }
        }

        channel.disconnect();
        debug!("session binding stopped");
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use helpdesk_core::{Role, User};
    use parking_lot::Mutex;
    use tokio::sync::mpsc;

    use super::*;
    use crate::channel::{ChannelConfig, spawn_channel};
    use crate::desktop::DisabledNotifier;
    use crate::errors::TransportError;
    use crate::machine::ChannelState;
    use crate::store::SharedStore;
    use crate::transport::{Connector, Link, OutboundMessage, TransportEvent};

    #[derive(Default)]
    struct CountingConnector {
        urls: Mutex<Vec<String>>,
        peers: Mutex<Vec<(mpsc::Sender<TransportEvent>, mpsc::Receiver<OutboundMessage>)>>,
    }

    #[async_trait]
    impl Connector for CountingConnector {
        async fn connect(&self, url: &str) -> Result<Link, TransportError> {
            self.urls.lock().push(url.to_owned());
            let (out_tx, out_rx) = mpsc::channel(16);
            let (in_tx, in_rx) = mpsc::channel(16);
            self.peers.lock().push((in_tx, out_rx));
            Ok(Link {
                outbound: out_tx,
                inbound: in_rx,
            })
        }
    }

    fn setup() -> (SessionStore, ChannelHandle, Arc<CountingConnector>) {
        let connector = Arc::new(CountingConnector::default());
        let channel = spawn_channel(
            ChannelConfig::new("ws://test/ws"),
            connector.clone(),
            SharedStore::default(),
            Arc::new(DisabledNotifier),
        );
        (SessionStore::new(), channel, connector)
    }

    async fn wait_state(channel: &ChannelHandle, state: ChannelState) {
        let mut rx = channel.watch_state();
        let _ = rx.wait_for(|s| s.state == state).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn existing_session_connects_on_bind() {
        let (store, channel, connector) = setup();
        store.establish("tok", User::new(1, "ana", Role::User));

        let _task = bind_session(&store, channel.clone(), CancellationToken::new());
        wait_state(&channel, ChannelState::Open).await;
        assert_eq!(connector.urls.lock().as_slice(), ["ws://test/ws?token=tok"]);
    }

    #[tokio::test(start_paused = true)]
    async fn login_and_logout_drive_channel() {
        let (store, channel, connector) = setup();
        let _task = bind_session(&store, channel.clone(), CancellationToken::new());
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(channel.state(), ChannelState::Idle);

        store.establish("tok", User::new(1, "ana", Role::User));
        wait_state(&channel, ChannelState::Open).await;

        store.clear();
        wait_state(&channel, ChannelState::Closing).await;
        let (to_client, mut from_client) = connector.peers.lock().remove(0);
        assert!(matches!(
            from_client.recv().await,
            Some(OutboundMessage::Close { code: 1000, .. })
        ));
        to_client
            .send(TransportEvent::Closed {
                code: 1000,
                reason: String::new(),
            })
            .await
            .unwrap();
        wait_state(&channel, ChannelState::Idle).await;
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_token_stops_binding_and_disconnects() {
        let (store, channel, _connector) = setup();
        store.establish("tok", User::new(1, "ana", Role::User));
        let shutdown = CancellationToken::new();
        let task = bind_session(&store, channel.clone(), shutdown.clone());
        wait_state(&channel, ChannelState::Open).await;

        shutdown.cancel();
        task.await.unwrap();
        wait_state(&channel, ChannelState::Closing).await;
    }
}
