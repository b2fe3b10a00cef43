//! The provider-side session slot and its change broadcast.

use domains::{AuthEvent, AuthEventKind, Session};
use tokio::sync::{broadcast, RwLock};

/// Auth notifications are rare; a small buffer is plenty. Slow receivers
/// see `Lagged` and resync from `current()`.
pub(crate) const EVENT_CAPACITY: usize = 16;

#[derive(Debug)]
pub(crate) struct SessionHub {
    current: RwLock<Option<Session>>,
    events: broadcast::Sender<AuthEvent>,
}

impl SessionHub {
    pub(crate) fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self { current: RwLock::new(None), events }
    }

    pub(crate) async fn current(&self) -> Option<Session> {
        self.current.read().await.clone()
    }

    /// Stores the new session and notifies every subscriber.
    pub(crate) async fn publish(&self, kind: AuthEventKind, session: Option<Session>) {
        *self.current.write().await = session.clone();
        let receivers = self.events.send(AuthEvent::new(kind, session)).unwrap_or(0);
        tracing::debug!(?kind, receivers, "auth event published");
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }
}
