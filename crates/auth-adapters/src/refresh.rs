//! Background token refresh.
//!
//! Sleeps until `margin` before the current session expires, then asks the
//! provider for a refresh grant. Any auth event re-arms the timer.
//!
//! A margin at or beyond the token lifetime would make every fresh session
//! due at once, so after a refresh the next attempt waits at least half of
//! the new session's remaining lifetime, and never less than [`MIN_REARM`].

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use domains::IdentityProvider;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

pub const MIN_REARM: Duration = Duration::from_secs(1);

/// Stops the refresh task on `shutdown` or drop.
#[derive(Debug)]
pub struct RefreshHandle {
    stop: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl RefreshHandle {
    pub async fn shutdown(mut self) {
        let _ = self.stop.send(true);
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for RefreshHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

pub fn spawn_auto_refresh(identity: Arc<dyn IdentityProvider>, margin: Duration) -> RefreshHandle {
    let (stop, stop_rx) = watch::channel(false);
    // Subscribe before spawning so no event between now and the first poll is lost.
    let events = identity.subscribe();
    let task = tokio::spawn(run(identity, margin, events, stop_rx));
    RefreshHandle { stop, task: Some(task) }
}

async fn run(
    identity: Arc<dyn IdentityProvider>,
    margin: Duration,
    mut events: broadcast::Receiver<domains::AuthEvent>,
    mut stop: watch::Receiver<bool>,
) {
    let margin = chrono::Duration::from_std(margin).unwrap_or_else(|_| chrono::Duration::zero());
    // Set after a failed refresh: wait for the next event instead of retrying in a loop.
    let mut stalled = false;
    // Earliest next attempt for the session a refresh just produced.
    let mut not_before: Option<(DateTime<Utc>, Instant)> = None;

    loop {
        let due = match identity.current_session().await.and_then(|s| s.expires_at) {
            Some(expires_at) if !stalled => {
                let mut due = (expires_at - margin - Utc::now()).to_std().unwrap_or(Duration::ZERO);
                if let Some((refreshed, at)) = not_before {
                    if refreshed == expires_at {
                        due = due.max(at.saturating_duration_since(Instant::now()));
                    }
                }
                Some(due)
            }
            _ => None,
        };

        tokio::select! {
            _ = stop.changed() => break,
            event = events.recv() => match event {
                Ok(_) => stalled = false,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "refresh task lagged behind auth events");
                    stalled = false;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            _ = tokio::time::sleep(due.unwrap_or_default()), if due.is_some() => {
                match identity.refresh_session().await {
                    Ok(session) => {
                        tracing::debug!(expires_at = ?session.expires_at, "session auto-refreshed");
                        not_before = session.expires_at.map(|expires_at| (expires_at, rearm_at(expires_at)));
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "session auto-refresh failed");
                        stalled = true;
                    }
                }
            }
        }
    }
    tracing::debug!("auto-refresh task stopped");
}

fn rearm_at(expires_at: DateTime<Utc>) -> Instant {
    let half = (expires_at - Utc::now()).to_std().unwrap_or(Duration::ZERO) / 2;
    Instant::now() + half.max(MIN_REARM)
}
