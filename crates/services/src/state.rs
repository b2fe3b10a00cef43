//! Observable state cell shared by every container.

use domains::DomainError;
use tokio::sync::watch;

/// Message recorded when an operation needs a signed-in viewer.
pub const SIGN_IN_REQUIRED: &str = "you must be signed in";

/// Owner side of a container's `watch` channel. `send_modify` updates the
/// value even when nobody is subscribed.
#[derive(Debug)]
pub(crate) struct StateCell<T> {
    tx: watch::Sender<T>,
}

impl<T: Clone> StateCell<T> {
    pub(crate) fn new(initial: T) -> Self {
        let (tx, _) = watch::channel(initial);
        Self { tx }
    }

    pub(crate) fn snapshot(&self) -> T {
        self.tx.borrow().clone()
    }

    pub(crate) fn read<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.tx.borrow())
    }

    /// Synchronous mutation; the closure must not block.
    pub(crate) fn update(&self, f: impl FnOnce(&mut T)) {
        self.tx.send_modify(f);
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<T> {
        self.tx.subscribe()
    }
}

/// Generic, user-facing text for a failed operation. Validation and sign-in
/// failures keep their own wording; everything remote collapses to `context`.
pub(crate) fn user_message(context: &str, err: &DomainError) -> String {
    match err {
        DomainError::Unauthenticated => SIGN_IN_REQUIRED.to_string(),
        DomainError::Validation(fields) => fields.to_string(),
        _ => context.to_string(),
    }
}
