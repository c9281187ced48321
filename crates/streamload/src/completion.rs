//! Fan-in channel through which sessions report that they are done.
//!
//! Every session receives one [`CompletionHandle`] carrying its identity. The
//! handle signals on [`complete`](CompletionHandle::complete) or, failing
//! that, when it is dropped (a panicking session task still reports). Since
//! the handle is neither `Clone` nor reusable, a session can never signal
//! twice.

use streamload_core::types::SessionId;
use tokio::sync::mpsc;

/// Creates a connected sender/receiver pair.
pub fn completion_channel() -> (CompletionSender, CompletionReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (CompletionSender { tx }, CompletionReceiver { rx })
}

/// Producer side, held by the coordinator to mint per-session handles.
#[derive(Clone, Debug)]
pub struct CompletionSender {
    tx: mpsc::UnboundedSender<SessionId>,
}

impl CompletionSender {
    /// Mints the single completion handle for session `id`.
    pub fn handle(&self, id: SessionId) -> CompletionHandle {
        CompletionHandle {
            id,
            tx: Some(self.tx.clone()),
        }
    }
}

/// One-shot completion signal owned by a single session.
#[derive(Debug)]
pub struct CompletionHandle {
    id: SessionId,
    tx: Option<mpsc::UnboundedSender<SessionId>>,
}

impl CompletionHandle {
    pub const fn id(&self) -> SessionId {
        self.id
    }

    /// Reports the session as finished.
    pub fn complete(mut self) {
        self.signal();
    }

    fn signal(&mut self) {
        if let Some(tx) = self.tx.take() {
            if tx.send(self.id).is_err() {
                tracing::debug!(id = %self.id, "coordinator no longer listening for completions");
            }
        }
    }
}

impl Drop for CompletionHandle {
    fn drop(&mut self) {
        if self.tx.is_some() {
            tracing::warn!(id = %self.id, "session dropped without reporting completion");
            self.signal();
        }
    }
}

/// Consumer side, owned by the coordinator.
#[derive(Debug)]
pub struct CompletionReceiver {
    rx: mpsc::UnboundedReceiver<SessionId>,
}

impl CompletionReceiver {
    /// Waits for the next completion. Cancel safe.
    pub async fn recv(&mut self) -> Option<SessionId> {
        self.rx.recv().await
    }

    /// Returns an already queued completion, if any.
    pub fn try_recv(&mut self) -> Option<SessionId> {
        self.rx.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn complete_signals_exactly_once() {
        let (tx, mut rx) = completion_channel();
        tx.handle(SessionId::new(3)).complete();

        assert_eq!(rx.try_recv(), Some(SessionId::new(3)));
        assert_eq!(rx.try_recv(), None);
    }

    #[test]
    fn dropped_handle_still_signals() {
        let (tx, mut rx) = completion_channel();
        let handle = tx.handle(SessionId::new(7));
        assert_eq!(handle.id(), SessionId::new(7));
        drop(handle);

        assert_eq!(rx.try_recv(), Some(SessionId::new(7)));
        assert_eq!(rx.try_recv(), None);
    }

    #[tokio::test]
    async fn panicking_session_reports_completion() {
        let (tx, mut rx) = completion_channel();
        let handle = tx.handle(SessionId::new(1));

        let task = tokio::spawn(async move {
            let _handle = handle;
            panic!("session blew up");
        });
        assert!(task.await.is_err());

        assert_eq!(rx.recv().await, Some(SessionId::new(1)));
    }

    #[test]
    fn signalling_after_receiver_is_gone_is_harmless() {
        let (tx, rx) = completion_channel();
        drop(rx);
        tx.handle(SessionId::new(0)).complete();
    }
}
