//! Launch and supervision of all sessions in a run.
//!
//! The [`Coordinator`] is the single owner of the in-flight set. Sessions run
//! as independent tasks and only talk back through the completion channel, so
//! the set is never shared. The run ends in one of two ways:
//!
//! - an idle interval passes without any completion and the live count is
//!   zero ([`SuperviseOutcome::Drained`]);
//! - the interrupt token fires ([`SuperviseOutcome::Interrupted`]). Sessions
//!   are left untouched; [`Coordinator::shutdown`] cancels and drains them.

use crate::{
    completion::{CompletionReceiver, CompletionSender, completion_channel},
    config::SessionConfig,
    metrics::MetricsSink,
    session::Session,
    transport::Transport,
};
use core::time::Duration;
use std::{collections::HashSet, sync::Arc};
use streamload_core::types::SessionId;
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::Instrument;

/// Why [`Coordinator::supervise`] returned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SuperviseOutcome {
    /// An idle tick observed no live sessions.
    Drained,
    /// The interrupt fired with `live` sessions still in flight.
    Interrupted { live: usize },
}

pub struct Coordinator<T, M> {
    config: Arc<SessionConfig>,
    transport: Arc<T>,
    metrics: M,
    progress_every: u64,
    in_flight: HashSet<SessionId>,
    launched: u64,
    completed: u64,
    completion_tx: CompletionSender,
    completions: CompletionReceiver,
    cancel: CancellationToken,
    tracker: TaskTracker,
}

impl<T, M> Coordinator<T, M>
where
    T: Transport,
    M: MetricsSink + Clone,
{
    pub fn new(
        config: Arc<SessionConfig>,
        transport: Arc<T>,
        metrics: M,
        progress_every: u64,
    ) -> Self {
        let (completion_tx, completions) = completion_channel();
        Self {
            config,
            transport,
            metrics,
            progress_every: progress_every.max(1),
            in_flight: HashSet::new(),
            launched: 0,
            completed: 0,
            completion_tx,
            completions,
            cancel: CancellationToken::new(),
            tracker: TaskTracker::new(),
        }
    }

    /// Sessions launched and not yet seen completing.
    pub fn live(&self) -> usize {
        self.in_flight.len()
    }

    pub const fn launched(&self) -> u64 {
        self.launched
    }

    pub const fn completed(&self) -> u64 {
        self.completed
    }

    /// Launches up to `total` sessions, pausing `stagger` after each one.
    ///
    /// Stops early if `interrupt` fires. Returns the number launched by this
    /// call.
    pub async fn launch(
        &mut self,
        total: u64,
        stagger: Duration,
        interrupt: &CancellationToken,
    ) -> u64 {
        let mut launched = 0;
        for _ in 0..total {
            if interrupt.is_cancelled() {
                break;
            }

            self.spawn_session();
            launched += 1;
            if self.launched % self.progress_every == 0 {
                tracing::info!(launched = self.launched, "launched clients");
            }

            if interrupt
                .run_until_cancelled(tokio::time::sleep(stagger))
                .await
                .is_none()
            {
                tracing::info!(launched = self.launched, "launch interrupted");
                break;
            }
        }
        launched
    }

    fn spawn_session(&mut self) {
        let id = SessionId::new(self.launched);
        self.launched += 1;
        self.in_flight.insert(id);
        self.metrics.session_started();

        let session = Session::new(
            Arc::clone(&self.config),
            Arc::clone(&self.transport),
            self.metrics.clone(),
            self.cancel.clone(),
            self.completion_tx.handle(id),
        );
        let span = tracing::info_span!("session", %id);
        self.tracker.spawn(
            async move {
                // Outcomes are already logged and counted inside `run`.
                let _ = session.run().await;
            }
            .instrument(span),
        );
    }

    /// Consumes completions until interrupted or an idle tick sees zero live
    /// sessions.
    ///
    /// The idle timer restarts on every completion, so detection of the last
    /// session finishing is delayed by up to `idle`.
    pub async fn supervise(
        &mut self,
        interrupt: &CancellationToken,
        idle: Duration,
    ) -> SuperviseOutcome {
        loop {
            tokio::select! {
                biased;
                () = interrupt.cancelled() => {
                    let live = self.live();
                    tracing::info!(live, "interrupted, no longer waiting for clients");
                    return SuperviseOutcome::Interrupted { live };
                }
                Some(id) = self.completions.recv() => self.record_completion(id),
                () = tokio::time::sleep(idle) => {
                    let live = self.live();
                    tracing::info!(live, "live clients");
                    if live == 0 {
                        return SuperviseOutcome::Drained;
                    }
                }
            }
        }
    }

    /// Cancels every session and waits up to `drain_timeout` for them to
    /// unwind. Returns the number of sessions that never reported.
    pub async fn shutdown(&mut self, drain_timeout: Duration) -> usize {
        self.cancel.cancel();
        self.tracker.close();

        if tokio::time::timeout(drain_timeout, self.tracker.wait())
            .await
            .is_err()
        {
            tracing::warn!(
                remaining = self.tracker.len(),
                ?drain_timeout,
                "clients did not unwind before the drain timeout"
            );
        }

        while let Some(id) = self.completions.try_recv() {
            self.record_completion(id);
        }

        let outstanding = self.live();
        if outstanding > 0 {
            tracing::warn!(outstanding, "abandoning clients");
        }
        outstanding
    }

    fn record_completion(&mut self, id: SessionId) {
        if self.in_flight.remove(&id) {
            self.completed += 1;
            tracing::info!(%id, live = self.live(), "client finished");
        } else {
            tracing::warn!(%id, "completion for unknown client ignored");
        }
    }
}
