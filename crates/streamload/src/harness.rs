//! One complete load-test run: launch, supervise and, if interrupted, drain.

use crate::{
    config::LoadTestConfig,
    coordinator::{Coordinator, SuperviseOutcome},
    metrics::{HarnessMetrics, MetricsSnapshot},
    transport::Transport,
};
use core::fmt;
use std::{sync::Arc, time::Instant};
use tokio_util::sync::CancellationToken;

/// Why a run ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExitReason {
    /// Every launched session completed.
    Drained,
    /// The interrupt fired before all sessions completed.
    Interrupted,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitReason::Drained => write!(f, "drained"),
            ExitReason::Interrupted => write!(f, "interrupted"),
        }
    }
}

/// Outcome of [`run`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HarnessReport {
    pub launched: u64,
    pub completed: u64,
    /// Sessions still unaccounted for after the drain timeout.
    pub abandoned: usize,
    pub reason: ExitReason,
    pub metrics: MetricsSnapshot,
}

/// Runs the load test described by `config` until every session has
/// completed or `interrupt` fires.
pub async fn run<T: Transport>(
    config: &LoadTestConfig,
    transport: Arc<T>,
    metrics: Arc<HarnessMetrics>,
    interrupt: CancellationToken,
) -> HarnessReport {
    let started = Instant::now();
    tracing::info!(
        server = %config.session.server,
        clients = config.clients,
        launch_delay = ?config.launch_delay,
        hold = ?config.session.hold,
        "starting load test"
    );

    let mut coordinator = Coordinator::new(
        Arc::new(config.session.clone()),
        transport,
        Arc::clone(&metrics),
        config.progress_every,
    );

    coordinator
        .launch(config.clients, config.launch_delay, &interrupt)
        .await;
    tracing::info!(launched = coordinator.launched(), "all clients launched");

    let (reason, abandoned) = match coordinator
        .supervise(&interrupt, config.report_interval)
        .await
    {
        SuperviseOutcome::Drained => (ExitReason::Drained, 0),
        SuperviseOutcome::Interrupted { live } => {
            tracing::info!(live, drain_timeout = ?config.drain_timeout, "cancelling clients");
            let abandoned = coordinator.shutdown(config.drain_timeout).await;
            (ExitReason::Interrupted, abandoned)
        }
    };

    let report = HarnessReport {
        launched: coordinator.launched(),
        completed: coordinator.completed(),
        abandoned,
        reason,
        metrics: metrics.snapshot(),
    };
    tracing::info!(
        %reason,
        launched = report.launched,
        completed = report.completed,
        abandoned = report.abandoned,
        errors = report.metrics.session_errors,
        messages_sent = report.metrics.messages_sent,
        messages_received = report.metrics.messages_received,
        elapsed = ?started.elapsed(),
        "load test finished"
    );
    report
}
