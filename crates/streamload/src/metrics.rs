//! Observability sink injected into the coordinator and every session.
//!
//! Session and coordinator logic only ever talk to a [`MetricsSink`]. Each call
//! is fire-and-forget: nothing in the harness reads a counter back to make a
//! decision. [`HarnessMetrics`] is the production sink; it keeps local
//! counters for the `/stats` endpoint and the final run summary, and forwards
//! every event to the OpenTelemetry instruments in [`crate::telemetry`].

use crate::telemetry::{
    decrement_streams_inflight, increment_greetings_received, increment_messages_received,
    increment_messages_sent, increment_session_errors, increment_sessions_started,
    increment_streams_inflight, record_session_duration,
};
use core::time::Duration;
use portable_atomic::{AtomicI64, AtomicU64, Ordering};
use serde::Serialize;
use std::sync::Arc;

/// Receiver of harness observability events.
pub trait MetricsSink: Send + Sync + 'static {
    /// A session was launched by the coordinator.
    fn session_started(&self);

    /// A session's stream became active (initial message sent).
    fn stream_opened(&self);

    /// A previously opened stream is no longer active.
    fn stream_closed(&self);

    /// A message was written to a stream.
    fn message_sent(&self);

    /// A message was read from a stream.
    fn message_received(&self);

    /// A unary greeting reply was received.
    fn greeting_received(&self);

    /// A session ended on an error during `phase`.
    fn session_failed(&self, phase: &'static str);

    /// A session reached a terminal state after running for `elapsed`.
    fn session_finished(&self, elapsed: Duration);
}

impl<M: MetricsSink + ?Sized> MetricsSink for Arc<M> {
    fn session_started(&self) {
        (**self).session_started();
    }

    fn stream_opened(&self) {
        (**self).stream_opened();
    }

    fn stream_closed(&self) {
        (**self).stream_closed();
    }

    fn message_sent(&self) {
        (**self).message_sent();
    }

    fn message_received(&self) {
        (**self).message_received();
    }

    fn greeting_received(&self) {
        (**self).greeting_received();
    }

    fn session_failed(&self, phase: &'static str) {
        (**self).session_failed(phase);
    }

    fn session_finished(&self, elapsed: Duration) {
        (**self).session_finished(elapsed);
    }
}

/// Point-in-time copy of the local counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub sessions_started: u64,
    pub sessions_finished: u64,
    pub session_errors: u64,
    pub streams_inflight: i64,
    pub messages_sent: u64,
    pub messages_received: u64,
    pub greetings_received: u64,
}

/// Production sink: local counters plus OpenTelemetry forwarding.
#[derive(Debug, Default)]
pub struct HarnessMetrics {
    sessions_started: AtomicU64,
    sessions_finished: AtomicU64,
    session_errors: AtomicU64,
    streams_inflight: AtomicI64,
    messages_sent: AtomicU64,
    messages_received: AtomicU64,
    greetings_received: AtomicU64,
}

impl HarnessMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            sessions_started: self.sessions_started.load(Ordering::Relaxed),
            sessions_finished: self.sessions_finished.load(Ordering::Relaxed),
            session_errors: self.session_errors.load(Ordering::Relaxed),
            streams_inflight: self.streams_inflight.load(Ordering::Relaxed),
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            greetings_received: self.greetings_received.load(Ordering::Relaxed),
        }
    }
}

impl MetricsSink for HarnessMetrics {
    fn session_started(&self) {
        self.sessions_started.fetch_add(1, Ordering::Relaxed);
        increment_sessions_started();
    }

    fn stream_opened(&self) {
        self.streams_inflight.fetch_add(1, Ordering::Relaxed);
        increment_streams_inflight();
    }

    fn stream_closed(&self) {
        self.streams_inflight.fetch_sub(1, Ordering::Relaxed);
        decrement_streams_inflight();
    }

    fn message_sent(&self) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
        increment_messages_sent();
    }

    fn message_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
        increment_messages_received();
    }

    fn greeting_received(&self) {
        self.greetings_received.fetch_add(1, Ordering::Relaxed);
        increment_greetings_received();
    }

    fn session_failed(&self, phase: &'static str) {
        self.session_errors.fetch_add(1, Ordering::Relaxed);
        increment_session_errors(phase);
    }

    fn session_finished(&self, elapsed: Duration) {
        self.sessions_finished.fetch_add(1, Ordering::Relaxed);
        record_session_duration(elapsed.as_secs_f64() * 1000.0);
    }
}

/// Sink that discards every event.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn session_started(&self) {}
    fn stream_opened(&self) {}
    fn stream_closed(&self) {}
    fn message_sent(&self) {}
    fn message_received(&self) {}
    fn greeting_received(&self) {}
    fn session_failed(&self, _phase: &'static str) {}
    fn session_finished(&self, _elapsed: Duration) {}
}

/// Keeps a stream counted as in flight until dropped.
///
/// Every exit path of a session, including early returns through `?` and
/// cancellation, releases the gauge exactly once.
pub(crate) struct InflightGuard<'a, M: MetricsSink> {
    metrics: &'a M,
}

impl<'a, M: MetricsSink> InflightGuard<'a, M> {
    pub(crate) fn open(metrics: &'a M) -> Self {
        metrics.stream_opened();
        Self { metrics }
    }
}

impl<M: MetricsSink> Drop for InflightGuard<'_, M> {
    fn drop(&mut self) {
        self.metrics.stream_closed();
    }
}
