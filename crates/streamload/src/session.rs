//! One simulated client driving a single bidirectional stream.
//!
//! A [`Session`] dials its own connection, optionally greets the server with a
//! unary call, opens `SayHelloStream`, sends `"Ping <id>"` and then alternates
//! between receiving a reply, holding for the configured dwell time and
//! half-closing its send side. It ends when the server closes the stream,
//! when any step fails, after one cycle in single-cycle mode, or when the
//! harness cancels it.
//!
//! Errors never leave the session: they are logged and counted, and the only
//! thing the coordinator learns is the session's identity on the completion
//! channel.

use crate::{
    completion::CompletionHandle,
    config::SessionConfig,
    metrics::{InflightGuard, MetricsSink},
    transport::{Connection, MessageStream, Transport},
};
use core::future::Future;
use std::{sync::Arc, time::Instant};
use streamload_core::{Error, Result, proto::HelloRequest, types::SessionId};
use tokio_util::sync::CancellationToken;

/// How a session ended without an error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionEnd {
    /// The server ended the stream (end-of-data).
    ServerClosed,
    /// Single-cycle mode finished its one send/receive/hold cycle.
    CycleComplete,
}

/// A single client's lifecycle against the target.
pub struct Session<T, M> {
    config: Arc<SessionConfig>,
    transport: Arc<T>,
    metrics: M,
    cancel: CancellationToken,
    done: CompletionHandle,
}

impl<T, M> Session<T, M>
where
    T: Transport,
    M: MetricsSink,
{
    pub fn new(
        config: Arc<SessionConfig>,
        transport: Arc<T>,
        metrics: M,
        cancel: CancellationToken,
        done: CompletionHandle,
    ) -> Self {
        Self {
            config,
            transport,
            metrics,
            cancel,
            done,
        }
    }

    pub const fn id(&self) -> SessionId {
        self.done.id()
    }

    /// Runs the session to its terminal state and reports completion.
    ///
    /// Always emits exactly one completion signal, whatever the outcome.
    pub async fn run(self) -> Result<SessionEnd> {
        let id = self.id();
        let started = Instant::now();
        if self.config.debug {
            tracing::debug!(%id, server = %self.config.server, "starting client");
        }

        let outcome = self.exchange(id).await;
        match &outcome {
            Ok(SessionEnd::ServerClosed) => tracing::info!(%id, "got EOF from server"),
            Ok(SessionEnd::CycleComplete) => tracing::info!(%id, "stream cycle complete"),
            Err(Error::Cancelled) => tracing::info!(%id, "session cancelled"),
            Err(e) => {
                log_failure(id, e);
                self.metrics.session_failed(e.phase());
            }
        }

        self.metrics.session_finished(started.elapsed());
        self.done.complete();
        outcome
    }

    async fn exchange(&self, id: SessionId) -> Result<SessionEnd> {
        let mut connection = self.guarded(self.transport.dial()).await?;

        if let Some(name) = self.config.greet.as_deref() {
            let greeting = self.guarded(connection.say_hello(name)).await?;
            self.metrics.greeting_received();
            if self.config.debug {
                tracing::debug!(%id, %greeting, "received greeting");
            }
        }

        let mut stream = self.guarded(connection.open_stream()).await?;
        self.guarded(stream.send(HelloRequest {
            name: id.ping_payload(),
        }))
        .await?;
        self.metrics.message_sent();

        let _inflight = InflightGuard::open(&self.metrics);

        loop {
            if self.config.debug {
                tracing::debug!(%id, "waiting for server response");
            }

            let Some(reply) = self.guarded(stream.recv()).await? else {
                return Ok(SessionEnd::ServerClosed);
            };
            self.metrics.message_received();
            if self.config.debug {
                tracing::debug!(%id, message = %reply.message, "received message");
            }

            self.cancel
                .run_until_cancelled(tokio::time::sleep(self.config.hold))
                .await
                .ok_or(Error::Cancelled)?;

            // The server answers a closed send half by ending the stream,
            // which the next receive observes.
            self.guarded(stream.close_send()).await?;

            if self.config.single_cycle {
                return Ok(SessionEnd::CycleComplete);
            }
        }
    }

    /// Races `fut` against the session's cancellation token.
    async fn guarded<F, R>(&self, fut: F) -> Result<R>
    where
        F: Future<Output = Result<R>>,
    {
        self.cancel
            .run_until_cancelled(fut)
            .await
            .unwrap_or(Err(Error::Cancelled))
    }
}

fn log_failure(id: SessionId, err: &Error) {
    let phase = err.phase();
    match err {
        Error::Receive(_) => tracing::warn!(%id, phase, error = %err, "got error from server"),
        Error::CloseSend { .. } => {
            tracing::warn!(%id, phase, error = %err, "got error from close send");
        }
        Error::Send { .. } => tracing::warn!(%id, phase, error = %err, "error while sending to server"),
        Error::Greeting(_) => tracing::warn!(%id, phase, error = %err, "could not greet server"),
        Error::StreamOpen { .. } => tracing::warn!(%id, phase, error = %err, "could not open stream"),
        _ => tracing::warn!(%id, phase, error = %err, "cannot connect to server"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        completion::completion_channel,
        metrics::HarnessMetrics,
        testing::{Call, MockTransport, Script, Step},
    };
    use core::time::Duration;

    fn config(hold: Duration) -> SessionConfig {
        SessionConfig {
            server: "mock:7788".to_string(),
            tls: false,
            insecure_skip_verify: true,
            debug: true,
            hold,
            connect_timeout: Duration::from_secs(1),
            single_cycle: false,
            greet: None,
            compression: Default::default(),
        }
    }

    struct Fixture {
        transport: Arc<MockTransport>,
        metrics: Arc<HarnessMetrics>,
        cancel: CancellationToken,
    }

    impl Fixture {
        fn new(script: Script) -> Self {
            Self {
                transport: Arc::new(MockTransport::new(script)),
                metrics: Arc::new(HarnessMetrics::new()),
                cancel: CancellationToken::new(),
            }
        }

        async fn run(&self, config: SessionConfig, id: u64) -> (Result<SessionEnd>, Vec<SessionId>) {
            let (tx, mut rx) = completion_channel();
            let session = Session::new(
                Arc::new(config),
                Arc::clone(&self.transport),
                Arc::clone(&self.metrics),
                self.cancel.clone(),
                tx.handle(SessionId::new(id)),
            );
            let outcome = session.run().await;

            let mut completions = Vec::new();
            while let Some(done) = rx.try_recv() {
                completions.push(done);
            }
            (outcome, completions)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn dial_failure_completes_without_stream_io() {
        let fixture = Fixture::new(Script {
            dial_error: true,
            ..Script::default()
        });

        let (outcome, completions) = fixture.run(config(Duration::from_secs(1)), 4).await;

        assert!(matches!(outcome, Err(ref e) if e.is_connection_error()));
        assert_eq!(completions, vec![SessionId::new(4)]);
        assert_eq!(fixture.transport.calls(), vec![Call::Dial]);
        let snapshot = fixture.metrics.snapshot();
        assert_eq!(snapshot.session_errors, 1);
        assert_eq!(snapshot.messages_sent, 0);
        assert_eq!(snapshot.streams_inflight, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn open_failure_is_terminal() {
        let fixture = Fixture::new(Script {
            open_error: true,
            ..Script::default()
        });

        let (outcome, completions) = fixture.run(config(Duration::ZERO), 0).await;

        assert!(matches!(outcome, Err(Error::StreamOpen { .. })));
        assert_eq!(completions.len(), 1);
        assert_eq!(fixture.transport.calls(), vec![Call::Dial, Call::Open]);
    }

    #[tokio::test(start_paused = true)]
    async fn send_failure_never_counts_the_stream() {
        let fixture = Fixture::new(Script {
            send_error: true,
            ..Script::default()
        });

        let (outcome, completions) = fixture.run(config(Duration::ZERO), 2).await;

        assert!(matches!(outcome, Err(Error::Send { .. })));
        assert_eq!(completions, vec![SessionId::new(2)]);
        assert_eq!(
            fixture.transport.calls(),
            vec![Call::Dial, Call::Open, Call::Send("Ping 2".to_string())]
        );
        assert_eq!(fixture.metrics.snapshot().streams_inflight, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn receives_again_after_closing_send_half() {
        let fixture = Fixture::new(Script {
            steps: vec![Step::Reply("Pong Ping 0"), Step::Eof],
            ..Script::default()
        });

        let (outcome, completions) = fixture.run(config(Duration::from_secs(1)), 0).await;

        assert_eq!(outcome.unwrap(), SessionEnd::ServerClosed);
        assert_eq!(completions, vec![SessionId::new(0)]);
        assert_eq!(
            fixture.transport.calls(),
            vec![
                Call::Dial,
                Call::Open,
                Call::Send("Ping 0".to_string()),
                Call::Recv,
                Call::CloseSend,
                Call::Recv,
            ]
        );
        let snapshot = fixture.metrics.snapshot();
        assert_eq!(snapshot.messages_sent, 1);
        assert_eq!(snapshot.messages_received, 1);
        assert_eq!(snapshot.session_errors, 0);
        assert_eq!(snapshot.streams_inflight, 0);
        assert_eq!(snapshot.sessions_finished, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn holds_before_closing_send_half() {
        let fixture = Fixture::new(Script {
            steps: vec![Step::Reply("Pong"), Step::Eof],
            ..Script::default()
        });

        let started = tokio::time::Instant::now();
        let (outcome, _) = fixture.run(config(Duration::from_secs(30)), 0).await;

        assert!(outcome.is_ok());
        assert!(started.elapsed() >= Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn close_send_failure_is_terminal() {
        let fixture = Fixture::new(Script {
            steps: vec![Step::Reply("Pong")],
            close_error: true,
            ..Script::default()
        });

        let (outcome, completions) = fixture.run(config(Duration::ZERO), 1).await;

        assert!(matches!(outcome, Err(Error::CloseSend { .. })));
        assert_eq!(completions.len(), 1);
        assert_eq!(fixture.transport.calls().last(), Some(&Call::CloseSend));
        assert_eq!(fixture.metrics.snapshot().streams_inflight, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn receive_error_is_terminal() {
        let fixture = Fixture::new(Script {
            steps: vec![Step::Fail],
            ..Script::default()
        });

        let (outcome, completions) = fixture.run(config(Duration::ZERO), 9).await;

        assert!(matches!(outcome, Err(Error::Receive(_))));
        assert_eq!(completions, vec![SessionId::new(9)]);
        assert_eq!(fixture.metrics.snapshot().session_errors, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn single_cycle_stops_after_close_send() {
        let fixture = Fixture::new(Script {
            steps: vec![Step::Reply("Pong"), Step::Reply("again")],
            ..Script::default()
        });
        let mut config = config(Duration::from_secs(1));
        config.single_cycle = true;

        let (outcome, completions) = fixture.run(config, 0).await;

        assert_eq!(outcome.unwrap(), SessionEnd::CycleComplete);
        assert_eq!(completions.len(), 1);
        assert_eq!(
            fixture.transport.calls(),
            vec![
                Call::Dial,
                Call::Open,
                Call::Send("Ping 0".to_string()),
                Call::Recv,
                Call::CloseSend,
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn greets_before_opening_the_stream() {
        let fixture = Fixture::new(Script {
            steps: vec![Step::Eof],
            ..Script::default()
        });
        let mut config = config(Duration::ZERO);
        config.greet = Some("world".to_string());

        let (outcome, _) = fixture.run(config, 0).await;

        assert!(outcome.is_ok());
        assert_eq!(
            &fixture.transport.calls()[..3],
            &[Call::Dial, Call::Greet("world".to_string()), Call::Open]
        );
        assert_eq!(fixture.metrics.snapshot().greetings_received, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn greeting_failure_is_terminal() {
        let fixture = Fixture::new(Script {
            greet_error: true,
            ..Script::default()
        });
        let mut config = config(Duration::ZERO);
        config.greet = Some("world".to_string());

        let (outcome, completions) = fixture.run(config, 0).await;

        assert!(matches!(outcome, Err(Error::Greeting(_))));
        assert_eq!(completions.len(), 1);
        assert!(!fixture.transport.calls().contains(&Call::Open));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_unwinds_and_still_completes() {
        // No scripted steps: the stream never yields a reply.
        let fixture = Fixture::new(Script::default());
        let cancel = fixture.cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            cancel.cancel();
        });

        let (outcome, completions) = fixture.run(config(Duration::ZERO), 6).await;

        assert!(matches!(outcome, Err(Error::Cancelled)));
        assert_eq!(completions, vec![SessionId::new(6)]);
        let snapshot = fixture.metrics.snapshot();
        assert_eq!(snapshot.session_errors, 0);
        assert_eq!(snapshot.streams_inflight, 0);
    }
}
