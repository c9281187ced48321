use clap::Parser;
use std::sync::Arc;
use streamload::{
    config::{CliArgs, LoadTestConfig},
    harness::{self, ExitReason},
    health,
    metrics::HarnessMetrics,
    telemetry::init_telemetry,
    transport::GrpcTransport,
};
use tokio::signal;
use tokio_util::sync::CancellationToken;

// Using mimalloc for better performance with thousands of concurrent
// session tasks.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = LoadTestConfig::try_from(args)?;

    let providers = init_telemetry(config.session.debug, config.log_json)?;
    log_startup_info(&config);

    let transport = Arc::new(GrpcTransport::new(&config.session)?);
    let metrics = Arc::new(HarnessMetrics::new());

    let interrupt = CancellationToken::new();
    tokio::spawn(shutdown_signal(interrupt.clone()));

    let health_shutdown = CancellationToken::new();
    let health_task = match config.http_port {
        Some(port) => health::spawn(port, Arc::clone(&metrics), health_shutdown.clone()).await,
        None => None,
    };

    let report = harness::run(&config, transport, metrics, interrupt).await;

    health_shutdown.cancel();
    if let Some(task) = health_task {
        match task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!(error = %e, "health endpoint failed"),
            Err(e) => tracing::error!(error = %e, "health endpoint task panicked"),
        }
    }

    if report.reason == ExitReason::Interrupted {
        tracing::info!("Shutdown signal received, terminated gracefully");
    }
    providers.shutdown();
    Ok(())
}

fn log_startup_info(config: &LoadTestConfig) {
    if cfg!(debug_assertions) {
        tracing::info!("Starting load test with full config: {:#?}", config);
    } else {
        tracing::info!(
            "Starting {} clients against {}",
            config.clients,
            config.session.server
        );
    }
}

async fn shutdown_signal(interrupt: CancellationToken) {
    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        () = ctrl_c => tracing::info!("Received Ctrl+C signal"),
        () = terminate => tracing::info!("Received SIGTERM signal"),
    }

    interrupt.cancel();
}
