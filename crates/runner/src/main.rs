//! Saga runner entry point.

use runner::{Config, LogFormat, Runner, RunnerError};
use saga::CancellationHandle;
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = signal::ctrl_c().await {
            tracing::error!(%error, "failed to install SIGINT handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(error) => {
                tracing::error!(%error, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, cancelling running sagas");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, cancelling running sagas");
        }
    }
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match config.log_format {
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }
}

#[tokio::main]
async fn main() -> Result<(), RunnerError> {
    // 1. Load configuration and initialize tracing
    let config = Config::from_env()?;
    init_tracing(&config);

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| RunnerError::Metrics(e.to_string()))?;

    // 3. Build the coordinator over seeded in-memory domains
    let print_metrics = config.print_metrics;
    let runner = Runner::new(config).await?;

    // 4. Cancel running sagas on shutdown
    let (cancel, _signal) = saga::cancellation();
    let watcher = spawn_shutdown_watcher(cancel.clone());

    // 5. Submit the batch and print the outcomes
    let summary = runner.run_batch("run", &cancel).await?;
    watcher.abort();
    println!("{}", serde_json::to_string_pretty(&summary)?);

    if print_metrics {
        println!("{}", metrics_handle.render());
    }

    if cancel.is_cancelled() {
        tracing::info!("runner stopped after cancellation");
    }
    Ok(())
}

fn spawn_shutdown_watcher(cancel: CancellationHandle) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        shutdown_signal().await;
        cancel.cancel();
    })
}
