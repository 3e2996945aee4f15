use tokio::signal::unix::{signal, SignalKind};
use tracing_subscriber::EnvFilter;

use vacancy_pipeline::config::SchedulerConfig;
use vacancy_pipeline::{router, ScheduledHarvest, Scheduler, SystemClock};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = match SchedulerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "failed to load configuration");
            std::process::exit(1);
        }
    };

    let scheduler = Scheduler::new(ScheduledHarvest::new(&config), &config, SystemClock);
    scheduler.start();

    let listener = match tokio::net::TcpListener::bind(config.bind_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(
                error = %e,
                addr = %config.bind_addr,
                "failed to bind control endpoint"
            );
            std::process::exit(1);
        }
    };
    tracing::info!(
        addr = %config.bind_addr,
        output = %config.harvest.output_csv.display(),
        "control endpoint listening"
    );

    let app = router(scheduler.clone());
    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!(error = %e, "server error");
        scheduler.stop();
        std::process::exit(1);
    }

    scheduler.stop();
    tracing::info!("scheduler shut down");
}

/// Resolve on SIGINT (ctrl+c) or SIGTERM.
async fn shutdown_signal() {
    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sigterm) => sigterm,
        Err(e) => {
            tracing::warn!(error = %e, "failed to register SIGTERM handler");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => tracing::info!("received SIGINT, shutting down"),
        _ = sigterm.recv() => tracing::info!("received SIGTERM, shutting down"),
    }
}
