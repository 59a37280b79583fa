use anyhow::Context as _;
use axum::{routing::get, Router};
use clap::Parser;
use locator::config::Settings;
use locator::mqtt::MqttPublisher;
use locator::supervisor::{PollOptions, Supervisor};
use locator::transport::HttpTransport;
use locator::{logging, metrics};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Debug, Parser)]
#[command(version, about = "Republishes device locations to an MQTT broker")]
struct Args {
    /// Configuration file; defaults to config.{toml,yaml,json} in . and /etc/device-locator/
    #[arg(short, long, env = "LOCATOR_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let settings = match Settings::load(args.config.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Error loading configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    logging::init_logging(&settings.logging);

    match run(settings).await {
        Ok(()) => {
            info!("Shutting down");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(settings: Settings) -> anyhow::Result<()> {
    info!("Starting device locator");
    info!(
        "MQTT broker: {}, topic prefix: {}, accounts: {}",
        settings.mqtt.broker,
        settings.mqtt.prefix,
        settings.accounts.len()
    );

    metrics::init_metrics().context("failed to register metrics")?;
    if let Some(addr) = settings.metrics.addr.clone().filter(|a| !a.is_empty()) {
        serve_metrics(&addr).await?;
    }

    let publisher = MqttPublisher::connect(&settings.mqtt)
        .await
        .context("can't connect to MQTT server")?;

    let transport = HttpTransport::connect(&settings.remote)
        .await
        .context("can't init HTTPS client")?;

    let supervisor = Supervisor::new(
        Arc::new(transport),
        Arc::new(publisher),
        PollOptions::from(&settings),
    );

    supervisor.run(settings.accounts, shutdown_signal()).await?;
    Ok(())
}

async fn serve_metrics(addr: &str) -> anyhow::Result<()> {
    let app = Router::new().route("/metrics", get(metrics_handler));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind metrics endpoint to {}", addr))?;

    info!("Metrics endpoint listening on {}", addr);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Metrics server error: {}", e);
        }
    });

    Ok(())
}

async fn metrics_handler() -> String {
    metrics::gather_metrics()
}

/// Resolves on Ctrl-C, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
