//! Process entry point (spec.md §6.2). A single CLI argument selects the
//! venue; `CONFIG_FILE` overrides the default config path; SIGINT/SIGTERM
//! trigger a graceful shutdown with a 10 second deadline.

use std::process::ExitCode;

use order_trigger_engine::application::bootstrap;
use order_trigger_engine::config::CoreConfig;
use order_trigger_engine::domain::trigger::Venue;
use order_trigger_engine::infrastructure::core::RedactingMakeWriter;
use tracing::{error, info};

fn parse_venue(arg: Option<&str>) -> Result<Venue, String> {
    match arg.unwrap_or("spot") {
        "spot" => Ok(Venue::Spot),
        "futures" => Ok(Venue::Futures),
        other => Err(format!("unknown venue '{other}', expected 'spot' or 'futures'")),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    let args: Vec<String> = std::env::args().collect();
    let venue = match parse_venue(args.get(1).map(String::as_str)) {
        Ok(venue) => venue,
        Err(message) => {
            eprintln!("{message}");
            eprintln!("usage: order-trigger-engine [spot|futures]");
            return ExitCode::FAILURE;
        }
    };

    let config_path = std::env::var("CONFIG_FILE").unwrap_or_else(|_| "config.yaml".to_string());
    let config = match CoreConfig::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("failed to load config from {config_path}: {e:?}");
            return ExitCode::FAILURE;
        }
    };

    let known_secrets = vec![
        config.spot.api_key.clone(),
        config.spot.api_secret.clone(),
        config.futures.api_key.clone(),
        config.futures.api_secret.clone(),
    ];

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.logging.level.as_filter_str())),
        )
        .with_writer(RedactingMakeWriter::new(known_secrets))
        .init();

    info!(?venue, config_path, "starting order trigger engine");

    let handle = match bootstrap::build(&config, venue) {
        Ok(handle) => handle,
        Err(e) => {
            error!(error = %e, "failed to build component graph");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = handle.scheduler.start().await {
        error!(error = %e, "failed to start scheduler");
        return ExitCode::FAILURE;
    }

    wait_for_shutdown_signal().await;
    info!("shutdown signal received, stopping scheduler");

    if let Err(e) = handle.scheduler.stop(std::time::Duration::from_secs(10)).await {
        error!(error = %e, "error stopping scheduler");
        return ExitCode::FAILURE;
    }

    info!("shutdown complete");
    ExitCode::SUCCESS
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");

    tokio::select! {
        _ = sigint.recv() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
