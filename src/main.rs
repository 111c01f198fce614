use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use worklog::cli::{run_command, Cli};
use worklog::config::Config;
use worklog::logs::SystemClock;
use worklog::session::FileCredentialStore;
use worklog::ui::{ConsoleToaster, EventPump};
use worklog::AppContext;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration, then let flags and env override it
    let mut config = Config::load(&cli.config)?;
    cli.apply_overrides(&mut config);

    // Logs go to stderr so command output stays clean
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level)),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::debug!("Starting worklog v{}", env!("CARGO_PKG_VERSION"));

    let credentials = FileCredentialStore::open(config.session.token_file.clone()).with_context(|| {
        format!(
            "Failed to open token file {}",
            config.session.token_file.display()
        )
    })?;

    let (ctx, events) = AppContext::new(config, Arc::new(credentials), Arc::new(SystemClock))
        .context("Failed to create HTTP client")?;

    let pump = EventPump::spawn(events, Arc::new(ConsoleToaster), ctx.router.clone());

    let result = tokio::select! {
        result = run_command(&cli, &ctx) => result,
        _ = shutdown_signal() => Ok(()),
    };

    pump.shutdown().await;
    result
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
