//! Games console binary: loads configuration, connects the selected backend and runs the menu.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use games_console::{
    config::{AppConfig, Backend},
    console::Console,
    dao::{models::Games, repository},
};
use tokio::io::{BufReader, stdin, stdout};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "games-console")]
#[command(version)]
#[command(about = "CRUD and query console over a Games document collection")]
struct Cli {
    /// Configuration file path (defaults to config/app.json)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Backend to use instead of the configured one: memory, mongo or couch
    #[arg(short, long, value_name = "BACKEND")]
    backend: Option<Backend>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();
    let cli = Cli::parse();

    let mut config = AppConfig::load(cli.config.as_deref()).context("loading configuration")?;
    if let Some(backend) = cli.backend {
        config = config
            .with_backend(backend)
            .context("applying --backend override")?;
    }
    info!(backend = %config.backend, "configuration loaded");

    let repository = repository::connect::<Games>(&config)
        .await
        .context("connecting to the document store")?;

    let mut console = Console::new(repository.clone(), BufReader::new(stdin()), stdout());
    let outcome = console.run().await;

    // Release the connection even when the session aborted.
    if let Err(err) = repository.close().await {
        warn!(error = %err, "failed to close repository");
    }
    outcome.context("console session aborted")?;
    info!("bye");
    Ok(())
}

/// Configure tracing on stderr so logs stay out of the menu output.
fn init_tracing() {
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
