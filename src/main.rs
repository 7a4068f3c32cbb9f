use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use tripwatch_link::sync::SystemClock;
use tripwatch_link::{AppConfig, SqliteStore, SyncService, TripwatchClient};

#[derive(Debug, Parser)]
#[command(name = "tripwatch-link", version)]
#[command(about = "Synchronise TripWatch activations into the duty database")]
struct Cli {
    /// Configuration YAML file
    #[arg(long = "config-file", default_value = ".config.yml")]
    config_file: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = AppConfig::load(&cli.config_file)
        .with_context(|| format!("parsing config {}", cli.config_file.display()))?;

    let store = SqliteStore::open(&config.firebird.path).context("opening duty database")?;
    store.ping().context("no connection to duty database")?;
    info!(dsn = %config.firebird.redacted_dsn(), "connected to duty database");

    let client = TripwatchClient::new(&config.tripwatch.url, &config.tripwatch.apikey)
        .context("building TripWatch client")?;
    let mut service = SyncService::new(
        Box::new(client),
        Box::new(store),
        Box::new(SystemClock),
    );

    info!(poll = ?config.tripwatch.poll, "starting sync loop");
    loop {
        for failure in service.run_cycle().await {
            if failure.error.is_missing_match_key() {
                // Common enough to keep short: an activation without its key
                // fields filled in yet will sync once operators complete it.
                warn!("couldn't match a key field for {}", failure.activation);
                warn!("{}", failure.error);
            } else {
                error!("sync failure for {}: {:?}", failure.activation, failure.error);
            }
        }
        tokio::time::sleep(config.tripwatch.poll).await;
    }
}
