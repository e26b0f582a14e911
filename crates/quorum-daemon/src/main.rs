use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use quorum_daemon::config::DaemonConfig;
use quorum_daemon::daemon::Daemon;
use quorum_daemon::sources::file::FileMarketSource;
use quorum_executor::PaperExchange;
use quorum_store::{DecisionRecorder, DecisionStore};

#[derive(Parser, Debug)]
#[command(
    name = "quorum-daemon",
    about = "Quorum trading daemon - runs LLM decision agents against a market feed and executes validated intents"
)]
struct Cli {
    /// Path to daemon configuration file
    #[arg(short, long, default_value = "config/quorum.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config_str = std::fs::read_to_string(&cli.config)
        .with_context(|| format!("Failed to read config: {}", cli.config))?;
    let config: DaemonConfig =
        toml::from_str(&config_str).with_context(|| "Failed to parse daemon config")?;

    if !config.core.executor.dry_run {
        bail!("Live trading needs an exchange integration; set executor.dry_run = true");
    }

    if let Some(parent) = std::path::Path::new(&config.core.store.sqlite_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }
    let store = DecisionStore::open(&config.core.store.sqlite_path).with_context(|| {
        format!("Failed to open decision DB: {}", config.core.store.sqlite_path)
    })?;

    let source = Arc::new(FileMarketSource::new(&config.feed.data_path));
    let daemon = Daemon::new(
        config,
        DecisionRecorder::new(store),
        source,
        Arc::new(PaperExchange::new()),
    );
    let cancel = daemon.cancel_token();

    // Handle shutdown signals
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("Received shutdown signal");
        cancel.cancel();
    });

    daemon
        .run()
        .await
        .map_err(|e| anyhow::anyhow!("Daemon error: {e}"))?;

    Ok(())
}
