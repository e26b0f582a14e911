use std::io::Read;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "quorum", about = "Quorum operator tools: parse decisions, inspect decision history")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/quorum.toml")]
    config: String,

    /// Pretty-print the output JSON
    #[arg(long)]
    pretty: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Parse decision text into a trade intent
    Parse {
        /// Read decision text from a file instead of stdin
        #[arg(short, long)]
        input: Option<String>,
    },
    /// Decision statistics over a trailing window
    Stats {
        #[arg(long, default_value_t = 24)]
        hours: i64,
    },
    /// Most recent decision records
    History {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

fn print_json<T: serde::Serialize>(value: &T, pretty: bool) -> Result<()> {
    let output = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{output}");
    Ok(())
}

fn main() -> Result<()> {
    // Initialize tracing (respects RUST_LOG env var)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    tracing::debug!(command = ?cli.command, config = %cli.config, "Running operator command");

    match &cli.command {
        Command::Parse { input } => {
            let text = if let Some(input_path) = input {
                std::fs::read_to_string(input_path)
                    .with_context(|| format!("Failed to read input: {input_path}"))?
            } else {
                let mut buf = String::new();
                std::io::stdin()
                    .read_to_string(&mut buf)
                    .context("Failed to read from stdin")?;
                buf
            };
            print_json(&quorum::parse_text(&text), cli.pretty)
        }
        Command::Stats { hours } => {
            let config = quorum::load_config(&cli.config)?;
            let recorder = quorum::open_recorder(&config)?;
            let stats = recorder
                .statistics(*hours)
                .context("Failed to read statistics")?;
            print_json(&stats, cli.pretty)
        }
        Command::History { limit } => {
            let config = quorum::load_config(&cli.config)?;
            let recorder = quorum::open_recorder(&config)?;
            let records = recorder
                .recent(*limit)
                .context("Failed to read decision history")?;
            print_json(&records, cli.pretty)
        }
    }
}
