//! # repo-chat CLI
//!
//! ## Usage
//!
//! ```bash
//! repo-chat --config ./config/repo-chat.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `repo-chat serve` | Start the HTTP server |
//! | `repo-chat chunk <dir>` | Chunk a local directory and print per-file counts |

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use repo_chat::chunker::DocumentChunker;
use repo_chat::config::{self, Config};
use repo_chat::server;

const DEFAULT_CONFIG: &str = "./config/repo-chat.toml";

/// Chat with a source code repository.
#[derive(Parser)]
#[command(name = "repo-chat", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// If the default path does not exist, built-in defaults are used.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG)]
    config: PathBuf,

    /// Enable debug logging (RUST_LOG takes precedence).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server.
    Serve,

    /// Chunk a local directory without embedding it.
    ///
    /// Prints the number of chunks produced for each matching file.
    Chunk {
        /// Directory to chunk.
        dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Variables from ./.env (API keys, RUST_LOG) fill in whatever the shell did not set
    dotenv::dotenv().ok();

    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .try_init();

    let config = resolve_config(&cli.config)?;

    match cli.command {
        Commands::Serve => server::run_server(&config).await,
        Commands::Chunk { dir } => run_chunk(&dir),
    }
}

fn resolve_config(path: &Path) -> Result<Config> {
    if path == Path::new(DEFAULT_CONFIG) && !path.exists() {
        tracing::info!("no config file at {}, using defaults", DEFAULT_CONFIG);
        let config = Config::default();
        config::validate(&config)?;
        return Ok(config);
    }
    config::load_config(path)
}

fn run_chunk(dir: &Path) -> Result<()> {
    let chunks = DocumentChunker::default().chunk(dir)?;

    let mut per_file: BTreeMap<String, usize> =
        chunks.file_paths().map(|p| (p.to_string(), 0)).collect();
    let mut total = 0usize;
    for chunk in &chunks {
        *per_file.entry(chunk.source_path).or_default() += 1;
        total += 1;
    }

    for (path, count) in &per_file {
        println!("{:>6}  {}", count, path);
    }
    println!("{:>6}  total ({} files)", total, per_file.len());
    Ok(())
}
