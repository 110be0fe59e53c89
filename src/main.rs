//! # Site Index CLI (`site-index`)
//!
//! ## Usage
//!
//! ```bash
//! site-index --config ./config/site-index.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `site-index index` | Full run: sitemap, reports, search records, optional push |
//! | `site-index analyze` | Dist analysis: classification and file reports only |
//! | `site-index classify <path>...` | Print the file type of individual files |
//!
//! Logging goes to stderr and is controlled with `RUST_LOG` (default `info`).
//! The run summary goes to stdout.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use site_index::config::{self, Config};
use site_index::pipeline::{self, RunMode};
use site_index::progress::ProgressMode;

/// Site Index: sitemap, file reports, and search index for a rendered
/// static site.
#[derive(Parser)]
#[command(
    name = "site-index",
    about = "Classifies a rendered static site, writes its sitemap and reports, and builds its search index",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/site-index.toml")]
    config: PathBuf,

    /// Skip the `walk.short_report_skip` subtrees (same as `WH_SHORT_REPORT=1`).
    #[arg(long, global = true)]
    short: bool,

    /// Replace the hosted index after the run (same as `WH_SEARCH_PUSH=1`).
    #[arg(long, global = true)]
    push: bool,

    /// Progress on stderr: `auto`, `off`, `human`, or `json`.
    #[arg(long, global = true, default_value = "auto")]
    progress: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Walk the output tree and write the sitemap, the reports, and the
    /// search records.
    Index,

    /// Walk the output tree and write the sitemap and file reports only.
    ///
    /// No records are extracted and nothing is pushed.
    Analyze,

    /// Classify individual files.
    ///
    /// Paths are resolved against the configured output tree when possible.
    Classify {
        /// Files to classify.
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(atty::is(atty::Stream::Stderr))
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging();

    if let Commands::Classify { paths } = &cli.command {
        // Use config if available, otherwise classify relative to the working directory
        let cfg = config::load_config(&cli.config)
            .unwrap_or_else(|_| Config::minimal(PathBuf::from(".")));
        pipeline::classify_paths(&cfg, paths)?;
        return Ok(());
    }

    let mut cfg = config::load_config(&cli.config)?;
    if cli.short {
        cfg.walk.short_report = true;
    }
    if cli.push {
        cfg.index.push = true;
    }
    config::validate(&mut cfg)?;
    let progress = ProgressMode::parse(&cli.progress)?.reporter();

    match cli.command {
        Commands::Index => {
            pipeline::run(&cfg, RunMode::Index, progress.as_ref()).await?;
        }
        Commands::Analyze => {
            pipeline::run(&cfg, RunMode::Analyze, progress.as_ref()).await?;
        }
        Commands::Classify { .. } => unreachable!(),
    }

    Ok(())
}
