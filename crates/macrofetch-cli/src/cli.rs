//! CLI argument definitions for macrofetch.
//!
//! | Command | Description |
//! |---------|-------------|
//! | `collect` | Fetch every catalog symbol for the selected sources and persist the results |
//! | `sources` | List registered sources with their rate limits and default start dates |
//! | `catalog` | Summarize the symbol catalog per source |
//!
//! Settings come from the environment first (see `CollectorConfig`); flags given here
//! override them for a single invocation.
//!
//! ```bash
//! # Offline run against the synthetic fetchers
//! macrofetch collect --mock --sources yahoo,fred --start 2024-01-01 --end 2024-03-31
//!
//! # Inspect the catalog
//! macrofetch catalog --catalog data/symbols.csv --pretty
//! ```

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "macrofetch",
    author,
    version,
    about = "Multi-source financial and macroeconomic time-series collector"
)]
pub struct Cli {
    /// Pretty-print JSON output with indentation.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Collect every catalog symbol for the selected sources.
    Collect(CollectArgs),
    /// List registered sources.
    Sources(SourcesArgs),
    /// Summarize the symbol catalog.
    Catalog(CatalogArgs),
}

#[derive(Debug, Args)]
pub struct CollectArgs {
    /// Comma-separated source ids, or `all`.
    #[arg(long, default_value = "all")]
    pub sources: String,

    /// First date to collect (YYYY-MM-DD). Defaults to each source's configured start.
    #[arg(long)]
    pub start: Option<String>,

    /// Last date to collect (YYYY-MM-DD). Defaults to today.
    #[arg(long)]
    pub end: Option<String>,

    /// Symbol catalog CSV.
    #[arg(long)]
    pub catalog: Option<PathBuf>,

    /// Root for the warehouse file and raw artifacts.
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Concurrent symbol fetches per source.
    #[arg(long)]
    pub max_workers: Option<usize>,

    /// Sources collected concurrently.
    #[arg(long)]
    pub source_workers: Option<usize>,

    /// Retries after the first failed attempt.
    #[arg(long)]
    pub max_retries: Option<u32>,

    /// Backoff base unit in seconds.
    #[arg(long)]
    pub base_wait_secs: Option<u64>,

    /// Use deterministic synthetic fetchers instead of live APIs.
    #[arg(long, default_value_t = false)]
    pub mock: bool,

    /// Write parquet artifacts but skip the warehouse table upload.
    #[arg(long, default_value_t = false)]
    pub no_upload: bool,
}

#[derive(Debug, Args)]
pub struct SourcesArgs {
    /// List every known source, not only the ones with a fetcher.
    #[arg(long, default_value_t = false)]
    pub mock: bool,
}

#[derive(Debug, Args)]
pub struct CatalogArgs {
    /// Symbol catalog CSV.
    #[arg(long)]
    pub catalog: Option<PathBuf>,
}
