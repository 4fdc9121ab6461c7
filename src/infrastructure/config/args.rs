use super::app_config::LogLevel;
use crate::domain::entities::FetchPriority;
use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "feedimg",
    version,
    about = "Prefetch feed images into a tiered memory and disk cache",
    long_about = None
)]
pub struct CliArgs {
    /// Image URLs to prefetch.
    #[arg(value_name = "URLS")]
    pub urls: Vec<String>,

    /// Configuration file path.
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Log file path.
    #[arg(long, value_name = "PATH")]
    pub log_path: Option<PathBuf>,

    /// Log verbosity level.
    #[arg(long, value_enum)]
    pub log_level: Option<LogLevel>,

    /// Disk cache directory.
    #[arg(long, value_name = "PATH")]
    pub cache_dir: Option<PathBuf>,

    /// Memory tier budget in bytes.
    #[arg(long, value_name = "BYTES")]
    pub memory_budget: Option<u64>,

    /// Disk tier budget in bytes.
    #[arg(long, value_name = "BYTES")]
    pub disk_budget: Option<u64>,

    /// Maximum age of a disk cache file in seconds.
    #[arg(long, value_name = "SECS")]
    pub max_file_age_secs: Option<u64>,

    /// Priority for the prefetched URLs.
    #[arg(long, value_enum)]
    pub priority: Option<FetchPriority>,

    /// Persist downloads to disk immediately.
    #[arg(long)]
    pub write_through: Option<bool>,

    /// Only run the disk reclamation pass, then exit.
    #[arg(long)]
    pub reclaim_only: bool,
}
