use std::path::PathBuf;

use clap::Parser;

use crate::application::data::LogLevel;

/// Summarize disk usage of a directory tree.
#[derive(Parser, Debug, Clone)]
#[command(version)]
pub struct Cli {
    /// The directory to scan
    #[clap(default_value = ".")]
    pub path: PathBuf,

    #[clap(long, short, default_value = "warn", value_enum)]
    pub log_level: LogLevel,

    /// Settings file, treestat.yaml in the current directory if present
    #[clap(long, short)]
    pub config: Option<PathBuf>,

    /// Directory levels shown below the root, overrides the settings file
    #[clap(long, short)]
    pub depth: Option<u32>,

    /// Listing threads, overrides the settings file
    #[clap(long, short)]
    pub workers: Option<usize>,
}
