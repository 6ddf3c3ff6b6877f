use std::num::NonZeroUsize;
use std::path::PathBuf;

use treestat::config::Settings;

use crate::cli::Cli;

/// Effective configuration: the settings file overridden by the command line.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub path: PathBuf,
    pub workers: Option<NonZeroUsize>,
    pub depth: u32,
    pub color: bool,
}

impl RuntimeConfig {
    pub fn new(cli: Cli, settings: Settings) -> Self {
        Self {
            path: cli.path,
            workers: cli.workers.and_then(NonZeroUsize::new).or(settings.workers),
            depth: cli.depth.unwrap_or(settings.depth),
            color: settings.color,
        }
    }
}
