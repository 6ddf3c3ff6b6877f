use snafu::Snafu;
use snafu::prelude::*;
use tracing::{debug, info};

use treestat::config::{Settings, SettingsError};
use treestat::scan::{ScanError, Scanner, ScannerCreationError};
use treestat::tree::{DirTree, TreeEvent};

use crate::application::RuntimeConfig;
use crate::cli::Cli;
use crate::report::ReportPrinter;

pub struct Application;

impl Application {
    pub async fn run(cli: Cli) -> Result<(), ApplicationError> {
        let settings = Settings::load(cli.config.as_deref())
            .await
            .context(SettingsLoadSnafu)?;
        let runtime_config = RuntimeConfig::new(cli, settings);
        debug!("Effective configuration: {:?}", runtime_config);

        let scanner = Scanner::new(runtime_config.workers).context(ScannerSetupSnafu)?;

        let mut tree = DirTree::new();
        let mut events = tree.subscribe();
        let root = scanner
            .scan(&mut tree, &runtime_config.path)
            .await
            .context(ScanFailedSnafu)?;

        let mut added = 0usize;
        while let Ok(Some(event)) = events.try_next() {
            if let TreeEvent::ChildAdded(_) = event {
                added += 1;
            }
        }
        info!("Scan inserted {} entries into the tree", added);

        ReportPrinter::new(&runtime_config).print(&mut tree, root);
        debug!("Full recalculations performed: {}", tree.recalc_count());

        Ok(())
    }
}

#[derive(Debug, Snafu)]
pub enum ApplicationError {
    #[snafu(display("Critical failure encountered while loading settings"))]
    SettingsLoadError { source: SettingsError },
    #[snafu(display("Critical failure encountered during scanner creation"))]
    ScannerSetupError { source: ScannerCreationError },
    #[snafu(display("Critical failure encountered while scanning"))]
    ScanFailedError { source: ScanError },
}
