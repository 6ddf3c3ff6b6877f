use std::path::{Path, PathBuf};

use snafu::Snafu;
use tracing::debug;

use crate::tree::{EntryStat, NodeId};

#[derive(Debug)]
pub(crate) struct ListedEntry {
    pub(crate) path: PathBuf,
    pub(crate) stat: EntryStat,
}

/// The result of one read job, handed back to the coordinator.
#[derive(Debug)]
pub(crate) struct Listing {
    pub(crate) dir: NodeId,
    pub(crate) path: PathBuf,
    pub(crate) outcome: Result<Vec<ListedEntry>, ListingError>,
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ListingError {
    #[snafu(display("Failed to list directory {}", path.display()))]
    ReadDirError {
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("Listing of {} got cancelled", path.display()))]
    CanceledError {
        path: PathBuf,
        source: futures_channel::oneshot::Canceled,
    },
}

/// Lists `path` without following symlinks. Runs on a worker thread.
///
/// Entries that vanish or cannot be stat'ed between the listing and the stat
/// call are skipped.
pub(crate) fn list_directory(path: &Path) -> std::io::Result<Vec<ListedEntry>> {
    let mut entries = Vec::new();

    for entry in std::fs::read_dir(path)? {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                debug!("Skipping unreadable entry in {}: {}", path.display(), err);
                continue;
            }
        };

        match entry.metadata() {
            Ok(metadata) => entries.push(ListedEntry {
                path: entry.path(),
                stat: EntryStat::from_metadata(entry.file_name().to_string_lossy(), &metadata),
            }),
            Err(err) => debug!("Skipping {}: {}", entry.path().display(), err),
        }
    }

    Ok(entries)
}
