use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::thread::available_parallelism;

use compio::dispatcher::{Dispatcher, DispatcherBuilder};
use compio::runtime::spawn;
use futures::StreamExt;
use futures_channel::mpsc::{self, UnboundedSender};
use snafu::{ResultExt, Snafu, ensure};
use tracing::{debug, info, warn};

use crate::ext::best_effort_absolute;
use crate::scan::listing::{Listing, ListingError, ReadDirSnafu, list_directory};
use crate::tree::{DirTree, EntryStat, FileType, NodeId, ReadState};

/// Drives a [`DirTree`] from the local filesystem.
///
/// Directory listings run on a pool of worker threads, one read job per
/// directory. Their results come back over a channel and are applied by the
/// task running [`scan`](Self::scan), which is the only writer of the tree.
pub struct Scanner {
    dispatcher: Dispatcher,
}

impl Scanner {
    pub fn new(workers: Option<NonZeroUsize>) -> Result<Self, ScannerCreationError> {
        let workers_num = workers.unwrap_or_else(Self::determine_worker_count);
        debug!("Using {} worker threads for directory listings", workers_num);

        let dispatcher = DispatcherBuilder::new()
            .worker_threads(workers_num)
            .build()
            .context(DispatcherSnafu)?;

        Ok(Self { dispatcher })
    }

    fn determine_worker_count() -> NonZeroUsize {
        available_parallelism().unwrap_or(NonZeroUsize::MIN)
    }

    /// Replaces the contents of `tree` with the subtree at `path` and returns
    /// the new root.
    pub async fn scan(&self, tree: &mut DirTree, path: &Path) -> Result<NodeId, ScanError> {
        let root_path = best_effort_absolute(path);
        let metadata = std::fs::symlink_metadata(&root_path).context(RootStatSnafu {
            path: root_path.clone(),
        })?;
        ensure!(
            metadata.is_dir(),
            NotADirectorySnafu {
                path: root_path.clone()
            }
        );

        let root_stat = EntryStat::from_metadata(root_path.display().to_string(), &metadata);
        let root = tree.create_root(root_stat);
        info!("Scanning {}", root_path.display());

        let (listing_sender, mut listing_receiver) = mpsc::unbounded::<Listing>();
        self.dispatch_listing(tree, root, root_path, &listing_sender)?;

        while tree.pending_read_jobs(root) > 0 {
            let Some(listing) = listing_receiver.next().await else {
                return ChannelClosedSnafu {
                    pending: tree.pending_read_jobs(root),
                }
                .fail();
            };
            self.apply_listing(tree, listing, &listing_sender)?;
        }

        Self::conclude(tree, root);
        Ok(root)
    }

    /// Finalizes the tree unless the scan got aborted.
    fn conclude(tree: &mut DirTree, root: NodeId) {
        match tree.read_state(root) {
            ReadState::Finished => {
                tree.finalize_all(root);
                info!(
                    "Finished scanning {}: {} items",
                    tree.path(root),
                    tree.total_items(root)
                );
            }
            state => warn!("Scan of {} ended {}", tree.path(root), state),
        }
    }

    /// Starts one read job listing `path` on behalf of `dir`.
    fn dispatch_listing(
        &self,
        tree: &mut DirTree,
        dir: NodeId,
        path: PathBuf,
        listing_sender: &UnboundedSender<Listing>,
    ) -> Result<(), ScanError> {
        let job_path = path.clone();
        let receiver = self
            .dispatcher
            .dispatch(move || async move { list_directory(&job_path) })
            .map_err(|e| ScanError::DispatchError {
                path: path.clone(),
                error: e.to_string(),
            })?;

        tree.read_job_added(dir);
        tree.set_read_state(dir, ReadState::Reading);
        debug!("Dispatched listing of {}", path.display());

        let listing_sender = listing_sender.clone();
        spawn(async move {
            let outcome = match receiver.await {
                Ok(result) => result.context(ReadDirSnafu { path: path.clone() }),
                Err(canceled) => Err(ListingError::CanceledError {
                    path: path.clone(),
                    source: canceled,
                }),
            };

            if let Err(send_err) = listing_sender.unbounded_send(Listing { dir, path, outcome }) {
                debug!("Failed to hand over listing: {}", send_err);
            }
        })
        .detach();

        Ok(())
    }

    /// Inserts a finished listing and queues reads for the new subdirectories.
    fn apply_listing(
        &self,
        tree: &mut DirTree,
        listing: Listing,
        listing_sender: &UnboundedSender<Listing>,
    ) -> Result<(), ScanError> {
        let Listing { dir, path, outcome } = listing;

        match outcome {
            Ok(entries) => {
                debug!("Listed {} entries in {}", entries.len(), path.display());
                for entry in entries {
                    let is_dir = entry.stat.file_type == FileType::Directory;
                    let child = tree.create_entry(entry.stat);
                    tree.insert_child(dir, child);

                    if is_dir {
                        self.dispatch_listing(tree, child, entry.path, listing_sender)?;
                    }
                }
                tree.set_read_state(dir, ReadState::Finished);
            }
            Err(error @ ListingError::CanceledError { .. }) => {
                warn!("{}", error);
                tree.read_job_aborted(dir);
            }
            Err(error) => {
                warn!("{}", error);
                tree.set_read_state(dir, ReadState::Aborted);
            }
        }

        // Jobs for new subdirectories were added above, so the ancestors'
        // counters never drop to zero early.
        tree.read_job_finished(dir);
        Ok(())
    }
}

#[derive(Debug, Snafu)]
pub enum ScannerCreationError {
    #[snafu(display("Failed to create listing dispatcher"))]
    DispatcherError { source: std::io::Error },
}

#[derive(Debug, Snafu)]
pub enum ScanError {
    #[snafu(display("Failed to read scan root {}", path.display()))]
    RootStatError {
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("Scan root {} is not a directory", path.display()))]
    NotADirectoryError { path: PathBuf },
    #[snafu(display("Failed to dispatch listing of {}: {}", path.display(), error))]
    DispatchError { path: PathBuf, error: String },
    #[snafu(display("Listing channel closed with {} read jobs pending", pending))]
    ChannelClosedError { pending: u32 },
}
