use derive_more::Display;

use crate::tree::NodeId;

/// Scan progress of a directory subtree.
///
/// `Queued -> Reading -> Finished` is the normal path. Any state may become
/// `Aborted`, and `Aborted` is never downgraded to `Finished`.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ReadState {
    #[default]
    #[display("queued")]
    Queued,
    #[display("reading")]
    Reading,
    #[display("finished")]
    Finished,
    #[display("aborted")]
    Aborted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Summary {
    pub size: u64,
    pub blocks: u64,
    pub items: u64,
    pub sub_dirs: u64,
    pub files: u64,
    pub latest_mtime: i64,
}

impl Summary {
    pub fn own(size: u64, blocks: u64, mtime: i64) -> Self {
        Self {
            size,
            blocks,
            latest_mtime: mtime,
            ..Self::default()
        }
    }

    pub(crate) fn raise_mtime(&mut self, mtime: i64) {
        if mtime > self.latest_mtime {
            self.latest_mtime = mtime;
        }
    }
}

#[derive(Debug)]
pub struct DirInfo {
    pub(crate) first_child: Option<NodeId>,
    pub(crate) dot_entry: Option<NodeId>,
    pub(crate) is_dot_entry: bool,
    /// Valid only while `dirty` is false.
    pub(crate) summary: Summary,
    pub(crate) dirty: bool,
    pub(crate) pending_read_jobs: u32,
    pub(crate) read_state: ReadState,
    pub(crate) is_mount_point: bool,
    pub(crate) is_excluded: bool,
}

impl DirInfo {
    pub(crate) fn new(own: Summary, is_dot_entry: bool) -> Self {
        Self {
            first_child: None,
            dot_entry: None,
            is_dot_entry,
            summary: own,
            dirty: false,
            pending_read_jobs: 0,
            read_state: ReadState::Queued,
            is_mount_point: false,
            is_excluded: false,
        }
    }

    pub fn first_child(&self) -> Option<NodeId> {
        self.first_child
    }

    pub fn dot_entry(&self) -> Option<NodeId> {
        self.dot_entry
    }

    pub fn is_dot_entry(&self) -> bool {
        self.is_dot_entry
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn pending_read_jobs(&self) -> u32 {
        self.pending_read_jobs
    }

    pub fn is_mount_point(&self) -> bool {
        self.is_mount_point
    }

    pub fn is_excluded(&self) -> bool {
        self.is_excluded
    }

    /// The locally stored state. Dot-entries report their parent's state
    /// through [`DirTree::read_state`](crate::tree::DirTree::read_state) instead.
    pub fn stored_read_state(&self) -> ReadState {
        self.read_state
    }

    /// Applies a transition, ignoring `Aborted -> Finished`.
    pub(crate) fn set_read_state(&mut self, new_state: ReadState) -> bool {
        if self.read_state == ReadState::Aborted && new_state == ReadState::Finished {
            return false;
        }
        self.read_state = new_state;
        true
    }
}
