//! In-memory directory tree with recursively aggregated statistics.
//!
//! The tree is filled out of order by a scanner. Totals are kept up to date
//! incrementally while entries are inserted and recomputed lazily once
//! something has been removed.

mod diagnostics;
mod dir_info;
mod dir_tree;
mod entry;
mod events;

pub use diagnostics::{DiagnosticSink, RecordingSink, StructuralError, TracingSink};
pub use dir_info::{DirInfo, ReadState, Summary};
pub use dir_tree::{Children, DirTree, Teardown};
pub use entry::{DOT_ENTRY_NAME, EntryStat, FileType, Node, NodeId, NodeKind};
pub use events::TreeEvent;
