use std::fs::Metadata;

use derive_more::Display;

#[cfg(not(unix))]
use crate::ext::SystemTimeExt;
use crate::tree::DirInfo;

pub const DOT_ENTRY_NAME: &str = ".";

const S_IFMT: u32 = 0o170_000;
const S_IFDIR: u32 = 0o040_000;
const S_IFREG: u32 = 0o100_000;
const S_IFLNK: u32 = 0o120_000;

/// Handle to a node living in a [`DirTree`](crate::tree::DirTree).
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
#[display("#{index}.{generation}")]
pub struct NodeId {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileType {
    #[display("directory")]
    Directory,
    #[display("file")]
    File,
    #[display("symlink")]
    Symlink,
    #[display("special")]
    Special,
}

impl FileType {
    pub fn from_mode(mode: u32) -> Self {
        match mode & S_IFMT {
            S_IFDIR => FileType::Directory,
            S_IFREG => FileType::File,
            S_IFLNK => FileType::Symlink,
            _ => FileType::Special,
        }
    }

    pub fn from_std(file_type: std::fs::FileType) -> Self {
        if file_type.is_dir() {
            FileType::Directory
        } else if file_type.is_file() {
            FileType::File
        } else if file_type.is_symlink() {
            FileType::Symlink
        } else {
            FileType::Special
        }
    }
}

/// The stat information a node is created from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryStat {
    pub name: String,
    pub size: u64,
    /// Allocated 512-byte blocks.
    pub blocks: u64,
    pub mtime: i64,
    pub file_type: FileType,
}

impl EntryStat {
    pub fn new(name: impl Into<String>, file_type: FileType, size: u64, mtime: i64) -> Self {
        Self {
            name: name.into(),
            size,
            blocks: size.div_ceil(512),
            mtime,
            file_type,
        }
    }

    pub fn from_raw(name: impl Into<String>, size: u64, blocks: u64, mtime: i64, mode: u32) -> Self {
        Self {
            name: name.into(),
            size,
            blocks,
            mtime,
            file_type: FileType::from_mode(mode),
        }
    }

    /// Builds a stat descriptor from metadata obtained without following symlinks.
    pub fn from_metadata(name: impl Into<String>, metadata: &Metadata) -> Self {
        #[cfg(unix)]
        {
            use std::os::unix::fs::MetadataExt;

            Self::from_raw(
                name,
                metadata.size(),
                metadata.blocks(),
                metadata.mtime(),
                metadata.mode(),
            )
        }
        #[cfg(not(unix))]
        {
            let mtime = metadata
                .modified()
                .map(|time| time.to_unix_seconds())
                .unwrap_or_default();
            Self {
                name: name.into(),
                size: metadata.len(),
                blocks: metadata.len().div_ceil(512),
                mtime,
                file_type: FileType::from_std(metadata.file_type()),
            }
        }
    }

    pub(crate) fn dot_entry() -> Self {
        Self {
            name: DOT_ENTRY_NAME.to_string(),
            size: 0,
            blocks: 0,
            // Below any real mtime, so the newest child always wins.
            mtime: i64::MIN,
            file_type: FileType::Directory,
        }
    }
}

#[derive(Debug)]
pub enum NodeKind {
    File,
    Symlink,
    Special,
    Dir(Box<DirInfo>),
}

/// Siblings form an unordered singly-linked list through `next`; the list head
/// lives in the parent's [`DirInfo`].
#[derive(Debug)]
pub struct Node {
    pub(crate) name: String,
    pub(crate) size: u64,
    pub(crate) blocks: u64,
    pub(crate) mtime: i64,
    pub(crate) parent: Option<NodeId>,
    pub(crate) next: Option<NodeId>,
    pub(crate) kind: NodeKind,
}

impl Node {
    pub(crate) fn new(stat: EntryStat, kind: NodeKind) -> Self {
        Self {
            name: stat.name,
            size: stat.size,
            blocks: stat.blocks,
            mtime: stat.mtime,
            parent: None,
            next: None,
            kind,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn blocks(&self) -> u64 {
        self.blocks
    }

    pub fn mtime(&self) -> i64 {
        self.mtime
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn next_sibling(&self) -> Option<NodeId> {
        self.next
    }

    pub fn is_dir(&self) -> bool {
        matches!(self.kind, NodeKind::Dir(_))
    }

    pub fn is_file(&self) -> bool {
        matches!(self.kind, NodeKind::File)
    }

    pub fn is_dot_entry(&self) -> bool {
        self.dir().is_some_and(|dir| dir.is_dot_entry)
    }

    pub fn file_type(&self) -> FileType {
        match self.kind {
            NodeKind::File => FileType::File,
            NodeKind::Symlink => FileType::Symlink,
            NodeKind::Special => FileType::Special,
            NodeKind::Dir(_) => FileType::Directory,
        }
    }

    pub fn dir(&self) -> Option<&DirInfo> {
        match &self.kind {
            NodeKind::Dir(dir) => Some(dir),
            _ => None,
        }
    }

    pub(crate) fn dir_mut(&mut self) -> Option<&mut DirInfo> {
        match &mut self.kind {
            NodeKind::Dir(dir) => Some(dir),
            _ => None,
        }
    }
}
