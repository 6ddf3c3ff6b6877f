use std::path::PathBuf;

use futures_channel::mpsc::UnboundedReceiver;
use tracing::{debug, trace, warn};

use crate::tree::diagnostics::{DiagnosticSink, StructuralError, TracingSink};
use crate::tree::events::{Subscribers, TreeEvent};
use crate::tree::{DirInfo, EntryStat, FileType, Node, NodeId, NodeKind, ReadState, Summary};

/// How a removal treats the list the removed node is linked into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Teardown {
    /// The parent stays alive, so the node is spliced out of its children list.
    Live,
    /// The parent is being destroyed as well, its list is left as is.
    Cascade,
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    node: Option<Node>,
}

/// A filesystem subtree populated incrementally by a scanner.
///
/// Nodes live in an arena owned by the tree. Each directory keeps an
/// unordered, head-inserted list of its children, plus a dot-entry that
/// collects its plain files so that walking only the directory structure
/// never has to filter by type.
///
/// Aggregated statistics are maintained eagerly while entries are added and
/// recomputed lazily after removals: deleting marks the ancestor chain dirty
/// and the next read of a dirty directory walks its subtree once.
pub struct DirTree {
    slots: Vec<Slot>,
    free: Vec<u32>,
    root: Option<NodeId>,
    len: usize,
    recalc_count: u64,
    sink: Box<dyn DiagnosticSink>,
    subscribers: Subscribers,
}

impl Default for DirTree {
    fn default() -> Self {
        Self::new()
    }
}

impl DirTree {
    pub fn new() -> Self {
        Self::with_diagnostics(TracingSink)
    }

    pub fn with_diagnostics(sink: impl DiagnosticSink + 'static) -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            root: None,
            len: 0,
            recalc_count: 0,
            sink: Box::new(sink),
            subscribers: Subscribers::default(),
        }
    }

    pub fn subscribe(&mut self) -> UnboundedReceiver<TreeEvent> {
        self.subscribers.subscribe()
    }

    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn recalc_count(&self) -> u64 {
        self.recalc_count
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_ref())
    }

    /// Like [`get`](Self::get), but a stale id is treated as a caller bug.
    pub fn node(&self, id: NodeId) -> &Node {
        match self.get(id) {
            Some(node) => node,
            None => panic!("node {id} does not exist in this tree"),
        }
    }

    fn node_mut(&mut self, id: NodeId) -> &mut Node {
        match self
            .slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_mut())
        {
            Some(node) => node,
            None => panic!("node {id} does not exist in this tree"),
        }
    }

    fn dir(&self, id: NodeId) -> &DirInfo {
        match self.node(id).dir() {
            Some(dir) => dir,
            None => panic!("{} is not a directory", self.path(id)),
        }
    }

    fn dir_mut(&mut self, id: NodeId) -> &mut DirInfo {
        if !self.node(id).is_dir() {
            panic!("{} is not a directory", self.path(id));
        }
        match self.node_mut(id).dir_mut() {
            Some(dir) => dir,
            None => unreachable!(),
        }
    }

    fn alloc(&mut self, node: Node) -> NodeId {
        self.len += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.node = Some(node);
            return NodeId {
                index,
                generation: slot.generation,
            };
        }

        let index = match u32::try_from(self.slots.len()) {
            Ok(index) => index,
            Err(_) => panic!("tree cannot hold more than {} nodes", u32::MAX),
        };
        self.slots.push(Slot {
            generation: 0,
            node: Some(node),
        });
        NodeId {
            index,
            generation: 0,
        }
    }

    fn release(&mut self, id: NodeId) -> Option<Node> {
        let slot = self
            .slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)?;
        let node = slot.node.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        self.len -= 1;
        Some(node)
    }

    /// Allocates a detached node. Directories get their dot-entry right away.
    pub fn create_entry(&mut self, stat: EntryStat) -> NodeId {
        match stat.file_type {
            FileType::Directory => self.create_dir(stat, false),
            FileType::File => self.alloc(Node::new(stat, NodeKind::File)),
            FileType::Symlink => self.alloc(Node::new(stat, NodeKind::Symlink)),
            FileType::Special => self.alloc(Node::new(stat, NodeKind::Special)),
        }
    }

    fn create_dir(&mut self, stat: EntryStat, as_dot_entry: bool) -> NodeId {
        let own = Summary::own(stat.size, stat.blocks, stat.mtime);
        let info = DirInfo::new(own, as_dot_entry);
        let id = self.alloc(Node::new(stat, NodeKind::Dir(Box::new(info))));

        if !as_dot_entry {
            let dot_entry = self.create_dir(EntryStat::dot_entry(), true);
            self.node_mut(dot_entry).parent = Some(id);
            self.dir_mut(id).dot_entry = Some(dot_entry);
        }
        id
    }

    pub fn create_root(&mut self, stat: EntryStat) -> NodeId {
        self.clear();
        let root = self.create_entry(stat);
        self.root = Some(root);
        root
    }

    /// Frees every node, detached ones included. Outstanding ids become stale.
    pub fn clear(&mut self) {
        if let Some(root) = self.root.take() {
            self.destroy(root, Teardown::Cascade);
        }
        for index in 0..self.slots.len() {
            let slot = &mut self.slots[index];
            if slot.node.take().is_some() {
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(index as u32);
                self.len -= 1;
            }
        }
    }

    /// Links `child` into `dir`.
    ///
    /// Subdirectories go into the directory's own list, everything else into
    /// its dot-entry. A dot-entry, or a directory whose dot-entry has already
    /// been cleaned up, takes every child directly.
    pub fn insert_child(&mut self, dir: NodeId, child: NodeId) {
        let child_node = self.node(child);
        assert!(
            child_node.parent.is_none() && self.root != Some(child),
            "{child} is already part of the tree"
        );
        let child_is_dir = child_node.is_dir();
        if child_is_dir {
            let mut ancestor = Some(dir);
            while let Some(id) = ancestor {
                assert!(id != child, "{child} cannot be inserted below itself");
                ancestor = self.node(id).parent;
            }
        }

        let info = self.dir(dir);
        match info.dot_entry {
            Some(dot_entry) if !child_is_dir && !info.is_dot_entry => {
                self.insert_child(dot_entry, child);
            }
            _ => {
                let head = info.first_child;
                let node = self.node_mut(child);
                node.next = head;
                node.parent = Some(dir);
                self.dir_mut(dir).first_child = Some(child);

                self.child_added(dir, child);
                self.subscribers.emit(TreeEvent::ChildAdded(child));
            }
        }
    }

    /// Applies the contribution of `new_child` to `dir` and every ancestor.
    pub fn child_added(&mut self, dir: NodeId, new_child: NodeId) {
        let child = self.node(new_child);
        let (size, blocks, mtime) = (child.size, child.blocks, child.mtime);
        let (is_dir, is_file) = (child.is_dir(), child.is_file());

        self.walk_up(dir, |_, info| {
            if info.dirty {
                return;
            }
            let summary = &mut info.summary;
            summary.size += size;
            summary.blocks += blocks;
            summary.items += 1;
            if is_dir {
                summary.sub_dirs += 1;
            }
            if is_file {
                summary.files += 1;
            }
            summary.raise_mtime(mtime);
        });
    }

    /// Marks `dir` and all its ancestors dirty because `removed` is going away.
    ///
    /// Cached totals are not adjusted: the latest mtime cannot be taken back
    /// without looking at the remaining children again.
    pub fn deleting_child(&mut self, dir: NodeId, removed: NodeId, teardown: Teardown) {
        self.walk_up(dir, |_, info| info.dirty = true);

        if teardown == Teardown::Live && self.node(removed).parent == Some(dir) {
            self.unlink_child(dir, removed);
        }
    }

    /// Splices `removed` out of the children list of `dir`.
    ///
    /// Inconsistencies are reported to the diagnostic sink and leave the
    /// tree unchanged.
    pub fn unlink_child(&mut self, dir: NodeId, removed: NodeId) {
        if self.node(removed).parent != Some(dir) {
            self.report(StructuralError::NotAChild {
                child: self.path(removed),
                parent: self.path(dir),
            });
            return;
        }

        let after = self.node(removed).next;
        if self.dir(dir).first_child == Some(removed) {
            self.dir_mut(dir).first_child = after;
            self.node_mut(removed).next = None;
            return;
        }

        let mut cursor = self.dir(dir).first_child;
        while let Some(current) = cursor {
            let next = self.node(current).next;
            if next == Some(removed) {
                self.node_mut(current).next = after;
                self.node_mut(removed).next = None;
                return;
            }
            cursor = next;
        }

        self.report(StructuralError::MissingFromChildList {
            child: self.path(removed),
            parent: self.path(dir),
        });
    }

    /// Recomputes the totals of `dir` from its children and the children of
    /// its dot-entry. Dirty subdirectories recompute themselves on the way.
    pub fn recalc(&mut self, dir: NodeId) {
        let node = self.node(dir);
        let mut summary = Summary::own(node.size, node.blocks, node.mtime);

        let mut members: Vec<NodeId> = self.children(dir).collect();
        if let Some(dot_entry) = self.dir(dir).dot_entry {
            members.extend(self.children(dot_entry));
        }

        for member in members {
            let (is_dir, is_file) = {
                let node = self.node(member);
                (node.is_dir(), node.is_file())
            };
            let sub = self.summary(member);

            summary.size += sub.size;
            summary.blocks += sub.blocks;
            summary.items += sub.items + 1;
            summary.sub_dirs += sub.sub_dirs + u64::from(is_dir);
            summary.files += sub.files + u64::from(is_file);
            summary.raise_mtime(sub.latest_mtime);
        }

        self.recalc_count += 1;
        trace!("Recalculated {}: {:?}", self.path(dir), summary);

        let info = self.dir_mut(dir);
        info.summary = summary;
        info.dirty = false;
    }

    pub fn summary(&mut self, id: NodeId) -> Summary {
        let node = self.node(id);
        let Some(info) = node.dir() else {
            return Summary::own(node.size, node.blocks, node.mtime);
        };
        if info.dirty {
            self.recalc(id);
        }
        self.dir(id).summary
    }

    pub fn total_size(&mut self, id: NodeId) -> u64 {
        self.summary(id).size
    }

    pub fn total_blocks(&mut self, id: NodeId) -> u64 {
        self.summary(id).blocks
    }

    pub fn total_items(&mut self, id: NodeId) -> u64 {
        self.summary(id).items
    }

    pub fn total_sub_dirs(&mut self, id: NodeId) -> u64 {
        self.summary(id).sub_dirs
    }

    pub fn total_files(&mut self, id: NodeId) -> u64 {
        self.summary(id).files
    }

    pub fn latest_mtime(&mut self, id: NodeId) -> i64 {
        self.summary(id).latest_mtime
    }

    pub fn is_dirty(&self, dir: NodeId) -> bool {
        self.dir(dir).dirty
    }

    pub fn pending_read_jobs(&self, dir: NodeId) -> u32 {
        self.dir(dir).pending_read_jobs
    }

    /// The scan state of `dir`. A dot-entry always reports its parent's state.
    pub fn read_state(&self, dir: NodeId) -> ReadState {
        let info = self.dir(dir);
        match self.node(dir).parent {
            Some(parent) if info.is_dot_entry => self.read_state(parent),
            _ => info.read_state,
        }
    }

    pub fn set_read_state(&mut self, dir: NodeId, new_state: ReadState) {
        if !self.dir_mut(dir).set_read_state(new_state) {
            debug!(
                "Keeping {} aborted instead of marking it {}",
                self.path(dir),
                new_state
            );
        }
    }

    pub fn is_busy(&self, dir: NodeId) -> bool {
        let info = self.dir(dir);
        if info.pending_read_jobs > 0 && info.read_state != ReadState::Aborted {
            return true;
        }
        matches!(
            self.read_state(dir),
            ReadState::Queued | ReadState::Reading
        )
    }

    pub fn is_finished(&self, dir: NodeId) -> bool {
        !self.is_busy(dir)
    }

    pub fn read_job_added(&mut self, dir: NodeId) {
        self.walk_up(dir, |_, info| info.pending_read_jobs += 1);
    }

    pub fn read_job_finished(&mut self, dir: NodeId) {
        self.walk_up(dir, |id, info| match info.pending_read_jobs.checked_sub(1) {
            Some(pending) => info.pending_read_jobs = pending,
            None => warn!("Read job finished for {id}, but none was pending"),
        });
    }

    pub fn read_job_aborted(&mut self, dir: NodeId) {
        self.walk_up(dir, |_, info| info.read_state = ReadState::Aborted);
    }

    pub fn set_mount_point(&mut self, dir: NodeId, is_mount_point: bool) {
        self.dir_mut(dir).is_mount_point = is_mount_point;
    }

    pub fn set_excluded(&mut self, dir: NodeId, is_excluded: bool) {
        self.dir_mut(dir).is_excluded = is_excluded;
    }

    /// Post-scan cleanup of the whole subtree, children before parents.
    ///
    /// Must only run once no more entries can be inserted below `dir`.
    pub fn finalize_all(&mut self, dir: NodeId) {
        if self.dir(dir).is_dot_entry {
            return;
        }

        let sub_dirs: Vec<NodeId> = self
            .children(dir)
            .filter(|&child| self.node(child).dir().is_some_and(|d| !d.is_dot_entry))
            .collect();
        for sub_dir in sub_dirs {
            self.finalize_all(sub_dir);
        }

        self.subscribers.emit(TreeEvent::FinalizeLocal(dir));
        self.finalize_local(dir);
    }

    pub fn finalize_local(&mut self, dir: NodeId) {
        self.cleanup_dot_entries(dir);
    }

    /// Moves the files of a dot-entry up into `dir` when `dir` has no
    /// subdirectories, then drops the dot-entry if it is empty.
    pub fn cleanup_dot_entries(&mut self, dir: NodeId) {
        let info = self.dir(dir);
        if info.is_dot_entry {
            return;
        }
        let Some(dot_entry) = info.dot_entry else {
            return;
        };

        if info.first_child.is_none() {
            debug!("Reparenting children of solo dot entry {}", self.path(dir));
            let chain = self.dir_mut(dot_entry).first_child.take();
            self.dir_mut(dir).first_child = chain;

            let mut cursor = chain;
            while let Some(child) = cursor {
                let node = self.node_mut(child);
                node.parent = Some(dir);
                cursor = node.next;
            }
        }

        if self.dir(dot_entry).first_child.is_none() {
            trace!("Removing empty dot entry of {}", self.path(dir));
            self.dir_mut(dir).dot_entry = None;
            self.destroy(dot_entry, Teardown::Cascade);
        }
    }

    pub fn delete_subtree(&mut self, id: NodeId) {
        debug!("Deleting subtree {}", self.path(id));
        self.subscribers.emit(TreeEvent::DeletingChild(id));
        if self.root == Some(id) {
            self.root = None;
        }
        self.destroy(id, Teardown::Live);
    }

    fn destroy(&mut self, id: NodeId, teardown: Teardown) {
        if teardown == Teardown::Live {
            self.detach(id);
        }

        let Some(node) = self.release(id) else {
            return;
        };
        if let NodeKind::Dir(info) = node.kind {
            let mut cursor = info.first_child;
            while let Some(child) = cursor {
                cursor = self.node(child).next;
                self.destroy(child, Teardown::Cascade);
            }
            if let Some(dot_entry) = info.dot_entry {
                self.destroy(dot_entry, Teardown::Cascade);
            }
        }
    }

    fn detach(&mut self, id: NodeId) {
        let node = self.node(id);
        let Some(parent) = node.parent else {
            return;
        };

        if node.is_dot_entry() {
            self.walk_up(parent, |_, info| info.dirty = true);
            self.dir_mut(parent).dot_entry = None;
        } else {
            self.deleting_child(parent, id, Teardown::Live);
        }
    }

    pub fn children(&self, dir: NodeId) -> Children<'_> {
        Children {
            tree: self,
            cursor: self.node(dir).dir().and_then(|info| info.first_child),
        }
    }

    pub fn dot_entry(&self, dir: NodeId) -> Option<NodeId> {
        self.node(dir).dir().and_then(|info| info.dot_entry)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    /// Display path of `id`, built from the names up to the root.
    pub fn path(&self, id: NodeId) -> String {
        let mut names = Vec::new();
        let mut current = Some(id);
        while let Some(cursor) = current {
            let Some(node) = self.get(cursor) else {
                break;
            };
            if cursor == id || !node.is_dot_entry() {
                names.push(node.name.as_str());
            }
            current = node.parent;
        }

        names
            .iter()
            .rev()
            .collect::<PathBuf>()
            .display()
            .to_string()
    }

    fn walk_up(&mut self, start: NodeId, mut visit: impl FnMut(NodeId, &mut DirInfo)) {
        let mut current = Some(start);
        while let Some(id) = current {
            current = self.node(id).parent;
            visit(id, self.dir_mut(id));
        }
    }

    fn report(&self, problem: StructuralError) {
        self.sink.report(&problem);
    }
}

pub struct Children<'a> {
    tree: &'a DirTree,
    cursor: Option<NodeId>,
}

impl Iterator for Children<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.cursor?;
        self.cursor = self.tree.get(current).and_then(|node| node.next);
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::RecordingSink;
    use rstest::{fixture, rstest};

    const T1: i64 = 1_700_000_000;
    const T2: i64 = 1_700_000_500;

    fn dir_stat(name: &str) -> EntryStat {
        EntryStat::new(name, FileType::Directory, 0, 0)
    }

    fn file_stat(name: &str, size: u64, mtime: i64) -> EntryStat {
        EntryStat::new(name, FileType::File, size, mtime)
    }

    fn add(tree: &mut DirTree, dir: NodeId, stat: EntryStat) -> NodeId {
        let id = tree.create_entry(stat);
        tree.insert_child(dir, id);
        id
    }

    fn drain(receiver: &mut UnboundedReceiver<TreeEvent>) -> Vec<TreeEvent> {
        let mut events = Vec::new();
        while let Ok(Some(event)) = receiver.try_next() {
            events.push(event);
        }
        events
    }

    struct Scenario {
        tree: DirTree,
        sink: RecordingSink,
        root: NodeId,
        f1: NodeId,
        d: NodeId,
        f2: NodeId,
    }

    /// R holds F1 (100 bytes, T1) and D, D holds F2 (50 bytes, T2).
    #[fixture]
    fn scenario() -> Scenario {
        let sink = RecordingSink::new();
        let mut tree = DirTree::with_diagnostics(sink.clone());
        let root = tree.create_root(dir_stat("R"));
        let f1 = add(&mut tree, root, file_stat("F1", 100, T1));
        let d = add(&mut tree, root, dir_stat("D"));
        let f2 = add(&mut tree, d, file_stat("F2", 50, T2));

        Scenario {
            tree,
            sink,
            root,
            f1,
            d,
            f2,
        }
    }

    #[rstest]
    fn insertion_updates_totals_incrementally(scenario: Scenario) {
        let Scenario {
            mut tree, root, d, ..
        } = scenario;

        assert_eq!(tree.total_size(root), 150);
        assert_eq!(tree.total_items(root), 3);
        assert_eq!(tree.total_sub_dirs(root), 1);
        assert_eq!(tree.total_files(root), 2);
        assert_eq!(tree.latest_mtime(root), T2);
        assert_eq!(tree.total_size(d), 50);
        assert_eq!(tree.total_items(d), 1);
        assert_eq!(tree.recalc_count(), 0);
        assert!(!tree.is_dirty(root));
    }

    #[test]
    fn dot_entries_keep_pre_epoch_mtimes() {
        let mut tree = DirTree::new();
        let root = tree.create_root(EntryStat::new("R", FileType::Directory, 0, -1_000));
        add(&mut tree, root, file_stat("old", 1, -500));
        let dot_entry = tree.dot_entry(root).expect("root has a dot entry");

        assert_eq!(tree.latest_mtime(dot_entry), -500);
        tree.recalc(dot_entry);
        assert_eq!(tree.latest_mtime(dot_entry), -500);
        assert_eq!(tree.latest_mtime(root), -500);
    }

    #[rstest]
    fn explicit_recalc_agrees_with_incremental_totals(scenario: Scenario) {
        let Scenario { mut tree, root, .. } = scenario;
        let incremental = tree.summary(root);

        tree.recalc(root);

        assert_eq!(tree.summary(root), incremental);
        assert_eq!(tree.recalc_count(), 1);
    }

    #[test]
    fn running_sums_hold_without_recalc() {
        let mut tree = DirTree::new();
        let root = tree.create_root(dir_stat("root"));
        let mut dirs = vec![root];
        let (mut size, mut blocks, mut items) = (0, 0, 0);

        for i in 0..60u64 {
            let parent = dirs[(i as usize * 7) % dirs.len()];
            let stat = if i % 5 == 0 {
                EntryStat::new(format!("d{i}"), FileType::Directory, 4096, i as i64)
            } else {
                file_stat(&format!("f{i}"), i * 1000 + 1, i as i64)
            };
            size += stat.size;
            blocks += stat.blocks;
            items += 1;

            let id = add(&mut tree, parent, stat);
            if tree.node(id).is_dir() {
                dirs.push(id);
            }

            assert!(!tree.is_dirty(root));
            assert_eq!(tree.total_size(root), size);
            assert_eq!(tree.total_blocks(root), blocks);
            assert_eq!(tree.total_items(root), items);
        }
        assert_eq!(tree.recalc_count(), 0);
    }

    #[rstest]
    fn deleting_a_file_forces_one_recalc(scenario: Scenario) {
        let Scenario {
            mut tree,
            root,
            f1,
            d,
            ..
        } = scenario;
        let root_dot = tree.dot_entry(root).expect("root has a dot entry");

        tree.delete_subtree(f1);

        assert!(tree.is_dirty(root));
        assert!(tree.is_dirty(root_dot));
        assert!(!tree.is_dirty(d));

        assert_eq!(tree.total_size(root), 50);
        assert_eq!(tree.total_items(root), 2);
        assert_eq!(tree.latest_mtime(root), T2);
        assert_eq!(tree.recalc_count(), 1);
        // The dot-entry was not read, so it stays stale.
        assert!(tree.is_dirty(root_dot));
        assert!(tree.get(f1).is_none());
    }

    #[test]
    fn deletion_dirties_the_whole_ancestor_chain() {
        let mut tree = DirTree::new();
        let root = tree.create_root(dir_stat("root"));
        let a = add(&mut tree, root, dir_stat("a"));
        let b = add(&mut tree, a, dir_stat("b"));
        let side = add(&mut tree, root, dir_stat("side"));
        let file = add(&mut tree, b, file_stat("file", 10, T1));
        add(&mut tree, b, file_stat("other", 20, T1));

        tree.delete_subtree(file);

        for id in [root, a, b] {
            assert!(tree.is_dirty(id));
        }
        assert!(!tree.is_dirty(side));

        assert_eq!(tree.total_size(root), 20);
        assert_eq!(tree.recalc_count(), 3);
        assert_eq!(tree.total_items(a), 2);
        assert_eq!(tree.recalc_count(), 3);
    }

    #[test]
    fn reading_a_dirty_subdirectory_leaves_its_ancestors_alone() {
        let mut tree = DirTree::new();
        let root = tree.create_root(dir_stat("root"));
        let a = add(&mut tree, root, dir_stat("a"));
        let file = add(&mut tree, a, file_stat("file", 10, T1));

        tree.delete_subtree(file);

        assert_eq!(tree.total_size(a), 0);
        assert_eq!(tree.recalc_count(), 1);
        assert!(tree.is_dirty(root));
    }

    #[rstest]
    fn dirty_nodes_absorb_additions(scenario: Scenario) {
        let Scenario {
            mut tree,
            root,
            f1,
            d,
            ..
        } = scenario;
        tree.delete_subtree(f1);

        add(&mut tree, d, file_stat("F3", 7, T1));

        assert!(tree.is_dirty(root));
        assert!(!tree.is_dirty(d));
        assert_eq!(tree.total_size(d), 57);
        assert_eq!(tree.total_size(root), 57);
        assert_eq!(tree.total_items(root), 3);
    }

    #[rstest]
    fn plain_files_go_to_the_dot_entry(scenario: Scenario) {
        let Scenario {
            mut tree, root, f1, d, ..
        } = scenario;
        let root_dot = tree.dot_entry(root).expect("root has a dot entry");

        let direct: Vec<NodeId> = tree.children(root).collect();
        let dotted: Vec<NodeId> = tree.children(root_dot).collect();

        assert_eq!(direct, vec![d]);
        assert_eq!(dotted, vec![f1]);
        assert_eq!(tree.parent(f1), Some(root_dot));
        assert_eq!(tree.total_items(root), 3);
        assert_eq!(tree.total_items(root_dot), 1);
        assert_eq!(tree.total_size(root_dot), 100);
    }

    #[test]
    fn dot_entries_take_everything_directly() {
        let mut tree = DirTree::new();
        let root = tree.create_root(dir_stat("root"));
        let dot_entry = tree.dot_entry(root).expect("root has a dot entry");

        let file = add(&mut tree, dot_entry, file_stat("file", 1, 0));

        assert!(tree.node(dot_entry).is_dot_entry());
        assert_eq!(tree.dot_entry(dot_entry), None);
        assert_eq!(tree.parent(file), Some(dot_entry));
        assert_eq!(tree.total_items(root), 1);
    }

    #[test]
    fn children_list_is_head_inserted() {
        let mut tree = DirTree::new();
        let root = tree.create_root(dir_stat("root"));
        let a = add(&mut tree, root, dir_stat("a"));
        let b = add(&mut tree, root, dir_stat("b"));
        let c = add(&mut tree, root, dir_stat("c"));

        assert_eq!(tree.children(root).collect::<Vec<_>>(), vec![c, b, a]);
    }

    #[rstest]
    #[case::head(2)]
    #[case::middle(1)]
    #[case::tail(0)]
    fn deleting_splices_the_children_list(#[case] victim: usize) {
        let mut tree = DirTree::new();
        let root = tree.create_root(dir_stat("root"));
        let dirs: Vec<NodeId> = ["a", "b", "c"]
            .into_iter()
            .map(|name| add(&mut tree, root, dir_stat(name)))
            .collect();

        tree.delete_subtree(dirs[victim]);

        let expected: Vec<NodeId> = dirs
            .iter()
            .rev()
            .copied()
            .filter(|&id| id != dirs[victim])
            .collect();
        assert_eq!(tree.children(root).collect::<Vec<_>>(), expected);
        assert_eq!(tree.total_sub_dirs(root), 2);
    }

    #[rstest]
    fn unlinking_a_foreign_node_is_reported(scenario: Scenario) {
        let Scenario {
            mut tree,
            sink,
            root,
            d,
            f2,
            ..
        } = scenario;

        tree.unlink_child(root, f2);

        assert_eq!(
            sink.reports(),
            vec![StructuralError::NotAChild {
                child: "R/D/F2".into(),
                parent: "R".into(),
            }]
        );
        let d_dot = tree.dot_entry(d).expect("D has a dot entry");
        assert_eq!(tree.children(d_dot).collect::<Vec<_>>(), vec![f2]);
    }

    #[rstest]
    fn unlinking_a_node_missing_from_the_list_is_reported(scenario: Scenario) {
        let Scenario {
            mut tree,
            sink,
            root,
            d,
            ..
        } = scenario;
        let root_dot = tree.dot_entry(root).expect("root has a dot entry");

        // The dot-entry points back at root but is not in its children list.
        tree.unlink_child(root, root_dot);

        assert!(matches!(
            sink.reports().as_slice(),
            [StructuralError::MissingFromChildList { .. }]
        ));
        assert_eq!(tree.children(root).collect::<Vec<_>>(), vec![d]);
    }

    #[rstest]
    fn cascading_removal_keeps_the_list(scenario: Scenario) {
        let Scenario {
            mut tree, root, d, ..
        } = scenario;

        tree.deleting_child(root, d, Teardown::Cascade);

        assert!(tree.is_dirty(root));
        assert_eq!(tree.children(root).collect::<Vec<_>>(), vec![d]);
    }

    #[rstest]
    fn deleting_a_directory_frees_its_whole_subtree(scenario: Scenario) {
        let Scenario {
            mut tree,
            root,
            d,
            f2,
            ..
        } = scenario;
        let before = tree.len();

        tree.delete_subtree(d);

        // D, its dot-entry and F2.
        assert_eq!(tree.len(), before - 3);
        assert!(tree.get(d).is_none());
        assert!(tree.get(f2).is_none());
        assert_eq!(tree.total_sub_dirs(root), 0);
        assert_eq!(tree.total_size(root), 100);
    }

    #[rstest]
    fn freed_slots_are_reused_with_a_new_generation(scenario: Scenario) {
        let Scenario { mut tree, f1, .. } = scenario;

        tree.delete_subtree(f1);
        let reused = tree.create_entry(file_stat("new", 1, 0));

        assert_eq!(reused.index, f1.index);
        assert_ne!(reused, f1);
        assert!(tree.get(f1).is_none());
        assert_eq!(tree.node(reused).name(), "new");
    }

    #[rstest]
    #[should_panic(expected = "does not exist")]
    fn stale_ids_are_rejected(scenario: Scenario) {
        let Scenario {
            mut tree, root, f1, ..
        } = scenario;
        tree.delete_subtree(f1);

        tree.insert_child(root, f1);
    }

    #[rstest]
    #[should_panic(expected = "already part of the tree")]
    fn linked_nodes_cannot_be_inserted_twice(scenario: Scenario) {
        let Scenario {
            mut tree, d, f2, ..
        } = scenario;

        tree.insert_child(d, f2);
    }

    #[test]
    #[should_panic(expected = "cannot be inserted below itself")]
    fn directories_cannot_contain_themselves() {
        let mut tree = DirTree::new();
        let x = tree.create_entry(dir_stat("x"));

        tree.insert_child(x, x);
    }

    #[test]
    #[should_panic(expected = "cannot be inserted below itself")]
    fn directories_cannot_move_below_their_descendants() {
        let mut tree = DirTree::new();
        let x = tree.create_entry(dir_stat("x"));
        let y = tree.create_entry(dir_stat("y"));
        let z = tree.create_entry(dir_stat("z"));
        tree.insert_child(x, y);
        tree.insert_child(y, z);

        tree.insert_child(z, x);
    }

    #[rstest]
    #[should_panic(expected = "is not a directory")]
    fn files_cannot_take_children(scenario: Scenario) {
        let Scenario { mut tree, f1, .. } = scenario;
        let orphan = tree.create_entry(file_stat("orphan", 1, 0));

        tree.insert_child(f1, orphan);
    }

    #[rstest]
    fn deleting_the_root_empties_the_tree(scenario: Scenario) {
        let Scenario { mut tree, root, .. } = scenario;

        tree.delete_subtree(root);

        assert_eq!(tree.root(), None);
        assert!(tree.is_empty());
    }

    #[rstest]
    fn deleting_a_dot_entry_detaches_it(scenario: Scenario) {
        let Scenario {
            mut tree, root, f1, ..
        } = scenario;
        let root_dot = tree.dot_entry(root).expect("root has a dot entry");

        tree.delete_subtree(root_dot);

        assert_eq!(tree.dot_entry(root), None);
        assert!(tree.get(f1).is_none());
        assert_eq!(tree.total_size(root), 50);
        assert_eq!(tree.total_items(root), 2);
    }

    #[test]
    fn create_root_replaces_the_previous_tree() {
        let mut tree = DirTree::new();
        let old_root = tree.create_root(dir_stat("old"));
        let detached = tree.create_entry(file_stat("detached", 1, 0));

        let new_root = tree.create_root(dir_stat("new"));

        assert!(tree.get(old_root).is_none());
        assert!(tree.get(detached).is_none());
        assert_eq!(tree.root(), Some(new_root));
        // The new root and its dot-entry.
        assert_eq!(tree.len(), 2);
    }

    #[rstest]
    fn dot_entry_reports_the_parent_read_state(scenario: Scenario) {
        let Scenario { mut tree, d, .. } = scenario;
        let d_dot = tree.dot_entry(d).expect("D has a dot entry");

        tree.set_read_state(d_dot, ReadState::Aborted);
        tree.set_read_state(d, ReadState::Reading);
        assert_eq!(tree.read_state(d_dot), ReadState::Reading);

        tree.set_read_state(d, ReadState::Finished);
        assert_eq!(tree.read_state(d_dot), ReadState::Finished);
    }

    #[rstest]
    fn read_jobs_propagate_to_the_root(scenario: Scenario) {
        let Scenario {
            mut tree, root, d, ..
        } = scenario;

        tree.read_job_added(d);
        tree.read_job_added(d);
        assert_eq!(tree.pending_read_jobs(d), 2);
        assert_eq!(tree.pending_read_jobs(root), 2);

        tree.read_job_finished(d);
        assert_eq!(tree.pending_read_jobs(d), 1);
        assert_eq!(tree.pending_read_jobs(root), 1);

        tree.read_job_finished(d);
        tree.read_job_finished(d);
        assert_eq!(tree.pending_read_jobs(root), 0);
    }

    #[rstest]
    fn abort_outranks_finish(scenario: Scenario) {
        let Scenario {
            mut tree, root, d, ..
        } = scenario;

        tree.read_job_aborted(d);
        assert_eq!(tree.read_state(d), ReadState::Aborted);
        assert_eq!(tree.read_state(root), ReadState::Aborted);

        tree.set_read_state(root, ReadState::Finished);
        assert_eq!(tree.read_state(root), ReadState::Aborted);
    }

    #[rstest]
    #[case(ReadState::Queued, 0, true)]
    #[case(ReadState::Reading, 0, true)]
    #[case(ReadState::Finished, 0, false)]
    #[case(ReadState::Finished, 1, true)]
    #[case(ReadState::Aborted, 1, false)]
    #[case(ReadState::Aborted, 0, false)]
    fn busy_state(#[case] state: ReadState, #[case] jobs: u32, #[case] busy: bool) {
        let mut tree = DirTree::new();
        let root = tree.create_root(dir_stat("root"));
        for _ in 0..jobs {
            tree.read_job_added(root);
        }
        tree.set_read_state(root, state);

        assert_eq!(tree.is_busy(root), busy);
        assert_eq!(tree.is_finished(root), !busy);
    }

    #[rstest]
    fn flags_are_recorded(scenario: Scenario) {
        let Scenario { mut tree, d, .. } = scenario;

        tree.set_mount_point(d, true);
        tree.set_excluded(d, true);

        let info = tree.node(d).dir().expect("D is a directory");
        assert!(info.is_mount_point());
        assert!(info.is_excluded());
    }

    #[rstest]
    fn finalize_moves_solo_dot_entry_children_up(scenario: Scenario) {
        let Scenario {
            mut tree,
            root,
            f1,
            d,
            f2,
            ..
        } = scenario;

        tree.finalize_all(root);

        assert_eq!(tree.dot_entry(d), None);
        assert_eq!(tree.children(d).collect::<Vec<_>>(), vec![f2]);
        assert_eq!(tree.parent(f2), Some(d));
        assert_eq!(tree.path(f2), "R/D/F2");

        // R still has a subdirectory, so its files stay where they are.
        let root_dot = tree.dot_entry(root).expect("root keeps its dot entry");
        assert_eq!(tree.children(root_dot).collect::<Vec<_>>(), vec![f1]);

        assert_eq!(tree.total_size(root), 150);
        assert_eq!(tree.total_items(root), 3);
    }

    #[test]
    fn finalize_drops_empty_dot_entries() {
        let mut tree = DirTree::new();
        let root = tree.create_root(dir_stat("root"));
        let sub = add(&mut tree, root, dir_stat("sub"));
        let before = tree.len();

        tree.finalize_all(root);

        assert_eq!(tree.dot_entry(root), None);
        assert_eq!(tree.dot_entry(sub), None);
        assert_eq!(tree.len(), before - 2);

        let late = add(&mut tree, sub, file_stat("late", 3, 0));
        assert_eq!(tree.parent(late), Some(sub));
        assert_eq!(tree.total_items(root), 2);
    }

    #[rstest]
    fn finalize_local_is_announced_children_first(scenario: Scenario) {
        let Scenario {
            mut tree, root, d, ..
        } = scenario;
        let mut events = tree.subscribe();

        tree.finalize_all(root);

        assert_eq!(
            drain(&mut events),
            vec![TreeEvent::FinalizeLocal(d), TreeEvent::FinalizeLocal(root)]
        );
    }

    #[rstest]
    fn finalizing_a_dot_entry_does_nothing(scenario: Scenario) {
        let Scenario { mut tree, root, .. } = scenario;
        let root_dot = tree.dot_entry(root).expect("root has a dot entry");
        let mut events = tree.subscribe();

        tree.finalize_all(root_dot);

        assert!(drain(&mut events).is_empty());
        assert_eq!(tree.dot_entry(root), Some(root_dot));
    }

    #[test]
    fn structural_events_are_sent_once_per_operation() {
        let mut tree = DirTree::new();
        let root = tree.create_root(dir_stat("root"));
        let mut events = tree.subscribe();

        let file = add(&mut tree, root, file_stat("file", 1, 0));
        tree.delete_subtree(file);

        assert_eq!(
            drain(&mut events),
            vec![TreeEvent::ChildAdded(file), TreeEvent::DeletingChild(file)]
        );
    }

    #[rstest]
    fn paths_skip_dot_entries(scenario: Scenario) {
        let Scenario {
            tree, root, f1, d, ..
        } = scenario;
        let root_dot = tree.dot_entry(root).expect("root has a dot entry");

        assert_eq!(tree.path(root), "R");
        assert_eq!(tree.path(d), "R/D");
        assert_eq!(tree.path(f1), "R/F1");
        assert_eq!(tree.path(root_dot), "R/.");
    }

    #[test]
    fn symlinks_count_as_items_but_not_files() {
        let mut tree = DirTree::new();
        let root = tree.create_root(dir_stat("root"));
        add(
            &mut tree,
            root,
            EntryStat::new("link", FileType::Symlink, 12, 0),
        );

        assert_eq!(tree.total_items(root), 1);
        assert_eq!(tree.total_files(root), 0);
        assert_eq!(tree.total_sub_dirs(root), 0);
        assert_eq!(tree.total_size(root), 12);
    }

    #[test]
    fn finishing_an_idle_directory_keeps_the_counter_at_zero() {
        let mut tree = DirTree::new();
        let root = tree.create_root(dir_stat("root"));

        tree.read_job_finished(root);

        assert_eq!(tree.pending_read_jobs(root), 0);
    }
}
