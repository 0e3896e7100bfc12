//! The delta index: every live delta keyed by id, a designated head, and
//! the set of fork heads (leaves of the DAG).

use crate::delta::{self, SharedDelta};
use crate::error::StateError;
use crate::NodeId;
use std::collections::{HashMap, HashSet};

/// Picks the head among same-revision forks. Returning `None` dethrones the
/// current head in favor of its parent.
pub type Comparator =
    fn(&HashMap<NodeId, SharedDelta>, &SharedDelta, &SharedDelta) -> Option<SharedDelta>;

/// How the index elects a head among competing forks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ForkResolutionAlgorithm {
    /// First-in wins: the current head is kept.
    #[default]
    Fifo,
}

impl ForkResolutionAlgorithm {
    pub(crate) fn comparator(self) -> Comparator {
        match self {
            ForkResolutionAlgorithm::Fifo => fifo_comparator,
        }
    }
}

fn fifo_comparator(
    _forks: &HashMap<NodeId, SharedDelta>,
    head: &SharedDelta,
    _new: &SharedDelta,
) -> Option<SharedDelta> {
    Some(head.clone())
}

/// Index over all live deltas.
pub struct DeltaIndex {
    index: HashMap<NodeId, SharedDelta>,
    fork_heads: HashMap<NodeId, SharedDelta>,
    root: Option<SharedDelta>,
    head: Option<SharedDelta>,
    comparator: Comparator,
}

impl DeltaIndex {
    pub(crate) fn new(comparator: Comparator) -> Self {
        Self {
            index: HashMap::new(),
            fork_heads: HashMap::new(),
            root: None,
            head: None,
            comparator,
        }
    }

    /// Install a fresh, finalized root, making it head and sole fork head.
    pub(crate) fn install_root(&mut self, root: SharedDelta) {
        let id = root.read().id();
        self.index.clear();
        self.fork_heads.clear();
        self.index.insert(id, root.clone());
        self.fork_heads.insert(id, root.clone());
        self.root = Some(root.clone());
        self.head = Some(root);
    }

    /// Drop every delta.
    pub(crate) fn clear(&mut self) {
        self.index.clear();
        self.fork_heads.clear();
        self.root = None;
        self.head = None;
    }

    /// Whether the index holds a root and head.
    pub fn is_open(&self) -> bool {
        self.root.is_some() && self.head.is_some()
    }

    fn expect_open(&self) -> (&SharedDelta, &SharedDelta) {
        match (&self.root, &self.head) {
            (Some(root), Some(head)) => (root, head),
            _ => panic!("state database is not open"),
        }
    }

    /// The current root delta.
    pub fn root(&self) -> SharedDelta {
        self.expect_open().0.clone()
    }

    /// The current head delta.
    pub fn head(&self) -> SharedDelta {
        self.expect_open().1.clone()
    }

    /// All fork heads.
    pub fn fork_heads(&self) -> Vec<SharedDelta> {
        self.fork_heads.values().cloned().collect()
    }

    /// The delta with the given id, if live.
    pub fn get(&self, id: &NodeId) -> Option<SharedDelta> {
        self.expect_open();
        self.index.get(id).cloned()
    }

    /// The delta at `revision` on the path from `tip_id` (falling back to
    /// head) to the root.
    pub fn at_revision(&self, revision: u64, tip_id: &NodeId) -> SharedDelta {
        let (root, _) = self.expect_open();
        assert!(
            revision >= root.read().revision(),
            "cannot ask for a node with a revision below the root"
        );

        if revision == root.read().revision() {
            return root.clone();
        }

        let mut delta = self.get(tip_id).unwrap_or_else(|| self.head());
        loop {
            let (current_revision, parent) = {
                let guard = delta.read();
                (guard.revision(), guard.parent())
            };
            if current_revision <= revision {
                return delta;
            }
            delta = match parent {
                Some(parent) => parent,
                None => return delta,
            };
        }
    }

    /// Register a new delta. Fails when its id is already indexed.
    pub fn add(&mut self, delta: SharedDelta) -> Result<(), StateError> {
        self.expect_open();
        let id = delta.read().id();
        if self.index.contains_key(&id) {
            return Err(StateError::DuplicateNode(id));
        }
        self.index.insert(id, delta);
        Ok(())
    }

    /// Re-elect the head after `delta` was finalized and update fork heads.
    pub fn finalize(&mut self, delta: &SharedDelta) {
        let head = self.head().clone();
        let delta_revision = delta.read().revision();
        let head_revision = head.read().revision();

        if delta_revision > head_revision {
            self.head = Some(delta.clone());
        } else if delta_revision == head_revision {
            match (self.comparator)(&self.fork_heads, &head, delta) {
                Some(new_head) => self.head = Some(new_head),
                None => {
                    // The comparator dethroned the current head; fall back
                    // to its parent.
                    self.fork_heads.remove(&head.read().id());
                    self.head = head.read().parent();
                }
            }
        }

        // The finalized delta is a leaf; its parent no longer is. The
        // genesis root's id is the null id, so no guard here.
        let parent_id = delta.read().parent_id();
        self.fork_heads.remove(&parent_id);
        self.fork_heads.insert(delta.read().id(), delta.clone());
    }

    fn children_of(&self, id: &NodeId) -> Vec<NodeId> {
        self.index
            .values()
            .filter(|delta| delta.read().parent_id() == *id)
            .map(|delta| delta.read().id())
            .collect()
    }

    /// Discard a delta and every descendant outside `whitelist`. Discarding
    /// the root or an ancestor of head is a programmer error.
    pub fn remove(&mut self, id: &NodeId, whitelist: &HashSet<NodeId>) {
        let (root, head) = self.expect_open();
        let head_id = head.read().id();
        assert!(*id != root.read().id(), "cannot discard root node");

        let delta = match self.index.get(id) {
            Some(delta) => delta.clone(),
            None => return,
        };

        let mut remove_queue: Vec<NodeId> = vec![*id];
        let mut i = 0;
        while i < remove_queue.len() {
            assert!(
                remove_queue[i] != head_id,
                "cannot discard an ancestor of head"
            );
            for child in self.children_of(&remove_queue[i]) {
                if !whitelist.contains(&child) {
                    remove_queue.push(child);
                }
            }
            i += 1;
        }

        for id in &remove_queue {
            self.index.remove(id);
            self.fork_heads.remove(id);
        }

        // If the discarded subtree's parent lost its last child, it is a
        // leaf again.
        let parent_id = delta.read().parent_id();
        if self.children_of(&parent_id).is_empty() {
            if let Some(parent) = self.index.get(&parent_id) {
                self.fork_heads.insert(parent_id, parent.clone());
            }
        }
    }

    /// Commit a delta: it becomes the new root and everything outside its
    /// subtree is discarded. Committing the current root is a no-op.
    pub fn commit(&mut self, delta: &SharedDelta) {
        let (root, _) = self.expect_open();
        let id = delta.read().id();
        if id == root.read().id() {
            return;
        }

        let old_root_id = root.read().id();
        self.root = Some(delta.clone());
        delta::commit(delta);

        let mut whitelist = HashSet::new();
        whitelist.insert(id);
        self.remove(&old_root_id, &whitelist);
    }
}
