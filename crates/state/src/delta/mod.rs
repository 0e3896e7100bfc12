//! The state delta: one node of the DAG.
//!
//! A delta is a copy-on-write overlay. Writes land in the local backend,
//! deletions become local tombstones, and reads that miss locally chain
//! through the parents breadth-first (recording the key for conflict
//! detection). Deltas are held behind `Arc<RwLock<_>>` so that parents are
//! shared between siblings and a committed delta can adopt the root backend.

use crate::backend::{Backend, MapBackend, SharedBackend};
use crate::error::StateError;
use crate::{ApprovalWeight, NodeId, NULL_ID};
use meridian_crypto::{merkle_root, Digest};
use meridian_types::protocol::Account;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use std::sync::Arc;

/// Shared handle to one delta.
pub type SharedDelta = Arc<RwLock<StateDelta>>;

fn shared(delta: StateDelta) -> SharedDelta {
    Arc::new(RwLock::new(delta))
}

fn shared_backend(backend: MapBackend) -> SharedBackend {
    Arc::new(RwLock::new(backend))
}

fn ptr_of(delta: &SharedDelta) -> usize {
    Arc::as_ptr(delta) as usize
}

/// One node of the state DAG.
pub struct StateDelta {
    parents: Vec<SharedDelta>,
    backend: SharedBackend,
    removed: BTreeSet<Vec<u8>>,
    read_keys: Mutex<BTreeSet<Vec<u8>>>,
    merkle_root: Option<Digest>,
    complete: bool,
    approvals: BTreeMap<Account, ApprovalWeight>,
    approval_threshold: ApprovalWeight,
    finalized: bool,
}

impl std::fmt::Debug for StateDelta {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateDelta")
            .field("parents", &self.parents)
            .field("removed", &self.removed)
            .field("read_keys", &self.read_keys)
            .field("merkle_root", &self.merkle_root)
            .field("complete", &self.complete)
            .field("approvals", &self.approvals)
            .field("approval_threshold", &self.approval_threshold)
            .field("finalized", &self.finalized)
            .finish()
    }
}

impl Default for StateDelta {
    fn default() -> Self {
        Self {
            parents: Vec::new(),
            backend: shared_backend(MapBackend::new()),
            removed: BTreeSet::new(),
            read_keys: Mutex::new(BTreeSet::new()),
            merkle_root: None,
            complete: false,
            approvals: BTreeMap::new(),
            approval_threshold: 0,
            finalized: false,
        }
    }
}

impl StateDelta {
    /// A fresh root delta over an empty map backend.
    pub fn new_root() -> SharedDelta {
        shared(Self::default())
    }

    /// The visible value for `key`: local tombstones win, then local writes,
    /// then the first hit (or tombstone) found walking parents breadth-first.
    ///
    /// A lookup that consults any parent records `key` in the read set.
    pub fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        if self.removed.contains(key) {
            return None;
        }

        if let Some(value) = self.backend.read().get(key) {
            return Some(value);
        }

        if !self.complete && !self.parents.is_empty() {
            self.read_keys.lock().insert(key.to_vec());
        }

        let mut queue: VecDeque<SharedDelta> = self.parents.iter().cloned().collect();
        let mut visited: HashSet<usize> = HashSet::new();

        while let Some(node) = queue.pop_front() {
            if !visited.insert(ptr_of(&node)) {
                continue;
            }

            let guard = node.read();
            if guard.removed.contains(key) {
                return None;
            }
            if let Some(value) = guard.backend.read().get(key) {
                return Some(value);
            }
            queue.extend(guard.parents.iter().cloned());
        }

        None
    }

    /// Write `value` under `key`, returning the signed size delta relative
    /// to the currently visible value.
    pub fn put(&mut self, key: Vec<u8>, value: &[u8]) -> i64 {
        assert!(!self.complete, "cannot modify a complete state delta");

        let mut size = key.len() as i64 + value.len() as i64;
        if let Some(current) = self.get(&key) {
            size -= key.len() as i64 + current.len() as i64;
        }

        self.backend.write().put(key, value.to_vec());
        size
    }

    /// Remove `key`, returning the (non-positive) size delta. Removing a key
    /// that is absent from a root delta is a no-op returning zero.
    pub fn remove(&mut self, key: Vec<u8>) -> i64 {
        assert!(!self.complete, "cannot modify a complete state delta");

        let mut size = self.backend.write().remove(&key);

        if !self.root() && size == 0 {
            if let Some(current) = self.get(&key) {
                size -= key.len() as i64 + current.len() as i64;
            }
        }

        if size != 0 {
            self.removed.insert(key);
        }

        size
    }

    /// Drop all local writes, tombstones and backend metadata.
    pub fn clear(&mut self) {
        self.backend.write().clear();
        self.removed.clear();
    }

    /// Whether `key` is locally tombstoned.
    pub fn is_removed(&self, key: &[u8]) -> bool {
        self.removed.contains(key)
    }

    /// Whether this delta has no parents.
    pub fn root(&self) -> bool {
        self.parents.is_empty()
    }

    /// This delta's revision (the backend's).
    pub fn revision(&self) -> u64 {
        self.backend.read().revision()
    }

    /// Set the revision on the backend.
    pub fn set_revision(&mut self, revision: u64) {
        self.backend.write().set_revision(revision);
    }

    /// This delta's id (the backend's).
    pub fn id(&self) -> NodeId {
        self.backend.read().id()
    }

    /// Assign this delta's id on the backend.
    pub fn set_id(&mut self, id: NodeId) {
        self.backend.write().set_id(id);
    }

    /// The first parent's id, or the null id for a root.
    pub fn parent_id(&self) -> NodeId {
        self.parents
            .first()
            .map(|parent| parent.read().id())
            .unwrap_or(NULL_ID)
    }

    /// The first parent, if any.
    pub fn parent(&self) -> Option<SharedDelta> {
        self.parents.first().cloned()
    }

    /// All parents.
    pub fn parents(&self) -> &[SharedDelta] {
        &self.parents
    }

    /// Whether the delta is sealed against further writes.
    pub fn complete(&self) -> bool {
        self.complete
    }

    /// Whether the delta is finalized.
    pub fn finalized(&self) -> bool {
        self.finalized
    }

    /// Seal the delta: no further writes, merkle root computable, children
    /// may be created under it.
    pub fn finalize(&mut self) {
        self.complete = true;
        self.finalized = true;
    }

    /// Sum of all approval weights.
    pub fn total_approval(&self) -> ApprovalWeight {
        self.approvals.values().sum()
    }

    /// The approvals recorded on this delta.
    pub fn approvals(&self) -> &BTreeMap<Account, ApprovalWeight> {
        &self.approvals
    }

    /// The merkle root over this delta's local writes and tombstones, in
    /// lexicographic key order with empty leaves for tombstones. Memoized.
    pub fn merkle_root(&mut self) -> Digest {
        assert!(
            self.complete,
            "cannot return merkle root of a non-complete state delta"
        );

        if let Some(root) = self.merkle_root {
            return root;
        }

        let root = {
            let backend = self.backend.read();
            let mut leaves: Vec<Vec<u8>> =
                Vec::with_capacity((backend.len() + self.removed.len()) * 2);

            let mut entries = backend.iter().peekable();
            let mut tombstones = self.removed.iter().peekable();

            loop {
                match (entries.peek(), tombstones.peek()) {
                    (Some((key, value)), Some(tombstone)) => {
                        if *key < tombstone.as_slice() {
                            leaves.push(key.to_vec());
                            leaves.push(value.to_vec());
                            entries.next();
                        } else {
                            leaves.push(tombstone.to_vec());
                            leaves.push(Vec::new());
                            tombstones.next();
                        }
                    }
                    (Some((key, value)), None) => {
                        leaves.push(key.to_vec());
                        leaves.push(value.to_vec());
                        entries.next();
                    }
                    (None, Some(tombstone)) => {
                        leaves.push(tombstone.to_vec());
                        leaves.push(Vec::new());
                        tombstones.next();
                    }
                    (None, None) => break,
                }
            }

            merkle_root(leaves.iter().map(|leaf| leaf.as_slice()))
        };

        self.merkle_root = Some(root);
        root
    }

    /// The first entry whose key is strictly greater than `key` in the
    /// chained view. Tombstoned and overridden keys resolve through
    /// [`get`](Self::get).
    pub fn next(&self, key: &[u8]) -> Option<(Vec<u8>, Vec<u8>)> {
        let mut target = key.to_vec();
        loop {
            let candidate = self.scan(&target, true)?;
            if let Some(value) = self.get(&candidate) {
                return Some((candidate, value));
            }
            target = candidate;
        }
    }

    /// The last entry whose key is strictly less than `key` in the chained
    /// view.
    pub fn prev(&self, key: &[u8]) -> Option<(Vec<u8>, Vec<u8>)> {
        let mut target = key.to_vec();
        loop {
            let candidate = self.scan(&target, false)?;
            if let Some(value) = self.get(&candidate) {
                return Some((candidate, value));
            }
            target = candidate;
        }
    }

    /// The nearest key beyond `target` across this delta and all ancestors,
    /// ignoring visibility.
    fn scan(&self, target: &[u8], forward: bool) -> Option<Vec<u8>> {
        let better = |best: &Option<Vec<u8>>, candidate: Vec<u8>| -> Option<Vec<u8>> {
            match best {
                Some(current) if forward && *current <= candidate => None,
                Some(current) if !forward && *current >= candidate => None,
                _ => Some(candidate),
            }
        };

        let mut best: Option<Vec<u8>> = None;

        {
            let backend = self.backend.read();
            let local = if forward {
                backend.next(target)
            } else {
                backend.prev(target)
            };
            if let Some((key, _)) = local {
                best = Some(key);
            }
        }

        let mut queue: VecDeque<SharedDelta> = self.parents.iter().cloned().collect();
        let mut visited: HashSet<usize> = HashSet::new();

        while let Some(node) = queue.pop_front() {
            if !visited.insert(ptr_of(&node)) {
                continue;
            }

            let guard = node.read();
            let found = {
                let backend = guard.backend.read();
                if forward {
                    backend.next(target)
                } else {
                    backend.prev(target)
                }
            };
            if let Some((key, _)) = found {
                if let Some(candidate) = better(&best, key) {
                    best = Some(candidate);
                }
            }
            queue.extend(guard.parents.iter().cloned());
        }

        best
    }
}

/// Create a child of `parent`. A null `id` inherits the parent's id; the
/// child's revision is the parent's plus one. When a `creator` is given, its
/// approval is recorded and propagated to every non-finalized ancestor.
pub fn make_child(
    parent: &SharedDelta,
    id: NodeId,
    creator: Option<(Account, ApprovalWeight, ApprovalWeight)>,
) -> SharedDelta {
    let (parent_id, parent_revision) = {
        let guard = parent.read();
        (guard.id(), guard.revision())
    };

    let backend_id = if id == NULL_ID { parent_id } else { id };

    let child = shared(StateDelta {
        parents: vec![parent.clone()],
        backend: shared_backend(MapBackend::with_metadata(backend_id, parent_revision + 1)),
        ..StateDelta::default()
    });

    if let Some((creator, weight, threshold)) = creator {
        {
            let mut guard = child.write();
            guard.approvals.insert(creator, weight);
            guard.approval_threshold = threshold;
        }
        propagate_approval(&child, creator, weight);
    }

    child
}

/// Create a delta with explicit parents (two or more for a merge). Parents
/// with conflicting histories are rejected. The creator's approval is
/// recorded on the new delta and propagated to every non-finalized ancestor.
pub fn create(
    id: NodeId,
    parents: Vec<SharedDelta>,
    creator: Account,
    creator_weight: ApprovalWeight,
    threshold: ApprovalWeight,
) -> Result<SharedDelta, StateError> {
    for i in 0..parents.len() {
        for j in (i + 1)..parents.len() {
            if has_conflict(&parents[i], &parents[j]) {
                return Err(StateError::ConflictingParents);
            }
        }
    }

    let mut backend = MapBackend::new();
    if id != NULL_ID {
        backend.set_id(id);
    }

    let node = shared(StateDelta {
        parents,
        backend: shared_backend(backend),
        ..StateDelta::default()
    });

    {
        let mut guard = node.write();
        guard.approvals.insert(creator, creator_weight);
        guard.approval_threshold = threshold;
    }
    propagate_approval(&node, creator, creator_weight);

    Ok(node)
}

/// A writable copy of a non-complete delta: same contents, same parents,
/// null id.
pub fn clone_delta(delta: &SharedDelta) -> SharedDelta {
    let guard = delta.read();
    assert!(!guard.complete, "cannot clone a complete state delta");

    let backend = guard.backend.read().shared_clone();
    backend.write().set_id(NULL_ID);

    shared(StateDelta {
        parents: guard.parents.clone(),
        backend,
        removed: guard.removed.clone(),
        ..StateDelta::default()
    })
}

/// Squash a single-parent delta into its parent. The delta's writes and
/// tombstones are absorbed; on return its local state is empty.
pub fn squash(delta: &SharedDelta) {
    let parent = {
        let guard = delta.read();
        assert!(
            !guard.parents.is_empty(),
            "cannot squash a state delta with no parents"
        );
        assert!(
            guard.parents.len() == 1,
            "cannot squash a state delta with more than one parent"
        );
        guard.parents[0].clone()
    };

    let mut child = delta.write();
    let mut parent_guard = parent.write();
    let parent_is_root = parent_guard.root();

    // A tombstone here masks a value visible through the parent: remove it
    // from the parent's backend and keep the tombstone unless the parent is
    // the root. A local write cancels any tombstone the parent holds.
    for key in std::mem::take(&mut child.removed) {
        parent_guard.backend.write().remove(&key);
        if !parent_is_root {
            parent_guard.removed.insert(key);
        }
    }

    for (key, value) in child.backend.write().drain() {
        if !parent_is_root {
            parent_guard.removed.remove(&key);
        }
        parent_guard.backend.write().put(key, value);
    }
}

/// Commit a delta to the root: every ancestor between this delta and the
/// root is merged into the root backend within one write batch, metadata is
/// stored, and this delta becomes the new root sharing that backend.
pub fn commit(delta: &SharedDelta) {
    assert!(!delta.read().root(), "cannot commit root");

    let (revision, id, merkle) = {
        let mut guard = delta.write();
        (guard.revision(), guard.id(), guard.merkle_root())
    };

    // Collect all non-root ancestors (self included), tracking the root.
    let mut node_stack: Vec<SharedDelta> = vec![delta.clone()];
    let mut visited: HashSet<usize> = HashSet::new();
    visited.insert(ptr_of(delta));
    let mut root: Option<SharedDelta> = None;

    let mut i = 0;
    while i < node_stack.len() {
        let parents = node_stack[i].read().parents.clone();
        for parent in parents {
            if parent.read().root() {
                if root.is_none() {
                    root = Some(parent);
                }
            } else if visited.insert(ptr_of(&parent)) {
                node_stack.push(parent);
            }
        }
        i += 1;
    }

    let root = match root {
        Some(root) => root,
        None => panic!("node not connected to root"),
    };

    let root_backend = root.read().backend.clone();
    root_backend.write().start_write_batch();

    // Deepest ancestors first, the committing delta last.
    while let Some(node) = node_stack.pop() {
        let mut guard = node.write();
        for key in &guard.removed {
            root_backend.write().remove(key);
        }
        let entries = guard.backend.write().drain();
        for (key, value) in entries {
            root_backend.write().put(key, value);
        }
    }

    {
        let mut backend = root_backend.write();
        backend.set_revision(revision);
        backend.set_id(id);
        backend.set_merkle_root(merkle);
        backend.store_metadata();
        backend.end_write_batch();
    }

    let mut guard = delta.write();
    guard.removed.clear();
    guard.backend = root_backend;
    guard.parents.clear();
}

/// All deltas reachable from `delta` through parent links, itself included.
fn ancestors(delta: &SharedDelta) -> Vec<SharedDelta> {
    let mut out: Vec<SharedDelta> = Vec::new();
    let mut visited: HashSet<usize> = HashSet::new();
    let mut queue: VecDeque<SharedDelta> = VecDeque::new();
    queue.push_back(delta.clone());

    while let Some(node) = queue.pop_front() {
        if !visited.insert(ptr_of(&node)) {
            continue;
        }
        queue.extend(node.read().parents.iter().cloned());
        out.push(node);
    }

    out
}

fn pair_conflicts(a: &SharedDelta, b: &SharedDelta) -> bool {
    let a_guard = a.read();
    let b_guard = b.read();
    let a_backend = a_guard.backend.read();
    let b_backend = b_guard.backend.read();

    // Write-write, in both directions.
    for (key, _) in a_backend.iter() {
        if b_backend.get(key).is_some() || b_guard.removed.contains(key) {
            return true;
        }
    }
    for key in &a_guard.removed {
        if b_backend.get(key).is_some() || b_guard.removed.contains(key) {
            return true;
        }
    }

    // Read-after-write, in both directions.
    for key in a_guard.read_keys.lock().iter() {
        if b_backend.get(key).is_some() || b_guard.removed.contains(key) {
            return true;
        }
    }
    for key in b_guard.read_keys.lock().iter() {
        if a_backend.get(key).is_some() || a_guard.removed.contains(key) {
            return true;
        }
    }

    false
}

/// Optimistic-concurrency validation between two deltas: compare every
/// ancestor outside the common history pairwise for write-write and
/// read-after-write overlaps.
pub fn has_conflict(a: &SharedDelta, b: &SharedDelta) -> bool {
    let a_ancestors = ancestors(a);
    let b_ancestors = ancestors(b);

    let a_ptrs: HashSet<usize> = a_ancestors.iter().map(ptr_of).collect();
    let common: HashSet<usize> = b_ancestors
        .iter()
        .map(ptr_of)
        .filter(|ptr| a_ptrs.contains(ptr))
        .collect();

    for a_node in a_ancestors.iter().filter(|n| !common.contains(&ptr_of(n))) {
        for b_node in b_ancestors.iter().filter(|n| !common.contains(&ptr_of(n))) {
            if pair_conflicts(a_node, b_node) {
                return true;
            }
        }
    }

    false
}

/// Record `(approver, weight)` on every non-finalized ancestor; re-insertion
/// for an existing approver never double-counts. Each ancestor whose total
/// reaches its threshold finalizes its own ancestors.
fn propagate_approval(node: &SharedDelta, approver: Account, weight: ApprovalWeight) {
    let mut queue: VecDeque<SharedDelta> = node.read().parents.iter().cloned().collect();
    let mut visited: HashSet<usize> = HashSet::new();

    while let Some(ancestor) = queue.pop_front() {
        if !visited.insert(ptr_of(&ancestor)) {
            continue;
        }

        // Approval insertion and the threshold transition form one critical
        // section per node.
        let (threshold_met, parents) = {
            let mut guard = ancestor.write();
            if guard.finalized {
                continue;
            }
            guard.approvals.entry(approver).or_insert(weight);
            let met = guard.total_approval() >= guard.approval_threshold;
            (met, guard.parents.clone())
        };

        if threshold_met {
            finalize_ancestors_of(&parents);
        }

        queue.extend(parents);
    }
}

/// Mark the parents of every node reachable from `start` as finalized
/// (the grandparents and above of the node whose threshold was crossed).
fn finalize_ancestors_of(start: &[SharedDelta]) {
    let mut queue: VecDeque<SharedDelta> = start.iter().cloned().collect();
    let mut visited: HashSet<usize> = HashSet::new();

    while let Some(node) = queue.pop_front() {
        if !visited.insert(ptr_of(&node)) {
            continue;
        }

        let (node_finalized, parents) = {
            let guard = node.read();
            (guard.finalized, guard.parents.clone())
        };

        for parent in &parents {
            let mut guard = parent.write();
            if !guard.finalized {
                guard.finalized = true;
            }
        }

        // Finalized nodes have finalized ancestors by induction.
        if !node_finalized {
            queue.extend(parents);
        }
    }
}
