//! State-node facades over deltas.
//!
//! A [`PermanentStateNode`] is registered in the delta index and can be
//! finalized and committed; a [`TemporaryStateNode`] has no id of its own
//! and can only be squashed back into its parent. Both read and write
//! through [`ObjectSpace`] compound keys.

use crate::delta::{self, SharedDelta};
use crate::index::DeltaIndex;
use crate::space::{ObjectSpace, SPACE_LEN};
use crate::{NodeId, NULL_ID};
use meridian_crypto::Digest;
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::Weak;

/// Shared behavior of permanent and temporary nodes.
pub trait StateNode {
    /// The underlying delta.
    fn delta(&self) -> &SharedDelta;

    /// Fetch an object if one exists.
    fn get(&self, space: &ObjectSpace, key: &[u8]) -> Option<Vec<u8>> {
        self.delta().read().get(&space.compound_key(key))
    }

    /// The next object after `key` within `space`, as `(key, value)` with
    /// the space prefix stripped.
    fn next(&self, space: &ObjectSpace, key: &[u8]) -> Option<(Vec<u8>, Vec<u8>)> {
        let (compound, value) = self.delta().read().next(&space.compound_key(key))?;
        in_space(space, compound).map(|key| (key, value))
    }

    /// The previous object before `key` within `space`.
    fn prev(&self, space: &ObjectSpace, key: &[u8]) -> Option<(Vec<u8>, Vec<u8>)> {
        let (compound, value) = self.delta().read().prev(&space.compound_key(key))?;
        in_space(space, compound).map(|key| (key, value))
    }

    /// Write an object. Returns the signed size delta for metering.
    fn put(&self, space: &ObjectSpace, key: &[u8], value: &[u8]) -> i64 {
        self.delta().write().put(space.compound_key(key), value)
    }

    /// Remove an object. Returns the signed size delta for metering.
    fn remove(&self, space: &ObjectSpace, key: &[u8]) -> i64 {
        self.delta().write().remove(space.compound_key(key))
    }

    /// This node's id.
    fn id(&self) -> NodeId {
        self.delta().read().id()
    }

    /// This node's revision.
    fn revision(&self) -> u64 {
        self.delta().read().revision()
    }

    /// A temporary child of this node.
    fn make_child(&self) -> TemporaryStateNode {
        TemporaryStateNode {
            delta: delta::make_child(self.delta(), NULL_ID, None),
        }
    }
}

fn in_space(space: &ObjectSpace, compound: Vec<u8>) -> Option<Vec<u8>> {
    let prefix = space.to_bytes();
    if compound.len() >= SPACE_LEN && compound[..SPACE_LEN] == prefix {
        Some(compound[SPACE_LEN..].to_vec())
    } else {
        None
    }
}

/// A node registered in the delta index.
#[derive(Clone)]
pub struct PermanentStateNode {
    delta: SharedDelta,
    index: Weak<RwLock<DeltaIndex>>,
}

impl PermanentStateNode {
    pub(crate) fn new(delta: SharedDelta, index: Weak<RwLock<DeltaIndex>>) -> Self {
        Self { delta, index }
    }

    fn with_index<R>(&self, f: impl FnOnce(&mut DeltaIndex) -> R) -> R {
        let index = self
            .index
            .upgrade()
            .unwrap_or_else(|| panic!("state database is not open"));
        let mut guard = index.write();
        f(&mut guard)
    }

    /// The first parent's id, or the null id for the root.
    pub fn parent_id(&self) -> NodeId {
        self.delta.read().parent_id()
    }

    /// Whether this node has been finalized.
    pub fn is_final(&self) -> bool {
        self.delta.read().finalized()
    }

    /// Finalize this node: no further writes, and the head may move here.
    pub fn finalize(&self) {
        self.delta.write().finalize();
        self.with_index(|index| index.finalize(&self.delta));
    }

    /// The Merkle root over this node's writes and tombstones. The node
    /// must be final.
    pub fn merkle_root(&self) -> Digest {
        assert!(
            self.is_final(),
            "node must be finalized to calculate merkle root"
        );
        self.delta.write().merkle_root()
    }

    /// Discard this node and its descendants from the index.
    pub fn discard(&self) {
        let id = self.id();
        self.with_index(|index| index.remove(&id, &HashSet::new()));
    }

    /// Commit this node, making it the new root.
    pub fn commit(&self) {
        self.with_index(|index| index.commit(&self.delta));
    }

    /// A permanent child under `child_id`. Requires this node to be final;
    /// returns `None` otherwise, or when the id is already taken.
    pub fn make_permanent_child(&self, child_id: NodeId) -> Option<PermanentStateNode> {
        if !self.is_final() {
            return None;
        }

        let child = delta::make_child(&self.delta, child_id, None);
        let added = self.with_index(|index| index.add(child.clone()));
        match added {
            Ok(()) => Some(PermanentStateNode {
                delta: child,
                index: self.index.clone(),
            }),
            Err(_) => None,
        }
    }

    /// A writable permanent copy of this (non-final) node under a new id,
    /// sharing contents and parent.
    pub fn clone_node(&self, new_id: NodeId) -> Option<PermanentStateNode> {
        assert!(!self.is_final(), "cannot clone a finalized node");

        let copy = delta::clone_delta(&self.delta);
        copy.write().set_id(new_id);
        let added = self.with_index(|index| index.add(copy.clone()));
        match added {
            Ok(()) => Some(PermanentStateNode {
                delta: copy,
                index: self.index.clone(),
            }),
            Err(_) => None,
        }
    }
}

impl StateNode for PermanentStateNode {
    fn delta(&self) -> &SharedDelta {
        &self.delta
    }
}

/// A transient node: no id, not indexed, squash-only.
pub struct TemporaryStateNode {
    delta: SharedDelta,
}

impl TemporaryStateNode {
    /// Squash this node's writes and tombstones into its parent. The parent
    /// must not be finalized.
    pub fn squash(self) {
        let parent = self
            .delta
            .read()
            .parent()
            .unwrap_or_else(|| panic!("cannot squash a state delta with no parents"));
        assert!(
            !parent.read().finalized(),
            "cannot squash into a finalized node"
        );
        delta::squash(&self.delta);
    }
}

impl StateNode for TemporaryStateNode {
    fn delta(&self) -> &SharedDelta {
        &self.delta
    }
}
