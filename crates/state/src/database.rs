//! Owner of the delta index, dispensing state-node handles.

use crate::delta::StateDelta;
use crate::index::{DeltaIndex, ForkResolutionAlgorithm};
use crate::node::PermanentStateNode;
use crate::NodeId;
use meridian_types::Error;
use parking_lot::RwLock;
use std::path::PathBuf;
use std::sync::{Arc, Weak};

/// Initializes genesis state on a fresh root node.
pub type GenesisInit = Arc<dyn Fn(&PermanentStateNode) -> Result<(), Error> + Send + Sync>;

/// The state database: owns the [`DeltaIndex`] and hands out node facades.
pub struct Database {
    index: Arc<RwLock<DeltaIndex>>,
    init: GenesisInit,
    algorithm: ForkResolutionAlgorithm,
    path: Option<PathBuf>,
}

impl Database {
    /// Open a database. A fresh (revision-zero) root runs the genesis
    /// initializer, then the root is sealed and becomes head.
    ///
    /// `path` is the anchor for persistent backends; the in-memory backend
    /// ignores it.
    pub fn open(
        init: GenesisInit,
        algorithm: ForkResolutionAlgorithm,
        path: Option<PathBuf>,
    ) -> Result<Self, Error> {
        let index = Arc::new(RwLock::new(DeltaIndex::new(algorithm.comparator())));
        let database = Self {
            index,
            init,
            algorithm,
            path,
        };
        database.bootstrap()?;
        Ok(database)
    }

    fn bootstrap(&self) -> Result<(), Error> {
        let root = StateDelta::new_root();

        if root.read().revision() == 0 {
            let node = self.wrap(root.clone());
            (self.init)(&node)?;
        }

        root.write().finalize();
        self.index.write().install_root(root);
        tracing::debug!(target: "state", algorithm = ?self.algorithm, "state database opened");
        Ok(())
    }

    fn wrap(&self, delta: crate::delta::SharedDelta) -> PermanentStateNode {
        PermanentStateNode::new(delta, self.weak_index())
    }

    pub(crate) fn weak_index(&self) -> Weak<RwLock<DeltaIndex>> {
        Arc::downgrade(&self.index)
    }

    /// Close the database, dropping every delta.
    pub fn close(&mut self) {
        self.index.write().clear();
    }

    /// Whether the database is open.
    pub fn is_open(&self) -> bool {
        self.index.read().is_open()
    }

    /// Wipe all state and reopen from genesis.
    pub fn reset(&mut self) -> Result<(), Error> {
        {
            let index = self.index.read();
            assert!(index.is_open(), "state database is not open");
            index.root().write().clear();
        }
        self.index.write().clear();
        self.bootstrap()
    }

    /// The current head node.
    pub fn head(&self) -> PermanentStateNode {
        let delta = self.index.read().head();
        self.wrap(delta)
    }

    /// The current root node.
    pub fn root(&self) -> PermanentStateNode {
        let delta = self.index.read().root();
        self.wrap(delta)
    }

    /// All fork heads.
    pub fn fork_heads(&self) -> Vec<PermanentStateNode> {
        self.index
            .read()
            .fork_heads()
            .into_iter()
            .map(|delta| self.wrap(delta))
            .collect()
    }

    /// The node with the given id, if live.
    pub fn get(&self, id: &NodeId) -> Option<PermanentStateNode> {
        self.index.read().get(id).map(|delta| self.wrap(delta))
    }

    /// The node at `revision` on the path from `tip_id` to the root.
    pub fn at_revision(&self, revision: u64, tip_id: &NodeId) -> PermanentStateNode {
        let delta = self.index.read().at_revision(revision, tip_id);
        self.wrap(delta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::StateNode;
    use crate::space::ObjectSpace;
    use crate::NULL_ID;

    fn test_space() -> ObjectSpace {
        ObjectSpace::system(0)
    }

    fn open_with_genesis() -> Database {
        let init: GenesisInit = Arc::new(|root| {
            root.put(&test_space(), b"genesis", b"value");
            Ok(())
        });
        Database::open(init, ForkResolutionAlgorithm::Fifo, None).unwrap()
    }

    #[test]
    fn open_runs_genesis_and_seals_the_root() {
        let db = open_with_genesis();
        assert!(db.is_open());

        let root = db.root();
        assert!(root.is_final());
        assert_eq!(root.get(&test_space(), b"genesis"), Some(b"value".to_vec()));
        assert_eq!(root.revision(), 0);
        assert_eq!(db.head().id(), root.id());
    }

    #[test]
    fn make_child_requires_final_parent() {
        let db = open_with_genesis();

        let child = db.head().make_permanent_child([1u8; 32]).unwrap();
        assert!(!child.is_final());
        assert_eq!(child.revision(), 1);

        // A non-final node cannot have permanent children.
        assert!(child.make_permanent_child([2u8; 32]).is_none());

        child.put(&test_space(), b"k", b"v");
        child.finalize();
        assert!(child.make_permanent_child([2u8; 32]).is_some());
    }

    #[test]
    fn duplicate_child_id_is_rejected() {
        let db = open_with_genesis();
        let head = db.head();
        assert!(head.make_permanent_child([1u8; 32]).is_some());
        assert!(head.make_permanent_child([1u8; 32]).is_none());
    }

    #[test]
    fn finalize_advances_head() {
        let db = open_with_genesis();

        let child = db.head().make_permanent_child([1u8; 32]).unwrap();
        assert_eq!(db.head().id(), db.root().id());

        child.finalize();
        assert_eq!(db.head().id(), [1u8; 32]);
    }

    #[test]
    fn fifo_keeps_the_first_head() {
        let db = open_with_genesis();
        let root = db.head();

        let first = root.make_permanent_child([1u8; 32]).unwrap();
        first.finalize();

        let second = root.make_permanent_child([2u8; 32]).unwrap();
        second.finalize();

        assert_eq!(db.head().id(), [1u8; 32]);
        // Both forks stay live.
        assert!(db.get(&[2u8; 32]).is_some());
    }

    #[test]
    fn at_revision_walks_the_chain() {
        let db = open_with_genesis();

        let c1 = db.head().make_permanent_child([1u8; 32]).unwrap();
        c1.finalize();
        let c2 = c1.make_permanent_child([2u8; 32]).unwrap();
        c2.finalize();

        assert_eq!(db.at_revision(0, &[2u8; 32]).id(), db.root().id());
        assert_eq!(db.at_revision(1, &[2u8; 32]).id(), [1u8; 32]);
        assert_eq!(db.at_revision(2, &[2u8; 32]).id(), [2u8; 32]);
    }

    #[test]
    fn commit_prunes_abandoned_forks() {
        let db = open_with_genesis();
        let root = db.root();

        let keep1 = root.make_permanent_child([1u8; 32]).unwrap();
        keep1.put(&test_space(), b"k1", b"v1");
        keep1.finalize();

        let drop1 = root.make_permanent_child([0xdd; 32]).unwrap();
        drop1.put(&test_space(), b"dropped", b"x");
        drop1.finalize();

        let keep2 = keep1.make_permanent_child([2u8; 32]).unwrap();
        keep2.put(&test_space(), b"k2", b"v2");
        keep2.finalize();

        keep1.commit();

        let new_root = db.root();
        assert_eq!(new_root.id(), [1u8; 32]);
        assert_eq!(new_root.get(&test_space(), b"genesis"), Some(b"value".to_vec()));
        assert_eq!(new_root.get(&test_space(), b"k1"), Some(b"v1".to_vec()));
        assert_eq!(new_root.get(&test_space(), b"dropped"), None);

        // The abandoned fork is gone, the descendant survives.
        assert!(db.get(&[0xdd; 32]).is_none());
        assert!(db.get(&[2u8; 32]).is_some());
        assert_eq!(db.head().get(&test_space(), b"k2"), Some(b"v2".to_vec()));
    }

    #[test]
    fn discard_removes_subtree() {
        let db = open_with_genesis();
        let root = db.root();

        let keep = root.make_permanent_child([1u8; 32]).unwrap();
        keep.finalize();

        let gone = root.make_permanent_child([2u8; 32]).unwrap();
        let gone_child = crate::delta::make_child(gone.delta(), [3u8; 32], None);
        db.index.write().add(gone_child).unwrap();

        gone.discard();
        assert!(db.get(&[2u8; 32]).is_none());
        assert!(db.get(&[3u8; 32]).is_none());
        assert!(db.get(&[1u8; 32]).is_some());
    }

    #[test]
    fn reset_restores_genesis() {
        let mut db = open_with_genesis();

        let child = db.head().make_permanent_child([1u8; 32]).unwrap();
        child.put(&test_space(), b"k", b"v");
        child.finalize();
        assert_eq!(db.head().id(), [1u8; 32]);

        db.reset().unwrap();
        assert_eq!(db.head().id(), NULL_ID);
        assert_eq!(db.head().get(&test_space(), b"k"), None);
        assert_eq!(
            db.head().get(&test_space(), b"genesis"),
            Some(b"value".to_vec())
        );
    }

    #[test]
    fn temporary_child_squashes_back() {
        let db = open_with_genesis();
        let child = db.head().make_permanent_child([1u8; 32]).unwrap();

        let temporary = child.make_child();
        temporary.put(&test_space(), b"k", b"v");
        assert_eq!(child.get(&test_space(), b"k"), None);

        temporary.squash();
        assert_eq!(child.get(&test_space(), b"k"), Some(b"v".to_vec()));
    }
}
