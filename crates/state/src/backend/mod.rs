//! Ordered key-value backends underlying state deltas.

mod map;

pub use map::MapBackend;

use crate::NodeId;
use meridian_crypto::Digest;
use parking_lot::RwLock;
use std::sync::Arc;

/// A backend handle shared between deltas; commit re-points a delta at the
/// root's backend.
pub type SharedBackend = Arc<RwLock<dyn Backend>>;

/// An ordered mapping from byte-string keys to byte-string values with
/// revision/id/merkle metadata.
///
/// Absence is reported by returning `None`, never by erroring. Size deltas
/// returned by [`put`](Backend::put) and [`remove`](Backend::remove) count
/// key and value bytes and feed the resource meter.
pub trait Backend: Send + Sync {
    /// The value stored under `key`, if any.
    fn get(&self, key: &[u8]) -> Option<Vec<u8>>;

    /// Store `value` under `key`. Returns the signed size delta relative to
    /// any value previously stored under the same key.
    fn put(&mut self, key: Vec<u8>, value: Vec<u8>) -> i64;

    /// Remove `key`. Returns the (non-positive) size delta; zero if absent.
    fn remove(&mut self, key: &[u8]) -> i64;

    /// The first entry with a key strictly greater than `key`.
    fn next(&self, key: &[u8]) -> Option<(Vec<u8>, Vec<u8>)>;

    /// The last entry with a key strictly less than `key`.
    fn prev(&self, key: &[u8]) -> Option<(Vec<u8>, Vec<u8>)>;

    /// Iterate entries in lexicographic key order.
    fn iter<'a>(&'a self) -> Box<dyn Iterator<Item = (&'a [u8], &'a [u8])> + 'a>;

    /// Remove and return every entry, in lexicographic key order.
    fn drain(&mut self) -> Vec<(Vec<u8>, Vec<u8>)>;

    /// An independent copy of this backend, entries and metadata included.
    fn shared_clone(&self) -> SharedBackend;

    /// Number of stored entries.
    fn len(&self) -> usize;

    /// Whether no entries are stored.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry and reset metadata; used when wiping state.
    fn clear(&mut self);

    /// The revision this backend represents.
    fn revision(&self) -> u64;

    /// Set the revision.
    fn set_revision(&mut self, revision: u64);

    /// The node id this backend represents.
    fn id(&self) -> NodeId;

    /// Set the node id.
    fn set_id(&mut self, id: NodeId);

    /// The merkle root recorded for this backend.
    fn merkle_root(&self) -> Digest;

    /// Set the recorded merkle root.
    fn set_merkle_root(&mut self, root: Digest);

    /// Persist revision/id/merkle metadata. A no-op for volatile backends.
    fn store_metadata(&mut self) {}

    /// Begin an atomic write batch. A no-op for volatile backends.
    fn start_write_batch(&mut self) {}

    /// End an atomic write batch. A no-op for volatile backends.
    fn end_write_batch(&mut self) {}
}
