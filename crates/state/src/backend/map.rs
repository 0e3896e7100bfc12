use super::Backend;
use crate::{NodeId, NULL_ID};
use meridian_crypto::Digest;
use std::collections::BTreeMap;
use std::ops::Bound::{Excluded, Unbounded};

/// The in-memory backend: a `BTreeMap` plus volatile metadata.
#[derive(Debug, Default, Clone)]
pub struct MapBackend {
    map: BTreeMap<Vec<u8>, Vec<u8>>,
    revision: u64,
    id: NodeId,
    merkle_root: Digest,
}

impl MapBackend {
    /// An empty backend at revision zero with the null id.
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty backend carrying the given id and revision.
    pub fn with_metadata(id: NodeId, revision: u64) -> Self {
        Self {
            map: BTreeMap::new(),
            revision,
            id,
            merkle_root: Digest::default(),
        }
    }
}

impl Backend for MapBackend {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.map.get(key).cloned()
    }

    fn put(&mut self, key: Vec<u8>, value: Vec<u8>) -> i64 {
        let key_len = key.len() as i64;
        let value_len = value.len() as i64;
        match self.map.insert(key, value) {
            Some(previous) => value_len - previous.len() as i64,
            None => key_len + value_len,
        }
    }

    fn remove(&mut self, key: &[u8]) -> i64 {
        match self.map.remove(key) {
            Some(value) => -(key.len() as i64 + value.len() as i64),
            None => 0,
        }
    }

    fn next(&self, key: &[u8]) -> Option<(Vec<u8>, Vec<u8>)> {
        self.map
            .range::<[u8], _>((Excluded(key), Unbounded))
            .next()
            .map(|(k, v)| (k.clone(), v.clone()))
    }

    fn prev(&self, key: &[u8]) -> Option<(Vec<u8>, Vec<u8>)> {
        self.map
            .range::<[u8], _>((Unbounded, Excluded(key)))
            .next_back()
            .map(|(k, v)| (k.clone(), v.clone()))
    }

    fn iter<'a>(&'a self) -> Box<dyn Iterator<Item = (&'a [u8], &'a [u8])> + 'a> {
        Box::new(self.map.iter().map(|(k, v)| (k.as_slice(), v.as_slice())))
    }

    fn drain(&mut self) -> Vec<(Vec<u8>, Vec<u8>)> {
        std::mem::take(&mut self.map).into_iter().collect()
    }

    fn shared_clone(&self) -> super::SharedBackend {
        std::sync::Arc::new(parking_lot::RwLock::new(self.clone()))
    }

    fn len(&self) -> usize {
        self.map.len()
    }

    fn clear(&mut self) {
        self.map.clear();
        self.revision = 0;
        self.id = NULL_ID;
        self.merkle_root = Digest::default();
    }

    fn revision(&self) -> u64 {
        self.revision
    }

    fn set_revision(&mut self, revision: u64) {
        self.revision = revision;
    }

    fn id(&self) -> NodeId {
        self.id
    }

    fn set_id(&mut self, id: NodeId) {
        self.id = id;
    }

    fn merkle_root(&self) -> Digest {
        self.merkle_root
    }

    fn set_merkle_root(&mut self, root: Digest) {
        self.merkle_root = root;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn b(bytes: &[u8]) -> Vec<u8> {
        bytes.to_vec()
    }

    #[test]
    fn crud_and_size_deltas() {
        let mut backend = MapBackend::new();
        assert!(backend.is_empty());
        assert_eq!(backend.get(b"k1".as_slice()), None);

        assert_eq!(backend.put(b(b"k1"), b(b"value")), 7);
        assert_eq!(backend.get(b"k1"), Some(b(b"value")));
        assert_eq!(backend.len(), 1);

        // Overwriting with a shorter value shrinks.
        assert_eq!(backend.put(b(b"k1"), b(b"v")), -4);
        assert_eq!(backend.get(b"k1"), Some(b(b"v")));

        assert_eq!(backend.remove(b"k1"), -3);
        assert_eq!(backend.remove(b"k1"), 0);
        assert!(backend.is_empty());
    }

    #[test]
    fn ordered_iteration() {
        let mut backend = MapBackend::new();
        backend.put(b(b"b"), b(b"2"));
        backend.put(b(b"a"), b(b"1"));
        backend.put(b(b"c"), b(b"3"));

        let keys: Vec<&[u8]> = backend.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec![b"a".as_slice(), b"b", b"c"]);
    }

    #[test]
    fn next_and_prev_are_strict() {
        let mut backend = MapBackend::new();
        backend.put(b(b"a"), b(b"1"));
        backend.put(b(b"b"), b(b"2"));
        backend.put(b(b"c"), b(b"3"));

        assert_eq!(backend.next(b"a"), Some((b(b"b"), b(b"2"))));
        assert_eq!(backend.next(b""), Some((b(b"a"), b(b"1"))));
        assert_eq!(backend.next(b"c"), None);

        assert_eq!(backend.prev(b"c"), Some((b(b"b"), b(b"2"))));
        assert_eq!(backend.prev(b"a"), None);
    }

    #[test]
    fn drain_empties_in_order() {
        let mut backend = MapBackend::new();
        backend.put(b(b"z"), b(b"26"));
        backend.put(b(b"a"), b(b"1"));

        let drained = backend.drain();
        assert_eq!(drained, vec![(b(b"a"), b(b"1")), (b(b"z"), b(b"26"))]);
        assert!(backend.is_empty());
    }

    #[test]
    fn metadata_roundtrip() {
        let mut backend = MapBackend::with_metadata([1u8; 32], 7);
        assert_eq!(backend.revision(), 7);
        assert_eq!(backend.id(), [1u8; 32]);

        backend.set_revision(8);
        backend.set_merkle_root([2u8; 32]);
        backend.store_metadata();
        assert_eq!(backend.revision(), 8);
        assert_eq!(backend.merkle_root(), [2u8; 32]);
    }
}
