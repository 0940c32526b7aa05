// ============================================================================
// Storage Tree Abstraction
// ============================================================================
//
// The engine persists into a host-provided ordered key/value tree. The host
// owns batching, versioning and crash recovery; the engine only needs point
// reads, point writes and bounded ascending range scans.

use std::collections::BTreeMap;
use std::ops::Bound;

use parking_lot::RwLock;

/// Ordered byte-keyed store the engine reads from and commits into.
pub trait Tree: Send + Sync {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>>;

    fn set(&self, key: &[u8], value: Vec<u8>);

    fn remove(&self, key: &[u8]);

    /// Ascending scan over `[start, end)`, returning at most `limit`
    /// entries.
    fn range(&self, start: &[u8], end: &[u8], limit: usize) -> Vec<(Vec<u8>, Vec<u8>)>;
}

/// In-memory tree over a `BTreeMap`. Reference implementation for tests
/// and for hosts that snapshot externally.
#[derive(Default)]
pub struct MemTree {
    map: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.map.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.read().is_empty()
    }

    /// Deep copy of the current contents. Used by tests to compare the
    /// store before and after a commit/reload cycle.
    pub fn snapshot(&self) -> MemTree {
        MemTree {
            map: RwLock::new(self.map.read().clone()),
        }
    }
}

impl Tree for MemTree {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.map.read().get(key).cloned()
    }

    fn set(&self, key: &[u8], value: Vec<u8>) {
        self.map.write().insert(key.to_vec(), value);
    }

    fn remove(&self, key: &[u8]) {
        self.map.write().remove(key);
    }

    fn range(&self, start: &[u8], end: &[u8], limit: usize) -> Vec<(Vec<u8>, Vec<u8>)> {
        self.map
            .read()
            .range::<[u8], _>((Bound::Included(start), Bound::Excluded(end)))
            .take(limit)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_operations() {
        let tree = MemTree::new();
        assert!(tree.get(b"a").is_none());
        tree.set(b"a", vec![1]);
        assert_eq!(tree.get(b"a"), Some(vec![1]));
        tree.remove(b"a");
        assert!(tree.get(b"a").is_none());
    }

    #[test]
    fn test_range_is_bounded_and_ordered() {
        let tree = MemTree::new();
        for i in 0u8..10 {
            tree.set(&[i], vec![i]);
        }
        let page = tree.range(&[2], &[8], 3);
        assert_eq!(page.len(), 3);
        assert_eq!(page[0].0, vec![2]);
        assert_eq!(page[2].0, vec![4]);

        // End bound is exclusive.
        let tail = tree.range(&[7], &[8], 10);
        assert_eq!(tail.len(), 1);
    }

    #[test]
    fn test_snapshot_is_independent() {
        let tree = MemTree::new();
        tree.set(b"k", vec![1]);
        let snap = tree.snapshot();
        tree.set(b"k", vec![2]);
        assert_eq!(snap.get(b"k"), Some(vec![1]));
    }
}
