//! Cyclic range scan over an ordered node set.
//!
//! Walks `[key..last]` and then `[first..key)`, stopping as soon as `count`
//! entries have been collected.

use std::collections::BTreeMap;

/// A bounded cyclic scan starting at `key`.
#[derive(Debug, Clone)]
pub struct RingQuery<K> {
    key: K,
    count: usize,
}

impl<K: Ord> RingQuery<K> {
    /// Create a query for up to `count` entries starting at `key` (inclusive).
    pub fn new(key: K, count: usize) -> Self {
        Self { key, count }
    }

    /// Maximum number of entries this query returns.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Run the scan against an ordered map.
    pub fn apply<'a, V>(&self, tree: &'a BTreeMap<K, V>) -> Vec<&'a V> {
        let mut values = Vec::with_capacity(self.count.min(tree.len()));
        if self.count == 0 {
            return values;
        }

        let tail = tree.range(&self.key..);
        let head = tree.range(..&self.key);

        for (_, value) in tail.chain(head) {
            values.push(value);
            if values.len() >= self.count {
                break;
            }
        }

        values
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree(keys: &[u32]) -> BTreeMap<u32, u32> {
        keys.iter().map(|&k| (k, k)).collect()
    }

    #[test]
    fn test_empty_tree() {
        let t = tree(&[]);
        assert!(RingQuery::new(5, 3).apply(&t).is_empty());
    }

    #[test]
    fn test_zero_count() {
        let t = tree(&[1, 2, 3]);
        assert!(RingQuery::new(1, 0).apply(&t).is_empty());
    }

    #[test]
    fn test_starts_at_key_inclusive() {
        let t = tree(&[10, 20, 30]);
        assert_eq!(RingQuery::new(20, 1).apply(&t), vec![&20]);
        assert_eq!(RingQuery::new(15, 1).apply(&t), vec![&20]);
    }

    #[test]
    fn test_wraps_around() {
        let t = tree(&[10, 20, 30]);
        assert_eq!(RingQuery::new(31, 1).apply(&t), vec![&10]);
        assert_eq!(RingQuery::new(25, 3).apply(&t), vec![&30, &10, &20]);
    }

    #[test]
    fn test_head_excludes_key() {
        let t = tree(&[10, 20, 30]);
        // 20 is visited in the tail half only, never twice.
        assert_eq!(RingQuery::new(20, 10).apply(&t), vec![&20, &30, &10]);
    }

    #[test]
    fn test_stops_in_tail() {
        let t = tree(&[10, 20, 30, 40]);
        assert_eq!(RingQuery::new(10, 2).apply(&t), vec![&10, &20]);
    }
}
