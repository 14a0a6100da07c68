use std::collections::HashMap;

use crate::chord::id::{in_circular_interval, Identifier, IdentifierSpace};
use crate::chord::types::{Key, Value};

/// Flat key-value map held by one node.
///
/// It does not check ownership itself; callers route requests by looking up the
/// successor of the key's hash first.
#[derive(Debug, Default)]
pub struct KeyStore {
    data: HashMap<Key, Value>,
}

impl KeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &Key) -> Option<&Value> {
        self.data.get(key)
    }

    /// Upsert. Returns the previous value, if any.
    pub fn put(&mut self, key: Key, value: Value) -> Option<Value> {
        self.data.insert(key, value)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Removes and returns every pair whose key hashes into `(start, end]`.
    pub fn drain_range(
        &mut self,
        space: &IdentifierSpace,
        start: &Identifier,
        end: &Identifier,
    ) -> Vec<(Key, Value)> {
        let moving: Vec<Key> = self
            .data
            .keys()
            .filter(|key| in_circular_interval(&space.hash(&key.0), start, end))
            .cloned()
            .collect();
        moving
            .into_iter()
            .filter_map(|key| self.data.remove_entry(&key))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_get() {
        let mut store = KeyStore::new();
        assert!(store.get(&Key::from("apple")).is_none());
        assert!(store.put(Key::from("apple"), Value::from("red")).is_none());
        assert_eq!(
            store.put(Key::from("apple"), Value::from("green")),
            Some(Value::from("red"))
        );
        assert_eq!(store.get(&Key::from("apple")), Some(&Value::from("green")));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn drain_range_moves_only_matching_keys() {
        let space = IdentifierSpace::new(6).unwrap();
        let mut store = KeyStore::new();
        // apple=27 banana=14 cherry=46 durian=60
        for key in ["apple", "banana", "cherry", "durian"] {
            store.put(Key::from(key), Value::from(key));
        }

        let mut moved: Vec<Key> = store
            .drain_range(&space, &space.identifier(10), &space.identifier(27))
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        moved.sort_by(|a, b| a.0.cmp(&b.0));
        assert_eq!(moved, vec![Key::from("apple"), Key::from("banana")]);
        assert_eq!(store.len(), 2);

        // Wrapping range
        let moved = store.drain_range(&space, &space.identifier(50), &space.identifier(5));
        assert_eq!(moved, vec![(Key::from("durian"), Value::from("durian"))]);
        assert!(store.get(&Key::from("cherry")).is_some());
    }
}
