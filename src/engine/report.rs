use std::{collections::HashMap, hash::Hash};

/// Transition of a reported condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change<V> {
    /// The condition appeared or now has a different value.
    Raised(V),
    /// The condition went away, carrying the last reported value.
    Cleared(V),
}

/// Last reported condition per key, so a frame-by-frame condition is only
/// logged when it starts, changes or ends.
#[derive(Debug)]
pub struct ChangeReport<K, V> {
    last: HashMap<K, V>,
}

impl<K, V> Default for ChangeReport<K, V> {
    fn default() -> Self {
        Self {
            last: HashMap::new(),
        }
    }
}

impl<K: Eq + Hash, V: Clone + PartialEq> ChangeReport<K, V> {
    pub fn observe(&mut self, key: K, state: Option<V>) -> Option<Change<V>> {
        match state {
            Some(value) if self.last.get(&key) == Some(&value) => None,
            Some(value) => {
                self.last.insert(key, value.clone());
                Some(Change::Raised(value))
            }
            None => self.last.remove(&key).map(Change::Cleared),
        }
    }

    /// Forgets keys that no longer exist.
    pub fn retain(&mut self, mut keep: impl FnMut(&K) -> bool) {
        self.last.retain(|key, _| keep(key));
    }

    pub fn len(&self) -> usize {
        self.last.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last.is_empty()
    }
}
