//! Recency Index Module
//!
//! Orders cache keys from least to most recently used for LRU eviction.

use std::collections::HashMap;

use crate::error::{CacheError, Result};

/// Null link in the arena-backed list.
const NIL: usize = usize::MAX;

#[derive(Debug)]
struct Node {
    key: String,
    /// Toward the newest end
    newer: usize,
    /// Toward the oldest end
    older: usize,
}

// == Recency Index ==
/// Ordered set of keys supporting O(1) touch, insert, remove and evict.
///
/// Nodes live in a `Vec` arena linked by index, with a `HashMap` from key to
/// slot. Freed slots are recycled through a free list threaded on `older`.
/// - `newest` = most recently used
/// - `oldest` = least recently used, next to evict
#[derive(Debug)]
pub struct RecencyIndex {
    slots: HashMap<String, usize>,
    arena: Vec<Node>,
    newest: usize,
    oldest: usize,
    free: usize,
}

impl Default for RecencyIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl RecencyIndex {
    // == Constructor ==
    /// Creates a new empty index.
    pub fn new() -> Self {
        Self {
            slots: HashMap::new(),
            arena: Vec::new(),
            newest: NIL,
            oldest: NIL,
            free: NIL,
        }
    }

    // == Contains ==
    /// Checks if a key is tracked.
    pub fn contains(&self, key: &str) -> bool {
        self.slots.contains_key(key)
    }

    // == Touch ==
    /// Moves an existing key to the newest position.
    ///
    /// Returns false (and changes nothing) if the key is not tracked.
    pub fn touch(&mut self, key: &str) -> bool {
        let Some(&idx) = self.slots.get(key) else {
            return false;
        };
        if idx != self.newest {
            self.unlink(idx);
            self.link_newest(idx);
        }
        true
    }

    // == Insert ==
    /// Places a new key at the newest position.
    ///
    /// Returns false (and changes nothing) if the key is already tracked.
    pub fn insert(&mut self, key: &str) -> bool {
        if self.slots.contains_key(key) {
            return false;
        }
        let idx = self.alloc(key.to_string());
        self.link_newest(idx);
        self.slots.insert(key.to_string(), idx);
        true
    }

    // == Remove ==
    /// Removes a key from any position.
    ///
    /// Returns false if the key was not tracked.
    pub fn remove(&mut self, key: &str) -> bool {
        match self.slots.remove(key) {
            Some(idx) => {
                self.unlink(idx);
                self.release(idx);
                true
            }
            None => false,
        }
    }

    // == Evict Oldest ==
    /// Removes and returns the least recently used key.
    pub fn evict_oldest(&mut self) -> Result<String> {
        if self.oldest == NIL {
            return Err(CacheError::EmptyIndex);
        }
        let idx = self.oldest;
        self.unlink(idx);
        let key = self.release(idx);
        self.slots.remove(&key);
        Ok(key)
    }

    // == Peek Oldest ==
    /// Returns the least recently used key without removing it.
    pub fn peek_oldest(&self) -> Option<&str> {
        (self.oldest != NIL).then(|| self.arena[self.oldest].key.as_str())
    }

    // == Length ==
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    // == Iter ==
    /// Iterates keys from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &str> + '_ {
        let mut cursor = self.oldest;
        std::iter::from_fn(move || {
            if cursor == NIL {
                return None;
            }
            let node = &self.arena[cursor];
            cursor = node.newer;
            Some(node.key.as_str())
        })
    }

    fn alloc(&mut self, key: String) -> usize {
        let node = Node {
            key,
            newer: NIL,
            older: NIL,
        };
        if self.free == NIL {
            self.arena.push(node);
            self.arena.len() - 1
        } else {
            let idx = self.free;
            self.free = self.arena[idx].older;
            self.arena[idx] = node;
            idx
        }
    }

    /// Returns the slot to the free list, handing back its key.
    fn release(&mut self, idx: usize) -> String {
        let key = std::mem::take(&mut self.arena[idx].key);
        self.arena[idx].newer = NIL;
        self.arena[idx].older = self.free;
        self.free = idx;
        key
    }

    fn link_newest(&mut self, idx: usize) {
        self.arena[idx].newer = NIL;
        self.arena[idx].older = self.newest;
        if self.newest != NIL {
            self.arena[self.newest].newer = idx;
        }
        self.newest = idx;
        if self.oldest == NIL {
            self.oldest = idx;
        }
    }

    fn unlink(&mut self, idx: usize) {
        let Node { newer, older, .. } = self.arena[idx];
        if newer == NIL {
            self.newest = older;
        } else {
            self.arena[newer].older = older;
        }
        if older == NIL {
            self.oldest = newer;
        } else {
            self.arena[older].newer = newer;
        }
        self.arena[idx].newer = NIL;
        self.arena[idx].older = NIL;
    }
}
