use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use parking_lot::RwLock;
use rand::seq::IteratorRandom;

use crate::error::Result;

/// A keyed set store: the only persistence the registry needs.
///
/// Each operation is atomic on its own; the registry never relies on
/// multi-operation transactions.
#[async_trait]
pub trait RegistryStore: Send + Sync + 'static {
    /// Add `member` to the set at `key`. Returns `true` if it was not present.
    async fn set_add(&self, key: &str, member: &str) -> Result<bool>;

    /// One uniformly random member of the set at `key`, or `None` if the set
    /// is empty or absent.
    async fn set_random_member(&self, key: &str) -> Result<Option<String>>;

    /// Remove `member` from the set at `key`. Returns `true` if it was present.
    async fn set_remove(&self, key: &str, member: &str) -> Result<bool>;

    /// All members of the set at `key`, in lexical order.
    async fn set_members(&self, key: &str) -> Result<Vec<String>>;
}

/// In-process set store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    sets: RwLock<HashMap<String, BTreeSet<String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of non-empty keys.
    pub fn key_count(&self) -> usize {
        self.sets.read().len()
    }

    pub(crate) fn add(&self, key: &str, member: &str) -> bool {
        self.sets
            .write()
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string())
    }

    pub(crate) fn random_member(&self, key: &str) -> Option<String> {
        let sets = self.sets.read();
        let mut rng = rand::thread_rng();
        sets.get(key)?.iter().choose(&mut rng).cloned()
    }

    pub(crate) fn remove(&self, key: &str, member: &str) -> bool {
        let mut sets = self.sets.write();
        let Some(set) = sets.get_mut(key) else {
            return false;
        };
        let removed = set.remove(member);
        if set.is_empty() {
            sets.remove(key);
        }
        removed
    }

    pub(crate) fn members(&self, key: &str) -> Vec<String> {
        self.sets
            .read()
            .get(key)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl RegistryStore for MemoryStore {
    async fn set_add(&self, key: &str, member: &str) -> Result<bool> {
        Ok(self.add(key, member))
    }

    async fn set_random_member(&self, key: &str) -> Result<Option<String>> {
        Ok(self.random_member(key))
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<bool> {
        Ok(self.remove(key, member))
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>> {
        Ok(self.members(key))
    }
}
