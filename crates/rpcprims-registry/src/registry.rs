use std::fmt;
use std::sync::Arc;

use tracing::{debug, info};

use crate::error::{RegistryError, Result};
use crate::record::EndpointRecord;
use crate::remote::RemoteStore;
use crate::store::{MemoryStore, RegistryStore};

/// Maps interface names to the endpoints currently serving them.
///
/// Cheap to clone; clones share the same store.
#[derive(Clone)]
pub struct Registry {
    store: Arc<dyn RegistryStore>,
}

impl Registry {
    pub fn new(store: Arc<dyn RegistryStore>) -> Self {
        Self { store }
    }

    /// Registry over a fresh in-process store.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    /// Registry over a store daemon at `addr`, with default retry settings.
    pub fn remote(addr: impl Into<String>) -> Self {
        Self::new(Arc::new(RemoteStore::new(addr)))
    }

    pub fn store(&self) -> &Arc<dyn RegistryStore> {
        &self.store
    }

    /// Publish `record` under its interface name. Returns `false` if the same
    /// record was already registered.
    pub async fn register(&self, record: &EndpointRecord) -> Result<bool> {
        let member = record.to_member()?;
        let added = self.store.set_add(&record.interface_name, &member).await?;
        info!(
            interface = %record.interface_name,
            addr = %record.address(),
            implementation = %record.implementation_ref,
            added,
            "registered endpoint"
        );
        Ok(added)
    }

    /// Pick one provider of `interface_name` uniformly at random.
    pub async fn resolve(&self, interface_name: &str) -> Result<EndpointRecord> {
        let member = self
            .store
            .set_random_member(interface_name)
            .await?
            .ok_or_else(|| RegistryError::NotFound(interface_name.to_string()))?;
        let record = EndpointRecord::from_member(&member)?;
        debug!(interface = interface_name, addr = %record.address(), "resolved endpoint");
        Ok(record)
    }

    /// Withdraw `record`. Returns `false` if it was not registered.
    pub async fn unregister(&self, record: &EndpointRecord) -> Result<bool> {
        let member = record.to_member()?;
        let removed = self
            .store
            .set_remove(&record.interface_name, &member)
            .await?;
        info!(
            interface = %record.interface_name,
            addr = %record.address(),
            removed,
            "unregistered endpoint"
        );
        Ok(removed)
    }

    /// Every registered provider of `interface_name`.
    pub async fn providers(&self, interface_name: &str) -> Result<Vec<EndpointRecord>> {
        self.store
            .set_members(interface_name)
            .await?
            .iter()
            .map(|member| EndpointRecord::from_member(member))
            .collect()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry").finish_non_exhaustive()
    }
}
