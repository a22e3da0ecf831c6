//! Per-tenant lookup of reference stores.

use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

use tracing::debug;

use super::MemoryVolumeStore;

/// Hands out one [`MemoryVolumeStore`] per tenant, creating it on first use.
#[derive(Debug)]
pub struct StoreRegistry {
    default_location: String,
    stores: Mutex<BTreeMap<String, MemoryVolumeStore>>,
}

impl StoreRegistry {
    /// Creates an empty registry whose stores default to `default_location`.
    #[must_use]
    pub fn new(default_location: impl Into<String>) -> Self {
        Self {
            default_location: default_location.into(),
            stores: Mutex::new(BTreeMap::new()),
        }
    }

    /// Returns the store for `tenant`, creating an empty one if needed.
    ///
    /// The returned handle shares state with every other handle for the
    /// same tenant.
    #[must_use]
    pub fn store(&self, tenant: &str) -> MemoryVolumeStore {
        let mut stores = self.stores.lock().unwrap_or_else(PoisonError::into_inner);
        stores
            .entry(tenant.to_owned())
            .or_insert_with(|| {
                debug!(tenant, location = %self.default_location, "creating tenant store");
                MemoryVolumeStore::new(tenant, self.default_location.clone())
            })
            .clone()
    }

    /// Tenants with a store, in sorted order.
    #[must_use]
    pub fn tenants(&self) -> Vec<String> {
        let stores = self.stores.lock().unwrap_or_else(PoisonError::into_inner);
        stores.keys().cloned().collect()
    }

    /// Drops the store for `tenant`, returning it if one existed.
    #[must_use]
    pub fn remove(&self, tenant: &str) -> Option<MemoryVolumeStore> {
        let mut stores = self.stores.lock().unwrap_or_else(PoisonError::into_inner);
        stores.remove(tenant)
    }
}
