//! In-memory reference implementation of [`VolumeManager`].
//!
//! [`MemoryVolumeStore`] keeps one tenant's volumes and snapshots in primary
//! maps with secondary indices by node, location, and source volume. All of
//! them live behind a single mutex, so every mutation updates every index
//! atomically. Nothing is persisted beyond the process.

mod inventory;
mod registry;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thiserror::Error;
use tracing::{debug, warn};

use crate::identifier::{IdentifierError, ResourceId};
use crate::volume::{
    AttachOptions, DetachOptions, ManagerFuture, Snapshot, SnapshotOptions, Volume, VolumeManager,
    VolumeOptions,
};

use inventory::Inventory;

pub use registry::StoreRegistry;

/// Errors raised by [`MemoryVolumeStore`].
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum StoreError {
    /// Raised when an argument is malformed.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// Raised when a volume is attached to a different node already.
    #[error("volume {volume_id} is already attached to {node_id}")]
    AlreadyAttached {
        /// Volume handle.
        volume_id: String,
        /// Node currently holding the volume.
        node_id: String,
    },
    /// Raised by [`MemoryVolumeStore::check_invariants`] when two indices
    /// disagree.
    #[error("inventory inconsistent: {0}")]
    Inconsistent(String),
}

impl From<IdentifierError> for StoreError {
    fn from(value: IdentifierError) -> Self {
        Self::InvalidArgument(value.to_string())
    }
}

/// One tenant's volumes and snapshots, held in memory.
///
/// Clones share the same inventory.
#[derive(Clone, Debug)]
pub struct MemoryVolumeStore {
    tenant: String,
    default_location: String,
    inventory: Arc<Mutex<Inventory>>,
}

impl MemoryVolumeStore {
    /// Creates an empty store. Volumes created without an explicit location
    /// land in `default_location`.
    #[must_use]
    pub fn new(tenant: impl Into<String>, default_location: impl Into<String>) -> Self {
        Self {
            tenant: tenant.into(),
            default_location: default_location.into(),
            inventory: Arc::new(Mutex::new(Inventory::default())),
        }
    }

    /// Tenant owning the store.
    #[must_use]
    pub fn tenant(&self) -> &str {
        &self.tenant
    }

    /// Location used when creation options name none.
    #[must_use]
    pub fn default_location(&self) -> &str {
        &self.default_location
    }

    // Critical sections never leave the indices half-updated, so a poisoned
    // lock still guards a consistent inventory.
    fn lock(&self) -> MutexGuard<'_, Inventory> {
        self.inventory.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Audits the cross-index invariants.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Inconsistent`] describing the first violation.
    pub fn check_invariants(&self) -> Result<(), StoreError> {
        self.lock().check().map_err(StoreError::Inconsistent)
    }

    fn attach(
        &self,
        volume_id: &str,
        node_id: &str,
        options: &AttachOptions,
    ) -> Result<bool, StoreError> {
        let volume = ResourceId::decode(volume_id)?;
        let node = ResourceId::decode(node_id)?;
        if !volume.same_scope(&node) {
            return Err(StoreError::InvalidArgument(format!(
                "node {node} is not in location {} of volume {volume}",
                volume.scope()
            )));
        }
        let device = options.device.trim();
        if device.is_empty() {
            return Err(StoreError::InvalidArgument(String::from(
                "attach options must name a device",
            )));
        }
        let attached = self.lock().attach_volume(&volume, &node, device)?;
        if attached {
            debug!(tenant = %self.tenant, volume_id, node_id, device, "volume attached");
        } else {
            warn!(tenant = %self.tenant, volume_id, "volume not found; nothing attached");
        }
        Ok(attached)
    }

    fn detach(&self, volume_id: &str, options: &DetachOptions) -> Result<bool, StoreError> {
        let volume = ResourceId::decode(volume_id)?;
        if let Some(node_id) = options.filter().node_id.as_deref() {
            ResourceId::decode(node_id)?;
        }
        let detached = self.lock().detach_volume(&volume, options);
        if detached {
            debug!(tenant = %self.tenant, volume_id, "volume detached");
        } else {
            warn!(tenant = %self.tenant, volume_id, "no matching attachment; nothing detached");
        }
        Ok(detached)
    }
}

impl VolumeManager for MemoryVolumeStore {
    type Error = StoreError;

    fn list_volumes(&self) -> ManagerFuture<'_, Vec<Volume>, Self::Error> {
        Box::pin(async move { Ok(self.lock().volumes()) })
    }

    fn list_volumes_in_location<'a>(
        &'a self,
        location_id: &'a str,
    ) -> ManagerFuture<'a, Vec<Volume>, Self::Error> {
        Box::pin(async move { Ok(self.lock().volumes_in_location(location_id)) })
    }

    fn list_volumes_for_node<'a>(
        &'a self,
        node_id: &'a str,
    ) -> ManagerFuture<'a, Vec<Volume>, Self::Error> {
        Box::pin(async move {
            let node = ResourceId::decode(node_id)?;
            Ok(self.lock().volumes_for_node(&node))
        })
    }

    fn get_volume<'a>(&'a self, id: &'a str) -> ManagerFuture<'a, Option<Volume>, Self::Error> {
        Box::pin(async move {
            let volume = ResourceId::decode(id)?;
            Ok(self.lock().volume(&volume))
        })
    }

    fn create_volume<'a>(
        &'a self,
        name: &'a str,
        options: &'a VolumeOptions,
    ) -> ManagerFuture<'a, Option<Volume>, Self::Error> {
        Box::pin(async move {
            let created = self
                .lock()
                .create_volume(name, options, &self.default_location)?;
            match created.as_ref() {
                Some(volume) => {
                    debug!(tenant = %self.tenant, volume_id = %volume.id, "volume created");
                }
                None => {
                    warn!(tenant = %self.tenant, "source snapshot not found; no volume created");
                }
            }
            Ok(created)
        })
    }

    fn remove_volume<'a>(&'a self, id: &'a str) -> ManagerFuture<'a, bool, Self::Error> {
        Box::pin(async move {
            let volume = ResourceId::decode(id)?;
            Ok(self.lock().remove_volume(&volume))
        })
    }

    fn attach_volume<'a>(
        &'a self,
        volume_id: &'a str,
        node_id: &'a str,
        options: &'a AttachOptions,
    ) -> ManagerFuture<'a, bool, Self::Error> {
        Box::pin(async move { self.attach(volume_id, node_id, options) })
    }

    fn detach_volume<'a>(
        &'a self,
        volume_id: &'a str,
        options: &'a DetachOptions,
    ) -> ManagerFuture<'a, bool, Self::Error> {
        Box::pin(async move { self.detach(volume_id, options) })
    }

    fn list_snapshots(&self) -> ManagerFuture<'_, Vec<Snapshot>, Self::Error> {
        Box::pin(async move { Ok(self.lock().snapshots()) })
    }

    fn list_snapshots_in_location<'a>(
        &'a self,
        location_id: &'a str,
    ) -> ManagerFuture<'a, Vec<Snapshot>, Self::Error> {
        Box::pin(async move { Ok(self.lock().snapshots_in_location(location_id)) })
    }

    fn list_snapshots_for_volume<'a>(
        &'a self,
        volume_id: &'a str,
    ) -> ManagerFuture<'a, Vec<Snapshot>, Self::Error> {
        Box::pin(async move {
            let volume = ResourceId::decode(volume_id)?;
            Ok(self.lock().snapshots_for_volume(&volume))
        })
    }

    fn get_snapshot<'a>(
        &'a self,
        id: &'a str,
    ) -> ManagerFuture<'a, Option<Snapshot>, Self::Error> {
        Box::pin(async move {
            let snapshot = ResourceId::decode(id)?;
            Ok(self.lock().snapshot(&snapshot))
        })
    }

    fn create_snapshot<'a>(
        &'a self,
        volume_id: &'a str,
        options: &'a SnapshotOptions,
    ) -> ManagerFuture<'a, Option<Snapshot>, Self::Error> {
        Box::pin(async move {
            let volume = ResourceId::decode(volume_id)?;
            let created = self.lock().create_snapshot(&volume, options)?;
            if created.is_none() {
                warn!(tenant = %self.tenant, volume_id, "volume not found; no snapshot taken");
            }
            Ok(created)
        })
    }

    fn delete_snapshot<'a>(&'a self, id: &'a str) -> ManagerFuture<'a, bool, Self::Error> {
        Box::pin(async move {
            let snapshot = ResourceId::decode(id)?;
            Ok(self.lock().delete_snapshot(&snapshot))
        })
    }
}
