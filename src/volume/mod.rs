//! Volume and snapshot domain types and the uniform lifecycle contract.
//!
//! Both the provider-backed [`crate::VolumeLifecycleCoordinator`] and the
//! in-memory [`crate::MemoryVolumeStore`] implement [`VolumeManager`], so
//! callers and tests can drive either through the same interface.

mod options;

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::identifier::ResourceId;

pub use options::{
    AttachOptions, AttachmentFilter, BasicVolumeOptions, DetachOptions, SnapshotOptions,
    VolumeOptions, ZonalVolumeOptions, resolve_zone_scope,
};

/// Storage class of a volume.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolumeType {
    /// Disk local to the hypervisor.
    Local,
    /// Network block device (for example EBS).
    #[default]
    San,
    /// Network filesystem share.
    Nas,
    /// Type not recognised by this crate.
    Unrecognized,
}

impl fmt::Display for VolumeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Local => "local",
            Self::San => "san",
            Self::Nas => "nas",
            Self::Unrecognized => "unrecognized",
        };
        f.write_str(label)
    }
}

impl FromStr for VolumeType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "local" => Self::Local,
            "san" => Self::San,
            "nas" => Self::Nas,
            _ => Self::Unrecognized,
        })
    }
}

/// A block storage volume.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Volume {
    /// Composite identifier; its scope never changes.
    pub id: ResourceId,
    /// Size in gigabytes, when known.
    pub size_gb: Option<f64>,
    /// Location (partition) the volume was created in.
    pub location_id: Option<String>,
    /// Storage class.
    pub volume_type: VolumeType,
    /// Whether the data survives the node it is attached to.
    pub durable: bool,
    /// Whether the volume is the boot device of its node.
    pub boot_device: bool,
    /// Device path of the current attachment, if any.
    pub device: Option<String>,
    /// Human-friendly name.
    pub name: Option<String>,
}

/// A point-in-time copy of a volume.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Composite identifier.
    pub id: ResourceId,
    /// Size in gigabytes, copied from the source volume.
    pub size_gb: Option<f64>,
    /// Human-friendly name.
    pub name: Option<String>,
    /// Location (partition) the snapshot lives in.
    pub location_id: Option<String>,
    /// Volume the snapshot was taken from.
    pub volume_id: Option<ResourceId>,
    /// Time the snapshot was started.
    pub created: Option<SystemTime>,
}

/// Future returned by [`VolumeManager`] operations.
pub type ManagerFuture<'a, T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'a>>;

/// Lifecycle operations shared by provider adapters and the reference store.
///
/// Absent inputs are ordinary negative outcomes: `Ok(false)`, `Ok(None)` or
/// an empty list. Errors are reserved for malformed arguments and failures of
/// the underlying system.
pub trait VolumeManager {
    /// Error type returned by the implementation.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Lists every volume visible to the caller.
    fn list_volumes(&self) -> ManagerFuture<'_, Vec<Volume>, Self::Error>;

    /// Lists the volumes created in `location_id`.
    fn list_volumes_in_location<'a>(
        &'a self,
        location_id: &'a str,
    ) -> ManagerFuture<'a, Vec<Volume>, Self::Error>;

    /// Lists the volumes currently attached to `node_id`.
    fn list_volumes_for_node<'a>(
        &'a self,
        node_id: &'a str,
    ) -> ManagerFuture<'a, Vec<Volume>, Self::Error>;

    /// Looks up a single volume.
    fn get_volume<'a>(&'a self, id: &'a str) -> ManagerFuture<'a, Option<Volume>, Self::Error>;

    /// Creates a volume and waits until it is usable.
    ///
    /// Resolves to `None` when the referenced source snapshot does not exist.
    fn create_volume<'a>(
        &'a self,
        name: &'a str,
        options: &'a VolumeOptions,
    ) -> ManagerFuture<'a, Option<Volume>, Self::Error>;

    /// Removes a volume. Resolves to `false` when it does not exist.
    fn remove_volume<'a>(&'a self, id: &'a str) -> ManagerFuture<'a, bool, Self::Error>;

    /// Attaches a volume to a node.
    fn attach_volume<'a>(
        &'a self,
        volume_id: &'a str,
        node_id: &'a str,
        options: &'a AttachOptions,
    ) -> ManagerFuture<'a, bool, Self::Error>;

    /// Detaches a volume from the node selected by `options`.
    fn detach_volume<'a>(
        &'a self,
        volume_id: &'a str,
        options: &'a DetachOptions,
    ) -> ManagerFuture<'a, bool, Self::Error>;

    /// Lists every snapshot visible to the caller.
    fn list_snapshots(&self) -> ManagerFuture<'_, Vec<Snapshot>, Self::Error>;

    /// Lists the snapshots stored in `location_id`.
    fn list_snapshots_in_location<'a>(
        &'a self,
        location_id: &'a str,
    ) -> ManagerFuture<'a, Vec<Snapshot>, Self::Error>;

    /// Lists the snapshots taken from `volume_id`; empty when the volume is gone.
    fn list_snapshots_for_volume<'a>(
        &'a self,
        volume_id: &'a str,
    ) -> ManagerFuture<'a, Vec<Snapshot>, Self::Error>;

    /// Looks up a single snapshot.
    fn get_snapshot<'a>(&'a self, id: &'a str)
    -> ManagerFuture<'a, Option<Snapshot>, Self::Error>;

    /// Snapshots a volume and waits for completion.
    ///
    /// Resolves to `None` when the source volume does not exist.
    fn create_snapshot<'a>(
        &'a self,
        volume_id: &'a str,
        options: &'a SnapshotOptions,
    ) -> ManagerFuture<'a, Option<Snapshot>, Self::Error>;

    /// Deletes a snapshot. Resolves to `false` when it does not exist.
    fn delete_snapshot<'a>(&'a self, id: &'a str) -> ManagerFuture<'a, bool, Self::Error>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("san", VolumeType::San)]
    #[case(" LOCAL ", VolumeType::Local)]
    #[case("nas", VolumeType::Nas)]
    #[case("tape", VolumeType::Unrecognized)]
    fn volume_type_parses_case_insensitively(#[case] raw: &str, #[case] expected: VolumeType) {
        assert_eq!(raw.parse::<VolumeType>(), Ok(expected));
    }

    #[rstest]
    fn volume_serialises_id_as_handle() {
        let volume = Volume {
            id: ResourceId::new("us-east-1", "vol-1").expect("id"),
            size_gb: Some(1.0),
            location_id: Some(String::from("us-east-1")),
            volume_type: VolumeType::San,
            durable: true,
            boot_device: false,
            device: None,
            name: None,
        };
        let json = serde_json::to_value(&volume).expect("serialise");
        assert_eq!(json["id"], "us-east-1/vol-1");
        assert_eq!(json["volume_type"], "san");
    }
}
