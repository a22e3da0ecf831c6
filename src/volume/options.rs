//! Option records for lifecycle operations.
//!
//! Provider-specific variants are cases of a sum type rather than subclasses,
//! so implementations pick the fields they understand with a `match`.

use serde::{Deserialize, Serialize};

use crate::identifier::ResourceId;

/// Options for creating a volume.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VolumeOptions {
    /// Provider-neutral options: a size and an optional location.
    Basic(BasicVolumeOptions),
    /// Options for providers that place volumes in availability zones.
    Zonal(ZonalVolumeOptions),
}

impl VolumeOptions {
    /// Requested size in gigabytes; zero counts as unset.
    #[must_use]
    pub fn size_gb(&self) -> Option<u32> {
        let size = match self {
            Self::Basic(options) => options.size_gb,
            Self::Zonal(options) => options.size_gb,
        };
        size.filter(|value| *value > 0)
    }

    /// Explicit location requested by the caller.
    #[must_use]
    pub fn location_id(&self) -> Option<&str> {
        match self {
            Self::Basic(options) => options.location_id.as_deref(),
            Self::Zonal(options) => options.location_id.as_deref(),
        }
    }

    /// Source snapshot handle, when creating from a snapshot.
    #[must_use]
    pub fn snapshot_id(&self) -> Option<&str> {
        match self {
            Self::Basic(_) => None,
            Self::Zonal(options) => options.snapshot_id.as_deref(),
        }
    }
}

/// Provider-neutral creation options.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct BasicVolumeOptions {
    /// Desired size in gigabytes.
    pub size_gb: Option<u32>,
    /// Location the volume should be created in.
    pub location_id: Option<String>,
}

/// Creation options for zone-placed volumes.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct ZonalVolumeOptions {
    /// Availability zone, for example `us-east-1a`.
    pub availability_zone: String,
    /// Desired size in gigabytes. Required unless `snapshot_id` is set, in
    /// which case it overrides the snapshot's own size.
    pub size_gb: Option<u32>,
    /// Snapshot handle to restore from.
    pub snapshot_id: Option<String>,
    /// Partition owning the zone. Derived from the zone when unset.
    pub location_id: Option<String>,
}

/// Options for attaching a volume.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct AttachOptions {
    /// Device path exposed to the node, for example `/dev/sdh`.
    pub device: String,
}

impl AttachOptions {
    /// Creates attach options for `device`.
    #[must_use]
    pub fn device(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
        }
    }
}

/// Selects which attachment of a volume to act on.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct AttachmentFilter {
    /// Device path the volume is attached on.
    pub device: Option<String>,
    /// Handle of the node holding the volume.
    pub node_id: Option<String>,
}

impl AttachmentFilter {
    /// Returns `true` when an attachment on `device` to `node` matches.
    ///
    /// Unset criteria match anything. A `node_id` that is not a valid handle
    /// matches nothing.
    #[must_use]
    pub fn matches(&self, device: &str, node: &ResourceId) -> bool {
        self.device.as_deref().is_none_or(|wanted| wanted == device)
            && self
                .node_id
                .as_deref()
                .is_none_or(|wanted| ResourceId::decode(wanted).is_ok_and(|id| id == *node))
    }
}

/// Options for detaching a volume.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DetachOptions {
    /// Detach the attachment selected by the filter.
    Basic(AttachmentFilter),
    /// Detach with an explicit choice to bypass the remote system's
    /// filesystem-level safety checks.
    Forceable {
        /// Attachment selection.
        filter: AttachmentFilter,
        /// Whether to force the detachment.
        force: bool,
    },
}

impl Default for DetachOptions {
    fn default() -> Self {
        Self::Basic(AttachmentFilter::default())
    }
}

impl DetachOptions {
    /// Attachment selection criteria.
    #[must_use]
    pub const fn filter(&self) -> &AttachmentFilter {
        match self {
            Self::Basic(filter) | Self::Forceable { filter, .. } => filter,
        }
    }

    /// Whether the detachment should be forced.
    #[must_use]
    pub const fn force(&self) -> bool {
        match self {
            Self::Basic(_) => false,
            Self::Forceable { force, .. } => *force,
        }
    }
}

/// Options for creating a snapshot.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct SnapshotOptions {
    /// Human-friendly name for the snapshot.
    pub name: Option<String>,
}

/// Picks the scope owning `zone`: the longest known scope that prefixes it.
///
/// Zones are named after their region with a suffix (`us-east-1a` belongs to
/// `us-east-1`).
#[must_use]
pub fn resolve_zone_scope<'a, I>(zone: &str, scopes: I) -> Option<String>
where
    I: IntoIterator<Item = &'a String>,
{
    scopes
        .into_iter()
        .filter(|scope| !scope.is_empty() && zone.starts_with(scope.as_str()))
        .max_by_key(|scope| scope.len())
        .cloned()
}
