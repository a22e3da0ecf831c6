//! Contract for the remote control plane that owns the real resources.
//!
//! Provider adapters implement [`RemoteResourceGateway`] over their own wire
//! protocol. Every call is routed by scope and returns the state the remote
//! side reports at that moment, which may lag behind the requested change.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors reported by a gateway.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum GatewayError {
    /// The addressed resource does not exist (or no longer exists).
    #[error("{resource} not found")]
    NotFound {
        /// Description of the missing resource.
        resource: String,
    },
    /// Any other failure: malformed request, quota, transport.
    #[error("remote failure: {message}")]
    Remote {
        /// Message reported by the remote side.
        message: String,
    },
}

impl GatewayError {
    /// Builds a [`GatewayError::NotFound`].
    #[must_use]
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    /// Builds a [`GatewayError::Remote`].
    #[must_use]
    pub fn remote(message: impl Into<String>) -> Self {
        Self::Remote {
            message: message.into(),
        }
    }
}

/// Remote volume states.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VolumeState {
    /// Provisioning in progress.
    Creating,
    /// Ready and unattached.
    Available,
    /// Attached to at least one node.
    InUse,
    /// Deletion in progress.
    Deleting,
    /// Deleted; kept visible as a tombstone for a while.
    Deleted,
    /// Provisioning failed.
    Error,
}

/// Remote attachment states.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AttachmentState {
    /// Attachment requested.
    Attaching,
    /// Device visible to the node.
    Attached,
    /// Detachment requested.
    Detaching,
    /// Device removed from the node.
    Detached,
    /// Detachment blocked by the node.
    Busy,
}

/// Remote snapshot states.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SnapshotState {
    /// Copy in progress.
    Pending,
    /// Copy finished.
    Completed,
    /// Copy failed.
    Error,
}

macro_rules! display_via_serde_name {
    ($name:ident { $($variant:ident => $label:literal),+ $(,)? }) => {
        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(match self {
                    $(Self::$variant => $label),+
                })
            }
        }
    };
}

display_via_serde_name!(VolumeState {
    Creating => "creating",
    Available => "available",
    InUse => "in-use",
    Deleting => "deleting",
    Deleted => "deleted",
    Error => "error",
});

display_via_serde_name!(AttachmentState {
    Attaching => "attaching",
    Attached => "attached",
    Detaching => "detaching",
    Detached => "detached",
    Busy => "busy",
});

display_via_serde_name!(SnapshotState {
    Pending => "pending",
    Completed => "completed",
    Error => "error",
});

/// A volume as reported by the remote side.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct RemoteVolume {
    /// Provider identifier, local to the scope.
    pub id: String,
    /// Scope (region) the volume lives in.
    pub scope: String,
    /// Availability zone.
    pub zone: String,
    /// Size in whole gigabytes.
    pub size_gb: u32,
    /// Current state.
    pub state: VolumeState,
    /// Name given at creation.
    pub name: Option<String>,
    /// Snapshot the volume was restored from.
    pub snapshot_id: Option<String>,
    /// Current attachments.
    pub attachments: Vec<RemoteAttachment>,
}

/// An attachment between a volume and a node as reported remotely.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct RemoteAttachment {
    /// Provider identifier of the volume.
    pub volume_id: String,
    /// Provider identifier of the node.
    pub node_id: String,
    /// Device path on the node.
    pub device: String,
    /// Whether this is the node's boot volume.
    pub boot: bool,
    /// Current state.
    pub state: AttachmentState,
}

/// A snapshot as reported by the remote side.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct RemoteSnapshot {
    /// Provider identifier, local to the scope.
    pub id: String,
    /// Scope (region) the snapshot lives in.
    pub scope: String,
    /// Source volume identifier.
    pub volume_id: String,
    /// Size of the source volume in gigabytes.
    pub volume_size_gb: u32,
    /// Current state.
    pub state: SnapshotState,
    /// Name or description given at creation.
    pub name: Option<String>,
    /// Time the copy started.
    pub started_at: Option<SystemTime>,
}

/// Where a new volume's initial contents come from.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum VolumeSource {
    /// Blank volume of a given size.
    Empty {
        /// Size in gigabytes.
        size_gb: u32,
    },
    /// Volume restored from a snapshot.
    Snapshot {
        /// Provider snapshot identifier.
        snapshot_id: String,
        /// Size override; the snapshot's size when unset.
        size_gb: Option<u32>,
    },
}

/// Parameters of a remote create-volume call.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CreateVolumeRequest {
    /// Name tag for the volume.
    pub name: Option<String>,
    /// Availability zone to place the volume in.
    pub zone: String,
    /// Initial contents.
    pub source: VolumeSource,
}

/// Parameters of a remote detach call.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct DetachRequest {
    /// Bypass the remote system's safety checks.
    pub force: bool,
    /// Restrict to the attachment on this device.
    pub device: Option<String>,
    /// Restrict to the attachment on this node (provider identifier).
    pub node_id: Option<String>,
}

/// Criteria for describing snapshots.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SnapshotFilter {
    /// Snapshot identifiers; empty means all.
    pub ids: Vec<String>,
    /// Only snapshots of this volume.
    pub volume_id: Option<String>,
}

impl SnapshotFilter {
    /// Filter selecting one snapshot.
    #[must_use]
    pub fn id(id: impl Into<String>) -> Self {
        Self {
            ids: vec![id.into()],
            volume_id: None,
        }
    }

    /// Filter selecting snapshots of one volume.
    #[must_use]
    pub fn volume(volume_id: impl Into<String>) -> Self {
        Self {
            ids: Vec::new(),
            volume_id: Some(volume_id.into()),
        }
    }

    /// Returns `true` when `snapshot` satisfies the filter.
    #[must_use]
    pub fn matches(&self, snapshot: &RemoteSnapshot) -> bool {
        (self.ids.is_empty() || self.ids.iter().any(|id| *id == snapshot.id))
            && self
                .volume_id
                .as_deref()
                .is_none_or(|volume| volume == snapshot.volume_id)
    }
}

/// Future returned by gateway calls.
pub type GatewayFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, GatewayError>> + Send + 'a>>;

/// Remote control plane operations consumed by the lifecycle coordinator.
pub trait RemoteResourceGateway: Send + Sync {
    /// Lists the scopes (regions) known to the provider.
    fn list_scopes(&self) -> GatewayFuture<'_, Vec<String>>;

    /// Describes volumes in `scope`; an empty `ids` slice describes all of them.
    fn describe_volumes<'a>(
        &'a self,
        scope: &'a str,
        ids: &'a [String],
    ) -> GatewayFuture<'a, Vec<RemoteVolume>>;

    /// Requests a new volume.
    fn create_volume<'a>(
        &'a self,
        scope: &'a str,
        request: &'a CreateVolumeRequest,
    ) -> GatewayFuture<'a, RemoteVolume>;

    /// Requests deletion of a volume.
    fn delete_volume<'a>(&'a self, scope: &'a str, volume_id: &'a str) -> GatewayFuture<'a, ()>;

    /// Requests attachment of a volume to a node.
    fn attach_volume<'a>(
        &'a self,
        scope: &'a str,
        volume_id: &'a str,
        node_id: &'a str,
        device: &'a str,
    ) -> GatewayFuture<'a, RemoteAttachment>;

    /// Requests detachment of a volume.
    fn detach_volume<'a>(
        &'a self,
        scope: &'a str,
        volume_id: &'a str,
        request: &'a DetachRequest,
    ) -> GatewayFuture<'a, ()>;

    /// Describes snapshots in `scope` matching `filter`.
    fn describe_snapshots<'a>(
        &'a self,
        scope: &'a str,
        filter: &'a SnapshotFilter,
    ) -> GatewayFuture<'a, Vec<RemoteSnapshot>>;

    /// Requests a snapshot of a volume.
    fn create_snapshot<'a>(
        &'a self,
        scope: &'a str,
        volume_id: &'a str,
        name: Option<&'a str>,
    ) -> GatewayFuture<'a, RemoteSnapshot>;

    /// Requests deletion of a snapshot.
    fn delete_snapshot<'a>(&'a self, scope: &'a str, snapshot_id: &'a str)
    -> GatewayFuture<'a, ()>;
}
