//! Conversion from remote records to domain types.

use crate::gateway::{AttachmentState, RemoteAttachment, RemoteSnapshot, RemoteVolume};
use crate::identifier::{IdentifierError, ResourceId};
use crate::volume::{Snapshot, Volume, VolumeType};

/// Remote records that expose a state name for logs and timeout reports.
pub(super) trait StateLabel {
    fn state_label(&self) -> String;
}

impl StateLabel for RemoteVolume {
    fn state_label(&self) -> String {
        self.state.to_string()
    }
}

impl StateLabel for RemoteAttachment {
    fn state_label(&self) -> String {
        self.state.to_string()
    }
}

impl StateLabel for RemoteSnapshot {
    fn state_label(&self) -> String {
        self.state.to_string()
    }
}

/// Builds a [`Volume`] from its remote description.
///
/// Remote volumes are network block devices that outlive their node, so
/// they are reported as durable. The location is the scope, not the zone.
pub(super) fn volume_from_remote(
    remote: &RemoteVolume,
    volume_type: VolumeType,
) -> Result<Volume, IdentifierError> {
    let attachment = remote
        .attachments
        .iter()
        .find(|current| current.state != AttachmentState::Detached);
    Ok(Volume {
        id: ResourceId::new(remote.scope.as_str(), remote.id.as_str())?,
        size_gb: Some(f64::from(remote.size_gb)),
        location_id: Some(remote.scope.clone()),
        volume_type,
        durable: true,
        boot_device: attachment.is_some_and(|current| current.boot),
        device: attachment.map(|current| current.device.clone()),
        name: remote.name.clone(),
    })
}

pub(super) fn snapshot_from_remote(remote: &RemoteSnapshot) -> Result<Snapshot, IdentifierError> {
    Ok(Snapshot {
        id: ResourceId::new(remote.scope.as_str(), remote.id.as_str())?,
        size_gb: Some(f64::from(remote.volume_size_gb)),
        name: remote.name.clone(),
        location_id: Some(remote.scope.clone()),
        volume_id: ResourceId::new(remote.scope.as_str(), remote.volume_id.as_str()).ok(),
        created: remote.started_at,
    })
}
