//! Read-only queries: listings, lookups, and the describe helpers the waits
//! refresh through.

use tracing::{debug, warn};

use crate::gateway::{
    AttachmentState, GatewayError, RemoteAttachment, RemoteResourceGateway, RemoteSnapshot,
    RemoteVolume, SnapshotFilter, VolumeState,
};
use crate::identifier::ResourceId;
use crate::volume::{Snapshot, Volume};

use super::convert::{snapshot_from_remote, volume_from_remote};
use super::{LifecycleError, VolumeLifecycleCoordinator};

/// Turns a not-found signal into an empty result.
fn absent_on_not_found<T: Default>(result: Result<T, GatewayError>) -> Result<T, GatewayError> {
    match result {
        Err(GatewayError::NotFound { resource }) => {
            debug!(resource, "treating not-found as empty");
            Ok(T::default())
        }
        other => other,
    }
}

impl<G: RemoteResourceGateway> VolumeLifecycleCoordinator<G> {
    /// Describes one volume, hiding tombstones.
    pub(super) async fn describe_volume(
        &self,
        scope: &str,
        volume_id: &str,
    ) -> Result<Option<RemoteVolume>, GatewayError> {
        let ids = [volume_id.to_owned()];
        let volumes = absent_on_not_found(self.gateway.describe_volumes(scope, &ids).await)?;
        Ok(volumes
            .into_iter()
            .find(|volume| volume.id == volume_id && volume.state != VolumeState::Deleted))
    }

    /// Describes one attachment of a volume; `None` once it has vanished.
    pub(super) async fn describe_attachment(
        &self,
        scope: &str,
        volume_id: &str,
        node_id: &str,
        device: &str,
    ) -> Result<Option<RemoteAttachment>, GatewayError> {
        let volume = self.describe_volume(scope, volume_id).await?;
        Ok(volume.and_then(|current| {
            current
                .attachments
                .into_iter()
                .find(|attachment| attachment.node_id == node_id && attachment.device == device)
        }))
    }

    /// Describes one snapshot.
    pub(super) async fn describe_snapshot(
        &self,
        scope: &str,
        snapshot_id: &str,
    ) -> Result<Option<RemoteSnapshot>, GatewayError> {
        let filter = SnapshotFilter::id(snapshot_id);
        let snapshots = absent_on_not_found(self.gateway.describe_snapshots(scope, &filter).await)?;
        Ok(snapshots
            .into_iter()
            .find(|snapshot| snapshot.id == snapshot_id))
    }

    pub(super) fn to_volume(&self, remote: &RemoteVolume) -> Result<Volume, LifecycleError> {
        Ok(volume_from_remote(remote, self.volume_type)?)
    }

    fn live_volumes(&self, remotes: Vec<RemoteVolume>) -> Result<Vec<Volume>, LifecycleError> {
        remotes
            .iter()
            .filter(|remote| remote.state != VolumeState::Deleted)
            .map(|remote| self.to_volume(remote))
            .collect()
    }

    pub(super) async fn volumes_in_scope(
        &self,
        scope: &str,
    ) -> Result<Vec<Volume>, LifecycleError> {
        let remotes = absent_on_not_found(self.gateway.describe_volumes(scope, &[]).await)?;
        self.live_volumes(remotes)
    }

    pub(super) async fn all_volumes(&self) -> Result<Vec<Volume>, LifecycleError> {
        let mut volumes = Vec::new();
        for scope in self.gateway.list_scopes().await? {
            volumes.extend(self.volumes_in_scope(&scope).await?);
        }
        Ok(volumes)
    }

    pub(super) async fn volumes_for_node(
        &self,
        node_id: &str,
    ) -> Result<Vec<Volume>, LifecycleError> {
        let node = ResourceId::decode(node_id)?;
        let remotes =
            absent_on_not_found(self.gateway.describe_volumes(node.scope(), &[]).await)?;
        let attached = remotes
            .into_iter()
            .filter_map(|mut remote| {
                let position = remote
                    .attachments
                    .iter()
                    .position(|attachment| {
                        attachment.node_id == node.local_id()
                            && attachment.state != AttachmentState::Detached
                    })?;
                // Report the device this node sees.
                remote.attachments.swap(0, position);
                Some(remote)
            })
            .collect();
        self.live_volumes(attached)
    }

    pub(super) async fn volume_by_id(&self, id: &str) -> Result<Option<Volume>, LifecycleError> {
        let volume = ResourceId::decode(id)?;
        let remote = self.describe_volume(volume.scope(), volume.local_id()).await?;
        remote.map(|current| self.to_volume(&current)).transpose()
    }

    pub(super) async fn snapshots_in_scope(
        &self,
        scope: &str,
    ) -> Result<Vec<Snapshot>, LifecycleError> {
        let remotes = absent_on_not_found(
            self.gateway
                .describe_snapshots(scope, &SnapshotFilter::default())
                .await,
        )?;
        Ok(remotes
            .iter()
            .map(snapshot_from_remote)
            .collect::<Result<_, _>>()?)
    }

    pub(super) async fn all_snapshots(&self) -> Result<Vec<Snapshot>, LifecycleError> {
        let mut snapshots = Vec::new();
        for scope in self.gateway.list_scopes().await? {
            snapshots.extend(self.snapshots_in_scope(&scope).await?);
        }
        Ok(snapshots)
    }

    pub(super) async fn snapshots_for_volume(
        &self,
        volume_id: &str,
    ) -> Result<Vec<Snapshot>, LifecycleError> {
        let volume = ResourceId::decode(volume_id)?;
        if self
            .describe_volume(volume.scope(), volume.local_id())
            .await?
            .is_none()
        {
            warn!(volume_id, "volume not found; no snapshots listed");
            return Ok(Vec::new());
        }
        let filter = SnapshotFilter::volume(volume.local_id());
        let remotes =
            absent_on_not_found(self.gateway.describe_snapshots(volume.scope(), &filter).await)?;
        Ok(remotes
            .iter()
            .map(snapshot_from_remote)
            .collect::<Result<_, _>>()?)
    }

    pub(super) async fn snapshot_by_id(
        &self,
        id: &str,
    ) -> Result<Option<Snapshot>, LifecycleError> {
        let snapshot = ResourceId::decode(id)?;
        let remote = self
            .describe_snapshot(snapshot.scope(), snapshot.local_id())
            .await?;
        Ok(remote.as_ref().map(snapshot_from_remote).transpose()?)
    }
}
