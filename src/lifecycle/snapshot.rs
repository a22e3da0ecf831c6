//! Snapshot creation and deletion.

use tracing::{info, warn};

use crate::gateway::{GatewayError, RemoteResourceGateway, RemoteSnapshot, SnapshotState};
use crate::identifier::ResourceId;
use crate::volume::{Snapshot, SnapshotOptions};

use super::convert::snapshot_from_remote;
use super::{LifecycleError, Operation, VolumeLifecycleCoordinator};

impl<G: RemoteResourceGateway> VolumeLifecycleCoordinator<G> {
    /// Snapshots a volume and waits for the copy to complete.
    ///
    /// Returns `Ok(None)` when the source volume does not exist. The reported
    /// size is the source volume's size.
    pub(super) async fn snapshot_volume(
        &self,
        volume_id: &str,
        options: &SnapshotOptions,
    ) -> Result<Option<Snapshot>, LifecycleError> {
        let volume = ResourceId::decode(volume_id)?;
        let (scope, volume_local) = (volume.scope(), volume.local_id());
        let Some(source) = self.describe_volume(scope, volume_local).await? else {
            warn!(volume_id, "volume not found; no snapshot taken");
            return Ok(None);
        };

        let created = match self
            .gateway
            .create_snapshot(scope, volume_local, options.name.as_deref())
            .await
        {
            Ok(created) => created,
            Err(GatewayError::NotFound { resource }) => {
                warn!(volume_id, resource, "volume vanished; no snapshot taken");
                return Ok(None);
            }
            Err(err) => return Err(err.into()),
        };
        let local_id = created.id.clone();
        let snapshot_id = local_id.as_str();
        let handle = ResourceId::new(scope, snapshot_id)?.to_string();

        self.settle(
            Operation::CreateSnapshot,
            &handle,
            created,
            |current: &RemoteSnapshot| current.state == SnapshotState::Completed,
            move || self.refresh_pending_snapshot(scope, snapshot_id),
        )
        .await?;

        let Some(done) = self.describe_snapshot(scope, snapshot_id).await? else {
            return Err(LifecycleError::NotFound { resource: handle });
        };
        let mut snapshot = snapshot_from_remote(&done)?;
        snapshot.size_gb = Some(f64::from(source.size_gb));
        info!(snapshot_id = %handle, volume_id, "snapshot completed");
        Ok(Some(snapshot))
    }

    /// Deletes a snapshot and confirms it is no longer described.
    pub(super) async fn remove_snapshot(&self, id: &str) -> Result<bool, LifecycleError> {
        let snapshot = ResourceId::decode(id)?;
        let (scope, local_id) = (snapshot.scope(), snapshot.local_id());
        if self.describe_snapshot(scope, local_id).await?.is_none() {
            warn!(snapshot_id = id, "snapshot not found; nothing to delete");
            return Ok(false);
        }

        match self.gateway.delete_snapshot(scope, local_id).await {
            Ok(()) | Err(GatewayError::NotFound { .. }) => {}
            Err(err) => return Err(err.into()),
        }

        let remaining = self.describe_snapshot(scope, local_id).await?;
        if remaining.is_some() {
            warn!(snapshot_id = id, "snapshot still listed after deletion");
            return Ok(false);
        }
        info!(snapshot_id = id, "snapshot deleted");
        Ok(true)
    }

    async fn refresh_pending_snapshot(
        &self,
        scope: &str,
        snapshot_id: &str,
    ) -> Result<Option<RemoteSnapshot>, GatewayError> {
        match self.describe_snapshot(scope, snapshot_id).await? {
            Some(snapshot) if snapshot.state == SnapshotState::Error => Err(GatewayError::remote(
                format!("snapshot {scope}/{snapshot_id} failed"),
            )),
            other => Ok(other),
        }
    }
}
