//! Volume deletion.

use tracing::{debug, info, warn};

use crate::gateway::{GatewayError, RemoteResourceGateway, RemoteVolume, VolumeState};
use crate::identifier::ResourceId;

use super::{LifecycleError, Operation, VolumeLifecycleCoordinator};

impl<G: RemoteResourceGateway> VolumeLifecycleCoordinator<G> {
    /// Deletes a volume and waits until the provider stops reporting it.
    ///
    /// A volume that is already absent yields `Ok(false)`; one that vanishes
    /// after the request is a success.
    pub(super) async fn remove(&self, id: &str) -> Result<bool, LifecycleError> {
        let volume = ResourceId::decode(id)?;
        let (scope, local_id) = (volume.scope(), volume.local_id());
        let Some(current) = self.describe_volume(scope, local_id).await? else {
            warn!(volume_id = id, "volume not found; nothing to remove");
            return Ok(false);
        };

        match self.gateway.delete_volume(scope, local_id).await {
            Ok(()) => {}
            Err(GatewayError::NotFound { resource }) => {
                debug!(volume_id = id, resource, "volume vanished before deletion request");
                return Ok(true);
            }
            Err(err) => return Err(err.into()),
        }

        self.settle(
            Operation::RemoveVolume,
            id,
            current,
            |remote: &RemoteVolume| remote.state == VolumeState::Deleted,
            move || self.describe_volume(scope, local_id),
        )
        .await?;
        info!(volume_id = id, "volume removed");
        Ok(true)
    }
}
