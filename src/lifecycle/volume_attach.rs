//! Attaching volumes to nodes.

use tracing::{info, warn};

use crate::gateway::{AttachmentState, GatewayError, RemoteAttachment, RemoteResourceGateway};
use crate::identifier::ResourceId;
use crate::volume::AttachOptions;

use super::{LifecycleError, Operation, VolumeLifecycleCoordinator};

/// Rejects a node outside the volume's partition.
pub(super) fn ensure_same_scope(
    volume: &ResourceId,
    node: &ResourceId,
) -> Result<(), LifecycleError> {
    if volume.same_scope(node) {
        return Ok(());
    }
    Err(LifecycleError::invalid(format!(
        "node {node} is not in location {} of volume {volume}",
        volume.scope()
    )))
}

impl<G: RemoteResourceGateway> VolumeLifecycleCoordinator<G> {
    /// Attaches a volume and waits until the node sees the device.
    ///
    /// Returns `Ok(false)` when the gateway does not know the volume or node.
    pub(super) async fn attach(
        &self,
        volume_id: &str,
        node_id: &str,
        options: &AttachOptions,
    ) -> Result<bool, LifecycleError> {
        let volume = ResourceId::decode(volume_id)?;
        let node = ResourceId::decode(node_id)?;
        ensure_same_scope(&volume, &node)?;
        let device = options.device.trim();
        if device.is_empty() {
            return Err(LifecycleError::invalid("attach options must name a device"));
        }

        let scope = volume.scope();
        let attachment = match self
            .gateway
            .attach_volume(scope, volume.local_id(), node.local_id(), device)
            .await
        {
            Ok(attachment) => attachment,
            Err(GatewayError::NotFound { resource }) => {
                warn!(volume_id, node_id, resource, "cannot attach missing resource");
                return Ok(false);
            }
            Err(err) => return Err(err.into()),
        };

        let (volume_local, node_local) = (volume.local_id(), node.local_id());
        self.settle(
            Operation::AttachVolume,
            volume_id,
            attachment,
            |current: &RemoteAttachment| current.state == AttachmentState::Attached,
            move || self.describe_attachment(scope, volume_local, node_local, device),
        )
        .await?;
        info!(volume_id, node_id, device, "volume attached");
        Ok(true)
    }
}
