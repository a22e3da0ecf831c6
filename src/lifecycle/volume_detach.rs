//! Detaching volumes from nodes.

use tracing::{debug, info, warn};

use crate::gateway::{
    AttachmentState, DetachRequest, GatewayError, RemoteAttachment, RemoteResourceGateway,
};
use crate::identifier::ResourceId;
use crate::volume::DetachOptions;

use super::volume_attach::ensure_same_scope;
use super::{LifecycleError, Operation, VolumeLifecycleCoordinator};

impl<G: RemoteResourceGateway> VolumeLifecycleCoordinator<G> {
    /// Detaches the attachment selected by `options` and waits until it is
    /// gone.
    ///
    /// The attachment is resolved before the detach request, so a missing
    /// volume or attachment returns `Ok(false)` without a mutating call.
    pub(super) async fn detach(
        &self,
        volume_id: &str,
        options: &DetachOptions,
    ) -> Result<bool, LifecycleError> {
        let volume = ResourceId::decode(volume_id)?;
        let filter = options.filter();
        if let Some(node_id) = filter.node_id.as_deref() {
            ensure_same_scope(&volume, &ResourceId::decode(node_id)?)?;
        }

        let scope = volume.scope();
        let Some(remote) = self.describe_volume(scope, volume.local_id()).await? else {
            warn!(volume_id, "volume not found; nothing to detach");
            return Ok(false);
        };
        if remote.attachments.is_empty() {
            warn!(volume_id, "volume has no attachments");
            return Ok(false);
        }
        let Some(target) = remote.attachments.into_iter().find(|attachment| {
            attachment.state != AttachmentState::Detached
                && ResourceId::new(scope, attachment.node_id.as_str())
                    .is_ok_and(|holder| filter.matches(&attachment.device, &holder))
        }) else {
            warn!(volume_id, ?filter, "no attachment matches the detach options");
            return Ok(false);
        };

        let request = DetachRequest {
            force: options.force(),
            device: Some(target.device.clone()),
            node_id: Some(target.node_id.clone()),
        };
        match self
            .gateway
            .detach_volume(scope, volume.local_id(), &request)
            .await
        {
            Ok(()) => {}
            Err(GatewayError::NotFound { resource }) => {
                debug!(volume_id, resource, "attachment vanished before detach");
                return Ok(true);
            }
            Err(err) => return Err(err.into()),
        }

        let volume_local = volume.local_id();
        let node_local = target.node_id.clone();
        let device = target.device.clone();
        let (node_ref, device_ref) = (node_local.as_str(), device.as_str());
        self.settle(
            Operation::DetachVolume,
            volume_id,
            target,
            |current: &RemoteAttachment| current.state == AttachmentState::Detached,
            move || self.describe_attachment(scope, volume_local, node_ref, device_ref),
        )
        .await?;
        info!(volume_id, device = device_ref, force = options.force(), "volume detached");
        Ok(true)
    }
}
