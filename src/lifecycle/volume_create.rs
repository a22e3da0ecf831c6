//! Volume creation, from scratch or from a snapshot.

use tracing::{info, warn};

use crate::gateway::{
    CreateVolumeRequest, GatewayError, RemoteResourceGateway, RemoteVolume, VolumeSource,
    VolumeState,
};
use crate::identifier::{IdentifierError, ResourceId, SEPARATOR};
use crate::volume::{Volume, VolumeOptions, ZonalVolumeOptions, resolve_zone_scope};

use super::{LifecycleError, Operation, VolumeLifecycleCoordinator};

/// Where the new volume goes and what it starts with.
struct Placement {
    scope: String,
    source: VolumeSource,
}

impl<G: RemoteResourceGateway> VolumeLifecycleCoordinator<G> {
    /// Creates a volume and waits for it to become available.
    ///
    /// Returns `Ok(None)` without creating anything when the source snapshot
    /// does not exist.
    pub(super) async fn create(
        &self,
        name: &str,
        options: &VolumeOptions,
    ) -> Result<Option<Volume>, LifecycleError> {
        let VolumeOptions::Zonal(zonal) = options else {
            return Err(LifecycleError::invalid(
                "volume creation requires zonal options naming an availability zone",
            ));
        };
        let zone = zonal.availability_zone.trim();
        if zone.is_empty() {
            return Err(LifecycleError::invalid("availability zone must not be empty"));
        }

        let Some(placement) = self.place(zonal, options.size_gb()).await? else {
            return Ok(None);
        };

        let request = CreateVolumeRequest {
            name: Some(name.trim())
                .filter(|value| !value.is_empty())
                .map(str::to_owned),
            zone: zone.to_owned(),
            source: placement.source,
        };
        let scope = placement.scope.as_str();
        info!(scope, zone, name, "requesting volume");
        let created = self.gateway.create_volume(scope, &request).await?;
        let local_id = created.id.clone();
        let volume_id = local_id.as_str();
        let handle = ResourceId::new(scope, volume_id)?.to_string();

        self.settle(
            Operation::CreateVolume,
            &handle,
            created,
            |volume: &RemoteVolume| volume.state == VolumeState::Available,
            move || self.refresh_provisioning(scope, volume_id),
        )
        .await?;

        let Some(ready) = self.describe_volume(scope, volume_id).await? else {
            return Err(LifecycleError::NotFound { resource: handle });
        };
        info!(volume_id = %handle, "volume available");
        self.to_volume(&ready).map(Some)
    }

    /// Resolves the scope and initial contents; `None` when the source
    /// snapshot is missing.
    async fn place(
        &self,
        zonal: &ZonalVolumeOptions,
        size_gb: Option<u32>,
    ) -> Result<Option<Placement>, LifecycleError> {
        if let Some(handle) = zonal.snapshot_id.as_deref() {
            let snapshot = ResourceId::decode(handle)?;
            let found = self
                .describe_snapshot(snapshot.scope(), snapshot.local_id())
                .await?;
            if found.is_none() {
                warn!(snapshot_id = handle, "source snapshot not found; no volume created");
                return Ok(None);
            }
            return Ok(Some(Placement {
                scope: snapshot.scope().to_owned(),
                source: VolumeSource::Snapshot {
                    snapshot_id: snapshot.local_id().to_owned(),
                    size_gb,
                },
            }));
        }

        let size = size_gb.ok_or_else(|| {
            LifecycleError::invalid("size_gb is required when no source snapshot is given")
        })?;
        let scope = self.zone_scope(zonal).await?;
        Ok(Some(Placement {
            scope,
            source: VolumeSource::Empty { size_gb: size },
        }))
    }

    async fn zone_scope(&self, zonal: &ZonalVolumeOptions) -> Result<String, LifecycleError> {
        if let Some(location) = zonal
            .location_id
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
        {
            if location.contains(SEPARATOR) {
                return Err(IdentifierError::SeparatorInScope(location.to_owned()).into());
            }
            return Ok(location.to_owned());
        }
        let scopes = self.gateway.list_scopes().await?;
        resolve_zone_scope(zonal.availability_zone.trim(), &scopes).ok_or_else(|| {
            LifecycleError::invalid(format!(
                "no known location owns availability zone '{}'",
                zonal.availability_zone
            ))
        })
    }

    /// Refreshes a provisioning volume, failing fast once it errors.
    async fn refresh_provisioning(
        &self,
        scope: &str,
        volume_id: &str,
    ) -> Result<Option<RemoteVolume>, GatewayError> {
        match self.describe_volume(scope, volume_id).await? {
            Some(volume) if volume.state == VolumeState::Error => Err(GatewayError::remote(
                format!("volume {scope}/{volume_id} failed to provision"),
            )),
            other => Ok(other),
        }
    }
}
