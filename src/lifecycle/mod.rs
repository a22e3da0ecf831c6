//! Provider-side volume lifecycle coordination.
//!
//! [`VolumeLifecycleCoordinator`] turns [`VolumeManager`] calls into
//! [`RemoteResourceGateway`] requests and waits for the eventually
//! consistent remote state to settle before reporting success.

mod convert;
mod error;
mod listing;
mod snapshot;
mod volume_attach;
mod volume_create;
mod volume_detach;
mod volume_remove;

use std::future::Future;
use std::sync::Arc;

use tracing::debug;

use crate::config::{ConfigError, LifecycleConfig};
use crate::gateway::{GatewayError, RemoteResourceGateway};
use crate::poll::{
    CancelToken, ConditionPoller, PollError, PollPolicies, PollPolicy, Polled, Target,
};
use crate::volume::{
    AttachOptions, DetachOptions, ManagerFuture, Snapshot, SnapshotOptions, Volume, VolumeManager,
    VolumeOptions, VolumeType,
};

use convert::StateLabel;

pub use error::LifecycleError;

/// Mutating operations that wait on remote state.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Operation {
    CreateVolume,
    AttachVolume,
    DetachVolume,
    RemoveVolume,
    CreateSnapshot,
}

impl Operation {
    const fn name(self) -> &'static str {
        match self {
            Self::CreateVolume => "create_volume",
            Self::AttachVolume => "attach_volume",
            Self::DetachVolume => "detach_volume",
            Self::RemoveVolume => "remove_volume",
            Self::CreateSnapshot => "create_snapshot",
        }
    }

    const fn policy(self, policies: &PollPolicies) -> PollPolicy {
        match self {
            Self::CreateVolume => policies.provisioning,
            Self::AttachVolume | Self::DetachVolume => policies.attachment,
            Self::RemoveVolume => policies.deletion,
            Self::CreateSnapshot => policies.snapshot,
        }
    }

    // A vanished attachment counts as detached, a vanished volume as removed.
    const fn target(self) -> Target {
        match self {
            Self::DetachVolume | Self::RemoveVolume => Target::Deletion,
            Self::CreateVolume | Self::AttachVolume | Self::CreateSnapshot => Target::State,
        }
    }
}

/// Drives volume and snapshot lifecycles against one provider.
///
/// Cloning is cheap: clones share the gateway and the cancellation token, so
/// each operation can run on its own task.
#[derive(Debug)]
pub struct VolumeLifecycleCoordinator<G> {
    gateway: Arc<G>,
    policies: PollPolicies,
    volume_type: VolumeType,
    cancel: CancelToken,
}

impl<G> Clone for VolumeLifecycleCoordinator<G> {
    fn clone(&self) -> Self {
        Self {
            gateway: Arc::clone(&self.gateway),
            policies: self.policies,
            volume_type: self.volume_type,
            cancel: self.cancel.clone(),
        }
    }
}

impl<G: RemoteResourceGateway> VolumeLifecycleCoordinator<G> {
    /// Creates a coordinator with the default poll policies and SAN volumes.
    #[must_use]
    pub fn new(gateway: G) -> Self {
        Self {
            gateway: Arc::new(gateway),
            policies: PollPolicies::default(),
            volume_type: VolumeType::default(),
            cancel: CancelToken::new(),
        }
    }

    /// Overrides the poll policies.
    #[must_use]
    pub const fn with_policies(mut self, policies: PollPolicies) -> Self {
        self.policies = policies;
        self
    }

    /// Overrides the storage class reported for this provider's volumes.
    #[must_use]
    pub const fn with_volume_type(mut self, volume_type: VolumeType) -> Self {
        self.volume_type = volume_type;
        self
    }

    /// Applies the poll budgets and volume type from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the configuration fails validation.
    pub fn with_config(self, config: &LifecycleConfig) -> Result<Self, ConfigError> {
        let policies = config.policies()?;
        let volume_type = config.volume_type()?;
        Ok(self.with_policies(policies).with_volume_type(volume_type))
    }

    /// Uses `cancel` to abort waits.
    ///
    /// Give a clone its own token to cancel its waits without touching the
    /// coordinator it was cloned from.
    #[must_use]
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Token aborting this coordinator's waits.
    ///
    /// Clones share the token and cancellation is permanent: once cancelled,
    /// every current and later wait on this coordinator and its clones fails
    /// with [`LifecycleError::Cancelled`] until a fresh token is installed
    /// with [`Self::with_cancel_token`].
    #[must_use]
    pub const fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Poll policies in effect.
    #[must_use]
    pub const fn policies(&self) -> PollPolicies {
        self.policies
    }

    /// Waits for `subject` to settle and translates poll failures.
    async fn settle<T, R, F, Fut>(
        &self,
        operation: Operation,
        resource: &str,
        subject: T,
        ready: R,
        refresh: F,
    ) -> Result<Polled<T>, LifecycleError>
    where
        T: StateLabel,
        R: FnMut(&T) -> bool,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Option<T>, GatewayError>>,
    {
        let action = operation.name();
        debug!(action, resource, state = %subject.state_label(), "waiting for remote state");
        let poller = ConditionPoller::new(operation.policy(&self.policies))
            .with_cancel_token(self.cancel.clone());
        poller
            .wait_for(subject, operation.target(), ready, refresh)
            .await
            .map_err(|err| match err {
                PollError::Timeout { attempts, last } => LifecycleError::Timeout {
                    action: action.to_owned(),
                    resource: resource.to_owned(),
                    attempts,
                    last_state: last.state_label(),
                },
                PollError::Cancelled => LifecycleError::Cancelled {
                    action: action.to_owned(),
                    resource: resource.to_owned(),
                },
                PollError::NotFound => LifecycleError::NotFound {
                    resource: resource.to_owned(),
                },
                PollError::Remote(source) => source.into(),
            })
    }
}

impl<G: RemoteResourceGateway> VolumeManager for VolumeLifecycleCoordinator<G> {
    type Error = LifecycleError;

    fn list_volumes(&self) -> ManagerFuture<'_, Vec<Volume>, Self::Error> {
        Box::pin(async move { self.all_volumes().await })
    }

    fn list_volumes_in_location<'a>(
        &'a self,
        location_id: &'a str,
    ) -> ManagerFuture<'a, Vec<Volume>, Self::Error> {
        Box::pin(async move { self.volumes_in_scope(location_id).await })
    }

    fn list_volumes_for_node<'a>(
        &'a self,
        node_id: &'a str,
    ) -> ManagerFuture<'a, Vec<Volume>, Self::Error> {
        Box::pin(async move { self.volumes_for_node(node_id).await })
    }

    fn get_volume<'a>(&'a self, id: &'a str) -> ManagerFuture<'a, Option<Volume>, Self::Error> {
        Box::pin(async move { self.volume_by_id(id).await })
    }

    fn create_volume<'a>(
        &'a self,
        name: &'a str,
        options: &'a VolumeOptions,
    ) -> ManagerFuture<'a, Option<Volume>, Self::Error> {
        Box::pin(async move { self.create(name, options).await })
    }

    fn remove_volume<'a>(&'a self, id: &'a str) -> ManagerFuture<'a, bool, Self::Error> {
        Box::pin(async move { self.remove(id).await })
    }

    fn attach_volume<'a>(
        &'a self,
        volume_id: &'a str,
        node_id: &'a str,
        options: &'a AttachOptions,
    ) -> ManagerFuture<'a, bool, Self::Error> {
        Box::pin(async move { self.attach(volume_id, node_id, options).await })
    }

    fn detach_volume<'a>(
        &'a self,
        volume_id: &'a str,
        options: &'a DetachOptions,
    ) -> ManagerFuture<'a, bool, Self::Error> {
        Box::pin(async move { self.detach(volume_id, options).await })
    }

    fn list_snapshots(&self) -> ManagerFuture<'_, Vec<Snapshot>, Self::Error> {
        Box::pin(async move { self.all_snapshots().await })
    }

    fn list_snapshots_in_location<'a>(
        &'a self,
        location_id: &'a str,
    ) -> ManagerFuture<'a, Vec<Snapshot>, Self::Error> {
        Box::pin(async move { self.snapshots_in_scope(location_id).await })
    }

    fn list_snapshots_for_volume<'a>(
        &'a self,
        volume_id: &'a str,
    ) -> ManagerFuture<'a, Vec<Snapshot>, Self::Error> {
        Box::pin(async move { self.snapshots_for_volume(volume_id).await })
    }

    fn get_snapshot<'a>(
        &'a self,
        id: &'a str,
    ) -> ManagerFuture<'a, Option<Snapshot>, Self::Error> {
        Box::pin(async move { self.snapshot_by_id(id).await })
    }

    fn create_snapshot<'a>(
        &'a self,
        volume_id: &'a str,
        options: &'a SnapshotOptions,
    ) -> ManagerFuture<'a, Option<Snapshot>, Self::Error> {
        Box::pin(async move { self.snapshot_volume(volume_id, options).await })
    }

    fn delete_snapshot<'a>(&'a self, id: &'a str) -> ManagerFuture<'a, bool, Self::Error> {
        Box::pin(async move { self.remove_snapshot(id).await })
    }
}

#[cfg(test)]
mod tests;
