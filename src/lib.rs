//! Core library for Blockyard, a provider-agnostic block storage lifecycle
//! layer.
//!
//! Volumes and snapshots are managed through the [`VolumeManager`] trait.
//! [`VolumeLifecycleCoordinator`] implements it over a
//! [`RemoteResourceGateway`], waiting for the eventually consistent remote
//! state to settle after each mutating call. [`MemoryVolumeStore`] implements
//! the same contract in memory for tests and plan replays.

pub mod config;
pub mod gateway;
pub mod identifier;
pub mod lifecycle;
pub mod poll;
pub mod replay;
pub mod store;
pub mod test_support;
pub mod volume;

pub use config::{ConfigError, LifecycleConfig};
pub use gateway::{GatewayError, RemoteResourceGateway};
pub use identifier::{IdentifierError, ResourceId};
pub use lifecycle::{LifecycleError, VolumeLifecycleCoordinator};
pub use poll::{CancelToken, ConditionPoller, PollError, PollPolicies, PollPolicy, Polled, Target};
pub use replay::{PlanStep, ReplayError, ReplayPlan, ReplayReport, StepReport};
pub use store::{MemoryVolumeStore, StoreError, StoreRegistry};
pub use volume::{
    AttachOptions, AttachmentFilter, BasicVolumeOptions, DetachOptions, Snapshot, SnapshotOptions,
    Volume, VolumeManager, VolumeOptions, VolumeType, ZonalVolumeOptions,
};
