//! BDD step definitions for provider-side volume lifecycles.

use std::future::Future;

use blockyard::test_support::SimulatedGateway;
use blockyard::{
    AttachOptions, DetachOptions, LifecycleError, SnapshotOptions, VolumeManager, VolumeOptions,
    ZonalVolumeOptions,
};
use rstest_bdd_macros::{given, then, when};
use tokio::runtime::Runtime;

use super::test_helpers::{LifecycleWorld, Outcome, SCENARIO_ATTEMPTS};
use crate::test_constants::{EAST, WEST};

#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("failed to start runtime: {0}")]
    Runtime(String),
    #[error("assertion failed: {0}")]
    Assertion(String),
}

fn block_on<F: Future>(future: F) -> Result<F::Output, StepError> {
    let runtime = Runtime::new().map_err(|err| StepError::Runtime(err.to_string()))?;
    Ok(runtime.block_on(future))
}

fn record(mut world: LifecycleWorld, result: Result<bool, LifecycleError>) -> LifecycleWorld {
    world.outcome = Some(match result {
        Ok(done) => Outcome::Done(done),
        Err(err) => Outcome::Failed(err),
    });
    world
}

fn assertion(message: impl Into<String>) -> StepError {
    StepError::Assertion(message.into())
}

#[given("a provider that settles after \"{describes}\" describes")]
fn settling_provider(describes: u32) -> LifecycleWorld {
    let gateway = SimulatedGateway::new([EAST, WEST]).with_settle_after(describes);
    LifecycleWorld::with_gateway(gateway, SCENARIO_ATTEMPTS)
}

#[given("a provider that never settles within \"{attempts}\" attempts")]
fn stuck_provider(attempts: u32) -> LifecycleWorld {
    let gateway = SimulatedGateway::new([EAST, WEST]).with_settle_after(u32::MAX);
    LifecycleWorld::with_gateway(gateway, attempts)
}

#[given("an existing \"{size}\" GB volume in \"{scope}\"")]
fn existing_volume(
    mut lifecycle_world: LifecycleWorld,
    size: u32,
    scope: String,
) -> LifecycleWorld {
    let zone = format!("{scope}a");
    let local_id = lifecycle_world.gateway.seed_volume(&scope, &zone, size);
    lifecycle_world.volume_id = Some(format!("{scope}/{local_id}"));
    lifecycle_world
}

#[when("I create a \"{size}\" GB volume in zone \"{zone}\"")]
fn create_volume(
    mut lifecycle_world: LifecycleWorld,
    size: u32,
    zone: String,
) -> Result<LifecycleWorld, StepError> {
    let options = VolumeOptions::Zonal(ZonalVolumeOptions {
        availability_zone: zone,
        size_gb: Some(size),
        snapshot_id: None,
        location_id: None,
    });
    let manager = lifecycle_world.manager.clone();
    let created = block_on(async move { manager.create_volume("scenario", &options).await })?;
    let result = created.map(|volume| {
        lifecycle_world.volume_id = volume.map(|found| found.id.to_string());
        lifecycle_world.volume_id.is_some()
    });
    Ok(record(lifecycle_world, result))
}

#[when("I attach the volume to node \"{node}\" on \"{device}\"")]
fn attach_volume(
    lifecycle_world: LifecycleWorld,
    node: String,
    device: String,
) -> Result<LifecycleWorld, StepError> {
    let volume_id = lifecycle_world.volume_id();
    let manager = lifecycle_world.manager.clone();
    let result = block_on(async move {
        manager
            .attach_volume(&volume_id, &node, &AttachOptions::device(device))
            .await
    })?;
    Ok(record(lifecycle_world, result))
}

#[when("I detach the volume")]
fn detach_volume(lifecycle_world: LifecycleWorld) -> Result<LifecycleWorld, StepError> {
    let volume_id = lifecycle_world.volume_id();
    let manager = lifecycle_world.manager.clone();
    let result = block_on(async move {
        manager
            .detach_volume(&volume_id, &DetachOptions::default())
            .await
    })?;
    Ok(record(lifecycle_world, result))
}

#[when("I remove the volume")]
fn remove_volume(lifecycle_world: LifecycleWorld) -> Result<LifecycleWorld, StepError> {
    let volume_id = lifecycle_world.volume_id();
    let manager = lifecycle_world.manager.clone();
    let result = block_on(async move { manager.remove_volume(&volume_id).await })?;
    Ok(record(lifecycle_world, result))
}

#[when("I snapshot the volume")]
fn snapshot_volume(mut lifecycle_world: LifecycleWorld) -> Result<LifecycleWorld, StepError> {
    let volume_id = lifecycle_world.volume_id();
    let manager = lifecycle_world.manager.clone();
    let taken = block_on(async move {
        manager
            .create_snapshot(&volume_id, &SnapshotOptions::default())
            .await
    })?;
    let result = taken.map(|snapshot| {
        lifecycle_world.snapshot = snapshot;
        lifecycle_world.snapshot.is_some()
    });
    Ok(record(lifecycle_world, result))
}

#[when("I delete the snapshot")]
fn delete_snapshot(lifecycle_world: LifecycleWorld) -> Result<LifecycleWorld, StepError> {
    let snapshot_id = lifecycle_world
        .snapshot
        .as_ref()
        .map(|snapshot| snapshot.id.to_string())
        .ok_or_else(|| assertion("scenario should have a snapshot"))?;
    let manager = lifecycle_world.manager.clone();
    let result = block_on(async move { manager.delete_snapshot(&snapshot_id).await })?;
    Ok(record(lifecycle_world, result))
}

#[then("the operation succeeds")]
fn operation_succeeds(lifecycle_world: &LifecycleWorld) -> Result<(), StepError> {
    match &lifecycle_world.outcome {
        Some(Outcome::Done(true)) => Ok(()),
        other => Err(assertion(format!("expected success, got {other:?}"))),
    }
}

#[then("the operation reports nothing to do")]
fn operation_noop(lifecycle_world: &LifecycleWorld) -> Result<(), StepError> {
    match &lifecycle_world.outcome {
        Some(Outcome::Done(false)) => Ok(()),
        other => Err(assertion(format!("expected a negative outcome, got {other:?}"))),
    }
}

#[then("the operation times out after \"{attempts}\" attempts")]
fn operation_times_out(lifecycle_world: &LifecycleWorld, attempts: u32) -> Result<(), StepError> {
    match &lifecycle_world.outcome {
        Some(Outcome::Failed(LifecycleError::Timeout {
            attempts: observed, ..
        })) if *observed == attempts => Ok(()),
        other => Err(assertion(format!(
            "expected timeout after {attempts} attempts, got {other:?}"
        ))),
    }
}

#[then("the operation is rejected as invalid")]
fn operation_invalid(lifecycle_world: &LifecycleWorld) -> Result<(), StepError> {
    match &lifecycle_world.outcome {
        Some(Outcome::Failed(LifecycleError::InvalidArgument(_))) => Ok(()),
        other => Err(assertion(format!("expected invalid argument, got {other:?}"))),
    }
}

#[then("no mutating call was made")]
fn no_mutating_call(lifecycle_world: &LifecycleWorld) -> Result<(), StepError> {
    let calls = lifecycle_world.gateway.mutating_calls();
    if calls.is_empty() {
        Ok(())
    } else {
        Err(assertion(format!("unexpected mutating calls: {calls:?}")))
    }
}

#[then("the volume is available in \"{scope}\"")]
fn volume_available(lifecycle_world: &LifecycleWorld, scope: String) -> Result<(), StepError> {
    let volume_id = lifecycle_world.volume_id();
    let manager = lifecycle_world.manager.clone();
    let volume = block_on(async move { manager.get_volume(&volume_id).await })?
        .map_err(|err| assertion(err.to_string()))?
        .ok_or_else(|| assertion("volume should be listed"))?;
    if volume.location_id.as_deref() == Some(scope.as_str()) {
        Ok(())
    } else {
        Err(assertion(format!(
            "expected location {scope}, got {:?}",
            volume.location_id
        )))
    }
}

#[then("node \"{node}\" lists \"{count}\" volumes")]
fn node_lists(
    lifecycle_world: &LifecycleWorld,
    node: String,
    count: usize,
) -> Result<(), StepError> {
    let manager = lifecycle_world.manager.clone();
    let volumes = block_on(async move { manager.list_volumes_for_node(&node).await })?
        .map_err(|err| assertion(err.to_string()))?;
    if volumes.len() == count {
        Ok(())
    } else {
        Err(assertion(format!(
            "expected {count} volumes, got {}",
            volumes.len()
        )))
    }
}

#[then("the snapshot reports \"{size}\" GB")]
fn snapshot_size(lifecycle_world: &LifecycleWorld, size: u32) -> Result<(), StepError> {
    let snapshot = lifecycle_world
        .snapshot
        .as_ref()
        .ok_or_else(|| assertion("scenario should have a snapshot"))?;
    if snapshot.size_gb == Some(f64::from(size)) {
        Ok(())
    } else {
        Err(assertion(format!(
            "expected {size} GB, got {:?}",
            snapshot.size_gb
        )))
    }
}

#[then("the volume is gone")]
fn volume_gone(lifecycle_world: &LifecycleWorld) -> Result<(), StepError> {
    let volume_id = lifecycle_world.volume_id();
    let manager = lifecycle_world.manager.clone();
    let volume = block_on(async move { manager.get_volume(&volume_id).await })?
        .map_err(|err| assertion(err.to_string()))?;
    match volume {
        None => Ok(()),
        Some(found) => Err(assertion(format!("volume still listed: {found:?}"))),
    }
}
