//! BDD scenarios for provider-side volume lifecycles.

use rstest_bdd_macros::scenario;

use super::test_helpers::{LifecycleWorld, lifecycle_world};

#[scenario(
    path = "tests/features/lifecycle.feature",
    name = "Create a volume in an availability zone"
)]
fn scenario_create_volume(lifecycle_world: LifecycleWorld) {
    drop(lifecycle_world);
}

#[scenario(
    path = "tests/features/lifecycle.feature",
    name = "Attach and detach a volume"
)]
fn scenario_attach_detach(lifecycle_world: LifecycleWorld) {
    drop(lifecycle_world);
}

#[scenario(
    path = "tests/features/lifecycle.feature",
    name = "Reject attaching across regions"
)]
fn scenario_cross_region_attach(lifecycle_world: LifecycleWorld) {
    drop(lifecycle_world);
}

#[scenario(
    path = "tests/features/lifecycle.feature",
    name = "Detaching an unattached volume does nothing"
)]
fn scenario_detach_unattached(lifecycle_world: LifecycleWorld) {
    drop(lifecycle_world);
}

#[scenario(
    path = "tests/features/lifecycle.feature",
    name = "Give up on a volume that never settles"
)]
fn scenario_timeout(lifecycle_world: LifecycleWorld) {
    drop(lifecycle_world);
}

#[scenario(
    path = "tests/features/lifecycle.feature",
    name = "Snapshot a volume and delete the snapshot"
)]
fn scenario_snapshot(lifecycle_world: LifecycleWorld) {
    drop(lifecycle_world);
}

#[scenario(path = "tests/features/lifecycle.feature", name = "Remove a volume")]
fn scenario_remove_volume(lifecycle_world: LifecycleWorld) {
    drop(lifecycle_world);
}
