//! Unit tests for the volume lifecycle coordinator.

mod attachment;

use rstest::fixture;

use crate::test_support::SimulatedGateway;
use crate::volume::{VolumeOptions, ZonalVolumeOptions};

use super::VolumeLifecycleCoordinator;

const EAST: &str = "us-east-1";
const WEST: &str = "eu-west-1";

#[fixture]
fn gateway() -> SimulatedGateway {
    let gateway = SimulatedGateway::new([EAST, WEST]);
    gateway.add_node(EAST, "i-1");
    gateway.add_node(EAST, "i-2");
    gateway.add_node(WEST, "i-9");
    gateway
}

fn coordinator(gateway: &SimulatedGateway) -> VolumeLifecycleCoordinator<SimulatedGateway> {
    VolumeLifecycleCoordinator::new(gateway.clone())
}

fn zonal(zone: &str, size_gb: Option<u32>) -> VolumeOptions {
    VolumeOptions::Zonal(ZonalVolumeOptions {
        availability_zone: zone.to_owned(),
        size_gb,
        snapshot_id: None,
        location_id: None,
    })
}

fn handle(scope: &str, id: &str) -> String {
    format!("{scope}/{id}")
}
