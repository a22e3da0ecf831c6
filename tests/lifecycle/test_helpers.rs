//! Shared fixtures for lifecycle BDD scenarios.

use std::time::Duration;

use blockyard::test_support::SimulatedGateway;
use blockyard::{LifecycleError, PollPolicies, PollPolicy, Snapshot, VolumeLifecycleCoordinator};
use rstest::fixture;

use crate::test_constants::{EAST, EAST_NODES, WEST, WEST_NODE};

/// Waits are real in these scenarios, so keep them short.
pub const SCENARIO_INTERVAL: Duration = Duration::from_millis(1);

/// Attempt budget for scenarios that expect a wait to succeed.
pub const SCENARIO_ATTEMPTS: u32 = 5;

#[derive(Clone, Debug)]
pub struct LifecycleWorld {
    pub gateway: SimulatedGateway,
    pub manager: VolumeLifecycleCoordinator<SimulatedGateway>,
    pub volume_id: Option<String>,
    pub snapshot: Option<Snapshot>,
    pub outcome: Option<Outcome>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Outcome {
    Done(bool),
    Failed(LifecycleError),
}

impl LifecycleWorld {
    pub fn with_gateway(gateway: SimulatedGateway, max_attempts: u32) -> Self {
        gateway.add_node(EAST, EAST_NODES[0]);
        gateway.add_node(EAST, EAST_NODES[1]);
        gateway.add_node(WEST, WEST_NODE);
        let policies = PollPolicies::uniform(PollPolicy::new(max_attempts, SCENARIO_INTERVAL));
        let manager = VolumeLifecycleCoordinator::new(gateway.clone()).with_policies(policies);
        Self {
            gateway,
            manager,
            volume_id: None,
            snapshot: None,
            outcome: None,
        }
    }

    pub fn volume_id(&self) -> String {
        self.volume_id
            .clone()
            .unwrap_or_else(|| panic!("scenario should have a volume"))
    }
}

#[fixture]
pub fn lifecycle_world() -> LifecycleWorld {
    LifecycleWorld::with_gateway(SimulatedGateway::new([EAST, WEST]), SCENARIO_ATTEMPTS)
}
