//! Attach and detach flows.

use rstest::rstest;

use super::{EAST, WEST, coordinator, gateway, handle};
use crate::gateway::GatewayError;
use crate::lifecycle::LifecycleError;
use crate::test_support::{CallKind, SimulatedGateway};
use crate::volume::{AttachOptions, AttachmentFilter, DetachOptions, VolumeManager};

fn on_device(device: &str) -> DetachOptions {
    DetachOptions::Basic(AttachmentFilter {
        device: Some(device.to_owned()),
        node_id: None,
    })
}

fn on_node(node: &str) -> DetachOptions {
    DetachOptions::Basic(AttachmentFilter {
        device: None,
        node_id: Some(node.to_owned()),
    })
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn attached_volume_is_listed_for_its_node(gateway: SimulatedGateway) {
    let volume_id = handle(EAST, &gateway.seed_volume(EAST, "us-east-1a", 10));
    let manager = coordinator(&gateway);

    let attached = manager
        .attach_volume(&volume_id, "us-east-1/i-1", &AttachOptions::device("/dev/sdh"))
        .await
        .expect("attach");
    assert!(attached);

    let volumes = manager
        .list_volumes_for_node("us-east-1/i-1")
        .await
        .expect("list for node");
    assert_eq!(volumes.len(), 1);
    let volume = volumes.first().expect("one volume");
    assert_eq!(volume.id.to_string(), volume_id);
    assert_eq!(volume.device.as_deref(), Some("/dev/sdh"));

    let others = manager
        .list_volumes_for_node("us-east-1/i-2")
        .await
        .expect("list for other node");
    assert!(others.is_empty());
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn detached_attachment_records_are_not_listed(gateway: SimulatedGateway) {
    let local_id = gateway.seed_volume(EAST, "us-east-1a", 10);
    let volume_id = handle(EAST, &local_id);
    let manager = coordinator(&gateway);
    manager
        .attach_volume(&volume_id, "us-east-1/i-1", &AttachOptions::device("/dev/sdh"))
        .await
        .expect("attach");
    gateway.retain_detached_attachments(EAST, &local_id);

    let volumes = manager
        .list_volumes_for_node("us-east-1/i-1")
        .await
        .expect("list for node");
    assert!(volumes.is_empty());
    let volume = manager
        .get_volume(&volume_id)
        .await
        .expect("get")
        .expect("volume present");
    assert_eq!(volume.device, None);

    manager
        .attach_volume(&volume_id, "us-east-1/i-2", &AttachOptions::device("/dev/sdf"))
        .await
        .expect("reattach");
    let moved = manager
        .list_volumes_for_node("us-east-1/i-2")
        .await
        .expect("list for new node");
    assert_eq!(moved.len(), 1);
    assert_eq!(moved.first().and_then(|v| v.device.as_deref()), Some("/dev/sdf"));
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn cross_scope_node_is_rejected_before_any_call(gateway: SimulatedGateway) {
    let volume_id = handle(EAST, &gateway.seed_volume(EAST, "us-east-1a", 10));

    let err = coordinator(&gateway)
        .attach_volume(&volume_id, "eu-west-1/i-9", &AttachOptions::device("/dev/sdh"))
        .await
        .expect_err("cross-scope attach");

    assert!(matches!(err, LifecycleError::InvalidArgument(_)), "{err}");
    assert!(gateway.calls().is_empty());
}

#[rstest]
#[case("us-east-1/vol-1", "us-east-1/i-1", " ")]
#[case("vol-1", "us-east-1/i-1", "/dev/sdh")]
#[case("us-east-1/vol-1", "i-1", "/dev/sdh")]
#[tokio::test(start_paused = true)]
async fn malformed_attach_arguments_are_invalid(
    gateway: SimulatedGateway,
    #[case] volume_id: &str,
    #[case] node_id: &str,
    #[case] device: &str,
) {
    let err = coordinator(&gateway)
        .attach_volume(volume_id, node_id, &AttachOptions::device(device))
        .await
        .expect_err("invalid arguments");
    assert!(matches!(err, LifecycleError::InvalidArgument(_)), "{err}");
    assert!(gateway.calls().is_empty());
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn attaching_to_unknown_node_returns_false(gateway: SimulatedGateway) {
    let volume_id = handle(EAST, &gateway.seed_volume(EAST, "us-east-1a", 10));
    let attached = coordinator(&gateway)
        .attach_volume(&volume_id, "us-east-1/i-404", &AttachOptions::device("/dev/sdh"))
        .await
        .expect("attach");
    assert!(!attached);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn detach_without_attachment_makes_no_mutating_call(gateway: SimulatedGateway) {
    let volume_id = handle(EAST, &gateway.seed_volume(EAST, "us-east-1a", 10));

    let detached = coordinator(&gateway)
        .detach_volume(&volume_id, &DetachOptions::default())
        .await
        .expect("detach");

    assert!(!detached);
    assert!(gateway.mutating_calls().is_empty());
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn detach_of_missing_volume_returns_false(gateway: SimulatedGateway) {
    let detached = coordinator(&gateway)
        .detach_volume("us-east-1/vol-missing", &DetachOptions::default())
        .await
        .expect("detach");
    assert!(!detached);
    assert!(gateway.mutating_calls().is_empty());
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn detach_waits_until_attachment_disappears(gateway: SimulatedGateway) {
    let local_id = gateway.seed_volume(EAST, "us-east-1a", 10);
    let volume_id = handle(EAST, &local_id);
    let manager = coordinator(&gateway);
    manager
        .attach_volume(&volume_id, "us-east-1/i-1", &AttachOptions::device("/dev/sdh"))
        .await
        .expect("attach");

    let detached = manager
        .detach_volume(&volume_id, &on_node("us-east-1/i-1"))
        .await
        .expect("detach");

    assert!(detached);
    let remote = gateway.volume(EAST, &local_id).expect("volume");
    assert!(remote.attachments.is_empty());
    let volume = manager
        .get_volume(&volume_id)
        .await
        .expect("get")
        .expect("volume present");
    assert_eq!(volume.device, None);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn forced_detach_passes_force_flag(gateway: SimulatedGateway) {
    let volume_id = handle(EAST, &gateway.seed_volume(EAST, "us-east-1a", 10));
    let manager = coordinator(&gateway);
    manager
        .attach_volume(&volume_id, "us-east-1/i-2", &AttachOptions::device("/dev/sdf"))
        .await
        .expect("attach");

    let options = DetachOptions::Forceable {
        filter: AttachmentFilter {
            device: Some(String::from("/dev/sdf")),
            node_id: None,
        },
        force: true,
    };
    assert!(manager.detach_volume(&volume_id, &options).await.expect("detach"));

    let detach_call = gateway
        .calls()
        .into_iter()
        .find(|call| call.kind == CallKind::DetachVolume)
        .expect("detach call recorded");
    assert!(detach_call.force);
}

#[rstest]
#[case(on_device("/dev/sdz"))]
#[case(on_node("us-east-1/i-2"))]
#[tokio::test(start_paused = true)]
async fn unmatched_attachment_filter_returns_false(
    gateway: SimulatedGateway,
    #[case] options: DetachOptions,
) {
    let volume_id = handle(EAST, &gateway.seed_volume(EAST, "us-east-1a", 10));
    let manager = coordinator(&gateway);
    manager
        .attach_volume(&volume_id, "us-east-1/i-1", &AttachOptions::device("/dev/sdh"))
        .await
        .expect("attach");
    let before = gateway.mutating_calls().len();

    let detached = manager.detach_volume(&volume_id, &options).await.expect("detach");

    assert!(!detached);
    assert_eq!(gateway.mutating_calls().len(), before);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn detach_filter_in_another_scope_is_invalid(gateway: SimulatedGateway) {
    let volume_id = handle(EAST, &gateway.seed_volume(EAST, "us-east-1a", 10));
    let err = coordinator(&gateway)
        .detach_volume(&volume_id, &on_node(&handle(WEST, "i-9")))
        .await
        .expect_err("cross-scope detach");
    assert!(matches!(err, LifecycleError::InvalidArgument(_)), "{err}");
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn attachment_vanishing_during_detach_counts_as_success(gateway: SimulatedGateway) {
    let volume_id = handle(EAST, &gateway.seed_volume(EAST, "us-east-1a", 10));
    let manager = coordinator(&gateway);
    manager
        .attach_volume(&volume_id, "us-east-1/i-1", &AttachOptions::device("/dev/sdh"))
        .await
        .expect("attach");
    gateway.fail_next(
        CallKind::DetachVolume,
        GatewayError::not_found("attachment"),
    );

    let detached = manager
        .detach_volume(&volume_id, &DetachOptions::default())
        .await
        .expect("detach");
    assert!(detached);
}
