//! Test support utilities shared across unit and integration tests.
//!
//! [`SimulatedGateway`] is an in-process control plane with eventual
//! consistency: every mutating call leaves the resource in a transitional
//! state that only settles after it has been described a configurable number
//! of times. It records every call so tests can assert that an operation made
//! no mutating request.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::env;
use std::ffi::OsString;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;

use tokio::sync::{Mutex as AsyncMutex, MutexGuard as AsyncMutexGuard};
use uuid::Uuid;

use crate::gateway::{
    AttachmentState, CreateVolumeRequest, DetachRequest, GatewayError, GatewayFuture,
    RemoteAttachment, RemoteResourceGateway, RemoteSnapshot, RemoteVolume, SnapshotFilter,
    SnapshotState, VolumeSource, VolumeState,
};

/// Gateway operations, used to script failures and inspect the call log.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum CallKind {
    /// `list_scopes`.
    ListScopes,
    /// `describe_volumes`.
    DescribeVolumes,
    /// `create_volume`.
    CreateVolume,
    /// `delete_volume`.
    DeleteVolume,
    /// `attach_volume`.
    AttachVolume,
    /// `detach_volume`.
    DetachVolume,
    /// `describe_snapshots`.
    DescribeSnapshots,
    /// `create_snapshot`.
    CreateSnapshot,
    /// `delete_snapshot`.
    DeleteSnapshot,
}

impl CallKind {
    /// Returns `true` for calls that change remote state.
    #[must_use]
    pub const fn is_mutating(self) -> bool {
        !matches!(
            self,
            Self::ListScopes | Self::DescribeVolumes | Self::DescribeSnapshots
        )
    }
}

/// One recorded gateway call.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct GatewayCall {
    /// Operation invoked.
    pub kind: CallKind,
    /// Scope the call was routed to; empty for `list_scopes`.
    pub scope: String,
    /// Primary resource the call addressed, when it names one.
    pub target: Option<String>,
    /// Whether a detach asked for force.
    pub force: bool,
}

#[derive(Clone, Debug)]
struct SimulatedVolume {
    remote: RemoteVolume,
    remaining: u32,
}

impl SimulatedVolume {
    /// Completes every pending transition.
    fn settle(&mut self) {
        let volume = &mut self.remote;
        volume
            .attachments
            .retain(|attachment| attachment.state != AttachmentState::Detaching);
        for attachment in &mut volume.attachments {
            if attachment.state == AttachmentState::Attaching {
                attachment.state = AttachmentState::Attached;
            }
        }
        volume.state = match volume.state {
            VolumeState::Deleting | VolumeState::Deleted => VolumeState::Deleted,
            VolumeState::Error => VolumeState::Error,
            _ if volume
                .attachments
                .iter()
                .all(|attachment| attachment.state == AttachmentState::Detached) =>
            {
                VolumeState::Available
            }
            _ => VolumeState::InUse,
        };
    }

    fn observe(&mut self) -> RemoteVolume {
        if self.remaining > 0 {
            self.remaining -= 1;
            if self.remaining == 0 {
                self.settle();
            }
        }
        self.remote.clone()
    }
}

#[derive(Clone, Debug)]
struct SimulatedSnapshot {
    remote: RemoteSnapshot,
    remaining: u32,
}

impl SimulatedSnapshot {
    fn observe(&mut self) -> RemoteSnapshot {
        if self.remaining > 0 {
            self.remaining -= 1;
            if self.remaining == 0 && self.remote.state == SnapshotState::Pending {
                self.remote.state = SnapshotState::Completed;
            }
        }
        self.remote.clone()
    }
}

type Key = (String, String);

fn key(scope: &str, id: &str) -> Key {
    (scope.to_owned(), id.to_owned())
}

fn mint(prefix: &str) -> String {
    format!("{prefix}-{}", Uuid::new_v4().simple())
}

#[derive(Debug, Default)]
struct SimulatedState {
    scopes: BTreeSet<String>,
    nodes: BTreeSet<Key>,
    volumes: BTreeMap<Key, SimulatedVolume>,
    snapshots: BTreeMap<Key, SimulatedSnapshot>,
    settle_after: u32,
    missing_ids_error: bool,
    failures: BTreeMap<CallKind, VecDeque<GatewayError>>,
    calls: Vec<GatewayCall>,
}

impl SimulatedState {
    fn record(
        &mut self,
        kind: CallKind,
        scope: &str,
        target: Option<&str>,
        force: bool,
    ) -> Result<(), GatewayError> {
        self.calls.push(GatewayCall {
            kind,
            scope: scope.to_owned(),
            target: target.map(str::to_owned),
            force,
        });
        match self.failures.get_mut(&kind).and_then(VecDeque::pop_front) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn live_volume(
        &mut self,
        scope: &str,
        volume_id: &str,
    ) -> Result<&mut SimulatedVolume, GatewayError> {
        self.volumes
            .get_mut(&key(scope, volume_id))
            .filter(|volume| volume.remote.state != VolumeState::Deleted)
            .ok_or_else(|| GatewayError::not_found(format!("volume {scope}/{volume_id}")))
    }

    fn describe_volumes(
        &mut self,
        scope: &str,
        ids: &[String],
    ) -> Result<Vec<RemoteVolume>, GatewayError> {
        let wanted: BTreeSet<&str> = ids.iter().map(String::as_str).collect();
        let described: Vec<RemoteVolume> = self
            .volumes
            .iter_mut()
            .filter(|((volume_scope, id), _)| {
                volume_scope == scope && (wanted.is_empty() || wanted.contains(id.as_str()))
            })
            .map(|(_, volume)| volume.observe())
            .collect();
        if self.missing_ids_error && !wanted.is_empty() && described.is_empty() {
            return Err(GatewayError::not_found(format!("volumes {ids:?} in {scope}")));
        }
        Ok(described)
    }

    fn create_volume(
        &mut self,
        scope: &str,
        request: &CreateVolumeRequest,
    ) -> Result<RemoteVolume, GatewayError> {
        if !self.scopes.contains(scope) {
            return Err(GatewayError::remote(format!("unknown location {scope}")));
        }
        let (size_gb, snapshot_id) = match &request.source {
            VolumeSource::Empty { size_gb } => (*size_gb, None),
            VolumeSource::Snapshot {
                snapshot_id,
                size_gb,
            } => {
                let snapshot = self
                    .snapshots
                    .get(&key(scope, snapshot_id))
                    .ok_or_else(|| {
                        GatewayError::not_found(format!("snapshot {scope}/{snapshot_id}"))
                    })?;
                (
                    size_gb.unwrap_or(snapshot.remote.volume_size_gb),
                    Some(snapshot_id.clone()),
                )
            }
        };
        let mut volume = SimulatedVolume {
            remote: RemoteVolume {
                id: mint("vol"),
                scope: scope.to_owned(),
                zone: request.zone.clone(),
                size_gb,
                state: VolumeState::Creating,
                name: request.name.clone(),
                snapshot_id,
                attachments: Vec::new(),
            },
            remaining: self.settle_after,
        };
        if volume.remaining == 0 {
            volume.settle();
        }
        let remote = volume.remote.clone();
        self.volumes.insert(key(scope, &remote.id), volume);
        Ok(remote)
    }

    fn delete_volume(&mut self, scope: &str, volume_id: &str) -> Result<(), GatewayError> {
        let settle_after = self.settle_after;
        let volume = self.live_volume(scope, volume_id)?;
        if volume
            .remote
            .attachments
            .iter()
            .any(|attachment| attachment.state != AttachmentState::Detached)
        {
            return Err(GatewayError::remote(format!("volume {scope}/{volume_id} is in use")));
        }
        volume.remote.state = VolumeState::Deleting;
        volume.remaining = settle_after;
        if settle_after == 0 {
            volume.settle();
        }
        Ok(())
    }

    fn attach_volume(
        &mut self,
        scope: &str,
        volume_id: &str,
        node_id: &str,
        device: &str,
    ) -> Result<RemoteAttachment, GatewayError> {
        if !self.nodes.contains(&key(scope, node_id)) {
            return Err(GatewayError::not_found(format!("node {scope}/{node_id}")));
        }
        let settle_after = self.settle_after;
        let volume = self.live_volume(scope, volume_id)?;
        if !volume.remote.attachments.is_empty() {
            return Err(GatewayError::remote(format!(
                "volume {scope}/{volume_id} is already attached"
            )));
        }
        let attachment = RemoteAttachment {
            volume_id: volume_id.to_owned(),
            node_id: node_id.to_owned(),
            device: device.to_owned(),
            boot: false,
            state: AttachmentState::Attaching,
        };
        volume.remote.attachments.push(attachment.clone());
        volume.remote.state = VolumeState::InUse;
        volume.remaining = settle_after;
        if settle_after == 0 {
            volume.settle();
        }
        Ok(attachment)
    }

    fn detach_volume(
        &mut self,
        scope: &str,
        volume_id: &str,
        request: &DetachRequest,
    ) -> Result<(), GatewayError> {
        let settle_after = self.settle_after;
        let volume = self.live_volume(scope, volume_id)?;
        let attachment = volume
            .remote
            .attachments
            .iter_mut()
            .find(|attachment| {
                attachment.state != AttachmentState::Detached
                    && request
                        .device
                        .as_deref()
                        .is_none_or(|device| device == attachment.device)
                    && request
                        .node_id
                        .as_deref()
                        .is_none_or(|node| node == attachment.node_id)
            })
            .ok_or_else(|| {
                GatewayError::not_found(format!("attachment of {scope}/{volume_id}"))
            })?;
        attachment.state = AttachmentState::Detaching;
        volume.remaining = settle_after;
        if settle_after == 0 {
            volume.settle();
        }
        Ok(())
    }

    fn describe_snapshots(
        &mut self,
        scope: &str,
        filter: &SnapshotFilter,
    ) -> Result<Vec<RemoteSnapshot>, GatewayError> {
        let described: Vec<RemoteSnapshot> = self
            .snapshots
            .iter_mut()
            .filter(|((snapshot_scope, _), snapshot)| {
                snapshot_scope == scope && filter.matches(&snapshot.remote)
            })
            .map(|(_, snapshot)| snapshot.observe())
            .collect();
        if self.missing_ids_error && !filter.ids.is_empty() && described.is_empty() {
            return Err(GatewayError::not_found(format!("snapshots {:?} in {scope}", filter.ids)));
        }
        Ok(described)
    }

    fn create_snapshot(
        &mut self,
        scope: &str,
        volume_id: &str,
        name: Option<&str>,
    ) -> Result<RemoteSnapshot, GatewayError> {
        let volume_size_gb = self.live_volume(scope, volume_id)?.remote.size_gb;
        let mut snapshot = SimulatedSnapshot {
            remote: RemoteSnapshot {
                id: mint("snap"),
                scope: scope.to_owned(),
                volume_id: volume_id.to_owned(),
                volume_size_gb,
                state: SnapshotState::Pending,
                name: name.map(str::to_owned),
                started_at: Some(SystemTime::now()),
            },
            remaining: self.settle_after,
        };
        if snapshot.remaining == 0 {
            snapshot.remote.state = SnapshotState::Completed;
        }
        let remote = snapshot.remote.clone();
        self.snapshots.insert(key(scope, &remote.id), snapshot);
        Ok(remote)
    }

    fn delete_snapshot(&mut self, scope: &str, snapshot_id: &str) -> Result<(), GatewayError> {
        self.snapshots
            .remove(&key(scope, snapshot_id))
            .map(|_| ())
            .ok_or_else(|| GatewayError::not_found(format!("snapshot {scope}/{snapshot_id}")))
    }
}

/// In-process [`RemoteResourceGateway`] with delayed state transitions.
///
/// Clones share state, so a test can keep a handle after moving a clone into
/// a coordinator.
#[derive(Clone, Debug, Default)]
pub struct SimulatedGateway {
    state: Arc<Mutex<SimulatedState>>,
}

impl SimulatedGateway {
    /// Creates a gateway knowing `scopes`, where transitions settle on the
    /// first describe after the mutating call.
    #[must_use]
    pub fn new<I, S>(scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let gateway = Self::default();
        {
            let mut state = gateway.lock();
            state.scopes = scopes.into_iter().map(Into::into).collect();
            state.settle_after = 1;
        }
        gateway
    }

    /// Number of describes a transitional resource needs before it settles.
    /// Zero settles immediately; `u32::MAX` effectively never settles.
    #[must_use]
    pub fn with_settle_after(self, describes: u32) -> Self {
        self.lock().settle_after = describes;
        self
    }

    /// Makes describes naming only unknown ids fail with not-found instead of
    /// returning an empty list.
    #[must_use]
    pub fn with_missing_ids_error(self) -> Self {
        self.lock().missing_ids_error = true;
        self
    }

    fn lock(&self) -> MutexGuard<'_, SimulatedState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a compute node that volumes can attach to.
    pub fn add_node(&self, scope: &str, node_id: &str) {
        self.lock().nodes.insert(key(scope, node_id));
    }

    /// Inserts an available volume and returns its provider id.
    #[must_use]
    pub fn seed_volume(&self, scope: &str, zone: &str, size_gb: u32) -> String {
        let id = mint("vol");
        let volume = SimulatedVolume {
            remote: RemoteVolume {
                id: id.clone(),
                scope: scope.to_owned(),
                zone: zone.to_owned(),
                size_gb,
                state: VolumeState::Available,
                name: None,
                snapshot_id: None,
                attachments: Vec::new(),
            },
            remaining: 0,
        };
        self.lock().volumes.insert(key(scope, &id), volume);
        id
    }

    /// Inserts a completed snapshot of `volume_id` and returns its provider id.
    #[must_use]
    pub fn seed_snapshot(&self, scope: &str, volume_id: &str, volume_size_gb: u32) -> String {
        let id = mint("snap");
        let snapshot = SimulatedSnapshot {
            remote: RemoteSnapshot {
                id: id.clone(),
                scope: scope.to_owned(),
                volume_id: volume_id.to_owned(),
                volume_size_gb,
                state: SnapshotState::Completed,
                name: None,
                started_at: Some(SystemTime::now()),
            },
            remaining: 0,
        };
        self.lock().snapshots.insert(key(scope, &id), snapshot);
        id
    }

    /// Forces a volume into `state`, cancelling any pending transition.
    pub fn set_volume_state(&self, scope: &str, volume_id: &str, state: VolumeState) {
        if let Some(volume) = self.lock().volumes.get_mut(&key(scope, volume_id)) {
            volume.remote.state = state;
            volume.remaining = 0;
        }
    }

    /// Marks every attachment of a volume detached but keeps the records, as
    /// providers that report attachment history do.
    pub fn retain_detached_attachments(&self, scope: &str, volume_id: &str) {
        if let Some(volume) = self.lock().volumes.get_mut(&key(scope, volume_id)) {
            for attachment in &mut volume.remote.attachments {
                attachment.state = AttachmentState::Detached;
            }
            volume.remote.state = VolumeState::Available;
            volume.remaining = 0;
        }
    }

    /// Queues `error` as the outcome of the next `kind` call.
    pub fn fail_next(&self, kind: CallKind, error: GatewayError) {
        self.lock().failures.entry(kind).or_default().push_back(error);
    }

    /// Current record of a volume, tombstones included, without advancing it.
    #[must_use]
    pub fn volume(&self, scope: &str, volume_id: &str) -> Option<RemoteVolume> {
        self.lock()
            .volumes
            .get(&key(scope, volume_id))
            .map(|volume| volume.remote.clone())
    }

    /// Number of non-tombstoned volumes.
    #[must_use]
    pub fn live_volume_count(&self) -> usize {
        self.lock()
            .volumes
            .values()
            .filter(|volume| volume.remote.state != VolumeState::Deleted)
            .count()
    }

    /// Number of snapshots.
    #[must_use]
    pub fn snapshot_count(&self) -> usize {
        self.lock().snapshots.len()
    }

    /// Every call made so far, oldest first.
    #[must_use]
    pub fn calls(&self) -> Vec<GatewayCall> {
        self.lock().calls.clone()
    }

    /// Calls that changed remote state.
    #[must_use]
    pub fn mutating_calls(&self) -> Vec<GatewayCall> {
        self.calls()
            .into_iter()
            .filter(|call| call.kind.is_mutating())
            .collect()
    }

    /// Number of calls of `kind` made so far.
    #[must_use]
    pub fn call_count(&self, kind: CallKind) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|call| call.kind == kind)
            .count()
    }
}

impl RemoteResourceGateway for SimulatedGateway {
    fn list_scopes(&self) -> GatewayFuture<'_, Vec<String>> {
        Box::pin(async move {
            let mut state = self.lock();
            state.record(CallKind::ListScopes, "", None, false)?;
            Ok(state.scopes.iter().cloned().collect())
        })
    }

    fn describe_volumes<'a>(
        &'a self,
        scope: &'a str,
        ids: &'a [String],
    ) -> GatewayFuture<'a, Vec<RemoteVolume>> {
        Box::pin(async move {
            let mut state = self.lock();
            state.record(CallKind::DescribeVolumes, scope, ids.first().map(String::as_str), false)?;
            state.describe_volumes(scope, ids)
        })
    }

    fn create_volume<'a>(
        &'a self,
        scope: &'a str,
        request: &'a CreateVolumeRequest,
    ) -> GatewayFuture<'a, RemoteVolume> {
        Box::pin(async move {
            let mut state = self.lock();
            state.record(CallKind::CreateVolume, scope, request.name.as_deref(), false)?;
            state.create_volume(scope, request)
        })
    }

    fn delete_volume<'a>(&'a self, scope: &'a str, volume_id: &'a str) -> GatewayFuture<'a, ()> {
        Box::pin(async move {
            let mut state = self.lock();
            state.record(CallKind::DeleteVolume, scope, Some(volume_id), false)?;
            state.delete_volume(scope, volume_id)
        })
    }

    fn attach_volume<'a>(
        &'a self,
        scope: &'a str,
        volume_id: &'a str,
        node_id: &'a str,
        device: &'a str,
    ) -> GatewayFuture<'a, RemoteAttachment> {
        Box::pin(async move {
            let mut state = self.lock();
            state.record(CallKind::AttachVolume, scope, Some(volume_id), false)?;
            state.attach_volume(scope, volume_id, node_id, device)
        })
    }

    fn detach_volume<'a>(
        &'a self,
        scope: &'a str,
        volume_id: &'a str,
        request: &'a DetachRequest,
    ) -> GatewayFuture<'a, ()> {
        Box::pin(async move {
            let mut state = self.lock();
            state.record(CallKind::DetachVolume, scope, Some(volume_id), request.force)?;
            state.detach_volume(scope, volume_id, request)
        })
    }

    fn describe_snapshots<'a>(
        &'a self,
        scope: &'a str,
        filter: &'a SnapshotFilter,
    ) -> GatewayFuture<'a, Vec<RemoteSnapshot>> {
        Box::pin(async move {
            let mut state = self.lock();
            state.record(
                CallKind::DescribeSnapshots,
                scope,
                filter.ids.first().map(String::as_str),
                false,
            )?;
            state.describe_snapshots(scope, filter)
        })
    }

    fn create_snapshot<'a>(
        &'a self,
        scope: &'a str,
        volume_id: &'a str,
        name: Option<&'a str>,
    ) -> GatewayFuture<'a, RemoteSnapshot> {
        Box::pin(async move {
            let mut state = self.lock();
            state.record(CallKind::CreateSnapshot, scope, Some(volume_id), false)?;
            state.create_snapshot(scope, volume_id, name)
        })
    }

    fn delete_snapshot<'a>(
        &'a self,
        scope: &'a str,
        snapshot_id: &'a str,
    ) -> GatewayFuture<'a, ()> {
        Box::pin(async move {
            let mut state = self.lock();
            state.record(CallKind::DeleteSnapshot, scope, Some(snapshot_id), false)?;
            state.delete_snapshot(scope, snapshot_id)
        })
    }
}

/// Global mutex used to serialise environment mutation in tests.
pub static ENV_LOCK: AsyncMutex<()> = AsyncMutex::const_new(());

/// Guard that holds the env mutex and restores variables on drop.
pub struct EnvGuard {
    previous: Vec<(String, Option<OsString>)>,
    _guard: AsyncMutexGuard<'static, ()>,
}

impl EnvGuard {
    /// Sets multiple environment variables while holding a global mutex.
    pub async fn set_vars(pairs: &[(&str, &str)]) -> Self {
        debug_assert!(
            {
                let mut seen = BTreeSet::new();
                pairs.iter().all(|(name, _)| seen.insert(*name))
            },
            "duplicate environment variable keys passed to EnvGuard::set_vars"
        );

        let guard = ENV_LOCK.lock().await;
        let mut previous = Vec::with_capacity(pairs.len());
        for (name, value) in pairs {
            let old = env::var_os(name);
            // SAFETY: Environment mutation is serialised by `ENV_LOCK`, preventing races.
            unsafe { env::set_var(name, value) };
            previous.push(((*name).to_owned(), old));
        }

        Self {
            previous,
            _guard: guard,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (name, old) in &self.previous {
            // SAFETY: Environment mutation is serialised by holding `_guard`.
            unsafe {
                match old {
                    Some(val) => env::set_var(name, val),
                    None => env::remove_var(name),
                }
            }
        }
    }
}
