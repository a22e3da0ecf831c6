//! Replays JSON lifecycle plans against the in-memory reference store.
//!
//! A plan names a tenant, a default location, and an ordered list of steps.
//! Steps run one after another against a fresh [`MemoryVolumeStore`]; the
//! report records what each step did and the inventory left behind.
//!
//! Store-assigned handles are not known when a plan is written, so creating
//! steps may `bind` their result to a label that later steps reference as
//! `@label`.

use std::collections::BTreeMap;

use camino::Utf8Path;
use cap_std::{ambient_authority, fs_utf8::Dir};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::identifier::ResourceId;
use crate::store::{MemoryVolumeStore, StoreError};
use crate::volume::{
    AttachOptions, DetachOptions, Snapshot, SnapshotOptions, Volume, VolumeManager, VolumeOptions,
};

/// Prefix marking a reference to a bound label.
pub const REFERENCE_PREFIX: char = '@';

/// A lifecycle plan.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ReplayPlan {
    /// Tenant owning the replayed store.
    pub tenant: String,
    /// Location used when a step names none.
    pub default_location: String,
    /// Steps, applied in order.
    #[serde(default)]
    pub steps: Vec<PlanStep>,
}

/// One lifecycle operation in a plan.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum PlanStep {
    /// Creates a volume.
    CreateVolume {
        /// Volume name.
        name: String,
        /// Creation options.
        options: VolumeOptions,
        /// Label the new handle is bound to.
        #[serde(default)]
        bind: Option<String>,
    },
    /// Attaches a volume to a node.
    AttachVolume {
        /// Volume handle or reference.
        volume: String,
        /// Node handle.
        node: String,
        /// Device path.
        device: String,
    },
    /// Detaches a volume.
    DetachVolume {
        /// Volume handle or reference.
        volume: String,
        /// Attachment selection.
        #[serde(default)]
        options: DetachOptions,
    },
    /// Removes a volume.
    RemoveVolume {
        /// Volume handle or reference.
        volume: String,
    },
    /// Snapshots a volume.
    CreateSnapshot {
        /// Volume handle or reference.
        volume: String,
        /// Snapshot name.
        #[serde(default)]
        name: Option<String>,
        /// Label the new handle is bound to.
        #[serde(default)]
        bind: Option<String>,
    },
    /// Deletes a snapshot.
    DeleteSnapshot {
        /// Snapshot handle or reference.
        snapshot: String,
    },
}

impl PlanStep {
    /// Operation name, as written in plans.
    #[must_use]
    pub const fn op(&self) -> &'static str {
        match self {
            Self::CreateVolume { .. } => "create_volume",
            Self::AttachVolume { .. } => "attach_volume",
            Self::DetachVolume { .. } => "detach_volume",
            Self::RemoveVolume { .. } => "remove_volume",
            Self::CreateSnapshot { .. } => "create_snapshot",
            Self::DeleteSnapshot { .. } => "delete_snapshot",
        }
    }
}

/// What one step did.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct StepReport {
    /// Zero-based position in the plan.
    pub index: usize,
    /// Operation name.
    pub op: &'static str,
    /// Whether the store changed. `false` marks a negative outcome such as
    /// a missing volume.
    pub changed: bool,
    /// Handle of the created resource, for creating steps that succeeded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<ResourceId>,
}

/// Outcome of a replay.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ReplayReport {
    /// Tenant the plan ran for.
    pub tenant: String,
    /// Per-step outcomes, in plan order.
    pub steps: Vec<StepReport>,
    /// Volumes left in the store.
    pub volumes: Vec<Volume>,
    /// Snapshots left in the store.
    pub snapshots: Vec<Snapshot>,
}

/// Errors raised while loading or replaying a plan.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ReplayError {
    /// Raised when the plan file cannot be read.
    #[error("failed to read plan {path}: {message}")]
    Read {
        /// Plan path.
        path: String,
        /// Underlying I/O error.
        message: String,
    },
    /// Raised when the plan is not valid JSON for a plan.
    #[error("failed to parse plan: {0}")]
    Parse(String),
    /// Raised when a step references a label no earlier step bound.
    #[error("step {step}: unbound reference '{reference}'")]
    UnboundReference {
        /// Zero-based step index.
        step: usize,
        /// Reference as written.
        reference: String,
    },
    /// Raised when the store rejects a step.
    #[error("step {step}: {source}")]
    Store {
        /// Zero-based step index.
        step: usize,
        /// Store failure.
        #[source]
        source: StoreError,
    },
}

impl ReplayPlan {
    /// Parses a plan from JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`ReplayError::Parse`] when the text is not a valid plan.
    pub fn from_json(text: &str) -> Result<Self, ReplayError> {
        serde_json::from_str(text).map_err(|err| ReplayError::Parse(err.to_string()))
    }

    /// Reads and parses the plan at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ReplayError::Read`] when the file cannot be read and
    /// [`ReplayError::Parse`] when its contents are not a valid plan.
    pub fn read(path: &Utf8Path) -> Result<Self, ReplayError> {
        let read_error = |err: std::io::Error| ReplayError::Read {
            path: path.to_string(),
            message: err.to_string(),
        };
        let parent = match path.parent() {
            Some(dir) if !dir.as_str().is_empty() => dir,
            _ => Utf8Path::new("."),
        };
        let file_name = path.file_name().ok_or_else(|| ReplayError::Read {
            path: path.to_string(),
            message: String::from("path has no file name"),
        })?;
        let dir = Dir::open_ambient_dir(parent, ambient_authority()).map_err(read_error)?;
        let text = dir.read_to_string(file_name).map_err(read_error)?;
        Self::from_json(&text)
    }

    /// Applies every step to a fresh store and reports the result.
    ///
    /// # Errors
    ///
    /// Returns [`ReplayError::Store`] when the store rejects a step and
    /// [`ReplayError::UnboundReference`] when a step names an unknown label.
    /// Steps after the failing one are not applied.
    pub async fn run(&self) -> Result<ReplayReport, ReplayError> {
        let store = MemoryVolumeStore::new(self.tenant.as_str(), self.default_location.as_str());
        let mut replayer = Replayer {
            store: &store,
            bindings: BTreeMap::new(),
        };
        let mut steps = Vec::with_capacity(self.steps.len());
        for (index, step) in self.steps.iter().enumerate() {
            let report = replayer.apply(index, step).await?;
            debug!(index, op = report.op, changed = report.changed, "step applied");
            steps.push(report);
        }

        let volumes = store.list_volumes().await.map_err(|source| ReplayError::Store {
            step: self.steps.len(),
            source,
        })?;
        let snapshots = store
            .list_snapshots()
            .await
            .map_err(|source| ReplayError::Store {
                step: self.steps.len(),
                source,
            })?;
        info!(
            tenant = %self.tenant,
            steps = steps.len(),
            volumes = volumes.len(),
            snapshots = snapshots.len(),
            "plan replayed"
        );
        Ok(ReplayReport {
            tenant: self.tenant.clone(),
            steps,
            volumes,
            snapshots,
        })
    }
}

struct Replayer<'a> {
    store: &'a MemoryVolumeStore,
    bindings: BTreeMap<String, String>,
}

impl Replayer<'_> {
    fn resolve(&self, index: usize, handle: &str) -> Result<String, ReplayError> {
        let Some(label) = handle.strip_prefix(REFERENCE_PREFIX) else {
            return Ok(handle.to_owned());
        };
        self.bindings
            .get(label)
            .cloned()
            .ok_or_else(|| ReplayError::UnboundReference {
                step: index,
                reference: handle.to_owned(),
            })
    }

    fn bind(&mut self, label: Option<&String>, id: Option<&ResourceId>) {
        if let (Some(name), Some(handle)) = (label, id) {
            self.bindings.insert(name.clone(), handle.to_string());
        }
    }

    async fn apply(&mut self, index: usize, step: &PlanStep) -> Result<StepReport, ReplayError> {
        let store_error = |source| ReplayError::Store {
            step: index,
            source,
        };
        let (changed, id) = match step {
            PlanStep::CreateVolume {
                name,
                options,
                bind,
            } => {
                let resolved = self.resolve_snapshot_source(index, options)?;
                let created = self
                    .store
                    .create_volume(name, &resolved)
                    .await
                    .map_err(store_error)?
                    .map(|volume| volume.id);
                self.bind(bind.as_ref(), created.as_ref());
                (created.is_some(), created)
            }
            PlanStep::AttachVolume {
                volume,
                node,
                device,
            } => {
                let volume_id = self.resolve(index, volume)?;
                let attached = self
                    .store
                    .attach_volume(&volume_id, node, &AttachOptions::device(device.as_str()))
                    .await
                    .map_err(store_error)?;
                (attached, None)
            }
            PlanStep::DetachVolume { volume, options } => {
                let volume_id = self.resolve(index, volume)?;
                let detached = self
                    .store
                    .detach_volume(&volume_id, options)
                    .await
                    .map_err(store_error)?;
                (detached, None)
            }
            PlanStep::RemoveVolume { volume } => {
                let volume_id = self.resolve(index, volume)?;
                let removed = self
                    .store
                    .remove_volume(&volume_id)
                    .await
                    .map_err(store_error)?;
                (removed, None)
            }
            PlanStep::CreateSnapshot { volume, name, bind } => {
                let volume_id = self.resolve(index, volume)?;
                let options = SnapshotOptions { name: name.clone() };
                let created = self
                    .store
                    .create_snapshot(&volume_id, &options)
                    .await
                    .map_err(store_error)?
                    .map(|snapshot| snapshot.id);
                self.bind(bind.as_ref(), created.as_ref());
                (created.is_some(), created)
            }
            PlanStep::DeleteSnapshot { snapshot } => {
                let snapshot_id = self.resolve(index, snapshot)?;
                let deleted = self
                    .store
                    .delete_snapshot(&snapshot_id)
                    .await
                    .map_err(store_error)?;
                (deleted, None)
            }
        };
        Ok(StepReport {
            index,
            op: step.op(),
            changed,
            id,
        })
    }

    fn resolve_snapshot_source(
        &self,
        index: usize,
        options: &VolumeOptions,
    ) -> Result<VolumeOptions, ReplayError> {
        let mut resolved = options.clone();
        if let VolumeOptions::Zonal(zonal) = &mut resolved {
            zonal.snapshot_id = zonal
                .snapshot_id
                .as_deref()
                .map(|source| self.resolve(index, source))
                .transpose()?;
        }
        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    const PLAN: &str = r#"{
        "tenant": "acme",
        "default_location": "dc-1",
        "steps": [
            {"op": "create_volume", "name": "data",
             "options": {"kind": "basic", "size_gb": 10}, "bind": "data"},
            {"op": "attach_volume", "volume": "@data", "node": "dc-1/node-a", "device": "/dev/vdb"},
            {"op": "create_snapshot", "volume": "@data", "name": "nightly", "bind": "nightly"},
            {"op": "detach_volume", "volume": "@data"},
            {"op": "create_volume", "name": "copy",
             "options": {"kind": "zonal", "availability_zone": "dc-1a", "snapshot_id": "@nightly"}},
            {"op": "remove_volume", "volume": "@data"},
            {"op": "delete_snapshot", "snapshot": "@nightly"},
            {"op": "delete_snapshot", "snapshot": "@nightly"}
        ]
    }"#;

    #[rstest]
    #[tokio::test]
    async fn replays_full_plan() {
        let plan = ReplayPlan::from_json(PLAN).expect("parse plan");
        let report = plan.run().await.expect("replay");

        let changed: Vec<bool> = report.steps.iter().map(|step| step.changed).collect();
        assert_eq!(
            changed,
            vec![true, true, true, true, true, true, true, false]
        );
        assert_eq!(report.volumes.len(), 1);
        let copy = report.volumes.first().expect("restored volume");
        assert_eq!(copy.name.as_deref(), Some("copy"));
        assert_eq!(copy.size_gb, Some(10.0));
        assert!(report.snapshots.is_empty());
        assert_eq!(
            report.steps.first().and_then(|step| step.id.as_ref()).map(ToString::to_string),
            Some(String::from("dc-1/1"))
        );
    }

    #[rstest]
    #[tokio::test]
    async fn unbound_reference_stops_replay() {
        let plan = ReplayPlan::from_json(
            r#"{"tenant": "t", "default_location": "dc-1",
                "steps": [{"op": "remove_volume", "volume": "@ghost"}]}"#,
        )
        .expect("parse plan");
        let err = plan.run().await.expect_err("unbound");
        assert_eq!(
            err,
            ReplayError::UnboundReference {
                step: 0,
                reference: String::from("@ghost"),
            }
        );
    }

    #[rstest]
    #[tokio::test]
    async fn store_rejection_names_the_step() {
        let plan = ReplayPlan::from_json(
            r#"{"tenant": "t", "default_location": "dc-1", "steps": [
                {"op": "create_volume", "name": "v", "options": {"kind": "basic", "size_gb": 1}},
                {"op": "attach_volume", "volume": "dc-1/1", "node": "dc-2/node", "device": "/dev/vdb"}
            ]}"#,
        )
        .expect("parse plan");
        let err = plan.run().await.expect_err("cross-location attach");
        assert!(matches!(err, ReplayError::Store { step: 1, .. }), "{err}");
    }

    #[rstest]
    #[case("not json")]
    #[case(r#"{"tenant": "t", "default_location": "dc-1", "steps": [{"op": "explode"}]}"#)]
    #[case(r#"{"default_location": "dc-1"}"#)]
    fn malformed_plans_fail_to_parse(#[case] text: &str) {
        let err = ReplayPlan::from_json(text).expect_err("malformed");
        assert!(matches!(err, ReplayError::Parse(_)), "{err}");
    }
}
