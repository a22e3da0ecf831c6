//! Primary maps and secondary indices of the reference store.

use std::collections::{BTreeMap, BTreeSet};
use std::time::SystemTime;

use crate::identifier::ResourceId;
use crate::volume::{DetachOptions, Snapshot, SnapshotOptions, Volume, VolumeOptions, VolumeType};

use super::StoreError;

/// Everything one tenant owns. Every method leaves all indices consistent.
#[derive(Debug, Default)]
pub(super) struct Inventory {
    volumes: BTreeMap<ResourceId, Volume>,
    snapshots: BTreeMap<ResourceId, Snapshot>,
    /// Node -> attached volume -> device.
    volumes_by_node: BTreeMap<ResourceId, BTreeMap<ResourceId, String>>,
    volumes_by_location: BTreeMap<String, BTreeSet<ResourceId>>,
    snapshots_by_volume: BTreeMap<ResourceId, BTreeSet<ResourceId>>,
    snapshots_by_location: BTreeMap<String, BTreeSet<ResourceId>>,
    next_volume: u64,
    next_snapshot: u64,
}

fn index_insert<K: Ord>(index: &mut BTreeMap<K, BTreeSet<ResourceId>>, key: K, id: ResourceId) {
    index.entry(key).or_default().insert(id);
}

fn index_remove<K: Ord>(index: &mut BTreeMap<K, BTreeSet<ResourceId>>, key: &K, id: &ResourceId) {
    if let Some(members) = index.get_mut(key) {
        members.remove(id);
        if members.is_empty() {
            index.remove(key);
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|trimmed| !trimmed.is_empty())
}

impl Inventory {
    fn holder(&self, volume_id: &ResourceId) -> Option<(&ResourceId, &str)> {
        self.volumes_by_node.iter().find_map(|(node, attached)| {
            attached
                .get(volume_id)
                .map(|device| (node, device.as_str()))
        })
    }

    /// Volume with its current attachment device filled in.
    fn view(&self, volume: &Volume) -> Volume {
        let mut view = volume.clone();
        view.device = self.holder(&volume.id).map(|(_, device)| device.to_owned());
        view
    }

    fn views<'a>(&self, ids: impl IntoIterator<Item = &'a ResourceId>) -> Vec<Volume> {
        ids.into_iter()
            .filter_map(|id| self.volumes.get(id))
            .map(|volume| self.view(volume))
            .collect()
    }

    fn snapshot_list<'a>(&self, ids: impl IntoIterator<Item = &'a ResourceId>) -> Vec<Snapshot> {
        ids.into_iter()
            .filter_map(|id| self.snapshots.get(id))
            .cloned()
            .collect()
    }

    pub(super) fn volumes(&self) -> Vec<Volume> {
        self.views(self.volumes.keys())
    }

    pub(super) fn volumes_in_location(&self, location_id: &str) -> Vec<Volume> {
        self.volumes_by_location
            .get(location_id)
            .map(|ids| self.views(ids))
            .unwrap_or_default()
    }

    pub(super) fn volumes_for_node(&self, node: &ResourceId) -> Vec<Volume> {
        self.volumes_by_node
            .get(node)
            .map(|attached| self.views(attached.keys()))
            .unwrap_or_default()
    }

    pub(super) fn volume(&self, id: &ResourceId) -> Option<Volume> {
        self.volumes.get(id).map(|volume| self.view(volume))
    }

    pub(super) fn create_volume(
        &mut self,
        name: &str,
        options: &VolumeOptions,
        default_location: &str,
    ) -> Result<Option<Volume>, StoreError> {
        let requested = options.size_gb().map(f64::from);
        let (size_gb, location) = if let Some(handle) = options.snapshot_id() {
            let snapshot_id = ResourceId::decode(handle)?;
            let Some(snapshot) = self.snapshots.get(&snapshot_id) else {
                return Ok(None);
            };
            (requested.or(snapshot.size_gb), snapshot_id.scope().to_owned())
        } else {
            let size = requested.ok_or_else(|| {
                StoreError::InvalidArgument(String::from(
                    "size_gb is required when no snapshot is given",
                ))
            })?;
            let location = non_empty(options.location_id()).unwrap_or(default_location);
            (Some(size), location.to_owned())
        };

        let next = self.next_volume + 1;
        let id = ResourceId::new(location, next.to_string())?;
        self.next_volume = next;
        let volume = Volume {
            id: id.clone(),
            size_gb,
            location_id: Some(id.scope().to_owned()),
            volume_type: VolumeType::Local,
            durable: false,
            boot_device: false,
            device: None,
            name: non_empty(Some(name)).map(str::to_owned),
        };
        index_insert(&mut self.volumes_by_location, id.scope().to_owned(), id.clone());
        self.volumes.insert(id, volume.clone());
        Ok(Some(volume))
    }

    pub(super) fn remove_volume(&mut self, id: &ResourceId) -> bool {
        let Some(volume) = self.volumes.remove(id) else {
            return false;
        };
        if let Some(location) = volume.location_id.as_ref() {
            index_remove(&mut self.volumes_by_location, location, id);
        }
        self.volumes_by_node.retain(|_, attached| {
            attached.remove(id);
            !attached.is_empty()
        });
        // Snapshots outlive their source volume.
        self.snapshots_by_volume.remove(id);
        true
    }

    pub(super) fn attach_volume(
        &mut self,
        volume_id: &ResourceId,
        node: &ResourceId,
        device: &str,
    ) -> Result<bool, StoreError> {
        if !self.volumes.contains_key(volume_id) {
            return Ok(false);
        }
        if let Some((holder, _)) = self.holder(volume_id) {
            if holder == node {
                return Ok(true);
            }
            return Err(StoreError::AlreadyAttached {
                volume_id: volume_id.to_string(),
                node_id: holder.to_string(),
            });
        }
        self.volumes_by_node
            .entry(node.clone())
            .or_default()
            .insert(volume_id.clone(), device.to_owned());
        Ok(true)
    }

    pub(super) fn detach_volume(
        &mut self,
        volume_id: &ResourceId,
        options: &DetachOptions,
    ) -> bool {
        let Some((holder, device)) = self.holder(volume_id) else {
            return false;
        };
        if !options.filter().matches(device, holder) {
            return false;
        }
        let node = holder.clone();
        if let Some(attached) = self.volumes_by_node.get_mut(&node) {
            attached.remove(volume_id);
            if attached.is_empty() {
                self.volumes_by_node.remove(&node);
            }
        }
        true
    }

    pub(super) fn snapshots(&self) -> Vec<Snapshot> {
        self.snapshots.values().cloned().collect()
    }

    pub(super) fn snapshots_in_location(&self, location_id: &str) -> Vec<Snapshot> {
        self.snapshots_by_location
            .get(location_id)
            .map(|ids| self.snapshot_list(ids))
            .unwrap_or_default()
    }

    pub(super) fn snapshots_for_volume(&self, volume_id: &ResourceId) -> Vec<Snapshot> {
        self.snapshots_by_volume
            .get(volume_id)
            .map(|ids| self.snapshot_list(ids))
            .unwrap_or_default()
    }

    pub(super) fn snapshot(&self, id: &ResourceId) -> Option<Snapshot> {
        self.snapshots.get(id).cloned()
    }

    pub(super) fn create_snapshot(
        &mut self,
        volume_id: &ResourceId,
        options: &SnapshotOptions,
    ) -> Result<Option<Snapshot>, StoreError> {
        let Some(volume) = self.volumes.get(volume_id) else {
            return Ok(None);
        };
        let size_gb = volume.size_gb;
        self.next_snapshot += 1;
        let id = ResourceId::new(volume_id.scope(), self.next_snapshot.to_string())?;
        let snapshot = Snapshot {
            id: id.clone(),
            size_gb,
            name: non_empty(options.name.as_deref()).map(str::to_owned),
            location_id: Some(id.scope().to_owned()),
            volume_id: Some(volume_id.clone()),
            created: Some(SystemTime::now()),
        };
        index_insert(&mut self.snapshots_by_location, id.scope().to_owned(), id.clone());
        index_insert(&mut self.snapshots_by_volume, volume_id.clone(), id.clone());
        self.snapshots.insert(id, snapshot.clone());
        Ok(Some(snapshot))
    }

    pub(super) fn delete_snapshot(&mut self, id: &ResourceId) -> bool {
        let Some(snapshot) = self.snapshots.remove(id) else {
            return false;
        };
        if let Some(location) = snapshot.location_id.as_ref() {
            index_remove(&mut self.snapshots_by_location, location, id);
        }
        if let Some(volume_id) = snapshot.volume_id.as_ref() {
            index_remove(&mut self.snapshots_by_volume, volume_id, id);
        }
        true
    }

    /// Audits cross-index consistency, reporting the first violation.
    pub(super) fn check(&self) -> Result<(), String> {
        let mut holders: BTreeMap<&ResourceId, &ResourceId> = BTreeMap::new();
        for (node, attached) in &self.volumes_by_node {
            if attached.is_empty() {
                return Err(format!("node {node} has an empty attachment set"));
            }
            for volume_id in attached.keys() {
                if !self.volumes.contains_key(volume_id) {
                    return Err(format!("node {node} holds missing volume {volume_id}"));
                }
                if !volume_id.same_scope(node) {
                    return Err(format!(
                        "node {node} holds volume {volume_id} from another location"
                    ));
                }
                if let Some(other) = holders.insert(volume_id, node) {
                    return Err(format!("volume {volume_id} attached to {other} and {node}"));
                }
            }
        }

        for (location, ids) in &self.volumes_by_location {
            for id in ids {
                let Some(volume) = self.volumes.get(id) else {
                    return Err(format!("location {location} lists missing volume {id}"));
                };
                if volume.location_id.as_deref() != Some(location.as_str()) {
                    return Err(format!("volume {id} indexed under wrong location {location}"));
                }
            }
        }
        for (id, volume) in &self.volumes {
            let indexed = volume
                .location_id
                .as_ref()
                .and_then(|location| self.volumes_by_location.get(location))
                .is_some_and(|ids| ids.contains(id));
            if !indexed {
                return Err(format!("volume {id} missing from its location index"));
            }
        }

        for (location, ids) in &self.snapshots_by_location {
            for id in ids {
                let Some(snapshot) = self.snapshots.get(id) else {
                    return Err(format!("location {location} lists missing snapshot {id}"));
                };
                if snapshot.location_id.as_deref() != Some(location.as_str()) {
                    return Err(format!("snapshot {id} indexed under wrong location {location}"));
                }
            }
        }
        for (volume_id, ids) in &self.snapshots_by_volume {
            if !self.volumes.contains_key(volume_id) {
                return Err(format!("snapshot index keeps removed volume {volume_id}"));
            }
            for id in ids {
                let source = self
                    .snapshots
                    .get(id)
                    .and_then(|snapshot| snapshot.volume_id.as_ref());
                if source != Some(volume_id) {
                    return Err(format!("snapshot {id} indexed under wrong volume {volume_id}"));
                }
                if !id.same_scope(volume_id) {
                    return Err(format!("snapshot {id} is not in the location of {volume_id}"));
                }
            }
        }
        Ok(())
    }
}
