//! Binds the pure `ConcatenatorIndex` data structure
//! (`geoh5_model::concat`) to the live workspace: which `DrillholeGroup`
//! owns which index, and how its objects get redirected through it on
//! save/fetch, grounded in `geoh5py/groups/drillhole_group.py`
//! and `geoh5py/shared/concatenation.py`.

use std::collections::HashMap;

use hdf5::Group;

use geoh5_model::concat::ConcatenatorIndex;
use geoh5_model::entity::EntityId;
use geoh5_model::Uid;

use crate::container as c;
use crate::error::{IoError, Result};
use crate::workspace::Workspace;

/// One `ConcatenatorIndex` per `DrillholeGroup` entity, keyed by the
/// group's own uid. A workspace with no drillhole groups carries an empty
/// layer at no cost: entries are created lazily on first access.
#[derive(Debug, Clone, Default)]
pub struct ConcatenationLayer {
    indices: HashMap<Uid, ConcatenatorIndex>,
}

impl ConcatenationLayer {
    pub fn new() -> Self {
        ConcatenationLayer::default()
    }

    pub fn index(&self, group_uid: Uid) -> Option<&ConcatenatorIndex> {
        self.indices.get(&group_uid)
    }

    pub fn index_mut(&mut self, group_uid: Uid) -> &mut ConcatenatorIndex {
        self.indices.entry(group_uid).or_default()
    }

    /// Drop a concatenator group's entire index (its `remove_entity` has
    /// already removed the underlying file groups).
    pub fn remove_group(&mut self, group_uid: Uid) {
        self.indices.remove(&group_uid);
    }

    pub fn groups(&self) -> impl Iterator<Item = Uid> + '_ {
        self.indices.keys().copied()
    }
}

const SUBGROUP: &str = "Concatenated Data";
const INDEX_DATASET: &str = "Index";

fn channel_dataset_name(channel: &str) -> String {
    format!("Channel {channel}")
}

/// `ObjectBase.add_data` onto a `DrillholeGroup`: append a
/// `Float` data's values onto its channel, named after the data itself, in
/// the group's shared arrays. Other primitive types are written as
/// standalone `Data` records instead (see DESIGN.md); `geoh5py`'s
/// concatenator covers every primitive, this one narrows to the common
/// interval-log case.
pub fn redirect_float_values(
    workspace: &mut Workspace,
    group_id: EntityId,
    data_id: EntityId,
    channel_name: &str,
    values: &[f32],
) -> Result<()> {
    let group_uid = workspace
        .entity(group_id)
        .map(|e| e.uid)
        .ok_or_else(|| IoError::NotFound(format!("concatenator group {group_id:?}")))?;
    let object_uid = workspace
        .entity(data_id)
        .and_then(|e| e.parent)
        .and_then(|object_id| workspace.entity(object_id).map(|e| e.uid))
        .ok_or_else(|| IoError::NotFound(format!("parent object of data {data_id:?}")))?;

    let channel_values: Vec<f64> = values.iter().map(|&v| v as f64).collect();
    workspace
        .concat
        .index_mut(group_uid)
        .append_object(object_uid, &[(channel_name, channel_values)]);
    Ok(())
}

/// Write a `DrillholeGroup`'s full concatenator state under its own entity
/// group, as one dataset per channel plus a slice index. This
/// always rewrites the whole subgroup rather than appending incrementally,
/// mirroring `writer::write_value_map`'s overwrite-on-save discipline.
pub fn persist(group_entity: &Group, index: &ConcatenatorIndex) -> Result<()> {
    let concat_group = match c::group(group_entity, SUBGROUP)? {
        Some(g) => g,
        None => c::create_group(group_entity, SUBGROUP)?,
    };

    let mut channel_names: Vec<&str> = index.channel_names().collect();
    channel_names.sort_unstable();

    for channel_name in &channel_names {
        if let Some(values) = index.channel_values(channel_name) {
            let dataset_name = channel_dataset_name(channel_name);
            if c::has_member(&concat_group, &dataset_name) {
                c::remove(&concat_group, &dataset_name)?;
            }
            c::write_dataset_f64(&concat_group, &dataset_name, values)?;
        }
    }

    let mut rows = Vec::new();
    for &object_uid in index.object_ids() {
        for channel_name in &channel_names {
            if let Some(slice) = index.slice_of(object_uid, channel_name) {
                rows.push((
                    object_uid.to_braced(),
                    (*channel_name).to_string(),
                    slice.start as u64,
                    slice.length as u64,
                ));
            }
        }
    }
    c::write_concat_slices(&concat_group, INDEX_DATASET, &rows)?;
    Ok(())
}

/// Reconstruct a `ConcatenatorIndex` from a `DrillholeGroup`'s on-file
/// `Concatenated Data` subgroup, or `None` if the group never held one.
/// Runs after groups exist, as the second pass of loading, so the reader
/// can patch empty-valued `Data` children from it.
pub fn load(group_entity: &Group) -> Result<Option<ConcatenatorIndex>> {
    let Some(concat_group) = c::group(group_entity, SUBGROUP)? else {
        return Ok(None);
    };
    if !c::has_member(&concat_group, INDEX_DATASET) {
        return Ok(Some(ConcatenatorIndex::new()));
    }
    let rows = c::read_concat_slices(&concat_group, INDEX_DATASET)?;

    let mut channel_values: HashMap<String, Vec<f64>> = HashMap::new();
    for (_, channel, _, _) in &rows {
        if !channel_values.contains_key(channel) {
            let values = c::read_dataset_f64(&concat_group, &channel_dataset_name(channel))?;
            channel_values.insert(channel.clone(), values);
        }
    }

    let mut object_order: Vec<Uid> = Vec::new();
    let mut per_object: HashMap<Uid, Vec<(String, Vec<f64>)>> = HashMap::new();
    for (object_id, channel, start, length) in rows {
        let uid = Uid::from_braced(&object_id)?;
        if !per_object.contains_key(&uid) {
            object_order.push(uid);
        }
        let start = start as usize;
        let length = length as usize;
        let slice_values = channel_values
            .get(&channel)
            .and_then(|v| v.get(start..start + length))
            .map(|v| v.to_vec())
            .unwrap_or_default();
        per_object.entry(uid).or_default().push((channel, slice_values));
    }

    let mut index = ConcatenatorIndex::new();
    for uid in object_order {
        if let Some(channels) = per_object.remove(&uid) {
            let refs: Vec<(&str, Vec<f64>)> =
                channels.iter().map(|(name, v)| (name.as_str(), v.clone())).collect();
            index.append_object(uid, &refs);
        }
    }
    Ok(Some(index))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_mut_creates_on_first_access_then_reuses_it() {
        let mut layer = ConcatenationLayer::new();
        let group = Uid::new_v4();
        let object = Uid::new_v4();
        layer
            .index_mut(group)
            .append_object(object, &[("FROM", vec![1.0, 2.0])]);

        assert_eq!(
            layer.index(group).unwrap().values(object, "FROM"),
            Some([1.0, 2.0].as_slice())
        );
    }

    #[test]
    fn remove_group_drops_the_whole_index() {
        let mut layer = ConcatenationLayer::new();
        let group = Uid::new_v4();
        layer.index_mut(group);
        layer.remove_group(group);
        assert!(layer.index(group).is_none());
    }
}
