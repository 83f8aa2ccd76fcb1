//! In-memory index structure for the concatenation layer.
//!
//! A `Concatenator` group owns shared arrays keyed by channel name, plus an
//! index mapping each contained `Concatenated` object's uid to its
//! `(start, length)` slice. This module holds the pure data
//! structure; `geoh5_io::concat` redirects `save_entity`/value fetches
//! through it against the live workspace arena.

use std::collections::HashMap;

use crate::ids::Uid;

/// Half-open slice `[start, start+length)` into a concatenator's shared
/// channel arrays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slice {
    pub start: usize,
    pub length: usize,
}

/// One shared backing array, addressed by channel name (e.g. `"FROM"`,
/// `"TO"`, a data name) and appended to as new concatenated objects are
/// saved.
#[derive(Debug, Clone, Default)]
pub struct Channel {
    pub values: Vec<f64>,
}

/// Per-object attribute overrides, stored inline rather than as a
/// standalone on-disk `Attributes` group: a concatenated object's
/// `Attributes` group is synthesized from this dict.
pub type ConcatenatedAttributes = HashMap<String, String>;

/// Shared-backing storage for one `Concatenator` group.
#[derive(Debug, Clone, Default)]
pub struct ConcatenatorIndex {
    /// Stable insertion order of contained object uids, preserved for
    /// deterministic iteration.
    concatenated_object_ids: Vec<Uid>,
    /// Per-object attribute overrides.
    concatenated_attributes: HashMap<Uid, ConcatenatedAttributes>,
    /// Per-channel shared arrays.
    channels: HashMap<String, Channel>,
    /// `(object uid, channel name) -> slice` index. A tombstoned entry
    /// (removed from this map) no longer has active storage; its bytes are
    /// only reclaimed on the next successful `h5repack`.
    slices: HashMap<(Uid, String), Slice>,
}

impl ConcatenatorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new concatenated object and extend each named channel's
    /// shared array with `values`, recording the resulting slice.
    ///
    /// Calling this again for the same uid without an intervening `remove`
    /// is a no-op on `concatenated_object_ids`, keeping it duplicate-free.
    pub fn append_object(&mut self, uid: Uid, channel_values: &[(&str, Vec<f64>)]) {
        if !self.concatenated_object_ids.contains(&uid) {
            self.concatenated_object_ids.push(uid);
            self.concatenated_attributes.entry(uid).or_default();
        }

        for (channel_name, values) in channel_values {
            let channel = self.channels.entry((*channel_name).to_string()).or_default();
            let start = channel.values.len();
            channel.values.extend_from_slice(values);
            self.slices.insert(
                (uid, (*channel_name).to_string()),
                Slice {
                    start,
                    length: values.len(),
                },
            );
        }
    }

    /// Fetch the slice of `channel_name` belonging to `uid`, reading it out
    /// of the shared array.
    pub fn values(&self, uid: Uid, channel_name: &str) -> Option<&[f64]> {
        let slice = self.slices.get(&(uid, channel_name.to_string()))?;
        let channel = self.channels.get(channel_name)?;
        channel.values.get(slice.start..slice.start + slice.length)
    }

    /// Tombstone every slice owned by `uid` and drop it from the object
    /// list. The underlying channel bytes are left in place until a repack
    /// reclaims them.
    pub fn remove_object(&mut self, uid: Uid) {
        self.concatenated_object_ids.retain(|&id| id != uid);
        self.concatenated_attributes.remove(&uid);
        self.slices.retain(|(id, _), _| *id != uid);
    }

    pub fn object_ids(&self) -> &[Uid] {
        &self.concatenated_object_ids
    }

    /// Channel names with at least one slice, for persistence (`geoh5_io`'s
    /// writer needs to enumerate them; this crate never writes HDF5 itself).
    pub fn channel_names(&self) -> impl Iterator<Item = &str> {
        self.channels.keys().map(|s| s.as_str())
    }

    pub fn channel_values(&self, channel_name: &str) -> Option<&[f64]> {
        self.channels.get(channel_name).map(|c| c.values.as_slice())
    }

    pub fn slice_of(&self, uid: Uid, channel_name: &str) -> Option<Slice> {
        self.slices.get(&(uid, channel_name.to_string())).copied()
    }

    pub fn attributes_mut(&mut self, uid: Uid) -> Option<&mut ConcatenatedAttributes> {
        self.concatenated_attributes.get_mut(&uid)
    }

    pub fn attributes(&self, uid: Uid) -> Option<&ConcatenatedAttributes> {
        self.concatenated_attributes.get(&uid)
    }

    /// Non-overlapping check used by tests: no two live slices of the same
    /// channel may overlap.
    pub fn channel_slices_non_overlapping(&self, channel_name: &str) -> bool {
        let mut ranges: Vec<(usize, usize)> = self
            .slices
            .iter()
            .filter(|((_, ch), _)| ch == channel_name)
            .map(|(_, s)| (s.start, s.start + s.length))
            .collect();
        ranges.sort_unstable();
        ranges.windows(2).all(|pair| pair[0].1 <= pair[1].0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appended_objects_get_non_overlapping_slices() {
        let mut index = ConcatenatorIndex::new();
        let a = Uid::new_v4();
        let b = Uid::new_v4();
        index.append_object(a, &[("FROM", vec![0.0, 1.0, 2.0])]);
        index.append_object(b, &[("FROM", vec![3.0, 4.0])]);

        assert_eq!(index.values(a, "FROM"), Some([0.0, 1.0, 2.0].as_slice()));
        assert_eq!(index.values(b, "FROM"), Some([3.0, 4.0].as_slice()));
        assert!(index.channel_slices_non_overlapping("FROM"));
        assert_eq!(index.object_ids(), &[a, b]);
    }

    #[test]
    fn removing_an_object_tombstones_its_slice_but_keeps_the_channel() {
        let mut index = ConcatenatorIndex::new();
        let a = Uid::new_v4();
        index.append_object(a, &[("FROM", vec![0.0, 1.0])]);
        index.remove_object(a);

        assert!(index.values(a, "FROM").is_none());
        assert!(!index.object_ids().contains(&a));
    }
}
