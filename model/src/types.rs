//! Entity type registry vocabulary.
//!
//! The registry *behavior* (`find_or_create`, `find`, dirty-marking on
//! attribute writes) lives on `geoh5_io::Workspace`, since it owns the
//! slotmap arena and the file handle. This module defines the data each
//! registered type carries and the on-disk ↔ in-memory attribute-name
//! mangling table.

use slotmap::new_key_type;

use crate::entity::{DataClass, GroupClass, ObjectClass};
use crate::ids::{PrimitiveType, Uid};

new_key_type! {
    /// Stable reference to a registered `EntityType`. Dereferencing a
    /// `TypeId` against a dead workspace slot is a "weak reference":
    /// slotmap's generation counter makes a stale `TypeId` detectable
    /// without unsafe code.
    pub struct TypeId;
}

/// Fields common to every `EntityType` concrete class.
#[derive(Debug, Clone)]
pub struct EntityTypeRecord {
    pub uid: Uid,
    pub name: String,
    pub description: Option<String>,
    pub on_file: bool,
    pub kind: TypeKind,
}

/// The concrete subtype payload for a registered entity type.
#[derive(Debug, Clone)]
pub enum TypeKind {
    Group(GroupTypeAttrs),
    Object(ObjectTypeAttrs),
    Data(DataTypeAttrs),
}

impl TypeKind {
    pub fn class_name(&self) -> &'static str {
        match self {
            TypeKind::Group(_) => "GroupType",
            TypeKind::Object(_) => "ObjectType",
            TypeKind::Data(_) => "DataType",
        }
    }
}

#[derive(Debug, Clone)]
pub struct GroupTypeAttrs {
    pub allow_move_content: bool,
    pub allow_delete_content: bool,
    pub group_class: GroupClass,
}

#[derive(Debug, Clone)]
pub struct ObjectTypeAttrs {
    pub object_class: ObjectClass,
}

#[derive(Debug, Clone)]
pub struct DataTypeAttrs {
    pub primitive_type: PrimitiveType,
    pub data_class: DataClass,
    pub units: Option<String>,
    pub value_map: Option<ReferenceValueMap>,
    pub color_map: Option<ColorMap>,
    pub hidden: bool,
    pub mapping: Option<String>,
    pub number_of_bins: Option<u32>,
    pub transparent_no_data: bool,
    pub duplicate_type_on_copy: bool,
    pub precision: Option<u32>,
}

impl Default for DataTypeAttrs {
    fn default() -> Self {
        DataTypeAttrs {
            primitive_type: PrimitiveType::Invalid,
            data_class: DataClass::Generic,
            units: None,
            value_map: None,
            color_map: None,
            hidden: false,
            mapping: None,
            number_of_bins: None,
            transparent_no_data: true,
            duplicate_type_on_copy: false,
            precision: None,
        }
    }
}

/// `u32 -> String` mapping used by `Referenced` data.
///
/// Grounded in `geoh5py/data/reference_value_map.py`'s `ReferenceValueMap`:
/// key `0` is conventionally reserved for `"Unknown"` whenever present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceValueMap {
    entries: Vec<(u32, String)>,
}

impl ReferenceValueMap {
    /// Build a value map. If key `0` is present its value must be
    /// `"Unknown"`.
    pub fn new(entries: Vec<(u32, String)>) -> Result<Self, String> {
        if let Some((_, value)) = entries.iter().find(|(key, _)| *key == 0) {
            if value != "Unknown" {
                return Err(format!(
                    "value map key 0 must map to \"Unknown\", found {value:?}"
                ));
            }
        }
        Ok(ReferenceValueMap { entries })
    }

    /// The map backing `BooleanData`: `{0: "False", 1: "True"}`, matching
    /// `geoh5py`'s `BOOLEAN_VALUE_MAP`. Skips the "Unknown" convention for
    /// this one case since booleans never carry an unknown state.
    pub fn boolean() -> Self {
        ReferenceValueMap {
            entries: vec![(0, "False".to_string()), (1, "True".to_string())],
        }
    }

    pub fn get(&self, key: u32) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn entries(&self) -> &[(u32, String)] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Color map for visualization, stored as `(bin value, rgba)` pairs.
/// Not interpreted by the library; carried through
/// read/write untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct ColorMap {
    pub entries: Vec<(f64, [u8; 4])>,
}

/// On-disk attribute name ↔ in-memory attribute name table, consulted by
/// both reader and writer. One static table per type class.
pub const COMMON_ATTRIBUTE_MAP: &[(&str, &str)] = &[
    ("Name", "name"),
    ("ID", "uid"),
    ("Description", "description"),
];

pub const ENTITY_ATTRIBUTE_MAP: &[(&str, &str)] = &[
    ("Name", "name"),
    ("ID", "uid"),
    ("Visible", "visible"),
    ("Public", "public"),
    ("Allow delete", "allow_delete"),
    ("Allow rename", "allow_rename"),
    ("Allow move", "allow_move"),
    ("Last focus", "last_focus"),
    ("PropertyGroups", "property_groups"),
];

pub const DATA_TYPE_ATTRIBUTE_MAP: &[(&str, &str)] = &[
    ("Name", "name"),
    ("ID", "uid"),
    ("Description", "description"),
    ("Primitive type", "primitive_type"),
    ("Units", "units"),
    ("Hidden", "hidden"),
    ("Mapping", "mapping"),
    ("Number of bins", "number_of_bins"),
    ("Transparent no data", "transparent_no_data"),
    ("Duplicate type on copy", "duplicate_type_on_copy"),
    ("Precision", "precision"),
];

pub const PROJECT_ATTRIBUTE_MAP: &[(&str, &str)] = &[
    ("Contributors", "contributors"),
    ("Distance unit", "distance_unit"),
    ("GA Version", "ga_version"),
    ("Version", "version"),
];

/// Translate an on-disk attribute name to its in-memory equivalent, or pass
/// it through unchanged if the table has no entry (readers are tolerant of
/// unknown attributes).
pub fn disk_to_memory<'a>(table: &[(&'a str, &'a str)], disk_name: &'a str) -> &'a str {
    table
        .iter()
        .find(|(disk, _)| *disk == disk_name)
        .map(|(_, mem)| *mem)
        .unwrap_or(disk_name)
}

/// Translate an in-memory attribute name to its on-disk equivalent.
pub fn memory_to_disk<'a>(table: &[(&'a str, &'a str)], mem_name: &'a str) -> &'a str {
    table
        .iter()
        .find(|(_, mem)| *mem == mem_name)
        .map(|(disk, _)| *disk)
        .unwrap_or(mem_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_value_map_requires_unknown_at_zero() {
        let err = ReferenceValueMap::new(vec![(0, "Nope".to_string())]).unwrap_err();
        assert!(err.contains("Unknown"));
    }

    #[test]
    fn reference_value_map_accepts_well_formed_zero_key() {
        let map = ReferenceValueMap::new(vec![
            (0, "Unknown".to_string()),
            (1, "Ore".to_string()),
            (2, "Waste".to_string()),
        ])
        .unwrap();
        assert_eq!(map.get(1), Some("Ore"));
        assert_eq!(map.len(), 3);
    }

    #[test]
    fn attribute_map_is_consulted_both_directions() {
        assert_eq!(disk_to_memory(ENTITY_ATTRIBUTE_MAP, "Allow delete"), "allow_delete");
        assert_eq!(memory_to_disk(ENTITY_ATTRIBUTE_MAP, "allow_delete"), "Allow delete");
        // unknown names pass through unchanged
        assert_eq!(disk_to_memory(ENTITY_ATTRIBUTE_MAP, "Unmapped"), "Unmapped");
    }
}
