//! Entity graph vocabulary (C3).
//!
//! As with `types::TypeId`, entities live in a slotmap arena owned by
//! `geoh5_io::Workspace`; `EntityId` is a generational "weak reference" into
//! that arena, so a stale id from a removed entity is detected rather than
//! silently aliasing a reused slot. This module defines what each arena slot
//! holds and the pure graph operations (`add_children`, `remove_children`,
//! `copy`, `add_data`) that do not themselves need the workspace; the
//! behavior that does own the arena lives one layer up.

use std::collections::BTreeSet;

use slotmap::new_key_type;

use crate::error::{ModelError, Result};
use crate::ids::{Association, PrimitiveType, Uid};
use crate::types::TypeId;

new_key_type! {
    /// Stable reference to a live entity (group, object, or data record).
    pub struct EntityId;
}

/// Fields common to every concrete entity class.
#[derive(Debug, Clone)]
pub struct EntityRecord {
    pub uid: Uid,
    pub name: String,
    pub visible: bool,
    pub allow_delete: bool,
    pub allow_rename: bool,
    pub allow_move: bool,
    pub public: bool,
    pub on_file: bool,
    pub parent: Option<EntityId>,
    pub entity_type: Option<TypeId>,
    /// Names of in-memory attributes changed since the last save, consulted
    /// by `Workspace::update_attribute`.
    pub dirty: BTreeSet<String>,
    pub kind: EntityKind,
}

impl EntityRecord {
    pub fn mark_dirty(&mut self, attribute: &str) {
        self.dirty.insert(attribute.to_string());
    }

    pub fn clear_dirty(&mut self) {
        self.dirty.clear();
    }

    pub fn is_container(&self) -> bool {
        matches!(self.kind, EntityKind::Root { .. } | EntityKind::Group { .. } | EntityKind::Object { .. })
    }

    pub fn children(&self) -> &[EntityId] {
        match &self.kind {
            EntityKind::Root { children } => children,
            EntityKind::Group { children, .. } => children,
            EntityKind::Object { children, .. } => children,
            EntityKind::Data { .. } => &[],
        }
    }

    pub fn children_mut(&mut self) -> Option<&mut Vec<EntityId>> {
        match &mut self.kind {
            EntityKind::Root { children } => Some(children),
            EntityKind::Group { children, .. } => Some(children),
            EntityKind::Object { children, .. } => Some(children),
            EntityKind::Data { .. } => None,
        }
    }
}

/// The concrete subtype payload carried by a slot in the entity arena.
#[derive(Debug, Clone)]
pub enum EntityKind {
    /// The workspace's single `RootGroup`.
    Root { children: Vec<EntityId> },
    Group {
        children: Vec<EntityId>,
        class: GroupClass,
    },
    Object {
        children: Vec<EntityId>,
        property_groups: Vec<PropertyGroup>,
        class: ObjectClass,
        geometry: Geometry,
    },
    Data {
        association: Association,
        values: DataValues,
        class: DataClass,
    },
}

/// `Group` concrete class. `Custom` is the catch-all for an unrecognized
/// group-type uid encountered during load: the loader constructs a
/// `Custom` group rather than failing the load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupClass {
    Container,
    DrillholeGroup,
    Custom,
}

impl GroupClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            GroupClass::Container => "CONTAINER",
            GroupClass::DrillholeGroup => "DRILLHOLE_GROUP",
            GroupClass::Custom => "CUSTOM",
        }
    }

    pub fn from_str(value: &str) -> Self {
        match value {
            "DRILLHOLE_GROUP" => GroupClass::DrillholeGroup,
            "CONTAINER" => GroupClass::Container,
            _ => GroupClass::Custom,
        }
    }
}

/// `ObjectBase` concrete class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectClass {
    Points,
    Curve,
    Surface,
    GridObject,
    Drillhole,
    Custom,
}

impl ObjectClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectClass::Points => "POINTS",
            ObjectClass::Curve => "CURVE",
            ObjectClass::Surface => "SURFACE",
            ObjectClass::GridObject => "GRID_OBJECT",
            ObjectClass::Drillhole => "DRILLHOLE",
            ObjectClass::Custom => "CUSTOM",
        }
    }

    pub fn from_str(value: &str) -> Self {
        match value {
            "POINTS" => ObjectClass::Points,
            "CURVE" => ObjectClass::Curve,
            "SURFACE" => ObjectClass::Surface,
            "GRID_OBJECT" => ObjectClass::GridObject,
            "DRILLHOLE" => ObjectClass::Drillhole,
            _ => ObjectClass::Custom,
        }
    }
}

/// `Data` concrete subtype tag. `Comments` is set explicitly at creation
/// time rather than inferred later by sniffing a `"UserComments"` value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataClass {
    Generic,
    Comments,
}

impl DataClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataClass::Generic => "GENERIC",
            DataClass::Comments => "COMMENTS",
        }
    }

    pub fn from_str(value: &str) -> Self {
        match value {
            "COMMENTS" => DataClass::Comments,
            _ => DataClass::Generic,
        }
    }
}

/// Geometry payload for `ObjectBase` subtypes, with field shapes matching
/// `geoh5py/objects/object_base.py` and its siblings.
#[derive(Debug, Clone)]
pub enum Geometry {
    /// No geometry: groups, and `ObjectClass::Custom` with unknown payload.
    None,
    Points { vertices: Vec<[f64; 3]> },
    Curve {
        vertices: Vec<[f64; 3]>,
        cells: Vec<[u32; 2]>,
    },
    Surface {
        vertices: Vec<[f64; 3]>,
        cells: Vec<[u32; 3]>,
    },
    GridObject {
        origin: [f64; 3],
        u_count: u32,
        v_count: u32,
        u_cell_size: f64,
        v_cell_size: f64,
        rotation: f64,
    },
    Drillhole {
        collar: [f64; 3],
        surveys: Vec<SurveyRow>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurveyRow {
    pub depth: f64,
    pub azimuth: f64,
    pub dip: f64,
}

impl Geometry {
    /// Number of vertices, used by `add_data`'s association inference.
    pub fn n_vertices(&self) -> Option<usize> {
        match self {
            Geometry::Points { vertices } => Some(vertices.len()),
            Geometry::Curve { vertices, .. } => Some(vertices.len()),
            Geometry::Surface { vertices, .. } => Some(vertices.len()),
            Geometry::Drillhole { surveys, .. } => Some(surveys.len()),
            Geometry::GridObject { u_count, v_count, .. } => {
                Some((*u_count as usize) * (*v_count as usize))
            }
            Geometry::None => None,
        }
    }

    /// Number of cells, used by `add_data`'s association inference.
    pub fn n_cells(&self) -> Option<usize> {
        match self {
            Geometry::Curve { cells, .. } => Some(cells.len()),
            Geometry::Surface { cells, .. } => Some(cells.len()),
            Geometry::GridObject { u_count, v_count, .. } => {
                let (u, v) = (*u_count as usize, *v_count as usize);
                if u == 0 || v == 0 {
                    Some(0)
                } else {
                    Some((u - 1) * (v - 1))
                }
            }
            _ => None,
        }
    }
}

/// No-data sentinel for `IntegerData`, matching `geoh5py.shared.INTEGER_NDV`.
pub const INTEGER_NO_DATA: i32 = i32::MIN;

/// Value payload typed by the owning `DataType`'s primitive type.
#[derive(Debug, Clone)]
pub enum DataValues {
    Integer(Vec<i32>),
    Float(Vec<f32>),
    Text(Vec<String>),
    Referenced(Vec<u32>),
    /// ISO-8601 strings; empty string is the no-data sentinel.
    DateTime(Vec<String>),
    Filename(Vec<String>),
    Blob(Vec<Vec<u8>>),
    Vector(Vec<[f64; 3]>),
    /// Duration in seconds; `f64::NAN` is the no-data sentinel.
    DataTimeDelta(Vec<f64>),
    Boolean(Vec<bool>),
    Geometric(Vec<f32>),
    MultiText(Vec<Vec<String>>),
}

impl DataValues {
    pub fn primitive_type(&self) -> PrimitiveType {
        match self {
            DataValues::Integer(_) => PrimitiveType::Integer,
            DataValues::Float(_) => PrimitiveType::Float,
            DataValues::Text(_) => PrimitiveType::Text,
            DataValues::Referenced(_) => PrimitiveType::Referenced,
            DataValues::DateTime(_) => PrimitiveType::DateTime,
            DataValues::Filename(_) => PrimitiveType::Filename,
            DataValues::Blob(_) => PrimitiveType::Blob,
            DataValues::Vector(_) => PrimitiveType::Vector,
            DataValues::DataTimeDelta(_) => PrimitiveType::DataTimeDelta,
            DataValues::Boolean(_) => PrimitiveType::Boolean,
            DataValues::Geometric(_) => PrimitiveType::Geometric,
            DataValues::MultiText(_) => PrimitiveType::MultiText,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            DataValues::Integer(v) => v.len(),
            DataValues::Float(v) => v.len(),
            DataValues::Text(v) => v.len(),
            DataValues::Referenced(v) => v.len(),
            DataValues::DateTime(v) => v.len(),
            DataValues::Filename(v) => v.len(),
            DataValues::Blob(v) => v.len(),
            DataValues::Vector(v) => v.len(),
            DataValues::DataTimeDelta(v) => v.len(),
            DataValues::Boolean(v) => v.len(),
            DataValues::Geometric(v) => v.len(),
            DataValues::MultiText(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Validate and narrow a floating-point value buffer to `IntegerData`
/// storage, rejecting values with a fractional component, matching
/// `geoh5py`'s `IntegerData.check_type`.
pub fn validate_integer_values(values: &[f64]) -> Result<Vec<i32>> {
    let mut out = Vec::with_capacity(values.len());
    for &v in values {
        if v.fract() != 0.0 {
            return Err(ModelError::Validation {
                what: "IntegerData.values".to_string(),
                message: format!("value {v} cannot have decimal points"),
            });
        }
        out.push(v as i32);
    }
    Ok(out)
}

/// Named, ordered list of data identifiers sharing one association on one
/// parent object.
#[derive(Debug, Clone)]
pub struct PropertyGroup {
    pub uid: Uid,
    pub name: String,
    pub group_type: PropertyGroupType,
    pub association: Association,
    pub properties: Vec<Uid>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyGroupType {
    Multi,
    DipDirectionAndDip,
    StrikeAndDip,
    Vector3D,
    Depth,
    Stratigraphy,
    Interval,
}

impl PropertyGroupType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PropertyGroupType::Multi => "MULTI_ELEMENT",
            PropertyGroupType::DipDirectionAndDip => "DIP_DIRECTION_DIP",
            PropertyGroupType::StrikeAndDip => "STRIKE_DIP",
            PropertyGroupType::Vector3D => "VECTOR_3D",
            PropertyGroupType::Depth => "DEPTH",
            PropertyGroupType::Stratigraphy => "STRATIGRAPHY",
            PropertyGroupType::Interval => "INTERVAL",
        }
    }

    pub fn from_str(value: &str) -> Self {
        match value {
            "DIP_DIRECTION_DIP" => PropertyGroupType::DipDirectionAndDip,
            "STRIKE_DIP" => PropertyGroupType::StrikeAndDip,
            "VECTOR_3D" => PropertyGroupType::Vector3D,
            "DEPTH" => PropertyGroupType::Depth,
            "STRATIGRAPHY" => PropertyGroupType::Stratigraphy,
            "INTERVAL" => PropertyGroupType::Interval,
            _ => PropertyGroupType::Multi,
        }
    }
}

impl PropertyGroup {
    pub fn new(name: impl Into<String>, group_type: PropertyGroupType, association: Association) -> Self {
        PropertyGroup {
            uid: Uid::new_v4(),
            name: name.into(),
            group_type,
            association,
            properties: Vec::new(),
        }
    }
}

/// Result of `add_children` on one call: how many children were appended,
/// and how many were rejected as duplicates (a non-fatal `warn!` case).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AddChildrenReport {
    pub appended: usize,
    pub duplicates: usize,
}

/// Append `new_children` to `children` if not already present. Insertion
/// order is preserved; duplicates are a non-fatal, reported condition
/// rather than an error.
pub fn add_children(children: &mut Vec<EntityId>, new_children: &[EntityId]) -> AddChildrenReport {
    let mut report = AddChildrenReport::default();
    for &child in new_children {
        if children.contains(&child) {
            report.duplicates += 1;
        } else {
            children.push(child);
            report.appended += 1;
        }
    }
    report
}

/// Remove each of `to_remove` from `children`, preserving order of the
/// remainder.
pub fn remove_children(children: &mut Vec<EntityId>, to_remove: &[EntityId]) {
    children.retain(|c| !to_remove.contains(c));
}

/// Detach a data uid from every property group of a parent object, run as
/// part of `remove_children` when the removed child is `Data`.
pub fn detach_data_from_property_groups(property_groups: &mut [PropertyGroup], data_uid: Uid) {
    for group in property_groups.iter_mut() {
        group.properties.retain(|&uid| uid != data_uid);
    }
}

/// Infer association for `add_data`: `Cell` if the
/// value count matches the parent's cell count, `Vertex` if it matches the
/// vertex count, else `Object`.
pub fn infer_association(value_count: usize, geometry: &Geometry) -> Association {
    if geometry.n_cells() == Some(value_count) {
        Association::Cell
    } else if geometry.n_vertices() == Some(value_count) {
        Association::Vertex
    } else {
        Association::Object
    }
}

/// Keep only the elements of `items` whose corresponding `mask` entry is
/// `true`, used by `copy`'s mask-aware vertex/value filtering.
fn filter_by_mask<T: Clone>(items: &[T], mask: &[bool]) -> Vec<T> {
    items
        .iter()
        .zip(mask.iter())
        .filter(|(_, &keep)| keep)
        .map(|(v, _)| v.clone())
        .collect()
}

/// Apply a copy mask to an object's geometry. Only
/// vertex-carrying geometry whose vertex count matches `mask.len()` is
/// filtered; cell topology is left untouched, since re-indexing cells
/// against a filtered vertex set is out of scope (see DESIGN.md).
/// Geometry that doesn't match the mask length is copied unchanged.
pub fn mask_geometry(geometry: &Geometry, mask: &[bool]) -> Geometry {
    match geometry {
        Geometry::Points { vertices } if vertices.len() == mask.len() => Geometry::Points {
            vertices: filter_by_mask(vertices, mask),
        },
        Geometry::Curve { vertices, cells } if vertices.len() == mask.len() => Geometry::Curve {
            vertices: filter_by_mask(vertices, mask),
            cells: cells.clone(),
        },
        Geometry::Surface { vertices, cells } if vertices.len() == mask.len() => Geometry::Surface {
            vertices: filter_by_mask(vertices, mask),
            cells: cells.clone(),
        },
        other => other.clone(),
    }
}

/// Apply a copy mask to a `Data` child's values when its association is
/// `Vertex` or `Cell` and the value count matches the mask length. Any
/// other association, or a length mismatch, copies the values unchanged.
pub fn mask_data_values(values: &DataValues, association: Association, mask: &[bool]) -> DataValues {
    if !matches!(association, Association::Vertex | Association::Cell) || values.len() != mask.len() {
        return values.clone();
    }
    match values {
        DataValues::Integer(v) => DataValues::Integer(filter_by_mask(v, mask)),
        DataValues::Float(v) => DataValues::Float(filter_by_mask(v, mask)),
        DataValues::Text(v) => DataValues::Text(filter_by_mask(v, mask)),
        DataValues::Referenced(v) => DataValues::Referenced(filter_by_mask(v, mask)),
        DataValues::DateTime(v) => DataValues::DateTime(filter_by_mask(v, mask)),
        DataValues::Filename(v) => DataValues::Filename(filter_by_mask(v, mask)),
        DataValues::Blob(v) => DataValues::Blob(filter_by_mask(v, mask)),
        DataValues::Vector(v) => DataValues::Vector(filter_by_mask(v, mask)),
        DataValues::DataTimeDelta(v) => DataValues::DataTimeDelta(filter_by_mask(v, mask)),
        DataValues::Boolean(v) => DataValues::Boolean(filter_by_mask(v, mask)),
        DataValues::Geometric(v) => DataValues::Geometric(filter_by_mask(v, mask)),
        DataValues::MultiText(v) => DataValues::MultiText(filter_by_mask(v, mask)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_children_reports_duplicates_without_mutating_twice() {
        let mut children = Vec::new();
        let a = slotmap::KeyData::from_ffi(1).into();
        let b = slotmap::KeyData::from_ffi(2).into();
        let report = add_children(&mut children, &[a, b]);
        assert_eq!(report, AddChildrenReport { appended: 2, duplicates: 0 });
        assert_eq!(children, vec![a, b]);

        let report2 = add_children(&mut children, &[a]);
        assert_eq!(report2, AddChildrenReport { appended: 0, duplicates: 1 });
        assert_eq!(children, vec![a, b]);
    }

    #[test]
    fn add_children_then_remove_children_is_a_no_op_on_list() {
        let mut children = Vec::new();
        let a: EntityId = slotmap::KeyData::from_ffi(1).into();
        add_children(&mut children, &[a]);
        remove_children(&mut children, &[a]);
        assert!(children.is_empty());
    }

    #[test]
    fn infer_association_prefers_cell_then_vertex_then_object() {
        let geometry = Geometry::Surface {
            vertices: vec![[0.0, 0.0, 0.0]; 4],
            cells: vec![[0, 1, 2]; 2],
        };
        assert_eq!(infer_association(2, &geometry), Association::Cell);
        assert_eq!(infer_association(4, &geometry), Association::Vertex);
        assert_eq!(infer_association(99, &geometry), Association::Object);
    }

    #[test]
    fn validate_integer_values_rejects_fractions() {
        assert!(validate_integer_values(&[1.0, 2.0, 3.0]).is_ok());
        assert!(validate_integer_values(&[1.0, 2.5]).is_err());
    }

    #[test]
    fn mask_geometry_filters_points_vertices() {
        let geometry = Geometry::Points {
            vertices: (0..10).map(|i| [i as f64, 0.0, 0.0]).collect(),
        };
        let mask: Vec<bool> = (0..10).map(|i| i < 5).collect();
        let masked = mask_geometry(&geometry, &mask);
        match masked {
            Geometry::Points { vertices } => {
                assert_eq!(vertices.len(), 5);
                assert_eq!(vertices[0], [0.0, 0.0, 0.0]);
                assert_eq!(vertices[4], [4.0, 0.0, 0.0]);
            }
            _ => panic!("expected points geometry"),
        }
    }

    #[test]
    fn mask_data_values_filters_vertex_associated_values_only() {
        let mask = vec![true, false, true, false];
        let vertex_values = DataValues::Float(vec![1.0, 2.0, 3.0, 4.0]);
        let masked = mask_data_values(&vertex_values, Association::Vertex, &mask);
        match masked {
            DataValues::Float(v) => assert_eq!(v, vec![1.0, 3.0]),
            _ => panic!("expected float values"),
        }

        let object_values = DataValues::Float(vec![1.0, 2.0, 3.0, 4.0]);
        let unmasked = mask_data_values(&object_values, Association::Object, &mask);
        match unmasked {
            DataValues::Float(v) => assert_eq!(v, vec![1.0, 2.0, 3.0, 4.0]),
            _ => panic!("expected float values"),
        }
    }

    #[test]
    fn detach_data_from_property_groups_removes_uid_everywhere() {
        let uid = Uid::new_v4();
        let mut groups = vec![PropertyGroup::new(
            "g1",
            PropertyGroupType::Multi,
            Association::Vertex,
        )];
        groups[0].properties.push(uid);
        detach_data_from_property_groups(&mut groups, uid);
        assert!(groups[0].properties.is_empty());
    }
}
