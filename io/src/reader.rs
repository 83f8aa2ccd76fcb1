//! Persistence reader (C5): rebuilds the in-memory entity graph from an
//! already-open HDF5 container, mirroring `writer.rs`'s layout one-for-one.
//!
//! Grounded in `geoh5py/workspace/workspace.py`'s two-pass load (types and
//! bare records first, cross-references resolved in a second pass) since
//! Rust's slotmap keys can't be known before the slots they point to exist.

use std::collections::HashMap;

use hdf5::{File as H5File, Group};
use slotmap::SlotMap;

use geoh5_model::entity::{
    DataClass, DataValues, EntityId, EntityKind, EntityRecord, Geometry, GroupClass, ObjectClass,
    PropertyGroup, PropertyGroupType, SurveyRow,
};
use geoh5_model::ids::{decode_bool, Association, PrimitiveType};
use geoh5_model::types::{
    ColorMap, DataTypeAttrs, EntityTypeRecord, GroupTypeAttrs, ObjectTypeAttrs, ReferenceValueMap,
    TypeId, TypeKind,
};
use geoh5_model::Uid;

use crate::concat::ConcatenationLayer;
use crate::container as c;
use crate::error::{IoError, Result};
use crate::workspace::ProjectAttributes;

const ROOT_GROUP: &str = "GEOSCIENCE";

pub struct LoadedWorkspace {
    pub project: ProjectAttributes,
    pub entities: SlotMap<EntityId, EntityRecord>,
    pub types: SlotMap<TypeId, EntityTypeRecord>,
    pub root: EntityId,
    pub groups_by_uid: HashMap<Uid, EntityId>,
    pub objects_by_uid: HashMap<Uid, EntityId>,
    pub data_by_uid: HashMap<Uid, EntityId>,
    pub types_by_uid: HashMap<Uid, Vec<TypeId>>,
    pub concat: ConcatenationLayer,
}

/// Per-entity cross references not yet resolvable to slotmap keys on first
/// read.
#[derive(Default)]
struct RawLinks {
    parent: Option<String>,
    type_uid: Option<String>,
    children: Vec<String>,
}

pub fn load_workspace(file: &H5File) -> Result<LoadedWorkspace> {
    let root_bucket: Group = file.group(ROOT_GROUP)?;
    let project = load_project_attributes(&root_bucket)?;

    let mut types: SlotMap<TypeId, EntityTypeRecord> = SlotMap::with_key();
    let mut types_by_uid: HashMap<Uid, Vec<TypeId>> = HashMap::new();
    load_types(&root_bucket, &mut types, &mut types_by_uid)?;

    let mut entities: SlotMap<EntityId, EntityRecord> = SlotMap::with_key();
    let mut groups_by_uid = HashMap::new();
    let mut objects_by_uid = HashMap::new();
    let mut data_by_uid = HashMap::new();
    let mut raw_links: HashMap<EntityId, RawLinks> = HashMap::new();
    let mut uid_to_id: HashMap<Uid, EntityId> = HashMap::new();
    let mut root_id = None;

    load_groups(
        &root_bucket,
        &mut entities,
        &mut groups_by_uid,
        &mut uid_to_id,
        &mut raw_links,
        &mut root_id,
    )?;
    load_objects(
        &root_bucket,
        &mut entities,
        &mut objects_by_uid,
        &mut uid_to_id,
        &mut raw_links,
    )?;
    load_data(
        &root_bucket,
        &mut entities,
        &mut data_by_uid,
        &mut uid_to_id,
        &mut raw_links,
    )?;

    resolve_links(&mut entities, &raw_links, &uid_to_id, &types_by_uid, &types)?;

    let concat = load_drillhole_concat_layer(&root_bucket, &entities, &groups_by_uid)?;
    patch_concatenated_data(&mut entities, &raw_links, &uid_to_id, &data_by_uid, &concat);

    let root = root_id.ok_or_else(|| {
        IoError::Corrupt {
            uid: Uid::new_v4(),
            message: "no Root-class entity found under Groups".to_string(),
        }
    })?;

    Ok(LoadedWorkspace {
        project,
        entities,
        types,
        root,
        groups_by_uid,
        objects_by_uid,
        data_by_uid,
        types_by_uid,
        concat,
    })
}

/// Reconstruct one `ConcatenatorIndex` per on-file `DrillholeGroup`, reading
/// back the `Concatenated Data` subgroup written by
/// `concat::persist`.
fn load_drillhole_concat_layer(
    root: &Group,
    entities: &SlotMap<EntityId, EntityRecord>,
    groups_by_uid: &HashMap<Uid, EntityId>,
) -> Result<ConcatenationLayer> {
    let mut layer = ConcatenationLayer::new();
    let Some(bucket) = c::group(root, "Groups")? else {
        return Ok(layer);
    };
    for (&group_uid, &group_id) in groups_by_uid {
        let is_drillhole_group = matches!(
            entities.get(group_id).map(|e| &e.kind),
            Some(EntityKind::Group { class: GroupClass::DrillholeGroup, .. })
        );
        if !is_drillhole_group {
            continue;
        }
        let uid_name = group_uid.to_braced();
        let Some(group_group) = c::group(&bucket, &uid_name)? else {
            continue;
        };
        if let Some(index) = crate::concat::load(&group_group)? {
            *layer.index_mut(group_uid) = index;
        }
    }
    Ok(layer)
}

/// Any `Data` whose values were left empty because `save_entity` redirected
/// them into a `DrillholeGroup`'s shared channel arrays gets its values
/// patched back in from the reconstructed `ConcatenatorIndex`, keyed by its
/// parent object's uid and its own name.
fn patch_concatenated_data(
    entities: &mut SlotMap<EntityId, EntityRecord>,
    raw_links: &HashMap<EntityId, RawLinks>,
    uid_to_id: &HashMap<Uid, EntityId>,
    data_by_uid: &HashMap<Uid, EntityId>,
    concat: &ConcatenationLayer,
) {
    for &data_id in data_by_uid.values() {
        let Some(object_uid) = raw_links
            .get(&data_id)
            .and_then(|l| l.parent.as_deref())
            .and_then(|s| Uid::from_braced(s).ok())
        else {
            continue;
        };
        let Some(&object_id) = uid_to_id.get(&object_uid) else {
            continue;
        };
        let Some(group_uid) = raw_links
            .get(&object_id)
            .and_then(|l| l.parent.as_deref())
            .and_then(|s| Uid::from_braced(s).ok())
        else {
            continue;
        };
        let Some(index) = concat.index(group_uid) else {
            continue;
        };

        let Some(entity) = entities.get(data_id) else {
            continue;
        };
        let needs_patch = matches!(
            &entity.kind,
            EntityKind::Data { values: DataValues::Float(v), .. } if v.is_empty()
        );
        if !needs_patch {
            continue;
        }
        let name = entity.name.clone();
        let Some(values) = index.values(object_uid, &name) else {
            continue;
        };
        let values_f32: Vec<f32> = values.iter().map(|&v| v as f32).collect();
        if let Some(entity) = entities.get_mut(data_id) {
            if let EntityKind::Data { values, .. } = &mut entity.kind {
                *values = DataValues::Float(values_f32);
            }
        }
    }
}

fn load_project_attributes(root: &Group) -> Result<ProjectAttributes> {
    let mut project = ProjectAttributes::default();
    if let Some(v) = c::read_attr_string_array(root, "Contributors")? {
        project.contributors = v;
    }
    if let Some(v) = c::read_attr_string(root, "Distance unit")? {
        project.distance_unit = v;
    }
    if let Some(v) = c::read_attr_string(root, "GA Version")? {
        project.ga_version = v;
    }
    if let Some(v) = c::read_attr_f64(root, "Version")? {
        project.version = v;
    }
    Ok(project)
}

fn load_types(
    root: &Group,
    types: &mut SlotMap<TypeId, EntityTypeRecord>,
    types_by_uid: &mut HashMap<Uid, Vec<TypeId>>,
) -> Result<()> {
    let types_bucket = root.group("Types")?;

    if let Some(bucket) = c::group(&types_bucket, "Group types")? {
        for uid_name in c::member_names(&bucket)? {
            let group = bucket.group(&uid_name)?;
            let attrs = group.group("Attributes")?;
            let uid = Uid::from_braced(&c::require_attr_string(&attrs, "ID")?)?;
            let name = c::require_attr_string(&attrs, "Name")?;
            let description = c::read_attr_string(&attrs, "Description")?;
            let group_class = c::read_attr_string(&attrs, "Group class")?
                .map(|s| GroupClass::from_str(&s))
                .unwrap_or(GroupClass::Custom);
            let allow_move_content = c::read_attr_i8(&attrs, "Allow move content")?
                .map(decode_bool)
                .unwrap_or(true);
            let allow_delete_content = c::read_attr_i8(&attrs, "Allow delete content")?
                .map(decode_bool)
                .unwrap_or(true);
            let id = types.insert(EntityTypeRecord {
                uid,
                name,
                description,
                on_file: true,
                kind: TypeKind::Group(GroupTypeAttrs {
                    allow_move_content,
                    allow_delete_content,
                    group_class,
                }),
            });
            types_by_uid.entry(uid).or_default().push(id);
        }
    }

    if let Some(bucket) = c::group(&types_bucket, "Object types")? {
        for uid_name in c::member_names(&bucket)? {
            let group = bucket.group(&uid_name)?;
            let attrs = group.group("Attributes")?;
            let uid = Uid::from_braced(&c::require_attr_string(&attrs, "ID")?)?;
            let name = c::require_attr_string(&attrs, "Name")?;
            let description = c::read_attr_string(&attrs, "Description")?;
            let object_class = c::read_attr_string(&attrs, "Object class")?
                .map(|s| ObjectClass::from_str(&s))
                .unwrap_or(ObjectClass::Custom);
            let id = types.insert(EntityTypeRecord {
                uid,
                name,
                description,
                on_file: true,
                kind: TypeKind::Object(ObjectTypeAttrs { object_class }),
            });
            types_by_uid.entry(uid).or_default().push(id);
        }
    }

    if let Some(bucket) = c::group(&types_bucket, "Data types")? {
        for uid_name in c::member_names(&bucket)? {
            let group = bucket.group(&uid_name)?;
            let attrs = group.group("Attributes")?;
            let uid = Uid::from_braced(&c::require_attr_string(&attrs, "ID")?)?;
            let name = c::require_attr_string(&attrs, "Name")?;
            let description = c::read_attr_string(&attrs, "Description")?;
            let primitive_type = c::read_attr_string(&attrs, "Primitive type")?
                .and_then(|s| PrimitiveType::from_str(&s))
                .unwrap_or(PrimitiveType::Invalid);
            let units = c::read_attr_string(&attrs, "Units")?;
            let hidden = c::read_attr_i8(&attrs, "Hidden")?.map(decode_bool).unwrap_or(false);
            let transparent_no_data = c::read_attr_i8(&attrs, "Transparent no data")?
                .map(decode_bool)
                .unwrap_or(true);
            let duplicate_type_on_copy = c::read_attr_i8(&attrs, "Duplicate type on copy")?
                .map(decode_bool)
                .unwrap_or(false);
            let mapping = c::read_attr_string(&attrs, "Mapping")?;
            let number_of_bins = c::read_attr_f64(&attrs, "Number of bins")?.map(|v| v as u32);
            let precision = c::read_attr_f64(&attrs, "Precision")?.map(|v| v as u32);
            let value_map = if c::has_member(&group, "Value map") {
                Some(
                    ReferenceValueMap::new(c::read_value_map(&group, "Value map")?)
                        .map_err(|message| IoError::Corrupt { uid, message })?,
                )
            } else {
                None
            };
            let color_map = if c::has_member(&group, "Color map") {
                Some(ColorMap {
                    entries: c::read_color_map(&group, "Color map")?,
                })
            } else {
                None
            };
            let id = types.insert(EntityTypeRecord {
                uid,
                name,
                description,
                on_file: true,
                kind: TypeKind::Data(DataTypeAttrs {
                    primitive_type,
                    data_class: DataClass::Generic,
                    units,
                    value_map,
                    color_map,
                    hidden,
                    mapping,
                    number_of_bins,
                    transparent_no_data,
                    duplicate_type_on_copy,
                    precision,
                }),
            });
            types_by_uid.entry(uid).or_default().push(id);
        }
    }

    Ok(())
}

fn read_common(attrs: &Group) -> Result<(Uid, String, bool, bool, bool, bool, bool)> {
    let uid = Uid::from_braced(&c::require_attr_string(attrs, "ID")?)?;
    let name = c::require_attr_string(attrs, "Name")?;
    let visible = c::read_attr_i8(attrs, "Visible")?.map(decode_bool).unwrap_or(true);
    let public = c::read_attr_i8(attrs, "Public")?.map(decode_bool).unwrap_or(true);
    let allow_delete = c::read_attr_i8(attrs, "Allow delete")?.map(decode_bool).unwrap_or(true);
    let allow_rename = c::read_attr_i8(attrs, "Allow rename")?.map(decode_bool).unwrap_or(true);
    let allow_move = c::read_attr_i8(attrs, "Allow move")?.map(decode_bool).unwrap_or(true);
    Ok((uid, name, visible, public, allow_delete, allow_rename, allow_move))
}

fn read_raw_links(attrs: &Group) -> Result<RawLinks> {
    Ok(RawLinks {
        parent: c::read_attr_string(attrs, "Parent")?,
        type_uid: c::read_attr_string(attrs, "Type")?,
        children: c::read_attr_string_array(attrs, "Children")?.unwrap_or_default(),
    })
}

#[allow(clippy::too_many_arguments)]
fn load_groups(
    root: &Group,
    entities: &mut SlotMap<EntityId, EntityRecord>,
    groups_by_uid: &mut HashMap<Uid, EntityId>,
    uid_to_id: &mut HashMap<Uid, EntityId>,
    raw_links: &mut HashMap<EntityId, RawLinks>,
    root_id: &mut Option<EntityId>,
) -> Result<()> {
    let Some(bucket) = c::group(root, "Groups")? else {
        return Ok(());
    };
    for uid_name in c::member_names(&bucket)? {
        let group = bucket.group(&uid_name)?;
        let attrs = group.group("Attributes")?;
        let (uid, name, visible, public, allow_delete, allow_rename, allow_move) =
            read_common(&attrs)?;
        let class_str = c::read_attr_string(&attrs, "Class")?.unwrap_or_else(|| "CUSTOM".to_string());

        let kind = if class_str == "ROOT" {
            EntityKind::Root { children: Vec::new() }
        } else {
            EntityKind::Group {
                children: Vec::new(),
                class: GroupClass::from_str(&class_str),
            }
        };

        let id = entities.insert(EntityRecord {
            uid,
            name,
            visible,
            allow_delete,
            allow_rename,
            allow_move,
            public,
            on_file: true,
            parent: None,
            entity_type: None,
            dirty: Default::default(),
            kind,
        });
        uid_to_id.insert(uid, id);
        groups_by_uid.insert(uid, id);
        raw_links.insert(id, read_raw_links(&attrs)?);

        if class_str == "ROOT" {
            *root_id = Some(id);
        }
    }
    Ok(())
}

fn load_objects(
    root: &Group,
    entities: &mut SlotMap<EntityId, EntityRecord>,
    objects_by_uid: &mut HashMap<Uid, EntityId>,
    uid_to_id: &mut HashMap<Uid, EntityId>,
    raw_links: &mut HashMap<EntityId, RawLinks>,
) -> Result<()> {
    let Some(bucket) = c::group(root, "Objects")? else {
        return Ok(());
    };
    for uid_name in c::member_names(&bucket)? {
        let group = bucket.group(&uid_name)?;
        let attrs = group.group("Attributes")?;
        let (uid, name, visible, public, allow_delete, allow_rename, allow_move) =
            read_common(&attrs)?;
        let class = ObjectClass::from_str(
            &c::read_attr_string(&attrs, "Class")?.unwrap_or_else(|| "CUSTOM".to_string()),
        );
        let geometry = load_geometry(&group, &attrs, class)?;
        let property_groups = load_property_groups(&group)?;

        let id = entities.insert(EntityRecord {
            uid,
            name,
            visible,
            allow_delete,
            allow_rename,
            allow_move,
            public,
            on_file: true,
            parent: None,
            entity_type: None,
            dirty: Default::default(),
            kind: EntityKind::Object {
                children: Vec::new(),
                property_groups,
                class,
                geometry,
            },
        });
        uid_to_id.insert(uid, id);
        objects_by_uid.insert(uid, id);
        raw_links.insert(id, read_raw_links(&attrs)?);
    }
    Ok(())
}

fn load_geometry(group: &Group, attrs: &Group, class: ObjectClass) -> Result<Geometry> {
    Ok(match class {
        ObjectClass::Points => Geometry::Points {
            vertices: read_vertices(group)?,
        },
        ObjectClass::Curve => Geometry::Curve {
            vertices: read_vertices(group)?,
            cells: read_cells::<2>(group)?,
        },
        ObjectClass::Surface => Geometry::Surface {
            vertices: read_vertices(group)?,
            cells: read_cells::<3>(group)?,
        },
        ObjectClass::GridObject => {
            let origin_flat = if c::has_member(group, "Origin") {
                c::read_dataset_f64(group, "Origin")?
            } else {
                vec![0.0, 0.0, 0.0]
            };
            let origin = [
                *origin_flat.first().unwrap_or(&0.0),
                *origin_flat.get(1).unwrap_or(&0.0),
                *origin_flat.get(2).unwrap_or(&0.0),
            ];
            Geometry::GridObject {
                origin,
                u_count: c::read_attr_f64(attrs, "U count")?.unwrap_or(0.0) as u32,
                v_count: c::read_attr_f64(attrs, "V count")?.unwrap_or(0.0) as u32,
                u_cell_size: c::read_attr_f64(attrs, "U cell size")?.unwrap_or(1.0),
                v_cell_size: c::read_attr_f64(attrs, "V cell size")?.unwrap_or(1.0),
                rotation: c::read_attr_f64(attrs, "Rotation")?.unwrap_or(0.0),
            }
        }
        ObjectClass::Drillhole => {
            let collar_flat = if c::has_member(group, "Collar") {
                c::read_dataset_f64(group, "Collar")?
            } else {
                vec![0.0, 0.0, 0.0]
            };
            let collar = [
                *collar_flat.first().unwrap_or(&0.0),
                *collar_flat.get(1).unwrap_or(&0.0),
                *collar_flat.get(2).unwrap_or(&0.0),
            ];
            let surveys = if c::has_member(group, "Surveys") {
                c::read_dataset_f64(group, "Surveys")?
                    .chunks_exact(3)
                    .map(|c| SurveyRow {
                        depth: c[0],
                        azimuth: c[1],
                        dip: c[2],
                    })
                    .collect()
            } else {
                Vec::new()
            };
            Geometry::Drillhole { collar, surveys }
        }
        ObjectClass::Custom => Geometry::None,
    })
}

fn read_vertices(group: &Group) -> Result<Vec<[f64; 3]>> {
    if !c::has_member(group, "Vertices") {
        return Ok(Vec::new());
    }
    Ok(c::read_dataset_f64(group, "Vertices")?
        .chunks_exact(3)
        .map(|c| [c[0], c[1], c[2]])
        .collect())
}

fn read_cells<const N: usize>(group: &Group) -> Result<Vec<[u32; N]>> {
    if !c::has_member(group, "Cells") {
        return Ok(Vec::new());
    }
    Ok(c::read_dataset_u32(group, "Cells")?
        .chunks_exact(N)
        .map(|c| {
            let mut out = [0u32; N];
            out.copy_from_slice(c);
            out
        })
        .collect())
}

fn load_property_groups(group: &Group) -> Result<Vec<PropertyGroup>> {
    let Some(pg_root) = c::group(group, "PropertyGroups")? else {
        return Ok(Vec::new());
    };
    let mut out = Vec::new();
    for uid_name in c::member_names(&pg_root)? {
        let pg_group = pg_root.group(&uid_name)?;
        let attrs = pg_group.group("Attributes")?;
        let uid = Uid::from_braced(&c::require_attr_string(&attrs, "ID")?)?;
        let name = c::require_attr_string(&attrs, "Name")?;
        let group_type = c::read_attr_string(&attrs, "Group type")?
            .map(|s| PropertyGroupType::from_str(&s))
            .unwrap_or(PropertyGroupType::Multi);
        let association = c::read_attr_string(&attrs, "Association")?
            .and_then(|s| Association::from_str(&s))
            .unwrap_or(Association::Vertex);
        let properties = c::read_attr_string_array(&attrs, "Properties")?
            .unwrap_or_default()
            .iter()
            .filter_map(|s| Uid::from_braced(s).ok())
            .collect();
        out.push(PropertyGroup {
            uid,
            name,
            group_type,
            association,
            properties,
        });
    }
    Ok(out)
}

fn load_data(
    root: &Group,
    entities: &mut SlotMap<EntityId, EntityRecord>,
    data_by_uid: &mut HashMap<Uid, EntityId>,
    uid_to_id: &mut HashMap<Uid, EntityId>,
    raw_links: &mut HashMap<EntityId, RawLinks>,
) -> Result<()> {
    let Some(bucket) = c::group(root, "Data")? else {
        return Ok(());
    };
    for uid_name in c::member_names(&bucket)? {
        let group = bucket.group(&uid_name)?;
        let attrs = group.group("Attributes")?;
        let (uid, name, visible, public, allow_delete, allow_rename, allow_move) =
            read_common(&attrs)?;
        let association = c::read_attr_string(&attrs, "Association")?
            .and_then(|s| Association::from_str(&s))
            .unwrap_or(Association::Object);
        let class = c::read_attr_string(&attrs, "Class")?
            .map(|s| DataClass::from_str(&s))
            .unwrap_or(DataClass::Generic);
        let primitive_type = c::read_attr_string(&attrs, "Primitive type")?
            .and_then(|s| PrimitiveType::from_str(&s))
            .unwrap_or(PrimitiveType::Invalid);
        let values = load_data_values(&group, uid, primitive_type)?;

        let id = entities.insert(EntityRecord {
            uid,
            name,
            visible,
            allow_delete,
            allow_rename,
            allow_move,
            public,
            on_file: true,
            parent: None,
            entity_type: None,
            dirty: Default::default(),
            kind: EntityKind::Data { association, values, class },
        });
        uid_to_id.insert(uid, id);
        data_by_uid.insert(uid, id);
        raw_links.insert(id, read_raw_links(&attrs)?);
    }
    Ok(())
}

fn load_data_values(group: &Group, uid: Uid, primitive_type: PrimitiveType) -> Result<DataValues> {
    if !c::has_member(group, "Data") {
        return Ok(empty_values(primitive_type));
    }
    Ok(match primitive_type {
        PrimitiveType::Integer => DataValues::Integer(c::read_dataset_i32(group, "Data")?),
        PrimitiveType::Float => DataValues::Float(c::read_dataset_f32(group, "Data")?),
        PrimitiveType::Text => DataValues::Text(c::read_dataset_strings(group, "Data")?),
        PrimitiveType::Referenced => DataValues::Referenced(c::read_dataset_u32(group, "Data")?),
        PrimitiveType::DateTime => DataValues::DateTime(c::read_dataset_strings(group, "Data")?),
        PrimitiveType::Filename => DataValues::Filename(c::read_dataset_strings(group, "Data")?),
        PrimitiveType::Blob => DataValues::Blob(
            c::read_dataset_strings(group, "Data")?
                .iter()
                .map(|s| hex_decode(s))
                .collect(),
        ),
        PrimitiveType::Vector => DataValues::Vector(
            c::read_dataset_f64(group, "Data")?
                .chunks_exact(3)
                .map(|c| [c[0], c[1], c[2]])
                .collect(),
        ),
        PrimitiveType::DataTimeDelta => {
            DataValues::DataTimeDelta(c::read_dataset_f64(group, "Data")?)
        }
        PrimitiveType::Boolean => DataValues::Boolean(
            c::read_dataset_i8(group, "Data")?
                .into_iter()
                .map(decode_bool)
                .collect(),
        ),
        PrimitiveType::Geometric => DataValues::Geometric(c::read_dataset_f32(group, "Data")?),
        PrimitiveType::MultiText => DataValues::MultiText(
            c::read_dataset_strings(group, "Data")?
                .iter()
                .map(|row| row.split('\u{1f}').map(|s| s.to_string()).collect())
                .collect(),
        ),
        PrimitiveType::Invalid => {
            return Err(IoError::Corrupt {
                uid,
                message: "data record has no recognized primitive type".to_string(),
            })
        }
    })
}

fn empty_values(primitive_type: PrimitiveType) -> DataValues {
    match primitive_type {
        PrimitiveType::Integer | PrimitiveType::Invalid => DataValues::Integer(Vec::new()),
        PrimitiveType::Float => DataValues::Float(Vec::new()),
        PrimitiveType::Text => DataValues::Text(Vec::new()),
        PrimitiveType::Referenced => DataValues::Referenced(Vec::new()),
        PrimitiveType::DateTime => DataValues::DateTime(Vec::new()),
        PrimitiveType::Filename => DataValues::Filename(Vec::new()),
        PrimitiveType::Blob => DataValues::Blob(Vec::new()),
        PrimitiveType::Vector => DataValues::Vector(Vec::new()),
        PrimitiveType::DataTimeDelta => DataValues::DataTimeDelta(Vec::new()),
        PrimitiveType::Boolean => DataValues::Boolean(Vec::new()),
        PrimitiveType::Geometric => DataValues::Geometric(Vec::new()),
        PrimitiveType::MultiText => DataValues::MultiText(Vec::new()),
    }
}

fn hex_decode(text: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len() / 2);
    let bytes = text.as_bytes();
    let mut i = 0;
    while i + 1 < bytes.len() {
        if let Ok(byte) = u8::from_str_radix(&text[i..i + 2], 16) {
            out.push(byte);
        }
        i += 2;
    }
    out
}

fn resolve_links(
    entities: &mut SlotMap<EntityId, EntityRecord>,
    raw_links: &HashMap<EntityId, RawLinks>,
    uid_to_id: &HashMap<Uid, EntityId>,
    types_by_uid: &HashMap<Uid, Vec<TypeId>>,
    types: &SlotMap<TypeId, EntityTypeRecord>,
) -> Result<()> {
    let ids: Vec<EntityId> = entities.keys().collect();
    for id in ids {
        let Some(links) = raw_links.get(&id) else {
            continue;
        };

        let parent = links
            .parent
            .as_deref()
            .and_then(|s| Uid::from_braced(s).ok())
            .and_then(|uid| uid_to_id.get(&uid).copied());

        let entity_type = links
            .type_uid
            .as_deref()
            .and_then(|s| Uid::from_braced(s).ok())
            .and_then(|uid| resolve_type(uid, entities.get(id), types_by_uid, types));

        let children: Vec<EntityId> = links
            .children
            .iter()
            .filter_map(|s| Uid::from_braced(s).ok())
            .filter_map(|uid| uid_to_id.get(&uid).copied())
            .collect();

        if let Some(entity) = entities.get_mut(id) {
            entity.parent = parent;
            entity.entity_type = entity_type;
            if let Some(slot) = entity.children_mut() {
                *slot = children;
            }
        }
    }
    Ok(())
}

fn resolve_type(
    uid: Uid,
    entity: Option<&EntityRecord>,
    types_by_uid: &HashMap<Uid, Vec<TypeId>>,
    types: &SlotMap<TypeId, EntityTypeRecord>,
) -> Option<TypeId> {
    let candidates = types_by_uid.get(&uid)?;
    let wanted_class = match entity?.kind {
        EntityKind::Root { .. } | EntityKind::Group { .. } => "GroupType",
        EntityKind::Object { .. } => "ObjectType",
        EntityKind::Data { .. } => "DataType",
    };
    candidates
        .iter()
        .copied()
        .find(|&id| types.get(id).map(|t| t.kind.class_name() == wanted_class).unwrap_or(false))
}
