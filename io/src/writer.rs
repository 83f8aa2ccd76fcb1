//! Persistence writer: turns live `Workspace` state into HDF5 groups,
//! attributes and datasets under `/GEOSCIENCE`.
//!
//! Grounded in `geoh5py/workspace/workspace.py`'s `save_entity`/`create_root`.
//! The raw `hdf5` container type is never touched outside `container.rs`.

use std::path::Path;

use hdf5::{File as H5File, Group};
use log::{debug, warn};

use geoh5_model::entity::{DataClass, DataValues, EntityId, EntityKind, Geometry, GroupClass, ObjectClass};
use geoh5_model::ids::{encode_bool, Association, PrimitiveType};
use geoh5_model::types::{EntityTypeRecord, TypeId, TypeKind, ENTITY_ATTRIBUTE_MAP, PROJECT_ATTRIBUTE_MAP};
use geoh5_model::Uid;

use crate::concat;
use crate::container as c;
use crate::error::Result;
use crate::workspace::{ProjectAttributes, Workspace};

const ROOT_GROUP: &str = "GEOSCIENCE";

/// `Workspace::create_root`: lay out the fixed top-level
/// group skeleton and write the project attributes.
pub fn create_geoh5(file: &H5File, project: &ProjectAttributes) -> Result<()> {
    let root = c::create_group(file, ROOT_GROUP)?;
    c::create_group(&root, "Root")?;
    c::create_group(&root, "Groups")?;
    c::create_group(&root, "Objects")?;
    c::create_group(&root, "Data")?;
    let types = c::create_group(&root, "Types")?;
    c::create_group(&types, "Group types")?;
    c::create_group(&types, "Object types")?;
    c::create_group(&types, "Data types")?;

    write_project_attributes(&root, project)?;
    Ok(())
}

fn write_project_attributes(root: &Group, project: &ProjectAttributes) -> Result<()> {
    c::write_attr_string_array(
        root,
        PROJECT_ATTRIBUTE_MAP[0].0,
        &project.contributors,
    )?;
    c::write_attr_string(root, PROJECT_ATTRIBUTE_MAP[1].0, &project.distance_unit)?;
    c::write_attr_string(root, PROJECT_ATTRIBUTE_MAP[2].0, &project.ga_version)?;
    c::write_attr_f64(root, PROJECT_ATTRIBUTE_MAP[3].0, project.version)?;
    Ok(())
}

fn root_group(file: &H5File) -> Result<Group> {
    Ok(file.group(ROOT_GROUP)?)
}

/// `/GEOSCIENCE/Root`'s children list, written once at `close()` time as a
/// single `Children` attribute of braced uid strings rather than individual
/// soft links (see DESIGN.md).
pub fn finalize(file: &H5File, workspace: &Workspace, root: EntityId) -> Result<()> {
    let Some(entity) = workspace.entity(root) else {
        return Ok(());
    };
    let root_bucket = root_group(file)?;
    let root_dir = c::group(&root_bucket, "Root")?
        .ok_or_else(|| crate::error::IoError::NotFound("Root group".to_string()))?;

    let children: Vec<String> = entity
        .children()
        .iter()
        .filter_map(|&id| workspace.entity(id))
        .map(|e| e.uid.to_braced())
        .collect();
    c::write_attr_string_array(&root_dir, "Children", &children)?;
    Ok(())
}

/// Flush every `DrillholeGroup`'s concatenator state to its own entity
/// subgroup, once per `close()` after all entities have
/// already been saved so the channel arrays reflect every appended `Data`.
pub fn persist_concatenation(file: &H5File, workspace: &Workspace) -> Result<()> {
    let root = root_group(file)?;
    let Some(groups_bucket) = c::group(&root, "Groups")? else {
        return Ok(());
    };

    for group_uid in workspace.concat.groups().collect::<Vec<_>>() {
        let Some(index) = workspace.concat.index(group_uid) else {
            continue;
        };
        let uid_name = group_uid.to_braced();
        let Some(entity_group) = c::group(&groups_bucket, &uid_name)? else {
            continue;
        };
        concat::persist(&entity_group, index)?;
    }
    Ok(())
}

fn bucket_name(kind: &EntityKind) -> &'static str {
    match kind {
        EntityKind::Root { .. } | EntityKind::Group { .. } => "Groups",
        EntityKind::Object { .. } => "Objects",
        EntityKind::Data { .. } => "Data",
    }
}

/// `Workspace::save_entity`: create-or-update the entity's
/// own subgroup, its `Attributes`, its referenced type, and (for objects)
/// geometry / (for data) values.
pub fn save_entity(
    file: &H5File,
    workspace: &mut Workspace,
    id: EntityId,
    add_children: bool,
) -> Result<()> {
    let entity_type = workspace.entity(id).and_then(|e| e.entity_type);
    if let Some(type_id) = entity_type {
        save_type(file, workspace, type_id)?;
    }

    let Some(entity) = workspace.entity(id) else {
        return Ok(());
    };
    let bucket = bucket_name(&entity.kind);
    let uid_name = entity.uid.to_braced();
    debug!("saving {bucket}/{uid_name}");
    // Cloned up front so the match below is free to take `&mut workspace`
    // (the concatenation redirect needs `workspace.concat`) without fighting
    // the borrow checker over a live `&entity` reference.
    let kind = entity.kind.clone();
    let children: Vec<EntityId> = entity.children().to_vec();
    let name = entity.name.clone();

    let root = root_group(file)?;
    let bucket_group = c::group(&root, bucket)?
        .ok_or_else(|| crate::error::IoError::NotFound(bucket.to_string()))?;
    let entity_group = match c::group(&bucket_group, &uid_name)? {
        Some(g) => g,
        None => c::create_group(&bucket_group, &uid_name)?,
    };

    write_common_attributes(&entity_group, workspace, id)?;

    match kind {
        EntityKind::Root { .. } => {
            let attrs = c::group(&entity_group, "Attributes")?.expect("Attributes written above");
            c::write_attr_string(&attrs, "Class", "ROOT")?;
            write_children_attribute(&entity_group, workspace, &children)?;
        }
        EntityKind::Group { class, .. } => {
            write_group_class(&entity_group, class)?;
            write_children_attribute(&entity_group, workspace, &children)?;
        }
        EntityKind::Object { class, geometry, property_groups, .. } => {
            write_object_class(&entity_group, class)?;
            write_geometry(&entity_group, &geometry)?;
            write_children_attribute(&entity_group, workspace, &children)?;
            write_property_groups(&entity_group, &property_groups)?;
        }
        EntityKind::Data { association, values, class } => {
            match (workspace.concatenator_group_of(id), &values) {
                (Some(group_id), DataValues::Float(raw)) => {
                    write_data_metadata(&entity_group, association, class, PrimitiveType::Float)?;
                    concat::redirect_float_values(workspace, group_id, id, &name, raw)?;
                }
                _ => write_data_values(&entity_group, association, class, &values)?,
            }
        }
    }

    // Children are persisted through their own `save_entity` calls and the
    // parent's child-list attribute; `add_children` only controls whether
    // the caller is expected to have appended them already.
    let _ = add_children;

    if let Some(entity_mut) = workspace.entity_mut(id) {
        entity_mut.on_file = true;
        entity_mut.clear_dirty();
    }

    Ok(())
}

fn write_common_attributes(group: &Group, workspace: &Workspace, id: EntityId) -> Result<()> {
    let Some(entity) = workspace.entity(id) else {
        return Ok(());
    };
    let attrs = match c::group(group, "Attributes")? {
        Some(g) => g,
        None => c::create_group(group, "Attributes")?,
    };

    c::write_attr_string(&attrs, ENTITY_ATTRIBUTE_MAP[0].0, &entity.name)?;
    c::write_attr_string(&attrs, ENTITY_ATTRIBUTE_MAP[1].0, &entity.uid.to_braced())?;
    c::write_attr_i8(&attrs, ENTITY_ATTRIBUTE_MAP[2].0, encode_bool(entity.visible))?;
    c::write_attr_i8(&attrs, ENTITY_ATTRIBUTE_MAP[3].0, encode_bool(entity.public))?;
    c::write_attr_i8(&attrs, ENTITY_ATTRIBUTE_MAP[4].0, encode_bool(entity.allow_delete))?;
    c::write_attr_i8(&attrs, ENTITY_ATTRIBUTE_MAP[5].0, encode_bool(entity.allow_rename))?;
    c::write_attr_i8(&attrs, ENTITY_ATTRIBUTE_MAP[6].0, encode_bool(entity.allow_move))?;

    if let Some(parent_id) = entity.parent {
        if let Some(parent) = workspace.entity(parent_id) {
            c::write_attr_string(&attrs, "Parent", &parent.uid.to_braced())?;
        }
    }
    if let Some(type_id) = entity.entity_type {
        if let Some(entity_type) = workspace.entity_type(type_id) {
            c::write_attr_string(&attrs, "Type", &entity_type.uid.to_braced())?;
        }
    }
    Ok(())
}

fn write_children_attribute(
    group: &Group,
    workspace: &Workspace,
    children: &[EntityId],
) -> Result<()> {
    let attrs = c::group(group, "Attributes")?.expect("Attributes written above");
    let uids: Vec<String> = children
        .iter()
        .filter_map(|&id| workspace.entity(id))
        .map(|e| e.uid.to_braced())
        .collect();
    c::write_attr_string_array(&attrs, "Children", &uids)
}

fn write_group_class(group: &Group, class: GroupClass) -> Result<()> {
    let attrs = c::group(group, "Attributes")?.expect("Attributes written above");
    c::write_attr_string(&attrs, "Class", class.as_str())
}

fn write_object_class(group: &Group, class: ObjectClass) -> Result<()> {
    let attrs = c::group(group, "Attributes")?.expect("Attributes written above");
    c::write_attr_string(&attrs, "Class", class.as_str())
}

fn write_geometry(group: &Group, geometry: &Geometry) -> Result<()> {
    match geometry {
        Geometry::None => Ok(()),
        Geometry::Points { vertices } => write_vertices(group, vertices),
        Geometry::Curve { vertices, cells } => {
            write_vertices(group, vertices)?;
            let flat: Vec<u32> = cells.iter().flat_map(|c| c.iter().copied()).collect();
            c::write_dataset_u32(group, "Cells", &flat)
        }
        Geometry::Surface { vertices, cells } => {
            write_vertices(group, vertices)?;
            let flat: Vec<u32> = cells.iter().flat_map(|c| c.iter().copied()).collect();
            c::write_dataset_u32(group, "Cells", &flat)
        }
        Geometry::GridObject {
            origin,
            u_count,
            v_count,
            u_cell_size,
            v_cell_size,
            rotation,
        } => {
            let attrs = c::group(group, "Attributes")?.expect("Attributes written above");
            c::write_dataset_f64(group, "Origin", origin)?;
            c::write_attr_f64(&attrs, "U count", *u_count as f64)?;
            c::write_attr_f64(&attrs, "V count", *v_count as f64)?;
            c::write_attr_f64(&attrs, "U cell size", *u_cell_size)?;
            c::write_attr_f64(&attrs, "V cell size", *v_cell_size)?;
            c::write_attr_f64(&attrs, "Rotation", *rotation)?;
            Ok(())
        }
        Geometry::Drillhole { collar, surveys } => {
            c::write_dataset_f64(group, "Collar", collar)?;
            let mut flat = Vec::with_capacity(surveys.len() * 3);
            for s in surveys {
                flat.push(s.depth);
                flat.push(s.azimuth);
                flat.push(s.dip);
            }
            c::write_dataset_f64(group, "Surveys", &flat)
        }
    }
}

fn write_property_groups(
    group: &Group,
    property_groups: &[geoh5_model::entity::PropertyGroup],
) -> Result<()> {
    if property_groups.is_empty() {
        return Ok(());
    }
    let pg_root = match c::group(group, "PropertyGroups")? {
        Some(g) => g,
        None => c::create_group(group, "PropertyGroups")?,
    };
    for pg in property_groups {
        let uid_name = pg.uid.to_braced();
        let pg_group = match c::group(&pg_root, &uid_name)? {
            Some(g) => g,
            None => c::create_group(&pg_root, &uid_name)?,
        };
        let attrs = match c::group(&pg_group, "Attributes")? {
            Some(g) => g,
            None => c::create_group(&pg_group, "Attributes")?,
        };
        c::write_attr_string(&attrs, "Name", &pg.name)?;
        c::write_attr_string(&attrs, "ID", &uid_name)?;
        c::write_attr_string(&attrs, "Group type", pg.group_type.as_str())?;
        c::write_attr_string(&attrs, "Association", pg.association.as_str())?;
        let properties: Vec<String> = pg.properties.iter().map(|p| p.to_braced()).collect();
        c::write_attr_string_array(&attrs, "Properties", &properties)?;
    }
    Ok(())
}

fn write_vertices(group: &Group, vertices: &[[f64; 3]]) -> Result<()> {
    let flat: Vec<f64> = vertices.iter().flat_map(|v| v.iter().copied()).collect();
    c::write_dataset_f64(group, "Vertices", &flat)
}

/// Attribute-only half of [`write_data_values`]: `Primitive type`,
/// `Association`, `Class`. Used as-is for normal `Data`, and on its own for
/// concatenated `Data` whose values dataset is redirected into its
/// `DrillholeGroup`'s shared channel arrays instead.
fn write_data_metadata(
    group: &Group,
    association: Association,
    class: DataClass,
    primitive_type: PrimitiveType,
) -> Result<()> {
    let attrs = c::group(group, "Attributes")?.expect("Attributes written above");
    c::write_attr_string(&attrs, "Primitive type", primitive_type.as_str())?;
    c::write_attr_string(&attrs, "Association", association.as_str())?;
    c::write_attr_string(&attrs, "Class", class.as_str())
}

fn write_data_values(
    group: &Group,
    association: Association,
    class: DataClass,
    values: &DataValues,
) -> Result<()> {
    write_data_metadata(group, association, class, values.primitive_type())?;

    match values {
        DataValues::Integer(v) => c::write_dataset_i32(group, "Data", v),
        DataValues::Float(v) => c::write_dataset_f32(group, "Data", v),
        DataValues::Text(v) | DataValues::DateTime(v) | DataValues::Filename(v) => {
            c::write_dataset_strings(group, "Data", v)
        }
        DataValues::Referenced(v) => c::write_dataset_u32(group, "Data", v),
        DataValues::Blob(v) => {
            let hex: Vec<String> = v.iter().map(|b| hex_encode(b)).collect();
            c::write_dataset_strings(group, "Data", &hex)
        }
        DataValues::Vector(v) => {
            let flat: Vec<f64> = v.iter().flat_map(|x| x.iter().copied()).collect();
            c::write_dataset_f64(group, "Data", &flat)
        }
        DataValues::DataTimeDelta(v) => c::write_dataset_f64(group, "Data", v),
        DataValues::Boolean(v) => {
            let raw: Vec<i8> = v.iter().map(|&b| encode_bool(b)).collect();
            c::write_dataset_i8(group, "Data", &raw)
        }
        DataValues::Geometric(v) => c::write_dataset_f32(group, "Data", v),
        DataValues::MultiText(v) => {
            let joined: Vec<String> = v.iter().map(|row| row.join("\u{1f}")).collect();
            c::write_dataset_strings(group, "Data", &joined)
        }
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// `EntityType.save`: create-or-update a registered type's
/// subgroup under `/GEOSCIENCE/Types`.
fn save_type(file: &H5File, workspace: &mut Workspace, type_id: TypeId) -> Result<()> {
    let Some(entity_type) = workspace.entity_type(type_id) else {
        return Ok(());
    };
    let (bucket, uid) = (type_bucket(&entity_type.kind), entity_type.uid);
    let record = entity_type.clone();

    let root = root_group(file)?;
    let types = c::group(&root, "Types")?.expect("create_geoh5 always creates Types");
    let bucket_group = c::group(&types, bucket)?
        .ok_or_else(|| crate::error::IoError::NotFound(bucket.to_string()))?;
    let uid_name = uid.to_braced();
    let type_group = match c::group(&bucket_group, &uid_name)? {
        Some(g) => g,
        None => c::create_group(&bucket_group, &uid_name)?,
    };
    write_type_attributes(&type_group, &record)?;

    if let Some(mutable) = workspace.entity_type_mut(type_id) {
        mutable.on_file = true;
    }
    Ok(())
}

fn type_bucket(kind: &TypeKind) -> &'static str {
    match kind {
        TypeKind::Group(_) => "Group types",
        TypeKind::Object(_) => "Object types",
        TypeKind::Data(_) => "Data types",
    }
}

fn write_type_attributes(group: &Group, record: &EntityTypeRecord) -> Result<()> {
    let attrs = match c::group(group, "Attributes")? {
        Some(g) => g,
        None => c::create_group(group, "Attributes")?,
    };
    c::write_attr_string(&attrs, "Name", &record.name)?;
    c::write_attr_string(&attrs, "ID", &record.uid.to_braced())?;
    if let Some(description) = &record.description {
        c::write_attr_string(&attrs, "Description", description)?;
    }

    match &record.kind {
        TypeKind::Group(attrs_group) => {
            c::write_attr_string(&attrs, "Group class", attrs_group.group_class.as_str())?;
            c::write_attr_i8(
                &attrs,
                "Allow move content",
                encode_bool(attrs_group.allow_move_content),
            )?;
            c::write_attr_i8(
                &attrs,
                "Allow delete content",
                encode_bool(attrs_group.allow_delete_content),
            )?;
        }
        TypeKind::Object(attrs_object) => {
            c::write_attr_string(&attrs, "Object class", attrs_object.object_class.as_str())?;
        }
        TypeKind::Data(data) => {
            c::write_attr_string(&attrs, "Primitive type", data.primitive_type.as_str())?;
            if let Some(units) = &data.units {
                c::write_attr_string(&attrs, "Units", units)?;
            }
            c::write_attr_i8(&attrs, "Hidden", encode_bool(data.hidden))?;
            c::write_attr_i8(
                &attrs,
                "Transparent no data",
                encode_bool(data.transparent_no_data),
            )?;
            c::write_attr_i8(
                &attrs,
                "Duplicate type on copy",
                encode_bool(data.duplicate_type_on_copy),
            )?;
            if let Some(mapping) = &data.mapping {
                c::write_attr_string(&attrs, "Mapping", mapping)?;
            }
            if let Some(number_of_bins) = data.number_of_bins {
                c::write_attr_f64(&attrs, "Number of bins", number_of_bins as f64)?;
            }
            if let Some(precision) = data.precision {
                c::write_attr_f64(&attrs, "Precision", precision as f64)?;
            }
            if let Some(map) = &data.value_map {
                c::write_value_map(group, "Value map", map.entries())?;
            }
            if let Some(color_map) = &data.color_map {
                c::write_color_map(group, "Color map", &color_map.entries)?;
            }
        }
    }
    Ok(())
}

/// `Workspace.remove_entity`'s file-side half: unlink the
/// entity's subgroup from its bucket. Registered types are left in place;
/// `Workspace::sweep_dead_types` decides separately whether to drop them.
pub fn remove_entity(file: &H5File, kind: &EntityKind, uid: Uid) -> Result<()> {
    let root = root_group(file)?;
    let bucket = bucket_name(kind);
    let bucket_group = c::group(&root, bucket)?
        .ok_or_else(|| crate::error::IoError::NotFound(bucket.to_string()))?;
    c::remove(&bucket_group, &uid.to_braced())
}

/// `Workspace.update_attribute`. Full re-save is not the
/// cheapest possible implementation but keeps the on-disk record
/// consistent without a second attribute-by-attribute code path; see
/// DESIGN.md.
pub fn update_field(
    file: &H5File,
    workspace: &mut Workspace,
    id: EntityId,
    _name: &str,
    _channel: Option<&str>,
) -> Result<()> {
    save_entity(file, workspace, id, false)
}

/// Best-effort `h5repack` invocation: absence of the
/// tool, or any failure, is swallowed by the caller.
pub fn repack(path: &Path) -> Result<()> {
    let tmp = path.with_extension("repack.tmp");
    let status = std::process::Command::new("h5repack")
        .arg(path)
        .arg(&tmp)
        .status();

    match status {
        Ok(status) if status.success() => {
            std::fs::rename(&tmp, path)?;
            Ok(())
        }
        Ok(status) => {
            let _ = std::fs::remove_file(&tmp);
            warn!("h5repack exited with status {status}");
            Err(crate::error::IoError::RepackFailed(status.to_string()))
        }
        Err(e) => {
            let _ = std::fs::remove_file(&tmp);
            Err(crate::error::IoError::RepackFailed(e.to_string()))
        }
    }
}
