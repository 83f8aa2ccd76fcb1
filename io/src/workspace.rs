//! The workspace: process-local registry of live entities, bound to one
//! on-disk container.
//!
//! Slotmap arenas plus uid-keyed lookup indices hold a parent/child tree of
//! groups/objects/data, and the workspace carries a life cycle (`open`/
//! `close`) bound to the backing file.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use log::{debug, trace, warn};
use slotmap::SlotMap;

use geoh5_model::entity::{
    self, AddChildrenReport, DataClass, DataValues, EntityId, EntityKind, EntityRecord, Geometry,
    GroupClass, PropertyGroup,
};
use geoh5_model::types::{DataTypeAttrs, EntityTypeRecord, TypeId, TypeKind};
use geoh5_model::{Association, Uid};

use crate::concat::ConcatenationLayer;
use crate::container::Mode;
use crate::error::{IoError, Result};
use crate::{reader, writer};

/// Recognized project-attribute overrides accepted by the `Workspace`
/// constructor, covering the project attributes stored on `/GEOSCIENCE`.
/// Unrecognized keys are logged and dropped.
#[derive(Debug, Clone, Default)]
pub struct WorkspaceOptions {
    pub contributors: Option<Vec<String>>,
    pub distance_unit: Option<String>,
    pub ga_version: Option<String>,
    pub version: Option<f64>,
    /// Rewrite the file to its minimal size on close.
    pub repack: bool,
}

impl WorkspaceOptions {
    /// Build options from a free-form override map, warning (not failing)
    /// on keys the workspace doesn't recognize.
    pub fn from_overrides(overrides: HashMap<String, String>) -> Self {
        let mut options = WorkspaceOptions::default();
        for (key, value) in overrides {
            match key.as_str() {
                "contributors" => {
                    options.contributors =
                        Some(value.split(',').map(|s| s.trim().to_string()).collect())
                }
                "distance_unit" => options.distance_unit = Some(value),
                "ga_version" => options.ga_version = Some(value),
                "version" => match value.parse() {
                    Ok(v) => options.version = Some(v),
                    Err(_) => warn!("ignoring non-numeric 'version' override: {value}"),
                },
                "repack" => options.repack = value == "true" || value == "1",
                other => warn!("ignoring unrecognized workspace constructor keyword: {other}"),
            }
        }
        options
    }
}

/// Project-level attributes stored on `/GEOSCIENCE`.
#[derive(Debug, Clone)]
pub struct ProjectAttributes {
    pub contributors: Vec<String>,
    pub distance_unit: String,
    pub ga_version: String,
    pub version: f64,
}

impl Default for ProjectAttributes {
    fn default() -> Self {
        ProjectAttributes {
            contributors: Vec::new(),
            distance_unit: "meter".to_string(),
            ga_version: "1".to_string(),
            version: 2.0,
        }
    }
}

/// Live state of an opened workspace: the file handle and every registry
/// the entity graph needs. `None` when the workspace is closed, so
/// `Workspace` itself never needs an `Option<Workspace>` at the call site.
struct OpenState {
    mode: Mode,
    file: hdf5::File,
    path: PathBuf,
}

/// Process-local registry of live entities for one project file.
pub struct Workspace {
    path: PathBuf,
    open: Option<OpenState>,
    options: WorkspaceOptions,
    project: ProjectAttributes,

    entities: SlotMap<EntityId, EntityRecord>,
    types: SlotMap<TypeId, EntityTypeRecord>,

    root: Option<EntityId>,
    groups_by_uid: HashMap<Uid, EntityId>,
    objects_by_uid: HashMap<Uid, EntityId>,
    data_by_uid: HashMap<Uid, EntityId>,
    /// One uid can be registered under more than one type class in theory
    ///`, not `uid`
    /// alone), so this indexes to a small vec rather than a single id.
    types_by_uid: HashMap<Uid, Vec<TypeId>>,

    pub(crate) concat: ConcatenationLayer,
}

impl Workspace {
    /// Construct a closed workspace bound to `path`, with the given
    /// constructor overrides. Call `open` to acquire the
    /// file.
    pub fn new(path: impl Into<PathBuf>, options: WorkspaceOptions) -> Self {
        let mut project = ProjectAttributes::default();
        if let Some(c) = &options.contributors {
            project.contributors = c.clone();
        }
        if let Some(u) = &options.distance_unit {
            project.distance_unit = u.clone();
        }
        if let Some(v) = &options.ga_version {
            project.ga_version = v.clone();
        }
        if let Some(v) = options.version {
            project.version = v;
        }

        Workspace {
            path: path.into(),
            open: None,
            options,
            project,
            entities: SlotMap::with_key(),
            types: SlotMap::with_key(),
            root: None,
            groups_by_uid: HashMap::new(),
            objects_by_uid: HashMap::new(),
            data_by_uid: HashMap::new(),
            types_by_uid: HashMap::new(),
            concat: ConcatenationLayer::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    // -- lifecycle (C8) --------------------------------------------------

    /// `Closed -> Open[mode]`. Re-opening an already-open
    /// workspace is a no-op with a warning, matching the original's
    /// behavior.
    pub fn open(&mut self, mode: Mode) -> Result<()> {
        if self.open.is_some() {
            warn!("workspace already open; ignoring redundant open() call");
            return Ok(());
        }

        let path = self.path.clone();
        let exists = path.exists();
        let file = crate::container::open_file(&path, mode)?;

        if exists {
            debug!("loading existing project file at {}", path.display());
            let loaded = reader::load_workspace(&file)?;
            self.project = loaded.project;
            self.entities = loaded.entities;
            self.types = loaded.types;
            self.root = Some(loaded.root);
            self.groups_by_uid = loaded.groups_by_uid;
            self.objects_by_uid = loaded.objects_by_uid;
            self.data_by_uid = loaded.data_by_uid;
            self.types_by_uid = loaded.types_by_uid;
            self.concat = loaded.concat;
        } else {
            debug!("creating new project file at {}", path.display());
            writer::create_geoh5(&file, &self.project)?;
            let root_id = self.entities.insert(EntityRecord {
                uid: Uid::new_v4(),
                name: "Workspace".to_string(),
                visible: true,
                allow_delete: false,
                allow_rename: false,
                allow_move: false,
                public: true,
                on_file: true,
                parent: None,
                entity_type: None,
                dirty: Default::default(),
                kind: EntityKind::Root { children: Vec::new() },
            });
            self.root = Some(root_id);
        }

        self.open = Some(OpenState { mode, file, path });
        Ok(())
    }

    /// `Open[mode] -> Closed`. Flushes dirty entities,
    /// writes the root's child list, then optionally repacks.
    pub fn close(&mut self) -> Result<()> {
        let Some(state) = self.open.take() else {
            // closing twice is a no-op
            return Ok(());
        };

        if state.mode.is_writable() {
            self.flush_dirty(&state.file)?;
            writer::persist_concatenation(&state.file, self)?;
            if let Some(root) = self.root {
                writer::finalize(&state.file, self, root)?;
            }
        }

        let path = state.path.clone();
        let repack = self.options.repack;
        drop(state.file);

        if repack && path.exists() {
            if let Err(e) = writer::repack(&path) {
                warn!("h5repack failed, keeping original file: {e}");
            }
        }

        Ok(())
    }

    fn flush_dirty(&mut self, file: &hdf5::File) -> Result<()> {
        let order = self.topological_write_order();
        for id in order {
            let dirty = self
                .entities
                .get(id)
                .map(|e| !e.on_file || !e.dirty.is_empty())
                .unwrap_or(false);
            if dirty {
                writer::save_entity(file, self, id, false)?;
            }
        }
        Ok(())
    }

    /// Parents before children, so a child's `Attributes` group can always
    /// assume its parent directory exists.
    fn topological_write_order(&self) -> Vec<EntityId> {
        let mut order = Vec::with_capacity(self.entities.len());
        let mut seen = HashSet::with_capacity(self.entities.len());
        if let Some(root) = self.root {
            let mut stack = vec![root];
            while let Some(id) = stack.pop() {
                if !seen.insert(id) {
                    continue;
                }
                order.push(id);
                if let Some(entity) = self.entities.get(id) {
                    stack.extend(entity.children().iter().rev());
                }
            }
        }
        order
    }

    pub fn is_open(&self) -> bool {
        self.open.is_some()
    }

    fn ensure_open(&self) -> Result<&OpenState> {
        self.open.as_ref().ok_or(IoError::ClosedFile)
    }

    fn ensure_writable(&self) -> Result<&OpenState> {
        let state = self.ensure_open()?;
        if !state.mode.is_writable() {
            return Err(IoError::ReadOnly);
        }
        Ok(state)
    }

    // -- registry (C4) ----------------------------------------------------

    pub fn root(&self) -> Option<EntityId> {
        self.root
    }

    pub fn entity(&self, id: EntityId) -> Option<&EntityRecord> {
        self.entities.get(id)
    }

    /// The only mutable gateway onto an entity's fields. Since
    /// `EntityRecord`'s fields are public, the call site's intended mutation
    /// is invisible from here, so any caller reaching for `&mut` is assumed
    /// to be about to change something `flush_dirty` needs to persist;
    /// `save_entity`/`writer::save_entity` clears the mark once the write
    /// actually lands.
    pub fn entity_mut(&mut self, id: EntityId) -> Option<&mut EntityRecord> {
        if let Some(entity) = self.entities.get_mut(id) {
            entity.mark_dirty("*");
        }
        self.entities.get_mut(id)
    }

    pub fn entity_type(&self, id: TypeId) -> Option<&EntityTypeRecord> {
        self.types.get(id)
    }

    pub fn entity_type_mut(&mut self, id: TypeId) -> Option<&mut EntityTypeRecord> {
        self.types.get_mut(id)
    }

    /// `find_type(workspace, uid) -> EntityType?`: returns
    /// the live type iff registered under `uid` with a kind matching
    /// `class_name`.
    pub fn find_type(&self, uid: Uid, class_name: &str) -> Option<TypeId> {
        self.types_by_uid.get(&uid)?.iter().copied().find(|&id| {
            self.types
                .get(id)
                .map(|t| t.kind.class_name() == class_name)
                .unwrap_or(false)
        })
    }

    /// `find_or_create(workspace, kwargs) -> EntityType`. Fails with
    /// `ModelError::TypeMismatch` if `uid` is already registered under a
    /// different type kind (`Group`/`Object`/`Data`) than the one requested,
    /// rather than silently minting a second, shadow record under the same
    /// uid.
    pub fn find_or_create_type(
        &mut self,
        uid: Uid,
        name: impl Into<String>,
        description: Option<String>,
        kind: TypeKind,
    ) -> Result<TypeId> {
        if let Some(existing) = self.find_type(uid, kind.class_name()) {
            return Ok(existing);
        }

        if let Some(other) = self
            .types_by_uid
            .get(&uid)
            .and_then(|ids| ids.first())
            .and_then(|&id| self.types.get(id))
        {
            return Err(geoh5_model::ModelError::TypeMismatch {
                uid,
                expected: other.kind.class_name(),
                found: kind.class_name(),
            }
            .into());
        }

        let record = EntityTypeRecord {
            uid,
            name: name.into(),
            description,
            on_file: false,
            kind,
        };
        let id = self.types.insert(record);
        self.types_by_uid.entry(uid).or_default().push(id);
        Ok(id)
    }

    pub fn find_group(&self, uid: Uid) -> Option<EntityId> {
        self.groups_by_uid.get(&uid).copied()
    }

    pub fn find_object(&self, uid: Uid) -> Option<EntityId> {
        self.objects_by_uid.get(&uid).copied()
    }

    pub fn find_data(&self, uid: Uid) -> Option<EntityId> {
        self.data_by_uid.get(&uid).copied()
    }

    pub fn find_entity(&self, uid: Uid) -> Option<EntityId> {
        self.find_group(uid)
            .or_else(|| self.find_object(uid))
            .or_else(|| self.find_data(uid))
    }

    fn register(&mut self, id: EntityId) {
        let Some(entity) = self.entities.get(id) else {
            return;
        };
        let uid = entity.uid;
        match &entity.kind {
            EntityKind::Root { .. } | EntityKind::Group { .. } => {
                insert_once(&mut self.groups_by_uid, uid, id);
            }
            EntityKind::Object { .. } => {
                insert_once(&mut self.objects_by_uid, uid, id);
            }
            EntityKind::Data { .. } => {
                insert_once(&mut self.data_by_uid, uid, id);
            }
        }
    }

    /// `get_entity(name_or_uid) -> list[Entity | None]`.
    pub fn get_entity_by_uid(&self, uid: Uid) -> Vec<Option<EntityId>> {
        vec![self.find_entity(uid)]
    }

    pub fn get_entity_by_name(&self, name: &str) -> Vec<Option<EntityId>> {
        let matches: Vec<Option<EntityId>> = self
            .entities
            .iter()
            .filter(|(_, e)| e.name == name)
            .map(|(id, _)| Some(id))
            .collect();
        if matches.is_empty() {
            vec![None]
        } else {
            matches
        }
    }

    // -- creation (C4) ------------------------------------------------

    /// `create_entity(class, entity, entity_type)`:
    /// constructs a new group/object/data entity under `parent`. Dispatch
    /// on class is done by the caller choosing `kind`; this method owns
    /// registration and the `save_on_creation` persistence hook.
    #[allow(clippy::too_many_arguments)]
    pub fn create_entity(
        &mut self,
        uid: Option<Uid>,
        name: impl Into<String>,
        parent: Option<EntityId>,
        entity_type: Option<TypeId>,
        kind: EntityKind,
        save_on_creation: bool,
    ) -> Result<EntityId> {
        let uid = uid.unwrap_or_else(Uid::new_v4);
        let record = EntityRecord {
            uid,
            name: name.into(),
            visible: true,
            allow_delete: true,
            allow_rename: true,
            allow_move: true,
            public: true,
            on_file: false,
            parent,
            entity_type,
            dirty: Default::default(),
            kind,
        };
        let id = self.entities.insert(record);
        self.register(id);

        if let Some(parent_id) = parent {
            if let Some(parent_entity) = self.entities.get_mut(parent_id) {
                if let Some(children) = parent_entity.children_mut() {
                    let report: AddChildrenReport = entity::add_children(children, &[id]);
                    if report.duplicates > 0 {
                        warn!("child already present under parent during create_entity");
                    }
                }
            }
        }

        if save_on_creation {
            let writable = self.ensure_writable()?;
            let file = writable.file.clone();
            writer::save_entity(&file, self, id, false)?;
        }

        Ok(id)
    }

    // -- mutation (C4) ------------------------------------------------

    /// `save_entity(entity, add_children)`.
    pub fn save_entity(&mut self, id: EntityId, add_children: bool) -> Result<()> {
        let state = self.ensure_writable()?;
        let file = state.file.clone();
        writer::save_entity(&file, self, id, add_children)
    }

    /// `update_attribute(entity, name, channel?)`: only
    /// writes if the entity is already on file.
    pub fn update_attribute(&mut self, id: EntityId, name: &str, channel: Option<&str>) -> Result<()> {
        let state = self.ensure_writable()?;
        let on_file = self.entities.get(id).map(|e| e.on_file).unwrap_or(false);
        if !on_file {
            trace!("skipping update_attribute for {name}: entity not on file");
            return Ok(());
        }
        let file = state.file.clone();
        writer::update_field(&file, self, id, name, channel)
    }

    /// `remove_entity(entity)`: recursively removes the
    /// entity's subtree from both the in-memory graph and the file.
    pub fn remove_entity(&mut self, id: EntityId) -> Result<()> {
        let state = self.ensure_writable()?;
        let writable = state.mode.is_writable();
        let file = state.file.clone();

        let mut subtree = Vec::new();
        collect_subtree(&self.entities, id, &mut subtree);

        // detach from parent's child list first so iteration elsewhere
        // observes a consistent tree even mid-removal.
        let removed_uid = self.entities.get(id).map(|e| e.uid);
        let removed_is_data = self
            .entities
            .get(id)
            .map(|e| matches!(e.kind, EntityKind::Data { .. }))
            .unwrap_or(false);
        let parent_id = self.entities.get(id).and_then(|e| e.parent);
        if let Some(parent_id) = parent_id {
            if let Some(parent) = self.entities.get_mut(parent_id) {
                match &mut parent.kind {
                    EntityKind::Object { children, property_groups, .. } => {
                        entity::remove_children(children, &[id]);
                        if removed_is_data {
                            if let Some(uid) = removed_uid {
                                entity::detach_data_from_property_groups(property_groups, uid);
                            }
                        }
                    }
                    EntityKind::Root { children } | EntityKind::Group { children, .. } => {
                        entity::remove_children(children, &[id]);
                    }
                    EntityKind::Data { .. } => {}
                }
            }
        }

        for &sub_id in subtree.iter().rev() {
            if let Some(entity) = self.entities.get(sub_id) {
                let uid = entity.uid;
                let kind = &entity.kind;
                if writable {
                    writer::remove_entity(&file, kind, uid)?;
                }
                self.unregister(sub_id, uid, kind);
            }
            self.entities.remove(sub_id);
        }

        self.sweep_dead_types();
        Ok(())
    }

    fn unregister(&mut self, _id: EntityId, uid: Uid, kind: &EntityKind) {
        match kind {
            EntityKind::Root { .. } | EntityKind::Group { .. } => {
                self.groups_by_uid.remove(&uid);
                if matches!(kind, EntityKind::Group { class: GroupClass::DrillholeGroup, .. }) {
                    self.concat.remove_group(uid);
                }
            }
            EntityKind::Object { .. } => {
                self.objects_by_uid.remove(&uid);
            }
            EntityKind::Data { .. } => {
                self.data_by_uid.remove(&uid);
            }
        }
    }

    /// Remove type registry entries no longer referenced by a live entity.
    fn sweep_dead_types(&mut self) {
        let referenced: HashSet<TypeId> = self
            .entities
            .values()
            .filter_map(|e| e.entity_type)
            .collect();
        let dead: Vec<TypeId> = self
            .types
            .iter()
            .filter(|(id, _)| !referenced.contains(id))
            .map(|(id, _)| id)
            .collect();
        for id in dead {
            if let Some(record) = self.types.remove(id) {
                if let Some(ids) = self.types_by_uid.get_mut(&record.uid) {
                    ids.retain(|&i| i != id);
                }
            }
        }
    }

    // -- bulk views ------------------------------------------------------

    pub fn groups(&self) -> Vec<EntityId> {
        self.groups_by_uid.values().copied().collect()
    }

    pub fn objects(&self) -> Vec<EntityId> {
        self.objects_by_uid.values().copied().collect()
    }

    pub fn data(&self) -> Vec<EntityId> {
        self.data_by_uid.values().copied().collect()
    }

    pub fn list_entities_name(&self) -> HashMap<Uid, String> {
        self.entities
            .values()
            .map(|e| (e.uid, e.name.clone()))
            .collect()
    }

    /// uid→name convenience map restricted to groups, used by the CLI's
    /// `tree` subcommand.
    pub fn list_groups_name(&self) -> HashMap<Uid, String> {
        self.groups_by_uid
            .keys()
            .filter_map(|&uid| self.entities.get(self.groups_by_uid[&uid]).map(|e| (uid, e.name.clone())))
            .collect()
    }

    pub fn list_objects_name(&self) -> HashMap<Uid, String> {
        self.objects_by_uid
            .keys()
            .filter_map(|&uid| self.entities.get(self.objects_by_uid[&uid]).map(|e| (uid, e.name.clone())))
            .collect()
    }

    pub fn list_data_name(&self) -> HashMap<Uid, String> {
        self.data_by_uid
            .keys()
            .filter_map(|&uid| self.entities.get(self.data_by_uid[&uid]).map(|e| (uid, e.name.clone())))
            .collect()
    }

    pub fn contributors(&self) -> &[String] {
        &self.project.contributors
    }

    pub fn set_contributors(&mut self, value: Vec<String>) {
        self.project.contributors = value;
    }

    pub fn distance_unit(&self) -> &str {
        &self.project.distance_unit
    }

    pub fn ga_version(&self) -> &str {
        &self.project.ga_version
    }

    pub fn version(&self) -> f64 {
        self.project.version
    }

    /// `fetch_children(parent)`, supplementing the base API with a lookup
    /// mirroring `geoh5py`'s `Workspace.fetch_children`.
    pub fn fetch_children(&self, parent: EntityId) -> Vec<EntityId> {
        self.entities
            .get(parent)
            .map(|e| e.children().to_vec())
            .unwrap_or_default()
    }

    /// `fetch_property_groups(entity)` (supplemented from `workspace.py`).
    pub fn fetch_property_groups(&self, object: EntityId) -> Vec<PropertyGroup> {
        match self.entities.get(object).map(|e| &e.kind) {
            Some(EntityKind::Object { property_groups, .. }) => property_groups.clone(),
            _ => Vec::new(),
        }
    }

    /// `fetch_concatenated_list(group)`, mirroring `geoh5py`'s
    /// `Workspace.fetch_concatenated_list`: the concatenated object uids
    /// owned by `group`'s `Concatenator`, in stable insertion order.
    pub fn fetch_concatenated_list(&self, group: EntityId) -> Vec<Uid> {
        let Some(entity) = self.entities.get(group) else {
            return Vec::new();
        };
        self.concat
            .index(entity.uid)
            .map(|idx| idx.object_ids().to_vec())
            .unwrap_or_default()
    }

    /// `fetch_concatenated_attributes(group, object_uid)` (supplemented from
    /// `workspace.py`): the per-object attribute overrides a concatenated
    /// object's synthesized `Attributes` group is built from.
    pub fn fetch_concatenated_attributes(
        &self,
        group: EntityId,
        object_uid: Uid,
    ) -> Option<std::collections::HashMap<String, String>> {
        let entity = self.entities.get(group)?;
        self.concat.index(entity.uid)?.attributes(object_uid).cloned()
    }

    /// `fetch_concatenated_values(group, object_uid, channel)` (supplemented
    /// from `workspace.py`): the slice of a channel's shared array belonging
    /// to one concatenated object.
    pub fn fetch_concatenated_values(
        &self,
        group: EntityId,
        object_uid: Uid,
        channel: &str,
    ) -> Option<Vec<f64>> {
        let entity = self.entities.get(group)?;
        self.concat
            .index(entity.uid)?
            .values(object_uid, channel)
            .map(|v| v.to_vec())
    }

    /// If `data_id` is a `Data` child of an object parented by a
    /// `DrillholeGroup`, returns that group's id: its
    /// `save_entity` is redirected onto the group's shared channel arrays
    /// rather than writing a standalone `/GEOSCIENCE/Data/{uid}` record.
    pub fn concatenator_group_of(&self, data_id: EntityId) -> Option<EntityId> {
        let object_id = self.entities.get(data_id)?.parent?;
        let group_id = self.entities.get(object_id)?.parent?;
        match self.entities.get(group_id)?.kind {
            EntityKind::Group { class: GroupClass::DrillholeGroup, .. } => Some(group_id),
            _ => None,
        }
    }

    /// Whether two concatenated objects' slices of `channel` inside
    /// `group`'s shared arrays overlap.
    pub fn concat_channel_non_overlapping(&self, group: EntityId, channel: &str) -> bool {
        let Some(entity) = self.entities.get(group) else {
            return true;
        };
        self.concat
            .index(entity.uid)
            .map(|idx| idx.channel_slices_non_overlapping(channel))
            .unwrap_or(true)
    }

    /// `ObjectBase.add_data(map)`: infers `association` when
    /// not given (cell count, then vertex count, else `Object`), obtains or
    /// creates a `DataType` for the value's primitive type, and appends a
    /// new `Data` child under `object`.
    ///
    /// Unlike `geoh5py`, which dedupes `DataType`s across `Data` with
    /// identical primitive type and name, this always mints a fresh
    /// `DataType`; see DESIGN.md.
    pub fn add_data(
        &mut self,
        object: EntityId,
        name: impl Into<String>,
        values: DataValues,
        association: Option<Association>,
        data_class: DataClass,
        save_on_creation: bool,
    ) -> Result<EntityId> {
        let geometry = match self.entities.get(object).map(|e| &e.kind) {
            Some(EntityKind::Object { geometry, .. }) => geometry.clone(),
            _ => Geometry::None,
        };
        let association = association.unwrap_or_else(|| entity::infer_association(values.len(), &geometry));
        let primitive_type = values.primitive_type();
        let name = name.into();

        let type_id = self.find_or_create_type(
            Uid::new_v4(),
            name.clone(),
            None,
            TypeKind::Data(DataTypeAttrs {
                primitive_type,
                data_class,
                ..Default::default()
            }),
        )?;

        self.create_entity(
            None,
            name,
            Some(object),
            Some(type_id),
            EntityKind::Data { association, values, class: data_class },
            save_on_creation,
        )
    }

    /// `copy(parent, copy_children, clear_cache, mask)`:
    /// deep-copies `id` under `new_parent`. `mask`, when given, filters
    /// vertex-carrying geometry and any copied `Vertex`/`Cell`-associated
    /// `Data` sibling to the same subset. Copied
    /// property groups are remapped to the copies' uids. `clear_cache` has
    /// no counterpart here: this crate caches nothing beyond the live graph
    /// (see DESIGN.md).
    pub fn copy_entity(
        &mut self,
        id: EntityId,
        new_parent: EntityId,
        copy_children: bool,
        mask: Option<&[bool]>,
    ) -> Result<EntityId> {
        let Some(source) = self.entities.get(id) else {
            return Err(IoError::NotFound(format!("entity {id:?}")));
        };

        let new_uid = Uid::new_v4();
        let name = source.name.clone();
        let entity_type = source.entity_type;
        let visible = source.visible;
        let allow_delete = source.allow_delete;
        let allow_rename = source.allow_rename;
        let allow_move = source.allow_move;
        let public = source.public;

        let new_kind = match &source.kind {
            EntityKind::Root { .. } | EntityKind::Group { .. } => {
                return Err(IoError::NotFound(
                    "copy is only defined for objects and data".to_string(),
                ))
            }
            EntityKind::Object { class, geometry, property_groups, .. } => EntityKind::Object {
                children: Vec::new(),
                property_groups: property_groups.clone(),
                class: *class,
                geometry: mask
                    .map(|m| entity::mask_geometry(geometry, m))
                    .unwrap_or_else(|| geometry.clone()),
            },
            EntityKind::Data { association, values, class } => EntityKind::Data {
                association: *association,
                values: mask
                    .map(|m| entity::mask_data_values(values, *association, m))
                    .unwrap_or_else(|| values.clone()),
                class: *class,
            },
        };

        let record = EntityRecord {
            uid: new_uid,
            name,
            visible,
            allow_delete,
            allow_rename,
            allow_move,
            public,
            on_file: false,
            parent: Some(new_parent),
            entity_type,
            dirty: Default::default(),
            kind: new_kind,
        };
        let new_id = self.entities.insert(record);
        self.register(new_id);

        if let Some(parent_entity) = self.entities.get_mut(new_parent) {
            if let Some(children) = parent_entity.children_mut() {
                entity::add_children(children, &[new_id]);
            }
        }

        if copy_children {
            let children: Vec<EntityId> = self
                .entities
                .get(id)
                .map(|e| e.children().to_vec())
                .unwrap_or_default();
            let mut uid_remap: HashMap<Uid, Uid> = HashMap::new();
            for child in children {
                let old_uid = self.entities.get(child).map(|e| e.uid);
                let new_child_id = self.copy_entity(child, new_id, true, mask)?;
                if let (Some(old_uid), Some(new_child)) = (old_uid, self.entities.get(new_child_id)) {
                    uid_remap.insert(old_uid, new_child.uid);
                }
            }
            if let Some(EntityKind::Object { property_groups, .. }) =
                self.entities.get_mut(new_id).map(|e| &mut e.kind)
            {
                for pg in property_groups.iter_mut() {
                    pg.uid = Uid::new_v4();
                    for member in pg.properties.iter_mut() {
                        if let Some(&remapped) = uid_remap.get(member) {
                            *member = remapped;
                        }
                    }
                }
            }
        }

        Ok(new_id)
    }

    /// `copy_to_parent(entity, destination_workspace, new_parent, mask)`
    ///: deep-copies `id`
    /// from `self` into `destination`, under `new_parent` (an entity already
    /// live in `destination`). Types are never shared across workspaces: a
    /// copy always triggers a fresh `find_or_create_type` on the
    /// destination, so the source's type is read out and re-registered on
    /// `destination` rather than carrying the source's `TypeId` across.
    pub fn copy_to_parent(
        &self,
        id: EntityId,
        destination: &mut Workspace,
        new_parent: EntityId,
        mask: Option<&[bool]>,
    ) -> Result<EntityId> {
        let Some(source) = self.entities.get(id) else {
            return Err(IoError::NotFound(format!("entity {id:?}")));
        };

        let dest_type = source
            .entity_type
            .and_then(|type_id| self.entity_type(type_id))
            .map(|record| {
                destination.find_or_create_type(
                    record.uid,
                    record.name.clone(),
                    record.description.clone(),
                    record.kind.clone(),
                )
            })
            .transpose()?;

        let new_kind = match &source.kind {
            EntityKind::Root { .. } | EntityKind::Group { .. } => {
                return Err(IoError::NotFound(
                    "copy_to_parent is only defined for objects and data".to_string(),
                ))
            }
            EntityKind::Object { class, geometry, property_groups, .. } => EntityKind::Object {
                children: Vec::new(),
                property_groups: property_groups.clone(),
                class: *class,
                geometry: mask
                    .map(|m| entity::mask_geometry(geometry, m))
                    .unwrap_or_else(|| geometry.clone()),
            },
            EntityKind::Data { association, values, class } => EntityKind::Data {
                association: *association,
                values: mask
                    .map(|m| entity::mask_data_values(values, *association, m))
                    .unwrap_or_else(|| values.clone()),
                class: *class,
            },
        };

        let children: Vec<EntityId> = source.children().to_vec();
        let name = source.name.clone();

        let new_id = destination.create_entity(None, name, Some(new_parent), dest_type, new_kind, false)?;

        let mut uid_remap: HashMap<Uid, Uid> = HashMap::new();
        for child in children {
            let old_uid = self.entities.get(child).map(|e| e.uid);
            let new_child_id = self.copy_to_parent(child, destination, new_id, mask)?;
            if let (Some(old_uid), Some(new_child)) = (old_uid, destination.entities.get(new_child_id)) {
                uid_remap.insert(old_uid, new_child.uid);
            }
        }
        if let Some(EntityKind::Object { property_groups, .. }) =
            destination.entities.get_mut(new_id).map(|e| &mut e.kind)
        {
            for pg in property_groups.iter_mut() {
                pg.uid = Uid::new_v4();
                for member in pg.properties.iter_mut() {
                    if let Some(&remapped) = uid_remap.get(member) {
                        *member = remapped;
                    }
                }
            }
        }

        Ok(new_id)
    }
}

fn insert_once(map: &mut HashMap<Uid, EntityId>, uid: Uid, id: EntityId) {
    map.entry(uid).or_insert(id);
}

fn collect_subtree(
    entities: &SlotMap<EntityId, EntityRecord>,
    root: EntityId,
    out: &mut Vec<EntityId>,
) {
    out.push(root);
    if let Some(entity) = entities.get(root) {
        for &child in entity.children() {
            collect_subtree(entities, child, out);
        }
    }
}

impl Drop for Workspace {
    /// `Workspace` is a scoped resource: release the file handle on every
    /// exit path, including unwinding.
    fn drop(&mut self) {
        if self.open.is_some() {
            if let Err(e) = self.close() {
                warn!("error while closing workspace during drop: {e}");
            }
        }
    }
}
