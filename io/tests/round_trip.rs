//! End-to-end scenarios against a real HDF5 file on disk.

use geoh5_io::container::Mode;
use geoh5_io::workspace::{Workspace, WorkspaceOptions};
use geoh5_model::entity::{
    DataClass, DataValues, EntityKind, Geometry, ObjectClass, PropertyGroup, PropertyGroupType,
};
use geoh5_model::{Association, Uid};

/// A scratch `.geoh5` path inside a freshly minted temp directory. The
/// directory comes from `tempfile` rather than a hand-rolled pid-based name,
/// so parallel test runs never collide; `into_path()` hands ownership of the
/// directory to the caller instead of deleting it on drop, since the file
/// inside still needs to exist after this function returns.
fn temp_path(name: &str) -> std::path::PathBuf {
    let dir = tempfile::Builder::new()
        .prefix("geoh5-io-test-")
        .tempdir()
        .expect("create temp dir")
        .into_path();
    dir.join(format!("{name}.geoh5"))
}

fn open_new(path: &std::path::Path) -> Workspace {
    let _ = std::fs::remove_file(path);
    let mut ws = Workspace::new(path, WorkspaceOptions::default());
    ws.open(Mode::Append).unwrap();
    ws
}

#[test]
fn s1_points_round_trip() {
    let path = temp_path("s1");
    let mut ws = open_new(&path);
    let root = ws.root().unwrap();

    let vertices: Vec<[f64; 3]> = (0..12)
        .map(|i| [i as f64, (i * 2) as f64, (i * 3) as f64])
        .collect();
    let points = ws
        .create_entity(
            None,
            "my points",
            Some(root),
            None,
            EntityKind::Object {
                children: Vec::new(),
                property_groups: Vec::new(),
                class: ObjectClass::Points,
                geometry: Geometry::Points { vertices: vertices.clone() },
            },
            true,
        )
        .unwrap();

    for name in ["A", "B"] {
        let values: Vec<f32> = (0..12).map(|i| i as f32).collect();
        ws.create_entity(
            None,
            name,
            Some(points),
            None,
            EntityKind::Data {
                association: Association::Vertex,
                values: DataValues::Float(values),
                class: DataClass::Generic,
            },
            true,
        )
        .unwrap();
    }

    ws.close().unwrap();

    let mut ws2 = Workspace::new(&path, WorkspaceOptions::default());
    ws2.open(Mode::Read).unwrap();
    let root2 = ws2.root().unwrap();
    let children = ws2.fetch_children(root2);
    assert_eq!(children.len(), 1);
    let points2 = children[0];
    let entity = ws2.entity(points2).unwrap();
    assert_eq!(entity.name, "my points");
    match &entity.kind {
        EntityKind::Object { geometry, children, .. } => {
            match geometry {
                Geometry::Points { vertices: v2 } => {
                    assert_eq!(v2.len(), vertices.len());
                    for (a, b) in v2.iter().zip(vertices.iter()) {
                        for k in 0..3 {
                            assert!((a[k] - b[k]).abs() < 1e-9);
                        }
                    }
                }
                _ => panic!("expected points geometry"),
            }
            assert_eq!(children.len(), 2);
            let names: std::collections::HashSet<_> = children
                .iter()
                .map(|&id| ws2.entity(id).unwrap().name.clone())
                .collect();
            assert_eq!(names, ["A".to_string(), "B".to_string()].into_iter().collect());
            for &child in children {
                let child_entity = ws2.entity(child).unwrap();
                match &child_entity.kind {
                    EntityKind::Data { association, values, .. } => {
                        assert_eq!(*association, Association::Vertex);
                        assert_eq!(values.len(), 12);
                    }
                    _ => panic!("expected data entity"),
                }
            }
        }
        _ => panic!("expected object entity"),
    }

    std::fs::remove_file(&path).ok();
}

#[test]
fn s2_reference_data_preserves_value_map() {
    use geoh5_model::types::{DataTypeAttrs, ReferenceValueMap, TypeKind};
    use geoh5_model::PrimitiveType;

    let path = temp_path("s2");
    let mut ws = open_new(&path);
    let root = ws.root().unwrap();

    let vertices = vec![[0.0, 0.0, 0.0]; 5];
    let points = ws
        .create_entity(
            None,
            "refpoints",
            Some(root),
            None,
            EntityKind::Object {
                children: Vec::new(),
                property_groups: Vec::new(),
                class: ObjectClass::Points,
                geometry: Geometry::Points { vertices },
            },
            true,
        )
        .unwrap();

    let value_map = ReferenceValueMap::new(vec![
        (0, "Unknown".to_string()),
        (1, "Ore".to_string()),
        (2, "Waste".to_string()),
    ])
    .unwrap();
    let type_uid = Uid::new_v4();
    let type_id = ws
        .find_or_create_type(
            type_uid,
            "rock type",
            None,
            TypeKind::Data(DataTypeAttrs {
                primitive_type: PrimitiveType::Referenced,
                value_map: Some(value_map.clone()),
                ..Default::default()
            }),
        )
        .unwrap();

    let data = ws
        .create_entity(
            None,
            "rock",
            Some(points),
            Some(type_id),
            EntityKind::Data {
                association: Association::Vertex,
                values: DataValues::Referenced(vec![0, 1, 2, 1, 0]),
                class: DataClass::Generic,
            },
            true,
        )
        .unwrap();
    assert!(ws.entity(data).is_some());

    ws.close().unwrap();

    let mut ws2 = Workspace::new(&path, WorkspaceOptions::default());
    ws2.open(Mode::Read).unwrap();
    let root2 = ws2.root().unwrap();
    let points2 = ws2.fetch_children(root2)[0];
    let data2 = ws2.fetch_children(points2)[0];
    let entity2 = ws2.entity(data2).unwrap();
    match &entity2.kind {
        EntityKind::Data { values, .. } => match values {
            DataValues::Referenced(v) => assert_eq!(v, &vec![0u32, 1, 2, 1, 0]),
            other => panic!("expected referenced values, got {other:?}"),
        },
        _ => panic!("expected data entity"),
    }
    let type_id2 = entity2.entity_type.expect("data should carry its type");
    let type2 = ws2.entity_type(type_id2).unwrap();
    match &type2.kind {
        TypeKind::Data(attrs) => {
            let map2 = attrs.value_map.as_ref().expect("value map should round-trip");
            assert_eq!(map2.entries(), value_map.entries());
        }
        _ => panic!("expected data type"),
    }

    std::fs::remove_file(&path).ok();
}

#[test]
fn s4_property_group_persists_members() {
    let path = temp_path("s4");
    let mut ws = open_new(&path);
    let root = ws.root().unwrap();

    let vertices = vec![[0.0, 0.0, 0.0]; 3];
    let points = ws
        .create_entity(
            None,
            "grouped points",
            Some(root),
            None,
            EntityKind::Object {
                children: Vec::new(),
                property_groups: Vec::new(),
                class: ObjectClass::Points,
                geometry: Geometry::Points { vertices },
            },
            false,
        )
        .unwrap();

    let a = ws
        .create_entity(
            None,
            "A",
            Some(points),
            None,
            EntityKind::Data {
                association: Association::Vertex,
                values: DataValues::Float(vec![1.0, 2.0, 3.0]),
                class: DataClass::Generic,
            },
            false,
        )
        .unwrap();
    let b = ws
        .create_entity(
            None,
            "B",
            Some(points),
            None,
            EntityKind::Data {
                association: Association::Vertex,
                values: DataValues::Float(vec![4.0, 5.0, 6.0]),
                class: DataClass::Generic,
            },
            false,
        )
        .unwrap();

    let a_uid = ws.entity(a).unwrap().uid;
    let b_uid = ws.entity(b).unwrap().uid;

    let mut pg = PropertyGroup::new("My group", PropertyGroupType::Multi, Association::Vertex);
    pg.properties.push(a_uid);
    pg.properties.push(b_uid);
    if let Some(entity) = ws.entity_mut(points) {
        if let EntityKind::Object { property_groups, .. } = &mut entity.kind {
            property_groups.push(pg);
        }
    }
    ws.save_entity(points, false).unwrap();
    ws.close().unwrap();

    let mut ws2 = Workspace::new(&path, WorkspaceOptions::default());
    ws2.open(Mode::Read).unwrap();
    let root2 = ws2.root().unwrap();
    let points2 = ws2.fetch_children(root2)[0];
    let groups = ws2.fetch_property_groups(points2);
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].name, "My group");
    assert_eq!(groups[0].properties.len(), 2);
    assert!(groups[0].properties.contains(&a_uid));
    assert!(groups[0].properties.contains(&b_uid));

    std::fs::remove_file(&path).ok();
}

#[test]
fn s3_drillhole_concatenation() {
    use geoh5_model::entity::GroupClass;

    let path = temp_path("s3");
    let mut ws = open_new(&path);
    let root = ws.root().unwrap();

    let drillhole_group = ws
        .create_entity(
            None,
            "DH Group",
            Some(root),
            None,
            EntityKind::Group {
                children: Vec::new(),
                class: GroupClass::DrillholeGroup,
            },
            true,
        )
        .unwrap();

    let collars = [[0.0, 10.0, 10.0], [10.0, 10.0, 10.0]];
    let mut drillholes = Vec::new();
    for (i, collar) in collars.iter().enumerate() {
        let dh = ws
            .create_entity(
                None,
                format!("DH{i}"),
                Some(drillhole_group),
                None,
                EntityKind::Object {
                    children: Vec::new(),
                    property_groups: Vec::new(),
                    class: ObjectClass::Drillhole,
                    geometry: Geometry::Drillhole { collar: *collar, surveys: Vec::new() },
                },
                true,
            )
            .unwrap();

        let from: Vec<f32> = vec![0.0, 5.0, 10.0];
        let to: Vec<f32> = vec![5.0, 10.0, 15.0];
        ws.create_entity(
            None,
            "FROM",
            Some(dh),
            None,
            EntityKind::Data {
                association: Association::Object,
                values: DataValues::Float(from.clone()),
                class: DataClass::Generic,
            },
            true,
        )
        .unwrap();
        ws.create_entity(
            None,
            "TO",
            Some(dh),
            None,
            EntityKind::Data {
                association: Association::Object,
                values: DataValues::Float(to.clone()),
                class: DataClass::Generic,
            },
            true,
        )
        .unwrap();

        drillholes.push((dh, from, to));
    }

    assert!(ws.concat_channel_non_overlapping(drillhole_group, "FROM"));
    assert!(ws.concat_channel_non_overlapping(drillhole_group, "TO"));

    ws.close().unwrap();

    let mut ws2 = Workspace::new(&path, WorkspaceOptions::default());
    ws2.open(Mode::Read).unwrap();
    let root2 = ws2.root().unwrap();
    let group2 = ws2.fetch_children(root2)[0];
    let dh_ids2 = ws2.fetch_children(group2);
    assert_eq!(dh_ids2.len(), 2);

    for &dh_id2 in &dh_ids2 {
        let dh_entity2 = ws2.entity(dh_id2).unwrap();
        let expected = collars
            .iter()
            .zip(drillholes.iter())
            .find(|(_, (dh, _, _))| ws.entity(*dh).unwrap().name == dh_entity2.name)
            .map(|(collar, (_, from, to))| (*collar, from.clone(), to.clone()))
            .expect("matching drillhole by name");

        match &dh_entity2.kind {
            EntityKind::Object { geometry, children, .. } => {
                match geometry {
                    Geometry::Drillhole { collar, .. } => {
                        for k in 0..3 {
                            assert!((collar[k] - expected.0[k]).abs() < 1e-9);
                        }
                    }
                    other => panic!("expected drillhole geometry, got {other:?}"),
                }
                for &child in children {
                    let child_entity = ws2.entity(child).unwrap();
                    if let EntityKind::Data { values, .. } = &child_entity.kind {
                        let expected_channel = if child_entity.name == "FROM" {
                            &expected.1
                        } else {
                            &expected.2
                        };
                        match values {
                            DataValues::Float(v) => assert_eq!(v, expected_channel),
                            other => panic!("expected float values, got {other:?}"),
                        }
                    }
                }
            }
            other => panic!("expected object entity, got {other:?}"),
        }
    }
    assert!(ws2.concat_channel_non_overlapping(group2, "FROM"));
    assert!(ws2.concat_channel_non_overlapping(group2, "TO"));

    std::fs::remove_file(&path).ok();
}

#[test]
fn s5_copy_with_mask() {
    let path = temp_path("s5");
    let mut ws = open_new(&path);
    let root = ws.root().unwrap();

    let vertices: Vec<[f64; 3]> = (0..10).map(|i| [i as f64, 0.0, 0.0]).collect();
    let points = ws
        .create_entity(
            None,
            "source points",
            Some(root),
            None,
            EntityKind::Object {
                children: Vec::new(),
                property_groups: Vec::new(),
                class: ObjectClass::Points,
                geometry: Geometry::Points { vertices: vertices.clone() },
            },
            false,
        )
        .unwrap();

    let values: Vec<f32> = (0..10).map(|i| i as f32).collect();
    ws.create_entity(
        None,
        "v",
        Some(points),
        None,
        EntityKind::Data {
            association: Association::Vertex,
            values: DataValues::Float(values.clone()),
            class: DataClass::Generic,
        },
        false,
    )
    .unwrap();

    let destination = ws
        .create_entity(
            None,
            "destination",
            Some(root),
            None,
            EntityKind::Group {
                children: Vec::new(),
                class: geoh5_model::entity::GroupClass::Container,
            },
            true,
        )
        .unwrap();

    let mask: Vec<bool> = (0..10).map(|i| i < 5).collect();
    let copy_id = ws.copy_entity(points, destination, true, Some(&mask)).unwrap();
    ws.save_entity(copy_id, true).unwrap();
    if let Some(e) = ws.entity(copy_id) {
        for &child in e.children().to_vec().iter() {
            ws.save_entity(child, false).unwrap();
        }
    }

    let copy_entity = ws.entity(copy_id).unwrap();
    match &copy_entity.kind {
        EntityKind::Object { geometry, children, .. } => {
            match geometry {
                Geometry::Points { vertices: v } => assert_eq!(v.len(), 5),
                other => panic!("expected points geometry, got {other:?}"),
            }
            assert_eq!(children.len(), 1);
            let data_entity = ws.entity(children[0]).unwrap();
            match &data_entity.kind {
                EntityKind::Data { values, .. } => match values {
                    DataValues::Float(v) => assert_eq!(v, &values[..5].to_vec()),
                    other => panic!("expected float values, got {other:?}"),
                },
                other => panic!("expected data entity, got {other:?}"),
            }
        }
        other => panic!("expected object entity, got {other:?}"),
    }

    ws.close().unwrap();

    let mut ws2 = Workspace::new(&path, WorkspaceOptions::default());
    ws2.open(Mode::Read).unwrap();
    let root2 = ws2.root().unwrap();
    let top_level = ws2.fetch_children(root2);
    let destination2 = top_level
        .iter()
        .copied()
        .find(|&id| ws2.entity(id).unwrap().name == "destination")
        .unwrap();
    let copy2 = ws2.fetch_children(destination2)[0];
    let copy2_entity = ws2.entity(copy2).unwrap();
    match &copy2_entity.kind {
        EntityKind::Object { geometry, .. } => match geometry {
            Geometry::Points { vertices: v } => assert_eq!(v.len(), 5),
            other => panic!("expected points geometry, got {other:?}"),
        },
        other => panic!("expected object entity, got {other:?}"),
    }

    std::fs::remove_file(&path).ok();
}

#[test]
fn s6_remove_entity_is_recursive_and_gone_after_reopen() {
    let path = temp_path("s6");
    let mut ws = open_new(&path);
    let root = ws.root().unwrap();

    let group = ws
        .create_entity(
            None,
            "holder",
            Some(root),
            None,
            EntityKind::Group {
                children: Vec::new(),
                class: geoh5_model::entity::GroupClass::Container,
            },
            true,
        )
        .unwrap();

    let points = ws
        .create_entity(
            None,
            "doomed points",
            Some(group),
            None,
            EntityKind::Object {
                children: Vec::new(),
                property_groups: Vec::new(),
                class: ObjectClass::Points,
                geometry: Geometry::Points { vertices: vec![[0.0, 0.0, 0.0]; 2] },
            },
            true,
        )
        .unwrap();
    ws.create_entity(
        None,
        "doomed data",
        Some(points),
        None,
        EntityKind::Data {
            association: Association::Vertex,
            values: DataValues::Float(vec![1.0, 2.0]),
            class: DataClass::Generic,
        },
        true,
    )
    .unwrap();

    let group_uid = ws.entity(group).unwrap().uid;
    ws.remove_entity(group).unwrap();
    assert_eq!(ws.find_entity(group_uid), None);
    assert_eq!(ws.fetch_children(root), Vec::new());

    ws.close().unwrap();

    let mut ws2 = Workspace::new(&path, WorkspaceOptions::default());
    ws2.open(Mode::Read).unwrap();
    let root2 = ws2.root().unwrap();
    assert!(ws2.fetch_children(root2).is_empty());
    assert_eq!(ws2.find_entity(group_uid), None);

    std::fs::remove_file(&path).ok();
}

#[test]
fn data_type_color_map_and_extended_attributes_round_trip() {
    use geoh5_model::types::{ColorMap, DataTypeAttrs, TypeKind};
    use geoh5_model::PrimitiveType;

    let path = temp_path("colormap");
    let mut ws = open_new(&path);
    let root = ws.root().unwrap();

    let vertices = vec![[0.0, 0.0, 0.0]; 3];
    let points = ws
        .create_entity(
            None,
            "colored points",
            Some(root),
            None,
            EntityKind::Object {
                children: Vec::new(),
                property_groups: Vec::new(),
                class: ObjectClass::Points,
                geometry: Geometry::Points { vertices },
            },
            false,
        )
        .unwrap();

    let color_map = ColorMap {
        entries: vec![
            (0.0, [255, 0, 0, 255]),
            (50.0, [0, 255, 0, 255]),
            (100.0, [0, 0, 255, 255]),
        ],
    };
    let type_id = ws
        .find_or_create_type(
            Uid::new_v4(),
            "graded value",
            None,
            TypeKind::Data(DataTypeAttrs {
                primitive_type: PrimitiveType::Float,
                color_map: Some(color_map.clone()),
                mapping: Some("Linear".to_string()),
                number_of_bins: Some(16),
                precision: Some(2),
                duplicate_type_on_copy: true,
                ..Default::default()
            }),
        )
        .unwrap();

    ws.create_entity(
        None,
        "grade",
        Some(points),
        Some(type_id),
        EntityKind::Data {
            association: Association::Vertex,
            values: DataValues::Float(vec![1.0, 50.0, 99.0]),
            class: DataClass::Generic,
        },
        true,
    )
    .unwrap();

    ws.close().unwrap();

    let mut ws2 = Workspace::new(&path, WorkspaceOptions::default());
    ws2.open(Mode::Read).unwrap();
    let root2 = ws2.root().unwrap();
    let points2 = ws2.fetch_children(root2)[0];
    let data2 = ws2.fetch_children(points2)[0];
    let type_id2 = ws2.entity(data2).unwrap().entity_type.unwrap();
    let type2 = ws2.entity_type(type_id2).unwrap();
    match &type2.kind {
        TypeKind::Data(attrs) => {
            assert_eq!(attrs.color_map.as_ref().unwrap().entries, color_map.entries);
            assert_eq!(attrs.mapping.as_deref(), Some("Linear"));
            assert_eq!(attrs.number_of_bins, Some(16));
            assert_eq!(attrs.precision, Some(2));
            assert!(attrs.duplicate_type_on_copy);
        }
        _ => panic!("expected data type"),
    }

    std::fs::remove_file(&path).ok();
}

#[test]
fn copy_to_parent_registers_a_fresh_type_in_the_destination_workspace() {
    use geoh5_model::types::{DataTypeAttrs, TypeKind};
    use geoh5_model::PrimitiveType;

    let src_path = temp_path("copy-src");
    let dst_path = temp_path("copy-dst");
    let mut src = open_new(&src_path);
    let mut dst = open_new(&dst_path);

    let src_root = src.root().unwrap();
    let dst_root = dst.root().unwrap();

    let vertices: Vec<[f64; 3]> = (0..4).map(|i| [i as f64, 0.0, 0.0]).collect();
    let points = src
        .create_entity(
            None,
            "source points",
            Some(src_root),
            None,
            EntityKind::Object {
                children: Vec::new(),
                property_groups: Vec::new(),
                class: ObjectClass::Points,
                geometry: Geometry::Points { vertices },
            },
            false,
        )
        .unwrap();

    let type_uid = Uid::new_v4();
    let type_id = src
        .find_or_create_type(
            type_uid,
            "grade",
            None,
            TypeKind::Data(DataTypeAttrs {
                primitive_type: PrimitiveType::Float,
                ..Default::default()
            }),
        )
        .unwrap();
    let values: Vec<f32> = (0..4).map(|i| i as f32).collect();
    src.create_entity(
        None,
        "grade",
        Some(points),
        Some(type_id),
        EntityKind::Data {
            association: Association::Vertex,
            values: DataValues::Float(values.clone()),
            class: DataClass::Generic,
        },
        false,
    )
    .unwrap();

    assert!(dst.find_type(type_uid, "DataType").is_none());

    let copy_id = src.copy_to_parent(points, &mut dst, dst_root, None).unwrap();

    let dst_type_id = dst
        .find_type(type_uid, "DataType")
        .expect("copy_to_parent registers the source type fresh on the destination workspace");
    assert_ne!(dst_type_id, type_id, "destination gets its own TypeId, not the source's");

    let copied = dst.entity(copy_id).unwrap();
    assert_eq!(copied.children().len(), 1);
    let copied_child = dst.entity(copied.children()[0]).unwrap();
    match &copied_child.kind {
        EntityKind::Data { values: DataValues::Float(v), .. } => {
            assert_eq!(v, &values);
        }
        _ => panic!("expected data"),
    }
    assert_eq!(copied_child.entity_type, Some(dst_type_id));

    std::fs::remove_file(&src_path).ok();
    std::fs::remove_file(&dst_path).ok();
}

#[test]
fn opening_nonexistent_path_in_read_mode_fails() {
    let path = temp_path("ro-missing");
    let _ = std::fs::remove_file(&path);
    let mut ws = Workspace::new(&path, WorkspaceOptions::default());
    assert!(ws.open(Mode::Read).is_err());
}

#[test]
fn closing_twice_is_a_no_op() {
    let path = temp_path("close-twice");
    let mut ws = open_new(&path);
    ws.close().unwrap();
    ws.close().unwrap();
    std::fs::remove_file(&path).ok();
}

#[test]
fn writing_on_a_read_only_workspace_is_rejected() {
    let path = temp_path("read-only-write");
    {
        let mut ws = open_new(&path);
        ws.close().unwrap();
    }

    let mut ws = Workspace::new(&path, WorkspaceOptions::default());
    ws.open(Mode::Read).unwrap();
    let root = ws.root().unwrap();
    let result = ws.create_entity(
        None,
        "should fail",
        Some(root),
        None,
        EntityKind::Group {
            children: Vec::new(),
            class: geoh5_model::entity::GroupClass::Container,
        },
        true,
    );
    assert!(result.is_err());
    std::fs::remove_file(&path).ok();
}
