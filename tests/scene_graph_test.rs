use std::rc::Rc;

use cgmath::{Deg, Point3, Quaternion, Rotation3, Vector3};
use model_preview::data_structures::{
    scene_graph::{Aabb, MaterialSharing, ModelContainer, NodeTemplate},
    transform::Transform,
};

use crate::common::test_utils::sample_container;

mod common;

#[test]
fn shared_materials_stay_shared_within_an_entity() {
    let entity = sample_container("car").instantiate(MaterialSharing::Shared);

    let body = &entity.root.children[0].meshes[0];
    let wheel = &entity.root.children[1].meshes[0];
    let body_material = body.material.as_ref().unwrap();
    let wheel_material = wheel.material.as_ref().unwrap();

    assert!(Rc::ptr_eq(body_material, wheel_material));
    assert_eq!(entity.materials().len(), 2);
}

#[test]
fn per_mesh_sharing_splits_duplicate_references() {
    let entity = sample_container("car").instantiate(MaterialSharing::PerMesh);

    let body = entity.root.children[0].meshes[0].material.clone().unwrap();
    let wheel = entity.root.children[1].meshes[0].material.clone().unwrap();

    assert!(!Rc::ptr_eq(&body, &wheel));
    assert_eq!(*body.borrow(), *wheel.borrow());
    assert_eq!(entity.materials().len(), 3);

    body.borrow_mut().emissive = [1.0, 1.0, 0.0];
    assert_eq!(wheel.borrow().emissive, [0.0, 0.0, 0.0]);
}

#[test]
fn entities_never_share_material_instances() {
    let container = sample_container("car");
    for sharing in [MaterialSharing::Shared, MaterialSharing::PerMesh] {
        let a = container.instantiate(sharing);
        let b = container.instantiate(sharing);
        for ma in a.materials() {
            assert!(b.materials().iter().all(|mb| !Rc::ptr_eq(&ma, mb)));
        }
    }
}

#[test]
fn mesh_data_is_shared_between_entities() {
    let container = sample_container("car");
    let a = container.instantiate(MaterialSharing::Shared);
    let b = container.instantiate(MaterialSharing::Shared);

    assert!(Rc::ptr_eq(
        &a.root.children[0].meshes[0].mesh,
        &b.root.children[0].meshes[0].mesh
    ));
}

#[test]
fn hierarchy_is_copied_with_names_and_children() {
    let entity = sample_container("car").instantiate(MaterialSharing::Shared);

    assert_eq!(entity.root.name, "car");
    let names: Vec<&str> = entity
        .root
        .descendants()
        .iter()
        .map(|node| node.name.as_str())
        .collect();
    assert_eq!(names, vec!["car", "body", "wheel", "hub"]);
    assert_eq!(entity.child_meshes().len(), 3);
    assert_eq!(entity.animation_groups, vec!["spin"]);
}

#[test]
fn bounding_box_applies_node_transforms() {
    let mut container = sample_container("car");
    container.nodes[1].transform.scale = Vector3::new(2.0, 2.0, 2.0);
    let entity = container.instantiate(MaterialSharing::Shared);

    let bounds = entity.bounding_box().unwrap();
    assert_eq!(bounds.min, Point3::new(0.0, 0.0, 0.0));
    assert_eq!(bounds.max, Point3::new(4.0, 2.0, 0.0));
    assert_eq!(bounds.center(), Point3::new(2.0, 1.0, 0.0));
}

#[test]
fn rotation_is_applied_before_translation() {
    let transform = Transform {
        position: Vector3::new(1.0, 0.0, 0.0),
        rotation: Quaternion::from_angle_z(Deg(90.0)),
        scale: Vector3::new(1.0, 1.0, 1.0),
    };

    let p = transform.transform_point(Point3::new(1.0, 0.0, 0.0));

    assert!((p.x - 1.0).abs() < 1e-5);
    assert!((p.y - 1.0).abs() < 1e-5);
}

#[test]
fn transforms_compose_parent_first() {
    let parent = Transform {
        position: Vector3::new(0.0, 5.0, 0.0),
        ..Transform::new()
    };
    let child = Transform {
        position: Vector3::new(1.0, 0.0, 0.0),
        ..Transform::new()
    };

    let p = (parent * child).transform_point(Point3::new(0.0, 0.0, 0.0));

    assert_eq!(p, Point3::new(1.0, 5.0, 0.0));
}

#[test]
fn cyclic_node_references_are_cut() {
    let mut container = ModelContainer {
        name: String::from("loop"),
        roots: vec![0],
        ..Default::default()
    };
    for (name, child) in [("a", 1), ("b", 0)] {
        container.nodes.push(NodeTemplate {
            name: name.to_string(),
            transform: Transform::new(),
            primitives: Vec::new(),
            children: vec![child],
        });
    }

    let entity = container.instantiate(MaterialSharing::Shared);

    assert!(entity.root.descendants().len() < 10);
    assert!(entity.bounding_box().is_none());
}

#[test]
fn aabb_union_covers_both() {
    let a = Aabb::from_points([Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 1.0, 1.0)]).unwrap();
    let b = Aabb::from_points([Point3::new(-1.0, 0.5, 2.0)]).unwrap();

    let u = a.union(b);

    assert_eq!(u.min, Point3::new(-1.0, 0.0, 0.0));
    assert_eq!(u.max, Point3::new(1.0, 1.0, 2.0));
    assert_eq!(u.size(), Vector3::new(2.0, 1.0, 2.0));
    assert!(Aabb::from_points(std::iter::empty()).is_none());
}
