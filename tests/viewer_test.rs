use std::{cell::RefCell, rc::Rc};

use futures::executor::block_on;
use model_preview::{
    config::ViewerConfig,
    data_structures::texture::CoordinatesMode,
    load::{LOAD_END, LoadState},
    resources::ResourceKind,
    viewer::{ObjectInfo, Viewer, default_tasks},
};

use crate::common::test_utils::{MockLoader, sample_container};

mod common;

#[test]
fn default_tasks_cover_environment_and_model() {
    let tasks = default_tasks("models/car.gltf", &ViewerConfig::default());

    let urls: Vec<&str> = tasks.iter().map(|task| task.url.as_str()).collect();
    assert_eq!(
        urls,
        vec![
            "gltfviewer/texture/background1.jpg",
            "gltfviewer/texture/background2.jpg",
            "gltfviewer/texture/background3.jpg",
            "gltfviewer/cubetexture/skybox1/",
            "gltfviewer/equirectangularcubetexture/skybox.png",
            "models/car.gltf",
        ]
    );
    assert_eq!(tasks[3].kind, ResourceKind::CubeTexture);
    assert_eq!(tasks[4].kind, ResourceKind::EquirectangularCubeTexture);
    assert_eq!(tasks[5].kind, ResourceKind::Model);
    assert_eq!(tasks[5].weight, 0.5);
    let total: f64 = tasks.iter().map(|task| task.weight).sum();
    assert!((total - 1.0).abs() < 1e-9);
}

#[test]
fn env_dir_prefixes_environment_urls() {
    let config = ViewerConfig::default().with_env_dir("static/env/");
    let tasks = default_tasks("car.obj", &config);

    assert_eq!(tasks[0].url, "static/env/texture/background1.jpg");
    assert_eq!(tasks[5].url, "car.obj");
}

#[test]
fn loaded_viewer_exposes_entity_and_environment() {
    let loader = MockLoader::new();
    let viewer = Viewer::new("car.gltf", ViewerConfig::default(), loader.clone());
    let ended = Rc::new(RefCell::new(None));
    {
        let ended = Rc::clone(&ended);
        viewer.events().on(
            LOAD_END,
            move |_| {
                *ended.borrow_mut() = Some(true);
                Ok(())
            },
            false,
            None,
        );
    }

    assert_eq!(viewer.state(), LoadState::Idle);
    block_on(viewer.load());

    assert!(viewer.is_loaded());
    assert_eq!(viewer.progress(), 100.0);
    assert_eq!(*ended.borrow(), Some(true));
    assert!(viewer.has_entity());
    assert!(viewer.has_animations());
    assert!(viewer.can_split());
    assert!(viewer.auto_rotate());
    assert!(viewer.auto_animate());

    let environment = viewer.environment_texture().expect("environment texture");
    assert_eq!(environment.coordinates_mode, CoordinatesMode::Explicit);
    let skybox = viewer.skybox_texture().expect("skybox texture");
    assert_eq!(skybox.coordinates_mode, CoordinatesMode::Skybox);

    let first = viewer.background(1).expect("background 1");
    let again = viewer.background(1).expect("background 1");
    assert!(Rc::ptr_eq(&first, &again));
    assert!(viewer.background(4).is_none());

    let info = viewer.object_info();
    assert_eq!(info.object_count, 3);
    assert_eq!(info.mesh_count, 3);
    assert_eq!(info.size, "3x1x0");
    assert_eq!(info.file_size, "0MB");
    assert_eq!(loader.fetches().len(), 6);
}

#[test]
fn second_load_is_ignored() {
    let loader = MockLoader::new();
    let viewer = Viewer::new("car.gltf", ViewerConfig::default(), loader.clone());

    block_on(viewer.load());
    block_on(viewer.load());

    assert_eq!(loader.fetches().len(), 6);
}

#[test]
fn failed_model_leaves_viewer_without_entity() {
    let loader = MockLoader::new().failing("broken.gltf");
    let viewer = Viewer::new("broken.gltf", ViewerConfig::default(), loader);

    block_on(viewer.load());

    assert!(viewer.is_loaded());
    assert!(!viewer.has_entity());
    assert!(!viewer.can_split());
    assert_eq!(viewer.object_info(), ObjectInfo::default());
    assert!(viewer.environment_texture().is_some());
}

#[test]
fn entity_can_be_modified_in_place() {
    let viewer = Viewer::new("car.gltf", ViewerConfig::default(), MockLoader::new());
    block_on(viewer.load());

    viewer.with_entity(|entity| entity.root.children.truncate(1));

    assert!(!viewer.can_split());
    // The cache still holds the untouched container.
    assert!(viewer.cache().container("car.gltf").is_some_and(|c| c.roots.len() == 2));
}

#[test]
fn split_pushes_parts_away_from_center_and_reset_restores() {
    let viewer = Viewer::new("car.gltf", ViewerConfig::default(), MockLoader::new());
    block_on(viewer.load());
    let positions = || {
        viewer
            .with_entity(|entity| {
                entity
                    .root
                    .children
                    .iter()
                    .map(|part| part.transform.position.x)
                    .collect::<Vec<_>>()
            })
            .unwrap()
    };

    assert_eq!(positions(), vec![0.0, 2.0]);
    viewer.split(100.0);
    assert_eq!(positions(), vec![-1.0, 3.0]);
    viewer.split(50.0);
    assert_eq!(positions(), vec![-0.5, 2.5]);

    viewer.reset();
    assert_eq!(positions(), vec![0.0, 2.0]);
}

#[test]
fn split_without_model_does_nothing() {
    let viewer = Viewer::new("broken.gltf", ViewerConfig::default(), MockLoader::new().failing("broken.gltf"));

    viewer.split(100.0);
    block_on(viewer.load());
    viewer.split(100.0);
    viewer.reset();

    assert!(!viewer.has_entity());
}

#[test]
fn viewer_can_be_queried_while_entity_is_borrowed() {
    let viewer = Viewer::new("car.gltf", ViewerConfig::default(), MockLoader::new());
    block_on(viewer.load());

    let info = viewer.with_entity(|entity| {
        entity.root.children[0].transform.position.y = 1.0;
        viewer.object_info()
    });

    assert_eq!(info.map(|info| info.mesh_count), Some(3));
}

#[test]
fn destroy_clears_cache_and_listeners() {
    let viewer = Viewer::new("car.gltf", ViewerConfig::default(), MockLoader::new());
    block_on(viewer.load());

    viewer.destroy();

    assert!(viewer.cache().is_empty());
    assert!(viewer.events().is_empty());
    assert!(!viewer.has_entity());
    assert!(viewer.background(1).is_none());
}

#[test]
fn object_info_counts_and_formats() {
    let entity = sample_container("car.gltf").instantiate(Default::default());

    let info = ObjectInfo::compute(&entity, Some(1_572_864));

    assert_eq!(info.file_size, "1.5MB");
    assert_eq!(info.size, "3x1x0");
    assert_eq!(info.object_count, 3);
    assert_eq!(info.mesh_count, 3);
    assert_eq!(info.material_count, 3);
    assert_eq!(info.texture_count, 2);
    assert_eq!(info.vertex_count, 9);
    assert_eq!(info.triangle_count, 3);
}

#[test]
fn config_builders_and_flags() {
    let config = ViewerConfig::default()
        .with_asset_root("/srv/assets")
        .with_retry_failed(true)
        .with_auto_rotate(false)
        .with_equirect_face_size(256)
        .with_cube_face_extension(".png");

    assert_eq!(config.asset_root, std::path::PathBuf::from("/srv/assets"));
    assert!(config.cache.retry_failed);
    assert!(!config.auto_rotate);
    assert!(config.auto_animate);
    assert_eq!(config.equirect_face_size, 256);
    assert_eq!(config.env_path("x.jpg"), "gltfviewer/x.jpg");
    assert_eq!(ViewerConfig::default().with_env_dir("").env_path("x.jpg"), "x.jpg");

    let viewer = Viewer::new("car.gltf", config, MockLoader::new());
    assert!(!viewer.auto_rotate());
}
