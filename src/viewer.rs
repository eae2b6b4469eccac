//! The preview widget core: one model plus its environment textures.
//!
//! A [`Viewer`] owns the dispatcher, the cache and the orchestrator for one
//! model URL. It listens to its own lifecycle events: once `LOAD_END` fires it
//! instantiates the model, gathers [`ObjectInfo`] and picks the environment
//! textures, so UI code subscribed to the same events finds everything ready.

use std::{
    cell::{Cell, RefCell},
    fmt,
    rc::{Rc, Weak},
};

use cgmath::{InnerSpace, Vector3, Zero};

use crate::{
    cache::ResourceCache,
    config::ViewerConfig,
    data_structures::{
        scene_graph::Entity,
        texture::{CoordinatesMode, CubeTexture, Dispose, Texture},
    },
    event::{Event, EventDispatcher},
    load::{LOAD_END, LOAD_PROGRESS, LOAD_START, LoadOrchestrator, LoadState, LoadTask},
    resources::{FileLoader, ResourceKind, ResourceLoader},
};

/// Number of selectable background images.
pub const BACKGROUND_COUNT: u32 = 3;

/// The task list of a viewer: three backgrounds, the environment cube, the
/// skybox panorama and the model itself.
pub fn default_tasks(url: &str, config: &ViewerConfig) -> Vec<LoadTask> {
    let mut tasks: Vec<LoadTask> = (1..=BACKGROUND_COUNT)
        .map(|id| LoadTask::new(ResourceKind::Texture, background_url(config, id), 0.1))
        .collect();
    tasks.push(LoadTask::new(ResourceKind::CubeTexture, cube_texture_url(config), 0.1));
    tasks.push(LoadTask::new(
        ResourceKind::EquirectangularCubeTexture,
        skybox_url(config),
        0.1,
    ));
    tasks.push(LoadTask::new(ResourceKind::Model, url, 0.5));
    tasks
}

fn background_url(config: &ViewerConfig, id: u32) -> String {
    config.env_path(&format!("texture/background{id}.jpg"))
}

fn cube_texture_url(config: &ViewerConfig) -> String {
    config.env_path("cubetexture/skybox1/")
}

fn skybox_url(config: &ViewerConfig) -> String {
    config.env_path("equirectangularcubetexture/skybox.png")
}

/// Statistics about the loaded model, shown in the info panel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectInfo {
    /// Transferred size of the model file, e.g. `1.5MB`.
    pub file_size: String,
    /// Bounding box extents, e.g. `2x1.25x0.5`.
    pub size: String,
    pub object_count: usize,
    pub mesh_count: usize,
    pub material_count: usize,
    pub texture_count: usize,
    pub vertex_count: usize,
    pub triangle_count: usize,
}

impl Default for ObjectInfo {
    fn default() -> Self {
        Self {
            file_size: String::from("0"),
            size: String::from("0"),
            object_count: 0,
            mesh_count: 0,
            material_count: 0,
            texture_count: 0,
            vertex_count: 0,
            triangle_count: 0,
        }
    }
}

impl ObjectInfo {
    pub fn compute(entity: &Entity, transfer_size: Option<u64>) -> Self {
        let mut info = ObjectInfo {
            file_size: transfer_size
                .map(|bytes| format!("{}MB", format_decimal(bytes as f64 / 1024.0 / 1024.0)))
                .unwrap_or_else(|| String::from("0")),
            ..Default::default()
        };
        if let Some(bounds) = entity.bounding_box() {
            let size = bounds.size();
            info.size = format!(
                "{}x{}x{}",
                format_decimal(size.x as f64),
                format_decimal(size.y as f64),
                format_decimal(size.z as f64)
            );
        }
        let nodes = entity.root.descendants();
        info.object_count = nodes.len() - 1;
        for instance in nodes.iter().flat_map(|node| node.meshes.iter()) {
            info.mesh_count += 1;
            info.vertex_count += instance.mesh.vertex_count();
            info.triangle_count += instance.mesh.index_count() / 3;
            if let Some(material) = &instance.material {
                info.material_count += 1;
                info.texture_count += material.borrow().texture_count();
            }
        }
        info
    }
}

/// Two decimals at most, trailing zeros dropped.
fn format_decimal(value: f64) -> String {
    let text = format!("{value:.2}");
    let text = text.trim_end_matches('0').trim_end_matches('.');
    match text {
        "" | "-0" => String::from("0"),
        _ => text.to_string(),
    }
}

/// Where one top-level part sits and which way it moves when the model is
/// pulled apart.
#[derive(Clone, Copy, Debug)]
struct PartOffset {
    position: Vector3<f32>,
    direction: Vector3<f32>,
    distance: f32,
}

impl PartOffset {
    /// Offsets for the root's children, pointing from the model's center to
    /// the center of each part.
    fn for_entity(entity: &Entity) -> Vec<PartOffset> {
        let center = entity.bounding_box().map(|bounds| bounds.center());
        entity
            .root
            .children
            .iter()
            .map(|part| {
                let away = match (center, part.hierarchy_bounds()) {
                    (Some(center), Some(bounds)) => bounds.center() - center,
                    _ => Vector3::zero(),
                };
                let distance = away.magnitude();
                PartOffset {
                    position: part.transform.position,
                    direction: if distance > f32::EPSILON { away / distance } else { Vector3::zero() },
                    distance,
                }
            })
            .collect()
    }
}

struct LoadedScene {
    parts: Vec<PartOffset>,
    info: ObjectInfo,
    environment: Option<Rc<CubeTexture>>,
    skybox: Option<Rc<CubeTexture>>,
}

struct Inner<L> {
    url: String,
    config: ViewerConfig,
    events: EventDispatcher<f64>,
    cache: ResourceCache<L>,
    orchestrator: LoadOrchestrator,
    progress: Cell<f64>,
    scene: RefCell<Option<LoadedScene>>,
    entity: RefCell<Option<Entity>>,
}

/// Loads one model with its environment and keeps the results.
pub struct Viewer<L> {
    inner: Rc<Inner<L>>,
}

impl<L> fmt::Debug for Viewer<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Viewer")
            .field("url", &self.inner.url)
            .field("state", &self.inner.orchestrator.state())
            .field("progress", &self.inner.progress.get())
            .finish()
    }
}

impl Viewer<FileLoader> {
    /// A viewer that reads its assets with the default [`FileLoader`].
    pub fn with_file_loader(url: impl Into<String>, config: ViewerConfig) -> Self {
        let loader = FileLoader::new(&config);
        Self::new(url, config, loader)
    }
}

impl<L: ResourceLoader + 'static> Viewer<L> {
    pub fn new(url: impl Into<String>, config: ViewerConfig, loader: L) -> Self {
        let url = url.into();
        let tasks = default_tasks(&url, &config);
        let inner = Rc::new(Inner {
            cache: ResourceCache::new(loader, config.cache, config.material_sharing),
            orchestrator: LoadOrchestrator::new(tasks),
            events: EventDispatcher::new(),
            progress: Cell::new(0.0),
            scene: RefCell::new(None),
            entity: RefCell::new(None),
            url,
            config,
        });
        Self { inner }
    }

    fn init_events(inner: &Rc<Inner<L>>) {
        let weak = Rc::downgrade(inner);
        inner.events.on(
            LOAD_START,
            {
                let weak = Weak::clone(&weak);
                move |_: &Event<'_, f64>| {
                    if let Some(inner) = weak.upgrade() {
                        log::info!("loading {}", inner.url);
                        inner.progress.set(0.0);
                    }
                    Ok(())
                }
            },
            false,
            None,
        );
        inner.events.on(
            LOAD_PROGRESS,
            {
                let weak = Weak::clone(&weak);
                move |event: &Event<'_, f64>| {
                    if let (Some(inner), Some(percent)) = (weak.upgrade(), event.data) {
                        inner.progress.set(percent);
                    }
                    Ok(())
                }
            },
            false,
            None,
        );
        inner.events.on(
            LOAD_END,
            move |_: &Event<'_, f64>| {
                let inner = weak
                    .upgrade()
                    .ok_or_else(|| anyhow::anyhow!("viewer dropped before load finished"))?;
                inner.setup_scene();
                Ok(())
            },
            false,
            None,
        );
    }

    /// Run the load tasks. Does nothing once loading has started.
    ///
    /// The viewer's own lifecycle listeners are registered here, so they run
    /// ahead of any listener the embedder registered before.
    pub async fn load(&self) {
        if self.inner.orchestrator.state() != LoadState::Idle {
            return;
        }
        Self::init_events(&self.inner);
        self.inner
            .orchestrator
            .run(&self.inner.cache, &self.inner.events)
            .await;
    }

    /// Start [`load`](Self::load) on the browser's event loop.
    #[cfg(target_arch = "wasm32")]
    pub fn spawn_load(&self) {
        if self.inner.orchestrator.state() != LoadState::Idle {
            return;
        }
        Self::init_events(&self.inner);
        let inner = Rc::clone(&self.inner);
        wasm_bindgen_futures::spawn_local(async move {
            inner.orchestrator.run(&inner.cache, &inner.events).await;
        });
    }
}

impl<L> Inner<L> {
    fn setup_scene(&self) {
        let environment = self
            .cache
            .get_res(&cube_texture_url(&self.config), true)
            .and_then(|handle| handle.into_cube_texture());
        let skybox = self
            .cache
            .get_res(&skybox_url(&self.config), true)
            .and_then(|handle| handle.into_cube_texture())
            .map(|texture| {
                let mut texture = Rc::unwrap_or_clone(texture);
                texture.coordinates_mode = CoordinatesMode::Skybox;
                Rc::new(texture)
            });
        let entity = self
            .cache
            .get_res(&self.url, true)
            .and_then(|handle| handle.into_entity());
        let info = match &entity {
            Some(entity) => ObjectInfo::compute(entity, self.cache.transfer_size(&self.url)),
            None => {
                log::warn!("{} did not load, nothing to show", self.url);
                ObjectInfo::default()
            }
        };
        log::debug!("{}: {info:?}", self.url);
        let parts = entity.as_ref().map(PartOffset::for_entity).unwrap_or_default();
        *self.entity.borrow_mut() = entity;
        *self.scene.borrow_mut() = Some(LoadedScene {
            parts,
            info,
            environment,
            skybox,
        });
    }
}

impl<L> Viewer<L> {
    pub fn url(&self) -> &str {
        &self.inner.url
    }

    pub fn config(&self) -> &ViewerConfig {
        &self.inner.config
    }

    /// Lifecycle events; payload of `LOAD_PROGRESS` is the percentage.
    pub fn events(&self) -> &EventDispatcher<f64> {
        &self.inner.events
    }

    pub fn cache(&self) -> &ResourceCache<L> {
        &self.inner.cache
    }

    pub fn state(&self) -> LoadState {
        self.inner.orchestrator.state()
    }

    pub fn is_loaded(&self) -> bool {
        self.state() == LoadState::Loaded
    }

    /// Last progress percentage seen on `LOAD_PROGRESS`.
    pub fn progress(&self) -> f64 {
        self.inner.progress.get()
    }

    /// Run `f` on the instantiated model, if it loaded.
    pub fn with_entity<R>(&self, f: impl FnOnce(&mut Entity) -> R) -> Option<R> {
        self.inner.entity.borrow_mut().as_mut().map(f)
    }

    fn read_entity<R>(&self, f: impl FnOnce(&Entity) -> R) -> Option<R> {
        self.inner.entity.borrow().as_ref().map(f)
    }

    pub fn has_entity(&self) -> bool {
        self.read_entity(|_| ()).is_some()
    }

    pub fn object_info(&self) -> ObjectInfo {
        self.inner
            .scene
            .borrow()
            .as_ref()
            .map(|scene| scene.info.clone())
            .unwrap_or_default()
    }

    /// Cube texture used for image based lighting.
    pub fn environment_texture(&self) -> Option<Rc<CubeTexture>> {
        self.inner.scene.borrow().as_ref()?.environment.clone()
    }

    /// Cube texture drawn as the skybox.
    pub fn skybox_texture(&self) -> Option<Rc<CubeTexture>> {
        self.inner.scene.borrow().as_ref()?.skybox.clone()
    }

    /// Background image `id` in `1..=BACKGROUND_COUNT`, shared with the cache.
    pub fn background(&self, id: u32) -> Option<Rc<Texture>> {
        self.inner
            .cache
            .get_res(&background_url(&self.inner.config, id), false)
            .and_then(|handle| handle.into_texture())
    }

    pub fn auto_rotate(&self) -> bool {
        self.inner.config.auto_rotate
    }

    pub fn auto_animate(&self) -> bool {
        self.inner.config.auto_animate
    }

    pub fn has_animations(&self) -> bool {
        self.read_entity(|entity| !entity.animation_groups.is_empty())
            .unwrap_or(false)
    }

    /// Whether the model has more than one top-level part to pull apart.
    pub fn can_split(&self) -> bool {
        self.read_entity(|entity| entity.root.children.len() > 1)
            .unwrap_or(false)
    }

    /// Move every top-level part away from the model's center by `percent`
    /// of its distance to it. `0` is the assembled model.
    pub fn split(&self, percent: f32) {
        let scene = self.inner.scene.borrow();
        let mut entity = self.inner.entity.borrow_mut();
        let (Some(scene), Some(entity)) = (scene.as_ref(), entity.as_mut()) else {
            return;
        };
        for (part, offset) in entity.root.children.iter_mut().zip(&scene.parts) {
            part.transform.position = offset.position + offset.direction * (percent * offset.distance / 100.0);
        }
    }

    /// Put every top-level part back where the model placed it.
    pub fn reset(&self) {
        self.split(0.0);
    }

    /// Drop the scene, every cached resource and every listener.
    pub fn destroy(&self) {
        self.inner.entity.borrow_mut().take();
        if let Some(scene) = self.inner.scene.borrow_mut().take() {
            for texture in scene.environment.iter().chain(scene.skybox.iter()) {
                texture.dispose();
            }
        }
        self.inner.cache.destroy();
        self.inner.events.off_all();
    }
}
