use std::{
    cell::RefCell,
    collections::HashSet,
    future::Future,
    path::{Path, PathBuf},
    pin::Pin,
    rc::Rc,
    task::{Context, Poll},
};

use futures::future::LocalBoxFuture;
use image::{Rgba, RgbaImage};
use model_preview::{
    data_structures::{
        scene_graph::{Material, MeshData, ModelContainer, NodeTemplate, PrimitiveTemplate},
        texture::{CubeTexture, Texture},
        transform::Transform,
    },
    resources::{ProgressFn, ResourceLoader, TransferProgress},
};

/// Bytes every mock transfer pretends to move.
pub(crate) const MOCK_SIZE: u64 = 1024;

/// Returns `Pending` once, so concurrent futures get a chance to run.
pub(crate) struct YieldNow(bool);

impl YieldNow {
    pub(crate) fn new() -> Self {
        Self(false)
    }
}

impl Future for YieldNow {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.0 {
            Poll::Ready(())
        } else {
            self.0 = true;
            cx.waker().wake_by_ref();
            Poll::Pending
        }
    }
}

/// In-memory loader that records every fetch.
///
/// Each fetch reports four progress steps of a [`MOCK_SIZE`] transfer and
/// yields between them. Urls registered with [`failing`](Self::failing) fail
/// after the transfer.
#[derive(Clone, Default)]
pub(crate) struct MockLoader {
    fetches: Rc<RefCell<Vec<String>>>,
    failures: Rc<RefCell<HashSet<String>>>,
}

impl MockLoader {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn failing(self, url: &str) -> Self {
        self.failures.borrow_mut().insert(url.to_string());
        self
    }

    pub(crate) fn heal(&self, url: &str) {
        self.failures.borrow_mut().remove(url);
    }

    pub(crate) fn fetches(&self) -> Vec<String> {
        self.fetches.borrow().clone()
    }

    pub(crate) fn fetch_count(&self, url: &str) -> usize {
        self.fetches.borrow().iter().filter(|u| *u == url).count()
    }

    async fn fetch(&self, url: &str, progress: ProgressFn<'_>) -> anyhow::Result<()> {
        self.fetches.borrow_mut().push(url.to_string());
        for step in 1..=4 {
            progress(TransferProgress {
                loaded: step * MOCK_SIZE / 4,
                total: Some(MOCK_SIZE),
            });
            YieldNow::new().await;
        }
        if self.failures.borrow().contains(url) {
            anyhow::bail!("404 Not Found: {url}");
        }
        Ok(())
    }
}

impl ResourceLoader for MockLoader {
    fn load_texture<'a>(
        &'a self,
        url: &'a str,
        progress: ProgressFn<'a>,
    ) -> LocalBoxFuture<'a, anyhow::Result<Texture>> {
        Box::pin(async move {
            self.fetch(url, progress).await?;
            Ok(Texture::new(url, RgbaImage::from_pixel(2, 2, Rgba([255, 0, 0, 255]))))
        })
    }

    fn load_cube_texture<'a>(
        &'a self,
        url: &'a str,
        progress: ProgressFn<'a>,
    ) -> LocalBoxFuture<'a, anyhow::Result<CubeTexture>> {
        Box::pin(async move {
            self.fetch(url, progress).await?;
            solid_cube(url, 4)
        })
    }

    fn load_equirectangular_cube_texture<'a>(
        &'a self,
        url: &'a str,
        progress: ProgressFn<'a>,
    ) -> LocalBoxFuture<'a, anyhow::Result<CubeTexture>> {
        Box::pin(async move {
            self.fetch(url, progress).await?;
            solid_cube(url, 8)
        })
    }

    fn load_model<'a>(
        &'a self,
        url: &'a str,
        progress: ProgressFn<'a>,
    ) -> LocalBoxFuture<'a, anyhow::Result<ModelContainer>> {
        Box::pin(async move {
            self.fetch(url, progress).await?;
            Ok(sample_container(url))
        })
    }
}

pub(crate) fn solid_cube(name: &str, size: u32) -> anyhow::Result<CubeTexture> {
    CubeTexture::new(
        name,
        std::array::from_fn(|_| RgbaImage::from_pixel(size, size, Rgba([0, 0, 255, 255]))),
    )
}

fn triangle(name: &str) -> Rc<MeshData> {
    Rc::new(MeshData {
        name: name.to_string(),
        positions: vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
        normals: vec![[0.0, 0.0, 1.0]; 3],
        tex_coords: vec![[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]],
        indices: vec![0, 1, 2],
    })
}

/// Two top-level parts that reference the same material, the second with a
/// child node, plus one animation.
///
/// ```text
/// body  (material 0, at origin)
/// wheel (material 0, at x = 2)
///   └─ hub (material 1, textured)
/// ```
pub(crate) fn sample_container(name: &str) -> ModelContainer {
    let node = |name: &str, x: f32, material: usize, children: Vec<usize>| NodeTemplate {
        name: name.to_string(),
        transform: Transform::from_decomposed(([x, 0.0, 0.0], [0.0, 0.0, 0.0, 1.0], [1.0, 1.0, 1.0])),
        primitives: vec![PrimitiveTemplate {
            mesh: triangle(name),
            material: Some(material),
        }],
        children,
    };
    ModelContainer {
        name: name.to_string(),
        nodes: vec![node("body", 0.0, 0, vec![]), node("wheel", 2.0, 0, vec![2]), node("hub", 0.0, 1, vec![])],
        roots: vec![0, 1],
        materials: vec![
            Material {
                name: String::from("paint"),
                base_color: [0.8, 0.1, 0.1, 1.0],
                ..Default::default()
            },
            Material {
                name: String::from("chrome"),
                base_color_texture: Some(String::from("chrome.png")),
                normal_texture: Some(String::from("chrome_n.png")),
                ..Default::default()
            },
        ],
        animations: vec![String::from("spin")],
    }
}

/// A fresh directory under the system temp dir, unique per test.
pub(crate) fn fixture_dir(test: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("model-preview-{}-{test}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).expect("failed to create fixture dir");
    dir
}

/// PNG-encodes `image` to `path`, whatever its extension.
pub(crate) fn write_png(path: &Path, image: &RgbaImage) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("failed to create fixture dir");
    }
    image
        .save_with_format(path, image::ImageFormat::Png)
        .expect("failed to write png fixture");
}

/// Little-endian bytes of one triangle: positions then `u16` indices.
pub(crate) fn triangle_buffer() -> Vec<u8> {
    let mut bytes = Vec::new();
    for value in [0.0f32, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0] {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    for index in [0u16, 1, 2] {
        bytes.extend_from_slice(&index.to_le_bytes());
    }
    // Pad to a multiple of four.
    bytes.extend_from_slice(&[0, 0]);
    bytes
}

/// A glTF document with one triangle mesh referenced by two nodes and a
/// shared material. `buffer_uri` is written as is.
pub(crate) fn triangle_gltf(buffer_uri: &str) -> String {
    format!(
        r#"{{
  "asset": {{ "version": "2.0" }},
  "scene": 0,
  "scenes": [{{ "nodes": [0, 1] }}],
  "nodes": [
    {{ "name": "left", "mesh": 0, "translation": [-1.0, 0.0, 0.0] }},
    {{ "name": "right", "mesh": 0, "translation": [1.0, 0.0, 0.0] }}
  ],
  "meshes": [{{ "name": "tri", "primitives": [{{ "attributes": {{ "POSITION": 0 }}, "indices": 1, "material": 0 }}] }}],
  "materials": [{{ "name": "red", "pbrMetallicRoughness": {{ "baseColorFactor": [1.0, 0.0, 0.0, 1.0] }} }}],
  "buffers": [{{ "byteLength": 44, "uri": "{buffer_uri}" }}],
  "bufferViews": [
    {{ "buffer": 0, "byteOffset": 0, "byteLength": 36 }},
    {{ "buffer": 0, "byteOffset": 36, "byteLength": 6 }}
  ],
  "accessors": [
    {{ "bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3", "min": [0.0, 0.0, 0.0], "max": [1.0, 1.0, 0.0] }},
    {{ "bufferView": 1, "componentType": 5123, "count": 3, "type": "SCALAR" }}
  ]
}}"#
    )
}

pub(crate) const TRIANGLE_OBJ: &str = "mtllib cube.mtl
o tri
v 0.0 0.0 0.0
v 1.0 0.0 0.0
v 0.0 2.0 0.0
vt 0.0 0.0
vt 1.0 0.0
vt 0.0 1.0
usemtl green
f 1/1 2/2 3/3
";

pub(crate) const TRIANGLE_MTL: &str = "newmtl green
Kd 0.0 1.0 0.0
d 0.5
map_Kd green.png
";
