//! Loading of textures, cube textures and models from external files.
//!
//! The cache never touches files or the network itself. It calls a
//! [`ResourceLoader`], one async strategy per resource kind, that resolves to an
//! `anyhow::Result` instead of panicking or raising. [`FileLoader`] is the
//! default strategy set: it reads from an asset directory natively and fetches
//! over HTTP on the web.

use std::{fmt, path::PathBuf, str::FromStr};

use futures::future::LocalBoxFuture;

use crate::{
    config::ViewerConfig,
    data_structures::{
        scene_graph::ModelContainer,
        texture::{CubeTexture, Texture},
    },
};

pub mod model;
pub mod texture;

/// The kinds of resource the cache knows how to load.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Model,
    Texture,
    CubeTexture,
    EquirectangularCubeTexture,
    /// A kind name nobody recognized. Loading it records a failure.
    Unsupported(String),
}

impl ResourceKind {
    pub fn as_str(&self) -> &str {
        match self {
            ResourceKind::Model => "model",
            ResourceKind::Texture => "texture",
            ResourceKind::CubeTexture => "cubetexture",
            ResourceKind::EquirectangularCubeTexture => "equirectangularcubetexture",
            ResourceKind::Unsupported(name) => name,
        }
    }
}

impl FromStr for ResourceKind {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "model" => ResourceKind::Model,
            "texture" => ResourceKind::Texture,
            "cubetexture" => ResourceKind::CubeTexture,
            "equirectangularcubetexture" => ResourceKind::EquirectangularCubeTexture,
            _ => ResourceKind::Unsupported(s.to_string()),
        })
    }
}

impl From<&str> for ResourceKind {
    fn from(s: &str) -> Self {
        match s.parse() {
            Ok(kind) => kind,
            Err(never) => match never {},
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ResourceError {
    #[error("unsupported resource type '{0}'")]
    UnsupportedKind(String),
    #[error("unsupported model format '{extension}' for {url}")]
    UnsupportedModelFormat { url: String, extension: String },
    #[error("cube texture {name}: face {face} is {actual:?}, expected {expected}x{expected}")]
    CubeFaceMismatch {
        name: String,
        face: &'static str,
        expected: u32,
        actual: (u32, u32),
    },
    #[error("failed to fetch {url}: {reason}")]
    Transport { url: String, reason: String },
    #[error("malformed model {url}: {reason}")]
    MalformedModel { url: String, reason: String },
}

/// Bytes received so far for one transfer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransferProgress {
    pub loaded: u64,
    /// `None` when the transport cannot tell the final size.
    pub total: Option<u64>,
}

impl TransferProgress {
    /// Completed fraction in `[0, 1]`, if measurable.
    pub fn fraction(&self) -> Option<f64> {
        match self.total {
            Some(total) if total > 0 => Some((self.loaded as f64 / total as f64).clamp(0.0, 1.0)),
            _ => None,
        }
    }
}

pub type ProgressFn<'a> = &'a mut dyn FnMut(TransferProgress);

/// Per-kind load strategies injected into the cache.
///
/// Every strategy resolves to a `Result` so the cache can record success and
/// failure the same way for every kind.
pub trait ResourceLoader {
    fn load_texture<'a>(
        &'a self,
        url: &'a str,
        progress: ProgressFn<'a>,
    ) -> LocalBoxFuture<'a, anyhow::Result<Texture>>;

    fn load_cube_texture<'a>(
        &'a self,
        url: &'a str,
        progress: ProgressFn<'a>,
    ) -> LocalBoxFuture<'a, anyhow::Result<CubeTexture>>;

    fn load_equirectangular_cube_texture<'a>(
        &'a self,
        url: &'a str,
        progress: ProgressFn<'a>,
    ) -> LocalBoxFuture<'a, anyhow::Result<CubeTexture>>;

    fn load_model<'a>(
        &'a self,
        url: &'a str,
        progress: ProgressFn<'a>,
    ) -> LocalBoxFuture<'a, anyhow::Result<ModelContainer>>;
}

/// Default strategies backed by the asset directory (native) or HTTP (wasm32).
#[derive(Clone, Debug)]
pub struct FileLoader {
    pub asset_root: PathBuf,
    pub base_url: Option<String>,
    pub cube_face_extension: String,
    pub equirect_face_size: u32,
}

impl FileLoader {
    pub fn new(config: &ViewerConfig) -> Self {
        Self {
            asset_root: config.asset_root.clone(),
            base_url: config.base_url.clone(),
            cube_face_extension: config.cube_face_extension.clone(),
            equirect_face_size: config.equirect_face_size,
        }
    }

    /// Read the whole resource at `url`, reporting progress per chunk.
    pub async fn load_binary(&self, url: &str, progress: ProgressFn<'_>) -> anyhow::Result<Vec<u8>> {
        #[cfg(not(target_arch = "wasm32"))]
        let data = {
            use tokio::io::AsyncReadExt;

            let path = self.asset_root.join(url);
            let mut file = tokio::fs::File::open(&path).await.map_err(|err| {
                ResourceError::Transport {
                    url: url.to_string(),
                    reason: format!("{}: {err}", path.display()),
                }
            })?;
            let total = file.metadata().await?.len();
            let mut data = Vec::with_capacity(total as usize);
            let mut chunk = vec![0u8; CHUNK_SIZE];
            progress(TransferProgress {
                loaded: 0,
                total: Some(total),
            });
            loop {
                let read = file.read(&mut chunk).await?;
                if read == 0 {
                    break;
                }
                data.extend_from_slice(&chunk[..read]);
                progress(TransferProgress {
                    loaded: data.len() as u64,
                    total: Some(total.max(data.len() as u64)),
                });
            }
            data
        };

        #[cfg(target_arch = "wasm32")]
        let data = {
            let url = self.format_url(url)?;
            let response = reqwest::get(url.clone()).await?;
            if !response.status().is_success() {
                return Err(ResourceError::Transport {
                    url: url.to_string(),
                    reason: response.status().to_string(),
                }
                .into());
            }
            let total = response.content_length();
            let data = response.bytes().await?.to_vec();
            progress(TransferProgress {
                loaded: data.len() as u64,
                total,
            });
            data
        };

        Ok(data)
    }

    #[cfg(target_arch = "wasm32")]
    fn format_url(&self, file_name: &str) -> anyhow::Result<reqwest::Url> {
        let base = match &self.base_url {
            Some(base) => base.clone(),
            None => web_sys::window()
                .and_then(|window| window.location().origin().ok())
                .ok_or_else(|| anyhow::anyhow!("no window location to resolve {file_name}"))?,
        };
        let base = reqwest::Url::parse(&format!("{}/", base.trim_end_matches('/')))?;
        Ok(base.join(file_name)?)
    }
}

#[cfg(not(target_arch = "wasm32"))]
const CHUNK_SIZE: usize = 64 * 1024;

impl ResourceLoader for FileLoader {
    fn load_texture<'a>(
        &'a self,
        url: &'a str,
        progress: ProgressFn<'a>,
    ) -> LocalBoxFuture<'a, anyhow::Result<Texture>> {
        Box::pin(texture::load_texture(self, url, progress))
    }

    fn load_cube_texture<'a>(
        &'a self,
        url: &'a str,
        progress: ProgressFn<'a>,
    ) -> LocalBoxFuture<'a, anyhow::Result<CubeTexture>> {
        Box::pin(texture::load_cube_texture(
            self,
            url,
            &self.cube_face_extension,
            progress,
        ))
    }

    fn load_equirectangular_cube_texture<'a>(
        &'a self,
        url: &'a str,
        progress: ProgressFn<'a>,
    ) -> LocalBoxFuture<'a, anyhow::Result<CubeTexture>> {
        Box::pin(texture::load_equirectangular_cube_texture(
            self,
            url,
            self.equirect_face_size,
            progress,
        ))
    }

    fn load_model<'a>(
        &'a self,
        url: &'a str,
        progress: ProgressFn<'a>,
    ) -> LocalBoxFuture<'a, anyhow::Result<ModelContainer>> {
        Box::pin(model::load_model(self, url, progress))
    }
}

/// Split `url` into the directory part (with trailing `/`) and the file name.
pub fn split_url(url: &str) -> (&str, &str) {
    let index = url.rfind('/').map_or(0, |i| i + 1);
    url.split_at(index)
}

/// Lower-cased extension of the file name in `url`, query string ignored.
pub fn extension(url: &str) -> Option<String> {
    let (_, file) = split_url(url);
    let file = file.split(['?', '#']).next().unwrap_or(file);
    file.rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty())
}
