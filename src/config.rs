//! Viewer configuration.
//!
//! Everything has a default so `ViewerConfig::default()` is a working setup.
//! Embedders override fields through the builder methods or, for the
//! deployment-specific paths, through environment variables read by
//! [`ViewerConfig::from_env`].

use std::path::PathBuf;

use crate::data_structures::scene_graph::MaterialSharing;

/// Asset directory for native builds, relative to the working directory.
pub const ENV_ASSETS: &str = "MODEL_PREVIEW_ASSETS";
/// Directory prefix of the environment textures.
pub const ENV_ENV_DIR: &str = "MODEL_PREVIEW_ENV_DIR";
/// `1`/`true` makes the cache retry urls whose load failed.
pub const ENV_RETRY_FAILED: &str = "MODEL_PREVIEW_RETRY_FAILED";

/// Behavior of the resource cache on repeated loads.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CachePolicy {
    /// Re-run the loader for a url whose previous attempt failed. When false a
    /// failure is final for the lifetime of the cache.
    pub retry_failed: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ViewerConfig {
    pub asset_root: PathBuf,
    /// Base url for fetching on the web; the page origin when `None`.
    pub base_url: Option<String>,
    /// Prefix of the background and skybox assets, without trailing slash.
    pub env_dir: String,
    pub cube_face_extension: String,
    pub equirect_face_size: u32,
    pub cache: CachePolicy,
    pub material_sharing: MaterialSharing,
    pub auto_rotate: bool,
    pub auto_animate: bool,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            asset_root: PathBuf::from("assets"),
            base_url: None,
            env_dir: String::from("gltfviewer"),
            cube_face_extension: String::from(".jpg"),
            equirect_face_size: 128,
            cache: CachePolicy::default(),
            material_sharing: MaterialSharing::default(),
            auto_rotate: true,
            auto_animate: true,
        }
    }
}

impl ViewerConfig {
    /// Defaults overridden by the `MODEL_PREVIEW_*` environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(root) = std::env::var(ENV_ASSETS) {
            config.asset_root = PathBuf::from(root);
        }
        if let Ok(dir) = std::env::var(ENV_ENV_DIR) {
            config.env_dir = dir.trim_end_matches('/').to_string();
        }
        if let Ok(value) = std::env::var(ENV_RETRY_FAILED) {
            match parse_flag(&value) {
                Some(flag) => config.cache.retry_failed = flag,
                None => log::warn!("ignoring {ENV_RETRY_FAILED}={value}: expected true or false"),
            }
        }
        config
    }

    pub fn with_asset_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.asset_root = root.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_env_dir(mut self, dir: impl Into<String>) -> Self {
        self.env_dir = dir.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_cube_face_extension(mut self, extension: impl Into<String>) -> Self {
        self.cube_face_extension = extension.into();
        self
    }

    pub fn with_equirect_face_size(mut self, size: u32) -> Self {
        self.equirect_face_size = size;
        self
    }

    pub fn with_retry_failed(mut self, retry: bool) -> Self {
        self.cache.retry_failed = retry;
        self
    }

    pub fn with_material_sharing(mut self, sharing: MaterialSharing) -> Self {
        self.material_sharing = sharing;
        self
    }

    pub fn with_auto_rotate(mut self, enabled: bool) -> Self {
        self.auto_rotate = enabled;
        self
    }

    pub fn with_auto_animate(mut self, enabled: bool) -> Self {
        self.auto_animate = enabled;
        self
    }

    /// `{env_dir}/{file}`, or `file` when no env dir is set.
    pub fn env_path(&self, file: &str) -> String {
        if self.env_dir.is_empty() {
            file.to_string()
        } else {
            format!("{}/{file}", self.env_dir)
        }
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
