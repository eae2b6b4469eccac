//! model-preview
//!
//! The loading core of an embeddable 3D model preview widget. It fetches a
//! model together with its environment textures, caches every resource by URL
//! and reports progress through a small event dispatcher. Runs natively and in
//! the browser (WASM).
//!
//! High-level modules
//! - `event`: typed publish/subscribe with pause/resume and once listeners
//! - `cache`: deduplicated async loading and typed retrieval of resources
//! - `load`: weighted sequential task runner emitting the load lifecycle events
//! - `viewer`: ties the above together for one model and gathers model stats
//! - `config`: viewer and cache settings
//! - `data_structures`: textures, transforms and model scene graphs
//! - `resources`: the default file/HTTP loader strategies and parsers
//!

pub mod cache;
pub mod config;
pub mod data_structures;
pub mod event;
pub mod load;
pub mod resources;
pub mod viewer;

#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;

// Re-exports commonly used types for convenience in downstream code.
pub use cache::{ResourceCache, ResourceHandle};
pub use config::ViewerConfig;
pub use event::{Event, EventDispatcher, ListenerId};
pub use load::{LOAD_END, LOAD_PROGRESS, LOAD_START, LoadOrchestrator, LoadTask};
pub use resources::{FileLoader, ResourceKind, ResourceLoader};
pub use viewer::Viewer;

/// Install the platform logger: `env_logger` natively, the browser console
/// on WASM. Safe to call more than once.
#[cfg_attr(target_arch = "wasm32", wasm_bindgen(js_name = initLogging))]
pub fn init_logging() {
    #[cfg(not(target_arch = "wasm32"))]
    {
        if let Err(e) = env_logger::try_init() {
            log::debug!("Could not initialize logger: {}", e);
        };
    }

    #[cfg(target_arch = "wasm32")]
    {
        if console_log::init_with_level(log::Level::Info).is_err() {
            log::debug!("console logger already installed");
        }
    }
}
