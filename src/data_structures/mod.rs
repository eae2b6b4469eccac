//! Data types the loaders produce and the viewer hands out.
//!
//! - `texture` contains decoded 2D and cube textures and their GPU upload
//! - `scene_graph` holds model containers and the entities instantiated from them
//! - `transform` is the translation/rotation/scale of a scene node

pub mod scene_graph;
pub mod texture;
pub mod transform;
