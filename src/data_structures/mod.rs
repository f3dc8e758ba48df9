//! Data formats and the render-side data built from them.
//!
//! - `dds` decodes DDS texture containers
//! - `pmx` parses PMX models
//! - `model` holds vertices, per-material submeshes and bounds
//! - `texture` wraps GPU textures and their creation

pub mod dds;
pub mod model;
pub mod pmx;
pub mod texture;
