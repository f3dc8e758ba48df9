//! pmx-preview
//!
//! Renders PMX character models with their textures, either into an
//! interactive window or into an off-screen image. Textures are read from DDS
//! containers or any format the `image` crate decodes, and every material is
//! drawn with a toon shader.
//!
//! High-level modules
//! - `bindings`: which texture each material binds, with placeholder fallbacks
//! - `camera`: framing, projection and the camera uniform
//! - `capture`: GPU to CPU readback of rendered frames
//! - `config`: shared preview settings
//! - `context`: the render session owning device, target and model resources
//! - `data_structures`: DDS and PMX formats, submeshes, GPU textures
//! - `flow`: the interactive window loop
//! - `pipelines`: the toon render pipeline
//! - `preview`: one-shot off-screen rendering
//! - `render`: the per-material draw step
//! - `resources`: model and texture loading
//!

pub mod bindings;
pub mod camera;
pub mod capture;
pub mod config;
pub mod context;
pub mod data_structures;
pub mod flow;
pub mod pipelines;
pub mod preview;
pub mod render;
pub mod resources;

pub use config::PreviewConfig;
pub use flow::{run_window, run_window_with_config};
pub use preview::{render_preview, render_preview_with_config};
