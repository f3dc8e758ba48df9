//! Render pipelines and the bind group layouts they are built from.
//!
//! - `toon` is the cel-shading pipeline every material is drawn with

pub mod toon;
