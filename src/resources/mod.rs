//! Loading models and their textures from disk.
//!
//! [`build_geometry`] splits a parsed model into one [`Submesh`] per material
//! and computes its bounds without touching the GPU; [`load_model`] adds the
//! texture cache and the GPU vertex buffers on top.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::data_structures::{
    dds::FormatError,
    model::{BoundingBox, GpuSubmesh, ModelVertex, Submesh},
    pmx::{PmxError, PmxModel},
    texture::Texture,
};

pub mod texture;

pub use texture::{CachedTexture, TextureCache};

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("could not read model {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("could not parse model {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: PmxError,
    },
    #[error("materials cover {declared} face indices but the model has {actual}")]
    CorruptFaces { declared: u64, actual: usize },
    #[error("face index {index} points past the {vertices} model vertices")]
    VertexIndexOutOfRange { index: u32, vertices: usize },
    #[error("unsupported pixel format: {0}")]
    UnsupportedPixelFormat(String),
    #[error(transparent)]
    Format(#[from] FormatError),
    #[error(transparent)]
    Image(#[from] image::ImageError),
}

/// CPU-side geometry of a model.
#[derive(Clone, Debug)]
pub struct ModelGeometry {
    /// One per material, in declaration order.
    pub submeshes: Vec<Submesh>,
    /// Already multiplied by the model scale.
    pub bounds: BoundingBox,
}

/// Everything a render session needs from a model file.
#[derive(Debug)]
pub struct LoadedModel {
    pub path: PathBuf,
    pub pmx: PmxModel,
    pub bounds: BoundingBox,
    /// Indexed by material; `None` where the material owns no faces.
    pub meshes: Vec<Option<GpuSubmesh>>,
    pub textures: TextureCache<Texture>,
}

pub fn load_pmx(path: &Path) -> Result<PmxModel, LoadError> {
    PmxModel::load(path).map_err(|source| match source {
        PmxError::Io(source) => LoadError::Io {
            path: path.to_path_buf(),
            source,
        },
        source => LoadError::Parse {
            path: path.to_path_buf(),
            source,
        },
    })
}

/// Split the flat face list into per-material submeshes.
///
/// Material `i` owns the `face_count` entries that follow those of materials
/// `0..i`. Every entry becomes one output vertex; nothing is deduplicated.
pub fn partition_submeshes(model: &PmxModel, scale: f32) -> Result<Vec<Submesh>, LoadError> {
    let declared: u64 = model.materials.iter().map(|m| m.face_count as u64).sum();
    if declared != model.face_indices.len() as u64 {
        return Err(LoadError::CorruptFaces {
            declared,
            actual: model.face_indices.len(),
        });
    }

    let mut offset = 0;
    let mut submeshes = Vec::with_capacity(model.materials.len());
    for (material, m) in model.materials.iter().enumerate() {
        let indices = &model.face_indices[offset..offset + m.face_count as usize];
        offset += m.face_count as usize;
        let vertices = indices
            .iter()
            .map(|&index| {
                let v = model.vertices.get(index as usize).ok_or(
                    LoadError::VertexIndexOutOfRange {
                        index,
                        vertices: model.vertices.len(),
                    },
                )?;
                Ok(ModelVertex {
                    position: v.position.map(|c| c * scale),
                    normal: v.normal,
                    tex_coords: v.uv,
                })
            })
            .collect::<Result<Vec<_>, LoadError>>()?;
        submeshes.push(Submesh {
            material,
            indices: indices.to_vec(),
            vertices,
        });
    }
    Ok(submeshes)
}

/// Unscaled bounds of every vertex the face list references.
///
/// A model without faces gets a zero-sized box at the origin.
pub fn compute_bounds(model: &PmxModel) -> Result<BoundingBox, LoadError> {
    let mut bounds = BoundingBox::empty();
    for &index in &model.face_indices {
        let v = model
            .vertices
            .get(index as usize)
            .ok_or(LoadError::VertexIndexOutOfRange {
                index,
                vertices: model.vertices.len(),
            })?;
        bounds.expand(v.position);
    }
    if bounds.is_empty() {
        bounds = BoundingBox {
            min: cgmath::Point3::new(0.0, 0.0, 0.0),
            max: cgmath::Point3::new(0.0, 0.0, 0.0),
        };
    }
    Ok(bounds)
}

pub fn build_geometry(model: &PmxModel, scale: f32) -> Result<ModelGeometry, LoadError> {
    let submeshes = partition_submeshes(model, scale)?;
    let bounds = compute_bounds(model)?.scaled(scale);
    Ok(ModelGeometry { submeshes, bounds })
}

/// Load a model file, upload its submeshes and every texture it declares.
///
/// Failing to read or parse the model is an error; a texture that cannot be
/// loaded is only logged and left out of the cache.
pub fn load_model(
    path: &Path,
    scale: f32,
    device: &wgpu::Device,
    queue: &wgpu::Queue,
) -> Result<LoadedModel, LoadError> {
    let pmx = load_pmx(path)?;
    let geometry = build_geometry(&pmx, scale)?;
    let label = path
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let meshes = geometry
        .submeshes
        .iter()
        .map(|submesh| GpuSubmesh::new(device, submesh, &label))
        .collect();

    let model_dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut textures = TextureCache::new();
    textures.load_all(model_dir, &pmx.textures, |full_path| {
        texture::load_texture(device, queue, full_path)
    });
    log::info!(
        "loaded {}: {} materials, {} of {} textures",
        path.display(),
        pmx.materials.len(),
        textures.len(),
        pmx.textures.len()
    );

    Ok(LoadedModel {
        path: path.to_path_buf(),
        pmx,
        bounds: geometry.bounds,
        meshes,
        textures,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_structures::pmx::{Material, PmxVertex};

    fn vertex(x: f32, y: f32, z: f32) -> PmxVertex {
        PmxVertex {
            position: [x, y, z],
            normal: [0.0, 0.0, -1.0],
            uv: [x, y],
        }
    }

    fn model(face_counts: &[u32], face_indices: Vec<u32>) -> PmxModel {
        PmxModel {
            vertices: vec![
                vertex(0.0, 0.0, 0.0),
                vertex(10.0, 0.0, 0.0),
                vertex(0.0, 20.0, 0.0),
                vertex(0.0, 0.0, -5.0),
                // not referenced by any face
                vertex(100.0, 100.0, 100.0),
            ],
            face_indices,
            materials: face_counts
                .iter()
                .map(|&face_count| Material {
                    face_count,
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn partitions_faces_in_material_order() {
        let m = model(&[3, 6], vec![0, 1, 2, 0, 2, 3, 3, 3, 1]);
        let submeshes = partition_submeshes(&m, 1.0).unwrap();
        assert_eq!(submeshes.len(), 2);
        assert_eq!(submeshes[0].material, 0);
        assert_eq!(submeshes[0].indices, vec![0, 1, 2]);
        assert_eq!(submeshes[1].indices, vec![0, 2, 3, 3, 3, 1]);
        assert_eq!(submeshes[0].vertex_count(), 3);
        assert_eq!(submeshes[1].vertex_count(), 6);
        // duplicate corners survive
        assert_eq!(submeshes[1].vertices[2], submeshes[1].vertices[3]);
    }

    #[test]
    fn scales_positions_only() {
        let m = model(&[3], vec![1, 2, 3]);
        let submeshes = partition_submeshes(&m, 0.5).unwrap();
        let v = submeshes[0].vertices[0];
        assert_eq!(v.position, [5.0, 0.0, 0.0]);
        assert_eq!(v.normal, [0.0, 0.0, -1.0]);
        assert_eq!(v.tex_coords, [10.0, 0.0]);
    }

    #[test]
    fn face_count_mismatch_is_corrupt() {
        let m = model(&[3, 3], vec![0, 1, 2, 0, 1]);
        assert!(matches!(
            partition_submeshes(&m, 1.0),
            Err(LoadError::CorruptFaces {
                declared: 6,
                actual: 5
            })
        ));
    }

    #[test]
    fn out_of_range_vertex_is_rejected() {
        let m = model(&[3], vec![0, 1, 9]);
        assert!(matches!(
            partition_submeshes(&m, 1.0),
            Err(LoadError::VertexIndexOutOfRange { index: 9, .. })
        ));
    }

    #[test]
    fn empty_materials_yield_empty_submeshes() {
        let m = model(&[0, 3, 0], vec![0, 1, 2]);
        let submeshes = partition_submeshes(&m, 1.0).unwrap();
        let counts: Vec<u32> = submeshes.iter().map(Submesh::vertex_count).collect();
        assert_eq!(counts, vec![0, 3, 0]);
    }

    #[test]
    fn bounds_cover_referenced_vertices_then_scale() {
        let m = model(&[6], vec![0, 1, 2, 0, 2, 3]);
        let geometry = build_geometry(&m, 0.1).unwrap();
        let b = geometry.bounds;
        assert_eq!(b.min, cgmath::Point3::new(0.0, 0.0, -0.5));
        assert_eq!(b.max, cgmath::Point3::new(1.0, 2.0, 0.0));
    }

    #[test]
    fn faceless_model_has_degenerate_bounds() {
        let m = model(&[], vec![]);
        let b = compute_bounds(&m).unwrap();
        assert_eq!(b.min, b.max);
        assert!(partition_submeshes(&m, 1.0).unwrap().is_empty());
    }
}
