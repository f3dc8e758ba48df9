//! Render-side model data: vertices, per-material submeshes and bounds.

use cgmath::{EuclideanSpace, Point3, Vector3};
use wgpu::util::DeviceExt;

pub trait Vertex {
    fn desc() -> wgpu::VertexBufferLayout<'static>;
}

/// Vertex as consumed by the toon shader: position, normal, uv.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ModelVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub tex_coords: [f32; 2],
}

impl Vertex for ModelVertex {
    fn desc() -> wgpu::VertexBufferLayout<'static> {
        use std::mem;
        wgpu::VertexBufferLayout {
            array_stride: mem::size_of::<ModelVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[
                wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 0,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 3]>() as wgpu::BufferAddress,
                    shader_location: 1,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 6]>() as wgpu::BufferAddress,
                    shader_location: 2,
                    format: wgpu::VertexFormat::Float32x2,
                },
            ],
        }
    }
}

/// The slice of a model drawn with one material.
///
/// `indices` keeps one entry per triangle corner, duplicates included, so
/// `vertices.len() == indices.len()` always holds and the submesh is drawn
/// without an index buffer.
#[derive(Clone, Debug, Default)]
pub struct Submesh {
    pub material: usize,
    pub indices: Vec<u32>,
    pub vertices: Vec<ModelVertex>,
}

impl Submesh {
    pub fn vertex_count(&self) -> u32 {
        self.vertices.len() as u32
    }
}

/// A submesh living on the GPU.
#[derive(Debug)]
pub struct GpuSubmesh {
    pub material: usize,
    pub vertex_buffer: wgpu::Buffer,
    pub num_vertices: u32,
}

impl GpuSubmesh {
    /// Returns `None` for empty submeshes; wgpu rejects zero-sized vertex buffers.
    pub fn new(device: &wgpu::Device, submesh: &Submesh, label: &str) -> Option<Self> {
        if submesh.vertices.is_empty() {
            return None;
        }
        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{label} material {} Vertex Buffer", submesh.material)),
            contents: bytemuck::cast_slice(&submesh.vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        Some(Self {
            material: submesh.material,
            vertex_buffer,
            num_vertices: submesh.vertex_count(),
        })
    }
}

/// Axis-aligned bounds.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub min: Point3<f32>,
    pub max: Point3<f32>,
}

impl BoundingBox {
    /// An inverted box that any point expands.
    pub fn empty() -> Self {
        Self {
            min: Point3::new(f32::INFINITY, f32::INFINITY, f32::INFINITY),
            max: Point3::new(f32::NEG_INFINITY, f32::NEG_INFINITY, f32::NEG_INFINITY),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    pub fn expand(&mut self, p: [f32; 3]) {
        self.min.x = self.min.x.min(p[0]);
        self.min.y = self.min.y.min(p[1]);
        self.min.z = self.min.z.min(p[2]);
        self.max.x = self.max.x.max(p[0]);
        self.max.y = self.max.y.max(p[1]);
        self.max.z = self.max.z.max(p[2]);
    }

    pub fn scaled(&self, factor: f32) -> Self {
        Self {
            min: self.min * factor,
            max: self.max * factor,
        }
    }

    pub fn center(&self) -> Point3<f32> {
        Point3::from_vec((self.min.to_vec() + self.max.to_vec()) * 0.5)
    }

    pub fn extent(&self) -> Vector3<f32> {
        self.max - self.min
    }

    pub fn height(&self) -> f32 {
        self.max.y - self.min.y
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounds_grow_per_axis() {
        let mut b = BoundingBox::empty();
        assert!(b.is_empty());
        b.expand([1.0, -2.0, 3.0]);
        b.expand([-1.0, 4.0, 0.5]);
        assert!(!b.is_empty());
        assert_eq!(b.min, Point3::new(-1.0, -2.0, 0.5));
        assert_eq!(b.max, Point3::new(1.0, 4.0, 3.0));
        assert_eq!(b.center(), Point3::new(0.0, 1.0, 1.75));
        assert_eq!(b.extent(), Vector3::new(2.0, 6.0, 2.5));
        assert_eq!(b.height(), 6.0);
    }

    #[test]
    fn scaling_scales_both_corners() {
        let b = BoundingBox {
            min: Point3::new(-10.0, 0.0, -5.0),
            max: Point3::new(10.0, 20.0, 5.0),
        }
        .scaled(0.5);
        assert_eq!(b.min, Point3::new(-5.0, 0.0, -2.5));
        assert_eq!(b.max, Point3::new(5.0, 10.0, 2.5));
    }
}
