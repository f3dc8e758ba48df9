//! The per-material draw step shared by the window and the off-screen target.
//!
//! [`Scene`] owns everything a loaded model needs on the GPU: the pipeline,
//! one texture bind group per material and a single uniform buffer holding
//! every material's [`DrawUniform`]. The records are assembled up front and
//! uploaded once; each draw selects its record with a dynamic offset.
//!
//! [`encode_frame`] clears the target and draws every material in
//! declaration order. It does not care whether the colour view belongs to a
//! window surface or an off-screen texture.

use wgpu::util::DeviceExt;

use crate::{
    bindings::{self, Binding, MaterialBindings, Placeholder},
    data_structures::{
        pmx::Material,
        texture::{self, Texture},
    },
    pipelines::toon,
    resources::{CachedTexture, LoadedModel},
};

/// Per-draw parameter block, mirrored by `Draw` in `toon.wgsl`.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct DrawUniform {
    pub material_index: u32,
    pub sphere_mode: u32,
    pub specularity: f32,
    pub _padding: f32,
    /// Diffuse, sphere, toon, unused.
    pub swap_rb: [u32; 4],
    pub diffuse: [f32; 4],
    pub ambient: [f32; 4],
    pub specular: [f32; 4],
}

impl DrawUniform {
    pub fn new<T>(index: usize, material: &Material, bindings: &MaterialBindings<'_, T>) -> Self {
        let [ar, ag, ab] = material.ambient;
        let [sr, sg, sb] = material.specular;
        Self {
            material_index: index as u32,
            sphere_mode: bindings.sphere_mode as u32,
            specularity: material.specularity,
            _padding: 0.0,
            swap_rb: bindings.swap_flags(),
            diffuse: material.diffuse,
            ambient: [ar, ag, ab, 1.0],
            specular: [sr, sg, sb, 0.0],
        }
    }
}

/// Round `size` up to the next multiple of `alignment`.
pub fn align_to(size: u64, alignment: u64) -> u64 {
    size.div_ceil(alignment) * alignment
}

/// Lay `records` out `stride` bytes apart, zero-filling the gaps.
pub fn pack_records(records: &[DrawUniform], stride: u64) -> Vec<u8> {
    let stride = stride as usize;
    let mut bytes = vec![0u8; records.len() * stride];
    for (chunk, record) in bytes.chunks_exact_mut(stride).zip(records) {
        let record = bytemuck::bytes_of(record);
        chunk[..record.len()].copy_from_slice(record);
    }
    bytes
}

#[derive(Debug)]
struct MaterialDraw {
    material: usize,
    bind_group: wgpu::BindGroup,
    offset: wgpu::DynamicOffset,
}

#[derive(Debug)]
pub struct Placeholders {
    pub white: Texture,
    pub black: Texture,
}

impl Placeholders {
    pub fn new(device: &wgpu::Device, queue: &wgpu::Queue) -> Self {
        Self {
            white: Texture::create_solid(device, queue, Placeholder::White.rgba(), "white"),
            black: Texture::create_solid(device, queue, Placeholder::Black.rgba(), "black"),
        }
    }

    fn view<'a>(&'a self, binding: &Binding<'a, Texture>) -> &'a wgpu::TextureView {
        match *binding {
            Binding::Bound { resource, .. } => &resource.view,
            Binding::Placeholder(Placeholder::White) => &self.white.view,
            Binding::Placeholder(Placeholder::Black) => &self.black.view,
        }
    }
}

/// A loaded model ready to be drawn.
#[derive(Debug)]
pub struct Scene {
    pub model: LoadedModel,
    pub toon_bank: Vec<Option<CachedTexture<Texture>>>,
    pub placeholders: Placeholders,
    pipeline: wgpu::RenderPipeline,
    #[allow(unused)]
    draw_buffer: wgpu::Buffer,
    draw_bind_group: wgpu::BindGroup,
    draws: Vec<MaterialDraw>,
}

impl Scene {
    pub fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        model: LoadedModel,
        toon_bank: Vec<Option<CachedTexture<Texture>>>,
        color_format: wgpu::TextureFormat,
        camera_bind_group_layout: &wgpu::BindGroupLayout,
    ) -> Self {
        let placeholders = Placeholders::new(device, queue);
        let repeat_sampler = texture::create_default_sampler(device);
        let clamp_sampler = texture::create_clamp_sampler(device);

        let draw_layout = toon::draw_layout(device);
        let material_layout = toon::material_layout(device);
        let pipeline = toon::mk_toon_pipeline(
            device,
            color_format,
            camera_bind_group_layout,
            &draw_layout,
            &material_layout,
        );

        let stride = align_to(
            std::mem::size_of::<DrawUniform>() as u64,
            device.limits().min_uniform_buffer_offset_alignment as u64,
        );

        let mut records = Vec::with_capacity(model.pmx.materials.len());
        let mut draws = Vec::with_capacity(model.pmx.materials.len());
        for (index, material) in model.pmx.materials.iter().enumerate() {
            let resolved =
                bindings::resolve(material, &model.pmx.textures, &model.textures, &toon_bank);
            records.push(DrawUniform::new(index, material, &resolved));
            let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                layout: &material_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::TextureView(
                            placeholders.view(&resolved.diffuse),
                        ),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::TextureView(
                            placeholders.view(&resolved.sphere),
                        ),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: wgpu::BindingResource::TextureView(
                            placeholders.view(&resolved.toon),
                        ),
                    },
                    wgpu::BindGroupEntry {
                        binding: 3,
                        resource: wgpu::BindingResource::Sampler(&repeat_sampler),
                    },
                    wgpu::BindGroupEntry {
                        binding: 4,
                        resource: wgpu::BindingResource::Sampler(&clamp_sampler),
                    },
                ],
                label: Some(&format!("material {index} bind group")),
            });
            draws.push(MaterialDraw {
                material: index,
                bind_group,
                offset: (index as u64 * stride) as wgpu::DynamicOffset,
            });
        }

        let mut contents = pack_records(&records, stride);
        if contents.is_empty() {
            // a binding needs at least one record even when nothing is drawn
            contents.resize(stride as usize, 0);
        }
        let draw_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Draw Uniform Buffer"),
            contents: &contents,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let draw_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &draw_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &draw_buffer,
                    offset: 0,
                    size: wgpu::BufferSize::new(std::mem::size_of::<DrawUniform>() as u64),
                }),
            }],
            label: Some("draw_bind_group"),
        });

        log::debug!("prepared {} material draws", draws.len());
        Self {
            model,
            toon_bank,
            placeholders,
            pipeline,
            draw_buffer,
            draw_bind_group,
            draws,
        }
    }

    /// Draw every material in declaration order.
    pub fn draw(&self, render_pass: &mut wgpu::RenderPass<'_>, camera_bind_group: &wgpu::BindGroup) {
        render_pass.set_pipeline(&self.pipeline);
        render_pass.set_bind_group(toon::CAMERA_GROUP, camera_bind_group, &[]);
        for draw in &self.draws {
            let Some(mesh) = self.model.meshes.get(draw.material).and_then(Option::as_ref) else {
                continue;
            };
            render_pass.set_bind_group(toon::DRAW_GROUP, &self.draw_bind_group, &[draw.offset]);
            render_pass.set_bind_group(toon::TEXTURE_GROUP, &draw.bind_group, &[]);
            render_pass.set_vertex_buffer(0, mesh.vertex_buffer.slice(..));
            render_pass.draw(0..mesh.num_vertices, 0..1);
        }
    }
}

/// Clear `color_view` and `depth_view` and draw `scene` into them.
pub fn encode_frame(
    encoder: &mut wgpu::CommandEncoder,
    color_view: &wgpu::TextureView,
    depth_view: &wgpu::TextureView,
    clear_colour: wgpu::Color,
    scene: &Scene,
    camera_bind_group: &wgpu::BindGroup,
) {
    let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some("Render Pass"),
        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
            view: color_view,
            resolve_target: None,
            ops: wgpu::Operations {
                load: wgpu::LoadOp::Clear(clear_colour),
                store: wgpu::StoreOp::Store,
            },
            depth_slice: None,
        })],
        depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
            view: depth_view,
            depth_ops: Some(wgpu::Operations {
                load: wgpu::LoadOp::Clear(1.0),
                store: wgpu::StoreOp::Store,
            }),
            stencil_ops: None,
        }),
        occlusion_query_set: None,
        timestamp_writes: None,
        multiview_mask: None,
    });
    scene.draw(&mut render_pass, camera_bind_group);
}
