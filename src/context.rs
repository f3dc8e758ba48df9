//! The render session.
//!
//! A [`Context`] owns the device, the target it draws into, the loaded model
//! and every GPU resource derived from it. Dropping it releases all of them,
//! on success and on every early return alike.

use std::{path::Path, sync::Arc};

use thiserror::Error;
use wgpu::util::DeviceExt;
use winit::window::Window;

use crate::{
    camera::{Camera, CameraUniform, Projection},
    capture,
    config::PreviewConfig,
    data_structures::texture::Texture,
    pipelines::toon,
    render::{self, Scene},
    resources::{self, LoadError},
};

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("no suitable graphics adapter: {0}")]
    Adapter(#[from] wgpu::RequestAdapterError),
    #[error("could not create the graphics device: {0}")]
    Device(#[from] wgpu::RequestDeviceError),
    #[error("could not create the window surface: {0}")]
    CreateSurface(#[from] wgpu::CreateSurfaceError),
    #[error("the window surface has no supported format")]
    NoSurfaceFormat,
    #[error("could not acquire the next frame: {0}")]
    Surface(#[from] wgpu::SurfaceError),
    #[error("waiting for the GPU failed: {0}")]
    Poll(#[from] wgpu::PollError),
    #[error("mapping the readback buffer failed: {0}")]
    Readback(#[from] wgpu::BufferAsyncError),
    #[error("the readback was dropped before it completed")]
    ReadbackCancelled,
    #[error("cannot capture {0:?} targets")]
    UnsupportedCaptureFormat(wgpu::TextureFormat),
    #[error("the window surface cannot be copied from")]
    SurfaceNotCopyable,
    #[error("the session does not render off-screen")]
    NotOffscreen,
    #[error("a {width}x{height} target is outside the device limit of 1..={max}")]
    TargetSize { width: u32, height: u32, max: u32 },
    #[error("the graphics device rejected the work: {0}")]
    Validation(String),
    #[error(transparent)]
    Load(#[from] LoadError),
}

/// Camera state plus its uniform buffer and bind group.
#[derive(Debug)]
pub struct CameraResources {
    pub camera: Camera,
    pub uniform: CameraUniform,
    pub buffer: wgpu::Buffer,
    pub bind_group: wgpu::BindGroup,
}

impl CameraResources {
    fn new(device: &wgpu::Device, layout: &wgpu::BindGroupLayout, camera: Camera) -> Self {
        let uniform = CameraUniform::new();
        let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Camera Buffer"),
            contents: bytemuck::cast_slice(&[uniform]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: buffer.as_entire_binding(),
            }],
            label: Some("camera_bind_group"),
        });
        Self {
            camera,
            uniform,
            buffer,
            bind_group,
        }
    }
}

/// Where a session draws to.
#[derive(Debug)]
pub enum RenderTarget {
    Window {
        window: Arc<Window>,
        surface: wgpu::Surface<'static>,
        config: wgpu::SurfaceConfiguration,
        /// Whether surface textures may be copied for captures.
        copyable: bool,
    },
    Offscreen {
        texture: Texture,
    },
}

impl RenderTarget {
    pub fn size(&self) -> (u32, u32) {
        match self {
            RenderTarget::Window { config, .. } => (config.width, config.height),
            RenderTarget::Offscreen { texture } => {
                let size = texture.texture.size();
                (size.width, size.height)
            }
        }
    }

    fn is_offscreen(&self) -> bool {
        matches!(self, RenderTarget::Offscreen { .. })
    }
}

#[derive(Debug)]
pub struct Context {
    pub config: PreviewConfig,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub target: RenderTarget,
    pub(crate) depth_texture: Texture,
    pub camera: CameraResources,
    pub projection: Projection,
    pub scene: Scene,
}

impl Context {
    /// Set up a session drawing into `window`.
    pub async fn new_window(
        window: Arc<Window>,
        model_path: &Path,
        config: PreviewConfig,
    ) -> Result<Self, RenderError> {
        let size = window.inner_size();
        let instance = new_instance();
        let surface = instance.create_surface(window.clone())?;
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await?;
        let (device, queue) = request_device(&adapter).await?;

        let surface_caps = surface.get_capabilities(&adapter);
        // Colours are written as-is; prefer a non-sRGB surface.
        let surface_format = surface_caps
            .formats
            .iter()
            .copied()
            .find(|f| !f.is_srgb())
            .or_else(|| surface_caps.formats.first().copied())
            .ok_or(RenderError::NoSurfaceFormat)?;
        let copyable = surface_caps.usages.contains(wgpu::TextureUsages::COPY_SRC);
        let mut usage = wgpu::TextureUsages::RENDER_ATTACHMENT;
        if copyable {
            usage |= wgpu::TextureUsages::COPY_SRC;
        }
        let surface_config = wgpu::SurfaceConfiguration {
            usage,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: surface_caps
                .present_modes
                .first()
                .copied()
                .unwrap_or(wgpu::PresentMode::Fifo),
            alpha_mode: surface_caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &surface_config);

        let target = RenderTarget::Window {
            window,
            surface,
            config: surface_config,
            copyable,
        };
        Self::build(device, queue, target, surface_format, model_path, config)
    }

    /// Set up a session drawing into an off-screen texture of `width` x `height`.
    pub async fn new_offscreen(
        model_path: &Path,
        width: u32,
        height: u32,
        config: PreviewConfig,
    ) -> Result<Self, RenderError> {
        let instance = new_instance();
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await?;
        let (device, queue) = request_device(&adapter).await?;
        check_target_size(width, height, device.limits().max_texture_dimension_2d)?;

        let scope = device.push_error_scope(wgpu::ErrorFilter::Validation);
        let texture = Texture::create_render_target(&device, [width, height], "preview target");
        let target = RenderTarget::Offscreen { texture };
        let ctx = Self::build(
            device,
            queue,
            target,
            Texture::TARGET_FORMAT,
            model_path,
            config,
        )?;
        if let Some(e) = scope.pop().await {
            return Err(RenderError::Validation(e.to_string()));
        }
        Ok(ctx)
    }

    fn build(
        device: wgpu::Device,
        queue: wgpu::Queue,
        target: RenderTarget,
        color_format: wgpu::TextureFormat,
        model_path: &Path,
        config: PreviewConfig,
    ) -> Result<Self, RenderError> {
        let (width, height) = target.size();
        let model = resources::load_model(model_path, config.model_scale, &device, &queue)?;
        let toon_bank = resources::texture::load_toon_bank(&device, &queue, &config);

        let camera_layout = toon::camera_layout(&device);
        let camera = Camera::frame(&model.bounds, &config, !target.is_offscreen());
        let projection = Projection::from_config(width, height, &config);
        let camera = CameraResources::new(&device, &camera_layout, camera);

        let scene = Scene::new(
            &device,
            &queue,
            model,
            toon_bank,
            color_format,
            &camera_layout,
        );
        let depth_texture =
            Texture::create_depth_texture(&device, [width, height], "depth_texture");
        log::info!(
            "session ready: {}x{} {}",
            width,
            height,
            if target.is_offscreen() { "off-screen" } else { "window" }
        );

        Ok(Self {
            config,
            device,
            queue,
            target,
            depth_texture,
            camera,
            projection,
            scene,
        })
    }

    /// Rebuild everything that depends on the target size.
    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        match &mut self.target {
            RenderTarget::Window {
                surface, config, ..
            } => {
                config.width = width;
                config.height = height;
                surface.configure(&self.device, config);
            }
            RenderTarget::Offscreen { texture } => {
                *texture =
                    Texture::create_render_target(&self.device, [width, height], "preview target");
            }
        }
        self.projection.resize(width, height);
        self.depth_texture =
            Texture::create_depth_texture(&self.device, [width, height], "depth_texture");
    }

    /// Upload the current camera state.
    pub fn update_camera(&mut self) {
        let offscreen = self.target.is_offscreen();
        self.camera
            .uniform
            .update_view_proj(&self.camera.camera, &self.projection, offscreen);
        self.queue.write_buffer(
            &self.camera.buffer,
            0,
            bytemuck::cast_slice(&[self.camera.uniform]),
        );
    }

    /// Record one full frame into `encoder`.
    pub fn encode_frame(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        color_view: &wgpu::TextureView,
    ) {
        render::encode_frame(
            encoder,
            color_view,
            &self.depth_texture.view,
            self.config.clear_colour,
            &self.scene,
            &self.camera.bind_group,
        );
    }

    /// Draw one frame into the off-screen target and read it back.
    pub fn render_offscreen(&mut self) -> Result<image::RgbaImage, RenderError> {
        self.update_camera();
        let RenderTarget::Offscreen { texture } = &self.target else {
            return Err(RenderError::NotOffscreen);
        };
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Render Encoder"),
            });
        let scope = self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        self.encode_frame(&mut encoder, &texture.view);
        self.queue.submit(std::iter::once(encoder.finish()));
        if let Some(e) = futures::executor::block_on(scope.pop()) {
            return Err(RenderError::Validation(e.to_string()));
        }
        capture::capture(&self.device, &self.queue, &texture.texture)
    }
}

/// Off-screen targets must be non-empty and within the device's 2D limit.
pub fn check_target_size(width: u32, height: u32, max: u32) -> Result<(), RenderError> {
    if width == 0 || height == 0 || width > max || height > max {
        return Err(RenderError::TargetSize { width, height, max });
    }
    Ok(())
}

fn new_instance() -> wgpu::Instance {
    wgpu::Instance::new(wgpu::InstanceDescriptor {
        backends: wgpu::Backends::PRIMARY,
        ..wgpu::InstanceDescriptor::new_without_display_handle()
    })
}

/// Request a device, enabling BC texture compression when the adapter has it.
async fn request_device(
    adapter: &wgpu::Adapter,
) -> Result<(wgpu::Device, wgpu::Queue), RenderError> {
    let required_features = adapter.features() & wgpu::Features::TEXTURE_COMPRESSION_BC;
    if required_features.is_empty() {
        log::warn!("adapter lacks BC texture compression; compressed DDS textures fall back");
    }
    let (device, queue) = adapter
        .request_device(&wgpu::DeviceDescriptor {
            label: None,
            required_features,
            required_limits: wgpu::Limits::default(),
            experimental_features: Default::default(),
            memory_hints: Default::default(),
            trace: wgpu::Trace::Off,
        })
        .await?;
    Ok((device, queue))
}
