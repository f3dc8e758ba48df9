//! GPU textures and texture creation utilities.
//!
//! This module provides [`Texture`], a wrapper around WGPU texture resources,
//! and helpers for depth buffers, solid-colour placeholders, colour targets and
//! uploads of decoded DDS containers or generic images.

use image::GenericImageView;

use crate::{data_structures::dds::DecodedTexture, resources::LoadError};

/// A GPU texture with its default view.
#[derive(Clone, Debug)]
pub struct Texture {
    #[allow(unused)]
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
}

impl Texture {
    /// Standard depth buffer texture format (32-bit float).
    pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

    /// Colour format of off-screen preview targets.
    pub const TARGET_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

    /// Create a depth texture for depth-testing during rendering.
    ///
    /// # Arguments
    ///
    /// * `size` is [width, height] of the texture in pixels
    /// * `label` is used as a debug label for the GPU resource
    pub fn create_depth_texture(device: &wgpu::Device, size: [u32; 2], label: &str) -> Self {
        let size = wgpu::Extent3d {
            width: size[0].max(1),
            height: size[1].max(1),
            depth_or_array_layers: 1,
        };
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: Self::DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self { texture, view }
    }

    /// Create an off-screen colour target that can be copied back to the CPU.
    pub fn create_render_target(device: &wgpu::Device, size: [u32; 2], label: &str) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: size[0].max(1),
                height: size[1].max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: Self::TARGET_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self { texture, view }
    }

    /// A 1x1 texture of a single colour, used wherever a material has nothing to bind.
    pub fn create_solid(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        rgba: [u8; 4],
        label: &str,
    ) -> Self {
        Self::upload(
            device,
            queue,
            label,
            wgpu::TextureFormat::Rgba8Unorm,
            [1, 1],
            4,
            &rgba,
        )
    }

    /// Upload a decoded DDS container as-is.
    ///
    /// Block-compressed formats need [`wgpu::Features::TEXTURE_COMPRESSION_BC`].
    /// The layout is checked with [`check_layout`] first so a bad container
    /// becomes an error instead of a validation failure on the queue.
    pub fn from_decoded(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        decoded: &DecodedTexture,
        label: &str,
    ) -> Result<Self, LoadError> {
        let format = decoded.format.to_wgpu();
        if decoded.format.is_block_compressed()
            && !device
                .features()
                .contains(wgpu::Features::TEXTURE_COMPRESSION_BC)
        {
            return Err(LoadError::UnsupportedPixelFormat(format!(
                "{label}: {format:?} needs BC texture compression"
            )));
        }
        let rows = check_layout(decoded, label, device.limits().max_texture_dimension_2d)?;
        let required = decoded.pitch as usize * rows as usize;
        Ok(Self::upload(
            device,
            queue,
            label,
            format,
            [decoded.width, decoded.height],
            decoded.pitch,
            &decoded.data[..required],
        ))
    }

    /// Upload an image decoded by the `image` crate as RGBA8.
    pub fn from_image(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        img: &image::DynamicImage,
        label: &str,
    ) -> Result<Self, LoadError> {
        let (width, height) = img.dimensions();
        check_dimensions(width, height, label, device.limits().max_texture_dimension_2d)?;
        let rgba = img.to_rgba8();
        Ok(Self::upload(
            device,
            queue,
            label,
            wgpu::TextureFormat::Rgba8Unorm,
            [width, height],
            4 * width,
            &rgba,
        ))
    }

    fn upload(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        label: &str,
        format: wgpu::TextureFormat,
        [width, height]: [u32; 2],
        bytes_per_row: u32,
        data: &[u8],
    ) -> Self {
        let size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                aspect: wgpu::TextureAspect::All,
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
            },
            data,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(bytes_per_row),
                rows_per_image: None,
            },
            size,
        );

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self { texture, view }
    }
}

fn check_dimensions(width: u32, height: u32, label: &str, max: u32) -> Result<(), LoadError> {
    if width == 0 || height == 0 || width > max || height > max {
        return Err(LoadError::UnsupportedPixelFormat(format!(
            "{label}: {width}x{height} is outside 1..={max}"
        )));
    }
    Ok(())
}

/// Validate a decoded container for upload and return the number of payload
/// rows (block rows for compressed formats).
///
/// The pitch must hold a full row, be a whole number of texels or blocks,
/// and the payload must cover every row.
pub fn check_layout(
    decoded: &DecodedTexture,
    label: &str,
    max_dimension: u32,
) -> Result<u32, LoadError> {
    let (width, height) = (decoded.width, decoded.height);
    check_dimensions(width, height, label, max_dimension)?;
    let block_bytes = decoded.format.block_bytes();
    let (min_pitch, rows) = if decoded.format.is_block_compressed() {
        if width % 4 != 0 || height % 4 != 0 {
            return Err(LoadError::UnsupportedPixelFormat(format!(
                "{label}: {width}x{height} is not a multiple of the 4x4 block size"
            )));
        }
        (width.div_ceil(4) * block_bytes, height / 4)
    } else {
        (width * block_bytes, height)
    };
    if decoded.pitch < min_pitch || decoded.pitch % block_bytes != 0 {
        return Err(LoadError::UnsupportedPixelFormat(format!(
            "{label}: pitch {} cannot hold a {min_pitch}-byte row",
            decoded.pitch
        )));
    }
    let required = decoded.pitch as usize * rows as usize;
    if decoded.data.len() < required {
        return Err(LoadError::UnsupportedPixelFormat(format!(
            "{label}: payload holds {} bytes, {required} needed",
            decoded.data.len()
        )));
    }
    Ok(rows)
}

/// Repeating, linearly filtered sampler for diffuse textures.
pub fn create_default_sampler(device: &wgpu::Device) -> wgpu::Sampler {
    device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some("diffuse sampler"),
        address_mode_u: wgpu::AddressMode::Repeat,
        address_mode_v: wgpu::AddressMode::Repeat,
        address_mode_w: wgpu::AddressMode::Repeat,
        mag_filter: wgpu::FilterMode::Linear,
        min_filter: wgpu::FilterMode::Linear,
        ..Default::default()
    })
}

/// Clamped sampler for toon ramps and sphere maps, which must not wrap.
pub fn create_clamp_sampler(device: &wgpu::Device) -> wgpu::Sampler {
    device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some("toon sampler"),
        address_mode_u: wgpu::AddressMode::ClampToEdge,
        address_mode_v: wgpu::AddressMode::ClampToEdge,
        address_mode_w: wgpu::AddressMode::ClampToEdge,
        mag_filter: wgpu::FilterMode::Linear,
        min_filter: wgpu::FilterMode::Linear,
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_structures::dds::TargetFormat;

    fn decoded(
        format: TargetFormat,
        [width, height]: [u32; 2],
        pitch: u32,
        len: usize,
    ) -> DecodedTexture {
        DecodedTexture {
            width,
            height,
            format,
            pitch,
            data: vec![0; len],
        }
    }

    #[test]
    fn padded_rows_are_accepted() {
        let rows = check_layout(&decoded(TargetFormat::Rgba8, [4, 4], 20, 80), "rgba", 8192);
        assert_eq!(rows.ok(), Some(4));
        let rows = check_layout(&decoded(TargetFormat::Bc3, [8, 8], 32, 64), "bc3", 8192);
        assert_eq!(rows.ok(), Some(2));
    }

    #[test]
    fn pitch_must_hold_a_whole_row() {
        for pitch in [0, 12, 18] {
            let texture = decoded(TargetFormat::Rgba8, [4, 4], pitch, 1024);
            assert!(check_layout(&texture, "rgba", 8192).is_err(), "pitch {pitch}");
        }
        // one BC1 block row of an 8-wide texture is 16 bytes
        for pitch in [0, 8, 20] {
            let texture = decoded(TargetFormat::Bc1, [8, 4], pitch, 1024);
            assert!(check_layout(&texture, "bc1", 8192).is_err(), "pitch {pitch}");
        }
    }

    #[test]
    fn block_textures_need_whole_blocks() {
        let texture = decoded(TargetFormat::Bc1, [6, 4], 16, 1024);
        assert!(check_layout(&texture, "bc1", 8192).is_err());
    }

    #[test]
    fn payload_must_cover_every_row() {
        let texture = decoded(TargetFormat::Rgba8, [4, 4], 16, 63);
        assert!(check_layout(&texture, "short", 8192).is_err());
    }

    #[test]
    fn dimensions_stay_within_device_limits() {
        let empty = decoded(TargetFormat::Rgba8, [0, 4], 16, 64);
        assert!(check_layout(&empty, "empty", 8192).is_err());
        let wide = decoded(TargetFormat::Rgba8, [8193, 1], 8193 * 4, 8193 * 4);
        assert!(check_layout(&wide, "wide", 8192).is_err());
        assert!(check_layout(&wide, "wide", 16384).is_ok());
    }
}
