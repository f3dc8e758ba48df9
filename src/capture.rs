//! Copying rendered frames back to the CPU.
//!
//! A copy is recorded into an encoder with [`PendingCapture::record`] and read
//! once the GPU has finished with [`PendingCapture::read`]. The window loop
//! records the copy into the same submission as the frame so the surface
//! texture can be presented before the result is read.

use crate::context::RenderError;

const BYTES_PER_PIXEL: u32 = 4;

/// Row stride of the staging buffer; copies need rows aligned to 256 bytes.
pub fn padded_bytes_per_row(width: u32) -> u32 {
    let unpadded = width * BYTES_PER_PIXEL;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    unpadded.div_ceil(align) * align
}

/// Drop the per-row padding of a readback and convert BGRA to RGBA if needed.
pub fn strip_row_padding(
    data: &[u8],
    padded_bytes_per_row: usize,
    width: u32,
    height: u32,
    bgra: bool,
) -> Vec<u8> {
    let row_bytes = (width * BYTES_PER_PIXEL) as usize;
    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in data.chunks(padded_bytes_per_row).take(height as usize) {
        pixels.extend_from_slice(&row[..row_bytes]);
    }
    if bgra {
        for pixel in pixels.chunks_exact_mut(BYTES_PER_PIXEL as usize) {
            pixel.swap(0, 2);
        }
    }
    pixels
}

fn is_bgra(format: wgpu::TextureFormat) -> Result<bool, RenderError> {
    match format {
        wgpu::TextureFormat::Rgba8Unorm | wgpu::TextureFormat::Rgba8UnormSrgb => Ok(false),
        wgpu::TextureFormat::Bgra8Unorm | wgpu::TextureFormat::Bgra8UnormSrgb => Ok(true),
        other => Err(RenderError::UnsupportedCaptureFormat(other)),
    }
}

/// A texture copy in flight.
#[derive(Debug)]
pub struct PendingCapture {
    buffer: wgpu::Buffer,
    width: u32,
    height: u32,
    padded_bytes_per_row: u32,
    bgra: bool,
}

impl PendingCapture {
    /// Record a copy of `texture` into a fresh staging buffer.
    pub fn record(
        device: &wgpu::Device,
        encoder: &mut wgpu::CommandEncoder,
        texture: &wgpu::Texture,
    ) -> Result<Self, RenderError> {
        let bgra = is_bgra(texture.format())?;
        let size = texture.size();
        let padded = padded_bytes_per_row(size.width);
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Capture Buffer"),
            size: (padded * size.height) as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                aspect: wgpu::TextureAspect::All,
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded),
                    rows_per_image: Some(size.height),
                },
            },
            wgpu::Extent3d {
                width: size.width,
                height: size.height,
                depth_or_array_layers: 1,
            },
        );
        Ok(Self {
            buffer,
            width: size.width,
            height: size.height,
            padded_bytes_per_row: padded,
            bgra,
        })
    }

    /// Block until the copy has landed and return it as a top-down RGBA image.
    ///
    /// The encoder the copy was recorded into must have been submitted.
    pub fn read(self, device: &wgpu::Device) -> Result<image::RgbaImage, RenderError> {
        let buffer_slice = self.buffer.slice(..);
        // map first, then poll; waiting on the channel before polling never resolves
        let (tx, rx) = futures_intrusive::channel::shared::oneshot_channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
            tx.send(result).ok();
        });
        device.poll(wgpu::PollType::Wait {
            submission_index: None,
            timeout: None,
        })?;
        futures::executor::block_on(rx.receive()).ok_or(RenderError::ReadbackCancelled)??;

        let pixels = {
            let data = buffer_slice.get_mapped_range();
            strip_row_padding(
                &data,
                self.padded_bytes_per_row as usize,
                self.width,
                self.height,
                self.bgra,
            )
        };
        self.buffer.unmap();
        image::RgbaImage::from_raw(self.width, self.height, pixels)
            .ok_or(RenderError::ReadbackCancelled)
    }
}

/// Copy `texture` to the CPU, waiting for all submitted work first.
pub fn capture(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    texture: &wgpu::Texture,
) -> Result<image::RgbaImage, RenderError> {
    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("Capture Encoder"),
    });
    let pending = PendingCapture::record(device, &mut encoder, texture)?;
    queue.submit(std::iter::once(encoder.finish()));
    pending.read(device)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_are_padded_to_copy_alignment() {
        assert_eq!(padded_bytes_per_row(1), 256);
        assert_eq!(padded_bytes_per_row(64), 256);
        assert_eq!(padded_bytes_per_row(65), 512);
        assert_eq!(padded_bytes_per_row(300), 1280);
    }

    #[test]
    fn padding_is_stripped_per_row() {
        let (width, height) = (2, 3);
        let stride = 256;
        let mut data = vec![0xAAu8; stride * height as usize];
        for row in 0..height as usize {
            for px in 0..width as usize {
                let i = row * stride + px * 4;
                data[i..i + 4].copy_from_slice(&[row as u8, px as u8, 9, 255]);
            }
        }
        let pixels = strip_row_padding(&data, stride, width, height, false);
        assert_eq!(pixels.len(), 2 * 3 * 4);
        assert_eq!(&pixels[0..4], &[0, 0, 9, 255]);
        assert_eq!(&pixels[4..8], &[0, 1, 9, 255]);
        // top-down: the last row comes last
        assert_eq!(&pixels[16..20], &[2, 0, 9, 255]);
        assert!(!pixels.contains(&0xAA));
    }

    #[test]
    fn bgra_is_converted_to_rgba() {
        let data = [10u8, 20, 30, 40, 50, 60, 70, 80];
        let pixels = strip_row_padding(&data, 8, 2, 1, true);
        assert_eq!(pixels, vec![30, 20, 10, 40, 70, 60, 50, 80]);
    }

    #[test]
    fn only_8bit_colour_formats_are_captured() {
        assert_eq!(is_bgra(wgpu::TextureFormat::Rgba8Unorm).ok(), Some(false));
        assert_eq!(is_bgra(wgpu::TextureFormat::Bgra8UnormSrgb).ok(), Some(true));
        assert!(is_bgra(wgpu::TextureFormat::Rgba16Float).is_err());
    }
}
