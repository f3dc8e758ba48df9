//! DirectDraw Surface (DDS) container decoding.
//!
//! The decoder validates the fixed 128-byte primary header, selects a target
//! pixel format from the pixel-format block and hands back the remaining
//! bytes of the stream verbatim as the pixel payload. It never decompresses:
//! block-compressed payloads are uploaded to the GPU as they are.
//!
//! Supported layouts:
//! - uncompressed 32-bit ARGB (`DDPF_RGB | DDPF_ALPHAPIXELS` with canonical masks)
//! - `DXT1`, `DXT3`, `DXT5` block compression
//! - `DX10` extended header describing a single 2D texture

use std::{
    io::{Read, Seek, SeekFrom},
    sync::Mutex,
};

use thiserror::Error;

/// `"DDS "` little-endian.
pub const MAGIC_DDS: u32 = 0x2053_4444;
const MAGIC_DXT1: u32 = 0x3154_5844;
const MAGIC_DXT3: u32 = 0x3354_5844;
const MAGIC_DXT5: u32 = 0x3554_5844;
const MAGIC_DX10: u32 = 0x3031_5844;

const HEADER_LEN: usize = 128;
const HEADER_SIZE: u32 = 124;
const PIXEL_FORMAT_SIZE: u32 = 32;
const DX10_HEADER_LEN: usize = 20;

const DDSD_CAPS: u32 = 0x1;
const DDSD_HEIGHT: u32 = 0x2;
const DDSD_WIDTH: u32 = 0x4;
const DDSD_PITCH: u32 = 0x8;
const DDSD_REQUIRED: u32 = DDSD_CAPS | DDSD_HEIGHT | DDSD_WIDTH;

const DDPF_ALPHAPIXELS: u32 = 0x1;
const DDPF_FOURCC: u32 = 0x4;
const DDPF_RGB: u32 = 0x40;

const DIMENSION_TEXTURE2D: u32 = 3;

// Header reads share one buffer; the lock keeps concurrent decodes from
// observing each other's bytes.
static SCRATCH: Mutex<[u8; HEADER_LEN]> = Mutex::new([0; HEADER_LEN]);

#[derive(Debug, Error)]
pub enum FormatError {
    #[error("not a DDS container (magic {0:#010x})")]
    BadMagic(u32),
    #[error("unexpected header size {0}, expected 124")]
    BadHeaderSize(u32),
    #[error("header flags {0:#x} lack caps/height/width")]
    MissingRequiredFlags(u32),
    #[error("unexpected pixel format size {0}, expected 32")]
    BadPixelFormatSize(u32),
    #[error("RGB pixel format without alpha channel")]
    MissingAlpha,
    #[error("unsupported channel masks r={r:#010x} g={g:#010x} b={b:#010x} a={a:#010x}")]
    UnsupportedMasks { r: u32, g: u32, b: u32, a: u32 },
    #[error("unsupported four-character code {0:#010x}")]
    UnsupportedFourCc(u32),
    #[error("pixel format flags {0:#x} select neither RGB nor a four-character code")]
    NoPixelFormat(u32),
    #[error("extended header describes resource dimension {0}, expected a 2D texture")]
    BadResourceDimension(u32),
    #[error("extended header array size {0}, expected 1")]
    BadArraySize(u32),
    #[error("truncated DDS stream: {0}")]
    Io(#[from] std::io::Error),
}

/// The GPU format a container decodes to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TargetFormat {
    /// 8 bits per channel, four channels.
    Rgba8,
    /// `DXT1`
    Bc1,
    /// `DXT3`
    Bc2,
    /// `DXT5`
    Bc3,
    /// Any `DX10` container.
    Bc4,
}

impl TargetFormat {
    pub fn is_block_compressed(self) -> bool {
        !matches!(self, TargetFormat::Rgba8)
    }

    /// Bytes per 4x4 block for compressed formats, per pixel otherwise.
    pub fn block_bytes(self) -> u32 {
        match self {
            TargetFormat::Rgba8 => 4,
            TargetFormat::Bc1 | TargetFormat::Bc4 => 8,
            TargetFormat::Bc2 | TargetFormat::Bc3 => 16,
        }
    }

    pub fn to_wgpu(self) -> wgpu::TextureFormat {
        match self {
            TargetFormat::Rgba8 => wgpu::TextureFormat::Rgba8Unorm,
            TargetFormat::Bc1 => wgpu::TextureFormat::Bc1RgbaUnorm,
            TargetFormat::Bc2 => wgpu::TextureFormat::Bc2RgbaUnorm,
            TargetFormat::Bc3 => wgpu::TextureFormat::Bc3RgbaUnorm,
            TargetFormat::Bc4 => wgpu::TextureFormat::Bc4RUnorm,
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct PixelFormat {
    pub size: u32,
    pub flags: u32,
    pub four_cc: u32,
    pub rgb_bit_count: u32,
    pub r_bit_mask: u32,
    pub g_bit_mask: u32,
    pub b_bit_mask: u32,
    pub a_bit_mask: u32,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct DdsHeader {
    pub magic: u32,
    pub size: u32,
    pub flags: u32,
    pub height: u32,
    pub width: u32,
    pub pitch_or_linear_size: u32,
    pub depth: u32,
    pub mip_map_count: u32,
    pub pixel_format: PixelFormat,
    pub caps: [u32; 4],
}

#[derive(Clone, Copy, Debug, Default)]
pub struct HeaderDx10 {
    pub dxgi_format: u32,
    pub resource_dimension: u32,
    pub misc_flag: u32,
    pub array_size: u32,
    pub misc_flags2: u32,
}

/// A validated container, ready for upload. Owned by the caller.
#[derive(Clone, Debug)]
pub struct DecodedTexture {
    pub width: u32,
    pub height: u32,
    pub format: TargetFormat,
    /// Bytes per row (per block row for compressed formats).
    pub pitch: u32,
    pub data: Vec<u8>,
}

impl DecodedTexture {
    /// Uncompressed payloads are stored B, G, R, A in memory but uploaded as
    /// RGBA, so shaders have to swap red and blue.
    pub fn swap_rb(&self) -> bool {
        self.format == TargetFormat::Rgba8
    }
}

fn u32_at(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

fn read_header<R: Read>(reader: &mut R) -> Result<DdsHeader, FormatError> {
    let mut buf = SCRATCH.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    reader.read_exact(&mut buf[..HEADER_LEN])?;
    let b = &buf[..];
    let mut caps = [0; 4];
    for (i, cap) in caps.iter_mut().enumerate() {
        *cap = u32_at(b, 108 + i * 4);
    }
    Ok(DdsHeader {
        magic: u32_at(b, 0),
        size: u32_at(b, 4),
        flags: u32_at(b, 8),
        height: u32_at(b, 12),
        width: u32_at(b, 16),
        pitch_or_linear_size: u32_at(b, 20),
        depth: u32_at(b, 24),
        mip_map_count: u32_at(b, 28),
        // 44 reserved bytes at 32..76
        pixel_format: PixelFormat {
            size: u32_at(b, 76),
            flags: u32_at(b, 80),
            four_cc: u32_at(b, 84),
            rgb_bit_count: u32_at(b, 88),
            r_bit_mask: u32_at(b, 92),
            g_bit_mask: u32_at(b, 96),
            b_bit_mask: u32_at(b, 100),
            a_bit_mask: u32_at(b, 104),
        },
        caps,
    })
}

fn read_dx10_header<R: Read>(reader: &mut R) -> Result<HeaderDx10, FormatError> {
    let mut buf = SCRATCH.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    reader.read_exact(&mut buf[..DX10_HEADER_LEN])?;
    let b = &buf[..];
    Ok(HeaderDx10 {
        dxgi_format: u32_at(b, 0),
        resource_dimension: u32_at(b, 4),
        misc_flag: u32_at(b, 8),
        array_size: u32_at(b, 12),
        misc_flags2: u32_at(b, 16),
    })
}

/// Returns true if `bytes` start with the DDS magic.
pub fn has_dds_magic(bytes: &[u8]) -> bool {
    bytes.len() >= 4 && u32_at(bytes, 0) == MAGIC_DDS
}

/// Decode a DDS container from the current position of `reader`.
///
/// Everything after the header(s) up to the end of the stream becomes the
/// payload, including any mip chain.
pub fn decode<R: Read + Seek>(reader: &mut R) -> Result<DecodedTexture, FormatError> {
    let header = read_header(reader)?;
    if header.magic != MAGIC_DDS {
        return Err(FormatError::BadMagic(header.magic));
    }
    if header.size != HEADER_SIZE {
        return Err(FormatError::BadHeaderSize(header.size));
    }
    if header.flags & DDSD_REQUIRED != DDSD_REQUIRED {
        return Err(FormatError::MissingRequiredFlags(header.flags));
    }
    let pf = header.pixel_format;
    if pf.size != PIXEL_FORMAT_SIZE {
        return Err(FormatError::BadPixelFormatSize(pf.size));
    }

    let (format, mut pitch) = if pf.flags & DDPF_RGB == DDPF_RGB {
        if pf.flags & DDPF_ALPHAPIXELS != DDPF_ALPHAPIXELS {
            return Err(FormatError::MissingAlpha);
        }
        if pf.a_bit_mask != 0xFF00_0000
            || pf.r_bit_mask != 0x00FF_0000
            || pf.g_bit_mask != 0x0000_FF00
            || pf.b_bit_mask != 0x0000_00FF
        {
            return Err(FormatError::UnsupportedMasks {
                r: pf.r_bit_mask,
                g: pf.g_bit_mask,
                b: pf.b_bit_mask,
                a: pf.a_bit_mask,
            });
        }
        let pitch = (header.width as u64 * pf.rgb_bit_count as u64).div_ceil(8) as u32;
        (TargetFormat::Rgba8, pitch)
    } else if pf.flags & DDPF_FOURCC == DDPF_FOURCC {
        let blocks_wide = header.width.div_ceil(4);
        match pf.four_cc {
            MAGIC_DXT1 => (TargetFormat::Bc1, blocks_wide * 8),
            MAGIC_DXT3 => (TargetFormat::Bc2, blocks_wide * 16),
            MAGIC_DXT5 => (TargetFormat::Bc3, blocks_wide * 16),
            MAGIC_DX10 => {
                let dx10 = read_dx10_header(reader)?;
                if dx10.resource_dimension != DIMENSION_TEXTURE2D {
                    return Err(FormatError::BadResourceDimension(dx10.resource_dimension));
                }
                if dx10.array_size != 1 {
                    return Err(FormatError::BadArraySize(dx10.array_size));
                }
                log::debug!(
                    "DX10 container declares DXGI format {}, decoding as BC4",
                    dx10.dxgi_format
                );
                (TargetFormat::Bc4, blocks_wide * TargetFormat::Bc4.block_bytes())
            }
            other => return Err(FormatError::UnsupportedFourCc(other)),
        }
    } else {
        return Err(FormatError::NoPixelFormat(pf.flags));
    };

    if header.flags & DDSD_PITCH == DDSD_PITCH {
        pitch = header.pitch_or_linear_size;
    }

    let position = reader.stream_position()?;
    let end = reader.seek(SeekFrom::End(0))?;
    reader.seek(SeekFrom::Start(position))?;
    let mut data = vec![0; end.saturating_sub(position) as usize];
    reader.read_exact(&mut data)?;

    Ok(DecodedTexture {
        width: header.width,
        height: header.height,
        format,
        pitch,
        data,
    })
}
