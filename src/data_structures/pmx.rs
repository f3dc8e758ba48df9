//! PMX model parsing.
//!
//! Only the sections needed to draw a static preview are read: header,
//! vertices, the flat face-vertex-index list, texture paths and materials.
//! Everything after the material table (bones, morphs, physics) is ignored.

use std::{
    fs::File,
    io::{BufReader, Read},
    path::Path,
};

use thiserror::Error;

const SIGNATURE: [u8; 4] = *b"PMX ";

#[derive(Debug, Error)]
pub enum PmxError {
    #[error("missing PMX signature")]
    SignatureMismatch,
    #[error("expected 8 header globals, found {0}")]
    MissingGlobals(u8),
    #[error("unknown string encoding {0}")]
    UnknownStringEncoding(u8),
    #[error("unsupported index size {0}")]
    UnknownIndexSize(u8),
    #[error("unknown vertex weight type {0}")]
    UnknownWeightType(u8),
    #[error("unknown sphere mode {0}")]
    UnknownSphereMode(u8),
    #[error("unknown toon reference flag {0}")]
    UnknownToonFlag(u8),
    #[error("negative element count {0}")]
    NegativeCount(i32),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PmxVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

/// How the sphere (environment) texture is composed with the base colour.
#[repr(u32)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SphereMode {
    #[default]
    Disabled = 0,
    Multiply = 1,
    Add = 2,
    SubtractTexture = 3,
}

impl TryFrom<u8> for SphereMode {
    type Error = PmxError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(SphereMode::Disabled),
            1 => Ok(SphereMode::Multiply),
            2 => Ok(SphereMode::Add),
            3 => Ok(SphereMode::SubtractTexture),
            v => Err(PmxError::UnknownSphereMode(v)),
        }
    }
}

/// Where a material takes its toon ramp from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ToonRef {
    /// Slot of the shared toon bank.
    Shared(u8),
    /// Index into the model's texture list, `None` for no texture.
    Texture(Option<usize>),
}

impl Default for ToonRef {
    fn default() -> Self {
        ToonRef::Texture(None)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Material {
    pub name: String,
    pub diffuse: [f32; 4],
    pub specular: [f32; 3],
    pub specularity: f32,
    pub ambient: [f32; 3],
    pub draw_flags: u8,
    pub edge_color: [f32; 4],
    pub edge_size: f32,
    /// `None` is the "no texture" sentinel.
    pub texture_index: Option<usize>,
    pub sphere_texture_index: Option<usize>,
    pub sphere_mode: SphereMode,
    pub toon: ToonRef,
    pub memo: String,
    /// Number of entries of [`PmxModel::face_indices`] owned by this material.
    pub face_count: u32,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            name: String::new(),
            diffuse: [1.0; 4],
            specular: [0.0; 3],
            specularity: 0.0,
            ambient: [0.0; 3],
            draw_flags: 0,
            edge_color: [0.0, 0.0, 0.0, 1.0],
            edge_size: 0.0,
            texture_index: None,
            sphere_texture_index: None,
            sphere_mode: SphereMode::Disabled,
            toon: ToonRef::default(),
            memo: String::new(),
            face_count: 0,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct PmxModel {
    pub version: f32,
    pub name: String,
    pub comment: String,
    pub vertices: Vec<PmxVertex>,
    /// One entry per triangle corner, three per face.
    pub face_indices: Vec<u32>,
    /// Texture paths relative to the model file, as declared.
    pub textures: Vec<String>,
    pub materials: Vec<Material>,
}

#[derive(Clone, Copy, Debug)]
enum Encoding {
    Utf16Le,
    Utf8,
}

#[derive(Clone, Copy, Debug)]
struct Globals {
    encoding: Encoding,
    additional_uvs: u8,
    vertex_index_size: u8,
    texture_index_size: u8,
    bone_index_size: u8,
}

struct PmxReader<R> {
    inner: R,
    globals: Globals,
}

fn check_index_size(size: u8) -> Result<u8, PmxError> {
    match size {
        1 | 2 | 4 => Ok(size),
        s => Err(PmxError::UnknownIndexSize(s)),
    }
}

fn read_u8<R: Read>(r: &mut R) -> Result<u8, PmxError> {
    let mut b = [0; 1];
    r.read_exact(&mut b)?;
    Ok(b[0])
}

fn read_i32<R: Read>(r: &mut R) -> Result<i32, PmxError> {
    let mut b = [0; 4];
    r.read_exact(&mut b)?;
    Ok(i32::from_le_bytes(b))
}

fn read_f32<R: Read>(r: &mut R) -> Result<f32, PmxError> {
    let mut b = [0; 4];
    r.read_exact(&mut b)?;
    Ok(f32::from_le_bytes(b))
}

impl<R: Read> PmxReader<R> {
    fn u8(&mut self) -> Result<u8, PmxError> {
        read_u8(&mut self.inner)
    }

    fn f32(&mut self) -> Result<f32, PmxError> {
        read_f32(&mut self.inner)
    }

    fn vec<const N: usize>(&mut self) -> Result<[f32; N], PmxError> {
        let mut out = [0.0; N];
        for v in out.iter_mut() {
            *v = self.f32()?;
        }
        Ok(out)
    }

    fn count(&mut self) -> Result<usize, PmxError> {
        let n = read_i32(&mut self.inner)?;
        usize::try_from(n).map_err(|_| PmxError::NegativeCount(n))
    }

    fn skip(&mut self, len: usize) -> Result<(), PmxError> {
        let copied = std::io::copy(&mut (&mut self.inner).take(len as u64), &mut std::io::sink())?;
        if copied < len as u64 {
            return Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into());
        }
        Ok(())
    }

    fn text(&mut self) -> Result<String, PmxError> {
        let len = self.count()?;
        // grow with the bytes actually present, not the declared length
        let mut bytes = Vec::new();
        (&mut self.inner).take(len as u64).read_to_end(&mut bytes)?;
        if bytes.len() < len {
            return Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into());
        }
        Ok(decode_text(self.globals.encoding, &bytes))
    }

    /// Texture, material, bone, morph and rigid-body indices: signed, -1 is none.
    fn signed_index(&mut self, size: u8) -> Result<Option<usize>, PmxError> {
        let mut b = [0; 4];
        let value = match size {
            1 => {
                self.inner.read_exact(&mut b[..1])?;
                b[0] as i8 as i64
            }
            2 => {
                self.inner.read_exact(&mut b[..2])?;
                i16::from_le_bytes([b[0], b[1]]) as i64
            }
            _ => {
                self.inner.read_exact(&mut b)?;
                i32::from_le_bytes(b) as i64
            }
        };
        Ok(usize::try_from(value).ok())
    }

    /// Vertex indices are unsigned for sizes 1 and 2.
    fn vertex_index(&mut self) -> Result<u32, PmxError> {
        let mut b = [0; 4];
        Ok(match self.globals.vertex_index_size {
            1 => {
                self.inner.read_exact(&mut b[..1])?;
                b[0] as u32
            }
            2 => {
                self.inner.read_exact(&mut b[..2])?;
                u16::from_le_bytes([b[0], b[1]]) as u32
            }
            _ => {
                self.inner.read_exact(&mut b)?;
                i32::from_le_bytes(b) as u32
            }
        })
    }

    fn vertex(&mut self) -> Result<PmxVertex, PmxError> {
        let position = self.vec::<3>()?;
        let normal = self.vec::<3>()?;
        let uv = self.vec::<2>()?;
        self.skip(16 * self.globals.additional_uvs as usize)?;
        let bone = self.globals.bone_index_size as usize;
        let weights = match self.u8()? {
            // BDEF1
            0 => bone,
            // BDEF2
            1 => 2 * bone + 4,
            // BDEF4, QDEF
            2 | 4 => 4 * bone + 16,
            // SDEF
            3 => 2 * bone + 4 + 36,
            t => return Err(PmxError::UnknownWeightType(t)),
        };
        // weights followed by the edge scale
        self.skip(weights + 4)?;
        Ok(PmxVertex {
            position,
            normal,
            uv,
        })
    }

    fn material(&mut self) -> Result<Material, PmxError> {
        let name = self.text()?;
        let _name_en = self.text()?;
        let diffuse = self.vec::<4>()?;
        let specular = self.vec::<3>()?;
        let specularity = self.f32()?;
        let ambient = self.vec::<3>()?;
        let draw_flags = self.u8()?;
        let edge_color = self.vec::<4>()?;
        let edge_size = self.f32()?;
        let tex = self.globals.texture_index_size;
        let texture_index = self.signed_index(tex)?;
        let sphere_texture_index = self.signed_index(tex)?;
        let sphere_mode = SphereMode::try_from(self.u8()?)?;
        let toon = match self.u8()? {
            0 => ToonRef::Texture(self.signed_index(tex)?),
            1 => ToonRef::Shared(self.u8()?),
            f => return Err(PmxError::UnknownToonFlag(f)),
        };
        let memo = self.text()?;
        let face_count = self.count()? as u32;
        Ok(Material {
            name,
            diffuse,
            specular,
            specularity,
            ambient,
            draw_flags,
            edge_color,
            edge_size,
            texture_index,
            sphere_texture_index,
            sphere_mode,
            toon,
            memo,
            face_count,
        })
    }
}

fn decode_text(encoding: Encoding, bytes: &[u8]) -> String {
    match encoding {
        Encoding::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
        Encoding::Utf16Le => {
            let units: Vec<u16> = bytes
                .chunks_exact(2)
                .map(|c| u16::from_le_bytes([c[0], c[1]]))
                .collect();
            String::from_utf16_lossy(&units)
        }
    }
}

impl PmxModel {
    /// Parse the model file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PmxError> {
        let file = File::open(path)?;
        Self::read(&mut BufReader::new(file))
    }

    pub fn read<R: Read>(reader: &mut R) -> Result<Self, PmxError> {
        let mut signature = [0; 4];
        reader.read_exact(&mut signature)?;
        if signature != SIGNATURE {
            return Err(PmxError::SignatureMismatch);
        }
        let version = read_f32(reader)?;
        let globals_count = read_u8(reader)?;
        if globals_count != 8 {
            return Err(PmxError::MissingGlobals(globals_count));
        }
        let mut g = [0; 8];
        reader.read_exact(&mut g)?;
        let encoding = match g[0] {
            0 => Encoding::Utf16Le,
            1 => Encoding::Utf8,
            v => return Err(PmxError::UnknownStringEncoding(v)),
        };
        let globals = Globals {
            encoding,
            additional_uvs: g[1],
            vertex_index_size: check_index_size(g[2])?,
            texture_index_size: check_index_size(g[3])?,
            bone_index_size: check_index_size(g[5])?,
        };
        // material, morph and rigid-body index sizes are not needed past the
        // material table but must still be valid
        for size in [g[4], g[6], g[7]] {
            check_index_size(size)?;
        }

        let mut r = PmxReader {
            inner: reader,
            globals,
        };
        let name = r.text()?;
        let _name_en = r.text()?;
        let comment = r.text()?;
        let _comment_en = r.text()?;

        let vertex_count = r.count()?;
        let vertices = (0..vertex_count)
            .map(|_| r.vertex())
            .collect::<Result<Vec<_>, _>>()?;

        let index_count = r.count()?;
        let face_indices = (0..index_count)
            .map(|_| r.vertex_index())
            .collect::<Result<Vec<_>, _>>()?;

        let texture_count = r.count()?;
        let textures = (0..texture_count)
            .map(|_| r.text())
            .collect::<Result<Vec<_>, _>>()?;

        let material_count = r.count()?;
        let materials = (0..material_count)
            .map(|_| r.material())
            .collect::<Result<Vec<_>, _>>()?;

        log::debug!(
            "parsed PMX {version} '{name}': {} vertices, {} indices, {} textures, {} materials",
            vertices.len(),
            face_indices.len(),
            textures.len(),
            materials.len()
        );

        Ok(PmxModel {
            version,
            name,
            comment,
            vertices,
            face_indices,
            textures,
            materials,
        })
    }
}
