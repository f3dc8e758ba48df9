//! Byte-level builders for the file formats the tests feed the loader.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

/// A 128-byte DDS header for an uncompressed ARGB8 image.
pub(crate) fn argb8_dds_header(width: u32, height: u32) -> Vec<u8> {
    let mut words = [0u32; 32];
    words[0] = pmx_preview::data_structures::dds::MAGIC_DDS;
    words[1] = 124;
    // caps | height | width
    words[2] = 0x7;
    words[3] = height;
    words[4] = width;
    words[19] = 32;
    // rgb | alpha present
    words[20] = 0x40 | 0x1;
    words[22] = 32;
    words[23] = 0x00FF_0000;
    words[24] = 0x0000_FF00;
    words[25] = 0x0000_00FF;
    words[26] = 0xFF00_0000;
    words.iter().flat_map(|w| w.to_le_bytes()).collect()
}

/// A complete ARGB8 DDS file filled with one BGRA pixel value.
pub(crate) fn argb8_dds(width: u32, height: u32, bgra: [u8; 4]) -> Vec<u8> {
    let mut bytes = argb8_dds_header(width, height);
    for _ in 0..width * height {
        bytes.extend_from_slice(&bgra);
    }
    bytes
}

pub(crate) enum Toon {
    Shared(u8),
    Texture(i8),
}

pub(crate) struct TestMaterial {
    pub(crate) texture: i8,
    pub(crate) sphere: i8,
    pub(crate) sphere_mode: u8,
    pub(crate) toon: Toon,
    pub(crate) face_count: i32,
}

impl TestMaterial {
    pub(crate) fn untextured(face_count: i32) -> Self {
        Self {
            texture: -1,
            sphere: -1,
            sphere_mode: 0,
            toon: Toon::Texture(-1),
            face_count,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum TextEncoding {
    Utf16Le,
    Utf8,
}

/// Vertex skinning payload written for every vertex.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Weights {
    Bdef1,
    Bdef2,
    Bdef4,
    Sdef,
    Qdef,
}

/// Writes PMX 2.0 files.
///
/// Defaults to UTF-8 text, no additional UVs, 2-byte vertex indices,
/// 1-byte indices for everything else and BDEF1 skinning.
pub(crate) struct PmxBuilder {
    encoding: TextEncoding,
    additional_uvs: u8,
    vertex_index_size: u8,
    bone_index_size: u8,
    weights: Weights,
    name: String,
    vertices: Vec<([f32; 3], [f32; 2])>,
    indices: Vec<u32>,
    textures: Vec<String>,
    materials: Vec<TestMaterial>,
}

impl Default for PmxBuilder {
    fn default() -> Self {
        Self {
            encoding: TextEncoding::Utf8,
            additional_uvs: 0,
            vertex_index_size: 2,
            bone_index_size: 1,
            weights: Weights::Bdef1,
            name: "test model".to_string(),
            vertices: Vec::new(),
            indices: Vec::new(),
            textures: Vec::new(),
            materials: Vec::new(),
        }
    }
}

fn sized_index(out: &mut Vec<u8>, size: u8, value: i64) {
    match size {
        1 => out.push(value as u8),
        2 => out.extend_from_slice(&(value as u16).to_le_bytes()),
        _ => out.extend_from_slice(&(value as i32).to_le_bytes()),
    }
}

fn floats(out: &mut Vec<u8>, values: &[f32]) {
    for v in values {
        out.extend_from_slice(&v.to_le_bytes());
    }
}

impl PmxBuilder {
    pub(crate) fn encoding(mut self, encoding: TextEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub(crate) fn additional_uvs(mut self, count: u8) -> Self {
        self.additional_uvs = count;
        self
    }

    pub(crate) fn vertex_index_size(mut self, size: u8) -> Self {
        self.vertex_index_size = size;
        self
    }

    pub(crate) fn bone_index_size(mut self, size: u8) -> Self {
        self.bone_index_size = size;
        self
    }

    pub(crate) fn weights(mut self, weights: Weights) -> Self {
        self.weights = weights;
        self
    }

    pub(crate) fn name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub(crate) fn vertex(mut self, position: [f32; 3], uv: [f32; 2]) -> Self {
        self.vertices.push((position, uv));
        self
    }

    pub(crate) fn faces(mut self, indices: &[u32]) -> Self {
        self.indices.extend_from_slice(indices);
        self
    }

    pub(crate) fn texture(mut self, path: &str) -> Self {
        self.textures.push(path.to_string());
        self
    }

    pub(crate) fn material(mut self, material: TestMaterial) -> Self {
        self.materials.push(material);
        self
    }

    fn text(&self, out: &mut Vec<u8>, s: &str) {
        let bytes: Vec<u8> = match self.encoding {
            TextEncoding::Utf8 => s.as_bytes().to_vec(),
            TextEncoding::Utf16Le => s.encode_utf16().flat_map(|u| u.to_le_bytes()).collect(),
        };
        out.extend_from_slice(&(bytes.len() as i32).to_le_bytes());
        out.extend_from_slice(&bytes);
    }

    fn bones(&self, out: &mut Vec<u8>, count: usize) {
        for bone in 0..count {
            sized_index(out, self.bone_index_size, bone as i64);
        }
    }

    fn skinning(&self, out: &mut Vec<u8>) {
        match self.weights {
            Weights::Bdef1 => {
                out.push(0);
                self.bones(out, 1);
            }
            Weights::Bdef2 => {
                out.push(1);
                self.bones(out, 2);
                floats(out, &[0.5]);
            }
            Weights::Bdef4 | Weights::Qdef => {
                out.push(if self.weights == Weights::Bdef4 { 2 } else { 4 });
                self.bones(out, 4);
                floats(out, &[0.25; 4]);
            }
            Weights::Sdef => {
                out.push(3);
                self.bones(out, 2);
                floats(out, &[0.5]);
                // C, R0, R1
                floats(out, &[9.0; 9]);
            }
        }
    }

    pub(crate) fn build(&self) -> Vec<u8> {
        let mut out = b"PMX ".to_vec();
        floats(&mut out, &[2.0]);
        out.push(8);
        let encoding = match self.encoding {
            TextEncoding::Utf16Le => 0,
            TextEncoding::Utf8 => 1,
        };
        // vertex/texture/material/bone/morph/rigid index sizes
        out.extend_from_slice(&[
            encoding,
            self.additional_uvs,
            self.vertex_index_size,
            1,
            1,
            self.bone_index_size,
            1,
            1,
        ]);
        self.text(&mut out, &self.name);
        self.text(&mut out, "");
        self.text(&mut out, "built by the test suite");
        self.text(&mut out, "");

        out.extend_from_slice(&(self.vertices.len() as i32).to_le_bytes());
        for (position, uv) in &self.vertices {
            floats(&mut out, position);
            floats(&mut out, &[0.0, 0.0, -1.0]);
            floats(&mut out, uv);
            for _ in 0..self.additional_uvs {
                floats(&mut out, &[7.0; 4]);
            }
            self.skinning(&mut out);
            // edge scale
            floats(&mut out, &[1.0]);
        }

        out.extend_from_slice(&(self.indices.len() as i32).to_le_bytes());
        for index in &self.indices {
            sized_index(&mut out, self.vertex_index_size, *index as i64);
        }

        out.extend_from_slice(&(self.textures.len() as i32).to_le_bytes());
        for path in &self.textures {
            self.text(&mut out, path);
        }

        out.extend_from_slice(&(self.materials.len() as i32).to_le_bytes());
        for (i, m) in self.materials.iter().enumerate() {
            self.text(&mut out, &format!("material {i}"));
            self.text(&mut out, "");
            floats(&mut out, &[1.0, 1.0, 1.0, 1.0]);
            floats(&mut out, &[0.0, 0.0, 0.0, 5.0]);
            floats(&mut out, &[0.2, 0.2, 0.2]);
            out.push(0);
            floats(&mut out, &[0.0, 0.0, 0.0, 1.0, 1.0]);
            out.push(m.texture as u8);
            out.push(m.sphere as u8);
            out.push(m.sphere_mode);
            match m.toon {
                Toon::Shared(slot) => out.extend_from_slice(&[1, slot]),
                Toon::Texture(index) => out.extend_from_slice(&[0, index as u8]),
            }
            self.text(&mut out, "");
            out.extend_from_slice(&m.face_count.to_le_bytes());
        }
        out
    }

    pub(crate) fn write(&self, path: &Path) {
        std::fs::write(path, self.build()).unwrap();
    }
}

/// A fresh directory under the system temp dir, removed on drop.
pub(crate) struct ScratchDir(PathBuf);

impl ScratchDir {
    pub(crate) fn new(name: &str) -> Self {
        let dir = std::env::temp_dir().join(format!(
            "pmx-preview-it-{}-{name}",
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        Self(dir)
    }

    pub(crate) fn path(&self) -> &Path {
        &self.0
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.0);
    }
}
