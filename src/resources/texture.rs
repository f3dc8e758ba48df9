use std::{
    collections::HashMap,
    io::Cursor,
    path::{Path, PathBuf},
};

use crate::{
    config::{PreviewConfig, TOON_BANK_SIZE},
    data_structures::{
        dds::{self, DecodedTexture},
        texture,
    },
    resources::LoadError,
};

/// A loaded texture and whether its red and blue channels arrive swapped.
#[derive(Clone, Debug)]
pub struct CachedTexture<T> {
    pub resource: T,
    pub swap_rb: bool,
}

/// Textures keyed by the path the model declares them with.
///
/// Each distinct path is loaded at most once. Paths that failed to load have
/// no entry; the binder resolves those to placeholders.
#[derive(Debug)]
pub struct TextureCache<T> {
    entries: HashMap<String, CachedTexture<T>>,
}

impl<T> Default for TextureCache<T> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<T> TextureCache<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &str) -> Option<&CachedTexture<T>> {
        self.entries.get(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    pub fn insert(&mut self, path: impl Into<String>, texture: CachedTexture<T>) {
        self.entries.insert(path.into(), texture);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Load every declared path that exists on disk and is not cached yet.
    ///
    /// `load` receives the resolved file path and returns `None` when every
    /// decoder failed.
    pub fn load_all<F>(&mut self, model_dir: &Path, paths: &[String], mut load: F)
    where
        F: FnMut(&Path) -> Option<CachedTexture<T>>,
    {
        for path in paths {
            if self.contains(path) {
                continue;
            }
            let full_path = resolve_texture_path(model_dir, path);
            if !full_path.is_file() {
                log::warn!("texture {} not found, using fallback", full_path.display());
                continue;
            }
            match load(&full_path) {
                Some(texture) => self.insert(path.clone(), texture),
                None => log::warn!("texture {} could not be decoded", full_path.display()),
            }
        }
    }
}

/// Join a model-relative texture path, accepting `\` separators.
pub fn resolve_texture_path(model_dir: &Path, declared: &str) -> PathBuf {
    model_dir.join(declared.replace('\\', "/"))
}

/// Try the DDS decoder first and fall back to the generic image decoder.
///
/// The upload closures turn a decode result into the cached resource; an
/// upload error counts as a decode failure of that path.
pub fn decode_with_fallback<T, C, I>(
    bytes: &[u8],
    label: &str,
    upload_container: C,
    upload_image: I,
) -> Option<CachedTexture<T>>
where
    C: FnOnce(&DecodedTexture) -> Result<T, LoadError>,
    I: FnOnce(&image::DynamicImage) -> Result<T, LoadError>,
{
    if dds::has_dds_magic(bytes) {
        let container = dds::decode(&mut Cursor::new(bytes))
            .map_err(LoadError::from)
            .and_then(|decoded| {
                let swap_rb = decoded.swap_rb();
                upload_container(&decoded).map(|resource| CachedTexture { resource, swap_rb })
            });
        match container {
            Ok(texture) => {
                log::debug!("{label}: decoded as DDS");
                return Some(texture);
            }
            Err(e) => log::debug!("{label}: not usable as DDS ({e}), trying generic decoder"),
        }
    }

    match image::load_from_memory(bytes)
        .map_err(LoadError::from)
        .and_then(|img| upload_image(&img))
    {
        Ok(resource) => Some(CachedTexture {
            resource,
            swap_rb: false,
        }),
        Err(e) => {
            log::warn!("{label}: {e}");
            None
        }
    }
}

/// Read and upload a texture file; `None` on any failure.
pub fn load_texture(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    path: &Path,
) -> Option<CachedTexture<texture::Texture>> {
    let label = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) => {
            log::warn!("could not read texture {}: {e}", path.display());
            return None;
        }
    };
    decode_with_fallback(
        &bytes,
        &label,
        |decoded| texture::Texture::from_decoded(device, queue, decoded, &label),
        |img| texture::Texture::from_image(device, queue, img, &label),
    )
}

/// Load the shared toon bank; missing entries stay `None`.
pub fn load_toon_bank(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    config: &PreviewConfig,
) -> Vec<Option<CachedTexture<texture::Texture>>> {
    (0..TOON_BANK_SIZE)
        .map(|slot| {
            let path = config.toon_bank_path(slot);
            if path.is_file() {
                load_texture(device, queue, &path)
            } else {
                log::debug!("toon bank entry {} missing", path.display());
                None
            }
        })
        .collect()
}
