//! Material to texture-slot resolution.
//!
//! [`resolve`] decides what every material binds to its diffuse, sphere and
//! toon slots. It only looks at the material and the already loaded textures,
//! so every fallback rule can be tested without a GPU.

use crate::{
    data_structures::pmx::{Material, SphereMode, ToonRef},
    resources::{CachedTexture, TextureCache},
};

/// Shared toon slot that has a bank texture of its own.
pub const SHARED_TOON_SLOT: u8 = 1;

/// Bank entry bound for [`SHARED_TOON_SLOT`]; the bank is offset by one.
pub const SHARED_TOON_BANK_ENTRY: usize = SHARED_TOON_SLOT as usize + 1;

/// 1x1 textures bound where a material has nothing usable.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Placeholder {
    White,
    Black,
}

impl Placeholder {
    pub fn rgba(self) -> [u8; 4] {
        match self {
            Placeholder::White => [255, 255, 255, 255],
            Placeholder::Black => [0, 0, 0, 255],
        }
    }
}

/// What a single texture slot ends up bound to.
#[derive(Debug, PartialEq)]
pub enum Binding<'a, T> {
    Bound { resource: &'a T, swap_rb: bool },
    Placeholder(Placeholder),
}

// Derived Clone/Copy would require `T: Clone`.
impl<T> Clone for Binding<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<T> Copy for Binding<'_, T> {}

impl<'a, T> Binding<'a, T> {
    fn cached(texture: &'a CachedTexture<T>) -> Self {
        Binding::Bound {
            resource: &texture.resource,
            swap_rb: texture.swap_rb,
        }
    }

    /// The channel-swap flag the shader sees for this slot.
    pub fn swap_rb(&self) -> bool {
        match self {
            Binding::Bound { swap_rb, .. } => *swap_rb,
            Binding::Placeholder(_) => false,
        }
    }
}

#[derive(Debug, PartialEq)]
pub struct MaterialBindings<'a, T> {
    pub diffuse: Binding<'a, T>,
    pub sphere: Binding<'a, T>,
    pub sphere_mode: SphereMode,
    pub toon: Binding<'a, T>,
}

impl<T> MaterialBindings<'_, T> {
    /// Swap flags in slot order: diffuse, sphere, toon, unused.
    pub fn swap_flags(&self) -> [u32; 4] {
        [
            self.diffuse.swap_rb() as u32,
            self.sphere.swap_rb() as u32,
            self.toon.swap_rb() as u32,
            0,
        ]
    }
}

fn lookup<'a, T>(
    index: Option<usize>,
    texture_paths: &[String],
    cache: &'a TextureCache<T>,
) -> Option<&'a CachedTexture<T>> {
    let path = texture_paths.get(index?)?;
    cache.get(path)
}

/// Pick the texture for every slot of `material`.
///
/// `texture_paths` is the model's declared texture list, `toon_bank` the
/// shared toon textures indexed by bank entry. Never fails: every slot falls
/// back to a placeholder.
pub fn resolve<'a, T>(
    material: &Material,
    texture_paths: &[String],
    cache: &'a TextureCache<T>,
    toon_bank: &'a [Option<CachedTexture<T>>],
) -> MaterialBindings<'a, T> {
    let diffuse = lookup(material.texture_index, texture_paths, cache)
        .map(Binding::cached)
        .unwrap_or(Binding::Placeholder(Placeholder::White));

    let (sphere, sphere_mode) = match material.sphere_texture_index {
        None => (Binding::Placeholder(Placeholder::Black), SphereMode::Disabled),
        Some(index) => {
            let binding = match lookup(Some(index), texture_paths, cache) {
                Some(texture) => Binding::cached(texture),
                None if material.sphere_mode == SphereMode::Multiply => {
                    Binding::Placeholder(Placeholder::White)
                }
                None => Binding::Placeholder(Placeholder::Black),
            };
            (binding, material.sphere_mode)
        }
    };

    let toon = match material.toon {
        ToonRef::Shared(SHARED_TOON_SLOT) => toon_bank
            .get(SHARED_TOON_BANK_ENTRY)
            .and_then(Option::as_ref)
            .map(Binding::cached),
        ToonRef::Shared(_) => None,
        ToonRef::Texture(index) => lookup(index, texture_paths, cache).map(Binding::cached),
    }
    .unwrap_or(Binding::Placeholder(Placeholder::White));

    MaterialBindings {
        diffuse,
        sphere,
        sphere_mode,
        toon,
    }
}
