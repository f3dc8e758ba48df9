//! Preview settings shared by the interactive and batch sessions.

use std::path::PathBuf;

/// Number of textures in the shared toon bank (`toon00.bmp` ..= `toon10.bmp`).
pub const TOON_BANK_SIZE: usize = 11;

#[derive(Clone, Debug)]
pub struct PreviewConfig {
    /// Applied to every vertex position and to the model bounds.
    pub model_scale: f32,
    /// Vertical field of view in degrees.
    pub fov_degrees: f32,
    /// How much of the view the model should fill; larger moves the camera back.
    pub camera_distance: f32,
    /// Camera lift as a fraction of the model height, interactive view only.
    pub vertical_offset: f32,
    pub z_near: f32,
    pub z_far: f32,
    /// Camera/target movement per key press in the interactive view.
    pub move_speed: f32,
    pub clear_colour: wgpu::Color,
    /// Holds the toon bank and receives interactive captures.
    pub asset_dir: PathBuf,
    /// File name of interactive captures inside `asset_dir`.
    pub capture_file: String,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            model_scale: 0.08,
            fov_degrees: 42.0,
            camera_distance: 0.8,
            vertical_offset: 0.15,
            z_near: 0.1,
            z_far: 10.0,
            move_speed: 0.1,
            clear_colour: wgpu::Color {
                r: 0.0,
                g: 0.0,
                b: 0.0,
                a: 0.3,
            },
            asset_dir: default_asset_dir(),
            capture_file: "image.bmp".to_string(),
        }
    }
}

impl PreviewConfig {
    pub fn toon_bank_path(&self, slot: usize) -> PathBuf {
        self.asset_dir.join(format!("toon{slot:02}.bmp"))
    }

    pub fn capture_path(&self) -> PathBuf {
        self.asset_dir.join(&self.capture_file)
    }
}

/// `assets/` next to the running executable, or `./assets` if that is unknown.
fn default_asset_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join("assets")))
        .filter(|dir| dir.is_dir())
        .unwrap_or_else(|| PathBuf::from("./assets"))
}
