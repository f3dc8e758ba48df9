//! Off-screen preview rendering.

use std::path::Path;

use crate::{config::PreviewConfig, context::Context};

/// Render the model at `path` into a `width` x `height` RGBA image.
///
/// Returns `None` if the model cannot be loaded or no graphics device is
/// available; the reason is logged.
pub fn render_preview(
    path: impl AsRef<Path>,
    width: u32,
    height: u32,
) -> Option<image::RgbaImage> {
    render_preview_with_config(path, width, height, PreviewConfig::default())
}

pub fn render_preview_with_config(
    path: impl AsRef<Path>,
    width: u32,
    height: u32,
    config: PreviewConfig,
) -> Option<image::RgbaImage> {
    if let Err(e) = env_logger::try_init() {
        println!("Warning: Could not initialize logger: {}", e);
    };
    let path = path.as_ref();

    let async_runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            log::error!("could not start the async runtime: {e}");
            return None;
        }
    };
    let result = async_runtime
        .block_on(Context::new_offscreen(path, width, height, config))
        .and_then(|mut ctx| ctx.render_offscreen());
    match result {
        Ok(img) => {
            log::info!("rendered preview of {}", path.display());
            Some(img)
        }
        Err(e) => {
            log::error!("preview of {} failed: {e}", path.display());
            None
        }
    }
}
