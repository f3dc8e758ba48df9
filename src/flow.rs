//! The interactive preview window and its event loop.
//!
//! The window session moves through three phases:
//! 1. `Initializing` creates the window and sets up the [`Context`]
//! 2. `FrameLoop` draws a frame on every redraw request
//! 3. `Disposed` is entered when the window is closed; the context is dropped
//!
//! Input only updates session state (pending resize, camera, capture request).
//! That state is consumed at fixed points of the next frame: a pending resize
//! is applied before anything is drawn, a capture is read after presenting.

use std::{
    iter,
    path::{Path, PathBuf},
    sync::Arc,
};

use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::{ElementState, KeyEvent, WindowEvent},
    event_loop::{ActiveEventLoop, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::Window,
};

use crate::{
    camera::{Movement, Subject},
    capture::PendingCapture,
    config::PreviewConfig,
    context::{Context, RenderError, RenderTarget},
};

/// What a key press asks the session to do.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyAction {
    Move(Subject, Movement),
    Capture,
}

/// W/S/A/D/Q/E move the camera, I/K/J/L/U/O the target, Enter captures.
pub fn key_action(code: KeyCode) -> Option<KeyAction> {
    use KeyAction::{Capture, Move};
    use Movement::*;
    use Subject::{Camera, Target};
    let action = match code {
        KeyCode::KeyW => Move(Camera, Forward),
        KeyCode::KeyS => Move(Camera, Backward),
        KeyCode::KeyA => Move(Camera, Left),
        KeyCode::KeyD => Move(Camera, Right),
        KeyCode::KeyQ => Move(Camera, Up),
        KeyCode::KeyE => Move(Camera, Down),
        KeyCode::KeyI => Move(Target, Forward),
        KeyCode::KeyK => Move(Target, Backward),
        KeyCode::KeyJ => Move(Target, Left),
        KeyCode::KeyL => Move(Target, Right),
        KeyCode::KeyU => Move(Target, Up),
        KeyCode::KeyO => Move(Target, Down),
        KeyCode::Enter | KeyCode::NumpadEnter => Capture,
        _ => return None,
    };
    Some(action)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Initializing,
    FrameLoop,
    Disposed,
}

/// Session state mutated by input between frames.
#[derive(Debug)]
pub struct AppState {
    pub(crate) ctx: Context,
    pending_resize: Option<PhysicalSize<u32>>,
    capture_requested: bool,
}

impl AppState {
    fn new(ctx: Context) -> Self {
        Self {
            ctx,
            pending_resize: None,
            capture_requested: false,
        }
    }

    fn window(&self) -> Option<&Arc<Window>> {
        match &self.ctx.target {
            RenderTarget::Window { window, .. } => Some(window),
            RenderTarget::Offscreen { .. } => None,
        }
    }

    fn handle_key(&mut self, action: KeyAction) {
        match action {
            KeyAction::Move(subject, movement) => {
                let step = self.ctx.config.move_speed;
                self.ctx.camera.camera.apply(subject, movement, step);
            }
            KeyAction::Capture => self.capture_requested = true,
        }
    }

    fn render(&mut self) -> Result<(), RenderError> {
        if let Some(size) = self.pending_resize.take() {
            self.ctx.resize(size.width, size.height);
        }
        self.ctx.update_camera();

        let RenderTarget::Window {
            surface, copyable, ..
        } = &self.ctx.target
        else {
            return Ok(());
        };
        let output = surface.get_current_texture()?;
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = self
            .ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Render Encoder"),
            });
        self.ctx.encode_frame(&mut encoder, &view);

        let capture = if std::mem::take(&mut self.capture_requested) {
            if *copyable {
                Some(PendingCapture::record(
                    &self.ctx.device,
                    &mut encoder,
                    &output.texture,
                )?)
            } else {
                log::error!("{}", RenderError::SurfaceNotCopyable);
                None
            }
        } else {
            None
        };

        self.ctx.queue.submit(iter::once(encoder.finish()));
        output.present();

        if let Some(capture) = capture {
            let path = self.ctx.config.capture_path();
            match capture.read(&self.ctx.device) {
                Ok(img) => match img.save_with_format(&path, image::ImageFormat::Bmp) {
                    Ok(()) => log::info!("captured frame to {}", path.display()),
                    Err(e) => log::error!("could not write {}: {e}", path.display()),
                },
                Err(e) => log::error!("capture failed: {e}"),
            }
        }
        Ok(())
    }
}

pub struct App {
    async_runtime: tokio::runtime::Runtime,
    model_path: PathBuf,
    size: PhysicalSize<u32>,
    config: PreviewConfig,
    phase: Phase,
    state: Option<AppState>,
    error: Option<anyhow::Error>,
}

impl App {
    fn new(
        async_runtime: tokio::runtime::Runtime,
        model_path: &Path,
        width: u32,
        height: u32,
        config: PreviewConfig,
    ) -> Self {
        Self {
            async_runtime,
            model_path: model_path.to_path_buf(),
            size: PhysicalSize::new(width, height),
            config,
            phase: Phase::Initializing,
            state: None,
            error: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    fn dispose(&mut self, event_loop: &ActiveEventLoop) {
        self.phase = Phase::Disposed;
        // drops every session resource before the loop returns
        self.state = None;
        event_loop.exit();
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.phase != Phase::Initializing || self.state.is_some() {
            return;
        }
        let title = self
            .model_path
            .file_name()
            .map(|name| format!("PMX preview - {}", name.to_string_lossy()))
            .unwrap_or_else(|| "PMX preview".to_string());
        let window_attributes = Window::default_attributes()
            .with_title(title)
            .with_inner_size(self.size);
        let window = match event_loop.create_window(window_attributes) {
            Ok(window) => Arc::new(window),
            Err(e) => {
                log::error!("could not open the preview window: {e}");
                self.error = Some(e.into());
                self.dispose(event_loop);
                return;
            }
        };

        let init = Context::new_window(window, &self.model_path, self.config.clone());
        match self.async_runtime.block_on(init) {
            Ok(ctx) => {
                let state = AppState::new(ctx);
                if let Some(window) = state.window() {
                    window.request_redraw();
                }
                self.state = Some(state);
                self.phase = Phase::FrameLoop;
            }
            Err(e) => {
                log::error!("preview session failed to start: {e}");
                self.error = Some(e.into());
                self.dispose(event_loop);
            }
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        let state = match &mut self.state {
            Some(state) => state,
            None => return,
        };

        match event {
            WindowEvent::CloseRequested => self.dispose(event_loop),
            WindowEvent::Resized(size) => {
                state.pending_resize = Some(size);
                if let Some(window) = state.window() {
                    window.request_redraw();
                }
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(code),
                        state: ElementState::Pressed,
                        ..
                    },
                ..
            } => {
                if let Some(action) = key_action(code) {
                    state.handle_key(action);
                    if let Some(window) = state.window() {
                        window.request_redraw();
                    }
                }
            }
            WindowEvent::RedrawRequested => {
                match state.render() {
                    Ok(()) => {}
                    // Reconfigure the surface if it's lost or outdated
                    Err(RenderError::Surface(
                        wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated,
                    )) => {
                        let size = state.window().map(|window| window.inner_size());
                        if size.is_some() {
                            state.pending_resize = size;
                        }
                    }
                    Err(e) => log::error!("Unable to render {e}"),
                }
                if let Some(window) = state.window() {
                    window.request_redraw();
                }
            }
            _ => {}
        }
    }
}

/// Open a preview window for the model at `path` and run until it is closed.
pub fn run_window(path: impl AsRef<Path>, width: u32, height: u32) -> anyhow::Result<()> {
    run_window_with_config(path, width, height, PreviewConfig::default())
}

pub fn run_window_with_config(
    path: impl AsRef<Path>,
    width: u32,
    height: u32,
    config: PreviewConfig,
) -> anyhow::Result<()> {
    if let Err(e) = env_logger::try_init() {
        println!("Warning: Could not initialize logger: {}", e);
    };

    let event_loop = EventLoop::new()?;
    let async_runtime = tokio::runtime::Runtime::new()?;
    let mut app = App::new(async_runtime, path.as_ref(), width, height, config);
    event_loop.run_app(&mut app)?;

    match app.error.take() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn camera_and_target_keys_mirror_each_other() {
        let pairs = [
            (KeyCode::KeyW, KeyCode::KeyI, Movement::Forward),
            (KeyCode::KeyS, KeyCode::KeyK, Movement::Backward),
            (KeyCode::KeyA, KeyCode::KeyJ, Movement::Left),
            (KeyCode::KeyD, KeyCode::KeyL, Movement::Right),
            (KeyCode::KeyQ, KeyCode::KeyU, Movement::Up),
            (KeyCode::KeyE, KeyCode::KeyO, Movement::Down),
        ];
        for (camera_key, target_key, movement) in pairs {
            assert_eq!(
                key_action(camera_key),
                Some(KeyAction::Move(Subject::Camera, movement))
            );
            assert_eq!(
                key_action(target_key),
                Some(KeyAction::Move(Subject::Target, movement))
            );
        }
    }

    #[test]
    fn enter_requests_a_capture() {
        assert_eq!(key_action(KeyCode::Enter), Some(KeyAction::Capture));
        assert_eq!(key_action(KeyCode::NumpadEnter), Some(KeyAction::Capture));
        assert_eq!(key_action(KeyCode::Space), None);
    }
}
