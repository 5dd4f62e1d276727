//! Windowed runner: one [`Runtime`] on a [`WgpuBackend`] driven by winit.
//!
//! Drag with the left mouse button to orbit, scroll to zoom, space to pause,
//! `R` to respawn, escape to quit.

use std::sync::Arc;

use winit::{
    application::ApplicationHandler,
    event::{ElementState, MouseButton, MouseScrollDelta, WindowEvent},
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    keyboard::{Key, NamedKey},
    window::{Window, WindowId},
};

use crate::config::SimConfig;
use crate::error::{AppError, PipelineError};
use crate::gpu::WgpuBackend;
use crate::lifecycle::Runtime;
use crate::mesh::Assets;
use crate::time::FrameClock;

const FPS_LOG_INTERVAL: u64 = 600;

/// Open a window and run `config` until it is closed.
pub fn run(config: SimConfig, assets: Assets) -> Result<(), AppError> {
    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(config, assets);
    event_loop.run_app(&mut app)?;

    match app.error.take() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

struct App {
    window: Option<Arc<Window>>,
    runtime: Option<Runtime<WgpuBackend>>,
    config: SimConfig,
    assets: Assets,
    clock: FrameClock,
    mouse_pressed: bool,
    last_mouse_pos: Option<(f64, f64)>,
    error: Option<AppError>,
}

impl App {
    fn new(config: SimConfig, assets: Assets) -> Self {
        Self {
            window: None,
            runtime: None,
            config: config.clamped(),
            assets,
            clock: FrameClock::new(),
            mouse_pressed: false,
            last_mouse_pos: None,
            error: None,
        }
    }

    fn start(&mut self, event_loop: &ActiveEventLoop) -> Result<(), AppError> {
        let window_attrs = Window::default_attributes()
            .with_title("SigLines")
            .with_inner_size(winit::dpi::LogicalSize::new(1280, 720));
        let window = Arc::new(event_loop.create_window(window_attrs)?);

        let backend = pollster::block_on(WgpuBackend::new(
            window.clone(),
            self.config.bounding_sphere_radius,
        ))?;
        let mut runtime = Runtime::new(backend);
        runtime.start(self.config.clone(), &self.assets)?;

        self.window = Some(window);
        self.runtime = Some(runtime);
        Ok(())
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, error: AppError) {
        log::error!("{}", error);
        self.error = Some(error);
        event_loop.exit();
    }

    fn redraw(&mut self, event_loop: &ActiveEventLoop) {
        let delta_time = self.clock.tick();
        let Some(runtime) = self.runtime.as_mut() else {
            return;
        };

        match runtime.tick(delta_time) {
            Ok(()) => {}
            Err(PipelineError::Surface(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated)) => {
                runtime.backend_mut().reconfigure_surface();
            }
            Err(PipelineError::Surface(wgpu::SurfaceError::Timeout)) => {
                log::debug!("Frame timed out");
            }
            Err(e) => {
                self.fail(event_loop, e.into());
                return;
            }
        }

        if self.clock.frame() % FPS_LOG_INTERVAL == 0 {
            log::debug!(
                "{:.1} fps, {} draws culled",
                self.clock.fps(),
                runtime.backend().culled_draws()
            );
        }
    }

    /// Respawn every node and reset the camera. A failed rebuild leaves the
    /// runtime idle, so it ends the app.
    fn respawn(&mut self, event_loop: &ActiveEventLoop) {
        let Some(runtime) = self.runtime.as_mut() else {
            return;
        };
        if let Err(e) = runtime.reconfigure(self.config.clone()) {
            self.fail(event_loop, e.into());
            return;
        }
        runtime.backend_mut().frame_radius(self.config.bounding_sphere_radius);
        log::info!("Respawned {} nodes", self.config.count);
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none() {
            if let Err(e) = self.start(event_loop) {
                self.fail(event_loop, e);
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                // Release buffers while the device is still alive.
                if let Some(runtime) = self.runtime.as_mut() {
                    runtime.shutdown();
                }
                event_loop.exit();
            }
            WindowEvent::Resized(physical_size) => {
                if let Some(runtime) = self.runtime.as_mut() {
                    runtime.backend_mut().resize(physical_size);
                }
            }
            WindowEvent::KeyboardInput { event, .. } if event.state == ElementState::Pressed => {
                match event.logical_key {
                    Key::Named(NamedKey::Space) => {
                        self.clock.toggle_pause();
                        log::info!("{}", if self.clock.is_paused() { "Paused" } else { "Resumed" });
                    }
                    Key::Named(NamedKey::Escape) => event_loop.exit(),
                    Key::Character(ref c) if c.eq_ignore_ascii_case("r") => self.respawn(event_loop),
                    _ => {}
                }
            }
            WindowEvent::MouseInput { state, button, .. } => {
                if button == MouseButton::Left {
                    self.mouse_pressed = state == ElementState::Pressed;
                    if !self.mouse_pressed {
                        self.last_mouse_pos = None;
                    }
                }
            }
            WindowEvent::CursorMoved { position, .. } => {
                if self.mouse_pressed {
                    if let (Some((last_x, last_y)), Some(runtime)) = (self.last_mouse_pos, self.runtime.as_mut()) {
                        let dx = (position.x - last_x) as f32;
                        let dy = (position.y - last_y) as f32;
                        runtime.backend_mut().camera.orbit(dx, dy);
                    }
                    self.last_mouse_pos = Some((position.x, position.y));
                }
            }
            WindowEvent::MouseWheel { delta, .. } => {
                let scroll = match delta {
                    MouseScrollDelta::LineDelta(_, y) => y,
                    MouseScrollDelta::PixelDelta(pos) => pos.y as f32 * 0.1,
                };
                if let Some(runtime) = self.runtime.as_mut() {
                    runtime.backend_mut().camera.zoom(scroll);
                }
            }
            WindowEvent::RedrawRequested => {
                self.redraw(event_loop);
                if let Some(window) = &self.window {
                    window.request_redraw();
                }
            }
            _ => {}
        }
    }
}
