use anyhow::Result;
use clap::Parser;
use egui::Context as EguiContext;
use gallery_assets::AssetLoader;
use gallery_frame::FrameScheduler;
use gallery_render::QualityPreset;
use gallery_render_wgpu::{OverlayFrame, WgpuBackend};
use gallery_viewer::{
    EscapePolicy, FrameOutcome, PointerLockHost, ViewerConfig, ViewerController, ViewerError,
    ViewerStatus,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tracing_subscriber::EnvFilter;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{DeviceEvent, ElementState, KeyEvent, MouseButton, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::PhysicalKey;
use winit::window::{CursorGrabMode, Window, WindowId};

#[derive(Parser)]
#[command(name = "gallery-desktop", about = "First-person 3D gallery viewer")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// YAML config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Asset path or URL, overriding the config
    #[arg(long)]
    asset: Option<String>,

    /// Rendering quality: high | performance
    #[arg(long)]
    quality: Option<QualityPreset>,

    /// Scene frame rate cap
    #[arg(long)]
    fps: Option<u32>,

    /// Escape behavior: unlock_only | unlock_and_close
    #[arg(long)]
    escape: Option<EscapePolicy>,
}

impl Cli {
    fn viewer_config(&self) -> Result<ViewerConfig> {
        let mut config = ViewerConfig::load_or_default(self.config.as_deref())?;
        if let Some(asset) = &self.asset {
            config.asset.url = asset.clone();
        }
        if let Some(quality) = self.quality {
            config.quality = quality;
        }
        if let Some(fps) = self.fps {
            config.frame.target_fps = fps;
        }
        if let Some(escape) = self.escape {
            config.escape = escape;
        }
        config.validate()?;
        Ok(config)
    }
}

/// Pointer lock through the window's cursor grab.
struct WindowLockHost {
    window: Arc<Window>,
}

impl PointerLockHost for WindowLockHost {
    fn request_lock(&mut self) -> Result<(), ViewerError> {
        // Locked is unsupported on some platforms (X11, Windows); Confined is close enough.
        self.window
            .set_cursor_grab(CursorGrabMode::Locked)
            .or_else(|_| self.window.set_cursor_grab(CursorGrabMode::Confined))
            .map_err(|e| ViewerError::PointerLockDenied(e.to_string()))
    }

    fn release_lock(&mut self) {
        if let Err(e) = self.window.set_cursor_grab(CursorGrabMode::None) {
            tracing::warn!("failed to release cursor grab: {e}");
        }
    }

    fn set_cursor_visible(&mut self, visible: bool) {
        self.window.set_cursor_visible(visible);
    }
}

struct GalleryApp {
    config: ViewerConfig,
    loader: AssetLoader,
    viewer: Option<ViewerController<WgpuBackend>>,
    window: Option<Arc<Window>>,
    egui_ctx: EguiContext,
    egui_winit: Option<egui_winit::State>,
    hud: FrameScheduler,
    started: Instant,
    closed: Arc<AtomicBool>,
    occluded: bool,
    minimized: bool,
}

impl GalleryApp {
    fn new(config: ViewerConfig) -> Self {
        Self {
            loader: config.asset_loader(),
            hud: FrameScheduler::with_fps(config.hud.target_fps),
            config,
            viewer: None,
            window: None,
            egui_ctx: EguiContext::default(),
            egui_winit: None,
            started: Instant::now(),
            closed: Arc::new(AtomicBool::new(false)),
            occluded: false,
            minimized: false,
        }
    }

    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let attrs = Window::default_attributes()
            .with_title("Art Gallery")
            .with_inner_size(PhysicalSize::new(1280u32, 720));
        let window = Arc::new(event_loop.create_window(attrs)?);
        let size = window.inner_size();

        let backend = WgpuBackend::new(window.clone(), size.width, size.height)?;
        tracing::info!("rendering on {}", backend.adapter_name());

        let closed = self.closed.clone();
        let mut viewer = ViewerController::new(self.config.clone()).with_on_close(move || {
            closed.store(true, Ordering::SeqCst);
        });
        let host = WindowLockHost {
            window: window.clone(),
        };
        let session = viewer.mount(backend, Box::new(host), size.width, size.height)?;
        viewer.start_load(&self.loader)?;
        tracing::info!("session {session} mounted");

        self.egui_winit = Some(egui_winit::State::new(
            self.egui_ctx.clone(),
            egui::ViewportId::ROOT,
            &window,
            Some(window.scale_factor() as f32),
            None,
            None,
        ));
        self.viewer = Some(viewer);
        self.window = Some(window);
        Ok(())
    }

    fn update_visibility(&mut self) {
        if let Some(viewer) = &mut self.viewer {
            viewer.set_hidden(self.occluded || self.minimized);
        }
    }

    /// Rebuild the overlay when its own scheduler allows; the backend keeps
    /// painting the last one in between.
    fn refresh_hud(&mut self) {
        let (Some(viewer), Some(window), Some(egui_winit)) =
            (&mut self.viewer, &self.window, &mut self.egui_winit)
        else {
            return;
        };
        if !self.hud.maybe_run_frame(self.started.elapsed()).should_run() {
            return;
        }

        let status = viewer.status();
        let raw_input = egui_winit.take_egui_input(window);
        let full_output = self.egui_ctx.run(raw_input, |ctx| draw_hud(ctx, &status));
        egui_winit.handle_platform_output(window, full_output.platform_output);

        let primitives = self
            .egui_ctx
            .tessellate(full_output.shapes, full_output.pixels_per_point);
        if let Some(session) = viewer.session_mut() {
            session.backend_mut().queue_overlay(OverlayFrame {
                primitives,
                textures_delta: full_output.textures_delta,
                pixels_per_point: full_output.pixels_per_point,
            });
        }
    }

    fn exit_if_closed(&self, event_loop: &ActiveEventLoop) {
        if self.closed.load(Ordering::SeqCst) {
            event_loop.exit();
        }
    }
}

fn draw_hud(ctx: &EguiContext, status: &ViewerStatus) {
    egui::Area::new(egui::Id::new("gallery_hud"))
        .anchor(egui::Align2::LEFT_TOP, egui::vec2(12.0, 12.0))
        .interactable(false)
        .show(ctx, |ui| {
            egui::Frame::popup(ui.style()).show(ui, |ui| {
                ui.heading("Art Gallery");
                let [asset, lock, stats] = status.lines();
                ui.label(asset);
                let lock_color = if status.locked {
                    egui::Color32::LIGHT_GREEN
                } else {
                    egui::Color32::YELLOW
                };
                ui.label(egui::RichText::new(lock).color(lock_color));
                ui.separator();
                ui.small("WASD / arrows: move | mouse: look | Esc: release");
                ui.small(stats);
            });
        });
}

impl ApplicationHandler for GalleryApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        if let Err(e) = self.init(event_loop) {
            tracing::error!("failed to start viewer: {e:#}");
            event_loop.exit();
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        if let (Some(egui_winit), Some(window)) = (&mut self.egui_winit, &self.window) {
            let response = egui_winit.on_window_event(window, &event);
            if response.consumed {
                return;
            }
        }
        let Some(viewer) = &mut self.viewer else {
            return;
        };

        match event {
            WindowEvent::CloseRequested => {
                viewer.close();
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                self.minimized = size.width == 0 || size.height == 0;
                if !self.minimized {
                    viewer.resize(size.width, size.height);
                }
                self.update_visibility();
            }
            WindowEvent::Occluded(occluded) => {
                self.occluded = occluded;
                self.update_visibility();
            }
            WindowEvent::Focused(false) => {
                viewer.on_pointer_lock_changed(false);
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(key),
                        state,
                        ..
                    },
                ..
            } => {
                let code = format!("{key:?}");
                match state {
                    ElementState::Pressed => viewer.on_key_down(&code),
                    ElementState::Released => viewer.on_key_up(&code),
                };
            }
            WindowEvent::MouseInput {
                button: MouseButton::Left,
                state: ElementState::Pressed,
                ..
            } => {
                viewer.on_click();
            }
            WindowEvent::RedrawRequested => {
                self.refresh_hud();
                if let Some(viewer) = &mut self.viewer {
                    if let FrameOutcome::RenderFailed(e) = viewer.on_frame(self.started.elapsed())
                    {
                        tracing::error!("frame failed: {e}");
                    }
                }
            }
            _ => {}
        }
        self.exit_if_closed(event_loop);
    }

    fn device_event(
        &mut self,
        _event_loop: &ActiveEventLoop,
        _device_id: winit::event::DeviceId,
        event: DeviceEvent,
    ) {
        if let (DeviceEvent::MouseMotion { delta }, Some(viewer)) = (event, &mut self.viewer) {
            viewer.on_mouse_motion(delta.0 as f32, delta.1 as f32);
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        self.exit_if_closed(event_loop);
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    let config = cli.viewer_config()?;
    tracing::info!(asset = %config.asset.url, quality = %config.quality, "gallery-desktop starting");

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = GalleryApp::new(config);
    event_loop.run_app(&mut app)?;

    Ok(())
}
