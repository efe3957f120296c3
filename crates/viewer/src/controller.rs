//! Session lifecycle: mount, load delivery, input, frame loop, teardown.

use std::time::Duration;

use gallery_assets::{
    AssetLoader, LoadEvent, LoadHandle, ProgressTracker, ReportedPercent, SceneGraph, normalize,
    spawn_load,
};
use gallery_common::SessionId;
use gallery_frame::{FrameDecision, FrameScheduler, FrameTimer, SchedulerStats, SkipReason};
use gallery_input::{InputSnapshot, InputState};
use gallery_motion::{BoundsContainment, CameraPose, MovementIntegrator, Velocity};
use gallery_render::{RenderBackend, RenderError, RenderStats, SceneRenderer};
use tracing::{Span, debug, error, info, info_span, trace, warn};

use crate::ViewerError;
use crate::config::{EscapePolicy, FailurePolicy, ViewerConfig};
use crate::host::PointerLockHost;
use crate::status::{AssetState, ViewerStatus, lock_text};

/// Identifies one load. Events carrying an older ticket are dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LoadTicket(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewerPhase {
    Unmounted,
    /// Mounted; the asset has not settled yet.
    Loading,
    /// The asset settled (loaded, fallback, or error shown).
    Interactive,
    Closed,
}

/// What one `on_frame` wake did.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameOutcome {
    /// Nothing is mounted.
    Inactive,
    Skipped(SkipReason),
    Rendered { stats: RenderStats, moved: bool },
    /// The backend failed for a reason other than a stale surface.
    RenderFailed(RenderError),
}

/// Everything owned between mount and teardown.
pub struct ViewerSession<B: RenderBackend> {
    id: SessionId,
    span: Span,
    renderer: SceneRenderer<B>,
    host: Box<dyn PointerLockHost>,
    input: InputState,
    integrator: MovementIntegrator,
    velocity: Velocity,
    pose: CameraPose,
    scheduler: FrameScheduler,
    timer: FrameTimer,
    asset: AssetState,
    tracker: ProgressTracker,
    current_load: Option<LoadTicket>,
    load: Option<LoadHandle>,
}

impl<B: RenderBackend> ViewerSession<B> {
    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn pose(&self) -> &CameraPose {
        &self.pose
    }

    pub fn velocity(&self) -> Velocity {
        self.velocity
    }

    pub fn input(&self) -> InputSnapshot {
        self.input.snapshot()
    }

    pub fn renderer(&self) -> &SceneRenderer<B> {
        &self.renderer
    }

    pub fn backend_mut(&mut self) -> &mut B {
        self.renderer.backend_mut()
    }

    pub fn asset_state(&self) -> &AssetState {
        &self.asset
    }

    pub fn scheduler_stats(&self) -> &SchedulerStats {
        self.scheduler.stats()
    }

    pub fn timer(&self) -> &FrameTimer {
        &self.timer
    }

    pub fn current_load(&self) -> Option<LoadTicket> {
        self.current_load
    }

    fn frame(&mut self, now: Duration) -> FrameOutcome {
        let dt = match self.scheduler.maybe_run_frame(now) {
            FrameDecision::Run { dt } => dt,
            FrameDecision::Skip(reason) => {
                trace!(?reason, "frame skipped");
                return FrameOutcome::Skipped(reason);
            }
        };
        if !dt.is_zero() {
            self.timer.record(dt);
        }

        let before = self.pose.position;
        let input = self.input.snapshot();
        self.integrator
            .tick(dt.as_secs_f32(), &input, &mut self.velocity, &mut self.pose);
        let moved = self.pose.position != before;

        match self.renderer.render(&self.pose) {
            Ok(stats) => FrameOutcome::Rendered { stats, moved },
            Err(e) => {
                error!(error = %e, "render failed");
                FrameOutcome::RenderFailed(e)
            }
        }
    }

    fn engage_lock(&mut self) {
        if self.input.set_pointer_locked(true) {
            self.host.set_cursor_visible(false);
            info!("pointer locked");
        }
    }

    fn release_lock(&mut self) {
        if self.input.set_pointer_locked(false) {
            self.host.release_lock();
            self.host.set_cursor_visible(true);
            info!("pointer unlocked");
        }
    }

    fn teardown(&mut self) {
        let _guard = self.span.clone().entered();
        if let Some(load) = self.load.take() {
            load.cancel();
            debug!("in-flight load cancelled");
        }
        self.current_load = None;
        self.release_lock();
        self.host.set_cursor_visible(true);
        self.scheduler.stop();
        self.renderer.release();
        info!(frames = self.renderer.frames_rendered(), "session torn down");
    }
}

/// Top-level viewer: wires input, movement, pacing and rendering to one session.
pub struct ViewerController<B: RenderBackend> {
    config: ViewerConfig,
    phase: ViewerPhase,
    session: Option<ViewerSession<B>>,
    on_close: Option<Box<dyn FnOnce() + Send>>,
    next_ticket: u64,
}

impl<B: RenderBackend> ViewerController<B> {
    pub fn new(config: ViewerConfig) -> Self {
        Self {
            config,
            phase: ViewerPhase::Unmounted,
            session: None,
            on_close: None,
            next_ticket: 0,
        }
    }

    /// Callback run exactly once, by the first `close`.
    pub fn with_on_close(mut self, on_close: impl FnOnce() + Send + 'static) -> Self {
        self.on_close = Some(Box::new(on_close));
        self
    }

    pub fn config(&self) -> &ViewerConfig {
        &self.config
    }

    pub fn phase(&self) -> ViewerPhase {
        self.phase
    }

    pub fn is_closed(&self) -> bool {
        self.phase == ViewerPhase::Closed
    }

    pub fn session(&self) -> Option<&ViewerSession<B>> {
        self.session.as_ref()
    }

    pub fn session_mut(&mut self) -> Option<&mut ViewerSession<B>> {
        self.session.as_mut()
    }

    /// Build the session around `backend` at the given viewport size.
    pub fn mount(
        &mut self,
        backend: B,
        mut host: Box<dyn PointerLockHost>,
        width: u32,
        height: u32,
    ) -> Result<SessionId, ViewerError> {
        match self.phase {
            ViewerPhase::Closed => return Err(ViewerError::Closed),
            ViewerPhase::Loading | ViewerPhase::Interactive => {
                return Err(ViewerError::AlreadyMounted);
            }
            ViewerPhase::Unmounted => {}
        }

        let config = &self.config;
        let id = SessionId::new();
        let span = info_span!("viewer_session", session = %id);

        let renderer = SceneRenderer::new(
            backend,
            config.camera.camera(),
            config.quality,
            width,
            height,
        );
        let mut integrator = MovementIntegrator::new(config.movement.tuning);
        if let Some(containment) = config.movement.containment {
            integrator.add_hook(Box::new(BoundsContainment::new(containment)));
        }
        let mut pose = CameraPose::at(config.camera.position);
        if let Some(target) = config.camera.look_at {
            pose.look_at(target);
        }
        host.set_cursor_visible(true);

        span.in_scope(|| {
            info!(
                width,
                height,
                quality = %config.quality,
                fps = config.frame.target_fps,
                escape = %config.escape,
                "viewer mounted"
            );
        });

        self.session = Some(ViewerSession {
            id,
            span,
            renderer,
            host,
            input: InputState::new(),
            integrator,
            velocity: Velocity::default(),
            pose,
            scheduler: FrameScheduler::new(config.frame),
            timer: FrameTimer::default(),
            asset: AssetState::Unloaded,
            tracker: ProgressTracker::new(config.asset.indeterminate_bytes_per_percent),
            current_load: None,
            load: None,
        });
        self.phase = ViewerPhase::Loading;
        Ok(id)
    }

    /// Issue a ticket for a load whose events the caller delivers with
    /// [`deliver`](Self::deliver). Any earlier load is abandoned.
    pub fn begin_load(&mut self, url: &str) -> Result<LoadTicket, ViewerError> {
        if self.is_closed() {
            return Err(ViewerError::Closed);
        }
        let session = self.session.as_mut().ok_or(ViewerError::NotMounted)?;
        let _guard = session.span.clone().entered();

        self.next_ticket += 1;
        let ticket = LoadTicket(self.next_ticket);
        // Dropping the previous handle cancels its worker.
        session.load = None;
        session.current_load = Some(ticket);
        session.tracker = ProgressTracker::new(self.config.asset.indeterminate_bytes_per_percent);
        session.asset = AssetState::Loading {
            percent: ReportedPercent::Indeterminate(0),
        };
        self.phase = ViewerPhase::Loading;
        info!(url, ticket = ticket.0, "asset load started");
        Ok(ticket)
    }

    /// Load the configured asset on a worker thread. Events arrive through
    /// [`pump`](Self::pump), which `on_frame` calls on every wake.
    pub fn start_load(&mut self, loader: &AssetLoader) -> Result<LoadTicket, ViewerError> {
        let url = self.config.asset.url.clone();
        let ticket = self.begin_load(&url)?;
        if let Some(session) = self.session.as_mut() {
            session.load = Some(spawn_load(loader.load(&url)));
        }
        Ok(ticket)
    }

    /// A second explicit attempt. Nothing retries on its own.
    pub fn retry_load(&mut self, loader: &AssetLoader) -> Result<LoadTicket, ViewerError> {
        info!(url = %self.config.asset.url, "retrying asset load");
        self.start_load(loader)
    }

    /// Apply one load event. Returns `false` when it was ignored: no session,
    /// a stale ticket, or a late event after teardown.
    pub fn deliver(&mut self, ticket: LoadTicket, event: LoadEvent) -> bool {
        let policy = self.config.asset.on_failure;
        let quality = self.config.quality;
        let Some(session) = self.session.as_mut() else {
            debug!(ticket = ticket.0, "load event without a session ignored");
            return false;
        };
        if session.current_load != Some(ticket) {
            debug!(ticket = ticket.0, "stale load event ignored");
            return false;
        }
        let _guard = session.span.clone().entered();

        match event {
            LoadEvent::Progress(progress) => {
                let percent = session.tracker.report(progress);
                debug!(
                    loaded = progress.loaded_bytes,
                    total = ?progress.total_bytes,
                    percent = percent.value(),
                    "load progress"
                );
                session.asset = AssetState::Loading { percent };
                return true;
            }
            LoadEvent::Loaded(asset) => {
                let short = asset.short_digest().to_string();
                if let Some(bounds) = asset.scene.world_bounds() {
                    session.integrator.set_scene_bounds(bounds);
                }
                match session.renderer.set_scene(asset.scene) {
                    Ok(()) => {
                        info!(url = %asset.url, digest = %short, bytes = asset.byte_len, "asset loaded");
                        session.asset = AssetState::Loaded {
                            url: asset.url,
                            digest: asset.digest,
                        };
                    }
                    Err(e) => {
                        warn!(error = %e, "scene upload failed");
                        session.asset = AssetState::Failed {
                            message: e.to_string(),
                        };
                    }
                }
            }
            LoadEvent::Failed(err) => {
                let message = err.to_string();
                match policy {
                    FailurePolicy::FallbackPrimitive => {
                        warn!(error = %message, "asset load failed, showing fallback");
                        let mut scene = SceneGraph::fallback_cube();
                        normalize(&mut scene, &quality.profile());
                        session.asset = match session.renderer.set_scene(scene) {
                            Ok(()) => AssetState::Fallback { message },
                            Err(e) => AssetState::Failed {
                                message: format!("{message}; fallback: {e}"),
                            },
                        };
                    }
                    FailurePolicy::ShowError => {
                        warn!(error = %message, "asset load failed");
                        session.asset = AssetState::Failed { message };
                    }
                }
            }
        }

        session.current_load = None;
        session.load = None;
        self.phase = ViewerPhase::Interactive;
        true
    }

    /// Deliver every event the background load has produced so far.
    pub fn pump(&mut self) -> usize {
        let Some(session) = self.session.as_mut() else {
            return 0;
        };
        let (Some(handle), Some(ticket)) = (session.load.as_mut(), session.current_load) else {
            return 0;
        };
        let events = handle.drain();
        let count = events.len();
        for event in events {
            self.deliver(ticket, event);
        }
        count
    }

    /// One "next paintable frame" wake at `now`.
    pub fn on_frame(&mut self, now: Duration) -> FrameOutcome {
        self.pump();
        match self.session.as_mut() {
            Some(session) => session.frame(now),
            None => FrameOutcome::Inactive,
        }
    }

    /// Returns `true` when the event changed viewer state.
    pub fn on_key_down(&mut self, code: &str) -> bool {
        if code == "Escape" {
            return self.on_escape();
        }
        match self.session.as_mut() {
            Some(session) => session.input.on_key_down(code),
            None => false,
        }
    }

    pub fn on_key_up(&mut self, code: &str) -> bool {
        match self.session.as_mut() {
            Some(session) => session.input.on_key_up(code),
            None => false,
        }
    }

    fn on_escape(&mut self) -> bool {
        let policy = self.config.escape;
        let Some(session) = self.session.as_mut() else {
            return false;
        };
        let was_locked = session.input.pointer_locked();
        session.release_lock();
        match policy {
            EscapePolicy::UnlockOnly => was_locked,
            EscapePolicy::UnlockAndClose => {
                self.close();
                true
            }
        }
    }

    /// Relative pointer motion. Only turns the camera while locked.
    pub fn on_mouse_motion(&mut self, dx: f32, dy: f32) -> bool {
        let Some(session) = self.session.as_mut() else {
            return false;
        };
        if !session.input.pointer_locked() {
            return false;
        }
        let sensitivity = session.integrator.config().look_sensitivity;
        session.pose.look(dx, dy, sensitivity);
        true
    }

    /// Click on the viewport: ask the host for pointer lock.
    ///
    /// A denied request is logged and leaves the viewer in its click-to-start
    /// state. Returns whether the pointer is locked afterwards.
    pub fn on_click(&mut self) -> bool {
        let Some(session) = self.session.as_mut() else {
            return false;
        };
        if session.input.pointer_locked() {
            return true;
        }
        let _guard = session.span.clone().entered();
        match session.host.request_lock() {
            Ok(()) => {
                session.engage_lock();
                true
            }
            Err(e) => {
                warn!(error = %e, "pointer lock request failed");
                session.host.set_cursor_visible(true);
                false
            }
        }
    }

    /// The platform engaged or dropped the lock on its own (focus loss, etc.).
    pub fn on_pointer_lock_changed(&mut self, locked: bool) -> bool {
        let Some(session) = self.session.as_mut() else {
            return false;
        };
        let _guard = session.span.clone().entered();
        if locked {
            let changed = !session.input.pointer_locked();
            session.engage_lock();
            changed
        } else if session.input.set_pointer_locked(false) {
            // Hosts that keep a grab across focus loss must drop it here.
            session.host.release_lock();
            session.host.set_cursor_visible(true);
            info!("pointer lock lost");
            true
        } else {
            false
        }
    }

    pub fn set_hidden(&mut self, hidden: bool) {
        if let Some(session) = self.session.as_mut() {
            session.scheduler.set_hidden(hidden);
        }
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        if let Some(session) = self.session.as_mut() {
            session.renderer.resize(width, height);
        }
    }

    /// Tear down the session and notify the host. Later calls do nothing.
    pub fn close(&mut self) {
        if self.is_closed() {
            return;
        }
        self.phase = ViewerPhase::Closed;
        if let Some(mut session) = self.session.take() {
            session.teardown();
        }
        if let Some(on_close) = self.on_close.take() {
            on_close();
        }
        info!("viewer closed");
    }

    pub fn status(&self) -> ViewerStatus {
        match &self.session {
            Some(session) => {
                let locked = session.input.pointer_locked();
                ViewerStatus {
                    asset: session.asset.text(),
                    lock: lock_text(locked).to_string(),
                    locked,
                    frames: session.renderer.frames_rendered(),
                    fps: session.timer.fps(),
                }
            }
            None => ViewerStatus {
                asset: match self.phase {
                    ViewerPhase::Closed => "Viewer closed".to_string(),
                    _ => "Viewer not mounted".to_string(),
                },
                lock: lock_text(false).to_string(),
                locked: false,
                frames: 0,
                fps: 0.0,
            },
        }
    }
}

impl<B: RenderBackend> Drop for ViewerController<B> {
    fn drop(&mut self) {
        // The host removed the viewer without closing it: release, but do not notify.
        if let Some(mut session) = self.session.take() {
            session.teardown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::HeadlessHost;
    use gallery_assets::testing::triangle_glb;
    use gallery_assets::{LoadError, LoadProgress, SceneAsset};
    use gallery_common::Transform;
    use gallery_motion::ContainmentConfig;
    use gallery_render::TextBackend;
    use glam::Vec3;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Instant;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    fn mounted(config: ViewerConfig) -> (ViewerController<TextBackend>, HeadlessHost) {
        let host = HeadlessHost::new();
        let mut viewer = ViewerController::new(config);
        viewer
            .mount(TextBackend::new(), Box::new(host.clone()), 800, 600)
            .expect("mount");
        (viewer, host)
    }

    fn at_fps(fps: u32) -> ViewerConfig {
        let mut config = ViewerConfig::default();
        config.frame.target_fps = fps;
        config
    }

    fn close_counter(config: ViewerConfig) -> (ViewerController<TextBackend>, Arc<AtomicU32>) {
        let count = Arc::new(AtomicU32::new(0));
        let seen = count.clone();
        let mut viewer = ViewerController::new(config).with_on_close(move || {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        viewer
            .mount(TextBackend::new(), Box::new(HeadlessHost::new()), 800, 600)
            .expect("mount");
        (viewer, count)
    }

    fn session(viewer: &ViewerController<TextBackend>) -> &ViewerSession<TextBackend> {
        viewer.session().expect("session")
    }

    fn renders(viewer: &ViewerController<TextBackend>) -> u64 {
        session(viewer).renderer().frames_rendered()
    }

    #[test]
    fn mount_once() {
        let (mut viewer, host) = mounted(ViewerConfig::default());
        assert_eq!(viewer.phase(), ViewerPhase::Loading);
        assert_eq!(viewer.status().lock, "Click to activate WASD");
        assert!(host.cursor_visible());
        let err = viewer
            .mount(TextBackend::new(), Box::new(HeadlessHost::new()), 1, 1)
            .expect_err("second mount");
        assert!(matches!(err, ViewerError::AlreadyMounted));
    }

    #[test]
    fn unmounted_controller_is_inert() {
        let mut viewer: ViewerController<TextBackend> = ViewerController::new(ViewerConfig::default());
        assert_eq!(viewer.on_frame(ms(0)), FrameOutcome::Inactive);
        assert!(!viewer.on_key_down("KeyW"));
        assert!(!viewer.on_click());
        assert!(matches!(viewer.begin_load("x.glb"), Err(ViewerError::NotMounted)));
        assert_eq!(viewer.status().asset, "Viewer not mounted");
    }

    #[test]
    fn streamed_load_reaches_renderer() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        std::io::Write::write_all(&mut file, &triangle_glb([0.0, 0.0, -3.0])).expect("write");
        let url = file.path().to_string_lossy().into_owned();

        let mut config = ViewerConfig::default();
        config.asset.url = url.clone();
        let loader = config.asset_loader();
        let (mut viewer, _) = mounted(config);

        let ticket = viewer.begin_load(&url).expect("ticket");
        assert_eq!(viewer.status().asset, "Loading 3D model... 0%");

        let mut events: Vec<LoadEvent> = loader.load(&url).collect();
        let terminal = events.pop().expect("terminal event");
        assert!(terminal.is_terminal());
        for event in events {
            assert!(viewer.deliver(ticket, event));
            assert!(viewer.status().asset.starts_with("Loading 3D model..."));
            assert_eq!(viewer.phase(), ViewerPhase::Loading);
        }
        assert!(viewer.deliver(ticket, terminal));

        assert_eq!(viewer.phase(), ViewerPhase::Interactive);
        assert_eq!(viewer.status().asset, "Model loaded");
        let renderer = session(&viewer).renderer();
        assert_eq!(renderer.backend().uploads(), 1);
        assert_eq!(renderer.scene().map(|s| s.mesh_count()), Some(1));
        assert!(matches!(session(&viewer).asset_state(), AssetState::Loaded { digest, .. } if digest.len() == 64));
    }

    #[test]
    fn background_load_is_pumped_by_frames() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        std::io::Write::write_all(&mut file, &triangle_glb([0.0, 0.0, 0.0])).expect("write");
        let mut config = ViewerConfig::default();
        config.asset.url = file.path().to_string_lossy().into_owned();
        let loader = config.asset_loader();
        let (mut viewer, _) = mounted(config);

        viewer.start_load(&loader).expect("start");
        let deadline = Instant::now() + Duration::from_secs(10);
        let mut now = 0;
        while viewer.phase() == ViewerPhase::Loading && Instant::now() < deadline {
            viewer.on_frame(ms(now));
            now += 20;
            std::thread::sleep(Duration::from_millis(2));
        }
        assert_eq!(viewer.phase(), ViewerPhase::Interactive);
        assert_eq!(viewer.status().asset, "Model loaded");
        assert!(session(&viewer).current_load().is_none());
    }

    #[test]
    fn failed_load_shows_fallback_cube() {
        let (mut viewer, _) = mounted(ViewerConfig::default());
        let ticket = viewer.begin_load("missing.glb").expect("ticket");
        assert!(viewer.deliver(ticket, LoadEvent::Failed(LoadError::Http { status: 404 })));
        assert_eq!(viewer.phase(), ViewerPhase::Interactive);
        assert_eq!(viewer.status().asset, "Model unavailable, showing fallback");
        let scene = session(&viewer).renderer().scene().expect("fallback scene");
        assert_eq!(scene.mesh_count(), 1);
        assert!(scene.is_normalized());
    }

    #[test]
    fn show_error_policy_leaves_scene_empty() {
        let mut config = ViewerConfig::default();
        config.asset.on_failure = FailurePolicy::ShowError;
        let (mut viewer, _) = mounted(config);
        let ticket = viewer.begin_load("missing.glb").expect("ticket");
        viewer.deliver(ticket, LoadEvent::Failed(LoadError::Http { status: 404 }));
        assert_eq!(viewer.status().asset, "Error: HTTP status 404");
        assert!(session(&viewer).renderer().scene().is_none());
        // Rendering carries on with the empty scene.
        assert!(matches!(viewer.on_frame(ms(0)), FrameOutcome::Rendered { .. }));
    }

    #[test]
    fn retry_invalidates_older_ticket() {
        let (mut viewer, _) = mounted(ViewerConfig::default());
        let first = viewer.begin_load("a.glb").expect("first");
        let second = viewer.begin_load("a.glb").expect("second");
        assert_ne!(first, second);
        let progress = || {
            LoadEvent::Progress(LoadProgress {
                loaded_bytes: 50,
                total_bytes: Some(100),
            })
        };
        assert!(!viewer.deliver(first, progress()));
        assert!(viewer.deliver(second, progress()));
        assert_eq!(viewer.status().asset, "Loading 3D model... 50%");
    }

    #[test]
    fn teardown_during_load_ignores_late_completion() {
        let (mut viewer, count) = close_counter(ViewerConfig::default());
        let ticket = viewer.begin_load("slow.glb").expect("ticket");
        viewer.close();
        assert_eq!(viewer.phase(), ViewerPhase::Closed);

        let late = SceneAsset::new("slow.glb", b"late bytes", SceneGraph::fallback_cube());
        assert!(!viewer.deliver(ticket, LoadEvent::Loaded(late)));
        assert!(!viewer.deliver(ticket, LoadEvent::Failed(LoadError::NoGeometry)));
        assert!(viewer.session().is_none());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn teardown_cancels_background_worker() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        std::io::Write::write_all(&mut file, &vec![0u8; 1 << 20]).expect("write");
        let mut config = ViewerConfig::default();
        config.asset.url = file.path().to_string_lossy().into_owned();
        config.asset.chunk_size = 1024;
        let loader = config.asset_loader();
        let (mut viewer, _) = mounted(config);
        viewer.start_load(&loader).expect("start");
        viewer.close();
        assert_eq!(viewer.pump(), 0);
        assert_eq!(viewer.on_frame(ms(10)), FrameOutcome::Inactive);
    }

    #[test]
    fn close_runs_callback_once_and_detaches_input() {
        let (mut viewer, count) = close_counter(ViewerConfig::default());
        viewer.close();
        viewer.close();
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!viewer.on_key_down("KeyW"));
        assert!(!viewer.on_mouse_motion(10.0, 0.0));
        assert!(!viewer.on_click());
        assert_eq!(viewer.on_frame(ms(100)), FrameOutcome::Inactive);
        assert_eq!(viewer.status().asset, "Viewer closed");
        assert!(matches!(
            viewer.mount(TextBackend::new(), Box::new(HeadlessHost::new()), 1, 1),
            Err(ViewerError::Closed)
        ));
    }

    #[test]
    fn click_locks_and_hides_cursor() {
        let (mut viewer, host) = mounted(ViewerConfig::default());
        assert!(viewer.on_click());
        assert_eq!(host.lock_requests(), 1);
        assert!(!host.cursor_visible());
        assert_eq!(viewer.status().lock, "WASD navigation active");
        // Already locked: no second request.
        assert!(viewer.on_click());
        assert_eq!(host.lock_requests(), 1);
    }

    #[test]
    fn denied_lock_returns_to_click_to_start() {
        let host = HeadlessHost::denying();
        let mut viewer: ViewerController<TextBackend> = ViewerController::new(ViewerConfig::default());
        viewer
            .mount(TextBackend::new(), Box::new(host.clone()), 800, 600)
            .expect("mount");
        assert!(!viewer.on_click());
        assert_eq!(host.lock_requests(), 1);
        assert!(host.cursor_visible());
        assert!(!viewer.status().locked);
        assert_eq!(viewer.status().lock, "Click to activate WASD");

        host.set_deny(false);
        assert!(viewer.on_click());
    }

    #[test]
    fn escape_unlock_only_keeps_viewer_open() {
        let (mut viewer, host) = mounted(ViewerConfig::default());
        viewer.on_click();
        assert!(viewer.on_key_down("Escape"));
        assert!(!viewer.status().locked);
        assert_eq!(host.releases(), 1);
        assert!(host.cursor_visible());
        assert!(!viewer.on_key_down("Escape"));
        assert_ne!(viewer.phase(), ViewerPhase::Closed);
    }

    #[test]
    fn escape_unlock_and_close() {
        let mut config = ViewerConfig::default();
        config.escape = EscapePolicy::UnlockAndClose;
        let (mut viewer, count) = close_counter(config.clone());
        viewer.on_click();
        assert!(viewer.on_key_down("Escape"));
        assert_eq!(viewer.phase(), ViewerPhase::Closed);
        assert_eq!(count.load(Ordering::SeqCst), 1);

        // Unlocked Escape closes too.
        let (mut viewer, count) = close_counter(config);
        assert!(viewer.on_key_down("Escape"));
        assert_eq!(viewer.phase(), ViewerPhase::Closed);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn mouse_look_requires_lock() {
        let (mut viewer, _) = mounted(ViewerConfig::default());
        let yaw = session(&viewer).pose().yaw;
        assert!(!viewer.on_mouse_motion(100.0, 0.0));
        assert_eq!(session(&viewer).pose().yaw, yaw);
        viewer.on_click();
        assert!(viewer.on_mouse_motion(100.0, 0.0));
        assert!(session(&viewer).pose().yaw > yaw);
    }

    #[test]
    fn thirty_fps_from_ten_ms_wakes() {
        let (mut viewer, _) = mounted(at_fps(30));
        for i in 0..100 {
            viewer.on_frame(ms(i * 10));
        }
        let rendered = renders(&viewer);
        assert!((29..=31).contains(&rendered), "rendered {rendered} frames");
        assert_eq!(session(&viewer).scheduler_stats().wakes, 100);
    }

    #[test]
    fn hidden_surface_does_no_work() {
        let (mut viewer, _) = mounted(at_fps(60));
        viewer.on_click();
        viewer.on_key_down("KeyW");
        viewer.set_hidden(true);
        let start = session(&viewer).pose().position;
        for i in 0..100 {
            assert_eq!(
                viewer.on_frame(ms(i * 50)),
                FrameOutcome::Skipped(SkipReason::Hidden)
            );
        }
        assert_eq!(renders(&viewer), 0);
        assert_eq!(session(&viewer).pose().position, start);

        viewer.set_hidden(false);
        assert!(matches!(viewer.on_frame(ms(5_000)), FrameOutcome::Rendered { .. }));
        assert_eq!(renders(&viewer), 1);
    }

    #[test]
    fn strafe_scenario_moves_along_right_axis_only() {
        let (mut viewer, _) = mounted(at_fps(10));
        assert!(viewer.on_click());
        viewer.on_key_down("KeyW");
        viewer.on_key_down("KeyD");
        viewer.on_key_up("KeyW");

        let start = session(&viewer).pose().position;
        // First processed frame has dt = 0 and does not move.
        viewer.on_frame(ms(0));
        assert_eq!(session(&viewer).pose().position, start);

        let mut last_x = start.x;
        for tick in 1..=5 {
            let outcome = viewer.on_frame(ms(tick * 100));
            assert!(matches!(outcome, FrameOutcome::Rendered { moved: true, .. }));
            let p = session(&viewer).pose().position;
            assert!(p.x > last_x, "tick {tick}: x must keep increasing");
            assert!((p.z - start.z).abs() < 1e-4);
            assert_eq!(p.y, start.y);
            last_x = p.x;
        }
        assert!((last_x - start.x - 1.0).abs() < 1e-4);

        // Released: damping at dt = 0.1 stops the camera outright.
        viewer.on_key_up("KeyD");
        viewer.on_frame(ms(600));
        let settled = session(&viewer).pose().position;
        viewer.on_frame(ms(700));
        assert_eq!(session(&viewer).pose().position, settled);
        assert!(session(&viewer).velocity().is_zero());
    }

    #[test]
    fn lost_lock_releases_grab_and_shows_cursor() {
        let (mut viewer, host) = mounted(ViewerConfig::default());
        viewer.on_click();
        assert!(!host.cursor_visible());

        assert!(viewer.on_pointer_lock_changed(false));
        assert_eq!(host.releases(), 1);
        assert!(host.cursor_visible());
        assert_eq!(viewer.status().lock, "Click to activate WASD");

        // Already unlocked: nothing more to release.
        assert!(!viewer.on_pointer_lock_changed(false));
        assert_eq!(host.releases(), 1);
    }

    #[test]
    fn unlock_freezes_pose_and_velocity() {
        let mut config = at_fps(10);
        config.movement.tuning.damping = 1.0;
        let (mut viewer, _) = mounted(config);
        viewer.on_click();
        viewer.on_key_down("KeyW");
        for t in 0..3 {
            viewer.on_frame(ms(t * 100));
        }
        let velocity = session(&viewer).velocity();
        assert!(!velocity.is_zero());

        assert!(viewer.on_pointer_lock_changed(false));
        let frozen = session(&viewer).pose().position;
        for t in 3..10 {
            let outcome = viewer.on_frame(ms(t * 100));
            assert!(matches!(outcome, FrameOutcome::Rendered { moved: false, .. }));
            assert_eq!(session(&viewer).pose().position, frozen);
        }
        assert_eq!(session(&viewer).velocity(), velocity);
        assert!(session(&viewer).input().forward);

        assert!(viewer.on_pointer_lock_changed(true));
        viewer.on_frame(ms(1_000));
        assert_ne!(session(&viewer).pose().position, frozen);
    }

    #[test]
    fn containment_follows_loaded_bounds() {
        let mut config = at_fps(10);
        config.movement.containment = Some(ContainmentConfig::default());
        let (mut viewer, _) = mounted(config);

        let mut scene = SceneGraph::fallback_cube();
        scene.root = Transform::from_scale(10.0);
        normalize(&mut scene, &gallery_assets::QualityProfile::high());
        let ticket = viewer.begin_load("room.glb").expect("ticket");
        viewer.deliver(ticket, LoadEvent::Loaded(SceneAsset::new("room.glb", b"room", scene)));

        viewer.on_click();
        viewer.on_frame(ms(0));
        let p = session(&viewer).pose().position;
        assert!((p.y - 1.6).abs() < 1e-5);
        assert_eq!(p.z, 2.0);
    }

    #[test]
    fn resize_reaches_camera() {
        let (mut viewer, _) = mounted(ViewerConfig::default());
        viewer.resize(1000, 500);
        let renderer = session(&viewer).renderer();
        assert_eq!(renderer.camera().aspect, 2.0);
        assert_eq!(renderer.viewport(), (1000, 500));
    }

    #[test]
    fn configured_look_at_orients_camera() {
        let mut config = ViewerConfig::default();
        config.camera.position = Vec3::new(0.0, 1.0, 0.0);
        config.camera.look_at = Some(Vec3::new(5.0, 1.0, 0.0));
        let (viewer, _) = mounted(config);
        let forward = session(&viewer).pose().forward();
        assert!((forward - Vec3::X).length() < 1e-5);
    }
}
