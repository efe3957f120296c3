//! Lazy, restartable load streams and background delivery.

use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, mpsc};
use std::thread;
use std::time::Duration;

use gallery_common::Transform;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::LoadError;
use crate::import::parse_glb;
use crate::profile::{QualityProfile, normalize};
use crate::progress::LoadProgress;
use crate::scene::SceneGraph;
use crate::source::{self, AssetSource, OpenedSource};

/// Tuning for a load.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadSettings {
    /// Bytes read per stream step, one progress event each.
    pub chunk_size: usize,
    pub timeout_secs: u64,
    /// Uniform scale applied to the loaded scene root.
    pub model_scale: f32,
}

impl Default for LoadSettings {
    fn default() -> Self {
        Self {
            chunk_size: 64 * 1024,
            timeout_secs: 30,
            model_scale: 0.4,
        }
    }
}

/// A parsed and normalized scene plus the identity of the bytes it came from.
#[derive(Debug, Clone)]
pub struct SceneAsset {
    pub url: String,
    /// Lowercase hex SHA-256 of the raw asset bytes.
    pub digest: String,
    pub byte_len: u64,
    pub scene: SceneGraph,
}

impl SceneAsset {
    pub fn new(url: impl Into<String>, bytes: &[u8], scene: SceneGraph) -> Self {
        Self {
            url: url.into(),
            digest: format!("{:x}", Sha256::digest(bytes)),
            byte_len: bytes.len() as u64,
            scene,
        }
    }

    pub fn short_digest(&self) -> &str {
        &self.digest[..self.digest.len().min(12)]
    }
}

#[derive(Debug)]
pub enum LoadEvent {
    Progress(LoadProgress),
    Loaded(SceneAsset),
    Failed(LoadError),
}

impl LoadEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, LoadEvent::Progress(_))
    }
}

/// Builds load streams with a fixed profile and settings.
#[derive(Debug, Clone, Default)]
pub struct AssetLoader {
    settings: LoadSettings,
    profile: QualityProfile,
}

impl AssetLoader {
    pub fn new(settings: LoadSettings, profile: QualityProfile) -> Self {
        Self { settings, profile }
    }

    pub fn settings(&self) -> &LoadSettings {
        &self.settings
    }

    pub fn profile(&self) -> &QualityProfile {
        &self.profile
    }

    /// A fresh stream for `url`. Nothing is opened until the first `next()`.
    pub fn load(&self, url: &str) -> LoadStream {
        LoadStream {
            url: url.to_string(),
            source: AssetSource::parse(url),
            settings: self.settings,
            profile: self.profile,
            state: StreamState::Pending,
        }
    }

    /// Check that `url` is reachable without downloading it.
    pub fn probe(&self, url: &str) -> Result<source::ProbeReport, LoadError> {
        source::probe(url, Duration::from_secs(self.settings.timeout_secs))
    }
}

enum StreamState {
    Pending,
    Reading {
        opened: OpenedSource,
        buffer: Vec<u8>,
    },
    Done,
}

/// Progress events in non-decreasing byte order, then exactly one terminal event.
pub struct LoadStream {
    url: String,
    source: AssetSource,
    settings: LoadSettings,
    profile: QualityProfile,
    state: StreamState,
}

impl std::fmt::Debug for LoadStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadStream")
            .field("url", &self.url)
            .field("done", &matches!(self.state, StreamState::Done))
            .finish_non_exhaustive()
    }
}

impl LoadStream {
    pub fn url(&self) -> &str {
        &self.url
    }

    fn open(&self) -> Result<OpenedSource, LoadError> {
        let _span = tracing::info_span!("asset_load", url = %self.url).entered();
        info!(remote = self.source.is_remote(), "opening asset");
        source::open(&self.source, Duration::from_secs(self.settings.timeout_secs))
    }

    fn finish(&self, bytes: Vec<u8>) -> LoadEvent {
        let _span = tracing::info_span!("asset_load", url = %self.url).entered();
        let mut scene = match parse_glb(&bytes) {
            Ok(scene) => scene,
            Err(e) => {
                warn!(error = %e, "asset parse failed");
                return LoadEvent::Failed(e);
            }
        };
        scene.root = Transform::from_scale(self.settings.model_scale);
        normalize(&mut scene, &self.profile);
        let asset = SceneAsset::new(&self.url, &bytes, scene);
        info!(
            bytes = asset.byte_len,
            digest = asset.short_digest(),
            meshes = asset.scene.mesh_count(),
            "asset loaded"
        );
        LoadEvent::Loaded(asset)
    }
}

impl Iterator for LoadStream {
    type Item = LoadEvent;

    fn next(&mut self) -> Option<LoadEvent> {
        let (mut opened, mut buffer) = match std::mem::replace(&mut self.state, StreamState::Done) {
            StreamState::Done => return None,
            StreamState::Pending => match self.open() {
                Ok(opened) => {
                    let capacity = opened.total_bytes.unwrap_or(0).min(64 << 20) as usize;
                    (opened, Vec::with_capacity(capacity))
                }
                Err(e) => {
                    warn!(url = %self.url, error = %e, "asset open failed");
                    return Some(LoadEvent::Failed(e));
                }
            },
            StreamState::Reading { opened, buffer } => (opened, buffer),
        };

        let chunk = self.settings.chunk_size.max(1) as u64;
        let before = buffer.len();
        if let Err(e) = opened.reader.by_ref().take(chunk).read_to_end(&mut buffer) {
            warn!(url = %self.url, error = %e, "asset read failed");
            return Some(LoadEvent::Failed(e.into()));
        }

        if buffer.len() == before {
            return Some(self.finish(buffer));
        }

        let progress = LoadProgress {
            loaded_bytes: buffer.len() as u64,
            total_bytes: opened.total_bytes,
        };
        debug!(loaded = progress.loaded_bytes, total = ?progress.total_bytes, "asset progress");
        self.state = StreamState::Reading { opened, buffer };
        Some(LoadEvent::Progress(progress))
    }
}

/// Shared cancellation flag for a background load.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Receiving end of a load running on a worker thread.
#[derive(Debug)]
pub struct LoadHandle {
    events: mpsc::Receiver<LoadEvent>,
    cancel: CancelToken,
    finished: bool,
}

/// Run `stream` on a worker thread.
pub fn spawn_load(stream: LoadStream) -> LoadHandle {
    spawn_load_with(stream, CancelToken::new())
}

/// Like [`spawn_load`], observing an existing token. The worker checks the
/// token before every chunk.
pub fn spawn_load_with(mut stream: LoadStream, cancel: CancelToken) -> LoadHandle {
    let (tx, rx) = mpsc::channel();
    let worker_cancel = cancel.clone();
    let worker_tx = tx.clone();

    let spawned = thread::Builder::new()
        .name("asset-load".into())
        .spawn(move || {
            loop {
                if worker_cancel.is_cancelled() {
                    debug!(url = stream.url(), "asset load cancelled");
                    let _ = worker_tx.send(LoadEvent::Failed(LoadError::Cancelled));
                    return;
                }
                let Some(event) = stream.next() else { return };
                let terminal = event.is_terminal();
                if worker_tx.send(event).is_err() || terminal {
                    return;
                }
            }
        });
    if let Err(e) = spawned {
        let _ = tx.send(LoadEvent::Failed(e.into()));
    }

    LoadHandle {
        events: rx,
        cancel,
        finished: false,
    }
}

impl LoadHandle {
    /// Events available right now, without blocking.
    pub fn drain(&mut self) -> Vec<LoadEvent> {
        let mut out = Vec::new();
        loop {
            match self.events.try_recv() {
                Ok(event) => out.push(event),
                Err(mpsc::TryRecvError::Empty) => break,
                Err(mpsc::TryRecvError::Disconnected) => {
                    self.finished = true;
                    break;
                }
            }
        }
        out
    }

    /// Block until the next event, or `None` once the worker is gone.
    pub fn recv(&mut self) -> Option<LoadEvent> {
        match self.events.recv() {
            Ok(event) => Some(event),
            Err(_) => {
                self.finished = true;
                None
            }
        }
    }

    /// Stop the worker before its next chunk; it then sends `Failed(Cancelled)`.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// True once the worker has exited and every event has been received.
    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

impl Drop for LoadHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::triangle_glb;
    use std::io::Write;

    fn write_asset(bytes: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(bytes).expect("write");
        file
    }

    fn loader(chunk_size: usize) -> AssetLoader {
        AssetLoader::new(
            LoadSettings {
                chunk_size,
                ..LoadSettings::default()
            },
            QualityProfile::high(),
        )
    }

    #[test]
    fn stream_reports_progress_then_one_terminal_event() {
        let bytes = triangle_glb([0.0, 0.0, 0.0]);
        let file = write_asset(&bytes);
        let url = file.path().to_string_lossy().into_owned();

        let events: Vec<LoadEvent> = loader(16).load(&url).collect();
        let (last, progress) = events.split_last().expect("events");

        let mut previous = 0;
        for event in progress {
            let LoadEvent::Progress(p) = event else {
                panic!("terminal event before the end: {event:?}");
            };
            assert!(p.loaded_bytes > previous);
            assert_eq!(p.total_bytes, Some(bytes.len() as u64));
            previous = p.loaded_bytes;
        }
        assert_eq!(previous, bytes.len() as u64);
        assert_eq!(progress.len(), bytes.len().div_ceil(16));

        let LoadEvent::Loaded(asset) = last else {
            panic!("expected Loaded, got {last:?}");
        };
        assert_eq!(asset.byte_len, bytes.len() as u64);
        assert_eq!(asset.digest.len(), 64);
        assert_eq!(asset.scene.root.scale, glam::Vec3::splat(0.4));
        assert!(asset.scene.is_normalized());
    }

    #[test]
    fn stream_is_lazy_and_restartable() {
        let file = write_asset(&triangle_glb([0.0, 0.0, 0.0]));
        let url = file.path().to_string_lossy().into_owned();
        let loader = loader(1 << 20);

        let first = loader.load(&url);
        let second = loader.load(&url);
        drop(first);
        let events: Vec<LoadEvent> = second.collect();
        assert!(matches!(events.last(), Some(LoadEvent::Loaded(_))));

        let again: Vec<LoadEvent> = loader.load(&url).collect();
        assert_eq!(events.len(), again.len());
    }

    #[test]
    fn stream_is_fused_after_terminal() {
        let file = write_asset(b"not a glb");
        let url = file.path().to_string_lossy().into_owned();
        let mut stream = loader(1024).load(&url);

        assert!(matches!(stream.next(), Some(LoadEvent::Progress(_))));
        assert!(matches!(stream.next(), Some(LoadEvent::Failed(LoadError::Parse(_)))));
        assert!(stream.next().is_none());
        assert!(stream.next().is_none());
    }

    #[test]
    fn missing_file_fails_on_first_step() {
        let dir = tempfile::tempdir().expect("temp dir");
        let url = dir.path().join("gallery.glb").to_string_lossy().into_owned();
        let mut stream = loader(1024).load(&url);
        assert!(matches!(stream.next(), Some(LoadEvent::Failed(LoadError::Io(_)))));
        assert!(stream.next().is_none());
    }

    #[test]
    fn background_load_delivers_all_events() {
        let file = write_asset(&triangle_glb([0.0, 0.0, 0.0]));
        let url = file.path().to_string_lossy().into_owned();
        let mut handle = spawn_load(loader(32).load(&url));

        let mut events = Vec::new();
        while let Some(event) = handle.recv() {
            events.push(event);
        }
        assert!(handle.is_finished());
        assert!(matches!(events.last(), Some(LoadEvent::Loaded(_))));
        assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
        assert!(handle.drain().is_empty());
    }

    #[test]
    fn cancelled_load_ends_with_cancelled() {
        let file = write_asset(&triangle_glb([0.0, 0.0, 0.0]));
        let url = file.path().to_string_lossy().into_owned();
        let token = CancelToken::new();
        token.cancel();
        let mut handle = spawn_load_with(loader(1).load(&url), token);

        assert!(matches!(handle.recv(), Some(LoadEvent::Failed(LoadError::Cancelled))));
        assert!(handle.recv().is_none());
        assert!(handle.is_finished());
        assert!(handle.is_cancelled());
    }

    #[test]
    fn cancel_after_loaded_sends_nothing_more() {
        let file = write_asset(&triangle_glb([0.0, 0.0, 0.0]));
        let url = file.path().to_string_lossy().into_owned();
        let mut handle = spawn_load(loader(32).load(&url));

        loop {
            match handle.recv() {
                Some(LoadEvent::Loaded(_)) => break,
                Some(LoadEvent::Progress(_)) => {}
                other => panic!("unexpected event: {other:?}"),
            }
        }
        handle.cancel();
        assert!(handle.recv().is_none());
        assert!(handle.is_finished());
    }

    #[test]
    fn dropping_handle_cancels_worker() {
        let file = write_asset(&triangle_glb([0.0, 0.0, 0.0]));
        let url = file.path().to_string_lossy().into_owned();
        let token = CancelToken::new();
        let handle = spawn_load_with(loader(1).load(&url), token.clone());
        drop(handle);
        assert!(token.is_cancelled());
    }

    #[test]
    fn digest_is_stable() {
        let a = SceneAsset::new("a", b"gallery", SceneGraph::new());
        let b = SceneAsset::new("b", b"gallery", SceneGraph::new());
        assert_eq!(a.digest, b.digest);
        assert_eq!(a.short_digest().len(), 12);
    }
}
