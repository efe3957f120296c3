//! Platform seam for pointer lock.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use crate::ViewerError;

/// What the viewer needs from the window system to capture the pointer.
pub trait PointerLockHost {
    /// Capture the pointer. Success means the lock is engaged now.
    fn request_lock(&mut self) -> Result<(), ViewerError>;

    /// Drop the pointer capture. Also called after the platform already
    /// dropped it, so releasing twice must be harmless.
    fn release_lock(&mut self);

    fn set_cursor_visible(&mut self, visible: bool);
}

#[derive(Debug, Default)]
struct HeadlessState {
    deny: AtomicBool,
    requests: AtomicU32,
    releases: AtomicU32,
    cursor_hidden: AtomicBool,
}

/// Host without a window. Grants every request unless told to deny.
///
/// Clones share state, so a caller can keep one to inspect what the viewer did.
#[derive(Debug, Clone, Default)]
pub struct HeadlessHost {
    state: Arc<HeadlessState>,
}

impl HeadlessHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn denying() -> Self {
        let host = Self::default();
        host.set_deny(true);
        host
    }

    pub fn set_deny(&self, deny: bool) {
        self.state.deny.store(deny, Ordering::Relaxed);
    }

    pub fn lock_requests(&self) -> u32 {
        self.state.requests.load(Ordering::Relaxed)
    }

    pub fn releases(&self) -> u32 {
        self.state.releases.load(Ordering::Relaxed)
    }

    pub fn cursor_visible(&self) -> bool {
        !self.state.cursor_hidden.load(Ordering::Relaxed)
    }
}

impl PointerLockHost for HeadlessHost {
    fn request_lock(&mut self) -> Result<(), ViewerError> {
        self.state.requests.fetch_add(1, Ordering::Relaxed);
        if self.state.deny.load(Ordering::Relaxed) {
            return Err(ViewerError::PointerLockDenied("headless host denies lock".into()));
        }
        Ok(())
    }

    fn release_lock(&mut self) {
        self.state.releases.fetch_add(1, Ordering::Relaxed);
    }

    fn set_cursor_visible(&mut self, visible: bool) {
        self.state.cursor_hidden.store(!visible, Ordering::Relaxed);
    }
}
