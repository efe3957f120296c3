use serde::{Deserialize, Serialize};

/// A movement direction bound to one or more physical keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MoveKey {
    Forward,
    Backward,
    Left,
    Right,
}

impl MoveKey {
    /// Map a physical key code (`KeyW`, `ArrowUp`, ...) to a direction.
    ///
    /// Codes follow the layout-independent naming used by browsers and winit's
    /// `KeyCode` debug names. Anything outside the WASD/arrow set is unbound.
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "KeyW" | "ArrowUp" => Some(MoveKey::Forward),
            "KeyS" | "ArrowDown" => Some(MoveKey::Backward),
            "KeyA" | "ArrowLeft" => Some(MoveKey::Left),
            "KeyD" | "ArrowRight" => Some(MoveKey::Right),
            _ => None,
        }
    }
}
