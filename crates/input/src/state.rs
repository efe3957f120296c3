use crate::keys::MoveKey;
use serde::{Deserialize, Serialize};

/// Read-only copy of the input state handed to the movement integrator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputSnapshot {
    pub forward: bool,
    pub backward: bool,
    pub left: bool,
    pub right: bool,
    pub pointer_locked: bool,
}

impl InputSnapshot {
    pub fn any_movement(&self) -> bool {
        self.forward || self.backward || self.left || self.right
    }
}

/// Pressed movement keys plus pointer-lock engagement.
///
/// Mutated only by key and pointer events on the UI thread.
#[derive(Debug, Clone, Default)]
pub struct InputState {
    held: InputSnapshot,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a key press. Returns `true` if the state changed.
    pub fn on_key_down(&mut self, code: &str) -> bool {
        match MoveKey::from_code(code) {
            Some(key) => self.set(key, true),
            None => false,
        }
    }

    /// Apply a key release. Returns `true` if the state changed.
    pub fn on_key_up(&mut self, code: &str) -> bool {
        match MoveKey::from_code(code) {
            Some(key) => self.set(key, false),
            None => false,
        }
    }

    /// Flip the pointer-lock flag. Returns `true` on an actual transition.
    ///
    /// Held keys are left untouched in both directions.
    pub fn set_pointer_locked(&mut self, locked: bool) -> bool {
        if self.held.pointer_locked == locked {
            return false;
        }
        self.held.pointer_locked = locked;
        tracing::debug!(locked, "pointer lock flag changed");
        true
    }

    pub fn is_held(&self, key: MoveKey) -> bool {
        *self.slot(key)
    }

    pub fn pointer_locked(&self) -> bool {
        self.held.pointer_locked
    }

    pub fn snapshot(&self) -> InputSnapshot {
        self.held
    }

    fn set(&mut self, key: MoveKey, pressed: bool) -> bool {
        let slot = self.slot_mut(key);
        if *slot == pressed {
            return false;
        }
        *slot = pressed;
        tracing::trace!(?key, pressed, "movement key");
        true
    }

    fn slot(&self, key: MoveKey) -> &bool {
        match key {
            MoveKey::Forward => &self.held.forward,
            MoveKey::Backward => &self.held.backward,
            MoveKey::Left => &self.held.left,
            MoveKey::Right => &self.held.right,
        }
    }

    fn slot_mut(&mut self, key: MoveKey) -> &mut bool {
        match key {
            MoveKey::Forward => &mut self.held.forward,
            MoveKey::Backward => &mut self.held.backward,
            MoveKey::Left => &mut self.held.left,
            MoveKey::Right => &mut self.held.right,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_down_and_up() {
        let mut input = InputState::new();
        assert!(input.on_key_down("KeyW"));
        assert!(input.snapshot().forward);
        assert!(input.on_key_up("KeyW"));
        assert!(!input.snapshot().forward);
    }

    #[test]
    fn repeated_down_is_noop() {
        let mut input = InputState::new();
        assert!(input.on_key_down("KeyD"));
        assert!(!input.on_key_down("KeyD"));
        assert!(!input.on_key_down("ArrowRight"));
        assert!(input.is_held(MoveKey::Right));
    }

    #[test]
    fn up_without_down_is_noop() {
        let mut input = InputState::new();
        assert!(!input.on_key_up("KeyA"));
        assert_eq!(input.snapshot(), InputSnapshot::default());
    }

    #[test]
    fn unbound_keys_are_ignored() {
        let mut input = InputState::new();
        assert!(!input.on_key_down("KeyQ"));
        assert!(!input.on_key_down("Escape"));
        assert!(!input.snapshot().any_movement());
    }

    #[test]
    fn ordering_is_preserved_across_keys() {
        let mut input = InputState::new();
        input.on_key_down("KeyW");
        input.on_key_down("KeyD");
        input.on_key_up("KeyW");
        let snap = input.snapshot();
        assert!(!snap.forward);
        assert!(snap.right);
    }

    #[test]
    fn pointer_lock_keeps_held_keys() {
        let mut input = InputState::new();
        input.on_key_down("KeyW");
        assert!(input.set_pointer_locked(true));
        assert!(!input.set_pointer_locked(true));
        assert!(input.set_pointer_locked(false));
        // Stale keys stay held; the integrator treats them as inert while unlocked.
        assert!(input.snapshot().forward);
        assert!(!input.pointer_locked());
    }
}
