//! Local sprite transforms.
//!
//! A [`SpriteTransform`] holds the object-local placement of a sprite:
//! position, pivot, rotation, scale and sprite size. Every effective
//! mutation fires [`on_changed`](SpriteTransform::on_changed); dependent
//! caches (model matrix, bounding boxes) subscribe and invalidate rather
//! than polling every frame. Setting a property to its current value is a
//! no-op and does not notify.

use glam::Vec2;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::event::Event;

/// Args fired when any transform property effectively changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransformChanged;

/// Plain-value snapshot of a sprite's local transform.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransformState {
    /// Position relative to the parent (or the room for roots).
    pub position: Vec2,
    /// Pivot point, normalized over the sprite size (0..1 per axis).
    pub pivot: Vec2,
    /// Rotation angle in radians.
    pub rotation: f32,
    /// Scale relative to the parent.
    pub scale: Vec2,
    /// Sprite size (width, height) in world units.
    pub size: Vec2,
}

impl TransformState {
    /// Untransformed state: origin position, zero pivot, no rotation,
    /// uniform scale of 1, zero size.
    pub const IDENTITY: Self = Self {
        position: Vec2::ZERO,
        pivot: Vec2::ZERO,
        rotation: 0.0,
        scale: Vec2::ONE,
        size: Vec2::ZERO,
    };

    /// Returns this state with a different position.
    #[must_use]
    pub const fn with_position(mut self, position: Vec2) -> Self {
        self.position = position;
        self
    }

    /// Returns this state with a different pivot.
    #[must_use]
    pub const fn with_pivot(mut self, pivot: Vec2) -> Self {
        self.pivot = pivot;
        self
    }

    /// Returns this state with a different rotation angle.
    #[must_use]
    pub const fn with_rotation(mut self, rotation: f32) -> Self {
        self.rotation = rotation;
        self
    }

    /// Returns this state with a different scale.
    #[must_use]
    pub const fn with_scale(mut self, scale: Vec2) -> Self {
        self.scale = scale;
        self
    }

    /// Returns this state with a different sprite size.
    #[must_use]
    pub const fn with_size(mut self, size: Vec2) -> Self {
        self.size = size;
        self
    }
}

impl Default for TransformState {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Shared, observable sprite transform.
pub struct SpriteTransform {
    state: RwLock<TransformState>,
    on_changed: Event<TransformChanged>,
}

impl SpriteTransform {
    /// Creates an identity transform.
    pub fn new() -> Self {
        Self::from_state(TransformState::IDENTITY)
    }

    /// Creates a transform from an initial state.
    pub fn from_state(state: TransformState) -> Self {
        Self {
            state: RwLock::new(state),
            on_changed: Event::new(),
        }
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> TransformState {
        *self.state.read()
    }

    /// Current position.
    pub fn position(&self) -> Vec2 {
        self.state.read().position
    }

    /// Current normalized pivot.
    pub fn pivot(&self) -> Vec2 {
        self.state.read().pivot
    }

    /// Current rotation in radians.
    pub fn rotation(&self) -> f32 {
        self.state.read().rotation
    }

    /// Current scale.
    pub fn scale(&self) -> Vec2 {
        self.state.read().scale
    }

    /// Current sprite size.
    pub fn size(&self) -> Vec2 {
        self.state.read().size
    }

    /// Sets the position.
    pub fn set_position(&self, position: Vec2) {
        self.mutate(|state| {
            if state.position == position {
                false
            } else {
                state.position = position;
                true
            }
        });
    }

    /// Sets the normalized pivot.
    pub fn set_pivot(&self, pivot: Vec2) {
        self.mutate(|state| {
            if state.pivot == pivot {
                false
            } else {
                state.pivot = pivot;
                true
            }
        });
    }

    /// Sets the rotation angle in radians.
    pub fn set_rotation(&self, rotation: f32) {
        self.mutate(|state| {
            if state.rotation == rotation {
                false
            } else {
                state.rotation = rotation;
                true
            }
        });
    }

    /// Sets the scale.
    pub fn set_scale(&self, scale: Vec2) {
        self.mutate(|state| {
            if state.scale == scale {
                false
            } else {
                state.scale = scale;
                true
            }
        });
    }

    /// Sets the sprite size.
    pub fn set_size(&self, size: Vec2) {
        self.mutate(|state| {
            if state.size == size {
                false
            } else {
                state.size = size;
                true
            }
        });
    }

    /// Replaces the whole state, notifying once if anything differs.
    pub fn set_state(&self, new_state: TransformState) {
        self.mutate(|state| {
            if *state == new_state {
                false
            } else {
                *state = new_state;
                true
            }
        });
    }

    /// Handle to the change event.
    pub fn on_changed(&self) -> Event<TransformChanged> {
        self.on_changed.clone()
    }

    fn mutate(&self, apply: impl FnOnce(&mut TransformState) -> bool) {
        let changed = {
            let mut state = self.state.write();
            apply(&mut state)
        };
        if changed && let Err(error) = self.on_changed.invoke(TransformChanged) {
            log::warn!("transform-changed subscriber failed: {error}");
        }
    }
}

impl Default for SpriteTransform {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SpriteTransform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpriteTransform")
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn change_counter(transform: &SpriteTransform) -> Arc<AtomicU32> {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();
        transform
            .on_changed()
            .subscribe(move |_| {
                counter_clone.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        counter
    }

    #[test]
    fn setters_update_state() {
        let transform = SpriteTransform::new();
        transform.set_position(Vec2::new(10.0, 20.0));
        transform.set_scale(Vec2::splat(2.0));
        transform.set_rotation(1.5);
        transform.set_pivot(Vec2::new(0.5, 0.0));
        transform.set_size(Vec2::new(32.0, 64.0));

        let state = transform.state();
        assert_eq!(state.position, Vec2::new(10.0, 20.0));
        assert_eq!(state.scale, Vec2::splat(2.0));
        assert_eq!(state.rotation, 1.5);
        assert_eq!(state.pivot, Vec2::new(0.5, 0.0));
        assert_eq!(state.size, Vec2::new(32.0, 64.0));
    }

    #[test]
    fn change_fires_event() {
        let transform = SpriteTransform::new();
        let changes = change_counter(&transform);

        transform.set_position(Vec2::new(1.0, 0.0));
        transform.set_rotation(0.3);

        assert_eq!(changes.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn no_op_set_does_not_notify() {
        let transform = SpriteTransform::new();
        transform.set_position(Vec2::new(1.0, 0.0));
        let changes = change_counter(&transform);

        transform.set_position(Vec2::new(1.0, 0.0));
        transform.set_scale(Vec2::ONE);

        assert_eq!(changes.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn set_state_notifies_once() {
        let transform = SpriteTransform::new();
        let changes = change_counter(&transform);

        transform.set_state(
            TransformState::IDENTITY
                .with_position(Vec2::new(5.0, 5.0))
                .with_scale(Vec2::splat(3.0)),
        );

        assert_eq!(changes.load(Ordering::SeqCst), 1);
        assert_eq!(transform.position(), Vec2::new(5.0, 5.0));
    }

    #[test]
    fn state_round_trips_through_serde() {
        let state = TransformState::IDENTITY
            .with_position(Vec2::new(3.0, 4.0))
            .with_rotation(0.25)
            .with_size(Vec2::new(16.0, 16.0));

        let text = ron::to_string(&state).unwrap();
        let restored: TransformState = ron::from_str(&text).unwrap();
        assert_eq!(state, restored);
    }
}
