//! Render layers.

use glam::{UVec2, Vec2};
use serde::{Deserialize, Serialize};

/// A Z-ordered rendering bucket with its own parallax speed and an optional
/// independent resolution.
///
/// Immutable value type: layers are compared and hashed (by the viewport
/// matrix cache) rather than mutated. Higher `z` draws in front.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RenderLayer {
    /// Z-order; higher draws in front.
    pub z: i32,
    /// Parallax speed per axis. `(1, 1)` scrolls with the camera;
    /// `(0, 0)` is fixed to the screen.
    pub parallax: Vec2,
    /// Optional independent rendering resolution for this layer.
    pub resolution: Option<UVec2>,
}

impl RenderLayer {
    /// Default layer for objects with no explicit layer assigned.
    pub const FOREGROUND: Self = Self {
        z: 0,
        parallax: Vec2::ONE,
        resolution: None,
    };

    /// Far background layer.
    pub const BACKGROUND: Self = Self {
        z: -100,
        parallax: Vec2::ONE,
        resolution: None,
    };

    /// Screen-fixed UI layer: draws in front of everything and ignores the
    /// camera.
    pub const UI: Self = Self {
        z: 100,
        parallax: Vec2::ZERO,
        resolution: None,
    };

    /// Creates a layer at the given z with default parallax.
    pub const fn new(z: i32) -> Self {
        Self {
            z,
            parallax: Vec2::ONE,
            resolution: None,
        }
    }

    /// Returns this layer with a different parallax speed.
    #[must_use]
    pub const fn with_parallax(mut self, parallax: Vec2) -> Self {
        self.parallax = parallax;
        self
    }

    /// Returns this layer with an independent resolution.
    #[must_use]
    pub const fn with_resolution(mut self, resolution: UVec2) -> Self {
        self.resolution = Some(resolution);
        self
    }
}

impl Default for RenderLayer {
    fn default() -> Self {
        Self::FOREGROUND
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn foreground_is_default() {
        assert_eq!(RenderLayer::default(), RenderLayer::FOREGROUND);
        assert_eq!(RenderLayer::FOREGROUND.z, 0);
        assert_eq!(RenderLayer::FOREGROUND.parallax, Vec2::ONE);
    }

    #[test]
    fn ui_ignores_camera() {
        assert_eq!(RenderLayer::UI.parallax, Vec2::ZERO);
        assert!(RenderLayer::UI.z > RenderLayer::FOREGROUND.z);
        assert!(RenderLayer::BACKGROUND.z < RenderLayer::FOREGROUND.z);
    }

    #[test]
    fn builders_compose() {
        let layer = RenderLayer::new(-10)
            .with_parallax(Vec2::new(0.5, 0.5))
            .with_resolution(UVec2::new(320, 180));

        assert_eq!(layer.z, -10);
        assert_eq!(layer.parallax, Vec2::new(0.5, 0.5));
        assert_eq!(layer.resolution, Some(UVec2::new(320, 180)));
    }
}
