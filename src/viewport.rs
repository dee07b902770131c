//! Camera viewport state and the per-layer viewport matrix cache.
//!
//! The viewport matrix maps world space to a camera/layer's screen space,
//! applying camera position, zoom and the layer's parallax speed. Because
//! many objects share a layer, [`ViewportMatrixCache`] memoizes one matrix
//! per distinct `(layer, viewport-state)` key so repeated lookups within a
//! frame avoid recomputation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use glam::{Mat4, Vec2};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::event::Event;
use crate::layer::RenderLayer;

/// Args fired when the viewport state changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewportChanged;

/// Plain-value snapshot of the camera state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewportState {
    /// Camera position in world units.
    pub position: Vec2,
    /// Camera zoom per axis.
    pub zoom: Vec2,
    /// Output window size in pixels, used to scale layers with an
    /// independent resolution.
    pub window: Vec2,
}

impl ViewportState {
    /// Camera at the origin with no zoom, rendering to `window`.
    pub const fn new(window: Vec2) -> Self {
        Self {
            position: Vec2::ZERO,
            zoom: Vec2::ONE,
            window,
        }
    }
}

/// Builds the world→screen matrix for one layer under this camera state.
///
/// The camera pan is damped by the layer's parallax speed, then the camera
/// zoom is applied, scaled up by `window / resolution` for layers that
/// render at their own resolution.
pub fn viewport_matrix(state: &ViewportState, layer: &RenderLayer) -> Mat4 {
    let resolution_factor = layer
        .resolution
        .map(|resolution| state.window / resolution.as_vec2())
        .unwrap_or(Vec2::ONE);
    let scale = state.zoom * resolution_factor;
    let pan = -state.position * layer.parallax;

    Mat4::from_scale(scale.extend(1.0)) * Mat4::from_translation(pan.extend(0.0))
}

/// Observable camera.
pub struct Viewport {
    state: RwLock<ViewportState>,
    on_changed: Event<ViewportChanged>,
}

impl Viewport {
    /// Creates a camera at the origin rendering to `window`.
    pub fn new(window: Vec2) -> Self {
        Self {
            state: RwLock::new(ViewportState::new(window)),
            on_changed: Event::new(),
        }
    }

    /// Snapshot of the camera state.
    pub fn state(&self) -> ViewportState {
        *self.state.read()
    }

    /// Moves the camera.
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

    /// Zooms the camera.
    pub fn set_zoom(&self, zoom: Vec2) {
        self.mutate(|state| {
            if state.zoom == zoom {
                false
            } else {
                state.zoom = zoom;
                true
            }
        });
    }

    /// Resizes the output window.
    pub fn set_window(&self, window: Vec2) {
        self.mutate(|state| {
            if state.window == window {
                false
            } else {
                state.window = window;
                true
            }
        });
    }

    /// Handle to the change event.
    pub fn on_changed(&self) -> Event<ViewportChanged> {
        self.on_changed.clone()
    }

    fn mutate(&self, apply: impl FnOnce(&mut ViewportState) -> bool) {
        let changed = {
            let mut state = self.state.write();
            apply(&mut state)
        };
        if changed && let Err(error) = self.on_changed.invoke(ViewportChanged) {
            log::warn!("viewport-changed subscriber failed: {error}");
        }
    }
}

impl std::fmt::Debug for Viewport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Viewport").field("state", &self.state()).finish()
    }
}

/// Memo key: float fields participate by bit pattern.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
struct ViewportKey {
    z: i32,
    parallax: [u32; 2],
    resolution: Option<[u32; 2]>,
    position: [u32; 2],
    zoom: [u32; 2],
    window: [u32; 2],
}

fn bits(v: Vec2) -> [u32; 2] {
    [v.x.to_bits(), v.y.to_bits()]
}

impl ViewportKey {
    fn new(state: &ViewportState, layer: &RenderLayer) -> Self {
        Self {
            z: layer.z,
            parallax: bits(layer.parallax),
            resolution: layer.resolution.map(|r| [r.x, r.y]),
            position: bits(state.position),
            zoom: bits(state.zoom),
            window: bits(state.window),
        }
    }
}

/// Memoizes viewport matrices per `(layer, viewport-state)` key.
///
/// Call [`begin_frame`](Self::begin_frame) once per frame to drop stale
/// entries; within a frame, objects sharing a layer hit the memo.
pub struct ViewportMatrixCache {
    matrices: RwLock<HashMap<ViewportKey, Mat4>>,
    computed: AtomicU64,
}

impl ViewportMatrixCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self {
            matrices: RwLock::new(HashMap::new()),
            computed: AtomicU64::new(0),
        }
    }

    /// Returns the viewport matrix for this state and layer, computing and
    /// memoizing it on first use.
    pub fn matrix(&self, state: &ViewportState, layer: &RenderLayer) -> Mat4 {
        let key = ViewportKey::new(state, layer);
        if let Some(matrix) = self.matrices.read().get(&key) {
            return *matrix;
        }

        let mut matrices = self.matrices.write();
        *matrices.entry(key).or_insert_with(|| {
            self.computed.fetch_add(1, Ordering::Relaxed);
            viewport_matrix(state, layer)
        })
    }

    /// Drops every memoized matrix.
    pub fn begin_frame(&self) {
        self.matrices.write().clear();
    }

    /// Number of memoized matrices.
    pub fn len(&self) -> usize {
        self.matrices.read().len()
    }

    /// Whether the memo is empty.
    pub fn is_empty(&self) -> bool {
        self.matrices.read().is_empty()
    }

    /// How many matrices have actually been computed (memo misses).
    pub fn computed_count(&self) -> u64 {
        self.computed.load(Ordering::Relaxed)
    }
}

impl Default for ViewportMatrixCache {
    fn default() -> Self {
        Self::new()
    }
}
