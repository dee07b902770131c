//! The three-stage bounding box pipeline.
//!
//! 1. [`intermediate_box`] — object-space box in world units, one model
//!    matrix away from the sprite rectangle; unscaled by any viewport.
//! 2. [`hit_test_box`] — world-space box used for mouse and area collision
//!    checks, unaffected by viewport scroll or zoom.
//! 3. [`render_box`] — screen-space box used for drawing and pixel-perfect
//!    sampling, reflecting viewport pan/zoom/parallax; also yields the
//!    render scale factor.
//!
//! [`BoundingBoxes`] caches the pipeline output per object. A rebuild is
//! only triggered by the rebuild-required signal, driven by transform,
//! parent, image-size (all via the model matrix) and viewport changes,
//! and happens lazily on the next read. [`BoundingBoxLockStep`] lets a
//! caller batch several property mutations and defer the rebuild until the
//! batch completes, so no torn intermediate box can be observed mid-update.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use glam::{Mat4, Vec2};
use parking_lot::{Mutex, RwLock};

use crate::bounds::BoundingBox;
use crate::event::{Event, Subscription};
use crate::layer::RenderLayer;
use crate::matrix::ModelMatrixNode;
use crate::viewport::{Viewport, ViewportMatrixCache};

/// Args fired when an object's cached boxes are invalidated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoxesChanged;

/// Output of one full pipeline run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EntityBoxes {
    /// Stage 1: object-space box in world units.
    pub intermediate: BoundingBox,
    /// Stage 2: world-space hit-test box.
    pub hit_test: BoundingBox,
    /// Stage 3: screen-space render box.
    pub render: BoundingBox,
    /// Stage 3: scale factor applied by the viewport matrix, used for
    /// pixel-perfect sampling.
    pub render_scale: Vec2,
}

/// Stage 1: places the sprite rectangle `(0,0)..(width,height)` into world
/// space through the model matrix.
pub fn intermediate_box(size: Vec2, model: &Mat4) -> BoundingBox {
    BoundingBox::axis_aligned(Vec2::ZERO, size).transformed(model)
}

/// Stage 2: derives the world-space hit-test box.
///
/// Hit-testing happens in world units, so this is the intermediate box
/// unchanged; the stage exists so the hit-test contract stays independent
/// of how stage 1 is produced.
pub fn hit_test_box(intermediate: &BoundingBox) -> BoundingBox {
    *intermediate
}

/// Stage 3: projects the intermediate box into screen space and extracts
/// the viewport's scale factor.
pub fn render_box(intermediate: &BoundingBox, viewport: &Mat4) -> (BoundingBox, Vec2) {
    let projected = intermediate.transformed(viewport);
    let scale = Vec2::new(
        viewport.x_axis.truncate().length(),
        viewport.y_axis.truncate().length(),
    );
    (projected, scale)
}

/// Cached bounding-box pipeline for one scene object.
///
/// Watches the object's model matrix and the viewport; either firing marks
/// the cache dirty and notifies [`on_changed`](Self::on_changed) so
/// dependent components (colliders, mouse-hit dispatch) invalidate their
/// own derived caches instead of polling. The boxes themselves are rebuilt
/// on the next read.
pub struct BoundingBoxes {
    matrix: Arc<ModelMatrixNode>,
    viewport: Arc<Viewport>,
    viewports: Arc<ViewportMatrixCache>,
    layer: RwLock<Option<RenderLayer>>,
    cache: Mutex<Option<EntityBoxes>>,
    lock_depth: AtomicU32,
    pending: AtomicBool,
    rebuilds: AtomicU32,
    on_changed: Event<BoxesChanged>,
    matrix_sub: Mutex<Option<Subscription>>,
    viewport_sub: Mutex<Option<Subscription>>,
}

impl BoundingBoxes {
    /// Creates the pipeline for one object and wires its invalidation
    /// sources.
    pub fn new(
        matrix: Arc<ModelMatrixNode>,
        viewport: Arc<Viewport>,
        viewports: Arc<ViewportMatrixCache>,
    ) -> Arc<Self> {
        let boxes = Arc::new(Self {
            matrix: matrix.clone(),
            viewport: viewport.clone(),
            viewports,
            layer: RwLock::new(None),
            cache: Mutex::new(None),
            lock_depth: AtomicU32::new(0),
            pending: AtomicBool::new(false),
            rebuilds: AtomicU32::new(0),
            on_changed: Event::new(),
            matrix_sub: Mutex::new(None),
            viewport_sub: Mutex::new(None),
        });

        let weak = Arc::downgrade(&boxes);
        match matrix.on_changed().subscribe(move |_| {
            if let Some(boxes) = weak.upgrade() {
                boxes.request_rebuild();
            }
        }) {
            Ok(subscription) => *boxes.matrix_sub.lock() = Some(subscription),
            Err(error) => log::error!("bounding boxes could not watch the model matrix: {error}"),
        }

        let weak = Arc::downgrade(&boxes);
        match viewport.on_changed().subscribe(move |_| {
            if let Some(boxes) = weak.upgrade() {
                boxes.request_rebuild();
            }
        }) {
            Ok(subscription) => *boxes.viewport_sub.lock() = Some(subscription),
            Err(error) => log::error!("bounding boxes could not watch the viewport: {error}"),
        }

        boxes
    }

    /// The render layer used for the render box; `None` is treated as
    /// [`RenderLayer::FOREGROUND`].
    pub fn layer(&self) -> Option<RenderLayer> {
        *self.layer.read()
    }

    /// Assigns the render layer, invalidating on change.
    pub fn set_layer(&self, layer: Option<RenderLayer>) {
        {
            let mut current = self.layer.write();
            if *current == layer {
                return;
            }
            *current = layer;
        }
        self.request_rebuild();
    }

    /// The rebuild-required signal.
    ///
    /// Drops the cached boxes and notifies dependents, unless a
    /// [`BoundingBoxLockStep`] batch is active, in which case the rebuild
    /// is deferred until the batch completes.
    pub fn request_rebuild(&self) {
        if self.lock_depth.load(Ordering::SeqCst) > 0 {
            self.pending.store(true, Ordering::SeqCst);
            return;
        }
        let was_cached = self.cache.lock().take().is_some();
        if was_cached
            && let Err(error) = self.on_changed.invoke(BoxesChanged)
        {
            log::warn!("bounding-boxes subscriber failed: {error}");
        }
    }

    /// Runs (or returns) the cached pipeline output.
    pub fn boxes(&self) -> EntityBoxes {
        if let Some(cached) = *self.cache.lock() {
            return cached;
        }

        let model = self.matrix.matrix();
        let size = self.matrix.transform().size();
        let layer = self.layer().unwrap_or(RenderLayer::FOREGROUND);
        let viewport_matrix = self.viewports.matrix(&self.viewport.state(), &layer);

        let intermediate = intermediate_box(size, &model);
        let hit_test = hit_test_box(&intermediate);
        let (render, render_scale) = render_box(&intermediate, &viewport_matrix);

        let built = EntityBoxes {
            intermediate,
            hit_test,
            render,
            render_scale,
        };
        *self.cache.lock() = Some(built);
        self.rebuilds.fetch_add(1, Ordering::Relaxed);
        log::trace!("rebuilt bounding boxes (total {})", self.rebuild_count());
        built
    }

    /// The world-space hit-test box.
    pub fn hit_test_box(&self) -> BoundingBox {
        self.boxes().hit_test
    }

    /// The screen-space render box.
    pub fn render_box(&self) -> BoundingBox {
        self.boxes().render
    }

    /// Starts a batch: rebuild requests are deferred until the returned
    /// guard (and any nested guards) drop.
    ///
    /// This is a cooperative convention, not a mutex — the batching caller
    /// must not have another thread mutate this object's transform
    /// concurrently with the batch.
    pub fn lock_step(self: &Arc<Self>) -> BoundingBoxLockStep {
        self.lock_depth.fetch_add(1, Ordering::SeqCst);
        BoundingBoxLockStep {
            owner: self.clone(),
        }
    }

    /// Whether the next [`boxes`](Self::boxes) read will rebuild.
    pub fn is_dirty(&self) -> bool {
        self.cache.lock().is_none()
    }

    /// How many times the pipeline has actually run.
    pub fn rebuild_count(&self) -> u32 {
        self.rebuilds.load(Ordering::Relaxed)
    }

    /// Handle to the boxes-changed event.
    pub fn on_changed(&self) -> Event<BoxesChanged> {
        self.on_changed.clone()
    }
}

impl Drop for BoundingBoxes {
    fn drop(&mut self) {
        if let Some(subscription) = self.matrix_sub.get_mut().take() {
            self.matrix.on_changed().unsubscribe(subscription);
        }
        if let Some(subscription) = self.viewport_sub.get_mut().take() {
            self.viewport.on_changed().unsubscribe(subscription);
        }
    }
}

impl std::fmt::Debug for BoundingBoxes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundingBoxes")
            .field("dirty", &self.is_dirty())
            .field("rebuilds", &self.rebuild_count())
            .field("layer", &self.layer())
            .finish()
    }
}

/// Guard for a deferred-rebuild batch; see [`BoundingBoxes::lock_step`].
pub struct BoundingBoxLockStep {
    owner: Arc<BoundingBoxes>,
}

impl Drop for BoundingBoxLockStep {
    fn drop(&mut self) {
        let remaining = self.owner.lock_depth.fetch_sub(1, Ordering::SeqCst) - 1;
        if remaining == 0 && self.owner.pending.swap(false, Ordering::SeqCst) {
            self.owner.request_rebuild();
        }
    }
}
