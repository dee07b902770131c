//! Model matrix construction.
//!
//! The model matrix maps an object's local space to world space: the local
//! sprite transform composed as scale → rotation → pivot offset →
//! translation, pre-multiplied by the parent's model matrix up the ancestor
//! chain.
//!
//! [`ModelMatrixNode`] caches the composed matrix lazily. It subscribes to
//! its transform's change event and to its parent node's matrix-changed
//! event, so a change anywhere up the chain marks every dependent matrix
//! dirty without walking the tree eagerly; the next read recomputes.

use glam::{Mat4, Vec2};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;

use crate::event::{Event, Subscription};
use crate::transform::{SpriteTransform, TransformState};

/// Args fired when a cached model matrix is invalidated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatrixChanged;

/// Composes the local model matrix for a transform state.
///
/// Applied to a point in reading order: scale (including the room's
/// area-scaling factor), rotation, pivot offset, translation. The pivot is
/// normalized over the sprite size.
pub fn local_matrix(state: &TransformState, area_scale: Vec2) -> Mat4 {
    let scale = state.scale * area_scale;
    let pivot_offset = state.pivot * state.size;

    Mat4::from_translation(state.position.extend(0.0))
        * Mat4::from_translation((-pivot_offset).extend(0.0))
        * Mat4::from_rotation_z(state.rotation)
        * Mat4::from_scale(scale.extend(1.0))
}

/// Cached model matrix for one scene object.
///
/// Holds the object's transform and an optional parent node. The composed
/// matrix is computed on first read and invalidated (never recomputed in
/// place) when the transform, the area scale, the parent link, or any
/// ancestor matrix changes — readers never observe a partially updated
/// matrix.
pub struct ModelMatrixNode {
    transform: Arc<SpriteTransform>,
    area_scale: RwLock<Vec2>,
    parent: RwLock<Option<Arc<ModelMatrixNode>>>,
    cache: Mutex<Option<Mat4>>,
    on_changed: Event<MatrixChanged>,
    transform_sub: Mutex<Option<Subscription>>,
    parent_sub: Mutex<Option<(Arc<ModelMatrixNode>, Subscription)>>,
}

impl ModelMatrixNode {
    /// Creates a root matrix node over `transform` and starts watching it.
    pub fn new(transform: Arc<SpriteTransform>) -> Arc<Self> {
        let node = Arc::new(Self {
            transform: transform.clone(),
            area_scale: RwLock::new(Vec2::ONE),
            parent: RwLock::new(None),
            cache: Mutex::new(None),
            on_changed: Event::new(),
            transform_sub: Mutex::new(None),
            parent_sub: Mutex::new(None),
        });

        let weak = Arc::downgrade(&node);
        match transform.on_changed().subscribe(move |_| {
            if let Some(node) = weak.upgrade() {
                node.invalidate();
            }
        }) {
            Ok(subscription) => *node.transform_sub.lock() = Some(subscription),
            Err(error) => log::error!("model matrix could not watch its transform: {error}"),
        }
        node
    }

    /// The transform this node composes.
    pub fn transform(&self) -> &Arc<SpriteTransform> {
        &self.transform
    }

    /// The current parent node, if any.
    pub fn parent(&self) -> Option<Arc<ModelMatrixNode>> {
        self.parent.read().clone()
    }

    /// Re-wires the parent link, moving the matrix-changed subscription
    /// from the old parent to the new one, and invalidates.
    pub fn set_parent(self: &Arc<Self>, parent: Option<Arc<ModelMatrixNode>>) {
        {
            let mut parent_sub = self.parent_sub.lock();
            if let Some((old_parent, subscription)) = parent_sub.take() {
                old_parent.on_changed.unsubscribe(subscription);
            }
            *self.parent.write() = parent.clone();
            if let Some(parent) = parent {
                let weak = Arc::downgrade(self);
                match parent.on_changed.subscribe(move |_| {
                    if let Some(node) = weak.upgrade() {
                        node.invalidate();
                    }
                }) {
                    Ok(subscription) => *parent_sub = Some((parent, subscription)),
                    Err(error) => {
                        log::error!("model matrix could not watch its parent: {error}")
                    }
                }
            }
        }
        self.invalidate();
    }

    /// The area-scaling factor supplied by the room's scaling areas.
    pub fn area_scale(&self) -> Vec2 {
        *self.area_scale.read()
    }

    /// Updates the area-scaling factor and invalidates on change.
    pub fn set_area_scale(&self, area_scale: Vec2) {
        {
            let mut current = self.area_scale.write();
            if *current == area_scale {
                return;
            }
            *current = area_scale;
        }
        self.invalidate();
    }

    /// The local matrix, ignoring ancestors.
    pub fn local(&self) -> Mat4 {
        local_matrix(&self.transform.state(), self.area_scale())
    }

    /// The composed model matrix, computed on first read since the last
    /// invalidation.
    pub fn matrix(&self) -> Mat4 {
        if let Some(matrix) = *self.cache.lock() {
            return matrix;
        }
        let parent = self.parent.read().clone();
        let local = self.local();
        let matrix = match parent {
            Some(parent) => parent.matrix() * local,
            None => local,
        };
        *self.cache.lock() = Some(matrix);
        matrix
    }

    /// Drops the cached matrix; fires [`MatrixChanged`] when a cached value
    /// was actually dropped so dependents invalidate exactly once per
    /// clean→dirty transition.
    pub fn invalidate(&self) {
        let was_cached = self.cache.lock().take().is_some();
        if was_cached
            && let Err(error) = self.on_changed.invoke(MatrixChanged)
        {
            log::warn!("matrix-changed subscriber failed: {error}");
        }
    }

    /// Whether the next [`matrix`](Self::matrix) read will recompute.
    pub fn is_dirty(&self) -> bool {
        self.cache.lock().is_none()
    }

    /// Handle to the matrix-changed event.
    pub fn on_changed(&self) -> Event<MatrixChanged> {
        self.on_changed.clone()
    }
}

impl Drop for ModelMatrixNode {
    fn drop(&mut self) {
        if let Some(subscription) = self.transform_sub.get_mut().take() {
            self.transform.on_changed().unsubscribe(subscription);
        }
        if let Some((parent, subscription)) = self.parent_sub.get_mut().take() {
            parent.on_changed.unsubscribe(subscription);
        }
    }
}

impl std::fmt::Debug for ModelMatrixNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelMatrixNode")
            .field("dirty", &self.is_dirty())
            .field("has_parent", &self.parent.read().is_some())
            .finish()
    }
}
