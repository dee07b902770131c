//! Scene façade: wires entities, tree nodes, matrices and boxes together.
//!
//! A [`Scene`] spawns [`SceneObject`]s (one entity, sprite transform,
//! model matrix node and bounding-box pipeline each) and keeps the scene
//! tree and the matrix parent chain in step: reparenting an object through
//! the scene re-wires its model matrix under the new parent's, so cached
//! geometry anywhere below the change invalidates through events alone.
//!
//! Reparent objects through the scene, not the raw tree, or matrix parents
//! will go stale.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use glam::{Vec2, vec2};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::bounds_builder::BoundingBoxes;
use crate::entity::{Entity, EntityTable};
use crate::factory::ComponentFactories;
use crate::layer::RenderLayer;
use crate::mask::PixelMask;
use crate::matrix::ModelMatrixNode;
use crate::transform::SpriteTransform;
use crate::tree::{NodeId, Tree, TreeError};
use crate::viewport::{Viewport, ViewportMatrixCache};

/// One flat parent edge, the unit serialization reconstructs trees from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneLink {
    /// Object id.
    pub id: String,
    /// Parent object id, `None` for roots.
    pub parent: Option<String>,
}

/// One game object: an entity plus its spatial pipeline.
pub struct SceneObject {
    entity: Arc<Entity>,
    transform: Arc<SpriteTransform>,
    matrix: Arc<ModelMatrixNode>,
    boxes: Arc<BoundingBoxes>,
    mask: RwLock<Option<PixelMask>>,
    node: std::sync::OnceLock<NodeId>,
    enabled: AtomicBool,
}

impl SceneObject {
    /// The object's id (same as its entity id).
    pub fn id(&self) -> &str {
        self.entity.id()
    }

    /// The entity holding the object's components.
    pub fn entity(&self) -> &Arc<Entity> {
        &self.entity
    }

    /// The object's local sprite transform.
    pub fn transform(&self) -> &Arc<SpriteTransform> {
        &self.transform
    }

    /// The object's model matrix node.
    pub fn matrix(&self) -> &Arc<ModelMatrixNode> {
        &self.matrix
    }

    /// The object's bounding-box pipeline.
    pub fn boxes(&self) -> &Arc<BoundingBoxes> {
        &self.boxes
    }

    /// The object's handle in the scene tree.
    pub fn node(&self) -> NodeId {
        *self.node.get().expect("node is assigned at spawn")
    }

    /// The object's render layer.
    pub fn layer(&self) -> Option<RenderLayer> {
        self.boxes.layer()
    }

    /// Assigns the object's render layer.
    pub fn set_layer(&self, layer: Option<RenderLayer>) {
        self.boxes.set_layer(layer);
    }

    /// Whether the object participates in hit testing.
    pub fn enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Toggles hit-testing participation.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    /// Installs a pixel mask, switching hit tests to pixel-perfect.
    pub fn set_mask(&self, mask: PixelMask) {
        *self.mask.write() = Some(mask);
    }

    /// Removes the pixel mask, reverting to box-only hit tests.
    pub fn clear_mask(&self) {
        *self.mask.write() = None;
    }

    /// Point hit test in world space.
    ///
    /// Resolves to a point-in-hit-test-box check; when a pixel mask is
    /// installed, the point is additionally mapped through the inverse
    /// model matrix and sampled against the mask. Disabled objects collide
    /// with nothing.
    pub fn collides_with(&self, x: f32, y: f32) -> bool {
        if !self.enabled() {
            return false;
        }
        let point = vec2(x, y);
        if !self.boxes.hit_test_box().contains(point) {
            return false;
        }
        let mask = self.mask.read();
        match &*mask {
            Some(mask) => {
                let inverse = self.matrix.matrix().inverse();
                let local = inverse.transform_point3(point.extend(0.0)).truncate();
                mask.covers_point(local)
            }
            None => true,
        }
    }
}

impl std::fmt::Debug for SceneObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SceneObject")
            .field("id", &self.id())
            .field("enabled", &self.enabled())
            .field("layer", &self.layer())
            .finish()
    }
}

/// The object factory and root container for one room/scene.
pub struct Scene {
    table: EntityTable,
    tree: Tree<Arc<SceneObject>>,
    objects: RwLock<HashMap<String, Arc<SceneObject>>>,
    viewport: Arc<Viewport>,
    viewports: Arc<ViewportMatrixCache>,
}

impl Scene {
    /// Creates an empty scene rendering to a window of the given size.
    pub fn new(factories: Arc<ComponentFactories>, window: Vec2) -> Self {
        Self {
            table: EntityTable::new(factories),
            tree: Tree::new(),
            objects: RwLock::new(HashMap::new()),
            viewport: Arc::new(Viewport::new(window)),
            viewports: Arc::new(ViewportMatrixCache::new()),
        }
    }

    /// The scene's camera.
    pub fn viewport(&self) -> &Arc<Viewport> {
        &self.viewport
    }

    /// The scene's viewport matrix memo. Call
    /// [`begin_frame`](ViewportMatrixCache::begin_frame) on it once per
    /// frame.
    pub fn viewports(&self) -> &Arc<ViewportMatrixCache> {
        &self.viewports
    }

    /// The scene tree. Read-only traversal is fine; reparent through the
    /// scene so matrix parents stay wired.
    pub fn tree(&self) -> &Tree<Arc<SceneObject>> {
        &self.tree
    }

    /// The entity registry backing this scene.
    pub fn entities(&self) -> &EntityTable {
        &self.table
    }

    /// Returns the object with this id, creating it as a root if absent.
    pub fn spawn(&self, id: &str) -> Arc<SceneObject> {
        if let Some(existing) = self.get(id) {
            return existing;
        }

        let mut objects = self.objects.write();
        if let Some(existing) = objects.get(id) {
            return existing.clone();
        }

        let entity = self.table.spawn(id);
        let transform = Arc::new(SpriteTransform::new());
        let matrix = ModelMatrixNode::new(transform.clone());
        let boxes = BoundingBoxes::new(matrix.clone(), self.viewport.clone(), self.viewports.clone());
        let object = Arc::new(SceneObject {
            entity,
            transform,
            matrix,
            boxes,
            mask: RwLock::new(None),
            node: std::sync::OnceLock::new(),
            enabled: AtomicBool::new(true),
        });
        let node = self.tree.insert(object.clone());
        let _ = object.node.set(node);
        objects.insert(id.to_string(), object.clone());
        object
    }

    /// Looks up a live object by id.
    pub fn get(&self, id: &str) -> Option<Arc<SceneObject>> {
        self.objects.read().get(id).cloned()
    }

    /// Number of live objects.
    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    /// Whether the scene holds no objects.
    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }

    /// Reparents `child` under `parent` (or to the root for `None`),
    /// keeping the tree and the matrix chain in step.
    pub fn set_parent(
        &self,
        child: &Arc<SceneObject>,
        parent: Option<&Arc<SceneObject>>,
    ) -> Result<(), TreeError> {
        self.tree
            .set_parent(child.node(), parent.map(|p| p.node()))?;
        child
            .matrix
            .set_parent(parent.map(|p| p.matrix.clone()));
        Ok(())
    }

    /// Attaches `child` under `parent`; idempotent.
    pub fn add_child(
        &self,
        parent: &Arc<SceneObject>,
        child: &Arc<SceneObject>,
    ) -> Result<(), TreeError> {
        self.set_parent(child, Some(parent))
    }

    /// Attaches several children in order.
    pub fn add_children(
        &self,
        parent: &Arc<SceneObject>,
        children: &[&Arc<SceneObject>],
    ) -> Result<(), TreeError> {
        for child in children {
            self.add_child(parent, child)?;
        }
        Ok(())
    }

    /// Detaches `child` if it is currently under `parent`; idempotent.
    pub fn remove_child(
        &self,
        parent: &Arc<SceneObject>,
        child: &Arc<SceneObject>,
    ) -> Result<bool, TreeError> {
        if self.tree.parent(child.node()) != Some(parent.node()) {
            return Ok(false);
        }
        self.set_parent(child, None)?;
        Ok(true)
    }

    /// Reparents `object` to `victim`'s former parent and detaches the
    /// victim; a parentless victim degrades this to a plain detach.
    pub fn steal_parent(
        &self,
        object: &Arc<SceneObject>,
        victim: &Arc<SceneObject>,
    ) -> Result<(), TreeError> {
        let target = self
            .tree
            .parent(victim.node())
            .and_then(|id| self.object_for(id));
        self.set_parent(victim, None)?;
        self.set_parent(object, target.as_ref())
    }

    /// Removes an object: children become roots, the entity and all its
    /// components are disposed.
    pub fn despawn(&self, id: &str) -> bool {
        let Some(object) = self.objects.write().remove(id) else {
            return false;
        };
        let node = object.node();
        let children = self.tree.children(node);
        self.tree.remove(node);
        for child in children {
            if let Some(child_object) = self.object_for(child) {
                child_object.matrix.set_parent(None);
            }
        }
        self.table.despawn(id);
        true
    }

    /// Exports the tree as flat `(id, parent-id)` edges, sorted by id.
    ///
    /// Together with [`restore_links`](Self::restore_links) this is the
    /// round-trip surface the serialization subsystem builds on: the full
    /// hierarchy is reconstructible from these pairs alone.
    pub fn links(&self) -> Vec<SceneLink> {
        let snapshot: Vec<Arc<SceneObject>> = self.objects.read().values().cloned().collect();
        let mut links: Vec<SceneLink> = snapshot
            .iter()
            .map(|object| SceneLink {
                id: object.id().to_string(),
                parent: self
                    .tree
                    .parent(object.node())
                    .and_then(|parent| self.tree.with(parent, |p| p.id().to_string())),
            })
            .collect();
        links.sort_by(|a, b| a.id.cmp(&b.id));
        links
    }

    /// Rebuilds parent edges from flat links.
    ///
    /// Links naming unknown objects are skipped with a warning; everything
    /// else is applied through [`set_parent`](Self::set_parent).
    pub fn restore_links(&self, links: &[SceneLink]) -> Result<(), TreeError> {
        for link in links {
            let Some(child) = self.get(&link.id) else {
                log::warn!("skipping link for unknown object `{}`", link.id);
                continue;
            };
            let parent = match &link.parent {
                Some(parent_id) => match self.get(parent_id) {
                    Some(parent) => Some(parent),
                    None => {
                        log::warn!(
                            "skipping link `{}` -> unknown parent `{parent_id}`",
                            link.id
                        );
                        continue;
                    }
                },
                None => None,
            };
            self.set_parent(&child, parent.as_ref())?;
        }
        Ok(())
    }

    fn object_for(&self, id: NodeId) -> Option<Arc<SceneObject>> {
        self.tree.with(id, |object| object.clone())
    }
}

impl std::fmt::Debug for Scene {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scene").field("objects", &self.len()).finish()
    }
}
