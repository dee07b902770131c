//! Parent/child scene tree over arena-allocated nodes.
//!
//! A [`Tree<T>`] stores nodes in an arena and hands out generational
//! [`NodeId`] handles. Parent links are plain ids into the arena — a
//! navigational relation, not an ownership edge — so reparenting and
//! teardown cannot produce dangling references or ownership cycles, and the
//! hierarchy can be torn down leaf-first.
//!
//! Every mutation keeps the invariant that a node's parent pointer and the
//! parent's child set agree: the child set follows the parent pointer
//! automatically through the two-phase detach/attach in
//! [`set_parent`](Tree::set_parent).
//!
//! Children are kept in insertion order. Draw order is derived separately
//! from render layers, but bulk-add ordering is part of the public contract.

use parking_lot::RwLock;
use thiserror::Error;

use crate::event::Event;

/// Generational handle to a node in a [`Tree`].
///
/// A stale handle (its node was removed, even if the slot was reused) is
/// detected by the generation and treated as dead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

impl NodeId {
    /// Slot index in the arena.
    pub fn index(&self) -> u32 {
        self.index
    }
}

/// Args fired on a node's parent-changed event after every successful
/// reparenting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParentChanged {
    /// The reparented node.
    pub node: NodeId,
    /// Parent before the change.
    pub old_parent: Option<NodeId>,
    /// Parent after the change.
    pub new_parent: Option<NodeId>,
}

/// Errors raised by tree mutations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TreeError {
    /// The handle is stale or its node was removed.
    #[error("node handle is stale or was removed")]
    DeadNode,
    /// A node cannot be its own parent.
    #[error("a node cannot be its own parent")]
    SelfParent,
    /// The requested reparenting would make a node its own ancestor.
    #[error("reparenting would make a node its own ancestor")]
    WouldCycle,
}

struct NodeEntry<T> {
    item: T,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    on_parent_changed: Event<ParentChanged>,
}

impl<T> NodeEntry<T> {
    fn new(item: T) -> Self {
        Self {
            item,
            parent: None,
            children: Vec::new(),
            on_parent_changed: Event::new(),
        }
    }
}

struct Slot<T> {
    generation: u32,
    entry: Option<NodeEntry<T>>,
}

struct Storage<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
}

impl<T> Storage<T> {
    fn entry(&self, id: NodeId) -> Option<&NodeEntry<T>> {
        let slot = self.slots.get(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.entry.as_ref()
    }

    fn entry_mut(&mut self, id: NodeId) -> Option<&mut NodeEntry<T>> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.entry.as_mut()
    }

    /// Whether `ancestor` appears in the parent chain above `node`.
    fn is_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = self.entry(node).and_then(|entry| entry.parent);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.entry(id).and_then(|entry| entry.parent);
        }
        false
    }
}

/// Arena-backed parent/child graph.
///
/// All operations take `&self`; interior locking makes concurrent readers
/// and writers safe. Parent-changed notifications fire after the lock is
/// released, so subscribers may freely call back into the tree.
pub struct Tree<T> {
    storage: RwLock<Storage<T>>,
}

impl<T> Tree<T> {
    /// Creates an empty tree.
    pub fn new() -> Self {
        Self {
            storage: RwLock::new(Storage {
                slots: Vec::new(),
                free: Vec::new(),
            }),
        }
    }

    /// Inserts a root node and returns its handle.
    pub fn insert(&self, item: T) -> NodeId {
        let mut storage = self.storage.write();
        match storage.free.pop() {
            Some(index) => {
                let slot = &mut storage.slots[index as usize];
                slot.entry = Some(NodeEntry::new(item));
                NodeId {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                let index = storage.slots.len() as u32;
                storage.slots.push(Slot {
                    generation: 0,
                    entry: Some(NodeEntry::new(item)),
                });
                NodeId {
                    index,
                    generation: 0,
                }
            }
        }
    }

    /// Removes a node, returning its item.
    ///
    /// The node is detached from its parent and its children become roots;
    /// each orphaned child's parent-changed event fires.
    pub fn remove(&self, id: NodeId) -> Option<T> {
        let (item, notifications) = {
            let mut storage = self.storage.write();
            let parent = storage.entry(id)?.parent;
            if let Some(parent_id) = parent
                && let Some(parent_entry) = storage.entry_mut(parent_id)
            {
                parent_entry.children.retain(|&child| child != id);
            }

            let slot = &mut storage.slots[id.index as usize];
            let entry = slot.entry.take()?;
            slot.generation = slot.generation.wrapping_add(1);
            storage.free.push(id.index);

            let mut notifications = Vec::new();
            for &child in &entry.children {
                if let Some(child_entry) = storage.entry_mut(child) {
                    child_entry.parent = None;
                    notifications.push((
                        child_entry.on_parent_changed.clone(),
                        ParentChanged {
                            node: child,
                            old_parent: Some(id),
                            new_parent: None,
                        },
                    ));
                }
            }
            (entry.item, notifications)
        };

        for (event, args) in notifications {
            if let Err(error) = event.invoke(args) {
                log::warn!("parent-changed subscriber failed for orphaned node: {error}");
            }
        }
        Some(item)
    }

    /// Whether the handle refers to a live node.
    pub fn contains(&self, id: NodeId) -> bool {
        self.storage.read().entry(id).is_some()
    }

    /// Number of live nodes.
    pub fn len(&self) -> usize {
        self.storage
            .read()
            .slots
            .iter()
            .filter(|slot| slot.entry.is_some())
            .count()
    }

    /// Whether the tree holds no nodes.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reparents `child` under `new_parent` (or makes it a root for `None`).
    ///
    /// Two-phase: the child is first detached from its old parent's child
    /// set, then attached to the new parent's, so the parent pointer and
    /// child sets agree after every call and subscribers are notified
    /// exactly once. Reparenting to the current parent is a no-op.
    pub fn set_parent(&self, child: NodeId, new_parent: Option<NodeId>) -> Result<(), TreeError> {
        let (event, args) = {
            let mut storage = self.storage.write();
            let current = storage.entry(child).ok_or(TreeError::DeadNode)?.parent;
            if current == new_parent {
                return Ok(());
            }
            if let Some(parent) = new_parent {
                if parent == child {
                    return Err(TreeError::SelfParent);
                }
                storage.entry(parent).ok_or(TreeError::DeadNode)?;
                if storage.is_ancestor(child, parent) {
                    return Err(TreeError::WouldCycle);
                }
            }

            // Phase 1: detach from the old parent's child set.
            if let Some(old) = current
                && let Some(entry) = storage.entry_mut(old)
            {
                entry.children.retain(|&c| c != child);
            }

            // Phase 2: attach to the new parent's child set.
            if let Some(parent) = new_parent
                && let Some(entry) = storage.entry_mut(parent)
                && !entry.children.contains(&child)
            {
                entry.children.push(child);
            }

            let entry = storage.entry_mut(child).ok_or(TreeError::DeadNode)?;
            entry.parent = new_parent;
            (
                entry.on_parent_changed.clone(),
                ParentChanged {
                    node: child,
                    old_parent: current,
                    new_parent,
                },
            )
        };

        if let Err(error) = event.invoke(args) {
            log::warn!("parent-changed subscriber failed for reparented node: {error}");
        }
        Ok(())
    }

    /// Attaches `child` under `parent`.
    ///
    /// Idempotent: a child already under `parent` is left untouched;
    /// otherwise this delegates into [`set_parent`](Self::set_parent).
    pub fn add_child(&self, parent: NodeId, child: NodeId) -> Result<(), TreeError> {
        self.set_parent(child, Some(parent))
    }

    /// Attaches several children in order.
    pub fn add_children(&self, parent: NodeId, children: &[NodeId]) -> Result<(), TreeError> {
        for &child in children {
            self.add_child(parent, child)?;
        }
        Ok(())
    }

    /// Detaches `child` if it is currently under `parent`.
    ///
    /// Idempotent: returns `Ok(false)` when the child was not attached here.
    pub fn remove_child(&self, parent: NodeId, child: NodeId) -> Result<bool, TreeError> {
        if self.parent(child) != Some(parent) {
            return Ok(false);
        }
        self.set_parent(child, None)?;
        Ok(true)
    }

    /// Reparents `node` to `victim`'s former parent and makes `victim` a
    /// root.
    ///
    /// Transfers "composite root" status between interchangeable nodes. A
    /// victim with no parent degrades this to `set_parent(node, None)`.
    pub fn steal_parent(&self, node: NodeId, victim: NodeId) -> Result<(), TreeError> {
        let target = if self.contains(victim) {
            self.parent(victim)
        } else {
            return Err(TreeError::DeadNode);
        };
        self.set_parent(victim, None)?;
        self.set_parent(node, target)
    }

    /// The node's current parent, or `None` for roots and dead handles.
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.storage.read().entry(id).and_then(|entry| entry.parent)
    }

    /// Snapshot of the node's children in insertion order.
    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        self.storage
            .read()
            .entry(id)
            .map(|entry| entry.children.clone())
            .unwrap_or_default()
    }

    /// Number of children under the node.
    pub fn children_count(&self, id: NodeId) -> usize {
        self.storage
            .read()
            .entry(id)
            .map(|entry| entry.children.len())
            .unwrap_or(0)
    }

    /// Whether `child` is directly under `parent`.
    pub fn has_child(&self, parent: NodeId, child: NodeId) -> bool {
        self.storage
            .read()
            .entry(parent)
            .is_some_and(|entry| entry.children.contains(&child))
    }

    /// Depth-first search over the node's descendants (the node itself is
    /// excluded); returns the first match.
    pub fn find_descendant(
        &self,
        root: NodeId,
        predicate: impl Fn(&T) -> bool,
    ) -> Option<NodeId> {
        let storage = self.storage.read();
        let root_entry = storage.entry(root)?;
        let mut stack: Vec<NodeId> = root_entry.children.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            if let Some(entry) = storage.entry(id) {
                if predicate(&entry.item) {
                    return Some(id);
                }
                stack.extend(entry.children.iter().rev().copied());
            }
        }
        None
    }

    /// Scans the node's preceding siblings from nearest to farthest and
    /// returns the first match.
    pub fn find_previous_sibling(
        &self,
        node: NodeId,
        predicate: impl Fn(&T) -> bool,
    ) -> Option<NodeId> {
        let storage = self.storage.read();
        let parent = storage.entry(node)?.parent?;
        let siblings = &storage.entry(parent)?.children;
        let position = siblings.iter().position(|&sibling| sibling == node)?;
        siblings[..position]
            .iter()
            .rev()
            .find(|&&id| storage.entry(id).is_some_and(|entry| predicate(&entry.item)))
            .copied()
    }

    /// Handle to the node's parent-changed event.
    pub fn on_parent_changed(&self, id: NodeId) -> Option<Event<ParentChanged>> {
        self.storage
            .read()
            .entry(id)
            .map(|entry| entry.on_parent_changed.clone())
    }

    /// Runs `f` against the node's item.
    pub fn with<R>(&self, id: NodeId, f: impl FnOnce(&T) -> R) -> Option<R> {
        let storage = self.storage.read();
        storage.entry(id).map(|entry| f(&entry.item))
    }
}

impl<T> Default for Tree<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn insert_creates_roots() {
        let tree = Tree::new();
        let a = tree.insert("a");
        let b = tree.insert("b");

        assert_eq!(tree.len(), 2);
        assert!(tree.contains(a));
        assert_eq!(tree.parent(a), None);
        assert_eq!(tree.parent(b), None);
    }

    #[test]
    fn add_child_keeps_both_sides_consistent() {
        let tree = Tree::new();
        let parent = tree.insert("parent");
        let child = tree.insert("child");

        tree.add_child(parent, child).unwrap();
        assert_eq!(tree.parent(child), Some(parent));
        assert!(tree.has_child(parent, child));

        tree.remove_child(parent, child).unwrap();
        assert_eq!(tree.parent(child), None);
        assert!(!tree.has_child(parent, child));
    }

    #[test]
    fn add_child_idempotent() {
        let tree = Tree::new();
        let parent = tree.insert("parent");
        let child = tree.insert("child");

        tree.add_child(parent, child).unwrap();
        tree.add_child(parent, child).unwrap();

        assert_eq!(tree.children_count(parent), 1);
    }

    #[test]
    fn add_children_preserves_order() {
        let tree = Tree::new();
        let parent = tree.insert("parent");
        let c1 = tree.insert("c1");
        let c2 = tree.insert("c2");

        tree.add_children(parent, &[c1, c2]).unwrap();

        let children = tree.children(parent);
        assert_eq!(children, vec![c1, c2]);
        assert_eq!(tree.parent(c1), Some(parent));
        assert_eq!(tree.parent(c2), Some(parent));
    }

    #[test]
    fn remove_child_is_idempotent() {
        let tree = Tree::new();
        let parent = tree.insert("parent");
        let child = tree.insert("child");

        assert!(!tree.remove_child(parent, child).unwrap());
        tree.add_child(parent, child).unwrap();
        assert!(tree.remove_child(parent, child).unwrap());
        assert!(!tree.remove_child(parent, child).unwrap());
    }

    #[test]
    fn reparenting_moves_between_parents() {
        let tree = Tree::new();
        let first = tree.insert("first");
        let second = tree.insert("second");
        let child = tree.insert("child");

        tree.set_parent(child, Some(first)).unwrap();
        tree.set_parent(child, Some(second)).unwrap();

        assert_eq!(tree.parent(child), Some(second));
        assert!(!tree.has_child(first, child));
        assert!(tree.has_child(second, child));
    }

    #[test]
    fn self_parent_rejected() {
        let tree = Tree::new();
        let node = tree.insert("node");
        assert_eq!(
            tree.set_parent(node, Some(node)),
            Err(TreeError::SelfParent)
        );
    }

    #[test]
    fn cycles_rejected() {
        let tree = Tree::new();
        let grandparent = tree.insert("grandparent");
        let parent = tree.insert("parent");
        let child = tree.insert("child");

        tree.add_child(grandparent, parent).unwrap();
        tree.add_child(parent, child).unwrap();

        assert_eq!(
            tree.set_parent(grandparent, Some(child)),
            Err(TreeError::WouldCycle)
        );
        // Hierarchy untouched
        assert_eq!(tree.parent(grandparent), None);
        assert_eq!(tree.parent(child), Some(parent));
    }

    #[test]
    fn steal_parent_transfers_root_status() {
        let tree = Tree::new();
        let host = tree.insert("host");
        let victim = tree.insert("victim");
        let node = tree.insert("node");

        tree.add_child(host, victim).unwrap();
        tree.steal_parent(node, victim).unwrap();

        assert_eq!(tree.parent(node), Some(host));
        assert_eq!(tree.parent(victim), None);
        assert!(tree.has_child(host, node));
        assert!(!tree.has_child(host, victim));
    }

    #[test]
    fn steal_parent_from_orphan_degrades_to_detach() {
        let tree = Tree::new();
        let parent = tree.insert("parent");
        let victim = tree.insert("victim");
        let node = tree.insert("node");

        tree.add_child(parent, node).unwrap();
        tree.steal_parent(node, victim).unwrap();

        assert_eq!(tree.parent(node), None);
        assert_eq!(tree.parent(victim), None);
    }

    #[test]
    fn find_descendant_depth_first() {
        let tree = Tree::new();
        let root = tree.insert(0);
        let a = tree.insert(1);
        let b = tree.insert(2);
        let a_child = tree.insert(3);

        tree.add_children(root, &[a, b]).unwrap();
        tree.add_child(a, a_child).unwrap();

        // Depth-first: a's subtree is fully visited before b.
        assert_eq!(tree.find_descendant(root, |&v| v == 3), Some(a_child));
        assert_eq!(tree.find_descendant(root, |&v| v == 2), Some(b));
        assert_eq!(tree.find_descendant(root, |&v| v > 10), None);
        // Root itself is excluded.
        assert_eq!(tree.find_descendant(root, |&v| v == 0), None);
    }

    #[test]
    fn find_previous_sibling_scans_backwards() {
        let tree = Tree::new();
        let parent = tree.insert("parent");
        let a = tree.insert("a");
        let b = tree.insert("b");
        let c = tree.insert("c");

        tree.add_children(parent, &[a, b, c]).unwrap();

        assert_eq!(tree.find_previous_sibling(c, |item| *item == "a"), Some(a));
        assert_eq!(tree.find_previous_sibling(c, |_| true), Some(b));
        assert_eq!(tree.find_previous_sibling(a, |_| true), None);
    }

    #[test]
    fn parent_changed_fires_on_success_only() {
        let tree = Tree::new();
        let parent = tree.insert("parent");
        let child = tree.insert("child");

        let changes = Arc::new(AtomicU32::new(0));
        let changes_clone = changes.clone();
        tree.on_parent_changed(child)
            .unwrap()
            .subscribe(move |args: &ParentChanged| {
                assert_eq!(args.old_parent, None);
                changes_clone.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        tree.add_child(parent, child).unwrap();
        // No-op reparenting does not notify again.
        tree.add_child(parent, child).unwrap();

        assert_eq!(changes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn remove_orphans_children() {
        let tree = Tree::new();
        let parent = tree.insert("parent");
        let child = tree.insert("child");
        tree.add_child(parent, child).unwrap();

        let orphaned = Arc::new(AtomicU32::new(0));
        let orphaned_clone = orphaned.clone();
        tree.on_parent_changed(child)
            .unwrap()
            .subscribe(move |args: &ParentChanged| {
                if args.new_parent.is_none() {
                    orphaned_clone.fetch_add(1, Ordering::SeqCst);
                }
            })
            .unwrap();

        assert_eq!(tree.remove(parent), Some("parent"));
        assert_eq!(tree.parent(child), None);
        assert_eq!(orphaned.load(Ordering::SeqCst), 1);
        assert!(tree.contains(child));
    }

    #[test]
    fn stale_handles_are_dead() {
        let tree = Tree::new();
        let node = tree.insert("node");
        let other = tree.insert("other");

        tree.remove(node);
        assert!(!tree.contains(node));
        assert_eq!(
            tree.set_parent(other, Some(node)),
            Err(TreeError::DeadNode)
        );

        // Slot reuse bumps the generation, so the old handle stays dead.
        let replacement = tree.insert("replacement");
        assert_eq!(replacement.index(), node.index());
        assert!(!tree.contains(node));
        assert!(tree.contains(replacement));
    }

    #[test]
    fn with_reads_item() {
        let tree = Tree::new();
        let node = tree.insert(41);
        assert_eq!(tree.with(node, |v| v + 1), Some(42));
    }
}
