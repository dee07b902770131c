//! Entities: string-identified bags of components.
//!
//! An [`Entity`] owns a mapping from component type to an ordered list of
//! instances. Adds use a single write-guarded compare-and-insert, so N
//! concurrent `add_component::<T>()` calls for an exclusive `T` store
//! exactly one instance and every caller observes that same instance.
//!
//! The [`EntityTable`] is the id → entity registry the scene tree indexes
//! into.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;

use crate::component::{Component, ComponentError};
use crate::factory::ComponentFactories;

fn downcast<T: Component>(component: Arc<dyn Component>) -> Option<Arc<T>> {
    let any: Arc<dyn Any + Send + Sync> = component;
    any.downcast::<T>().ok()
}

fn type_id_of(component: &Arc<dyn Component>) -> TypeId {
    let any: &dyn Any = &**component;
    any.type_id()
}

/// A named bag of components representing one game object.
///
/// Entities are created at object-factory time (see
/// [`EntityTable::spawn`]) and disposed when removed from the game world,
/// disposing every owned component. Both the update and render threads may
/// read an entity concurrently; writers go through the interior lock.
pub struct Entity {
    id: String,
    factories: Arc<ComponentFactories>,
    components: RwLock<HashMap<TypeId, Vec<Arc<dyn Component>>>>,
    disposed: AtomicBool,
}

impl Entity {
    /// Creates an entity with the given unique id.
    pub fn new(id: impl Into<String>, factories: Arc<ComponentFactories>) -> Arc<Self> {
        Arc::new(Self {
            id: id.into(),
            factories,
            components: RwLock::new(HashMap::new()),
            disposed: AtomicBool::new(false),
        })
    }

    /// The entity's unique id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Creates a component of type `T` via its registered factory and
    /// attaches it.
    ///
    /// For an exclusive type that is already present this is a no-op
    /// returning the existing instance — never an error, even under
    /// concurrent callers: insertion is one compare-and-insert under the
    /// write guard, and the loser of a race gets the winner's instance
    /// (its own construction is dropped without `init` running).
    ///
    /// The winning instance becomes visible to readers before its `init`
    /// completes; a failing `init` detaches it again and the error
    /// propagates.
    pub fn add_component<T: Component>(&self) -> Result<Arc<T>, ComponentError> {
        let registration =
            self.factories
                .get(TypeId::of::<T>())
                .ok_or(ComponentError::NotRegistered {
                    type_name: std::any::type_name::<T>(),
                })?;

        // Fast path: duplicate exclusive add without constructing anything.
        if !registration.allow_multiple
            && let Some(existing) = self.get_component::<T>()
        {
            return Ok(existing);
        }

        let instance = registration.construct();
        let typed = downcast::<T>(instance.clone()).expect("factory constructs the registered type");

        {
            let mut components = self.components.write();
            if self.disposed.load(Ordering::SeqCst) {
                return Err(ComponentError::Disposed(self.id.clone()));
            }
            let list = components.entry(TypeId::of::<T>()).or_default();
            if !registration.allow_multiple
                && let Some(existing) = list.first()
            {
                // Lost the race: another caller inserted first.
                return Ok(downcast::<T>(existing.clone()).expect("list is keyed by type id"));
            }
            list.push(instance.clone());
        }

        if let Err(error) = instance.init(self) {
            self.detach(&instance);
            return Err(error);
        }
        Ok(typed)
    }

    /// Attaches an externally constructed component instance.
    ///
    /// Returns `Ok(false)` without attaching when the instance's type is
    /// exclusive and already present. The type must have been registered.
    pub fn add_component_instance(
        &self,
        instance: Arc<dyn Component>,
    ) -> Result<bool, ComponentError> {
        let type_id = type_id_of(&instance);
        let registration = self
            .factories
            .get(type_id)
            .ok_or(ComponentError::NotRegistered {
                type_name: instance.name(),
            })?;

        {
            let mut components = self.components.write();
            if self.disposed.load(Ordering::SeqCst) {
                return Err(ComponentError::Disposed(self.id.clone()));
            }
            let list = components.entry(type_id).or_default();
            if !registration.allow_multiple && !list.is_empty() {
                return Ok(false);
            }
            list.push(instance.clone());
        }

        if let Err(error) = instance.init(self) {
            self.detach(&instance);
            return Err(error);
        }
        Ok(true)
    }

    /// Returns the first component of type `T`, if any.
    pub fn get_component<T: Component>(&self) -> Option<Arc<T>> {
        let components = self.components.read();
        let first = components.get(&TypeId::of::<T>())?.first()?.clone();
        drop(components);
        downcast::<T>(first)
    }

    /// Returns every component of type `T` in attachment order.
    pub fn get_components<T: Component>(&self) -> Vec<Arc<T>> {
        let snapshot: Vec<_> = {
            let components = self.components.read();
            components
                .get(&TypeId::of::<T>())
                .map(|list| list.to_vec())
                .unwrap_or_default()
        };
        snapshot.into_iter().filter_map(downcast::<T>).collect()
    }

    /// Whether a component of type `T` is attached.
    pub fn has_component<T: Component>(&self) -> bool {
        self.components
            .read()
            .get(&TypeId::of::<T>())
            .is_some_and(|list| !list.is_empty())
    }

    /// Detaches and disposes one specific component instance.
    ///
    /// Returns `true` if the instance was attached.
    pub fn remove_component(&self, instance: &Arc<dyn Component>) -> bool {
        let removed = {
            let mut components = self.components.write();
            let type_id = type_id_of(instance);
            match components.get_mut(&type_id) {
                Some(list) => {
                    let before = list.len();
                    list.retain(|stored| !Arc::ptr_eq(stored, instance));
                    let removed = list.len() != before;
                    if list.is_empty() {
                        components.remove(&type_id);
                    }
                    removed
                }
                None => false,
            }
        };
        if removed {
            instance.dispose();
        }
        removed
    }

    /// Detaches and disposes every component of type `T`.
    ///
    /// Returns `true` if any instance was removed.
    pub fn remove_components<T: Component>(&self) -> bool {
        let removed = self.components.write().remove(&TypeId::of::<T>());
        match removed {
            Some(list) => {
                for component in &list {
                    component.dispose();
                }
                !list.is_empty()
            }
            None => false,
        }
    }

    /// Snapshot of every attached component, across all types.
    ///
    /// Enumeration order across types is unspecified; within one type it is
    /// attachment order. Used by serialization and bulk lifecycle passes.
    pub fn components(&self) -> Vec<Arc<dyn Component>> {
        self.components
            .read()
            .values()
            .flat_map(|list| list.iter().cloned())
            .collect()
    }

    /// Total number of attached component instances.
    pub fn component_count(&self) -> usize {
        self.components.read().values().map(Vec::len).sum()
    }

    /// Disposes the entity: detaches and disposes every component.
    ///
    /// Idempotent. Further component adds fail with
    /// [`ComponentError::Disposed`].
    pub fn dispose(&self) {
        let drained: Vec<Arc<dyn Component>> = {
            let mut components = self.components.write();
            if self.disposed.swap(true, Ordering::SeqCst) {
                return;
            }
            components.drain().flat_map(|(_, list)| list).collect()
        };
        for component in &drained {
            component.dispose();
        }
    }

    /// Whether [`dispose`](Self::dispose) has run.
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Removes an instance without disposing it (failed-init cleanup).
    fn detach(&self, instance: &Arc<dyn Component>) {
        let mut components = self.components.write();
        let type_id = type_id_of(instance);
        if let Some(list) = components.get_mut(&type_id) {
            list.retain(|stored| !Arc::ptr_eq(stored, instance));
            if list.is_empty() {
                components.remove(&type_id);
            }
        }
    }
}

impl std::fmt::Debug for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Entity")
            .field("id", &self.id)
            .field("components", &self.component_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// Registry of live entities keyed by id.
pub struct EntityTable {
    factories: Arc<ComponentFactories>,
    entities: RwLock<HashMap<String, Arc<Entity>>>,
}

impl EntityTable {
    /// Creates an empty table backed by the given factories.
    pub fn new(factories: Arc<ComponentFactories>) -> Self {
        Self {
            factories,
            entities: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the entity with this id, creating it if absent.
    ///
    /// Create-if-absent is atomic: concurrent spawns of the same id all
    /// receive the same entity.
    pub fn spawn(&self, id: &str) -> Arc<Entity> {
        let mut entities = self.entities.write();
        entities
            .entry(id.to_string())
            .or_insert_with(|| Entity::new(id, self.factories.clone()))
            .clone()
    }

    /// Looks up a live entity by id.
    pub fn get(&self, id: &str) -> Option<Arc<Entity>> {
        self.entities.read().get(id).cloned()
    }

    /// Whether an entity with this id is live.
    pub fn contains(&self, id: &str) -> bool {
        self.entities.read().contains_key(id)
    }

    /// Removes and disposes the entity with this id.
    pub fn despawn(&self, id: &str) -> bool {
        let removed = self.entities.write().remove(id);
        match removed {
            Some(entity) => {
                entity.dispose();
                true
            }
            None => false,
        }
    }

    /// Number of live entities.
    pub fn len(&self) -> usize {
        self.entities.read().len()
    }

    /// Whether the table holds no entities.
    pub fn is_empty(&self) -> bool {
        self.entities.read().is_empty()
    }

    /// Snapshot of the live entity ids.
    pub fn ids(&self) -> Vec<String> {
        self.entities.read().keys().cloned().collect()
    }

    /// The factory table entities in this registry construct from.
    pub fn factories(&self) -> &Arc<ComponentFactories> {
        &self.factories
    }
}
