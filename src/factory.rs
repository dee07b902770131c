//! Explicit component registration.
//!
//! Component types are declared up front on a [`FactoryBuilder`] together
//! with their constructor and multiplicity, producing an immutable
//! [`ComponentFactories`] table shared by every entity. This replaces
//! reflection-based component discovery with plain registration at startup.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

use crate::component::Component;

/// Registration record for one component type.
pub(crate) struct ComponentRegistration {
    pub(crate) type_name: &'static str,
    pub(crate) allow_multiple: bool,
    construct: Box<dyn Fn() -> Arc<dyn Component> + Send + Sync>,
}

impl ComponentRegistration {
    pub(crate) fn construct(&self) -> Arc<dyn Component> {
        (self.construct)()
    }
}

/// Builder collecting component registrations at startup.
///
/// # Example
///
/// ```
/// use foxglove_scene::{Component, ComponentFactories};
///
/// #[derive(Default)]
/// struct Collider;
///
/// impl Component for Collider {
///     fn name(&self) -> &'static str {
///         "Collider"
///     }
/// }
///
/// let factories = ComponentFactories::builder()
///     .register(Collider::default)
///     .build();
/// assert!(factories.is_registered::<Collider>());
/// ```
pub struct FactoryBuilder {
    entries: HashMap<TypeId, ComponentRegistration>,
}

impl FactoryBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Registers an exclusive component type: at most one instance per
    /// entity, duplicate adds return the existing instance.
    pub fn register<T: Component>(
        self,
        construct: impl Fn() -> T + Send + Sync + 'static,
    ) -> Self {
        self.insert(construct, false)
    }

    /// Registers a component type that supports multiple instances per
    /// entity.
    pub fn register_multi<T: Component>(
        self,
        construct: impl Fn() -> T + Send + Sync + 'static,
    ) -> Self {
        self.insert(construct, true)
    }

    fn insert<T: Component>(
        mut self,
        construct: impl Fn() -> T + Send + Sync + 'static,
        allow_multiple: bool,
    ) -> Self {
        self.entries.insert(
            TypeId::of::<T>(),
            ComponentRegistration {
                type_name: std::any::type_name::<T>(),
                allow_multiple,
                construct: Box::new(move || Arc::new(construct())),
            },
        );
        self
    }

    /// Finalizes the registrations into an immutable table.
    pub fn build(self) -> Arc<ComponentFactories> {
        Arc::new(ComponentFactories {
            entries: self.entries,
        })
    }
}

impl Default for FactoryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Immutable table of registered component types.
///
/// Built once via [`ComponentFactories::builder`] and shared (`Arc`) by
/// every entity, so lookups never contend on a lock.
pub struct ComponentFactories {
    entries: HashMap<TypeId, ComponentRegistration>,
}

impl ComponentFactories {
    /// Starts a new registration builder.
    pub fn builder() -> FactoryBuilder {
        FactoryBuilder::new()
    }

    /// Returns whether `T` was registered.
    pub fn is_registered<T: Component>(&self) -> bool {
        self.entries.contains_key(&TypeId::of::<T>())
    }

    /// Whether the type behind `type_id` supports multiple instances.
    /// `None` if the type was never registered.
    pub fn allow_multiple(&self, type_id: TypeId) -> Option<bool> {
        self.entries.get(&type_id).map(|entry| entry.allow_multiple)
    }

    /// Number of registered component types.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no component types are registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn get(&self, type_id: TypeId) -> Option<&ComponentRegistration> {
        self.entries.get(&type_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Solid;

    impl Component for Solid {
        fn name(&self) -> &'static str {
            "Solid"
        }
    }

    #[derive(Default)]
    struct Tag;

    impl Component for Tag {
        fn name(&self) -> &'static str {
            "Tag"
        }
    }

    #[test]
    fn register_and_lookup() {
        let factories = ComponentFactories::builder()
            .register(Solid::default)
            .register_multi(Tag::default)
            .build();

        assert!(factories.is_registered::<Solid>());
        assert!(factories.is_registered::<Tag>());
        assert_eq!(factories.len(), 2);
        assert_eq!(factories.allow_multiple(TypeId::of::<Solid>()), Some(false));
        assert_eq!(factories.allow_multiple(TypeId::of::<Tag>()), Some(true));
    }

    #[test]
    fn unregistered_type_is_unknown() {
        let factories = ComponentFactories::builder().build();
        assert!(!factories.is_registered::<Solid>());
        assert!(factories.allow_multiple(TypeId::of::<Solid>()).is_none());
        assert!(factories.is_empty());
    }

    #[test]
    fn construct_produces_registered_type() {
        let factories = ComponentFactories::builder().register(Solid::default).build();
        let instance = factories
            .get(TypeId::of::<Solid>())
            .expect("registered above")
            .construct();
        assert_eq!(instance.name(), "Solid");
    }
}
