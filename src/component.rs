//! Component trait and lifecycle contract.
//!
//! A component is a pluggable behavior/data unit attached to an [`Entity`].
//! Entities own components; components never own entities. Construction is
//! explicit: component types are registered on a
//! [`FactoryBuilder`](crate::FactoryBuilder) at startup, so there is no
//! runtime type scanning.
//!
//! [`Entity`]: crate::Entity

use std::any::Any;

use thiserror::Error;

/// Errors raised by component registry operations.
#[derive(Debug, Error)]
pub enum ComponentError {
    /// The component type was never registered on the factory builder.
    #[error("component type `{type_name}` has never been registered; register it on the factory builder first")]
    NotRegistered {
        /// Name of the unregistered component type.
        type_name: &'static str,
    },
    /// A component's [`init`](Component::init) failed. The component was
    /// detached again; a half-initialized entity is not tolerated.
    #[error("component `{component}` failed to initialize: {message}")]
    InitFailed {
        /// The component's [`name`](Component::name).
        component: &'static str,
        /// Failure detail supplied by the component.
        message: String,
    },
    /// The entity was already disposed.
    #[error("entity `{0}` has been disposed")]
    Disposed(String),
}

/// Trait for units of behavior attached to entities.
///
/// Lifecycle: [`init`](Self::init) runs once right after the instance is
/// attached (failures detach it again and propagate); [`dispose`](Self::dispose)
/// runs when the instance is removed or its entity is torn down.
///
/// Whether a type supports multiple instances per entity is declared at
/// registration time, not on the trait — see
/// [`FactoryBuilder::register_multi`](crate::FactoryBuilder::register_multi).
///
/// # Example
///
/// ```
/// use foxglove_scene::{Component, ComponentError, Entity};
/// use std::sync::atomic::{AtomicBool, Ordering};
///
/// #[derive(Default)]
/// struct Hotspot {
///     enabled: AtomicBool,
/// }
///
/// impl Component for Hotspot {
///     fn name(&self) -> &'static str {
///         "Hotspot"
///     }
///
///     fn init(&self, _entity: &Entity) -> Result<(), ComponentError> {
///         self.enabled.store(true, Ordering::Relaxed);
///         Ok(())
///     }
///
///     fn enabled(&self) -> bool {
///         self.enabled.load(Ordering::Relaxed)
///     }
///
///     fn set_enabled(&self, enabled: bool) {
///         self.enabled.store(enabled, Ordering::Relaxed);
///     }
/// }
/// ```
pub trait Component: Any + Send + Sync {
    /// The component's display name (e.g. `"Collider"`).
    fn name(&self) -> &'static str;

    /// Called once after the component is attached to `entity`.
    ///
    /// May look up sibling components. Errors abort object construction:
    /// the component is detached and the error propagates to the caller.
    fn init(&self, entity: &crate::Entity) -> Result<(), ComponentError> {
        let _ = entity;
        Ok(())
    }

    /// Called when the component is detached or its entity is disposed.
    fn dispose(&self) {}

    /// Whether the component currently participates in simulation.
    ///
    /// Defaults to always-on; components with a toggle override both this
    /// and [`set_enabled`](Self::set_enabled) backed by an atomic flag.
    fn enabled(&self) -> bool {
        true
    }

    /// Toggles the component. The default implementation ignores the call.
    fn set_enabled(&self, enabled: bool) {
        let _ = enabled;
    }
}
