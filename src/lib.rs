//! # Foxglove Scene
//!
//! Scene-graph and transform core for the Foxglove 2D engine: composes game
//! objects from interchangeable components, arranges them in a parent/child
//! hierarchy, and turns local sprite transforms into the world-space and
//! screen-space geometry used for draw order, mouse picking, and collision.
//!
//! ## Core Types
//!
//! - [`Entity`] — String-identified bag of components with a concurrent
//!   create-if-absent add contract
//! - [`Component`] — Pluggable behavior unit with init/dispose lifecycle
//! - [`ComponentFactories`] — Explicit startup registration of component
//!   constructors (no runtime type scanning)
//! - [`Tree`] — Arena-backed parent/child graph with generational [`NodeId`]
//!   handles
//! - [`Event`] — Typed broadcast channel with mixed sync and async
//!   subscribers
//! - [`SpriteTransform`] / [`ModelMatrixNode`] — Local sprite transform and
//!   its cached parent-chain model matrix
//! - [`Viewport`] / [`ViewportMatrixCache`] — Camera state and the per-layer
//!   viewport matrix memo
//! - [`BoundingBox`] / [`BoundingBoxes`] — Four-corner geometry and the
//!   cached intermediate → hit-test → render box pipeline
//! - [`Scene`] — Object factory wiring entities, tree nodes, matrices and
//!   boxes together
//!
//! See `DESIGN.md` for architecture decisions and goals.

pub mod bounds;
pub mod bounds_builder;
pub mod component;
pub mod entity;
pub mod event;
pub mod factory;
pub mod layer;
pub mod mask;
pub mod matrix;
pub mod runtime;
pub mod scene;
pub mod transform;
pub mod tree;
pub mod viewport;

pub use bounds::BoundingBox;
pub use bounds_builder::{
    BoundingBoxLockStep, BoundingBoxes, BoxesChanged, EntityBoxes, hit_test_box, intermediate_box,
    render_box,
};
pub use component::{Component, ComponentError};
pub use entity::{Entity, EntityTable};
pub use event::{
    CallbackError, CallbackFuture, Event, EventError, SUBSCRIBER_LIMIT, Subscription,
};
pub use factory::{ComponentFactories, FactoryBuilder};
pub use layer::RenderLayer;
pub use mask::PixelMask;
pub use matrix::{MatrixChanged, ModelMatrixNode, local_matrix};
pub use runtime::{EventRuntime, TaskHandle};
pub use scene::{Scene, SceneLink, SceneObject};
pub use transform::{SpriteTransform, TransformChanged, TransformState};
pub use tree::{NodeId, ParentChanged, Tree, TreeError};
pub use viewport::{
    Viewport, ViewportChanged, ViewportMatrixCache, ViewportState, viewport_matrix,
};
