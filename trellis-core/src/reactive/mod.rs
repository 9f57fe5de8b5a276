//! Reactive Core
//!
//! This module implements the reactive object layer: nodes that wrap plain
//! containers, trap reads and writes through them, and turn mutations into
//! change events.
//!
//! # Concepts
//!
//! ## Nodes
//!
//! A `Reactive` node pairs a target container (object, array, map, or
//! function) with its tracking state: a subscriber graph, a getter cache,
//! a wrapped-child cache, and a listener set. Nodes are interned by target
//! identity, so every alias of a container shares one node and one set of
//! subscriptions.
//!
//! ## Paths
//!
//! Changes are reported against dotted paths relative to the node that
//! observes them (`.user.name`, `.items.0`, `""` for the node itself). A
//! subscriber that reaches a child under some key sees the child's events
//! rebased under that key, so each ancestor gets the path as it knows it.
//!
//! ## Events
//!
//! Property mutations emit `create` / `update` / `delete` records, method
//! calls emit `apply`, and element moves emit `relabel`. Events bubble to
//! ancestor subscribers synchronously in the mutating call stack; listener
//! delivery is deferred, batched, and deduplicated by the scheduler.
//!
//! # Implementation Notes
//!
//! Getter evaluation runs inside a thread-local frame stack. While a frame
//! is active, every read through a node registers a dependency toward the
//! frame's owner. That is how derived slots discover what to watch without
//! any explicit subscription calls, the same automatic dependency tracking
//! SolidJS and Vue 3 build on.

pub(crate) mod context;
pub(crate) mod event;
mod methods;
pub(crate) mod node;
pub(crate) mod path;
pub(crate) mod runtime;

pub use event::Event;
pub use node::Reactive;
pub use path::Path;
pub use runtime::{derived, is_reactive, listen, reactive, snapshot, ListenerGuard};
