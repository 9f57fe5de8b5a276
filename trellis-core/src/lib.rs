//! Trellis Core
//!
//! This crate provides the reactive state engine for the Trellis UI
//! toolkit. It implements:
//!
//! - Proxy-style reactive wrappers over dynamic object graphs
//! - Path-level dependency tracking for getter-backed derived values
//! - Synchronous change bubbling with batched, deduplicated listener
//!   delivery
//! - Identity-preserving array diffs (relabel events instead of
//!   delete/create churn)
//!
//! The engine is single-threaded and cooperative: mutations propagate
//! structurally in the mutating call stack, while listener callbacks are
//! deferred to a flush that runs on the next tick of a current-thread
//! async runtime, or whenever `flush_sync` is called.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `value`: Dynamic value model (objects, arrays, maps, functions,
//!   getters)
//! - `reactive`: Nodes, read/write traps, path tracking, and the public
//!   entry points
//! - `graph`: Subscription edges, relabeling, and the flush scheduler
//! - `error`: Operation errors
//!
//! # Example
//!
//! ```
//! use trellis_core::{flush_sync, listen, reactive};
//! use std::sync::{Arc, Mutex};
//!
//! let state = reactive(serde_json::json!({"count": 0}));
//!
//! let seen = Arc::new(Mutex::new(Vec::new()));
//! let log = seen.clone();
//! let _guard = listen(&state, move |event| {
//!     log.lock().unwrap().push(event.kind_str());
//! });
//!
//! state.set("count", 1);
//! state.set("count", 2);
//! flush_sync();
//!
//! // Two writes, one batched update.
//! assert_eq!(*seen.lock().unwrap(), vec!["update"]);
//! ```

pub mod error;
pub mod graph;
pub mod reactive;
pub mod value;

pub use error::Error;
pub use graph::{flush_sync, flushed};
pub use reactive::{
    derived, is_reactive, listen, reactive, snapshot, Event, ListenerGuard, Path, Reactive,
};
pub use value::{ObjectData, Property, Value};
