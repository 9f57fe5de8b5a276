//! Subscription Graph and Scheduling
//!
//! This module implements the machinery between a mutation and its
//! observers: who is subscribed to whom, how element moves rewrite those
//! subscriptions, and when batched notifications are delivered.
//!
//! # Overview
//!
//! The subscriber graph is directed and discovered dynamically: reading
//! `parent.child` adds an edge from the child's node back to the parent,
//! labeled with the path the parent knows the child under. When the child
//! changes, the event walks these edges upward, getting rebased at each
//! hop, so every ancestor sees the change expressed in its own coordinate
//! space.
//!
//! # Design Decisions
//!
//! 1. Edges live on the node being observed, not in a central table. A
//!    node owns the list of subscribers watching it, which keeps edge
//!    rewrites during relabeling local to one lock.
//!
//! 2. Delivery order is computed per flush batch. Only the handful of
//!    nodes with pending events are sorted (ancestors first), instead of
//!    maintaining a globally ordered graph that most mutations never use.
//!
//! 3. Relabels are data, not subscriptions. An element move rewrites the
//!    affected edge roots in place and ships a `relabel` event describing
//!    the moves, so downstream caches can follow identity instead of
//!    guessing from delete/create pairs.

pub(crate) mod relabel;
pub(crate) mod scheduler;
pub(crate) mod subscriptions;

pub use scheduler::{flush_sync, flushed};
