//! Live Tree and Reconciler
//!
//! This module holds the rendered side of the core: the live tree the user
//! sees, the tree a render function returns, and the reconciler that merges
//! the second into the first.
//!
//! # Overview
//!
//! - [`Document`] is an arena of live nodes addressed by [`NodeId`]. Handles
//!   are stable: a node keeps its handle across moves.
//! - [`VNode`] is plain render output, rebuilt from scratch on every render.
//! - [`Morpher`] patches a live subtree in place to match a [`VNode`].
//!
//! # Design Decisions
//!
//! 1. The live tree is an arena rather than a tree of owned boxes so a node
//!    can be moved between positions without invalidating outside handles.
//!
//! 2. The reconciler mutates the live tree directly. There is no patch list
//!    and no previous render output is kept: the live tree is the only
//!    record of what was rendered.
//!
//! 3. Nodes not produced by the renderer (marked with the keep attribute)
//!    are left alone, so imperative widgets can live inside rendered markup.

mod document;
mod morph;
mod node;
mod vnode;

pub use document::Document;
pub use morph::{MorphOutcome, MorphStats, Morpher};
pub use node::{Content, Element, Event, EventHandler, Namespace, Node, NodeData, NodeId, NodeKind};
pub use vnode::{VElement, VNode};
