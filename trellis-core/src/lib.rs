//! Trellis Core
//!
//! This crate provides the rendering core of the Trellis UI component
//! framework. It implements:
//!
//! - Reactive cells with version counters and explicit dependency tracking
//! - A dirty checker that skips renders whose inputs did not change
//! - An in-place tree reconciler that patches the live tree to match fresh
//!   render output
//! - A batching scheduler that drives the render cycle
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: cells, the trace recorder, the dirty checker and the
//!   binding registry
//! - `tree`: the live document, render output and the reconciler
//! - `render`: components, mounts and the scheduler
//! - `config`: reconciler and scheduler options
//!
//! # Example
//!
//! ```rust,ignore
//! use trellis_core::reactive::{track, Cell};
//! use trellis_core::tree::{Document, Morpher, Namespace, VNode};
//!
//! let count = Cell::new(0);
//! let view = || VNode::from(VNode::element("span").child(count.get().to_string()));
//!
//! // First render: record what the view reads and build the live tree.
//! let (first, trace) = track(view);
//! let mut document = Document::new();
//! let root = document.materialize(&first, Namespace::Html);
//!
//! count.set(1);
//! assert!(trace.is_dirty());
//!
//! // Re-render and patch in place: the span keeps its identity.
//! let (next, _trace) = track(view);
//! let outcome = Morpher::default().morph(&mut document, root, Some(&next))?;
//! assert_eq!(outcome.root, Some(root));
//! assert_eq!(document.to_html(root), "<span>1</span>");
//! ```

pub mod config;
pub mod error;
pub mod reactive;
pub mod render;
pub mod tree;

pub use error::{Error, Result, TraceError};
