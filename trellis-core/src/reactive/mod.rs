//! Reactive Primitives
//!
//! This module implements the reactive half of the rendering core: versioned
//! cells, the trace recorder, the dirty checker and the binding registry.
//!
//! # Concepts
//!
//! ## Cells
//!
//! A [`Cell`] is a container for mutable state with a version counter that
//! increases on every replacement. Writes notify subscribers synchronously.
//!
//! ## Traces
//!
//! A [`Trace`] records which cells a computation read ([`Cell::get`]) and
//! the version each had when the computation finished. Sub-traces isolate
//! the reads of a sub-expression while still feeding the enclosing trace.
//!
//! ## Dirty checking
//!
//! [`has_dirty_deps`] compares a trace's snapshot against current versions.
//! A render only re-runs when something it read has been replaced since.
//!
//! # Implementation Notes
//!
//! Tracking is explicit: [`Cell::get`] records, [`Cell::peek`] does not.
//! The recorder is a thread-local stack, so a render cycle and the reads it
//! makes must stay on one thread.

mod binding;
mod cell;
mod dirty;
mod subscriber;
mod trace;

pub use binding::{Binding, BindingTarget, PatchFn};
pub use cell::{Cell, CellId, CellRef, Change, Trackable, MAX_DISPATCH_DEPTH};
pub use dirty::{has_dirty_deps, refresh_snapshots};
pub use subscriber::{SubscriberId, Subscription};
pub use trace::{
    depth, end_sub_trace, end_trace, is_tracing, record_read, start_sub_trace, start_trace, track,
    track_sub, try_end_sub_trace, try_end_trace, try_start_sub_trace, untracked, Dependencies,
    Trace,
};
