//! Render Cycle
//!
//! This module ties the reactive half to the tree half. A [`Component`] is
//! mounted on a [`Scheduler`]; its render runs inside a trace, the mount
//! watches every cell the render read, and a write to any of them queues
//! the mount for the next flush.
//!
//! ```rust,ignore
//! use trellis_core::reactive::Cell;
//! use trellis_core::render::Scheduler;
//! use trellis_core::tree::VNode;
//!
//! let scheduler = Scheduler::default();
//! let count = Cell::new(0);
//! let view = {
//!     let count = count.clone();
//!     move || Some(VNode::from(VNode::element("span").child(count.get().to_string())))
//! };
//! let handle = scheduler.mount(view);
//! scheduler.flush()?;
//!
//! count.set(1);
//! scheduler.flush()?;
//! assert_eq!(handle.html(), "<span>1</span>");
//! ```

mod mount;
mod scheduler;

pub use mount::{Component, MountHandle, MountId};
pub use scheduler::Scheduler;
