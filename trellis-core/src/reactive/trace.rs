//! Trace Recorder
//!
//! The recorder tracks which cells are read while a computation runs. It is
//! a thread-local stack of frames: [`start_trace`] pushes a top-level frame,
//! [`start_sub_trace`] pushes a nested one, and every tracked read
//! ([`Cell::get`](super::Cell::get)) lands in the innermost frame.
//!
//! # Frames
//!
//! - A **sub-trace** isolates the reads of a sub-expression (one dynamic slot
//!   of a template, say). [`end_sub_trace`] returns exactly those reads and
//!   merges them into the enclosing frame, so the enclosing set is always a
//!   superset of every nested one.
//!
//! - A **top-level trace** opened while another trace is active does not
//!   merge into it. It belongs to a different render cycle (a child
//!   component rendered synchronously, for instance).
//!
//! The stack is per thread. A render cycle starts and finishes on the same
//! thread, so frames of independent threads never mix.

use std::cell::RefCell;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use smallvec::SmallVec;
use tracing::trace;

use super::binding::Binding;
use super::cell::{CellId, CellRef, Trackable};
use crate::error::TraceError;

thread_local! {
    static TRACE_STACK: RefCell<Vec<Frame>> = const { RefCell::new(Vec::new()) };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameKind {
    Trace,
    SubTrace,
}

#[derive(Debug)]
struct Frame {
    kind: FrameKind,
    deps: Dependencies,
}

impl Frame {
    fn new(kind: FrameKind) -> Self {
        Self {
            kind,
            deps: Dependencies::new(),
        }
    }
}

/// An insertion-ordered, deduplicated set of cells.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dependencies {
    cells: IndexMap<CellId, CellRef>,
}

impl Dependencies {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a cell. Returns `false` if it was already present.
    pub fn insert(&mut self, cell: CellRef) -> bool {
        match self.cells.entry(cell.id()) {
            indexmap::map::Entry::Occupied(_) => false,
            indexmap::map::Entry::Vacant(slot) => {
                slot.insert(cell);
                true
            }
        }
    }

    /// Add every cell of `other` that is not already present.
    pub fn merge(&mut self, other: &Dependencies) {
        for cell in other.iter() {
            self.insert(cell.clone());
        }
    }

    pub fn contains(&self, id: CellId) -> bool {
        self.cells.contains_key(&id)
    }

    pub fn get(&self, id: CellId) -> Option<&CellRef> {
        self.cells.get(&id)
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CellRef> {
        self.cells.values()
    }

    pub fn ids(&self) -> impl Iterator<Item = CellId> + '_ {
        self.cells.keys().copied()
    }
}

impl<C: Trackable> FromIterator<C> for Dependencies {
    fn from_iter<I: IntoIterator<Item = C>>(iter: I) -> Self {
        let mut deps = Dependencies::new();
        for cell in iter {
            deps.insert(cell.cell_ref());
        }
        deps
    }
}

/// The result of a finished top-level trace.
///
/// Holds the cells read during the traced computation, the version of each
/// observed when the trace ended, and any bindings registered against them.
/// A trace only references its cells weakly.
#[derive(Default)]
pub struct Trace {
    pub(crate) deps: Dependencies,
    pub(crate) versions: IndexMap<CellId, u64>,
    pub(crate) bindings: IndexMap<CellId, SmallVec<[Arc<Binding>; 2]>>,
}

impl Trace {
    /// Build a trace over `deps`, snapshotting their current versions.
    ///
    /// Cells that no longer exist get no snapshot entry; the dirty checker
    /// treats them as changed.
    pub fn from_deps(deps: Dependencies) -> Self {
        let versions = deps
            .iter()
            .filter_map(|cell| cell.version().map(|version| (cell.id(), version)))
            .collect();
        Self {
            deps,
            versions,
            bindings: IndexMap::new(),
        }
    }

    /// The cells read during the trace.
    pub fn deps(&self) -> &Dependencies {
        &self.deps
    }

    /// The snapshot version of a dependency.
    pub fn version_of(&self, id: CellId) -> Option<u64> {
        self.versions.get(&id).copied()
    }

    /// All snapshot versions, in read order.
    pub fn versions(&self) -> &IndexMap<CellId, u64> {
        &self.versions
    }
}

impl fmt::Debug for Trace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Trace")
            .field("deps", &self.deps.len())
            .field("versions", &self.versions)
            .field("bindings", &self.bindings.len())
            .finish()
    }
}

/// Whether any trace frame is active on this thread.
pub fn is_tracing() -> bool {
    TRACE_STACK.with(|stack| !stack.borrow().is_empty())
}

/// Number of active frames on this thread.
pub fn depth() -> usize {
    TRACE_STACK.with(|stack| stack.borrow().len())
}

/// Open a top-level trace.
pub fn start_trace() {
    TRACE_STACK.with(|stack| stack.borrow_mut().push(Frame::new(FrameKind::Trace)));
    trace!(depth = depth(), "trace started");
}

/// Record a read of `cell` in the innermost frame. No-op when idle.
pub fn record_read<C: Trackable + ?Sized>(cell: &C) {
    if !is_tracing() {
        return;
    }
    let cell = cell.cell_ref();
    TRACE_STACK.with(|stack| {
        if let Some(frame) = stack.borrow_mut().last_mut() {
            frame.deps.insert(cell);
        }
    });
}

/// Open a sub-trace inside the active trace.
///
/// # Panics
///
/// Panics if no trace is active.
pub fn start_sub_trace() {
    if let Err(err) = try_start_sub_trace() {
        panic!("{err}");
    }
}

pub fn try_start_sub_trace() -> Result<(), TraceError> {
    if !is_tracing() {
        return Err(TraceError::NotTracing);
    }
    TRACE_STACK.with(|stack| stack.borrow_mut().push(Frame::new(FrameKind::SubTrace)));
    Ok(())
}

/// Close the innermost sub-trace.
///
/// Returns the cells read inside it and merges them into the enclosing
/// frame.
///
/// # Panics
///
/// Panics if the innermost frame is not a sub-trace.
pub fn end_sub_trace() -> Dependencies {
    try_end_sub_trace().unwrap_or_else(|err| panic!("{err}"))
}

pub fn try_end_sub_trace() -> Result<Dependencies, TraceError> {
    TRACE_STACK.with(|stack| {
        let mut stack = stack.borrow_mut();
        match stack.last() {
            None => return Err(TraceError::NotTracing),
            Some(frame) if frame.kind != FrameKind::SubTrace => {
                return Err(TraceError::NoSubTrace)
            }
            Some(_) => {}
        }
        let Some(frame) = stack.pop() else {
            return Err(TraceError::NotTracing);
        };
        // A sub-trace is only ever pushed on top of another frame.
        if let Some(parent) = stack.last_mut() {
            parent.deps.merge(&frame.deps);
        }
        Ok(frame.deps)
    })
}

/// Close the innermost top-level trace and snapshot versions.
///
/// # Panics
///
/// Panics if no trace is active or a sub-trace is still open.
pub fn end_trace() -> Trace {
    try_end_trace().unwrap_or_else(|err| panic!("{err}"))
}

pub fn try_end_trace() -> Result<Trace, TraceError> {
    let frame = TRACE_STACK.with(|stack| {
        let mut stack = stack.borrow_mut();
        match stack.last() {
            None => Err(TraceError::NotTracing),
            Some(frame) if frame.kind == FrameKind::SubTrace => Err(TraceError::SubTraceOpen),
            Some(_) => stack.pop().ok_or(TraceError::NotTracing),
        }
    })?;
    let trace = Trace::from_deps(frame.deps);
    trace!(deps = trace.deps.len(), "trace finished");
    Ok(trace)
}

/// Pops every frame above `base` when dropped, so a panicking computation
/// cannot leave its frames on the stack.
struct ScopeGuard {
    base: usize,
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        let _ = TRACE_STACK.try_with(|stack| {
            if let Ok(mut stack) = stack.try_borrow_mut() {
                stack.truncate(self.base);
            }
        });
    }
}

/// Run `f` inside a top-level trace.
pub fn track<R>(f: impl FnOnce() -> R) -> (R, Trace) {
    let _guard = ScopeGuard { base: depth() };
    start_trace();
    let value = f();
    (value, end_trace())
}

/// Run `f` inside a sub-trace of the active trace.
///
/// # Panics
///
/// Panics if no trace is active.
pub fn track_sub<R>(f: impl FnOnce() -> R) -> (R, Dependencies) {
    let _guard = ScopeGuard { base: depth() };
    start_sub_trace();
    let value = f();
    (value, end_sub_trace())
}

/// Run `f` with tracing suspended. Reads inside `f` are not recorded by
/// any enclosing trace.
pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
    struct Restore(Vec<Frame>);

    impl Drop for Restore {
        fn drop(&mut self) {
            let saved = std::mem::take(&mut self.0);
            let _ = TRACE_STACK.try_with(|stack| {
                if let Ok(mut stack) = stack.try_borrow_mut() {
                    *stack = saved;
                }
            });
        }
    }

    let saved = TRACE_STACK.with(|stack| std::mem::take(&mut *stack.borrow_mut()));
    let _restore = Restore(saved);
    f()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::Cell;

    #[test]
    fn idle_recorder_ignores_reads() {
        let cell = Cell::new(1);
        assert!(!is_tracing());
        cell.get();

        start_trace();
        let trace = end_trace();
        assert!(trace.deps().is_empty());
    }

    #[test]
    fn reads_are_deduplicated() {
        let cell = Cell::new(1);
        let (_, trace) = track(|| {
            for _ in 0..5 {
                cell.get();
            }
        });
        assert_eq!(trace.deps().len(), 1);
        assert!(trace.deps().contains(cell.id()));
    }

    #[test]
    fn peek_is_not_recorded() {
        let tracked = Cell::new(1);
        let peeked = Cell::new(2);
        let (sum, trace) = track(|| tracked.get() + peeked.peek());
        assert_eq!(sum, 3);
        assert!(trace.deps().contains(tracked.id()));
        assert!(!trace.deps().contains(peeked.id()));
    }

    #[test]
    fn end_trace_snapshots_versions() {
        let cell = Cell::new(0);
        cell.set(1);
        cell.set(2);
        let (_, trace) = track(|| cell.get());
        assert_eq!(trace.version_of(cell.id()), Some(2));
    }

    #[test]
    fn sub_trace_merges_into_parent() {
        let a = Cell::new("a");
        let b = Cell::new("b");

        start_trace();
        a.get();
        start_sub_trace();
        b.get();
        let sub = end_sub_trace();
        let trace = end_trace();

        assert_eq!(sub.len(), 1);
        assert!(sub.contains(b.id()));
        assert_eq!(trace.deps().len(), 2);
        assert!(trace.deps().contains(a.id()));
        assert!(trace.deps().contains(b.id()));
    }

    #[test]
    fn nested_sub_traces_propagate_upward() {
        let a = Cell::new(1);
        let b = Cell::new(2);
        let c = Cell::new(3);

        let (inner, trace) = track(|| {
            a.get();
            let (inner, middle) = track_sub(|| {
                b.get();
                let ((), inner) = track_sub(|| {
                    c.get();
                });
                inner
            });
            assert_eq!(middle.len(), 2);
            inner
        });

        assert_eq!(inner.ids().collect::<Vec<_>>(), vec![c.id()]);
        assert_eq!(trace.deps().len(), 3);
    }

    #[test]
    fn nested_top_level_traces_are_isolated() {
        let outer = Cell::new(1);
        let inner = Cell::new(2);

        let (inner_trace, outer_trace) = track(|| {
            outer.get();
            let ((), inner_trace) = track(|| {
                inner.get();
            });
            inner_trace
        });

        assert!(inner_trace.deps().contains(inner.id()));
        assert!(!inner_trace.deps().contains(outer.id()));
        assert!(outer_trace.deps().contains(outer.id()));
        assert!(!outer_trace.deps().contains(inner.id()));
    }

    #[test]
    fn untracked_hides_reads() {
        let seen = Cell::new(1);
        let hidden = Cell::new(2);
        let (_, trace) = track(|| {
            seen.get();
            untracked(|| {
                assert!(!is_tracing());
                hidden.get();
            });
            assert!(is_tracing());
        });
        assert!(!trace.deps().contains(hidden.id()));
        assert!(trace.deps().contains(seen.id()));
    }

    #[test]
    fn usage_errors_are_reported() {
        assert_eq!(try_end_sub_trace().unwrap_err(), TraceError::NotTracing);
        assert_eq!(try_end_trace().unwrap_err(), TraceError::NotTracing);
        assert_eq!(try_start_sub_trace().unwrap_err(), TraceError::NotTracing);

        start_trace();
        assert_eq!(try_end_sub_trace().unwrap_err(), TraceError::NoSubTrace);
        start_sub_trace();
        assert_eq!(try_end_trace().unwrap_err(), TraceError::SubTraceOpen);
        end_sub_trace();
        end_trace();
        assert!(!is_tracing());
    }

    #[test]
    #[should_panic(expected = "without an active sub-trace")]
    fn end_sub_trace_without_sub_trace_panics() {
        let _guard = ScopeGuard { base: depth() };
        start_trace();
        end_sub_trace();
    }

    #[test]
    fn panicking_computation_leaves_stack_clean() {
        let result = std::panic::catch_unwind(|| {
            track(|| {
                start_sub_trace();
                panic!("render failed");
            })
        });
        assert!(result.is_err());
        assert!(!is_tracing());
    }
}
