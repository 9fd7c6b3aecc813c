//! Dirty Checker
//!
//! Decides whether a render needs to run again by comparing the version
//! snapshot of its last [`Trace`] against the current versions of the
//! traced cells.
//!
//! The check is read-only: versions are looked up through the trace's weak
//! references, never through tracked reads, so checking from inside another
//! trace leaves that trace untouched.

use super::cell::{CellId, CellRef};
use super::trace::Trace;

/// Whether a recomputation is needed.
///
/// `None` means there is no prior snapshot (first render) and is always
/// dirty. Otherwise returns `true` on the first dependency whose version
/// differs from its snapshot. A dependency that has been dropped, or has
/// no snapshot entry, counts as dirty.
pub fn has_dirty_deps(trace: Option<&Trace>) -> bool {
    match trace {
        None => true,
        Some(trace) => trace.is_dirty(),
    }
}

/// Commit the current versions of every dependency into the snapshot.
///
/// Call this only after the render and patch that used `trace`'s
/// dependencies have completed. Dependencies of registered bindings are
/// committed too. Dropped cells are removed from the snapshot, which keeps
/// them dirty.
pub fn refresh_snapshots(trace: &mut Trace) {
    let Trace {
        deps,
        versions,
        bindings,
        ..
    } = trace;
    versions.clear();
    let bound = bindings.values().flatten().flat_map(|binding| binding.deps().iter());
    for cell in deps.iter().chain(bound) {
        if let Some(version) = cell.version() {
            versions.insert(cell.id(), version);
        }
    }
}

impl Trace {
    /// See [`has_dirty_deps`].
    pub fn is_dirty(&self) -> bool {
        self.deps.iter().any(|cell| self.is_cell_dirty(cell))
    }

    /// The dependencies whose versions moved since the snapshot.
    pub fn dirty_cells(&self) -> Vec<CellId> {
        self.deps
            .iter()
            .filter(|cell| self.is_cell_dirty(cell))
            .map(CellRef::id)
            .collect()
    }

    pub(crate) fn is_cell_dirty(&self, cell: &CellRef) -> bool {
        match (cell.version(), self.versions.get(&cell.id())) {
            (Some(current), Some(snapshot)) => current != *snapshot,
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{track, Cell};

    #[test]
    fn first_render_is_always_dirty() {
        assert!(has_dirty_deps(None));
    }

    #[test]
    fn clean_after_trace_dirty_after_set_clean_after_refresh() {
        let a = Cell::new(1);
        let b = Cell::new(2);
        let (_, mut trace) = track(|| a.get() + b.get());

        assert!(!has_dirty_deps(Some(&trace)));

        b.set(3);
        assert!(has_dirty_deps(Some(&trace)));
        assert_eq!(trace.dirty_cells(), vec![b.id()]);

        refresh_snapshots(&mut trace);
        assert!(!has_dirty_deps(Some(&trace)));
        assert!(trace.dirty_cells().is_empty());
    }

    #[test]
    fn notify_does_not_make_a_trace_dirty() {
        let a = Cell::new(1);
        let (_, trace) = track(|| a.get());
        a.notify();
        assert!(!trace.is_dirty());
    }

    #[test]
    fn untracked_writes_do_not_matter() {
        let tracked = Cell::new(1);
        let other = Cell::new(1);
        let (_, trace) = track(|| tracked.get() + other.peek());
        other.set(5);
        assert!(!trace.is_dirty());
    }

    #[test]
    fn dirty_check_inside_a_trace_records_nothing() {
        let a = Cell::new(1);
        let (_, inner) = track(|| a.get());

        let (_, outer) = track(|| has_dirty_deps(Some(&inner)));
        assert!(outer.deps().is_empty());
    }

    #[test]
    fn dropped_dependency_is_dirty() {
        let kept = Cell::new(1);
        let dropped = Cell::new(2);
        let (_, mut trace) = track(|| kept.get() + dropped.get());

        drop(dropped);
        assert!(trace.is_dirty());

        refresh_snapshots(&mut trace);
        assert!(trace.is_dirty());
    }

    #[test]
    fn empty_trace_is_clean() {
        let (_, trace) = track(|| ());
        assert!(!has_dirty_deps(Some(&trace)));
    }
}
