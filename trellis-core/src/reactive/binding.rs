//! Binding Registry
//!
//! A binding ties a patch action and a target location to the cells the
//! action depends on. It is registered on the [`Trace`] of the render cycle
//! that produced it, under every one of its dependencies, so a dirty cell
//! can be mapped back to the regions of the tree it affects.
//!
//! The reconciler does not consult bindings yet: every render cycle still
//! re-renders and morphs the whole component. The registry is the data
//! shape a finer-grained patch mode needs, exposed through
//! [`Trace::affected_bindings`] and [`Binding::apply`].

use std::fmt;
use std::sync::Arc;

use smallvec::SmallVec;

use super::cell::CellId;
use super::trace::{Dependencies, Trace};
use crate::tree::{Document, NodeId};

/// Where a binding's patch applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingTarget {
    /// A node of the live tree.
    Node(NodeId),

    /// A dynamic slot of a template, by index.
    Slot(usize),
}

/// The opaque patch action of a binding.
pub type PatchFn = Arc<dyn Fn(&mut Document, BindingTarget) + Send + Sync>;

/// A patch action shared by all of its dependencies.
pub struct Binding {
    deps: Dependencies,
    target: BindingTarget,
    patch: PatchFn,
}

impl Binding {
    /// The cells this binding depends on.
    pub fn deps(&self) -> &Dependencies {
        &self.deps
    }

    pub fn target(&self) -> BindingTarget {
        self.target
    }

    /// Run the patch action against `document`.
    pub fn apply(&self, document: &mut Document) {
        (self.patch)(document, self.target);
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("deps", &self.deps.len())
            .field("target", &self.target)
            .finish()
    }
}

impl Trace {
    /// Register a binding under every cell in `deps`.
    ///
    /// One `Binding` is created and shared: looking up any of its
    /// dependencies yields the same `Arc`. A dependency the trace did not
    /// read gets its current version snapshotted here, so the binding is
    /// only affected by later writes.
    pub fn add_binding<F>(&mut self, deps: Dependencies, target: BindingTarget, patch: F) -> Arc<Binding>
    where
        F: Fn(&mut Document, BindingTarget) + Send + Sync + 'static,
    {
        let binding = Arc::new(Binding {
            deps,
            target,
            patch: Arc::new(patch),
        });
        for cell in binding.deps.iter() {
            if let Some(version) = cell.version() {
                self.versions.entry(cell.id()).or_insert(version);
            }
        }
        for id in binding.deps.ids() {
            self.bindings
                .entry(id)
                .or_insert_with(SmallVec::new)
                .push(Arc::clone(&binding));
        }
        binding
    }

    /// The bindings registered under a cell, in registration order.
    pub fn bindings_for(&self, id: CellId) -> &[Arc<Binding>] {
        self.bindings.get(&id).map(|b| b.as_slice()).unwrap_or(&[])
    }

    /// Number of distinct bindings in the registry.
    pub fn binding_count(&self) -> usize {
        self.unique_bindings(self.bindings.values().flatten()).len()
    }

    /// Distinct bindings with at least one dependency whose version moved
    /// since the snapshot, in registration order of their first dirty cell.
    pub fn affected_bindings(&self) -> Vec<Arc<Binding>> {
        let dirty = self.bindings.iter().filter_map(|(id, bindings)| {
            let cell = bindings.first()?.deps.get(*id)?;
            self.is_cell_dirty(cell).then_some(bindings)
        });
        self.unique_bindings(dirty.flatten())
    }

    fn unique_bindings<'a>(&self, bindings: impl Iterator<Item = &'a Arc<Binding>>) -> Vec<Arc<Binding>> {
        let mut unique: Vec<Arc<Binding>> = Vec::new();
        for binding in bindings {
            if !unique.iter().any(|seen| Arc::ptr_eq(seen, binding)) {
                unique.push(Arc::clone(binding));
            }
        }
        unique
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{refresh_snapshots, track, Cell, Trackable};

    fn deps_of(cells: &[&Cell<i32>]) -> Dependencies {
        cells.iter().map(|cell| cell.cell_ref()).collect()
    }

    #[test]
    fn binding_is_shared_across_dependencies() {
        let x = Cell::new(1);
        let y = Cell::new(2);
        let (_, mut trace) = track(|| x.get() + y.get());

        let binding = trace.add_binding(deps_of(&[&x, &y]), BindingTarget::Slot(0), |_, _| {});

        let from_x = &trace.bindings_for(x.id())[0];
        let from_y = &trace.bindings_for(y.id())[0];
        assert!(Arc::ptr_eq(from_x, from_y));
        assert!(Arc::ptr_eq(from_x, &binding));
        assert_eq!(trace.binding_count(), 1);
    }

    #[test]
    fn cells_can_hold_several_bindings() {
        let x = Cell::new(1);
        let (_, mut trace) = track(|| x.get());

        trace.add_binding(deps_of(&[&x]), BindingTarget::Slot(0), |_, _| {});
        trace.add_binding(deps_of(&[&x]), BindingTarget::Slot(1), |_, _| {});

        let targets: Vec<_> = trace.bindings_for(x.id()).iter().map(|b| b.target()).collect();
        assert_eq!(targets, vec![BindingTarget::Slot(0), BindingTarget::Slot(1)]);
    }

    #[test]
    fn unknown_cell_has_no_bindings() {
        let x = Cell::new(1);
        let trace = Trace::default();
        assert!(trace.bindings_for(x.id()).is_empty());
    }

    #[test]
    fn affected_bindings_follow_dirty_cells() {
        let x = Cell::new(1);
        let y = Cell::new(2);
        let z = Cell::new(3);
        let (_, mut trace) = track(|| x.get() + y.get() + z.get());

        let xy = trace.add_binding(deps_of(&[&x, &y]), BindingTarget::Slot(0), |_, _| {});
        trace.add_binding(deps_of(&[&z]), BindingTarget::Slot(1), |_, _| {});
        assert!(trace.affected_bindings().is_empty());

        x.set(10);
        y.set(20);
        let affected = trace.affected_bindings();
        assert_eq!(affected.len(), 1);
        assert!(Arc::ptr_eq(&affected[0], &xy));
    }

    #[test]
    fn binding_on_an_untraced_cell_settles_after_refresh() {
        let read = Cell::new(1);
        let outside = Cell::new(1);
        let (_, mut trace) = track(|| read.get());

        trace.add_binding(deps_of(&[&outside]), BindingTarget::Slot(0), |_, _| {});
        assert!(trace.affected_bindings().is_empty());

        outside.set(2);
        assert_eq!(trace.affected_bindings().len(), 1);
        assert!(!trace.is_dirty());

        refresh_snapshots(&mut trace);
        assert!(trace.affected_bindings().is_empty());
        assert!(!trace.is_dirty());
    }

    #[test]
    fn apply_runs_the_patch_against_the_target() {
        let label = Cell::new(String::from("before"));
        let mut document = Document::new();
        let text = document.create_text("before");

        let (_, mut trace) = track(|| label.get());
        let label_clone = label.clone();
        trace.add_binding(
            std::iter::once(label.cell_ref()).collect(),
            BindingTarget::Node(text),
            move |document, target| {
                if let BindingTarget::Node(node) = target {
                    let _ = document.set_text(node, &label_clone.peek());
                }
            },
        );

        label.set(String::from("after"));
        for binding in trace.affected_bindings() {
            binding.apply(&mut document);
        }
        assert_eq!(document.text(text), Some("after"));
    }
}
