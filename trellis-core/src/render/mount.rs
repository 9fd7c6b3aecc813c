//! Mounts
//!
//! A mount is one component rendered into its own [`Document`]. It keeps the
//! [`Trace`] of its last render and a watcher on every cell that render
//! read; a watcher firing schedules the mount on its [`Scheduler`].
//!
//! # Render cycle
//!
//! 1. Skip unless forced or [`has_dirty_deps`] reports a changed dependency.
//! 2. Run [`Component::render`] inside a fresh trace.
//! 3. Morph the live tree to the new output (or materialize it on the first
//!    render).
//! 4. Commit the version snapshot and re-watch the new dependency set.
//!
//! [`Scheduler`]: super::Scheduler

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, trace};

use super::scheduler::SchedulerInner;
use crate::error::Result;
use crate::reactive::{
    has_dirty_deps, refresh_snapshots, track, Binding, BindingTarget, Change, Dependencies,
    Subscription, Trace,
};
use crate::tree::{Document, Event, Morpher, Namespace, NodeId, VNode};

/// Something that can be rendered.
///
/// `render` must be a pure function of the cells it reads with
/// [`Cell::get`](crate::reactive::Cell::get): those reads are what the mount
/// watches. Returning `None` renders nothing.
pub trait Component: Send + Sync + 'static {
    fn render(&self) -> Option<VNode>;
}

impl<F> Component for F
where
    F: Fn() -> Option<VNode> + Send + Sync + 'static,
{
    fn render(&self) -> Option<VNode> {
        self()
    }
}

/// Unique identifier for a mount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MountId(u64);

impl MountId {
    pub(crate) fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

struct MountState {
    document: Document,
    root: Option<NodeId>,
    trace: Option<Trace>,
    watchers: Vec<Subscription>,
}

pub(crate) struct Mount {
    id: MountId,
    component: Box<dyn Component>,
    morpher: Morpher,
    scheduler: Weak<SchedulerInner>,
    state: Mutex<MountState>,
    rendering: AtomicBool,
    torn_down: AtomicBool,
    renders: AtomicUsize,
}

/// Clears the rendering flag even if the component panics.
struct RenderingGuard<'a>(&'a AtomicBool);

impl Drop for RenderingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl Mount {
    pub(crate) fn new(
        component: Box<dyn Component>,
        morpher: Morpher,
        scheduler: Weak<SchedulerInner>,
    ) -> Self {
        Self {
            id: MountId::new(),
            component,
            morpher,
            scheduler,
            state: Mutex::new(MountState {
                document: Document::new(),
                root: None,
                trace: None,
                watchers: Vec::new(),
            }),
            rendering: AtomicBool::new(false),
            torn_down: AtomicBool::new(false),
            renders: AtomicUsize::new(0),
        }
    }

    pub(crate) fn id(&self) -> MountId {
        self.id
    }

    pub(crate) fn is_torn_down(&self) -> bool {
        self.torn_down.load(Ordering::SeqCst)
    }

    /// Run one render cycle. Returns whether the component rendered.
    pub(crate) fn update(&self, forced: bool) -> Result<bool> {
        if self.is_torn_down() {
            return Ok(false);
        }
        if self.rendering.swap(true, Ordering::SeqCst) {
            panic!(
                "mount {} was updated from inside its own render",
                self.id.raw()
            );
        }
        let _guard = RenderingGuard(&self.rendering);

        let mut state = self.state.lock();
        if !forced && !has_dirty_deps(state.trace.as_ref()) {
            trace!(mount = self.id.raw(), "dependencies clean, render skipped");
            return Ok(false);
        }

        let (next, mut trace) = track(|| self.component.render());
        let state = &mut *state;
        state.root = match (state.root, next.as_ref()) {
            (Some(root), next) => self.morpher.morph(&mut state.document, root, next)?.root,
            (None, Some(next)) => {
                Some(self.morpher.materialize(&mut state.document, next, Namespace::Html))
            }
            (None, None) => None,
        };

        refresh_snapshots(&mut trace);
        state.watchers = self.watch(trace.deps());
        state.trace = Some(trace);

        let renders = self.renders.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(
            mount = self.id.raw(),
            renders,
            dependencies = state.watchers.len(),
            forced,
            "mount rendered"
        );
        Ok(true)
    }

    fn watch(&self, deps: &Dependencies) -> Vec<Subscription> {
        deps.iter()
            .filter_map(|cell| {
                let scheduler = self.scheduler.clone();
                let id = self.id;
                cell.watch(move |change| {
                    if let Some(scheduler) = scheduler.upgrade() {
                        scheduler.schedule(id, change == Change::Notified);
                    }
                })
            })
            .collect()
    }

    /// Drop the live tree and every watcher. Idempotent.
    pub(crate) fn tear_down(&self) {
        if self.torn_down.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut state = self.state.lock();
        state.watchers.clear();
        state.trace = None;
        if let Some(root) = state.root.take() {
            // The root came from this document, so removing it cannot fail.
            let _ = state.document.remove(root);
        }
        debug!(mount = self.id.raw(), "mount torn down");
    }
}

/// Owner of a mounted component.
///
/// Dropping the handle tears the mount down: its live tree is removed and
/// its watchers are dropped. A render already queued for it becomes a no-op.
pub struct MountHandle {
    mount: Arc<Mount>,
}

impl MountHandle {
    pub(crate) fn new(mount: Arc<Mount>) -> Self {
        Self { mount }
    }

    pub fn id(&self) -> MountId {
        self.mount.id
    }

    /// Root of the live tree; `None` before the first render, or while the
    /// component renders nothing.
    pub fn root(&self) -> Option<NodeId> {
        self.mount.state.lock().root
    }

    /// Number of renders that ran.
    pub fn render_count(&self) -> usize {
        self.mount.renders.load(Ordering::SeqCst)
    }

    /// Serialized live tree, or an empty string when nothing is rendered.
    pub fn html(&self) -> String {
        let state = self.mount.state.lock();
        state
            .root
            .map(|root| state.document.to_html(root))
            .unwrap_or_default()
    }

    /// Read access to the live tree.
    pub fn with_document<R>(&self, f: impl FnOnce(&Document, Option<NodeId>) -> R) -> R {
        let state = self.mount.state.lock();
        f(&state.document, state.root)
    }

    /// Deliver `event` to its target's handler.
    ///
    /// The handler runs without the mount locked, so it is free to write
    /// cells and to read the live tree through this handle.
    pub fn dispatch(&self, event: &Event) -> Result<bool> {
        let handler = {
            let state = self.mount.state.lock();
            state.document.element(event.target)?.handler(&event.name).cloned()
        };
        match handler {
            Some(handler) => {
                handler.call(event);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Dependencies of the last render.
    pub fn dependencies(&self) -> Dependencies {
        let state = self.mount.state.lock();
        state
            .trace
            .as_ref()
            .map(|trace| trace.deps().clone())
            .unwrap_or_default()
    }

    /// Register a binding on the trace of the last render.
    ///
    /// Bindings belong to one render cycle and are discarded by the next
    /// render. Returns `None` before the first render.
    pub fn add_binding<F>(
        &self,
        deps: Dependencies,
        target: BindingTarget,
        patch: F,
    ) -> Option<Arc<Binding>>
    where
        F: Fn(&mut Document, BindingTarget) + Send + Sync + 'static,
    {
        let mut state = self.mount.state.lock();
        let trace = state.trace.as_mut()?;
        Some(trace.add_binding(deps, target, patch))
    }

    /// Bindings with at least one dependency changed since the last render.
    pub fn affected_bindings(&self) -> Vec<Arc<Binding>> {
        let state = self.mount.state.lock();
        state
            .trace
            .as_ref()
            .map(Trace::affected_bindings)
            .unwrap_or_default()
    }

    /// Run the patch of every affected binding against the live tree.
    ///
    /// Returns the number of bindings applied. This does not commit the
    /// snapshot, so the next scheduled render still runs.
    pub fn apply_affected_bindings(&self) -> usize {
        let mut state = self.mount.state.lock();
        let bindings = state
            .trace
            .as_ref()
            .map(Trace::affected_bindings)
            .unwrap_or_default();
        for binding in &bindings {
            binding.apply(&mut state.document);
        }
        bindings.len()
    }

    /// Tear the mount down now.
    pub fn unmount(self) {
        drop(self);
    }
}

impl Drop for MountHandle {
    fn drop(&mut self) {
        self.mount.tear_down();
        if let Some(scheduler) = self.mount.scheduler.upgrade() {
            scheduler.forget(self.mount.id);
        }
    }
}

impl std::fmt::Debug for MountHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MountHandle")
            .field("id", &self.mount.id)
            .field("torn_down", &self.mount.is_torn_down())
            .finish()
    }
}
