//! Cell Implementation
//!
//! A Cell is the fundamental reactive primitive. It holds a value, a version
//! counter and an ordered list of subscribers.
//!
//! # How Cells Work
//!
//! 1. [`Cell::get`] returns the value and, when a trace is active on the
//!    current thread, records the cell as a dependency of that trace.
//!
//! 2. [`Cell::peek`] returns the value and never touches tracing.
//!
//! 3. [`Cell::set`] replaces the value, bumps the version and synchronously
//!    calls every subscriber with `(new, old)`, in registration order.
//!
//! 4. [`Cell::notify`] re-broadcasts the current value without bumping the
//!    version, for values that were mutated in place.
//!
//! # Re-entrancy
//!
//! No lock is held while subscribers run. A subscriber may write other cells,
//! subscribe, or unsubscribe (itself included). The dispatch loop iterates
//! over a snapshot of the subscriber list and skips entries removed after the
//! snapshot was taken.
//!
//! A subscriber that writes the cell it is subscribed to re-enters that
//! cell's dispatch. A bounded amount of this is fine (clamping a value, for
//! instance); past [`MAX_DISPATCH_DEPTH`] nested dispatches the write panics,
//! since it can only be a feedback loop.

use std::fmt::{self, Debug};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use tracing::trace;

use super::subscriber::{SubscriberId, Subscription};
use super::trace as recorder;

/// Nesting limit for a cell dispatching while its own dispatch is running.
pub const MAX_DISPATCH_DEPTH: usize = 64;

/// Unique identifier of a cell.
///
/// Clones of a [`Cell`] share the ID of the cell they were cloned from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellId(u64);

impl CellId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// What caused a dispatch, as seen by type-erased watchers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    /// The value was replaced and the version bumped.
    Replaced,

    /// The value was re-broadcast with [`Cell::notify`]. The version is
    /// unchanged.
    Notified,
}

type ValueCallback<T> = Box<dyn Fn(&T, &T) + Send + Sync>;
type ChangeCallback = Box<dyn Fn(Change) + Send + Sync>;

/// Object-safe view of a cell, independent of its value type.
pub(crate) trait AnyCell: Send + Sync {
    fn version(&self) -> u64;
    fn add_watcher(&self, watcher: ChangeCallback) -> SubscriberId;
    fn remove_listener(&self, id: SubscriberId);
}

enum Listener<T> {
    Value(ValueCallback<T>),
    Change(ChangeCallback),
}

struct ListenerEntry<T> {
    id: SubscriberId,
    /// Cleared on unsubscribe so an in-flight dispatch skips the entry.
    active: AtomicBool,
    listener: Listener<T>,
}

struct Shared<T> {
    id: CellId,
    value: RwLock<T>,
    version: AtomicU64,
    listeners: Mutex<Vec<Arc<ListenerEntry<T>>>>,
    depth: AtomicUsize,
}

struct DepthGuard<'a>(&'a AtomicUsize);

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl<T> Shared<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn add(&self, listener: Listener<T>) -> SubscriberId {
        let id = SubscriberId::new();
        self.listeners.lock().push(Arc::new(ListenerEntry {
            id,
            active: AtomicBool::new(true),
            listener,
        }));
        id
    }

    fn dispatch(&self, new: &T, old: &T, change: Change) {
        let depth = self.depth.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = DepthGuard(&self.depth);
        if depth > MAX_DISPATCH_DEPTH {
            panic!(
                "cell {} re-entered its own notification {} times; a subscriber is writing \
                 the cell it observes without converging",
                self.id.raw(),
                depth
            );
        }

        let snapshot: Vec<Arc<ListenerEntry<T>>> = self.listeners.lock().clone();
        for entry in snapshot {
            if !entry.active.load(Ordering::SeqCst) {
                continue;
            }
            match &entry.listener {
                Listener::Value(callback) => callback(new, old),
                Listener::Change(callback) => callback(change),
            }
        }
    }
}

impl<T> AnyCell for Shared<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }

    fn add_watcher(&self, watcher: ChangeCallback) -> SubscriberId {
        self.add(Listener::Change(watcher))
    }

    fn remove_listener(&self, id: SubscriberId) {
        let mut listeners = self.listeners.lock();
        if let Some(pos) = listeners.iter().position(|entry| entry.id == id) {
            let entry = listeners.remove(pos);
            entry.active.store(false, Ordering::SeqCst);
        }
    }
}

/// Anything that can be recorded as a dependency of a trace.
pub trait Trackable {
    /// A weak, type-erased reference to the underlying cell.
    fn cell_ref(&self) -> CellRef;
}

/// A reactive cell holding a value of type T.
///
/// # Example
///
/// ```rust
/// use trellis_core::reactive::Cell;
///
/// let count = Cell::new(0);
/// assert_eq!(count.version(), 0);
///
/// count.set(5);
/// assert_eq!(count.peek(), 5);
/// assert_eq!(count.version(), 1);
/// ```
pub struct Cell<T>
where
    T: Clone + Send + Sync + 'static,
{
    shared: Arc<Shared<T>>,
}

impl<T> Cell<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a new cell with the given initial value and version 0.
    pub fn new(value: T) -> Self {
        Self {
            shared: Arc::new(Shared {
                id: CellId::next(),
                value: RwLock::new(value),
                version: AtomicU64::new(0),
                listeners: Mutex::new(Vec::new()),
                depth: AtomicUsize::new(0),
            }),
        }
    }

    /// Get the cell's unique ID.
    pub fn id(&self) -> CellId {
        self.shared.id
    }

    /// Get the current version.
    pub fn version(&self) -> u64 {
        self.shared.version.load(Ordering::SeqCst)
    }

    /// Get the current value, recording the read with the active trace.
    pub fn get(&self) -> T {
        recorder::record_read(self);
        self.peek()
    }

    /// Borrow the current value, recording the read with the active trace.
    ///
    /// The value stays read-locked while `f` runs. Writing this cell from
    /// inside `f` (`set`, `update`, `mutate`) deadlocks; use
    /// [`get`](Cell::get) when the closure needs to write back.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        recorder::record_read(self);
        f(&self.shared.value.read())
    }

    /// Get the current value without tracking.
    pub fn peek(&self) -> T {
        self.shared.value.read().clone()
    }

    /// Replace the value and notify subscribers.
    pub fn set(&self, value: T) {
        let new = value.clone();
        let old = std::mem::replace(&mut *self.shared.value.write(), value);
        let version = self.shared.version.fetch_add(1, Ordering::SeqCst) + 1;
        trace!(cell = self.id().raw(), version, "cell replaced");

        self.shared.dispatch(&new, &old, Change::Replaced);
    }

    /// Replace the value with one derived from the previous value.
    pub fn update(&self, f: impl FnOnce(&T) -> T) {
        let current = self.peek();
        self.set(f(&current));
    }

    /// Re-broadcast the current value as `(value, value)`.
    ///
    /// The version does not change, so a trace that depends on this cell is
    /// not made dirty by it.
    pub fn notify(&self) {
        let value = self.peek();
        trace!(cell = self.id().raw(), "cell notified");
        self.shared.dispatch(&value, &value, Change::Notified);
    }

    /// Mutate the value in place, then [`notify`](Cell::notify).
    ///
    /// `f` runs on a copy without the cell locked, so it may read the cell.
    /// The copy is written back when `f` returns.
    pub fn mutate(&self, f: impl FnOnce(&mut T)) {
        let mut value = self.peek();
        f(&mut value);
        *self.shared.value.write() = value;
        self.notify();
    }

    /// Register a callback invoked with `(new, old)` on every dispatch.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&T, &T) + Send + Sync + 'static,
    {
        let id = self.shared.add(Listener::Value(Box::new(callback)));
        let weak = Arc::downgrade(&self.shared);
        let weak: Weak<dyn AnyCell> = weak;
        Subscription::new(id, weak)
    }

    /// Get the number of registered callbacks, watchers included.
    pub fn subscriber_count(&self) -> usize {
        self.shared.listeners.lock().len()
    }
}

impl<T> Trackable for Cell<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn cell_ref(&self) -> CellRef {
        let weak = Arc::downgrade(&self.shared);
        let weak: Weak<dyn AnyCell> = weak;
        CellRef {
            id: self.shared.id,
            cell: weak,
        }
    }
}

impl<T> Clone for Cell<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> Debug for Cell<T>
where
    T: Clone + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cell")
            .field("id", &self.id())
            .field("version", &self.version())
            .field("value", &self.peek())
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

/// Weak, type-erased reference to a cell.
///
/// Traces hold these: they look cells up but never keep them alive.
#[derive(Clone)]
pub struct CellRef {
    id: CellId,
    cell: Weak<dyn AnyCell>,
}

impl CellRef {
    /// The referenced cell's ID.
    pub fn id(&self) -> CellId {
        self.id
    }

    /// The cell's current version, or `None` if it has been dropped.
    pub fn version(&self) -> Option<u64> {
        self.cell.upgrade().map(|cell| cell.version())
    }

    /// Whether the cell still exists.
    pub fn is_alive(&self) -> bool {
        self.cell.strong_count() > 0
    }

    /// Register a type-erased watcher on the cell.
    ///
    /// Returns `None` if the cell has been dropped.
    pub fn watch<F>(&self, watcher: F) -> Option<Subscription>
    where
        F: Fn(Change) + Send + Sync + 'static,
    {
        let cell = self.cell.upgrade()?;
        let id = cell.add_watcher(Box::new(watcher));
        Some(Subscription::new(id, Arc::downgrade(&cell)))
    }
}

impl Trackable for CellRef {
    fn cell_ref(&self) -> CellRef {
        self.clone()
    }
}

impl PartialEq for CellRef {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for CellRef {}

impl Debug for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CellRef")
            .field("id", &self.id)
            .field("alive", &self.is_alive())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
