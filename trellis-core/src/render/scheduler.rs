//! Render Scheduler
//!
//! The scheduler batches renders. A cell write reaches every mount watching
//! the cell, and each of those mounts is queued here instead of rendering on
//! the spot.
//!
//! # Algorithm
//!
//! 1. `schedule` inserts the mount into the pending set. The set is ordered
//!    by first insertion and deduplicated, so a burst of writes queues each
//!    mount once. A `Notified` change marks the entry as forced, since an
//!    in-place mutation leaves the versions unchanged.
//! 2. The first entry of a burst wakes the driver through a
//!    [`tokio::sync::Notify`].
//! 3. `flush` drains the set in rounds. Each mount runs its render cycle,
//!    which still dirty-checks, so an entry whose writes were reverted or
//!    superseded is cheap.
//!
//! A render that writes a cell its own mount observes queues the mount
//! again. Such entries are picked up by the next round, up to
//! `max_flush_rounds`; a plain write made during the render is already in
//! the committed snapshot and the entry is skipped as clean, while a
//! [`Cell::notify`](crate::reactive::Cell::notify) forces another render.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::{debug, warn};

use super::mount::{Component, Mount, MountHandle, MountId};
use crate::config::SchedulerConfig;
use crate::error::{Error, Result};
use crate::tree::Morpher;

pub(crate) struct SchedulerInner {
    config: SchedulerConfig,
    /// Mounts waiting for a render, with whether the render is forced.
    pending: Mutex<IndexMap<MountId, bool>>,
    mounts: Mutex<HashMap<MountId, Weak<Mount>>>,
    wake: Notify,
}

impl SchedulerInner {
    pub(crate) fn schedule(&self, id: MountId, forced: bool) {
        let mut pending = self.pending.lock();
        let first = pending.is_empty();
        *pending.entry(id).or_insert(false) |= forced;
        drop(pending);
        if first {
            self.wake.notify_one();
        }
    }

    pub(crate) fn forget(&self, id: MountId) {
        self.mounts.lock().remove(&id);
    }
}

/// Batches and runs the renders of its mounts.
///
/// Cloning the scheduler yields another handle to the same queue.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                config,
                pending: Mutex::new(IndexMap::new()),
                mounts: Mutex::new(HashMap::new()),
                wake: Notify::new(),
            }),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.inner.config
    }

    /// Mount `component` and queue its first render.
    pub fn mount(&self, component: impl Component) -> MountHandle {
        let morpher = Morpher::new(self.inner.config.morph.clone());
        let mount = Arc::new(Mount::new(
            Box::new(component),
            morpher,
            Arc::downgrade(&self.inner),
        ));
        let id = mount.id();
        self.inner.mounts.lock().insert(id, Arc::downgrade(&mount));
        self.inner.schedule(id, true);
        debug!(mount = id.raw(), "component mounted");
        MountHandle::new(mount)
    }

    /// Queue a render of `id`. A forced render skips the dirty check.
    pub fn schedule(&self, id: MountId, forced: bool) {
        self.inner.schedule(id, forced);
    }

    /// Number of mounts waiting for a render.
    pub fn pending(&self) -> usize {
        self.inner.pending.lock().len()
    }

    /// Number of live mounts.
    pub fn mount_count(&self) -> usize {
        self.inner.mounts.lock().len()
    }

    /// Drain the queue, running each pending mount's render cycle.
    ///
    /// Returns the number of renders that ran. Every pending mount is
    /// processed even if one fails; the first error is returned.
    pub fn flush(&self) -> Result<usize> {
        let mut rendered = 0;
        let mut first_error: Option<Error> = None;

        for round in 0..self.inner.config.max_flush_rounds {
            let batch = self.pending();
            if batch == 0 {
                break;
            }
            debug!(round, mounts = batch, "flushing render queue");

            // Entries leave the queue one at a time, so a render that panics
            // leaves the rest of the round queued.
            for _ in 0..batch {
                let Some((id, forced)) = self.inner.pending.lock().shift_remove_index(0) else {
                    break;
                };
                let mount = self.inner.mounts.lock().get(&id).and_then(Weak::upgrade);
                let Some(mount) = mount else {
                    debug!(mount = id.raw(), "stale render entry skipped");
                    continue;
                };
                match mount.update(forced) {
                    Ok(true) => rendered += 1,
                    Ok(false) => {}
                    Err(err) => {
                        warn!(mount = id.raw(), error = %err, "render failed");
                        first_error.get_or_insert(err);
                    }
                }
            }
        }

        let left = self.pending();
        if left > 0 {
            warn!(
                left,
                rounds = self.inner.config.max_flush_rounds,
                "render queue not drained; renders keep scheduling themselves"
            );
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(rendered),
        }
    }

    /// Drive the scheduler: wait for work, let the current burst of writes
    /// finish, then flush. Runs until the task is dropped or a flush fails.
    pub async fn run(&self) -> Result<()> {
        loop {
            self.inner.wake.notified().await;
            tokio::task::yield_now().await;
            let rendered = self.flush()?;
            debug!(rendered, "flush complete");
            if self.pending() > 0 {
                self.inner.wake.notify_one();
            }
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new(SchedulerConfig::default())
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("pending", &self.pending())
            .field("mounts", &self.mount_count())
            .finish()
    }
}
