//! Subscriber types for the reactive system.
//!
//! A subscriber is a callback registered on a cell. Registration returns a
//! [`Subscription`], the capability that removes it again.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Weak;

use super::cell::AnyCell;

/// Unique identifier for a subscriber.
///
/// Each registered callback gets a unique ID. The ID is what a
/// [`Subscription`] uses to find and remove its callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Generate a new unique subscriber ID.
    ///
    /// Uses an atomic counter to ensure uniqueness across threads.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle to a registered callback.
///
/// Dropping the handle unsubscribes the callback, the same way dropping a
/// [`MountHandle`] tears its mount down. Call [`detach`] to keep
/// the callback registered for the rest of the cell's life.
///
/// The handle holds only a weak reference to the cell, so it never keeps the
/// cell alive.
///
/// [`detach`]: Subscription::detach
/// [`MountHandle`]: crate::render::MountHandle
#[must_use = "dropping a Subscription unsubscribes the callback"]
pub struct Subscription {
    id: SubscriberId,
    cell: Weak<dyn AnyCell>,
    detached: bool,
}

impl Subscription {
    pub(crate) fn new(id: SubscriberId, cell: Weak<dyn AnyCell>) -> Self {
        Self {
            id,
            cell,
            detached: false,
        }
    }

    /// The ID of the subscribed callback.
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Remove the callback.
    ///
    /// Safe to call from inside a notification dispatch: the removed callback
    /// is not invoked again, not even later in the dispatch that is running.
    pub fn unsubscribe(mut self) {
        self.remove();
    }

    /// Keep the callback registered without holding on to this handle.
    pub fn detach(mut self) {
        self.detached = true;
    }

    fn remove(&mut self) {
        if let Some(cell) = self.cell.upgrade() {
            cell.remove_listener(self.id);
        }
        // Drop after an explicit unsubscribe must not remove twice.
        self.detached = true;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if !self.detached {
            self.remove();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("detached", &self.detached)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscriber_ids_are_unique() {
        let id1 = SubscriberId::new();
        let id2 = SubscriberId::new();
        let id3 = SubscriberId::new();

        assert_ne!(id1, id2);
        assert_ne!(id2, id3);
        assert_ne!(id1, id3);
    }
}
