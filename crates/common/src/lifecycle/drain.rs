//! Interruption-safe draining of a teardown registry

use std::collections::VecDeque;

use parking_lot::Mutex;
use tracing::warn;

/// Items taken from a registry for one teardown pass.
///
/// If the pass is dropped before every item was handed out (the caller's
/// future was dropped mid-teardown), the items not yet reached go back to
/// the front of the registry in their original order, so the next pass
/// still releases them.
pub(super) struct Drain<'a, T> {
    registry: &'a Mutex<Vec<T>>,
    pending: VecDeque<T>,
    attempted: usize,
}

impl<'a, T> Drain<'a, T> {
    pub(super) fn new(registry: &'a Mutex<Vec<T>>) -> Self {
        let pending: VecDeque<T> = std::mem::take(&mut *registry.lock()).into();
        let attempted = pending.len();
        Self { registry, pending, attempted }
    }

    /// Number of items taken for this pass
    pub(super) fn attempted(&self) -> usize {
        self.attempted
    }

    pub(super) fn next_item(&mut self) -> Option<T> {
        self.pending.pop_front()
    }
}

impl<T> Drop for Drain<'_, T> {
    fn drop(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        warn!(remaining = self.pending.len(), "teardown interrupted, returning unreleased items");
        let mut registry = self.registry.lock();
        let registered_since = std::mem::take(&mut *registry);
        registry.extend(self.pending.drain(..));
        registry.extend(registered_since);
    }
}
