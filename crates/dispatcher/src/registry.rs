//! HandlerRegistry - key -> handlers multi-map holding weak references

use std::collections::HashMap;
use std::sync::{Arc, Weak};

/// Multi-map from key to handlers, in registration order per key
///
/// Entries are weak: liveness is checked when handlers are looked up for
/// delivery, and dead entries are pruned at that point.
pub(crate) struct HandlerRegistry<H: ?Sized> {
    entries: HashMap<String, Vec<Weak<H>>>,
}

impl<H: ?Sized> HandlerRegistry<H> {
    pub(crate) fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Append `handler` under `key` (duplicates allowed)
    pub(crate) fn register(&mut self, key: String, handler: Weak<H>) {
        self.entries.entry(key).or_default().push(handler);
    }

    /// Remove every entry under `key` pointing at `handler`
    ///
    /// Returns the number of removed entries.
    pub(crate) fn unregister(&mut self, key: &str, handler: &Arc<H>) -> usize {
        let Some(handlers) = self.entries.get_mut(key) else {
            return 0;
        };

        let target = Arc::as_ptr(handler) as *const ();
        let before = handlers.len();
        handlers.retain(|weak| weak.as_ptr() as *const () != target);
        let removed = before - handlers.len();

        if handlers.is_empty() {
            self.entries.remove(key);
        }
        removed
    }

    /// Upgrade the handlers registered under `key`, pruning dead ones
    pub(crate) fn live_handlers(&mut self, key: &str) -> Vec<Arc<H>> {
        let Some(handlers) = self.entries.get_mut(key) else {
            return Vec::new();
        };

        let mut live = Vec::with_capacity(handlers.len());
        handlers.retain(|weak| match weak.upgrade() {
            Some(handler) => {
                live.push(handler);
                true
            }
            None => false,
        });

        if handlers.is_empty() {
            self.entries.remove(key);
        }
        live
    }

    /// Number of live registrations under `key`
    pub(crate) fn handler_count(&self, key: &str) -> usize {
        self.entries
            .get(key)
            .map_or(0, |handlers| {
                handlers.iter().filter(|w| w.strong_count() > 0).count()
            })
    }

    /// Number of keys with at least one registration (live or not yet pruned)
    #[cfg(test)]
    pub(crate) fn key_count(&self) -> usize {
        self.entries.len()
    }
}

impl<H: ?Sized> Default for HandlerRegistry<H> {
    fn default() -> Self {
        Self::new()
    }
}
