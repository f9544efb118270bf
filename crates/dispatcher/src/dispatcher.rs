//! MessageDispatcher - synchronous keyed fan-out
//!
//! Single-threaded: the dispatcher is `!Sync`, and `dispatch()` runs handlers
//! on the caller's thread.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::sync::Arc;

use contracts::{Message, MessageHandler};
use tracing::{debug, trace};

use crate::error::DispatchError;
use crate::metrics::{DispatchMetrics, MetricsSnapshot};
use crate::registry::HandlerRegistry;

const DISPATCHER_LABEL: &str = "sync";

/// Synchronous message dispatcher
///
/// Messages are queued by [`push_message`](Self::push_message) and delivered
/// when the owner calls [`dispatch`](Self::dispatch). All methods take `&self`,
/// so a handler holding a reference to the dispatcher may push, register or
/// unregister while it is being called.
pub struct MessageDispatcher {
    handlers: RefCell<HandlerRegistry<dyn MessageHandler>>,
    queue: RefCell<VecDeque<(String, Message)>>,
    metrics: DispatchMetrics,
}

impl MessageDispatcher {
    /// Create an empty dispatcher
    pub fn new() -> Self {
        Self {
            handlers: RefCell::new(HandlerRegistry::new()),
            queue: RefCell::new(VecDeque::new()),
            metrics: DispatchMetrics::new(),
        }
    }

    /// Subscribe `handler` to `key`
    ///
    /// Only a weak reference is kept. Registering the same handler twice
    /// under one key delivers each message to it twice.
    pub fn register_handler<H>(&self, key: impl Into<String>, handler: &Arc<H>)
    where
        H: MessageHandler + 'static,
    {
        let handler: Arc<dyn MessageHandler> = handler.clone();
        self.handlers
            .borrow_mut()
            .register(key.into(), Arc::downgrade(&handler));
    }

    /// Remove every registration of `handler` under `key`
    pub fn unregister_handler<H>(&self, key: &str, handler: &Arc<H>)
    where
        H: MessageHandler + 'static,
    {
        let handler: Arc<dyn MessageHandler> = handler.clone();
        let removed = self.handlers.borrow_mut().unregister(key, &handler);
        trace!(key, removed, "Handler unregistered");
    }

    /// Queue `message` under `key`
    pub fn push_message(&self, key: impl Into<String>, message: impl Into<Message>) {
        let mut queue = self.queue.borrow_mut();
        queue.push_back((key.into(), message.into()));
        self.metrics.inc_pushed_count();
        self.metrics.set_queue_len(queue.len());
        observability::record_message_pushed(DISPATCHER_LABEL);
        observability::record_queue_depth(DISPATCHER_LABEL, queue.len());
    }

    /// Queue an empty message under `key`
    pub fn push(&self, key: impl Into<String>) {
        self.push_message(key, Message::empty());
    }

    /// Deliver queued messages until the queue is empty
    ///
    /// Messages pushed by handlers during the call are delivered by the same
    /// call, so a handler that always pushes again never lets it return.
    /// Messages for keys without live handlers are dropped silently.
    ///
    /// Returns the number of drained messages.
    ///
    /// # Errors
    /// The first handler error stops the drain. The failing message is
    /// consumed, its remaining handlers are skipped, and later messages stay
    /// queued for the next call.
    pub fn dispatch(&self) -> Result<usize, DispatchError> {
        let mut drained = 0;

        loop {
            let Some((key, message)) = self.pop_front() else {
                break;
            };
            drained += 1;

            let handlers = self.handlers.borrow_mut().live_handlers(&key);
            if handlers.is_empty() {
                self.metrics.inc_dropped_count();
                observability::record_message_dropped(DISPATCHER_LABEL);
                trace!(key = %key, "No handlers registered, message dropped");
                continue;
            }

            for handler in handlers {
                if let Err(e) = handler.on_message(&key, &message) {
                    self.metrics.inc_failure_count();
                    observability::record_handler_failure(DISPATCHER_LABEL, "error");
                    debug!(key = %key, error = %e, "Handler failed, aborting dispatch");
                    self.record_batch(drained);
                    return Err(DispatchError::handler(key, e));
                }
                self.metrics.inc_delivered_count();
                observability::record_message_delivered(DISPATCHER_LABEL);
            }
        }

        self.record_batch(drained);
        Ok(drained)
    }

    /// Number of queued messages
    pub fn pending(&self) -> usize {
        self.queue.borrow().len()
    }

    /// Whether nothing is queued
    pub fn is_empty(&self) -> bool {
        self.queue.borrow().is_empty()
    }

    /// Number of live registrations under `key`
    pub fn handler_count(&self, key: &str) -> usize {
        self.handlers.borrow().handler_count(key)
    }

    /// Get metrics snapshot
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    fn record_batch(&self, drained: usize) {
        if drained > 0 {
            self.metrics.inc_batch_count();
            observability::record_batch_size(DISPATCHER_LABEL, drained);
        }
    }

    fn pop_front(&self) -> Option<(String, Message)> {
        let mut queue = self.queue.borrow_mut();
        let entry = queue.pop_front();
        self.metrics.set_queue_len(queue.len());
        entry
    }
}

impl Default for MessageDispatcher {
    fn default() -> Self {
        Self::new()
    }
}
