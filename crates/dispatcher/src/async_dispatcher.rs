//! AsyncMessageDispatcher - keyed fan-out on a dedicated worker thread
//!
//! Producers push into a shared queue; the worker swaps the whole queue out
//! under the lock and delivers the batch with the lock released, so slow or
//! re-entrant handlers never block producers.

use std::cell::Cell;
use std::collections::VecDeque;
use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use contracts::{DispatcherConfig, HandlerFailurePolicy, Message, MessageHandler};
use tracing::{debug, error, instrument, trace, warn};

use crate::error::DispatchError;
use crate::metrics::{DispatchMetrics, MetricsSnapshot};
use crate::registry::HandlerRegistry;

type SharedHandler = dyn MessageHandler + Send + Sync;
type Batch = VecDeque<(String, Message)>;

thread_local! {
    /// Address of the dispatcher state whose worker runs on this thread (0 = none)
    static ACTIVE_WORKER: Cell<usize> = const { Cell::new(0) };
}

/// State guarded by the single dispatcher mutex
struct State {
    handlers: HandlerRegistry<SharedHandler>,
    queue: Batch,
    running: bool,
    /// Bumped on every start; a worker exits once its generation is stale
    generation: u64,
}

impl State {
    fn is_current(&self, generation: u64) -> bool {
        self.running && self.generation == generation
    }
}

struct Shared {
    state: Mutex<State>,
    /// Signalled on push and on stop
    wakeup: Condvar,
    /// Held by the worker for the duration of one message's delivery
    delivery: Mutex<()>,
    metrics: DispatchMetrics,
    config: DispatcherConfig,
}

impl Shared {
    fn lock_state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn on_worker_thread(self: &Arc<Self>) -> bool {
        let addr = Arc::as_ptr(self) as usize;
        ACTIVE_WORKER.with(|active| active.get() == addr)
    }

    fn name(&self) -> &str {
        &self.config.worker_name
    }
}

/// Result of delivering one message
enum Delivery {
    Continue,
    StopWorker,
}

/// Asynchronous message dispatcher
///
/// Lifecycle is Stopped -> Running -> Stopped and may be repeated.
/// [`stop_dispatching`](Self::stop_dispatching) joins the worker; dropping the
/// dispatcher does the same.
///
/// All methods take `&self`; share the dispatcher behind an `Arc` to push
/// from several threads or from handlers.
pub struct AsyncMessageDispatcher {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl AsyncMessageDispatcher {
    /// Create a stopped dispatcher with default configuration
    pub fn new() -> Self {
        Self::with_config(DispatcherConfig::default())
    }

    /// Create a stopped dispatcher
    pub fn with_config(config: DispatcherConfig) -> Self {
        let shared = Shared {
            state: Mutex::new(State {
                handlers: HandlerRegistry::new(),
                queue: VecDeque::new(),
                running: false,
                generation: 0,
            }),
            wakeup: Condvar::new(),
            delivery: Mutex::new(()),
            metrics: DispatchMetrics::new(),
            config,
        };

        Self {
            shared: Arc::new(shared),
            worker: Mutex::new(None),
        }
    }

    /// Subscribe `handler` to `key`
    ///
    /// Only a weak reference is kept. Takes effect for every message delivered
    /// after the call, including messages pushed before it.
    pub fn register_handler<H>(&self, key: impl Into<String>, handler: &Arc<H>)
    where
        H: MessageHandler + Send + Sync + 'static,
    {
        let handler: Arc<SharedHandler> = handler.clone();
        self.shared
            .lock_state()
            .handlers
            .register(key.into(), Arc::downgrade(&handler));
    }

    /// Remove every registration of `handler` under `key`
    ///
    /// When called from any thread other than the worker, waits for an
    /// in-flight delivery to finish: once this returns, the handler is not
    /// running and will not be called again for `key`.
    ///
    /// The wait covers whatever message is being delivered, whatever its key,
    /// so a slow handler on one key delays unregistering on every key.
    pub fn unregister_handler<H>(&self, key: &str, handler: &Arc<H>)
    where
        H: MessageHandler + Send + Sync + 'static,
    {
        let handler: Arc<SharedHandler> = handler.clone();
        let removed = self.shared.lock_state().handlers.unregister(key, &handler);
        trace!(key, removed, "Handler unregistered");

        if !self.shared.on_worker_thread() {
            drop(
                self.shared
                    .delivery
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner),
            );
        }
    }

    /// Queue `message` under `key` and wake the worker
    ///
    /// Safe from any thread, including handlers running on the worker; such
    /// messages are delivered in the next batch.
    pub fn push_message(&self, key: impl Into<String>, message: impl Into<Message>) {
        let depth = {
            let mut state = self.shared.lock_state();
            state.queue.push_back((key.into(), message.into()));
            self.shared.metrics.set_queue_len(state.queue.len());
            state.queue.len()
        };
        self.shared.metrics.inc_pushed_count();
        observability::record_message_pushed(self.shared.name());
        observability::record_queue_depth(self.shared.name(), depth);
        self.shared.wakeup.notify_one();
    }

    /// Queue an empty message under `key`
    pub fn push(&self, key: impl Into<String>) {
        self.push_message(key, Message::empty());
    }

    /// Start the worker thread
    ///
    /// # Errors
    /// - `InvalidWorkerName` if the configured name contains a NUL byte
    /// - `AlreadyRunning` if the worker is running
    /// - `Spawn` if the OS refuses to create the thread
    #[instrument(
        name = "async_dispatcher_start",
        skip(self),
        fields(worker = %self.shared.name())
    )]
    pub fn start_dispatching(&self) -> Result<(), DispatchError> {
        // Builder::spawn panics on interior NUL; reject before touching state.
        if self.shared.name().contains('\0') {
            return Err(DispatchError::InvalidWorkerName {
                worker: self.shared.name().to_string(),
                reason: "contains a NUL byte",
            });
        }

        let mut worker = self.worker_handle();

        let generation = {
            let mut state = self.shared.lock_state();
            if state.running {
                return Err(DispatchError::AlreadyRunning {
                    worker: self.shared.name().to_string(),
                });
            }
            state.running = true;
            state.generation += 1;
            state.generation
        };

        // A worker told to stop from its own thread is not joined by stop;
        // its generation is stale so it exits after its current batch.
        if let Some(previous) = worker.take() {
            if self.shared.on_worker_thread() {
                debug!("Restarted from worker thread, previous worker detached");
            } else if previous.join().is_err() {
                error!("Previous worker thread panicked");
            }
        }

        let shared = Arc::clone(&self.shared);
        let spawned = thread::Builder::new()
            .name(self.shared.config.worker_name.clone())
            .spawn(move || run_worker(shared, generation));

        match spawned {
            Ok(handle) => {
                *worker = Some(handle);
                debug!(generation, "Dispatcher worker spawned");
                Ok(())
            }
            Err(source) => {
                self.shared.lock_state().running = false;
                Err(DispatchError::Spawn {
                    worker: self.shared.name().to_string(),
                    source,
                })
            }
        }
    }

    /// Stop the worker and wait for it to exit
    ///
    /// The worker finishes the batch it is delivering (and, with
    /// `drain_on_stop`, everything still queued) before exiting. Undelivered
    /// messages stay queued for the next start. No-op when stopped.
    ///
    /// Called from a handler on the worker thread, this only signals the
    /// worker, which exits after the current batch.
    ///
    /// # Errors
    /// `WorkerPanicked` if the worker thread panicked outside a handler.
    #[instrument(
        name = "async_dispatcher_stop",
        skip(self),
        fields(worker = %self.shared.name())
    )]
    pub fn stop_dispatching(&self) -> Result<(), DispatchError> {
        self.shared.lock_state().running = false;
        self.shared.wakeup.notify_all();

        if self.shared.on_worker_thread() {
            debug!("Stop requested from worker thread, not joining");
            return Ok(());
        }

        let handle = self.worker_handle().take();
        if let Some(handle) = handle {
            handle.join().map_err(|_| DispatchError::WorkerPanicked {
                worker: self.shared.name().to_string(),
            })?;
            debug!(pending = self.pending(), "Dispatcher worker joined");
        }
        Ok(())
    }

    /// Whether the worker is (or is about to be) running
    pub fn is_running(&self) -> bool {
        self.shared.lock_state().running
    }

    /// Number of queued, not yet swapped-out messages
    pub fn pending(&self) -> usize {
        self.shared.lock_state().queue.len()
    }

    /// Number of live registrations under `key`
    pub fn handler_count(&self, key: &str) -> usize {
        self.shared.lock_state().handlers.handler_count(key)
    }

    /// Worker configuration
    pub fn config(&self) -> &DispatcherConfig {
        &self.shared.config
    }

    /// Get metrics snapshot
    pub fn metrics(&self) -> MetricsSnapshot {
        self.shared.metrics.snapshot()
    }

    fn worker_handle(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.worker.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for AsyncMessageDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for AsyncMessageDispatcher {
    fn drop(&mut self) {
        if let Err(e) = self.stop_dispatching() {
            error!(error = %e, "Failed to stop dispatcher on drop");
        }
    }
}

/// Worker loop: wait for messages, swap the queue out, deliver the batch
fn run_worker(shared: Arc<Shared>, generation: u64) {
    ACTIVE_WORKER.with(|active| active.set(Arc::as_ptr(&shared) as usize));
    debug!(worker = %shared.name(), generation, "Dispatcher worker started");

    let poll_interval = shared.config.poll_interval();
    let mut failed = false;

    while let Some(batch) = next_batch(&shared, generation, poll_interval) {
        shared.metrics.inc_batch_count();
        observability::record_batch_size(shared.name(), batch.len());
        observability::record_queue_depth(shared.name(), 0);
        trace!(size = batch.len(), "Batch swapped out");

        if let Some(rest) = deliver_batch(&shared, batch) {
            requeue_front(&shared, generation, rest);
            failed = true;
            break;
        }
    }

    if shared.config.drain_on_stop && !failed {
        drain_remaining(&shared, generation);
    }

    ACTIVE_WORKER.with(|active| active.set(0));
    debug!(worker = %shared.name(), generation, "Dispatcher worker stopped");
}

/// Block until there is work or the worker is no longer current
fn next_batch(shared: &Shared, generation: u64, poll_interval: Duration) -> Option<Batch> {
    let mut state = shared.lock_state();
    loop {
        if !state.is_current(generation) {
            return None;
        }
        if !state.queue.is_empty() {
            shared.metrics.set_queue_len(0);
            return Some(mem::take(&mut state.queue));
        }
        let (guard, _) = shared
            .wakeup
            .wait_timeout(state, poll_interval)
            .unwrap_or_else(PoisonError::into_inner);
        state = guard;
    }
}

/// Deliver every queued message before exiting, unless a newer worker owns the queue
fn drain_remaining(shared: &Shared, generation: u64) {
    loop {
        let batch = {
            let mut state = shared.lock_state();
            if state.running || state.generation != generation || state.queue.is_empty() {
                return;
            }
            shared.metrics.set_queue_len(0);
            mem::take(&mut state.queue)
        };

        debug!(size = batch.len(), "Draining queue on stop");
        shared.metrics.inc_batch_count();
        if let Some(rest) = deliver_batch(shared, batch) {
            requeue_front(shared, generation, rest);
            return;
        }
    }
}

/// Deliver a batch in order; returns the undelivered rest if the worker must stop
fn deliver_batch(shared: &Shared, mut batch: Batch) -> Option<Batch> {
    while let Some((key, message)) = batch.pop_front() {
        if let Delivery::StopWorker = deliver_one(shared, &key, &message) {
            return Some(batch);
        }
    }
    None
}

fn deliver_one(shared: &Shared, key: &str, message: &Message) -> Delivery {
    let _delivering = shared
        .delivery
        .lock()
        .unwrap_or_else(PoisonError::into_inner);

    let handlers = shared.lock_state().handlers.live_handlers(key);
    if handlers.is_empty() {
        shared.metrics.inc_dropped_count();
        observability::record_message_dropped(shared.name());
        trace!(key, "No handlers registered, message dropped");
        return Delivery::Continue;
    }

    for handler in handlers {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| handler.on_message(key, message)));

        let (kind, reason) = match outcome {
            Ok(Ok(())) => {
                shared.metrics.inc_delivered_count();
                observability::record_message_delivered(shared.name());
                continue;
            }
            Ok(Err(e)) => ("error", e.to_string()),
            Err(payload) => ("panic", panic_message(payload.as_ref())),
        };

        shared.metrics.inc_failure_count();
        observability::record_handler_failure(shared.name(), kind);

        match shared.config.failure_policy {
            HandlerFailurePolicy::LogAndContinue => {
                warn!(key, kind, reason = %reason, "Handler failed, continuing");
            }
            HandlerFailurePolicy::StopWorker => {
                error!(key, kind, reason = %reason, "Handler failed, stopping worker");
                return Delivery::StopWorker;
            }
        }
    }

    Delivery::Continue
}

/// Put undelivered messages back ahead of anything pushed meanwhile
fn requeue_front(shared: &Shared, generation: u64, mut rest: Batch) {
    let mut state = shared.lock_state();
    if state.generation == generation {
        state.running = false;
    }
    if rest.is_empty() {
        return;
    }

    rest.extend(state.queue.drain(..));
    state.queue = rest;
    shared.metrics.set_queue_len(state.queue.len());
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
