//! Producer/handler workload against the asynchronous dispatcher.
//!
//! One [`CountingHandler`] per key, `producers` threads each pushing
//! `messages_per_producer` JSON samples round-robin over the keys.

mod handler;
mod stats;

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use contracts::DispatcherConfig;
use dispatcher::{AsyncMessageDispatcher, MetricsSnapshot};
use observability::BatchStatsAggregator;
use tracing::{debug, info, warn};

use crate::error::{CliError, Result};

pub use handler::{CountingHandler, Sample};
pub use stats::{RunOutcome, RunStats};

/// How often the driver samples dispatcher metrics
const SAMPLE_INTERVAL: Duration = Duration::from_millis(20);

/// Workload configuration
#[derive(Debug, Clone)]
pub struct WorkloadConfig {
    pub keys: usize,
    pub producers: usize,
    pub messages_per_producer: u64,
    /// Reject every Nth message of each producer (0 = never)
    pub fail_every: u64,
    /// None = wait until delivered or interrupted
    pub timeout: Option<Duration>,
    pub dispatcher: DispatcherConfig,
}

/// Workload driver
pub struct Workload {
    config: WorkloadConfig,
}

impl Workload {
    pub fn new(config: WorkloadConfig) -> Result<Self> {
        if config.keys == 0 {
            return Err(CliError::invalid_argument("keys", "must be at least 1"));
        }
        if config.producers == 0 {
            return Err(CliError::invalid_argument("producers", "must be at least 1"));
        }
        Ok(Self { config })
    }

    /// Total messages the producers push
    pub fn expected(&self) -> u64 {
        self.config.producers as u64 * self.config.messages_per_producer
    }

    /// Run until every message is delivered, the timeout elapses, the worker
    /// stops itself, or `shutdown` resolves
    pub async fn run(self, shutdown: impl Future<Output = ()>) -> Result<RunStats> {
        let config = &self.config;
        let expected = self.expected();
        let epoch = Instant::now();

        let dispatcher = Arc::new(AsyncMessageDispatcher::with_config(
            config.dispatcher.clone(),
        ));

        let keys: Arc<Vec<String>> =
            Arc::new((0..config.keys).map(|i| format!("key-{i}")).collect());
        let handlers: Vec<Arc<CountingHandler>> = keys
            .iter()
            .map(|key| {
                let handler = Arc::new(CountingHandler::new(epoch, config.fail_every));
                dispatcher.register_handler(key.as_str(), &handler);
                handler
            })
            .collect();

        dispatcher.start_dispatching()?;
        info!(
            keys = config.keys,
            producers = config.producers,
            messages = expected,
            "Workload started"
        );

        let cancel = Arc::new(AtomicBool::new(false));
        let producers = (0..config.producers)
            .map(|index| {
                spawn_producer(
                    index,
                    config.messages_per_producer,
                    epoch,
                    Arc::clone(&keys),
                    Arc::clone(&dispatcher),
                    Arc::clone(&cancel),
                )
            })
            .collect::<Result<Vec<_>>>()?;

        let mut aggregator = BatchStatsAggregator::new();
        let deadline = config.timeout.map(|t| tokio::time::Instant::now() + t);
        let mut ticker = tokio::time::interval(SAMPLE_INTERVAL);
        let mut last = dispatcher.metrics();
        tokio::pin!(shutdown);

        let outcome = loop {
            tokio::select! {
                _ = &mut shutdown => break RunOutcome::Interrupted,
                _ = deadline_elapsed(deadline) => break RunOutcome::TimedOut,
                _ = ticker.tick() => {
                    let now = dispatcher.metrics();
                    sample_batches(&mut aggregator, &last, &now);
                    last = now;

                    if total(&handlers, |h| h.received()) >= expected {
                        break RunOutcome::Completed;
                    }
                    if !dispatcher.is_running() {
                        break RunOutcome::WorkerStopped;
                    }
                }
            }
        };

        match outcome {
            RunOutcome::Completed => debug!("All messages delivered"),
            RunOutcome::TimedOut => warn!("Workload timed out before delivery completed"),
            RunOutcome::Interrupted => warn!("Received shutdown signal, stopping workload"),
            RunOutcome::WorkerStopped => warn!("Dispatcher worker stopped on handler failure"),
        }

        cancel.store(true, Ordering::Relaxed);
        tokio::task::spawn_blocking(move || join_producers(producers)).await??;

        let stopping = Arc::clone(&dispatcher);
        tokio::task::spawn_blocking(move || stopping.stop_dispatching()).await??;

        for (key, handler) in keys.iter().zip(&handlers) {
            dispatcher.unregister_handler(key, handler);
        }

        for handler in &handlers {
            aggregator.latency_ms.merge(&handler.latency_ms());
        }

        Ok(RunStats {
            outcome,
            expected,
            received: total(&handlers, |h| h.received()),
            rejected: total(&handlers, |h| h.rejected()),
            out_of_order: total(&handlers, |h| h.out_of_order()),
            dispatcher: dispatcher.metrics(),
            batches: aggregator.summary(),
            duration: epoch.elapsed(),
        })
    }
}

fn spawn_producer(
    index: usize,
    messages: u64,
    epoch: Instant,
    keys: Arc<Vec<String>>,
    dispatcher: Arc<AsyncMessageDispatcher>,
    cancel: Arc<AtomicBool>,
) -> Result<JoinHandle<()>> {
    let handle = thread::Builder::new()
        .name(format!("producer-{index}"))
        .spawn(move || {
            for seq in 0..messages {
                if cancel.load(Ordering::Relaxed) {
                    debug!(producer = index, seq, "Producer cancelled");
                    return;
                }
                let key = &keys[(seq as usize + index) % keys.len()];
                let sample = Sample {
                    producer: index as u64,
                    seq,
                    sent_us: epoch.elapsed().as_micros() as u64,
                };
                dispatcher.push_message(key.as_str(), sample.to_value());
            }
        })?;
    Ok(handle)
}

fn join_producers(producers: Vec<JoinHandle<()>>) -> Result<()> {
    for (index, producer) in producers.into_iter().enumerate() {
        producer
            .join()
            .map_err(|_| CliError::ProducerPanicked { index })?;
    }
    Ok(())
}

/// Average handler deliveries per batch since the previous sample
fn sample_batches(
    aggregator: &mut BatchStatsAggregator,
    previous: &MetricsSnapshot,
    current: &MetricsSnapshot,
) {
    let batches = current.batch_count.saturating_sub(previous.batch_count);
    if batches == 0 {
        return;
    }
    let delivered = current.delivered_count.saturating_sub(previous.delivered_count)
        + current.failure_count.saturating_sub(previous.failure_count);
    aggregator.record_batch((delivered / batches) as usize);
}

async fn deadline_elapsed(deadline: Option<tokio::time::Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn total(handlers: &[Arc<CountingHandler>], f: impl Fn(&CountingHandler) -> u64) -> u64 {
    handlers.iter().map(|h| f(h.as_ref())).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::HandlerFailurePolicy;

    fn config(producers: usize, messages: u64) -> WorkloadConfig {
        WorkloadConfig {
            keys: 3,
            producers,
            messages_per_producer: messages,
            fail_every: 0,
            timeout: Some(Duration::from_secs(10)),
            dispatcher: DispatcherConfig {
                poll_interval_ms: 5,
                ..DispatcherConfig::default()
            },
        }
    }

    #[test]
    fn test_rejects_empty_workload() {
        let mut cfg = config(1, 1);
        cfg.keys = 0;
        assert!(matches!(
            Workload::new(cfg),
            Err(CliError::InvalidArgument { name: "keys", .. })
        ));
    }

    #[tokio::test]
    async fn test_completes_in_order() {
        let workload = Workload::new(config(2, 200)).unwrap();
        let stats = workload.run(std::future::pending()).await.unwrap();

        assert_eq!(stats.outcome, RunOutcome::Completed);
        assert_eq!(stats.received, 400);
        assert_eq!(stats.out_of_order, 0);
        assert_eq!(stats.dispatcher.pushed_count, 400);
        assert_eq!(stats.dispatcher.delivered_count, 400);
        assert_eq!(stats.batches.latency_ms.count, 400);
    }

    #[tokio::test]
    async fn test_failures_are_counted_and_skipped() {
        let mut cfg = config(2, 100);
        cfg.fail_every = 10;
        let stats = Workload::new(cfg)
            .unwrap()
            .run(std::future::pending())
            .await
            .unwrap();

        assert_eq!(stats.outcome, RunOutcome::Completed);
        assert_eq!(stats.received, 200);
        assert_eq!(stats.rejected, 20);
        assert_eq!(stats.dispatcher.failure_count, 20);
    }

    #[tokio::test]
    async fn test_stop_worker_policy_ends_run() {
        let mut cfg = config(1, 100);
        cfg.fail_every = 5;
        cfg.dispatcher.failure_policy = HandlerFailurePolicy::StopWorker;
        let stats = Workload::new(cfg)
            .unwrap()
            .run(std::future::pending())
            .await
            .unwrap();

        assert_eq!(stats.outcome, RunOutcome::WorkerStopped);
        assert_eq!(stats.rejected, 1);
        assert!(stats.received < 100);
    }

    #[tokio::test]
    async fn test_shutdown_signal_interrupts() {
        let workload = Workload::new(config(1, 200_000)).unwrap();
        let stats = workload.run(async {}).await.unwrap();

        assert_eq!(stats.outcome, RunOutcome::Interrupted);
        assert!(stats.received <= 200_000);
    }
}
