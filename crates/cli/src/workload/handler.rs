//! Counting handler used by the workload.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Instant;

use contracts::{HandlerError, Message, MessageHandler};
use observability::RunningStats;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Payload pushed by producers
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Sample {
    pub producer: u64,
    pub seq: u64,
    /// Microseconds since the workload epoch
    pub sent_us: u64,
}

impl Sample {
    pub fn to_value(self) -> Value {
        serde_json::json!({
            "producer": self.producer,
            "seq": self.seq,
            "sent_us": self.sent_us,
        })
    }
}

/// Counts deliveries and checks per-producer ordering for one key
pub struct CountingHandler {
    epoch: Instant,
    fail_every: u64,
    received: AtomicU64,
    rejected: AtomicU64,
    out_of_order: AtomicU64,
    last_seq: Mutex<HashMap<u64, u64>>,
    latency_ms: Mutex<RunningStats>,
}

impl CountingHandler {
    pub fn new(epoch: Instant, fail_every: u64) -> Self {
        Self {
            epoch,
            fail_every,
            received: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            out_of_order: AtomicU64::new(0),
            last_seq: Mutex::new(HashMap::new()),
            latency_ms: Mutex::new(RunningStats::default()),
        }
    }

    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }

    pub fn out_of_order(&self) -> u64 {
        self.out_of_order.load(Ordering::Relaxed)
    }

    /// Latency samples recorded so far
    pub fn latency_ms(&self) -> RunningStats {
        self.latency_ms
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn check_order(&self, sample: &Sample) {
        let mut last_seq = self.last_seq.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = last_seq.insert(sample.producer, sample.seq) {
            if sample.seq <= previous {
                self.out_of_order.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    fn record_latency(&self, sample: &Sample) {
        let now_us = self.epoch.elapsed().as_micros() as u64;
        let latency_ms = now_us.saturating_sub(sample.sent_us) as f64 / 1000.0;
        self.latency_ms
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(latency_ms);
    }
}

impl MessageHandler for CountingHandler {
    fn on_message(&self, key: &str, message: &Message) -> Result<(), HandlerError> {
        let sample: Sample =
            serde_json::from_value(message.expect_json(key)?.clone()).map_err(HandlerError::other)?;

        self.received.fetch_add(1, Ordering::Relaxed);
        self.check_order(&sample);
        self.record_latency(&sample);

        if self.fail_every > 0 && (sample.seq + 1) % self.fail_every == 0 {
            self.rejected.fetch_add(1, Ordering::Relaxed);
            return Err(HandlerError::rejected(
                key,
                format!("seq {} of producer {}", sample.seq, sample.producer),
            ));
        }
        Ok(())
    }
}
