//! Workload statistics.

use std::fmt;
use std::time::Duration;

use dispatcher::MetricsSnapshot;
use observability::BatchSummary;
use serde_json::{json, Value};

/// How the workload ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every pushed message reached its handler
    Completed,
    /// The timeout elapsed first
    TimedOut,
    /// Ctrl+C / SIGTERM
    Interrupted,
    /// The worker stopped itself (`stop_worker` failure policy)
    WorkerStopped,
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunOutcome::Completed => "completed",
            RunOutcome::TimedOut => "timed out",
            RunOutcome::Interrupted => "interrupted",
            RunOutcome::WorkerStopped => "worker stopped",
        };
        f.write_str(s)
    }
}

/// Statistics from a workload run
#[derive(Debug, Clone)]
pub struct RunStats {
    pub outcome: RunOutcome,

    /// Messages the producers were asked to push
    pub expected: u64,

    /// Handler invocations observed by the counting handlers
    pub received: u64,

    /// Deliveries rejected by the handlers
    pub rejected: u64,

    /// Deliveries that arrived before an earlier message of the same producer
    pub out_of_order: u64,

    /// Dispatcher counters after stop
    pub dispatcher: MetricsSnapshot,

    /// Batch size and latency summary
    pub batches: BatchSummary,

    pub duration: Duration,
}

impl RunStats {
    /// Delivered messages per second
    pub fn throughput(&self) -> f64 {
        let secs = self.duration.as_secs_f64();
        if secs > 0.0 {
            self.received as f64 / secs
        } else {
            0.0
        }
    }

    pub fn to_json(&self) -> Value {
        json!({
            "outcome": self.outcome.to_string(),
            "expected": self.expected,
            "received": self.received,
            "rejected": self.rejected,
            "out_of_order": self.out_of_order,
            "duration_secs": self.duration.as_secs_f64(),
            "throughput": self.throughput(),
            "dispatcher": {
                "pushed": self.dispatcher.pushed_count,
                "delivered": self.dispatcher.delivered_count,
                "dropped": self.dispatcher.dropped_count,
                "failures": self.dispatcher.failure_count,
                "batches": self.dispatcher.batch_count,
                "still_queued": self.dispatcher.queue_len,
            },
            "batch_size": {
                "count": self.batches.batch_size.count,
                "mean": self.batches.batch_size.mean,
                "max": self.batches.batch_size.max,
            },
            "latency_ms": {
                "count": self.batches.latency_ms.count,
                "mean": self.batches.latency_ms.mean,
                "max": self.batches.latency_ms.max,
                "std_dev": self.batches.latency_ms.std_dev,
            },
        })
    }

    /// Print detailed summary
    pub fn print_summary(&self) {
        println!("\n╔══════════════════════════════════════════════════════════════╗");
        println!("║                    Workload Statistics                       ║");
        println!("╚══════════════════════════════════════════════════════════════╝\n");

        println!("📊 Overview");
        println!("   ├─ Outcome: {}", self.outcome);
        println!("   ├─ Duration: {:.2}s", self.duration.as_secs_f64());
        println!("   ├─ Received: {} / {}", self.received, self.expected);
        println!("   ├─ Rejected: {}", self.rejected);
        println!("   ├─ Out of order: {}", self.out_of_order);
        println!("   └─ Throughput: {:.0} msg/s", self.throughput());

        println!("\n📈 Dispatcher");
        println!("   ├─ Pushed: {}", self.dispatcher.pushed_count);
        println!("   ├─ Delivered: {}", self.dispatcher.delivered_count);
        println!("   ├─ Dropped: {}", self.dispatcher.dropped_count);
        println!("   ├─ Handler failures: {}", self.dispatcher.failure_count);
        println!("   ├─ Batches: {}", self.dispatcher.batch_count);
        println!("   └─ Still queued: {}", self.dispatcher.queue_len);

        println!("\n⏱️  Batches");
        for line in self.batches.to_string().lines() {
            println!("   {line}");
        }

        println!();
    }
}
