//! `run` command implementation.

use anyhow::{Context, Result};
use std::time::Duration;
use tracing::info;

use contracts::BusConfig;

use crate::cli::RunArgs;
use crate::workload::{RunOutcome, Workload, WorkloadConfig};

/// Execute the `run` command
///
/// `bus` is the configuration already loaded from `args.config` (or defaults).
pub async fn run_workload(args: &RunArgs, mut bus: BusConfig) -> Result<()> {

    // Apply CLI overrides
    if let Some(interval) = args.poll_interval_ms {
        info!(poll_interval_ms = interval, "Overriding poll interval from CLI");
        bus.dispatcher.poll_interval_ms = interval;
    }
    if args.drain_on_stop {
        bus.dispatcher.drain_on_stop = true;
    }
    if let Some(port) = args.metrics_port {
        bus.logging.metrics_port = Some(port);
    }
    config_loader::ConfigLoader::validate(&bus).context("Invalid configuration overrides")?;

    if let Some(port) = bus.logging.metrics_port {
        observability::init_metrics_only(port)?;
    }

    info!(
        worker = %bus.dispatcher.worker_name,
        poll_interval_ms = bus.dispatcher.poll_interval_ms,
        failure_policy = ?bus.dispatcher.failure_policy,
        "Configuration loaded"
    );

    let workload = Workload::new(WorkloadConfig {
        keys: args.keys,
        producers: args.producers,
        messages_per_producer: args.messages,
        fail_every: args.fail_every,
        timeout: if args.timeout == 0 {
            None
        } else {
            Some(Duration::from_secs(args.timeout))
        },
        dispatcher: bus.dispatcher,
    })?;

    let stats = workload
        .run(shutdown_signal())
        .await
        .context("Workload execution failed")?;

    info!(
        outcome = %stats.outcome,
        received = stats.received,
        duration_secs = stats.duration.as_secs_f64(),
        throughput = format!("{:.0}", stats.throughput()),
        "Workload finished"
    );

    if args.json {
        let json = serde_json::to_string_pretty(&stats.to_json())
            .context("Failed to serialize run statistics")?;
        println!("{json}");
    } else {
        stats.print_summary();
    }

    match stats.outcome {
        RunOutcome::Completed | RunOutcome::Interrupted => Ok(()),
        RunOutcome::TimedOut => anyhow::bail!(
            "Timed out with {} of {} messages delivered",
            stats.received,
            stats.expected
        ),
        RunOutcome::WorkerStopped => anyhow::bail!("Dispatcher worker stopped on handler failure"),
    }
}

/// Resolve on Ctrl+C or SIGTERM
///
/// If a handler cannot be installed, that signal is ignored.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
