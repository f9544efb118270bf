//! `validate` command implementation.

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use contracts::{BusConfig, HandlerFailurePolicy};

use crate::cli::ValidateArgs;
use crate::config;

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Serialize)]
struct ConfigSummary {
    version: String,
    worker_name: String,
    poll_interval_ms: u64,
    failure_policy: String,
    drain_on_stop: bool,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating configuration");

    let result = validate_config(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Configuration validation failed")
    }
}

fn validate_config(args: &ValidateArgs) -> ValidationResult {
    let config_path = args.config.display().to_string();

    match config::load(&args.config) {
        Ok(bus) => {
            let warnings = collect_warnings(&bus);
            ValidationResult {
                valid: true,
                config_path,
                error: None,
                warnings: if warnings.is_empty() {
                    None
                } else {
                    Some(warnings)
                },
                summary: Some(ConfigSummary {
                    version: format!("{:?}", bus.version),
                    worker_name: bus.dispatcher.worker_name.clone(),
                    poll_interval_ms: bus.dispatcher.poll_interval_ms,
                    failure_policy: format!("{:?}", bus.dispatcher.failure_policy),
                    drain_on_stop: bus.dispatcher.drain_on_stop,
                }),
            }
        }
        Err(e) => ValidationResult {
            valid: false,
            config_path,
            error: Some(e.to_string()),
            warnings: None,
            summary: None,
        },
    }
}

/// Collect configuration warnings (non-fatal issues)
fn collect_warnings(bus: &BusConfig) -> Vec<String> {
    let mut warnings = Vec::new();

    if bus.dispatcher.poll_interval_ms > 1000 {
        warnings.push(format!(
            "dispatcher.poll_interval_ms = {} - stop may take up to that long to observe",
            bus.dispatcher.poll_interval_ms
        ));
    }

    if bus.dispatcher.failure_policy == HandlerFailurePolicy::StopWorker
        && !bus.dispatcher.drain_on_stop
    {
        warnings.push(
            "failure_policy = stop_worker leaves undelivered messages queued until restart"
                .to_string(),
        );
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Version: {}", summary.version);
            println!("  Worker: {}", summary.worker_name);
            println!("  Poll interval: {} ms", summary.poll_interval_ms);
            println!("  Failure policy: {}", summary.failure_policy);
            println!("  Drain on stop: {}", summary.drain_on_stop);
        }

        if let Some(ref warnings) = result.warnings {
            println!("\n⚠ Warnings:");
            for warning in warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("✗ Configuration is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}
