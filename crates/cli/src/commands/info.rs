//! `info` command implementation.

use anyhow::{Context, Result};
use config_loader::ConfigLoader;
use contracts::BusConfig;
use tracing::info;

use crate::cli::InfoArgs;
use crate::config;

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!("Loading configuration info");

    let bus = config::load_or_default(args.config.as_deref())?;

    if args.json {
        let json = ConfigLoader::to_json(&bus).context("Failed to serialize config info")?;
        println!("{}", json);
    } else if args.toml {
        let toml = ConfigLoader::to_toml(&bus).context("Failed to serialize config info")?;
        print!("{}", toml);
    } else {
        print_config_info(&bus, args);
    }

    Ok(())
}

fn print_config_info(bus: &BusConfig, args: &InfoArgs) {
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║                  msgbus Configuration                        ║");
    println!("╚══════════════════════════════════════════════════════════════╝\n");

    let source = args
        .config
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "(defaults)".to_string());
    println!("📄 Source: {}", source);

    let dispatcher = &bus.dispatcher;
    println!("\n⚙️  Dispatcher");
    println!("   ├─ Version: {:?}", bus.version);
    println!("   ├─ Worker name: {}", dispatcher.worker_name);
    println!("   ├─ Poll interval: {} ms", dispatcher.poll_interval_ms);
    println!("   ├─ Failure policy: {:?}", dispatcher.failure_policy);
    println!("   └─ Drain on stop: {}", dispatcher.drain_on_stop);

    let logging = &bus.logging;
    println!("\n📝 Logging");
    println!("   ├─ Format: {:?}", logging.format);
    println!("   ├─ Level: {}", logging.level);
    match logging.metrics_port {
        Some(port) => println!("   └─ Metrics port: {}", port),
        None => println!("   └─ Metrics port: (disabled)"),
    }

    println!();
}
