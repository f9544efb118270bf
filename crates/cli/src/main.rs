//! # msgbus CLI
//!
//! 命令行接口入口点。
//!
//! 提供：
//! - 配置加载与验证
//! - 分发器压测负载
//! - 优雅关闭处理

mod cli;
mod commands;
mod config;
mod error;
mod workload;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use cli::{Cli, Commands};
use commands::{run_info, run_validate, run_workload};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Load configuration first so its [logging] section drives tracing
    let bus = config::load_or_default(cli.logging_config_path())?;

    // Initialize logging: config file settings, CLI flags on top
    observability::init_with_config(cli.observability_config(&bus.logging))?;

    info!(version = env!("CARGO_PKG_VERSION"), "msgbus CLI starting");

    // Execute command
    let result = match &cli.command {
        Commands::Run(args) => run_workload(args, bus).await,
        Commands::Validate(args) => run_validate(args),
        Commands::Info(args) => run_info(args),
    };

    if let Err(ref e) = result {
        tracing::error!(error = %e, "Command failed");
    }

    result
}
