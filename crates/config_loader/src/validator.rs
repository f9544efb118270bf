//! 配置校验模块
//!
//! 校验规则：
//! - 1 <= poll_interval_ms <= 60000
//! - worker_name 非空，且不含 NUL (线程名限制)
//! - logging.level 非空
//! - metrics_port != 0

use contracts::{BusConfig, ContractError};

/// poll 间隔上限 (毫秒)
pub const MAX_POLL_INTERVAL_MS: u64 = 60_000;

/// 校验 BusConfig 配置
///
/// 返回第一个遇到的错误，或 Ok(())。
pub fn validate(config: &BusConfig) -> Result<(), ContractError> {
    validate_poll_interval(config)?;
    validate_worker_name(config)?;
    validate_logging(config)?;
    Ok(())
}

/// 校验 poll 间隔范围
fn validate_poll_interval(config: &BusConfig) -> Result<(), ContractError> {
    let interval = config.dispatcher.poll_interval_ms;
    if interval == 0 || interval > MAX_POLL_INTERVAL_MS {
        return Err(ContractError::config_validation(
            "dispatcher.poll_interval_ms",
            format!("poll_interval_ms must be in 1..={MAX_POLL_INTERVAL_MS}, got {interval}"),
        ));
    }
    Ok(())
}

/// 校验 worker 线程名
fn validate_worker_name(config: &BusConfig) -> Result<(), ContractError> {
    let name = &config.dispatcher.worker_name;
    if name.trim().is_empty() {
        return Err(ContractError::config_validation(
            "dispatcher.worker_name",
            "worker_name cannot be empty",
        ));
    }
    if name.contains('\0') {
        return Err(ContractError::config_validation(
            "dispatcher.worker_name",
            "worker_name cannot contain NUL bytes",
        ));
    }
    Ok(())
}

/// 校验日志配置
fn validate_logging(config: &BusConfig) -> Result<(), ContractError> {
    if config.logging.level.trim().is_empty() {
        return Err(ContractError::config_validation(
            "logging.level",
            "level cannot be empty",
        ));
    }
    if config.logging.metrics_port == Some(0) {
        return Err(ContractError::config_validation(
            "logging.metrics_port",
            "metrics_port must be > 0 (omit it to disable the exporter)",
        ));
    }
    Ok(())
}
