//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use contracts::LoggingConfig;
use observability::ObservabilityConfig;
use std::path::{Path, PathBuf};

/// msgbus - keyed publish/subscribe message dispatcher
#[derive(Parser, Debug)]
#[command(
    name = "msgbus",
    author,
    version,
    about = "Keyed in-process message dispatcher",
    long_about = "Drives the keyed message dispatcher from the command line.\n\n\
                  Runs a producer/handler workload against the asynchronous \n\
                  dispatcher, and validates or inspects bus configuration files."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "MSGBUS_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format (overrides `logging.format` from the config file)
    #[arg(long, value_enum, global = true, env = "MSGBUS_LOG_FORMAT")]
    pub log_format: Option<LogFormat>,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Log filter forced by `-v` / `-q`, if any
    pub fn log_level(&self) -> Option<&'static str> {
        if self.quiet {
            return Some("warn");
        }
        match self.verbose {
            0 => None,
            1 => Some("debug"),
            _ => Some("trace"),
        }
    }

    /// Logging settings from the config file with CLI flags applied on top
    ///
    /// The metrics exporter is left to `run`, which may override the port.
    pub fn observability_config(&self, logging: &LoggingConfig) -> ObservabilityConfig {
        let mut config = ObservabilityConfig::from(logging);
        config.metrics_port = None;
        if let Some(format) = self.log_format {
            config.log_format = format.into();
        }
        if let Some(level) = self.log_level() {
            config.default_log_level = level.to_string();
        }
        config
    }

    /// Config file whose `[logging]` section applies to this invocation
    pub fn logging_config_path(&self) -> Option<&Path> {
        match &self.command {
            Commands::Run(args) => args.config.as_deref(),
            Commands::Validate(_) | Commands::Info(_) => None,
        }
    }
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a producer/handler workload against the async dispatcher
    Run(RunArgs),

    /// Validate configuration file without running
    Validate(ValidateArgs),

    /// Display the effective configuration
    Info(InfoArgs),
}

/// Arguments for the `run` command
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Path to configuration file (TOML or JSON); defaults apply when omitted
    #[arg(short, long, env = "MSGBUS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Number of distinct keys, one counting handler each
    #[arg(long, default_value = "4", env = "MSGBUS_KEYS")]
    pub keys: usize,

    /// Number of producer threads
    #[arg(long, default_value = "4", env = "MSGBUS_PRODUCERS")]
    pub producers: usize,

    /// Messages pushed by each producer
    #[arg(long, default_value = "10000", env = "MSGBUS_MESSAGES")]
    pub messages: u64,

    /// Make handlers reject every Nth message (0 = never)
    #[arg(long, default_value = "0")]
    pub fail_every: u64,

    /// Workload timeout in seconds (0 = no timeout)
    #[arg(long, default_value = "30", env = "MSGBUS_TIMEOUT")]
    pub timeout: u64,

    /// Override the worker poll interval from configuration (milliseconds)
    #[arg(long)]
    pub poll_interval_ms: Option<u64>,

    /// Deliver everything still queued when the workload stops
    #[arg(long)]
    pub drain_on_stop: bool,

    /// Metrics server port (overrides configuration)
    #[arg(long, env = "MSGBUS_METRICS_PORT")]
    pub metrics_port: Option<u16>,

    /// Print the run summary as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "msgbus.toml")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Path to configuration file; defaults are shown when omitted
    #[arg(short, long, env = "MSGBUS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Output as TOML
    #[arg(long, conflicts_with = "json")]
    pub toml: bool,
}

/// Log output format
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
}

impl From<LogFormat> for contracts::LogFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Json => contracts::LogFormat::Json,
            LogFormat::Pretty => contracts::LogFormat::Pretty,
            LogFormat::Compact => contracts::LogFormat::Compact,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_defaults() {
        let cli = Cli::try_parse_from(["msgbus", "run"]).unwrap();
        let Commands::Run(args) = cli.command else {
            panic!("expected run command");
        };
        assert_eq!(args.keys, 4);
        assert_eq!(args.producers, 4);
        assert_eq!(args.fail_every, 0);
        assert!(args.config.is_none() || std::env::var_os("MSGBUS_CONFIG").is_some());
    }

    #[test]
    fn test_log_level_from_flags() {
        let cli = Cli::try_parse_from(["msgbus", "-vv", "info"]).unwrap();
        assert_eq!(cli.log_level(), Some("trace"));

        let cli = Cli::try_parse_from(["msgbus", "--quiet", "info"]).unwrap();
        assert_eq!(cli.log_level(), Some("warn"));
    }

    fn file_logging() -> LoggingConfig {
        LoggingConfig {
            format: contracts::LogFormat::Json,
            level: "debug".to_string(),
            metrics_port: Some(9100),
        }
    }

    #[test]
    fn test_config_file_logging_applies_without_flags() {
        let cli = Cli::try_parse_from(["msgbus", "run"]).unwrap();
        if cli.log_format.is_some() || cli.verbose > 0 {
            // MSGBUS_LOG_FORMAT / MSGBUS_VERBOSE set in the environment
            return;
        }
        let config = cli.observability_config(&file_logging());
        assert_eq!(config.log_format, contracts::LogFormat::Json);
        assert_eq!(config.default_log_level, "debug");
        assert_eq!(config.metrics_port, None);
    }

    #[test]
    fn test_flags_override_config_file_logging() {
        let cli =
            Cli::try_parse_from(["msgbus", "-q", "--log-format", "compact", "run"]).unwrap();
        let config = cli.observability_config(&file_logging());
        assert_eq!(config.log_format, contracts::LogFormat::Compact);
        assert_eq!(config.default_log_level, "warn");
    }

    #[test]
    fn test_only_run_reads_logging_from_config() {
        let cli = Cli::try_parse_from(["msgbus", "run", "--config", "bus.toml"]).unwrap();
        assert_eq!(cli.logging_config_path(), Some(Path::new("bus.toml")));

        let cli = Cli::try_parse_from(["msgbus", "validate", "--config", "bus.toml"]).unwrap();
        assert_eq!(cli.logging_config_path(), None);
    }

    #[test]
    fn test_quiet_conflicts_with_verbose() {
        assert!(Cli::try_parse_from(["msgbus", "-q", "-v", "info"]).is_err());
    }
}
