//! Console and file logging.
//!
//! Console output is always filtered by `RUST_LOG` (falling back to the
//! configured level). File logging is optional and writes rotated files, daily
//! unless `keylease.logs.rotation` or `KEYLEASE_LOG_ROTATION` says otherwise:
//!
//! | Log File     | Component                          | Target Prefixes   |
//! |--------------|------------------------------------|-------------------|
//! | keylease.log | Root logger (all components)       | (all)             |
//! | lock.log     | Acquire, release and renewal       | keylease_lock     |
//! | client.log   | etcd and in-memory coordinators    | keylease_client   |
//!
//! Log files are stored in `~/keylease/logs` by default.
//! Override with `KEYLEASE_LOG_DIR` or `keylease.logs.path` config.

use std::path::PathBuf;

use anyhow::Context;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::{LevelFilter, Targets};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

const ROOT_LOG_FILE: &str = "keylease.log";

struct ComponentLogDef {
    file_name: &'static str,
    targets: &'static [&'static str],
}

const COMPONENT_LOGS: &[ComponentLogDef] = &[
    ComponentLogDef {
        file_name: "lock.log",
        targets: &["keylease_lock"],
    },
    ComponentLogDef {
        file_name: "client.log",
        targets: &["keylease_client"],
    },
];

/// Log rotation policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogRotation {
    Daily,
    Hourly,
    Never,
}

impl std::str::FromStr for LogRotation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "daily" => Ok(LogRotation::Daily),
            "hourly" => Ok(LogRotation::Hourly),
            "never" => Ok(LogRotation::Never),
            other => Err(format!("unknown log rotation '{}'", other)),
        }
    }
}

impl From<LogRotation> for Rotation {
    fn from(rotation: LogRotation) -> Self {
        match rotation {
            LogRotation::Daily => Rotation::DAILY,
            LogRotation::Hourly => Rotation::HOURLY,
            LogRotation::Never => Rotation::NEVER,
        }
    }
}

/// Logging configuration for the binary.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Base log directory (default: `~/keylease/logs`)
    pub log_dir: PathBuf,
    pub console_output: bool,
    pub console_level: Level,
    /// File logging is off unless asked for
    pub file_logging: bool,
    pub file_level: Level,
    pub rotation: LogRotation,
}

fn default_log_dir() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(format!("{}/keylease/logs", home))
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_dir: default_log_dir(),
            console_output: true,
            console_level: Level::INFO,
            file_logging: false,
            file_level: Level::INFO,
            rotation: LogRotation::Daily,
        }
    }
}

impl LoggingConfig {
    /// Create from `KEYLEASE_LOG_*` environment variables.
    pub fn from_env() -> Self {
        let log_dir = std::env::var("KEYLEASE_LOG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_log_dir());

        let console_output = std::env::var("KEYLEASE_LOG_CONSOLE")
            .map(|v| v.to_lowercase() != "false" && v != "0")
            .unwrap_or(true);

        let file_logging = std::env::var("KEYLEASE_LOG_FILE")
            .map(|v| v.to_lowercase() == "true" || v == "1")
            .unwrap_or(false);

        let console_level = std::env::var("KEYLEASE_LOG_LEVEL")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(Level::INFO);

        let file_level = std::env::var("KEYLEASE_LOG_FILE_LEVEL")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(console_level);

        let rotation = std::env::var("KEYLEASE_LOG_ROTATION")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(LogRotation::Daily);

        Self {
            log_dir,
            console_output,
            console_level,
            file_logging,
            file_level,
            rotation,
        }
    }

    /// Create from application configuration.
    pub fn from_config(
        log_dir: Option<String>,
        console_output: bool,
        file_logging: bool,
        level: &str,
    ) -> Self {
        let level = level.parse().unwrap_or(Level::INFO);

        Self {
            log_dir: log_dir.map(PathBuf::from).unwrap_or_else(default_log_dir),
            console_output,
            console_level: level,
            file_logging,
            file_level: level,
            rotation: LogRotation::Daily,
        }
    }

    pub fn with_rotation(mut self, rotation: LogRotation) -> Self {
        self.rotation = rotation;
        self
    }
}

/// Keeps the non-blocking file writers alive. Dropping it flushes buffered
/// output, so hold it until the process exits.
pub struct LoggingGuard {
    _file_guards: Vec<WorkerGuard>,
}

/// Install the global subscriber.
pub fn init_logging(config: &LoggingConfig) -> anyhow::Result<LoggingGuard> {
    if config.file_logging {
        std::fs::create_dir_all(&config.log_dir).with_context(|| {
            format!("Failed to create log directory {}", config.log_dir.display())
        })?;
    }

    let mut guards: Vec<WorkerGuard> = Vec::new();
    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();

    if config.console_output {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(config.console_level.to_string()));
        let console_layer = fmt::layer()
            .with_target(true)
            .with_thread_names(true)
            .with_filter(filter);
        layers.push(Box::new(console_layer));
    }

    if config.file_logging {
        let root_appender =
            RollingFileAppender::new(config.rotation.into(), &config.log_dir, ROOT_LOG_FILE);
        let (root_nb, root_guard) = tracing_appender::non_blocking(root_appender);
        guards.push(root_guard);

        let root_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(config.file_level.to_string()));
        let root_layer = fmt::layer()
            .with_writer(root_nb)
            .with_target(true)
            .with_thread_names(true)
            .with_file(true)
            .with_line_number(true)
            .with_ansi(false)
            .with_filter(root_filter);
        layers.push(Box::new(root_layer));

        for component in COMPONENT_LOGS {
            let appender = RollingFileAppender::new(
                config.rotation.into(),
                &config.log_dir,
                component.file_name,
            );
            let (nb, guard) = tracing_appender::non_blocking(appender);
            guards.push(guard);

            let level: LevelFilter = config.file_level.into();
            let mut targets = Targets::new();
            for target in component.targets {
                targets = targets.with_target(*target, level);
            }

            let layer = fmt::layer()
                .with_writer(nb)
                .with_target(true)
                .with_thread_names(true)
                .with_ansi(false)
                .with_filter(targets);
            layers.push(Box::new(layer));
        }
    }

    Registry::default()
        .with(layers)
        .try_init()
        .context("Failed to initialize logging")?;

    if config.file_logging {
        tracing::info!(
            log_dir = %config.log_dir.display(),
            "File logging initialized: {} (root) + {} component log files",
            ROOT_LOG_FILE,
            COMPONENT_LOGS.len()
        );
    }

    Ok(LoggingGuard {
        _file_guards: guards,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logging_config_default() {
        let config = LoggingConfig::default();
        assert!(config.console_output);
        assert!(!config.file_logging);
        assert_eq!(config.console_level, Level::INFO);
        assert!(config.log_dir.ends_with("keylease/logs"));
    }

    #[test]
    fn test_logging_config_from_config() {
        let config =
            LoggingConfig::from_config(Some("/tmp/test-logs".to_string()), false, true, "debug");
        assert_eq!(config.log_dir, PathBuf::from("/tmp/test-logs"));
        assert!(!config.console_output);
        assert!(config.file_logging);
        assert_eq!(config.file_level, Level::DEBUG);
    }

    #[test]
    fn test_unknown_level_falls_back_to_info() {
        let config = LoggingConfig::from_config(None, true, false, "loud");
        assert_eq!(config.console_level, Level::INFO);
    }

    #[test]
    fn test_log_rotation_parse() {
        assert_eq!("hourly".parse::<LogRotation>(), Ok(LogRotation::Hourly));
        assert_eq!("Never".parse::<LogRotation>(), Ok(LogRotation::Never));
        assert_eq!("DAILY".parse::<LogRotation>(), Ok(LogRotation::Daily));
        assert!("weekly".parse::<LogRotation>().is_err());

        let config = LoggingConfig::default().with_rotation(LogRotation::Hourly);
        assert_eq!(config.rotation, LogRotation::Hourly);
    }

    #[test]
    fn test_log_rotation_conversion() {
        assert!(matches!(Rotation::from(LogRotation::Daily), Rotation::DAILY));
        assert!(matches!(Rotation::from(LogRotation::Hourly), Rotation::HOURLY));
        assert!(matches!(Rotation::from(LogRotation::Never), Rotation::NEVER));
    }

    #[test]
    fn test_component_logs_cover_both_crates() {
        let targets: Vec<&str> = COMPONENT_LOGS
            .iter()
            .flat_map(|c| c.targets.iter().copied())
            .collect();
        assert!(targets.contains(&"keylease_lock"));
        assert!(targets.contains(&"keylease_client"));
        for component in COMPONENT_LOGS {
            assert!(component.file_name.ends_with(".log"));
        }
    }
}
