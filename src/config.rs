//! Configuration management for the keylease binary
//!
//! Sources, lowest priority first: built-in defaults, `conf/application.yml`
//! (or the file given with `--config`), `ETCD_CONFIG_*` environment variables,
//! then command-line flags.

use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use config::{Config, ConfigError, File};
use keylease_lock::LockConfig;

use crate::demo::DemoSettings;
use crate::startup::{LogRotation, LoggingConfig};

/// Section holding the lock configuration
pub const LOCK_CONFIG_PREFIX: &str = "etcd.config";

pub const DEFAULT_CONFIG_FILE: &str = "conf/application.yml";

/// Command line arguments
#[derive(Debug, Parser)]
#[command(name = "keylease", about = "Workers racing for one key under a lease-bound lock")]
pub struct Cli {
    /// Comma separated etcd endpoints; enables the lock when given
    #[arg(long, env = "ETCD_CONFIG_ENDPOINTS")]
    pub endpoints: Option<String>,

    /// Configuration file, replaces conf/application.yml
    #[arg(short = 'c', long = "config")]
    pub config_file: Option<String>,

    #[arg(long, env = "ETCD_CONFIG_ENABLED")]
    pub enabled: Option<bool>,

    #[arg(long = "default-ttl-secs", env = "ETCD_CONFIG_DEFAULT_TTL_SECS")]
    pub default_ttl_secs: Option<u64>,

    #[arg(long = "acquire-timeout-ms", env = "ETCD_CONFIG_ACQUIRE_TIMEOUT_MS")]
    pub acquire_timeout_ms: Option<u64>,

    #[arg(long = "connect-timeout-ms", env = "ETCD_CONFIG_CONNECT_TIMEOUT_MS")]
    pub connect_timeout_ms: Option<u64>,

    /// Key the workers compete for
    #[arg(short = 'k', long, default_value = "keylease-demo")]
    pub key: String,

    #[arg(short = 'w', long, default_value_t = 4)]
    pub workers: usize,

    /// How long a winner holds the lock before releasing it
    #[arg(long = "hold-ms", default_value_t = 500)]
    pub hold_ms: u64,

    /// Use the in-process coordinator instead of etcd
    #[arg(long)]
    pub memory: bool,
}

/// Application configuration loaded from config files, environment and flags
#[derive(Clone, Debug, Default)]
pub struct Configuration {
    pub config: Config,
}

impl Configuration {
    pub fn load(cli: &Cli) -> anyhow::Result<Self> {
        let file = match &cli.config_file {
            Some(path) => File::with_name(path).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };
        let mut builder = Config::builder().add_source(file);

        if let Some(v) = &cli.endpoints {
            builder = builder
                .set_override(format!("{LOCK_CONFIG_PREFIX}.endpoints"), v.as_str())?
                .set_override(format!("{LOCK_CONFIG_PREFIX}.enabled"), true)?;
        }
        if let Some(v) = cli.enabled {
            builder = builder.set_override(format!("{LOCK_CONFIG_PREFIX}.enabled"), v)?;
        }
        if let Some(v) = cli.default_ttl_secs {
            builder = builder.set_override(format!("{LOCK_CONFIG_PREFIX}.default-ttl-secs"), v)?;
        }
        if let Some(v) = cli.acquire_timeout_ms {
            builder =
                builder.set_override(format!("{LOCK_CONFIG_PREFIX}.acquire-timeout-ms"), v)?;
        }
        if let Some(v) = cli.connect_timeout_ms {
            builder =
                builder.set_override(format!("{LOCK_CONFIG_PREFIX}.connect-timeout-ms"), v)?;
        }

        let config = builder
            .build()
            .context("Failed to build configuration, check the configuration file")?;

        Ok(Configuration { config })
    }

    /// The `etcd.config` section, or defaults (lock disabled) when absent.
    pub fn lock_config(&self) -> anyhow::Result<LockConfig> {
        match self.config.get::<LockConfig>(LOCK_CONFIG_PREFIX) {
            Ok(config) => Ok(config),
            Err(ConfigError::NotFound(_)) => Ok(LockConfig::default()),
            Err(e) => Err(e).context("Invalid etcd.config section"),
        }
    }

    pub fn logging_config(&self) -> anyhow::Result<LoggingConfig> {
        let env = LoggingConfig::from_env();
        let level = self
            .config
            .get_string("keylease.logs.level")
            .unwrap_or_else(|_| env.console_level.to_string());
        let rotation = match self.config.get_string("keylease.logs.rotation") {
            Ok(raw) => raw
                .parse::<LogRotation>()
                .map_err(|e| anyhow::anyhow!("Invalid keylease.logs.rotation: {}", e))?,
            Err(_) => env.rotation,
        };
        Ok(LoggingConfig::from_config(
            Some(
                self.config
                    .get_string("keylease.logs.path")
                    .unwrap_or_else(|_| env.log_dir.display().to_string()),
            ),
            self.config
                .get_bool("keylease.logs.console")
                .unwrap_or(env.console_output),
            self.config
                .get_bool("keylease.logs.file")
                .unwrap_or(env.file_logging),
            &level,
        )
        .with_rotation(rotation))
    }
}

impl Cli {
    pub fn demo_settings(&self) -> DemoSettings {
        DemoSettings {
            key: self.key.clone(),
            workers: self.workers.max(1),
            hold: Duration::from_millis(self.hold_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(args: &[&str]) -> Cli {
        let mut argv = vec!["keylease"];
        argv.extend_from_slice(args);
        Cli::parse_from(argv)
    }

    #[test]
    fn test_cli_defaults() {
        let cli = cli(&[]);
        assert_eq!(cli.key, "keylease-demo");
        assert_eq!(cli.workers, 4);
        assert_eq!(cli.hold_ms, 500);
        assert!(!cli.memory);
    }

    #[test]
    fn test_demo_settings_need_one_worker() {
        let settings = cli(&["--workers", "0", "--hold-ms", "20"]).demo_settings();
        assert_eq!(settings.workers, 1);
        assert_eq!(settings.hold, Duration::from_millis(20));
    }

    #[test]
    fn test_explicit_config_file_is_required() {
        let result = Configuration::load(&cli(&["--config", "conf/does-not-exist.yml"]));
        assert!(result.is_err());
    }

    #[test]
    fn test_endpoints_flag_enables_lock() {
        let configuration = Configuration::load(&cli(&[
            "--endpoints",
            "http://a:2379, http://b:2379",
            "--acquire-timeout-ms",
            "250",
        ]))
        .unwrap();
        let lock = configuration.lock_config().unwrap();
        assert!(lock.enabled);
        assert_eq!(lock.endpoints, vec!["http://a:2379", "http://b:2379"]);
        assert_eq!(lock.acquire_timeout_ms, 250);
    }
}
