//! Partition configuration values.
//!
//! [`PartitionConfig`] is threaded explicitly into builders and generators; nothing in
//! the crate reads process-wide state. Applications can load it from
//! `config/partwright.toml` or environment variables using [`PartitionConfig::load()`].

use crate::date_range::Interval;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

const CONFIG_FILE: &str = "config/partwright.toml";
const ENV_PREFIX: &str = "PARTWRIGHT";

#[derive(Debug, Clone, Deserialize, Default, PartialEq, Eq)]
pub struct PartitionConfig {
    #[serde(default)]
    pub defaults: DefaultsConfig,
    #[serde(default)]
    pub naming: NamingConfig,
}

/// Default behaviour flags, overridable per builder
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct DefaultsConfig {
    #[serde(default = "enabled")]
    pub enable_partition_pruning: bool,
    #[serde(default)]
    pub detach_concurrently: bool,
    #[serde(default = "enabled")]
    pub analyze_after_create: bool,
    #[serde(default = "enabled")]
    pub vacuum_after_drop: bool,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            enable_partition_pruning: true,
            detach_concurrently: false,
            analyze_after_create: true,
            vacuum_after_drop: true,
        }
    }
}

/// Naming conventions for generated partitions
///
/// Date formats are chrono strftime strings; `%q` expands to the quarter digit.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct NamingConfig {
    #[serde(default)]
    pub prefix: String,
    #[serde(default)]
    pub suffix: String,
    #[serde(default = "default_separator")]
    pub separator: String,
    #[serde(default = "default_day_format")]
    pub day_format: String,
    #[serde(default = "default_week_format")]
    pub week_format: String,
    #[serde(default = "default_month_format")]
    pub month_format: String,
    #[serde(default = "default_quarter_format")]
    pub quarter_format: String,
    #[serde(default = "default_year_format")]
    pub year_format: String,
}

impl Default for NamingConfig {
    fn default() -> Self {
        Self {
            prefix: String::new(),
            suffix: String::new(),
            separator: default_separator(),
            day_format: default_day_format(),
            week_format: default_week_format(),
            month_format: default_month_format(),
            quarter_format: default_quarter_format(),
            year_format: default_year_format(),
        }
    }
}

impl NamingConfig {
    /// The date format used for partitions of the given interval
    pub fn format_for(&self, interval: Interval) -> &str {
        match interval {
            Interval::Daily => &self.day_format,
            Interval::Weekly => &self.week_format,
            Interval::Monthly => &self.month_format,
            Interval::Quarterly => &self.quarter_format,
            Interval::Yearly => &self.year_format,
        }
    }
}

fn enabled() -> bool {
    true
}

fn default_separator() -> String {
    "_".to_string()
}

fn default_day_format() -> String {
    "%Y_%m_%d".to_string()
}

fn default_week_format() -> String {
    "%G_W%V".to_string()
}

fn default_month_format() -> String {
    "%Y_%m".to_string()
}

fn default_quarter_format() -> String {
    "%Y_Q%q".to_string()
}

fn default_year_format() -> String {
    "%Y".to_string()
}

impl PartitionConfig {
    /// Load the partition configuration from `config/partwright.toml`, falling back to env vars.
    ///
    /// Environment variables use the `PARTWRIGHT` prefix and `__` as the section
    /// separator, e.g. `PARTWRIGHT__PARTITION__NAMING__SEPARATOR=-`.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(CONFIG_FILE)
    }

    /// Like [`load()`](Self::load) with an explicit file path (extension optional)
    pub fn load_from(path: &str) -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

        let settings = match builder.build() {
            Ok(cfg) => cfg,
            Err(err) => {
                // A present but unreadable file is reported, then env-only is tried.
                if std::path::Path::new(path).exists() {
                    log::warn!("Failed to load {path}, falling back to env: {err}");
                }
                Config::builder()
                    .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
                    .build()
                    .map_err(|env_err| {
                        ConfigError::Message(format!(
                            "Failed to load configuration from file and env: {}, then env-only error: {}",
                            err, env_err
                        ))
                    })?
            }
        };

        Self::from_settings(&settings)
    }

    /// Deserialize the `partition` section of already-built settings
    ///
    /// A missing section yields the defaults.
    pub fn from_settings(settings: &Config) -> Result<Self, ConfigError> {
        match settings.get::<PartitionConfig>("partition") {
            Ok(cfg) => Ok(cfg),
            Err(ConfigError::NotFound(_)) => Ok(Self::default()),
            Err(e) => Err(ConfigError::Message(format!(
                "Partition configuration could not be loaded from file or environment: {}",
                e
            ))),
        }
    }
}
