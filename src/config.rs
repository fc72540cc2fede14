//! Host configuration for kvstate.
//!
//! Loaded from a TOML file such as:
//!
//! ```toml
//! [storage]
//! backend = "filesystem"        # memory | filesystem | redb
//! path = "/var/lib/kvstate"     # defaults under ~/.kvstate
//! etag_scheme = "uuid"          # uuid | counter
//!
//! [sweep]
//! interval_secs = 60
//!
//! [logging]
//! level = "info"
//! format = "text"               # text | json
//!
//! [[partitions]]
//! database = "app"
//! container = "sessions"
//! ```
//!
//! Every section is optional and falls back to the defaults shown.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::etag::EtagScheme;
use crate::logging::LogFormat;
use crate::maintenance::SweeperConfig;
use crate::medium::Partition;
use crate::paths;

/// Default interval between background sweeps.
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;

/// Sweep intervals above this are accepted with a warning.
const MAX_RECOMMENDED_SWEEP_INTERVAL_SECS: u64 = 24 * 60 * 60;

const VALID_LEVELS: [&str; 6] = ["trace", "debug", "info", "warn", "error", "off"];

/// Result of configuration validation.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// Non-fatal warnings that should be logged but don't prevent operation.
    pub warnings: Vec<String>,
}

impl ValidationResult {
    /// Returns true if there are any warnings.
    #[must_use]
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// Root of `kvstate.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub storage: StorageConfig,
    pub sweep: SweepConfig,
    pub logging: LoggingConfig,
    pub partitions: Vec<PartitionConfig>,
}

/// Which medium backs the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Memory,
    #[default]
    Filesystem,
    Redb,
}

impl BackendKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Filesystem => "filesystem",
            Self::Redb => "redb",
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    pub backend: BackendKind,
    /// Filesystem root directory or redb database file.
    pub path: Option<PathBuf>,
    pub etag_scheme: EtagScheme,
}

impl StorageConfig {
    /// Path the medium will use, falling back to the default data directory.
    ///
    /// Returns `None` for the memory backend.
    ///
    /// # Errors
    ///
    /// Returns an error if no path is configured and the home directory
    /// cannot be determined.
    pub fn resolved_path(&self) -> Result<Option<PathBuf>> {
        match (self.backend, &self.path) {
            (BackendKind::Memory, _) => Ok(None),
            (_, Some(path)) => Ok(Some(path.clone())),
            (BackendKind::Filesystem, None) => paths::get_records_dir().map(Some),
            (BackendKind::Redb, None) => paths::get_database_path().map(Some),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SweepConfig {
    pub interval_secs: u64,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
        }
    }
}

impl SweepConfig {
    pub fn sweeper(&self) -> SweeperConfig {
        SweeperConfig {
            interval: Duration::from_secs(self.interval_secs),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

/// A partition the host sweeps.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PartitionConfig {
    pub database: String,
    pub container: String,
}

impl PartitionConfig {
    pub fn partition(&self) -> Partition {
        Partition::new(&self.database, &self.container)
    }
}

impl Config {
    /// Load configuration from the default path, or defaults if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the default file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        let path = paths::get_config_path()?;
        if path.exists() {
            Self::load_from(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from the specified path.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file cannot be read (IO error)
    /// - The file contains invalid TOML syntax
    /// - Fields have invalid types or unknown names
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is malformed or does not match the schema.
    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn partitions(&self) -> Vec<Partition> {
        self.partitions.iter().map(PartitionConfig::partition).collect()
    }

    /// Validate configuration with comprehensive checks.
    ///
    /// Returns a `ValidationResult` containing any non-fatal warnings.
    ///
    /// # Errors
    ///
    /// Returns an error listing every problem found:
    /// - Sweep interval of zero
    /// - Unknown log level
    /// - Partitions with an empty database or container
    /// - A storage path of the wrong kind (file vs. directory)
    pub fn validate(&self) -> Result<ValidationResult> {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        // 1. Storage
        match (self.storage.backend, &self.storage.path) {
            (BackendKind::Memory, Some(path)) => {
                warnings.push(format!(
                    "storage.path '{}' is ignored by the memory backend",
                    path.display()
                ));
            },
            (BackendKind::Filesystem, Some(path)) if path.is_file() => {
                errors.push(format!(
                    "storage.path is a file: {}\n  \
                     The filesystem backend expects a directory",
                    path.display()
                ));
            },
            (BackendKind::Redb, Some(path)) if path.is_dir() => {
                errors.push(format!(
                    "storage.path is a directory: {}\n  \
                     The redb backend expects a database file path",
                    path.display()
                ));
            },
            _ => {},
        }

        // 2. Sweep
        if self.sweep.interval_secs == 0 {
            errors.push(format!(
                "sweep.interval_secs cannot be 0 (default: {DEFAULT_SWEEP_INTERVAL_SECS})"
            ));
        } else if self.sweep.interval_secs > MAX_RECOMMENDED_SWEEP_INTERVAL_SECS {
            warnings.push(format!(
                "sweep.interval_secs {} is longer than a day\n  \
                 Expired records will only be reclaimed lazily in between",
                self.sweep.interval_secs
            ));
        }

        // 3. Logging
        let level = self.logging.level.to_lowercase();
        if !VALID_LEVELS.contains(&level.as_str()) {
            errors.push(format!(
                "Invalid logging.level '{}'. Valid levels: {}",
                self.logging.level,
                VALID_LEVELS.join(", ")
            ));
        }

        // 4. Partitions
        if self.partitions.is_empty() {
            warnings.push("No [[partitions]] configured; sweeps will do nothing".to_string());
        }

        let mut seen = HashSet::new();
        for partition in &self.partitions {
            if partition.database.is_empty() || partition.container.is_empty() {
                errors.push(format!(
                    "partition database and container cannot be empty (got: '{}/{}')",
                    partition.database, partition.container
                ));
            } else if !seen.insert(partition) {
                warnings.push(format!(
                    "partition '{}/{}' is listed more than once",
                    partition.database, partition.container
                ));
            }
        }

        if !errors.is_empty() {
            anyhow::bail!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            );
        }

        Ok(ValidationResult { warnings })
    }
}
