//! Configuration types for outbox-relay
//!
//! Configuration is loaded once at startup by the host (file parsing is the
//! host's concern; these serde types are the contract) and validated fail-fast
//! with [`Config::validate`], which reports every problem at once instead of
//! stopping at the first.

use crate::encoder::FormatSpec;
use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Remote endpoint configuration (FTP host, credentials, base directory)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Server hostname
    pub host: String,

    /// Server port (default: 21)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Username for authentication
    pub username: String,

    /// Password for authentication
    pub password: String,

    /// Remote directory uploads are written into (default: "/")
    #[serde(default = "default_remote_dir")]
    pub remote_dir: String,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: default_port(),
            username: String::new(),
            password: String::new(),
            remote_dir: default_remote_dir(),
        }
    }
}

/// Delivery loop behavior (directories, polling, retries, archiving)
///
/// Groups settings related to how pending records are staged, uploaded, and
/// reconciled. Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeliveryConfig {
    /// Staging directory message files are written into (default: "./staging")
    #[serde(default = "default_staging_dir")]
    pub staging_dir: PathBuf,

    /// Root directory for date-bucketed archives (default: "./archive")
    #[serde(default = "default_archive_root")]
    pub archive_root: PathBuf,

    /// Interval between delivery cycles (default: 60 seconds)
    #[serde(default = "default_poll_interval", with = "duration_serde")]
    pub poll_interval: Duration,

    /// Maximum retry attempts per file after the first failure (default: 3)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay before the first retry; doubles per retry up to the 30 s cap
    /// (default: 1000 ms)
    #[serde(default = "default_initial_retry_delay", with = "duration_ms_serde")]
    pub initial_retry_delay: Duration,

    /// Days archived files are retained before cleanup deletes them
    /// (default: 30)
    #[serde(default = "default_retention_days")]
    pub archive_retention_days: u32,

    /// Archive delivered files out of staging (default: true); when false,
    /// delivered files are deleted from staging instead
    #[serde(default = "default_true")]
    pub auto_archive: bool,

    /// Verify each upload by checking the destination exists and comparing
    /// sizes (default: true)
    #[serde(default = "default_true")]
    pub verify_uploads: bool,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            staging_dir: default_staging_dir(),
            archive_root: default_archive_root(),
            poll_interval: default_poll_interval(),
            max_retries: default_max_retries(),
            initial_retry_delay: default_initial_retry_delay(),
            archive_retention_days: default_retention_days(),
            auto_archive: true,
            verify_uploads: true,
        }
    }
}

/// File naming policy for staged message files
///
/// Filenames are built as `{prefix}{timestamp}{suffix}` where the timestamp
/// is rendered with a chrono `strftime` pattern. An invalid pattern never
/// fails file creation: the filestore falls back to a fixed default pattern
/// and logs the degradation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FileNamingPolicy {
    /// Filename prefix (default: "msg_")
    #[serde(default = "default_file_prefix")]
    pub prefix: String,

    /// Filename suffix including the extension (default: ".txt")
    #[serde(default = "default_file_suffix")]
    pub suffix: String,

    /// chrono strftime pattern for the timestamp part
    /// (default: "%Y%m%d%H%M%S")
    #[serde(default = "default_timestamp_pattern")]
    pub timestamp_pattern: String,
}

impl Default for FileNamingPolicy {
    fn default() -> Self {
        Self {
            prefix: default_file_prefix(),
            suffix: default_file_suffix(),
            timestamp_pattern: default_timestamp_pattern(),
        }
    }
}

/// Main configuration for the delivery pipeline
///
/// Fields are organized into logical sub-configs:
/// - [`endpoint`](EndpointConfig) — remote host, credentials, base directory
/// - [`delivery`](DeliveryConfig) — directories, polling, retries, archiving
/// - [`naming`](FileNamingPolicy) — staged filename construction
/// - [`format`](FormatSpec) — message field layout
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Remote endpoint settings
    pub endpoint: EndpointConfig,

    /// Delivery loop settings
    #[serde(default)]
    pub delivery: DeliveryConfig,

    /// Staged file naming policy
    #[serde(default)]
    pub naming: FileNamingPolicy,

    /// Message layout
    pub format: FormatSpec,
}

impl Config {
    /// Validate the configuration, reporting every issue at once
    ///
    /// No network or file operation should be attempted until this passes.
    ///
    /// # Errors
    ///
    /// Returns the full list of problems found, one human-readable message
    /// per issue.
    pub fn validate(&self) -> std::result::Result<(), Vec<String>> {
        let mut issues = Vec::new();

        if self.endpoint.host.trim().is_empty() {
            issues.push("endpoint.host must not be empty".to_string());
        }
        if self.endpoint.port == 0 {
            issues.push("endpoint.port must not be 0".to_string());
        }
        if self.endpoint.username.trim().is_empty() {
            issues.push("endpoint.username must not be empty".to_string());
        }
        if self.endpoint.remote_dir.trim().is_empty() {
            issues.push("endpoint.remote_dir must not be empty".to_string());
        }
        if self.delivery.poll_interval.is_zero() {
            issues.push("delivery.poll_interval must be greater than zero".to_string());
        }
        if self.delivery.initial_retry_delay.is_zero() {
            issues.push("delivery.initial_retry_delay must be at least 1 ms".to_string());
        }
        if self.delivery.auto_archive && self.delivery.archive_retention_days == 0 {
            issues.push(
                "delivery.archive_retention_days must be at least 1 when auto_archive is enabled"
                    .to_string(),
            );
        }
        if self.format.fields.is_empty() {
            issues.push("format.fields must contain at least one field".to_string());
        }
        if self.format.decimal_separator.is_empty() {
            issues.push("format.decimal_separator must not be empty".to_string());
        }

        if issues.is_empty() { Ok(()) } else { Err(issues) }
    }

    /// Validate and convert failures into a single [`Error::Config`]
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` carrying all issues joined with "; ".
    pub fn ensure_valid(&self) -> crate::Result<()> {
        self.validate().map_err(|issues| Error::Config {
            message: issues.join("; "),
            key: None,
        })
    }
}

fn default_port() -> u16 {
    21
}

fn default_remote_dir() -> String {
    "/".to_string()
}

fn default_staging_dir() -> PathBuf {
    PathBuf::from("staging")
}

fn default_archive_root() -> PathBuf {
    PathBuf::from("archive")
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(60)
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_retry_delay() -> Duration {
    Duration::from_millis(1000)
}

fn default_retention_days() -> u32 {
    30
}

fn default_file_prefix() -> String {
    "msg_".to_string()
}

fn default_file_suffix() -> String {
    ".txt".to_string()
}

fn default_timestamp_pattern() -> String {
    "%Y%m%d%H%M%S".to_string()
}

fn default_true() -> bool {
    true
}

// Duration serialization helper (seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Duration serialization helper (milliseconds, for sub-second retry delays)
mod duration_ms_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
