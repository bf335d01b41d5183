//! Relay configuration loaded from YAML.
//!
//! ```yaml
//! bus:
//!   queue_capacity: 100
//! shutdown:
//!   timeout: 10s
//! log:
//!   level: info
//! ```
//!
//! Every section and field is optional.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Deserializer};
use subpub::{BusConfig, DEFAULT_QUEUE_CAPACITY};

/// Default deadline for closing the bus at shutdown.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Default log filter when `RUST_LOG` is not set.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Errors that can occur while loading the config file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config file {}: {source}", .path.display())]
    Io {
        /// The path that was read.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid YAML or does not match the expected shape.
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// The file parsed but holds unusable values.
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Top-level relay configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    /// Bus settings.
    pub bus: BusSection,
    /// Shutdown settings.
    pub shutdown: ShutdownSection,
    /// Logging settings.
    pub log: LogSection,
}

/// The `bus` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BusSection {
    /// Per-subscription queue capacity.
    pub queue_capacity: usize,
}

impl Default for BusSection {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

/// The `shutdown` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ShutdownSection {
    /// How long to wait for delivery tasks when closing the bus.
    #[serde(deserialize_with = "deserialize_duration")]
    pub timeout: Duration,
}

impl Default for ShutdownSection {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }
}

/// The `log` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogSection {
    /// A `tracing` filter directive, e.g. `info` or `subpub=debug`.
    pub level: String,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

impl AppConfig {
    /// Load and validate a config file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, and the errors
    /// of [`AppConfig::from_yaml`] otherwise.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&contents)
    }

    /// Parse and validate a config document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for an empty document or unusable
    /// values, and [`ConfigError::Parse`] for malformed YAML.
    pub fn from_yaml(contents: &str) -> Result<Self, ConfigError> {
        if contents.trim().is_empty() {
            return Err(ConfigError::Invalid("config file is empty".to_string()));
        }
        let config: Self = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the values that deserialisation cannot.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for a zero queue capacity or an empty
    /// log level.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.bus_config()
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        if self.log.level.trim().is_empty() {
            return Err(ConfigError::Invalid("log.level must not be empty".to_string()));
        }
        Ok(())
    }

    /// Build the bus configuration from the `bus` section.
    #[must_use]
    pub fn bus_config(&self) -> BusConfig {
        BusConfig::new().with_queue_capacity(self.bus.queue_capacity)
    }
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_duration(&raw).map_err(serde::de::Error::custom)
}

/// Parse a duration such as `250ms`, `1.5s`, `1m30s` or `1h0m0s`.
///
/// The value is a sequence of decimal numbers, each with an optional fraction
/// and a unit. Units are `ns`, `us` (or `µs`), `ms`, `s`, `m` and `h`. A bare
/// `0` needs no unit. Fractions finer than a nanosecond are truncated.
///
/// # Errors
///
/// Returns a description of the problem for a missing or unknown unit, a
/// missing number, a negative value, or a value that overflows.
pub fn parse_duration(raw: &str) -> Result<Duration, String> {
    let trimmed = raw.trim();
    let invalid = |reason: &str| format!("cannot parse duration {trimmed:?}: {reason}");

    let mut rest = trimmed.strip_prefix('+').unwrap_or(trimmed);
    if rest.starts_with('-') {
        return Err(invalid("negative durations are not allowed"));
    }
    if rest == "0" {
        return Ok(Duration::ZERO);
    }
    if rest.is_empty() {
        return Err(invalid("empty value"));
    }

    let mut total: u128 = 0;
    while !rest.is_empty() {
        let (whole, after) = split_digits(rest);
        let (fraction, after) = match after.strip_prefix('.') {
            Some(after) => split_digits(after),
            None => ("", after),
        };
        if whole.is_empty() && fraction.is_empty() {
            return Err(invalid("expected a number"));
        }

        let unit_end = after
            .find(|c: char| c == '.' || c.is_ascii_digit())
            .unwrap_or(after.len());
        let (unit, after) = after.split_at(unit_end);
        let nanos_per_unit: u128 = match unit {
            "ns" => 1,
            "us" | "µs" | "μs" => 1_000,
            "ms" => 1_000_000,
            "s" => 1_000_000_000,
            "m" => 60_000_000_000,
            "h" => 3_600_000_000_000,
            "" => return Err(invalid("missing unit (ns, us, ms, s, m, h)")),
            other => return Err(invalid(&format!("unknown unit {other:?}"))),
        };

        total = component_nanos(whole, fraction, nanos_per_unit)
            .and_then(|nanos| total.checked_add(nanos))
            .ok_or_else(|| invalid("value is too large"))?;
        rest = after;
    }

    let nanos = u64::try_from(total).map_err(|_| invalid("value is too large"))?;
    Ok(Duration::from_nanos(nanos))
}

fn split_digits(s: &str) -> (&str, &str) {
    let end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    s.split_at(end)
}

/// Nanoseconds in `<whole>.<fraction>` units of `unit` nanoseconds.
fn component_nanos(whole: &str, fraction: &str, unit: u128) -> Option<u128> {
    let whole: u128 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
    let mut nanos = whole.checked_mul(unit)?;
    let mut scale = unit;
    for digit in fraction.bytes() {
        scale /= 10;
        if scale == 0 {
            break;
        }
        nanos = nanos.checked_add(u128::from(digit - b'0') * scale)?;
    }
    Some(nanos)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn write_temp(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_full_config() {
        let file = write_temp(
            "bus:\n  queue_capacity: 16\nshutdown:\n  timeout: 10s\nlog:\n  level: debug\n",
        );
        let config = AppConfig::load(file.path()).unwrap();
        assert_eq!(config.bus.queue_capacity, 16);
        assert_eq!(config.shutdown.timeout, Duration::from_secs(10));
        assert_eq!(config.log.level, "debug");
        assert_eq!(config.bus_config().queue_capacity, 16);
    }

    #[test]
    fn test_missing_sections_use_defaults() {
        let config = AppConfig::from_yaml("log:\n  level: warn\n").unwrap();
        assert_eq!(config.bus.queue_capacity, DEFAULT_QUEUE_CAPACITY);
        assert_eq!(config.shutdown.timeout, DEFAULT_SHUTDOWN_TIMEOUT);
        assert_eq!(config.log.level, "warn");
    }

    #[test]
    fn test_missing_file() {
        let err = AppConfig::load("definitely/not/here.yaml").unwrap_err();
        match err {
            ConfigError::Io { source, .. } => {
                assert_eq!(source.kind(), std::io::ErrorKind::NotFound);
            }
            other => panic!("expected Io error, got {other:?}"),
        }
    }

    #[test]
    fn test_invalid_yaml() {
        let err = AppConfig::from_yaml("invalid: yaml: content").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_empty_file() {
        let file = write_temp("");
        let err = AppConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_invalid_duration() {
        let err = AppConfig::from_yaml("shutdown:\n  timeout: invalid\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
        assert!(err.to_string().contains("cannot parse duration"));
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let err = AppConfig::from_yaml("bus:\n  queue_capacity: 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = AppConfig::from_yaml("grpc:\n  port: 50051\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_parse_duration_units() {
        assert_eq!(parse_duration("250ms"), Ok(Duration::from_millis(250)));
        assert_eq!(parse_duration("3s"), Ok(Duration::from_secs(3)));
        assert_eq!(parse_duration("2m"), Ok(Duration::from_secs(120)));
        assert_eq!(parse_duration("1h"), Ok(Duration::from_secs(3600)));
        assert!(parse_duration("10").is_err());
        assert!(parse_duration("s").is_err());
        assert!(parse_duration("5d").is_err());
    }

    #[test]
    fn test_parse_duration_compound_and_fractional() {
        assert_eq!(parse_duration("1m30s"), Ok(Duration::from_secs(90)));
        assert_eq!(parse_duration("1h0m0s"), Ok(Duration::from_secs(3600)));
        assert_eq!(parse_duration("1.5s"), Ok(Duration::from_millis(1500)));
        assert_eq!(parse_duration(".5m"), Ok(Duration::from_secs(30)));
        assert_eq!(parse_duration("500us"), Ok(Duration::from_micros(500)));
        assert_eq!(parse_duration("2µs"), Ok(Duration::from_micros(2)));
        assert_eq!(parse_duration("750ns"), Ok(Duration::from_nanos(750)));
        assert_eq!(parse_duration("0"), Ok(Duration::ZERO));
        assert_eq!(parse_duration("+2s"), Ok(Duration::from_secs(2)));
    }

    #[test]
    fn test_parse_duration_rejects_malformed_values() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("-1s").is_err());
        assert!(parse_duration("1m30").is_err());
        assert!(parse_duration(".s").is_err());
        assert!(parse_duration("1.2.3s").is_err());
        assert!(parse_duration("99999999999999999999h").is_err());
    }

    #[test]
    fn test_compound_timeout_in_config() {
        let config = AppConfig::from_yaml("shutdown:\n  timeout: 1m30s\n").unwrap();
        assert_eq!(config.shutdown.timeout, Duration::from_secs(90));
    }
}
