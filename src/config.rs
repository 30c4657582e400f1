use crate::container::ContainerKind;
use crate::ingest::DispatchConfig;
use crate::sink::SinkFormat;
use serde::Serialize;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Writer daemon configuration loaded from environment variables
#[derive(Debug, Clone, Serialize)]
pub struct WriterConfig {
    /// UDP address to receive event packets on
    pub bind_addr: String,
    /// Directory receiving one output file per digitizer
    pub output_dir: PathBuf,
    /// Channels per digitizer; events on higher channels are dropped
    pub channels: usize,
    /// Events held per window before a capacity flush
    pub capacity: usize,
    /// Window container implementation
    pub container: ContainerKind,
    /// Output file format
    pub format: SinkFormat,
    /// Batches queued per stage before the stage upstream blocks
    pub queue_depth: usize,
    /// Cancellation re-check interval in milliseconds
    pub poll_interval_ms: u64,
    /// Largest datagram accepted by the UDP listener
    pub datagram_size: usize,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:12345".to_string(),
            output_dir: PathBuf::from("./data"),
            channels: 64,
            capacity: 1_000_000,
            container: ContainerKind::Vector,
            format: SinkFormat::Jsonl,
            queue_depth: 1024,
            poll_interval_ms: 100,
            datagram_size: 65_507,
        }
    }
}

impl WriterConfig {
    /// Load configuration from the process environment and a `.env` file
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_with(|_| {})
    }

    /// Like [`WriterConfig::from_env`], applying `overrides` before validation
    pub fn from_env_with<O>(overrides: O) -> Result<Self, ConfigError>
    where
        O: FnOnce(&mut Self),
    {
        dotenvy::dotenv().ok();
        let mut config = Self::from_lookup(|key| env::var(key).ok())?;
        overrides(&mut config);
        config.validate()?;
        Ok(config)
    }

    /// Parse from any key lookup, falling back to defaults for missing keys.
    /// The result is not validated.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Ok(Self {
            bind_addr: lookup("DAQ_BIND_ADDR").unwrap_or(defaults.bind_addr),
            output_dir: lookup("DAQ_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.output_dir),
            channels: parse_or(&lookup, "DAQ_CHANNELS", defaults.channels)?,
            capacity: parse_or(&lookup, "DAQ_CAPACITY", defaults.capacity)?,
            container: parse_or(&lookup, "DAQ_CONTAINER", defaults.container)?,
            format: parse_or(&lookup, "DAQ_FORMAT", defaults.format)?,
            queue_depth: parse_or(&lookup, "DAQ_QUEUE_DEPTH", defaults.queue_depth)?,
            poll_interval_ms: parse_or(&lookup, "DAQ_POLL_MS", defaults.poll_interval_ms)?,
            datagram_size: parse_or(&lookup, "DAQ_DATAGRAM_SIZE", defaults.datagram_size)?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.channels == 0 {
            return Err(ConfigError::InvalidValue(
                "channels must be at least 1".to_string(),
            ));
        }
        if self.capacity == 0 {
            return Err(ConfigError::InvalidValue(
                "capacity must be at least 1".to_string(),
            ));
        }
        if self.queue_depth == 0 {
            return Err(ConfigError::InvalidValue(
                "queue depth must be at least 1".to_string(),
            ));
        }
        if self.datagram_size == 0 {
            return Err(ConfigError::InvalidValue(
                "datagram size must be at least 1 byte".to_string(),
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "poll interval must be at least 1 ms".to_string(),
            ));
        }
        if self.channels > u16::MAX as usize + 1 {
            return Err(ConfigError::InvalidValue(format!(
                "channels must not exceed {}",
                u16::MAX as usize + 1
            )));
        }
        if !self.format.is_available() {
            return Err(ConfigError::UnsupportedFormat(self.format.to_string()));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn dispatch_config(&self) -> DispatchConfig {
        DispatchConfig {
            queue_depth: self.queue_depth,
            poll_interval: self.poll_interval(),
        }
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(format!("{}={}", key, raw))),
        None => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
    #[error("Output format '{0}' is not available in this build")]
    UnsupportedFormat(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = WriterConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.bind_addr, "0.0.0.0:12345");
        assert_eq!(config.channels, 64);
        assert_eq!(config.capacity, 1_000_000);
        assert_eq!(config.container, ContainerKind::Vector);
        assert_eq!(config.format, SinkFormat::Jsonl);
    }

    #[test]
    fn test_values_from_lookup() {
        let config = WriterConfig::from_lookup(lookup(&[
            ("DAQ_CHANNELS", "16"),
            ("DAQ_CAPACITY", " 500 "),
            ("DAQ_CONTAINER", "sorted"),
            ("DAQ_OUTPUT_DIR", "/tmp/run42"),
            ("DAQ_POLL_MS", "25"),
        ]))
        .unwrap();
        assert_eq!(config.channels, 16);
        assert_eq!(config.capacity, 500);
        assert_eq!(config.container, ContainerKind::Sorted);
        assert_eq!(config.output_dir, PathBuf::from("/tmp/run42"));
        assert_eq!(config.dispatch_config().poll_interval, Duration::from_millis(25));
    }

    #[test]
    fn test_invalid_number_rejected() {
        let err = WriterConfig::from_lookup(lookup(&[("DAQ_CAPACITY", "lots")])).unwrap_err();
        assert!(err.to_string().contains("DAQ_CAPACITY"));
    }

    #[test]
    fn test_zero_values_rejected() {
        for key in ["DAQ_CAPACITY", "DAQ_CHANNELS", "DAQ_QUEUE_DEPTH", "DAQ_POLL_MS"] {
            let config = WriterConfig::from_lookup(lookup(&[(key, "0")])).unwrap();
            assert!(config.validate().is_err(), "{} = 0 accepted", key);
        }
    }

    #[test]
    fn test_too_many_channels_rejected() {
        let config = WriterConfig {
            channels: 70_000,
            ..WriterConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[cfg(not(feature = "hdf5-support"))]
    #[test]
    fn test_hdf5_needs_feature() {
        let config = WriterConfig::from_lookup(lookup(&[("DAQ_FORMAT", "hdf5")])).unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::UnsupportedFormat(_))
        ));
    }
}
