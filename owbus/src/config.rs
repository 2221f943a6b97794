//! Transport configuration.
//!
//! A [`BusConfig`] names the adapter and how to reach it. It can be built in code with the
//! `with_*` methods or deserialized (camelCase keys, e.g. `timeoutMs`) from a file.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_TIMEOUT_MS: u64 = 1000;
const DEFAULT_ACQUIRE_TIMEOUT_MS: u64 = 2000;
const DEFAULT_CACHE_TTL_MS: u64 = 10_000;

/// How the DS2480B line driver is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
pub enum TransportMode {
    /// Serial port (DS9097U-class adapter), `port` is the device path.
    #[default]
    Serial,
    /// USB-serial adapter (LinkUSB and similar), `port` is a device path, `VID:PID` or
    /// the USB serial number.
    #[serde(alias = "USB")]
    Usb,
    /// Raw TCP tunnel to a serial server, `port` is `host:port`.
    Network,
}

/// Bus configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BusConfig {
    /// Device path, USB selector or network address.
    pub port: String,
    /// Response timeout of the transport.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Transport kind.
    #[serde(default)]
    pub mode: TransportMode,
    /// How long a caller waits for the bus before [`Error::BusBusy`].
    #[serde(default = "default_acquire_timeout_ms")]
    pub acquire_timeout_ms: u64,
    /// Age after which a cached scan is refreshed; zero disables the cache.
    #[serde(default = "default_cache_ttl_ms")]
    pub cache_ttl_ms: u64,
    /// Send a line break before detecting the adapter.
    #[serde(default = "default_line_break")]
    pub line_break: bool,
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

fn default_acquire_timeout_ms() -> u64 {
    DEFAULT_ACQUIRE_TIMEOUT_MS
}

fn default_cache_ttl_ms() -> u64 {
    DEFAULT_CACHE_TTL_MS
}

fn default_line_break() -> bool {
    true
}

impl Default for BusConfig {
    fn default() -> Self {
        Self::new("", TransportMode::Serial)
    }
}

impl BusConfig {
    /// A configuration with default timings.
    pub fn new(port: impl Into<String>, mode: TransportMode) -> Self {
        Self {
            port: port.into(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            mode,
            acquire_timeout_ms: DEFAULT_ACQUIRE_TIMEOUT_MS,
            cache_ttl_ms: DEFAULT_CACHE_TTL_MS,
            line_break: true,
        }
    }

    /// Sets the transport response timeout.
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Sets how long callers wait for the bus.
    pub fn with_acquire_timeout_ms(mut self, acquire_timeout_ms: u64) -> Self {
        self.acquire_timeout_ms = acquire_timeout_ms;
        self
    }

    /// Sets the scan cache lifetime.
    pub fn with_cache_ttl_ms(mut self, cache_ttl_ms: u64) -> Self {
        self.cache_ttl_ms = cache_ttl_ms;
        self
    }

    /// Enables or disables the line break before adapter detection.
    pub fn with_line_break(mut self, line_break: bool) -> Self {
        self.line_break = line_break;
        self
    }

    /// Transport response timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Bus acquisition timeout.
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    /// Scan cache lifetime.
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }

    /// Checks the configuration before any transport is touched.
    pub fn validate(&self) -> Result<()> {
        if self.port.trim().is_empty() {
            return Err(Error::Config("port must not be empty".into()));
        }
        if self.timeout_ms == 0 {
            return Err(Error::Config("timeoutMs must be positive".into()));
        }
        if self.mode == TransportMode::Network {
            let valid = self
                .port
                .rsplit_once(':')
                .is_some_and(|(host, port)| !host.is_empty() && port.parse::<u16>().is_ok());
            if !valid {
                return Err(Error::Config(format!(
                    "network port must be host:port, got {:?}",
                    self.port
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserialize_with_defaults() {
        let config: BusConfig =
            serde_json::from_str(r#"{"port": "/dev/ttyUSB0", "timeoutMs": 250, "mode": "USB"}"#)
                .unwrap();
        assert_eq!(config.port, "/dev/ttyUSB0");
        assert_eq!(config.timeout(), Duration::from_millis(250));
        assert_eq!(config.mode, TransportMode::Usb);
        assert_eq!(config.acquire_timeout_ms, DEFAULT_ACQUIRE_TIMEOUT_MS);
        assert_eq!(config.cache_ttl_ms, DEFAULT_CACHE_TTL_MS);
        assert!(config.line_break);
        config.validate().unwrap();
    }

    #[test]
    fn serialize_round_trip() {
        let config = BusConfig::new("owserver:4304", TransportMode::Network)
            .with_timeout_ms(300)
            .with_cache_ttl_ms(0)
            .with_line_break(false);
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"timeoutMs\":300"));
        assert!(json.contains("\"mode\":\"Network\""));
        let back: BusConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn validation() {
        assert!(matches!(BusConfig::default().validate(), Err(Error::Config(_))));
        assert!(matches!(
            BusConfig::new("/dev/ttyS0", TransportMode::Serial).with_timeout_ms(0).validate(),
            Err(Error::Config(_))
        ));
        assert!(BusConfig::new("localhost", TransportMode::Network).validate().is_err());
        assert!(BusConfig::new(":4304", TransportMode::Network).validate().is_err());
        assert!(BusConfig::new("10.0.0.2:2000", TransportMode::Network).validate().is_ok());
        assert!(BusConfig::new("04fa:2490", TransportMode::Usb).validate().is_ok());
    }
}
