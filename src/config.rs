//! Configuration using Figment
//!
//! Configuration is loaded from:
//! 1. a TOML file (base configuration)
//! 2. environment variables prefixed with `SCPI_INSTRUMENTS_`, nested keys
//!    separated by `__` (e.g. `SCPI_INSTRUMENTS_LOGGING__LEVEL=debug`)
//!
//! Durations are written in humantime notation (`"250ms"`, `"10s"`).
//!
//! # Example
//! ```toml
//! [logging]
//! level = "info"
//! format = "compact"
//!
//! [instruments.vna]
//! driver = "hp8753e"
//! query_delay = "50ms"
//!
//! [instruments.vna.transport]
//! kind = "prologix"
//! port = "/dev/ttyUSB0"
//! address = 16
//! timeout = "3s"
//!
//! [instruments.vna.acquisition]
//! scan_margin = "10s"
//! ```

use crate::acquisition::AcquisitionSettings;
use crate::drivers::DriverKind;
use crate::error::{ScpiError, ScpiResult};
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Prefix of environment overrides.
pub const ENV_PREFIX: &str = "SCPI_INSTRUMENTS_";

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Instruments by id
    #[serde(default)]
    pub instruments: BTreeMap<String, InstrumentConfig>,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// trace, debug, info, warn or error
    #[serde(default = "default_log_level")]
    pub level: String,
    /// pretty, compact or json
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// One instrument
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentConfig {
    pub driver: DriverKind,
    /// Display name; derived from the instrument identity when absent
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Wait between writing a query and reading its reply
    #[serde(default, with = "humantime_serde")]
    pub query_delay: Option<Duration>,
    pub transport: TransportConfig,
    #[serde(default)]
    pub limits: Limits,
    #[serde(default)]
    pub acquisition: AcquisitionSettings,
}

/// How to reach the instrument
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransportConfig {
    Serial {
        port: String,
        #[serde(default = "default_baud_rate")]
        baud_rate: u32,
        #[serde(default = "default_timeout", with = "humantime_serde")]
        timeout: Duration,
        #[serde(default = "default_write_termination")]
        write_termination: String,
        #[serde(default = "default_read_termination")]
        read_termination: char,
    },
    Prologix {
        port: String,
        /// GPIB primary address
        address: u8,
        #[serde(default = "default_prologix_baud_rate")]
        baud_rate: u32,
        #[serde(default = "default_timeout", with = "humantime_serde")]
        timeout: Duration,
    },
    Visa {
        /// e.g. `GPIB0::16::INSTR`
        resource: String,
        #[serde(default = "default_timeout", with = "humantime_serde")]
        timeout: Duration,
    },
}

/// Overrides for driver bounds; unset values keep the driver defaults
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Limits {
    pub min_frequency: Option<f64>,
    pub max_frequency: Option<f64>,
    pub min_power: Option<f64>,
    pub max_power: Option<f64>,
    /// Power meter sensor channels (1 or 2)
    pub channels: Option<u8>,
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_enabled() -> bool {
    true
}

fn default_baud_rate() -> u32 {
    9600
}

fn default_prologix_baud_rate() -> u32 {
    115_200
}

fn default_timeout() -> Duration {
    Duration::from_secs(3)
}

fn default_write_termination() -> String {
    "\n".to_string()
}

fn default_read_termination() -> char {
    '\n'
}

impl Settings {
    /// Load configuration from `path` and environment variables.
    pub fn load_from<P: AsRef<Path>>(path: P) -> ScpiResult<Self> {
        Ok(Self::figment(Toml::file(path.as_ref())).extract()?)
    }

    /// Parse configuration from a TOML string (plus environment variables).
    pub fn from_toml_str(toml: &str) -> ScpiResult<Self> {
        Ok(Self::figment(Toml::string(toml)).extract()?)
    }

    fn figment(base: figment::providers::Data<Toml>) -> Figment {
        Figment::new()
            .merge(base)
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), String> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.logging.level,
                valid_levels.join(", ")
            ));
        }

        let valid_formats = ["pretty", "compact", "json"];
        if !valid_formats.contains(&self.logging.format.to_lowercase().as_str()) {
            return Err(format!(
                "Invalid log format '{}'. Must be one of: {}",
                self.logging.format,
                valid_formats.join(", ")
            ));
        }

        for (id, instrument) in &self.instruments {
            if id.trim().is_empty() {
                return Err("Instrument id must not be empty".to_string());
            }
            instrument
                .validate()
                .map_err(|e| format!("Instrument '{id}': {e}"))?;
        }

        Ok(())
    }

    /// Get all enabled instruments
    pub fn enabled_instruments(&self) -> Vec<(&str, &InstrumentConfig)> {
        self.instruments
            .iter()
            .filter(|(_, inst)| inst.enabled)
            .map(|(id, inst)| (id.as_str(), inst))
            .collect()
    }

    /// Look up an instrument by id.
    pub fn instrument(&self, id: &str) -> ScpiResult<&InstrumentConfig> {
        self.instruments
            .get(id)
            .ok_or_else(|| ScpiError::Configuration(format!("Instrument '{id}' not found in settings")))
    }
}

impl InstrumentConfig {
    fn validate(&self) -> Result<(), String> {
        let limits = &self.limits;
        if let (Some(min), Some(max)) = (limits.min_frequency, limits.max_frequency) {
            if min > max {
                return Err(format!("min_frequency {min} exceeds max_frequency {max}"));
            }
        }
        if let (Some(min), Some(max)) = (limits.min_power, limits.max_power) {
            if min > max {
                return Err(format!("min_power {min} exceeds max_power {max}"));
            }
        }
        if let Some(channels) = limits.channels {
            if self.driver != DriverKind::AgilentE4418b {
                return Err("channels only applies to the agilent_e4418b driver".to_string());
            }
            if !(1..=2).contains(&channels) {
                return Err(format!("Invalid channels {channels}. Must be 1 or 2"));
            }
        }

        if self.acquisition.chunk_size == 0 {
            return Err("acquisition.chunk_size must be at least 1".to_string());
        }
        if self.acquisition.poll_interval.is_zero() {
            return Err("acquisition.poll_interval must be greater than zero".to_string());
        }

        match &self.transport {
            TransportConfig::Serial {
                port, baud_rate, ..
            }
            | TransportConfig::Prologix {
                port, baud_rate, ..
            } => {
                if port.trim().is_empty() {
                    return Err("transport.port must not be empty".to_string());
                }
                if *baud_rate == 0 {
                    return Err("transport.baud_rate must be greater than zero".to_string());
                }
            }
            TransportConfig::Visa { resource, .. } => {
                if resource.trim().is_empty() {
                    return Err("transport.resource must not be empty".to_string());
                }
            }
        }
        if let TransportConfig::Prologix { address, .. } = &self.transport {
            if *address > 30 {
                return Err(format!("Invalid GPIB address {address}. Must be 0-30"));
            }
        }

        Ok(())
    }
}
