//! Instrument drivers.
//!
//! Each driver wraps an [`Instrument`](crate::instrument::Instrument) with
//! the attribute table of one model. [`Driver`] dispatches by name so the
//! CLI and configuration can treat all models alike.

pub mod agilent_e4418b;
pub mod hp8753e;
pub mod keysight_e5071c;

pub use agilent_e4418b::{AgilentE4418b, AgilentE4418bOptions, PowerUnit};
pub use hp8753e::{Hp8753e, Hp8753eOptions, MeasuringParameter};
pub use keysight_e5071c::{KeysightE5071c, KeysightE5071cOptions};

use crate::attribute::Attribute;
use crate::config::InstrumentConfig;
use crate::error::{ScpiError, ScpiResult};
use crate::instrument::Identity;
use crate::transport::{self, Transport};
use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::info;

/// Supported instrument models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverKind {
    Hp8753e,
    /// Also drives the two-channel E4419B.
    #[serde(alias = "agilent_e4419b")]
    AgilentE4418b,
    KeysightE5071c,
}

impl DriverKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hp8753e => "hp8753e",
            Self::AgilentE4418b => "agilent_e4418b",
            Self::KeysightE5071c => "keysight_e5071c",
        }
    }
}

impl fmt::Display for DriverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An opened instrument of any supported model.
#[derive(Debug)]
pub enum Driver {
    Hp8753e(Hp8753e),
    AgilentE4418b(AgilentE4418b),
    KeysightE5071c(KeysightE5071c),
}

impl Driver {
    /// Open the transport described by `config` and build its driver.
    pub async fn from_config(config: &InstrumentConfig) -> ScpiResult<Self> {
        let transport = transport::open(&config.transport).await?;
        let driver = Self::open(config, transport).await?;
        info!(
            driver = %config.driver,
            name = %driver.name(),
            "Instrument ready"
        );
        Ok(driver)
    }

    /// Build the driver for `config` on an already opened transport.
    pub async fn open(config: &InstrumentConfig, transport: Box<dyn Transport>) -> ScpiResult<Self> {
        let limits = &config.limits;
        Ok(match config.driver {
            DriverKind::Hp8753e => {
                let defaults = Hp8753eOptions::default();
                let options = Hp8753eOptions {
                    name: config.name.clone(),
                    min_frequency: limits.min_frequency.unwrap_or(defaults.min_frequency),
                    max_frequency: limits.max_frequency.unwrap_or(defaults.max_frequency),
                    min_power: limits.min_power.unwrap_or(defaults.min_power),
                    max_power: limits.max_power.unwrap_or(defaults.max_power),
                    query_delay: config.query_delay,
                    acquisition: config.acquisition,
                };
                Self::Hp8753e(Hp8753e::open(transport, options).await?)
            }
            DriverKind::AgilentE4418b => {
                let defaults = AgilentE4418bOptions::default();
                let options = AgilentE4418bOptions {
                    name: config.name.clone(),
                    channels: limits.channels.unwrap_or(defaults.channels),
                    min_frequency: limits.min_frequency.unwrap_or(defaults.min_frequency),
                    max_frequency: limits.max_frequency.unwrap_or(defaults.max_frequency),
                    query_delay: config.query_delay,
                };
                Self::AgilentE4418b(AgilentE4418b::open(transport, options).await?)
            }
            DriverKind::KeysightE5071c => {
                let mut options = KeysightE5071cOptions {
                    query_delay: config.query_delay,
                    ..Default::default()
                };
                if config.name.is_some() {
                    options.name = config.name.clone();
                }
                Self::KeysightE5071c(KeysightE5071c::open(transport, options).await?)
            }
        })
    }

    pub fn kind(&self) -> DriverKind {
        match self {
            Self::Hp8753e(_) => DriverKind::Hp8753e,
            Self::AgilentE4418b(_) => DriverKind::AgilentE4418b,
            Self::KeysightE5071c(_) => DriverKind::KeysightE5071c,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Hp8753e(d) => d.name(),
            Self::AgilentE4418b(d) => d.name(),
            Self::KeysightE5071c(d) => d.name(),
        }
    }

    pub fn attributes(&self) -> Vec<&dyn Attribute> {
        match self {
            Self::Hp8753e(d) => d.attributes(),
            Self::AgilentE4418b(d) => d.attributes(),
            Self::KeysightE5071c(d) => d.attributes(),
        }
    }

    /// Read attribute `name`, rendered as text.
    pub async fn get(&mut self, name: &str, channel: Option<u8>) -> ScpiResult<String> {
        match self {
            Self::Hp8753e(d) => d.get_by_name(name, channel).await,
            Self::AgilentE4418b(d) => d.get_by_name(name, channel).await,
            Self::KeysightE5071c(d) => d.get_by_name(name, channel).await,
        }
    }

    /// Parse `value`, validate it and write attribute `name`.
    pub async fn set(&mut self, name: &str, value: &str, channel: Option<u8>) -> ScpiResult<()> {
        match self {
            Self::Hp8753e(d) => d.set_by_name(name, value, channel).await,
            Self::AgilentE4418b(d) => d.set_by_name(name, value, channel).await,
            Self::KeysightE5071c(d) => d.set_by_name(name, value, channel).await,
        }
    }

    pub async fn identity(&mut self) -> ScpiResult<Identity> {
        match self {
            Self::Hp8753e(d) => d.identity().await,
            Self::AgilentE4418b(d) => d.identity().await,
            Self::KeysightE5071c(d) => d.identity().await,
        }
    }

    pub async fn reset(&mut self) -> ScpiResult<()> {
        match self {
            Self::Hp8753e(d) => d.reset().await,
            Self::AgilentE4418b(d) => d.reset().await,
            Self::KeysightE5071c(d) => d.reset().await,
        }
    }

    /// Trigger a sweep and wait for it. Network analyzers with sweep
    /// support only; `margin` defaults to the configured scan margin.
    pub async fn scan(&mut self, margin: Option<Duration>) -> ScpiResult<()> {
        match self {
            Self::Hp8753e(d) => {
                let margin = margin.unwrap_or(d.acquisition().scan_margin);
                d.scan(margin).await
            }
            other => Err(other.unsupported("scan")),
        }
    }

    /// Complex data of the last sweep.
    pub async fn data(&mut self, timeout: Option<Duration>) -> ScpiResult<Vec<Complex64>> {
        match self {
            Self::Hp8753e(d) => {
                let timeout = timeout.unwrap_or(d.acquisition().transfer_timeout);
                d.data_complex(timeout).await
            }
            other => Err(other.unsupported("data")),
        }
    }

    pub async fn close(self) -> ScpiResult<()> {
        match self {
            Self::Hp8753e(d) => d.close().await,
            Self::AgilentE4418b(d) => d.close().await,
            Self::KeysightE5071c(d) => d.close().await,
        }
    }

    fn unsupported(&self, operation: &'static str) -> ScpiError {
        ScpiError::Unsupported {
            driver: self.kind().as_str(),
            operation,
        }
    }
}
