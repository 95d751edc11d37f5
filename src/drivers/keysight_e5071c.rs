//! Keysight E5071C ENA Vector Network Analyzer driver
//!
//! Protocol Overview:
//! - SCPI over LAN/GPIB/USB, usually through VISA
//! - Marker values answer as `real,imag`
//! - `*IDN?` answers `Keysight Technologies,E5071C,<serial>,<firmware>`
//!
//! The display name defaults to "Keysight E5071C", so opening does not
//! touch the instrument. Pass `name: None` to derive it from `*IDN?`.

use crate::attribute::{self, control_accessors, measurement_accessors, Attribute, Control};
use crate::error::ScpiResult;
use crate::instrument::{Identity, IdentityDefaults, Instrument};
use crate::transport::Transport;
use num_complex::Complex64;
use std::time::Duration;

/// Construction options.
#[derive(Debug, Clone, PartialEq)]
pub struct KeysightE5071cOptions {
    pub name: Option<String>,
    pub query_delay: Option<Duration>,
}

impl Default for KeysightE5071cOptions {
    fn default() -> Self {
        Self {
            name: Some("Keysight E5071C".to_string()),
            query_delay: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct KeysightE5071cControls {
    pub marker_1_position: Control<f64>,
    pub marker_1_value: Control<Complex64>,
}

impl KeysightE5071cControls {
    pub fn new() -> Self {
        Self {
            marker_1_position: Control::new(
                "marker_1_position",
                "CALC1:MARK1:X?",
                "CALC1:MARK1:X {value}",
            ),
            marker_1_value: Control::measurement("marker_1_value", "CALC1:MARK1:Y?"),
        }
    }

    pub fn all(&self) -> Vec<&dyn Attribute> {
        vec![&self.marker_1_position, &self.marker_1_value]
    }
}

impl Default for KeysightE5071cControls {
    fn default() -> Self {
        Self::new()
    }
}

/// Keysight E5071C driver.
#[derive(Debug)]
pub struct KeysightE5071c {
    instrument: Instrument,
    controls: KeysightE5071cControls,
}

impl KeysightE5071c {
    pub const IDENTITY: IdentityDefaults = IdentityDefaults {
        manufacturer: "Keysight",
        model: "E5071C",
        description: "Vector Network Analyzer",
    };

    pub async fn open(
        transport: Box<dyn Transport>,
        options: KeysightE5071cOptions,
    ) -> ScpiResult<Self> {
        let instrument = Instrument::open(transport, Self::IDENTITY, options.name)
            .await?
            .with_query_delay(options.query_delay);
        Ok(Self {
            instrument,
            controls: KeysightE5071cControls::new(),
        })
    }

    fn channel_index(&self) -> Option<u8> {
        None
    }

    control_accessors! {
        /// Stimulus position of marker 1 (Hz on a frequency sweep).
        marker_1_position, set_marker_1_position: f64;
    }

    measurement_accessors! {
        /// Response value at marker 1.
        marker_1_value: Complex64;
    }

    pub fn name(&self) -> &str {
        self.instrument.name()
    }

    pub fn instrument(&mut self) -> &mut Instrument {
        &mut self.instrument
    }

    /// `*IDN?` fields, always queried.
    pub async fn id(&mut self) -> ScpiResult<Vec<String>> {
        self.instrument.id().await
    }

    pub async fn identity(&mut self) -> ScpiResult<Identity> {
        self.instrument.identity().await
    }

    pub async fn manufacturer(&mut self) -> ScpiResult<String> {
        self.instrument.manufacturer().await
    }

    pub async fn model(&mut self) -> ScpiResult<String> {
        self.instrument.model().await
    }

    pub async fn firmware(&mut self) -> ScpiResult<String> {
        self.instrument.firmware().await
    }

    /// Serial number, the third `*IDN?` field.
    pub async fn serial_number(&mut self) -> ScpiResult<String> {
        self.instrument.serial().await
    }

    pub async fn reset(&mut self) -> ScpiResult<()> {
        self.instrument.reset().await
    }

    pub fn attributes(&self) -> Vec<&dyn Attribute> {
        self.controls.all()
    }

    pub async fn get_by_name(&mut self, name: &str, channel: Option<u8>) -> ScpiResult<String> {
        let found = attribute::find(&self.controls.all(), name)?;
        self.instrument.get_text(found, channel).await
    }

    pub async fn set_by_name(&mut self, name: &str, value: &str, channel: Option<u8>) -> ScpiResult<()> {
        let found = attribute::find(&self.controls.all(), name)?;
        self.instrument.set_text(found, value, channel).await
    }

    pub async fn close(self) -> ScpiResult<()> {
        self.instrument.close().await
    }
}
