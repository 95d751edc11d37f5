//! Agilent E4418B / E4419B RF Power Meter driver
//!
//! Reference: Agilent EPM Series Power Meters Programming Guide
//!
//! Protocol Overview:
//! - SCPI; sensor settings live under `SENSe<ch>` (`SENS1:FREQ 1.21e9`)
//! - E4418B has one sensor channel, E4419B has two
//! - Display windows have their own unit (`UNIT1:POW DBM`, `UNIT2:POW W`)
//! - Boolean settings take `ON`/`OFF` and answer `1`/`0`
//!
//! Sensor settings are reached through [`AgilentE4418b::channel`], which
//! checks the channel index before anything is sent.
//!
//! # Example Usage
//!
//! ```no_run
//! # async fn example(transport: Box<dyn scpi_instruments::transport::Transport>) -> scpi_instruments::error::ScpiResult<()> {
//! use scpi_instruments::drivers::agilent_e4418b::{AgilentE4418b, AgilentE4418bOptions};
//!
//! let mut meter = AgilentE4418b::open(transport, AgilentE4418bOptions::default()).await?;
//! let mut sensor = meter.channel(1)?;
//! sensor.set_frequency(1.21e9).await?;
//! sensor.zero().await?;
//! let dbm = sensor.power().await?;
//! # Ok(())
//! # }
//! ```

use crate::attribute::{
    self, control_accessors, measurement_accessors, render_template, Attribute, Control,
    ScpiValue, TokenMap, ValueFormat,
};
use crate::error::{ScpiError, ScpiResult};
use crate::instrument::{Channel, Identity, IdentityDefaults, Instrument};
use crate::transport::Transport;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

const ZERO_TEMPLATE: &str = "CAL{ch}:ZERO:AUTO ONCE";
const CALIBRATE_TEMPLATE: &str = "CAL{ch}:AUTO ONCE";

/// Construction options.
#[derive(Debug, Clone, PartialEq)]
pub struct AgilentE4418bOptions {
    /// Display name; derived from `*IDN?` when `None`.
    pub name: Option<String>,
    /// 1 for the E4418B, 2 for the E4419B.
    pub channels: u8,
    /// Frequency bounds; depend on the sensor head.
    pub min_frequency: f64,
    pub max_frequency: f64,
    pub query_delay: Option<Duration>,
}

impl Default for AgilentE4418bOptions {
    fn default() -> Self {
        Self {
            name: None,
            channels: 1,
            min_frequency: 10e6,
            max_frequency: 18e9,
            query_delay: None,
        }
    }
}

/// Unit of a display window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PowerUnit {
    Dbm,
    Watt,
}

impl PowerUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            PowerUnit::Dbm => "DBM",
            PowerUnit::Watt => "W",
        }
    }

    fn tokens() -> ScpiResult<TokenMap<PowerUnit>> {
        TokenMap::new([(PowerUnit::Dbm, "DBM"), (PowerUnit::Watt, "W")])
    }
}

impl fmt::Display for PowerUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PowerUnit {
    type Err = ScpiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DBM" => Ok(PowerUnit::Dbm),
            "W" | "WATT" => Ok(PowerUnit::Watt),
            _ => Err(ScpiError::InvalidValue {
                attribute: "power unit".to_string(),
                value: s.to_string(),
                expected: "one of [DBM, W]".to_string(),
            }),
        }
    }
}

impl ScpiValue for PowerUnit {
    const EXPECTED: &'static str = "a power unit (DBM or W)";
    const DEFAULT_FORMAT: ValueFormat = ValueFormat::Text;

    fn from_reply(command: &str, reply: &str) -> ScpiResult<Self> {
        reply
            .parse()
            .map_err(|_| ScpiError::parse(command, reply, Self::EXPECTED))
    }

    fn from_text(text: &str) -> Option<Self> {
        text.parse().ok()
    }

    fn render(&self, _format: ValueFormat) -> String {
        self.as_str().to_string()
    }

    fn compare(&self, other: &Self) -> Option<Ordering> {
        (self == other).then_some(Ordering::Equal)
    }

    fn display(&self) -> String {
        self.as_str().to_string()
    }
}

/// Per-sensor attribute table. Templates carry a `{ch}` placeholder.
#[derive(Debug, Clone)]
pub struct SensorControls {
    pub frequency: Control<f64>,
    pub offset: Control<f64>,
    pub offset_enabled: Control<bool>,
    pub averaging_enabled: Control<bool>,
    pub average_count: Control<i64>,
    pub power: Control<f64>,
}

impl SensorControls {
    pub fn new(options: &AgilentE4418bOptions) -> Self {
        Self {
            frequency: Control::new("frequency", "SENS{ch}:FREQ?", "SENS{ch}:FREQ {value}")
                .with_range(options.min_frequency, options.max_frequency),
            // Raw dB, sent and returned unscaled.
            offset: Control::new("offset", "SENS{ch}:CORR:LOSS2?", "SENS{ch}:CORR:LOSS2 {value}")
                .with_range(-100.0, 100.0),
            offset_enabled: Control::new(
                "offset_enabled",
                "SENS{ch}:CORR:LOSS2:STAT?",
                "SENS{ch}:CORR:LOSS2:STAT {value}",
            )
            .with_tokens(TokenMap::on_off()),
            averaging_enabled: Control::new(
                "averaging_enabled",
                "SENS{ch}:AVER?",
                "SENS{ch}:AVER {value}",
            )
            .with_tokens(TokenMap::on_off()),
            average_count: Control::new(
                "average_count",
                "SENS{ch}:AVER:COUN?",
                "SENS{ch}:AVER:COUN {value}",
            )
            .with_range(1, 1024),
            power: Control::measurement("power", "FETC{ch}?"),
        }
    }

    pub fn all(&self) -> Vec<&dyn Attribute> {
        vec![
            &self.frequency,
            &self.offset,
            &self.offset_enabled,
            &self.averaging_enabled,
            &self.average_count,
            &self.power,
        ]
    }
}

/// Instrument-level attribute table.
#[derive(Debug, Clone)]
pub struct AgilentE4418bControls {
    pub upper_window_unit: Control<PowerUnit>,
    pub lower_window_unit: Control<PowerUnit>,
    pub sensor: SensorControls,
}

impl AgilentE4418bControls {
    pub fn new(options: &AgilentE4418bOptions) -> ScpiResult<Self> {
        Ok(Self {
            upper_window_unit: Control::new("upper_window_unit", "UNIT1:POW?", "UNIT1:POW {value}")
                .with_tokens(PowerUnit::tokens()?),
            lower_window_unit: Control::new("lower_window_unit", "UNIT2:POW?", "UNIT2:POW {value}")
                .with_tokens(PowerUnit::tokens()?),
            sensor: SensorControls::new(options),
        })
    }

    fn instrument_level(&self) -> Vec<&dyn Attribute> {
        vec![&self.upper_window_unit, &self.lower_window_unit]
    }

    /// Find `name`, defaulting the channel of sensor attributes to 1.
    fn resolve(&self, name: &str, channel: Option<u8>) -> ScpiResult<(&dyn Attribute, Option<u8>)> {
        match attribute::find(&self.instrument_level(), name) {
            Ok(found) => Ok((found, channel)),
            Err(_) => {
                let found = attribute::find(&self.sensor.all(), name)?;
                Ok((found, Some(channel.unwrap_or(1))))
            }
        }
    }
}

/// Agilent E4418B / E4419B driver.
#[derive(Debug)]
pub struct AgilentE4418b {
    instrument: Instrument,
    controls: AgilentE4418bControls,
}

impl AgilentE4418b {
    /// Identity used when `*IDN?` does not parse.
    pub const IDENTITY: IdentityDefaults = IdentityDefaults {
        manufacturer: "Agilent",
        model: "E4418B",
        description: "Power Meter",
    };

    /// Open the power meter on `transport`.
    pub async fn open(
        transport: Box<dyn Transport>,
        options: AgilentE4418bOptions,
    ) -> ScpiResult<Self> {
        if !(1..=2).contains(&options.channels) {
            return Err(ScpiError::Configuration(format!(
                "E4418B/E4419B have 1 or 2 channels, got {}",
                options.channels
            )));
        }
        if options.min_frequency > options.max_frequency {
            return Err(ScpiError::Configuration(
                "E4418B frequency bounds must satisfy min <= max".to_string(),
            ));
        }
        let controls = AgilentE4418bControls::new(&options)?;
        let instrument = Instrument::open(transport, Self::IDENTITY, options.name)
            .await?
            .with_query_delay(options.query_delay)
            .with_channels(options.channels);

        Ok(Self {
            instrument,
            controls,
        })
    }

    fn channel_index(&self) -> Option<u8> {
        None
    }

    control_accessors! {
        /// Unit of the upper display window.
        upper_window_unit, set_upper_window_unit: PowerUnit;
        /// Unit of the lower display window.
        lower_window_unit, set_lower_window_unit: PowerUnit;
    }

    pub fn name(&self) -> &str {
        self.instrument.name()
    }

    pub fn channel_count(&self) -> u8 {
        self.instrument.channel_count()
    }

    pub fn controls(&self) -> &AgilentE4418bControls {
        &self.controls
    }

    pub fn instrument(&mut self) -> &mut Instrument {
        &mut self.instrument
    }

    /// Sensor channel `index` (1-based).
    pub fn channel(&mut self, index: u8) -> ScpiResult<SensorChannel<'_>> {
        let Channel { instrument, index } = self.instrument.channel(index)?;
        Ok(SensorChannel {
            instrument,
            controls: &self.controls.sensor,
            index,
        })
    }

    /// `*IDN?` fields with the serial number left empty.
    pub async fn id(&mut self) -> ScpiResult<Vec<String>> {
        let mut fields = self.instrument.id().await?;
        if let Some(serial) = fields.get_mut(2) {
            serial.clear();
        }
        Ok(fields)
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

    pub async fn reset(&mut self) -> ScpiResult<()> {
        self.instrument.reset().await
    }

    pub fn attributes(&self) -> Vec<&dyn Attribute> {
        let mut attributes = self.controls.instrument_level();
        attributes.extend(self.controls.sensor.all());
        attributes
    }

    /// Read an attribute by name. Sensor attributes use `channel`, or
    /// channel 1 when none is given.
    pub async fn get_by_name(&mut self, name: &str, channel: Option<u8>) -> ScpiResult<String> {
        let (attribute, channel) = self.controls.resolve(name, channel)?;
        self.instrument.get_text(attribute, channel).await
    }

    /// Write an attribute by name; see [`get_by_name`](Self::get_by_name).
    pub async fn set_by_name(&mut self, name: &str, value: &str, channel: Option<u8>) -> ScpiResult<()> {
        let (attribute, channel) = self.controls.resolve(name, channel)?;
        self.instrument.set_text(attribute, value, channel).await
    }

    pub async fn close(self) -> ScpiResult<()> {
        self.instrument.close().await
    }
}

/// One sensor channel of the power meter.
#[derive(Debug)]
pub struct SensorChannel<'a> {
    instrument: &'a mut Instrument,
    controls: &'a SensorControls,
    index: u8,
}

impl SensorChannel<'_> {
    fn channel_index(&self) -> Option<u8> {
        Some(self.index)
    }

    pub fn index(&self) -> u8 {
        self.index
    }

    control_accessors! {
        /// Frequency the measurement is corrected for, in Hz.
        frequency, set_frequency: f64;
        /// Loss offset in dB, `[-100, 100]`.
        offset, set_offset: f64;
        offset_enabled, set_offset_enabled: bool;
        averaging_enabled, set_averaging_enabled: bool;
        /// Averaging filter length, `[1, 1024]`.
        average_count, set_average_count: i64;
    }

    measurement_accessors! {
        /// Latest measured power, in the unit of the channel's window.
        power: f64;
    }

    /// Zero the sensor (`CAL<ch>:ZERO:AUTO ONCE`).
    pub async fn zero(&mut self) -> ScpiResult<()> {
        let command = render_template(ZERO_TEMPLATE, None, Some(self.index))?;
        self.instrument.write(&command).await
    }

    /// Calibrate the sensor against the reference (`CAL<ch>:AUTO ONCE`).
    pub async fn calibrate(&mut self) -> ScpiResult<()> {
        let command = render_template(CALIBRATE_TEMPLATE, None, Some(self.index))?;
        self.instrument.write(&command).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_power_unit_parsing() {
        assert_eq!("dbm".parse::<PowerUnit>().unwrap(), PowerUnit::Dbm);
        assert_eq!(" W\n".parse::<PowerUnit>().unwrap(), PowerUnit::Watt);
        assert!("V".parse::<PowerUnit>().is_err());
    }

    #[test]
    fn test_sensor_templates() {
        let controls = SensorControls::new(&AgilentE4418bOptions::default());
        assert_eq!(
            controls.frequency.write_command(&1.21e9, Some(1)).unwrap(),
            "SENS1:FREQ 1.210000e+09"
        );
        assert_eq!(
            controls.offset_enabled.write_command(&true, Some(2)).unwrap(),
            "SENS2:CORR:LOSS2:STAT ON"
        );
        assert_eq!(
            controls.offset.write_command(&5.0, Some(1)).unwrap(),
            "SENS1:CORR:LOSS2 5.000000e+00"
        );
        assert_eq!(controls.power.query_command(Some(2)).unwrap(), "FETC2?");
        assert!(controls.frequency.write_command(&1e6, Some(1)).is_err());
        assert!(controls.average_count.write_command(&2000, Some(1)).is_err());
    }
}
