//! HP 8753E Vector Network Analyzer driver
//!
//! Reference: HP 8753E Programmer's Guide
//!
//! Protocol Overview:
//! - HP-IB (GPIB) mnemonics, not strict SCPI: `STAR 1.5e9 Hz`, `SWET1.00e+00`
//! - Numbers written in C `%e` notation; replies like `+1.500000000E+09`
//! - Integer settings (`POIN?`, `AVERFACT?`) are answered in scientific notation
//! - Boolean settings take `1`/`0` and answer `1`/`0`
//!
//! # Sweeps
//!
//! [`Hp8753e::scan`] triggers a sweep (`NUMG<n>` with averaging, `SING`
//! without) and polls `NOOP?` until the analyzer answers. The analyzer holds
//! off replies while sweeping, so each poll that times out at the transport
//! is retried until `(sweep_time + margin) × averages` has elapsed.
//!
//! [`Hp8753e::data_complex`] then streams the active trace as ASCII
//! (`FORM4`, `OUTPDATA`), one fixed-size chunk per point.
//!
//! # Example Usage
//!
//! ```no_run
//! # async fn example(transport: Box<dyn scpi_instruments::transport::Transport>) -> scpi_instruments::error::ScpiResult<()> {
//! use std::time::Duration;
//! use scpi_instruments::drivers::hp8753e::{Hp8753e, Hp8753eOptions};
//!
//! let mut vna = Hp8753e::open(transport, Hp8753eOptions::default()).await?;
//! vna.set_start_frequency(100e6).await?;
//! vna.set_stop_frequency(1e9).await?;
//! vna.set_scan_points(201).await?;
//!
//! vna.scan(Duration::from_secs(10)).await?;
//! let data = vna.data_complex(Duration::from_secs(10)).await?;
//! let frequencies = vna.frequencies().await?;
//! assert_eq!(data.len(), frequencies.len());
//! # Ok(())
//! # }
//! ```

use crate::acquisition::{
    read_complex_chunks, sweep_deadline, wait_for_completion, AcquisitionSettings, SweepState,
};
use crate::attribute::{
    self, control_accessors, Attribute, Control, TokenMap, ValueFormat,
};
use crate::error::{ScpiError, ScpiResult};
use crate::instrument::{Identity, IdentityDefaults, Instrument};
use crate::scpi;
use crate::transport::Transport;
use num_complex::Complex64;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// Allowed values of `scan_points`.
pub const SCAN_POINT_VALUES: [i64; 10] = [3, 11, 21, 26, 51, 101, 201, 401, 801, 1601];

/// Allowed values of `if_bandwidth` in Hz.
pub const ALLOWED_BANDWIDTH: [i64; 8] = [10, 30, 100, 300, 1000, 3000, 3700, 6000];

const MAX_SWEEP_TIME: f64 = 36_400.0;

/// Construction options.
#[derive(Debug, Clone, PartialEq)]
pub struct Hp8753eOptions {
    /// Display name; derived from `*IDN?` when `None`.
    pub name: Option<String>,
    pub min_frequency: f64,
    pub max_frequency: f64,
    pub min_power: f64,
    pub max_power: f64,
    pub query_delay: Option<Duration>,
    pub acquisition: AcquisitionSettings,
}

impl Default for Hp8753eOptions {
    fn default() -> Self {
        Self {
            name: None,
            min_frequency: 30.0e3,
            max_frequency: 6.0e9,
            min_power: -70.0,
            max_power: 10.0,
            query_delay: None,
            acquisition: AcquisitionSettings::default(),
        }
    }
}

/// Scattering or receiver parameter shown on the active channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MeasuringParameter {
    S11,
    S12,
    S21,
    S22,
    A,
    B,
    R,
}

impl MeasuringParameter {
    /// Query order used when reading the active parameter.
    pub const ALL: [MeasuringParameter; 7] = [
        MeasuringParameter::S11,
        MeasuringParameter::S12,
        MeasuringParameter::S21,
        MeasuringParameter::S22,
        MeasuringParameter::A,
        MeasuringParameter::B,
        MeasuringParameter::R,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MeasuringParameter::S11 => "S11",
            MeasuringParameter::S12 => "S12",
            MeasuringParameter::S21 => "S21",
            MeasuringParameter::S22 => "S22",
            MeasuringParameter::A => "A",
            MeasuringParameter::B => "B",
            MeasuringParameter::R => "R",
        }
    }
}

impl fmt::Display for MeasuringParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MeasuringParameter {
    type Err = ScpiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MeasuringParameter::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ScpiError::InvalidValue {
                attribute: "measuring_parameter".to_string(),
                value: s.to_string(),
                expected: "one of [S11, S12, S21, S22, A, B, R]".to_string(),
            })
    }
}

/// Attribute table, built per instance so the configured bounds apply.
#[derive(Debug, Clone)]
pub struct Hp8753eControls {
    pub start_frequency: Control<f64>,
    pub stop_frequency: Control<f64>,
    pub center_frequency: Control<f64>,
    pub span_frequency: Control<f64>,
    pub sweep_time: Control<f64>,
    pub averages: Control<i64>,
    pub averaging_enabled: Control<bool>,
    pub correction_enabled: Control<bool>,
    pub power: Control<f64>,
    pub output_enabled: Control<bool>,
    pub trigger_hold: Control<bool>,
    pub trigger_continuous: Control<bool>,
    pub scan_points: Control<i64>,
    pub if_bandwidth: Control<i64>,
    pub serial_number: Control<String>,
    pub options: Control<String>,
}

impl Hp8753eControls {
    pub fn new(options: &Hp8753eOptions) -> Self {
        let (min_f, max_f) = (options.min_frequency, options.max_frequency);
        let frequency = |name, mnemonic: &str| {
            Control::<f64>::new(name, format!("{mnemonic}?"), format!("{mnemonic} {{value}} Hz"))
                .with_range(min_f, max_f)
        };
        let switch = |name, mnemonic: &str| {
            Control::<bool>::new(name, format!("{mnemonic}?"), format!("{mnemonic}{{value}}"))
                .with_tokens(TokenMap::numeric())
        };

        Self {
            start_frequency: frequency("start_frequency", "STAR"),
            stop_frequency: frequency("stop_frequency", "STOP"),
            center_frequency: frequency("center_frequency", "CENT"),
            span_frequency: Control::new("span_frequency", "SPAN?", "SPAN {value} Hz")
                .with_range(0.0, max_f - min_f),
            sweep_time: Control::new("sweep_time", "SWET?", "SWET{value}")
                .with_format(ValueFormat::Exponential(2))
                .with_range(0.01, MAX_SWEEP_TIME),
            averages: Control::new("averages", "AVERFACT?", "AVERFACT{value}").with_range(1, 999),
            averaging_enabled: switch("averaging_enabled", "AVERO"),
            correction_enabled: switch("correction_enabled", "CORR"),
            power: Control::new("power", "POWE?", "POWE{value}")
                .with_format(ValueFormat::Exponential(3))
                .with_range(options.min_power, options.max_power),
            output_enabled: switch("output_enabled", "SOUP"),
            trigger_hold: Control::new("trigger_hold", "HOLD?", "{value}")
                .with_tokens(TokenMap::boolean("HOLD", "CONT").replies("1", "0")),
            trigger_continuous: Control::new("trigger_continuous", "CONT?", "{value}")
                .with_tokens(TokenMap::boolean("CONT", "HOLD").replies("1", "0")),
            scan_points: Control::new("scan_points", "POIN?", "POIN{value}")
                .with_choices(SCAN_POINT_VALUES),
            if_bandwidth: Control::new("if_bandwidth", "IFBW?", "IFBW{value}")
                .with_choices(ALLOWED_BANDWIDTH),
            serial_number: Control::measurement("serial_number", "OUTPSERN"),
            options: Control::measurement("options", "OUTPOPTS"),
        }
    }

    /// Every attribute, for lookup by name.
    pub fn all(&self) -> Vec<&dyn Attribute> {
        vec![
            &self.start_frequency,
            &self.stop_frequency,
            &self.center_frequency,
            &self.span_frequency,
            &self.sweep_time,
            &self.averages,
            &self.averaging_enabled,
            &self.correction_enabled,
            &self.power,
            &self.output_enabled,
            &self.trigger_hold,
            &self.trigger_continuous,
            &self.scan_points,
            &self.if_bandwidth,
            &self.serial_number,
            &self.options,
        ]
    }
}

/// HP 8753E driver.
#[derive(Debug)]
pub struct Hp8753e {
    instrument: Instrument,
    controls: Hp8753eControls,
    acquisition: AcquisitionSettings,
    sweep_state: SweepState,
}

impl Hp8753e {
    /// Identity used when `*IDN?` does not parse.
    pub const IDENTITY: IdentityDefaults = IdentityDefaults {
        manufacturer: "Hewlett Packard",
        model: "8753E",
        description: "Vector Network Analyzer",
    };

    /// Open the analyzer on `transport`.
    pub async fn open(transport: Box<dyn Transport>, options: Hp8753eOptions) -> ScpiResult<Self> {
        if options.min_frequency > options.max_frequency || options.min_power > options.max_power {
            return Err(ScpiError::Configuration(
                "HP 8753E bounds must satisfy min <= max".to_string(),
            ));
        }
        let controls = Hp8753eControls::new(&options);
        let instrument = Instrument::open(transport, Self::IDENTITY, options.name)
            .await?
            .with_query_delay(options.query_delay);

        Ok(Self {
            instrument,
            controls,
            acquisition: options.acquisition,
            sweep_state: SweepState::Idle,
        })
    }

    fn channel_index(&self) -> Option<u8> {
        None
    }

    control_accessors! {
        /// Start frequency in Hz.
        start_frequency, set_start_frequency: f64;
        /// Stop frequency in Hz.
        stop_frequency, set_stop_frequency: f64;
        /// Center frequency in Hz.
        center_frequency, set_center_frequency: f64;
        /// Span in Hz, `[0, max - min]`.
        span_frequency, set_span_frequency: f64;
        /// Sweep time in seconds, `[0.01, 36400]`.
        sweep_time, set_sweep_time: f64;
        /// Averaging factor, `[1, 999]`.
        averages, set_averages: i64;
        averaging_enabled, set_averaging_enabled: bool;
        correction_enabled, set_correction_enabled: bool;
        /// RF power of the active port in dBm.
        power, set_power: f64;
        /// RF output state.
        output_enabled, set_output_enabled: bool;
        /// `true` writes `HOLD`, `false` writes `CONT`.
        trigger_hold, set_trigger_hold: bool;
        /// `true` writes `CONT`, `false` writes `HOLD`.
        trigger_continuous, set_trigger_continuous: bool;
        /// Points per sweep, one of [`SCAN_POINT_VALUES`].
        scan_points, set_scan_points: i64;
        /// IF bandwidth in Hz, one of [`ALLOWED_BANDWIDTH`].
        if_bandwidth, set_if_bandwidth: i64;
    }

    pub fn name(&self) -> &str {
        self.instrument.name()
    }

    pub fn controls(&self) -> &Hp8753eControls {
        &self.controls
    }

    pub fn acquisition(&self) -> &AcquisitionSettings {
        &self.acquisition
    }

    pub fn sweep_state(&self) -> SweepState {
        self.sweep_state
    }

    /// Raw access for commands without a typed wrapper.
    pub fn instrument(&mut self) -> &mut Instrument {
        &mut self.instrument
    }

    // -------------------------------------------------------------------------
    // Identity
    // -------------------------------------------------------------------------

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

    /// `OUTPSERN`, queried once per handle.
    pub async fn serial_number(&mut self) -> ScpiResult<String> {
        self.instrument.memoized(&self.controls.serial_number).await
    }

    /// `OUTPOPTS`, queried once per handle.
    pub async fn options(&mut self) -> ScpiResult<String> {
        self.instrument.memoized(&self.controls.options).await
    }

    // -------------------------------------------------------------------------
    // Actions
    // -------------------------------------------------------------------------

    /// `*RST`. May turn the RF output on.
    pub async fn reset(&mut self) -> ScpiResult<()> {
        self.sweep_state = SweepState::Idle;
        self.instrument.reset().await
    }

    /// Let the analyzer pick the fastest sweep time (`SWEA`).
    pub async fn set_sweep_time_fastest(&mut self) -> ScpiResult<()> {
        self.instrument.write("SWEA").await
    }

    /// Sweep a single frequency: start = stop = `frequency`, 3 points.
    pub async fn set_fixed_frequency(&mut self, frequency: f64) -> ScpiResult<()> {
        self.set_start_frequency(frequency).await?;
        self.set_stop_frequency(frequency).await?;
        self.set_scan_points(3).await
    }

    /// The active parameter: the first of `S11? S12? S21? S22? A? B? R?`
    /// answered with 1.
    pub async fn measuring_parameter(&mut self) -> ScpiResult<Option<MeasuringParameter>> {
        for parameter in MeasuringParameter::ALL {
            let command = format!("{parameter}?");
            let reply = self.instrument.ask(&command).await?;
            if scpi::parse_int_via_float(&command, &reply)? == 1 {
                return Ok(Some(parameter));
            }
        }
        Ok(None)
    }

    pub async fn set_measuring_parameter(&mut self, parameter: MeasuringParameter) -> ScpiResult<()> {
        self.instrument.write(parameter.as_str()).await
    }

    /// Turn the RF output off.
    pub async fn shutdown(&mut self) -> ScpiResult<()> {
        self.set_output_enabled(false).await
    }

    /// `AVERREST`.
    pub async fn averaging_restart(&mut self) -> ScpiResult<()> {
        self.instrument.write("AVERREST").await
    }

    /// `EMIB`.
    pub async fn emit_beep(&mut self) -> ScpiResult<()> {
        self.instrument.write("EMIB").await
    }

    // -------------------------------------------------------------------------
    // Sweeps
    // -------------------------------------------------------------------------

    /// Trigger a sweep without waiting for it.
    pub async fn scan_single(&mut self) -> ScpiResult<()> {
        let averages = self.active_averages().await?;
        self.trigger(averages).await
    }

    /// Trigger a sweep and wait until it completes, or until
    /// `(sweep_time + margin) × averages` has elapsed.
    pub async fn scan(&mut self, margin: Duration) -> ScpiResult<()> {
        let sweep_time = self.sweep_time().await?;
        let averages = self.active_averages().await?;
        let deadline = sweep_deadline(sweep_time, margin, averages)?;

        self.trigger(averages).await?;
        self.sweep_state = SweepState::Polling;

        let result = wait_for_completion(
            &mut self.instrument,
            "NOOP?",
            deadline,
            self.acquisition.poll_interval,
        )
        .await;

        match result {
            Ok(polls) => {
                self.sweep_state = SweepState::Done;
                info!(instrument = %self.instrument.name(), polls, "Sweep done");
                Ok(())
            }
            Err(err) => {
                self.sweep_state = match err {
                    ScpiError::Timeout { .. } => SweepState::TimedOut,
                    _ => SweepState::Idle,
                };
                Err(err)
            }
        }
    }

    /// Complex data of the last sweep, one value per scan point.
    ///
    /// Fails with [`ScpiError::Timeout`] if the transfer is not complete
    /// within `timeout`; partial data is discarded.
    pub async fn data_complex(&mut self, timeout: Duration) -> ScpiResult<Vec<Complex64>> {
        let points = point_count(self.scan_points().await?)?;

        self.instrument.write("FORM4").await?;
        self.instrument.write("OUTPDATA").await?;

        read_complex_chunks(
            &mut self.instrument,
            points,
            self.acquisition.chunk_size,
            timeout,
            self.acquisition.poll_interval,
        )
        .await
    }

    /// Frequencies of the current sweep: `scan_points` values spaced
    /// linearly from start to stop.
    pub async fn frequencies(&mut self) -> ScpiResult<Vec<f64>> {
        let start = self.start_frequency().await?;
        let stop = self.stop_frequency().await?;
        let points = point_count(self.scan_points().await?)?;
        Ok(scpi::linspace(start, stop, points))
    }

    async fn active_averages(&mut self) -> ScpiResult<Option<u32>> {
        if !self.averaging_enabled().await? {
            return Ok(None);
        }
        let averages = self.averages().await?;
        Ok(Some(u32::try_from(averages.max(1)).unwrap_or(u32::MAX)))
    }

    async fn trigger(&mut self, averages: Option<u32>) -> ScpiResult<()> {
        let command = match averages {
            Some(count) => format!("NUMG{count}"),
            None => "SING".to_string(),
        };
        self.instrument.write(&command).await?;
        self.sweep_state = SweepState::Triggered;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Access by name
    // -------------------------------------------------------------------------

    /// Attribute names and domains, for listing.
    pub fn attributes(&self) -> Vec<&dyn Attribute> {
        self.controls.all()
    }

    /// Read an attribute by name and render it as text.
    pub async fn get_by_name(&mut self, name: &str, channel: Option<u8>) -> ScpiResult<String> {
        match name {
            "measuring_parameter" => Ok(self
                .measuring_parameter()
                .await?
                .map_or_else(|| "none".to_string(), |p| p.to_string())),
            "serial_number" => self.serial_number().await,
            "options" => self.options().await,
            _ => {
                let found = attribute::find(&self.controls.all(), name)?;
                self.instrument.get_text(found, channel).await
            }
        }
    }

    /// Parse `value` and write it to an attribute by name.
    pub async fn set_by_name(&mut self, name: &str, value: &str, channel: Option<u8>) -> ScpiResult<()> {
        match name {
            "measuring_parameter" => {
                let parameter = value.parse()?;
                self.set_measuring_parameter(parameter).await
            }
            _ => {
                let found = attribute::find(&self.controls.all(), name)?;
                self.instrument.set_text(found, value, channel).await
            }
        }
    }

    pub async fn close(self) -> ScpiResult<()> {
        self.instrument.close().await
    }
}

fn point_count(points: i64) -> ScpiResult<usize> {
    usize::try_from(points).map_err(|_| ScpiError::parse("POIN?", &points.to_string(), "a point count"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_measuring_parameter_from_str() {
        assert_eq!("s21".parse::<MeasuringParameter>().unwrap(), MeasuringParameter::S21);
        assert_eq!("R".parse::<MeasuringParameter>().unwrap(), MeasuringParameter::R);
        assert!(matches!(
            "S33".parse::<MeasuringParameter>(),
            Err(ScpiError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_controls_follow_options() {
        let options = Hp8753eOptions {
            min_frequency: 1e6,
            max_frequency: 3e9,
            min_power: -20.0,
            max_power: 0.0,
            ..Default::default()
        };
        let controls = Hp8753eControls::new(&options);

        assert!(controls.start_frequency.write_command(&5e5, None).is_err());
        assert_eq!(
            controls.start_frequency.write_command(&1e6, None).unwrap(),
            "STAR 1.000000e+06 Hz"
        );
        assert!(controls.span_frequency.write_command(&3e9, None).is_err());
        assert!(controls.power.write_command(&5.0, None).is_err());
        assert_eq!(controls.power.write_command(&-20.0, None).unwrap(), "POWE-2.000e+01");
    }

    #[test]
    fn test_attribute_names_unique() {
        let controls = Hp8753eControls::new(&Hp8753eOptions::default());
        let mut names: Vec<&str> = controls.all().iter().map(|a| a.name()).collect();
        let count = names.len();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), count);
    }

    #[test]
    fn test_point_count() {
        assert_eq!(point_count(201).unwrap(), 201);
        assert!(point_count(-1).is_err());
    }
}
