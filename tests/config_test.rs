//! Configuration loading from TOML files.

use scpi_instruments::config::{Settings, TransportConfig};
use scpi_instruments::drivers::DriverKind;
use scpi_instruments::error::ScpiError;
use std::io::Write;
use std::time::Duration;
use tempfile::NamedTempFile;

const CONFIG: &str = r#"
[logging]
level = "debug"
format = "json"

[instruments.vna]
driver = "hp8753e"
query_delay = "20ms"

[instruments.vna.transport]
kind = "prologix"
port = "/dev/ttyUSB0"
address = 16

[instruments.vna.limits]
max_power = 0.0

[instruments.vna.acquisition]
scan_margin = "2s"

[instruments.meter]
driver = "agilent_e4419b"
name = "Bench meter"

[instruments.meter.transport]
kind = "serial"
port = "/dev/ttyS0"
timeout = "500ms"

[instruments.meter.limits]
channels = 2

[instruments.ena]
driver = "keysight_e5071c"
enabled = false

[instruments.ena.transport]
kind = "visa"
resource = "TCPIP0::10.0.0.5::inst0::INSTR"
"#;

fn write_config(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn test_load_full_config() {
    let file = write_config(CONFIG);
    let settings = Settings::load_from(file.path()).unwrap();
    settings.validate().unwrap();

    assert_eq!(settings.logging.format, "json");
    assert_eq!(settings.instruments.len(), 3);

    let vna = settings.instrument("vna").unwrap();
    assert_eq!(vna.driver, DriverKind::Hp8753e);
    assert_eq!(vna.query_delay, Some(Duration::from_millis(20)));
    assert_eq!(vna.limits.max_power, Some(0.0));
    assert_eq!(vna.limits.min_power, None);
    assert_eq!(vna.acquisition.scan_margin, Duration::from_secs(2));
    assert_eq!(vna.acquisition.chunk_size, 50);
    assert_eq!(
        vna.transport,
        TransportConfig::Prologix {
            port: "/dev/ttyUSB0".to_string(),
            address: 16,
            baud_rate: 115_200,
            timeout: Duration::from_secs(3),
        }
    );

    let meter = settings.instrument("meter").unwrap();
    assert_eq!(meter.driver, DriverKind::AgilentE4418b);
    assert_eq!(meter.name.as_deref(), Some("Bench meter"));
    match &meter.transport {
        TransportConfig::Serial {
            baud_rate,
            timeout,
            write_termination,
            read_termination,
            ..
        } => {
            assert_eq!(*baud_rate, 9600);
            assert_eq!(*timeout, Duration::from_millis(500));
            assert_eq!(write_termination, "\n");
            assert_eq!(*read_termination, '\n');
        }
        other => panic!("Expected serial transport, got {other:?}"),
    }
}

#[test]
fn test_enabled_instruments_skip_disabled() {
    let settings = Settings::from_toml_str(CONFIG).unwrap();
    let ids: Vec<&str> = settings.enabled_instruments().into_iter().map(|(id, _)| id).collect();
    assert_eq!(ids, vec!["meter", "vna"]);
}

#[test]
fn test_unknown_driver_fails_to_load() {
    let result = Settings::from_toml_str(
        r#"
[instruments.x]
driver = "hp8720"

[instruments.x.transport]
kind = "visa"
resource = "GPIB0::1::INSTR"
"#,
    );
    assert!(matches!(result, Err(ScpiError::ConfigLoad(_))));
}

#[test]
fn test_missing_file_yields_defaults() {
    // A missing TOML file contributes nothing; defaults still validate.
    let settings = Settings::load_from("/nonexistent/instruments.toml").unwrap();
    assert!(settings.instruments.is_empty());
    assert!(settings.validate().is_ok());
}

#[test]
fn test_invalid_values_rejected_by_validate() {
    let settings = Settings::from_toml_str(
        r#"
[instruments.vna]
driver = "hp8753e"

[instruments.vna.transport]
kind = "prologix"
port = "/dev/ttyUSB0"
address = 40
"#,
    )
    .unwrap();
    let err = settings.validate().unwrap_err();
    assert!(err.contains("GPIB address"), "{err}");
}
