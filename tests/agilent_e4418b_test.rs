//! Integration tests for the Agilent E4418B/E4419B power meter driver.

use scpi_instruments::drivers::{AgilentE4418b, AgilentE4418bOptions, PowerUnit};
use scpi_instruments::error::ScpiError;
use scpi_instruments::transport::MockTransport;

async fn open_meter(mock: &MockTransport, channels: u8) -> AgilentE4418b {
    let options = AgilentE4418bOptions {
        name: Some("meter".to_string()),
        channels,
        ..Default::default()
    };
    AgilentE4418b::open(Box::new(mock.clone()), options).await.unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_channel_addressing() {
    let mock = MockTransport::new();
    let mut meter = open_meter(&mock, 2).await;

    meter.channel(2).unwrap().set_frequency(1e9).await.unwrap();
    meter.channel(1).unwrap().set_averaging_enabled(true).await.unwrap();

    assert_eq!(
        mock.written(),
        vec!["SENS2:FREQ 1.000000e+09", "SENS1:AVER ON"]
    );
}

#[tokio::test(start_paused = true)]
async fn test_invalid_channel_rejected_without_io() {
    let mock = MockTransport::new();
    let mut meter = open_meter(&mock, 1).await;

    assert!(matches!(
        meter.channel(2),
        Err(ScpiError::InvalidChannel {
            channel: 2,
            available: 1,
            ..
        })
    ));
    assert!(matches!(
        meter.channel(0),
        Err(ScpiError::InvalidChannel { .. })
    ));
    assert!(matches!(
        meter.set_by_name("frequency", "1e9", Some(2)).await,
        Err(ScpiError::InvalidChannel { .. })
    ));
    assert!(mock.written().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_too_many_channels_rejected() {
    let options = AgilentE4418bOptions {
        name: Some("meter".to_string()),
        channels: 3,
        ..Default::default()
    };
    let err = AgilentE4418b::open(Box::new(MockTransport::new()), options)
        .await
        .unwrap_err();
    assert!(matches!(err, ScpiError::Configuration(_)));
}

#[tokio::test(start_paused = true)]
async fn test_power_measurement() {
    let mock = MockTransport::new()
        .reply("FETC1?", "-1.234500E+01")
        .reply("FETC2?", "+3.000000E-03");
    let mut meter = open_meter(&mock, 2).await;

    assert_eq!(meter.channel(1).unwrap().power().await.unwrap(), -12.345);
    assert_eq!(meter.channel(2).unwrap().power().await.unwrap(), 3.0e-3);
    assert_eq!(meter.get_by_name("power", None).await.unwrap(), "-12.345");
    assert_eq!(mock.count("FETC1?"), 2);
}

#[tokio::test(start_paused = true)]
async fn test_window_units() {
    let mock = MockTransport::new().reply("UNIT1:POW?", "DBM").reply("UNIT2:POW?", "W");
    let mut meter = open_meter(&mock, 1).await;

    assert_eq!(meter.upper_window_unit().await.unwrap(), PowerUnit::Dbm);
    assert_eq!(meter.lower_window_unit().await.unwrap(), PowerUnit::Watt);

    mock.clear_written();
    meter.set_upper_window_unit(PowerUnit::Watt).await.unwrap();
    meter.set_by_name("lower_window_unit", "dbm", None).await.unwrap();
    assert_eq!(mock.written(), vec!["UNIT1:POW W", "UNIT2:POW DBM"]);
}

#[tokio::test(start_paused = true)]
async fn test_offset_is_not_scaled() {
    let mock = MockTransport::new().echo("SENS1:CORR:LOSS2?", "SENS1:CORR:LOSS2 ", "+0.000000E+00");
    let mut meter = open_meter(&mock, 1).await;

    let mut sensor = meter.channel(1).unwrap();
    sensor.set_offset(5.0).await.unwrap();
    assert_eq!(sensor.offset().await.unwrap(), 5.0);
    assert!(sensor.set_offset(150.0).await.is_err());
    assert_eq!(mock.count("SENS1:CORR:LOSS2 5.000000e+00"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_averaging_bounds_and_states() {
    let mock = MockTransport::new()
        .reply("SENS1:AVER?", "1")
        .reply("SENS1:CORR:LOSS2:STAT?", "OFF");
    let mut meter = open_meter(&mock, 1).await;
    let mut sensor = meter.channel(1).unwrap();

    assert!(sensor.averaging_enabled().await.unwrap());
    assert!(!sensor.offset_enabled().await.unwrap());
    assert!(sensor.set_average_count(0).await.is_err());
    assert!(sensor.set_average_count(1025).await.is_err());
    sensor.set_average_count(1024).await.unwrap();
    assert_eq!(mock.written().last().unwrap(), "SENS1:AVER:COUN 1024");
}

#[tokio::test(start_paused = true)]
async fn test_zero_and_calibrate() {
    let mock = MockTransport::new();
    let mut meter = open_meter(&mock, 2).await;

    let mut sensor = meter.channel(2).unwrap();
    assert_eq!(sensor.index(), 2);
    sensor.zero().await.unwrap();
    sensor.calibrate().await.unwrap();
    assert_eq!(mock.written(), vec!["CAL2:ZERO:AUTO ONCE", "CAL2:AUTO ONCE"]);
}

#[tokio::test(start_paused = true)]
async fn test_identity_fallback_name() {
    let mock = MockTransport::new().reply("*IDN?", "E4418B");
    let meter = AgilentE4418b::open(Box::new(mock.clone()), AgilentE4418bOptions::default())
        .await
        .unwrap();

    assert_eq!(meter.name(), "Agilent E4418B Power Meter");
    assert_eq!(meter.channel_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_id_blanks_serial_field() {
    let mock = MockTransport::new()
        .reply("*IDN?", "Agilent Technologies,E4419B,GB41292471,A1.07.02");
    let mut meter = open_meter(&mock, 2).await;

    assert_eq!(
        meter.id().await.unwrap(),
        vec!["Agilent Technologies", "E4419B", "", "A1.07.02"]
    );
}

#[tokio::test(start_paused = true)]
async fn test_attribute_listing() {
    let mock = MockTransport::new();
    let meter = open_meter(&mock, 2).await;

    let names: Vec<&str> = meter.attributes().iter().map(|a| a.name()).collect();
    assert!(names.contains(&"upper_window_unit"));
    assert!(names.contains(&"average_count"));
    assert!(names.contains(&"power"));
}
