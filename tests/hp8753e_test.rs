//! Integration tests for the HP 8753E driver against the mock transport.
//!
//! All tests run on tokio's paused clock, so sweep and transfer deadlines
//! are deterministic.

use num_complex::Complex64;
use scpi_instruments::acquisition::SweepState;
use scpi_instruments::drivers::{Hp8753e, Hp8753eOptions, MeasuringParameter};
use scpi_instruments::error::ScpiError;
use scpi_instruments::transport::MockTransport;
use std::time::Duration;

async fn open_vna(mock: &MockTransport) -> Hp8753e {
    let options = Hp8753eOptions {
        name: Some("vna".to_string()),
        ..Default::default()
    };
    Hp8753e::open(Box::new(mock.clone()), options).await.unwrap()
}

/// One streamed point: `real,imag` padded to 50 bytes.
fn point(re: f64, im: f64) -> Vec<u8> {
    let mut text = format!("{re:.9E},{im:.9E}");
    while text.len() < 49 {
        text.push(' ');
    }
    text.push('\n');
    text.into_bytes()
}

// =============================================================================
// Attributes
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_out_of_range_values_rejected_without_io() {
    let mock = MockTransport::new();
    let mut vna = open_vna(&mock).await;

    let err = vna.set_start_frequency(10.0).await.unwrap_err();
    match err {
        ScpiError::InvalidValue {
            attribute,
            expected,
            ..
        } => {
            assert_eq!(attribute, "start_frequency");
            assert!(expected.contains("30000"), "{expected}");
        }
        other => panic!("Expected InvalidValue, got {other:?}"),
    }

    // Just outside each bound of every numeric attribute
    let cases = [
        ("start_frequency", "2.9999e4", "6.0001e9"),
        ("stop_frequency", "2.9999e4", "6.0001e9"),
        ("center_frequency", "2.9999e4", "6.0001e9"),
        ("span_frequency", "-1", "5.99998e9"),
        ("sweep_time", "0.009", "36400.1"),
        ("averages", "0", "1000"),
        ("power", "-70.1", "10.1"),
        ("scan_points", "2", "1602"),
        ("if_bandwidth", "9", "6001"),
    ];
    for (name, below, above) in cases {
        for value in [below, above] {
            let result = vna.set_by_name(name, value, None).await;
            assert!(
                matches!(result, Err(ScpiError::InvalidValue { .. })),
                "{name} = {value}: {result:?}"
            );
        }
    }

    assert!(vna.set_sweep_time(0.0).await.is_err());
    assert!(vna.set_span_frequency(6.0e9).await.is_err());
    assert!(mock.written().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_start_frequency_round_trip() {
    let mock = MockTransport::new().echo("STAR?", "STAR", "3.000000E+04");
    let mut vna = open_vna(&mock).await;

    assert_eq!(vna.start_frequency().await.unwrap(), 30e3);
    vna.set_start_frequency(1.5e9).await.unwrap();
    assert_eq!(vna.start_frequency().await.unwrap(), 1.5e9);
    assert!(mock.written().contains(&"STAR 1.500000e+09 Hz".to_string()));
}

#[tokio::test(start_paused = true)]
async fn test_numeric_attributes_echo() {
    let cases = [
        ("start_frequency", "STAR?", "STAR", "1.5e9"),
        ("stop_frequency", "STOP?", "STOP", "2.25e9"),
        ("center_frequency", "CENT?", "CENT", "1e9"),
        ("span_frequency", "SPAN?", "SPAN", "5e8"),
        ("sweep_time", "SWET?", "SWET", "0.25"),
        ("averages", "AVERFACT?", "AVERFACT", "16"),
        ("power", "POWE?", "POWE", "-10"),
        ("scan_points", "POIN?", "POIN", "401"),
        ("if_bandwidth", "IFBW?", "IFBW", "3700"),
    ];
    let mock = cases
        .iter()
        .fold(MockTransport::new(), |mock, (_, query, prefix, _)| {
            mock.echo(query, prefix, "0")
        });
    let mut vna = open_vna(&mock).await;

    for (name, _, _, value) in cases {
        vna.set_by_name(name, value, None).await.unwrap();
        let read: f64 = vna.get_by_name(name, None).await.unwrap().parse().unwrap();
        assert_eq!(read, value.parse::<f64>().unwrap(), "{name}");
    }
}

#[tokio::test(start_paused = true)]
async fn test_exponential_write_formats() {
    let mock = MockTransport::new();
    let mut vna = open_vna(&mock).await;

    vna.set_sweep_time(0.25).await.unwrap();
    vna.set_power(-10.0).await.unwrap();
    vna.set_scan_points(401).await.unwrap();
    vna.set_if_bandwidth(3000).await.unwrap();

    assert_eq!(
        mock.written(),
        vec!["SWET2.50e-01", "POWE-1.000e+01", "POIN401", "IFBW3000"]
    );
}

#[tokio::test(start_paused = true)]
async fn test_boolean_switches() {
    let mock = MockTransport::new()
        .reply("AVERO?", "1")
        .reply("CORR?", "0")
        .reply("HOLD?", "1");
    let mut vna = open_vna(&mock).await;

    assert!(vna.averaging_enabled().await.unwrap());
    assert!(!vna.correction_enabled().await.unwrap());
    assert!(vna.trigger_hold().await.unwrap());

    mock.clear_written();
    vna.set_averaging_enabled(false).await.unwrap();
    vna.set_trigger_hold(true).await.unwrap();
    vna.set_trigger_continuous(true).await.unwrap();
    vna.shutdown().await.unwrap();

    assert_eq!(mock.written(), vec!["AVERO0", "HOLD", "CONT", "SOUP0"]);
}

#[tokio::test(start_paused = true)]
async fn test_unparseable_reply() {
    let mock = MockTransport::new().reply("STOP?", "banana");
    let mut vna = open_vna(&mock).await;

    let err = vna.stop_frequency().await.unwrap_err();
    assert!(matches!(err, ScpiError::Parse { .. }));
}

#[tokio::test(start_paused = true)]
async fn test_access_by_name() {
    let mock = MockTransport::new().echo("POIN?", "POIN", "201");
    let mut vna = open_vna(&mock).await;

    vna.set_by_name("scan_points", "801", None).await.unwrap();
    assert_eq!(vna.get_by_name("scan_points", None).await.unwrap(), "801");
    assert!(matches!(
        vna.set_by_name("scan_points", "802", None).await,
        Err(ScpiError::InvalidValue { .. })
    ));
    assert!(matches!(
        vna.get_by_name("bogus", None).await,
        Err(ScpiError::UnknownAttribute(_))
    ));
    assert!(matches!(
        vna.set_by_name("serial_number", "1234", None).await,
        Err(ScpiError::NotWritable(_))
    ));
}

// =============================================================================
// Identity
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_identity_queried_once() {
    let mock = MockTransport::new().reply("*IDN?", "HEWLETT PACKARD,8753E,0,7.10");
    let mut vna = Hp8753e::open(Box::new(mock.clone()), Hp8753eOptions::default())
        .await
        .unwrap();

    assert_eq!(vna.name(), "HEWLETT PACKARD 8753E Vector Network Analyzer");
    assert_eq!(vna.manufacturer().await.unwrap(), "HEWLETT PACKARD");
    assert_eq!(vna.model().await.unwrap(), "8753E");
    assert_eq!(vna.firmware().await.unwrap(), "7.10");
    assert_eq!(mock.count("*IDN?"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_serial_number_memoized() {
    let mock = MockTransport::new()
        .reply("OUTPSERN", "\"3410A01234\"")
        .reply("OUTPOPTS", "\"002 006 010\"");
    let mut vna = open_vna(&mock).await;

    assert_eq!(vna.serial_number().await.unwrap(), "3410A01234");
    assert_eq!(vna.serial_number().await.unwrap(), "3410A01234");
    assert_eq!(vna.get_by_name("options", None).await.unwrap(), "002 006 010");
    assert_eq!(mock.count("OUTPSERN"), 1);
    assert_eq!(mock.count("OUTPOPTS"), 1);
}

// =============================================================================
// Actions
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_measuring_parameter() {
    let mock = MockTransport::new()
        .reply("S11?", "0")
        .reply("S12?", "0")
        .reply("S21?", "1");
    let mut vna = open_vna(&mock).await;

    assert_eq!(
        vna.measuring_parameter().await.unwrap(),
        Some(MeasuringParameter::S21)
    );
    assert_eq!(mock.count("S22?"), 0);

    vna.set_by_name("measuring_parameter", "s22", None).await.unwrap();
    assert_eq!(mock.written().last().unwrap(), "S22");
}

#[tokio::test(start_paused = true)]
async fn test_fixed_frequency() {
    let mock = MockTransport::new();
    let mut vna = open_vna(&mock).await;

    vna.set_fixed_frequency(1e9).await.unwrap();
    assert_eq!(
        mock.written(),
        vec!["STAR 1.000000e+09 Hz", "STOP 1.000000e+09 Hz", "POIN3"]
    );
}

#[tokio::test(start_paused = true)]
async fn test_reset_returns_to_idle() {
    let mock = MockTransport::new();
    let mut vna = open_vna(&mock).await;

    let start = tokio::time::Instant::now();
    vna.reset().await.unwrap();
    assert!(start.elapsed() >= Duration::from_millis(250));
    assert_eq!(vna.sweep_state(), SweepState::Idle);
    assert_eq!(mock.written(), vec!["*RST"]);
}

#[tokio::test(start_paused = true)]
async fn test_frequencies_linear() {
    let mock = MockTransport::new()
        .reply("STAR?", "1.0E+09")
        .reply("STOP?", "2.0E+09")
        .reply("POIN?", "3");
    let mut vna = open_vna(&mock).await;

    assert_eq!(vna.frequencies().await.unwrap(), vec![1.0e9, 1.5e9, 2.0e9]);
}

// =============================================================================
// Sweeps
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_scan_succeeds_after_busy_polls() {
    let mock = MockTransport::new()
        .reply("SWET?", "1.00e-01")
        .reply("AVERO?", "0")
        .reply("NOOP?", "1")
        .busy("NOOP?", 5);
    let mut vna = open_vna(&mock).await;

    vna.scan(Duration::from_secs(1)).await.unwrap();

    assert_eq!(vna.sweep_state(), SweepState::Done);
    assert_eq!(mock.count("SING"), 1);
    assert_eq!(mock.count("NOOP?"), 6);
}

#[tokio::test(start_paused = true)]
async fn test_scan_with_averaging_uses_group_trigger() {
    let mock = MockTransport::new()
        .reply("SWET?", "1.00e-01")
        .reply("AVERO?", "1")
        .reply("AVERFACT?", "4")
        .reply("NOOP?", "1")
        .busy("NOOP?", 2);
    let mut vna = open_vna(&mock).await;

    vna.scan(Duration::ZERO).await.unwrap();

    assert_eq!(mock.count("NUMG4"), 1);
    assert_eq!(mock.count("SING"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_scan_times_out() {
    let mock = MockTransport::new()
        .reply("SWET?", "1.00e-02")
        .reply("AVERO?", "0")
        .busy("NOOP?", 10_000);
    let mut vna = open_vna(&mock).await;

    let start = tokio::time::Instant::now();
    let err = vna.scan(Duration::ZERO).await.unwrap_err();

    match err {
        ScpiError::Timeout {
            operation,
            deadline,
            elapsed,
        } => {
            assert_eq!(operation, "sweep");
            assert_eq!(deadline, Duration::from_millis(10));
            assert!(elapsed > deadline);
        }
        other => panic!("Expected Timeout, got {other:?}"),
    }
    assert_eq!(vna.sweep_state(), SweepState::TimedOut);
    assert!(start.elapsed() < Duration::from_millis(100));
    assert!(mock.count("NOOP?") < 10);
}

#[tokio::test(start_paused = true)]
async fn test_scan_single_does_not_wait() {
    let mock = MockTransport::new().reply("AVERO?", "0");
    let mut vna = open_vna(&mock).await;

    vna.scan_single().await.unwrap();
    assert_eq!(vna.sweep_state(), SweepState::Triggered);
    assert_eq!(mock.count("NOOP?"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_data_complex_streams_in_increments() {
    let expected = [
        Complex64::new(0.5, -0.25),
        Complex64::new(-1.25e-3, 2.0e-2),
        Complex64::new(0.0, 1.0),
    ];
    let bytes: Vec<u8> = expected.iter().flat_map(|c| point(c.re, c.im)).collect();
    let increments = bytes.chunks(20).map(<[u8]>::to_vec).collect();

    let mock = MockTransport::new()
        .reply("POIN?", "3")
        .stream_on("OUTPDATA", increments);
    let mut vna = open_vna(&mock).await;

    let data = vna.data_complex(Duration::from_secs(1)).await.unwrap();

    assert_eq!(data, expected);
    assert_eq!(mock.written(), vec!["POIN?", "FORM4", "OUTPDATA"]);
}

#[tokio::test(start_paused = true)]
async fn test_data_complex_discards_partial_transfer() {
    let mut bytes = point(0.5, 0.5);
    bytes.extend_from_slice(&point(0.25, 0.25)[..20]);

    let mock = MockTransport::new()
        .reply("POIN?", "3")
        .stream_on("OUTPDATA", vec![bytes]);
    let mut vna = open_vna(&mock).await;

    let err = vna
        .data_complex(Duration::from_millis(100))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ScpiError::Timeout {
            operation: "data transfer",
            ..
        }
    ));
}
