//! Tests for sweep polling and chunked transfer on the paused clock.

use num_complex::Complex64;
use scpi_instruments::acquisition::{read_complex_chunks, sweep_deadline, wait_for_completion};
use scpi_instruments::error::ScpiError;
use scpi_instruments::instrument::{IdentityDefaults, Instrument};
use scpi_instruments::transport::MockTransport;
use std::time::Duration;
use tokio::time::Instant;

const DEFAULTS: IdentityDefaults = IdentityDefaults {
    manufacturer: "Test",
    model: "T1",
    description: "Analyzer",
};

const POLL: Duration = Duration::from_millis(1);

async fn instrument(mock: &MockTransport) -> Instrument {
    Instrument::open(Box::new(mock.clone()), DEFAULTS, Some("test".to_string()))
        .await
        .unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_immediate_completion() {
    let mock = MockTransport::new().reply("NOOP?", "1");
    let mut inst = instrument(&mock).await;

    let polls = wait_for_completion(&mut inst, "NOOP?", Duration::from_secs(1), POLL)
        .await
        .unwrap();
    assert_eq!(polls, 1);
}

#[tokio::test(start_paused = true)]
async fn test_busy_polls_use_simulated_time() {
    let mock = MockTransport::new()
        .with_timeout(Duration::from_millis(100))
        .reply("NOOP?", "1")
        .busy("NOOP?", 3);
    let mut inst = instrument(&mock).await;

    let start = Instant::now();
    let polls = wait_for_completion(&mut inst, "NOOP?", Duration::from_secs(1), POLL)
        .await
        .unwrap();

    assert_eq!(polls, 4);
    assert_eq!(start.elapsed(), Duration::from_millis(303));
}

#[tokio::test(start_paused = true)]
async fn test_deadline_checked_after_failed_poll() {
    let mock = MockTransport::new()
        .with_timeout(Duration::from_millis(100))
        .busy("NOOP?", 100);
    let mut inst = instrument(&mock).await;

    let err = wait_for_completion(&mut inst, "NOOP?", Duration::from_millis(250), POLL)
        .await
        .unwrap_err();

    match err {
        ScpiError::Timeout { elapsed, .. } => {
            assert_eq!(elapsed, Duration::from_millis(302));
        }
        other => panic!("Expected Timeout, got {other:?}"),
    }
    assert_eq!(mock.count("NOOP?"), 3);
}

#[tokio::test(start_paused = true)]
async fn test_other_errors_end_wait() {
    let mock = MockTransport::new().reply("NOOP?", "1");
    let mut inst = instrument(&mock).await;
    mock.trigger_failure();

    let err = wait_for_completion(&mut inst, "NOOP?", Duration::from_secs(10), POLL)
        .await
        .unwrap_err();
    assert!(matches!(err, ScpiError::Transport(_)));
    assert!(mock.written().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_chunks_parsed_in_order() {
    let chunks = vec![
        format!("{:<49}\n", "1.0E+00,0.0E+00").into_bytes(),
        format!("{:<49}\n", "-5.0E-01,2.5E-01").into_bytes(),
    ];
    let mock = MockTransport::new().stream_on("OUTPDATA", chunks);
    let mut inst = instrument(&mock).await;
    inst.write("OUTPDATA").await.unwrap();

    let data = read_complex_chunks(&mut inst, 2, 50, Duration::from_secs(1), POLL)
        .await
        .unwrap();
    assert_eq!(data, vec![Complex64::new(1.0, 0.0), Complex64::new(-0.5, 0.25)]);
}

#[tokio::test(start_paused = true)]
async fn test_zero_points_returns_immediately() {
    let mock = MockTransport::new();
    let mut inst = instrument(&mock).await;

    let data = read_complex_chunks(&mut inst, 0, 50, Duration::from_secs(1), POLL)
        .await
        .unwrap();
    assert!(data.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_zero_chunk_size_rejected() {
    let mock = MockTransport::new();
    let mut inst = instrument(&mock).await;

    let err = read_complex_chunks(&mut inst, 3, 0, Duration::from_secs(1), POLL)
        .await
        .unwrap_err();
    assert!(matches!(err, ScpiError::InvalidValue { .. }));
}

#[tokio::test(start_paused = true)]
async fn test_malformed_chunk_fails() {
    let mock = MockTransport::new().stream_on("OUTPDATA", vec![vec![b'x'; 50]]);
    let mut inst = instrument(&mock).await;
    inst.write("OUTPDATA").await.unwrap();

    let err = read_complex_chunks(&mut inst, 1, 50, Duration::from_secs(1), POLL)
        .await
        .unwrap_err();
    assert!(matches!(err, ScpiError::Parse { .. }));
}

#[test]
fn test_deadline_saturates() {
    let deadline = sweep_deadline(1e12, Duration::from_secs(10), Some(u32::MAX)).unwrap();
    assert_eq!(deadline, Duration::MAX);
}
