//! Sweep completion and result transfer for network analyzers.
//!
//! Two bounded loops:
//!
//! - [`wait_for_completion`] polls a no-op query until the instrument
//!   answers. While a sweep runs the instrument holds off every reply, so a
//!   transport timeout means "not done yet" and the poll is retried. Any
//!   other error ends the wait.
//! - [`read_complex_chunks`] collects fixed-size ASCII chunks, one
//!   `real,imag` point per chunk, until the expected point count is reached.
//!   Partial data is discarded when the deadline passes.
//!
//! Neither loop caps its iteration count; the deadline is the only bound.

use crate::error::{ScpiError, ScpiResult};
use crate::instrument::Instrument;
use crate::scpi;
use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, trace, warn};

/// Progress of one sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum SweepState {
    /// Nothing triggered yet.
    #[default]
    Idle,
    /// Trigger sent.
    Triggered,
    /// Waiting for the instrument to finish.
    Polling,
    /// The instrument answered the completion query.
    Done,
    /// The deadline passed. A new trigger is needed.
    TimedOut,
}

/// Timing and transfer tuning for sweeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct AcquisitionSettings {
    /// Sleep between polls after a transport timeout, and between
    /// availability checks while streaming.
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,

    /// Bytes per streamed point.
    pub chunk_size: usize,

    /// Added to the sweep time before multiplying by the averaging factor.
    #[serde(with = "humantime_serde")]
    pub scan_margin: Duration,

    /// Deadline for a full data transfer.
    #[serde(with = "humantime_serde")]
    pub transfer_timeout: Duration,
}

impl Default for AcquisitionSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(1),
            chunk_size: 50,
            scan_margin: Duration::from_secs(10),
            transfer_timeout: Duration::from_secs(10),
        }
    }
}

/// `(sweep_time + margin) × averages`, where `averages` is `Some` only when
/// averaging is enabled.
pub fn sweep_deadline(
    sweep_time: f64,
    margin: Duration,
    averages: Option<u32>,
) -> ScpiResult<Duration> {
    let sweep = Duration::try_from_secs_f64(sweep_time).map_err(|_| ScpiError::InvalidValue {
        attribute: "sweep_time".to_string(),
        value: sweep_time.to_string(),
        expected: "a finite, non-negative duration in seconds".to_string(),
    })?;
    let single = sweep.saturating_add(margin);
    Ok(match averages {
        Some(factor) => single.checked_mul(factor.max(1)).unwrap_or(Duration::MAX),
        None => single,
    })
}

/// Send `query` until it is answered, or fail once `deadline` has elapsed.
///
/// Returns the number of polls issued.
pub async fn wait_for_completion(
    instrument: &mut Instrument,
    query: &str,
    deadline: Duration,
    poll_interval: Duration,
) -> ScpiResult<usize> {
    let start = Instant::now();
    let mut polls = 0usize;

    loop {
        polls += 1;
        match instrument.ask(query).await {
            Ok(_) => {
                debug!(polls, elapsed = ?start.elapsed(), "Sweep complete");
                return Ok(polls);
            }
            Err(err) if err.is_transport_timeout() => {
                trace!(polls, "Instrument busy");
            }
            Err(err) => return Err(err),
        }

        let elapsed = start.elapsed();
        if elapsed > deadline {
            warn!(polls, ?deadline, ?elapsed, "Sweep timed out");
            return Err(ScpiError::Timeout {
                operation: "sweep",
                deadline,
                elapsed,
            });
        }
        sleep(poll_interval).await;
    }
}

/// Read `points` chunks of `chunk_size` bytes, each a `real,imag` pair.
pub async fn read_complex_chunks(
    instrument: &mut Instrument,
    points: usize,
    chunk_size: usize,
    timeout: Duration,
    poll_interval: Duration,
) -> ScpiResult<Vec<Complex64>> {
    if chunk_size == 0 {
        return Err(ScpiError::InvalidValue {
            attribute: "chunk_size".to_string(),
            value: "0".to_string(),
            expected: "at least one byte".to_string(),
        });
    }

    let start = Instant::now();
    let mut data = Vec::with_capacity(points);

    while data.len() < points {
        let elapsed = start.elapsed();
        if elapsed > timeout {
            warn!(
                received = data.len(),
                expected = points,
                ?elapsed,
                "Data transfer timed out, discarding partial data"
            );
            return Err(ScpiError::Timeout {
                operation: "data transfer",
                deadline: timeout,
                elapsed,
            });
        }

        if instrument.bytes_available().await? >= chunk_size {
            let chunk = instrument.read_bytes(chunk_size).await?;
            data.push(parse_complex_chunk(&chunk)?);
            trace!(received = data.len(), expected = points, "Chunk received");
        } else {
            sleep(poll_interval).await;
        }
    }

    debug!(points, elapsed = ?start.elapsed(), "Data transfer complete");
    Ok(data)
}

/// Parse one streamed chunk: `real,imag` padded with whitespace or newlines.
pub fn parse_complex_chunk(chunk: &[u8]) -> ScpiResult<Complex64> {
    let text = String::from_utf8_lossy(chunk);
    scpi::parse_complex_pair("OUTPDATA", text.trim_matches(|c: char| c.is_whitespace() || c == '\0'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sweep_deadline() {
        let margin = Duration::from_secs(10);
        assert_eq!(sweep_deadline(2.0, margin, None).unwrap(), Duration::from_secs(12));
        assert_eq!(sweep_deadline(2.0, margin, Some(4)).unwrap(), Duration::from_secs(48));
        assert_eq!(
            sweep_deadline(0.5, Duration::ZERO, Some(3)).unwrap(),
            Duration::from_millis(1500)
        );
        assert!(sweep_deadline(f64::NAN, margin, None).is_err());
        assert!(sweep_deadline(-1.0, margin, None).is_err());
    }

    #[test]
    fn test_parse_complex_chunk() {
        let chunk = b"-1.234500000E-01, 5.000000000E-02\n            ";
        let value = parse_complex_chunk(chunk).unwrap();
        assert_eq!(value, Complex64::new(-0.12345, 0.05));
        assert!(parse_complex_chunk(b"   \n").is_err());
    }

    #[test]
    fn test_default_settings() {
        let settings = AcquisitionSettings::default();
        assert_eq!(settings.chunk_size, 50);
        assert_eq!(settings.poll_interval, Duration::from_millis(1));
        assert_eq!(settings.scan_margin, Duration::from_secs(10));
    }
}
