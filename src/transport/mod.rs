//! Byte-level links to instruments.
//!
//! A [`Transport`] moves SCPI text and raw bytes. It knows nothing about
//! attributes or instruments; the [`Instrument`](crate::instrument::Instrument)
//! handle owns one exclusively.
//!
//! Implementations:
//!
//! - [`SerialTransport`]: RS-232 / USB-serial through `serialport`
//! - [`PrologixTransport`]: GPIB through a Prologix GPIB-USB controller
//! - [`VisaTransport`]: any VISA resource (feature `instrument_visa`)
//! - [`MockTransport`]: scripted replies for tests

use crate::config::TransportConfig;
use crate::error::{ScpiError, ScpiResult, TransportError};
use async_trait::async_trait;

#[cfg(any(feature = "instrument_visa", test))]
mod buffer;
pub mod mock;
#[cfg(feature = "instrument_serial")]
pub mod prologix;
#[cfg(feature = "instrument_serial")]
pub mod serial;
#[cfg(feature = "instrument_visa")]
pub mod visa;

pub use mock::MockTransport;
#[cfg(feature = "instrument_serial")]
pub use prologix::PrologixTransport;
#[cfg(feature = "instrument_serial")]
pub use serial::SerialTransport;
#[cfg(feature = "instrument_visa")]
pub use visa::VisaTransport;

/// Result type for transport operations.
pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// A bidirectional link to one instrument.
///
/// `read` and `read_bytes` give up with [`TransportError::Timeout`] after the
/// transport's own read timeout. Callers that poll treat that as transient.
#[async_trait]
pub trait Transport: Send {
    /// Send one command. The transport appends its write terminator.
    async fn write(&mut self, command: &str) -> TransportResult<()>;

    /// Read one reply, without its terminator.
    async fn read(&mut self) -> TransportResult<String>;

    /// Read exactly `count` raw bytes.
    async fn read_bytes(&mut self, count: usize) -> TransportResult<Vec<u8>>;

    /// Bytes received and not yet consumed.
    async fn bytes_available(&mut self) -> TransportResult<usize>;

    /// Short description for logs, e.g. `serial:/dev/ttyUSB0@9600`.
    fn description(&self) -> String;

    /// Release the link. Further calls may fail with `NotConnected`.
    async fn close(&mut self) -> TransportResult<()> {
        Ok(())
    }
}

/// Open the transport described by `config`.
pub async fn open(config: &TransportConfig) -> ScpiResult<Box<dyn Transport>> {
    match config {
        #[cfg(feature = "instrument_serial")]
        TransportConfig::Serial {
            port,
            baud_rate,
            timeout,
            write_termination,
            read_termination,
        } => {
            let transport = SerialTransport::builder(port.clone(), *baud_rate)
                .with_timeout(*timeout)
                .with_line_terminator(write_termination.clone())
                .with_response_delimiter(*read_termination)
                .open()
                .await?;
            Ok(Box::new(transport))
        }
        #[cfg(feature = "instrument_serial")]
        TransportConfig::Prologix {
            port,
            address,
            baud_rate,
            timeout,
        } => {
            let transport = PrologixTransport::open(port, *address, *baud_rate, *timeout).await?;
            Ok(Box::new(transport))
        }
        #[cfg(not(feature = "instrument_serial"))]
        TransportConfig::Serial { .. } | TransportConfig::Prologix { .. } => {
            Err(ScpiError::FeatureNotEnabled("instrument_serial".to_string()))
        }
        #[cfg(feature = "instrument_visa")]
        TransportConfig::Visa { resource, timeout } => {
            let transport = VisaTransport::open(resource, *timeout).await?;
            Ok(Box::new(transport))
        }
        #[cfg(not(feature = "instrument_visa"))]
        TransportConfig::Visa { .. } => {
            Err(ScpiError::FeatureNotEnabled("instrument_visa".to_string()))
        }
    }
}
