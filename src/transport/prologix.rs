//! GPIB through a Prologix GPIB-USB controller.
//!
//! The controller shows up as a serial port. Lines starting with `++` are
//! controller commands; everything else is forwarded to the addressed
//! instrument. The transport runs the controller with `++auto 0` and asks
//! for a reply explicitly (`++read eoi`) so plain writes never make the
//! instrument talk.

use super::serial::SerialTransport;
use super::{Transport, TransportResult};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info};

const ESC: char = '\u{1b}';

/// Prefix every `+`, CR, LF and ESC in `payload` with ESC so the controller
/// forwards them instead of interpreting them.
pub fn escape_payload(payload: &str) -> String {
    let mut escaped = String::with_capacity(payload.len());
    for ch in payload.chars() {
        if matches!(ch, '+' | '\r' | '\n' | ESC) {
            escaped.push(ESC);
        }
        escaped.push(ch);
    }
    escaped
}

/// Controller commands sent on open.
pub fn setup_commands(address: u8, timeout: Duration) -> Vec<String> {
    // ++read_tmo_ms accepts 1..=3000
    let read_timeout = timeout.as_millis().clamp(1, 3000);
    vec![
        "++mode 1".to_string(),
        format!("++addr {address}"),
        "++auto 0".to_string(),
        "++eoi 1".to_string(),
        "++eos 2".to_string(),
        "++eot_enable 0".to_string(),
        format!("++read_tmo_ms {read_timeout}"),
    ]
}

/// Prologix GPIB-USB transport over `link`, normally the controller's
/// serial port.
pub struct PrologixTransport<T: Transport = SerialTransport> {
    link: T,
    address: u8,
    read_requested: bool,
}

impl PrologixTransport<SerialTransport> {
    /// Open the controller on `port` and address the instrument at `address`.
    pub async fn open(
        port: &str,
        address: u8,
        baud_rate: u32,
        timeout: Duration,
    ) -> TransportResult<Self> {
        let serial = SerialTransport::builder(port.to_string(), baud_rate)
            .with_timeout(timeout)
            .open()
            .await?;
        let transport = Self::attach(serial, address, timeout).await?;
        info!(port, address, "Prologix controller configured");
        Ok(transport)
    }
}

impl<T: Transport> PrologixTransport<T> {
    /// Configure the controller behind an already open `link`.
    pub async fn attach(mut link: T, address: u8, timeout: Duration) -> TransportResult<Self> {
        for command in setup_commands(address, timeout) {
            link.write(&command).await?;
        }
        Ok(Self {
            link,
            address,
            read_requested: false,
        })
    }

    /// Ask the controller to fetch a reply, once per written command.
    async fn request_read(&mut self) -> TransportResult<()> {
        if !self.read_requested {
            self.link.write("++read eoi").await?;
            self.read_requested = true;
        }
        Ok(())
    }
}

#[async_trait]
impl<T: Transport> Transport for PrologixTransport<T> {
    async fn write(&mut self, command: &str) -> TransportResult<()> {
        debug!(address = self.address, command, "gpib write");
        self.read_requested = false;
        self.link.write(&escape_payload(command)).await
    }

    async fn read(&mut self) -> TransportResult<String> {
        self.request_read().await?;
        let reply = self.link.read().await;
        self.read_requested = false;
        reply
    }

    async fn read_bytes(&mut self, count: usize) -> TransportResult<Vec<u8>> {
        self.request_read().await?;
        self.link.read_bytes(count).await
    }

    async fn bytes_available(&mut self) -> TransportResult<usize> {
        self.request_read().await?;
        self.link.bytes_available().await
    }

    fn description(&self) -> String {
        format!("prologix:{}#{}", self.link.description(), self.address)
    }

    async fn close(&mut self) -> TransportResult<()> {
        self.link.close().await
    }
}
