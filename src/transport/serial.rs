//! RS-232 / USB-serial transport.
//!
//! Wraps a blocking `serialport` handle. Every operation runs on Tokio's
//! blocking pool with the port behind an `Arc<Mutex<_>>`.

use super::{Transport, TransportResult};
use crate::error::TransportError;
use async_trait::async_trait;
use serialport::SerialPort;
use std::io::{Read, Write};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Poll granularity of the underlying port; the overall read timeout is
/// enforced on top of it.
const PORT_POLL_TIMEOUT: Duration = Duration::from_millis(100);

type SharedPort = Arc<Mutex<Box<dyn SerialPort>>>;

/// Builder for [`SerialTransport`].
///
/// # Example
/// ```no_run
/// # async fn example() -> Result<(), scpi_instruments::error::TransportError> {
/// use std::time::Duration;
/// use scpi_instruments::transport::SerialTransport;
///
/// let transport = SerialTransport::builder("/dev/ttyUSB0".to_string(), 9600)
///     .with_timeout(Duration::from_millis(500))
///     .open()
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct SerialTransportBuilder {
    port_name: String,
    baud_rate: u32,
    timeout: Duration,
    line_terminator: String,
    response_delimiter: char,
}

impl SerialTransportBuilder {
    /// Defaults: 1 s timeout, `"\n"` terminator, `'\n'` delimiter.
    pub fn new(port_name: String, baud_rate: u32) -> Self {
        Self {
            port_name,
            baud_rate,
            timeout: Duration::from_secs(1),
            line_terminator: "\n".to_string(),
            response_delimiter: '\n',
        }
    }

    /// Set the read timeout duration
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the line terminator string for commands
    pub fn with_line_terminator(mut self, terminator: String) -> Self {
        self.line_terminator = terminator;
        self
    }

    /// Set the response delimiter character
    pub fn with_response_delimiter(mut self, delimiter: char) -> Self {
        self.response_delimiter = delimiter;
        self
    }

    /// Open the port.
    pub async fn open(self) -> TransportResult<SerialTransport> {
        let port_name = self.port_name.clone();
        let baud_rate = self.baud_rate;
        let port = tokio::task::spawn_blocking(move || {
            serialport::new(&port_name, baud_rate)
                .timeout(PORT_POLL_TIMEOUT)
                .open()
        })
        .await
        .map_err(|e| TransportError::Other(format!("Serial open task failed: {e}")))?
        .map_err(|e| {
            TransportError::Other(format!(
                "Failed to open serial port '{}' at {} baud: {e}",
                self.port_name, self.baud_rate
            ))
        })?;

        info!(port = %self.port_name, baud = self.baud_rate, "Serial port opened");

        Ok(SerialTransport {
            port_name: self.port_name,
            baud_rate: self.baud_rate,
            timeout: self.timeout,
            line_terminator: self.line_terminator,
            response_delimiter: self.response_delimiter,
            port: Some(Arc::new(Mutex::new(port))),
        })
    }
}

/// Serial transport for RS-232 instruments.
pub struct SerialTransport {
    port_name: String,
    baud_rate: u32,
    timeout: Duration,
    line_terminator: String,
    response_delimiter: char,
    port: Option<SharedPort>,
}

impl SerialTransport {
    /// Start building a transport for `port_name` at `baud_rate`.
    pub fn builder(port_name: String, baud_rate: u32) -> SerialTransportBuilder {
        SerialTransportBuilder::new(port_name, baud_rate)
    }

    /// Read timeout applied to `read` and `read_bytes`.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run `op` against the port on the blocking pool.
    async fn with_port<T, F>(&self, op: F) -> TransportResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut dyn SerialPort) -> TransportResult<T> + Send + 'static,
    {
        let port = self.port.clone().ok_or(TransportError::NotConnected)?;
        tokio::task::spawn_blocking(move || {
            let mut guard = port.blocking_lock();
            op(guard.as_mut())
        })
        .await
        .map_err(|e| TransportError::Other(format!("Serial I/O task panicked: {e}")))?
    }
}

#[async_trait]
impl Transport for SerialTransport {
    async fn write(&mut self, command: &str) -> TransportResult<()> {
        let payload = format!("{command}{}", self.line_terminator);
        debug!(port = %self.port_name, command, "serial write");
        self.with_port(move |port| {
            port.write_all(payload.as_bytes())?;
            port.flush()?;
            Ok(())
        })
        .await
    }

    async fn read(&mut self) -> TransportResult<String> {
        let delimiter = self.response_delimiter;
        let timeout = self.timeout;
        let response = self
            .with_port(move |port| {
                let mut response = String::new();
                let mut buffer = [0u8; 1];
                let start = Instant::now();

                loop {
                    if start.elapsed() > timeout {
                        return Err(TransportError::Timeout(timeout));
                    }

                    match port.read(&mut buffer) {
                        Ok(0) => {
                            return Err(TransportError::Other(
                                "Unexpected EOF from serial port".to_string(),
                            ))
                        }
                        Ok(_) => {
                            let ch = buffer[0] as char;
                            if ch == delimiter {
                                break;
                            }
                            response.push(ch);
                        }
                        // Port timeout is shorter than our overall timeout
                        Err(e) if e.kind() == std::io::ErrorKind::TimedOut => continue,
                        Err(e) => return Err(e.into()),
                    }
                }

                Ok(response.trim_end_matches('\r').to_string())
            })
            .await?;
        debug!(port = %self.port_name, response = %response, "serial read");
        Ok(response)
    }

    async fn read_bytes(&mut self, count: usize) -> TransportResult<Vec<u8>> {
        let timeout = self.timeout;
        self.with_port(move |port| {
            let mut bytes = vec![0u8; count];
            let mut filled = 0;
            let start = Instant::now();

            while filled < count {
                if start.elapsed() > timeout {
                    return Err(TransportError::Timeout(timeout));
                }
                match port.read(&mut bytes[filled..]) {
                    Ok(0) => {
                        return Err(TransportError::Other(
                            "Unexpected EOF from serial port".to_string(),
                        ))
                    }
                    Ok(n) => filled += n,
                    Err(e) if e.kind() == std::io::ErrorKind::TimedOut => continue,
                    Err(e) => return Err(e.into()),
                }
            }
            Ok(bytes)
        })
        .await
    }

    async fn bytes_available(&mut self) -> TransportResult<usize> {
        self.with_port(|port| {
            port.bytes_to_read()
                .map(|n| n as usize)
                .map_err(|e| TransportError::Io(e.into()))
        })
        .await
    }

    fn description(&self) -> String {
        format!("serial:{}@{}", self.port_name, self.baud_rate)
    }

    async fn close(&mut self) -> TransportResult<()> {
        if self.port.take().is_some() {
            info!(port = %self.port_name, "Serial port closed");
        }
        Ok(())
    }
}
