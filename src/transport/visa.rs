//! VISA transport (GPIB, USB-TMC, LAN) through `visa-rs`.
//!
//! Requires a VISA runtime on the host. The resource manager is kept alive
//! for as long as the session, since closing it closes every session it
//! opened. The configured timeout becomes the session's I/O timeout
//! (`VI_ATTR_TMO_VALUE`).

use super::buffer::{read_chunk, ReceiveBuffer};
use super::{Transport, TransportResult};
use crate::error::TransportError;
use async_trait::async_trait;
use std::ffi::CString;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};
use visa_rs::attribute::AttrTmoValue;
use visa_rs::prelude::*;
use visa_rs::TIMEOUT_IMMEDIATE;

const READ_CHUNK: usize = 4096;

struct Session {
    _rm: DefaultRM,
    instrument: Instrument,
}

/// VISA transport for a single resource string, e.g. `GPIB0::16::INSTR`.
pub struct VisaTransport {
    resource: String,
    timeout: Duration,
    session: Option<Arc<Mutex<Session>>>,
    rx: ReceiveBuffer,
}

fn visa_error(err: visa_rs::Error) -> TransportError {
    TransportError::Other(format!("VISA error: {err}"))
}

fn classify(err: std::io::Error, timeout: Duration) -> TransportError {
    if err.kind() == std::io::ErrorKind::TimedOut || err.to_string().contains("TMO") {
        TransportError::Timeout(timeout)
    } else {
        TransportError::Io(err)
    }
}

impl VisaTransport {
    /// Open `resource` with `timeout` as the VISA I/O timeout.
    pub async fn open(resource: &str, timeout: Duration) -> TransportResult<Self> {
        let name = resource.to_string();
        let session = tokio::task::spawn_blocking(move || -> TransportResult<Session> {
            let rm = DefaultRM::new().map_err(visa_error)?;
            let resource = CString::new(name)
                .map_err(|e| TransportError::Other(format!("Invalid VISA resource: {e}")))?;
            let instrument = rm
                .open(&resource.into(), AccessMode::NO_LOCK, TIMEOUT_IMMEDIATE)
                .map_err(visa_error)?;
            let millis = u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX);
            let tmo = AttrTmoValue::new_checked(millis).ok_or_else(|| {
                TransportError::Other(format!("VISA timeout out of range: {millis} ms"))
            })?;
            instrument.set_attr(tmo).map_err(visa_error)?;
            Ok(Session {
                _rm: rm,
                instrument,
            })
        })
        .await
        .map_err(|e| TransportError::Other(format!("VISA open task failed: {e}")))??;

        info!(resource, timeout = ?timeout, "VISA session opened");

        Ok(Self {
            resource: resource.to_string(),
            timeout,
            session: Some(Arc::new(Mutex::new(session))),
            rx: ReceiveBuffer::new(READ_CHUNK),
        })
    }

    /// Read one chunk from the instrument into the receive buffer.
    async fn fill(&mut self) -> TransportResult<()> {
        let session = self.session.clone().ok_or(TransportError::NotConnected)?;
        let timeout = self.timeout;
        let size = self.rx.chunk_size();
        let chunk = tokio::task::spawn_blocking(move || {
            let mut guard = session.blocking_lock();
            read_chunk(&mut guard.instrument, size).map_err(|e| classify(e, timeout))
        })
        .await
        .map_err(|e| TransportError::Other(format!("VISA I/O task panicked: {e}")))??;

        self.rx.push(&chunk);
        Ok(())
    }
}

#[async_trait]
impl Transport for VisaTransport {
    async fn write(&mut self, command: &str) -> TransportResult<()> {
        let session = self.session.clone().ok_or(TransportError::NotConnected)?;
        let payload = format!("{command}\n");
        debug!(resource = %self.resource, command, "visa write");
        tokio::task::spawn_blocking(move || {
            let mut guard = session.blocking_lock();
            guard.instrument.write_all(payload.as_bytes())?;
            Ok::<_, TransportError>(())
        })
        .await
        .map_err(|e| TransportError::Other(format!("VISA I/O task panicked: {e}")))??;
        self.rx.start_message();
        Ok(())
    }

    async fn read(&mut self) -> TransportResult<String> {
        loop {
            if let Some(reply) = self.rx.take_line() {
                debug!(resource = %self.resource, reply = %reply, "visa read");
                return Ok(reply);
            }
            self.fill().await?;
        }
    }

    async fn read_bytes(&mut self, count: usize) -> TransportResult<Vec<u8>> {
        loop {
            if let Some(bytes) = self.rx.take(count) {
                return Ok(bytes);
            }
            self.fill().await?;
        }
    }

    /// Reads more while the current message is incomplete. A read timeout
    /// counts as no new bytes.
    async fn bytes_available(&mut self) -> TransportResult<usize> {
        if self.rx.needs_fill() {
            match self.fill().await {
                Ok(()) => {}
                Err(err) if err.is_timeout() => {}
                Err(err) => return Err(err),
            }
        }
        Ok(self.rx.len())
    }

    fn description(&self) -> String {
        format!("visa:{}", self.resource)
    }

    async fn close(&mut self) -> TransportResult<()> {
        if self.session.take().is_some() {
            info!(resource = %self.resource, "VISA session closed");
        }
        self.rx.clear();
        Ok(())
    }
}
