//! The instrument handle.
//!
//! [`Instrument`] exclusively owns a [`Transport`] and is the only place
//! commands are sent from. It adds:
//!
//! - typed reads and writes through [`Control`] descriptors,
//! - the memoized `*IDN?` identity (queried at most once per handle),
//! - a memo for other identity-like queries (serial number, options),
//! - channel scoping through [`Channel`].
//!
//! All methods take `&mut self`; a handle is used by one task at a time.

use crate::attribute::{render_template, Attribute, Control, ScpiValue};
use crate::error::{ScpiError, ScpiResult};
use crate::scpi;
use crate::transport::Transport;
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Settle time after `*RST`.
pub const RESET_SETTLE: Duration = Duration::from_millis(250);

/// Hardcoded identity used when `*IDN?` cannot be parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdentityDefaults {
    pub manufacturer: &'static str,
    pub model: &'static str,
    /// Appended to manufacturer and model to form the derived display name.
    pub description: &'static str,
}

/// Parsed `*IDN?` reply: `manufacturer,model,serial,firmware`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub manufacturer: String,
    pub model: String,
    pub serial: String,
    pub firmware: String,
}

impl Identity {
    /// Split an `*IDN?` reply. `None` unless there are exactly four fields.
    pub fn parse(reply: &str) -> Option<Self> {
        let mut fields = scpi::split_fields(reply, 4)?.into_iter();
        Some(Self {
            manufacturer: fields.next()?,
            model: fields.next()?,
            serial: fields.next()?,
            firmware: fields.next()?,
        })
    }

    fn fallback(defaults: &IdentityDefaults) -> Self {
        Self {
            manufacturer: defaults.manufacturer.to_string(),
            model: defaults.model.to_string(),
            serial: String::new(),
            firmware: String::new(),
        }
    }
}

/// Handle to one connected instrument.
pub struct Instrument {
    name: String,
    transport: Box<dyn Transport>,
    defaults: IdentityDefaults,
    identity: Option<Identity>,
    memo: HashMap<&'static str, String>,
    query_delay: Option<Duration>,
    channels: u8,
}

impl std::fmt::Debug for Instrument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instrument")
            .field("name", &self.name)
            .field("transport", &self.transport.description())
            .field("identity", &self.identity)
            .field("channels", &self.channels)
            .finish()
    }
}

impl Instrument {
    /// Wrap `transport`. When `name` is `None` the display name is derived
    /// from the instrument's identity, which queries `*IDN?` once.
    pub async fn open(
        transport: Box<dyn Transport>,
        defaults: IdentityDefaults,
        name: Option<String>,
    ) -> ScpiResult<Self> {
        let mut instrument = Self {
            name: name.clone().unwrap_or_default(),
            transport,
            defaults,
            identity: None,
            memo: HashMap::new(),
            query_delay: None,
            channels: 0,
        };

        if name.is_none() {
            let identity = instrument.identity().await?;
            instrument.name = format!(
                "{} {} {}",
                identity.manufacturer, identity.model, defaults.description
            );
        }

        info!(
            name = %instrument.name,
            transport = %instrument.transport.description(),
            "Instrument opened"
        );
        Ok(instrument)
    }

    /// Wait between writing a query and reading its reply.
    pub fn with_query_delay(mut self, delay: Option<Duration>) -> Self {
        self.query_delay = delay;
        self
    }

    /// Number of addressable channels (0 for instruments without channels).
    pub fn with_channels(mut self, channels: u8) -> Self {
        self.channels = channels;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn channel_count(&self) -> u8 {
        self.channels
    }

    pub fn transport_description(&self) -> String {
        self.transport.description()
    }

    // -------------------------------------------------------------------------
    // Raw I/O
    // -------------------------------------------------------------------------

    /// Send one command.
    pub async fn write(&mut self, command: &str) -> ScpiResult<()> {
        debug!(instrument = %self.name, command, "write");
        self.transport.write(command).await?;
        Ok(())
    }

    /// Read one reply.
    pub async fn read(&mut self) -> ScpiResult<String> {
        let reply = self.transport.read().await?;
        debug!(instrument = %self.name, reply = %reply, "read");
        Ok(reply)
    }

    /// Write `command` and read its reply.
    pub async fn ask(&mut self, command: &str) -> ScpiResult<String> {
        self.write(command).await?;
        if let Some(delay) = self.query_delay {
            tokio::time::sleep(delay).await;
        }
        self.read().await
    }

    pub async fn read_bytes(&mut self, count: usize) -> ScpiResult<Vec<u8>> {
        Ok(self.transport.read_bytes(count).await?)
    }

    pub async fn bytes_available(&mut self) -> ScpiResult<usize> {
        Ok(self.transport.bytes_available().await?)
    }

    // -------------------------------------------------------------------------
    // Typed access
    // -------------------------------------------------------------------------

    /// Read an instrument-level attribute.
    pub async fn get<T: ScpiValue>(&mut self, control: &Control<T>) -> ScpiResult<T> {
        self.get_on(control, None).await
    }

    /// Write an instrument-level attribute.
    pub async fn set<T: ScpiValue>(&mut self, control: &Control<T>, value: T) -> ScpiResult<()> {
        self.set_on(control, value, None).await
    }

    /// Read an attribute, filling `{ch}` with `channel`.
    pub async fn get_on<T: ScpiValue>(
        &mut self,
        control: &Control<T>,
        channel: Option<u8>,
    ) -> ScpiResult<T> {
        self.check_channel(channel)?;
        let command = control.query_command(channel)?;
        let reply = self.ask(&command).await?;
        control.parse_reply(&command, &reply)
    }

    /// Validate `value` and write it, filling `{ch}` with `channel`.
    pub async fn set_on<T: ScpiValue>(
        &mut self,
        control: &Control<T>,
        value: T,
        channel: Option<u8>,
    ) -> ScpiResult<()> {
        self.check_channel(channel)?;
        let command = control.write_command(&value, channel)?;
        self.write(&command).await
    }

    /// Read any attribute and render the value as text.
    pub async fn get_text(
        &mut self,
        attribute: &dyn Attribute,
        channel: Option<u8>,
    ) -> ScpiResult<String> {
        self.check_channel(channel)?;
        let command = attribute.query_command(channel)?;
        let reply = self.ask(&command).await?;
        attribute.render_reply(&command, &reply)
    }

    /// Parse `text`, validate it and write it to any attribute.
    pub async fn set_text(
        &mut self,
        attribute: &dyn Attribute,
        text: &str,
        channel: Option<u8>,
    ) -> ScpiResult<()> {
        self.check_channel(channel)?;
        let command = attribute.write_command_from_text(text, channel)?;
        self.write(&command).await
    }

    // -------------------------------------------------------------------------
    // Identity
    // -------------------------------------------------------------------------

    /// Raw `*IDN?` fields. Always queries; refreshes the identity cache when
    /// the reply parses.
    pub async fn id(&mut self) -> ScpiResult<Vec<String>> {
        let reply = self.ask("*IDN?").await?;
        if let Some(identity) = Identity::parse(&reply) {
            self.identity = Some(identity);
        }
        Ok(reply.trim().split(',').map(|f| f.trim().to_string()).collect())
    }

    /// Memoized identity; `*IDN?` is sent at most once per handle.
    ///
    /// A reply that does not split into four fields falls back to the
    /// driver's hardcoded manufacturer and model.
    pub async fn identity(&mut self) -> ScpiResult<Identity> {
        let identity = match self.identity.take() {
            Some(identity) => identity,
            None => {
                let reply = self.ask("*IDN?").await?;
                Identity::parse(&reply).unwrap_or_else(|| {
                    warn!(
                        reply = %reply.trim(),
                        manufacturer = self.defaults.manufacturer,
                        model = self.defaults.model,
                        "Unparseable identity, using driver defaults"
                    );
                    Identity::fallback(&self.defaults)
                })
            }
        };
        self.identity = Some(identity.clone());
        Ok(identity)
    }

    pub async fn manufacturer(&mut self) -> ScpiResult<String> {
        Ok(self.identity().await?.manufacturer)
    }

    pub async fn model(&mut self) -> ScpiResult<String> {
        Ok(self.identity().await?.model)
    }

    pub async fn serial(&mut self) -> ScpiResult<String> {
        Ok(self.identity().await?.serial)
    }

    pub async fn firmware(&mut self) -> ScpiResult<String> {
        Ok(self.identity().await?.firmware)
    }

    /// Read `control` once and serve the cached value afterwards.
    pub async fn memoized(&mut self, control: &Control<String>) -> ScpiResult<String> {
        if let Some(value) = self.memo.get(control.name()) {
            return Ok(value.clone());
        }
        let value = self.get(control).await?;
        self.memo.insert(control.name(), value.clone());
        Ok(value)
    }

    // -------------------------------------------------------------------------
    // Common commands
    // -------------------------------------------------------------------------

    /// `*RST`, then wait for the instrument to settle.
    pub async fn reset(&mut self) -> ScpiResult<()> {
        self.write("*RST").await?;
        tokio::time::sleep(RESET_SETTLE).await;
        info!(instrument = %self.name, "Instrument reset");
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Channels
    // -------------------------------------------------------------------------

    /// Scope subsequent access to channel `index` (1-based).
    pub fn channel(&mut self, index: u8) -> ScpiResult<Channel<'_>> {
        self.check_channel(Some(index))?;
        Ok(Channel {
            instrument: self,
            index,
        })
    }

    fn check_channel(&self, channel: Option<u8>) -> ScpiResult<()> {
        match channel {
            Some(index) if index == 0 || index > self.channels => Err(ScpiError::InvalidChannel {
                instrument: self.name.clone(),
                channel: index,
                available: self.channels,
            }),
            _ => Ok(()),
        }
    }

    /// Close the transport.
    pub async fn close(mut self) -> ScpiResult<()> {
        self.transport.close().await?;
        info!(instrument = %self.name, "Instrument closed");
        Ok(())
    }
}

/// A channel of an [`Instrument`]. Borrows the instrument mutably, so it
/// cannot outlive it.
#[derive(Debug)]
pub struct Channel<'a> {
    pub(crate) instrument: &'a mut Instrument,
    pub(crate) index: u8,
}

impl Channel<'_> {
    /// 1-based channel index.
    pub fn index(&self) -> u8 {
        self.index
    }

    pub async fn get<T: ScpiValue>(&mut self, control: &Control<T>) -> ScpiResult<T> {
        self.instrument.get_on(control, Some(self.index)).await
    }

    pub async fn set<T: ScpiValue>(&mut self, control: &Control<T>, value: T) -> ScpiResult<()> {
        self.instrument.set_on(control, value, Some(self.index)).await
    }

    /// Render `template` with this channel's `{ch}` and send it.
    pub async fn send(&mut self, template: &str) -> ScpiResult<()> {
        let command = render_template(template, None, Some(self.index))?;
        self.instrument.write(&command).await
    }
}
