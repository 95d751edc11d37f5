//! # SCPI Instruments
//!
//! Async drivers for SCPI laboratory instruments: the HP 8753E vector
//! network analyzer, the Agilent E4418B/E4419B power meters and the
//! Keysight E5071C ENA.
//!
//! ## Crate Structure
//!
//! - **`attribute`**: typed `Control<T>` attributes with validators, command
//!   templates and reply parsing; the accessor macros drivers use.
//! - **`instrument`**: the `Instrument` session shared by every driver:
//!   query pacing, memoized identity, channel addressing.
//! - **`acquisition`**: bounded sweep-completion polling and chunked
//!   complex data transfer.
//! - **`drivers`**: one module per model, plus the `Driver` dispatcher.
//! - **`transport`**: the `Transport` trait with serial, Prologix GPIB-USB,
//!   VISA and mock implementations.
//! - **`scpi`**: number formatting and reply parsing helpers.
//! - **`config`**: Figment-based configuration (TOML + environment).
//! - **`logging`**: `tracing` subscriber setup.
//! - **`error`**: `ScpiError` and `TransportError`.
//!
//! ## Example
//! ```no_run
//! use scpi_instruments::drivers::{Hp8753e, Hp8753eOptions};
//! use scpi_instruments::transport::SerialTransport;
//! use std::time::Duration;
//!
//! # async fn run() -> scpi_instruments::error::ScpiResult<()> {
//! let transport = SerialTransport::builder("/dev/ttyUSB0".to_string(), 9600).open().await?;
//! let mut vna = Hp8753e::open(Box::new(transport), Hp8753eOptions::default()).await?;
//!
//! vna.set_start_frequency(1.0e9).await?;
//! vna.set_stop_frequency(2.0e9).await?;
//! vna.scan(Duration::from_secs(10)).await?;
//! let trace = vna.data_complex(Duration::from_secs(10)).await?;
//! println!("{} points", trace.len());
//! # Ok(())
//! # }
//! ```

pub mod acquisition;
pub mod attribute;
pub mod config;
pub mod drivers;
pub mod error;
pub mod instrument;
pub mod logging;
pub mod scpi;
pub mod transport;

pub use error::{ScpiError, ScpiResult};
