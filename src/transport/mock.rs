//! Scripted in-memory transport for testing drivers without hardware.
//!
//! The mock answers written commands from a script:
//!
//! - **replies**: a fixed answer to a query (`reply("*IDN?", "...")`)
//! - **sequences**: answers consumed in order before falling back to the fixed
//!   reply; `None` entries produce no answer, so the next read times out
//! - **echoes**: a settable value; writes starting with a prefix store the
//!   value, the matching query returns it
//! - **streams**: raw bytes that become available in increments, one
//!   increment per `bytes_available` call
//!
//! Every written command is logged for verification. Clones share state, so a
//! test keeps one handle while the instrument owns another.
//!
//! A read with nothing pending sleeps for the mock's read timeout (10 ms by
//! default) and fails with [`TransportError::Timeout`]. Under
//! `#[tokio::test(start_paused = true)]` this is a simulated clock.
//!
//! # Example
//!
//! ```
//! use scpi_instruments::transport::{MockTransport, Transport};
//!
//! # tokio_test::block_on(async {
//! let mock = MockTransport::new().reply("*IDN?", "HEWLETT PACKARD,8753E,0,7.10");
//! let mut transport = mock.clone();
//! transport.write("*IDN?").await.unwrap();
//! assert_eq!(transport.read().await.unwrap(), "HEWLETT PACKARD,8753E,0,7.10");
//! assert_eq!(mock.written(), vec!["*IDN?"]);
//! # })
//! ```

use super::{Transport, TransportResult};
use crate::error::TransportError;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

#[derive(Debug)]
struct Echo {
    query: String,
    write_prefix: String,
    value: String,
}

#[derive(Debug, Default)]
struct MockState {
    replies: HashMap<String, String>,
    sequences: HashMap<String, VecDeque<Option<String>>>,
    echoes: Vec<Echo>,
    streams: HashMap<String, Vec<Vec<u8>>>,
    pending: VecDeque<String>,
    staged: VecDeque<Vec<u8>>,
    available: VecDeque<u8>,
    written: Vec<String>,
    fail_next: bool,
    closed: bool,
}

impl MockState {
    fn dispatch(&mut self, command: &str) {
        if let Some(entry) = self.sequences.get_mut(command).and_then(VecDeque::pop_front) {
            if let Some(reply) = entry {
                self.pending.push_back(reply);
            }
            return;
        }

        if let Some(reply) = self.replies.get(command) {
            self.pending.push_back(reply.clone());
            return;
        }

        if let Some(echo) = self.echoes.iter().find(|echo| echo.query == command) {
            self.pending.push_back(echo.value.clone());
            return;
        }

        if let Some(chunks) = self.streams.get(command) {
            self.staged = chunks.iter().cloned().collect();
            self.available.clear();
            return;
        }

        let echo = self
            .echoes
            .iter_mut()
            .filter(|echo| command.starts_with(&echo.write_prefix))
            .max_by_key(|echo| echo.write_prefix.len());
        if let Some(echo) = echo {
            let rest = &command[echo.write_prefix.len()..];
            if let Some(value) = rest.split_whitespace().next() {
                echo.value = value.to_string();
            }
        }
    }
}

/// Scripted transport; see the module docs.
#[derive(Debug, Clone)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
    timeout: Duration,
}

impl MockTransport {
    /// Empty script, 10 ms read timeout.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState::default())),
            timeout: Duration::from_millis(10),
        }
    }

    /// How long a read waits before timing out.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Answer `query` with `reply` every time it is written.
    pub fn reply(self, query: &str, reply: &str) -> Self {
        self.lock().replies.insert(query.to_string(), reply.to_string());
        self
    }

    /// Answer `query` with `replies` in order, then fall back to the fixed reply.
    /// A `None` entry leaves the query unanswered.
    pub fn sequence<I>(self, query: &str, replies: I) -> Self
    where
        I: IntoIterator<Item = Option<&'static str>>,
    {
        self.lock()
            .sequences
            .entry(query.to_string())
            .or_default()
            .extend(replies.into_iter().map(|reply| reply.map(str::to_string)));
        self
    }

    /// Leave the first `count` writes of `query` unanswered.
    pub fn busy(self, query: &str, count: usize) -> Self {
        self.sequence(query, std::iter::repeat(None).take(count))
    }

    /// A settable value: `query` returns it, writes starting with
    /// `write_prefix` replace it with their first whitespace-separated token.
    pub fn echo(self, query: &str, write_prefix: &str, initial: &str) -> Self {
        self.lock().echoes.push(Echo {
            query: query.to_string(),
            write_prefix: write_prefix.to_string(),
            value: initial.to_string(),
        });
        self
    }

    /// Writing `command` stages `chunks`; each `bytes_available` call releases one.
    pub fn stream_on(self, command: &str, chunks: Vec<Vec<u8>>) -> Self {
        self.lock().streams.insert(command.to_string(), chunks);
        self
    }

    /// Fail the next operation with a transport error.
    pub fn trigger_failure(&self) {
        self.lock().fail_next = true;
    }

    /// Commands written so far, in order.
    pub fn written(&self) -> Vec<String> {
        self.lock().written.clone()
    }

    /// How many times `command` was written.
    pub fn count(&self, command: &str) -> usize {
        self.lock().written.iter().filter(|c| *c == command).count()
    }

    /// Clear the write log.
    pub fn clear_written(&self) {
        self.lock().written.clear();
    }

    /// Whether `close` was called.
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check(&self) -> TransportResult<()> {
        let mut state = self.lock();
        if state.closed {
            return Err(TransportError::NotConnected);
        }
        if std::mem::take(&mut state.fail_next) {
            return Err(TransportError::Other("Mock transport failure".to_string()));
        }
        Ok(())
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn write(&mut self, command: &str) -> TransportResult<()> {
        self.check()?;
        let mut state = self.lock();
        state.written.push(command.to_string());
        state.dispatch(command);
        Ok(())
    }

    async fn read(&mut self) -> TransportResult<String> {
        self.check()?;
        let reply = self.lock().pending.pop_front();
        match reply {
            Some(reply) => Ok(reply),
            None => {
                tokio::time::sleep(self.timeout).await;
                Err(TransportError::Timeout(self.timeout))
            }
        }
    }

    async fn read_bytes(&mut self, count: usize) -> TransportResult<Vec<u8>> {
        self.check()?;
        let bytes = {
            let mut state = self.lock();
            (state.available.len() >= count).then(|| state.available.drain(..count).collect())
        };
        match bytes {
            Some(bytes) => Ok(bytes),
            None => {
                tokio::time::sleep(self.timeout).await;
                Err(TransportError::Timeout(self.timeout))
            }
        }
    }

    async fn bytes_available(&mut self) -> TransportResult<usize> {
        self.check()?;
        let mut state = self.lock();
        if let Some(chunk) = state.staged.pop_front() {
            state.available.extend(chunk);
        }
        Ok(state.available.len())
    }

    fn description(&self) -> String {
        "mock".to_string()
    }

    async fn close(&mut self) -> TransportResult<()> {
        self.lock().closed = true;
        Ok(())
    }
}
