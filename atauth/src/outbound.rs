//! Outbound write path.
//!
//! [`WriteChannel`] is the single, shared handle to the transport's writer.
//! Every write takes the channel lock for the duration of `write_all` +
//! `flush`, so bytes from the handshake and from user input never
//! interleave on the wire.
//!
//! [`OutboundBuffer`] sits in front of a channel and decides when text is
//! actually written:
//!
//! - [`WriteMode::Immediate`]: every push is written at once.
//! - [`WriteMode::LineBuffered`]: text is held until a lone `"\r"` is pushed,
//!   then the pending line (including the `\r`) is written in one go.

use crate::error::{Error, Result};
use log::{trace, warn};
use std::io::Write;
use std::sync::{Arc, Mutex, PoisonError};

/// Flush policy for an [`OutboundBuffer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteMode {
    /// Write every push immediately.
    #[default]
    Immediate,
    /// Hold text until a carriage return is pushed.
    LineBuffered,
}

/// Shared, mutually exclusive access to the transport's writer.
pub struct WriteChannel<W> {
    inner: Arc<Mutex<Option<W>>>,
}

impl<W> Clone for WriteChannel<W> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<W: Write> WriteChannel<W> {
    /// Open a channel around `writer`.
    pub fn new(writer: W) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Some(writer))),
        }
    }

    /// A channel with no writer; every write reports `TransportUnavailable`.
    pub fn closed() -> Self {
        Self {
            inner: Arc::new(Mutex::new(None)),
        }
    }

    /// Write all of `bytes` while holding the channel exclusively.
    pub fn write(&self, bytes: &[u8]) -> Result<()> {
        let mut guard = self
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let writer = guard
            .as_mut()
            .ok_or(Error::TransportUnavailable)?;
        trace!("Writing {} bytes: {:?}", bytes.len(), String::from_utf8_lossy(bytes));
        writer.write_all(bytes)?;
        writer.flush()?;
        Ok(())
    }

    /// Whether a writer is attached.
    pub fn is_open(&self) -> bool {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Detach and return the writer. Later writes fail with `TransportUnavailable`.
    pub fn close(&self) -> Option<W> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

/// Buffers outbound text and flushes it according to a [`WriteMode`].
pub struct OutboundBuffer<W> {
    channel: WriteChannel<W>,
    mode: WriteMode,
    pending: String,
}

impl<W: Write> OutboundBuffer<W> {
    /// Create a buffer writing through `channel`.
    pub fn new(channel: WriteChannel<W>, mode: WriteMode) -> Self {
        Self {
            channel,
            mode,
            pending: String::new(),
        }
    }

    /// Create an immediate-mode buffer.
    pub fn immediate(channel: WriteChannel<W>) -> Self {
        Self::new(channel, WriteMode::Immediate)
    }

    /// Create a line-buffered buffer.
    pub fn line_buffered(channel: WriteChannel<W>) -> Self {
        Self::new(channel, WriteMode::LineBuffered)
    }

    /// Flush policy in use.
    pub fn mode(&self) -> WriteMode {
        self.mode
    }

    /// Text waiting for a carriage return (line-buffered mode only).
    pub fn pending(&self) -> &str {
        &self.pending
    }

    /// Drop any pending text without writing it.
    pub fn discard(&mut self) {
        self.pending.clear();
    }

    /// The channel this buffer writes through.
    pub fn channel(&self) -> &WriteChannel<W> {
        &self.channel
    }

    /// Push text towards the transport.
    ///
    /// A closed channel is logged and otherwise ignored; any other write
    /// failure is returned.
    pub fn push(&mut self, text: &str) -> Result<()> {
        match self.mode {
            WriteMode::Immediate => self.send(text.as_bytes()),
            WriteMode::LineBuffered => {
                self.pending.push_str(text);
                if text != "\r" {
                    return Ok(());
                }
                let line = std::mem::take(&mut self.pending);
                self.send(line.as_bytes())
            },
        }
    }

    fn send(&self, bytes: &[u8]) -> Result<()> {
        match self.channel.write(bytes) {
            Err(Error::TransportUnavailable) => {
                warn!("Transport not writable, dropping {} bytes", bytes.len());
                Ok(())
            },
            other => other,
        }
    }
}
