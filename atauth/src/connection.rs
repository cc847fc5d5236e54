//! Connection driver: pumps inbound chunks into a handshake session.
//!
//! Chunks are read and handled strictly one at a time, in arrival order:
//! the echo, the scan, the MAC and the response for one chunk all finish
//! before the next read is issued. Cancellation is cooperative; the reader
//! should have a short read timeout so the token is checked regularly.
//! Tearing the connection down closes both the read handle and the session's
//! write channel.

use crate::error::{Error, Result};
use crate::port::Port;
use crate::session::{Echo, HandshakeSession, SessionState, Step};
use log::{debug, info, trace, warn};
use std::io::{ErrorKind, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Default number of bytes requested per read.
pub const DEFAULT_CHUNK_SIZE: usize = 1024;

/// Shared flag used to stop a running connection from another thread.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Create an un-cancelled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Connection driver options.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Bytes requested per read.
    pub chunk_size: usize,
    /// Give up if no challenge is answered within this time. `None` waits forever.
    pub challenge_timeout: Option<Duration>,
    /// Return as soon as the handshake has finished instead of pumping until
    /// end-of-stream.
    pub stop_after_handshake: bool,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            challenge_timeout: None,
            stop_after_handshake: false,
        }
    }
}

/// Why [`Connection::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The transport reported end-of-stream.
    EndOfStream,
    /// The cancel token was triggered.
    Cancelled,
    /// The handshake finished and `stop_after_handshake` was set.
    Completed(Step),
}

/// Drives one [`HandshakeSession`] from a reader.
pub struct Connection<R, W, E> {
    reader: R,
    session: HandshakeSession<W, E>,
    config: ConnectionConfig,
    result: Option<Step>,
}

impl<R: Port, W: Write, E: Echo> Connection<R, W, E> {
    /// Create a driver with default options.
    pub fn new(reader: R, session: HandshakeSession<W, E>) -> Self {
        Self::with_config(reader, session, ConnectionConfig::default())
    }

    /// Create a driver with custom options.
    pub fn with_config(reader: R, session: HandshakeSession<W, E>, config: ConnectionConfig) -> Self {
        Self {
            reader,
            session,
            config,
            result: None,
        }
    }

    /// The session being driven.
    pub fn session(&self) -> &HandshakeSession<W, E> {
        &self.session
    }

    /// Mutable access to the session being driven.
    pub fn session_mut(&mut self) -> &mut HandshakeSession<W, E> {
        &mut self.session
    }

    /// How the handshake ended, once it has.
    pub fn handshake_result(&self) -> Option<Step> {
        self.result
    }

    /// Start the handshake and pump inbound data until end-of-stream,
    /// cancellation, an error, or (optionally) handshake completion.
    ///
    /// Every exit except `Completed` disconnects.
    pub fn run(&mut self, cancel: &CancelToken) -> Result<Outcome> {
        let outcome = self.pump(cancel);
        match outcome {
            Ok(Outcome::Completed(_)) => {},
            _ => self.disconnect(),
        }
        outcome
    }

    /// Disconnect the session and close the read handle. Safe to call more
    /// than once.
    pub fn disconnect(&mut self) {
        self.session.disconnect();
        if let Err(e) = self.reader.close() {
            warn!("Failed to close {}: {e}", self.reader.name());
        }
    }

    fn pump(&mut self, cancel: &CancelToken) -> Result<Outcome> {
        debug!("Reading from {}", self.reader.name());
        self.session.start()?;
        let started = Instant::now();
        let mut buf = vec![0u8; self.config.chunk_size.max(1)];

        loop {
            if cancel.is_cancelled() {
                info!("Connection cancelled");
                return Ok(Outcome::Cancelled);
            }

            if let Some(limit) = self.config.challenge_timeout {
                if self.session.state() == SessionState::AwaitingChallenge
                    && started.elapsed() >= limit
                {
                    return Err(Error::HandshakeTimeout(limit));
                }
            }

            let n = match self.reader.read(&mut buf) {
                Ok(0) => {
                    debug!("End of stream");
                    return Ok(Outcome::EndOfStream);
                },
                Ok(n) => n,
                Err(e)
                    if matches!(
                        e.kind(),
                        ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
                    ) =>
                {
                    continue;
                },
                Err(e) => return Err(Error::TransportRead(e)),
            };

            trace!("Received {n} bytes");
            let step = self.session.on_data(&buf[..n])?;
            if matches!(
                step,
                Step::Responded(_) | Step::Abandoned(_) | Step::Unsent(_)
            ) {
                self.result = Some(step);
                if self.config.stop_after_handshake {
                    return Ok(Outcome::Completed(step));
                }
            }
        }
    }
}
