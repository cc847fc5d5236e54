//! Handshake session: probe, challenge, response.
//!
//! A [`HandshakeSession`] exists for exactly one open connection. It sends
//! the probe once, echoes every inbound chunk to the display, feeds the
//! scanner while a challenge is awaited and answers it at most once.
//!
//! ```text
//!   Idle --start()--> AwaitingChallenge --challenge--> Authenticated
//!                            |                              ^
//!                            +--markers missing / bad hex---+
//!
//!   any state --disconnect() / transport error / closed channel--> Disconnected
//! ```

use crate::error::Result;
use crate::outbound::{OutboundBuffer, WriteChannel};
use crate::protocol::{
    self, ChallengeScanner, DisableReason, MacComputer, PROBE_COMMAND, ResponseTag,
};
use log::{debug, info, warn};
use std::io::Write;

/// Receives every inbound chunk for display, whatever the handshake state.
pub trait Echo {
    /// Show raw bytes received from the device.
    fn echo(&mut self, bytes: &[u8]);
}

impl<F: FnMut(&[u8])> Echo for F {
    fn echo(&mut self, bytes: &[u8]) {
        self(bytes);
    }
}

/// Display collaborator that drops everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoEcho;

impl Echo for NoEcho {
    fn echo(&mut self, _bytes: &[u8]) {}
}

/// Session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Connected, probe not yet sent.
    Idle,
    /// Probe sent, scanning inbound data.
    AwaitingChallenge,
    /// Handshake finished; either answered or abandoned.
    Authenticated,
    /// Torn down; no further work is done.
    Disconnected,
}

/// What handling one inbound chunk did to the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// The handshake is not running (not started, finished or disconnected).
    Idle,
    /// Still waiting for the challenge.
    Pending,
    /// The challenge was answered with this tag.
    Responded(ResponseTag),
    /// Scanning stopped without a usable challenge; no response was sent.
    Abandoned(DisableReason),
    /// The challenge was answered but the write channel was already closed,
    /// so the tag never went out. The session is disconnected.
    Unsent(ResponseTag),
}

/// One handshake over one connection.
pub struct HandshakeSession<W, E = NoEcho> {
    state: SessionState,
    scanner: ChallengeScanner,
    mac: MacComputer,
    outbound: OutboundBuffer<W>,
    echo: E,
}

impl<W: Write> HandshakeSession<W> {
    /// Create a session without a display collaborator.
    pub fn new(mac: MacComputer, channel: WriteChannel<W>) -> Self {
        Self::with_echo(mac, channel, NoEcho)
    }
}

impl<W: Write, E: Echo> HandshakeSession<W, E> {
    /// Create a session that forwards inbound bytes to `echo`.
    ///
    /// Protocol commands are written through `channel` immediately; other
    /// writers may share the same channel.
    pub fn with_echo(mac: MacComputer, channel: WriteChannel<W>, echo: E) -> Self {
        Self {
            state: SessionState::Idle,
            scanner: ChallengeScanner::new(),
            mac,
            outbound: OutboundBuffer::immediate(channel),
            echo,
        }
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The challenge scanner, for inspection.
    pub fn scanner(&self) -> &ChallengeScanner {
        &self.scanner
    }

    /// The display collaborator.
    pub fn echo_mut(&mut self) -> &mut E {
        &mut self.echo
    }

    /// Send the probe and start waiting for the challenge.
    ///
    /// Does nothing unless the session is `Idle`.
    pub fn start(&mut self) -> Result<()> {
        if self.state != SessionState::Idle {
            return Ok(());
        }
        self.send(PROBE_COMMAND)?;
        info!("Probe sent, waiting for challenge");
        self.state = SessionState::AwaitingChallenge;
        Ok(())
    }

    /// Handle one inbound chunk.
    ///
    /// Errors are transport write failures only; the session is already
    /// disconnected when one is returned.
    pub fn on_data(&mut self, chunk: &[u8]) -> Result<Step> {
        if self.state == SessionState::Disconnected {
            return Ok(Step::Idle);
        }

        self.echo.echo(chunk);

        if self.state != SessionState::AwaitingChallenge {
            return Ok(Step::Idle);
        }

        match self.scanner.feed(chunk) {
            Ok(Some(challenge)) => {
                let tag = self.mac.compute(challenge.as_bytes());
                if !self.outbound.channel().is_open() {
                    warn!("Write channel closed, response not sent");
                    self.disconnect();
                    return Ok(Step::Unsent(tag));
                }
                self.send(&protocol::response_command(&tag))?;
                info!("Challenge answered");
                debug!("Response tag: {tag}");
                self.state = SessionState::Authenticated;
                Ok(Step::Responded(tag))
            },
            Ok(None) => match self.scanner.disable_reason() {
                Some(reason) => {
                    warn!("No usable challenge ({reason:?}), no response sent");
                    self.state = SessionState::Authenticated;
                    Ok(Step::Abandoned(reason))
                },
                None => Ok(Step::Pending),
            },
            Err(e) => {
                warn!("{e}; no response sent");
                self.state = SessionState::Authenticated;
                Ok(Step::Abandoned(DisableReason::Malformed))
            },
        }
    }

    /// Tear the session down and release the writer. Safe to call more than once.
    pub fn disconnect(&mut self) {
        if self.state != SessionState::Disconnected {
            debug!("Session disconnected in state {:?}", self.state);
            self.state = SessionState::Disconnected;
        }
        self.outbound.channel().close();
    }

    fn send(&mut self, command: &str) -> Result<()> {
        let result = self.outbound.push(command);
        if result.is_err() {
            self.disconnect();
        }
        result
    }
}
