//! One-shot challenge detection over an unbounded byte stream.
//!
//! The scanner accumulates every byte it is fed until the device's `OK`
//! completion marker shows up. At that point the whole buffer is searched
//! once for `AUTHSTART:<hex>\r\n`; whatever the result, scanning stops for
//! good and later chunks are ignored.

use super::{CHALLENGE_PREFIX, COMPLETION_MARKER, LINE_TERMINATOR, find};
use crate::error::{Error, Result};
use log::{debug, trace};

/// Scanner state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    /// Accumulating input, waiting for `OK`.
    Scanning,
    /// A challenge was extracted during the current `feed` call.
    Found,
    /// Terminal: no further input is examined.
    Disabled,
}

/// Why the scanner stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisableReason {
    /// A challenge was extracted.
    Extracted,
    /// `OK` arrived but `AUTHSTART:` never did.
    MissingPrefix,
    /// `AUTHSTART:` was not followed by `\r\n`.
    MissingTerminator,
    /// The text between the markers was not valid hex.
    Malformed,
}

/// Raw challenge bytes decoded from the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge(Vec<u8>);

impl Challenge {
    /// Decoded challenge bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Take the decoded bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

/// Incremental challenge scanner.
#[derive(Debug)]
pub struct ChallengeScanner {
    state: ScanState,
    buffer: Vec<u8>,
    /// Everything before this offset is known not to start an `OK`.
    ok_search_from: usize,
    reason: Option<DisableReason>,
}

impl Default for ChallengeScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl ChallengeScanner {
    /// Create a scanner in the `Scanning` state.
    pub fn new() -> Self {
        Self {
            state: ScanState::Scanning,
            buffer: Vec::new(),
            ok_search_from: 0,
            reason: None,
        }
    }

    /// Current state.
    pub fn state(&self) -> ScanState {
        self.state
    }

    /// Why scanning stopped, once it has.
    pub fn disable_reason(&self) -> Option<DisableReason> {
        self.reason
    }

    /// Number of bytes accumulated so far.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Feed the next chunk of inbound bytes.
    ///
    /// Returns `Ok(Some(_))` exactly once per scanner, when the challenge is
    /// extracted. A malformed challenge disables the scanner and returns
    /// [`Error::MalformedChallenge`].
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Option<Challenge>> {
        if self.state != ScanState::Scanning {
            return Ok(None);
        }

        self.buffer.extend_from_slice(chunk);
        trace!(
            "Scanner buffered {} bytes ({} total)",
            chunk.len(),
            self.buffer.len()
        );

        if find(&self.buffer, COMPLETION_MARKER, self.ok_search_from).is_none() {
            // Keep the last byte so a marker split across chunks is still found.
            self.ok_search_from = self
                .buffer
                .len()
                .saturating_sub(COMPLETION_MARKER.len() - 1);
            return Ok(None);
        }

        debug!("Completion marker seen, extracting challenge");
        let result = self.extract();
        self.buffer = Vec::new();
        self.ok_search_from = 0;

        match result {
            Ok(challenge) => {
                self.state = ScanState::Found;
                debug!("Extracted {}-byte challenge", challenge.as_bytes().len());
                self.disable(DisableReason::Extracted);
                Ok(Some(challenge))
            },
            Err(reason) => {
                self.disable(reason);
                if reason == DisableReason::Malformed {
                    Err(Error::MalformedChallenge(
                        "challenge is not valid hex".to_string(),
                    ))
                } else {
                    Ok(None)
                }
            },
        }
    }

    fn extract(&self) -> std::result::Result<Challenge, DisableReason> {
        let prefix = find(&self.buffer, CHALLENGE_PREFIX, 0).ok_or(DisableReason::MissingPrefix)?;
        let start = prefix + CHALLENGE_PREFIX.len();
        let end = find(&self.buffer, LINE_TERMINATOR, start).ok_or(DisableReason::MissingTerminator)?;

        let text = &self.buffer[start..end];
        trace!("Challenge text: {:?}", String::from_utf8_lossy(text));
        hex::decode(text)
            .map(Challenge)
            .map_err(|_| DisableReason::Malformed)
    }

    fn disable(&mut self, reason: DisableReason) {
        debug!("Scanner disabled: {reason:?}");
        self.state = ScanState::Disabled;
        self.reason = Some(reason);
    }
}
