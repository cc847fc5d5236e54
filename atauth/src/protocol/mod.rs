//! AT-command authentication protocol.
//!
//! ## Exchange
//!
//! ```text
//! host                                   device
//!  |  AT+AUTHSTART\r                       |
//!  | ------------------------------------> |
//!  |        ...AUTHSTART:<hex>\r\n ... OK  |
//!  | <------------------------------------ |
//!  |  AT+AUTHRESP=<cmac-hex>\r             |
//!  | ------------------------------------> |
//! ```
//!
//! The challenge line and the `OK` terminator may arrive in any order and
//! split across any number of reads; see [`scanner::ChallengeScanner`].

pub mod mac;
pub mod scanner;

pub use mac::{HexKey, KeyProvider, MacComputer, ResponseTag, StaticKey};
pub use scanner::{Challenge, ChallengeScanner, DisableReason, ScanState};

/// Probe command sent once when a connection opens.
pub const PROBE_COMMAND: &str = "AT+AUTHSTART\r";

/// Prefix of the response command; followed by the tag and `\r`.
pub const RESPONSE_PREFIX: &str = "AT+AUTHRESP=";

/// Marker that ends the device's reply to the probe.
pub const COMPLETION_MARKER: &[u8] = b"OK";

/// Marker that introduces the hex challenge.
pub const CHALLENGE_PREFIX: &[u8] = b"AUTHSTART:";

/// Line terminator that ends the hex challenge.
pub const LINE_TERMINATOR: &[u8] = b"\r\n";

/// Build the response command for a computed tag.
pub fn response_command(tag: &ResponseTag) -> String {
    format!("{RESPONSE_PREFIX}{}\r", tag.to_hex())
}

/// Find the first occurrence of `needle` in `haystack` at or after `from`.
pub(crate) fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if from > haystack.len() || needle.is_empty() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|pos| pos + from)
}
