//! # atauth
//!
//! Challenge/response authentication for devices that speak AT commands over
//! a serial link.
//!
//! After a connection opens the host sends `AT+AUTHSTART\r`. The device
//! answers with a hex challenge on a line of its own (`AUTHSTART:<hex>\r\n`)
//! and a final `OK`. The host returns `AT+AUTHRESP=<tag>\r`, where `tag` is
//! the AES-128 CMAC of the challenge under a pre-shared 16-byte key.
//!
//! This crate provides:
//!
//! - [`MacComputer`] and [`KeyProvider`]: the CMAC contract
//! - [`ChallengeScanner`]: one-shot challenge detection over a byte stream
//! - [`OutboundBuffer`] and [`WriteChannel`]: immediate or line-buffered
//!   writes with exclusive access to the transport
//! - [`HandshakeSession`]: probe, scan, respond
//! - [`Connection`]: reads a transport and drives a session
//!
//! ## Features
//!
//! - `native` (default): serial ports via the `serialport` crate
//! - `serde`: `Serialize` for [`PortInfo`]
//!
//! ## Example
//!
//! ```rust,no_run
//! use atauth::{
//!     CancelToken, Connection, HandshakeSession, HexKey, MacComputer, NativePort, SerialConfig,
//!     WriteChannel,
//! };
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let port = NativePort::open(&SerialConfig::new("/dev/ttyUSB0", 115200))?;
//!     let reader = port.try_clone()?;
//!
//!     let mac = MacComputer::from_provider(&HexKey::new("7b0e19c6d9b74acc996d3561a9745a7f"))?;
//!     let session = HandshakeSession::with_echo(mac, WriteChannel::new(port), |bytes: &[u8]| {
//!         print!("{}", String::from_utf8_lossy(bytes));
//!     });
//!
//!     let mut connection = Connection::new(reader, session);
//!     connection.run(&CancelToken::new())?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod connection;
pub mod error;
pub mod host;
pub mod outbound;
pub mod port;
pub mod protocol;
pub mod session;

// Re-exports for convenience
#[cfg(feature = "native")]
pub use port::{NativePort, NativePortEnumerator};
pub use {
    connection::{CancelToken, Connection, ConnectionConfig, Outcome},
    error::{Error, Result},
    host::discover_ports,
    outbound::{OutboundBuffer, WriteChannel, WriteMode},
    port::{DataBits, FlowControl, Parity, Port, PortEnumerator, PortInfo, SerialConfig, StopBits},
    protocol::{
        Challenge, ChallengeScanner, DisableReason, HexKey, KeyProvider, MacComputer,
        ResponseTag, ScanState, StaticKey,
    },
    session::{Echo, HandshakeSession, NoEcho, SessionState, Step},
};
