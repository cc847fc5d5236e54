//! Offline tag computation.

use anyhow::Result;
use log::debug;

use crate::config::Config;
use crate::{Cli, CliError, mac_computer};

/// Print the response tag the device would expect for `message`.
pub(crate) fn cmd_mac(cli: &Cli, config: &Config, message: &str) -> Result<()> {
    let mac = mac_computer(cli, config)?;
    let bytes = parse_message(message)?;
    debug!("Computing tag over {} byte(s)", bytes.len());
    println!("{}", mac.compute(&bytes));
    Ok(())
}

/// Decode a hex message; an optional `0x` prefix and surrounding whitespace are ignored.
fn parse_message(message: &str) -> Result<Vec<u8>> {
    let trimmed = message.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    hex::decode(digits).map_err(|e| CliError::Usage(format!("Invalid hex message: {e}")).into())
}
