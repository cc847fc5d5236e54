//! One-shot handshake for scripts.

use anyhow::{Context, Result, bail};
use atauth::{
    CancelToken, Connection, ConnectionConfig, DisableReason, HandshakeSession, Outcome,
    ResponseTag, Step, WriteChannel,
};
use console::style;
use log::trace;
use std::time::Duration;

use crate::config::Config;
use crate::{Cli, CliError, get_port, mac_computer, open_port};

/// Run the handshake, print the response tag and stop.
///
/// Exits 0 when the challenge was answered; any other ending is an error.
pub(crate) fn cmd_auth(
    cli: &Cli,
    config: &Config,
    cancel: &CancelToken,
    timeout_secs: Option<u64>,
) -> Result<()> {
    let mac = mac_computer(cli, config)?;
    let port_name = get_port(cli, config)?;
    let port = open_port(cli, config, &port_name)?;
    let reader = port
        .try_clone()
        .context("Failed to clone serial port handle")?;

    let session = HandshakeSession::with_echo(mac, WriteChannel::new(port), |bytes: &[u8]| {
        trace!("rx {:?}", String::from_utf8_lossy(bytes));
    });
    let mut connection =
        Connection::with_config(reader, session, handshake_config(timeout_secs, config));

    let outcome = connection
        .run(cancel)
        .with_context(|| format!("Handshake on {port_name} failed"))?;
    connection.disconnect();

    let tag = tag_from_outcome(outcome)?;
    if !cli.quiet {
        eprintln!(
            "{} Authenticated on {}",
            style("✓").green().bold(),
            style(&port_name).cyan()
        );
    }
    println!("{tag}");
    Ok(())
}

/// Stop once the handshake finishes; `--timeout` wins over the config.
fn handshake_config(timeout_secs: Option<u64>, config: &Config) -> ConnectionConfig {
    ConnectionConfig {
        challenge_timeout: timeout_secs
            .map(Duration::from_secs)
            .or_else(|| config.challenge_timeout()),
        stop_after_handshake: true,
        ..ConnectionConfig::default()
    }
}

/// Map how the connection ended to the tag that was sent.
fn tag_from_outcome(outcome: Outcome) -> Result<ResponseTag> {
    match outcome {
        Outcome::Completed(Step::Responded(tag)) => Ok(tag),
        Outcome::Completed(Step::Abandoned(reason)) => {
            bail!("Device sent no usable challenge: {}", describe(reason))
        },
        Outcome::Completed(Step::Unsent(_)) => {
            bail!("Serial port closed before the response was sent")
        },
        Outcome::Completed(step) => bail!("Handshake stopped unexpectedly ({step:?})"),
        Outcome::EndOfStream => bail!("Device closed the connection before the handshake finished"),
        Outcome::Cancelled => Err(CliError::Cancelled("Handshake cancelled".to_string()).into()),
    }
}

fn describe(reason: DisableReason) -> &'static str {
    match reason {
        DisableReason::MissingPrefix => "no AUTHSTART: line before OK",
        DisableReason::MissingTerminator => "challenge line was not terminated",
        DisableReason::Malformed => "challenge was not valid hex",
        DisableReason::Extracted => "challenge already consumed",
    }
}
