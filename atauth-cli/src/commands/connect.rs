//! Interactive terminal that authenticates on connect.
//!
//! - Reader thread: serial → handshake session → terminal
//! - Main thread: keyboard (crossterm raw mode) → serial
//! - Ctrl+C: exit
//! - Ctrl+T: toggle timestamp display

use anyhow::{Context, Result, anyhow};
use atauth::{
    CancelToken, Connection, ConnectionConfig, HandshakeSession, OutboundBuffer, Outcome, Step,
    WriteChannel, WriteMode,
};
use console::style;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal;
use log::debug;
use std::fs::{File, OpenOptions};
use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use crate::config::Config;
use crate::display::Console;
use crate::{Cli, get_port, mac_computer, open_port};

/// Keyboard poll interval; also bounds how long exit takes to notice.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Options for the `connect` command.
#[derive(Debug, Clone, Default)]
pub(crate) struct ConnectOptions {
    /// Send keystrokes as typed instead of on Enter.
    pub immediate: bool,
    /// Start with timestamps shown.
    pub timestamp: bool,
    /// Append device output here.
    pub log_file: Option<PathBuf>,
}

/// What a key press asks for.
#[derive(Debug, PartialEq, Eq)]
enum KeyAction {
    Quit,
    ToggleTimestamps,
    Send(String),
    Ignore,
}

fn key_action(key: &KeyEvent) -> KeyAction {
    match (key.code, key.modifiers) {
        (KeyCode::Char('c'), KeyModifiers::CONTROL) => KeyAction::Quit,
        (KeyCode::Char('t'), KeyModifiers::CONTROL) => KeyAction::ToggleTimestamps,
        (KeyCode::Enter, _) => KeyAction::Send("\r".to_string()),
        (KeyCode::Char(c), KeyModifiers::NONE | KeyModifiers::SHIFT) => {
            KeyAction::Send(c.to_string())
        },
        (KeyCode::Backspace, _) => KeyAction::Send("\x08".to_string()),
        (KeyCode::Tab, _) => KeyAction::Send("\t".to_string()),
        (KeyCode::Esc, _) => KeyAction::Send("\x1b".to_string()),
        _ => KeyAction::Ignore,
    }
}

fn write_mode(options: &ConnectOptions, config: &Config) -> WriteMode {
    if options.immediate || config.auth.line_buffered == Some(false) {
        WriteMode::Immediate
    } else {
        WriteMode::LineBuffered
    }
}

/// The terminal keeps reading after the handshake and never times out
/// waiting for the challenge; `auth.challenge_timeout_secs` is for `auth` only.
fn terminal_config() -> ConnectionConfig {
    ConnectionConfig::default()
}

fn open_log(path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file: {}", path.display()))
}

/// Run the interactive terminal until the user exits or the device goes away.
pub(crate) fn cmd_connect(
    cli: &Cli,
    config: &Config,
    cancel: &CancelToken,
    options: &ConnectOptions,
) -> Result<()> {
    let mac = mac_computer(cli, config)?;
    let port_name = get_port(cli, config)?;
    let log = options
        .log_file
        .as_deref()
        .map(open_log)
        .transpose()?;

    let port = open_port(cli, config, &port_name)?;
    let reader = port
        .try_clone()
        .context("Failed to clone serial port handle")?;
    let channel = WriteChannel::new(port);

    let console = Console::detect();
    let interactive = io::stdin().is_terminal();
    let mode = write_mode(options, config);

    console.status(&format!(
        "{} Connected to {}",
        style("📡").cyan(),
        style(&port_name).green()
    ));
    if let Some(path) = &options.log_file {
        console.status(&format!(
            "{} Logging to {}",
            style("📝").cyan(),
            path.display()
        ));
    }
    if interactive {
        let hint = match mode {
            WriteMode::LineBuffered => "Ctrl+C to exit, Ctrl+T timestamps, Enter sends the line",
            WriteMode::Immediate => "Ctrl+C to exit, Ctrl+T timestamps",
        };
        console.status(&style(hint).dim().to_string());
    }

    let timestamps = Arc::new(AtomicBool::new(options.timestamp));
    let echo = console.terminal_echo(timestamps.clone(), log);
    let session = HandshakeSession::with_echo(mac, channel.clone(), echo);
    let mut connection = Connection::with_config(reader, session, terminal_config());

    let reader_cancel = cancel.clone();
    let reader_handle = thread::spawn(move || {
        let outcome = connection.run(&reader_cancel);
        connection
            .session_mut()
            .echo_mut()
            .finish();
        (outcome, connection.handshake_result())
    });

    if interactive {
        let keyboard = keyboard_loop(
            &console,
            cancel,
            &reader_handle,
            OutboundBuffer::new(channel, mode),
            &timestamps,
        );
        cancel.cancel();
        keyboard?;
    }

    let (outcome, handshake) = reader_handle
        .join()
        .map_err(|_| anyhow!("Serial reader thread panicked"))?;

    match handshake {
        Some(Step::Responded(_)) => debug!("Session was authenticated"),
        Some(Step::Abandoned(reason)) => debug!("Handshake abandoned: {reason:?}"),
        Some(Step::Unsent(_)) => debug!("Port closed before the response was sent"),
        _ => debug!("Handshake did not complete"),
    }

    match outcome.with_context(|| format!("Connection to {port_name} failed"))? {
        Outcome::EndOfStream => console.status(&format!(
            "{} Device closed the connection",
            style("⚠").yellow()
        )),
        Outcome::Cancelled | Outcome::Completed(_) => {
            console.status(&format!("{} Connection closed", style("👋").cyan()));
        },
    }
    Ok(())
}

/// Forward key presses to the device until exit or until the reader stops.
fn keyboard_loop<T>(
    console: &Console,
    cancel: &CancelToken,
    reader: &thread::JoinHandle<T>,
    mut outbound: OutboundBuffer<atauth::NativePort>,
    timestamps: &AtomicBool,
) -> Result<()> {
    terminal::enable_raw_mode().context("Failed to enable raw terminal mode")?;
    let _raw_guard = RawModeGuard;

    while !cancel.is_cancelled() && !reader.is_finished() {
        if !event::poll(POLL_INTERVAL)? {
            continue;
        }
        let Event::Key(key) = event::read()? else {
            continue;
        };
        if key.kind == KeyEventKind::Release {
            continue;
        }

        match key_action(&key) {
            KeyAction::Quit => cancel.cancel(),
            KeyAction::ToggleTimestamps => {
                let enabled = !timestamps.fetch_xor(true, Ordering::Relaxed);
                let state = if enabled { "on" } else { "off" };
                console.status(&format!("{} Timestamps {state}", style("⏱").cyan()));
            },
            KeyAction::Send(text) => {
                if let Err(e) = outbound.push(&text) {
                    console.status(&format!("{} Write failed: {e}", style("⚠").yellow()));
                    cancel.cancel();
                }
            },
            KeyAction::Ignore => {},
        }
    }

    outbound.discard();
    Ok(())
}

/// RAII guard to restore terminal mode on drop.
struct RawModeGuard;

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
    }
}
