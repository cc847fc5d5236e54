//! Serial port selection.
//!
//! An explicit `--port` wins, then the configured port. Otherwise ports are
//! discovered: a single candidate is used directly, several are offered in a
//! dialoguer prompt. Non-interactive mode never prompts.

use {
    crate::{CliError, config::Config},
    anyhow::{Context, Result},
    atauth::{PortInfo, discover_ports},
    console::style,
    dialoguer::{Confirm, Error as DialoguerError, Select, theme::ColorfulTheme},
    log::{debug, info},
    std::{cmp::Ordering, io::IsTerminal},
};

/// Options for serial port selection.
#[derive(Debug, Clone, Default)]
pub struct SerialOptions {
    /// Explicit port specified via CLI.
    pub port: Option<String>,
    /// Non-interactive mode (fail if the choice is ambiguous).
    pub non_interactive: bool,
    /// Ask before using a single auto-detected port.
    pub confirm_port: bool,
}

fn usage_err(message: &str) -> anyhow::Error {
    CliError::Usage(message.to_string()).into()
}

fn cancelled_err() -> anyhow::Error {
    CliError::Cancelled("Port selection cancelled".to_string()).into()
}

/// Select a serial port name.
pub fn select_serial_port(options: &SerialOptions, config: &Config) -> Result<String> {
    if let Some(name) = preselected_port(options, config) {
        return Ok(name);
    }

    let ports = discover_ports().context("Failed to enumerate serial ports")?;

    if options.non_interactive {
        return select_non_interactive_port(ports).map(|p| p.name);
    }

    match ports
        .len()
        .cmp(&1)
    {
        Ordering::Greater => {
            ensure_interactive_terminal()?;
            select_port_interactive(&ports)
        },
        Ordering::Equal => {
            let port = select_non_interactive_port(ports)?;
            if options.confirm_port {
                ensure_interactive_terminal()?;
                confirm_single_port(port)
            } else {
                info!("Auto-selected port: {port}");
                Ok(port.name)
            }
        },
        Ordering::Less => Err(usage_err("No serial ports found")),
    }
}

/// Port fixed by the command line or the config, if any.
fn preselected_port(options: &SerialOptions, config: &Config) -> Option<String> {
    if let Some(name) = &options.port {
        return Some(name.clone());
    }
    if let Some(name) = &config.connection.serial {
        debug!("Using port from config: {name}");
        return Some(name.clone());
    }
    None
}

/// Pick the only candidate; zero or several is a usage error.
fn select_non_interactive_port(ports: Vec<PortInfo>) -> Result<PortInfo> {
    let mut ports = ports.into_iter();
    match (ports.next(), ports.next()) {
        (Some(port), None) => Ok(port),
        (Some(_), Some(_)) => Err(usage_err(
            "Multiple serial ports found; pass --port to choose one",
        )),
        (None, _) => Err(usage_err("No serial ports found")),
    }
}

fn ensure_interactive_terminal() -> Result<()> {
    if std::io::stdin().is_terminal() && std::io::stderr().is_terminal() {
        Ok(())
    } else {
        Err(usage_err(
            "Port selection needs an interactive terminal; pass --port",
        ))
    }
}

fn map_prompt_error(err: DialoguerError) -> anyhow::Error {
    match err {
        DialoguerError::IO(io_err) if io_err.kind() == std::io::ErrorKind::Interrupted => {
            cancelled_err()
        },
        DialoguerError::IO(io_err) => usage_err(&format!("Prompt failed: {io_err}")),
    }
}

/// One-line description of a port for prompts.
fn port_label(port: &PortInfo) -> String {
    let ids = match (port.vid, port.pid) {
        (Some(vid), Some(pid)) => format!(" ({vid:04X}:{pid:04X})"),
        _ => String::new(),
    };
    let product = port
        .product
        .as_deref()
        .map(|p| format!(" - {p}"))
        .unwrap_or_default();
    format!("{}{ids}{product}", port.name)
}

/// Interactive port selection.
fn select_port_interactive(ports: &[PortInfo]) -> Result<String> {
    eprintln!(
        "{} Found {} serial ports",
        style("ℹ").blue(),
        ports.len()
    );

    let term_width = console::Term::stderr()
        .size()
        .1 as usize;
    let max_item_width = term_width.saturating_sub(4);
    let labels: Vec<String> = ports
        .iter()
        .map(|p| console::truncate_str(&port_label(p), max_item_width, "\u{2026}").into_owned())
        .collect();

    let selection = Select::with_theme(&ColorfulTheme::default())
        .with_prompt("Select serial port")
        .items(&labels)
        .default(0)
        .interact_opt()
        .map_err(map_prompt_error)?;

    match selection {
        Some(index) => ports
            .get(index)
            .map(|p| p.name.clone())
            .ok_or_else(|| anyhow::anyhow!("Invalid port index: {index}")),
        None => Err(cancelled_err()),
    }
}

/// Ask before using a single detected port.
fn confirm_single_port(port: PortInfo) -> Result<String> {
    let confirmed = Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt(format!("Use port {}?", port_label(&port)))
        .default(true)
        .interact_opt()
        .map_err(map_prompt_error)?;

    if confirmed == Some(true) {
        Ok(port.name)
    } else {
        Err(cancelled_err())
    }
}
