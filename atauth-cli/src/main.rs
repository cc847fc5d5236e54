//! atauth CLI - Challenge/response authentication for AT-command devices.
//!
//! ## Features
//!
//! - Interactive serial terminal that authenticates on connect
//! - One-shot handshake for scripts (`auth`)
//! - Offline tag computation (`mac`)
//! - Interactive serial port selection
//! - Shell completion generation
//! - Environment variable and config file support

use anyhow::{Context, Result};
use atauth::{CancelToken, HexKey, MacComputer, NativePort, discover_ports};
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use console::style;
use env_logger::Env;
use log::debug;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

mod commands;
mod config;
mod display;
mod serial;

use config::Config;
use serial::{SerialOptions, select_serial_port};

/// Errors that map to a dedicated process exit code.
#[derive(Debug, thiserror::Error)]
pub(crate) enum CliError {
    /// Bad invocation or missing setup; exit code 2.
    #[error("{0}")]
    Usage(String),
    /// Interrupted by the user; exit code 130.
    #[error("{0}")]
    Cancelled(String),
}

impl CliError {
    fn exit_code(&self) -> i32 {
        match self {
            Self::Usage(_) => 2,
            Self::Cancelled(_) => 130,
        }
    }
}

/// Exit code for a failed run.
fn exit_code_for(err: &anyhow::Error) -> i32 {
    err.downcast_ref::<CliError>()
        .map_or(1, CliError::exit_code)
}

/// atauth - AES-CMAC challenge/response authentication over AT-command serial links.
///
/// Environment variables:
///   ATAUTH_PORT              - Default serial port
///   ATAUTH_BAUD              - Default baud rate (default: 115200)
///   ATAUTH_KEY               - Pre-shared key as 32 hex characters
///   ATAUTH_NON_INTERACTIVE   - Non-interactive mode (disable prompts)
#[derive(Parser)]
#[command(name = "atauth")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Serial port to use (auto-detected if not specified).
    #[arg(short, long, global = true, env = "ATAUTH_PORT")]
    port: Option<String>,

    /// Baud rate [default: 115200].
    #[arg(short, long, global = true, env = "ATAUTH_BAUD")]
    baud: Option<u32>,

    /// Pre-shared key as 32 hex characters.
    #[arg(short, long, global = true, env = "ATAUTH_KEY", hide_env_values = true)]
    key: Option<String>,

    /// File containing the pre-shared key as hex.
    #[arg(long, global = true, value_name = "PATH")]
    key_file: Option<PathBuf>,

    /// Verbose output level (-v, -vv for increasing detail).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (suppress non-essential output).
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Non-interactive mode (fail instead of prompting).
    #[arg(long, global = true, env = "ATAUTH_NON_INTERACTIVE")]
    non_interactive: bool,

    /// Confirm port selection even when only one port is found.
    #[arg(long, global = true)]
    confirm_port: bool,

    /// Path to a configuration file.
    #[arg(long = "config", global = true, value_name = "PATH")]
    config_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Open an interactive terminal and authenticate on connect.
    Connect {
        /// Send every keystroke immediately instead of on Enter.
        #[arg(long)]
        immediate: bool,

        /// Prefix device output lines with a timestamp.
        #[arg(long)]
        timestamp: bool,

        /// Append device output to a file.
        #[arg(long, value_name = "PATH")]
        log_file: Option<PathBuf>,
    },

    /// Run the handshake only and print the response tag.
    Auth {
        /// Give up if no challenge arrives within this many seconds.
        #[arg(long, value_name = "SECS")]
        timeout: Option<u64>,
    },

    /// Print the CMAC tag of a hex message under the configured key.
    Mac {
        /// Message as hex (may be empty).
        message: String,
    },

    /// List available serial ports.
    ListPorts {
        /// Output port list as JSON to stdout.
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completion scripts.
    Completions {
        /// Shell type for completions.
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn main() {
    let cli = Cli::parse();

    if env::var_os("NO_COLOR").is_some() || !console::Term::stderr().is_term() {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }

    init_logging(&cli);

    if let Err(err) = run(&cli) {
        eprintln!("{} {err:#}", style("Error:").red().bold());
        std::process::exit(exit_code_for(&err));
    }
}

/// Setup logging based on verbosity; `RUST_LOG` still wins when set.
fn init_logging(cli: &Cli) {
    let log_level = if cli.quiet {
        "warn"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level))
        .format_target(cli.verbose >= 2)
        .format_timestamp(if cli.verbose >= 2 {
            Some(env_logger::TimestampPrecision::Millis)
        } else {
            None
        })
        .init();

    debug!(
        "atauth v{} (verbose level: {})",
        env!("CARGO_PKG_VERSION"),
        cli.verbose
    );
}

fn run(cli: &Cli) -> Result<()> {
    let config = if let Some(ref path) = cli.config_path {
        Config::load_from_path(path)
    } else {
        Config::load()
    };

    let cancel = CancelToken::new();
    let handler_token = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || handler_token.cancel()) {
        debug!("Could not install Ctrl+C handler: {e}");
    }

    match &cli.command {
        Commands::Connect {
            immediate,
            timestamp,
            log_file,
        } => {
            let options = commands::connect::ConnectOptions {
                immediate: *immediate,
                timestamp: *timestamp,
                log_file: log_file.clone(),
            };
            commands::connect::cmd_connect(cli, &config, &cancel, &options)
        },
        Commands::Auth { timeout } => commands::auth::cmd_auth(cli, &config, &cancel, *timeout),
        Commands::Mac { message } => commands::mac::cmd_mac(cli, &config, message),
        Commands::ListPorts { json } => cmd_list_ports(*json),
        Commands::Completions { shell } => {
            commands::completions::cmd_completions(*shell);
            Ok(())
        },
    }
}

/// Resolve the pre-shared key.
///
/// Priority: `--key` / `ATAUTH_KEY`, `--key-file`, config `auth.key`,
/// config `auth.key_file`.
fn key_provider(cli: &Cli, config: &Config) -> Result<HexKey> {
    if let Some(key) = &cli.key {
        return Ok(HexKey::new(key.as_str()));
    }
    if let Some(path) = &cli.key_file {
        return read_key_file(path);
    }
    if let Some(key) = &config.auth.key {
        debug!("Using key from config");
        return Ok(HexKey::new(key.as_str()));
    }
    if let Some(path) = &config.auth.key_file {
        debug!("Using key file from config: {}", path.display());
        return read_key_file(path);
    }
    Err(CliError::Usage(
        "No key configured: pass --key or --key-file, set ATAUTH_KEY, or add [auth] key to the config"
            .to_string(),
    )
    .into())
}

fn read_key_file(path: &Path) -> Result<HexKey> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read key file: {}", path.display()))?;
    Ok(HexKey::new(contents))
}

/// Build the MAC computer from the resolved key.
pub(crate) fn mac_computer(cli: &Cli, config: &Config) -> Result<MacComputer> {
    let provider = key_provider(cli, config)?;
    MacComputer::from_provider(&provider)
        .map_err(|e| CliError::Usage(format!("Invalid pre-shared key: {e}")).into())
}

/// Get serial port from CLI args, config or interactive selection.
pub(crate) fn get_port(cli: &Cli, config: &Config) -> Result<String> {
    let options = SerialOptions {
        port: cli.port.clone(),
        non_interactive: cli.non_interactive,
        confirm_port: cli.confirm_port,
    };
    select_serial_port(&options, config)
}

/// Effective baud rate: flag or env, then config, then the default.
fn baud_rate(cli: &Cli, config: &Config) -> u32 {
    cli.baud
        .or(config.connection.baud)
        .unwrap_or(atauth::port::DEFAULT_BAUD)
}

/// Open `port_name` with the effective serial settings.
pub(crate) fn open_port(cli: &Cli, config: &Config, port_name: &str) -> Result<NativePort> {
    let baud = baud_rate(cli, config);
    let serial = config.serial_config(port_name, baud)?;
    debug!("Opening {port_name} at {baud} baud");
    NativePort::open(&serial).with_context(|| format!("Failed to open serial port {port_name}"))
}

/// List ports command implementation.
fn cmd_list_ports(json: bool) -> Result<()> {
    let ports = discover_ports().context("Failed to enumerate serial ports")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&ports)?);
        return Ok(());
    }

    eprintln!("{}", style("Available serial ports").bold().underlined());

    if ports.is_empty() {
        eprintln!("  {}", style("No serial ports found").dim());
        return Ok(());
    }

    for port in &ports {
        let vid_pid = if let (Some(vid), Some(pid)) = (port.vid, port.pid) {
            format!(" ({vid:04X}:{pid:04X})")
        } else {
            String::new()
        };
        let product = port
            .product
            .as_deref()
            .map(|p| format!(" - {}", style(p).dim()))
            .unwrap_or_default();

        eprintln!(
            "  {} {}{vid_pid}{product}",
            style("•").green(),
            style(&port.name).cyan()
        );
    }

    Ok(())
}

#[cfg(test)]
mod cli_tests {
    use super::*;
    use clap::CommandFactory;

    const KEY: &str = "7b0e19c6d9b74acc996d3561a9745a7f";

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap()
    }

    // ---- clap validation ----

    #[test]
    fn test_cli_command_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_cli_parse_connect_defaults() {
        let cli = parse(&["atauth", "connect"]);
        match cli.command {
            Commands::Connect {
                immediate,
                timestamp,
                log_file,
            } => {
                assert!(!immediate);
                assert!(!timestamp);
                assert!(log_file.is_none());
            },
            _ => panic!("expected connect"),
        }
    }

    #[test]
    fn test_cli_parse_connect_with_all_options() {
        let cli = parse(&[
            "atauth",
            "connect",
            "--immediate",
            "--timestamp",
            "--log-file",
            "session.log",
        ]);
        match cli.command {
            Commands::Connect {
                immediate,
                timestamp,
                log_file,
            } => {
                assert!(immediate);
                assert!(timestamp);
                assert_eq!(log_file, Some(PathBuf::from("session.log")));
            },
            _ => panic!("expected connect"),
        }
    }

    #[test]
    fn test_cli_parse_auth_timeout() {
        let cli = parse(&["atauth", "auth", "--timeout", "5"]);
        assert!(matches!(cli.command, Commands::Auth { timeout: Some(5) }));

        let cli = parse(&["atauth", "auth"]);
        assert!(matches!(cli.command, Commands::Auth { timeout: None }));
    }

    #[test]
    fn test_cli_parse_mac() {
        let cli = parse(&["atauth", "--key", KEY, "mac", "000102"]);
        assert_eq!(cli.key.as_deref(), Some(KEY));
        assert!(matches!(cli.command, Commands::Mac { ref message } if message == "000102"));
    }

    #[test]
    fn test_cli_parse_list_ports_json() {
        let cli = parse(&["atauth", "list-ports", "--json"]);
        assert!(matches!(cli.command, Commands::ListPorts { json: true }));
    }

    #[test]
    fn test_cli_parse_completions() {
        let cli = parse(&["atauth", "completions", "zsh"]);
        assert!(matches!(
            cli.command,
            Commands::Completions { shell: Shell::Zsh }
        ));
    }

    #[test]
    fn test_cli_global_options() {
        let cli = parse(&[
            "atauth",
            "--port",
            "COM3",
            "--baud",
            "9600",
            "--key-file",
            "device.key",
            "-vv",
            "--quiet",
            "--non-interactive",
            "--confirm-port",
            "--config",
            "/tmp/atauth.toml",
            "list-ports",
        ]);
        assert_eq!(cli.port.as_deref(), Some("COM3"));
        assert_eq!(cli.baud, Some(9600));
        assert_eq!(cli.key_file, Some(PathBuf::from("device.key")));
        assert_eq!(cli.verbose, 2);
        assert!(cli.quiet);
        assert!(cli.non_interactive);
        assert!(cli.confirm_port);
        assert_eq!(cli.config_path, Some(PathBuf::from("/tmp/atauth.toml")));
    }

    #[test]
    fn test_cli_global_options_after_subcommand() {
        let cli = parse(&["atauth", "auth", "--port", "/dev/ttyACM0"]);
        assert_eq!(cli.port.as_deref(), Some("/dev/ttyACM0"));
    }

    #[test]
    fn test_cli_missing_subcommand() {
        assert!(Cli::try_parse_from(["atauth"]).is_err());
    }

    #[test]
    fn test_cli_mac_requires_message() {
        assert!(Cli::try_parse_from(["atauth", "mac"]).is_err());
    }

    #[test]
    fn test_cli_invalid_baud() {
        assert!(Cli::try_parse_from(["atauth", "--baud", "fast", "auth"]).is_err());
    }

    // ---- key resolution ----

    #[test]
    fn test_key_flag_wins_over_config() {
        let cli = parse(&["atauth", "--key", KEY, "auth"]);
        let mut config = Config::default();
        config.auth.key = Some("00".repeat(16));

        let mac = mac_computer(&cli, &config).unwrap();
        let expected = MacComputer::new(&hex::decode(KEY).unwrap()).unwrap();
        assert_eq!(mac.compute(b"x"), expected.compute(b"x"));
    }

    #[test]
    fn test_key_file_wins_over_config_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("device.key");
        fs::write(&path, format!("{KEY}\n")).unwrap();

        let cli = parse(&["atauth", "--key-file", path.to_str().unwrap(), "auth"]);
        let mut config = Config::default();
        config.auth.key = Some("00".repeat(16));

        let mac = mac_computer(&cli, &config).unwrap();
        let expected = MacComputer::new(&hex::decode(KEY).unwrap()).unwrap();
        assert_eq!(mac.compute(b""), expected.compute(b""));
    }

    #[test]
    fn test_config_key_file_used_last() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("device.key");
        fs::write(&path, KEY).unwrap();

        let cli = parse(&["atauth", "auth"]);
        let mut config = Config::default();
        config.auth.key_file = Some(path);
        assert!(mac_computer(&cli, &config).is_ok());
    }

    #[test]
    fn test_missing_key_is_usage_error() {
        let cli = parse(&["atauth", "auth"]);
        let err = mac_computer(&cli, &Config::default()).unwrap_err();
        assert_eq!(exit_code_for(&err), 2);
    }

    #[test]
    fn test_short_key_is_usage_error() {
        let cli = parse(&["atauth", "--key", "0011", "auth"]);
        let err = mac_computer(&cli, &Config::default()).unwrap_err();
        assert_eq!(exit_code_for(&err), 2);
        assert!(err.to_string().contains("Invalid pre-shared key"));
    }

    #[test]
    fn test_unreadable_key_file_is_runtime_error() {
        let cli = parse(&["atauth", "--key-file", "/nonexistent/device.key", "auth"]);
        let err = mac_computer(&cli, &Config::default()).unwrap_err();
        assert_eq!(exit_code_for(&err), 1);
    }

    // ---- baud and exit codes ----

    #[test]
    fn test_baud_rate_priority() {
        let mut config = Config::default();
        assert_eq!(baud_rate(&parse(&["atauth", "auth"]), &config), 115_200);

        config.connection.baud = Some(57_600);
        assert_eq!(baud_rate(&parse(&["atauth", "auth"]), &config), 57_600);
        assert_eq!(
            baud_rate(&parse(&["atauth", "-b", "9600", "auth"]), &config),
            9600
        );
    }

    #[test]
    fn test_exit_codes() {
        let usage: anyhow::Error = CliError::Usage("bad".into()).into();
        let cancelled: anyhow::Error = CliError::Cancelled("stop".into()).into();
        let other = anyhow::anyhow!("boom");
        assert_eq!(exit_code_for(&usage), 2);
        assert_eq!(exit_code_for(&cancelled), 130);
        assert_eq!(exit_code_for(&other), 1);
    }

    #[test]
    fn test_exit_code_survives_context() {
        let err = anyhow::Error::from(CliError::Cancelled("stop".into())).context("while waiting");
        assert_eq!(exit_code_for(&err), 130);
    }
}
