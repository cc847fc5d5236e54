//! Terminal rendering of device output.
//!
//! Device output and status lines share one terminal lock so a status line
//! never lands in the middle of a rendered chunk. In TTY mode everything goes
//! to stderr; otherwise device output goes to stdout and status to stderr.

use atauth::Echo;
use console::style;
use log::warn;
use std::fs::File;
use std::io::{self, IsTerminal, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

/// Shared handle for status output.
#[derive(Clone)]
pub(crate) struct Console {
    lock: Arc<Mutex<()>>,
    tty: bool,
}

impl Console {
    /// Detect whether stdout and stderr are both terminals.
    pub(crate) fn detect() -> Self {
        Self {
            lock: Arc::new(Mutex::new(())),
            tty: io::stdout().is_terminal() && io::stderr().is_terminal(),
        }
    }

    /// Print a status line on stderr, starting from a clean line.
    pub(crate) fn status(&self, message: &str) {
        let _guard = self
            .lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if self.tty {
            eprint!("\r\x1b[2K{message}\r\n");
        } else {
            eprintln!("{message}");
        }
        io::stderr().flush().ok();
    }

    /// Build the echo that renders device output on this console.
    pub(crate) fn terminal_echo(
        &self,
        timestamps: Arc<AtomicBool>,
        log: Option<File>,
    ) -> TerminalEcho {
        let out: Box<dyn Write + Send> = if self.tty {
            Box::new(io::stderr())
        } else {
            Box::new(io::stdout())
        };
        let echo = TerminalEcho::new(out, self.lock.clone(), timestamps);
        match log {
            Some(file) => echo.with_log(Box::new(file)),
            None => echo,
        }
    }
}

/// Renders inbound bytes as text and mirrors them to an optional log.
pub(crate) struct TerminalEcho {
    out: Box<dyn Write + Send>,
    lock: Arc<Mutex<()>>,
    timestamps: Arc<AtomicBool>,
    log: Option<Box<dyn Write + Send>>,
    carry: Vec<u8>,
    lines: LineRenderer,
}

impl TerminalEcho {
    pub(crate) fn new(
        out: Box<dyn Write + Send>,
        lock: Arc<Mutex<()>>,
        timestamps: Arc<AtomicBool>,
    ) -> Self {
        Self {
            out,
            lock,
            timestamps,
            log: None,
            carry: Vec::new(),
            lines: LineRenderer::default(),
        }
    }

    /// Also append decoded text to `log`, without timestamps.
    pub(crate) fn with_log(mut self, log: Box<dyn Write + Send>) -> Self {
        self.log = Some(log);
        self
    }

    /// Render any bytes still held back as an incomplete UTF-8 sequence.
    pub(crate) fn finish(&mut self) {
        if self.carry.is_empty() {
            return;
        }
        let rest = String::from_utf8_lossy(&self.carry).into_owned();
        self.carry.clear();
        self.emit(&rest);
        if let Some(log) = self.log.as_mut() {
            log.flush().ok();
        }
    }

    fn emit(&mut self, text: &str) {
        if let Some(log) = self.log.as_mut() {
            if let Err(e) = log.write_all(text.as_bytes()) {
                warn!("Log file write failed, capture stopped: {e}");
                self.log = None;
            }
        }

        let stamp = self
            .timestamps
            .load(Ordering::Relaxed)
            .then(|| {
                style(format!("[{}]", wall_clock()))
                    .dim()
                    .to_string()
                    + " "
            });
        let rendered = self.lines.render(text, stamp.as_deref());

        let _guard = self
            .lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        self.out.write_all(rendered.as_bytes()).ok();
        self.out.flush().ok();
    }
}

impl Echo for TerminalEcho {
    fn echo(&mut self, bytes: &[u8]) {
        self.carry.extend_from_slice(bytes);
        let text = drain_utf8_lossy(&mut self.carry);
        if !text.is_empty() {
            self.emit(&text);
        }
    }
}

/// Decode the longest displayable prefix of `buf`.
///
/// Invalid sequences become U+FFFD; an incomplete trailing sequence stays in
/// `buf` for the next chunk.
pub(crate) fn drain_utf8_lossy(buf: &mut Vec<u8>) -> String {
    let mut out = String::new();
    let mut consumed = 0;

    while consumed < buf.len() {
        let rest = &buf[consumed..];
        match std::str::from_utf8(rest) {
            Ok(text) => {
                out.push_str(text);
                consumed = buf.len();
            },
            Err(e) => {
                let valid = e.valid_up_to();
                out.push_str(&String::from_utf8_lossy(&rest[..valid]));
                match e.error_len() {
                    Some(bad) => {
                        out.push(char::REPLACEMENT_CHARACTER);
                        consumed += valid + bad;
                    },
                    None => {
                        consumed += valid;
                        break;
                    },
                }
            },
        }
    }

    buf.drain(..consumed);
    out
}

/// Normalises line endings to `\r\n` (needed in raw mode) and inserts a
/// prefix at the start of each line.
#[derive(Debug)]
pub(crate) struct LineRenderer {
    at_line_start: bool,
    after_cr: bool,
}

impl Default for LineRenderer {
    fn default() -> Self {
        Self {
            at_line_start: true,
            after_cr: false,
        }
    }
}

impl LineRenderer {
    /// Render `text`; `\r\n` split across calls still yields one line break.
    pub(crate) fn render(&mut self, text: &str, prefix: Option<&str>) -> String {
        let mut out = String::with_capacity(text.len() + 16);
        for c in text.chars() {
            match c {
                '\r' => {
                    out.push_str("\r\n");
                    self.at_line_start = true;
                    self.after_cr = true;
                },
                '\n' => {
                    if !self.after_cr {
                        out.push_str("\r\n");
                    }
                    self.at_line_start = true;
                    self.after_cr = false;
                },
                _ => {
                    if self.at_line_start {
                        if let Some(prefix) = prefix {
                            out.push_str(prefix);
                        }
                        self.at_line_start = false;
                    }
                    self.after_cr = false;
                    out.push(c);
                },
            }
        }
        out
    }
}

/// Current UTC time of day as `HH:MM:SS.mmm`.
fn wall_clock() -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    let secs = now.as_secs();
    format!(
        "{:02}:{:02}:{:02}.{:03}",
        (secs / 3600) % 24,
        (secs / 60) % 60,
        secs % 60,
        now.subsec_millis()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Captured {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn echo(timestamps: bool) -> (TerminalEcho, Captured) {
        let out = Captured::default();
        let echo = TerminalEcho::new(
            Box::new(out.clone()),
            Arc::new(Mutex::new(())),
            Arc::new(AtomicBool::new(timestamps)),
        );
        (echo, out)
    }

    // ---- drain_utf8_lossy ----

    #[test]
    fn test_drain_ascii() {
        let mut buf = b"AT+AUTHSTART".to_vec();
        assert_eq!(drain_utf8_lossy(&mut buf), "AT+AUTHSTART");
        assert!(buf.is_empty());
    }

    #[test]
    fn test_drain_keeps_incomplete_suffix() {
        // 'é' is 0xC3 0xA9
        let mut buf = vec![b'o', b'k', 0xC3];
        assert_eq!(drain_utf8_lossy(&mut buf), "ok");
        assert_eq!(buf, [0xC3]);

        buf.push(0xA9);
        assert_eq!(drain_utf8_lossy(&mut buf), "é");
        assert!(buf.is_empty());
    }

    #[test]
    fn test_drain_replaces_invalid_bytes_and_continues() {
        let mut buf = vec![b'a', 0xFF, b'b', 0xFE, b'c'];
        assert_eq!(drain_utf8_lossy(&mut buf), "a\u{FFFD}b\u{FFFD}c");
        assert!(buf.is_empty());
    }

    #[test]
    fn test_drain_empty() {
        let mut buf = Vec::new();
        assert_eq!(drain_utf8_lossy(&mut buf), "");
    }

    // ---- LineRenderer ----

    #[test]
    fn test_render_normalises_line_endings() {
        let mut lines = LineRenderer::default();
        assert_eq!(lines.render("a\nb\r\nc\rd", None), "a\r\nb\r\nc\r\nd");
    }

    #[test]
    fn test_render_crlf_split_across_chunks() {
        let mut lines = LineRenderer::default();
        let mut out = lines.render("OK\r", None);
        out.push_str(&lines.render("\nnext", None));
        assert_eq!(out, "OK\r\nnext");
    }

    #[test]
    fn test_render_prefix_only_at_line_start() {
        let mut lines = LineRenderer::default();
        assert_eq!(lines.render("ab", Some("> ")), "> ab");
        assert_eq!(lines.render("cd\r\nef", Some("> ")), "cd\r\n> ef");
    }

    #[test]
    fn test_render_blank_lines_have_no_prefix() {
        let mut lines = LineRenderer::default();
        assert_eq!(lines.render("\n\n", Some("> ")), "\r\n\r\n");
    }

    // ---- TerminalEcho ----

    #[test]
    fn test_echo_writes_rendered_text() {
        let (mut echo, out) = echo(false);
        echo.echo(b"AUTHSTART:0102\r\n");
        echo.echo(b"OK\r\n");
        assert_eq!(out.text(), "AUTHSTART:0102\r\nOK\r\n");
    }

    #[test]
    fn test_echo_with_timestamps() {
        let (mut echo, out) = echo(true);
        echo.echo(b"boot\n");
        let text = console::strip_ansi_codes(&out.text()).into_owned();
        assert!(text.starts_with('['));
        assert!(text.ends_with("] boot\r\n"));
    }

    #[test]
    fn test_echo_timestamp_toggle_is_shared() {
        let flag = Arc::new(AtomicBool::new(false));
        let out = Captured::default();
        let mut echo = TerminalEcho::new(
            Box::new(out.clone()),
            Arc::new(Mutex::new(())),
            flag.clone(),
        );
        echo.echo(b"one\n");
        flag.store(true, Ordering::Relaxed);
        echo.echo(b"two\n");
        let text = console::strip_ansi_codes(&out.text()).into_owned();
        assert!(text.starts_with("one\r\n["));
        assert!(text.ends_with("] two\r\n"));
    }

    #[test]
    fn test_echo_logs_raw_text() {
        let log = Captured::default();
        let (echo, out) = echo(true);
        let mut echo = echo.with_log(Box::new(log.clone()));
        echo.echo(b"line\r\n");
        assert_eq!(log.text(), "line\r\n");
        assert!(out.text().contains("line"));
    }

    #[test]
    fn test_echo_finish_flushes_partial_sequence() {
        let (mut echo, out) = echo(false);
        echo.echo(&[b'x', 0xE4, 0xBD]);
        assert_eq!(out.text(), "x");
        echo.finish();
        assert_eq!(out.text(), "x\u{FFFD}");
    }

    #[test]
    fn test_wall_clock_format() {
        let clock = wall_clock();
        assert_eq!(clock.len(), 12);
        assert_eq!(&clock[2..3], ":");
        assert_eq!(&clock[8..9], ".");
    }
}
