// Console I/O for commands: coloured status lines, prompts and secret input.
// Everything written is masked and traced; tests can swap stdin/stdout for
// in-memory buffers.

use crate::secret_masker::SecretMasker;
use crate::tracing::Tracing;

use anyhow::{bail, Result};
use fleet_sdk::TraceWriter;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io::{self, BufRead, IsTerminal, Write};

/// Console colours used by runner-fleet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleColor {
    Red,
    Green,
    Yellow,
    Cyan,
    Dim,
}

impl ConsoleColor {
    fn ansi_code(&self) -> &'static str {
        match self {
            ConsoleColor::Red => "\x1b[31m",
            ConsoleColor::Green => "\x1b[32m",
            ConsoleColor::Yellow => "\x1b[33m",
            ConsoleColor::Cyan => "\x1b[36m",
            ConsoleColor::Dim => "\x1b[2m",
        }
    }

    const RESET: &'static str = "\x1b[0m";
}

/// In-memory stand-ins for stdin and stdout.
#[derive(Default)]
struct Captured {
    input: VecDeque<String>,
    output: Vec<String>,
    /// The last output line was written without a newline.
    open_line: bool,
}

pub struct Terminal {
    silent: bool,
    color: bool,
    trace: Option<Tracing>,
    secret_masker: SecretMasker,
    captured: Option<Mutex<Captured>>,
}

impl Terminal {
    pub fn new(secret_masker: SecretMasker) -> Self {
        let color = io::stdout().is_terminal() && std::env::var_os("NO_COLOR").is_none();
        Self {
            silent: false,
            color,
            trace: None,
            secret_masker,
            captured: None,
        }
    }

    /// A terminal that reads `input` line by line and records output instead
    /// of touching the real console.
    pub fn scripted<I, S>(secret_masker: SecretMasker, input: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            silent: false,
            color: false,
            trace: None,
            secret_masker,
            captured: Some(Mutex::new(Captured {
                input: input.into_iter().map(Into::into).collect(),
                output: Vec::new(),
                open_line: false,
            })),
        }
    }

    pub fn with_trace(mut self, trace: Tracing) -> Self {
        self.trace = Some(trace);
        self
    }

    /// Suppress everything except errors.
    pub fn set_silent(&mut self, silent: bool) {
        self.silent = silent;
    }

    pub fn is_silent(&self) -> bool {
        self.silent
    }

    /// Whether stdin is an interactive terminal (always false when scripted).
    pub fn is_interactive(&self) -> bool {
        self.captured.is_none() && io::stdin().is_terminal()
    }

    /// Output recorded by a scripted terminal, one entry per written line.
    pub fn captured_lines(&self) -> Vec<String> {
        self.captured
            .as_ref()
            .map(|c| c.lock().output.clone())
            .unwrap_or_default()
    }

    fn paint(&self, text: &str, color: Option<ConsoleColor>) -> String {
        match color {
            Some(color) if self.color => format!("{}{text}{}", color.ansi_code(), ConsoleColor::RESET),
            _ => text.to_string(),
        }
    }

    fn emit(&self, text: &str, newline: bool, to_stderr: bool) {
        if let Some(ref captured) = self.captured {
            let mut guard = captured.lock();
            let captured = &mut *guard;
            if captured.open_line && !captured.output.is_empty() {
                let last = captured.output.len() - 1;
                captured.output[last].push_str(text);
            } else {
                captured.output.push(text.to_string());
            }
            captured.open_line = !newline;
            return;
        }

        if to_stderr {
            let mut err = io::stderr().lock();
            let _ = if newline { writeln!(err, "{text}") } else { write!(err, "{text}") };
        } else {
            let mut out = io::stdout().lock();
            let _ = if newline { writeln!(out, "{text}") } else { write!(out, "{text}") };
            let _ = out.flush();
        }
    }

    /// Write without a trailing newline.
    pub fn write(&self, message: &str, color: Option<ConsoleColor>) {
        let message = self.secret_masker.mask_secrets(message);
        if let Some(ref trace) = self.trace {
            trace.verbose(&format!("WRITE: {message}"));
        }
        if !self.silent {
            self.emit(&self.paint(&message, color), false, false);
        }
    }

    pub fn write_line(&self, line: &str) {
        self.write_colored_line(line, None);
    }

    pub fn write_colored_line(&self, line: &str, color: Option<ConsoleColor>) {
        let line = self.secret_masker.mask_secrets(line);
        if let Some(ref trace) = self.trace {
            trace.verbose(&format!("WRITE LINE: {line}"));
        }
        if !self.silent {
            self.emit(&self.paint(&line, color), true, false);
        }
    }

    pub fn write_empty_line(&self) {
        self.write_line("");
    }

    /// `# Title` surrounded by blank lines.
    pub fn write_section(&self, title: &str) {
        self.write_empty_line();
        self.write_colored_line(&format!("# {title}"), Some(ConsoleColor::Cyan));
        self.write_empty_line();
    }

    pub fn write_success_message(&self, message: &str) {
        let mark = self.paint("✓", Some(ConsoleColor::Green));
        self.write_line(&format!("{mark} {message}"));
    }

    pub fn write_warning(&self, message: &str) {
        let message = self.secret_masker.mask_secrets(message);
        if let Some(ref trace) = self.trace {
            trace.warning(&message);
        }
        if !self.silent {
            self.emit(&self.paint(&format!("! {message}"), Some(ConsoleColor::Yellow)), true, true);
        }
    }

    /// Errors go to stderr even when silent.
    pub fn write_error(&self, message: &str) {
        let message = self.secret_masker.mask_secrets(message);
        if let Some(ref trace) = self.trace {
            trace.error(&message);
        }
        self.emit(&self.paint(&format!("✗ {message}"), Some(ConsoleColor::Red)), true, true);
    }

    /// Write an error with its cause chain.
    pub fn write_error_chain(&self, err: &anyhow::Error) {
        self.write_error(&format!("{err:#}"));
    }

    /// Read one line without its terminator. End of input is an error.
    pub fn read_line(&self) -> Result<String> {
        if let Some(ref captured) = self.captured {
            return match captured.lock().input.pop_front() {
                Some(line) => Ok(line),
                None => bail!("No more input"),
            };
        }

        let mut input = String::new();
        if io::stdin().lock().read_line(&mut input)? == 0 {
            bail!("Unexpected end of input");
        }
        let value = input.trim_end_matches(['\n', '\r']).to_string();
        if let Some(ref trace) = self.trace {
            trace.verbose(&format!("READ LINE: '{value}'"));
        }
        Ok(value)
    }

    /// Read a line without echo. The value is registered as a secret before
    /// it is returned.
    pub fn read_secret(&self) -> Result<String> {
        let value = match self.captured {
            Some(_) => self.read_line()?,
            None => read_secret_line()?,
        };
        self.secret_masker.add_value(&value);
        if let Some(ref trace) = self.trace {
            trace.verbose("READ SECRET");
        }
        Ok(value)
    }
}

/// Read a line from stdin with echo turned off when stdin is a tty.
fn read_secret_line() -> Result<String> {
    let stdin = io::stdin();
    let mut input = String::new();

    #[cfg(unix)]
    {
        use nix::sys::termios::{tcgetattr, tcsetattr, LocalFlags, SetArg};

        if let Ok(original) = tcgetattr(&stdin) {
            let mut silent = original.clone();
            silent.local_flags &= !LocalFlags::ECHO;
            if tcsetattr(&stdin, SetArg::TCSANOW, &silent).is_ok() {
                let read = stdin.lock().read_line(&mut input);
                let _ = tcsetattr(&stdin, SetArg::TCSANOW, &original);
                // Echo was off, so the user's Enter never moved the cursor.
                println!();
                if read? == 0 {
                    bail!("Unexpected end of input");
                }
                return Ok(input.trim_end_matches(['\n', '\r']).to_string());
            }
        }
    }

    if stdin.lock().read_line(&mut input)? == 0 {
        bail!("Unexpected end of input");
    }
    Ok(input.trim_end_matches(['\n', '\r']).to_string())
}
