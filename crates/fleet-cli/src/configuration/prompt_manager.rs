// Prompts for missing input.
// In unattended mode nothing is asked: defaults are used and required values
// become usage errors.

use anyhow::Result;
use fleet_common::{FleetError, Terminal};

pub struct PromptManager<'a> {
    terminal: &'a Terminal,
    unattended: bool,
}

impl<'a> PromptManager<'a> {
    pub fn new(terminal: &'a Terminal, unattended: bool) -> Self {
        Self {
            terminal,
            unattended,
        }
    }

    pub fn is_unattended(&self) -> bool {
        self.unattended
    }

    /// Ask until a non-empty value is entered.
    pub fn prompt_required(&self, prompt_text: &str) -> Result<String> {
        if self.unattended {
            return Err(missing(prompt_text).into());
        }
        loop {
            self.terminal.write(&format!("{prompt_text}: "), None);
            let value = self.terminal.read_line()?.trim().to_string();
            if !value.is_empty() {
                return Ok(value);
            }
            self.terminal.write_line("  (value is required)");
        }
    }

    pub fn prompt_with_default(&self, prompt_text: &str, default: &str) -> Result<String> {
        if self.unattended {
            return Ok(default.to_string());
        }
        self.terminal.write(&format!("{prompt_text} [{default}]: "), None);
        let value = self.terminal.read_line()?.trim().to_string();
        Ok(if value.is_empty() { default.to_string() } else { value })
    }

    /// Unrecognised answers count as the default.
    pub fn prompt_yes_no(&self, prompt_text: &str, default_yes: bool) -> Result<bool> {
        if self.unattended {
            return Ok(default_yes);
        }
        let suffix = if default_yes { "[Y/n]" } else { "[y/N]" };
        self.terminal.write(&format!("{prompt_text} {suffix}: "), None);
        let answer = self.terminal.read_line()?.trim().to_lowercase();
        Ok(match answer.as_str() {
            "y" | "yes" => true,
            "n" | "no" => false,
            _ => default_yes,
        })
    }

    /// Read a value without echo. The value is masked in all later output.
    pub fn prompt_secret(&self, prompt_text: &str) -> Result<String> {
        if self.unattended {
            return Err(missing(prompt_text).into());
        }
        loop {
            self.terminal.write(&format!("{prompt_text}: "), None);
            let value = self.terminal.read_secret()?.trim().to_string();
            if !value.is_empty() {
                return Ok(value);
            }
            self.terminal.write_line("  (value is required)");
        }
    }
}

fn missing(prompt_text: &str) -> FleetError {
    FleetError::usage(format!(
        "'{prompt_text}' was not provided and prompting is disabled (--unattended)"
    ))
}
