// `config show | config set <key> <value>`: runner-fleet's own settings.

use anyhow::Result;
use fleet_common::constants::return_code;
use fleet_common::{HostContext, Terminal, Tracing};
use fleet_sdk::TraceWriter;
use std::sync::Arc;

use crate::command_settings::ConfigCommand;

pub struct SettingsCommand {
    context: Arc<HostContext>,
    trace: Tracing,
}

impl SettingsCommand {
    pub fn new(context: Arc<HostContext>) -> Self {
        let trace = context.get_trace("Settings");
        Self { context, trace }
    }

    pub fn run(&self, terminal: &Terminal, command: &ConfigCommand, json: bool) -> Result<i32> {
        let store = self.context.config_store();
        let mut settings = store.get_settings()?;

        match command {
            ConfigCommand::Show if json => {
                terminal.write_line(&serde_json::to_string_pretty(&settings)?);
            }
            ConfigCommand::Show => {
                let entries = settings.entries();
                let width = entries.iter().map(|(key, _)| key.len()).max().unwrap_or(0);
                for (key, value) in entries {
                    let value = if value.is_empty() { "(not set)".to_string() } else { value };
                    terminal.write_line(&format!("{key:<width$}  {value}"));
                }
                if !store.is_configured() {
                    terminal.write_empty_line();
                    terminal.write_line(&format!(
                        "Defaults shown; nothing saved in {} yet.",
                        store.settings_file().display()
                    ));
                }
            }
            ConfigCommand::Set { key, value } => {
                settings.set_value(key, value)?;
                store.save_settings(&settings)?;
                self.trace.info(&format!("Setting {key} updated"));
                let shown = settings
                    .entries()
                    .into_iter()
                    .find(|(k, _)| k == key)
                    .map(|(_, v)| v)
                    .unwrap_or_default();
                terminal.write_success_message(&format!("{key} = {shown}"));
            }
        }
        Ok(return_code::SUCCESS)
    }
}
