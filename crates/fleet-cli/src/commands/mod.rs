// One module per subcommand.

pub mod config;
pub mod control;
pub mod health;
pub mod logs;
pub mod remove;
pub mod setup;
pub mod status;

use fleet_common::{HostContext, Terminal};

/// Printed when a command finds nothing to work on.
pub(crate) fn write_empty_fleet_hint(terminal: &Terminal, context: &HostContext) {
    terminal.write_line(&format!(
        "No runners found under {}.",
        context.root().display()
    ));
    terminal.write_line("Create some with: runner-fleet setup <owner>/<repo> [count]");
}
