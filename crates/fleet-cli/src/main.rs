// Entry point for `runner-fleet`.
//
// Parses the command line, sets up diagnostics, builds the host context and
// hands over to the `Fleet` dispatcher.

use clap::Parser;
use fleet_cli::command_settings::CommandSettings;
use fleet_cli::fleet::Fleet;
use fleet_common::constants::{return_code, CURRENT_ARCHITECTURE, CURRENT_PLATFORM};
use fleet_common::{HostContext, SecretMasker, Terminal};
use fleet_sdk::{FleetPackage, Source};
use tracing_subscriber::EnvFilter;

fn main() {
    let settings = match CommandSettings::try_parse() {
        Ok(settings) => settings,
        Err(e) => {
            let _ = e.print();
            // Help and version requests are not failures.
            let code = if e.use_stderr() {
                return_code::TERMINATED_ERROR
            } else {
                return_code::SUCCESS
            };
            std::process::exit(code);
        }
    };

    init_tracing(settings.verbose);

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Failed to start the async runtime: {e}");
            std::process::exit(return_code::TERMINATED_ERROR);
        }
    };

    let exit_code = runtime.block_on(run(settings));
    std::process::exit(exit_code);
}

/// Diagnostics go to stderr so tables and JSON on stdout stay clean.
/// `RUST_LOG` wins over `--verbose`.
fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run(settings: CommandSettings) -> i32 {
    tracing::debug!(
        "{} {} ({}) on {} / {}",
        FleetPackage::PRODUCT_NAME,
        FleetPackage::VERSION,
        Source::COMMIT_HASH,
        CURRENT_PLATFORM,
        CURRENT_ARCHITECTURE
    );

    let root = match settings.root.clone() {
        Some(root) => Ok(root),
        None => HostContext::default_root(),
    };
    let context = match root.and_then(HostContext::new) {
        Ok(context) => context,
        Err(e) => {
            Terminal::new(SecretMasker::new()).write_error_chain(&e);
            return return_code::TERMINATED_ERROR;
        }
    };

    let terminal = Terminal::new(context.secret_masker().clone())
        .with_trace(context.get_trace("Terminal"));
    let fleet = Fleet::new(context, terminal);

    match fleet.execute_command(settings).await {
        Ok(exit_code) => {
            tracing::debug!("runner-fleet exiting with code {exit_code}");
            exit_code
        }
        Err(e) => {
            fleet.terminal().write_error_chain(&e);
            return_code::TERMINATED_ERROR
        }
    }
}
