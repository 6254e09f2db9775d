// fleet-cli: The `runner-fleet` command line.
// Depends on `fleet-sdk` and `fleet-common`.
//
// Architecture:
//   main → Fleet::execute_command → setup / start / stop / restart / status /
//          logs / remove / health / dashboard / config

pub mod checks;
pub mod command_settings;
pub mod commands;
pub mod configuration;
pub mod dashboard;
pub mod fleet;
pub mod installer;
