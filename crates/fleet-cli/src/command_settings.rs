// Command-line surface of `runner-fleet`.
// Arguments fall back to RUNNER_FLEET_* environment variables where noted.

use clap::{Args, Parser, Subcommand};
use fleet_common::constants::{variables, MAX_RUNNERS_PER_SETUP};
use std::path::PathBuf;

/// Set up and manage GitHub Actions self-hosted runners on this host.
#[derive(Debug, Parser)]
#[command(
    name = "runner-fleet",
    version,
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct CommandSettings {
    /// Directory holding one sub-directory per repository [default: ~/action-runners]
    #[arg(long, global = true, env = variables::ROOT, value_name = "DIR")]
    pub root: Option<PathBuf>,

    /// Machine-readable output where supported
    #[arg(long, global = true)]
    pub json: bool,

    /// Debug-level diagnostics on stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Download, register and install new runners for a repository
    Setup(SetupArgs),

    /// Start runner services
    Start(TargetArgs),

    /// Stop runner services
    Stop(TargetArgs),

    /// Restart runner services
    Restart(TargetArgs),

    /// Show every runner and its service state
    Status(StatusArgs),

    /// Show service logs
    Logs(LogsArgs),

    /// Deregister runners and delete their directories
    Remove(RemoveArgs),

    /// Check the host and runners for problems
    Health(HealthArgs),

    /// Interactive terminal dashboard
    Dashboard,

    /// Show or change runner-fleet settings
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Setup(_) => "setup",
            Command::Start(_) => "start",
            Command::Stop(_) => "stop",
            Command::Restart(_) => "restart",
            Command::Status(_) => "status",
            Command::Logs(_) => "logs",
            Command::Remove(_) => "remove",
            Command::Health(_) => "health",
            Command::Dashboard => "dashboard",
            Command::Config(_) => "config",
        }
    }
}

#[derive(Debug, Clone, Args)]
pub struct SetupArgs {
    /// Repository as `repo` or `owner/repo`
    pub repo: String,

    /// Number of runners to create
    #[arg(
        default_value_t = 1,
        value_parser = clap::value_parser!(u32).range(1..=MAX_RUNNERS_PER_SETUP as i64)
    )]
    pub count: u32,

    /// Registration URL [default: https://github.com/<owner>/<repo>]
    #[arg(long)]
    pub url: Option<String>,

    /// Owner used when <REPO> has none
    #[arg(long, env = variables::OWNER)]
    pub owner: Option<String>,

    /// Registration token (prompted for when missing)
    #[arg(long, env = variables::TOKEN, hide_env_values = true)]
    pub token: Option<String>,

    /// Extra comma-separated labels
    #[arg(long)]
    pub labels: Option<String>,

    /// Agent release to install
    #[arg(long, env = variables::VERSION)]
    pub runner_version: Option<String>,

    /// Expected SHA-256 of the release archive
    #[arg(long)]
    pub sha256: Option<String>,

    /// Register the runners without installing services
    #[arg(long)]
    pub no_service: bool,

    /// First index to use instead of continuing after the highest one
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    pub start_index: Option<u32>,

    /// Never prompt; missing input is an error
    #[arg(long)]
    pub unattended: bool,
}

/// `[repo] [index]`: everything, one repository, or one runner.
#[derive(Debug, Clone, Args)]
pub struct TargetArgs {
    pub repo: Option<String>,

    #[arg(requires = "repo", value_parser = clap::value_parser!(u32).range(1..))]
    pub index: Option<u32>,
}

#[derive(Debug, Clone, Args)]
pub struct StatusArgs {
    pub repo: Option<String>,
}

#[derive(Debug, Clone, Args)]
pub struct LogsArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Lines to show per runner [default: logLines setting]
    #[arg(short = 'n', long)]
    pub lines: Option<usize>,

    /// Keep printing new lines
    #[arg(short, long)]
    pub follow: bool,
}

#[derive(Debug, Clone, Args)]
pub struct RemoveArgs {
    pub repo: String,

    #[arg(value_parser = clap::value_parser!(u32).range(1..))]
    pub index: Option<u32>,

    /// Removal token used to deregister from GitHub
    #[arg(long, env = variables::TOKEN, hide_env_values = true)]
    pub token: Option<String>,

    /// Do not ask for confirmation
    #[arg(short, long)]
    pub yes: bool,

    /// Never prompt; deregistration is skipped without a token
    #[arg(long)]
    pub unattended: bool,
}

#[derive(Debug, Clone, Args)]
pub struct HealthArgs {
    pub repo: Option<String>,

    /// Also check that the GitHub API is reachable
    #[arg(long)]
    pub online: bool,
}

#[derive(Debug, Clone, Subcommand)]
pub enum ConfigCommand {
    /// Print every setting
    Show,

    /// Change one setting
    Set { key: String, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<CommandSettings, clap::Error> {
        CommandSettings::try_parse_from(std::iter::once("runner-fleet").chain(args.iter().copied()))
    }

    #[test]
    fn setup_defaults_to_one_runner() {
        let settings = parse(&["setup", "octo/widgets"]).unwrap();
        match settings.command {
            Command::Setup(args) => {
                assert_eq!(args.repo, "octo/widgets");
                assert_eq!(args.count, 1);
                assert!(!args.no_service);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn setup_count_is_bounded() {
        assert!(parse(&["setup", "widgets", "0"]).is_err());
        assert!(parse(&["setup", "widgets", "65"]).is_err());
        assert!(parse(&["setup", "widgets", "64"]).is_ok());
    }

    #[test]
    fn control_targets() {
        let settings = parse(&["restart", "widgets", "2"]).unwrap();
        match settings.command {
            Command::Restart(target) => {
                assert_eq!(target.repo.as_deref(), Some("widgets"));
                assert_eq!(target.index, Some(2));
            }
            other => panic!("unexpected command {other:?}"),
        }
        assert!(matches!(parse(&["stop"]).unwrap().command, Command::Stop(TargetArgs { repo: None, index: None })));
        assert!(parse(&["start", "widgets", "0"]).is_err());
    }

    #[test]
    fn global_flags_after_subcommand() {
        let settings = parse(&["status", "--json", "--root", "/srv/runners"]).unwrap();
        assert!(settings.json);
        assert_eq!(settings.root, Some(PathBuf::from("/srv/runners")));
        assert_eq!(settings.command.name(), "status");
    }

    #[test]
    fn logs_options() {
        let settings = parse(&["logs", "widgets", "-n", "20", "-f"]).unwrap();
        match settings.command {
            Command::Logs(args) => {
                assert_eq!(args.lines, Some(20));
                assert!(args.follow);
                assert_eq!(args.target.repo.as_deref(), Some("widgets"));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn config_set() {
        let settings = parse(&["config", "set", "logLines", "80"]).unwrap();
        assert!(matches!(
            settings.command,
            Command::Config(ConfigCommand::Set { ref key, ref value }) if key == "logLines" && value == "80"
        ));
    }

    #[test]
    fn subcommand_is_required() {
        assert!(parse(&[]).is_err());
    }
}
