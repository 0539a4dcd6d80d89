use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use pkgkit::BackendKind;

#[derive(Parser)]
#[command(name = "rigger")]
#[command(author = "Rigger Contributors")]
#[command(version)]
#[command(about = "Idempotent provisioning for workstations and role-based fleets", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Only act on this host (with roles defined, it must play one of them)
    #[arg(short = 'H', long, global = true, env = "RIGGER_HOST")]
    pub host: Option<String>,

    /// Roles to act on for host-wide commands (comma-separated)
    #[arg(short = 'R', long, global = true, value_delimiter = ',', default_value = "any")]
    pub roles: Vec<String>,

    /// Hosts to run on at once
    #[arg(short, long, global = true)]
    pub jobs: Option<usize>,

    /// Don't ask before touching several hosts
    #[arg(short, long, global = true)]
    pub yes: bool,

    /// Config file (default: $RIGGER_CONFIG_DIR/config.toml)
    #[arg(long, global = true, env = "RIGGER_CONFIG")]
    pub config: Option<std::path::PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Detect and print target facts
    Detect(DetectArgs),

    /// Manage packages with the target's native package manager
    #[command(subcommand)]
    Pkg(PkgCommand),

    /// Converge supervised services
    #[command(subcommand)]
    Service(ServiceCommand),

    /// Inspect the role map
    #[command(subcommand)]
    Roles(RolesCommand),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args)]
pub struct DetectArgs {
    /// Print facts as JSON
    #[arg(long)]
    pub json: bool,

    /// Also load extended facts (`[facts] extended_command`)
    #[arg(short, long)]
    pub extended: bool,
}

// ============================================================================
// Package Commands
// ============================================================================

#[derive(Subcommand)]
pub enum PkgCommand {
    /// Install packages that are missing
    Add(PkgNamesArgs),

    /// Remove packages that are installed
    Remove(PkgNamesArgs),

    /// Refresh package indexes
    Update(ManagerArg),

    /// Upgrade installed packages
    Upgrade(ManagerArg),

    /// Search packages
    Search {
        /// Search terms
        #[arg(required = true)]
        terms: Vec<String>,

        #[command(flatten)]
        manager: ManagerArg,
    },
}

#[derive(Args)]
pub struct PkgNamesArgs {
    /// Package names; whitespace-separated lists are split
    #[arg(required = true)]
    pub names: Vec<String>,

    /// Stop at the first failing package
    #[arg(long)]
    pub fail_fast: bool,

    #[command(flatten)]
    pub manager: ManagerArg,
}

#[derive(Args)]
pub struct ManagerArg {
    /// Use a language package manager (pip2, pip3, npm, gem) instead of the
    /// system one
    #[arg(long = "with", value_name = "MANAGER", value_parser = parse_language)]
    pub language: Option<BackendKind>,
}

fn parse_language(s: &str) -> Result<BackendKind, String> {
    let kind: BackendKind = s.parse()?;
    if kind.is_language() {
        Ok(kind)
    } else {
        Err(format!("{kind} is the system package manager, drop --with"))
    }
}

// ============================================================================
// Service Commands
// ============================================================================

#[derive(Subcommand)]
pub enum ServiceCommand {
    /// Render, deploy and restart or reload what changed
    Configure {
        #[command(flatten)]
        target: ServiceTarget,

        /// Leave unchanged services running
        #[arg(long)]
        fast: bool,
    },

    /// Show supervisor status
    Status(ServiceTarget),

    /// Stop and remove deployed services
    Remove(ServiceTarget),
}

#[derive(Args)]
pub struct ServiceTarget {
    /// Roles whose services to act on
    #[arg(required = true)]
    pub roles: Vec<String>,

    /// Variant distinguishing parallel deployments
    #[arg(long)]
    pub variant: Option<String>,
}

// ============================================================================
// Roles Commands
// ============================================================================

#[derive(Subcommand)]
pub enum RolesCommand {
    /// List roles and their hosts
    List,

    /// Show the hosts of one role
    Show {
        /// Role name (`any` for every host)
        role: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "rigger", "pkg", "add", "htop git", "-H", "web1", "-R", "web,worker", "-y",
        ])
        .unwrap();
        assert_eq!(cli.host.as_deref(), Some("web1"));
        assert_eq!(cli.roles, vec!["web", "worker"]);
        assert!(cli.yes);
        let Command::Pkg(PkgCommand::Add(args)) = cli.command else {
            panic!("expected pkg add");
        };
        assert_eq!(args.names, vec!["htop git"]);
        assert_eq!(args.manager.language, None);
    }

    #[test]
    fn test_language_manager_flag() {
        let cli = Cli::try_parse_from(["rigger", "pkg", "add", "flask", "--with", "pip3"]).unwrap();
        let Command::Pkg(PkgCommand::Add(args)) = cli.command else {
            panic!("expected pkg add");
        };
        assert_eq!(args.manager.language, Some(BackendKind::Pip3));

        let cli = Cli::try_parse_from(["rigger", "pkg", "upgrade", "--with", "npm"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Pkg(PkgCommand::Upgrade(ManagerArg { language: Some(BackendKind::Npm) }))
        ));

        assert!(Cli::try_parse_from(["rigger", "pkg", "add", "htop", "--with", "apt"]).is_err());
    }

    #[test]
    fn test_service_configure() {
        let cli = Cli::try_parse_from([
            "rigger", "service", "configure", "web", "worker_low", "--variant", "blue", "--fast",
        ])
        .unwrap();
        assert_eq!(cli.roles, vec!["any"]);
        let Command::Service(ServiceCommand::Configure { target, fast }) = cli.command else {
            panic!("expected service configure");
        };
        assert!(fast);
        assert_eq!(target.roles, vec!["web", "worker_low"]);
        assert_eq!(target.variant.as_deref(), Some("blue"));
    }
}
