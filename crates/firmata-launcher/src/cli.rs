//! Command-line arguments.

use clap::{Parser, Subcommand, ValueEnum};
use firmata_core::{AppVersion, Command};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "firmata-launcher", version)]
#[command(about = "Install, update and run owlcms-firmata versions")]
pub struct Args {
    /// Installation root (defaults to $FIRMATA_INSTALL_DIR, then the user data directory)
    #[arg(long, global = true, env = "FIRMATA_INSTALL_DIR")]
    pub install_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub debug: bool,

    /// Log line format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Compact)]
    pub log_format: LogFormat,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub action: Action,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Compact,
    Json,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// List installed versions and available updates
    List,
    /// Download and install a release
    Install {
        /// Version to install (default: latest release)
        version: Option<AppVersion>,
        /// Pick the latest pre-release instead of the latest stable release
        #[arg(long, conflicts_with = "version")]
        prerelease: bool,
    },
    /// Install a newer release and copy data and configuration into it
    Update {
        /// Installed version to update from
        version: AppVersion,
        /// Target version (default: the offered update)
        #[arg(long = "to")]
        target: Option<AppVersion>,
    },
    /// Copy database, local files and configuration between installed versions
    Import {
        #[arg(long)]
        from: AppVersion,
        #[arg(long)]
        into: AppVersion,
    },
    /// Delete an installed version
    Remove {
        version: AppVersion,
        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },
    /// Run a version in the foreground until it exits or Ctrl-C is pressed
    Launch {
        /// Version to run (default: latest installed)
        version: Option<AppVersion>,
    },
    /// Stop the running server
    Stop,
    /// Show the running server and installation advice
    Status,
    /// Open a version directory in the file manager
    Files { version: AppVersion },
    /// Compare installed versions with the published releases
    CheckUpdates,
}

impl Action {
    pub fn to_command(&self) -> Command {
        match self.clone() {
            Action::List => Command::List,
            Action::Install {
                version,
                prerelease,
            } => Command::Install {
                version,
                prerelease,
            },
            Action::Update { version, target } => Command::Update { version, target },
            Action::Import { from, into } => Command::Import { from, into },
            Action::Remove { version, .. } => Command::Remove { version },
            Action::Launch { version } => Command::Launch { version },
            Action::Stop => Command::Stop,
            Action::Status => Command::Status,
            Action::Files { version } => Command::Files { version },
            Action::CheckUpdates => Command::CheckUpdates,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn v(s: &str) -> AppVersion {
        AppVersion::parse(s).unwrap()
    }

    #[test]
    fn test_cli_definition() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_update_with_target() {
        let args = Args::parse_from(["firmata-launcher", "update", "1.0.0", "--to", "1.1.0-rc2"]);
        assert_eq!(
            args.action.to_command(),
            Command::Update {
                version: v("1.0.0"),
                target: Some(v("1.1.0-rc2")),
            }
        );
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let args = Args::parse_from([
            "firmata-launcher",
            "list",
            "--install-dir",
            "/opt/firmata",
            "--log-format",
            "json",
            "--debug",
        ]);
        assert_eq!(args.install_dir, Some(PathBuf::from("/opt/firmata")));
        assert_eq!(args.log_format, LogFormat::Json);
        assert!(args.debug);
    }

    #[test]
    fn test_invalid_version_rejected() {
        assert!(Args::try_parse_from(["firmata-launcher", "files", "latest"]).is_err());
    }

    #[test]
    fn test_install_prerelease_conflicts_with_version() {
        assert!(
            Args::try_parse_from(["firmata-launcher", "install", "1.0.0", "--prerelease"]).is_err()
        );
        let args = Args::parse_from(["firmata-launcher", "install", "--prerelease"]);
        assert_eq!(
            args.action.to_command(),
            Command::Install {
                version: None,
                prerelease: true,
            }
        );
    }

    #[test]
    fn test_remove_confirmation_flag() {
        let args = Args::parse_from(["firmata-launcher", "remove", "1.0.0", "--yes"]);
        assert!(matches!(args.action, Action::Remove { yes: true, .. }));
        assert_eq!(args.action.to_command(), Command::Remove { version: v("1.0.0") });
    }
}
