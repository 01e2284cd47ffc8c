//! Launcher actions and their results.
//!
//! Every user-facing action is a [`Command`]; [`AppState::execute`]
//! dispatches it and returns an [`Outcome`] for the front end to render.
//!
//! [`AppState::execute`]: crate::state::AppState::execute

use crate::process::ProcessStatus;
use crate::version_manager::Guidance;
use crate::versions::AppVersion;
use serde::Serialize;
use std::path::PathBuf;

/// A launcher action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Installed versions with their offered updates.
    List,
    /// Install a release; `None` picks the newest of the requested channel.
    Install {
        version: Option<AppVersion>,
        prerelease: bool,
    },
    /// Install `target` (default: the offered update) and carry data forward.
    Update {
        version: AppVersion,
        target: Option<AppVersion>,
    },
    /// Copy user data between two installed versions.
    Import { from: AppVersion, into: AppVersion },
    Remove { version: AppVersion },
    /// Start the server; `None` launches the newest installed version.
    Launch { version: Option<AppVersion> },
    Stop,
    Status,
    /// Location of a version directory.
    Files { version: AppVersion },
    CheckUpdates,
}

impl Command {
    /// Whether the command may change the set of installed versions.
    pub fn mutates_versions(&self) -> bool {
        matches!(
            self,
            Command::Install { .. }
                | Command::Update { .. }
                | Command::Import { .. }
                | Command::Remove { .. }
        )
    }
}

/// One row of the version list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionEntry {
    pub version: AppVersion,
    pub path: PathBuf,
    pub update: Option<AppVersion>,
    pub running: bool,
}

/// Remote releases compared with the installation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCheck {
    pub latest_stable: Option<AppVersion>,
    pub latest_prerelease: Option<AppVersion>,
    pub latest_installed: Option<AppVersion>,
    /// Newest release, if it is newer than anything installed.
    pub newer_available: Option<AppVersion>,
}

/// Result of a [`Command`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "camelCase")]
pub enum Outcome {
    Versions {
        versions: Vec<VersionEntry>,
    },
    Installed {
        version: AppVersion,
        path: PathBuf,
    },
    #[serde(rename_all = "camelCase")]
    Updated {
        from: AppVersion,
        to: AppVersion,
        path: PathBuf,
        files_copied: u64,
    },
    #[serde(rename_all = "camelCase")]
    Imported {
        from: AppVersion,
        into: AppVersion,
        files_copied: u64,
        missing: Vec<String>,
    },
    Removed {
        version: AppVersion,
    },
    #[serde(rename_all = "camelCase")]
    Launched {
        version: AppVersion,
        pid: u32,
        log_file: Option<PathBuf>,
    },
    Stopped {
        pid: u32,
    },
    Status {
        process: Option<ProcessStatus>,
        guidance: Guidance,
    },
    Files {
        version: AppVersion,
        path: PathBuf,
    },
    Updates(UpdateCheck),
}
