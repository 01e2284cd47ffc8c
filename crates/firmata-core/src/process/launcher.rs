//! Building and spawning the server command line.

use crate::config::PathsConfig;
use crate::versions::AppVersion;
use crate::{FirmataError, Result};
use chrono::{DateTime, Local};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use tracing::{error, info};

/// Configuration for launching one installed version.
#[derive(Debug, Clone)]
pub struct LaunchConfig {
    /// Version being launched.
    pub version: AppVersion,
    /// Version directory, used as the working directory.
    pub version_dir: PathBuf,
    /// `java` executable.
    pub java_path: PathBuf,
    /// Application jar inside the version directory.
    pub jar_path: PathBuf,
    /// Arguments placed before `-jar`.
    pub jvm_args: Vec<String>,
    /// Arguments placed after the jar.
    pub app_args: Vec<String>,
    /// Where stdout and stderr go. `None` discards output.
    pub log_file: Option<PathBuf>,
}

impl LaunchConfig {
    pub fn new(
        version: AppVersion,
        version_dir: impl AsRef<Path>,
        java_path: impl AsRef<Path>,
        artifact_name: &str,
    ) -> Self {
        let version_dir = version_dir.as_ref().to_path_buf();
        Self {
            version,
            jar_path: version_dir.join(artifact_name),
            version_dir,
            java_path: java_path.as_ref().to_path_buf(),
            jvm_args: Vec::new(),
            app_args: Vec::new(),
            log_file: None,
        }
    }

    pub fn with_jvm_args(mut self, args: Vec<String>) -> Self {
        self.jvm_args = args;
        self
    }

    pub fn with_app_args(mut self, args: Vec<String>) -> Self {
        self.app_args = args;
        self
    }

    pub fn with_log_file(mut self, path: impl AsRef<Path>) -> Self {
        self.log_file = Some(path.as_ref().to_path_buf());
        self
    }

    /// Use the conventional log location under `<install_root>/logs`.
    pub fn with_default_log_file(self, install_root: &Path) -> Self {
        let path = install_root
            .join(PathsConfig::LOGS_DIR_NAME)
            .join(log_file_name(&self.version, Local::now()));
        self.with_log_file(path)
    }

    /// Arguments passed to `java`, in order.
    pub fn arguments(&self) -> Vec<String> {
        let mut args = self.jvm_args.clone();
        args.push("-jar".to_string());
        args.push(self.jar_path.display().to_string());
        args.extend(self.app_args.iter().cloned());
        args
    }

    fn failure(&self, message: impl Into<String>) -> FirmataError {
        FirmataError::LaunchFailed {
            version: self.version.to_string(),
            message: message.into(),
        }
    }

    /// Spawn the server process.
    ///
    /// Nothing is left behind on failure apart from an empty log file.
    pub fn spawn(&self) -> Result<Child> {
        if !self.version_dir.is_dir() {
            return Err(self.failure(format!(
                "version directory not found: {}",
                self.version_dir.display()
            )));
        }
        if !self.jar_path.is_file() {
            return Err(self.failure(format!("jar not found: {}", self.jar_path.display())));
        }

        let mut cmd = Command::new(&self.java_path);
        cmd.args(self.arguments());
        cmd.current_dir(&self.version_dir);
        cmd.stdin(Stdio::null());

        match &self.log_file {
            Some(log_file) => {
                if let Some(parent) = log_file.parent() {
                    fs::create_dir_all(parent).map_err(|e| FirmataError::io_with_path(e, parent))?;
                }
                let file =
                    fs::File::create(log_file).map_err(|e| FirmataError::io_with_path(e, log_file))?;
                let stdout_file = file
                    .try_clone()
                    .map_err(|e| FirmataError::io_with_path(e, log_file))?;
                cmd.stdout(Stdio::from(stdout_file));
                cmd.stderr(Stdio::from(file));
            }
            None => {
                cmd.stdout(Stdio::null());
                cmd.stderr(Stdio::null());
            }
        }

        info!(
            "Launching owlcms-firmata {} from {}",
            self.version,
            self.version_dir.display()
        );

        cmd.spawn().map_err(|e| {
            error!("Failed to spawn {}: {}", self.java_path.display(), e);
            self.failure(format!("failed to start {}: {}", self.java_path.display(), e))
        })
    }
}

/// `firmata_<version>_<YYYYmmdd_HHMMSS>.log`
pub fn log_file_name(version: &AppVersion, at: DateTime<Local>) -> String {
    format!("firmata_{}_{}.log", version, at.format("%Y%m%d_%H%M%S"))
}
