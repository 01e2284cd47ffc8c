//! Centralized configuration for the firmata launcher.
//!
//! Compile-time constants live in the `*Config` structs. Per-installation
//! overrides are read from `launcher.json` in the installation root into
//! [`LauncherSettings`].

use crate::error::{FirmataError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Application-level configuration.
pub struct AppConfig;

impl AppConfig {
    pub const APP_NAME: &'static str = "owlcms-firmata";
    pub const GITHUB_REPO: &'static str = "jflamy/owlcms-firmata";
    pub const ARTIFACT_NAME: &'static str = "owlcms-firmata.jar";
    pub const RELEASE_DOWNLOAD_BASE: &'static str = "https://github.com";
    pub const INSTALL_DIR_ENV: &'static str = "FIRMATA_INSTALL_DIR";
}

/// Network-related configuration.
pub struct NetworkConfig;

impl NetworkConfig {
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
    pub const DOWNLOAD_REQUEST_TIMEOUT: Duration = Duration::from_secs(300);
    pub const MAX_RETRIES: u32 = 3;
    pub const DOWNLOAD_PROGRESS_INTERVAL: Duration = Duration::from_millis(500);
    pub const DOWNLOAD_TEMP_SUFFIX: &'static str = ".part";
    pub const GITHUB_API_BASE: &'static str = "https://api.github.com";
    pub const GITHUB_RELEASES_PER_PAGE: u32 = 100;
    pub const GITHUB_RELEASES_MAX_PAGES: u32 = 3;
    pub const GITHUB_RELEASES_TTL: Duration = Duration::from_secs(3600);
    pub const USER_AGENT: &'static str = "firmata-launcher/0.4";
}

/// Directory and file names inside the installation root.
pub struct PathsConfig;

impl PathsConfig {
    pub const DATABASE_DIR_NAME: &'static str = "database";
    pub const LOCAL_DIR_NAME: &'static str = "local";
    pub const CONFIG_DIR_NAME: &'static str = "config";
    pub const CACHE_DIR_NAME: &'static str = "cache";
    pub const LOGS_DIR_NAME: &'static str = "logs";
    pub const PID_FILE_NAME: &'static str = "firmata.pid";
    pub const SETTINGS_FILE_NAME: &'static str = "launcher.json";

    /// Subdirectories carried forward from one version to another.
    pub const CARRY_FORWARD_DIRS: [&'static str; 3] = [
        Self::DATABASE_DIR_NAME,
        Self::LOCAL_DIR_NAME,
        Self::CONFIG_DIR_NAME,
    ];
}

/// Child process supervision.
pub struct ProcessConfig;

impl ProcessConfig {
    /// Grace period between SIGTERM and SIGKILL.
    pub const STOP_TIMEOUT: Duration = Duration::from_secs(5);
    /// How often the foreground loop checks whether the child exited.
    pub const POLL_INTERVAL: Duration = Duration::from_millis(500);
}

/// Java runtime discovery and installation.
pub struct RuntimeConfig;

impl RuntimeConfig {
    pub const JAVA_FEATURE_VERSION: u32 = 17;
    pub const ADOPTIUM_API_BASE: &'static str = "https://api.adoptium.net/v3";
    pub const VERSION_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

    /// Directory under the installation root holding the managed JRE.
    pub fn managed_runtime_dir_name(feature_version: u32) -> String {
        format!("java{}", feature_version)
    }
}

/// Per-installation settings, read from `launcher.json`.
///
/// Every field has a default so a partial file is valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LauncherSettings {
    /// GitHub `owner/name` the releases come from.
    pub github_repo: String,
    /// Release asset downloaded into each version directory.
    pub artifact_name: String,
    /// Arguments placed before `-jar`.
    pub jvm_args: Vec<String>,
    /// Arguments placed after the jar path.
    pub app_args: Vec<String>,
    /// Skip files older than the source directory when carrying data forward.
    pub carry_forward_freshness_filter: bool,
    /// Minimum Java feature release required to run the server.
    pub java_feature_version: u32,
    /// How long fetched release metadata stays fresh.
    pub release_cache_ttl_secs: u64,
}

impl Default for LauncherSettings {
    fn default() -> Self {
        Self {
            github_repo: AppConfig::GITHUB_REPO.to_string(),
            artifact_name: AppConfig::ARTIFACT_NAME.to_string(),
            jvm_args: Vec::new(),
            app_args: Vec::new(),
            carry_forward_freshness_filter: false,
            java_feature_version: RuntimeConfig::JAVA_FEATURE_VERSION,
            release_cache_ttl_secs: NetworkConfig::GITHUB_RELEASES_TTL.as_secs(),
        }
    }
}

impl LauncherSettings {
    /// Load settings from the installation root, falling back to defaults
    /// when the file does not exist.
    pub fn load(install_root: &Path) -> Result<Self> {
        let path = install_root.join(PathsConfig::SETTINGS_FILE_NAME);
        if !path.exists() {
            debug!("No settings file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let contents =
            std::fs::read_to_string(&path).map_err(|e| FirmataError::io_with_path(e, &path))?;
        let settings: Self = serde_json::from_str(&contents).map_err(|e| FirmataError::Config {
            message: format!("Failed to parse {}: {}", path.display(), e),
        })?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject settings that would produce unusable URLs or paths.
    pub fn validate(&self) -> Result<()> {
        let mut parts = self.github_repo.split('/');
        let valid_repo = matches!(
            (parts.next(), parts.next(), parts.next()),
            (Some(owner), Some(name), None) if !owner.is_empty() && !name.is_empty()
        );
        if !valid_repo {
            return Err(FirmataError::Validation {
                field: "githubRepo".to_string(),
                message: format!("expected owner/name, got '{}'", self.github_repo),
            });
        }

        if self.artifact_name.is_empty()
            || self.artifact_name.contains('/')
            || self.artifact_name.contains('\\')
        {
            return Err(FirmataError::Validation {
                field: "artifactName".to_string(),
                message: format!("'{}' is not a plain file name", self.artifact_name),
            });
        }

        if self.java_feature_version < 8 {
            warn!(
                "javaFeatureVersion {} is unusually low",
                self.java_feature_version
            );
        }

        Ok(())
    }

    /// Cache TTL as a duration.
    pub fn release_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.release_cache_ttl_secs)
    }

    /// Download URL of the release artifact for a version.
    pub fn artifact_url(&self, version: &str) -> String {
        format!(
            "{}/{}/releases/download/{}/{}",
            AppConfig::RELEASE_DOWNLOAD_BASE,
            self.github_repo,
            version,
            self.artifact_name
        )
    }
}

/// Resolve the installation root.
///
/// Priority: explicit path, then `FIRMATA_INSTALL_DIR`, then the platform
/// data directory.
pub fn resolve_install_root(explicit: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path);
    }

    if let Some(path) = std::env::var_os(AppConfig::INSTALL_DIR_ENV) {
        if !path.is_empty() {
            return Ok(PathBuf::from(path));
        }
    }

    dirs::data_dir()
        .map(|dir| dir.join(AppConfig::APP_NAME))
        .ok_or_else(|| FirmataError::Config {
            message: "Could not determine the user data directory".to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_when_file_missing() {
        let temp_dir = TempDir::new().unwrap();
        let settings = LauncherSettings::load(temp_dir.path()).unwrap();
        assert_eq!(settings, LauncherSettings::default());
        assert!(!settings.carry_forward_freshness_filter);
        assert_eq!(settings.java_feature_version, 17);
    }

    #[test]
    fn test_partial_settings_file() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(
            temp_dir.path().join(PathsConfig::SETTINGS_FILE_NAME),
            r#"{"jvmArgs": ["-Xmx512m"], "carryForwardFreshnessFilter": true}"#,
        )
        .unwrap();

        let settings = LauncherSettings::load(temp_dir.path()).unwrap();
        assert_eq!(settings.jvm_args, vec!["-Xmx512m".to_string()]);
        assert!(settings.carry_forward_freshness_filter);
        assert_eq!(settings.github_repo, AppConfig::GITHUB_REPO);
    }

    #[test]
    fn test_malformed_settings_file() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(
            temp_dir.path().join(PathsConfig::SETTINGS_FILE_NAME),
            "{ not json",
        )
        .unwrap();

        let err = LauncherSettings::load(temp_dir.path()).unwrap_err();
        assert!(matches!(err, FirmataError::Config { .. }));
    }

    #[test]
    fn test_invalid_repo_rejected() {
        let settings = LauncherSettings {
            github_repo: "no-slash".to_string(),
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_artifact_url() {
        let settings = LauncherSettings::default();
        assert_eq!(
            settings.artifact_url("2.1.0"),
            "https://github.com/jflamy/owlcms-firmata/releases/download/2.1.0/owlcms-firmata.jar"
        );
    }

    #[test]
    fn test_explicit_install_root_wins() {
        let root = resolve_install_root(Some(PathBuf::from("/opt/firmata"))).unwrap();
        assert_eq!(root, PathBuf::from("/opt/firmata"));
    }
}
