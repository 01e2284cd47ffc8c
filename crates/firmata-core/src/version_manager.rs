//! Installed versions under the installation root.
//!
//! Each version lives in `<root>/<version>/` and holds the application jar
//! plus the user data directories (`database/`, `local/`, `config/`).

use crate::config::LauncherSettings;
use crate::fs_utils::{self, CarryForwardReport, CopyOptions};
use crate::network::ArtifactDownloader;
use crate::versions::{self, AppVersion};
use crate::{FirmataError, Result};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// What the user should be told about their installation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Guidance {
    /// No release metadata could be obtained.
    Offline,
    NothingInstalled,
    /// A single version that is not the newest of its channel.
    SingleOutdated { installed: String },
    SingleCurrent { installed: String },
    SeveralInstalled { count: usize },
}

impl Guidance {
    pub fn message(&self) -> String {
        match self {
            Guidance::Offline => {
                "You are not connected to the Internet. Available updates cannot be shown."
                    .to_string()
            }
            Guidance::NothingInstalled => {
                "No version is installed. Use the install command to download one.".to_string()
            }
            Guidance::SingleOutdated { .. } => "Use the update command to install the latest \
                 version. The current database will be copied to the new version, as well as \
                 local changes made to the configuration since the previous installation."
                .to_string(),
            Guidance::SingleCurrent { installed } => {
                format!("Version {} is the most recent release.", installed)
            }
            Guidance::SeveralInstalled { .. } => "You have several versions installed. Use the \
                 import command if you wish to copy the database and local configuration \
                 changes from a previous version."
                .to_string(),
        }
    }
}

/// Result of a successful update.
#[derive(Debug, Clone)]
pub struct UpdateReport {
    pub from: AppVersion,
    pub to: AppVersion,
    pub path: PathBuf,
    pub carried: CarryForwardReport,
}

/// Manages version directories in one installation root.
pub struct VersionManager {
    install_root: PathBuf,
    settings: LauncherSettings,
}

impl VersionManager {
    pub fn new(install_root: impl Into<PathBuf>, settings: LauncherSettings) -> Self {
        Self {
            install_root: install_root.into(),
            settings,
        }
    }

    pub fn install_root(&self) -> &Path {
        &self.install_root
    }

    pub fn settings(&self) -> &LauncherSettings {
        &self.settings
    }

    /// Installed versions, newest first.
    ///
    /// Entries that are not directories or whose names are not versions are
    /// ignored. An unreadable root yields an empty list.
    pub fn installed_versions(&self) -> Vec<AppVersion> {
        let entries = match fs::read_dir(&self.install_root) {
            Ok(entries) => entries,
            Err(e) => {
                debug!(
                    "Cannot read installation root {}: {}",
                    self.install_root.display(),
                    e
                );
                return Vec::new();
            }
        };

        let mut found: Vec<AppVersion> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().map(|t| t.is_dir()).unwrap_or(false))
            .filter_map(|entry| entry.file_name().to_str().and_then(AppVersion::from_dir_name))
            .collect();
        versions::sort_newest_first(&mut found);
        found
    }

    pub fn latest_installed(&self) -> Option<AppVersion> {
        self.installed_versions().into_iter().next()
    }

    pub fn latest_stable_installed(&self) -> Option<AppVersion> {
        versions::latest_stable(&self.installed_versions())
    }

    pub fn latest_prerelease_installed(&self) -> Option<AppVersion> {
        versions::latest_prerelease(&self.installed_versions())
    }

    pub fn version_path(&self, version: &AppVersion) -> PathBuf {
        self.install_root.join(version.to_string())
    }

    pub fn is_installed(&self, version: &AppVersion) -> bool {
        self.version_path(version).is_dir()
    }

    fn require_installed(&self, version: &AppVersion) -> Result<PathBuf> {
        let path = self.version_path(version);
        if path.is_dir() {
            Ok(path)
        } else {
            Err(FirmataError::VersionNotFound {
                version: version.to_string(),
            })
        }
    }

    fn copy_options(&self) -> CopyOptions {
        CopyOptions::default().with_freshness_filter(self.settings.carry_forward_freshness_filter)
    }

    /// Download a release into a new version directory.
    ///
    /// The directory is removed again if the download fails. Versions whose
    /// name would not be listed as an installed version are rejected.
    pub async fn install(
        &self,
        version: &AppVersion,
        downloader: &dyn ArtifactDownloader,
    ) -> Result<PathBuf> {
        if !versions::is_version_dir_name(&version.to_string()) {
            return Err(FirmataError::InvalidVersion {
                version: version.to_string(),
            });
        }

        let dir = self.version_path(version);
        if dir.exists() {
            return Err(FirmataError::VersionAlreadyInstalled {
                version: version.to_string(),
            });
        }

        fs::create_dir_all(&dir).map_err(|e| FirmataError::io_with_path(e, &dir))?;
        let url = self.settings.artifact_url(&version.to_string());
        let jar = dir.join(&self.settings.artifact_name);

        match downloader.download(&url, &jar).await {
            Ok(bytes) => {
                info!("Installed {} ({} bytes) in {}", version, bytes, dir.display());
                Ok(dir)
            }
            Err(e) => {
                self.discard(&dir);
                Err(e)
            }
        }
    }

    /// Install `target` and carry the user data of `existing` into it.
    ///
    /// `existing` is left in place. On any failure the new directory is
    /// removed.
    pub async fn update(
        &self,
        existing: &AppVersion,
        target: &AppVersion,
        downloader: &dyn ArtifactDownloader,
    ) -> Result<UpdateReport> {
        let from_dir = self.require_installed(existing)?;
        if existing == target {
            return Err(FirmataError::Validation {
                field: "target".to_string(),
                message: format!("{} is already the installed version", target),
            });
        }

        info!("Updating {} to {}", existing, target);
        let path = self.install(target, downloader).await?;

        match fs_utils::carry_forward(&from_dir, &path, self.copy_options()) {
            Ok(carried) => {
                info!(
                    "Updated {} to {}, {} files carried forward",
                    existing,
                    target,
                    carried.total_files()
                );
                Ok(UpdateReport {
                    from: existing.clone(),
                    to: target.clone(),
                    path,
                    carried,
                })
            }
            Err(e) => {
                self.discard(&path);
                Err(e)
            }
        }
    }

    /// Copy user data from one installed version into another.
    pub fn import(&self, from: &AppVersion, into: &AppVersion) -> Result<CarryForwardReport> {
        if from == into {
            return Err(FirmataError::Validation {
                field: "from".to_string(),
                message: "source and destination versions must differ".to_string(),
            });
        }
        let from_dir = self.require_installed(from)?;
        let into_dir = self.require_installed(into)?;

        info!("Importing data from {} into {}", from, into);
        fs_utils::carry_forward(&from_dir, &into_dir, self.copy_options())
    }

    /// Delete a version directory.
    pub fn remove(&self, version: &AppVersion) -> Result<()> {
        let dir = self.require_installed(version)?;
        info!("Removing version {}", version);
        fs::remove_dir_all(&dir).map_err(|e| FirmataError::io_with_path(e, &dir))
    }

    /// Release offered as an update for `version`, if any.
    ///
    /// Nothing is offered at all once the newest remote release of either
    /// channel is installed. Otherwise stable versions are offered the newest
    /// stable release and pre-releases the newest pre-release, when newer.
    pub fn update_target(
        &self,
        version: &AppVersion,
        remote_stable: Option<&AppVersion>,
        remote_prerelease: Option<&AppVersion>,
    ) -> Option<AppVersion> {
        let installed = self.installed_versions();
        update_target_for(version, &installed, remote_stable, remote_prerelease)
    }

    /// Advice for the current installation state.
    pub fn guidance(
        &self,
        has_release_data: bool,
        remote_stable: Option<&AppVersion>,
        remote_prerelease: Option<&AppVersion>,
    ) -> Guidance {
        if !has_release_data {
            return Guidance::Offline;
        }

        let installed = self.installed_versions();
        match installed.as_slice() {
            [] => Guidance::NothingInstalled,
            [only] => {
                let latest = if only.is_prerelease() {
                    remote_prerelease
                } else {
                    remote_stable
                };
                match latest {
                    Some(latest) if latest > only => Guidance::SingleOutdated {
                        installed: only.to_string(),
                    },
                    _ => Guidance::SingleCurrent {
                        installed: only.to_string(),
                    },
                }
            }
            several => Guidance::SeveralInstalled {
                count: several.len(),
            },
        }
    }

    fn discard(&self, dir: &Path) {
        if let Err(e) = fs::remove_dir_all(dir) {
            warn!("Failed to clean up {}: {}", dir.display(), e);
        }
    }
}

/// [`VersionManager::update_target`] over an explicit installed list.
pub fn update_target_for(
    version: &AppVersion,
    installed: &[AppVersion],
    remote_stable: Option<&AppVersion>,
    remote_prerelease: Option<&AppVersion>,
) -> Option<AppVersion> {
    let stable_current = remote_stable.is_some()
        && versions::latest_stable(installed).as_ref() == remote_stable;
    let prerelease_current = remote_prerelease.is_some()
        && versions::latest_prerelease(installed).as_ref() == remote_prerelease;
    if stable_current || prerelease_current {
        return None;
    }

    let candidate = if version.is_prerelease() {
        remote_prerelease
    } else {
        remote_stable
    }?;
    (candidate > version).then(|| candidate.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tempfile::TempDir;

    fn v(s: &str) -> AppVersion {
        AppVersion::parse(s).unwrap()
    }

    fn manager(temp_dir: &TempDir) -> VersionManager {
        VersionManager::new(temp_dir.path(), LauncherSettings::default())
    }

    fn make_version(temp_dir: &TempDir, name: &str) -> PathBuf {
        let dir = temp_dir.path().join(name);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    struct FakeDownloader {
        fail: bool,
        urls: Mutex<Vec<String>>,
    }

    impl FakeDownloader {
        fn new(fail: bool) -> Self {
            Self {
                fail,
                urls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ArtifactDownloader for FakeDownloader {
        async fn download(&self, url: &str, dest: &Path) -> Result<u64> {
            self.urls.lock().unwrap().push(url.to_string());
            if self.fail {
                return Err(FirmataError::DownloadFailed {
                    url: url.to_string(),
                    message: "server returned 404 Not Found".to_string(),
                });
            }
            fs::write(dest, b"jar").unwrap();
            Ok(3)
        }
    }

    #[test]
    fn test_enumeration_filters_and_sorts() {
        let temp_dir = TempDir::new().unwrap();
        for name in ["1.2.0", "1.10.0", "2.0.0-rc1", "2.0.0", "latest", "1.0", "3.0.0-gamma"] {
            make_version(&temp_dir, name);
        }
        fs::write(temp_dir.path().join("4.0.0"), "a file, not a directory").unwrap();

        let found: Vec<String> = manager(&temp_dir)
            .installed_versions()
            .iter()
            .map(|v| v.to_string())
            .collect();
        assert_eq!(found, vec!["2.0.0", "2.0.0-rc1", "1.10.0", "1.2.0"]);
    }

    #[test]
    fn test_unreadable_root_is_empty() {
        let manager = VersionManager::new("/definitely/not/here", LauncherSettings::default());
        assert!(manager.installed_versions().is_empty());
        assert!(manager.latest_installed().is_none());
    }

    #[test]
    fn test_latest_per_channel() {
        let temp_dir = TempDir::new().unwrap();
        for name in ["1.0.0", "1.1.0-beta", "1.1.0"] {
            make_version(&temp_dir, name);
        }
        let manager = manager(&temp_dir);
        assert_eq!(manager.latest_installed(), Some(v("1.1.0")));
        assert_eq!(manager.latest_stable_installed(), Some(v("1.1.0")));
        assert_eq!(manager.latest_prerelease_installed(), Some(v("1.1.0-beta")));
    }

    #[tokio::test]
    async fn test_install_downloads_artifact() {
        let temp_dir = TempDir::new().unwrap();
        let manager = manager(&temp_dir);
        let downloader = FakeDownloader::new(false);

        let path = manager.install(&v("2.1.0"), &downloader).await.unwrap();
        assert!(path.join("owlcms-firmata.jar").exists());
        assert_eq!(
            downloader.urls.lock().unwrap()[0],
            "https://github.com/jflamy/owlcms-firmata/releases/download/2.1.0/owlcms-firmata.jar"
        );

        let again = manager.install(&v("2.1.0"), &downloader).await;
        assert!(matches!(again, Err(FirmataError::VersionAlreadyInstalled { .. })));
    }

    #[tokio::test]
    async fn test_failed_install_leaves_no_directory() {
        let temp_dir = TempDir::new().unwrap();
        let manager = manager(&temp_dir);

        let result = manager.install(&v("2.1.0"), &FakeDownloader::new(true)).await;
        assert!(matches!(result, Err(FirmataError::DownloadFailed { .. })));
        assert!(!manager.is_installed(&v("2.1.0")));
    }

    #[tokio::test]
    async fn test_install_rejects_unlistable_versions() {
        let temp_dir = TempDir::new().unwrap();
        let manager = manager(&temp_dir);
        let downloader = FakeDownloader::new(false);

        for name in ["1.1.0-rc.1", "1.0.0+build", "2.0.0-gamma"] {
            let result = manager.install(&v(name), &downloader).await;
            assert!(
                matches!(result, Err(FirmataError::InvalidVersion { .. })),
                "{} should be rejected",
                name
            );
            assert!(!temp_dir.path().join(name).exists());
        }
        assert!(downloader.urls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_to_unlistable_version_copies_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let old = make_version(&temp_dir, "1.0.0");
        fs::create_dir_all(old.join("database")).unwrap();
        fs::write(old.join("database/owlcms.mv.db"), "data").unwrap();
        let manager = manager(&temp_dir);

        let result = manager
            .update(&v("1.0.0"), &v("1.1.0-rc.1"), &FakeDownloader::new(false))
            .await;
        assert!(matches!(result, Err(FirmataError::InvalidVersion { .. })));
        assert!(!temp_dir.path().join("1.1.0-rc.1").exists());
        assert_eq!(manager.installed_versions(), vec![v("1.0.0")]);
    }

    #[tokio::test]
    async fn test_update_carries_data_and_keeps_old_version() {
        let temp_dir = TempDir::new().unwrap();
        let old = make_version(&temp_dir, "1.0.0");
        fs::create_dir_all(old.join("database")).unwrap();
        fs::write(old.join("database/owlcms.mv.db"), "data").unwrap();
        fs::create_dir_all(old.join("config")).unwrap();
        fs::write(old.join("config/devices.json"), "{}").unwrap();
        let manager = manager(&temp_dir);

        let report = manager
            .update(&v("1.0.0"), &v("1.1.0"), &FakeDownloader::new(false))
            .await
            .unwrap();

        assert_eq!(report.carried.total_files(), 2);
        assert_eq!(report.carried.missing, vec!["local".to_string()]);
        assert!(report.path.join("database/owlcms.mv.db").exists());
        assert!(report.path.join("owlcms-firmata.jar").exists());
        assert!(manager.is_installed(&v("1.0.0")));
    }

    #[tokio::test]
    async fn test_update_rolls_back_on_download_failure() {
        let temp_dir = TempDir::new().unwrap();
        make_version(&temp_dir, "1.0.0");
        let manager = manager(&temp_dir);

        let result = manager
            .update(&v("1.0.0"), &v("1.1.0"), &FakeDownloader::new(true))
            .await;
        assert!(result.is_err());
        assert_eq!(manager.installed_versions(), vec![v("1.0.0")]);
    }

    #[tokio::test]
    async fn test_update_requires_existing_version() {
        let temp_dir = TempDir::new().unwrap();
        let manager = manager(&temp_dir);
        let result = manager
            .update(&v("1.0.0"), &v("1.1.0"), &FakeDownloader::new(false))
            .await;
        assert!(matches!(result, Err(FirmataError::VersionNotFound { .. })));
    }

    #[test]
    fn test_import_validation() {
        let temp_dir = TempDir::new().unwrap();
        let from = make_version(&temp_dir, "1.0.0");
        make_version(&temp_dir, "1.1.0");
        fs::create_dir_all(from.join("local")).unwrap();
        fs::write(from.join("local/custom.css"), "body{}").unwrap();
        let manager = manager(&temp_dir);

        assert!(matches!(
            manager.import(&v("1.0.0"), &v("1.0.0")),
            Err(FirmataError::Validation { .. })
        ));
        assert!(matches!(
            manager.import(&v("0.9.0"), &v("1.0.0")),
            Err(FirmataError::VersionNotFound { .. })
        ));

        let report = manager.import(&v("1.0.0"), &v("1.1.0")).unwrap();
        assert_eq!(report.total_files(), 1);
        assert!(temp_dir.path().join("1.1.0/local/custom.css").exists());
    }

    #[test]
    fn test_remove() {
        let temp_dir = TempDir::new().unwrap();
        let dir = make_version(&temp_dir, "1.0.0");
        fs::write(dir.join("owlcms-firmata.jar"), "jar").unwrap();
        make_version(&temp_dir, "1.1.0");
        let manager = manager(&temp_dir);

        manager.remove(&v("1.0.0")).unwrap();
        assert!(!dir.exists());
        assert_eq!(manager.installed_versions(), vec![v("1.1.0")]);
        assert!(matches!(
            manager.remove(&v("1.0.0")),
            Err(FirmataError::VersionNotFound { .. })
        ));
    }

    #[test]
    fn test_update_target_offers_newer_release_per_channel() {
        let installed = vec![v("1.0.0"), v("1.1.0-rc1")];
        let stable = v("1.1.0");
        let pre = v("1.2.0-rc2");

        assert_eq!(
            update_target_for(&v("1.0.0"), &installed, Some(&stable), Some(&pre)),
            Some(v("1.1.0"))
        );
        assert_eq!(
            update_target_for(&v("1.1.0-rc1"), &installed, Some(&stable), Some(&pre)),
            Some(v("1.2.0-rc2"))
        );
        assert_eq!(
            update_target_for(&v("1.0.0"), &installed, None, Some(&pre)),
            None
        );
    }

    #[test]
    fn test_update_target_suppressed_when_latest_installed() {
        // Latest stable installed suppresses offers for every version.
        let installed = vec![v("1.1.0"), v("1.0.0"), v("1.1.0-rc1")];
        let stable = v("1.1.0");
        let pre = v("1.2.0-rc2");
        assert_eq!(
            update_target_for(&v("1.0.0"), &installed, Some(&stable), Some(&pre)),
            None
        );
        assert_eq!(
            update_target_for(&v("1.1.0-rc1"), &installed, Some(&stable), Some(&pre)),
            None
        );
    }

    #[test]
    fn test_guidance() {
        let temp_dir = TempDir::new().unwrap();
        let manager = manager(&temp_dir);
        let stable = v("1.1.0");

        assert_eq!(manager.guidance(false, None, None), Guidance::Offline);
        assert_eq!(
            manager.guidance(true, Some(&stable), None),
            Guidance::NothingInstalled
        );

        make_version(&temp_dir, "1.0.0");
        assert!(matches!(
            manager.guidance(true, Some(&stable), None),
            Guidance::SingleOutdated { .. }
        ));
        assert!(matches!(
            manager.guidance(true, Some(&v("1.0.0")), None),
            Guidance::SingleCurrent { .. }
        ));

        make_version(&temp_dir, "1.1.0");
        assert_eq!(
            manager.guidance(true, Some(&stable), None),
            Guidance::SeveralInstalled { count: 2 }
        );
    }
}
