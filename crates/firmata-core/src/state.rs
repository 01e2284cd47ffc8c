//! Application state and command dispatch.

use crate::commands::{Command, Outcome, UpdateCheck, VersionEntry};
use crate::config::{LauncherSettings, PathsConfig};
use crate::network::{ArtifactDownloader, GitHubReleaseIndex, HttpClient, HttpDownloader, ReleaseIndex};
use crate::process::{LaunchConfig, ProcessExit, ProcessSupervisor};
use crate::runtime::{JavaRuntimeManager, RuntimeProvider};
use crate::version_manager::VersionManager;
use crate::versions::{self, AppVersion};
use crate::{FirmataError, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Latest remote releases, or nothing when the index is unreachable.
#[derive(Debug, Clone, Default)]
struct RemoteLatest {
    available: bool,
    stable: Option<AppVersion>,
    prerelease: Option<AppVersion>,
}

/// Everything the launcher knows and owns, passed explicitly to handlers.
pub struct AppState {
    versions: VersionManager,
    supervisor: ProcessSupervisor,
    releases: Box<dyn ReleaseIndex>,
    downloader: Box<dyn ArtifactDownloader>,
    runtime: Box<dyn RuntimeProvider>,
    installed: Vec<AppVersion>,
}

impl AppState {
    /// Build the state for an installation root with the real collaborators.
    pub fn new(install_root: impl Into<PathBuf>) -> Result<Self> {
        let install_root = install_root.into();
        let settings = LauncherSettings::load(&install_root)?;

        let releases = GitHubReleaseIndex::new(
            HttpClient::new()?,
            settings.github_repo.clone(),
            install_root.join(PathsConfig::CACHE_DIR_NAME),
            settings.release_cache_ttl(),
        );
        let runtime = JavaRuntimeManager::new(&install_root, settings.java_feature_version)?;
        let supervisor = ProcessSupervisor::new(install_root.join(PathsConfig::PID_FILE_NAME));

        Ok(Self::with_collaborators(
            VersionManager::new(install_root, settings),
            supervisor,
            Box::new(releases),
            Box::new(HttpDownloader::new()?),
            Box::new(runtime),
        ))
    }

    /// Build the state from explicit parts.
    pub fn with_collaborators(
        versions: VersionManager,
        supervisor: ProcessSupervisor,
        releases: Box<dyn ReleaseIndex>,
        downloader: Box<dyn ArtifactDownloader>,
        runtime: Box<dyn RuntimeProvider>,
    ) -> Self {
        let installed = versions.installed_versions();
        Self {
            versions,
            supervisor,
            releases,
            downloader,
            runtime,
            installed,
        }
    }

    pub fn install_root(&self) -> &Path {
        self.versions.install_root()
    }

    /// Installed versions as of the last refresh, newest first.
    pub fn installed(&self) -> &[AppVersion] {
        &self.installed
    }

    pub fn version_manager(&self) -> &VersionManager {
        &self.versions
    }

    pub fn supervisor(&self) -> &ProcessSupervisor {
        &self.supervisor
    }

    /// Rescan the installation root.
    pub fn refresh(&mut self) {
        self.installed = self.versions.installed_versions();
        debug!("{} versions installed", self.installed.len());
    }

    /// Check whether the supervised server exited.
    pub fn poll(&mut self) -> Result<Option<ProcessExit>> {
        self.supervisor.poll()
    }

    /// Run one command.
    pub async fn execute(&mut self, command: Command) -> Result<Outcome> {
        debug!("Executing {:?}", command);
        let mutates = command.mutates_versions();

        let outcome = match command {
            Command::List => self.list().await,
            Command::Install {
                version,
                prerelease,
            } => self.install(version, prerelease).await,
            Command::Update { version, target } => self.update(version, target).await,
            Command::Import { from, into } => self.import(from, into),
            Command::Remove { version } => self.remove(version),
            Command::Launch { version } => self.launch(version).await,
            Command::Stop => self.supervisor.stop().map(|pid| Outcome::Stopped { pid }),
            Command::Status => self.status().await,
            Command::Files { version } => self.files(version),
            Command::CheckUpdates => self.check_updates().await,
        };

        if mutates {
            self.refresh();
        }
        outcome
    }

    async fn remote_latest(&self) -> RemoteLatest {
        match self.releases.releases().await {
            Ok(releases) => {
                let remote: Vec<AppVersion> = releases.into_iter().map(|r| r.version).collect();
                RemoteLatest {
                    available: !remote.is_empty(),
                    stable: versions::latest_stable(&remote),
                    prerelease: versions::latest_prerelease(&remote),
                }
            }
            Err(e) => {
                warn!("Release information unavailable: {}", e);
                RemoteLatest::default()
            }
        }
    }

    fn require_installed(&self, version: &AppVersion) -> Result<()> {
        if self.versions.is_installed(version) {
            Ok(())
        } else {
            Err(FirmataError::VersionNotFound {
                version: version.to_string(),
            })
        }
    }

    async fn list(&mut self) -> Result<Outcome> {
        self.refresh();
        let remote = self.remote_latest().await;
        let running = self.supervisor.running_version();

        let versions = self
            .installed
            .iter()
            .map(|version| VersionEntry {
                version: version.clone(),
                path: self.versions.version_path(version),
                update: self.versions.update_target(
                    version,
                    remote.stable.as_ref(),
                    remote.prerelease.as_ref(),
                ),
                running: running.as_deref() == Some(version.to_string().as_str()),
            })
            .collect();
        Ok(Outcome::Versions { versions })
    }

    async fn install(&mut self, version: Option<AppVersion>, prerelease: bool) -> Result<Outcome> {
        let version = match version {
            Some(version) => version,
            None => {
                let found = if prerelease {
                    self.releases.latest_prerelease().await?
                } else {
                    self.releases.latest_stable().await?
                };
                found.ok_or_else(|| FirmataError::NoReleaseAvailable {
                    message: format!(
                        "no {} release published",
                        if prerelease { "pre-release" } else { "stable" }
                    ),
                })?
            }
        };

        let path = self.versions.install(&version, self.downloader.as_ref()).await?;
        Ok(Outcome::Installed { version, path })
    }

    async fn update(&mut self, version: AppVersion, target: Option<AppVersion>) -> Result<Outcome> {
        self.require_installed(&version)?;
        let target = match target {
            Some(target) => target,
            None => {
                let remote = self.remote_latest().await;
                self.versions
                    .update_target(&version, remote.stable.as_ref(), remote.prerelease.as_ref())
                    .ok_or_else(|| FirmataError::NoReleaseAvailable {
                        message: format!("no update available for {}", version),
                    })?
            }
        };

        let report = self
            .versions
            .update(&version, &target, self.downloader.as_ref())
            .await?;
        Ok(Outcome::Updated {
            from: report.from,
            to: report.to,
            path: report.path,
            files_copied: report.carried.total_files(),
        })
    }

    fn import(&mut self, from: AppVersion, into: AppVersion) -> Result<Outcome> {
        let report = self.versions.import(&from, &into)?;
        Ok(Outcome::Imported {
            from,
            into,
            files_copied: report.total_files(),
            missing: report.missing,
        })
    }

    fn remove(&mut self, version: AppVersion) -> Result<Outcome> {
        if self.supervisor.running_version().as_deref() == Some(version.to_string().as_str()) {
            return Err(FirmataError::Validation {
                field: "version".to_string(),
                message: format!("{} is running; stop it before removing", version),
            });
        }
        self.versions.remove(&version)?;
        Ok(Outcome::Removed { version })
    }

    async fn launch(&mut self, version: Option<AppVersion>) -> Result<Outcome> {
        if let Some(exit) = self.supervisor.poll()? {
            debug!("Previous server {} had exited", exit.version);
        }
        if let Some(running) = self.supervisor.status() {
            return Err(FirmataError::AlreadyRunning { pid: running.pid });
        }

        let version = match version {
            Some(version) => version,
            None => self
                .versions
                .latest_installed()
                .ok_or_else(|| FirmataError::Validation {
                    field: "version".to_string(),
                    message: "no version is installed".to_string(),
                })?,
        };
        self.require_installed(&version)?;

        let runtime = self.runtime.ensure_runtime().await?;
        info!(
            "Using Java {} at {}",
            runtime.feature_version,
            runtime.java_path.display()
        );

        let settings = self.versions.settings();
        let config = LaunchConfig::new(
            version.clone(),
            self.versions.version_path(&version),
            &runtime.java_path,
            &settings.artifact_name,
        )
        .with_jvm_args(settings.jvm_args.clone())
        .with_app_args(settings.app_args.clone())
        .with_default_log_file(self.versions.install_root());

        let pid = self.supervisor.launch(&config)?;
        Ok(Outcome::Launched {
            version,
            pid,
            log_file: config.log_file,
        })
    }

    async fn status(&mut self) -> Result<Outcome> {
        self.supervisor.poll()?;
        let remote = self.remote_latest().await;
        Ok(Outcome::Status {
            process: self.supervisor.status(),
            guidance: self.versions.guidance(
                remote.available,
                remote.stable.as_ref(),
                remote.prerelease.as_ref(),
            ),
        })
    }

    fn files(&self, version: AppVersion) -> Result<Outcome> {
        self.require_installed(&version)?;
        let path = self.versions.version_path(&version);
        Ok(Outcome::Files { version, path })
    }

    async fn check_updates(&mut self) -> Result<Outcome> {
        let releases = self.releases.releases().await?;
        let remote: Vec<AppVersion> = releases.into_iter().map(|r| r.version).collect();
        let latest_installed = self.versions.latest_installed();
        let newest = remote.iter().max().cloned();

        let newer_available = match (&newest, &latest_installed) {
            (Some(newest), Some(installed)) if newest > installed => Some(newest.clone()),
            (Some(newest), None) => Some(newest.clone()),
            _ => None,
        };

        Ok(Outcome::Updates(UpdateCheck {
            latest_stable: versions::latest_stable(&remote),
            latest_prerelease: versions::latest_prerelease(&remote),
            latest_installed,
            newer_available,
        }))
    }
}
