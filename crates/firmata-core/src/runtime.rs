//! Java runtime discovery and installation.
//!
//! owlcms-firmata is a Java application. Before a launch the launcher makes
//! sure a suitable `java` executable exists, installing an Eclipse Temurin
//! JRE from the Adoptium API into the installation root when none is found.

use crate::config::RuntimeConfig;
use crate::network::{verify_sha256, ArtifactDownloader, HttpClient, HttpDownloader};
use crate::platform;
use crate::{FirmataError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// A usable Java installation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JavaRuntime {
    /// Path of the `java` executable.
    pub java_path: PathBuf,
    /// Feature release reported by `java -version` (8, 11, 17, ...).
    pub feature_version: u32,
}

/// Provides a Java runtime suitable for launching the server.
#[async_trait]
pub trait RuntimeProvider: Send + Sync {
    /// Locate a runtime, installing one if necessary.
    async fn ensure_runtime(&self) -> Result<JavaRuntime>;
}

#[derive(Debug, Deserialize)]
struct AdoptiumAsset {
    binary: AdoptiumBinary,
    #[serde(default)]
    release_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AdoptiumBinary {
    package: AdoptiumPackage,
}

#[derive(Debug, Deserialize)]
struct AdoptiumPackage {
    name: String,
    link: String,
    #[serde(default)]
    checksum: Option<String>,
}

/// Finds or installs a Java runtime for one installation root.
pub struct JavaRuntimeManager {
    install_root: PathBuf,
    feature_version: u32,
    api_base: String,
    version_check_timeout: Duration,
    http: HttpClient,
    downloader: HttpDownloader,
}

impl JavaRuntimeManager {
    pub fn new(install_root: impl Into<PathBuf>, feature_version: u32) -> Result<Self> {
        Ok(Self {
            install_root: install_root.into(),
            feature_version,
            api_base: RuntimeConfig::ADOPTIUM_API_BASE.to_string(),
            version_check_timeout: RuntimeConfig::VERSION_CHECK_TIMEOUT,
            http: HttpClient::new()?,
            downloader: HttpDownloader::new()?,
        })
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    /// How long `java -version` may take before a candidate is skipped.
    pub fn with_version_check_timeout(mut self, timeout: Duration) -> Self {
        self.version_check_timeout = timeout;
        self
    }

    /// Directory holding the launcher-managed runtime.
    pub fn managed_dir(&self) -> PathBuf {
        self.install_root
            .join(RuntimeConfig::managed_runtime_dir_name(self.feature_version))
    }

    /// Look for an existing runtime without touching the network.
    ///
    /// Order: managed runtime, `$JAVA_HOME`, `PATH`.
    pub async fn detect(&self) -> Option<JavaRuntime> {
        let mut candidates = Vec::new();
        if let Some(path) = find_java_under(&self.managed_dir()) {
            candidates.push(path);
        }
        if let Some(home) = std::env::var_os("JAVA_HOME") {
            candidates.push(
                PathBuf::from(home)
                    .join("bin")
                    .join(platform::java_executable_name()),
            );
        }
        candidates.push(PathBuf::from(platform::java_executable_name()));

        for path in candidates {
            if let Some(runtime) = self.check_candidate(&path).await {
                return Some(runtime);
            }
        }
        None
    }

    async fn check_candidate(&self, java: &Path) -> Option<JavaRuntime> {
        let version = match java_feature_version(java, self.version_check_timeout).await {
            Some(v) => v,
            None => {
                debug!("No usable java at {}", java.display());
                return None;
            }
        };
        if version < self.feature_version {
            debug!(
                "Java at {} is version {}, need {}",
                java.display(),
                version,
                self.feature_version
            );
            return None;
        }
        debug!("Using Java {} at {}", version, java.display());
        Some(JavaRuntime {
            java_path: java.to_path_buf(),
            feature_version: version,
        })
    }

    /// Download and unpack a JRE into [`managed_dir`](Self::managed_dir).
    pub async fn install(&self) -> Result<()> {
        let url = format!(
            "{}/assets/latest/{}/hotspot?architecture={}&image_type=jre&os={}&vendor=eclipse",
            self.api_base,
            self.feature_version,
            platform::adoptium_arch(),
            platform::adoptium_os()
        );
        let assets: Vec<AdoptiumAsset> = self.http.get_json(&url, &[]).await?;
        let asset = assets
            .into_iter()
            .next()
            .ok_or_else(|| FirmataError::RuntimeUnavailable {
                message: format!(
                    "no Java {} runtime published for {}/{}",
                    self.feature_version,
                    platform::adoptium_os(),
                    platform::adoptium_arch()
                ),
            })?;
        let package = asset.binary.package;
        info!(
            "Installing Java runtime {}",
            asset.release_name.as_deref().unwrap_or(&package.name)
        );

        let download_dir = tempfile::tempdir()?;
        let archive = download_dir.path().join(&package.name);
        self.downloader.download(&package.link, &archive).await?;
        match package.checksum.as_deref() {
            Some(expected) => verify_sha256(&archive, expected)?,
            None => warn!("No checksum published for {}", package.name),
        }

        let target = self.managed_dir();
        let staging = self.install_root.join(format!(
            "{}.partial",
            RuntimeConfig::managed_runtime_dir_name(self.feature_version)
        ));
        remove_dir_if_exists(&staging)?;
        std::fs::create_dir_all(&staging).map_err(|e| FirmataError::io_with_path(e, &staging))?;

        let extracted = if package.name.ends_with(".zip") {
            extract_zip(&archive, &staging)
        } else if package.name.ends_with(".tar.gz") || package.name.ends_with(".tgz") {
            extract_tarball(&archive, &staging)
        } else {
            Err(FirmataError::RuntimeUnavailable {
                message: format!("unknown archive format: {}", package.name),
            })
        };
        if let Err(e) = extracted {
            let _ = std::fs::remove_dir_all(&staging);
            return Err(e);
        }

        remove_dir_if_exists(&target)?;
        std::fs::rename(&staging, &target).map_err(|e| FirmataError::io_with_path(e, &target))?;

        if let Some(java) = find_java_under(&target) {
            platform::set_executable(&java)?;
        }
        info!("Java runtime installed in {}", target.display());
        Ok(())
    }
}

#[async_trait]
impl RuntimeProvider for JavaRuntimeManager {
    async fn ensure_runtime(&self) -> Result<JavaRuntime> {
        if let Some(runtime) = self.detect().await {
            return Ok(runtime);
        }

        info!(
            "No Java {} or newer found, installing one",
            self.feature_version
        );
        self.install()
            .await
            .map_err(|e| FirmataError::RuntimeUnavailable {
                message: format!("installation failed: {}", e),
            })?;

        let installed = match find_java_under(&self.managed_dir()) {
            Some(path) => self.check_candidate(&path).await,
            None => None,
        };
        installed.ok_or_else(|| FirmataError::RuntimeUnavailable {
            message: format!(
                "installed runtime in {} is not usable",
                self.managed_dir().display()
            ),
        })
    }
}

/// Search `dir` for `bin/java`, as laid out by JRE archives
/// (`jdk-17.0.9+9-jre/bin/java`, or `.../Contents/Home/bin/java` on macOS).
pub fn find_java_under(dir: &Path) -> Option<PathBuf> {
    if !dir.is_dir() {
        return None;
    }
    let name = platform::java_executable_name();
    WalkDir::new(dir)
        .max_depth(5)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .find(|entry| {
            entry.file_type().is_file()
                && entry.file_name() == name
                && entry
                    .path()
                    .parent()
                    .and_then(|p| p.file_name())
                    .is_some_and(|p| p == "bin")
        })
        .map(|entry| entry.into_path())
}

/// Run `java -version` and return the feature release.
///
/// A run that exceeds `timeout` is killed and treated as no usable java.
async fn java_feature_version(java: &Path, timeout: Duration) -> Option<u32> {
    let run = Command::new(java)
        .arg("-version")
        .stdin(std::process::Stdio::null())
        .kill_on_drop(true)
        .output();
    let output = match tokio::time::timeout(timeout, run).await {
        Ok(result) => result.ok()?,
        Err(_) => {
            warn!(
                "{} -version did not finish within {:?}",
                java.display(),
                timeout
            );
            return None;
        }
    };
    if !output.status.success() {
        return None;
    }
    // Older runtimes print to stderr, some builds to stdout.
    let text = format!(
        "{}{}",
        String::from_utf8_lossy(&output.stderr),
        String::from_utf8_lossy(&output.stdout)
    );
    parse_java_version(&text)
}

/// Extract the feature release from `java -version` output.
///
/// `"1.8.0_392"` is Java 8, `"17.0.9"` is Java 17, `"21"` is Java 21.
pub fn parse_java_version(output: &str) -> Option<u32> {
    let start = output.find('"')? + 1;
    let end = start + output[start..].find('"')?;
    let quoted = &output[start..end];

    let mut parts = quoted.split(|c: char| c == '.' || c == '_' || c == '-' || c == '+');
    let first: u32 = parts.next()?.parse().ok()?;
    if first == 1 {
        parts.next()?.parse().ok()
    } else {
        Some(first)
    }
}

fn remove_dir_if_exists(path: &Path) -> Result<()> {
    match std::fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(FirmataError::io_with_path(e, path)),
    }
}

fn extract_zip(archive_path: &Path, dest_dir: &Path) -> Result<()> {
    let file =
        std::fs::File::open(archive_path).map_err(|e| FirmataError::io_with_path(e, archive_path))?;
    let mut archive = zip::ZipArchive::new(file).map_err(|e| FirmataError::RuntimeUnavailable {
        message: format!("Failed to read zip: {}", e),
    })?;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| FirmataError::RuntimeUnavailable {
                message: format!("Failed to read zip entry: {}", e),
            })?;
        let Some(relative) = entry.enclosed_name() else {
            warn!("Skipping unsafe zip entry {}", entry.name());
            continue;
        };
        let outpath = dest_dir.join(relative);

        if entry.is_dir() {
            std::fs::create_dir_all(&outpath).map_err(|e| FirmataError::io_with_path(e, &outpath))?;
            continue;
        }
        if let Some(parent) = outpath.parent() {
            std::fs::create_dir_all(parent).map_err(|e| FirmataError::io_with_path(e, parent))?;
        }
        let mut outfile =
            std::fs::File::create(&outpath).map_err(|e| FirmataError::io_with_path(e, &outpath))?;
        std::io::copy(&mut entry, &mut outfile).map_err(|e| FirmataError::io_with_path(e, &outpath))?;

        #[cfg(unix)]
        if let Some(mode) = entry.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&outpath, std::fs::Permissions::from_mode(mode))
                .map_err(|e| FirmataError::io_with_path(e, &outpath))?;
        }
    }
    Ok(())
}

fn extract_tarball(archive_path: &Path, dest_dir: &Path) -> Result<()> {
    let file =
        std::fs::File::open(archive_path).map_err(|e| FirmataError::io_with_path(e, archive_path))?;
    let decoder = flate2::read::GzDecoder::new(std::io::BufReader::new(file));
    let mut archive = tar::Archive::new(decoder);
    archive
        .unpack(dest_dir)
        .map_err(|e| FirmataError::RuntimeUnavailable {
            message: format!("Failed to extract tarball: {}", e),
        })
}
