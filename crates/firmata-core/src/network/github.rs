//! Release index backed by the GitHub releases API.
//!
//! Lookups are offline-first: in-memory copy, then a JSON file under the
//! cache directory, then the network. When the network fails and a stale
//! file exists, the stale data is used.

use crate::config::NetworkConfig;
use crate::network::client::HttpClient;
use crate::versions::{self, AppVersion};
use crate::{FirmataError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Release asset as returned by the GitHub API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubAsset {
    pub name: String,
    #[serde(default)]
    pub size: u64,
    #[serde(rename = "browser_download_url")]
    pub download_url: String,
}

/// Release as returned by the GitHub API (only the fields the launcher reads).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubRelease {
    pub tag_name: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub published_at: Option<String>,
    #[serde(default)]
    pub prerelease: bool,
    #[serde(default)]
    pub draft: bool,
    #[serde(default)]
    pub html_url: Option<String>,
    #[serde(default)]
    pub assets: Vec<GitHubAsset>,
}

/// A remotely advertised version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseInfo {
    pub version: AppVersion,
    pub published_at: Option<String>,
    pub html_url: Option<String>,
}

impl ReleaseInfo {
    /// Convert API releases, newest first.
    ///
    /// Drafts are dropped, as are tags that do not name an installable
    /// version directory (`1.1.0-rc.1`, `1.0.0+build`).
    pub fn from_github(releases: &[GitHubRelease]) -> Vec<ReleaseInfo> {
        let mut infos: Vec<ReleaseInfo> = releases
            .iter()
            .filter(|r| !r.draft)
            .filter_map(|r| match AppVersion::parse(&r.tag_name) {
                Ok(version) if !versions::is_version_dir_name(&version.to_string()) => {
                    debug!("Ignoring release {} with non-installable version", r.tag_name);
                    None
                }
                Ok(version) => Some(ReleaseInfo {
                    version,
                    published_at: r.published_at.clone(),
                    html_url: r.html_url.clone(),
                }),
                Err(_) => {
                    debug!("Ignoring release with unparseable tag {}", r.tag_name);
                    None
                }
            })
            .collect();
        infos.sort_by(|a, b| b.version.cmp(&a.version));
        infos
    }
}

/// Source of release metadata.
#[async_trait]
pub trait ReleaseIndex: Send + Sync {
    /// All known releases, newest first.
    async fn releases(&self) -> Result<Vec<ReleaseInfo>>;

    /// Most recent release without a pre-release tag.
    async fn latest_stable(&self) -> Result<Option<AppVersion>> {
        let releases = self.releases().await?;
        Ok(versions::latest_stable(releases.iter().map(|r| &r.version)))
    }

    /// Most recent release with a pre-release tag.
    async fn latest_prerelease(&self) -> Result<Option<AppVersion>> {
        let releases = self.releases().await?;
        Ok(versions::latest_prerelease(releases.iter().map(|r| &r.version)))
    }
}

/// On-disk cache file contents.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ReleasesCacheFile {
    last_fetched: String,
    ttl: u64,
    releases: Vec<GitHubRelease>,
}

/// Disk cache for one repository's releases.
struct ReleasesCache {
    path: PathBuf,
    ttl: Duration,
}

impl ReleasesCache {
    fn new(cache_dir: PathBuf, repo: &str, ttl: Duration) -> Self {
        let safe_key = repo.replace('/', "-");
        Self {
            path: cache_dir.join(format!("github-releases-{}.json", safe_key)),
            ttl,
        }
    }

    fn read(&self) -> Option<ReleasesCacheFile> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!("Failed to read release cache {}: {}", self.path.display(), e);
                return None;
            }
        };
        match serde_json::from_str(&contents) {
            Ok(cache) => Some(cache),
            Err(e) => {
                warn!("Failed to parse release cache {}: {}", self.path.display(), e);
                None
            }
        }
    }

    fn write(&self, releases: &[GitHubRelease]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| FirmataError::io_with_path(e, parent))?;
        }
        let cache = ReleasesCacheFile {
            last_fetched: Utc::now().to_rfc3339(),
            ttl: self.ttl.as_secs(),
            releases: releases.to_vec(),
        };
        let contents = serde_json::to_string_pretty(&cache)?;
        std::fs::write(&self.path, contents).map_err(|e| FirmataError::io_with_path(e, &self.path))
    }

    fn is_fresh(cache: &ReleasesCacheFile) -> bool {
        DateTime::parse_from_rfc3339(&cache.last_fetched)
            .map(|fetched| Utc::now().signed_duration_since(fetched).num_seconds() < cache.ttl as i64)
            .unwrap_or(false)
    }
}

/// GitHub-backed [`ReleaseIndex`].
pub struct GitHubReleaseIndex {
    http: HttpClient,
    repo: String,
    api_base: String,
    cache: ReleasesCache,
    memory: RwLock<Option<Vec<GitHubRelease>>>,
}

impl GitHubReleaseIndex {
    /// Create an index for `repo` (`owner/name`) caching into `cache_dir`.
    pub fn new(http: HttpClient, repo: impl Into<String>, cache_dir: PathBuf, ttl: Duration) -> Self {
        let repo = repo.into();
        Self {
            cache: ReleasesCache::new(cache_dir, &repo, ttl),
            http,
            repo,
            api_base: NetworkConfig::GITHUB_API_BASE.to_string(),
            memory: RwLock::new(None),
        }
    }

    /// Point the index at a different API host.
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    /// Fetch releases, optionally bypassing every cache layer.
    pub async fn fetch(&self, force_refresh: bool) -> Result<Vec<GitHubRelease>> {
        if !force_refresh {
            if let Some(releases) = self.memory.read().await.clone() {
                debug!("Release cache hit (memory) for {}", self.repo);
                return Ok(releases);
            }
        }

        let disk = self.cache.read();
        if let Some(ref cached) = disk {
            if !force_refresh && ReleasesCache::is_fresh(cached) {
                debug!("Release cache hit (disk) for {}", self.repo);
                *self.memory.write().await = Some(cached.releases.clone());
                return Ok(cached.releases.clone());
            }
        }

        match self.fetch_from_network().await {
            Ok(releases) => {
                if let Err(e) = self.cache.write(&releases) {
                    warn!("Failed to write release cache: {}", e);
                }
                *self.memory.write().await = Some(releases.clone());
                Ok(releases)
            }
            Err(e) => match disk {
                Some(stale) => {
                    warn!(
                        "Release fetch for {} failed, using cached data from {}: {}",
                        self.repo, stale.last_fetched, e
                    );
                    *self.memory.write().await = Some(stale.releases.clone());
                    Ok(stale.releases)
                }
                None => Err(e),
            },
        }
    }

    async fn fetch_from_network(&self) -> Result<Vec<GitHubRelease>> {
        let per_page = NetworkConfig::GITHUB_RELEASES_PER_PAGE;
        let mut all = Vec::new();

        for page in 1..=NetworkConfig::GITHUB_RELEASES_MAX_PAGES {
            let url = format!(
                "{}/repos/{}/releases?per_page={}&page={}",
                self.api_base, self.repo, per_page, page
            );
            let batch: Vec<GitHubRelease> = self
                .http
                .get_json(&url, &[("Accept", "application/vnd.github+json")])
                .await
                .map_err(|e| match e {
                    FirmataError::DownloadFailed { message, .. } => FirmataError::GitHubApi {
                        message,
                        status_code: None,
                    },
                    other => other,
                })?;

            let count = batch.len();
            all.extend(batch);
            if count < per_page as usize {
                break;
            }
        }

        info!("Fetched {} releases from GitHub for {}", all.len(), self.repo);
        Ok(all)
    }
}

#[async_trait]
impl ReleaseIndex for GitHubReleaseIndex {
    async fn releases(&self) -> Result<Vec<ReleaseInfo>> {
        let raw = self.fetch(false).await?;
        Ok(ReleaseInfo::from_github(&raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::RetryPolicy;
    use tempfile::TempDir;

    fn release(tag: &str, prerelease: bool, draft: bool) -> GitHubRelease {
        GitHubRelease {
            tag_name: tag.to_string(),
            name: Some(format!("Release {}", tag)),
            published_at: Some("2024-05-01T00:00:00Z".to_string()),
            prerelease,
            draft,
            html_url: None,
            assets: vec![],
        }
    }

    fn offline_index(cache_dir: &TempDir) -> GitHubReleaseIndex {
        let http = HttpClient::new().unwrap().with_retry(RetryPolicy::none());
        GitHubReleaseIndex::new(
            http,
            "jflamy/owlcms-firmata",
            cache_dir.path().to_path_buf(),
            Duration::from_secs(3600),
        )
        .with_api_base("http://127.0.0.1:9")
    }

    #[test]
    fn test_from_github_filters_and_sorts() {
        let releases = vec![
            release("1.2.0", false, false),
            release("2.0.0-rc1", true, false),
            release("nightly", true, false),
            release("3.0.0", false, true),
            release("v1.10.0", false, false),
        ];
        let infos = ReleaseInfo::from_github(&releases);
        let tags: Vec<String> = infos.iter().map(|r| r.version.to_string()).collect();
        assert_eq!(tags, vec!["2.0.0-rc1", "1.10.0", "1.2.0"]);
    }

    #[test]
    fn test_from_github_drops_non_installable_tags() {
        let releases = vec![
            release("1.0.0", false, false),
            release("1.1.0-rc.1", true, false),
            release("1.2.0+build", false, false),
        ];
        let infos = ReleaseInfo::from_github(&releases);
        let tags: Vec<String> = infos.iter().map(|r| r.version.to_string()).collect();
        assert_eq!(tags, vec!["1.0.0"]);
    }

    #[test]
    fn test_disk_cache_roundtrip_and_freshness() {
        let temp_dir = TempDir::new().unwrap();
        let cache = ReleasesCache::new(
            temp_dir.path().to_path_buf(),
            "jflamy/owlcms-firmata",
            Duration::from_secs(3600),
        );
        assert!(cache.read().is_none());

        cache.write(&[release("1.0.0", false, false)]).unwrap();
        let loaded = cache.read().unwrap();
        assert_eq!(loaded.releases.len(), 1);
        assert!(ReleasesCache::is_fresh(&loaded));

        let expired = ReleasesCacheFile {
            last_fetched: "2020-01-01T00:00:00Z".to_string(),
            ..loaded
        };
        assert!(!ReleasesCache::is_fresh(&expired));
    }

    #[tokio::test]
    async fn test_fresh_disk_cache_skips_network() {
        let temp_dir = TempDir::new().unwrap();
        let index = offline_index(&temp_dir);
        index
            .cache
            .write(&[release("1.0.0", false, false), release("1.1.0-beta", true, false)])
            .unwrap();

        assert_eq!(index.latest_stable().await.unwrap().unwrap().to_string(), "1.0.0");
        assert_eq!(
            index.latest_prerelease().await.unwrap().unwrap().to_string(),
            "1.1.0-beta"
        );
    }

    #[tokio::test]
    async fn test_stale_cache_used_when_offline() {
        let temp_dir = TempDir::new().unwrap();
        let index = offline_index(&temp_dir);
        let stale = ReleasesCacheFile {
            last_fetched: "2020-01-01T00:00:00Z".to_string(),
            ttl: 60,
            releases: vec![release("0.9.0", false, false)],
        };
        std::fs::write(&index.cache.path, serde_json::to_string(&stale).unwrap()).unwrap();

        let releases = index.releases().await.unwrap();
        assert_eq!(releases.len(), 1);
        assert_eq!(releases[0].version.to_string(), "0.9.0");
    }

    #[tokio::test]
    async fn test_offline_without_cache_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let index = offline_index(&temp_dir);
        assert!(index.releases().await.is_err());
    }
}
