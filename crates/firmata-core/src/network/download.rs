//! Artifact downloads.
//!
//! Files are streamed to `<dest>.part` and renamed into place only once the
//! body has been received completely, so an interrupted download never
//! leaves a truncated artifact behind.

use crate::config::NetworkConfig;
use crate::network::client::HttpClient;
use crate::{FirmataError, Result};
use async_trait::async_trait;
use futures::StreamExt;
use sha2::{Digest, Sha256};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Fetches a remote file to a local path.
#[async_trait]
pub trait ArtifactDownloader: Send + Sync {
    /// Download `url` to `dest`, returning the number of bytes written.
    async fn download(&self, url: &str, dest: &Path) -> Result<u64>;
}

/// [`ArtifactDownloader`] over HTTP(S).
pub struct HttpDownloader {
    http: HttpClient,
}

impl HttpDownloader {
    pub fn new() -> Result<Self> {
        Ok(Self {
            http: HttpClient::with_timeout(NetworkConfig::DOWNLOAD_REQUEST_TIMEOUT)?,
        })
    }

    pub fn with_client(http: HttpClient) -> Self {
        Self { http }
    }

    fn temp_path(dest: &Path) -> PathBuf {
        let mut name = dest
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(NetworkConfig::DOWNLOAD_TEMP_SUFFIX);
        dest.with_file_name(name)
    }

    async fn stream_to(&self, url: &str, temp: &Path) -> Result<u64> {
        let response = self.http.get(url, &[]).await.map_err(|e| match e {
            FirmataError::Network { message, .. } => FirmataError::DownloadFailed {
                url: url.to_string(),
                message,
            },
            other => other,
        })?;

        let total = response.content_length();
        let mut file = std::fs::File::create(temp).map_err(|e| FirmataError::io_with_path(e, temp))?;
        let mut stream = response.bytes_stream();
        let mut downloaded: u64 = 0;
        let started = Instant::now();
        let mut last_report = Instant::now();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| FirmataError::DownloadFailed {
                url: url.to_string(),
                message: format!("error reading body: {}", e),
            })?;
            file.write_all(&chunk)
                .map_err(|e| FirmataError::io_with_path(e, temp))?;
            downloaded += chunk.len() as u64;

            if last_report.elapsed() >= NetworkConfig::DOWNLOAD_PROGRESS_INTERVAL {
                last_report = Instant::now();
                match total {
                    Some(total) if total > 0 => info!(
                        "Downloaded {}/{} bytes ({:.0}%)",
                        downloaded,
                        total,
                        downloaded as f64 / total as f64 * 100.0
                    ),
                    _ => info!("Downloaded {} bytes", downloaded),
                }
            }
        }

        file.sync_all().map_err(|e| FirmataError::io_with_path(e, temp))?;

        if let Some(total) = total {
            if downloaded != total {
                return Err(FirmataError::DownloadFailed {
                    url: url.to_string(),
                    message: format!("expected {} bytes, received {}", total, downloaded),
                });
            }
        }

        debug!(
            "Downloaded {} bytes from {} in {:?}",
            downloaded,
            url,
            started.elapsed()
        );
        Ok(downloaded)
    }
}

#[async_trait]
impl ArtifactDownloader for HttpDownloader {
    async fn download(&self, url: &str, dest: &Path) -> Result<u64> {
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).map_err(|e| FirmataError::io_with_path(e, parent))?;
        }

        let temp = Self::temp_path(dest);
        info!("Downloading {} to {}", url, dest.display());

        match self.stream_to(url, &temp).await {
            Ok(bytes) => {
                std::fs::rename(&temp, dest).map_err(|e| FirmataError::io_with_path(e, dest))?;
                Ok(bytes)
            }
            Err(e) => {
                if temp.exists() {
                    if let Err(cleanup) = std::fs::remove_file(&temp) {
                        warn!("Failed to remove partial download {}: {}", temp.display(), cleanup);
                    }
                }
                Err(e)
            }
        }
    }
}

/// Compute the SHA-256 of a file as lowercase hex.
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = std::fs::File::open(path).map_err(|e| FirmataError::io_with_path(e, path))?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf).map_err(|e| FirmataError::io_with_path(e, path))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Fail with [`FirmataError::ChecksumMismatch`] unless the file hashes to `expected`.
pub fn verify_sha256(path: &Path, expected: &str) -> Result<()> {
    let actual = sha256_file(path)?;
    if actual.eq_ignore_ascii_case(expected.trim()) {
        Ok(())
    } else {
        Err(FirmataError::ChecksumMismatch {
            file: path.display().to_string(),
            expected: expected.to_string(),
            actual,
        })
    }
}
