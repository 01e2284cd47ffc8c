//! Network access: release metadata, artifact downloads, and retries.
//!
//! - `client` - shared reqwest wrapper with status classification
//! - `github` - GitHub-backed release index with an offline-first cache
//! - `download` - streamed artifact downloads and checksum verification
//! - `retry` - exponential backoff with jitter

mod client;
mod download;
mod github;
mod retry;

pub use client::{extract_domain, HttpClient};
pub use download::{sha256_file, verify_sha256, ArtifactDownloader, HttpDownloader};
pub use github::{GitHubAsset, GitHubRelease, GitHubReleaseIndex, ReleaseIndex, ReleaseInfo};
pub use retry::RetryPolicy;
