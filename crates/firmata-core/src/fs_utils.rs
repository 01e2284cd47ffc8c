//! Directory-tree copy used to carry user data between installed versions.

use crate::config::PathsConfig;
use crate::error::{FirmataError, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Options for [`copy_tree`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CopyOptions {
    /// Skip files modified before the source root itself was last modified.
    pub freshness_filter: bool,
}

impl CopyOptions {
    pub fn with_freshness_filter(mut self, enabled: bool) -> Self {
        self.freshness_filter = enabled;
        self
    }
}

/// Counters reported by [`copy_tree`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CopyStats {
    pub files_copied: u64,
    pub files_skipped: u64,
    pub dirs_created: u64,
}

/// Outcome of carrying the user data directories forward.
#[derive(Debug, Clone, Default)]
pub struct CarryForwardReport {
    /// `(directory name, stats)` for each subdirectory that existed in the source.
    pub copied: Vec<(String, CopyStats)>,
    /// Subdirectories absent from the source.
    pub missing: Vec<String>,
}

impl CarryForwardReport {
    pub fn total_files(&self) -> u64 {
        self.copied.iter().map(|(_, s)| s.files_copied).sum()
    }
}

/// Recursively copy `src` into `dest`.
///
/// Directories are created as needed and file mode bits are preserved. With
/// the freshness filter enabled, the modification time of `src` is read once
/// up front and every file older than it is skipped.
pub fn copy_tree(src: &Path, dest: &Path, options: CopyOptions) -> Result<CopyStats> {
    let root_meta = match fs::metadata(src) {
        Ok(meta) => meta,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(FirmataError::FileNotFound(src.to_path_buf()))
        }
        Err(e) => return Err(FirmataError::io_with_path(e, src)),
    };
    if !root_meta.is_dir() {
        return Err(FirmataError::NotADirectory(src.to_path_buf()));
    }

    let threshold: Option<SystemTime> = if options.freshness_filter {
        Some(
            root_meta
                .modified()
                .map_err(|e| FirmataError::io_with_path(e, src))?,
        )
    } else {
        None
    };

    let mut stats = CopyStats::default();
    // Directory permissions are applied after the walk so a read-only source
    // directory does not block copying its children.
    let mut dir_permissions: Vec<(PathBuf, fs::Permissions)> = Vec::new();

    for entry in WalkDir::new(src).follow_links(false) {
        let entry = entry?;
        let rel_path = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| FirmataError::Other(format!("Path outside copy root: {}", e)))?;
        let dest_path = dest.join(rel_path);

        let file_type = entry.file_type();
        if file_type.is_dir() {
            if !dest_path.exists() {
                fs::create_dir_all(&dest_path)
                    .map_err(|e| FirmataError::io_with_path(e, &dest_path))?;
                stats.dirs_created += 1;
            }
            let meta = entry.metadata()?;
            dir_permissions.push((dest_path, meta.permissions()));
            continue;
        }

        if file_type.is_symlink() && entry.path().is_dir() {
            warn!("Skipping directory symlink {}", entry.path().display());
            continue;
        }

        // Follows symlinks, so linked files are copied by content.
        let meta = fs::metadata(entry.path()).map_err(|e| FirmataError::io_with_path(e, entry.path()))?;

        if let Some(threshold) = threshold {
            let modified = meta
                .modified()
                .map_err(|e| FirmataError::io_with_path(e, entry.path()))?;
            debug!(
                "Comparing timestamps for {}: file {:?}, root {:?}",
                entry.path().display(),
                modified,
                threshold
            );
            if modified < threshold {
                stats.files_skipped += 1;
                continue;
            }
        }

        debug!(
            "Copying file {} to {}",
            entry.path().display(),
            dest_path.display()
        );
        if let Some(parent) = dest_path.parent() {
            fs::create_dir_all(parent).map_err(|e| FirmataError::io_with_path(e, parent))?;
        }
        fs::copy(entry.path(), &dest_path).map_err(|e| FirmataError::Io {
            message: format!(
                "Failed to copy file: {} -> {}",
                entry.path().display(),
                dest_path.display()
            ),
            path: Some(entry.path().to_path_buf()),
            source: Some(e),
        })?;
        fs::set_permissions(&dest_path, meta.permissions())
            .map_err(|e| FirmataError::io_with_path(e, &dest_path))?;
        stats.files_copied += 1;
    }

    for (path, permissions) in dir_permissions.into_iter().rev() {
        fs::set_permissions(&path, permissions).map_err(|e| FirmataError::io_with_path(e, &path))?;
    }

    Ok(stats)
}

/// Copy `database/`, `local/` and `config/` from one version directory to another.
///
/// Subdirectories missing from the source are skipped; any other failure
/// aborts the carry-forward.
pub fn carry_forward(from_dir: &Path, to_dir: &Path, options: CopyOptions) -> Result<CarryForwardReport> {
    let mut report = CarryForwardReport::default();

    for name in PathsConfig::CARRY_FORWARD_DIRS {
        let src = from_dir.join(name);
        let dest = to_dir.join(name);

        if !src.is_dir() {
            info!("No {} files to copy from {}", name, from_dir.display());
            report.missing.push(name.to_string());
            continue;
        }

        info!("Copying {} files from {} to {}", name, src.display(), dest.display());
        let stats = copy_tree(&src, &dest, options)?;
        debug!(
            "{}: {} copied, {} skipped",
            name, stats.files_copied, stats.files_skipped
        );
        report.copied.push((name.to_string(), stats));
    }

    Ok(report)
}
