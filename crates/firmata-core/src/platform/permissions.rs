//! File permission handling.

use crate::error::{FirmataError, Result};
use std::path::Path;
use tracing::debug;

/// Make a file executable (mode 0o755 on Unix, no-op on Windows).
pub fn set_executable(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let metadata = std::fs::metadata(path).map_err(|e| FirmataError::io_with_path(e, path))?;
        let mut permissions = metadata.permissions();
        permissions.set_mode(0o755);
        std::fs::set_permissions(path, permissions)
            .map_err(|e| FirmataError::io_with_path(e, path))?;
        debug!("Set executable permissions on: {}", path.display());
    }

    #[cfg(windows)]
    {
        if !path.exists() {
            return Err(FirmataError::FileNotFound(path.to_path_buf()));
        }
        debug!("Skipping executable bit on Windows for: {}", path.display());
    }

    Ok(())
}
