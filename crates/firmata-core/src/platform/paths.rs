//! Platform-specific names used when locating or installing a Java runtime.

/// File name of the `java` launcher.
pub fn java_executable_name() -> &'static str {
    if cfg!(windows) {
        "java.exe"
    } else {
        "java"
    }
}

/// Operating system name as used by the Adoptium API.
pub fn adoptium_os() -> &'static str {
    if cfg!(target_os = "windows") {
        "windows"
    } else if cfg!(target_os = "macos") {
        "mac"
    } else {
        "linux"
    }
}

/// CPU architecture name as used by the Adoptium API.
pub fn adoptium_arch() -> &'static str {
    match std::env::consts::ARCH {
        "x86_64" => "x64",
        "aarch64" => "aarch64",
        "arm" => "arm",
        "x86" => "x32",
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_are_known() {
        assert!(java_executable_name().starts_with("java"));
        assert!(["windows", "mac", "linux"].contains(&adoptium_os()));
        assert!(!adoptium_arch().is_empty());
    }
}
