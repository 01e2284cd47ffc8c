//! Rendering command outcomes for the terminal.

use firmata_core::process::ProcessStatus;
use firmata_core::{Outcome, UpdateCheck, VersionEntry};
use std::fmt::Write;

/// Human-readable rendering of an outcome.
pub fn render(outcome: &Outcome) -> String {
    match outcome {
        Outcome::Versions { versions } => render_versions(versions),
        Outcome::Installed { version, path } => {
            format!("Installed owlcms-firmata {} in {}", version, path.display())
        }
        Outcome::Updated {
            from,
            to,
            path,
            files_copied,
        } => format!(
            "Updated {} to {} in {} ({} files carried forward). Version {} was kept.",
            from,
            to,
            path.display(),
            files_copied,
            from
        ),
        Outcome::Imported {
            from,
            into,
            files_copied,
            missing,
        } => {
            let mut out = format!(
                "Imported data and config from {} into {} ({} files)",
                from, into, files_copied
            );
            if !missing.is_empty() {
                let _ = write!(out, "\nNothing to copy for: {}", missing.join(", "));
            }
            out
        }
        Outcome::Removed { version } => format!("Removed owlcms-firmata {}", version),
        Outcome::Launched {
            version,
            pid,
            log_file,
        } => {
            let mut out = format!("Started owlcms-firmata {} (pid {})", version, pid);
            if let Some(log_file) = log_file {
                let _ = write!(out, "\nOutput is written to {}", log_file.display());
            }
            out
        }
        Outcome::Stopped { pid } => format!("Stopped owlcms-firmata (pid {})", pid),
        Outcome::Status { process, guidance } => {
            let mut out = match process {
                Some(status) => render_process(status),
                None => "owlcms-firmata is not running".to_string(),
            };
            let _ = write!(out, "\n\n{}", guidance.message());
            out
        }
        Outcome::Files { version, path } => {
            format!("Files for {}: {}", version, path.display())
        }
        Outcome::Updates(check) => render_update_check(check),
    }
}

/// JSON rendering of an outcome.
pub fn render_json(outcome: &Outcome) -> anyhow::Result<String> {
    Ok(serde_json::to_string_pretty(outcome)?)
}

fn render_versions(versions: &[VersionEntry]) -> String {
    if versions.is_empty() {
        return "No versions installed".to_string();
    }
    let width = versions
        .iter()
        .map(|e| e.version.to_string().len())
        .max()
        .unwrap_or(0);

    let mut out = String::new();
    for entry in versions {
        let _ = write!(out, "{:width$}", entry.version.to_string(), width = width);
        if entry.running {
            out.push_str("  [running]");
        }
        if let Some(update) = &entry.update {
            let _ = write!(out, "  update to {} available", update);
        }
        out.push('\n');
    }
    out.pop();
    out
}

fn render_process(status: &ProcessStatus) -> String {
    let mut out = format!(
        "owlcms-firmata {} is running (pid {}{})",
        status.version.as_deref().unwrap_or("(unknown version)"),
        status.pid,
        if status.external {
            ", started by another launcher"
        } else {
            ""
        }
    );
    if let Some(uptime) = status.uptime_secs {
        let _ = write!(out, "\n  uptime: {}h{:02}m{:02}s", uptime / 3600, uptime / 60 % 60, uptime % 60);
    }
    if let Some(memory) = status.memory_bytes {
        let _ = write!(out, "\n  memory: {:.1} MiB", memory as f64 / (1024.0 * 1024.0));
    }
    if let Some(log_file) = &status.log_file {
        let _ = write!(out, "\n  log: {}", log_file.display());
    }
    out
}

fn render_update_check(check: &UpdateCheck) -> String {
    let show = |v: &Option<firmata_core::AppVersion>| {
        v.as_ref()
            .map(|v| v.to_string())
            .unwrap_or_else(|| "none".to_string())
    };
    let mut out = format!(
        "Latest release:      {}\nLatest pre-release:  {}\nLatest installed:    {}",
        show(&check.latest_stable),
        show(&check.latest_prerelease),
        show(&check.latest_installed)
    );
    match &check.newer_available {
        Some(newer) => {
            let _ = write!(out, "\n\nA more recent version ({}) is available.", newer);
        }
        None => out.push_str("\n\nYou have the most recent version."),
    }
    out
}
