//! Process liveness checks and termination by pid.
//!
//! [`terminate_process`] is for processes the current launcher did not spawn
//! itself (recorded in the pid file by an earlier invocation). Children owned
//! by the supervisor go through [`terminate_child`], which reaps them.

use crate::error::{FirmataError, Result};
use std::process::{Child, ExitStatus};
use std::time::Duration;
use tracing::{debug, warn};

/// Check if a process with the given pid is alive.
///
/// # Platform Behavior
/// - **Linux/macOS**: `kill(pid, 0)`; `EPERM` counts as alive
/// - **Windows**: `OpenProcess` with `PROCESS_QUERY_LIMITED_INFORMATION`
pub fn is_process_alive(pid: u32) -> bool {
    #[cfg(unix)]
    {
        use nix::errno::Errno;
        use nix::sys::signal::kill;
        use nix::unistd::Pid;

        // Larger values would wrap to negative pids, which address process groups.
        let Ok(raw) = i32::try_from(pid) else {
            return false;
        };
        if raw <= 0 {
            return false;
        }
        match kill(Pid::from_raw(raw), None) {
            Ok(()) => true,
            Err(Errno::EPERM) => true,
            Err(_) => false,
        }
    }

    #[cfg(windows)]
    {
        windows_is_alive(pid)
    }

    #[cfg(not(any(unix, windows)))]
    {
        warn!("Process alive check not implemented for this platform");
        let _ = pid;
        false
    }
}

#[cfg(windows)]
#[allow(unsafe_code)]
fn windows_is_alive(pid: u32) -> bool {
    use windows_sys::Win32::Foundation::CloseHandle;
    use windows_sys::Win32::System::Threading::{OpenProcess, PROCESS_QUERY_LIMITED_INFORMATION};

    // SAFETY: OpenProcess has no preconditions; a non-null handle is closed
    // exactly once before returning.
    unsafe {
        let handle = OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, 0, pid);
        if handle.is_null() {
            false
        } else {
            CloseHandle(handle);
            true
        }
    }
}

/// Terminate a process gracefully, then forcefully after `timeout`.
///
/// # Platform Behavior
/// - **Linux/macOS**: SIGTERM, poll, then SIGKILL
/// - **Windows**: `taskkill /PID {pid} /T /F`
///
/// Returns `true` if the process is gone afterwards (including when it was
/// not running to begin with).
pub fn terminate_process(pid: u32, timeout: Duration) -> Result<bool> {
    if !is_process_alive(pid) {
        debug!("Process {} is not running", pid);
        return Ok(true);
    }

    #[cfg(unix)]
    {
        terminate_unix(pid, timeout)
    }

    #[cfg(windows)]
    {
        let _ = timeout;
        terminate_windows(pid)
    }

    #[cfg(not(any(unix, windows)))]
    {
        let _ = timeout;
        Err(FirmataError::Other(
            "Process termination not implemented for this platform".into(),
        ))
    }
}

/// Stop an owned child and reap it.
///
/// On Unix the child gets SIGTERM and `timeout` to exit before SIGKILL. On
/// Windows it is killed immediately.
pub fn terminate_child(child: &mut Child, timeout: Duration) -> Result<ExitStatus> {
    let pid = child.id();

    if let Some(status) = child.try_wait()? {
        return Ok(status);
    }

    #[cfg(unix)]
    {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;
        use std::time::Instant;

        debug!("Sending SIGTERM to child {}", pid);
        if let Ok(raw) = i32::try_from(pid) {
            if let Err(e) = kill(Pid::from_raw(raw), Signal::SIGTERM) {
                warn!("Failed to send SIGTERM to {}: {}", pid, e);
            }
        }

        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if let Some(status) = child.try_wait()? {
                debug!("Child {} exited with {}", pid, status);
                return Ok(status);
            }
            std::thread::sleep(Duration::from_millis(100));
        }
        debug!("Child {} ignored SIGTERM, killing", pid);
    }

    #[cfg(not(unix))]
    let _ = timeout;

    if let Err(e) = child.kill() {
        // The child may have exited between the last check and the kill.
        debug!("Kill of child {} failed: {}", pid, e);
    }
    Ok(child.wait()?)
}

#[cfg(unix)]
fn terminate_unix(pid: u32, timeout: Duration) -> Result<bool> {
    use nix::errno::Errno;
    use nix::sys::signal::{kill, Signal};
    use nix::sys::wait::{waitpid, WaitPidFlag};
    use nix::unistd::Pid;
    use std::thread::sleep;

    let nix_pid = Pid::from_raw(pid as i32);
    let interval = Duration::from_millis(100);

    debug!("Sending SIGTERM to process {}", pid);
    match kill(nix_pid, Signal::SIGTERM) {
        Err(Errno::ESRCH) => return Ok(true),
        Err(e) => warn!("Failed to send SIGTERM to {}: {}", pid, e),
        Ok(()) => {}
    }

    let iterations = (timeout.as_millis() / interval.as_millis()).max(1);
    for _ in 0..iterations {
        sleep(interval);
        // Reaps the process if it happens to be our child; ECHILD otherwise.
        let _ = waitpid(nix_pid, Some(WaitPidFlag::WNOHANG));
        if !is_process_alive(pid) {
            debug!("Process {} terminated gracefully", pid);
            return Ok(true);
        }
    }

    debug!("Process {} still running, sending SIGKILL", pid);
    match kill(nix_pid, Signal::SIGKILL) {
        Err(Errno::ESRCH) => return Ok(true),
        Err(e) => {
            return Err(FirmataError::Other(format!(
                "Failed to kill process {}: {}",
                pid, e
            )))
        }
        Ok(()) => {}
    }

    sleep(interval);
    let _ = waitpid(nix_pid, Some(WaitPidFlag::WNOHANG));
    Ok(!is_process_alive(pid))
}

#[cfg(windows)]
fn terminate_windows(pid: u32) -> Result<bool> {
    use std::process::Command;

    debug!("Terminating process {} with taskkill", pid);
    let output = Command::new("taskkill")
        .args(["/PID", &pid.to_string(), "/T", "/F"])
        .output()
        .map_err(|e| FirmataError::Other(format!("Failed to run taskkill: {}", e)))?;

    if output.status.success() {
        return Ok(true);
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    if stderr.contains("not found") || stderr.contains("not running") {
        Ok(true)
    } else {
        warn!("taskkill failed for {}: {}", pid, stderr);
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_own_process_is_alive() {
        assert!(is_process_alive(std::process::id()));
    }

    #[test]
    fn test_out_of_range_pid_is_not_alive() {
        assert!(!is_process_alive(4_000_000_000));
        assert!(!is_process_alive(0));
    }

    #[test]
    fn test_terminate_nonexistent() {
        assert!(terminate_process(4_000_000_000, Duration::from_millis(100)).unwrap());
    }

    #[cfg(unix)]
    #[test]
    fn test_terminate_spawned_process() {
        let mut child = std::process::Command::new("sleep").arg("30").spawn().unwrap();
        let pid = child.id();
        assert!(is_process_alive(pid));

        assert!(terminate_process(pid, Duration::from_millis(500)).unwrap());
        let _ = child.wait();
        assert!(!is_process_alive(pid));
    }

    #[cfg(unix)]
    #[test]
    fn test_terminate_child_reaps() {
        let mut child = std::process::Command::new("sleep").arg("30").spawn().unwrap();
        let status = terminate_child(&mut child, Duration::from_secs(2)).unwrap();
        assert!(!status.success());
        // Already reaped: a second call reports the same exit.
        assert!(terminate_child(&mut child, Duration::from_millis(10)).is_ok());
    }
}
