//! Supervision of the single owlcms-firmata child process.

use crate::config::ProcessConfig;
use crate::platform;
use crate::process::launcher::LaunchConfig;
use crate::versions::AppVersion;
use crate::{FirmataError, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Child;
use std::time::Duration;
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};
use tracing::{debug, info, warn};

/// The child process currently owned by the launcher.
#[derive(Debug)]
pub struct RunningProcess {
    child: Child,
    pub pid: u32,
    pub version: AppVersion,
    pub started_at: DateTime<Utc>,
    pub log_file: Option<PathBuf>,
}

/// Snapshot of the server process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessStatus {
    pub pid: u32,
    /// Unknown when the pid file predates version recording.
    pub version: Option<String>,
    pub uptime_secs: Option<u64>,
    pub memory_bytes: Option<u64>,
    pub log_file: Option<PathBuf>,
    /// Started by another launcher invocation.
    pub external: bool,
}

/// How a supervised process ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessExit {
    pub pid: u32,
    pub version: AppVersion,
    /// `None` when terminated by a signal.
    pub code: Option<i32>,
}

/// Contents of the pid file: pid on the first line, version on the second.
#[derive(Debug, Clone, PartialEq, Eq)]
struct PidRecord {
    pid: u32,
    version: Option<String>,
}

/// Owns at most one running server process.
pub struct ProcessSupervisor {
    pid_file: PathBuf,
    stop_timeout: Duration,
    running: Option<RunningProcess>,
}

impl ProcessSupervisor {
    pub fn new(pid_file: impl Into<PathBuf>) -> Self {
        Self {
            pid_file: pid_file.into(),
            stop_timeout: ProcessConfig::STOP_TIMEOUT,
            running: None,
        }
    }

    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    pub fn pid_file(&self) -> &Path {
        &self.pid_file
    }

    /// The process this supervisor owns, if any.
    pub fn running(&self) -> Option<&RunningProcess> {
        self.running.as_ref()
    }

    /// Whether a server started by this or another launcher is alive.
    pub fn is_running(&self) -> bool {
        self.running.is_some() || self.external_pid().is_some()
    }

    /// Version of the running server, when known.
    pub fn running_version(&self) -> Option<String> {
        if let Some(running) = &self.running {
            return Some(running.version.to_string());
        }
        self.read_pid_file()
            .filter(|record| platform::is_process_alive(record.pid))
            .and_then(|record| record.version)
    }

    /// Start the server.
    ///
    /// Rejected with [`FirmataError::AlreadyRunning`] while a process is
    /// tracked or the pid file names a live process.
    pub fn launch(&mut self, config: &LaunchConfig) -> Result<u32> {
        if let Some(exit) = self.poll()? {
            debug!("Previous process {} had already exited", exit.pid);
        }
        if let Some(running) = &self.running {
            return Err(FirmataError::AlreadyRunning { pid: running.pid });
        }
        if let Some(pid) = self.external_pid() {
            return Err(FirmataError::AlreadyRunning { pid });
        }
        self.remove_pid_file();

        let child = config.spawn()?;
        let pid = child.id();
        self.write_pid_file(&PidRecord {
            pid,
            version: Some(config.version.to_string()),
        });

        info!("owlcms-firmata {} started with pid {}", config.version, pid);
        self.running = Some(RunningProcess {
            child,
            pid,
            version: config.version.clone(),
            started_at: Utc::now(),
            log_file: config.log_file.clone(),
        });
        Ok(pid)
    }

    /// Check whether the owned child exited, clearing the handle if so.
    pub fn poll(&mut self) -> Result<Option<ProcessExit>> {
        let Some(running) = self.running.as_mut() else {
            return Ok(None);
        };
        let Some(status) = running.child.try_wait()? else {
            return Ok(None);
        };

        let exit = ProcessExit {
            pid: running.pid,
            version: running.version.clone(),
            code: status.code(),
        };
        info!(
            "owlcms-firmata {} (pid {}) exited with {}",
            exit.version, exit.pid, status
        );
        self.running = None;
        self.remove_pid_file();
        Ok(Some(exit))
    }

    /// Stop the server, whether owned by this supervisor or recorded in the
    /// pid file by another invocation. Returns the stopped pid.
    pub fn stop(&mut self) -> Result<u32> {
        if let Some(running) = self.running.as_mut() {
            info!("Stopping owlcms-firmata {} (pid {})", running.version, running.pid);
            // The handle stays tracked until the child has been reaped.
            let status = platform::terminate_child(&mut running.child, self.stop_timeout)?;
            let pid = running.pid;
            debug!("Process {} ended with {}", pid, status);
            self.running = None;
            self.remove_pid_file();
            return Ok(pid);
        }

        match self.external_pid() {
            Some(pid) => {
                info!("Stopping owlcms-firmata started elsewhere (pid {})", pid);
                if !platform::terminate_process(pid, self.stop_timeout)? {
                    return Err(FirmataError::Other(format!(
                        "process {} did not terminate",
                        pid
                    )));
                }
                self.remove_pid_file();
                Ok(pid)
            }
            None => Err(FirmataError::ProcessNotRunning),
        }
    }

    /// Report on the running server, `None` if nothing runs.
    pub fn status(&self) -> Option<ProcessStatus> {
        let (mut status, pid) = match &self.running {
            Some(running) => (
                ProcessStatus {
                    pid: running.pid,
                    version: Some(running.version.to_string()),
                    uptime_secs: u64::try_from(
                        Utc::now().signed_duration_since(running.started_at).num_seconds(),
                    )
                    .ok(),
                    memory_bytes: None,
                    log_file: running.log_file.clone(),
                    external: false,
                },
                running.pid,
            ),
            None => {
                let record = self
                    .read_pid_file()
                    .filter(|record| platform::is_process_alive(record.pid))?;
                (
                    ProcessStatus {
                        pid: record.pid,
                        version: record.version,
                        uptime_secs: None,
                        memory_bytes: None,
                        log_file: None,
                        external: true,
                    },
                    record.pid,
                )
            }
        };

        let mut system = System::new();
        let sysinfo_pid = Pid::from_u32(pid);
        system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[sysinfo_pid]),
            true,
            ProcessRefreshKind::new().with_memory(),
        );
        if let Some(process) = system.process(sysinfo_pid) {
            status.memory_bytes = Some(process.memory());
            if status.uptime_secs.is_none() {
                status.uptime_secs = Some(process.run_time());
            }
        }
        Some(status)
    }

    /// Live pid recorded by another invocation. Removes a stale pid file.
    fn external_pid(&self) -> Option<u32> {
        let record = self.read_pid_file()?;
        if platform::is_process_alive(record.pid) {
            Some(record.pid)
        } else {
            debug!("Removing stale pid file for {}", record.pid);
            self.remove_pid_file();
            None
        }
    }

    fn read_pid_file(&self) -> Option<PidRecord> {
        let contents = fs::read_to_string(&self.pid_file).ok()?;
        let mut lines = contents.lines();
        let pid = match lines.next().map(str::trim).map(str::parse::<u32>) {
            Some(Ok(pid)) => pid,
            _ => {
                warn!("Ignoring malformed pid file {}", self.pid_file.display());
                return None;
            }
        };
        let version = lines
            .next()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string);
        Some(PidRecord { pid, version })
    }

    fn write_pid_file(&self, record: &PidRecord) {
        let mut contents = format!("{}\n", record.pid);
        if let Some(version) = &record.version {
            contents.push_str(version);
            contents.push('\n');
        }
        if let Some(parent) = self.pid_file.parent() {
            let _ = fs::create_dir_all(parent);
        }
        if let Err(e) = fs::write(&self.pid_file, contents) {
            warn!("Failed to write pid file {}: {}", self.pid_file.display(), e);
        }
    }

    fn remove_pid_file(&self) {
        match fs::remove_file(&self.pid_file) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove pid file {}: {}", self.pid_file.display(), e),
        }
    }
}

impl Drop for ProcessSupervisor {
    fn drop(&mut self) {
        if self.running.is_some() {
            if let Err(e) = self.stop() {
                warn!("Failed to stop owlcms-firmata on exit: {}", e);
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::TempDir;

    /// Install a version dir whose "java" is a shell script sleeping forever.
    fn sleeper(temp_dir: &TempDir) -> LaunchConfig {
        let version_dir = temp_dir.path().join("1.0.0");
        fs::create_dir_all(&version_dir).unwrap();
        fs::write(version_dir.join("owlcms-firmata.jar"), "").unwrap();
        let java = temp_dir.path().join("java");
        fs::write(&java, "#!/bin/sh\nexec sleep 30\n").unwrap();
        platform::set_executable(&java).unwrap();

        LaunchConfig::new(
            AppVersion::parse("1.0.0").unwrap(),
            &version_dir,
            &java,
            "owlcms-firmata.jar",
        )
    }

    fn supervisor(temp_dir: &TempDir) -> ProcessSupervisor {
        ProcessSupervisor::new(temp_dir.path().join("firmata.pid"))
            .with_stop_timeout(Duration::from_secs(2))
    }

    #[test]
    fn test_second_launch_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let config = sleeper(&temp_dir);
        let mut supervisor = supervisor(&temp_dir);

        let pid = supervisor.launch(&config).unwrap();
        assert!(supervisor.is_running());
        assert!(supervisor.pid_file().exists());

        match supervisor.launch(&config) {
            Err(FirmataError::AlreadyRunning { pid: running }) => assert_eq!(running, pid),
            other => panic!("expected AlreadyRunning, got {:?}", other),
        }
        assert_eq!(supervisor.running().unwrap().pid, pid);

        assert_eq!(supervisor.stop().unwrap(), pid);
        assert!(!supervisor.is_running());
        assert!(!supervisor.pid_file().exists());
    }

    #[test]
    fn test_stop_reaps_child_before_releasing_handle() {
        let temp_dir = TempDir::new().unwrap();
        let config = sleeper(&temp_dir);
        let mut supervisor = supervisor(&temp_dir);
        let pid = supervisor.launch(&config).unwrap();

        assert_eq!(supervisor.stop().unwrap(), pid);
        assert!(supervisor.running().is_none());
        assert!(!platform::is_process_alive(pid));
        assert!(!supervisor.pid_file().exists());
        assert!(matches!(supervisor.stop(), Err(FirmataError::ProcessNotRunning)));
    }

    #[test]
    fn test_live_pid_file_blocks_launch() {
        let temp_dir = TempDir::new().unwrap();
        let config = sleeper(&temp_dir);
        let mut supervisor = supervisor(&temp_dir);
        fs::write(
            supervisor.pid_file(),
            format!("{}\n0.9.0\n", std::process::id()),
        )
        .unwrap();

        assert!(matches!(
            supervisor.launch(&config),
            Err(FirmataError::AlreadyRunning { .. })
        ));
        assert_eq!(supervisor.running_version().as_deref(), Some("0.9.0"));
        let status = supervisor.status().unwrap();
        assert!(status.external);
        assert_eq!(status.pid, std::process::id());
    }

    #[test]
    fn test_stale_pid_file_is_removed() {
        let temp_dir = TempDir::new().unwrap();
        let supervisor = supervisor(&temp_dir);
        fs::write(supervisor.pid_file(), "4000000000\n").unwrap();

        assert!(!supervisor.is_running());
        assert!(!supervisor.pid_file().exists());
    }

    #[test]
    fn test_stop_without_process() {
        let temp_dir = TempDir::new().unwrap();
        let mut supervisor = supervisor(&temp_dir);
        assert!(matches!(supervisor.stop(), Err(FirmataError::ProcessNotRunning)));
        assert!(supervisor.status().is_none());
    }

    #[test]
    fn test_poll_reports_exit() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = sleeper(&temp_dir);
        let java = temp_dir.path().join("quick-java");
        fs::write(&java, "#!/bin/sh\nexit 3\n").unwrap();
        platform::set_executable(&java).unwrap();
        config.java_path = java;

        let mut supervisor = supervisor(&temp_dir);
        supervisor.launch(&config).unwrap();

        let mut exit = None;
        for _ in 0..50 {
            exit = supervisor.poll().unwrap();
            if exit.is_some() {
                break;
            }
            std::thread::sleep(Duration::from_millis(50));
        }
        let exit = exit.unwrap();
        assert_eq!(exit.code, Some(3));
        assert!(supervisor.running().is_none());
        assert!(!supervisor.pid_file().exists());
    }

    #[test]
    fn test_status_of_owned_process() {
        let temp_dir = TempDir::new().unwrap();
        let config = sleeper(&temp_dir).with_log_file(temp_dir.path().join("logs/run.log"));
        let mut supervisor = supervisor(&temp_dir);
        let pid = supervisor.launch(&config).unwrap();

        let status = supervisor.status().unwrap();
        assert_eq!(status.pid, pid);
        assert_eq!(status.version.as_deref(), Some("1.0.0"));
        assert!(!status.external);
        assert!(status.log_file.is_some());
    }

    #[test]
    fn test_drop_stops_child() {
        let temp_dir = TempDir::new().unwrap();
        let config = sleeper(&temp_dir);
        let pid_file;
        {
            let mut supervisor = supervisor(&temp_dir);
            supervisor.launch(&config).unwrap();
            pid_file = supervisor.pid_file().to_path_buf();
        }
        assert!(!pid_file.exists());
    }
}
