//! Lifecycle of the application under test: spawn with an augmented
//! environment, health-check after a settle interval, graceful SIGTERM
//! shutdown escalating to SIGKILL on timeout.

use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use log::{debug, error, info, warn};
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;

/// Set to `1` when the run is headless.
pub const HEADLESS_ENV: &str = "VISREG_HEADLESS";
/// Directory the application under test writes screenshots into.
pub const SCREENSHOTS_DIR_ENV: &str = "VISREG_SCREENSHOTS_DIR";

const STOP_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
pub struct ProcessConfig {
    pub binary: PathBuf,
    pub screenshots_dir: PathBuf,
    pub headless: bool,
    /// How long to wait after spawn before checking the process is alive.
    pub settle: Duration,
    /// Graceful-termination window before escalating to SIGKILL.
    pub stop_timeout: Duration,
}

impl ProcessConfig {
    pub fn new(binary: &Path, screenshots_dir: &Path) -> Self {
        Self {
            binary: binary.to_path_buf(),
            screenshots_dir: screenshots_dir.to_path_buf(),
            headless: false,
            settle: Duration::from_secs(2),
            stop_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    NotStarted,
    Running,
    Stopping,
    Stopped,
}

/// A running application-under-test process.
#[derive(Debug)]
pub struct AppProcess {
    child: Option<Child>,
    state: ProcessState,
    stop_timeout: Duration,
}

impl AppProcess {
    /// Spawn the target and wait for it to settle. If it has already
    /// exited by then, its output is captured and the start fails; this is
    /// fatal for the whole run.
    pub fn start(config: &ProcessConfig) -> Result<Self> {
        info!("starting application under test: {}", config.binary.display());
        info!("  headless: {}", config.headless);
        info!("  screenshots: {}", config.screenshots_dir.display());

        let mut command = Command::new(&config.binary);
        command
            .env(SCREENSHOTS_DIR_ENV, &config.screenshots_dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if config.headless {
            command.env(HEADLESS_ENV, "1");
        }

        let mut child = command
            .spawn()
            .with_context(|| format!("failed to spawn {}", config.binary.display()))?;

        thread::sleep(config.settle);

        if let Some(status) = child.try_wait().context("failed to poll child")? {
            let output = child.wait_with_output().context("failed to collect output")?;
            error!("application under test exited immediately ({status})");
            error!("stdout: {}", String::from_utf8_lossy(&output.stdout).trim());
            error!("stderr: {}", String::from_utf8_lossy(&output.stderr).trim());
            bail!("application under test exited during startup ({status})");
        }

        info!("application under test started (pid {})", child.id());
        Ok(Self {
            child: Some(child),
            state: ProcessState::Running,
            stop_timeout: config.stop_timeout,
        })
    }

    pub fn state(&self) -> ProcessState {
        self.state
    }

    pub fn is_running(&mut self) -> bool {
        match self.child.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }

    /// Two-phase shutdown: SIGTERM, bounded wait, then one SIGKILL. Never
    /// returns while the process is still alive.
    pub fn stop(&mut self) -> Result<()> {
        let Some(mut child) = self.child.take() else {
            self.state = ProcessState::Stopped;
            return Ok(());
        };
        self.state = ProcessState::Stopping;
        info!("stopping application under test (pid {})", child.id());

        let pid = Pid::from_raw(child.id() as i32);
        if let Err(e) = kill(pid, Signal::SIGTERM) {
            warn!("failed to send SIGTERM: {e}");
        }

        let deadline = Instant::now() + self.stop_timeout;
        loop {
            if let Some(status) = child.try_wait().context("failed to poll child")? {
                debug!("application under test exited ({status})");
                break;
            }
            if Instant::now() >= deadline {
                warn!("graceful shutdown timed out, force killing");
                child.kill().context("failed to kill child")?;
                child.wait().context("failed to reap child")?;
                break;
            }
            thread::sleep(STOP_POLL_INTERVAL);
        }

        self.state = ProcessState::Stopped;
        Ok(())
    }
}

impl Drop for AppProcess {
    fn drop(&mut self) {
        // last-resort cleanup when stop() was never reached
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;

    fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn quick_config(binary: &Path, dir: &Path) -> ProcessConfig {
        let mut config = ProcessConfig::new(binary, &dir.join("screenshots"));
        config.settle = Duration::from_millis(200);
        config.stop_timeout = Duration::from_millis(500);
        config
    }

    #[test]
    fn immediate_exit_fails_startup() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(dir.path(), "dies.sh", "echo boom >&2\nexit 3");
        let err = AppProcess::start(&quick_config(&script, dir.path())).unwrap_err();
        assert!(err.to_string().contains("exited during startup"));
    }

    #[test]
    fn missing_binary_fails_startup() {
        let dir = tempfile::tempdir().unwrap();
        let config = quick_config(&dir.path().join("no-such-binary"), dir.path());
        assert!(AppProcess::start(&config).is_err());
    }

    #[test]
    fn graceful_stop_via_sigterm() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(dir.path(), "app.sh", "sleep 30");
        let mut app = AppProcess::start(&quick_config(&script, dir.path())).unwrap();
        assert_eq!(app.state(), ProcessState::Running);
        assert!(app.is_running());

        let start = Instant::now();
        app.stop().unwrap();
        assert_eq!(app.state(), ProcessState::Stopped);
        assert!(!app.is_running());
        // sh exits on SIGTERM well before the force-kill deadline
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn stubborn_process_is_force_killed() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(dir.path(), "stubborn.sh", "trap '' TERM\nsleep 30");
        let mut app = AppProcess::start(&quick_config(&script, dir.path())).unwrap();

        app.stop().unwrap();
        assert_eq!(app.state(), ProcessState::Stopped);
        assert!(!app.is_running());
    }

    #[test]
    fn stop_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(dir.path(), "app.sh", "sleep 30");
        let mut app = AppProcess::start(&quick_config(&script, dir.path())).unwrap();
        app.stop().unwrap();
        app.stop().unwrap();
        assert_eq!(app.state(), ProcessState::Stopped);
    }
}
