use std::fs::{File, OpenOptions};
use std::io;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use tokio::process::{Child, Command};

use crate::error::RpcError;
use crate::models::{LogTarget, ProcessConfig, ProcessInfo, ProcessState};

/// Live handle of one configured process
#[derive(Debug)]
pub struct Subprocess {
    pub group: String,
    pub config: ProcessConfig,
    pub state: ProcessState,
    pub pid: Option<u32>,
    pub laststart: Option<u64>,
    pub laststop: Option<u64>,
    pub exitstatus: Option<i32>,
    child: Option<Child>,
    spawned_at: Option<Instant>,
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

fn open_log(target: &LogTarget) -> io::Result<Option<File>> {
    match target.path() {
        Some(path) => OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map(Some),
        None => Ok(None),
    }
}

impl Subprocess {
    pub fn new(group: &str, config: ProcessConfig) -> Self {
        Self {
            group: group.to_string(),
            config,
            state: ProcessState::Stopped,
            pid: None,
            laststart: None,
            laststop: None,
            exitstatus: None,
            child: None,
            spawned_at: None,
        }
    }

    pub fn identity(&self) -> String {
        format!("{}:{}", self.group, self.config.name)
    }

    /// Start `/bin/sh -c <command>`. Must run inside a tokio runtime.
    pub fn spawn(&mut self) -> Result<u32, RpcError> {
        if self.state.is_running() || self.state == ProcessState::Stopping {
            return Err(RpcError::AlreadyStarted(self.identity()));
        }

        let spawned = self.build_command().and_then(|mut command| command.spawn());
        let child = match spawned {
            Ok(child) => child,
            Err(e) => {
                self.state = ProcessState::Fatal;
                log::error!("spawn error for {}: {}", self.identity(), e);
                return Err(RpcError::SpawnError(format!("{}: {}", self.identity(), e)));
            }
        };

        let pid = child.id().unwrap_or_default();
        self.pid = Some(pid);
        self.child = Some(child);
        self.state = ProcessState::Starting;
        self.laststart = Some(unix_now());
        self.spawned_at = Some(Instant::now());
        self.exitstatus = None;
        log::info!("spawned: '{}' with pid {}", self.identity(), pid);
        Ok(pid)
    }

    fn build_command(&self) -> io::Result<Command> {
        let mut command = Command::new("/bin/sh");
        command
            .arg("-c")
            .arg(&self.config.command)
            .envs(&self.config.environment)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if let Some(dir) = &self.config.directory {
            command.current_dir(dir);
        }

        let stdout = open_log(&self.config.stdout_logfile)?;
        let stderr = if self.config.redirect_stderr {
            stdout.as_ref().map(File::try_clone).transpose()?
        } else {
            open_log(&self.config.stderr_logfile)?
        };
        command.stdout(stdout.map(Stdio::from).unwrap_or_else(Stdio::null));
        command.stderr(stderr.map(Stdio::from).unwrap_or_else(Stdio::null));
        Ok(command)
    }

    /// Reap an exited child and promote `Starting` to `Running` once the
    /// child has stayed up for `startsecs`.
    pub fn poll(&mut self) {
        let Some(child) = self.child.as_mut() else {
            return;
        };
        match child.try_wait() {
            Ok(Some(status)) => {
                self.child = None;
                self.reaped(status);
            }
            Ok(None) => {
                let up_for = self.spawned_at.map(|t| t.elapsed()).unwrap_or_default();
                if self.state == ProcessState::Starting
                    && up_for >= Duration::from_secs(self.config.startsecs)
                {
                    self.state = ProcessState::Running;
                    log::info!("success: {} entered RUNNING state", self.identity());
                }
            }
            Err(e) => log::warn!("failed to poll {}: {}", self.identity(), e),
        }
    }

    fn reaped(&mut self, status: ExitStatus) {
        self.pid = None;
        self.exitstatus = status.code();
        self.laststop = Some(unix_now());
        self.state = ProcessState::Exited;
        log::info!("exited: {} ({})", self.identity(), status);
    }

    /// Re-evaluate the process: reap it, and autostart it if it was never
    /// started.
    pub fn transition(&mut self) {
        self.poll();
        if self.state == ProcessState::Stopped && self.laststart.is_none() && self.config.autostart {
            // spawn logs its own failure and leaves the process FATAL
            let _ = self.spawn();
        }
    }

    /// Move to `Stopping` and hand the child to the caller, who signals and
    /// waits on it without holding the registry.
    pub fn begin_stop(&mut self) -> Option<Child> {
        if !self.state.is_running() {
            return None;
        }
        let child = self.child.take();
        if child.is_none() {
            self.state = ProcessState::Unknown;
            return None;
        }
        self.state = ProcessState::Stopping;
        child
    }

    pub fn finish_stop(&mut self, status: Option<ExitStatus>) {
        self.pid = None;
        self.exitstatus = status.and_then(|s| s.code());
        self.laststop = Some(unix_now());
        self.state = ProcessState::Stopped;
        log::info!("stopped: {}", self.identity());
    }

    pub fn info(&self) -> ProcessInfo {
        ProcessInfo {
            name: self.config.name.clone(),
            group: self.group.clone(),
            state: self.state,
            pid: self.pid,
            start: self.laststart,
            stop: self.laststop,
            exitstatus: self.exitstatus,
            stdout_logfile: self.config.stdout_logfile.to_string(),
            stderr_logfile: self.config.stderr_logfile.to_string(),
        }
    }
}
