use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use nix::sys::signal::Signal;

/// Destination of one child output channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogTarget {
    /// A file is created in `childlogdir` when the process is set up
    Auto,
    /// Output is discarded
    None,
    /// Output is appended to this file
    File(PathBuf),
}

impl LogTarget {
    pub fn parse(value: &str) -> Self {
        let value = value.trim();
        if value.eq_ignore_ascii_case("auto") {
            LogTarget::Auto
        } else if value.is_empty() || value.eq_ignore_ascii_case("none") {
            LogTarget::None
        } else {
            LogTarget::File(PathBuf::from(value))
        }
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            LogTarget::File(path) => Some(path),
            _ => None,
        }
    }

    /// `Auto` matches anything: the live copy holds the materialised path
    /// while a freshly read config still says `AUTO`.
    fn matches(&self, other: &LogTarget) -> bool {
        matches!(self, LogTarget::Auto) || matches!(other, LogTarget::Auto) || self == other
    }
}

impl fmt::Display for LogTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogTarget::Auto => write!(f, "AUTO"),
            LogTarget::None => write!(f, "NONE"),
            LogTarget::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Signal sent to a child when it is asked to stop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopSignal {
    Term,
    Hup,
    Int,
    Quit,
    Kill,
    Usr1,
    Usr2,
}

impl StopSignal {
    pub fn signal(self) -> Signal {
        match self {
            StopSignal::Term => Signal::SIGTERM,
            StopSignal::Hup => Signal::SIGHUP,
            StopSignal::Int => Signal::SIGINT,
            StopSignal::Quit => Signal::SIGQUIT,
            StopSignal::Kill => Signal::SIGKILL,
            StopSignal::Usr1 => Signal::SIGUSR1,
            StopSignal::Usr2 => Signal::SIGUSR2,
        }
    }
}

impl FromStr for StopSignal {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_ascii_uppercase();
        let name = name.strip_prefix("SIG").unwrap_or(name.as_str());
        match name {
            "TERM" => Ok(StopSignal::Term),
            "HUP" => Ok(StopSignal::Hup),
            "INT" => Ok(StopSignal::Int),
            "QUIT" => Ok(StopSignal::Quit),
            "KILL" => Ok(StopSignal::Kill),
            "USR1" => Ok(StopSignal::Usr1),
            "USR2" => Ok(StopSignal::Usr2),
            _ => Err(format!("value {:?} is not a signal name", s)),
        }
    }
}

/// One declared worker slot of a group.
///
/// Equality covers every field, so two slots compare equal only when the
/// whole declaration matches. The single exception is an `AUTO` log target,
/// which matches any target. Because of that the type is `PartialEq` only and
/// must be compared pairwise rather than hashed.
#[derive(Debug, Clone)]
pub struct ProcessConfig {
    /// Process name, unique inside its group
    pub name: String,
    /// Shell command line
    pub command: String,
    /// Working directory
    pub directory: Option<PathBuf>,
    /// Extra environment variables
    pub environment: BTreeMap<String, String>,
    pub priority: i64,
    /// Started by the host without an explicit request
    pub autostart: bool,
    /// Seconds a child has to stay up to count as running
    pub startsecs: u64,
    pub stopsignal: StopSignal,
    /// Seconds to wait after the stop signal before killing
    pub stopwaitsecs: u64,
    pub redirect_stderr: bool,
    pub stdout_logfile: LogTarget,
    pub stderr_logfile: LogTarget,
}

impl PartialEq for ProcessConfig {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.command == other.command
            && self.directory == other.directory
            && self.environment == other.environment
            && self.priority == other.priority
            && self.autostart == other.autostart
            && self.startsecs == other.startsecs
            && self.stopsignal == other.stopsignal
            && self.stopwaitsecs == other.stopwaitsecs
            && self.redirect_stderr == other.redirect_stderr
            && self.stdout_logfile.matches(&other.stdout_logfile)
            && self.stderr_logfile.matches(&other.stderr_logfile)
    }
}

impl ProcessConfig {
    /// Replace every `AUTO` log target with a newly created file in
    /// `childlogdir`. Targets that are already concrete are left alone.
    pub fn create_autochildlogs(&mut self, childlogdir: &Path, identifier: &str) -> io::Result<()> {
        if self.stdout_logfile == LogTarget::Auto {
            self.stdout_logfile = LogTarget::File(autochildlog(childlogdir, &self.name, "stdout", identifier)?);
        }
        // stderr goes to the stdout file when redirected
        if self.stderr_logfile == LogTarget::Auto && !self.redirect_stderr {
            self.stderr_logfile = LogTarget::File(autochildlog(childlogdir, &self.name, "stderr", identifier)?);
        }
        Ok(())
    }
}

fn autochildlog(childlogdir: &Path, name: &str, channel: &str, identifier: &str) -> io::Result<PathBuf> {
    let prefix = format!("{}-{}---{}-", name, channel, identifier);
    let file = tempfile::Builder::new()
        .prefix(&prefix)
        .suffix(".log")
        .tempfile_in(childlogdir)?;
    let (_, path) = file.keep().map_err(|e| e.error)?;
    Ok(path)
}

/// Declared state of one group
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessGroupConfig {
    /// Group name, unique across the host
    pub name: String,
    pub priority: i64,
    /// Slots in numprocs order
    pub process_configs: Vec<ProcessConfig>,
}

impl ProcessGroupConfig {
    /// External address of a process: `<group>:<process>`
    pub fn identity(&self, process_name: &str) -> String {
        format!("{}:{}", self.name, process_name)
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn process(name: &str) -> ProcessConfig {
        ProcessConfig {
            name: name.to_string(),
            command: "sleep 30".to_string(),
            directory: None,
            environment: BTreeMap::new(),
            priority: 999,
            autostart: false,
            startsecs: 0,
            stopsignal: StopSignal::Term,
            stopwaitsecs: 5,
            redirect_stderr: false,
            stdout_logfile: LogTarget::None,
            stderr_logfile: LogTarget::None,
        }
    }

    pub fn group(name: &str, processes: &[&str]) -> ProcessGroupConfig {
        ProcessGroupConfig {
            name: name.to_string(),
            priority: 999,
            process_configs: processes.iter().map(|p| process(p)).collect(),
        }
    }
}
