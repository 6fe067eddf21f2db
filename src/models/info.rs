use serde::{Deserialize, Serialize};

use crate::models::ProcessState;

/// Snapshot of one live process as reported over RPC
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessInfo {
    pub name: String,
    pub group: String,
    pub state: ProcessState,
    pub pid: Option<u32>,
    /// Unix timestamp of the last spawn
    pub start: Option<u64>,
    /// Unix timestamp of the last stop
    pub stop: Option<u64>,
    pub exitstatus: Option<i32>,
    pub stdout_logfile: String,
    pub stderr_logfile: String,
}

impl ProcessInfo {
    pub fn identity(&self) -> String {
        format!("{}:{}", self.group, self.name)
    }
}
