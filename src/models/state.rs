use serde::{Deserialize, Serialize};

/// Lifecycle state of one child
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProcessState {
    Stopped,
    Starting,
    Running,
    Backoff,
    Stopping,
    Exited,
    Fatal,
    Unknown,
}

impl ProcessState {
    /// Terminal states: a process here may be removed from its group
    pub fn is_stopped(self) -> bool {
        matches!(
            self,
            ProcessState::Stopped | ProcessState::Exited | ProcessState::Fatal | ProcessState::Unknown
        )
    }

    pub fn is_running(self) -> bool {
        matches!(
            self,
            ProcessState::Starting | ProcessState::Running | ProcessState::Backoff
        )
    }
}

/// Lifecycle state of the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SupervisorState {
    Fatal,
    Running,
    Restarting,
    Shutdown,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stopping_is_neither_stopped_nor_running() {
        assert!(!ProcessState::Stopping.is_stopped());
        assert!(!ProcessState::Stopping.is_running());
        assert!(ProcessState::Exited.is_stopped());
        assert!(ProcessState::Starting.is_running());
    }

    #[test]
    fn states_serialize_uppercase() {
        assert_eq!(serde_json::to_string(&ProcessState::Stopped).unwrap(), "\"STOPPED\"");
    }
}
