use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ConfigError;
use crate::services::reconciler::ReconcileError;

pub const NOT_RUNNING: u16 = 70;
pub const NOT_IN_WHITELIST: u16 = 230;

/// Faults returned to RPC callers. None of them are retried server side.
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("INCORRECT_PARAMETERS: {0}")]
    IncorrectParameters(String),

    #[error("SHUTDOWN_STATE")]
    ShutdownState,

    #[error("BAD_NAME: {0}")]
    BadName(String),

    #[error("FAILED: {0}")]
    Failed(String),

    #[error("SPAWN_ERROR: {0}")]
    SpawnError(String),

    #[error("ALREADY_STARTED: {0}")]
    AlreadyStarted(String),

    #[error("NOT_RUNNING: {0}")]
    NotRunning(String),

    #[error("STILL_RUNNING: {0}")]
    StillRunning(String),

    #[error("CANT_REREAD: {0}")]
    CantReread(String),

    #[error("NOT_IN_WHITELIST: {0}")]
    NotInWhitelist(String),
}

impl RpcError {
    /// Numeric fault code
    pub fn code(&self) -> u16 {
        match self {
            RpcError::IncorrectParameters(_) => 2,
            RpcError::ShutdownState => 6,
            RpcError::BadName(_) => 10,
            RpcError::Failed(_) => 30,
            RpcError::SpawnError(_) => 50,
            RpcError::AlreadyStarted(_) => 60,
            RpcError::NotRunning(_) => NOT_RUNNING,
            RpcError::StillRunning(_) => 91,
            RpcError::CantReread(_) => 92,
            RpcError::NotInWhitelist(_) => NOT_IN_WHITELIST,
        }
    }
}

/// Body of a failed RPC call
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fault {
    pub fault_code: u16,
    pub fault_string: String,
}

/// A fault returned by a remote host
#[derive(Debug, Error)]
#[error("{path}: fault {}: {}", .fault.fault_code, .fault.fault_string)]
pub struct RemoteFault {
    pub path: String,
    pub fault: Fault,
}

impl From<&RpcError> for Fault {
    fn from(err: &RpcError) -> Self {
        Fault {
            fault_code: err.code(),
            fault_string: err.to_string(),
        }
    }
}

impl From<ConfigError> for RpcError {
    fn from(err: ConfigError) -> Self {
        RpcError::IncorrectParameters(err.to_string())
    }
}

impl From<ReconcileError> for RpcError {
    fn from(err: ReconcileError) -> Self {
        match err {
            ReconcileError::UnknownProcess { process, .. } => RpcError::BadName(process),
            ReconcileError::StillRunning { process, .. } => RpcError::StillRunning(process),
            other => RpcError::Failed(other.to_string()),
        }
    }
}
