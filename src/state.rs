use crate::config::ServerOptions;
use crate::error::RpcError;
use crate::models::SupervisorState;
use crate::services::group::ProcessGroup;
use crate::services::reconciler::ReconcileError;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// The host: options, lifecycle state and the group registry
pub struct Supervisord {
    pub state: SupervisorState,
    pub options: ServerOptions,
    pub process_groups: BTreeMap<String, ProcessGroup>,
}

/// Every RPC holds this lock for its synchronous part, which serialises
/// mutations of any one group.
pub type AppState = Arc<Mutex<Supervisord>>;

impl Supervisord {
    pub fn new(options: ServerOptions) -> Result<Self, ReconcileError> {
        let mut process_groups = BTreeMap::new();
        for config in options.process_group_configs.iter().cloned() {
            let group = ProcessGroup::new(config, &options.childlogdir, &options.identifier)?;
            process_groups.insert(group.name().to_string(), group);
        }
        Ok(Self {
            state: SupervisorState::Running,
            options,
            process_groups,
        })
    }

    pub fn ensure_not_shutdown(&self) -> Result<(), RpcError> {
        if self.state == SupervisorState::Shutdown {
            return Err(RpcError::ShutdownState);
        }
        Ok(())
    }
}

pub fn new_state(options: ServerOptions) -> Result<AppState, ReconcileError> {
    Ok(Arc::new(Mutex::new(Supervisord::new(options)?)))
}

pub fn lock_state(state: &AppState) -> Result<MutexGuard<'_, Supervisord>, RpcError> {
    state
        .lock()
        .map_err(|_| RpcError::Failed("process registry lock poisoned".to_string()))
}
