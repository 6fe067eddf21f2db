//! Applies scale decisions to a live group.
//!
//! Neither direction is transactional: a failure part way through a batch
//! leaves the entries handled so far in place.

use std::io;
use std::path::Path;

use thiserror::Error;

use crate::models::ProcessConfig;
use crate::services::group::ProcessGroup;
use crate::services::subprocess::Subprocess;

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("process {process} already exists in group {group}")]
    AlreadyPresent { group: String, process: String },

    #[error("cannot create child logs for {process}: {source}")]
    ChildLog { process: String, source: io::Error },

    #[error("no process {process} in group {group}")]
    UnknownProcess { group: String, process: String },

    #[error("process {group}:{process} has not stopped")]
    StillRunning { group: String, process: String },
}

/// Add new slots to `group` in order. Each slot gets its child logs set up
/// once, is appended to the group config and gets a fresh, unstarted handle.
/// Whether it starts is left to its `autostart` setting.
pub fn apply_scale_up(
    group: &mut ProcessGroup,
    added: Vec<ProcessConfig>,
    childlogdir: &Path,
    identifier: &str,
) -> Result<Vec<String>, ReconcileError> {
    let mut identities = Vec::with_capacity(added.len());
    for mut config in added {
        let exists = group.processes.contains_key(&config.name)
            || group.config.process_configs.iter().any(|c| c.name == config.name);
        if exists {
            return Err(ReconcileError::AlreadyPresent {
                group: group.name().to_string(),
                process: config.name,
            });
        }

        config
            .create_autochildlogs(childlogdir, identifier)
            .map_err(|source| ReconcileError::ChildLog {
                process: config.name.clone(),
                source,
            })?;

        let process = Subprocess::new(group.name(), config.clone());
        identities.push(process.identity());
        group.config.process_configs.push(config);
        group.processes.insert(process.config.name.clone(), process);
    }
    Ok(identities)
}

/// Drop a stopped process from the group config and the live registry.
/// Nothing is stopped here; a process with a pid or outside a stopped state
/// is refused and the group is left untouched.
pub fn remove_process(group: &mut ProcessGroup, process_name: &str) -> Result<String, ReconcileError> {
    let Some(process) = group.processes.get(process_name) else {
        return Err(ReconcileError::UnknownProcess {
            group: group.name().to_string(),
            process: process_name.to_string(),
        });
    };
    if process.pid.is_some() || !process.state.is_stopped() {
        return Err(ReconcileError::StillRunning {
            group: group.name().to_string(),
            process: process_name.to_string(),
        });
    }

    let identity = process.identity();
    group.config.process_configs.retain(|c| c.name != process_name);
    group.processes.remove(process_name);
    group.transition();
    Ok(identity)
}

/// `remove_process` for each slot, stopping at the first failure
pub fn apply_scale_down(
    group: &mut ProcessGroup,
    removed: &[ProcessConfig],
) -> Result<Vec<String>, ReconcileError> {
    removed
        .iter()
        .map(|config| remove_process(group, &config.name))
        .collect()
}
