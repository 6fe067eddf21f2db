use std::collections::BTreeMap;
use std::path::Path;

use crate::models::{ProcessGroupConfig, ProcessInfo};
use crate::services::reconciler::ReconcileError;
use crate::services::subprocess::Subprocess;

/// Live group: the config in effect plus one handle per configured slot.
///
/// `processes` is keyed exactly by the names in `config.process_configs`.
#[derive(Debug)]
pub struct ProcessGroup {
    pub config: ProcessGroupConfig,
    pub processes: BTreeMap<String, Subprocess>,
}

impl ProcessGroup {
    /// Set up a group at startup: child logs are materialised here, once per
    /// process.
    pub fn new(
        mut config: ProcessGroupConfig,
        childlogdir: &Path,
        identifier: &str,
    ) -> Result<Self, ReconcileError> {
        let mut processes = BTreeMap::new();
        for process_config in config.process_configs.iter_mut() {
            process_config
                .create_autochildlogs(childlogdir, identifier)
                .map_err(|source| ReconcileError::ChildLog {
                    process: process_config.name.clone(),
                    source,
                })?;
            processes.insert(
                process_config.name.clone(),
                Subprocess::new(&config.name, process_config.clone()),
            );
        }
        Ok(Self { config, processes })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn transition(&mut self) {
        for process in self.processes.values_mut() {
            process.transition();
        }
    }

    /// Process infos in slot order
    pub fn process_infos(&self) -> Vec<ProcessInfo> {
        self.config
            .process_configs
            .iter()
            .filter_map(|c| self.processes.get(&c.name))
            .map(Subprocess::info)
            .collect()
    }
}
