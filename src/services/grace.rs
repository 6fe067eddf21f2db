//! The `grace` RPC namespace: numprocs reconciliation plus the
//! add/remove primitives it is built on.
//!
//! A scale-down is applied in two phases. `update_numprocs` only names the
//! processes to drop; the caller stops each one through the `supervisor`
//! namespace and then finalises it with `remove_process_from_group`, which
//! refuses anything that has not stopped.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::{processes_from_section, read_process_groups, SectionOptions};
use crate::error::RpcError;
use crate::metrics::METRICS;
use crate::models::ProcessGroupConfig;
use crate::services::diff::{decide, Decision};
use crate::services::group::ProcessGroup;
use crate::services::reconciler;
use crate::state::{lock_state, AppState, Supervisord};

pub const API_VERSION: &str = "1.0";

pub const NO_NEED_TO_UPDATE: &str = "No need to update";

/// Re-read the config file, mapping any failure to `CantReread`
pub fn reread(path: &Path) -> Result<Vec<ProcessGroupConfig>, RpcError> {
    read_process_groups(path).map_err(|e| RpcError::CantReread(e.to_string()))
}

/// `UpdateNumprocs` as served: the file is read on a blocking task with the
/// registry unlocked, then the diff and its application run under one lock.
pub async fn update_numprocs(state: &AppState, group_name: &str) -> Result<NumprocsResult, RpcError> {
    let config_path = {
        let supervisord = lock_state(state)?;
        supervisord.check_access("UpdateNumprocs")?;
        supervisord.options.config_path.clone()
    };

    let reloaded = match config_path {
        Some(path) => Some(
            tokio::task::spawn_blocking(move || reread(&path))
                .await
                .map_err(|e| RpcError::Failed(format!("config reload did not complete: {}", e)))??,
        ),
        None => None,
    };

    lock_state(state)?.update_numprocs(group_name, reloaded)
}

/// Result of `UpdateNumprocs` as sent on the wire
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum NumprocsResult {
    /// Entries were created; they start according to `autostart`
    Add {
        #[serde(rename = "processesName")]
        processes_name: Vec<String>,
    },
    /// Entries to stop and then remove; nothing has changed yet
    Reduce {
        #[serde(rename = "processesName")]
        processes_name: Vec<String>,
    },
    /// Nothing changed, or the change needs a full restart
    Error { msg: String },
}

impl NumprocsResult {
    fn label(&self) -> &'static str {
        match self {
            NumprocsResult::Add { .. } => "add",
            NumprocsResult::Reduce { .. } => "reduce",
            NumprocsResult::Error { .. } => "error",
        }
    }
}

/// Log level given either by name or by numeric code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LogLevel {
    Code(i64),
    Name(String),
}

impl Default for LogLevel {
    fn default() -> Self {
        LogLevel::Code(20)
    }
}

const LEVELS: [(i64, &str, &str, log::Level); 7] = [
    (50, "CRIT", "CRITICAL", log::Level::Error),
    (40, "ERRO", "ERROR", log::Level::Error),
    (30, "WARN", "WARNING", log::Level::Warn),
    (20, "INFO", "INFO", log::Level::Info),
    (10, "DEBG", "DEBUG", log::Level::Debug),
    (5, "TRAC", "TRACE", log::Level::Trace),
    (3, "BLAT", "BLATHER", log::Level::Trace),
];

impl LogLevel {
    pub fn resolve(&self) -> Option<log::Level> {
        LEVELS
            .iter()
            .find(|(code, short, long, _)| match self {
                LogLevel::Code(c) => c == code,
                LogLevel::Name(name) => {
                    let name = name.to_ascii_uppercase();
                    name == *short || name == *long
                }
            })
            .map(|(_, _, _, level)| *level)
    }
}

fn lookup_group<'a>(
    groups: &'a mut BTreeMap<String, ProcessGroup>,
    name: &str,
) -> Result<&'a mut ProcessGroup, RpcError> {
    groups
        .get_mut(name)
        .ok_or_else(|| RpcError::BadName(format!("group: {}", name)))
}

impl Supervisord {
    /// Gate every `grace` call: refuse during shutdown and, when a whitelist
    /// is configured, any method not on it.
    pub fn check_access(&self, method: &str) -> Result<(), RpcError> {
        self.ensure_not_shutdown()?;
        let whitelist = &self.options.whitelist;
        if !whitelist.is_empty() && !whitelist.iter().any(|m| m == method) {
            log::warn!("rejected RPC call {}: not in whitelist", method);
            return Err(RpcError::NotInWhitelist(method.to_string()));
        }
        Ok(())
    }

    pub fn get_api_version(&self) -> Result<&'static str, RpcError> {
        self.check_access("getAPIVersion")?;
        Ok(API_VERSION)
    }

    pub fn get_group_names(&self) -> Result<Vec<String>, RpcError> {
        self.check_access("getGroupNames")?;
        Ok(self.process_groups.keys().cloned().collect())
    }

    /// Write a caller supplied message to the host log
    pub fn log(&self, message: &str, level: &LogLevel) -> Result<bool, RpcError> {
        self.check_access("log")?;
        let level = level
            .resolve()
            .ok_or_else(|| RpcError::IncorrectParameters(format!("unknown log level {:?}", level)))?;
        log::log!(level, "{}", message);
        Ok(true)
    }

    /// Add a program to an existing group. Depending on `numprocs` this adds
    /// one or more processes.
    pub fn add_program_to_group(
        &mut self,
        group_name: &str,
        program_name: &str,
        options: &SectionOptions,
    ) -> Result<bool, RpcError> {
        self.check_access("addProgramToGroup")?;

        let Supervisord {
            options: server_options,
            process_groups,
            ..
        } = self;
        let group = lookup_group(process_groups, group_name)?;
        let new_configs = processes_from_section(program_name, group_name, options)?;

        for config in &new_configs {
            if group.config.process_configs.iter().any(|c| c.name == config.name) {
                return Err(RpcError::BadName(config.name.clone()));
            }
        }

        let added = reconciler::apply_scale_up(
            group,
            new_configs,
            &server_options.childlogdir,
            &server_options.identifier,
        )?;
        log::info!("added program {} to group {}: {:?}", program_name, group_name, added);
        Ok(true)
    }

    /// Bring a group's process count in line with `reloaded`, the program
    /// sections just read from disk (`None` when the host has no config
    /// file). Scale-ups are applied immediately; scale-downs are returned for
    /// the caller to stop and remove.
    pub fn update_numprocs(
        &mut self,
        group_name: &str,
        reloaded: Option<Vec<ProcessGroupConfig>>,
    ) -> Result<NumprocsResult, RpcError> {
        self.check_access("UpdateNumprocs")?;

        let Supervisord {
            options,
            process_groups,
            ..
        } = self;
        if let Some(groups) = reloaded {
            options.process_group_configs = groups;
        }

        let group = lookup_group(process_groups, group_name)?;
        let new_config = options
            .process_group_configs
            .iter()
            .find(|c| c.name == group_name)
            .ok_or_else(|| RpcError::BadName(format!("group: {} is no longer configured", group_name)))?;

        let result = match decide(&group.config, new_config) {
            Decision::NoOp => NumprocsResult::Error {
                msg: NO_NEED_TO_UPDATE.to_string(),
            },
            Decision::Rejected { reason } => {
                log::info!("numprocs update of {} rejected: {}", group_name, reason);
                NumprocsResult::Error {
                    msg: reason.to_string(),
                }
            }
            Decision::ScaleUp { added } => {
                let processes_name = reconciler::apply_scale_up(
                    group,
                    added,
                    &options.childlogdir,
                    &options.identifier,
                )?;
                log::info!("group {} scaled up: {:?}", group_name, processes_name);
                NumprocsResult::Add { processes_name }
            }
            Decision::ScaleDown { removed } => {
                let processes_name: Vec<String> = removed
                    .iter()
                    .map(|c| group.config.identity(&c.name))
                    .collect();
                log::info!("group {} to scale down: {:?}", group_name, processes_name);
                NumprocsResult::Reduce { processes_name }
            }
        };

        METRICS
            .numprocs_updates
            .with_label_values(&[group_name, result.label()])
            .inc();
        Ok(result)
    }

    /// Finalise the removal of one stopped process
    pub fn remove_process_from_group(
        &mut self,
        group_name: &str,
        process_name: &str,
    ) -> Result<bool, RpcError> {
        self.check_access("removeProcessFromGroup")?;

        let group = lookup_group(&mut self.process_groups, group_name)?;
        let identity = reconciler::remove_process(group, process_name)?;
        METRICS.removed_processes.with_label_values(&[group_name]).inc();
        log::info!("removed process {}", identity);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerOptions;
    use crate::models::{ProcessState, SupervisorState};
    use std::path::{Path, PathBuf};

    fn write_web(path: &Path, numprocs: u32, priority: i64) {
        let text = format!(
            "[supervisord]\nchildlogdir = {:?}\n\n\
             [program.web]\ncommand = \"sleep 30\"\nnumprocs = {}\nnumprocs_start = 1\n\
             process_name = \"process_%(process_num)d\"\npriority = {}\nautostart = false\n",
            path.parent().unwrap(),
            numprocs,
            priority
        );
        std::fs::write(path, text).unwrap();
    }

    fn supervisord(numprocs: u32) -> (Supervisord, PathBuf, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grace.toml");
        write_web(&path, numprocs, 999);
        let options = ServerOptions::load(&path).unwrap();
        (Supervisord::new(options).unwrap(), path, dir)
    }

    fn update(sup: &mut Supervisord, group_name: &str) -> Result<NumprocsResult, RpcError> {
        let reloaded = sup.options.config_path.clone().map(|p| reread(&p)).transpose()?;
        sup.update_numprocs(group_name, reloaded)
    }

    fn process_names(sup: &Supervisord) -> Vec<String> {
        sup.process_groups["web"].processes.keys().cloned().collect()
    }

    #[test]
    fn unchanged_config_needs_no_update() {
        let (mut sup, _path, _dir) = supervisord(2);
        let result = update(&mut sup, "web").unwrap();
        assert_eq!(
            result,
            NumprocsResult::Error {
                msg: NO_NEED_TO_UPDATE.to_string()
            }
        );
    }

    #[test]
    fn numprocs_increase_adds_processes() {
        let (mut sup, path, _dir) = supervisord(2);
        write_web(&path, 3, 999);

        let result = update(&mut sup, "web").unwrap();
        assert_eq!(
            result,
            NumprocsResult::Add {
                processes_name: vec!["web:process_3".to_string()]
            }
        );
        assert_eq!(process_names(&sup), ["process_1", "process_2", "process_3"]);
        assert_eq!(sup.process_groups["web"].config.process_configs.len(), 3);

        // applying again is a no-op
        assert!(matches!(update(&mut sup, "web").unwrap(), NumprocsResult::Error { .. }));
    }

    #[test]
    fn numprocs_decrease_is_two_phase() {
        let (mut sup, path, _dir) = supervisord(3);
        sup.process_groups
            .get_mut("web")
            .unwrap()
            .processes
            .values_mut()
            .for_each(|p| {
                p.state = ProcessState::Running;
                p.pid = Some(100);
            });
        write_web(&path, 1, 999);

        let result = update(&mut sup, "web").unwrap();
        assert_eq!(
            result,
            NumprocsResult::Reduce {
                processes_name: vec!["web:process_2".to_string(), "web:process_3".to_string()]
            }
        );
        // nothing removed yet
        assert_eq!(process_names(&sup).len(), 3);

        let err = sup.remove_process_from_group("web", "process_2").unwrap_err();
        assert!(matches!(err, RpcError::StillRunning(_)));
        assert_eq!(process_names(&sup).len(), 3);

        for name in ["process_2", "process_3"] {
            let p = sup.process_groups.get_mut("web").unwrap().processes.get_mut(name).unwrap();
            p.state = ProcessState::Stopped;
            p.pid = None;
            assert!(sup.remove_process_from_group("web", name).unwrap());
        }
        assert_eq!(process_names(&sup), ["process_1"]);
        assert!(matches!(update(&mut sup, "web").unwrap(), NumprocsResult::Error { ref msg } if msg == NO_NEED_TO_UPDATE));
    }

    #[test]
    fn priority_change_is_reported() {
        let (mut sup, path, _dir) = supervisord(2);
        write_web(&path, 3, 1);
        match update(&mut sup, "web").unwrap() {
            NumprocsResult::Error { msg } => assert!(msg.contains("priority")),
            other => panic!("expected error result, got {:?}", other),
        }
        assert_eq!(process_names(&sup).len(), 2);
    }

    #[test]
    fn unknown_group_and_bad_config() {
        let (mut sup, path, _dir) = supervisord(2);
        assert!(matches!(update(&mut sup, "db"), Err(RpcError::BadName(_))));

        std::fs::write(&path, "[program.web\n").unwrap();
        assert!(matches!(update(&mut sup, "web"), Err(RpcError::CantReread(_))));
    }

    #[tokio::test]
    async fn served_update_reads_the_file_unlocked() {
        let (sup, path, _dir) = supervisord(2);
        let state = std::sync::Arc::new(std::sync::Mutex::new(sup));
        write_web(&path, 3, 999);

        let result = update_numprocs(&state, "web").await.unwrap();
        assert_eq!(
            result,
            NumprocsResult::Add {
                processes_name: vec!["web:process_3".to_string()]
            }
        );
        assert_eq!(process_names(&state.lock().unwrap()).len(), 3);

        std::fs::write(&path, "[program.web\n").unwrap();
        assert!(matches!(
            update_numprocs(&state, "web").await,
            Err(RpcError::CantReread(_))
        ));
        // the groups read last time are kept
        let sup = state.lock().unwrap();
        assert_eq!(sup.options.process_group_configs[0].process_configs.len(), 3);
    }

    #[test]
    fn add_program_to_group() {
        let (mut sup, _path, _dir) = supervisord(1);
        let options: SectionOptions = [
            ("command", "sleep 5"),
            ("numprocs", "2"),
            ("process_name", "extra_%(process_num)d"),
            ("autostart", "false"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        assert!(sup.add_program_to_group("web", "extra", &options).unwrap());
        assert_eq!(process_names(&sup), ["extra_0", "extra_1", "process_1"]);

        let err = sup.add_program_to_group("web", "extra", &options).unwrap_err();
        assert!(matches!(err, RpcError::BadName(ref name) if name == "extra_0"));

        let err = sup
            .add_program_to_group("web", "broken", &SectionOptions::new())
            .unwrap_err();
        assert!(matches!(err, RpcError::IncorrectParameters(_)));

        let err = sup.add_program_to_group("db", "extra", &options).unwrap_err();
        assert!(matches!(err, RpcError::BadName(_)));

        let mut overflowing = options.clone();
        overflowing.insert("numprocs_start".to_string(), "4294967295".to_string());
        let err = sup.add_program_to_group("web", "wrap", &overflowing).unwrap_err();
        assert!(matches!(err, RpcError::IncorrectParameters(_)));
        assert_eq!(process_names(&sup).len(), 3);
    }

    #[test]
    fn remove_unknown_process() {
        let (mut sup, _path, _dir) = supervisord(1);
        let err = sup.remove_process_from_group("web", "nope").unwrap_err();
        assert!(matches!(err, RpcError::BadName(ref name) if name == "nope"));
    }

    #[test]
    fn whitelist_gates_every_method() {
        let (mut sup, _path, _dir) = supervisord(1);
        sup.options.whitelist = vec!["getAPIVersion".to_string()];

        assert_eq!(sup.get_api_version().unwrap(), API_VERSION);
        assert!(matches!(sup.get_group_names(), Err(RpcError::NotInWhitelist(_))));
        assert!(matches!(sup.log("hi", &LogLevel::default()), Err(RpcError::NotInWhitelist(_))));
        assert!(matches!(update(&mut sup, "web"), Err(RpcError::NotInWhitelist(_))));
        assert!(matches!(
            sup.remove_process_from_group("web", "process_1"),
            Err(RpcError::NotInWhitelist(_))
        ));
        assert!(matches!(
            sup.add_program_to_group("web", "x", &SectionOptions::new()),
            Err(RpcError::NotInWhitelist(_))
        ));
    }

    #[test]
    fn shutdown_refuses_calls() {
        let (mut sup, _path, _dir) = supervisord(1);
        sup.state = SupervisorState::Shutdown;
        assert!(matches!(sup.get_api_version(), Err(RpcError::ShutdownState)));
        assert!(matches!(update(&mut sup, "web"), Err(RpcError::ShutdownState)));
    }

    #[test]
    fn log_levels() {
        let (sup, _path, _dir) = supervisord(1);
        assert!(sup.log("by name", &LogLevel::Name("warn".to_string())).unwrap());
        assert!(sup.log("by long name", &LogLevel::Name("critical".to_string())).unwrap());
        assert!(sup.log("by code", &LogLevel::Code(10)).unwrap());
        assert!(matches!(
            sup.log("bad", &LogLevel::Name("LOUD".to_string())),
            Err(RpcError::IncorrectParameters(_))
        ));
        assert!(matches!(
            sup.log("bad", &LogLevel::Code(21)),
            Err(RpcError::IncorrectParameters(_))
        ));
        assert_eq!(sup.get_group_names().unwrap(), ["web"]);
    }

    #[test]
    fn result_wire_format() {
        let add = NumprocsResult::Add {
            processes_name: vec!["web:process_3".to_string()],
        };
        assert_eq!(
            serde_json::to_value(&add).unwrap(),
            serde_json::json!({"type": "add", "processesName": ["web:process_3"]})
        );
        let error: NumprocsResult =
            serde_json::from_str(r#"{"type": "error", "msg": "No need to update"}"#).unwrap();
        assert_eq!(
            error,
            NumprocsResult::Error {
                msg: NO_NEED_TO_UPDATE.to_string()
            }
        );
    }
}
