use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::config::options::{processes_from_section, SectionOptions};
use crate::config::ConfigError;
use crate::models::ProcessGroupConfig;

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    supervisord: SupervisordSection,
    #[serde(default)]
    grace: GraceSection,
    #[serde(default)]
    program: BTreeMap<String, toml::Table>,
}

#[derive(Debug, Default, Deserialize)]
struct SupervisordSection {
    childlogdir: Option<PathBuf>,
    identifier: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct GraceSection {
    #[serde(default)]
    whitelist: Vec<String>,
}

/// Host options plus the group configs most recently read from disk
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// File re-read on every reload; `None` keeps the in-memory groups
    pub config_path: Option<PathBuf>,
    /// Directory for `AUTO` child logs
    pub childlogdir: PathBuf,
    pub identifier: String,
    /// RPC methods callers may use; empty allows all
    pub whitelist: Vec<String>,
    pub process_group_configs: Vec<ProcessGroupConfig>,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            config_path: None,
            childlogdir: std::env::temp_dir(),
            identifier: "supervisor".to_string(),
            whitelist: Vec::new(),
            process_group_configs: Vec::new(),
        }
    }
}

impl ServerOptions {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let file = read_config_file(path)?;
        let defaults = ServerOptions::default();
        let process_group_configs = group_configs(&file)?;

        Ok(Self {
            config_path: Some(path.to_path_buf()),
            childlogdir: file.supervisord.childlogdir.unwrap_or(defaults.childlogdir),
            identifier: file.supervisord.identifier.unwrap_or(defaults.identifier),
            whitelist: file.grace.whitelist,
            process_group_configs,
        })
    }
}

/// Read the program sections of `path` again. Host-level settings are not
/// re-read; they keep their startup values.
pub fn read_process_groups(path: &Path) -> Result<Vec<ProcessGroupConfig>, ConfigError> {
    let groups = group_configs(&read_config_file(path)?)?;
    log::debug!("Re-read {} group(s) from {}", groups.len(), path.display());
    Ok(groups)
}

fn read_config_file(path: &Path) -> Result<ConfigFile, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// One homogeneous group per `[program.X]` section, ordered by priority
/// then name.
fn group_configs(file: &ConfigFile) -> Result<Vec<ProcessGroupConfig>, ConfigError> {
    let mut groups = Vec::with_capacity(file.program.len());
    for (program, table) in &file.program {
        let options = options_from_toml(program, table)?;
        let process_configs = processes_from_section(program, program, &options)?;
        let priority = process_configs.first().map(|c| c.priority).unwrap_or(999);
        groups.push(ProcessGroupConfig {
            name: program.clone(),
            priority,
            process_configs,
        });
    }
    groups.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.name.cmp(&b.name)));
    Ok(groups)
}

fn options_from_toml(program: &str, table: &toml::Table) -> Result<SectionOptions, ConfigError> {
    table
        .iter()
        .map(|(key, value)| {
            let value = toml_scalar(value)
                .or_else(|| match value {
                    toml::Value::Array(items) => items
                        .iter()
                        .map(toml_scalar)
                        .collect::<Option<Vec<_>>>()
                        .map(|items| items.join(",")),
                    toml::Value::Table(env) => env
                        .iter()
                        .map(|(k, v)| toml_scalar(v).map(|v| format!("{}={}", k, v)))
                        .collect::<Option<Vec<_>>>()
                        .map(|pairs| pairs.join(",")),
                    _ => None,
                })
                .ok_or_else(|| ConfigError::UnsupportedValue {
                    option: format!("{}.{}", program, key),
                })?;
            Ok((key.clone(), value))
        })
        .collect()
}

fn toml_scalar(value: &toml::Value) -> Option<String> {
    match value {
        toml::Value::String(s) => Some(s.clone()),
        toml::Value::Integer(i) => Some(i.to_string()),
        toml::Value::Float(f) => Some(f.to_string()),
        toml::Value::Boolean(b) => Some(b.to_string()),
        toml::Value::Datetime(d) => Some(d.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(dir: &Path, text: &str) -> PathBuf {
        let path = dir.join("grace.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(text.as_bytes()).unwrap();
        path
    }

    #[test]
    fn loads_programs_as_groups() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            dir.path(),
            r#"
            [supervisord]
            childlogdir = "/var/log/grace"

            [grace]
            whitelist = ["getAPIVersion"]

            [program.web]
            command = "serve"
            numprocs = 2
            numprocs_start = 1
            process_name = "process_%(process_num)d"
            priority = 10
            autostart = false
            environment = { PORT = 8000 }

            [program.cron]
            command = "tick"
            "#,
        );

        let options = ServerOptions::load(&path).unwrap();
        assert_eq!(options.childlogdir, PathBuf::from("/var/log/grace"));
        assert_eq!(options.identifier, "supervisor");
        assert_eq!(options.whitelist, ["getAPIVersion"]);

        let names: Vec<_> = options
            .process_group_configs
            .iter()
            .map(|g| g.name.as_str())
            .collect();
        assert_eq!(names, ["web", "cron"]);

        let web = &options.process_group_configs[0];
        assert_eq!(web.priority, 10);
        assert_eq!(web.process_configs.len(), 2);
        assert_eq!(web.process_configs[1].name, "process_2");
        assert!(!web.process_configs[0].autostart);
        assert_eq!(web.process_configs[0].environment["PORT"], "8000");
    }

    #[test]
    fn reload_picks_up_new_numprocs() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            dir.path(),
            "[program.web]\ncommand = \"serve\"\nnumprocs = 1\nprocess_name = \"p_%(process_num)d\"\n",
        );
        let options = ServerOptions::load(&path).unwrap();
        assert_eq!(options.process_group_configs[0].process_configs.len(), 1);

        write_config(
            dir.path(),
            "[program.web]\ncommand = \"serve\"\nnumprocs = 4\nprocess_name = \"p_%(process_num)d\"\n",
        );
        let groups = read_process_groups(&path).unwrap();
        assert_eq!(groups[0].process_configs.len(), 4);
    }

    #[test]
    fn reload_of_broken_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(dir.path(), "[program.web]\ncommand = \"serve\"\n");
        ServerOptions::load(&path).unwrap();

        write_config(dir.path(), "[program.web]\nnumprocs = 2\n");
        let err = read_process_groups(&path).unwrap_err();
        assert!(matches!(err, ConfigError::MissingOption { option: "command", .. }));
    }

    #[test]
    fn unreadable_file_is_an_error() {
        let err = ServerOptions::load(Path::new("/nonexistent/grace.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
