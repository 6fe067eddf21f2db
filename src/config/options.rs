use std::collections::BTreeMap;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;

use lazy_static::lazy_static;
use regex::{Captures, Regex};

use crate::config::ConfigError;
use crate::models::{LogTarget, ProcessConfig, StopSignal};

/// Flat `option -> value` mapping of one program section
pub type SectionOptions = BTreeMap<String, String>;

const DEFAULT_PROCESS_NAME: &str = "%(program_name)s";

/// Upper bound on slots per program section
pub const MAX_NUMPROCS: u32 = 10_000;

lazy_static! {
    static ref TEMPLATE: Regex =
        Regex::new(r"%%|%\((\w+)\)(0?)(\d*)([sd])").expect("template pattern is valid");
}

/// Expand `%(key)s` / `%(key)0Nd` references. `ENV_X` keys read the
/// environment of the host.
pub fn expand(template: &str, vars: &BTreeMap<&str, String>) -> Result<String, String> {
    let mut error = None;
    let expanded = TEMPLATE.replace_all(template, |caps: &Captures| {
        if &caps[0] == "%%" {
            return "%".to_string();
        }
        let key = &caps[1];
        let value = match key.strip_prefix("ENV_") {
            Some(var) => std::env::var(var).ok(),
            None => vars.get(key).cloned(),
        };
        let Some(value) = value else {
            error.get_or_insert_with(|| format!("unknown expansion key '{}'", key));
            return String::new();
        };
        let zero_pad = !caps[2].is_empty();
        let width: usize = caps[3].parse().unwrap_or(0);
        if &caps[4] == "d" {
            match value.parse::<i64>() {
                Ok(n) if zero_pad => format!("{:0width$}", n, width = width),
                Ok(n) => format!("{:width$}", n, width = width),
                Err(_) => {
                    error.get_or_insert_with(|| format!("'{}' is not a number", key));
                    String::new()
                }
            }
        } else {
            format!("{:>width$}", value, width = width)
        }
    });
    match error {
        Some(reason) => Err(reason),
        None => Ok(expanded.into_owned()),
    }
}

struct Section<'a> {
    program: &'a str,
    options: &'a SectionOptions,
}

impl<'a> Section<'a> {
    fn get(&self, option: &str) -> Option<&'a str> {
        self.options.get(option).map(|v| v.trim())
    }

    fn required(&self, option: &'static str) -> Result<&'a str, ConfigError> {
        self.get(option)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ConfigError::MissingOption {
                program: self.program.to_string(),
                option,
            })
    }

    fn parse_or<T>(&self, option: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: Display,
    {
        match self.get(option) {
            None => Ok(default),
            Some(value) => value
                .parse()
                .map_err(|e: T::Err| self.invalid(option, value, e.to_string())),
        }
    }

    fn boolean_or(&self, option: &str, default: bool) -> Result<bool, ConfigError> {
        match self.get(option) {
            None => Ok(default),
            Some(value) => parse_boolean(value)
                .ok_or_else(|| self.invalid(option, value, "not a boolean".to_string())),
        }
    }

    fn invalid(&self, option: &str, value: &str, reason: String) -> ConfigError {
        ConfigError::InvalidValue {
            program: self.program.to_string(),
            option: option.to_string(),
            value: value.to_string(),
            reason,
        }
    }
}

fn parse_boolean(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Some(true),
        "false" | "no" | "off" | "0" => Some(false),
        _ => None,
    }
}

/// `KEY=val,KEY2="val 2"`
fn parse_environment(value: &str) -> Result<BTreeMap<String, String>, String> {
    let mut env = BTreeMap::new();
    for pair in value.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (key, val) = pair
            .split_once('=')
            .ok_or_else(|| format!("'{}' is not KEY=value", pair))?;
        let val = val.trim();
        let val = val
            .strip_prefix('"')
            .and_then(|v| v.strip_suffix('"'))
            .unwrap_or(val);
        env.insert(key.trim().to_string(), val.to_string());
    }
    Ok(env)
}

/// Build the process configs one program section declares, expanding
/// `numprocs` into one config per slot in slot order.
pub fn processes_from_section(
    program_name: &str,
    group_name: &str,
    options: &SectionOptions,
) -> Result<Vec<ProcessConfig>, ConfigError> {
    let section = Section {
        program: program_name,
        options,
    };

    let command = section.required("command")?;
    let numprocs: u32 = section.parse_or("numprocs", 1)?;
    if numprocs == 0 || numprocs > MAX_NUMPROCS {
        return Err(section.invalid(
            "numprocs",
            &numprocs.to_string(),
            format!("must be between 1 and {}", MAX_NUMPROCS),
        ));
    }
    let numprocs_start: u32 = section.parse_or("numprocs_start", 0)?;
    let numprocs_end = numprocs_start.checked_add(numprocs).ok_or_else(|| {
        section.invalid(
            "numprocs_start",
            &numprocs_start.to_string(),
            format!("numprocs_start + numprocs exceeds {}", u32::MAX),
        )
    })?;
    let priority: i64 = section.parse_or("priority", 999)?;
    let autostart = section.boolean_or("autostart", true)?;
    let startsecs: u64 = section.parse_or("startsecs", 1)?;
    let stopsignal: StopSignal = section.parse_or("stopsignal", StopSignal::Term)?;
    let stopwaitsecs: u64 = section.parse_or("stopwaitsecs", 10)?;
    let redirect_stderr = section.boolean_or("redirect_stderr", false)?;

    let process_name = section.get("process_name").unwrap_or(DEFAULT_PROCESS_NAME);
    if numprocs > 1 && !process_name.contains("%(process_num)") {
        return Err(section.invalid(
            "process_name",
            process_name,
            "%(process_num) must be present within process_name when numprocs > 1".to_string(),
        ));
    }

    let environment = match section.get("environment") {
        Some(value) => parse_environment(value).map_err(|e| section.invalid("environment", value, e))?,
        None => BTreeMap::new(),
    };

    let mut configs: Vec<ProcessConfig> = Vec::new();
    for process_num in numprocs_start..numprocs_end {
        let vars = BTreeMap::from([
            ("program_name", program_name.to_string()),
            ("group_name", group_name.to_string()),
            ("process_num", process_num.to_string()),
            ("numprocs", numprocs.to_string()),
        ]);
        let expand_option = |option: &str, value: &str| {
            expand(value, &vars).map_err(|e| section.invalid(option, value, e))
        };

        let name = expand_option("process_name", process_name)?;
        if configs.iter().any(|c| c.name == name) {
            return Err(ConfigError::DuplicateName {
                program: program_name.to_string(),
                name,
            });
        }

        let logfile = |option: &str| -> Result<LogTarget, ConfigError> {
            match section.get(option) {
                None => Ok(LogTarget::Auto),
                Some(value) => Ok(LogTarget::parse(&expand_option(option, value)?)),
            }
        };

        configs.push(ProcessConfig {
            name,
            command: expand_option("command", command)?,
            directory: section
                .get("directory")
                .map(|d| expand_option("directory", d).map(PathBuf::from))
                .transpose()?,
            environment: environment.clone(),
            priority,
            autostart,
            startsecs,
            stopsignal,
            stopwaitsecs,
            redirect_stderr,
            stdout_logfile: logfile("stdout_logfile")?,
            stderr_logfile: logfile("stderr_logfile")?,
        });
    }

    Ok(configs)
}

/// Flatten a JSON option object into section options
pub fn options_from_json(
    options: &serde_json::Map<String, serde_json::Value>,
) -> Result<SectionOptions, ConfigError> {
    options
        .iter()
        .map(|(key, value)| {
            let value = match value {
                serde_json::Value::String(s) => s.clone(),
                serde_json::Value::Number(n) => n.to_string(),
                serde_json::Value::Bool(b) => b.to_string(),
                _ => {
                    return Err(ConfigError::UnsupportedValue {
                        option: key.clone(),
                    })
                }
            };
            Ok((key.clone(), value))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(pairs: &[(&str, &str)]) -> SectionOptions {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn numprocs_expands_in_slot_order() {
        let opts = options(&[
            ("command", "worker --id %(process_num)d"),
            ("numprocs", "3"),
            ("numprocs_start", "1"),
            ("process_name", "process_%(process_num)d"),
        ]);
        let configs = processes_from_section("web", "web", &opts).unwrap();
        let names: Vec<_> = configs.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["process_1", "process_2", "process_3"]);
        assert_eq!(configs[2].command, "worker --id 3");
        assert_eq!(configs[0].priority, 999);
        assert!(configs[0].autostart);
        assert_eq!(configs[0].stdout_logfile, LogTarget::Auto);
    }

    #[test]
    fn zero_padded_process_num() {
        let opts = options(&[
            ("command", "run"),
            ("numprocs", "2"),
            ("process_name", "%(program_name)s_%(process_num)02d"),
        ]);
        let configs = processes_from_section("cat", "pool", &opts).unwrap();
        assert_eq!(configs[0].name, "cat_00");
        assert_eq!(configs[1].name, "cat_01");
    }

    #[test]
    fn default_process_name_is_program_name() {
        let opts = options(&[("command", "run")]);
        let configs = processes_from_section("cat", "cat", &opts).unwrap();
        assert_eq!(configs.len(), 1);
        assert_eq!(configs[0].name, "cat");
    }

    #[test]
    fn numprocs_requires_process_num() {
        let opts = options(&[("command", "run"), ("numprocs", "2")]);
        let err = processes_from_section("cat", "cat", &opts).unwrap_err();
        assert!(err.to_string().contains("%(process_num)"));
    }

    #[test]
    fn missing_command_is_rejected() {
        let err = processes_from_section("cat", "cat", &SectionOptions::new()).unwrap_err();
        assert!(matches!(err, ConfigError::MissingOption { option: "command", .. }));
    }

    #[test]
    fn malformed_values_are_rejected() {
        for (option, value) in [
            ("numprocs", "many"),
            ("numprocs", "0"),
            ("autostart", "perhaps"),
            ("stopsignal", "BOGUS"),
            ("environment", "NOEQUALS"),
        ] {
            let opts = options(&[("command", "run"), (option, value)]);
            let err = processes_from_section("cat", "cat", &opts).unwrap_err();
            assert!(
                matches!(err, ConfigError::InvalidValue { .. }),
                "{}={} gave {:?}",
                option,
                value,
                err
            );
        }
    }

    #[test]
    fn numprocs_range_must_fit() {
        let opts = options(&[
            ("command", "run"),
            ("process_name", "web_%(process_num)d"),
            ("numprocs_start", "4294967295"),
            ("numprocs", "2"),
        ]);
        let err = processes_from_section("web", "web", &opts).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref option, .. } if option == "numprocs_start"));

        let opts = options(&[
            ("command", "run"),
            ("process_name", "web_%(process_num)d"),
            ("numprocs_start", "4294967294"),
            ("numprocs", "1"),
        ]);
        let configs = processes_from_section("web", "web", &opts).unwrap();
        assert_eq!(configs[0].name, "web_4294967294");
    }

    #[test]
    fn numprocs_is_bounded() {
        let opts = options(&[
            ("command", "run"),
            ("process_name", "web_%(process_num)d"),
            ("numprocs", "4000000000"),
        ]);
        let err = processes_from_section("web", "web", &opts).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref option, .. } if option == "numprocs"));
    }

    #[test]
    fn unknown_expansion_key_is_rejected() {
        let opts = options(&[("command", "run %(nope)s")]);
        assert!(processes_from_section("cat", "cat", &opts).is_err());
    }

    #[test]
    fn options_are_parsed() {
        let opts = options(&[
            ("command", "run"),
            ("autostart", "no"),
            ("priority", "5"),
            ("stopsignal", "INT"),
            ("stopwaitsecs", "3"),
            ("directory", "/srv/%(program_name)s"),
            ("environment", "A=1,B=\"two words\""),
            ("stdout_logfile", "/var/log/%(program_name)s.log"),
            ("stderr_logfile", "NONE"),
        ]);
        let config = &processes_from_section("cat", "cat", &opts).unwrap()[0];
        assert!(!config.autostart);
        assert_eq!(config.priority, 5);
        assert_eq!(config.stopsignal, StopSignal::Int);
        assert_eq!(config.stopwaitsecs, 3);
        assert_eq!(config.directory, Some(PathBuf::from("/srv/cat")));
        assert_eq!(config.environment["B"], "two words");
        assert_eq!(
            config.stdout_logfile,
            LogTarget::File(PathBuf::from("/var/log/cat.log"))
        );
        assert_eq!(config.stderr_logfile, LogTarget::None);
    }

    #[test]
    fn expand_handles_literal_percent() {
        let vars = BTreeMap::from([("program_name", "cat".to_string())]);
        assert_eq!(expand("100%% %(program_name)s", &vars).unwrap(), "100% cat");
    }

    #[test]
    fn json_options_flatten_scalars() {
        let json = serde_json::json!({"command": "run", "numprocs": 2, "autostart": false});
        let opts = options_from_json(json.as_object().unwrap()).unwrap();
        assert_eq!(opts["numprocs"], "2");
        assert_eq!(opts["autostart"], "false");

        let nested = serde_json::json!({"command": ["run"]});
        assert!(options_from_json(nested.as_object().unwrap()).is_err());
    }
}
