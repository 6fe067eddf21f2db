pub mod file;
pub mod options;

use std::path::PathBuf;

use thiserror::Error;

pub use file::{read_process_groups, ServerOptions};
pub use options::{options_from_json, processes_from_section, SectionOptions};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("program {program}: missing required option '{option}'")]
    MissingOption {
        program: String,
        option: &'static str,
    },

    #[error("program {program}: invalid value {value:?} for '{option}': {reason}")]
    InvalidValue {
        program: String,
        option: String,
        value: String,
        reason: String,
    },

    #[error("program {program}: duplicate process name '{name}'")]
    DuplicateName { program: String, name: String },

    #[error("option '{option}' must be a string, number or boolean")]
    UnsupportedValue { option: String },
}
