//! Process-wide configuration, loaded once at startup

pub mod settings;

pub use settings::*;

use std::path::PathBuf;

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid address in {field}: {value}")]
    InvalidAddress { field: String, value: String },

    #[error("Invalid URL in {field}: {value}")]
    InvalidUrl { field: String, value: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}
