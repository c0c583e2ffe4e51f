//! Configuration errors.

use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {var}")]
    #[diagnostic(code(config::invalid_value))]
    InvalidValue { var: &'static str, value: String },

    #[error("failed to read config file {}", path.display())]
    #[diagnostic(code(config::io))]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {}", path.display())]
    #[diagnostic(code(config::parse))]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("unsupported config format for {}", path.display())]
    #[diagnostic(code(config::format), help("use a .json file"))]
    UnsupportedFormat { path: PathBuf },
}
