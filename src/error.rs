//! Error type for configuration loading, selector compilation and service
//! construction.
//!
//! Failures inside a single unit of work (one process, one archive, one
//! upload) are not errors: they are recorded on the corresponding status
//! record. This type only covers conditions that prevent a command from being
//! built in the first place.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::sysexits;

/// Errors produced while preparing a command.
#[derive(Debug, Error)]
pub enum Error {
    /// The configuration file could not be read.
    #[error("configuration file '{}' could not be read", path.display())]
    ConfigRead {
        /// Configuration file path.
        path: PathBuf,
        /// Underlying IO error.
        source: io::Error,
    },
    /// The configuration file is not valid TOML or does not match the schema.
    #[error("configuration file '{}' is invalid", path.display())]
    ConfigParse {
        /// Configuration file path.
        path: PathBuf,
        /// Underlying TOML error.
        source: toml::de::Error,
    },
    /// A section refers to a profile that is not defined.
    #[error("{section} refers to undefined {kind} profile '{name}'")]
    UnknownProfile {
        /// Section holding the reference.
        section: &'static str,
        /// Profile family (`archiver` or `uploader`).
        kind: &'static str,
        /// Referenced name.
        name: String,
    },
    /// A required configuration section is absent.
    #[error("the [{0}] section is not configured")]
    MissingSection(&'static str),
    /// A configuration value is out of range.
    #[error("invalid value for {field}: {reason}")]
    InvalidValue {
        /// Offending field.
        field: &'static str,
        /// Static reason.
        reason: &'static str,
    },
    /// A selector pattern could not be compiled.
    #[error("invalid selector '{pattern}'")]
    InvalidSelector {
        /// Pattern as given.
        pattern: String,
        /// Underlying globset error.
        source: globset::Error,
    },
    /// A selector pattern inside the configuration file could not be compiled.
    #[error("{section} holds invalid selector '{pattern}'")]
    InvalidConfigSelector {
        /// Section holding the pattern.
        section: &'static str,
        /// Pattern as written.
        pattern: String,
        /// Underlying globset error.
        source: globset::Error,
    },
    /// A resource carries a service kind no factory knows about.
    #[error("unknown service kind '{0}'")]
    UnknownServiceKind(String),
}

impl Error {
    /// Maps the error onto a sysexits status code.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::ConfigRead { .. } => sysexits::EX_NOINPUT,
            Error::ConfigParse { .. }
            | Error::UnknownProfile { .. }
            | Error::MissingSection(_)
            | Error::InvalidValue { .. }
            | Error::InvalidConfigSelector { .. } => sysexits::EX_CONFIG,
            Error::InvalidSelector { .. } => sysexits::EX_USAGE,
            Error::UnknownServiceKind(_) => sysexits::EX_SOFTWARE,
        }
    }
}
