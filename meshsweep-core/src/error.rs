//! Error types.

use std::io;
use std::path::PathBuf;

pub type Result<T> = core::result::Result<T, Error>;

/// Crate-wide error type.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("io error: {0}")]
    IoError(#[from] io::Error),

    #[error("failed launching {}: {}", .program.display(), .source)]
    LaunchError {
        program: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("strategy `{strategy}` can't start from this state: {reason}")]
    PreconditionFailed {
        strategy: &'static str,
        reason: String,
    },

    #[error("failed reading config at {}: {}", .path.display(), .source)]
    ConfigReadError {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("toml deserialization error: {0}")]
    TomlDeserError(#[from] toml::de::Error),

    #[error("parsing error: {0}")]
    ParsingError(String),

    #[error("sweep halted after failed trial: {0}")]
    Halted(String),
    #[error("sweep interrupted")]
    Interrupted,
}
