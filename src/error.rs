//! Error types for settings access.
//!
//! Only [`SettingsError::SchemaNotFound`] (and the load-time failures around
//! it) is meant to reach callers of the store; everything raised while reading,
//! writing or saving a single setting is reported and swallowed by
//! [`crate::store::ConfigStore`].

use std::path::PathBuf;

use thiserror::Error;

use crate::backend::KeyKind;

/// Errors raised by a [`crate::backend::SettingsBackend`].
#[derive(Debug, Error)]
pub enum BackendError {
    /// The key is not declared by the schema.
    #[error("key '{key}' is not defined in schema '{schema}'")]
    UnknownKey { schema: String, key: String },

    /// The key exists but holds a different type.
    #[error("key '{key}' has type '{expected}'")]
    TypeMismatch { key: String, expected: KeyKind },

    /// An integer does not fit the backend's 32-bit integer type.
    #[error("value {value} for key '{key}' does not fit a 32-bit integer")]
    OutOfRange { key: String, value: f64 },

    /// Reading or writing the value file failed.
    #[error("I/O error accessing settings at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The value file could not be encoded or decoded.
    #[error("invalid settings data: {0}")]
    Format(#[from] serde_json::Error),
}

/// Errors raised while walking a dotted path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("empty path")]
    Empty,

    #[error("unknown settings field '{0}'")]
    UnknownRoot(String),

    #[error("no entry named '{0}'")]
    MissingKey(String),

    #[error("index {index} out of range (length {len})")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("cannot index into a scalar with '{0}'")]
    NotAContainer(String),

    #[error("'{0}' does not address an array")]
    NotAnArray(String),

    #[error("'{0}' does not address an object")]
    NotAnObject(String),

    #[error("top-level field '{0}' cannot be removed")]
    RootNotRemovable(String),

    #[error("field '{0}' only holds integers")]
    NotAnInteger(String),
}

/// Errors surfaced by the settings store.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The schema id is missing from both the bundled and the system source.
    #[error("Schema {schema_id} could not be found for extension {uuid}. Please check your installation.")]
    SchemaNotFound { schema_id: String, uuid: String },

    /// A schema or metadata file could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A schema or metadata file is not valid JSON of the expected shape.
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The stored `locations` text is not valid JSON.
    #[error("failed to decode stored locations: {0}")]
    LocationsDecode(#[source] serde_json::Error),

    /// A value cannot be written to the backend with any typed setter.
    #[error("value {0} cannot be stored as a string or integer")]
    UnsupportedValue(String),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Path(#[from] PathError),
}

pub type Result<T, E = SettingsError> = std::result::Result<T, E>;
