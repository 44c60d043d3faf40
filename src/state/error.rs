//! Error types for the mapping store and its companion files.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while loading or persisting local state.
#[derive(Error, Debug)]
pub enum StateError {
    /// Failed to read or write a state file.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A state file exists but does not contain valid JSON.
    #[error("Corrupt state file {path}: {source}")]
    Corrupt {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// Failed to serialize state for writing.
    #[error("Failed to serialize state: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Another process holds the store lock.
    #[error("Another codicum-sync instance is using this store (lock: {0})")]
    Locked(PathBuf),
}

impl StateError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
