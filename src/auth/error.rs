use std::path::PathBuf;

use thiserror::Error;

/// Errors loading or refreshing OAuth credentials. All of them stop the run.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("No token file at {0}. Authorize this tool once and save the authorized-user token there")]
    MissingToken(PathBuf),

    #[error("Token expired and no client secrets found at {0} to refresh it")]
    MissingCredentials(PathBuf),

    #[error("Token in {0} has expired and carries no refresh token")]
    NoRefreshToken(PathBuf),

    #[error("Token refresh rejected (HTTP {status}): {message}")]
    RefreshRejected { status: u16, message: String },

    #[error("Invalid credential file {path}: {source}")]
    InvalidFile {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

impl AuthError {
    /// Whether the fix is a fresh authorization rather than a local repair.
    pub fn needs_reauthorization(&self) -> bool {
        matches!(
            self,
            AuthError::MissingToken(_)
                | AuthError::NoRefreshToken(_)
                | AuthError::RefreshRejected { .. }
        )
    }
}
