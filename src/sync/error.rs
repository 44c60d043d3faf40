use thiserror::Error;

use crate::remote::RemoteError;
use crate::state::StateError;

/// Errors that end a target or the whole run. Per-asset problems are logged
/// and skipped instead of surfacing here.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The mapping store or a companion file could not be written.
    #[error(transparent)]
    State(#[from] StateError),

    /// A remote call that the current target cannot continue without.
    #[error(transparent)]
    Remote(#[from] RemoteError),
}

impl SyncError {
    /// Local state failures abort the run; remote failures abort a target.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SyncError::State(_))
    }

    pub fn is_authorization(&self) -> bool {
        matches!(self, SyncError::Remote(e) if e.is_authorization())
    }
}
