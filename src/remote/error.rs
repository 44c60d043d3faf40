use thiserror::Error;

/// Errors from the Drive, Photos and Sheets clients.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("{service} API error (HTTP {status}): {message}")]
    Api {
        service: &'static str,
        status: u16,
        message: String,
    },

    #[error("Failed to parse {service} response: {message}")]
    Parse {
        service: &'static str,
        message: String,
    },

    #[error("{0} is not supported by this source")]
    Unsupported(&'static str),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl RemoteError {
    /// HTTP 401/403: the token is missing a scope or was revoked. Retrying the
    /// same target cannot succeed.
    pub fn is_authorization(&self) -> bool {
        match self {
            RemoteError::Api { status, .. } => matches!(status, 401 | 403),
            RemoteError::Http(e) => e
                .status()
                .is_some_and(|s| s.as_u16() == 401 || s.as_u16() == 403),
            _ => false,
        }
    }
}
