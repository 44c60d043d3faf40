//! OAuth access for the Google APIs.
//!
//! Loads an existing authorized-user token, refreshes it when expired and
//! writes it back. There is no interactive consent flow: without a usable
//! token the run stops with guidance.

pub mod error;
pub mod token;

use std::path::Path;
use std::time::Duration;

use chrono::Utc;

pub use self::error::AuthError;
use self::token::{AuthorizedUser, ClientSecrets, TokenResponse, DEFAULT_TOKEN_URI};

/// Scopes the token must carry: full Drive (uploads, archive rewrites),
/// Sheets and Photos read access.
pub const SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/drive",
    "https://www.googleapis.com/auth/spreadsheets",
    "https://www.googleapis.com/auth/photoslibrary.readonly",
];

/// Return a usable access token, refreshing and persisting it if needed.
pub async fn access_token(
    token_path: &Path,
    credentials_path: &Path,
    timeout_secs: u64,
) -> Result<String, AuthError> {
    let mut user = AuthorizedUser::load(token_path)?;
    if user.is_valid_at(Utc::now()) {
        tracing::debug!("Using stored access token");
        if let Some(token) = user.token {
            return Ok(token);
        }
    }

    let refresh_token = user
        .refresh_token
        .clone()
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AuthError::NoRefreshToken(token_path.to_path_buf()))?;
    if user.client_id.is_none() || user.client_secret.is_none() {
        user.fill_client(&ClientSecrets::load(credentials_path)?);
    }
    let client_id = user
        .client_id
        .clone()
        .ok_or_else(|| AuthError::MissingCredentials(credentials_path.to_path_buf()))?;

    tracing::info!("Refreshing access token");
    let token_uri = user
        .token_uri
        .clone()
        .unwrap_or_else(|| DEFAULT_TOKEN_URI.to_string());
    let mut params = vec![
        ("grant_type", "refresh_token".to_string()),
        ("refresh_token", refresh_token),
        ("client_id", client_id),
    ];
    if let Some(secret) = &user.client_secret {
        params.push(("client_secret", secret.clone()));
    }

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()?;
    let response = http.post(&token_uri).form(&params).send().await?;
    let status = response.status();
    if !status.is_success() {
        let message = response.text().await.unwrap_or_default();
        return Err(AuthError::RefreshRejected {
            status: status.as_u16(),
            message,
        });
    }
    let refreshed: TokenResponse = response.json().await?;
    tracing::debug!(expires_in = refreshed.expires_in, "Token refreshed");

    user.apply(refreshed, Utc::now());
    user.save(token_path)?;
    user.token
        .ok_or_else(|| AuthError::NoRefreshToken(token_path.to_path_buf()))
}

/// Printed when an API answers 401/403.
pub fn log_reauthorization_help(token_path: &Path) {
    tracing::warn!("The token was rejected or lacks a required scope.");
    tracing::warn!(
        "  Re-authorize with these scopes and replace {}:",
        token_path.display()
    );
    for scope in SCOPES {
        tracing::warn!("    {}", scope);
    }
}
