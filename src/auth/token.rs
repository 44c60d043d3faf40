//! `token.json` (authorized user) and `credentials.json` (client secrets).

use std::path::Path;

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::AuthError;

pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Tokens are refreshed this long before they actually expire.
const EXPIRY_SKEW_SECS: i64 = 60;

/// An authorized-user token file. Unknown keys are kept so the file can be
/// written back without loss.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizedUser {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub token_uri: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub expiry: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// The `installed` or `web` block of a client secrets file.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientSecrets {
    pub client_id: String,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub token_uri: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ClientSecretsFile {
    #[serde(default)]
    installed: Option<ClientSecrets>,
    #[serde(default)]
    web: Option<ClientSecrets>,
}

#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default = "default_expires_in")]
    pub expires_in: i64,
}

fn default_expires_in() -> i64 {
    3600
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, AuthError> {
    let contents = std::fs::read_to_string(path).map_err(|e| AuthError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    serde_json::from_str(&contents).map_err(|e| AuthError::InvalidFile {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Parse the `expiry` field. Accepts RFC 3339 and the zone-less UTC form
/// some writers produce (`2024-05-01T10:00:00.123456`).
pub fn parse_expiry(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value.trim_end_matches('Z'), "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

impl AuthorizedUser {
    pub fn load(path: &Path) -> Result<Self, AuthError> {
        if !path.exists() {
            return Err(AuthError::MissingToken(path.to_path_buf()));
        }
        read_json(path)
    }

    pub fn save(&self, path: &Path) -> Result<(), AuthError> {
        let json = serde_json::to_string_pretty(self).map_err(|e| AuthError::InvalidFile {
            path: path.to_path_buf(),
            source: e,
        })?;
        std::fs::write(path, json).map_err(|e| AuthError::Io {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// A token is usable when present and not within the expiry skew.
    /// Tokens without an expiry are treated as valid.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        let Some(token) = &self.token else {
            return false;
        };
        if token.is_empty() {
            return false;
        }
        match self.expiry.as_deref().and_then(parse_expiry) {
            Some(expiry) => expiry - Duration::seconds(EXPIRY_SKEW_SECS) > now,
            None => true,
        }
    }

    /// Record a refresh response.
    pub fn apply(&mut self, response: TokenResponse, now: DateTime<Utc>) {
        self.token = Some(response.access_token);
        if let Some(refresh_token) = response.refresh_token {
            self.refresh_token = Some(refresh_token);
        }
        let expiry = now + Duration::seconds(response.expires_in);
        self.expiry = Some(expiry.to_rfc3339_opts(chrono::SecondsFormat::Secs, true));
    }

    /// Fill missing client id, secret and token endpoint from client secrets.
    pub fn fill_client(&mut self, secrets: &ClientSecrets) {
        if self.client_id.is_none() {
            self.client_id = Some(secrets.client_id.clone());
        }
        if self.client_secret.is_none() {
            self.client_secret = secrets.client_secret.clone();
        }
        if self.token_uri.is_none() {
            self.token_uri = secrets.token_uri.clone();
        }
    }
}

impl ClientSecrets {
    pub fn load(path: &Path) -> Result<Self, AuthError> {
        if !path.exists() {
            return Err(AuthError::MissingCredentials(path.to_path_buf()));
        }
        let file: ClientSecretsFile = read_json(path)?;
        file.installed
            .or(file.web)
            .ok_or_else(|| AuthError::MissingCredentials(path.to_path_buf()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn user(expiry: Option<&str>) -> AuthorizedUser {
        serde_json::from_value(serde_json::json!({
            "token": "ya29.x",
            "refresh_token": "1//r",
            "expiry": expiry,
            "scopes": ["https://www.googleapis.com/auth/drive"]
        }))
        .unwrap()
    }

    #[test]
    fn test_parse_expiry_formats() {
        let expected = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        assert_eq!(parse_expiry("2024-05-01T10:00:00Z"), Some(expected));
        assert_eq!(parse_expiry("2024-05-01T10:00:00"), Some(expected));
        assert!(parse_expiry("2024-05-01T10:00:00.123456Z").is_some());
        assert_eq!(parse_expiry("soon"), None);
    }

    #[test]
    fn test_validity() {
        assert!(user(Some("2024-05-01T13:00:00Z")).is_valid_at(now()));
        assert!(!user(Some("2024-05-01T11:00:00Z")).is_valid_at(now()));
        // Inside the skew window.
        assert!(!user(Some("2024-05-01T12:00:30Z")).is_valid_at(now()));
        assert!(user(None).is_valid_at(now()));
    }

    #[test]
    fn test_apply_refresh_keeps_old_refresh_token() {
        let mut u = user(Some("2024-05-01T11:00:00Z"));
        u.apply(
            TokenResponse {
                access_token: "new".into(),
                refresh_token: None,
                expires_in: 3600,
            },
            now(),
        );
        assert_eq!(u.token.as_deref(), Some("new"));
        assert_eq!(u.refresh_token.as_deref(), Some("1//r"));
        assert_eq!(u.expiry.as_deref(), Some("2024-05-01T13:00:00Z"));
        assert!(u.is_valid_at(now()));
    }

    #[test]
    fn test_unknown_keys_survive_save() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        user(None).save(&path).unwrap();
        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["scopes"][0], "https://www.googleapis.com/auth/drive");
    }

    #[test]
    fn test_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            AuthorizedUser::load(&dir.path().join("token.json")),
            Err(AuthError::MissingToken(_))
        ));
        assert!(matches!(
            ClientSecrets::load(&dir.path().join("credentials.json")),
            Err(AuthError::MissingCredentials(_))
        ));
    }

    #[test]
    fn test_client_secrets_installed_block() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        std::fs::write(
            &path,
            r#"{"installed": {"client_id": "cid", "client_secret": "sec", "token_uri": "https://t"}}"#,
        )
        .unwrap();
        let secrets = ClientSecrets::load(&path).unwrap();
        let mut u = user(None);
        u.fill_client(&secrets);
        assert_eq!(u.client_id.as_deref(), Some("cid"));
        assert_eq!(u.token_uri.as_deref(), Some("https://t"));
    }
}
