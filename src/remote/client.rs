use std::time::Duration;

use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;

use super::error::RemoteError;

const USER_AGENT: &str = concat!("codicum-sync/", env!("CARGO_PKG_VERSION"));

/// Longest error body kept in [`RemoteError::Api`] messages.
const MAX_ERROR_BODY: usize = 500;

/// Authorized HTTP client shared by the Google API clients.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    access_token: String,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("access_token", &"<redacted>")
            .finish()
    }
}

impl ApiClient {
    pub fn new(access_token: impl Into<String>, timeout_secs: u64) -> Result<Self, RemoteError> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            http,
            access_token: access_token.into(),
        })
    }

    pub fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.http
            .request(method, url)
            .bearer_auth(&self.access_token)
    }

    pub fn get(&self, url: &str) -> RequestBuilder {
        self.request(Method::GET, url)
    }

    /// Send and fail on any non-success status.
    pub async fn send(
        &self,
        service: &'static str,
        builder: RequestBuilder,
    ) -> Result<Response, RemoteError> {
        let response = builder.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let message: String = body.chars().take(MAX_ERROR_BODY).collect();
        tracing::debug!(service, status = status.as_u16(), "API request failed: {}", message);
        Err(RemoteError::Api {
            service,
            status: status.as_u16(),
            message,
        })
    }

    pub async fn json<T: DeserializeOwned>(
        &self,
        service: &'static str,
        builder: RequestBuilder,
    ) -> Result<T, RemoteError> {
        let bytes = self.send(service, builder).await?.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| RemoteError::Parse {
            service,
            message: e.to_string(),
        })
    }

    pub async fn bytes(
        &self,
        service: &'static str,
        builder: RequestBuilder,
    ) -> Result<Vec<u8>, RemoteError> {
        Ok(self.send(service, builder).await?.bytes().await?.to_vec())
    }
}
