/*
[INPUT]:  HTTP configuration (base URL, timeouts, credentials)
[OUTPUT]: Configured reqwest client ready for API calls
[POS]:    HTTP layer - core client implementation
[UPDATE]: When adding connection options or changing client behavior
*/

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::{Client, Method, RequestBuilder, StatusCode, Url};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

use crate::http::{GatewayError, Result};
use crate::types::ApiResponse;

/// Base URL for the production venue API
const DEFAULT_BASE_URL: &str = "https://www.deribit.com";

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// Credentials for authenticated requests
#[derive(Debug, Clone)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
}

/// Main HTTP client for the venue API
#[derive(Debug)]
pub struct DeribitClient {
    http_client: Client,
    base_url: Url,
    credentials: Option<Credentials>,
    timeout: Duration,
}

impl DeribitClient {
    /// Create a new client with default configuration
    pub fn new() -> Result<Self> {
        Self::with_config(ClientConfig::default())
    }

    /// Create a new client with custom configuration
    pub fn with_config(config: ClientConfig) -> Result<Self> {
        Self::with_config_and_base_url(config, DEFAULT_BASE_URL)
    }

    /// Create a new client pointing at a custom base URL.
    ///
    /// Used by tests to aim the client at a local mock server.
    pub fn with_config_and_base_url(config: ClientConfig, base_url: &str) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .build()?;

        Ok(Self {
            http_client,
            base_url: Url::parse(base_url)?,
            credentials: None,
            timeout: config.timeout,
        })
    }

    /// Set credentials for authenticated requests
    pub fn set_credentials(&mut self, credentials: Credentials) {
        self.credentials = Some(credentials);
    }

    /// Get credentials if set
    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    /// Build request builder for public endpoints
    pub(crate) fn public_request(&self, method: Method, endpoint: &str) -> Result<RequestBuilder> {
        let url = self.base_url.join(endpoint)?;
        Ok(self.http_client.request(method, url))
    }

    /// Build request builder for private endpoints with a Basic auth header
    pub(crate) fn private_request(&self, method: Method, endpoint: &str) -> Result<RequestBuilder> {
        let credentials = self.credentials.as_ref().ok_or_else(|| {
            GatewayError::Config("credentials required for private endpoints".to_string())
        })?;

        let url = self.base_url.join(endpoint)?;
        let token = BASE64.encode(format!(
            "{}:{}",
            credentials.client_id, credentials.client_secret
        ));
        Ok(self
            .http_client
            .request(method, url)
            .header("Authorization", format!("Basic {token}")))
    }

    /// Send a request and unwrap the venue's response envelope.
    pub(crate) async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T> {
        let response = builder
            .send()
            .await
            .map_err(|err| self.map_reqwest_error(err))?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.parse::<u64>().ok())
                .unwrap_or(1);
            return Err(GatewayError::RateLimit { retry_after });
        }

        let body = response
            .text()
            .await
            .map_err(|err| self.map_reqwest_error(err))?;
        debug!(%status, body_len = body.len(), "venue response");
        let envelope: ApiResponse<T> = serde_json::from_str(&body).map_err(|err| {
            GatewayError::InvalidResponse(format!("status {status}, undecodable body: {err}"))
        })?;

        if let Some(error) = envelope.error {
            return Err(GatewayError::Api {
                code: error.code,
                message: error.message,
            });
        }

        match envelope.result {
            Some(result) => Ok(result),
            None if status.is_success() => Err(GatewayError::InvalidResponse(
                "missing result in successful response".to_string(),
            )),
            None => Err(GatewayError::api_error(status, body)),
        }
    }

    fn map_reqwest_error(&self, err: reqwest::Error) -> GatewayError {
        if err.is_timeout() {
            GatewayError::Timeout {
                duration: self.timeout.as_secs(),
            }
        } else {
            GatewayError::Http(err)
        }
    }
}
