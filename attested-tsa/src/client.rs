//! Wire protocol of the timestamp authority gateway.
//!
//! ```text
//! POST {base_url}/timestamp
//!   {"digest": "<hex sha256>", "algorithm": "sha256"}
//! 200 OK
//!   {"token": "<base64>", "issuedAt": "<RFC 3339>", "authority": "<name>"}
//! ```

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TsaError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("TSA API error: {0}")]
    Api(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimestampRequest {
    /// Hex-encoded digest of the payload
    pub digest: String,
    pub algorithm: String,
}

impl TimestampRequest {
    pub fn sha256(digest: &[u8; 32]) -> Self {
        Self {
            digest: hex::encode(digest),
            algorithm: "sha256".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimestampResponse {
    /// Base64-encoded authority token
    pub token: String,
    pub issued_at: DateTime<Utc>,
    pub authority: String,
}

/// HTTP client for the timestamp authority gateway.
#[derive(Debug, Clone)]
pub struct TsaClient {
    client: Client,
    base_url: String,
}

impl TsaClient {
    /// Create a new TSA client.
    pub fn new(base_url: String, timeout: Duration) -> Result<Self, TsaError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Request a token over `request.digest`.
    pub async fn request_timestamp(
        &self,
        request: &TimestampRequest,
    ) -> Result<TimestampResponse, TsaError> {
        let url = format!("{}/timestamp", self.base_url);

        let response = self.client.post(&url).json(request).send().await?;

        if !response.status().is_success() {
            return Err(TsaError::Api(format!("HTTP {}", response.status())));
        }

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| TsaError::InvalidResponse(e.to_string()))
    }
}
