//! Remote timestamp authority for attested-core.
//!
//! [`HttpTimestampAuthority`] implements
//! [`TimestampAuthority`](attested_core::TimestampAuthority) by asking an HTTP
//! gateway to timestamp the SHA-256 digest of each signed attestation.
//!
//! ## Flow
//! 1. Hash the signed payload locally (the payload never leaves the process)
//! 2. POST the digest to `{url}/timestamp`
//! 3. Decode the base64 token from the response
//! 4. Return a proof bound to the locally computed digest

pub mod client;

use async_trait::async_trait;
use attested_core::crypto::sha256;
use attested_core::{TimestampAuthority, TimestampError, TimestampProof};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use client::{TimestampRequest, TimestampResponse, TsaClient, TsaError};
use std::time::Duration;

/// Configuration for the remote timestamp authority.
#[derive(Debug, Clone)]
pub struct TsaConfig {
    /// Base URL of the timestamp gateway
    pub url: String,
    /// Per-request timeout (seconds)
    pub timeout_secs: u64,
}

impl Default for TsaConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:8318".to_string(),
            timeout_secs: 10,
        }
    }
}

/// Timestamp authority reached over HTTP.
#[derive(Debug, Clone)]
pub struct HttpTimestampAuthority {
    name: String,
    client: TsaClient,
}

impl HttpTimestampAuthority {
    pub fn new(config: TsaConfig) -> Result<Self, TsaError> {
        let client = TsaClient::new(config.url.clone(), Duration::from_secs(config.timeout_secs))?;
        Ok(Self {
            name: config.url,
            client,
        })
    }
}

/// Turn a gateway response into a proof over `digest`.
pub fn proof_from_response(
    digest: [u8; 32],
    response: TimestampResponse,
) -> Result<TimestampProof, TsaError> {
    let token = STANDARD
        .decode(response.token.as_bytes())
        .map_err(|e| TsaError::InvalidResponse(format!("token is not base64: {e}")))?;
    if token.is_empty() {
        return Err(TsaError::InvalidResponse("empty token".to_string()));
    }

    Ok(TimestampProof {
        authority: response.authority,
        digest,
        issued_at: response.issued_at,
        token,
    })
}

impl From<TsaError> for TimestampError {
    fn from(err: TsaError) -> Self {
        match err {
            TsaError::Network(e) => TimestampError::Unavailable(e.to_string()),
            TsaError::Api(msg) => TimestampError::Rejected(msg),
            TsaError::InvalidResponse(msg) => TimestampError::InvalidResponse(msg),
        }
    }
}

#[async_trait]
impl TimestampAuthority for HttpTimestampAuthority {
    fn name(&self) -> &str {
        &self.name
    }

    async fn timestamp(&self, payload: &[u8]) -> Result<TimestampProof, TimestampError> {
        let digest = sha256(payload);
        tracing::debug!(url = self.client.base_url(), digest = %hex::encode(digest), "requesting timestamp");

        let response = self
            .client
            .request_timestamp(&TimestampRequest::sha256(&digest))
            .await?;

        tracing::debug!(authority = %response.authority, issued_at = %response.issued_at, "timestamp issued");
        Ok(proof_from_response(digest, response)?)
    }
}
