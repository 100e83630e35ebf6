//! Writer configuration.

use crate::crypto::{KeyLoadError, Signer};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Environment variable naming the PKCS#8 PEM signing key file.
pub const ENV_SIGKEY_PATH: &str = "ATTEST_SIGKEY_PATH";
/// Environment variable bounding how long an append waits for the batch lock.
pub const ENV_LOCK_TIMEOUT_MS: &str = "ATTEST_LOCK_TIMEOUT_MS";
/// Environment variable naming the local timestamp authority.
pub const ENV_AUTHORITY_NAME: &str = "ATTEST_AUTHORITY_NAME";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),

    #[error("Invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },

    #[error(transparent)]
    Key(#[from] KeyLoadError),
}

/// Configuration for an [`Attestor`](crate::Attestor).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttestorConfig {
    /// Path to the PKCS#8 PEM Ed25519 signing key
    pub signing_key_path: Option<PathBuf>,
    /// Maximum wait for the batch lock in appends (None = wait forever)
    pub lock_timeout_ms: Option<u64>,
    /// Name recorded by the local timestamp authority
    pub authority_name: String,
}

impl Default for AttestorConfig {
    fn default() -> Self {
        Self {
            signing_key_path: None,
            lock_timeout_ms: None,
            authority_name: "local".to_string(),
        }
    }
}

impl AttestorConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        config.signing_key_path = lookup(ENV_SIGKEY_PATH).map(PathBuf::from);

        if let Some(raw) = lookup(ENV_LOCK_TIMEOUT_MS) {
            let ms = raw.parse::<u64>().map_err(|e| ConfigError::Invalid {
                name: ENV_LOCK_TIMEOUT_MS,
                reason: e.to_string(),
            })?;
            config.lock_timeout_ms = Some(ms);
        }

        if let Some(name) = lookup(ENV_AUTHORITY_NAME) {
            config.authority_name = name;
        }

        Ok(config)
    }

    pub fn lock_timeout(&self) -> Option<Duration> {
        self.lock_timeout_ms.map(Duration::from_millis)
    }

    /// Load the configured signing key.
    pub fn load_signer(&self) -> Result<Signer, ConfigError> {
        let path = self
            .signing_key_path
            .as_ref()
            .ok_or(ConfigError::Missing(ENV_SIGKEY_PATH))?;
        tracing::info!(path = %path.display(), "loading signing key");
        Ok(Signer::from_pem_file(path)?)
    }
}
