//! Storage configuration, loaded from environment variables.

use serde::{Deserialize, Serialize};

use crate::types::BlobBackend;

/// How much an object's stored size may differ from the declared size before
/// a size check fails. Covers encryption framing overhead; a fixed byte
/// tolerance, not a percentage.
pub const DEFAULT_SIZE_LEEWAY_BYTES: i64 = 1024 * 1024;

/// Validity window for upload and download grants.
pub const DEFAULT_URL_TTL_SECS: u64 = 60;

/// Storage subsystem configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageSettings {
    /// Which backend newly created blobs go to.
    pub backend: BlobBackend,

    /// Local filesystem backend configuration.
    pub local: LocalStoreConfig,

    /// S3-compatible backend configuration.
    pub s3: Option<S3Config>,

    /// Signed-URL lifetime in seconds, upload and download grants alike.
    pub url_ttl_secs: u64,

    /// Byte tolerance when comparing declared vs. actual object size.
    pub size_leeway_bytes: i64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LocalStoreConfig {
    /// Root directory for stored blobs.
    pub root: String,
    /// Server-relative base for download paths, e.g. `/attachments`.
    pub base_url: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct S3Config {
    pub bucket: String,
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub endpoint: Option<String>,
    pub path_style: bool,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            backend: BlobBackend::Local,
            local: LocalStoreConfig {
                root: "/var/vaultstore/attachments".to_string(),
                base_url: "/attachments".to_string(),
            },
            s3: None,
            url_ttl_secs: DEFAULT_URL_TTL_SECS,
            size_leeway_bytes: DEFAULT_SIZE_LEEWAY_BYTES,
        }
    }
}

/// Configuration error
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

impl StorageSettings {
    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut settings = Self::default();

        if let Ok(backend) = std::env::var("VAULTSTORE_BACKEND") {
            settings.backend =
                BlobBackend::from_str(&backend).ok_or_else(|| ConfigError::InvalidValue {
                    key: "VAULTSTORE_BACKEND".to_string(),
                    message: format!("unknown backend '{}'", backend),
                })?;
        }

        if let Ok(root) = std::env::var("VAULTSTORE_LOCAL_ROOT") {
            settings.local.root = root;
        }
        if let Ok(base) = std::env::var("VAULTSTORE_LOCAL_BASE_URL") {
            settings.local.base_url = base;
        }

        if let Ok(bucket) = std::env::var("S3_BUCKET") {
            settings.s3 = Some(S3Config {
                bucket,
                region: std::env::var("S3_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
                access_key_id: std::env::var("S3_ACCESS_KEY_ID").unwrap_or_default(),
                secret_access_key: std::env::var("S3_SECRET_ACCESS_KEY").unwrap_or_default(),
                endpoint: std::env::var("S3_ENDPOINT").ok(),
                path_style: std::env::var("S3_PATH_STYLE")
                    .map(|v| v == "true" || v == "1")
                    .unwrap_or(false),
            });
        }

        if let Ok(ttl) = std::env::var("VAULTSTORE_URL_TTL_SECS") {
            settings.url_ttl_secs =
                ttl.parse().map_err(|_| ConfigError::InvalidValue {
                    key: "VAULTSTORE_URL_TTL_SECS".to_string(),
                    message: format!("'{}' is not a number of seconds", ttl),
                })?;
        }
        if let Ok(leeway) = std::env::var("VAULTSTORE_SIZE_LEEWAY_BYTES") {
            settings.size_leeway_bytes =
                leeway.parse().map_err(|_| ConfigError::InvalidValue {
                    key: "VAULTSTORE_SIZE_LEEWAY_BYTES".to_string(),
                    message: format!("'{}' is not a byte count", leeway),
                })?;
        }

        Ok(settings)
    }

    /// Signed-URL lifetime as a `Duration`.
    pub fn url_ttl(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.url_ttl_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = StorageSettings::default();
        assert_eq!(settings.backend, BlobBackend::Local);
        assert_eq!(settings.url_ttl_secs, 60);
        assert_eq!(settings.size_leeway_bytes, 1024 * 1024);
        assert!(settings.s3.is_none());
    }

    #[test]
    fn test_url_ttl() {
        let settings = StorageSettings::default();
        assert_eq!(settings.url_ttl(), std::time::Duration::from_secs(60));
    }
}
