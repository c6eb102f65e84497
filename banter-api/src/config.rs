//! API Configuration Module
//!
//! Per-component configuration loaded from environment variables with
//! sensible defaults for development. Identity configuration lives in
//! [`crate::auth::AuthConfig`].

use secrecy::SecretString;
use std::path::PathBuf;

// ============================================================================
// API CONFIGURATION
// ============================================================================

/// Server-level configuration: bind address and CORS.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Bind address, `host:port`.
    pub bind: String,

    /// Port override; takes precedence over the port in `bind`.
    pub port: Option<u16>,

    /// Allowed CORS origins (comma-separated in env var).
    /// Empty means allow all origins (dev mode).
    pub cors_origins: Vec<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8089".to_string(),
            port: None,
            cors_origins: Vec::new(),
        }
    }
}

impl ApiConfig {
    /// Create ApiConfig from environment variables.
    ///
    /// Environment variables:
    /// - `BANTER_API_BIND`: bind address (default: "0.0.0.0:8089")
    /// - `BANTER_API_PORT` / `PORT`: port override (default: unset)
    /// - `BANTER_CORS_ORIGINS`: comma-separated allowed origins (empty = allow all)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let bind = std::env::var("BANTER_API_BIND").unwrap_or(defaults.bind);

        let port = std::env::var("PORT")
            .ok()
            .or_else(|| std::env::var("BANTER_API_PORT").ok())
            .and_then(|s| s.parse().ok());

        let cors_origins = std::env::var("BANTER_CORS_ORIGINS")
            .ok()
            .map(|s| {
                s.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Self {
            bind,
            port,
            cors_origins,
        }
    }

    /// Check if running in production mode (strict CORS).
    pub fn is_production(&self) -> bool {
        !self.cors_origins.is_empty()
    }
}

// ============================================================================
// STORAGE CONFIGURATION
// ============================================================================

/// Durable-store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// SQLite database path.
    pub db_path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("data/banter.db"),
        }
    }
}

impl StoreConfig {
    /// `BANTER_DB_PATH` (default: "data/banter.db")
    pub fn from_env() -> Self {
        let db_path = std::env::var("BANTER_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| Self::default().db_path);
        Self { db_path }
    }
}

/// Blob-store configuration.
#[derive(Debug, Clone)]
pub struct FilesConfig {
    /// Root directory for uploaded blobs.
    pub uploads_dir: PathBuf,

    /// Upload size cap in megabytes; larger uploads get a 413.
    pub max_upload_mb: u64,
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            uploads_dir: PathBuf::from("data/uploads"),
            max_upload_mb: 25,
        }
    }
}

impl FilesConfig {
    /// `BANTER_UPLOADS_DIR` (default: "data/uploads"),
    /// `BANTER_MAX_UPLOAD_MB` (default: 25)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let uploads_dir = std::env::var("BANTER_UPLOADS_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.uploads_dir);
        let max_upload_mb = std::env::var("BANTER_MAX_UPLOAD_MB")
            .ok()
            .and_then(|s| s.parse().ok())
            .filter(|&mb| mb > 0)
            .unwrap_or(defaults.max_upload_mb);
        Self {
            uploads_dir,
            max_upload_mb,
        }
    }

    /// The cap in bytes.
    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_mb as usize * 1024 * 1024
    }
}

// ============================================================================
// COLLABORATOR CONFIGURATION
// ============================================================================

/// Generation/vision/retrieval collaborator endpoints.
#[derive(Clone)]
pub struct LlmConfig {
    /// OpenAI-compatible base URL.
    pub base_url: String,

    /// Bearer key for the LLM endpoint; empty means no Authorization header.
    pub api_key: SecretString,

    /// Chat model id.
    pub model: String,

    /// Vision model id; falls back to the chat model when unset.
    pub vision_model: Option<String>,

    /// Retrieval service endpoint; unset means retrieval is a no-op.
    pub retrieval_url: Option<String>,

    /// Ingestion service endpoint; unset means ingestion is a no-op.
    pub ingest_url: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/v1".to_string(),
            api_key: SecretString::from(String::new()),
            model: "default".to_string(),
            vision_model: None,
            retrieval_url: None,
            ingest_url: None,
        }
    }
}

impl LlmConfig {
    /// Environment variables:
    /// - `BANTER_LLM_BASE_URL` (default: "http://localhost:8000/v1")
    /// - `BANTER_LLM_API_KEY` (default: empty)
    /// - `BANTER_LLM_MODEL` (default: "default")
    /// - `BANTER_VISION_MODEL` (default: unset, falls back to the chat model)
    /// - `BANTER_RETRIEVAL_URL` (default: unset)
    /// - `BANTER_INGEST_URL` (default: unset)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: std::env::var("BANTER_LLM_BASE_URL").unwrap_or(defaults.base_url),
            api_key: SecretString::from(
                std::env::var("BANTER_LLM_API_KEY").unwrap_or_default(),
            ),
            model: std::env::var("BANTER_LLM_MODEL").unwrap_or(defaults.model),
            vision_model: std::env::var("BANTER_VISION_MODEL")
                .ok()
                .filter(|s| !s.is_empty()),
            retrieval_url: std::env::var("BANTER_RETRIEVAL_URL")
                .ok()
                .filter(|s| !s.is_empty()),
            ingest_url: std::env::var("BANTER_INGEST_URL")
                .ok()
                .filter(|s| !s.is_empty()),
        }
    }

    /// Model id for vision captioning.
    pub fn vision_model(&self) -> &str {
        self.vision_model.as_deref().unwrap_or(&self.model)
    }
}

impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .field("model", &self.model)
            .field("vision_model", &self.vision_model)
            .field("retrieval_url", &self.retrieval_url)
            .field("ingest_url", &self.ingest_url)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_config_defaults() {
        let config = ApiConfig::default();
        assert_eq!(config.bind, "0.0.0.0:8089");
        assert_eq!(config.port, None);
        assert!(config.cors_origins.is_empty());
        assert!(!config.is_production());
    }

    #[test]
    fn test_is_production_with_origins() {
        let config = ApiConfig {
            cors_origins: vec!["https://assistant.example.com".to_string()],
            ..ApiConfig::default()
        };
        assert!(config.is_production());
    }

    #[test]
    fn test_files_config_cap_in_bytes() {
        let config = FilesConfig::default();
        assert_eq!(config.max_upload_mb, 25);
        assert_eq!(config.max_upload_bytes(), 25 * 1024 * 1024);
    }

    #[test]
    fn test_llm_config_vision_fallback() {
        let config = LlmConfig::default();
        assert_eq!(config.vision_model(), "default");

        let config = LlmConfig {
            vision_model: Some("pixtral".to_string()),
            ..LlmConfig::default()
        };
        assert_eq!(config.vision_model(), "pixtral");
    }

    #[test]
    fn test_llm_config_debug_redacts_key() {
        let config = LlmConfig {
            api_key: SecretString::from("sk-secret".to_string()),
            ..LlmConfig::default()
        };
        let rendered = format!("{:?}", config);
        assert!(rendered.contains("[REDACTED]"));
        assert!(!rendered.contains("sk-secret"));
    }
}
