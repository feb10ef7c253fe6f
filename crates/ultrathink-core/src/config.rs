//! Configuration
//!
//! TOML configuration with per-table defaults. A missing file or missing
//! table falls back to defaults, so a bare `ultrathink-mcp` invocation works
//! with no configuration at all. A handful of environment variables override
//! the file (`OLLAMA_BASE_URL`, `ULTRATHINK_API_KEY`).

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Path of the SQLite file. Defaults to the platform data directory.
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RestApiConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    /// Probe upward from `port` when it is taken
    pub auto_port: bool,
    pub cors: bool,
    /// Bearer / X-API-Key credential; `None` disables authentication
    pub api_key: Option<String>,
    pub allow_origins: Vec<String>,
}

impl Default for RestApiConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: "127.0.0.1".to_string(),
            port: 8900,
            auto_port: true,
            cors: false,
            api_key: None,
            allow_origins: vec![],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// `git-directory` derives the id from the workspace root; `manual`
    /// requires a caller-supplied id.
    pub strategy: String,
    pub auto_generate: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            strategy: "git-directory".to_string(),
            auto_generate: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OllamaConfig {
    pub enabled: bool,
    /// Base URL for the Ollama API. Overridden at runtime by the
    /// `OLLAMA_BASE_URL` environment variable when set.
    pub base_url: String,
    pub embedding_model: String,
    pub chat_model: String,
    /// Dimension of vectors the embedding model produces
    pub embedding_dimensions: usize,
    pub timeout_secs: u64,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "http://localhost:11434".to_string(),
            embedding_model: "nomic-embed-text".to_string(),
            chat_model: "llama3.1:8b".to_string(),
            embedding_dimensions: 768,
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QdrantConfig {
    pub enabled: bool,
    pub url: String,
    pub collection: String,
}

impl Default for QdrantConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: "http://localhost:6333".to_string(),
            collection: "ultrathink_memories".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct BucketConfig {
    /// Sustained requests per second
    pub rps: f64,
    /// Burst capacity
    pub burst: f64,
}

impl Default for BucketConfig {
    fn default() -> Self {
        Self {
            rps: 50.0,
            burst: 100.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolBucketConfig {
    pub name: String,
    pub rps: f64,
    pub burst: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub global: BucketConfig,
    pub tools: Vec<ToolBucketConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct UltrathinkConfig {
    pub database: DatabaseConfig,
    pub rest_api: RestApiConfig,
    pub session: SessionConfig,
    pub ollama: OllamaConfig,
    pub qdrant: QdrantConfig,
    pub rate_limit: RateLimitConfig,
    pub logging: LoggingConfig,
}

impl UltrathinkConfig {
    /// Load from a TOML file, applying environment overrides.
    /// A missing file yields the defaults.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let mut config = Self::default();
        if let Ok(raw) = fs::read_to_string(path) {
            config = toml::from_str(&raw)
                .map_err(|e| CoreError::Validation(format!("invalid config file: {e}")))?;
        }
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from the default location (`<config dir>/ultrathink/config.toml`).
    pub fn load_default() -> Result<Self> {
        match ProjectDirs::from("io", "ultrathink", "ultrathink") {
            Some(dirs) => Self::load_from(dirs.config_dir().join("config.toml")),
            None => {
                let mut config = Self::default();
                config.apply_env_overrides();
                Ok(config)
            }
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(url) = env::var("OLLAMA_BASE_URL") {
            if !url.is_empty() {
                self.ollama.base_url = url;
            }
        }
        if let Ok(key) = env::var("ULTRATHINK_API_KEY") {
            if !key.is_empty() {
                self.rest_api.api_key = Some(key);
            }
        }
    }

    /// Resolve the database path, creating the data directory when it falls
    /// back to the platform default.
    pub fn resolve_db_path(&self) -> Result<PathBuf> {
        match &self.database.path {
            Some(p) => Ok(p.clone()),
            None => {
                let dirs = ProjectDirs::from("io", "ultrathink", "ultrathink").ok_or_else(
                    || CoreError::Internal("could not determine project directories".to_string()),
                )?;
                let data_dir = dirs.data_dir();
                fs::create_dir_all(data_dir)?;
                Ok(data_dir.join("ultrathink.db"))
            }
        }
    }
}
