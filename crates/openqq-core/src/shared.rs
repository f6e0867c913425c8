//! Shared configuration used across all OpenQQ crates.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Directory name of the sled store under `storage_path`.
pub const STORE_DIR_NAME: &str = "openqq_store";

/// How the generative fallback is served.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmModeSetting {
    /// Call the remote OpenAI-compatible endpoint.
    #[default]
    Live,
    /// Deterministic offline answers (local development, demos).
    Mock,
}

/// Global application configuration (gateway, storage, model endpoints). Load from TOML or env.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Application identity reported by the status endpoint.
    pub app_name: String,
    /// Bind address for the gateway.
    pub host: String,
    /// HTTP port for the gateway.
    pub port: u16,
    /// Base directory for the sled store (cache + knowledge trees live in one DB under it).
    pub storage_path: String,
    /// Generative fallback mode.
    pub llm_mode: LlmModeSetting,
    /// Base URL of the OpenAI-compatible completion service.
    pub llm_api_url: String,
    /// Chat model requested from the completion service.
    pub llm_model: String,
    /// When false, degraded `[Error calling model: ...]` answers are returned but not cached.
    #[serde(default = "default_true")]
    pub cache_degraded_responses: bool,
    /// If true, the gateway serves `frontend/index.html` at `/`. (Config alias: `ui_enabled`)
    #[serde(default, alias = "ui_enabled")]
    pub frontend_enabled: bool,
    /// Local directory holding `model.safetensors` and `tokenizer.json` for CLIP.
    /// When unset the weights are fetched from the Hugging Face hub.
    #[serde(default)]
    pub clip_model_dir: Option<String>,
    /// Load the CLIP model at startup instead of on the first autotag request.
    #[serde(default)]
    pub preload_classifier: bool,
    /// Body limit for image uploads.
    pub max_upload_bytes: usize,
}

fn default_true() -> bool {
    true
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            app_name: "OpenQQ".to_string(),
            host: "0.0.0.0".to_string(),
            port: 5000,
            storage_path: "./data".to_string(),
            llm_mode: LlmModeSetting::Live,
            llm_api_url: "https://api.openai.com".to_string(),
            llm_model: "gpt-3.5-turbo".to_string(),
            cache_degraded_responses: true,
            frontend_enabled: true,
            clip_model_dir: None,
            preload_classifier: false,
            max_upload_bytes: 10 * 1024 * 1024,
        }
    }
}

impl CoreConfig {
    /// Path of the sled store holding the cache and knowledge trees.
    pub fn store_path(&self) -> PathBuf {
        Path::new(&self.storage_path).join(STORE_DIR_NAME)
    }

    /// Load config from file and environment.
    /// Precedence: bare `PORT` > `OPENQQ__*` env > file at `OPENQQ_CONFIG` (or `config/gateway`) > defaults.
    pub fn load() -> Result<Self, config::ConfigError> {
        let config_path =
            std::env::var("OPENQQ_CONFIG").unwrap_or_else(|_| "config/gateway.toml".to_string());
        let defaults = Self::default();
        let builder = config::Config::builder()
            .set_default("app_name", defaults.app_name)?
            .set_default("host", defaults.host)?
            .set_default("port", i64::from(defaults.port))?
            .set_default("storage_path", defaults.storage_path)?
            .set_default("llm_mode", "live")?
            .set_default("llm_api_url", defaults.llm_api_url)?
            .set_default("llm_model", defaults.llm_model)?
            .set_default("cache_degraded_responses", defaults.cache_degraded_responses)?
            .set_default("frontend_enabled", defaults.frontend_enabled)?
            .set_default("preload_classifier", defaults.preload_classifier)?
            .set_default("max_upload_bytes", defaults.max_upload_bytes as i64)?;

        let path = Path::new(&config_path);
        let builder = if path.exists() {
            builder.add_source(config::File::from(path))
        } else {
            builder
        };

        let built = builder
            .add_source(config::Environment::with_prefix("OPENQQ").separator("__"))
            .set_override_option("port", std::env::var("PORT").ok())?
            .build()?;

        built.try_deserialize()
    }
}
