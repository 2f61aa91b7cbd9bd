//! Configuration and client factory.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use examgrade_core::model::ModelSpec;

use crate::client::ModelClient;
use crate::ollama;

/// An external model reachable through an OpenAI-compatible API.
///
/// Note: Custom Debug impl masks the API key to prevent accidental exposure in logs.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalModelConfig {
    /// Model identifier sent to the API (e.g. "gpt-4.1-mini").
    pub description: String,
    pub api_url: String,
    pub api_key: String,
    /// User the model belongs to.
    pub owner: String,
}

impl std::fmt::Debug for ExternalModelConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExternalModelConfig")
            .field("description", &self.description)
            .field("api_url", &self.api_url)
            .field("api_key", &"***")
            .field("owner", &self.owner)
            .finish()
    }
}

impl ExternalModelConfig {
    pub fn to_spec(&self) -> ModelSpec {
        ModelSpec::external(
            &self.description,
            &self.api_url,
            &self.api_key,
            &self.owner,
        )
    }
}

/// Top-level examgrade configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraderConfig {
    /// Base URL of the local Ollama instance.
    #[serde(default = "default_ollama_url")]
    pub ollama_url: String,
    /// SQLite database file.
    #[serde(default = "default_database")]
    pub database: PathBuf,
    /// Local model used when none is named.
    #[serde(default = "default_model")]
    pub default_model: String,
    /// Per-request HTTP timeout.
    #[serde(default = "default_timeout")]
    pub request_timeout_secs: u64,
    /// External models, looked up by description.
    #[serde(default)]
    pub models: Vec<ExternalModelConfig>,
}

fn default_ollama_url() -> String {
    ollama::DEFAULT_BASE_URL.to_string()
}
fn default_database() -> PathBuf {
    PathBuf::from("./examgrade.db")
}
fn default_model() -> String {
    "llama3.2:1b".to_string()
}
fn default_timeout() -> u64 {
    ollama::DEFAULT_TIMEOUT_SECS
}

impl Default for GraderConfig {
    fn default() -> Self {
        Self {
            ollama_url: default_ollama_url(),
            database: default_database(),
            default_model: default_model(),
            request_timeout_secs: default_timeout(),
            models: Vec::new(),
        }
    }
}

impl GraderConfig {
    /// The spec for `description`: a configured external model if one
    /// matches, otherwise a local one.
    pub fn model_spec(&self, description: &str) -> ModelSpec {
        self.models
            .iter()
            .find(|m| m.description == description)
            .map(ExternalModelConfig::to_spec)
            .unwrap_or_else(|| ModelSpec::local(description))
    }

    /// Build the client for an already-resolved spec.
    pub fn client(&self, spec: ModelSpec) -> ModelClient {
        ModelClient::from_spec(spec, self)
    }

    /// Shorthand for [`model_spec`](Self::model_spec) then [`client`](Self::client).
    pub fn client_for(&self, description: &str) -> ModelClient {
        self.client(self.model_spec(description))
    }
}

/// Resolve environment variable references like `${VAR_NAME}` in a string.
fn resolve_env_vars(s: &str) -> String {
    let mut result = s.to_string();
    while let Some(start) = result.find("${") {
        if let Some(end) = result[start..].find('}') {
            let var_name = &result[start + 2..start + end];
            let value = std::env::var(var_name).unwrap_or_default();
            result = format!(
                "{}{}{}",
                &result[..start],
                value,
                &result[start + end + 1..]
            );
        } else {
            break;
        }
    }
    result
}

fn resolve_model_config(config: &ExternalModelConfig) -> ExternalModelConfig {
    ExternalModelConfig {
        description: config.description.clone(),
        api_url: resolve_env_vars(&config.api_url),
        api_key: resolve_env_vars(&config.api_key),
        owner: config.owner.clone(),
    }
}

/// Load configuration from well-known paths.
///
/// Search order:
/// 1. `examgrade.toml` in the current directory
/// 2. `~/.config/examgrade/config.toml`
///
/// Environment variable overrides: `EXAMGRADE_OLLAMA_URL`, `EXAMGRADE_DATABASE`.
pub fn load_config() -> Result<GraderConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations.
pub fn load_config_from(path: Option<&Path>) -> Result<GraderConfig> {
    let config_path = if let Some(p) = path {
        if p.exists() {
            Some(p.to_path_buf())
        } else {
            anyhow::bail!("config file not found: {}", p.display());
        }
    } else {
        let local = PathBuf::from("examgrade.toml");
        if local.exists() {
            Some(local)
        } else {
            dirs_path()
                .map(|home| home.join("config.toml"))
                .filter(|global| global.exists())
        }
    };

    let mut config = match config_path {
        Some(path) => {
            tracing::debug!("loading config from {}", path.display());
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            toml::from_str::<GraderConfig>(&content)
                .with_context(|| format!("failed to parse config: {}", path.display()))?
        }
        None => GraderConfig::default(),
    };

    // Apply env var overrides
    if let Ok(url) = std::env::var("EXAMGRADE_OLLAMA_URL") {
        config.ollama_url = url;
    }
    if let Ok(db) = std::env::var("EXAMGRADE_DATABASE") {
        config.database = PathBuf::from(db);
    }

    config.ollama_url = resolve_env_vars(&config.ollama_url);
    config.models = config.models.iter().map(resolve_model_config).collect();

    Ok(config)
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("examgrade"))
}
