use chrono_tz::Tz;
use lillearner_shared::catalog::{Catalog, CatalogError};
use serde::Deserialize;
use std::{fs, io, path::Path};

pub const DEFAULT_PORT: u16 = 5152;
pub const DEFAULT_CONFIG_PATH: &str = "config.yaml";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub listen_port: Option<u16>,
    /// IANA zone name used to map timestamps onto calendar days.
    pub timezone: String,
    /// Grant XP and evaluate achievements on writes.
    pub gamification: bool,
    /// Extra XP per newly unlocked achievement.
    pub achievement_bonus_xp: u32,
    pub dev_cors_origin: Option<String>,
    /// Replaces the bundled catalog when present.
    pub catalog: Option<Catalog>,
    /// Voice-note parsing is disabled without it.
    pub llm: Option<LlmConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            listen_port: None,
            timezone: "UTC".to_string(),
            gamification: true,
            achievement_bonus_xp: 0,
            dev_cors_origin: None,
            catalog: None,
            llm: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    /// Base URL of an OpenAI-compatible API, without `/chat/completions`.
    pub base_url: String,
    pub model: String,
    /// Environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_api_key_env() -> String {
    "LLM_API_KEY".to_string()
}

fn default_temperature() -> f32 {
    0.1
}

fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("catalog: {0}")]
    Catalog(#[from] CatalogError),
    #[error("unknown timezone: {0}")]
    Timezone(String),
}

impl AppConfig {
    /// Loads YAML from `path`. A missing file yields the defaults.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let text = match fs::read_to_string(&path) {
            Ok(t) => t,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::info!(path = %path.as_ref().display(), "config file not found; using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };
        Self::from_yaml_str(&text)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        // An empty document deserializes to unit, not to a map.
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        let cfg: AppConfig = serde_yaml::from_str(text)?;
        cfg.tz()?;
        if let Some(catalog) = &cfg.catalog {
            catalog.validate()?;
        }
        Ok(cfg)
    }

    pub fn tz(&self) -> Result<Tz, ConfigError> {
        self.timezone
            .parse::<Tz>()
            .map_err(|_| ConfigError::Timezone(self.timezone.clone()))
    }

    /// The inline catalog, or the bundled one.
    pub fn resolve_catalog(&self) -> Result<Catalog, ConfigError> {
        match &self.catalog {
            Some(c) => Ok(c.clone()),
            None => Ok(Catalog::builtin()?),
        }
    }

    pub fn port(&self) -> u16 {
        self.listen_port.unwrap_or(DEFAULT_PORT)
    }
}
