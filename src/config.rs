use crate::constants;
use crate::error::{IngestError, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub kopis: KopisConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct KopisConfig {
    pub api_base: String,
    pub genre_code: String,
    pub rows: u32,
    pub display_poster_base: String,
    pub full_poster_base: String,
}

impl Default for KopisConfig {
    fn default() -> Self {
        Self {
            api_base: constants::KOPIS_API_BASE.to_string(),
            genre_code: constants::KOPIS_CLASSICAL_GENRE.to_string(),
            rows: constants::KOPIS_PAGE_ROWS,
            display_poster_base: constants::DISPLAY_POSTER_BASE.to_string(),
            full_poster_base: constants::FULL_POSTER_BASE.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub database_path: PathBuf,
    pub media_root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from(constants::DEFAULT_DATABASE_PATH),
            media_root: PathBuf::from(constants::DEFAULT_MEDIA_ROOT),
        }
    }
}

/// Extraction service settings. The two prompts have no defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct ExtractionConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_text_model")]
    pub text_model: String,
    #[serde(default = "default_vision_model")]
    pub vision_model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    pub program_prompt: String,
    pub poster_prompt: String,
}

fn default_endpoint() -> String {
    constants::OPENAI_CHAT_COMPLETIONS_URL.to_string()
}

fn default_text_model() -> String {
    constants::DEFAULT_TEXT_MODEL.to_string()
}

fn default_vision_model() -> String {
    constants::DEFAULT_VISION_MODEL.to_string()
}

fn default_max_tokens() -> u32 {
    constants::DEFAULT_MAX_TOKENS
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MetricsConfig {
    pub pushgateway_url: Option<String>,
}

impl Config {
    pub fn load(config_path: &Path) -> Result<Self> {
        let config_content = fs::read_to_string(config_path).map_err(|e| {
            IngestError::Config(format!(
                "Failed to read config file '{}': {}",
                config_path.display(),
                e
            ))
        })?;
        Self::from_toml(&config_content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.extraction.program_prompt.trim().is_empty() {
            return Err(IngestError::Config(
                "extraction.program_prompt is empty".into(),
            ));
        }
        if self.extraction.poster_prompt.trim().is_empty() {
            return Err(IngestError::Config("extraction.poster_prompt is empty".into()));
        }
        Ok(())
    }
}

/// API keys for KOPIS and the extraction service.
#[derive(Clone)]
pub struct Credentials {
    pub kopis_api_key: String,
    pub openai_api_key: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials").finish_non_exhaustive()
    }
}

impl Credentials {
    /// Reads both keys from the process environment (after `.env` is loaded).
    /// Only `main` calls this; components get the keys through constructors.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            kopis_api_key: required_env("KOPIS_API_KEY")?,
            openai_api_key: required_env("OPENAI_API_KEY")?,
        })
    }
}

fn required_env(name: &str) -> Result<String> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        Ok(_) => Err(IngestError::Config(format!("{name} is empty"))),
        Err(e) => Err(IngestError::Config(format!("{name}: {e}"))),
    }
}
