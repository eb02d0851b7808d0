//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::Level;

/// Gemini's OpenAI-compatible endpoint, used when only a Gemini key is configured.
pub const GEMINI_OPENAI_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/openai";

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Which Record Store backend this deployment runs on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreBackend {
    /// A single JSON slot on this machine. No identity required.
    Local,
    /// PostgreSQL, one owner per record. Requires an identity on every call.
    Remote,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(StoreBackend::Local),
            "remote" | "postgres" => Ok(StoreBackend::Remote),
            other => Err(format!("'{}' is not one of: local, remote", other)),
        }
    }
}

/// Credentials and endpoint for the text-generation provider.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GenerationProvider {
    pub api_key: String,
    pub api_base: Option<String>,
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub log_level: Level,
    pub store_backend: StoreBackend,
    pub local_store_dir: PathBuf,
    pub local_store_key: String,
    pub database_url: Option<String>,
    pub openai_api_key: Option<String>,
    pub gemini_api_key: Option<String>,
    pub generation_api_base: Option<String>,
    pub generation_model: String,
    pub tts_model: String,
    pub tts_voice: String,
    pub speech_rate: f32,
    pub cors_origin: String,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        // --- Load Server Settings ---
        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
        })?;

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let cors_origin =
            std::env::var("CORS_ORIGIN").unwrap_or_else(|_| "http://localhost:3000".to_string());

        // --- Load Store Settings ---
        let store_backend = std::env::var("STORE_BACKEND")
            .unwrap_or_else(|_| "local".to_string())
            .parse::<StoreBackend>()
            .map_err(|e| ConfigError::InvalidValue("STORE_BACKEND".to_string(), e))?;

        let local_store_dir = std::env::var("LOCAL_STORE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./data"));
        let local_store_key =
            std::env::var("LOCAL_STORE_KEY").unwrap_or_else(|_| "ielts_records".to_string());

        let database_url = std::env::var("DATABASE_URL").ok();
        if store_backend == StoreBackend::Remote && database_url.is_none() {
            return Err(ConfigError::MissingVar("DATABASE_URL".to_string()));
        }

        // --- Load API Keys (as optional) ---
        let openai_api_key = non_empty_var("OPENAI_API_KEY");
        let gemini_api_key = non_empty_var("GEMINI_API_KEY");
        let generation_api_base = non_empty_var("GENERATION_API_BASE");

        // --- Load Adapter-specific Settings ---
        let default_model = if openai_api_key.is_none() && gemini_api_key.is_some() {
            "gemini-flash-latest"
        } else {
            "gpt-4o-mini"
        };
        let generation_model =
            std::env::var("GENERATION_MODEL").unwrap_or_else(|_| default_model.to_string());
        let tts_model = std::env::var("TTS_MODEL").unwrap_or_else(|_| "tts-1-hd".to_string());
        let tts_voice = std::env::var("TTS_VOICE").unwrap_or_else(|_| "alloy".to_string());

        let speech_rate_str = std::env::var("SPEECH_RATE").unwrap_or_else(|_| "0.9".to_string());
        let speech_rate = speech_rate_str
            .parse::<f32>()
            .ok()
            .filter(|rate| (0.25..=4.0).contains(rate))
            .ok_or_else(|| {
                ConfigError::InvalidValue(
                    "SPEECH_RATE".to_string(),
                    format!("'{}' is not a number between 0.25 and 4.0", speech_rate_str),
                )
            })?;

        Ok(Self {
            bind_address,
            log_level,
            store_backend,
            local_store_dir,
            local_store_key,
            database_url,
            openai_api_key,
            gemini_api_key,
            generation_api_base,
            generation_model,
            tts_model,
            tts_voice,
            speech_rate,
            cors_origin,
        })
    }

    /// The generation credentials, preferring OpenAI over Gemini.
    /// `None` means every generate call will fail with a configuration error.
    pub fn generation_provider(&self) -> Option<GenerationProvider> {
        if let Some(api_key) = &self.openai_api_key {
            return Some(GenerationProvider {
                api_key: api_key.clone(),
                api_base: self.generation_api_base.clone(),
            });
        }
        self.gemini_api_key.as_ref().map(|api_key| GenerationProvider {
            api_key: api_key.clone(),
            api_base: Some(
                self.generation_api_base
                    .clone()
                    .unwrap_or_else(|| GEMINI_OPENAI_BASE.to_string()),
            ),
        })
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}
