use secrecy::{ExposeSecret, SecretBox};
use std::env;
use std::time::Duration;
use thiserror::Error;

use crate::prompts::SystemPrompts;

pub const DEFAULT_LIVE_MODEL: &str = "gemini-2.5-flash-native-audio-preview-09-2025";
pub const DEFAULT_LIVE_VOICE: &str = "Puck";
pub const DEFAULT_TTS_MODEL: &str = "gemini-2.5-flash-preview-tts";
pub const DEFAULT_TTS_VOICE: &str = "Kore";
pub const DEFAULT_SCRIPT_MODEL: &str = "gemini-3-pro-preview";
pub const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const GEMINI_LIVE_ENDPOINT: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

const GEMINI_SERVICE: &str = "Gemini";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid API key format for {service}: {reason}")]
    InvalidKeyFormat { service: String, reason: String },
    #[error("Invalid value for {name}: {reason}")]
    InvalidValue { name: String, reason: String },
}

/// Configuration for API services
#[derive(Debug)]
pub struct ApiConfig {
    pub gemini_key: SecretBox<String>,
}

impl ApiConfig {
    /// Load API configuration from environment variables
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if it exists (for development)
        dotenvy::dotenv().ok();

        let gemini_key = Self::load_api_key(&["GEMINI_API_KEY", "API_KEY"], GEMINI_SERVICE)?;

        Ok(Self { gemini_key })
    }

    /// Load and validate a key from the first variable that is set
    fn load_api_key(env_vars: &[&str], service_name: &str) -> Result<SecretBox<String>, ConfigError> {
        let key = env_vars
            .iter()
            .find_map(|var| env::var(var).ok())
            .ok_or_else(|| ConfigError::MissingEnvVar(env_vars.join(" or ")))?;

        if key.trim().is_empty() {
            return Err(ConfigError::InvalidKeyFormat {
                service: service_name.to_string(),
                reason: "API key cannot be empty".to_string(),
            });
        }

        Self::validate_key_format(&key, service_name)?;

        Ok(SecretBox::new(Box::new(key)))
    }

    fn validate_key_format(key: &str, service: &str) -> Result<(), ConfigError> {
        if service == GEMINI_SERVICE {
            if key.chars().any(char::is_whitespace) {
                return Err(ConfigError::InvalidKeyFormat {
                    service: service.to_string(),
                    reason: "Gemini keys cannot contain whitespace".to_string(),
                });
            }
            if key.len() < 20 {
                return Err(ConfigError::InvalidKeyFormat {
                    service: service.to_string(),
                    reason: "Gemini keys should be at least 20 characters".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Build from an already known key, e.g. one passed on the command line
    pub fn from_key(key: impl Into<String>) -> Result<Self, ConfigError> {
        let key = key.into();
        Self::validate_key_format(&key, GEMINI_SERVICE)?;
        Ok(Self {
            gemini_key: SecretBox::new(Box::new(key)),
        })
    }

    /// Get Gemini API key (use only when making API calls)
    pub fn gemini_key(&self) -> &str {
        self.gemini_key.expose_secret()
    }
}

/// Load configuration with helpful error messages for development
pub fn load_config() -> Result<ApiConfig, ConfigError> {
    match ApiConfig::load() {
        Ok(config) => {
            log::info!("Successfully loaded API configuration");
            Ok(config)
        }
        Err(ConfigError::MissingEnvVar(var)) => {
            log::error!("Missing required environment variable: {}", var);
            log::error!("Create a .env file in the project root with:");
            log::error!("GEMINI_API_KEY=your_api_key_here");
            Err(ConfigError::MissingEnvVar(var))
        }
        Err(e) => {
            log::error!("Configuration error: {}", e);
            Err(e)
        }
    }
}

/// Persona and voice the live channel is opened with.
#[derive(Debug, Clone, PartialEq)]
pub struct Persona {
    pub model: String,
    pub voice: String,
    pub system_instruction: String,
}

impl Default for Persona {
    fn default() -> Self {
        Self {
            model: DEFAULT_LIVE_MODEL.to_string(),
            voice: DEFAULT_LIVE_VOICE.to_string(),
            system_instruction: SystemPrompts::content_director().to_string(),
        }
    }
}

/// Live room settings
#[derive(Debug, Clone)]
pub struct LiveConfig {
    pub persona: Persona,
    pub endpoint: String,
    /// Samples per captured frame
    pub frame_size: usize,
    /// Outbound frames that may wait for the socket before new ones are dropped
    pub outbound_queue: usize,
    pub setup_timeout: Duration,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            persona: Persona::default(),
            endpoint: GEMINI_LIVE_ENDPOINT.to_string(),
            frame_size: 4096,
            outbound_queue: 32,
            setup_timeout: Duration::from_secs(10),
        }
    }
}

impl LiveConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(model) = env_override("NEWSROOM_LIVE_MODEL") {
            config.persona.model = model;
        }
        if let Some(voice) = env_override("NEWSROOM_LIVE_VOICE") {
            config.persona.voice = voice;
        }
        if let Some(frame_size) = env_override("NEWSROOM_FRAME_SIZE") {
            config.frame_size = parse_positive("NEWSROOM_FRAME_SIZE", &frame_size)?;
        }
        Ok(config)
    }
}

/// Text-to-speech settings
#[derive(Debug, Clone)]
pub struct SpeechConfig {
    pub model: String,
    pub voice: String,
    pub api_base: String,
    pub timeout: Duration,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_TTS_MODEL.to_string(),
            voice: DEFAULT_TTS_VOICE.to_string(),
            api_base: GEMINI_API_BASE.to_string(),
            timeout: Duration::from_secs(60),
        }
    }
}

impl SpeechConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(model) = env_override("NEWSROOM_TTS_MODEL") {
            config.model = model;
        }
        if let Some(voice) = env_override("NEWSROOM_TTS_VOICE") {
            config.voice = voice;
        }
        config
    }
}

/// Script generation settings
#[derive(Debug, Clone)]
pub struct ScriptConfig {
    pub model: String,
    pub api_base: String,
    pub thinking_budget: u32,
    pub timeout: Duration,
}

impl Default for ScriptConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_SCRIPT_MODEL.to_string(),
            api_base: GEMINI_API_BASE.to_string(),
            thinking_budget: 1024,
            timeout: Duration::from_secs(120),
        }
    }
}

impl ScriptConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(model) = env_override("NEWSROOM_SCRIPT_MODEL") {
            config.model = model;
        }
        config
    }
}

fn env_override(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_positive(name: &str, value: &str) -> Result<usize, ConfigError> {
    match value.parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(ConfigError::InvalidValue {
            name: name.to_string(),
            reason: format!("expected a positive integer, got '{}'", value),
        }),
    }
}
