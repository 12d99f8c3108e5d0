//! Short-form news scripts from a link or an uploaded video.

use crate::config::ScriptConfig;
use crate::generate_content::{GenerateContentResponse, GroundingChunk};
use crate::prompts::{ScriptTemplates, SystemPrompts};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde::Serialize;
use serde_json::{json, Value};
use std::path::Path;
use thiserror::Error;

pub const DEFAULT_HEADLINE: &str = "Viral News";

static HEADLINE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\[HEADLINE\]\s*(.*?)\s*\[SCRIPT VO\]").expect("valid regex"));
static BODY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\[SCRIPT VO\]\s*(.*)").expect("valid regex"));

#[derive(Error, Debug)]
pub enum ScriptError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },
    #[error("Model returned no script text")]
    EmptyResponse,
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScriptInput {
    Url(String),
    /// Base64 media with its MIME type
    Media { data: String, mime_type: String },
}

impl ScriptInput {
    pub fn media_from_bytes(bytes: &[u8], mime_type: impl Into<String>) -> Self {
        ScriptInput::Media {
            data: BASE64.encode(bytes),
            mime_type: mime_type.into(),
        }
    }

    /// Read a media file, guessing the MIME type from its extension unless given.
    pub async fn media_from_file(path: &Path, mime_type: Option<String>) -> Result<Self, ScriptError> {
        let bytes = tokio::fs::read(path).await?;
        if bytes.is_empty() {
            return Err(ScriptError::InvalidInput(format!(
                "{} is empty",
                path.display()
            )));
        }
        let mime_type = mime_type.unwrap_or_else(|| mime_for_path(path).to_string());
        Ok(Self::media_from_bytes(&bytes, mime_type))
    }
}

pub fn mime_for_path(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    match extension.as_str() {
        "mp4" | "m4v" => "video/mp4",
        "mov" => "video/quicktime",
        "webm" => "video/webm",
        "mkv" => "video/x-matroska",
        "avi" => "video/x-msvideo",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "m4a" => "audio/mp4",
        _ => "application/octet-stream",
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeneratedScript {
    pub headline: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroundingSource {
    pub title: Option<String>,
    pub uri: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScriptResult {
    pub script: GeneratedScript,
    pub sources: Vec<GroundingSource>,
}

#[async_trait::async_trait]
pub trait ScriptWriter: Send + Sync {
    async fn generate(&self, input: &ScriptInput) -> Result<ScriptResult, ScriptError>;
}

/// Split a `[HEADLINE] ... [SCRIPT VO] ...` answer.
///
/// A missing `[HEADLINE]` section falls back to [`DEFAULT_HEADLINE`]; a
/// missing `[SCRIPT VO]` marker makes the whole text the body.
pub fn parse_script(text: &str) -> GeneratedScript {
    let headline = HEADLINE_RE
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_else(|| DEFAULT_HEADLINE.to_string());

    let body = BODY_RE
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_else(|| text.to_string());

    GeneratedScript { headline, body }
}

pub fn extract_sources(chunks: &[GroundingChunk]) -> Vec<GroundingSource> {
    chunks
        .iter()
        .filter_map(|chunk| {
            if let Some(web) = &chunk.web {
                Some(GroundingSource {
                    title: web.title.clone(),
                    uri: web.uri.clone(),
                })
            } else {
                chunk.maps.as_ref().map(|maps| GroundingSource {
                    title: maps.title.clone(),
                    uri: maps.uri.clone().or_else(|| maps.google_maps_uri.clone()),
                })
            }
        })
        .collect()
}

pub struct GeminiScriptWriter {
    client: Client,
    api_key: String,
    config: ScriptConfig,
}

impl GeminiScriptWriter {
    pub fn new(api_key: String) -> Result<Self, ScriptError> {
        Self::with_config(api_key, ScriptConfig::default())
    }

    pub fn with_config(api_key: String, config: ScriptConfig) -> Result<Self, ScriptError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            api_key,
            config,
        })
    }

    fn request_body(&self, input: &ScriptInput) -> Result<Value, ScriptError> {
        let parts = match input {
            ScriptInput::Url(url) => {
                let url = url.trim();
                if url.is_empty() {
                    return Err(ScriptError::InvalidInput("URL is empty".to_string()));
                }
                json!([{ "text": ScriptTemplates::from_url(url) }])
            }
            ScriptInput::Media { data, mime_type } => json!([
                { "inlineData": { "mimeType": mime_type, "data": data } },
                { "text": ScriptTemplates::analyze_media() }
            ]),
        };

        Ok(json!({
            "systemInstruction": { "parts": [{ "text": SystemPrompts::scriptwriter() }] },
            "contents": [{ "role": "user", "parts": parts }],
            "tools": [{ "googleSearch": {} }],
            "generationConfig": {
                "thinkingConfig": { "thinkingBudget": self.config.thinking_budget }
            }
        }))
    }

    fn into_result(response: &GenerateContentResponse) -> Result<ScriptResult, ScriptError> {
        let text = response.text();
        if text.trim().is_empty() {
            return Err(ScriptError::EmptyResponse);
        }

        Ok(ScriptResult {
            script: parse_script(&text),
            sources: extract_sources(response.grounding_chunks()),
        })
    }
}

#[async_trait::async_trait]
impl ScriptWriter for GeminiScriptWriter {
    async fn generate(&self, input: &ScriptInput) -> Result<ScriptResult, ScriptError> {
        let url = format!(
            "{}/models/{}:generateContent",
            self.config.api_base, self.config.model
        );
        let body = self.request_body(input)?;

        log::info!("📝 Requesting script from {}", self.config.model);
        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ScriptError::ApiError {
                status: status.as_u16(),
                message: error_text,
            });
        }

        let response: GenerateContentResponse = response.json().await?;
        let result = Self::into_result(&response)?;
        log::info!(
            "📝 Script ready: '{}' ({} sources)",
            result.script.headline,
            result.sources.len()
        );
        Ok(result)
    }
}
