use crate::codec::{
    build_wav_container, decode_transport_blob, parse_wav_header, pcm_mime_type, CodecError,
    TransportBlob, SYNTHESIS_SAMPLE_RATE,
};
use crate::config::SpeechConfig;
use crate::generate_content::GenerateContentResponse;
use reqwest::Client;
use serde_json::json;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const VOICE_OVER_PREFIX: &str = "nusantara-news-vo-";

#[derive(Error, Debug)]
pub enum TTSError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },
    #[error("No audio data returned")]
    MissingAudio,
    #[error("Nothing to synthesize: text is empty")]
    EmptyText,
    #[error("Audio processing error: {0}")]
    Codec(#[from] CodecError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Text in, one base64 PCM16 payload out.
#[async_trait::async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str, voice: &str) -> Result<TransportBlob, TTSError>;
}

/// A finished voice-over, ready to be written to disk.
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceOver {
    pub wav: Vec<u8>,
    pub file_name: String,
}

impl VoiceOver {
    pub fn duration_secs(&self) -> Result<f64, CodecError> {
        Ok(parse_wav_header(&self.wav)?.duration_secs())
    }

    /// Write the WAV into `dir` under its own file name
    pub async fn save(&self, dir: impl AsRef<Path>) -> Result<PathBuf, TTSError> {
        let dir = dir.as_ref();
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(&self.file_name);
        tokio::fs::write(&path, &self.wav).await?;
        log::info!("💾 Saved voice-over ({} bytes) to {}", self.wav.len(), path.display());
        Ok(path)
    }
}

pub fn voice_over_file_name(epoch_ms: i64) -> String {
    format!("{}{}.wav", VOICE_OVER_PREFIX, epoch_ms)
}

/// Synthesize `text` and wrap the result as a downloadable WAV.
pub async fn render_voice_over(
    synthesizer: &dyn SpeechSynthesizer,
    text: &str,
    voice: &str,
) -> Result<VoiceOver, TTSError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(TTSError::EmptyText);
    }

    log::info!("🗣️ Synthesizing {} characters with voice {}", text.chars().count(), voice);
    let blob = synthesizer.synthesize(text, voice).await?;

    let pcm = decode_transport_blob(&blob)?;
    if pcm.is_empty() {
        return Err(TTSError::MissingAudio);
    }
    let sample_rate = blob.sample_rate().unwrap_or(SYNTHESIS_SAMPLE_RATE);
    let wav = build_wav_container(&pcm, sample_rate)?;

    Ok(VoiceOver {
        wav,
        file_name: voice_over_file_name(chrono::Utc::now().timestamp_millis()),
    })
}

pub struct GeminiSpeech {
    client: Client,
    api_key: String,
    config: SpeechConfig,
}

impl GeminiSpeech {
    pub fn new(api_key: String) -> Result<Self, TTSError> {
        Self::with_config(api_key, SpeechConfig::default())
    }

    pub fn with_config(api_key: String, config: SpeechConfig) -> Result<Self, TTSError> {
        let client = Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            client,
            api_key,
            config,
        })
    }

    pub fn config(&self) -> &SpeechConfig {
        &self.config
    }

    fn request_body(text: &str, voice: &str) -> serde_json::Value {
        json!({
            "contents": [{ "parts": [{ "text": text }] }],
            "generationConfig": {
                "responseModalities": ["AUDIO"],
                "speechConfig": {
                    "voiceConfig": {
                        "prebuiltVoiceConfig": { "voiceName": voice }
                    }
                }
            }
        })
    }

    /// Pull the audio payload out of a generateContent answer.
    fn extract_audio(response: &GenerateContentResponse) -> Result<TransportBlob, TTSError> {
        let inline = response.first_inline_data().ok_or(TTSError::MissingAudio)?;
        if inline.data.is_empty() {
            return Err(TTSError::MissingAudio);
        }

        // The TTS model reports `audio/L16;codec=pcm;rate=24000`; keep the rate, normalize the tag
        let sample_rate = inline.sample_rate().unwrap_or(SYNTHESIS_SAMPLE_RATE);
        Ok(TransportBlob {
            mime_type: pcm_mime_type(sample_rate),
            data: inline.data.clone(),
        })
    }
}

#[async_trait::async_trait]
impl SpeechSynthesizer for GeminiSpeech {
    async fn synthesize(&self, text: &str, voice: &str) -> Result<TransportBlob, TTSError> {
        let url = format!(
            "{}/models/{}:generateContent",
            self.config.api_base, self.config.model
        );

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&Self::request_body(text, voice))
            .send()
            .await?;

        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(TTSError::ApiError {
                status: status.as_u16(),
                message: error_text,
            });
        }

        let body: GenerateContentResponse = response.json().await?;
        Self::extract_audio(&body)
    }
}
