use nusantara_newsroom::codec::{parse_wav_header, TransportBlob, WAV_HEADER_LEN};
use nusantara_newsroom::tts::{render_voice_over, SpeechSynthesizer, TTSError, VOICE_OVER_PREFIX};
use std::sync::Mutex;

/// Returns a canned payload and remembers what it was asked to say
struct CannedSpeech {
    blob: TransportBlob,
    requests: Mutex<Vec<(String, String)>>,
}

impl CannedSpeech {
    fn new(mime_type: &str, data: &str) -> Self {
        Self {
            blob: TransportBlob {
                mime_type: mime_type.to_string(),
                data: data.to_string(),
            },
            requests: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait::async_trait]
impl SpeechSynthesizer for CannedSpeech {
    async fn synthesize(&self, text: &str, voice: &str) -> Result<TransportBlob, TTSError> {
        self.requests
            .lock()
            .unwrap()
            .push((text.to_string(), voice.to_string()));
        Ok(self.blob.clone())
    }
}

#[tokio::test]
async fn test_render_voice_over() {
    // 4 samples of PCM16
    let speech = CannedSpeech::new("audio/pcm;rate=24000", "AAABAAIAAwA=");
    let voice_over = render_voice_over(&speech, "  Halo netizen!  ", "Kore")
        .await
        .unwrap();

    assert_eq!(
        *speech.requests.lock().unwrap(),
        vec![("Halo netizen!".to_string(), "Kore".to_string())]
    );
    assert_eq!(voice_over.wav.len(), WAV_HEADER_LEN + 8);

    let header = parse_wav_header(&voice_over.wav).unwrap();
    assert_eq!(header.sample_rate, 24_000);
    assert_eq!(header.channels, 1);
    assert_eq!(header.data_len, 8);
}

#[tokio::test]
async fn test_file_name_carries_timestamp() {
    let speech = CannedSpeech::new("audio/pcm;rate=24000", "AAAAAA==");
    let before = chrono::Utc::now().timestamp_millis();
    let voice_over = render_voice_over(&speech, "Tes", "Kore").await.unwrap();
    let after = chrono::Utc::now().timestamp_millis();

    let stamp: i64 = voice_over
        .file_name
        .strip_prefix(VOICE_OVER_PREFIX)
        .and_then(|rest| rest.strip_suffix(".wav"))
        .expect("file name follows the voice-over pattern")
        .parse()
        .unwrap();
    assert!((before..=after).contains(&stamp));
}

#[tokio::test]
async fn test_rate_taken_from_mime_type() {
    let speech = CannedSpeech::new("audio/pcm;rate=16000", "AAAAAA==");
    let voice_over = render_voice_over(&speech, "Tes", "Kore").await.unwrap();
    assert_eq!(parse_wav_header(&voice_over.wav).unwrap().sample_rate, 16_000);
}

#[tokio::test]
async fn test_empty_text_skips_synthesis() {
    let speech = CannedSpeech::new("audio/pcm;rate=24000", "AAAAAA==");
    assert!(matches!(
        render_voice_over(&speech, "   ", "Kore").await,
        Err(TTSError::EmptyText)
    ));
    assert!(speech.requests.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_empty_audio_is_an_error() {
    let speech = CannedSpeech::new("audio/pcm;rate=24000", "");
    assert!(matches!(
        render_voice_over(&speech, "Tes", "Kore").await,
        Err(TTSError::MissingAudio)
    ));
}

#[tokio::test]
async fn test_malformed_audio_is_an_error() {
    let speech = CannedSpeech::new("audio/pcm;rate=24000", "!!not base64!!");
    assert!(matches!(
        render_voice_over(&speech, "Tes", "Kore").await,
        Err(TTSError::Codec(_))
    ));
}

#[tokio::test]
async fn test_save_writes_wav() {
    let speech = CannedSpeech::new("audio/pcm;rate=24000", "AAABAA==");
    let voice_over = render_voice_over(&speech, "Tes", "Kore").await.unwrap();

    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("exports");
    let path = voice_over.save(&out).await.unwrap();

    assert_eq!(path, out.join(&voice_over.file_name));
    assert_eq!(std::fs::read(&path).unwrap(), voice_over.wav);
    assert!((voice_over.duration_secs().unwrap() - 2.0 / 24_000.0).abs() < 1e-9);
}

#[cfg(feature = "test-api")]
mod api {
    use nusantara_newsroom::config::ApiConfig;
    use nusantara_newsroom::tts::{render_voice_over, GeminiSpeech};

    #[tokio::test]
    async fn test_gemini_voice_over() {
        let config = ApiConfig::load().expect("GEMINI_API_KEY must be set for API tests");
        let speech = GeminiSpeech::new(config.gemini_key().to_string()).unwrap();

        let voice_over = render_voice_over(&speech, "Halo semuanya, ini tes singkat.", "Kore")
            .await
            .unwrap();
        assert!(voice_over.duration_secs().unwrap() > 0.5);
    }
}
