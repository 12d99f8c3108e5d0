use thiserror::Error;

use crate::audio_capture::CaptureError;
use crate::codec::CodecError;
use crate::config::ConfigError;
use crate::live::SessionError;
use crate::playback::PlaybackError;
use crate::script::ScriptError;
use crate::tts::TTSError;

pub type Result<T> = std::result::Result<T, NewsroomError>;

#[derive(Error, Debug)]
pub enum NewsroomError {
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),

    #[error("Playback error: {0}")]
    Playback(#[from] PlaybackError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// Script or speech generation did not produce a usable result.
    #[error("Generation failed: {0}")]
    GenerationFailed(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<TTSError> for NewsroomError {
    fn from(err: TTSError) -> Self {
        match err {
            TTSError::Io(e) => NewsroomError::Io(e),
            TTSError::Codec(e) => NewsroomError::Codec(e),
            other => NewsroomError::GenerationFailed(other.to_string()),
        }
    }
}

impl From<ScriptError> for NewsroomError {
    fn from(err: ScriptError) -> Self {
        NewsroomError::GenerationFailed(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_errors_are_user_facing() {
        let err: NewsroomError = TTSError::MissingAudio.into();
        assert!(matches!(err, NewsroomError::GenerationFailed(_)));
        assert!(err.to_string().starts_with("Generation failed"));

        let err: NewsroomError = ScriptError::EmptyResponse.into();
        assert!(matches!(err, NewsroomError::GenerationFailed(_)));
    }

    #[test]
    fn test_codec_errors_keep_their_kind() {
        let err: NewsroomError = TTSError::Codec(CodecError::UnsupportedFormat("odd".into())).into();
        assert!(matches!(err, NewsroomError::Codec(_)));
    }
}
