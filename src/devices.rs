use crate::audio_capture::{CaptureConfig, CaptureError, CpalMicrophone, Microphone};
use crate::playback::{CpalOutputClock, OutputClock, PlaybackError};

/// Source of the two audio resources a live session needs.
pub trait AudioBackend: Send + Sync {
    fn open_output(&self, sample_rate: u32) -> Result<Box<dyn OutputClock>, PlaybackError>;

    fn open_microphone(&self, config: &CaptureConfig) -> Result<Box<dyn Microphone>, CaptureError>;
}

/// Default input and output devices through cpal.
#[derive(Debug, Clone, Default)]
pub struct CpalBackend;

impl AudioBackend for CpalBackend {
    fn open_output(&self, sample_rate: u32) -> Result<Box<dyn OutputClock>, PlaybackError> {
        Ok(Box::new(CpalOutputClock::new(sample_rate)?))
    }

    fn open_microphone(&self, config: &CaptureConfig) -> Result<Box<dyn Microphone>, CaptureError> {
        Ok(Box::new(CpalMicrophone::open(config.clone())?))
    }
}
