//! Microphone capture feeding the live channel.
//!
//! A [`Microphone`] delivers fixed-size mono frames at the capture rate into a
//! bounded channel. [`CapturePipeline`] drains that channel, encodes each frame
//! as a [`TransportBlob`] and hands it to the outbound queue without ever
//! waiting on it.

mod imp_cpal;

pub use imp_cpal::{CpalMicrophone, FrameAssembler};

use crate::codec::{encode_to_transport_blob, TransportBlob, CAPTURE_SAMPLE_RATE};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Microphone unavailable: {0}")]
    MicrophoneUnavailable(String),
    #[error("Audio stream error: {0}")]
    Stream(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Resampling error: {0}")]
    Resampling(String),
    #[error("Microphone already started")]
    AlreadyStarted,
}

/// Audio capture configuration
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Device name to capture from (None = default device)
    pub device_id: Option<String>,
    /// Channel to capture (0-based index)
    pub channel: u32,
    /// Rate frames are delivered at
    pub sample_rate: u32,
    /// Samples per delivered frame
    pub frame_size: usize,
    /// Frames buffered between the device thread and the encoder
    pub frame_queue: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            device_id: None,
            channel: 0,
            sample_rate: CAPTURE_SAMPLE_RATE,
            frame_size: 4096,
            frame_queue: 8,
        }
    }
}

/// Audio device information
#[derive(Debug, Clone)]
pub struct AudioDeviceInfo {
    pub name: String,
    pub id: String,
    pub is_default: bool,
    pub channel_count: u32,
}

/// An acquired microphone stream.
pub trait Microphone: Send {
    /// Begin delivering frames of `frame_size` samples into `frames`.
    fn start(&mut self, frames: mpsc::Sender<Vec<f32>>) -> Result<(), CaptureError>;

    /// Stop every track and release the device. Returns how many tracks this
    /// call stopped, so a second call returns 0.
    fn stop(&mut self) -> usize;

    /// Tracks acquired when the microphone was opened
    fn track_count(&self) -> usize;

    fn sample_rate(&self) -> u32;
}

#[derive(Default)]
struct CaptureCounters {
    captured: AtomicUsize,
    sent: AtomicUsize,
    dropped: AtomicUsize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureStats {
    pub frames_captured: usize,
    pub frames_sent: usize,
    pub frames_dropped: usize,
    pub tracks_stopped: usize,
}

pub struct CapturePipeline {
    microphone: Box<dyn Microphone>,
    pump: Option<JoinHandle<()>>,
    counters: Arc<CaptureCounters>,
    tracks_stopped: usize,
    stopped: bool,
}

impl CapturePipeline {
    /// Start `microphone` and forward its frames to `outbound`.
    ///
    /// Must be called from within a tokio runtime. On failure the microphone
    /// is stopped before the error is returned.
    pub fn activate(
        mut microphone: Box<dyn Microphone>,
        config: &CaptureConfig,
        outbound: mpsc::Sender<TransportBlob>,
    ) -> Result<Self, CaptureError> {
        let (frame_sender, frame_receiver) = mpsc::channel(config.frame_queue.max(1));

        if let Err(e) = microphone.start(frame_sender) {
            microphone.stop();
            return Err(e);
        }

        let counters = Arc::new(CaptureCounters::default());
        let pump = tokio::spawn(Self::pump(
            frame_receiver,
            outbound,
            microphone.sample_rate(),
            Arc::clone(&counters),
        ));

        log::info!(
            "🎤 Capture pipeline active: {} samples/frame @ {}Hz",
            config.frame_size,
            microphone.sample_rate()
        );

        Ok(Self {
            microphone,
            pump: Some(pump),
            counters,
            tracks_stopped: 0,
            stopped: false,
        })
    }

    async fn pump(
        mut frames: mpsc::Receiver<Vec<f32>>,
        outbound: mpsc::Sender<TransportBlob>,
        sample_rate: u32,
        counters: Arc<CaptureCounters>,
    ) {
        while let Some(frame) = frames.recv().await {
            counters.captured.fetch_add(1, Ordering::Relaxed);
            let blob = encode_to_transport_blob(&frame, sample_rate);

            match outbound.try_send(blob) {
                Ok(()) => {
                    counters.sent.fetch_add(1, Ordering::Relaxed);
                }
                Err(TrySendError::Full(_)) => {
                    let dropped = counters.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                    log::trace!("🎤 Outbound queue full, dropped frame ({} total)", dropped);
                }
                Err(TrySendError::Closed(_)) => {
                    counters.dropped.fetch_add(1, Ordering::Relaxed);
                    log::debug!("🎤 Outbound queue closed, capture pump exiting");
                    break;
                }
            }
        }
    }

    pub fn stats(&self) -> CaptureStats {
        CaptureStats {
            frames_captured: self.counters.captured.load(Ordering::Relaxed),
            frames_sent: self.counters.sent.load(Ordering::Relaxed),
            frames_dropped: self.counters.dropped.load(Ordering::Relaxed),
            tracks_stopped: self.tracks_stopped,
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Disconnect the frame callback and release the microphone.
    pub fn stop(&mut self) -> CaptureStats {
        if !self.stopped {
            self.stopped = true;
            self.tracks_stopped += self.microphone.stop();
            if let Some(pump) = self.pump.take() {
                pump.abort();
            }

            let stats = self.stats();
            log::info!(
                "🎤 Capture stopped: {} captured, {} sent, {} dropped",
                stats.frames_captured,
                stats.frames_sent,
                stats.frames_dropped
            );
        }
        self.stats()
    }
}

impl Drop for CapturePipeline {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct ScriptedMicrophone {
        frames: Vec<Vec<f32>>,
        fail_start: bool,
        stops: Arc<Mutex<usize>>,
        running: bool,
    }

    impl Microphone for ScriptedMicrophone {
        fn start(&mut self, frames: mpsc::Sender<Vec<f32>>) -> Result<(), CaptureError> {
            if self.fail_start {
                return Err(CaptureError::Stream("device vanished".to_string()));
            }
            self.running = true;
            for frame in self.frames.drain(..) {
                let _ = frames.try_send(frame);
            }
            Ok(())
        }

        fn stop(&mut self) -> usize {
            *self.stops.lock().unwrap() += 1;
            if std::mem::take(&mut self.running) {
                1
            } else {
                0
            }
        }

        fn track_count(&self) -> usize {
            1
        }

        fn sample_rate(&self) -> u32 {
            16_000
        }
    }

    #[tokio::test]
    async fn test_drops_when_outbound_full() {
        let stops = Arc::new(Mutex::new(0));
        let mic = ScriptedMicrophone {
            frames: vec![vec![0.1; 32]; 3],
            fail_start: false,
            stops: stops.clone(),
            running: false,
        };

        let (outbound, mut outbound_rx) = mpsc::channel(1);
        let mut pipeline =
            CapturePipeline::activate(Box::new(mic), &CaptureConfig::default(), outbound).unwrap();

        let first = outbound_rx.recv().await.unwrap();
        assert_eq!(first.mime_type, "audio/pcm;rate=16000");

        // Wait for the pump to see all three frames
        for _ in 0..100 {
            if pipeline.stats().frames_captured == 3 {
                break;
            }
            tokio::task::yield_now().await;
        }

        let stats = pipeline.stop();
        assert_eq!(stats.frames_captured, 3);
        assert_eq!(stats.frames_sent + stats.frames_dropped, 3);
        assert!(stats.frames_dropped >= 1);
        assert_eq!(stats.tracks_stopped, 1);
    }

    #[tokio::test]
    async fn test_failed_start_releases_microphone() {
        let stops = Arc::new(Mutex::new(0));
        let mic = ScriptedMicrophone {
            frames: Vec::new(),
            fail_start: true,
            stops: stops.clone(),
            running: false,
        };

        let (outbound, _outbound_rx) = mpsc::channel(4);
        let result = CapturePipeline::activate(Box::new(mic), &CaptureConfig::default(), outbound);
        assert!(matches!(result, Err(CaptureError::Stream(_))));
        assert_eq!(*stops.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let stops = Arc::new(Mutex::new(0));
        let mic = ScriptedMicrophone {
            frames: Vec::new(),
            fail_start: false,
            stops: stops.clone(),
            running: false,
        };

        let (outbound, _outbound_rx) = mpsc::channel(4);
        let mut pipeline =
            CapturePipeline::activate(Box::new(mic), &CaptureConfig::default(), outbound).unwrap();
        pipeline.stop();
        pipeline.stop();
        drop(pipeline);
        assert_eq!(*stops.lock().unwrap(), 1);
    }
}
