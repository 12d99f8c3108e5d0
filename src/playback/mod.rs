//! Gapless playback of decoded model audio.
//!
//! Buffers arrive from the network with jitter. Each one is scheduled on the
//! output clock to start exactly when the previous one ends, or immediately
//! when the queue has already drained.

mod cpal_output;

pub use cpal_output::{CpalOutputClock, Timeline};

use crate::codec::SampleBuffer;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum PlaybackError {
    #[error("Audio device error: {0}")]
    Device(String),

    #[error("Audio stream error: {0}")]
    Stream(String),

    #[error("Sample rate mismatch: clock runs at {clock} Hz, buffer is {buffer} Hz")]
    SampleRateMismatch { clock: u32, buffer: u32 },

    #[error("Output clock is closed")]
    Closed,
}

/// An output device seen as a clock that buffers can be pinned to.
pub trait OutputClock: Send {
    /// Rate scheduled buffers are expected at
    fn sample_rate(&self) -> u32;

    /// Seconds of audio the device has rendered since the clock was opened
    fn current_time(&self) -> f64;

    /// Play `buffer` starting at `start_at` seconds on this clock
    fn schedule(&mut self, buffer: SampleBuffer, start_at: f64) -> Result<(), PlaybackError>;

    /// Release the device. Must tolerate repeated calls.
    fn close(&mut self);
}

/// Where a buffer landed on the output clock.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledPlayback {
    pub start_at: f64,
    pub duration: f64,
}

impl ScheduledPlayback {
    pub fn end(&self) -> f64 {
        self.start_at + self.duration
    }
}

pub struct PlaybackScheduler {
    clock: Box<dyn OutputClock>,
    next_start_time: f64,
    scheduled: usize,
    closed: bool,
}

impl PlaybackScheduler {
    pub fn new(clock: Box<dyn OutputClock>) -> Self {
        let next_start_time = clock.current_time();
        log::debug!(
            "🔈 Playback scheduler starting at {:.3}s ({} Hz)",
            next_start_time,
            clock.sample_rate()
        );
        Self {
            clock,
            next_start_time,
            scheduled: 0,
            closed: false,
        }
    }

    /// Schedule `buffer` right after everything queued so far.
    pub fn enqueue(&mut self, buffer: SampleBuffer) -> Result<ScheduledPlayback, PlaybackError> {
        if self.closed {
            return Err(PlaybackError::Closed);
        }
        if buffer.sample_rate() != self.clock.sample_rate() {
            return Err(PlaybackError::SampleRateMismatch {
                clock: self.clock.sample_rate(),
                buffer: buffer.sample_rate(),
            });
        }

        let now = self.clock.current_time();
        if self.next_start_time < now && self.scheduled > 0 {
            log::debug!(
                "🔈 Playback queue drained {:.3}s ago, restarting at clock time",
                now - self.next_start_time
            );
        }
        let start_at = self.next_start_time.max(now);
        let duration = buffer.duration();

        self.clock.schedule(buffer, start_at)?;
        self.next_start_time = start_at + duration;
        self.scheduled += 1;

        log::trace!(
            "🔈 Scheduled {:.3}s at {:.3}s (next at {:.3}s)",
            duration,
            start_at,
            self.next_start_time
        );

        Ok(ScheduledPlayback { start_at, duration })
    }

    pub fn next_start_time(&self) -> f64 {
        self.next_start_time
    }

    pub fn scheduled_count(&self) -> usize {
        self.scheduled
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.clock.close();
        log::debug!("🔈 Playback scheduler closed after {} buffers", self.scheduled);
    }
}

impl Drop for PlaybackScheduler {
    fn drop(&mut self) {
        self.close();
    }
}
