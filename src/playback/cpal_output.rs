use super::{OutputClock, PlaybackError};
use crate::codec::SampleBuffer;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, SampleFormat, SizedSample, Stream as CpalStream};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{channel, sync_channel, Sender};
use std::sync::{Arc, Mutex};
use std::thread;

struct Segment {
    /// Position of the first sample, in source frames
    start: f64,
    samples: Vec<f32>,
}

impl Segment {
    fn end(&self) -> f64 {
        self.start + self.samples.len() as f64
    }
}

/// Mono audio pinned to absolute positions on the output clock.
///
/// Rendering walks the device frames, maps each one back to a source-rate
/// position, and emits the covering segment's sample (linearly interpolated)
/// or silence where nothing is scheduled.
pub struct Timeline {
    source_rate: u32,
    segments: VecDeque<Segment>,
}

impl Timeline {
    pub fn new(source_rate: u32) -> Self {
        Self {
            source_rate,
            segments: VecDeque::new(),
        }
    }

    /// Queue `samples` to start at `start_at` seconds. Calls must come in
    /// non-decreasing start order.
    pub fn push(&mut self, start_at: f64, samples: Vec<f32>) {
        let start = (start_at * self.source_rate as f64).round();
        self.segments.push_back(Segment { start, samples });
    }

    pub fn queued(&self) -> usize {
        self.segments.len()
    }

    pub fn clear(&mut self) {
        self.segments.clear();
    }

    /// Fill an interleaved device buffer whose first frame is `first_frame`.
    pub fn render(&mut self, out: &mut [f32], channels: usize, device_rate: u32, first_frame: u64) {
        let channels = channels.max(1);
        let step = self.source_rate as f64 / device_rate as f64;

        for (i, frame) in out.chunks_mut(channels).enumerate() {
            let pos = (first_frame + i as u64) as f64 * step;
            while self.segments.front().is_some_and(|s| s.end() <= pos) {
                self.segments.pop_front();
            }
            frame.fill(self.sample_at(pos));
        }
    }

    fn sample_at(&self, pos: f64) -> f32 {
        for segment in &self.segments {
            let offset = pos - segment.start;
            if offset < 0.0 {
                break;
            }
            if offset < segment.samples.len() as f64 {
                let idx = offset.floor() as usize;
                let fract = (offset - idx as f64) as f32;
                let a = segment.samples[idx];
                let b = segment.samples.get(idx + 1).copied().unwrap_or(a);
                return a + (b - a) * fract;
            }
        }
        0.0
    }
}

/// Output clock backed by the default cpal output device.
///
/// The stream lives on its own thread so the handle stays `Send`.
pub struct CpalOutputClock {
    source_rate: u32,
    device_rate: u32,
    timeline: Arc<Mutex<Timeline>>,
    rendered_frames: Arc<AtomicU64>,
    is_closed: Arc<AtomicBool>,
    stop_sender: Option<Sender<()>>,
    audio_thread: Option<thread::JoinHandle<()>>,
}

impl CpalOutputClock {
    /// Open the default output device for buffers at `source_rate`.
    pub fn new(source_rate: u32) -> Result<Self, PlaybackError> {
        let timeline = Arc::new(Mutex::new(Timeline::new(source_rate)));
        let rendered_frames = Arc::new(AtomicU64::new(0));
        let (ready_sender, ready_receiver) = sync_channel::<Result<u32, PlaybackError>>(1);
        let (stop_sender, stop_receiver) = channel::<()>();

        let thread_timeline = Arc::clone(&timeline);
        let thread_rendered = Arc::clone(&rendered_frames);
        let audio_thread = thread::Builder::new()
            .name("newsroom-output".to_string())
            .spawn(move || {
                log::debug!("🔈 Output thread started");
                let stream = match Self::open_stream(source_rate, thread_timeline, thread_rendered)
                {
                    Ok((stream, device_rate)) => {
                        let _ = ready_sender.send(Ok(device_rate));
                        stream
                    }
                    Err(e) => {
                        let _ = ready_sender.send(Err(e));
                        return;
                    }
                };

                // Blocks until a stop command or the handle is dropped
                let _ = stop_receiver.recv();
                drop(stream);
                log::debug!("🔈 Output thread exiting");
            })
            .map_err(|e| PlaybackError::Device(format!("Failed to spawn output thread: {}", e)))?;

        let device_rate = match ready_receiver.recv() {
            Ok(Ok(rate)) => rate,
            Ok(Err(e)) => {
                let _ = audio_thread.join();
                return Err(e);
            }
            Err(_) => {
                let _ = audio_thread.join();
                return Err(PlaybackError::Device(
                    "Output thread exited before the stream started".to_string(),
                ));
            }
        };

        log::info!(
            "🔈 Output clock ready: {}Hz source → {}Hz device",
            source_rate,
            device_rate
        );

        Ok(Self {
            source_rate,
            device_rate,
            timeline,
            rendered_frames,
            is_closed: Arc::new(AtomicBool::new(false)),
            stop_sender: Some(stop_sender),
            audio_thread: Some(audio_thread),
        })
    }

    pub fn device_rate(&self) -> u32 {
        self.device_rate
    }

    /// Buffers scheduled but not yet fully rendered
    pub fn queued_buffers(&self) -> usize {
        self.timeline.lock().map(|t| t.queued()).unwrap_or(0)
    }

    fn open_stream(
        source_rate: u32,
        timeline: Arc<Mutex<Timeline>>,
        rendered_frames: Arc<AtomicU64>,
    ) -> Result<(CpalStream, u32), PlaybackError> {
        let host = cpal::default_host();
        log::debug!("🔈 Using audio host: {:?}", host.id());

        let device = host
            .default_output_device()
            .ok_or_else(|| PlaybackError::Device("No output device found".to_string()))?;
        log::info!("🔈 Using output device: {:?}", device.name());

        let supported_config = match Self::select_output_config(&device, source_rate) {
            Ok(config) => config,
            Err(err) => {
                log::warn!(
                    "⚠️  Failed to select preferred output config: {}. Falling back to default output config.",
                    err
                );
                device
                    .default_output_config()
                    .map_err(|e| PlaybackError::Device(e.to_string()))?
            }
        };

        let stream_config = supported_config.config();
        let device_rate = stream_config.sample_rate.0;

        let stream = match supported_config.sample_format() {
            SampleFormat::F32 => Self::create_output_stream::<f32>(
                &device,
                &stream_config,
                timeline,
                rendered_frames,
            )?,
            SampleFormat::I16 => Self::create_output_stream::<i16>(
                &device,
                &stream_config,
                timeline,
                rendered_frames,
            )?,
            SampleFormat::U16 => Self::create_output_stream::<u16>(
                &device,
                &stream_config,
                timeline,
                rendered_frames,
            )?,
            format => {
                return Err(PlaybackError::Device(format!(
                    "Unsupported sample format: {:?}",
                    format
                )))
            }
        };

        stream
            .play()
            .map_err(|e| PlaybackError::Stream(e.to_string()))?;

        Ok((stream, device_rate))
    }

    fn select_output_config(
        device: &Device,
        source_rate: u32,
    ) -> Result<cpal::SupportedStreamConfig, PlaybackError> {
        let configs = device
            .supported_output_configs()
            .map_err(|e| PlaybackError::Device(e.to_string()))?;

        let mut best_config: Option<cpal::SupportedStreamConfig> = None;
        let mut best_format_rank = u8::MAX;

        for config_range in configs {
            if config_range.min_sample_rate().0 > source_rate
                || config_range.max_sample_rate().0 < source_rate
            {
                continue;
            }

            let format_rank = match config_range.sample_format() {
                SampleFormat::F32 => 0,
                SampleFormat::I16 => 1,
                SampleFormat::U16 => 2,
                _ => continue,
            };

            if format_rank < best_format_rank {
                best_format_rank = format_rank;
                best_config = Some(config_range.with_sample_rate(cpal::SampleRate(source_rate)));
            }
        }

        best_config.ok_or_else(|| {
            PlaybackError::Device(format!("No output config runs at {} Hz", source_rate))
        })
    }

    fn create_output_stream<T>(
        device: &Device,
        config: &cpal::StreamConfig,
        timeline: Arc<Mutex<Timeline>>,
        rendered_frames: Arc<AtomicU64>,
    ) -> Result<CpalStream, PlaybackError>
    where
        T: SizedSample + FromSample<f32> + Send + 'static,
    {
        let channels = config.channels as usize;
        let device_rate = config.sample_rate.0;
        let mut scratch: Vec<f32> = Vec::new();

        device
            .build_output_stream(
                config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    scratch.resize(data.len(), 0.0);
                    let first_frame = rendered_frames.load(Ordering::Acquire);

                    match timeline.lock() {
                        Ok(mut timeline) => {
                            timeline.render(&mut scratch, channels, device_rate, first_frame)
                        }
                        Err(_) => scratch.fill(0.0),
                    }

                    for (out, &sample) in data.iter_mut().zip(scratch.iter()) {
                        *out = T::from_sample(sample);
                    }

                    rendered_frames.fetch_add((data.len() / channels) as u64, Ordering::AcqRel);
                },
                move |err| {
                    log::error!("🔈 Output stream error: {}", err);
                },
                None,
            )
            .map_err(|e| PlaybackError::Stream(e.to_string()))
    }
}

impl OutputClock for CpalOutputClock {
    fn sample_rate(&self) -> u32 {
        self.source_rate
    }

    fn current_time(&self) -> f64 {
        self.rendered_frames.load(Ordering::Acquire) as f64 / self.device_rate as f64
    }

    fn schedule(&mut self, buffer: SampleBuffer, start_at: f64) -> Result<(), PlaybackError> {
        if self.is_closed.load(Ordering::Acquire) {
            return Err(PlaybackError::Closed);
        }

        // Mono device path: only the first channel is rendered
        let samples = if buffer.channels() == 1 {
            buffer.into_samples()
        } else {
            buffer.channel_data(0)
        };

        let mut timeline = self
            .timeline
            .lock()
            .map_err(|_| PlaybackError::Stream("Timeline lock poisoned".to_string()))?;
        timeline.push(start_at, samples);
        Ok(())
    }

    fn close(&mut self) {
        if self.is_closed.swap(true, Ordering::AcqRel) {
            return;
        }

        if let Ok(mut timeline) = self.timeline.lock() {
            timeline.clear();
        }

        if let Some(sender) = self.stop_sender.take() {
            if let Err(e) = sender.send(()) {
                log::error!("Failed to send stop command: {}", e);
            }
        }

        if let Some(thread) = self.audio_thread.take() {
            if let Err(e) = thread.join() {
                log::error!("Failed to join output thread: {:?}", e);
            }
        }

        log::info!("🔈 Output clock closed");
    }
}

impl Drop for CpalOutputClock {
    fn drop(&mut self) {
        self.close();
    }
}
