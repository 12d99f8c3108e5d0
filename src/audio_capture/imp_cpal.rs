use super::{AudioDeviceInfo, CaptureConfig, CaptureError, Microphone};
use cpal::{
    traits::{DeviceTrait, HostTrait, StreamTrait},
    Device, FromSample, Sample, SampleFormat, SizedSample, Stream as CpalStream,
};
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use std::sync::mpsc::{channel, sync_channel, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use tokio::sync::mpsc;

/// Hardware samples fed to the resampler per call
const RESAMPLER_CHUNK: usize = 1024;

type FrameSlot = Arc<Mutex<Option<mpsc::Sender<Vec<f32>>>>>;

/// Turns hardware-rate mono samples into fixed-size frames at the capture rate.
pub struct FrameAssembler {
    frame_size: usize,
    resampler: Option<SincFixedIn<f32>>,
    pending_input: Vec<f32>,
    pending_output: Vec<f32>,
}

impl FrameAssembler {
    pub fn new(hardware_rate: u32, target_rate: u32, frame_size: usize) -> Result<Self, CaptureError> {
        let resampler = if hardware_rate != target_rate {
            let ratio = target_rate as f64 / hardware_rate as f64;
            let params = SincInterpolationParameters {
                sinc_len: 32,
                f_cutoff: 0.95,
                interpolation: SincInterpolationType::Linear,
                oversampling_factor: 128,
                window: WindowFunction::BlackmanHarris2,
            };

            let resampler = SincFixedIn::<f32>::new(ratio, 2.0, params, RESAMPLER_CHUNK, 1)
                .map_err(|e| CaptureError::Resampling(e.to_string()))?;

            log::info!(
                "🔄 Created resampler: {}Hz → {}Hz (ratio: {:.3})",
                hardware_rate,
                target_rate,
                ratio
            );
            Some(resampler)
        } else {
            log::info!("🔄 No resampling needed (hardware is {}Hz)", target_rate);
            None
        };

        Ok(Self {
            frame_size: frame_size.max(1),
            resampler,
            pending_input: Vec::new(),
            pending_output: Vec::new(),
        })
    }

    /// Add hardware samples and return every frame that is now complete.
    pub fn push(&mut self, samples: &[f32]) -> Vec<Vec<f32>> {
        match self.resampler.as_mut() {
            Some(resampler) => {
                self.pending_input.extend_from_slice(samples);
                while self.pending_input.len() >= RESAMPLER_CHUNK {
                    let chunk: Vec<f32> = self.pending_input.drain(..RESAMPLER_CHUNK).collect();
                    match resampler.process(&[chunk], None) {
                        Ok(mut output_channels) => {
                            if let Some(output) = output_channels.pop() {
                                self.pending_output.extend(output);
                            }
                        }
                        Err(e) => log::error!("Resampling error: {}", e),
                    }
                }
            }
            None => self.pending_output.extend_from_slice(samples),
        }

        let mut frames = Vec::new();
        while self.pending_output.len() >= self.frame_size {
            frames.push(self.pending_output.drain(..self.frame_size).collect());
        }
        frames
    }
}

/// Microphone stream on a cpal input device.
///
/// The stream is built and owned by a dedicated thread for as long as the
/// microphone is open. Frames only flow after [`Microphone::start`].
pub struct CpalMicrophone {
    device_name: String,
    sample_rate: u32,
    frame_slot: FrameSlot,
    stop_sender: Option<Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl CpalMicrophone {
    /// Acquire the configured input device.
    pub fn open(config: CaptureConfig) -> Result<Self, CaptureError> {
        let frame_slot: FrameSlot = Arc::new(Mutex::new(None));
        let (ready_sender, ready_receiver) = sync_channel::<Result<String, CaptureError>>(1);
        let (stop_sender, stop_receiver) = channel::<()>();
        let sample_rate = config.sample_rate;

        let thread_slot = Arc::clone(&frame_slot);
        let handle = thread::Builder::new()
            .name("newsroom-capture".to_string())
            .spawn(move || Self::run_capture_thread(config, thread_slot, ready_sender, stop_receiver))
            .map_err(|e| CaptureError::Stream(format!("Failed to spawn capture thread: {}", e)))?;

        let device_name = match ready_receiver.recv() {
            Ok(Ok(name)) => name,
            Ok(Err(e)) => {
                let _ = handle.join();
                return Err(e);
            }
            Err(_) => {
                let _ = handle.join();
                return Err(CaptureError::MicrophoneUnavailable(
                    "Capture thread exited before the stream started".to_string(),
                ));
            }
        };

        Ok(Self {
            device_name,
            sample_rate,
            frame_slot,
            stop_sender: Some(stop_sender),
            handle: Some(handle),
        })
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// Internal function that runs in the CPAL thread
    fn run_capture_thread(
        config: CaptureConfig,
        frame_slot: FrameSlot,
        ready: std::sync::mpsc::SyncSender<Result<String, CaptureError>>,
        stop_receiver: Receiver<()>,
    ) {
        let stream = match Self::open_stream(&config, frame_slot) {
            Ok((stream, name)) => {
                let _ = ready.send(Ok(name));
                stream
            }
            Err(e) => {
                log::error!("Audio capture thread failed: {}", e);
                let _ = ready.send(Err(e));
                return;
            }
        };

        // Blocks until stop() or the handle is dropped
        let _ = stop_receiver.recv();
        drop(stream);
        log::info!("🎤 Audio capture thread received stop signal. Exiting.");
    }

    fn open_stream(
        config: &CaptureConfig,
        frame_slot: FrameSlot,
    ) -> Result<(CpalStream, String), CaptureError> {
        let host = cpal::default_host();
        log::info!("🎤 Initializing audio capture with host: {:?}", host.id());

        let device = if let Some(id) = &config.device_id {
            host.input_devices()
                .map_err(|e| CaptureError::MicrophoneUnavailable(e.to_string()))?
                .find(|d| d.name().map(|n| n == *id).unwrap_or(false))
                .ok_or_else(|| {
                    CaptureError::MicrophoneUnavailable(format!("Device not found: {}", id))
                })?
        } else {
            host.default_input_device().ok_or_else(|| {
                CaptureError::MicrophoneUnavailable("No default input device found".into())
            })?
        };

        let device_name = device.name().unwrap_or_else(|_| "unknown".to_string());
        log::info!("🎤 Using input device: {}", device_name);

        let supported_config = match Self::select_input_config(&device, config) {
            Ok(supported) => supported,
            Err(err) => {
                log::warn!(
                    "⚠️  Failed to select preferred input config: {}. Falling back to default input config.",
                    err
                );
                device
                    .default_input_config()
                    .map_err(|e| CaptureError::MicrophoneUnavailable(e.to_string()))?
            }
        };

        if config.channel >= u32::from(supported_config.channels()) {
            return Err(CaptureError::Config(format!(
                "Selected channel {} is not available (device has {} channels)",
                config.channel,
                supported_config.channels()
            )));
        }

        let stream_config = supported_config.config();
        let hardware_rate = stream_config.sample_rate.0;
        let channels = stream_config.channels as usize;

        log::info!(
            "🎤 Hardware: {}Hz, {} channels, {:?} → Output: {}Hz mono",
            hardware_rate,
            channels,
            supported_config.sample_format(),
            config.sample_rate
        );

        let assembler = FrameAssembler::new(hardware_rate, config.sample_rate, config.frame_size)?;
        let channel = config.channel as usize;

        let stream = match supported_config.sample_format() {
            SampleFormat::I16 => Self::create_input_stream::<i16>(
                &device,
                &stream_config,
                channel,
                assembler,
                frame_slot,
            )?,
            SampleFormat::U16 => Self::create_input_stream::<u16>(
                &device,
                &stream_config,
                channel,
                assembler,
                frame_slot,
            )?,
            SampleFormat::F32 => Self::create_input_stream::<f32>(
                &device,
                &stream_config,
                channel,
                assembler,
                frame_slot,
            )?,
            format => {
                return Err(CaptureError::Config(format!(
                    "Unsupported sample format: {:?}",
                    format
                )))
            }
        };

        stream
            .play()
            .map_err(|e| CaptureError::MicrophoneUnavailable(e.to_string()))?;

        Ok((stream, device_name))
    }

    fn select_input_config(
        device: &Device,
        config: &CaptureConfig,
    ) -> Result<cpal::SupportedStreamConfig, CaptureError> {
        let configs = device
            .supported_input_configs()
            .map_err(|e| CaptureError::Config(e.to_string()))?;

        let mut best_config: Option<cpal::SupportedStreamConfig> = None;
        let mut best_format_rank = u8::MAX;
        let mut best_rate_diff = u32::MAX;
        let target_rate = config.sample_rate;

        for config_range in configs {
            if config.channel >= config_range.channels() as u32 {
                continue;
            }

            let format_rank = match config_range.sample_format() {
                SampleFormat::I16 => 0,
                SampleFormat::F32 => 1,
                SampleFormat::U16 => 2,
                _ => continue,
            };

            let chosen_rate = target_rate.clamp(
                config_range.min_sample_rate().0,
                config_range.max_sample_rate().0,
            );
            let rate_diff = chosen_rate.abs_diff(target_rate);

            if rate_diff < best_rate_diff
                || (rate_diff == best_rate_diff && format_rank < best_format_rank)
            {
                best_format_rank = format_rank;
                best_rate_diff = rate_diff;
                best_config = Some(config_range.with_sample_rate(cpal::SampleRate(chosen_rate)));
            }
        }

        best_config
            .ok_or_else(|| CaptureError::Config("No supported input configs found".to_string()))
    }

    fn create_input_stream<T>(
        device: &Device,
        config: &cpal::StreamConfig,
        channel: usize,
        mut assembler: FrameAssembler,
        frame_slot: FrameSlot,
    ) -> Result<CpalStream, CaptureError>
    where
        T: Sample + SizedSample + Send + Sync + 'static,
        f32: FromSample<T>,
    {
        let channels = config.channels as usize;
        let mut mono = Vec::new();

        device
            .build_input_stream(
                config,
                move |data: &[T], _: &cpal::InputCallbackInfo| {
                    let Ok(slot) = frame_slot.lock() else {
                        return;
                    };
                    // Not started yet, or already stopped
                    let Some(sender) = slot.as_ref() else {
                        return;
                    };

                    mono.clear();
                    mono.extend(
                        data.chunks(channels)
                            .filter_map(|frame| frame.get(channel))
                            .map(|&s| f32::from_sample(s)),
                    );

                    for frame in assembler.push(&mono) {
                        if sender.try_send(frame).is_err() {
                            log::trace!("🎤 Frame queue full or closed, dropping frame");
                        }
                    }
                },
                move |err| {
                    log::error!("Audio stream error: {}", err);
                },
                None,
            )
            .map_err(|e| CaptureError::MicrophoneUnavailable(e.to_string()))
    }

    /// List available audio devices
    pub fn list_devices() -> Result<Vec<AudioDeviceInfo>, CaptureError> {
        let host = cpal::default_host();
        let devices = host
            .input_devices()
            .map_err(|e| CaptureError::MicrophoneUnavailable(e.to_string()))?;

        let default_name = host.default_input_device().and_then(|d| d.name().ok());

        let mut device_infos = Vec::new();
        for device in devices {
            let Ok(name) = device.name() else {
                continue;
            };
            let channel_count = device
                .default_input_config()
                .map(|c| c.channels() as u32)
                .unwrap_or(0);

            device_infos.push(AudioDeviceInfo {
                id: name.clone(),
                is_default: default_name.as_ref() == Some(&name),
                name,
                channel_count,
            });
        }

        Ok(device_infos)
    }
}

impl Microphone for CpalMicrophone {
    fn start(&mut self, frames: mpsc::Sender<Vec<f32>>) -> Result<(), CaptureError> {
        if self.stop_sender.is_none() {
            return Err(CaptureError::MicrophoneUnavailable(
                "Microphone has been released".to_string(),
            ));
        }

        let mut slot = self
            .frame_slot
            .lock()
            .map_err(|_| CaptureError::Stream("Frame slot lock poisoned".to_string()))?;
        if slot.is_some() {
            return Err(CaptureError::AlreadyStarted);
        }
        *slot = Some(frames);
        log::info!("🎤 Microphone '{}' started", self.device_name);
        Ok(())
    }

    fn stop(&mut self) -> usize {
        let Some(stop_sender) = self.stop_sender.take() else {
            return 0;
        };

        if let Ok(mut slot) = self.frame_slot.lock() {
            slot.take();
        }

        log::debug!("🎤 Stopping microphone - sending stop signal");
        let _ = stop_sender.send(());
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.join() {
                log::error!("Failed to join capture thread: {:?}", e);
            }
        }
        1
    }

    fn track_count(&self) -> usize {
        1
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

impl Drop for CpalMicrophone {
    fn drop(&mut self) {
        self.stop();
    }
}
