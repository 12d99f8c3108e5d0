//! PCM16 / base64 / WAV conversions shared by live playback and voice-over export.
//!
//! Little-endian PCM16 is the only wire format in both directions: the
//! microphone is sent as `audio/pcm;rate=16000` and the model answers with
//! `audio/pcm;rate=24000`. WAV is only a container put around the same bytes
//! for export, so the sample values never change between the two paths.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use thiserror::Error;

/// Rate the microphone is captured and sent at.
pub const CAPTURE_SAMPLE_RATE: u32 = 16_000;
/// Rate of every synthesized (live and TTS) payload.
pub const SYNTHESIS_SAMPLE_RATE: u32 = 24_000;
/// Size of the canonical RIFF/WAVE header for mono PCM16.
pub const WAV_HEADER_LEN: usize = 44;

const PCM16_MIME_PREFIX: &str = "audio/pcm";

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Malformed transport data: {0}")]
    MalformedTransportData(#[from] base64::DecodeError),
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
    #[error("WAV container error: {0}")]
    Wav(#[from] hound::Error),
}

/// Base64-wrapped PCM16 bytes as they cross the live channel.
///
/// Serializes as `{"mimeType": "...", "data": "..."}`, which is the shape of
/// both an outbound media chunk and an inbound `inlineData` part.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportBlob {
    pub mime_type: String,
    pub data: String,
}

impl TransportBlob {
    /// Wrap raw PCM16 bytes without touching the samples.
    pub fn from_pcm_bytes(bytes: &[u8], sample_rate: u32) -> Self {
        Self {
            mime_type: pcm_mime_type(sample_rate),
            data: BASE64.encode(bytes),
        }
    }

    /// Sample rate declared in the MIME tag (`audio/pcm;rate=24000`), if any.
    pub fn sample_rate(&self) -> Option<u32> {
        self.mime_type
            .split(';')
            .filter_map(|param| param.trim().strip_prefix("rate="))
            .find_map(|rate| rate.trim().parse().ok())
    }

    pub fn is_pcm(&self) -> bool {
        self.mime_type.starts_with(PCM16_MIME_PREFIX)
    }

    /// Length of the base64 text, which is what actually goes on the wire.
    pub fn encoded_len(&self) -> usize {
        self.data.len()
    }
}

pub fn pcm_mime_type(sample_rate: u32) -> String {
    format!("{};rate={}", PCM16_MIME_PREFIX, sample_rate)
}

/// Normalized samples in [-1.0, 1.0], interleaved when `channels > 1`.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBuffer {
    samples: Vec<f32>,
    sample_rate: u32,
    channels: u16,
}

impl SampleBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32, channels: u16) -> Self {
        Self {
            samples,
            sample_rate,
            channels: channels.max(1),
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn into_samples(self) -> Vec<f32> {
        self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Number of sample frames (one sample per channel).
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    /// Playback length in seconds.
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// De-interleaved samples of a single channel.
    pub fn channel_data(&self, channel: u16) -> Vec<f32> {
        if channel >= self.channels {
            return Vec::new();
        }
        self.samples
            .iter()
            .skip(channel as usize)
            .step_by(self.channels as usize)
            .copied()
            .collect()
    }
}

/// Clamp, scale to i16, serialize little-endian and base64-encode.
pub fn encode_to_transport_blob(samples: &[f32], sample_rate: u32) -> TransportBlob {
    TransportBlob::from_pcm_bytes(&f32_to_s16le_bytes(samples), sample_rate)
}

pub fn decode_transport_blob(blob: &TransportBlob) -> Result<Vec<u8>, CodecError> {
    Ok(BASE64.decode(blob.data.as_bytes())?)
}

/// Interpret little-endian PCM16 bytes as normalized floats.
pub fn decode_to_sample_buffer(
    raw_bytes: &[u8],
    sample_rate: u32,
    channels: u16,
) -> Result<SampleBuffer, CodecError> {
    if channels == 0 {
        return Err(CodecError::UnsupportedFormat(
            "channel count must be at least 1".to_string(),
        ));
    }
    let frame_bytes = 2 * channels as usize;
    if raw_bytes.len() % frame_bytes != 0 {
        return Err(CodecError::UnsupportedFormat(format!(
            "{} bytes is not a whole number of {}-channel PCM16 frames",
            raw_bytes.len(),
            channels
        )));
    }

    let samples = raw_bytes
        .chunks_exact(2)
        .map(|bytes| i16::from_le_bytes([bytes[0], bytes[1]]) as f32 / 32768.0)
        .collect();

    Ok(SampleBuffer::new(samples, sample_rate, channels))
}

/// Wrap mono PCM16 bytes in a 44-byte-header WAV container.
pub fn build_wav_container(raw_pcm_bytes: &[u8], sample_rate: u32) -> Result<Vec<u8>, CodecError> {
    if raw_pcm_bytes.len() % 2 != 0 {
        return Err(CodecError::UnsupportedFormat(format!(
            "PCM16 payload must have an even length, got {} bytes",
            raw_pcm_bytes.len()
        )));
    }

    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::with_capacity(WAV_HEADER_LEN + raw_pcm_bytes.len()));
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
        for bytes in raw_pcm_bytes.chunks_exact(2) {
            writer.write_sample(i16::from_le_bytes([bytes[0], bytes[1]]))?;
        }
        writer.finalize()?;
    }

    Ok(cursor.into_inner())
}

/// Header fields read back from a WAV blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavHeader {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
    pub data_len: u32,
}

impl WavHeader {
    pub fn duration_secs(&self) -> f64 {
        let bytes_per_second =
            self.sample_rate as f64 * self.channels as f64 * (self.bits_per_sample as f64 / 8.0);
        if bytes_per_second == 0.0 {
            return 0.0;
        }
        self.data_len as f64 / bytes_per_second
    }
}

pub fn parse_wav_header(wav: &[u8]) -> Result<WavHeader, CodecError> {
    let reader = hound::WavReader::new(Cursor::new(wav))?;
    let spec = reader.spec();
    let data_len = reader.len() * u32::from(spec.bits_per_sample / 8);
    Ok(WavHeader {
        sample_rate: spec.sample_rate,
        channels: spec.channels,
        bits_per_sample: spec.bits_per_sample,
        data_len,
    })
}

/// Convert f32 samples to s16le bytes
fn f32_to_s16le_bytes(f32_samples: &[f32]) -> Vec<u8> {
    let mut s16le_bytes = Vec::with_capacity(f32_samples.len() * 2);

    for &sample in f32_samples {
        let clamped = sample.clamp(-1.0, 1.0);
        // 32768 keeps the i16 -> f32 -> i16 path exact; +1.0 saturates at 32767
        let i16_sample = (clamped * 32768.0).clamp(-32768.0, 32767.0) as i16;
        s16le_bytes.extend_from_slice(&i16_sample.to_le_bytes());
    }

    s16le_bytes
}
