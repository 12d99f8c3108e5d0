use nusantara_newsroom::codec::{
    build_wav_container, decode_to_sample_buffer, decode_transport_blob, encode_to_transport_blob,
    parse_wav_header, CodecError, TransportBlob, CAPTURE_SAMPLE_RATE, SYNTHESIS_SAMPLE_RATE,
    WAV_HEADER_LEN,
};
use std::io::Cursor;

fn u32_at(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

fn u16_at(bytes: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([bytes[offset], bytes[offset + 1]])
}

#[test]
fn test_capture_frame_encodes_to_expected_length() {
    // 4096 samples -> 8192 bytes -> ceil(8192 / 3) * 4 base64 characters
    let frame = vec![0.25f32; 4096];
    let blob = encode_to_transport_blob(&frame, CAPTURE_SAMPLE_RATE);

    assert_eq!(blob.mime_type, "audio/pcm;rate=16000");
    assert_eq!(blob.data.len(), 10924);
    assert_eq!(blob.encoded_len(), 10924);
    assert_eq!(decode_transport_blob(&blob).unwrap().len(), 8192);
}

#[test]
fn test_round_trip_within_quantization() {
    let samples: Vec<f32> = (0..480)
        .map(|i| (i as f32 * 0.05).sin() * 0.8)
        .collect();

    let blob = encode_to_transport_blob(&samples, SYNTHESIS_SAMPLE_RATE);
    let bytes = decode_transport_blob(&blob).unwrap();
    let buffer = decode_to_sample_buffer(&bytes, SYNTHESIS_SAMPLE_RATE, 1).unwrap();

    assert_eq!(buffer.frames(), samples.len());
    for (decoded, original) in buffer.samples().iter().zip(&samples) {
        assert!((decoded - original).abs() <= 1.0 / 32768.0 + f32::EPSILON);
    }
}

#[test]
fn test_silence_stays_silent() {
    let blob = encode_to_transport_blob(&[0.0; 64], CAPTURE_SAMPLE_RATE);
    let bytes = decode_transport_blob(&blob).unwrap();
    assert!(bytes.iter().all(|&b| b == 0));
}

#[test]
fn test_malformed_transport_data() {
    let blob = TransportBlob {
        mime_type: "audio/pcm;rate=24000".to_string(),
        data: "not*base64!".to_string(),
    };
    assert!(matches!(
        decode_transport_blob(&blob),
        Err(CodecError::MalformedTransportData(_))
    ));
}

#[test]
fn test_stereo_buffer_deinterleaves() {
    // L: 0x4000 (0.5), R: 0xC000 (-0.5)
    let bytes = [0x00, 0x40, 0x00, 0xC0, 0x00, 0x40, 0x00, 0xC0];
    let buffer = decode_to_sample_buffer(&bytes, 24_000, 2).unwrap();

    assert_eq!(buffer.frames(), 2);
    assert_eq!(buffer.channel_data(0), vec![0.5, 0.5]);
    assert_eq!(buffer.channel_data(1), vec![-0.5, -0.5]);
}

#[test]
fn test_wav_header_layout() {
    let pcm: Vec<u8> = (0..200u8).collect();
    let wav = build_wav_container(&pcm, 24_000).unwrap();

    assert_eq!(wav.len(), WAV_HEADER_LEN + pcm.len());
    assert_eq!(&wav[0..4], b"RIFF");
    assert_eq!(u32_at(&wav, 4), 36 + pcm.len() as u32);
    assert_eq!(&wav[8..12], b"WAVE");
    assert_eq!(&wav[12..16], b"fmt ");
    assert_eq!(u32_at(&wav, 16), 16);
    assert_eq!(u16_at(&wav, 20), 1); // PCM
    assert_eq!(u16_at(&wav, 22), 1); // mono
    assert_eq!(u32_at(&wav, 24), 24_000);
    assert_eq!(u32_at(&wav, 28), 48_000); // byte rate
    assert_eq!(u16_at(&wav, 32), 2); // block align
    assert_eq!(u16_at(&wav, 34), 16);
    assert_eq!(&wav[36..40], b"data");
    assert_eq!(u32_at(&wav, 40), pcm.len() as u32);
    assert_eq!(&wav[WAV_HEADER_LEN..], &pcm[..]);
}

#[test]
fn test_wav_container_is_reproducible() {
    let pcm = vec![1u8, 2, 3, 4, 5, 6];
    assert_eq!(
        build_wav_container(&pcm, 24_000).unwrap(),
        build_wav_container(&pcm, 24_000).unwrap()
    );
}

#[test]
fn test_wav_reads_back_with_hound() {
    let samples: [i16; 4] = [0, 1000, -1000, i16::MAX];
    let pcm: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
    let wav = build_wav_container(&pcm, 24_000).unwrap();

    let mut reader = hound::WavReader::new(Cursor::new(&wav)).unwrap();
    let spec = reader.spec();
    assert_eq!(spec.channels, 1);
    assert_eq!(spec.sample_rate, 24_000);
    assert_eq!(spec.bits_per_sample, 16);

    let read: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
    assert_eq!(read, samples);

    let header = parse_wav_header(&wav).unwrap();
    assert_eq!(header.data_len, 8);
    assert!((header.duration_secs() - 4.0 / 24_000.0).abs() < 1e-9);
}

#[test]
fn test_empty_payload_gives_header_only_wav() {
    let wav = build_wav_container(&[], 24_000).unwrap();
    assert_eq!(wav.len(), WAV_HEADER_LEN);
    assert_eq!(u32_at(&wav, 4), 36);
    assert_eq!(u32_at(&wav, 40), 0);
}

#[test]
fn test_odd_payload_rejected() {
    assert!(matches!(
        build_wav_container(&[1, 2, 3], 24_000),
        Err(CodecError::UnsupportedFormat(_))
    ));
}
