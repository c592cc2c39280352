use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::VoiceError;

/// Transport-ready encoding of one audio frame (base64 16-bit LE PCM)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireBlob {
    pub mime_type: String,
    /// Base64-encoded PCM bytes
    pub data: String,
}

/// A playable audio buffer decoded from a wire payload
#[derive(Debug, Clone)]
pub struct DecodedSegment {
    /// Normalized samples in [-1.0, 1.0], interleaved if multi-channel
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
    /// Playback duration in seconds
    pub duration_secs: f64,
}

/// Encode one frame of normalized f32 samples as base64 16-bit LE PCM.
///
/// Samples outside [-1.0, 1.0] are clamped rather than rejected, so this
/// never fails for well-formed input.
pub fn encode_frame(samples: &[f32], sample_rate: u32) -> WireBlob {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        let scaled = (sample as f64 * 32768.0).clamp(i16::MIN as f64, i16::MAX as f64) as i16;
        bytes.extend_from_slice(&scaled.to_le_bytes());
    }

    WireBlob {
        mime_type: format!("audio/pcm;rate={}", sample_rate),
        data: STANDARD.encode(&bytes),
    }
}

/// Decode a base64 audio payload to raw PCM bytes
pub fn decode_base64(data: &str) -> Result<Vec<u8>, VoiceError> {
    Ok(STANDARD.decode(data)?)
}

/// Reinterpret raw bytes as 16-bit LE PCM and rescale to a playable
/// f32 buffer at the given sample rate and channel layout.
pub fn decode_segment(
    bytes: &[u8],
    sample_rate: u32,
    channels: u16,
) -> Result<DecodedSegment, VoiceError> {
    let frame_size = 2 * channels as usize;
    if frame_size == 0 || bytes.len() % frame_size != 0 {
        return Err(VoiceError::Format {
            byte_len: bytes.len(),
            frame_size,
        });
    }

    let samples: Vec<f32> = bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32768.0)
        .collect();

    let duration_secs = samples.len() as f64 / (sample_rate as f64 * channels as f64);

    Ok(DecodedSegment {
        samples,
        sample_rate,
        channels,
        duration_secs,
    })
}
