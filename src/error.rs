use thiserror::Error;

/// Error taxonomy for the voice pipeline.
///
/// `PermissionDenied` and `Connection` abort session start; `Decode` and
/// `Format` mark a single malformed inbound audio chunk, which is dropped
/// without ending the session.
#[derive(Debug, Error)]
pub enum VoiceError {
    /// Microphone capture permission was not granted
    #[error("microphone access denied")]
    PermissionDenied,

    /// Remote live session failed to open or errored mid-session
    #[error("live session connection failed: {0}")]
    Connection(String),

    /// Inbound audio payload was not valid base64
    #[error("invalid base64 audio payload")]
    Decode(#[from] base64::DecodeError),

    /// PCM byte stream is not aligned to whole sample frames
    #[error("PCM payload of {byte_len} bytes is not a multiple of the {frame_size}-byte sample frame")]
    Format { byte_len: usize, frame_size: usize },
}
