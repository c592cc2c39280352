pub mod audio;
pub mod config;
pub mod error;
pub mod session;
pub mod transport;
pub mod viz;

pub use audio::{
    decode_base64, decode_segment, encode_frame, CaptureBackend, CaptureChunk, CapturePipeline,
    DecodedSegment, FrameSlicer, MonotonicClock, OutputClock, PlaybackScheduler, PlaybackSink,
    ToneBackend, WireBlob, FRAME_SAMPLES,
};
pub use config::{Config, VoicePreset, VoiceSettings};
pub use error::VoiceError;
pub use session::{dispatch_message, ChatMessage, Role, SessionState, TurnBuffer, VoiceSession};
pub use transport::{
    LiveConnector, LiveSender, LiveSession, RealtimeInput, ServerMessage, SessionSetup,
};
pub use viz::{DrawSurface, Visualizer};
