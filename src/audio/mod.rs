pub mod capture;
pub mod codec;
pub mod playback;

pub use capture::{
    AudioFrame, CaptureBackend, CaptureChunk, CapturePipeline, FrameSlicer, ToneBackend,
    AMPLITUDE_POINTS, FRAME_SAMPLES,
};
pub use codec::{decode_base64, decode_segment, encode_frame, DecodedSegment, WireBlob};
pub use playback::{MonotonicClock, OutputClock, PlaybackScheduler, PlaybackSink};
