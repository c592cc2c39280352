use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::codec::{self, WireBlob};

/// Samples per encoded frame handed to the transport
pub const FRAME_SAMPLES: usize = 4096;

/// Points in the amplitude window published to the visualizer
pub const AMPLITUDE_POINTS: usize = 128;

/// Raw capture data delivered by a device callback (mono, normalized
/// f32, arbitrary length)
#[derive(Debug, Clone)]
pub struct CaptureChunk {
    pub samples: Vec<f32>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Milliseconds since capture started
    pub timestamp_ms: u64,
}

/// A fixed-length slice of the capture stream, ready for encoding
#[derive(Debug, Clone)]
pub struct AudioFrame {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

/// Microphone capture backend trait
///
/// Implementations own the underlying device stream. A denied capture
/// permission surfaces from `start` as `VoiceError::PermissionDenied`.
#[async_trait::async_trait]
pub trait CaptureBackend: Send + Sync {
    /// Start capturing audio
    ///
    /// Returns a channel receiver that will receive capture chunks
    async fn start(&mut self) -> Result<mpsc::Receiver<CaptureChunk>>;

    /// Stop capturing and release the device stream
    async fn stop(&mut self) -> Result<()>;

    /// Check if backend is currently capturing
    fn is_capturing(&self) -> bool;

    /// Get backend name for logging
    fn name(&self) -> &str;
}

/// Accumulates arbitrary-length capture chunks into fixed-length frames,
/// carrying remainders over to the next chunk
pub struct FrameSlicer {
    frame_len: usize,
    pending: Vec<f32>,
}

impl FrameSlicer {
    pub fn new(frame_len: usize) -> Self {
        Self {
            frame_len,
            pending: Vec::with_capacity(frame_len),
        }
    }

    /// Feed samples in; returns every frame completed by this chunk
    pub fn push(&mut self, samples: &[f32]) -> Vec<Vec<f32>> {
        self.pending.extend_from_slice(samples);

        let mut frames = Vec::new();
        while self.pending.len() >= self.frame_len {
            let rest = self.pending.split_off(self.frame_len);
            frames.push(std::mem::replace(&mut self.pending, rest));
        }
        frames
    }

    /// Samples buffered but not yet forming a whole frame
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

/// Steady-state capture pipeline: slices the live stream into frames,
/// encodes each through the codec, and forwards the result outbound.
///
/// The outbound channel is bounded; if the transport side falls behind,
/// the newest frame is dropped rather than blocking the capture path.
/// A pre-encoding amplitude tap feeds the visualizer and never delays
/// the frame delivered downstream.
pub struct CapturePipeline {
    slicer: FrameSlicer,
    outbound_tx: mpsc::Sender<WireBlob>,
    amplitude_tx: Arc<watch::Sender<Vec<f32>>>,
    frames_forwarded: u64,
    frames_dropped: u64,
}

impl CapturePipeline {
    pub fn new(
        frame_len: usize,
        outbound_tx: mpsc::Sender<WireBlob>,
        amplitude_tx: Arc<watch::Sender<Vec<f32>>>,
    ) -> Self {
        Self {
            slicer: FrameSlicer::new(frame_len),
            outbound_tx,
            amplitude_tx,
            frames_forwarded: 0,
            frames_dropped: 0,
        }
    }

    /// Consume capture chunks until the backend closes the channel
    pub async fn run(mut self, mut chunk_rx: mpsc::Receiver<CaptureChunk>) {
        info!("Capture pipeline started");

        while let Some(chunk) = chunk_rx.recv().await {
            self.process(&chunk);
        }

        info!(
            forwarded = self.frames_forwarded,
            dropped = self.frames_dropped,
            "Capture pipeline stopped"
        );
    }

    /// Handle one capture callback worth of samples
    pub fn process(&mut self, chunk: &CaptureChunk) {
        // Amplitude tap first, on the raw samples
        self.amplitude_tx
            .send_replace(amplitude_window(&chunk.samples));

        for samples in self.slicer.push(&chunk.samples) {
            let frame = AudioFrame {
                samples,
                sample_rate: chunk.sample_rate,
            };
            self.forward(frame);
        }
    }

    fn forward(&mut self, frame: AudioFrame) {
        let blob = codec::encode_frame(&frame.samples, frame.sample_rate);

        match self.outbound_tx.try_send(blob) {
            Ok(()) => {
                self.frames_forwarded += 1;
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                // Drop-newest: the capture path must never block
                self.frames_dropped += 1;
                warn!(
                    dropped = self.frames_dropped,
                    "Outbound channel full, dropping capture frame"
                );
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("Outbound channel closed, discarding capture frame");
            }
        }
    }
}

/// Downsample a chunk to a fixed-size window of amplitude points
fn amplitude_window(samples: &[f32]) -> Vec<f32> {
    if samples.is_empty() {
        return Vec::new();
    }

    let step = samples.len().div_ceil(AMPLITUDE_POINTS).max(1);
    samples.iter().step_by(step).copied().collect()
}

/// Deterministic sine-wave capture backend for demos and tests
///
/// Emits mono chunks on a real-time cadence, phase-continuous across
/// chunks, until stopped.
pub struct ToneBackend {
    frequency_hz: f32,
    sample_rate: u32,
    chunk_samples: usize,
    is_capturing: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl ToneBackend {
    pub fn new(frequency_hz: f32, sample_rate: u32, chunk_samples: usize) -> Self {
        Self {
            frequency_hz,
            sample_rate,
            chunk_samples,
            is_capturing: Arc::new(AtomicBool::new(false)),
            task: None,
        }
    }
}

#[async_trait::async_trait]
impl CaptureBackend for ToneBackend {
    async fn start(&mut self) -> Result<mpsc::Receiver<CaptureChunk>> {
        let (tx, rx) = mpsc::channel(8);

        self.is_capturing.store(true, Ordering::SeqCst);

        let is_capturing = Arc::clone(&self.is_capturing);
        let frequency = self.frequency_hz;
        let sample_rate = self.sample_rate;
        let chunk_samples = self.chunk_samples;

        let chunk_duration =
            Duration::from_secs_f64(chunk_samples as f64 / sample_rate as f64);

        self.task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(chunk_duration);
            let mut sample_index: u64 = 0;

            while is_capturing.load(Ordering::SeqCst) {
                ticker.tick().await;

                let samples: Vec<f32> = (0..chunk_samples)
                    .map(|i| {
                        let t = (sample_index + i as u64) as f32 / sample_rate as f32;
                        (2.0 * std::f32::consts::PI * frequency * t).sin() * 0.5
                    })
                    .collect();

                let timestamp_ms = sample_index * 1000 / sample_rate as u64;
                sample_index += chunk_samples as u64;

                let chunk = CaptureChunk {
                    samples,
                    sample_rate,
                    timestamp_ms,
                };

                if tx.send(chunk).await.is_err() {
                    break;
                }
            }
        }));

        info!(frequency, sample_rate, "Tone capture backend started");
        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        self.is_capturing.store(false, Ordering::SeqCst);

        if let Some(task) = self.task.take() {
            task.await.ok();
        }

        info!("Tone capture backend stopped");
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.is_capturing.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        "tone"
    }
}
