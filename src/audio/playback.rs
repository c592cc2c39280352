// Gapless playback scheduling for streamed synthesized audio
//
// Segments arrive at irregular real-time intervals (network jitter) but
// must play back-to-back with no gaps or overlaps, in arrival order.
// The scheduler keeps a single virtual timeline cursor and the set of
// sources that are playing or scheduled; a barge-in flush stops all of
// them at once and rewinds the cursor.

use std::collections::HashMap;
use std::time::Instant;

use tracing::{debug, info};

use super::codec::DecodedSegment;

/// Monotonic output-clock position in seconds
pub trait OutputClock: Send {
    fn now(&self) -> f64;
}

/// Wall output clock backed by `Instant`
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputClock for MonotonicClock {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

/// Output device boundary for scheduled playback
pub trait PlaybackSink: Send {
    /// Begin playing `segment` at `start_at` on the output clock
    fn begin(&mut self, source_id: u64, segment: &DecodedSegment, start_at: f64);

    /// Force-stop a source that is playing or scheduled
    fn halt(&mut self, source_id: u64);
}

/// Schedules decoded segments for gapless FIFO playback.
///
/// The cursor (`next_start_time`) and the active-source set are mutated
/// only through `enqueue`, `on_ended` and `flush`; treat those as mutually
/// exclusive critical sections.
pub struct PlaybackScheduler {
    clock: Box<dyn OutputClock>,
    sink: Box<dyn PlaybackSink>,
    /// Timeline position at which the next segment must begin
    next_start_time: f64,
    /// Segments currently playing or scheduled-but-not-finished
    active: HashMap<u64, DecodedSegment>,
    next_source_id: u64,
}

impl PlaybackScheduler {
    pub fn new(clock: Box<dyn OutputClock>, sink: Box<dyn PlaybackSink>) -> Self {
        Self {
            clock,
            sink,
            next_start_time: 0.0,
            active: HashMap::new(),
            next_source_id: 0,
        }
    }

    /// Schedule a segment to start exactly when the previous one ends.
    ///
    /// If the output clock has already advanced past the cursor (e.g.
    /// after a stall), the segment starts now instead of in the past.
    /// Returns the source id passed to the sink.
    pub fn enqueue(&mut self, segment: DecodedSegment) -> u64 {
        let start_at = self.next_start_time.max(self.clock.now());

        let source_id = self.next_source_id;
        self.next_source_id += 1;

        self.sink.begin(source_id, &segment, start_at);
        self.next_start_time = start_at + segment.duration_secs;
        self.active.insert(source_id, segment);

        debug!(
            source_id,
            start_at,
            cursor = self.next_start_time,
            active = self.active.len(),
            "Scheduled playback segment"
        );

        source_id
    }

    /// Natural-completion callback from the sink.
    ///
    /// A no-op for unknown ids: a flush may have already removed the
    /// source, and it must be removed exactly once on either path.
    pub fn on_ended(&mut self, source_id: u64) {
        if self.active.remove(&source_id).is_none() {
            debug!(source_id, "Completion for source no longer active");
        }
    }

    /// Force-stop all in-flight playback and rewind the cursor.
    ///
    /// Idempotent: flushing an empty set is a no-op.
    pub fn flush(&mut self) {
        if !self.active.is_empty() {
            info!(flushed = self.active.len(), "Flushing in-flight playback");
        }

        for source_id in self.active.keys().copied().collect::<Vec<_>>() {
            self.sink.halt(source_id);
        }
        self.active.clear();
        self.next_start_time = 0.0;
    }

    /// Current timeline cursor in output-clock seconds
    pub fn cursor(&self) -> f64 {
        self.next_start_time
    }

    /// Number of sources playing or scheduled
    pub fn active_len(&self) -> usize {
        self.active.len()
    }
}
