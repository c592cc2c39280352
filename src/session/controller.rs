use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::transcript::{ChatMessage, TurnBuffer};
use crate::audio::capture::{CaptureBackend, CapturePipeline, FRAME_SAMPLES};
use crate::audio::codec::{decode_base64, decode_segment};
use crate::audio::playback::PlaybackScheduler;
use crate::config::Config;
use crate::error::VoiceError;
use crate::transport::{LiveConnector, LiveSender, LiveSession, RealtimeInput, ServerMessage};

/// Encoded frames buffered toward the transport before drop-newest kicks in
const OUTBOUND_QUEUE: usize = 32;

/// Session lifecycle state; only the controller transitions it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Listening,
    /// Stopped on a transport error or unsolicited close
    Failed,
}

/// Apply one inbound server message to the session's mutable state.
///
/// Transcript fragments append to the turn buffer; a turn-complete
/// signal drains both slots atomically into the log (user first); an
/// audio payload is decoded and enqueued; a malformed payload is dropped
/// without ending the session; an interruption flushes all playback.
pub fn dispatch_message(
    message: &ServerMessage,
    scheduler: &mut PlaybackScheduler,
    turn: &mut TurnBuffer,
    log: &mut Vec<ChatMessage>,
    output_sample_rate: u32,
) {
    let Some(content) = message.server_content.as_ref() else {
        return;
    };

    if let Some(transcription) = &content.output_transcription {
        turn.push_assistant(&transcription.text);
    } else if let Some(transcription) = &content.input_transcription {
        turn.push_user(&transcription.text);
    }

    if content.turn_complete {
        let (user, assistant) = turn.drain();
        log.push(user);
        log.push(assistant);
    }

    if let Some(blob) = message.inline_audio() {
        match decode_base64(&blob.data)
            .and_then(|bytes| decode_segment(&bytes, output_sample_rate, 1))
        {
            Ok(segment) => {
                scheduler.enqueue(segment);
            }
            Err(e) => {
                warn!("Dropping malformed inbound audio chunk: {}", e);
            }
        }
    }

    if content.interrupted {
        scheduler.flush();
    }
}

/// Everything the spawned tasks and teardown paths share
#[derive(Clone)]
struct Shared {
    backend: Arc<Mutex<Box<dyn CaptureBackend>>>,
    scheduler: Arc<Mutex<PlaybackScheduler>>,
    /// Single-owner handle to the open remote session
    sender: Arc<Mutex<Option<Box<dyn LiveSender>>>>,
    state: Arc<Mutex<SessionState>>,
    status: Arc<Mutex<String>>,
    is_active: Arc<AtomicBool>,
    activity_tx: Arc<watch::Sender<bool>>,
    turn_buffer: Arc<Mutex<TurnBuffer>>,
    messages: Arc<Mutex<Vec<ChatMessage>>>,
}

impl Shared {
    /// Release session resources and settle into `end_state`.
    ///
    /// Safe on every path: the sender slot yields the handle at most
    /// once, backend stop and scheduler flush are idempotent.
    async fn teardown(&self, end_state: SessionState, status: &str) {
        self.activity_tx.send_replace(false);

        if let Some(mut sender) = self.sender.lock().await.take() {
            if let Err(e) = sender.close().await {
                warn!("Failed to close live session: {}", e);
            }
        }

        if let Err(e) = self.backend.lock().await.stop().await {
            warn!("Failed to stop capture backend: {}", e);
        }

        self.scheduler.lock().await.flush();

        *self.state.lock().await = end_state;
        *self.status.lock().await = status.to_string();
    }
}

/// Orchestrates the voice pipeline: capture, transport, playback and
/// transcripts, with a guarded start/stop lifecycle.
pub struct VoiceSession {
    config: Config,
    connector: Arc<dyn LiveConnector>,
    shared: Shared,
    amplitude_tx: Arc<watch::Sender<Vec<f32>>>,
    capture_task: Arc<Mutex<Option<JoinHandle<()>>>>,
    forward_task: Arc<Mutex<Option<JoinHandle<()>>>>,
    dispatch_task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl VoiceSession {
    pub fn new(
        config: Config,
        connector: Arc<dyn LiveConnector>,
        backend: Box<dyn CaptureBackend>,
        scheduler: PlaybackScheduler,
    ) -> Self {
        let (activity_tx, _) = watch::channel(false);
        let (amplitude_tx, _) = watch::channel(Vec::new());

        Self {
            config,
            connector,
            shared: Shared {
                backend: Arc::new(Mutex::new(backend)),
                scheduler: Arc::new(Mutex::new(scheduler)),
                sender: Arc::new(Mutex::new(None)),
                state: Arc::new(Mutex::new(SessionState::Idle)),
                status: Arc::new(Mutex::new("Ready".to_string())),
                is_active: Arc::new(AtomicBool::new(false)),
                activity_tx: Arc::new(activity_tx),
                turn_buffer: Arc::new(Mutex::new(TurnBuffer::new())),
                messages: Arc::new(Mutex::new(Vec::new())),
            },
            amplitude_tx: Arc::new(amplitude_tx),
            capture_task: Arc::new(Mutex::new(None)),
            forward_task: Arc::new(Mutex::new(None)),
            dispatch_task: Arc::new(Mutex::new(None)),
        }
    }

    /// Start the session: acquire the capture stream, open the remote
    /// session, and wire capture to outbound and inbound to playback.
    ///
    /// Guarded against re-entry while Connecting or Listening. Any
    /// failure releases partially-acquired resources and lands in Idle
    /// with a user-visible status.
    pub async fn start(&self) -> Result<()> {
        {
            let mut state = self.shared.state.lock().await;
            if matches!(*state, SessionState::Connecting | SessionState::Listening) {
                warn!("Session already active, ignoring start");
                return Ok(());
            }
            *state = SessionState::Connecting;
        }
        *self.shared.status.lock().await = "Connecting...".to_string();

        info!("Starting voice session");

        // Capture permission and device stream
        let chunk_rx = {
            let mut backend = self.shared.backend.lock().await;
            match backend.start().await {
                Ok(rx) => rx,
                Err(e) => {
                    let status = match e.downcast_ref::<VoiceError>() {
                        Some(VoiceError::PermissionDenied) => "Microphone access denied",
                        _ => "Failed to start microphone",
                    };
                    self.abort_start(status).await;
                    return Err(e);
                }
            }
        };

        // Open the remote session
        let live = match self.connector.connect(self.config.session_setup()).await {
            Ok(live) => live,
            Err(e) => {
                // Release the already-acquired capture stream
                if let Err(stop_err) = self.shared.backend.lock().await.stop().await {
                    warn!("Failed to release capture backend: {}", stop_err);
                }
                self.abort_start("Failed to connect").await;
                return Err(e.into());
            }
        };

        let LiveSession { sender, inbound } = live;
        *self.shared.sender.lock().await = Some(sender);

        self.shared.is_active.store(true, Ordering::SeqCst);
        self.shared.activity_tx.send_replace(true);

        // Capture pipeline: device chunks in, encoded frames out
        let (encoded_tx, encoded_rx) = mpsc::channel(OUTBOUND_QUEUE);
        let pipeline =
            CapturePipeline::new(FRAME_SAMPLES, encoded_tx, Arc::clone(&self.amplitude_tx));
        *self.capture_task.lock().await = Some(tokio::spawn(pipeline.run(chunk_rx)));

        *self.forward_task.lock().await =
            Some(tokio::spawn(Self::forward_loop(self.shared.clone(), encoded_rx)));

        *self.dispatch_task.lock().await = Some(tokio::spawn(Self::dispatch_loop(
            self.shared.clone(),
            inbound,
            self.config.output_sample_rate,
        )));

        *self.shared.state.lock().await = SessionState::Listening;
        *self.shared.status.lock().await = "Listening...".to_string();

        info!("Voice session started");
        Ok(())
    }

    /// Stop the session and release all resources.
    ///
    /// Idempotent; safe when never started and safe to call repeatedly.
    pub async fn stop(&self) -> Result<()> {
        if self.shared.is_active.swap(false, Ordering::SeqCst) {
            info!("Stopping voice session");
        }

        self.shared.teardown(SessionState::Idle, "Ready").await;
        self.join_tasks().await;

        Ok(())
    }

    async fn abort_start(&self, status: &str) {
        warn!("Session start failed: {}", status);
        *self.shared.state.lock().await = SessionState::Idle;
        *self.shared.status.lock().await = status.to_string();
    }

    async fn join_tasks(&self) {
        let mut tasks = Vec::new();
        for slot in [&self.capture_task, &self.forward_task, &self.dispatch_task] {
            if let Some(task) = slot.lock().await.take() {
                tasks.push(task);
            }
        }

        for result in futures::future::join_all(tasks).await {
            if let Err(e) = result {
                error!("Session task panicked: {}", e);
            }
        }
    }

    /// Pull encoded frames off the capture pipeline and stream them out
    async fn forward_loop(
        shared: Shared,
        mut encoded_rx: mpsc::Receiver<crate::audio::codec::WireBlob>,
    ) {
        info!("Outbound forwarding task started");

        while let Some(media) = encoded_rx.recv().await {
            if !shared.is_active.load(Ordering::SeqCst) {
                break;
            }

            let mut slot = shared.sender.lock().await;
            let Some(sender) = slot.as_mut() else {
                break;
            };

            if let Err(e) = sender.send_realtime(RealtimeInput { media }).await {
                error!("Failed to send capture frame: {}", e);
                break;
            }
        }

        info!("Outbound forwarding task stopped");
    }

    /// Apply inbound messages until the remote closes the stream
    async fn dispatch_loop(
        shared: Shared,
        mut inbound: mpsc::Receiver<ServerMessage>,
        output_sample_rate: u32,
    ) {
        info!("Inbound dispatch task started");

        while let Some(message) = inbound.recv().await {
            if !shared.is_active.load(Ordering::SeqCst) {
                break;
            }

            let mut scheduler = shared.scheduler.lock().await;
            let mut turn = shared.turn_buffer.lock().await;
            let mut log = shared.messages.lock().await;
            dispatch_message(
                &message,
                &mut scheduler,
                &mut turn,
                &mut log,
                output_sample_rate,
            );
        }

        // Unsolicited close or transport error: same teardown as stop()
        if shared.is_active.swap(false, Ordering::SeqCst) {
            warn!("Live session closed by remote");
            shared
                .teardown(SessionState::Failed, "Connection closed")
                .await;
        }

        info!("Inbound dispatch task stopped");
    }

    pub async fn state(&self) -> SessionState {
        *self.shared.state.lock().await
    }

    pub async fn status(&self) -> String {
        self.shared.status.lock().await.clone()
    }

    pub fn is_active(&self) -> bool {
        self.shared.is_active.load(Ordering::SeqCst)
    }

    /// Finalized transcript log so far
    pub async fn messages(&self) -> Vec<ChatMessage> {
        self.shared.messages.lock().await.clone()
    }

    /// Live amplitude window for the visualizer
    pub fn amplitude(&self) -> watch::Receiver<Vec<f32>> {
        self.amplitude_tx.subscribe()
    }

    /// Session-active flag the visualizer keys its loop off
    pub fn activity(&self) -> watch::Receiver<bool> {
        self.shared.activity_tx.subscribe()
    }

    /// Scheduler handle for output-device completion callbacks
    pub fn scheduler(&self) -> Arc<Mutex<PlaybackScheduler>> {
        Arc::clone(&self.shared.scheduler)
    }
}
