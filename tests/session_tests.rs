// Integration tests for the session controller
//
// The remote service and the capture device are replaced by in-process
// mocks wired over channels, matching the trait boundaries the real
// collaborators sit behind.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use nova_voice::audio::capture::{CaptureBackend, CaptureChunk};
use nova_voice::audio::codec::{encode_frame, DecodedSegment};
use nova_voice::audio::playback::{OutputClock, PlaybackScheduler, PlaybackSink};
use nova_voice::session::{dispatch_message, SessionState, TurnBuffer, VoiceSession};
use nova_voice::transport::{
    LiveConnector, LiveSender, LiveSession, ModelTurn, Part, RealtimeInput, ServerContent,
    ServerMessage, SessionSetup, Transcription,
};
use nova_voice::{ChatMessage, Config, Role, VoiceError, WireBlob};
use tokio::sync::mpsc;

// ---------------------------------------------------------------------------
// Test doubles

struct NullSink;

impl PlaybackSink for NullSink {
    fn begin(&mut self, _source_id: u64, _segment: &DecodedSegment, _start_at: f64) {}
    fn halt(&mut self, _source_id: u64) {}
}

struct ZeroClock;

impl OutputClock for ZeroClock {
    fn now(&self) -> f64 {
        0.0
    }
}

fn test_scheduler() -> PlaybackScheduler {
    PlaybackScheduler::new(Box::new(ZeroClock), Box::new(NullSink))
}

#[derive(Clone, Default)]
struct MockBackend {
    chunk_tx: Arc<Mutex<Option<mpsc::Sender<CaptureChunk>>>>,
    capturing: Arc<AtomicBool>,
}

#[async_trait::async_trait]
impl CaptureBackend for MockBackend {
    async fn start(&mut self) -> Result<mpsc::Receiver<CaptureChunk>> {
        let (tx, rx) = mpsc::channel(8);
        *self.chunk_tx.lock().unwrap() = Some(tx);
        self.capturing.store(true, Ordering::SeqCst);
        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        self.capturing.store(false, Ordering::SeqCst);
        self.chunk_tx.lock().unwrap().take();
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        "mock"
    }
}

impl MockBackend {
    async fn inject(&self, samples: Vec<f32>) {
        let tx = self
            .chunk_tx
            .lock()
            .unwrap()
            .as_ref()
            .expect("backend not started")
            .clone();
        tx.send(CaptureChunk {
            samples,
            sample_rate: 16000,
            timestamp_ms: 0,
        })
        .await
        .unwrap();
    }
}

struct DeniedBackend;

#[async_trait::async_trait]
impl CaptureBackend for DeniedBackend {
    async fn start(&mut self) -> Result<mpsc::Receiver<CaptureChunk>> {
        Err(VoiceError::PermissionDenied.into())
    }

    async fn stop(&mut self) -> Result<()> {
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        false
    }

    fn name(&self) -> &str {
        "denied"
    }
}

#[derive(Clone, Default)]
struct MockConnector {
    server_tx: Arc<Mutex<Option<mpsc::Sender<ServerMessage>>>>,
    sent: Arc<Mutex<Vec<RealtimeInput>>>,
    closed: Arc<AtomicBool>,
    setup: Arc<Mutex<Option<SessionSetup>>>,
}

impl MockConnector {
    /// Push an inbound message as if the remote service sent it
    async fn inject(&self, message: ServerMessage) {
        let tx = self
            .server_tx
            .lock()
            .unwrap()
            .as_ref()
            .expect("no open session")
            .clone();
        tx.send(message).await.unwrap();
    }

    /// Simulate the remote side closing the session
    fn close_from_remote(&self) {
        self.server_tx.lock().unwrap().take();
    }
}

struct MockSender {
    sent: Arc<Mutex<Vec<RealtimeInput>>>,
    closed: Arc<AtomicBool>,
    server_tx: Arc<Mutex<Option<mpsc::Sender<ServerMessage>>>>,
}

#[async_trait::async_trait]
impl LiveConnector for MockConnector {
    async fn connect(&self, setup: SessionSetup) -> Result<LiveSession, VoiceError> {
        let (tx, inbound) = mpsc::channel(64);
        *self.server_tx.lock().unwrap() = Some(tx);
        *self.setup.lock().unwrap() = Some(setup);

        Ok(LiveSession {
            sender: Box::new(MockSender {
                sent: Arc::clone(&self.sent),
                closed: Arc::clone(&self.closed),
                server_tx: Arc::clone(&self.server_tx),
            }),
            inbound,
        })
    }
}

#[async_trait::async_trait]
impl LiveSender for MockSender {
    async fn send_realtime(&mut self, input: RealtimeInput) -> Result<(), VoiceError> {
        self.sent.lock().unwrap().push(input);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), VoiceError> {
        self.closed.store(true, Ordering::SeqCst);
        // Closing the session ends the inbound stream
        self.server_tx.lock().unwrap().take();
        Ok(())
    }
}

struct RefusingConnector;

#[async_trait::async_trait]
impl LiveConnector for RefusingConnector {
    async fn connect(&self, _setup: SessionSetup) -> Result<LiveSession, VoiceError> {
        Err(VoiceError::Connection("connection refused".to_string()))
    }
}

// ---------------------------------------------------------------------------
// Message builders

fn output_fragment(text: &str) -> ServerMessage {
    ServerMessage {
        server_content: Some(ServerContent {
            output_transcription: Some(Transcription {
                text: text.to_string(),
            }),
            ..Default::default()
        }),
    }
}

fn input_fragment(text: &str) -> ServerMessage {
    ServerMessage {
        server_content: Some(ServerContent {
            input_transcription: Some(Transcription {
                text: text.to_string(),
            }),
            ..Default::default()
        }),
    }
}

fn turn_complete() -> ServerMessage {
    ServerMessage {
        server_content: Some(ServerContent {
            turn_complete: true,
            ..Default::default()
        }),
    }
}

fn audio_message(samples: &[f32]) -> ServerMessage {
    audio_message_blob(encode_frame(samples, 24000))
}

fn audio_message_blob(blob: WireBlob) -> ServerMessage {
    ServerMessage {
        server_content: Some(ServerContent {
            model_turn: Some(ModelTurn {
                parts: vec![Part {
                    inline_data: Some(blob),
                }],
            }),
            ..Default::default()
        }),
    }
}

fn interrupted() -> ServerMessage {
    ServerMessage {
        server_content: Some(ServerContent {
            interrupted: true,
            ..Default::default()
        }),
    }
}

async fn wait_until<F: Fn() -> bool>(what: &str, predicate: F) {
    for _ in 0..100 {
        if predicate() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {}", what);
}

// ---------------------------------------------------------------------------
// Message dispatch (synchronous, no session needed)

#[test]
fn test_turn_completion_is_atomic() {
    let mut scheduler = test_scheduler();
    let mut turn = TurnBuffer::new();
    let mut log: Vec<ChatMessage> = Vec::new();

    // Assistant fragments interleaved with a user fragment, then the
    // turn-complete signal
    for message in [
        output_fragment("Hello "),
        input_fragment("Hi"),
        output_fragment("world"),
        turn_complete(),
    ] {
        dispatch_message(&message, &mut scheduler, &mut turn, &mut log, 24000);
    }

    assert_eq!(log.len(), 2);
    assert_eq!(log[0].role, Role::User);
    assert_eq!(log[0].text, "Hi");
    assert_eq!(log[1].role, Role::Assistant);
    assert_eq!(log[1].text, "Hello world");
    assert!(turn.is_empty());
}

#[test]
fn test_audio_payload_is_scheduled() {
    let mut scheduler = test_scheduler();
    let mut turn = TurnBuffer::new();
    let mut log = Vec::new();

    dispatch_message(
        &audio_message(&[0.1; 2400]),
        &mut scheduler,
        &mut turn,
        &mut log,
        24000,
    );

    assert_eq!(scheduler.active_len(), 1);
    assert!((scheduler.cursor() - 0.1).abs() < 1e-9);
}

#[test]
fn test_malformed_audio_chunk_is_dropped_not_fatal() {
    let mut scheduler = test_scheduler();
    let mut turn = TurnBuffer::new();
    let mut log = Vec::new();

    let bad = audio_message_blob(WireBlob {
        mime_type: "audio/pcm;rate=24000".to_string(),
        data: "!!! not base64 !!!".to_string(),
    });
    dispatch_message(&bad, &mut scheduler, &mut turn, &mut log, 24000);
    assert_eq!(scheduler.active_len(), 0);

    // Subsequent well-formed chunks still play
    dispatch_message(
        &audio_message(&[0.1; 240]),
        &mut scheduler,
        &mut turn,
        &mut log,
        24000,
    );
    assert_eq!(scheduler.active_len(), 1);
}

#[test]
fn test_interruption_flushes_playback() {
    let mut scheduler = test_scheduler();
    let mut turn = TurnBuffer::new();
    let mut log = Vec::new();

    dispatch_message(
        &audio_message(&[0.1; 2400]),
        &mut scheduler,
        &mut turn,
        &mut log,
        24000,
    );
    dispatch_message(
        &audio_message(&[0.2; 2400]),
        &mut scheduler,
        &mut turn,
        &mut log,
        24000,
    );
    assert_eq!(scheduler.active_len(), 2);

    dispatch_message(&interrupted(), &mut scheduler, &mut turn, &mut log, 24000);

    assert_eq!(scheduler.active_len(), 0);
    assert_eq!(scheduler.cursor(), 0.0);
}

#[test]
fn test_contentless_message_is_noop() {
    let mut scheduler = test_scheduler();
    let mut turn = TurnBuffer::new();
    let mut log = Vec::new();

    dispatch_message(
        &ServerMessage::default(),
        &mut scheduler,
        &mut turn,
        &mut log,
        24000,
    );

    assert!(log.is_empty());
    assert!(turn.is_empty());
    assert_eq!(scheduler.active_len(), 0);
}

// ---------------------------------------------------------------------------
// Session lifecycle

fn session_with(
    connector: MockConnector,
    backend: MockBackend,
) -> VoiceSession {
    VoiceSession::new(
        Config::default(),
        Arc::new(connector),
        Box::new(backend),
        test_scheduler(),
    )
}

#[tokio::test]
async fn test_start_reaches_listening() -> Result<()> {
    let connector = MockConnector::default();
    let backend = MockBackend::default();
    let session = session_with(connector.clone(), backend.clone());

    session.start().await?;

    assert_eq!(session.state().await, SessionState::Listening);
    assert_eq!(session.status().await, "Listening...");
    assert!(session.is_active());
    assert!(backend.is_capturing());

    let setup = connector.setup.lock().unwrap().clone().unwrap();
    assert_eq!(setup.voice_name, "Zephyr");
    assert!(setup.system_instruction.contains("friendly"));

    session.stop().await?;
    Ok(())
}

#[tokio::test]
async fn test_start_is_reentry_guarded() -> Result<()> {
    let connector = MockConnector::default();
    let session = session_with(connector.clone(), MockBackend::default());

    session.start().await?;
    // Second start while Listening is a no-op, not a second connect
    session.start().await?;

    assert_eq!(session.state().await, SessionState::Listening);

    session.stop().await?;
    Ok(())
}

#[tokio::test]
async fn test_permission_denied_surfaces_distinct_status() {
    let session = VoiceSession::new(
        Config::default(),
        Arc::new(MockConnector::default()),
        Box::new(DeniedBackend),
        test_scheduler(),
    );

    let result = session.start().await;
    assert!(result.is_err());
    assert_eq!(session.state().await, SessionState::Idle);
    assert_eq!(session.status().await, "Microphone access denied");
    assert!(!session.is_active());
}

#[tokio::test]
async fn test_connect_failure_releases_capture() {
    let backend = MockBackend::default();
    let session = VoiceSession::new(
        Config::default(),
        Arc::new(RefusingConnector),
        Box::new(backend.clone()),
        test_scheduler(),
    );

    let result = session.start().await;
    assert!(result.is_err());
    assert_eq!(session.state().await, SessionState::Idle);
    assert_eq!(session.status().await, "Failed to connect");
    // The partially-acquired capture stream must be released
    assert!(!backend.is_capturing());
}

#[tokio::test]
async fn test_stop_is_idempotent_and_safe_when_never_started() -> Result<()> {
    let session = session_with(MockConnector::default(), MockBackend::default());

    // Never started
    session.stop().await?;
    assert_eq!(session.state().await, SessionState::Idle);
    assert_eq!(session.status().await, "Ready");

    session.start().await?;
    session.stop().await?;
    session.stop().await?;

    assert_eq!(session.state().await, SessionState::Idle);
    assert_eq!(session.status().await, "Ready");
    assert!(!session.is_active());

    Ok(())
}

#[tokio::test]
async fn test_stop_closes_remote_handle() -> Result<()> {
    let connector = MockConnector::default();
    let session = session_with(connector.clone(), MockBackend::default());

    session.start().await?;
    assert!(!connector.closed.load(Ordering::SeqCst));

    session.stop().await?;
    assert!(
        connector.closed.load(Ordering::SeqCst),
        "stop must explicitly close the live session"
    );

    Ok(())
}

#[tokio::test]
async fn test_capture_frames_reach_transport() -> Result<()> {
    let connector = MockConnector::default();
    let backend = MockBackend::default();
    let session = session_with(connector.clone(), backend.clone());

    session.start().await?;

    // One frame's worth of samples must come out the other side encoded
    backend.inject(vec![0.25; 4096]).await;

    let sent = Arc::clone(&connector.sent);
    wait_until("capture frame to be forwarded", || {
        !sent.lock().unwrap().is_empty()
    })
    .await;

    let media = &connector.sent.lock().unwrap()[0].media;
    assert_eq!(media.mime_type, "audio/pcm;rate=16000");

    session.stop().await?;
    Ok(())
}

#[tokio::test]
async fn test_inbound_transcripts_build_chat_log() -> Result<()> {
    let connector = MockConnector::default();
    let session = session_with(connector.clone(), MockBackend::default());

    session.start().await?;

    connector.inject(input_fragment("What's the weather")).await;
    connector.inject(output_fragment("Sunny, ")).await;
    connector.inject(output_fragment("22 degrees")).await;
    connector.inject(turn_complete()).await;

    let mut log = Vec::new();
    for _ in 0..100 {
        log = session.messages().await;
        if !log.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert_eq!(log.len(), 2);
    assert_eq!(log[0].role, Role::User);
    assert_eq!(log[0].text, "What's the weather");
    assert_eq!(log[1].role, Role::Assistant);
    assert_eq!(log[1].text, "Sunny, 22 degrees");

    session.stop().await?;
    Ok(())
}

#[tokio::test]
async fn test_remote_close_tears_down_like_stop() -> Result<()> {
    let connector = MockConnector::default();
    let backend = MockBackend::default();
    let session = session_with(connector.clone(), backend.clone());

    session.start().await?;
    connector.close_from_remote();

    let active = session.activity();
    wait_until("session to deactivate", || !*active.borrow()).await;

    assert!(!session.is_active());
    assert_eq!(session.state().await, SessionState::Failed);
    assert_eq!(session.status().await, "Connection closed");
    assert!(!backend.is_capturing());

    // Explicit stop afterwards settles back to Idle
    session.stop().await?;
    assert_eq!(session.state().await, SessionState::Idle);

    Ok(())
}
