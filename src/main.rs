use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tokio::sync::mpsc;
use tracing::{debug, info};

use nova_voice::audio::codec::DecodedSegment;
use nova_voice::transport::{
    LiveConnector, LiveSender, LiveSession, ModelTurn, Part, RealtimeInput, ServerContent,
    ServerMessage, SessionSetup, Transcription,
};
use nova_voice::{
    Config, DrawSurface, MonotonicClock, PlaybackScheduler, PlaybackSink, ToneBackend,
    VoiceError, VoiceSession, Visualizer,
};

#[derive(Parser, Debug)]
#[command(name = "nova-voice", about = "Real-time voice assistant pipeline")]
struct Args {
    /// Path to a config file (TOML); defaults apply when omitted
    #[arg(short, long)]
    config: Option<String>,

    /// How long to run the demo session, in seconds
    #[arg(short, long, default_value_t = 5)]
    duration: u64,
}

/// Loopback service double: echoes capture audio back as model audio
/// and fabricates transcript fragments with periodic turn boundaries.
struct LoopbackConnector;

struct LoopbackSender {
    inbound_tx: Option<mpsc::Sender<ServerMessage>>,
    frames: u64,
}

#[async_trait::async_trait]
impl LiveConnector for LoopbackConnector {
    async fn connect(&self, setup: SessionSetup) -> Result<LiveSession, VoiceError> {
        info!(model = %setup.model, voice = %setup.voice_name, "Loopback session opened");

        let (inbound_tx, inbound) = mpsc::channel(64);
        let sender = Box::new(LoopbackSender {
            inbound_tx: Some(inbound_tx),
            frames: 0,
        });

        Ok(LiveSession { sender, inbound })
    }
}

#[async_trait::async_trait]
impl LiveSender for LoopbackSender {
    async fn send_realtime(&mut self, input: RealtimeInput) -> Result<(), VoiceError> {
        let Some(tx) = self.inbound_tx.as_ref() else {
            return Err(VoiceError::Connection("session closed".to_string()));
        };

        self.frames += 1;

        let mut content = ServerContent {
            model_turn: Some(ModelTurn {
                parts: vec![Part {
                    inline_data: Some(input.media),
                }],
            }),
            ..Default::default()
        };

        if self.frames % 4 == 0 {
            content.input_transcription = Some(Transcription {
                text: "(you) ".to_string(),
            });
        } else {
            content.output_transcription = Some(Transcription {
                text: "(nova) ".to_string(),
            });
        }
        content.turn_complete = self.frames % 8 == 0;

        tx.send(ServerMessage {
            server_content: Some(content),
        })
        .await
        .map_err(|_| VoiceError::Connection("session closed".to_string()))
    }

    async fn close(&mut self) -> Result<(), VoiceError> {
        // Dropping the inbound sender closes the message stream
        self.inbound_tx.take();
        Ok(())
    }
}

/// Playback sink that only logs scheduling decisions
struct LogSink;

impl PlaybackSink for LogSink {
    fn begin(&mut self, source_id: u64, segment: &DecodedSegment, start_at: f64) {
        debug!(
            source_id,
            start_at,
            duration = segment.duration_secs,
            "Playback segment scheduled"
        );
    }

    fn halt(&mut self, source_id: u64) {
        debug!(source_id, "Playback segment halted");
    }
}

/// Terminal amplitude meter
struct MeterSurface;

impl DrawSurface for MeterSurface {
    fn draw_polyline(&mut self, points: &[(f32, f32)]) {
        let peak = points
            .iter()
            .map(|(_, y)| (y - 50.0).abs() / 50.0)
            .fold(0.0f32, f32::max);

        let filled = ((peak * 30.0).round() as usize).min(30);
        print!("\r[{}{}]", "#".repeat(filled), " ".repeat(30 - filled));
        std::io::Write::flush(&mut std::io::stdout()).ok();
    }

    fn clear(&mut self) {
        println!();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    let cfg = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    info!("Nova Voice v0.1.0");
    info!(
        "Voice: {}, tone: {}, language: {}",
        cfg.voice.voice_name.as_str(),
        cfg.voice.tone,
        cfg.voice.language
    );

    let backend = Box::new(ToneBackend::new(220.0, cfg.input_sample_rate, 1600));
    let scheduler = PlaybackScheduler::new(Box::new(MonotonicClock::new()), Box::new(LogSink));
    let session = VoiceSession::new(cfg, Arc::new(LoopbackConnector), backend, scheduler);

    session.start().await?;
    info!("Session status: {}", session.status().await);

    let visualizer = Visualizer::new(
        Box::new(MeterSurface),
        session.amplitude(),
        session.activity(),
    );
    let viz_task = tokio::spawn(visualizer.run());

    tokio::time::sleep(Duration::from_secs(args.duration)).await;

    session.stop().await?;
    viz_task.await?;

    for message in session.messages().await {
        info!("[{:?}] {}", message.role, message.text);
    }
    info!("Session status: {}", session.status().await);

    Ok(())
}
