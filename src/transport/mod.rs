// Remote live-session boundary
//
// The conversational-AI service is an external collaborator; this module
// specifies only its interface: a connector that opens a session, a
// sender for outbound realtime input, and a channel of inbound messages.

pub mod messages;

pub use messages::{ModelTurn, Part, RealtimeInput, ServerContent, ServerMessage, Transcription};

use tokio::sync::mpsc;

use crate::error::VoiceError;

/// Session parameters sent to the service on connect
#[derive(Debug, Clone)]
pub struct SessionSetup {
    pub model: String,
    /// Named voice preset for synthesized speech
    pub voice_name: String,
    /// System instruction with the configured tone folded in
    pub system_instruction: String,
    /// BCP-47 language tag
    pub language: String,
}

/// An open live session: the single-owner handle to the remote service.
///
/// The sender and the inbound channel are both invalidated by
/// `LiveSender::close`; implementations must close the inbound channel
/// when the session closes (or errors) so consumers observe the end of
/// the stream.
pub struct LiveSession {
    pub sender: Box<dyn LiveSender>,
    pub inbound: mpsc::Receiver<ServerMessage>,
}

/// Opens live sessions against the remote service
#[async_trait::async_trait]
pub trait LiveConnector: Send + Sync {
    async fn connect(&self, setup: SessionSetup) -> Result<LiveSession, VoiceError>;
}

/// Outbound half of an open live session
#[async_trait::async_trait]
pub trait LiveSender: Send {
    /// Stream one encoded capture frame to the service
    async fn send_realtime(&mut self, input: RealtimeInput) -> Result<(), VoiceError>;

    /// Close the session and release the remote handle
    async fn close(&mut self) -> Result<(), VoiceError>;
}
