pub mod controller;
pub mod transcript;

pub use controller::{dispatch_message, SessionState, VoiceSession};
pub use transcript::{ChatMessage, Role, TurnBuffer};
