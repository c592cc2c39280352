use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::transport::SessionSetup;

/// Default live model identifier
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash-native-audio-preview-12-2025";

/// Capture device sample rate (Hz)
pub const INPUT_SAMPLE_RATE: u32 = 16_000;

/// Playback device sample rate (Hz)
pub const OUTPUT_SAMPLE_RATE: u32 = 24_000;

/// Named synthesized-voice presets offered by the service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VoicePreset {
    Zephyr,
    Puck,
    Charon,
    Kore,
    Fenrir,
}

impl VoicePreset {
    pub fn as_str(&self) -> &'static str {
        match self {
            VoicePreset::Zephyr => "Zephyr",
            VoicePreset::Puck => "Puck",
            VoicePreset::Charon => "Charon",
            VoicePreset::Kore => "Kore",
            VoicePreset::Fenrir => "Fenrir",
        }
    }
}

/// Voice identity and delivery settings, supplied by the settings UI
/// and read-only here
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceSettings {
    pub voice_name: VoicePreset,
    /// Free-text tone descriptor folded into the system instruction
    pub tone: String,
    /// BCP-47 language tag
    pub language: String,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            voice_name: VoicePreset::Zephyr,
            tone: "friendly".to_string(),
            language: "en-US".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub model: String,
    pub voice: VoiceSettings,
    pub input_sample_rate: u32,
    pub output_sample_rate: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            voice: VoiceSettings::default(),
            input_sample_rate: INPUT_SAMPLE_RATE,
            output_sample_rate: OUTPUT_SAMPLE_RATE,
        }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    /// Build the connect-time session parameters from these settings
    pub fn session_setup(&self) -> SessionSetup {
        SessionSetup {
            model: self.model.clone(),
            voice_name: self.voice.voice_name.as_str().to_string(),
            system_instruction: format!(
                "You are Nova, a world-class assistant. Your tone is {}. \
                 Always be helpful, concise, and friendly.",
                self.voice.tone
            ),
            language: self.voice.language.clone(),
        }
    }
}
