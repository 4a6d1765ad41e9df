use serde::{Deserialize, Serialize};

/// Inbound command from the orchestration layer, one per engine operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EngineCommand {
    LoadAudio {
        /// Base64 text of the original compressed file.
        #[serde(rename = "audioData")]
        audio_data: String,
        #[serde(default)]
        name: Option<String>,
    },
    StartInjection,
    StopInjection,
    SetVolume {
        #[serde(alias = "volume")]
        value: f32,
    },
    Play,
    Pause,
    Stop,
    Seek {
        fraction: f64,
    },
    SetLoop {
        #[serde(rename = "loop", alias = "value")]
        enabled: bool,
    },
}
