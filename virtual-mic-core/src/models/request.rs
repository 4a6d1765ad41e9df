use serde::{Deserialize, Serialize};

/// Audio part of a capture request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AudioConstraints {
    pub device_id: Option<String>,
    pub channel_count: Option<u16>,
    pub echo_cancellation: Option<bool>,
}

/// A request to the host environment for live capture streams.
///
/// Mirrors a media-capture constraint set: `audio` absent means no audio
/// was asked for.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureRequest {
    pub audio: Option<AudioConstraints>,
    pub video: bool,
}

impl CaptureRequest {
    pub fn audio() -> Self {
        Self {
            audio: Some(AudioConstraints::default()),
            video: false,
        }
    }

    pub fn video() -> Self {
        Self {
            audio: None,
            video: true,
        }
    }

    pub fn audio_video() -> Self {
        Self {
            audio: Some(AudioConstraints::default()),
            video: true,
        }
    }

    pub fn wants_audio(&self) -> bool {
        self.audio.is_some()
    }

    pub fn wants_video(&self) -> bool {
        self.video
    }

    /// The same request with its audio part removed.
    pub fn without_audio(&self) -> Self {
        Self {
            audio: None,
            video: self.video,
        }
    }
}
