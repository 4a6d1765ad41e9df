use serde::Serialize;

/// Playback transport state machine.
///
/// ```text
/// Idle → Loaded → Playing ⇄ Paused
///           ↑        │         │
///           └─ stop ─┴─────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum PlaybackState {
    /// No asset loaded.
    Idle,
    /// Asset present, stopped.
    Loaded,
    Playing,
    Paused,
}

impl PlaybackState {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    pub fn is_playing(&self) -> bool {
        matches!(self, Self::Playing)
    }

    pub fn is_paused(&self) -> bool {
        matches!(self, Self::Paused)
    }

    /// Whether a source may currently be attached to the sink.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Playing | Self::Paused)
    }
}

/// Point-in-time copy of the transport, safe to hand to hosts.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportSnapshot {
    pub state: PlaybackState,
    pub paused_offset_secs: f64,
    pub duration_secs: Option<f64>,
    pub progress: f64,
    pub loop_enabled: bool,
    pub volume: f32,
    pub injection_active: bool,
}
