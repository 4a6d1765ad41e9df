use serde::Serialize;

/// Severity attached to `EngineEvent::Log`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

impl Severity {
    pub fn as_log_level(&self) -> log::Level {
        match self {
            Self::Info | Self::Success => log::Level::Info,
            Self::Warning => log::Level::Warn,
            Self::Error => log::Level::Error,
        }
    }
}

/// Phase reported by `EngineEvent::Loading`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadingPhase {
    Start,
    Done,
    Fail,
}

/// Outbound notification emitted by the engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum EngineEvent {
    Log {
        message: String,
        severity: Severity,
    },
    Duration {
        seconds: f64,
    },
    Status {
        active: bool,
    },
    Loading {
        phase: LoadingPhase,
        name: Option<String>,
    },
    Seeked {
        fraction: f64,
    },
    PlaybackStarted,
    PlaybackPaused,
    PlaybackStopped,
    /// A non-looping track reached its natural end.
    PlaybackEnded,
}

impl EngineEvent {
    pub fn log(message: impl Into<String>, severity: Severity) -> Self {
        Self::Log {
            message: message.into(),
            severity,
        }
    }

    pub fn is_log(&self) -> bool {
        matches!(self, Self::Log { .. })
    }
}
