use thiserror::Error;

/// Errors surfaced by capture requests and device backends.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CaptureError {
    /// The virtual stream could not be constructed. Never degraded to the
    /// real device.
    #[error("virtual capture unavailable: {0}")]
    CaptureUnavailable(String),

    #[error("permission denied")]
    PermissionDenied,

    #[error("device not available")]
    DeviceNotAvailable,

    #[error("configuration failed: {0}")]
    ConfigurationFailed(String),

    #[error("unknown error: {0}")]
    Unknown(String),
}

/// Errors produced while turning an encoded payload into an `AudioAsset`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("payload is not valid base64: {0}")]
    InvalidEncoding(String),

    #[error("payload of {size} bytes exceeds the {limit} byte limit")]
    PayloadTooLarge { size: usize, limit: usize },

    #[error("unsupported audio format: {0}")]
    Unsupported(String),

    #[error("no audio track found")]
    NoAudioTrack,

    #[error("decoded stream contains no samples")]
    Empty,

    #[error("malformed audio stream: {0}")]
    Malformed(String),

    /// A newer load was requested before this one finished.
    #[error("decode superseded by a newer request")]
    Superseded,
}
