//! # virtual-mic-core
//!
//! Platform-agnostic virtual microphone engine.
//!
//! Decodes a user-supplied audio file, plays it through a controllable
//! transport into a live `VirtualStream`, and answers capture requests with
//! that stream instead of the physical microphone while injection is on.
//! Real-device backends implement `CaptureProvider` and plug into
//! `VirtualMicEngine`.
//!
//! ## Architecture
//!
//! ```text
//! virtual-mic-core (this crate)
//! ├── traits/       ← CaptureProvider, DeviceStream, EngineObserver, Clock
//! ├── models/       ← AudioAsset, EngineCommand, EngineEvent, EngineConfig, errors
//! ├── decoder/      ← AudioDecoder (base64 → symphonia → AudioAsset)
//! ├── processing/   ← PcmConverter, RingBuffer, WAV encoding
//! ├── graph/        ← SourceStage → GainStage → VirtualStream, StreamGraphBuilder
//! ├── notify/       ← NotificationBus
//! └── session/      ← PlaybackController, CaptureInterceptor, VirtualMicEngine
//! ```

pub mod decoder;
pub mod graph;
pub mod models;
pub mod notify;
pub mod processing;
pub mod session;
pub mod traits;

// Re-export key types at crate root for convenience.
pub use decoder::audio_decoder::{AudioDecoder, DecodeJob, DecodeOutcome, DecodeTicket};
pub use graph::builder::StreamGraphBuilder;
pub use graph::sink::VirtualStream;
pub use models::asset::AudioAsset;
pub use models::audio_models::{AudioSource, AudioTransportType};
pub use models::command::EngineCommand;
pub use models::config::EngineConfig;
pub use models::error::{CaptureError, DecodeError};
pub use models::events::{EngineEvent, LoadingPhase, Severity};
pub use models::request::{AudioConstraints, CaptureRequest};
pub use models::state::{PlaybackState, TransportSnapshot};
pub use notify::bus::{NotificationBus, SubscriptionId};
pub use processing::ring_buffer::RingBuffer;
pub use session::controller::PlaybackController;
pub use session::engine::{CommandOutcome, VirtualMicEngine};
pub use session::interceptor::{CaptureInterceptor, CapturedStream};
pub use traits::capture_provider::{CaptureProvider, DeviceStream};
pub use traits::clock::{Clock, ManualClock, MonotonicClock};
pub use traits::engine_observer::EngineObserver;
