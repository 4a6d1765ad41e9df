//! # virtual-mic-cpal
//!
//! cpal backend for virtual-mic.
//!
//! Provides:
//! - `CpalMicProvider`: real microphone passthrough via a cpal input stream
//! - `list_input_devices`: input device enumeration
//! - `SpeakerMonitor`: plays a `VirtualStream` to the default output device
//!
//! ## Usage
//! ```ignore
//! use virtual_mic_core::{EngineConfig, VirtualMicEngine};
//! use virtual_mic_cpal::{CpalMicProvider, SpeakerMonitor};
//!
//! let mut engine = VirtualMicEngine::new(EngineConfig::default(), Box::new(CpalMicProvider::default_device()))?;
//! let stream = engine.activate_injection()?;
//! let _monitor = SpeakerMonitor::start(stream)?;
//! ```

pub mod devices;
pub mod mic;
pub mod monitor;

pub use devices::list_input_devices;
pub use mic::{CpalDeviceStream, CpalMicProvider};
pub use monitor::SpeakerMonitor;
