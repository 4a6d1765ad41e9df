use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for a virtual microphone engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    /// Output sample rate of the virtual stream in Hz (default: 48000).
    pub sample_rate: u32,

    /// Output channel count of the virtual stream (default: 2).
    pub channels: u16,

    /// Gain applied before any `SET_VOLUME` arrives (default: 1.0).
    pub initial_volume: f32,

    /// Whether freshly created engines loop the loaded track (default: false).
    pub loop_by_default: bool,

    /// Period of the read-only progress poll driven by the host (default: 100).
    pub progress_poll_interval_ms: u64,

    /// Largest decoded payload accepted by `LOAD_AUDIO`, in bytes (default: 64 MiB).
    pub max_payload_bytes: usize,

    /// Progress at which a non-looping track counts as ended for display (default: 0.99).
    pub ended_threshold: f64,
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), String> {
        if !(8_000..=192_000).contains(&self.sample_rate) {
            return Err(format!("unsupported sample rate: {}", self.sample_rate));
        }
        if ![1, 2].contains(&self.channels) {
            return Err(format!("unsupported channel count: {}", self.channels));
        }
        if !(0.0..=2.0).contains(&self.initial_volume) {
            return Err(format!("initial volume out of range: {}", self.initial_volume));
        }
        if self.progress_poll_interval_ms == 0 {
            return Err("progress poll interval must be positive".into());
        }
        if self.max_payload_bytes == 0 {
            return Err("max payload size must be positive".into());
        }
        if !(0.0..=1.0).contains(&self.ended_threshold) {
            return Err(format!("ended threshold out of range: {}", self.ended_threshold));
        }
        Ok(())
    }

    pub fn progress_poll_interval(&self) -> Duration {
        Duration::from_millis(self.progress_poll_interval_ms)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            channels: 2,
            initial_volume: 1.0,
            loop_by_default: false,
            progress_poll_interval_ms: 100,
            max_payload_bytes: 64 * 1024 * 1024,
            ended_threshold: 0.99,
        }
    }
}
