use std::sync::Arc;

use uuid::Uuid;

/// Decoded PCM audio ready for playback.
///
/// Immutable once built. Loading a new file replaces the whole asset; the
/// sample data is shared behind an `Arc` so graph stages can hold it without
/// copying.
#[derive(Debug, Clone)]
pub struct AudioAsset {
    id: Uuid,
    name: Option<String>,
    samples: Arc<[f32]>,
    sample_rate: u32,
    channels: u16,
    duration_secs: f64,
}

impl AudioAsset {
    /// Build an asset from interleaved f32 samples.
    ///
    /// Trailing samples that do not fill a whole frame are dropped.
    pub fn new(samples: Vec<f32>, sample_rate: u32, channels: u16, name: Option<String>) -> Self {
        let channels = channels.max(1);
        let mut samples = samples;
        let whole = samples.len() - samples.len() % channels as usize;
        samples.truncate(whole);

        let frames = samples.len() / channels as usize;
        let duration_secs = if sample_rate == 0 {
            0.0
        } else {
            frames as f64 / sample_rate as f64
        };

        Self {
            id: Uuid::new_v4(),
            name,
            samples: samples.into(),
            sample_rate,
            channels,
            duration_secs,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Interleaved samples, `channels` per frame.
    pub fn samples(&self) -> &Arc<[f32]> {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn frame_count(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    pub fn duration_secs(&self) -> f64 {
        self.duration_secs
    }
}
