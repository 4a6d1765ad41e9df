use crate::models::asset::AudioAsset;

/// Converts decoded audio into the virtual stream's output format.
///
/// All operations work on interleaved `f32` buffers. Resampling is linear
/// interpolation per channel, which is plenty for speech and music played
/// into a capture pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmConverter {
    pub target_sample_rate: u32,
    pub target_channels: u16,
}

impl PcmConverter {
    pub fn new(target_sample_rate: u32, target_channels: u16) -> Self {
        Self {
            target_sample_rate,
            target_channels: target_channels.max(1),
        }
    }

    /// Channel-map then resample an asset into the target format.
    pub fn conform(&self, asset: &AudioAsset) -> Vec<f32> {
        let mapped = remap_channels(asset.samples(), asset.channels(), self.target_channels);
        self.resample(&mapped, asset.sample_rate())
    }

    /// Resample interleaved audio already in the target channel layout.
    ///
    /// Returns the input unchanged if rates match.
    pub fn resample(&self, samples: &[f32], source_sample_rate: u32) -> Vec<f32> {
        if source_sample_rate == self.target_sample_rate
            || source_sample_rate == 0
            || samples.is_empty()
        {
            return samples.to_vec();
        }

        let channels = self.target_channels as usize;
        let frame_count = samples.len() / channels;
        let ratio = self.target_sample_rate as f64 / source_sample_rate as f64;
        let output_frames = (frame_count as f64 * ratio) as usize;
        if output_frames == 0 {
            return Vec::new();
        }

        let mut output = vec![0.0f32; output_frames * channels];
        for i in 0..output_frames {
            let source_index = i as f64 / ratio;
            let index = source_index as usize;
            let fraction = (source_index - index as f64) as f32;

            for ch in 0..channels {
                let current = samples[index.min(frame_count - 1) * channels + ch];
                output[i * channels + ch] = if index + 1 < frame_count {
                    let next = samples[(index + 1) * channels + ch];
                    current * (1.0 - fraction) + next * fraction
                } else {
                    current
                };
            }
        }
        output
    }
}

/// Average all channels of each frame into one.
pub fn downmix_to_mono(samples: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }
    let scale = 1.0 / channels as f32;
    samples
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() * scale)
        .collect()
}

/// Change the channel count of interleaved audio.
///
/// Mono fans out to every output channel; anything to mono is averaged;
/// otherwise leading channels are kept and missing ones repeat the source
/// layout.
pub fn remap_channels(samples: &[f32], from: u16, to: u16) -> Vec<f32> {
    let from = from.max(1) as usize;
    let to = to.max(1) as usize;
    if from == to {
        return samples.to_vec();
    }
    if to == 1 {
        return downmix_to_mono(samples, from);
    }

    let frame_count = samples.len() / from;
    let mut output = Vec::with_capacity(frame_count * to);
    for frame in samples.chunks_exact(from) {
        for ch in 0..to {
            output.push(frame[ch % from]);
        }
    }
    output
}
