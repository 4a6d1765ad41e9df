use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use crate::traits::clock::Clock;

static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

/// One-shot playback of a PCM buffer, like a buffer source node.
///
/// The playhead is not advanced by readers. It is derived from the clock:
/// frame 0 of the track sits at `origin_secs`, so the position at any
/// instant is `(now - origin) * rate`, wrapped when looping and held at the
/// end otherwise. Readers keep their own cursors and render from the shared,
/// immutable PCM, so any number of them hear the same audio.
///
/// A source is started once and stopped once. Seeking or replaying builds a
/// fresh source with a new generation; the sink stays the same.
pub struct SourceStage {
    generation: u64,
    pcm: Arc<[f32]>,
    channels: usize,
    sample_rate: u32,
    clock: Arc<dyn Clock>,
    origin_bits: AtomicU64,
    looping: AtomicBool,
    stopped: AtomicBool,
}

impl SourceStage {
    /// `pcm` must already be in the sink's channel layout and rate.
    pub fn new(
        pcm: Arc<[f32]>,
        channels: u16,
        sample_rate: u32,
        clock: Arc<dyn Clock>,
        origin_secs: f64,
        looping: bool,
    ) -> Self {
        Self {
            generation: NEXT_GENERATION.fetch_add(1, Ordering::Relaxed),
            pcm,
            channels: channels.max(1) as usize,
            sample_rate,
            clock,
            origin_bits: AtomicU64::new(origin_secs.to_bits()),
            looping: AtomicBool::new(looping),
            stopped: AtomicBool::new(false),
        }
    }

    /// Distinguishes this source from any other attached to the same sink.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn total_frames(&self) -> usize {
        self.pcm.len() / self.channels
    }

    pub fn origin_secs(&self) -> f64 {
        f64::from_bits(self.origin_bits.load(Ordering::Acquire))
    }

    /// Move the clock anchor without touching readers.
    pub fn set_origin(&self, origin_secs: f64) {
        self.origin_bits.store(origin_secs.to_bits(), Ordering::Release);
    }

    /// Frames elapsed since the origin, unwrapped.
    fn elapsed_frames(&self) -> usize {
        let elapsed = (self.clock.now_secs() - self.origin_secs()).max(0.0);
        // Absorbs float error right at frame boundaries.
        (elapsed * self.sample_rate as f64 + 1e-6).floor() as usize
    }

    /// Playhead according to the clock.
    pub fn position_frames(&self) -> usize {
        let total = self.total_frames();
        let elapsed = self.elapsed_frames();
        if self.is_looping() && total > 0 {
            elapsed % total
        } else {
            elapsed.min(total)
        }
    }

    pub fn set_loop(&self, looping: bool) {
        self.looping.store(looping, Ordering::Release);
    }

    pub fn is_looping(&self) -> bool {
        self.looping.load(Ordering::Acquire)
    }

    /// Stop producing samples. Returns `false` if it was already stopped.
    pub fn stop(&self) -> bool {
        !self.stopped.swap(true, Ordering::AcqRel)
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Whether a non-looping source has played past its last frame.
    pub fn is_finished(&self) -> bool {
        !self.is_looping() && self.elapsed_frames() >= self.total_frames()
    }

    /// Frames between two cursors, measured around the loop when looping.
    pub fn distance_frames(&self, a: usize, b: usize) -> usize {
        let direct = a.abs_diff(b);
        let total = self.total_frames();
        if self.is_looping() && total > 0 {
            direct.min(total - direct.min(total))
        } else {
            direct
        }
    }

    /// Copy raw (pre-gain) samples starting at frame `cursor` into `out`.
    ///
    /// Returns the number of samples written and the cursor after them.
    /// Unwritten slots are left as they were.
    pub fn render_from(&self, cursor: usize, out: &mut [f32]) -> (usize, usize) {
        if self.is_stopped() {
            return (0, cursor);
        }

        let total_frames = self.total_frames();
        let wanted_frames = out.len() / self.channels;
        let mut cursor = cursor;
        let mut written_frames = 0;

        while written_frames < wanted_frames {
            if cursor >= total_frames {
                if self.is_looping() && total_frames > 0 {
                    cursor = 0;
                } else {
                    break;
                }
            }
            let frames = (wanted_frames - written_frames).min(total_frames - cursor);
            let dst = written_frames * self.channels;
            let src = cursor * self.channels;
            let len = frames * self.channels;
            out[dst..dst + len].copy_from_slice(&self.pcm[src..src + len]);
            cursor += frames;
            written_frames += frames;
        }

        (written_frames * self.channels, cursor)
    }
}

/// Live gain applied between source and sink, readable from audio threads.
#[derive(Debug)]
pub struct GainStage {
    bits: AtomicU32,
}

impl GainStage {
    pub fn new(gain: f32) -> Self {
        Self {
            bits: AtomicU32::new(gain.to_bits()),
        }
    }

    pub fn set(&self, gain: f32) {
        self.bits.store(gain.to_bits(), Ordering::Release);
    }

    pub fn get(&self) -> f32 {
        f32::from_bits(self.bits.load(Ordering::Acquire))
    }

    pub fn apply(&self, samples: &mut [f32]) {
        let gain = self.get();
        if gain != 1.0 {
            samples.iter_mut().for_each(|s| *s *= gain);
        }
    }
}
