use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use uuid::Uuid;

use super::source::{GainStage, SourceStage};

/// How far a reader may run ahead of or behind the playhead before it is
/// snapped back to it.
pub const RESYNC_TOLERANCE_SECS: f64 = 0.25;

struct SinkInner {
    id: Uuid,
    sample_rate: u32,
    channels: u16,
    gain: GainStage,
    source: Mutex<Option<Arc<SourceStage>>>,
    frames_delivered: AtomicU64,
}

/// Where one handle is reading, and in which source.
#[derive(Debug, Default)]
struct ReadCursor {
    generation: Option<u64>,
    frame: usize,
}

/// Handle to the engine's output sink: the stream handed to capture callers.
///
/// Every handle refers to the same sink but reads through its own cursor,
/// so each holder hears the whole track rather than a share of it. A cursor
/// starts at the playhead and follows it: a holder that reads late, or a new
/// source after seek or replay, snaps it to the clock position. The sink
/// outlives any source attached to it, so holders keep receiving audio across
/// pause, seek and replay without re-subscribing. With no source attached it
/// produces silence.
///
/// Cloning yields a new holder with a fresh cursor.
pub struct VirtualStream {
    inner: Arc<SinkInner>,
    cursor: Mutex<ReadCursor>,
}

impl Clone for VirtualStream {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            cursor: Mutex::new(ReadCursor::default()),
        }
    }
}

impl VirtualStream {
    pub(crate) fn new(sample_rate: u32, channels: u16, gain: f32) -> Self {
        Self {
            inner: Arc::new(SinkInner {
                id: Uuid::new_v4(),
                sample_rate,
                channels,
                gain: GainStage::new(gain),
                source: Mutex::new(None),
                frames_delivered: AtomicU64::new(0),
            }),
            cursor: Mutex::new(ReadCursor::default()),
        }
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn sample_rate(&self) -> u32 {
        self.inner.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.inner.channels
    }

    /// Gain currently applied by the gain stage.
    pub fn gain(&self) -> f32 {
        self.inner.gain.get()
    }

    /// Whether `other` refers to the same sink.
    pub fn same_stream(&self, other: &VirtualStream) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn has_source(&self) -> bool {
        self.inner.source.lock().is_some()
    }

    /// Frames handed out across all holders.
    pub fn frames_delivered(&self) -> u64 {
        self.inner.frames_delivered.load(Ordering::Relaxed)
    }

    /// Fill `out` with interleaved samples: source → gain, silence where the
    /// source has nothing. Returns the number of samples written, which is
    /// `out.len()` rounded down to whole frames.
    pub fn read(&self, out: &mut [f32]) -> usize {
        let channels = self.inner.channels.max(1) as usize;
        let len = out.len() - out.len() % channels;
        let out = &mut out[..len];

        let source = self.inner.source.lock().clone();
        let rendered = match source {
            Some(source) => self.render(&source, out),
            None => 0,
        };
        out[rendered..].fill(0.0);
        self.inner.gain.apply(&mut out[..rendered]);

        self.inner
            .frames_delivered
            .fetch_add((len / channels) as u64, Ordering::Relaxed);
        len
    }

    fn render(&self, source: &SourceStage, out: &mut [f32]) -> usize {
        let mut cursor = self.cursor.lock();
        let playhead = source.position_frames();
        let tolerance = (RESYNC_TOLERANCE_SECS * self.inner.sample_rate as f64) as usize;

        let start = match cursor.generation {
            Some(generation)
                if generation == source.generation()
                    && source.distance_frames(cursor.frame, playhead) <= tolerance =>
            {
                cursor.frame
            }
            _ => playhead,
        };

        let (written, next) = source.render_from(start, out);
        cursor.generation = Some(source.generation());
        cursor.frame = next;
        written
    }

    pub(crate) fn set_gain(&self, gain: f32) {
        self.inner.gain.set(gain);
    }

    /// Swap in a new source, returning the previous one (still running).
    pub(crate) fn attach_source(&self, source: Arc<SourceStage>) -> Option<Arc<SourceStage>> {
        self.inner.source.lock().replace(source)
    }

    pub(crate) fn detach_source(&self) -> Option<Arc<SourceStage>> {
        self.inner.source.lock().take()
    }

    pub(crate) fn source(&self) -> Option<Arc<SourceStage>> {
        self.inner.source.lock().clone()
    }
}

impl std::fmt::Debug for VirtualStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VirtualStream")
            .field("id", &self.inner.id)
            .field("sample_rate", &self.inner.sample_rate)
            .field("channels", &self.inner.channels)
            .field("gain", &self.gain())
            .finish()
    }
}
