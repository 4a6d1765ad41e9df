/// Circular sample buffer between a device callback and a pulling reader.
///
/// Wrap in `Arc<parking_lot::Mutex<RingBuffer>>` for cross-thread access.
/// When the reader falls behind, the oldest samples are overwritten so the
/// reader always hears the most recent audio.
#[derive(Debug)]
pub struct RingBuffer {
    buffer: Vec<f32>,
    write_index: usize,
    read_index: usize,
    available: usize,
    dropped: u64,
}

impl RingBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: vec![0.0; capacity.max(1)],
            write_index: 0,
            read_index: 0,
            available: 0,
            dropped: 0,
        }
    }

    fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Append samples, overwriting the oldest ones on overflow.
    pub fn push(&mut self, samples: &[f32]) {
        let capacity = self.capacity();
        let samples = if samples.len() > capacity {
            self.dropped += (samples.len() - capacity) as u64;
            &samples[samples.len() - capacity..]
        } else {
            samples
        };

        let overflow = (self.available + samples.len()).saturating_sub(capacity);
        if overflow > 0 {
            self.read_index = (self.read_index + overflow) % capacity;
            self.available -= overflow;
            self.dropped += overflow as u64;
        }

        for &sample in samples {
            self.buffer[self.write_index] = sample;
            self.write_index = (self.write_index + 1) % capacity;
        }
        self.available += samples.len();
    }

    /// Move up to `out.len()` samples into `out`. Returns the count moved.
    pub fn pop_into(&mut self, out: &mut [f32]) -> usize {
        let capacity = self.capacity();
        let count = out.len().min(self.available);
        for (i, slot) in out.iter_mut().take(count).enumerate() {
            *slot = self.buffer[(self.read_index + i) % capacity];
        }
        self.read_index = (self.read_index + count) % capacity;
        self.available -= count;
        count
    }

    pub fn len(&self) -> usize {
        self.available
    }

    pub fn is_empty(&self) -> bool {
        self.available == 0
    }

    /// Samples lost to overflow since creation.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn clear(&mut self) {
        self.write_index = 0;
        self.read_index = 0;
        self.available = 0;
    }
}
