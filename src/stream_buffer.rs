use crate::downsample::downsample;
use crate::kinematics::KinematicSample;

/// Full-resolution recording plus the bounded live stream.
///
/// Every appended sample lands in the raw buffer (kept for export) and in
/// the flush buffer. Once the flush buffer holds `flush_threshold` samples it
/// is reduced to `downsample_to` samples and emptied.
#[derive(Debug, Clone)]
pub struct StreamBuffer {
    raw: Vec<KinematicSample>,
    pending: Vec<KinematicSample>,
    flush_threshold: usize,
    downsample_to: usize,
    flush_on_first_sample: bool,
    flushes: u64,
}

impl StreamBuffer {
    pub fn new(flush_threshold: usize, downsample_to: usize) -> Self {
        Self {
            raw: Vec::new(),
            pending: Vec::with_capacity(flush_threshold),
            flush_threshold: flush_threshold.max(1),
            downsample_to,
            flush_on_first_sample: false,
            flushes: 0,
        }
    }

    /// Emit the very first sample of a recording immediately so a live chart
    /// has something to draw before the first full flush.
    pub fn with_first_sample_flush(mut self, enabled: bool) -> Self {
        self.flush_on_first_sample = enabled;
        self
    }

    /// Append a sample, returning the reduced batch when a flush is due
    pub fn push(&mut self, sample: KinematicSample) -> Option<Vec<KinematicSample>> {
        self.raw.push(sample);
        self.pending.push(sample);

        let first_sample = self.flush_on_first_sample && self.raw.len() == 1;
        if first_sample || self.pending.len() >= self.flush_threshold {
            return Some(self.flush());
        }
        None
    }

    fn flush(&mut self) -> Vec<KinematicSample> {
        let batch = downsample(&self.pending, self.downsample_to);
        log::debug!(
            "[stream] flushing {} of {} samples ({} raw)",
            batch.len(),
            self.pending.len(),
            self.raw.len()
        );
        self.pending.clear();
        self.flushes += 1;
        batch
    }

    /// Every sample since the last clear
    pub fn raw_series(&self) -> &[KinematicSample] {
        &self.raw
    }

    /// Samples waiting for the next flush
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn flush_count(&self) -> u64 {
        self.flushes
    }

    /// Drop both buffers (session restart)
    pub fn clear(&mut self) {
        self.raw.clear();
        self.pending.clear();
    }
}
