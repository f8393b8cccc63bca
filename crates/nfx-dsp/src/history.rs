//! Waveform history
//!
//! A fixed-capacity circular buffer the audio thread feeds one sample at a
//! time while a display thread reads arbitrary windows of the recent past.
//! The write cursor and the samples are atomics with relaxed ordering: the
//! reader may see a cursor one sample ahead of or behind the data it
//! indexes, which shows up as at most a one-sample glitch in the display.
//! Nothing here ever blocks the writer.

use nfx_core::{atomic_buffer, lerp, AtomicSample, Sample};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Lock-free single-writer / single-reader sample history
#[derive(Debug)]
pub struct HistoryBuffer {
    data: Box<[AtomicSample]>,
    write_index: AtomicUsize,
    /// Samples fed so far, saturating at capacity
    filled: AtomicUsize,
}

impl HistoryBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            data: atomic_buffer(capacity),
            write_index: AtomicUsize::new(0),
            filled: AtomicUsize::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Number of valid samples (at most `capacity`)
    pub fn filled(&self) -> usize {
        self.filled.load(Ordering::Relaxed)
    }

    /// Index of the most recently written sample
    pub fn write_index(&self) -> usize {
        self.write_index.load(Ordering::Relaxed)
    }

    /// Append one sample
    #[inline]
    pub fn feed(&self, sample: Sample) {
        // Compute the wrapped index before publishing so a concurrent reader
        // never observes an out-of-range cursor.
        let mut w = self.write_index.load(Ordering::Relaxed) + 1;
        if w == self.data.len() {
            w = 0;
        }
        self.data[w].set(sample);
        self.write_index.store(w, Ordering::Relaxed);
        self.bump_filled(1);
    }

    /// Append `frames` samples taken every `stride` values from `buf`
    pub fn feed_interleaved(&self, buf: &[Sample], frames: usize, stride: usize) {
        let stride = stride.max(1);
        let frames = frames.min(buf.len().div_ceil(stride));
        let len = self.data.len();
        let mut w = self.write_index.load(Ordering::Relaxed);
        for &sample in buf.iter().step_by(stride).take(frames) {
            w += 1;
            if w == len {
                w = 0;
            }
            self.data[w].set(sample);
        }
        self.write_index.store(w, Ordering::Relaxed);
        self.bump_filled(frames);
    }

    fn bump_filled(&self, count: usize) {
        let filled = self.filled.load(Ordering::Relaxed);
        if filled < self.data.len() {
            self.filled
                .store((filled + count).min(self.data.len()), Ordering::Relaxed);
        }
    }

    /// Resample a window of the recent past into `out`.
    ///
    /// The first `out.len() - 1` slots receive points spaced
    /// `source_count / (out.len() - 1)` samples apart, walking backward from
    /// the newest sample after skipping `offset` samples; the newest point
    /// lands in the last of those slots. Values between stored samples are
    /// linearly interpolated. The walk stops at the start of the filled
    /// history; unproduced slots are zeroed.
    ///
    /// The final slot of `out` receives the number of points produced, which
    /// is also returned.
    pub fn read_buffer(&self, out: &mut [Sample], source_count: f32, offset: f32) -> usize {
        let Some((count_slot, points)) = out.split_last_mut() else {
            return 0;
        };
        let target = points.len();
        if target == 0 {
            *count_slot = 0.0;
            return 0;
        }

        let len = self.data.len();
        // Oldest point that still has its older neighbour inside the history
        let last = self.filled() as f32 - 1.0;
        let speed = source_count.max(0.0) / target as f32;
        // May be one sample stale relative to the data; see module docs.
        let w = self.write_index() as f32;

        let mut p = offset.max(0.0);
        let mut produced = 0;
        while produced < target && p <= last {
            let mut f = w - p;
            if f < 0.0 {
                f += len as f32;
            }
            let i = (f.floor() as usize).min(len - 1);
            let s1 = self.data[i].get();
            let s2 = self.data[if i + 1 == len { 0 } else { i + 1 }].get();
            points[target - 1 - produced] = lerp(s1, s2, f - i as f32);
            produced += 1;
            p += speed;
        }
        points[..target - produced].fill(0.0);

        *count_slot = produced as Sample;
        produced
    }

    /// Copy the most recent `out.len()` samples, oldest first
    pub fn latest(&self, out: &mut [Sample]) {
        let len = self.data.len();
        let mut w = self.write_index();
        for dst in out.iter_mut().rev() {
            *dst = self.data[w].get();
            w = if w == 0 { len - 1 } else { w - 1 };
        }
    }

    pub fn clear(&self) {
        self.data.iter().for_each(|s| s.set(0.0));
        self.filled.store(0, Ordering::Relaxed);
    }
}
