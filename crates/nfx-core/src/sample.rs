//! Sample types shared between the audio and UI threads

use std::sync::atomic::{AtomicU32, Ordering};

/// Type alias for audio samples (the host exchanges interleaved `f32` buffers)
pub type Sample = f32;

/// Lock-free `f32` cell.
///
/// Stores the bit pattern in an `AtomicU32`. All accesses use relaxed
/// ordering: a reader may see a value that is one write behind, never a
/// torn float.
#[derive(Debug, Default)]
pub struct AtomicSample {
    bits: AtomicU32,
}

impl AtomicSample {
    pub fn new(value: Sample) -> Self {
        Self {
            bits: AtomicU32::new(value.to_bits()),
        }
    }

    #[inline]
    pub fn get(&self) -> Sample {
        f32::from_bits(self.bits.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn set(&self, value: Sample) {
        self.bits.store(value.to_bits(), Ordering::Relaxed);
    }
}

/// Allocate a zeroed slice of atomic samples
pub fn atomic_buffer(len: usize) -> Box<[AtomicSample]> {
    (0..len).map(|_| AtomicSample::new(0.0)).collect()
}

/// Linear interpolation between two samples
#[inline]
pub fn lerp(a: Sample, b: Sample, t: Sample) -> Sample {
    a + (b - a) * t
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_atomic_sample() {
        let cell = AtomicSample::new(0.25);
        assert_eq!(cell.get(), 0.25);
        cell.set(-1.5);
        assert_eq!(cell.get(), -1.5);
    }

    #[test]
    fn test_atomic_buffer_is_zeroed() {
        let buf = atomic_buffer(16);
        assert_eq!(buf.len(), 16);
        assert!(buf.iter().all(|s| s.get() == 0.0));
    }

    #[test]
    fn test_lerp() {
        assert_eq!(lerp(1.0, 3.0, 0.5), 2.0);
        assert_eq!(lerp(1.0, 3.0, 0.0), 1.0);
    }
}
