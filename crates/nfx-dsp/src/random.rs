//! Deterministic 32-bit LCG
//!
//! Cheap enough to call per sample for denormal dither, and reproducible per
//! seed so synthetic impulse responses are stable across rebuilds.

/// Linear congruential generator with an xor-shift output stage
#[derive(Debug, Clone)]
pub struct Random {
    seed: u32,
}

impl Default for Random {
    fn default() -> Self {
        Self::new(0)
    }
}

impl Random {
    pub fn new(seed: u32) -> Self {
        Self { seed }
    }

    pub fn seed(&mut self, seed: u32) {
        self.seed = seed;
    }

    #[inline]
    pub fn next_u32(&mut self) -> u32 {
        self.seed = self.seed.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
        self.seed ^ (self.seed >> 16)
    }

    /// Uniform value in `[min, max]` with 24 bits of resolution
    #[inline]
    pub fn range(&mut self, min: f32, max: f32) -> f32 {
        const MASK: u32 = 0x00FF_FFFF;
        let unit = (self.next_u32() & MASK) as f32 * (1.0 / MASK as f32);
        min + (max - min) * unit
    }
}
