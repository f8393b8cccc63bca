//! nfx-dsp: DSP primitives for NativeFX
//!
//! Small, allocation-free-after-init building blocks shared by the effects.
//!
//! ## Modules
//! - `fft` - In-place radix-2 complex FFT with cached bit-reversal tables
//! - `analyzer` - Windowed peak-hold spectrum analyzer with double-buffered output
//! - `history` - Lock-free waveform history with resampling reads
//! - `biquad` - RBJ cookbook biquad filters
//! - `random` - Deterministic LCG for dither and noise

pub mod fft;
pub mod analyzer;
pub mod history;
pub mod biquad;
pub mod random;

pub use analyzer::{SpectrumAnalyzer, SpectrumReader, Tap};
pub use fft::Precision;
pub use history::HistoryBuffer;

use nfx_core::Sample;

/// Trait for all DSP processors
pub trait Processor: Send {
    /// Reset processor state
    fn reset(&mut self);

    /// Get latency in samples
    fn latency(&self) -> usize {
        0
    }
}

/// Mono processor trait
pub trait MonoProcessor: Processor {
    /// Process a single sample
    fn process_sample(&mut self, input: Sample) -> Sample;

    /// Process a block of samples
    fn process_block(&mut self, buffer: &mut [Sample]) {
        for sample in buffer.iter_mut() {
            *sample = self.process_sample(*sample);
        }
    }
}
