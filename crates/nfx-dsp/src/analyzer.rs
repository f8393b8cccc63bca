//! Spectrum analyzer for metering and display
//!
//! Keeps a peak-hold magnitude spectrum per tap (effect input and output).
//! Each pass shifts new samples into a rolling frame, applies a Hamming
//! window, transforms, and for every bin either jumps to the new magnitude
//! or decays the held one geometrically.
//!
//! Spectra are double-buffered: the audio thread writes the scratch slot
//! and then flips an index, while any number of [`SpectrumReader`]s read
//! the stable slot without locking. A tap becomes readable after two
//! completed passes.

use nfx_core::{atomic_buffer, lerp, AtomicSample, Sample, MAX_FFT_SIZE, MIN_FFT_SIZE};
use num_complex::Complex;
use std::f32::consts::PI;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use crate::fft::{self, Precision};

/// Default FFT size used when an invalid size is requested
const DEFAULT_FFT_SIZE: usize = 4096;

/// Passes required before a tap is readable
const PASSES_UNTIL_READY: u8 = 2;

/// Which side of the effect a spectrum describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tap {
    Input,
    Output,
}

/// Two magnitude spectra: one stable for readers, one scratch for the writer
struct DoubleBuffer {
    slots: [Box<[AtomicSample]>; 2],
    stable: AtomicUsize,
    passes: AtomicU8,
}

impl DoubleBuffer {
    fn new(bins: usize) -> Self {
        Self {
            slots: [atomic_buffer(bins), atomic_buffer(bins)],
            stable: AtomicUsize::new(0),
            passes: AtomicU8::new(0),
        }
    }

    #[inline]
    fn stable(&self) -> &[AtomicSample] {
        &self.slots[self.stable.load(Ordering::Acquire)]
    }

    #[inline]
    fn scratch(&self) -> &[AtomicSample] {
        &self.slots[1 - self.stable.load(Ordering::Acquire)]
    }

    /// Make the scratch slot the stable one
    fn publish(&self) {
        let next = 1 - self.stable.load(Ordering::Relaxed);
        self.stable.store(next, Ordering::Release);
        if self.passes.load(Ordering::Relaxed) < PASSES_UNTIL_READY {
            self.passes.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[inline]
    fn is_ready(&self) -> bool {
        self.passes.load(Ordering::Relaxed) >= PASSES_UNTIL_READY
    }

    fn clear(&self) {
        for slot in &self.slots {
            slot.iter().for_each(|s| s.set(0.0));
        }
        self.passes.store(0, Ordering::Relaxed);
    }
}

/// Spectra shared between the analyzing thread and its readers
struct SharedSpectra {
    fft_size: usize,
    input: DoubleBuffer,
    output: DoubleBuffer,
}

impl SharedSpectra {
    fn new(fft_size: usize) -> Self {
        Self {
            fft_size,
            input: DoubleBuffer::new(fft_size / 2),
            output: DoubleBuffer::new(fft_size / 2),
        }
    }

    #[inline]
    fn tap(&self, tap: Tap) -> &DoubleBuffer {
        match tap {
            Tap::Input => &self.input,
            Tap::Output => &self.output,
        }
    }
}

/// Writer-side buffers, allocated on first use
struct AnalyzerState {
    window: Box<[Sample]>,
    input_frame: Box<[Sample]>,
    output_frame: Box<[Sample]>,
    scratch: Box<[Complex<Sample>]>,
}

impl AnalyzerState {
    fn new(fft_size: usize) -> Self {
        // Hamming window
        let denom = (fft_size - 1) as f32;
        let window = (0..fft_size)
            .map(|i| 0.54 - 0.46 * (2.0 * PI * i as f32 / denom).cos())
            .collect();

        Self {
            window,
            input_frame: vec![0.0; fft_size].into_boxed_slice(),
            output_frame: vec![0.0; fft_size].into_boxed_slice(),
            scratch: vec![Complex::new(0.0, 0.0); fft_size].into_boxed_slice(),
        }
    }
}

/// Peak-hold spectrum analyzer (single writer)
pub struct SpectrumAnalyzer {
    fft_size: usize,
    precision: Precision,
    state: Option<AnalyzerState>,
    shared: Arc<OnceLock<SharedSpectra>>,
}

impl SpectrumAnalyzer {
    /// Create an analyzer; buffers are allocated on the first analysis pass
    pub fn new(fft_size: usize) -> Self {
        let fft_size = if fft_size.is_power_of_two() && (MIN_FFT_SIZE..=MAX_FFT_SIZE).contains(&fft_size) {
            fft_size
        } else {
            log::warn!("invalid analyzer FFT size {fft_size}, using {DEFAULT_FFT_SIZE}");
            DEFAULT_FFT_SIZE
        };

        Self {
            fft_size,
            precision: Precision::Double,
            state: None,
            shared: Arc::new(OnceLock::new()),
        }
    }

    pub fn with_precision(mut self, precision: Precision) -> Self {
        self.precision = precision;
        self
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    /// Number of held bins per tap
    pub fn bin_count(&self) -> usize {
        self.fft_size / 2
    }

    pub fn is_initialized(&self) -> bool {
        self.state.is_some()
    }

    /// Allocate all buffers if that has not happened yet.
    ///
    /// Returns `true` if this call performed the allocation.
    pub fn ensure_initialized(&mut self) -> bool {
        if self.state.is_some() {
            return false;
        }
        log::debug!("allocating spectrum analyzer buffers (fft_size={})", self.fft_size);
        self.state = Some(AnalyzerState::new(self.fft_size));
        self.shared.get_or_init(|| SharedSpectra::new(self.fft_size));
        true
    }

    /// Handle for reading spectra from another thread
    pub fn reader(&self) -> SpectrumReader {
        SpectrumReader {
            fft_size: self.fft_size,
            shared: Arc::clone(&self.shared),
        }
    }

    /// Analyze `count` samples of the effect input, taking every `stride`-th value
    pub fn analyze_input(&mut self, data: &[Sample], stride: usize, count: usize, decay: f32) {
        self.analyze(Tap::Input, data, stride, count, decay);
    }

    /// Analyze `count` samples of the effect output, taking every `stride`-th value
    pub fn analyze_output(&mut self, data: &[Sample], stride: usize, count: usize, decay: f32) {
        self.analyze(Tap::Output, data, stride, count, decay);
    }

    /// One analysis pass on `tap`.
    ///
    /// `decay` is the per-pass falloff applied to held bins whose new
    /// magnitude is smaller; `1.0` holds peaks forever.
    pub fn analyze(&mut self, tap: Tap, data: &[Sample], stride: usize, count: usize, decay: f32) {
        self.ensure_initialized();
        let (Some(state), Some(shared)) = (self.state.as_mut(), self.shared.get()) else {
            return;
        };

        let n = self.fft_size;
        let stride = stride.max(1);
        let count = count.min(data.len().div_ceil(stride));
        let frame = match tap {
            Tap::Input => &mut state.input_frame,
            Tap::Output => &mut state.output_frame,
        };

        if count >= n {
            let skip = count - n;
            for (i, dst) in frame.iter_mut().enumerate() {
                *dst = data[(skip + i) * stride];
            }
        } else {
            frame.copy_within(count.., 0);
            for (i, dst) in frame[n - count..].iter_mut().enumerate() {
                *dst = data[i * stride];
            }
        }

        for ((c, &x), &w) in state.scratch.iter_mut().zip(frame.iter()).zip(state.window.iter()) {
            *c = Complex::new(x * w, 0.0);
        }
        fft::forward(&mut state.scratch, self.precision);

        let spectra = shared.tap(tap);
        let held = spectra.stable();
        let next = spectra.scratch();
        for ((c, prev), dst) in state.scratch.iter().zip(held).zip(next) {
            let magnitude = c.norm();
            let previous = prev.get();
            dst.set(if magnitude > previous { magnitude } else { previous * decay });
        }
        spectra.publish();
    }

    pub fn can_be_read(&self, tap: Tap) -> bool {
        self.reader().can_be_read(tap)
    }

    pub fn read_buffer(&self, out: &mut [Sample], tap: Tap) {
        self.reader().read_buffer(out, tap);
    }

    pub fn spectrum(&self, tap: Tap) -> Vec<Sample> {
        self.reader().spectrum(tap)
    }

    /// Clear held spectra and rolling frames; allocation is kept
    pub fn reset(&mut self) {
        if let Some(state) = self.state.as_mut() {
            state.input_frame.fill(0.0);
            state.output_frame.fill(0.0);
        }
        if let Some(shared) = self.shared.get() {
            shared.input.clear();
            shared.output.clear();
        }
    }
}

/// Read-only view of an analyzer's spectra, safe to use from a UI thread
#[derive(Clone)]
pub struct SpectrumReader {
    fft_size: usize,
    shared: Arc<OnceLock<SharedSpectra>>,
}

impl SpectrumReader {
    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    /// `true` once `tap` has completed at least two analysis passes
    pub fn can_be_read(&self, tap: Tap) -> bool {
        self.shared.get().is_some_and(|s| s.tap(tap).is_ready())
    }

    /// Resample the held spectrum of `tap` into `out.len()` points.
    ///
    /// Zero-fills when the tap is not readable yet. At most `fft_size`
    /// points are produced; the rest of `out` is zeroed.
    pub fn read_buffer(&self, out: &mut [Sample], tap: Tap) {
        let Some(shared) = self.shared.get().filter(|s| s.tap(tap).is_ready()) else {
            out.fill(0.0);
            return;
        };

        let points = out.len().min(shared.fft_size);
        out[points..].fill(0.0);
        let spectrum = shared.tap(tap).stable();
        let last = spectrum.len() - 1;

        match points {
            0 => {}
            1 => out[0] = spectrum[0].get(),
            _ => {
                let scale = spectrum.len().saturating_sub(2) as f32 / (points - 1) as f32;
                for (n, dst) in out[..points].iter_mut().enumerate() {
                    let f = n as f32 * scale;
                    let i = (f.floor() as usize).min(last);
                    let s1 = spectrum[i].get();
                    let s2 = spectrum[(i + 1).min(last)].get();
                    *dst = lerp(s1, s2, f - i as f32);
                }
            }
        }
    }

    /// Copy of the held magnitudes of `tap` (`fft_size / 2` bins)
    pub fn spectrum(&self, tap: Tap) -> Vec<Sample> {
        match self.shared.get() {
            Some(shared) => shared.tap(tap).stable().iter().map(AtomicSample::get).collect(),
            None => vec![0.0; self.fft_size / 2],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f32, sample_rate: f32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (2.0 * PI * freq * i as f32 / sample_rate).sin())
            .collect()
    }

    #[test]
    fn test_lazy_initialization_is_one_shot() {
        let mut analyzer = SpectrumAnalyzer::new(256);
        assert!(!analyzer.is_initialized());
        assert!(analyzer.ensure_initialized());
        assert!(analyzer.is_initialized());
        assert!(!analyzer.ensure_initialized());
    }

    #[test]
    fn test_invalid_size_falls_back() {
        assert_eq!(SpectrumAnalyzer::new(1000).fft_size(), DEFAULT_FFT_SIZE);
        assert_eq!(SpectrumAnalyzer::new(16).fft_size(), DEFAULT_FFT_SIZE);
        assert_eq!(SpectrumAnalyzer::new(512).bin_count(), 256);
    }

    #[test]
    fn test_readiness_after_two_passes() {
        let mut analyzer = SpectrumAnalyzer::new(256);
        let block = sine(1000.0, 48000.0, 128);

        assert!(!analyzer.can_be_read(Tap::Input));
        analyzer.analyze_input(&block, 1, block.len(), 0.9);
        assert!(!analyzer.can_be_read(Tap::Input));
        analyzer.analyze_input(&block, 1, block.len(), 0.9);
        assert!(analyzer.can_be_read(Tap::Input));
        analyzer.analyze_input(&block, 1, block.len(), 0.9);
        assert!(analyzer.can_be_read(Tap::Input));

        // Taps are tracked independently
        assert!(!analyzer.can_be_read(Tap::Output));
    }

    #[test]
    fn test_read_before_ready_is_zero() {
        let mut analyzer = SpectrumAnalyzer::new(256);
        let mut out = vec![1.0; 64];
        analyzer.read_buffer(&mut out, Tap::Output);
        assert!(out.iter().all(|&x| x == 0.0));

        let block = vec![1.0; 256];
        analyzer.analyze_output(&block, 1, 256, 1.0);
        out.fill(1.0);
        analyzer.read_buffer(&mut out, Tap::Output);
        assert!(out.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_stride_picks_one_channel() {
        let mut analyzer = SpectrumAnalyzer::new(256);
        // Left carries a tone, right is silent
        let mono = sine(3000.0, 48000.0, 256);
        let interleaved: Vec<f32> = mono.iter().flat_map(|&s| [s, 0.0]).collect();
        analyzer.analyze_input(&interleaved, 2, 256, 1.0);
        analyzer.analyze_input(&interleaved, 2, 256, 1.0);

        let spectrum = analyzer.spectrum(Tap::Input);
        let peak = spectrum
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i);
        assert_eq!(peak, Some(16)); // 3000 * 256 / 48000
    }

    #[test]
    fn test_read_buffer_resamples() {
        let mut analyzer = SpectrumAnalyzer::new(256);
        let block = sine(6000.0, 48000.0, 256);
        analyzer.analyze_input(&block, 1, 256, 1.0);
        analyzer.analyze_input(&block, 1, 256, 1.0);

        let mut out = vec![0.0; 32];
        analyzer.read_buffer(&mut out, Tap::Input);
        assert!(out.iter().all(|x| x.is_finite()));
        assert!(out.iter().any(|&x| x > 1.0));

        // More points than FFT size: the tail is zeroed
        let mut long = vec![7.0; 300];
        analyzer.read_buffer(&mut long, Tap::Input);
        assert!(long[256..].iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_reader_shares_state() {
        let mut analyzer = SpectrumAnalyzer::new(128);
        let reader = analyzer.reader();
        assert!(!reader.can_be_read(Tap::Input));
        let block = vec![0.5; 128];
        analyzer.analyze_input(&block, 1, 128, 0.5);
        analyzer.analyze_input(&block, 1, 128, 0.5);
        assert!(reader.can_be_read(Tap::Input));
        assert_eq!(reader.spectrum(Tap::Input), analyzer.spectrum(Tap::Input));
    }

    #[test]
    fn test_reset_clears_readiness() {
        let mut analyzer = SpectrumAnalyzer::new(128);
        let block = vec![0.5; 128];
        analyzer.analyze_input(&block, 1, 128, 0.5);
        analyzer.analyze_input(&block, 1, 128, 0.5);
        analyzer.reset();
        assert!(!analyzer.can_be_read(Tap::Input));
        assert!(analyzer.spectrum(Tap::Input).iter().all(|&x| x == 0.0));
    }
}
