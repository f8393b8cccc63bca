//! Biquad filter implementation using Direct Form II
//!
//! Coefficient formulae follow Robert Bristow-Johnson's Audio EQ Cookbook.
//! Gains are in dB and Q is the usual resonance factor.

use nfx_core::Sample;
use std::f32::consts::PI;

use crate::{MonoProcessor, Processor};

/// Biquad filter types
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FilterType {
    Lowpass,
    Highpass,
    Peaking,
    LowShelf,
    HighShelf,
}

/// Biquad coefficients, normalized by `a0`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BiquadCoeffs {
    pub b0: f32,
    pub b1: f32,
    pub b2: f32,
    pub a1: f32,
    pub a2: f32,
}

impl Default for BiquadCoeffs {
    /// Identity filter
    fn default() -> Self {
        Self {
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
            a1: 0.0,
            a2: 0.0,
        }
    }
}

impl BiquadCoeffs {
    fn normalized(b0: f32, b1: f32, b2: f32, a0: f32, a1: f32, a2: f32) -> Self {
        let inv_a0 = 1.0 / a0;
        Self {
            b0: b0 * inv_a0,
            b1: b1 * inv_a0,
            b2: b2 * inv_a0,
            a1: a1 * inv_a0,
            a2: a2 * inv_a0,
        }
    }

    pub fn new(filter_type: FilterType, freq: f32, q: f32, gain_db: f32, sample_rate: f32) -> Self {
        match filter_type {
            FilterType::Lowpass => Self::lowpass(freq, q, sample_rate),
            FilterType::Highpass => Self::highpass(freq, q, sample_rate),
            FilterType::Peaking => Self::peaking(freq, q, gain_db, sample_rate),
            FilterType::LowShelf => Self::low_shelf(freq, q, gain_db, sample_rate),
            FilterType::HighShelf => Self::high_shelf(freq, q, gain_db, sample_rate),
        }
    }

    /// Calculate lowpass filter coefficients
    pub fn lowpass(freq: f32, q: f32, sample_rate: f32) -> Self {
        let omega = 2.0 * PI * freq / sample_rate;
        let cos_omega = omega.cos();
        let alpha = omega.sin() / (2.0 * q);

        Self::normalized(
            (1.0 - cos_omega) * 0.5,
            1.0 - cos_omega,
            (1.0 - cos_omega) * 0.5,
            1.0 + alpha,
            -2.0 * cos_omega,
            1.0 - alpha,
        )
    }

    /// Calculate highpass filter coefficients
    pub fn highpass(freq: f32, q: f32, sample_rate: f32) -> Self {
        let omega = 2.0 * PI * freq / sample_rate;
        let cos_omega = omega.cos();
        let alpha = omega.sin() / (2.0 * q);

        Self::normalized(
            (1.0 + cos_omega) * 0.5,
            -(1.0 + cos_omega),
            (1.0 + cos_omega) * 0.5,
            1.0 + alpha,
            -2.0 * cos_omega,
            1.0 - alpha,
        )
    }

    /// Calculate peaking EQ filter coefficients
    pub fn peaking(freq: f32, q: f32, gain_db: f32, sample_rate: f32) -> Self {
        let a = 10.0_f32.powf(gain_db * 0.025);
        let omega = 2.0 * PI * freq / sample_rate;
        let cos_omega = omega.cos();
        let alpha = omega.sin() / (2.0 * q);

        Self::normalized(
            1.0 + alpha * a,
            -2.0 * cos_omega,
            1.0 - alpha * a,
            1.0 + alpha / a,
            -2.0 * cos_omega,
            1.0 - alpha / a,
        )
    }

    /// Calculate low shelf filter coefficients
    pub fn low_shelf(freq: f32, q: f32, gain_db: f32, sample_rate: f32) -> Self {
        let a = 10.0_f32.powf(gain_db * 0.025);
        let omega = 2.0 * PI * freq / sample_rate;
        let cos_omega = omega.cos();
        let alpha = omega.sin() / (2.0 * q);
        let two_sqrt_a_alpha = 2.0 * a.sqrt() * alpha;

        Self::normalized(
            a * ((a + 1.0) - (a - 1.0) * cos_omega + two_sqrt_a_alpha),
            2.0 * a * ((a - 1.0) - (a + 1.0) * cos_omega),
            a * ((a + 1.0) - (a - 1.0) * cos_omega - two_sqrt_a_alpha),
            (a + 1.0) + (a - 1.0) * cos_omega + two_sqrt_a_alpha,
            -2.0 * ((a - 1.0) + (a + 1.0) * cos_omega),
            (a + 1.0) + (a - 1.0) * cos_omega - two_sqrt_a_alpha,
        )
    }

    /// Calculate high shelf filter coefficients
    pub fn high_shelf(freq: f32, q: f32, gain_db: f32, sample_rate: f32) -> Self {
        let a = 10.0_f32.powf(gain_db * 0.025);
        let omega = 2.0 * PI * freq / sample_rate;
        let cos_omega = omega.cos();
        let alpha = omega.sin() / (2.0 * q);
        let two_sqrt_a_alpha = 2.0 * a.sqrt() * alpha;

        Self::normalized(
            a * ((a + 1.0) + (a - 1.0) * cos_omega + two_sqrt_a_alpha),
            -2.0 * a * ((a - 1.0) + (a + 1.0) * cos_omega),
            a * ((a + 1.0) + (a - 1.0) * cos_omega - two_sqrt_a_alpha),
            (a + 1.0) - (a - 1.0) * cos_omega + two_sqrt_a_alpha,
            2.0 * ((a - 1.0) - (a + 1.0) * cos_omega),
            (a + 1.0) - (a - 1.0) * cos_omega - two_sqrt_a_alpha,
        )
    }

    /// Magnitude response at `freq`
    pub fn magnitude_at(&self, freq: f32, sample_rate: f32) -> f32 {
        let w = 2.0 * PI * freq / sample_rate;
        let (c1, s1) = (w.cos(), w.sin());
        let (c2, s2) = ((2.0 * w).cos(), (2.0 * w).sin());
        let num_re = self.b0 + self.b1 * c1 + self.b2 * c2;
        let num_im = -(self.b1 * s1 + self.b2 * s2);
        let den_re = 1.0 + self.a1 * c1 + self.a2 * c2;
        let den_im = -(self.a1 * s1 + self.a2 * s2);
        ((num_re * num_re + num_im * num_im) / (den_re * den_re + den_im * den_im)).sqrt()
    }

    /// Append `[b2, b1, b0, a2, a1]` to the display buffer, returning the rest
    pub fn store_coeffs<'a>(&self, out: &'a mut [f32]) -> &'a mut [f32] {
        let coeffs = [self.b2, self.b1, self.b0, self.a2, self.a1];
        let n = coeffs.len().min(out.len());
        out[..n].copy_from_slice(&coeffs[..n]);
        &mut out[n..]
    }
}

/// Direct Form II biquad
#[derive(Debug, Clone, Default)]
pub struct Biquad {
    coeffs: BiquadCoeffs,
    z1: f32,
    z2: f32,
}

impl Biquad {
    pub fn new(coeffs: BiquadCoeffs) -> Self {
        Self {
            coeffs,
            z1: 0.0,
            z2: 0.0,
        }
    }

    /// Replace coefficients, keeping the filter state
    pub fn set_coeffs(&mut self, coeffs: BiquadCoeffs) {
        self.coeffs = coeffs;
    }

    pub fn coeffs(&self) -> &BiquadCoeffs {
        &self.coeffs
    }

    #[inline]
    pub fn process(&mut self, input: Sample) -> Sample {
        let c = &self.coeffs;
        let iir = input - c.a1 * self.z1 - c.a2 * self.z2;
        let fir = c.b0 * iir + c.b1 * self.z1 + c.b2 * self.z2;
        self.z2 = self.z1;
        self.z1 = iir;
        fir
    }
}

impl Processor for Biquad {
    fn reset(&mut self) {
        self.z1 = 0.0;
        self.z2 = 0.0;
    }
}

impl MonoProcessor for Biquad {
    #[inline]
    fn process_sample(&mut self, input: Sample) -> Sample {
        self.process(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const SR: f32 = 48000.0;

    fn steady_state_gain(coeffs: BiquadCoeffs, freq: f32) -> f32 {
        let mut filter = Biquad::new(coeffs);
        let mut peak = 0.0f32;
        for i in 0..48000 {
            let x = (2.0 * PI * freq * i as f32 / SR).sin();
            let y = filter.process_sample(x);
            if i > 24000 {
                peak = peak.max(y.abs());
            }
        }
        peak
    }

    #[test]
    fn test_zero_gain_shelves_are_transparent() {
        for coeffs in [
            BiquadCoeffs::low_shelf(800.0, 0.707, 0.0, SR),
            BiquadCoeffs::peaking(4000.0, 0.707, 0.0, SR),
            BiquadCoeffs::high_shelf(8000.0, 0.707, 0.0, SR),
        ] {
            assert_relative_eq!(coeffs.magnitude_at(1000.0, SR), 1.0, epsilon = 1e-4);
        }
    }

    #[test]
    fn test_lowpass_attenuates() {
        let coeffs = BiquadCoeffs::lowpass(1000.0, 0.707, SR);
        assert!(steady_state_gain(coeffs, 100.0) > 0.95);
        assert!(steady_state_gain(coeffs, 10000.0) < 0.05);
    }

    #[test]
    fn test_highpass_attenuates() {
        let coeffs = BiquadCoeffs::highpass(1000.0, 0.707, SR);
        assert!(steady_state_gain(coeffs, 100.0) < 0.05);
        assert!(steady_state_gain(coeffs, 10000.0) > 0.95);
    }

    #[test]
    fn test_peaking_boost() {
        let coeffs = BiquadCoeffs::peaking(2000.0, 1.0, 12.0, SR);
        assert_relative_eq!(coeffs.magnitude_at(2000.0, SR), 3.98, epsilon = 0.05);
        assert_relative_eq!(steady_state_gain(coeffs, 2000.0), 3.98, epsilon = 0.1);
    }

    #[test]
    fn test_store_layout() {
        let coeffs = BiquadCoeffs::lowpass(500.0, 0.707, SR);
        let mut out = [0.0; 7];
        let rest = coeffs.store_coeffs(&mut out);
        assert_eq!(rest.len(), 2);
        assert_eq!(out[..5], [coeffs.b2, coeffs.b1, coeffs.b0, coeffs.a2, coeffs.a1]);
    }

    #[test]
    fn test_reset() {
        let mut filter = Biquad::new(BiquadCoeffs::lowpass(500.0, 0.707, SR));
        filter.process(1.0);
        filter.reset();
        let mut fresh = Biquad::new(BiquadCoeffs::lowpass(500.0, 0.707, SR));
        assert_eq!(filter.process(0.5), fresh.process(0.5));
    }
}
