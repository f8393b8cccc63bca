//! In-place radix-2 complex FFT
//!
//! Iterative decimation-in-time Cooley-Tukey on `Complex<f32>` or
//! `Complex<f64>` buffers whose length is a power of two. The forward
//! transform is unnormalized; [`backward`] scales by `1/n` so that
//! `backward(forward(x)) == x` within rounding error.
//!
//! Bit-reversal permutations and double-precision twiddle tables are built
//! once per transform size and cached for the lifetime of the process.
//! Effects only ever use a handful of sizes, so the cache is never pruned.

use num_complex::Complex;
use num_traits::Float;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::f64::consts::PI;
use std::sync::{Arc, OnceLock};

/// Twiddles in single-precision mode are re-seeded from `sin`/`cos` this often
const RESEED_INTERVAL: usize = 32;

/// How twiddle factors are produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Precision {
    /// Incremental rotation in the buffer's own float type
    #[default]
    Single,
    /// Cached table computed in `f64`
    Double,
}

/// Float types the transform operates on
pub trait FftFloat: Float + Send + Sync + 'static {
    fn from_f64(value: f64) -> Self;
}

impl FftFloat for f32 {
    #[inline]
    fn from_f64(value: f64) -> Self {
        value as f32
    }
}

impl FftFloat for f64 {
    #[inline]
    fn from_f64(value: f64) -> Self {
        value
    }
}

type SizeCache<V> = RwLock<HashMap<usize, Arc<[V]>>>;

static BIT_REVERSAL: OnceLock<SizeCache<usize>> = OnceLock::new();
static TWIDDLES: OnceLock<SizeCache<(f64, f64)>> = OnceLock::new();

fn cached<V>(
    cache: &'static OnceLock<SizeCache<V>>,
    n: usize,
    build: impl FnOnce(usize) -> Vec<V>,
) -> Arc<[V]> {
    let cache = cache.get_or_init(|| RwLock::new(HashMap::new()));
    if let Some(table) = cache.read().get(&n) {
        return Arc::clone(table);
    }
    let mut tables = cache.write();
    Arc::clone(tables.entry(n).or_insert_with(|| build(n).into()))
}

/// Bit-reversal permutation for a transform of size `n`
///
/// `table[table[i]] == i` for every index.
pub fn bit_reversal_table(n: usize) -> Arc<[usize]> {
    debug_assert!(n.is_power_of_two(), "FFT size {n} is not a power of two");
    cached(&BIT_REVERSAL, n, |n| {
        log::debug!("building bit-reversal table for n={n}");
        if n <= 1 {
            return vec![0; n];
        }
        let shift = usize::BITS - n.trailing_zeros();
        (0..n).map(|i| i.reverse_bits() >> shift).collect()
    })
}

/// `exp(-2πik/n)` for `k < n/2`, computed in `f64`
fn twiddle_table(n: usize) -> Arc<[(f64, f64)]> {
    cached(&TWIDDLES, n, |n| {
        log::debug!("building twiddle table for n={n}");
        (0..n / 2)
            .map(|k| {
                let angle = -2.0 * PI * k as f64 / n as f64;
                (angle.cos(), angle.sin())
            })
            .collect()
    })
}

/// Transform sizes with a cached permutation table, ascending
pub fn cached_sizes() -> Vec<usize> {
    let mut sizes: Vec<usize> = BIT_REVERSAL
        .get()
        .map(|cache| cache.read().keys().copied().collect())
        .unwrap_or_default();
    sizes.sort_unstable();
    sizes
}

/// Forward transform in place (unnormalized)
pub fn forward<T: FftFloat>(data: &mut [Complex<T>], precision: Precision) {
    let n = data.len();
    if n <= 1 {
        return;
    }
    debug_assert!(n.is_power_of_two(), "FFT size {n} is not a power of two");

    let table = bit_reversal_table(n);
    for (i, &j) in table.iter().enumerate() {
        if i < j {
            data.swap(i, j);
        }
    }

    match precision {
        Precision::Double => combine_with_table(data),
        Precision::Single => combine_rotating(data),
    }
}

/// Inverse transform in place, scaled by `1/n`
pub fn backward<T: FftFloat>(data: &mut [Complex<T>], precision: Precision) {
    let n = data.len();
    if n <= 1 {
        return;
    }
    for c in data.iter_mut() {
        c.im = -c.im;
    }
    forward(data, precision);
    let scale = T::from_f64(1.0 / n as f64);
    for c in data.iter_mut() {
        c.re = c.re * scale;
        c.im = -c.im * scale;
    }
}

#[inline(always)]
fn butterfly<T: FftFloat>(data: &mut [Complex<T>], i: usize, half: usize, w: Complex<T>) {
    let t = w * data[i + half];
    let u = data[i];
    data[i] = u + t;
    data[i + half] = u - t;
}

fn combine_with_table<T: FftFloat>(data: &mut [Complex<T>]) {
    let n = data.len();
    let twiddles = twiddle_table(n);
    let mut half = 1;
    while half < n {
        let stride = n / (half << 1);
        for m in 0..half {
            let (c, s) = twiddles[m * stride];
            let w = Complex::new(T::from_f64(c), T::from_f64(s));
            for i in (m..n).step_by(half << 1) {
                butterfly(data, i, half, w);
            }
        }
        half <<= 1;
    }
}

fn combine_rotating<T: FftFloat>(data: &mut [Complex<T>]) {
    let n = data.len();
    let mut half = 1;
    while half < n {
        let step = -PI / half as f64;
        let rotation = Complex::new(T::from_f64(step).cos(), T::from_f64(step).sin());
        let mut w = Complex::new(T::one(), T::zero());
        for m in 0..half {
            if m % RESEED_INTERVAL == 0 {
                let angle = T::from_f64(step * m as f64);
                w = Complex::new(angle.cos(), angle.sin());
            }
            for i in (m..n).step_by(half << 1) {
                butterfly(data, i, half, w);
            }
            w = w * rotation;
        }
        half <<= 1;
    }
}

/// Write `|X[k]|` for the first `out.len()` bins
pub fn magnitude_spectrum<T: FftFloat>(data: &[Complex<T>], out: &mut [T]) {
    for (dst, c) in out.iter_mut().zip(data) {
        *dst = c.norm();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn naive_dft(input: &[Complex<f64>]) -> Vec<Complex<f64>> {
        let n = input.len();
        (0..n)
            .map(|k| {
                input.iter().enumerate().fold(Complex::new(0.0, 0.0), |acc, (j, x)| {
                    let angle = -2.0 * PI * (k * j) as f64 / n as f64;
                    acc + x * Complex::new(angle.cos(), angle.sin())
                })
            })
            .collect()
    }

    fn test_signal(n: usize) -> Vec<Complex<f64>> {
        (0..n)
            .map(|i| Complex::new((i as f64 * 0.37).sin(), (i as f64 * 1.3).cos() * 0.5))
            .collect()
    }

    #[test]
    fn test_size_one_is_noop() {
        let mut data = [Complex::new(3.0f32, -2.0)];
        forward(&mut data, Precision::Single);
        assert_eq!(data[0], Complex::new(3.0, -2.0));
        backward(&mut data, Precision::Double);
        assert_eq!(data[0], Complex::new(3.0, -2.0));
    }

    #[test]
    fn test_bit_reversal_involution() {
        for log2 in 0..=16 {
            let n = 1usize << log2;
            let table = bit_reversal_table(n);
            assert_eq!(table.len(), n);
            for i in 0..n {
                assert_eq!(table[table[i]], i, "n={n} i={i}");
            }
        }
    }

    #[test]
    fn test_bit_reversal_known_values() {
        assert_eq!(&*bit_reversal_table(8), &[0, 4, 2, 6, 1, 5, 3, 7]);
    }

    #[test]
    fn test_tables_are_cached() {
        let a = bit_reversal_table(512);
        let b = bit_reversal_table(512);
        assert!(Arc::ptr_eq(&a, &b));
        assert!(cached_sizes().contains(&512));
    }

    #[test]
    fn test_impulse_gives_flat_spectrum() {
        let mut data = vec![Complex::new(0.0f64, 0.0); 32];
        data[0] = Complex::new(1.0, 0.0);
        forward(&mut data, Precision::Double);
        for c in &data {
            assert_abs_diff_eq!(c.re, 1.0, epsilon = 1e-12);
            assert_abs_diff_eq!(c.im, 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_matches_naive_dft() {
        for precision in [Precision::Single, Precision::Double] {
            let input = test_signal(128);
            let expected = naive_dft(&input);
            let mut data = input.clone();
            forward(&mut data, precision);
            for (a, b) in data.iter().zip(&expected) {
                assert_abs_diff_eq!(a.re, b.re, epsilon = 1e-9);
                assert_abs_diff_eq!(a.im, b.im, epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn test_round_trip_small() {
        let input = test_signal(64);
        let mut data = input.clone();
        forward(&mut data, Precision::Double);
        backward(&mut data, Precision::Double);
        for (a, b) in data.iter().zip(&input) {
            assert_abs_diff_eq!(a.re, b.re, epsilon = 1e-12);
            assert_abs_diff_eq!(a.im, b.im, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_pure_tone_lands_in_its_bin() {
        let n = 256;
        let bin = 19;
        let mut data: Vec<Complex<f32>> = (0..n)
            .map(|i| Complex::new((2.0 * PI * bin as f64 * i as f64 / n as f64).cos() as f32, 0.0))
            .collect();
        forward(&mut data, Precision::Single);
        let mut mags = vec![0.0f32; n / 2];
        magnitude_spectrum(&data, &mut mags);
        let peak = mags
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i);
        assert_eq!(peak, Some(bin));
        assert_abs_diff_eq!(mags[bin], n as f32 / 2.0, epsilon = 1e-2);
    }
}
