//! DSP Performance Benchmarks
//!
//! Measures the per-block cost of the primitives the effects call on the
//! audio thread.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use nfx_dsp::biquad::{Biquad, BiquadCoeffs};
use nfx_dsp::fft::{self, Precision};
use nfx_dsp::{HistoryBuffer, MonoProcessor, SpectrumAnalyzer};
use num_complex::Complex;

const SAMPLE_RATE: f32 = 48000.0;
const BLOCK_SIZES: &[usize] = &[64, 256, 1024];
const FFT_SIZES: &[usize] = &[256, 1024, 4096, 16384];

/// Generate test audio (440Hz sine wave)
fn generate_test_audio(samples: usize) -> Vec<f32> {
    (0..samples)
        .map(|i| {
            let t = i as f32 / SAMPLE_RATE;
            (2.0 * std::f32::consts::PI * 440.0 * t).sin() * 0.5
        })
        .collect()
}

// ═══════════════════════════════════════════════════════════════════════════════
// FFT BENCHMARKS
// ═══════════════════════════════════════════════════════════════════════════════

fn bench_fft(c: &mut Criterion) {
    let mut group = c.benchmark_group("FFT");

    for &size in FFT_SIZES {
        let signal: Vec<Complex<f32>> = generate_test_audio(size)
            .into_iter()
            .map(|x| Complex::new(x, 0.0))
            .collect();

        for (label, precision) in [("single", Precision::Single), ("double", Precision::Double)] {
            group.bench_with_input(BenchmarkId::new(format!("forward {label}"), size), &size, |b, _| {
                let mut data = signal.clone();
                b.iter(|| {
                    data.copy_from_slice(&signal);
                    fft::forward(black_box(&mut data), precision);
                });
            });
        }

        group.bench_with_input(BenchmarkId::new("round trip f64", size), &size, |b, _| {
            let mut data: Vec<Complex<f64>> = signal
                .iter()
                .map(|c| Complex::new(c.re as f64, c.im as f64))
                .collect();
            b.iter(|| {
                fft::forward(black_box(&mut data), Precision::Double);
                fft::backward(black_box(&mut data), Precision::Double);
            });
        });
    }

    group.finish();
}

// ═══════════════════════════════════════════════════════════════════════════════
// ANALYZER BENCHMARKS
// ═══════════════════════════════════════════════════════════════════════════════

fn bench_analyzer(c: &mut Criterion) {
    let mut group = c.benchmark_group("Spectrum Analyzer");

    for &block_size in BLOCK_SIZES {
        group.bench_with_input(BenchmarkId::new("stereo 4096", block_size), &block_size, |b, &size| {
            let input: Vec<f32> = generate_test_audio(size).iter().flat_map(|&s| [s, -s]).collect();
            let mut analyzer = SpectrumAnalyzer::new(4096);
            let mut display = vec![0.0f32; 512];

            b.iter(|| {
                analyzer.analyze_input(black_box(&input), 2, size, 0.99);
                analyzer.read_buffer(&mut display, nfx_dsp::Tap::Input);
                black_box(display[0])
            });
        });
    }

    group.finish();
}

// ═══════════════════════════════════════════════════════════════════════════════
// HISTORY BENCHMARKS
// ═══════════════════════════════════════════════════════════════════════════════

fn bench_history(c: &mut Criterion) {
    let mut group = c.benchmark_group("History Buffer");

    for &block_size in BLOCK_SIZES {
        group.bench_with_input(BenchmarkId::new("feed", block_size), &block_size, |b, &size| {
            let input = generate_test_audio(size);
            let history = HistoryBuffer::new(96000);
            b.iter(|| {
                for &s in &input {
                    history.feed(black_box(s));
                }
            });
        });
    }

    group.bench_function("read 1024 points", |b| {
        let history = HistoryBuffer::new(96000);
        for s in generate_test_audio(96000) {
            history.feed(s);
        }
        let mut out = vec![0.0f32; 1025];
        b.iter(|| black_box(history.read_buffer(&mut out, 4800.0, 0.0)));
    });

    group.finish();
}

// ═══════════════════════════════════════════════════════════════════════════════
// BIQUAD BENCHMARKS
// ═══════════════════════════════════════════════════════════════════════════════

fn bench_biquad(c: &mut Criterion) {
    let mut group = c.benchmark_group("Biquad Filter");

    for &block_size in BLOCK_SIZES {
        group.bench_with_input(BenchmarkId::new("three band", block_size), &block_size, |b, &size| {
            let mut buffer = generate_test_audio(size);
            let mut low = Biquad::new(BiquadCoeffs::low_shelf(800.0, 0.707, 3.0, SAMPLE_RATE));
            let mut mid = Biquad::new(BiquadCoeffs::peaking(4000.0, 0.707, -3.0, SAMPLE_RATE));
            let mut high = Biquad::new(BiquadCoeffs::high_shelf(8000.0, 0.707, 2.0, SAMPLE_RATE));

            b.iter(|| {
                low.process_block(black_box(&mut buffer));
                mid.process_block(&mut buffer);
                high.process_block(&mut buffer);
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_fft, bench_analyzer, bench_history, bench_biquad);

criterion_main!(benches);
