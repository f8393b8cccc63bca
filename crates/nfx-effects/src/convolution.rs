//! Convolution reverb
//!
//! Uniformly partitioned overlap-save convolution. The impulse response is
//! cut into partitions of one host block, each zero-padded to twice the
//! block size and transformed once. Every block the newest input frame is
//! transformed into a frequency-domain delay line, multiplied against all
//! partitions, summed, and transformed back; the second half of the result
//! is the wet output.
//!
//! The impulse is either synthesized (decaying shaped noise) or taken from a
//! [`SampleBank`] slot, then run through a resonant filter whose cutoff
//! follows the decay envelope, normalized to unit power and optionally
//! reversed. It is rebuilt whenever a shaping parameter, the channel count,
//! the block size, the sample rate or the chosen slot's contents change.

use nfx_core::{
    Decibels, EffectConfig, EffectDefinition, NfxError, NfxResult, ParamDef, ParamTable, Sample,
};
use nfx_dsp::fft::{self, Precision};
use nfx_dsp::random::Random;
use num_complex::Complex;
use parking_lot::Mutex;
use std::f32::consts::PI;
use std::sync::Arc;

use crate::sample_bank::{IrSample, SampleBank, SLOT_COUNT};
use crate::{channel_suffix, pass_through, unknown_buffer, AudioEffect, BlockLayout, FloatBufferSource};

pub const NAME: &str = "ConvolutionReverb";

/// Longest synthetic impulse in seconds
pub const MAX_LENGTH: f32 = 15.0;

/// Length of the stand-in impulse used for empty slots
const PLACEHOLDER_FRAMES: usize = 256;

/// Channel and block layout the impulse is prepared for before the first block
const INITIAL_CHANNELS: usize = 2;
const INITIAL_BLOCK: usize = 1024;

/// Parameter indices
pub mod param {
    pub const WET: usize = 0;
    pub const GAIN: usize = 1;
    pub const TIME: usize = 2;
    pub const DECAY: usize = 3;
    pub const DIFFUSION: usize = 4;
    pub const STEREO_SPREAD: usize = 5;
    pub const CUT_HIGH: usize = 6;
    pub const CUT_LOW: usize = 7;
    pub const RESONANCE: usize = 8;
    pub const USE_SAMPLE: usize = 9;
    pub const REVERSE: usize = 10;
}

const PARAMS: &[ParamDef] = &[
    ParamDef::new("Wet", "%", 0.0, 100.0, 30.0).describe("Wet signal mix amount"),
    ParamDef::new("Gain", "dB", -50.0, 50.0, 0.0).describe("Impulse response gain"),
    ParamDef::new("Time", "s", 0.01, MAX_LENGTH, 2.0)
        .display(1.0, 3.0)
        .describe("Length of the synthetic impulse response"),
    ParamDef::new("Decay", "%", 0.01, 100.0, 50.0)
        .display(1.0, 3.0)
        .describe("Decay time of the impulse envelope and filter sweep"),
    ParamDef::new("Diffusion", "%", 0.0, 100.0, 100.0).describe("Density of the synthetic impulse response"),
    ParamDef::new("StereoSpread", "%", 0.0, 100.0, 30.0).describe("Decay variation between channels"),
    ParamDef::new("Cut High", "Hz", 1.0, 20000.0, 10000.0)
        .display(1.0, 3.0)
        .describe("Filter cutoff at the start of the impulse"),
    ParamDef::new("Cut Low", "Hz", 1.0, 20000.0, 8000.0)
        .display(1.0, 3.0)
        .describe("Filter cutoff at the end of the impulse"),
    ParamDef::new("Resonance", "%", 0.0, 1.0, 0.0)
        .display(100.0, 3.0)
        .describe("Resonance of the impulse filter"),
    ParamDef::new("Use Sample", "", -1.0, (SLOT_COUNT - 1) as f32, -1.0)
        .describe("-1 = synthetic impulse, otherwise the sample bank slot to use"),
    ParamDef::new("Reverse", "", 0.0, 1.0, 0.0).describe("Play the impulse response backwards"),
];

pub static DEFINITION: EffectDefinition = EffectDefinition {
    name: NAME,
    params: PARAMS,
};

/// Parameters that shape the impulse, in declaration order
const SHAPE_PARAMS: [usize; 9] = [
    param::TIME,
    param::DECAY,
    param::DIFFUSION,
    param::STEREO_SPREAD,
    param::CUT_HIGH,
    param::CUT_LOW,
    param::RESONANCE,
    param::USE_SAMPLE,
    param::REVERSE,
];

/// Everything an impulse build depends on
#[derive(Debug, Clone, PartialEq)]
struct ImpulseKey {
    channels: usize,
    block: usize,
    sample_rate: u32,
    shape: [f32; SHAPE_PARAMS.len()],
    slot: Option<usize>,
    generation: u64,
}

impl ImpulseKey {
    fn value(&self, index: usize) -> f32 {
        SHAPE_PARAMS
            .iter()
            .position(|&p| p == index)
            .map_or(0.0, |i| self.shape[i])
    }
}

/// Render one normalized impulse per channel, each a whole number of blocks long
fn render_impulses(key: &ImpulseKey, sample: Option<&IrSample>) -> Vec<Vec<f32>> {
    let sr = key.sample_rate as f32;
    let placeholder;
    let source = match (key.slot, sample) {
        (None, _) => None,
        (Some(_), Some(s)) if !s.is_empty() => Some(s),
        (Some(_), _) => {
            let mut data = vec![0.0; PLACEHOLDER_FRAMES * key.channels];
            data[..key.channels].fill(1.0);
            placeholder = IrSample {
                data,
                frames: PLACEHOLDER_FRAMES,
                channels: key.channels,
                sample_rate: key.sample_rate,
                name: String::new(),
            };
            Some(&placeholder)
        }
    };

    let length = match source {
        None => (sr * key.value(param::TIME)).ceil() as usize,
        Some(s) => (s.frames as f32 * sr / s.sample_rate as f32).ceil() as usize,
    }
    .max(1);
    let partitions = length.div_ceil(key.block);
    let total = partitions * key.block;

    let cut_high = 2.0 * (0.25 * PI * key.value(param::CUT_HIGH) / sr).sin();
    let cut_low = 2.0 * (0.25 * PI * key.value(param::CUT_LOW) / sr).sin();
    let bandwidth = (0.9 - 0.89 * key.value(param::RESONANCE)).powi(2);
    let filter_gain = 0.5 * (1.0 - bandwidth * bandwidth);
    let spread = key.value(param::STEREO_SPREAD);
    let decay = key.value(param::DECAY);
    let density = 10.0 - 0.09 * key.value(param::DIFFUSION);
    let reverse = key.value(param::REVERSE) > 0.5;

    let mut random = Random::default();
    (0..key.channels)
        .map(|ch| {
            let decay_rate = (spread * random.range(0.0, 0.01) - 1.0) / (length as f32 * 0.01 * decay);

            let mut impulse: Vec<f32> = match source {
                None => (0..total)
                    .map(|n| {
                        let envelope = (decay_rate * n as f32).exp();
                        envelope * random.range(0.1, 1.0).powf(density) * random.range(-1.0, 1.0)
                    })
                    .collect(),
                Some(s) => {
                    let speed = s.sample_rate as f32 / sr;
                    let last = s.frames - 1;
                    (0..total)
                        .map(|n| {
                            let pos = n as f32 * speed;
                            let i1 = (pos.floor() as usize).min(last);
                            let i2 = (i1 + 1).min(last);
                            let frac = (pos - i1 as f32).clamp(0.0, 1.0);
                            let s1 = s.get(i1, ch);
                            s1 + (s.get(i2, ch) - s1) * frac
                        })
                        .collect()
                }
            };

            // Resonant filter whose cutoff slides from high to low with the envelope
            let (mut lpf, mut bpf) = (0.0f32, 0.0f32);
            for (n, x) in impulse.iter_mut().enumerate() {
                let envelope = (decay_rate * n as f32).exp();
                let cut = cut_low + (cut_high - cut_low) * envelope;
                lpf += cut * bpf;
                bpf += cut * (*x - lpf - bpf * bandwidth);
                lpf += cut * bpf;
                bpf -= cut * (lpf + bpf * bandwidth);
                *x = filter_gain * lpf;
            }

            let power: f32 = impulse.iter().map(|x| x * x).sum();
            if power > 0.0 && power.is_finite() {
                let scale = power.sqrt().recip();
                impulse.iter_mut().for_each(|x| *x *= scale);
            }

            if reverse {
                impulse.reverse();
            }
            impulse
        })
        .collect()
}

/// Integrated peak envelope with its mean slope removed, for box-filtered previews
fn preview_curve(impulse: &[f32]) -> Vec<f32> {
    let mut curve = Vec::with_capacity(impulse.len());
    let (mut sum, mut peak) = (0.0f64, 0.0f64);
    for &x in impulse {
        let a = x.abs() as f64;
        peak = if a > peak { a } else { peak * 0.99 + 1.0e-9 };
        sum += peak;
        curve.push(sum);
    }
    let slope = sum / impulse.len().max(1) as f64;
    curve
        .iter()
        .enumerate()
        .map(|(n, &c)| (c - n as f64 * slope) as f32)
        .collect()
}

/// Per-channel partitions and frequency-domain delay line
struct ChannelConvolver {
    impulse: Box<[f32]>,
    partitions: Vec<Box<[Complex<f32>]>>,
    history: Vec<Box<[Complex<f32>]>>,
    /// Previous block followed by the current one
    frame: Box<[f32]>,
}

impl ChannelConvolver {
    fn new(impulse: Vec<f32>, block: usize) -> Self {
        let fft_size = block * 2;
        let partitions: Vec<Box<[Complex<f32>]>> = impulse
            .chunks(block)
            .map(|chunk| {
                let mut h = vec![Complex::new(0.0, 0.0); fft_size].into_boxed_slice();
                for (dst, &x) in h.iter_mut().zip(chunk) {
                    dst.re = x;
                }
                fft::forward(&mut h, Precision::Single);
                h
            })
            .collect();
        let history = (0..partitions.len())
            .map(|_| vec![Complex::new(0.0, 0.0); fft_size].into_boxed_slice())
            .collect();

        Self {
            impulse: impulse.into_boxed_slice(),
            partitions,
            history,
            frame: vec![0.0; fft_size].into_boxed_slice(),
        }
    }
}

struct Engine {
    key: ImpulseKey,
    block: usize,
    /// Delay-line slot of the newest input spectrum
    cursor: usize,
    channels: Vec<ChannelConvolver>,
    accum: Box<[Complex<f32>]>,
}

impl Engine {
    fn build(key: ImpulseKey, impulses: Vec<Vec<f32>>) -> Self {
        let block = key.block;
        Self {
            channels: impulses
                .into_iter()
                .map(|impulse| ChannelConvolver::new(impulse, block))
                .collect(),
            accum: vec![Complex::new(0.0, 0.0); block * 2].into_boxed_slice(),
            cursor: 0,
            block,
            key,
        }
    }

    fn partition_count(&self) -> usize {
        self.channels.first().map_or(0, |c| c.partitions.len())
    }

    fn process(&mut self, input: &[Sample], output: &mut [Sample], layout: &BlockLayout, wet: f32, gain: f32) {
        let block = self.block;
        let count = self.partition_count();
        let cursor = self.cursor;
        let channels = layout.out_channels;

        for (ch, conv) in self.channels.iter_mut().enumerate() {
            conv.frame.copy_within(block.., 0);
            for n in 0..block {
                conv.frame[block + n] = layout.input(input, n, ch);
            }

            let x = &mut conv.history[cursor];
            for (c, &s) in x.iter_mut().zip(conv.frame.iter()) {
                *c = Complex::new(s, 0.0);
            }
            fft::forward(x, Precision::Single);

            self.accum.fill(Complex::new(0.0, 0.0));
            for (k, h) in conv.partitions.iter().enumerate() {
                let x = &conv.history[(k + cursor) % count];
                for ((y, h), x) in self.accum.iter_mut().zip(h.iter()).zip(x.iter()) {
                    *y += h * x;
                }
            }
            fft::backward(&mut self.accum, Precision::Single);

            for n in 0..block {
                let dry = conv.frame[block + n];
                output[n * channels + ch] = dry + (gain * self.accum[block + n].re - dry) * wet;
            }
        }

        self.cursor = if cursor == 0 { count - 1 } else { cursor - 1 };
    }
}

/// Preview curves shared with the display
struct ReverbDisplay {
    curves: Mutex<Vec<Vec<f32>>>,
}

impl FloatBufferSource for ReverbDisplay {
    fn read_float_buffer(&self, name: &str, buffer: &mut [Sample]) -> NfxResult<()> {
        let Some(channel) = channel_suffix(name, "Impulse") else {
            return unknown_buffer(name, buffer);
        };
        buffer.fill(0.0);
        let curves = self.curves.lock();
        let Some(curve) = curves.get(channel) else {
            return Ok(());
        };
        if buffer.is_empty() || curve.len() < 3 {
            return Ok(());
        }

        // Box-filter resampling of the integrated curve: f(x) = (F(x + dx) - F(x)) / dx
        let scale = (curve.len() - 2) as f32 / buffer.len() as f32;
        let last = curve.len() - 2;
        let mut previous = 0.0;
        for (n, dst) in buffer.iter_mut().enumerate() {
            let t = n as f32 * scale;
            let i = (t.floor() as usize).min(last);
            let next = curve[i] + (curve[i + 1] - curve[i]) * (t - i as f32);
            *dst = (next - previous) / scale;
            previous = next;
        }
        Ok(())
    }
}

/// Partitioned convolution reverb
pub struct ConvolutionReverb {
    sample_rate: u32,
    max_channels: usize,
    params: Arc<ParamTable>,
    bank: Arc<SampleBank>,
    engine: Option<Engine>,
    display: Arc<ReverbDisplay>,
    /// Last unusable block size that was reported
    rejected_block: Option<usize>,
}

impl ConvolutionReverb {
    /// Reverb reading uploaded impulses from the process-wide bank
    pub fn new(config: &EffectConfig) -> Self {
        Self::with_bank(config, SampleBank::global())
    }

    pub fn with_bank(config: &EffectConfig, bank: Arc<SampleBank>) -> Self {
        let config = config.sanitized();
        let mut reverb = Self {
            sample_rate: config.sample_rate,
            max_channels: config.max_channels,
            params: Arc::new(ParamTable::from_definitions(PARAMS)),
            bank,
            engine: None,
            display: Arc::new(ReverbDisplay {
                curves: Mutex::new(Vec::new()),
            }),
            rejected_block: None,
        };

        let block = if config.max_buffer_size.is_power_of_two() {
            config.max_buffer_size
        } else {
            INITIAL_BLOCK
        };
        reverb.prepare(INITIAL_CHANNELS.min(config.max_channels), block);
        reverb
    }

    fn current_key(&self, channels: usize, block: usize) -> ImpulseKey {
        let slot = usize::try_from(self.params.value(param::USE_SAMPLE) as i32).ok();
        ImpulseKey {
            channels,
            block,
            sample_rate: self.sample_rate,
            shape: SHAPE_PARAMS.map(|p| self.params.value(p)),
            slot,
            generation: slot.map_or(0, |s| self.bank.generation(s)),
        }
    }

    /// Rebuild the impulse if anything it depends on changed
    fn prepare(&mut self, channels: usize, block: usize) {
        let key = self.current_key(channels, block);
        if self.engine.as_ref().is_some_and(|e| e.key == key) {
            return;
        }

        let impulses = match key.slot {
            Some(slot) => self.bank.with_sample(slot, |s| render_impulses(&key, s)),
            None => render_impulses(&key, None),
        };
        log::debug!(
            "rebuilt reverb impulse: {} ch, block {}, {} samples, slot {:?}",
            channels,
            block,
            impulses.first().map_or(0, Vec::len),
            key.slot
        );

        *self.display.curves.lock() = impulses.iter().map(|impulse| preview_curve(impulse)).collect();
        self.engine = Some(Engine::build(key, impulses));
    }

    /// Normalized impulse response currently used for `channel`
    pub fn impulse_response(&self, channel: usize) -> Option<&[f32]> {
        self.engine
            .as_ref()
            .and_then(|e| e.channels.get(channel))
            .map(|c| &*c.impulse)
    }

    /// Number of partitions in the current impulse
    pub fn partition_count(&self) -> usize {
        self.engine.as_ref().map_or(0, Engine::partition_count)
    }

    /// Display name of the impulse source currently selected
    pub fn sample_name(&self) -> String {
        self.bank.sample_name(self.params.value(param::USE_SAMPLE) as i32)
    }
}

impl AudioEffect for ConvolutionReverb {
    fn definition(&self) -> &'static EffectDefinition {
        &DEFINITION
    }

    fn params(&self) -> &ParamTable {
        &self.params
    }

    fn process(
        &mut self,
        input: &[Sample],
        output: &mut [Sample],
        frames: usize,
        in_channels: usize,
        out_channels: usize,
    ) -> NfxResult<()> {
        let layout = match BlockLayout::new(input, output, frames, in_channels, out_channels, self.max_channels) {
            Ok(layout) if layout.frames == frames => layout,
            Ok(_) => {
                pass_through(input, output, frames, in_channels, out_channels);
                return Err(NfxError::InvalidConfig(format!(
                    "buffers hold fewer than {frames} frames"
                )));
            }
            Err(e) => {
                pass_through(input, output, frames, in_channels, out_channels);
                return Err(e);
            }
        };

        if frames == 0 {
            return Ok(());
        }
        if !frames.is_power_of_two() {
            if self.rejected_block != Some(frames) {
                log::warn!("reverb block size {frames} is not a power of two, passing through dry");
                self.rejected_block = Some(frames);
            }
            pass_through(input, output, frames, in_channels, out_channels);
            return Ok(());
        }

        self.prepare(out_channels, frames);
        let wet = self.params.value(param::WET) * 0.01;
        let gain = Decibels(self.params.value(param::GAIN)).to_gain();
        if let Some(engine) = self.engine.as_mut() {
            engine.process(input, output, &layout, wet, gain);
        }
        Ok(())
    }

    fn display(&self) -> Arc<dyn FloatBufferSource> {
        Arc::clone(&self.display) as Arc<dyn FloatBufferSource>
    }

    fn reset(&mut self) {
        if let Some(engine) = self.engine.as_mut() {
            for conv in &mut engine.channels {
                conv.frame.fill(0.0);
                conv.history
                    .iter_mut()
                    .for_each(|x| x.fill(Complex::new(0.0, 0.0)));
            }
            engine.cursor = 0;
        }
    }
}
