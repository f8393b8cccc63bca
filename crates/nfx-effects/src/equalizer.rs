//! Three-band equalizer
//!
//! Per channel: high shelf, peaking mid band and low shelf in series, then
//! master gain. When `ShowSpectrum` is on, the first input and output
//! channels feed a peak-hold analyzer whose spectra back the `InputSpec`
//! and `OutputSpec` display buffers. `Coeffs` exports the three band
//! filters (low, mid, high; five values each) for drawing the curve.

use nfx_core::{
    Decibels, EffectConfig, EffectDefinition, NfxResult, ParamDef, ParamTable, Sample,
};
use nfx_dsp::biquad::{Biquad, BiquadCoeffs};
use nfx_dsp::random::Random;
use nfx_dsp::{MonoProcessor, Processor, SpectrumAnalyzer, SpectrumReader, Tap};
use std::sync::Arc;

use crate::{pass_through, unknown_buffer, AudioEffect, BlockLayout, FloatBufferSource};

pub const NAME: &str = "Equalizer";

/// Parameter indices
pub mod param {
    pub const MASTER_GAIN: usize = 0;
    pub const LOW_GAIN: usize = 1;
    pub const MID_GAIN: usize = 2;
    pub const HIGH_GAIN: usize = 3;
    pub const LOW_FREQ: usize = 4;
    pub const MID_FREQ: usize = 5;
    pub const HIGH_FREQ: usize = 6;
    pub const LOW_Q: usize = 7;
    pub const MID_Q: usize = 8;
    pub const HIGH_Q: usize = 9;
    pub const USE_LOG_SCALE: usize = 10;
    pub const SHOW_SPECTRUM: usize = 11;
    pub const SPECTRUM_DECAY: usize = 12;
}

const PARAMS: &[ParamDef] = &[
    ParamDef::new("MasterGain", "dB", -100.0, 100.0, 0.0).describe("Overall gain applied"),
    ParamDef::new("LowGain", "dB", -100.0, 100.0, 0.0).describe("Gain of the low shelf band"),
    ParamDef::new("MidGain", "dB", -100.0, 100.0, 0.0).describe("Gain of the peaking mid band"),
    ParamDef::new("HighGain", "dB", -100.0, 100.0, 0.0).describe("Gain of the high shelf band"),
    ParamDef::new("LowFreq", "Hz", 0.01, 24000.0, 800.0)
        .display(1.0, 3.0)
        .describe("Corner frequency of the low shelf"),
    ParamDef::new("MidFreq", "Hz", 0.01, 24000.0, 4000.0)
        .display(1.0, 3.0)
        .describe("Center frequency of the mid band"),
    ParamDef::new("HighFreq", "Hz", 0.01, 24000.0, 8000.0)
        .display(1.0, 3.0)
        .describe("Corner frequency of the high shelf"),
    ParamDef::new("LowQ", "", 0.01, 10.0, 0.707)
        .display(1.0, 3.0)
        .describe("Q of the low band"),
    ParamDef::new("MidQ", "", 0.01, 10.0, 0.707)
        .display(1.0, 3.0)
        .describe("Q of the mid band"),
    ParamDef::new("HighQ", "", 0.01, 10.0, 0.707)
        .display(1.0, 3.0)
        .describe("Q of the high band"),
    ParamDef::new("UseLogScale", "", 0.0, 1.0, 1.0).describe("Plot curves on a logarithmic frequency axis"),
    ParamDef::new("ShowSpectrum", "", 0.0, 1.0, 0.0).describe("Analyze input and output spectra"),
    ParamDef::new("SpectrumDecay", "dB/s", -50.0, 0.0, -10.0).describe("Falloff of held spectrum peaks"),
];

pub static DEFINITION: EffectDefinition = EffectDefinition {
    name: NAME,
    params: PARAMS,
};

/// The three band filters for the current parameters
fn band_coeffs(params: &ParamTable, sample_rate: f32) -> [BiquadCoeffs; 3] {
    use param::*;
    [
        BiquadCoeffs::low_shelf(
            params.value(LOW_FREQ),
            params.value(LOW_Q),
            params.value(LOW_GAIN),
            sample_rate,
        ),
        BiquadCoeffs::peaking(
            params.value(MID_FREQ),
            params.value(MID_Q),
            params.value(MID_GAIN),
            sample_rate,
        ),
        BiquadCoeffs::high_shelf(
            params.value(HIGH_FREQ),
            params.value(HIGH_Q),
            params.value(HIGH_GAIN),
            sample_rate,
        ),
    ]
}

/// Per-block spectrum falloff for a decay rate in dB/s
pub fn spectrum_decay(db_per_second: f32, frames: usize, sample_rate: f32) -> f32 {
    10.0_f32.powf(0.05 * db_per_second * frames as f32 / sample_rate)
}

#[derive(Default)]
struct ChannelFilters {
    low: Biquad,
    mid: Biquad,
    high: Biquad,
}

impl ChannelFilters {
    fn set(&mut self, [low, mid, high]: &[BiquadCoeffs; 3]) {
        self.low.set_coeffs(*low);
        self.mid.set_coeffs(*mid);
        self.high.set_coeffs(*high);
    }

    #[inline]
    fn process(&mut self, x: Sample) -> Sample {
        let y = self.high.process_sample(x);
        let y = self.mid.process_sample(y);
        self.low.process_sample(y)
    }

    fn reset(&mut self) {
        self.low.reset();
        self.mid.reset();
        self.high.reset();
    }
}

struct EqualizerDisplay {
    params: Arc<ParamTable>,
    sample_rate: f32,
    spectra: SpectrumReader,
}

impl FloatBufferSource for EqualizerDisplay {
    fn read_float_buffer(&self, name: &str, buffer: &mut [Sample]) -> NfxResult<()> {
        match name {
            "InputSpec" => self.spectra.read_buffer(buffer, Tap::Input),
            "OutputSpec" => self.spectra.read_buffer(buffer, Tap::Output),
            "Coeffs" => {
                buffer.fill(0.0);
                let mut rest = buffer;
                for coeffs in band_coeffs(&self.params, self.sample_rate) {
                    rest = coeffs.store_coeffs(std::mem::take(&mut rest));
                }
            }
            _ => return unknown_buffer(name, buffer),
        }
        Ok(())
    }
}

/// Three-band EQ with spectrum display
pub struct Equalizer {
    sample_rate: f32,
    params: Arc<ParamTable>,
    filters: Vec<ChannelFilters>,
    random: Random,
    analyzer: SpectrumAnalyzer,
    display: Arc<EqualizerDisplay>,
}

impl Equalizer {
    pub fn new(config: &EffectConfig) -> Self {
        let config = config.sanitized();
        let sample_rate = config.sample_rate as f32;
        let params = Arc::new(ParamTable::from_definitions(PARAMS));
        let analyzer = SpectrumAnalyzer::new(config.analyzer_fft_size);
        let display = Arc::new(EqualizerDisplay {
            params: Arc::clone(&params),
            sample_rate,
            spectra: analyzer.reader(),
        });

        Self {
            sample_rate,
            params,
            filters: (0..config.max_channels).map(|_| ChannelFilters::default()).collect(),
            random: Random::default(),
            analyzer,
            display,
        }
    }

    pub fn analyzer(&self) -> &SpectrumAnalyzer {
        &self.analyzer
    }
}

impl AudioEffect for Equalizer {
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
        let layout = match BlockLayout::new(input, output, frames, in_channels, out_channels, self.filters.len()) {
            Ok(layout) => layout,
            Err(e) => {
                pass_through(input, output, frames, in_channels, out_channels);
                return Err(e);
            }
        };
        let frames = layout.frames;

        let coeffs = band_coeffs(&self.params, self.sample_rate);
        for filters in &mut self.filters[..out_channels] {
            filters.set(&coeffs);
        }

        let decay = spectrum_decay(self.params.value(param::SPECTRUM_DECAY), frames, self.sample_rate);
        let show_spectrum = self.params.value(param::SHOW_SPECTRUM) >= 0.5;
        if show_spectrum {
            self.analyzer
                .analyze_input(&input[..frames * in_channels], in_channels, frames, decay);
        }

        let master_gain = Decibels(self.params.value(param::MASTER_GAIN)).to_gain();
        for n in 0..frames {
            for (ch, filters) in self.filters[..out_channels].iter_mut().enumerate() {
                let kill_denormal = (self.random.next_u32() & 255) as f32 * 1.0e-9;
                let y = filters.process(layout.input(input, n, ch) + kill_denormal);
                output[n * out_channels + ch] = y * master_gain;
            }
        }

        if show_spectrum {
            self.analyzer
                .analyze_output(&output[..frames * out_channels], out_channels, frames, decay);
        }
        Ok(())
    }

    fn display(&self) -> Arc<dyn FloatBufferSource> {
        Arc::clone(&self.display) as Arc<dyn FloatBufferSource>
    }

    fn reset(&mut self) {
        self.filters.iter_mut().for_each(ChannelFilters::reset);
        self.random.seed(0);
        self.analyzer.reset();
    }
}
