//! Oscilloscope
//!
//! Passes audio through unchanged while recording each input channel into
//! a history buffer. The display reads:
//! - `Waveform{n}`: the last `Window` seconds of channel `n`, resampled to
//!   the requested number of points and scaled by `Scale`; the final slot
//!   holds the number of points produced
//! - `Raw{n}`: the most recent samples of channel `n`, one per slot
//! - `Spectrum{n}`: peak-hold spectrum of channel `n` (only updated while
//!   `Mode` is 1 or above)

use nfx_core::{EffectConfig, EffectDefinition, NfxResult, ParamDef, ParamTable, Sample};
use nfx_dsp::{HistoryBuffer, Precision, SpectrumAnalyzer, SpectrumReader, Tap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::equalizer::spectrum_decay;
use crate::{channel_suffix, pass_through, unknown_buffer, AudioEffect, BlockLayout, FloatBufferSource};

pub const NAME: &str = "Oscilloscope";

/// Parameter indices
pub mod param {
    pub const WINDOW: usize = 0;
    pub const SCALE: usize = 1;
    pub const MODE: usize = 2;
    pub const SPECTRUM_DECAY: usize = 3;
}

const PARAMS: &[ParamDef] = &[
    ParamDef::new("Window", "s", 0.01, 2.0, 0.1)
        .display(1.0, 3.0)
        .describe("Length of the displayed window"),
    ParamDef::new("Scale", "%", 0.01, 10.0, 1.0)
        .display(100.0, 3.0)
        .describe("Amplitude scaling of the displayed signal"),
    ParamDef::new("Mode", "", 0.0, 3.0, 0.0).describe("Display mode (0=scope, 1=spectrum)"),
    ParamDef::new("SpectrumDecay", "dB/s", -100.0, 0.0, -10.0).describe("Falloff of held spectrum peaks"),
];

pub static DEFINITION: EffectDefinition = EffectDefinition {
    name: NAME,
    params: PARAMS,
};

struct ScopeDisplay {
    params: Arc<ParamTable>,
    sample_rate: f32,
    histories: Vec<HistoryBuffer>,
    spectra: Vec<SpectrumReader>,
    active_channels: AtomicUsize,
}

impl ScopeDisplay {
    fn read_waveform(&self, history: &HistoryBuffer, buffer: &mut [Sample]) {
        let window = self.params.value(param::WINDOW) * self.sample_rate;
        let produced = history.read_buffer(buffer, window, 0.0);
        let scale = self.params.value(param::SCALE);
        let points = buffer.len().saturating_sub(1);
        buffer[points - produced..points]
            .iter_mut()
            .for_each(|s| *s *= scale);
    }
}

impl FloatBufferSource for ScopeDisplay {
    fn read_float_buffer(&self, name: &str, buffer: &mut [Sample]) -> NfxResult<()> {
        if let Some(history) = channel_suffix(name, "Waveform").and_then(|ch| self.histories.get(ch)) {
            if !buffer.is_empty() {
                self.read_waveform(history, buffer);
            }
        } else if let Some(history) = channel_suffix(name, "Raw").and_then(|ch| self.histories.get(ch)) {
            history.latest(buffer);
        } else if let Some(spectra) = channel_suffix(name, "Spectrum").and_then(|ch| self.spectra.get(ch)) {
            spectra.read_buffer(buffer, Tap::Input);
        } else {
            return unknown_buffer(name, buffer);
        }
        Ok(())
    }
}

/// Pass-through waveform and spectrum monitor
pub struct Oscilloscope {
    sample_rate: f32,
    params: Arc<ParamTable>,
    analyzers: Vec<SpectrumAnalyzer>,
    display: Arc<ScopeDisplay>,
}

impl Oscilloscope {
    pub fn new(config: &EffectConfig) -> Self {
        let config = config.sanitized();
        let sample_rate = config.sample_rate as f32;
        let params = Arc::new(ParamTable::from_definitions(PARAMS));
        let analyzers: Vec<_> = (0..config.max_channels)
            .map(|_| SpectrumAnalyzer::new(config.analyzer_fft_size).with_precision(Precision::Single))
            .collect();
        let display = Arc::new(ScopeDisplay {
            params: Arc::clone(&params),
            sample_rate,
            histories: (0..config.max_channels)
                .map(|_| HistoryBuffer::new(config.history_len()))
                .collect(),
            spectra: analyzers.iter().map(SpectrumAnalyzer::reader).collect(),
            active_channels: AtomicUsize::new(0),
        });

        Self {
            sample_rate,
            params,
            analyzers,
            display,
        }
    }

    /// Channel count of the most recent block
    pub fn active_channels(&self) -> usize {
        self.display.active_channels.load(Ordering::Relaxed)
    }
}

impl AudioEffect for Oscilloscope {
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
        pass_through(input, output, frames, in_channels, out_channels);
        let layout = BlockLayout::new(input, output, frames, in_channels, out_channels, self.analyzers.len())?;
        let frames = layout.frames;
        if frames == 0 {
            return Ok(());
        }

        for (ch, history) in self.display.histories[..in_channels].iter().enumerate() {
            history.feed_interleaved(&input[ch..], frames, in_channels);
        }

        if self.params.value(param::MODE) >= 1.0 {
            let decay = spectrum_decay(self.params.value(param::SPECTRUM_DECAY), frames, self.sample_rate);
            for (ch, analyzer) in self.analyzers[..in_channels].iter_mut().enumerate() {
                analyzer.analyze_input(&input[ch..], in_channels, frames, decay);
            }
        }

        self.display.active_channels.store(in_channels, Ordering::Relaxed);
        Ok(())
    }

    fn display(&self) -> Arc<dyn FloatBufferSource> {
        Arc::clone(&self.display) as Arc<dyn FloatBufferSource>
    }

    fn reset(&mut self) {
        self.display.histories.iter().for_each(HistoryBuffer::clear);
        self.analyzers.iter_mut().for_each(SpectrumAnalyzer::reset);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nfx_core::NfxError;

    fn scope() -> Oscilloscope {
        Oscilloscope::new(&EffectConfig::for_host(1000, 64))
    }

    #[test]
    fn test_pass_through() {
        let mut scope = scope();
        let input: Vec<f32> = (0..128).map(|i| i as f32 * 0.01).collect();
        let mut output = vec![0.0; 128];
        scope.process(&input, &mut output, 64, 2, 2).unwrap();
        assert_eq!(input, output);
        assert_eq!(scope.active_channels(), 2);
    }

    #[test]
    fn test_waveform_read() {
        let mut scope = scope();
        // 0.1 s window at 1 kHz = 100 samples
        let input: Vec<f32> = (0..200).map(|i| i as f32).collect();
        let mut output = vec![0.0; 200];
        scope.process(&input, &mut output, 200, 1, 1).unwrap();
        scope.set_parameter(param::SCALE, 2.0).unwrap();

        let mut buffer = vec![0.0; 101];
        scope.read_float_buffer("Waveform0", &mut buffer).unwrap();
        assert_eq!(buffer[100], 100.0);
        assert_relative_eq!(buffer[99], 398.0);
        assert_relative_eq!(buffer[0], 2.0 * 100.0);
    }

    #[test]
    fn test_raw_read() {
        let mut scope = scope();
        let input = [1.0, -1.0, 2.0, -2.0, 3.0, -3.0];
        let mut output = [0.0; 6];
        scope.process(&input, &mut output, 3, 2, 2).unwrap();
        let mut raw = [0.0; 3];
        scope.read_float_buffer("Raw1", &mut raw).unwrap();
        assert_eq!(raw, [-1.0, -2.0, -3.0]);
    }

    #[test]
    fn test_spectrum_mode() {
        let mut scope = Oscilloscope::new(&EffectConfig {
            sample_rate: 48000,
            analyzer_fft_size: 512,
            ..Default::default()
        });
        let input: Vec<f32> = (0..512)
            .map(|i| (2.0 * std::f32::consts::PI * 3000.0 * i as f32 / 48000.0).sin())
            .collect();
        let mut output = vec![0.0; 512];
        let mut spectrum = vec![0.0; 64];

        scope.process(&input, &mut output, 512, 1, 1).unwrap();
        scope.process(&input, &mut output, 512, 1, 1).unwrap();
        scope.read_float_buffer("Spectrum0", &mut spectrum).unwrap();
        assert!(spectrum.iter().all(|&x| x == 0.0));

        scope.set_parameter(param::MODE, 1.0).unwrap();
        scope.process(&input, &mut output, 512, 1, 1).unwrap();
        scope.process(&input, &mut output, 512, 1, 1).unwrap();
        scope.read_float_buffer("Spectrum0", &mut spectrum).unwrap();
        assert!(spectrum.iter().any(|&x| x > 1.0));
    }

    #[test]
    fn test_empty_stereo_block() {
        let mut scope = Oscilloscope::new(&EffectConfig::default());
        scope.set_parameter(param::MODE, 1.0).unwrap();
        scope.process(&[], &mut [], 0, 2, 2).unwrap();
        // Input shorter than one frame clamps to zero frames
        let mut output = [0.0; 2];
        scope.process(&[0.5], &mut output, 4, 2, 2).unwrap();

        let mut raw = [1.0; 4];
        scope.read_float_buffer("Raw1", &mut raw).unwrap();
        assert_eq!(raw, [0.0; 4]);
        let mut waveform = [1.0; 9];
        scope.read_float_buffer("Waveform0", &mut waveform).unwrap();
        assert_eq!(waveform[8], 0.0);
    }

    #[test]
    fn test_unknown_channel_buffer() {
        let scope = scope();
        let mut buffer = vec![1.0; 4];
        assert!(matches!(
            scope.read_float_buffer("Waveform9", &mut buffer),
            Err(NfxError::UnknownBuffer(_))
        ));
        assert!(buffer.iter().all(|&x| x == 0.0));
    }
}
