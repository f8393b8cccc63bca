//! nfx-effects: Host-facing audio effects for NativeFX
//!
//! Each effect is driven by a host mixer through the same small surface:
//! create, process interleaved blocks, set and get parameters by index, and
//! read named float buffers for display. Display reads come from a separate
//! UI thread, so every effect hands out an `Arc<dyn FloatBufferSource>` that
//! shares only lock-free state (or, for the reverb preview, a mutex the
//! audio thread touches only while rebuilding its impulse).
//!
//! ## Effects
//! - `equalizer` - Three-band EQ with input/output spectrum display
//! - `oscilloscope` - Pass-through waveform and spectrum monitor
//! - `convolution` - Partitioned convolution reverb with synthetic or uploaded impulses
//! - `sample_bank` - Cross-instance impulse response slots

pub mod convolution;
pub mod equalizer;
pub mod oscilloscope;
pub mod sample_bank;

pub use convolution::ConvolutionReverb;
pub use equalizer::Equalizer;
pub use oscilloscope::Oscilloscope;
pub use sample_bank::{IrSample, SampleBank};

use nfx_core::{EffectConfig, EffectDefinition, NfxError, NfxResult, ParamTable, Sample};
use std::sync::Arc;

/// Named float buffers an effect exposes to its UI
pub trait FloatBufferSource: Send + Sync {
    /// Fill `buffer` with the display data called `name`.
    ///
    /// Unknown names zero-fill the buffer and return
    /// [`NfxError::UnknownBuffer`].
    fn read_float_buffer(&self, name: &str, buffer: &mut [Sample]) -> NfxResult<()>;
}

/// Effect instance trait - the interface a host mixer drives
pub trait AudioEffect: Send {
    /// Static name and parameter table
    fn definition(&self) -> &'static EffectDefinition;

    /// Live parameter values
    fn params(&self) -> &ParamTable;

    /// Process `frames` interleaved frames from `input` into `output`
    fn process(
        &mut self,
        input: &[Sample],
        output: &mut [Sample],
        frames: usize,
        in_channels: usize,
        out_channels: usize,
    ) -> NfxResult<()>;

    /// Set a parameter; values are clamped to the declared range
    fn set_parameter(&self, index: usize, value: f32) -> NfxResult<()> {
        self.params().set(index, value)
    }

    /// Get a parameter
    fn parameter(&self, index: usize) -> NfxResult<f32> {
        self.params().get(index)
    }

    /// Handle for display reads from another thread
    fn display(&self) -> Arc<dyn FloatBufferSource>;

    /// Read a named display buffer
    fn read_float_buffer(&self, name: &str, buffer: &mut [Sample]) -> NfxResult<()> {
        self.display().read_float_buffer(name, buffer)
    }

    /// Clear all processing state; parameters are kept
    fn reset(&mut self) {}
}

/// Names accepted by [`create_effect`]
pub const EFFECT_NAMES: &[&str] = &[equalizer::NAME, oscilloscope::NAME, convolution::NAME];

/// Create an effect instance by its registered name
pub fn create_effect(name: &str, config: &EffectConfig) -> NfxResult<Box<dyn AudioEffect>> {
    let effect: Box<dyn AudioEffect> = match name {
        equalizer::NAME => Box::new(Equalizer::new(config)),
        oscilloscope::NAME => Box::new(Oscilloscope::new(config)),
        convolution::NAME => Box::new(ConvolutionReverb::new(config)),
        _ => return Err(NfxError::UnknownEffect(name.to_string())),
    };
    log::debug!("created {name} (sample_rate={})", config.sample_rate);
    Ok(effect)
}

/// Static definitions of every registered effect
pub fn definitions() -> [&'static EffectDefinition; 3] {
    [
        &equalizer::DEFINITION,
        &oscilloscope::DEFINITION,
        &convolution::DEFINITION,
    ]
}

/// Frame and channel counts of one process call, clamped to the buffers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BlockLayout {
    pub frames: usize,
    pub in_channels: usize,
    pub out_channels: usize,
}

impl BlockLayout {
    /// Validate channel counts against `max_channels` and clamp `frames`
    /// to what both buffers hold
    pub fn new(
        input: &[Sample],
        output: &[Sample],
        frames: usize,
        in_channels: usize,
        out_channels: usize,
        max_channels: usize,
    ) -> NfxResult<Self> {
        if in_channels == 0 || out_channels == 0 {
            return Err(NfxError::InvalidConfig("channel count must be > 0".into()));
        }
        if in_channels > max_channels || out_channels > max_channels {
            return Err(NfxError::InvalidConfig(format!(
                "{in_channels} in / {out_channels} out channels exceeds {max_channels}"
            )));
        }
        let frames = frames
            .min(input.len() / in_channels)
            .min(output.len() / out_channels);
        Ok(Self {
            frames,
            in_channels,
            out_channels,
        })
    }

    /// Input sample for `frame`/`channel`, silence for channels the input lacks
    #[inline]
    pub fn input(&self, input: &[Sample], frame: usize, channel: usize) -> Sample {
        if channel < self.in_channels {
            input[frame * self.in_channels + channel]
        } else {
            0.0
        }
    }
}

/// Copy input channels straight to the output, zeroing any extra output channels
pub(crate) fn pass_through(
    input: &[Sample],
    output: &mut [Sample],
    frames: usize,
    in_channels: usize,
    out_channels: usize,
) {
    if out_channels == 0 {
        return;
    }
    let frames = if in_channels == 0 {
        frames.min(output.len() / out_channels)
    } else {
        frames
            .min(input.len() / in_channels)
            .min(output.len() / out_channels)
    };
    for (n, out_frame) in output.chunks_exact_mut(out_channels).take(frames).enumerate() {
        for (ch, dst) in out_frame.iter_mut().enumerate() {
            *dst = if ch < in_channels {
                input[n * in_channels + ch]
            } else {
                0.0
            };
        }
    }
}

/// Zero-fill and report an unknown display buffer
pub(crate) fn unknown_buffer(name: &str, buffer: &mut [Sample]) -> NfxResult<()> {
    buffer.fill(0.0);
    Err(NfxError::UnknownBuffer(name.to_string()))
}

/// Parse the channel index out of names like `Waveform3`
pub(crate) fn channel_suffix(name: &str, prefix: &str) -> Option<usize> {
    name.strip_prefix(prefix)
        .filter(|digits| !digits.is_empty())
        .and_then(|digits| digits.parse().ok())
}
