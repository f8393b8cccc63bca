//! Per-instance effect configuration
//!
//! The host passes sample rate and maximum block size on create; the rest
//! has sensible defaults and can be overridden from JSON.

use serde::{Deserialize, Serialize};

use crate::{NfxError, NfxResult, MAX_CHANNELS};

/// Minimum analyzer FFT size
pub const MIN_FFT_SIZE: usize = 64;
/// Maximum analyzer FFT size
pub const MAX_FFT_SIZE: usize = 65536;

/// Configuration handed to an effect on creation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EffectConfig {
    /// Host sample rate in Hz
    pub sample_rate: u32,

    /// Largest block the host will pass to `process`
    pub max_buffer_size: usize,

    /// FFT size used by spectrum analyzers (power of two)
    pub analyzer_fft_size: usize,

    /// Length of waveform history kept per channel, in seconds
    pub history_seconds: f32,

    /// Number of channels the effect allocates state for
    pub max_channels: usize,
}

impl Default for EffectConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            max_buffer_size: 1024,
            analyzer_fft_size: 4096,
            history_seconds: 2.0,
            max_channels: MAX_CHANNELS,
        }
    }
}

impl EffectConfig {
    /// Config for a host create call; everything else stays at its default
    pub fn for_host(sample_rate: u32, max_buffer_size: usize) -> Self {
        Self {
            sample_rate,
            max_buffer_size,
            ..Default::default()
        }
    }

    /// Parse and validate a JSON config
    pub fn from_json(json: &str) -> NfxResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> NfxResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> NfxResult<()> {
        if self.sample_rate == 0 {
            return Err(NfxError::InvalidConfig("sample_rate must be > 0".into()));
        }
        if self.max_buffer_size == 0 {
            return Err(NfxError::InvalidConfig("max_buffer_size must be > 0".into()));
        }
        if !self.analyzer_fft_size.is_power_of_two()
            || !(MIN_FFT_SIZE..=MAX_FFT_SIZE).contains(&self.analyzer_fft_size)
        {
            return Err(NfxError::InvalidConfig(format!(
                "analyzer_fft_size {} must be a power of two in {}..={}",
                self.analyzer_fft_size, MIN_FFT_SIZE, MAX_FFT_SIZE
            )));
        }
        if !(self.history_seconds.is_finite() && self.history_seconds > 0.0) {
            return Err(NfxError::InvalidConfig("history_seconds must be > 0".into()));
        }
        if !(1..=MAX_CHANNELS).contains(&self.max_channels) {
            return Err(NfxError::InvalidConfig(format!(
                "max_channels must be in 1..={}",
                MAX_CHANNELS
            )));
        }
        Ok(())
    }

    /// Replace invalid fields with defaults, logging what was changed
    pub fn sanitized(&self) -> Self {
        let defaults = Self::default();
        let mut config = self.clone();
        if config.sample_rate == 0 {
            log::warn!("sample_rate 0 is invalid, using {}", defaults.sample_rate);
            config.sample_rate = defaults.sample_rate;
        }
        if config.max_buffer_size == 0 {
            config.max_buffer_size = defaults.max_buffer_size;
        }
        if !config.analyzer_fft_size.is_power_of_two()
            || !(MIN_FFT_SIZE..=MAX_FFT_SIZE).contains(&config.analyzer_fft_size)
        {
            log::warn!(
                "analyzer_fft_size {} is invalid, using {}",
                config.analyzer_fft_size,
                defaults.analyzer_fft_size
            );
            config.analyzer_fft_size = defaults.analyzer_fft_size;
        }
        if !(config.history_seconds.is_finite() && config.history_seconds > 0.0) {
            config.history_seconds = defaults.history_seconds;
        }
        config.max_channels = config.max_channels.clamp(1, MAX_CHANNELS);
        config
    }

    /// History length in samples
    pub fn history_len(&self) -> usize {
        ((self.sample_rate as f32 * self.history_seconds).ceil() as usize).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(EffectConfig::default().validate().is_ok());
        assert_eq!(EffectConfig::default().history_len(), 96000);
    }

    #[test]
    fn test_from_json_partial() {
        let config = EffectConfig::from_json(r#"{ "sample_rate": 44100, "analyzer_fft_size": 1024 }"#).unwrap();
        assert_eq!(config.sample_rate, 44100);
        assert_eq!(config.analyzer_fft_size, 1024);
        assert_eq!(config.max_channels, MAX_CHANNELS);
    }

    #[test]
    fn test_from_json_rejects_bad_fft_size() {
        let err = EffectConfig::from_json(r#"{ "analyzer_fft_size": 1000 }"#).unwrap_err();
        assert!(matches!(err, NfxError::InvalidConfig(_)));
    }

    #[test]
    fn test_from_json_syntax_error() {
        assert!(matches!(EffectConfig::from_json("{ nope"), Err(NfxError::Config(_))));
    }

    #[test]
    fn test_sanitized() {
        let config = EffectConfig {
            sample_rate: 0,
            analyzer_fft_size: 3,
            max_channels: 64,
            history_seconds: f32::NAN,
            ..Default::default()
        }
        .sanitized();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_channels, MAX_CHANNELS);
    }

    #[test]
    fn test_json_round_trip() {
        let config = EffectConfig::for_host(96000, 256);
        let parsed = EffectConfig::from_json(&config.to_json().unwrap()).unwrap();
        assert_eq!(parsed, config);
    }
}
