//! nfx-core: Shared types, traits, and utilities for NativeFX
//!
//! This crate provides the foundational types used across all NativeFX crates:
//! the host sample type, the error taxonomy, parameter definitions and the
//! per-instance effect configuration.

mod sample;
mod params;
mod error;
mod config;

pub use sample::*;
pub use params::*;
pub use error::*;
pub use config::*;

/// Maximum number of interleaved channels an effect instance tracks
pub const MAX_CHANNELS: usize = 8;

/// Decibel value wrapper
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Decibels(pub f32);

impl Decibels {
    pub const ZERO: Self = Self(0.0);
    pub const NEG_INF: Self = Self(f32::NEG_INFINITY);

    #[inline]
    pub fn from_gain(gain: f32) -> Self {
        if gain <= 0.0 {
            Self::NEG_INF
        } else {
            Self(20.0 * gain.log10())
        }
    }

    #[inline]
    pub fn to_gain(self) -> f32 {
        if self.0 <= -144.0 {
            0.0
        } else {
            10.0_f32.powf(self.0 * 0.05)
        }
    }
}

impl Default for Decibels {
    fn default() -> Self {
        Self::ZERO
    }
}
