//! Parameter types for audio effects
//!
//! Effects describe their parameters with a static table of [`ParamDef`]s.
//! A [`ParamTable`] holds the live values as atomics so the audio thread,
//! the host's parameter callbacks and the UI can all read them without
//! locking.

use serde::Serialize;

use crate::{AtomicSample, NfxError, NfxResult};

/// Static description of one effect parameter
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ParamDef {
    pub name: &'static str,
    pub unit: &'static str,
    pub min: f32,
    pub max: f32,
    pub default: f32,
    /// Multiplier applied by the host before displaying the value
    pub display_scale: f32,
    /// Slider curve exponent (1.0 = linear)
    pub display_exponent: f32,
    pub description: &'static str,
}

impl ParamDef {
    pub const fn new(name: &'static str, unit: &'static str, min: f32, max: f32, default: f32) -> Self {
        Self {
            name,
            unit,
            min,
            max,
            default,
            display_scale: 1.0,
            display_exponent: 1.0,
            description: name,
        }
    }

    pub const fn display(mut self, scale: f32, exponent: f32) -> Self {
        self.display_scale = scale;
        self.display_exponent = exponent;
        self
    }

    pub const fn describe(mut self, description: &'static str) -> Self {
        self.description = description;
        self
    }

    /// Check that the default lies inside the range
    pub fn validate(&self) -> NfxResult<()> {
        if !(self.min <= self.max) {
            return Err(NfxError::InvalidParamDef(format!(
                "{}: min {} > max {}",
                self.name, self.min, self.max
            )));
        }
        if !(self.min..=self.max).contains(&self.default) {
            return Err(NfxError::InvalidParamDef(format!(
                "{}: default {} outside [{}, {}]",
                self.name, self.default, self.min, self.max
            )));
        }
        Ok(())
    }

    #[inline]
    pub fn clamp(&self, value: f32) -> f32 {
        value.clamp(self.min, self.max)
    }

    /// Normalize an actual value to 0-1 following the slider curve
    pub fn normalize(&self, value: f32) -> f32 {
        let range = self.max - self.min;
        if range <= 0.0 {
            return 0.0;
        }
        ((self.clamp(value) - self.min) / range).powf(1.0 / self.display_exponent)
    }

    /// Denormalize a 0-1 slider position to an actual value
    pub fn denormalize(&self, normalized: f32) -> f32 {
        self.min + normalized.clamp(0.0, 1.0).powf(self.display_exponent) * (self.max - self.min)
    }
}

/// Static description of an effect: its registered name and parameters
#[derive(Debug, Clone, Copy, Serialize)]
pub struct EffectDefinition {
    pub name: &'static str,
    pub params: &'static [ParamDef],
}

impl EffectDefinition {
    pub fn validate(&self) -> NfxResult<()> {
        self.params.iter().try_for_each(ParamDef::validate)
    }
}

/// Live parameter values of one effect instance
#[derive(Debug)]
pub struct ParamTable {
    defs: &'static [ParamDef],
    values: Box<[AtomicSample]>,
}

impl ParamTable {
    /// Create a table with every parameter at its default
    pub fn from_definitions(defs: &'static [ParamDef]) -> Self {
        Self {
            defs,
            values: defs.iter().map(|d| AtomicSample::new(d.default)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }

    pub fn definitions(&self) -> &'static [ParamDef] {
        self.defs
    }

    /// Host-facing getter
    pub fn get(&self, index: usize) -> NfxResult<f32> {
        self.values
            .get(index)
            .map(AtomicSample::get)
            .ok_or(NfxError::UnsupportedParameter(index))
    }

    /// Host-facing setter; values are clamped to the declared range
    pub fn set(&self, index: usize, value: f32) -> NfxResult<()> {
        let (def, cell) = self
            .defs
            .get(index)
            .zip(self.values.get(index))
            .ok_or(NfxError::UnsupportedParameter(index))?;
        cell.set(def.clamp(value));
        Ok(())
    }

    /// Read a parameter by an index the effect itself declared
    #[inline]
    pub fn value(&self, index: usize) -> f32 {
        self.values[index].get()
    }

    /// Snapshot of all current values
    pub fn snapshot(&self) -> Vec<f32> {
        self.values.iter().map(AtomicSample::get).collect()
    }

    pub fn reset(&self) {
        for (def, cell) in self.defs.iter().zip(self.values.iter()) {
            cell.set(def.default);
        }
    }
}
