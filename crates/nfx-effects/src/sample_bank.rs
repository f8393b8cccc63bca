//! Impulse response slots shared by every reverb instance
//!
//! Scripts upload interleaved sample data into one of [`SLOT_COUNT`] slots;
//! reverbs pick a slot by index and rebuild when that slot's generation
//! changes. Slot contents sit behind a mutex that is only taken by uploads,
//! name queries and impulse rebuilds. Generations are atomics so the audio
//! thread can poll for changes without locking.

use nfx_core::{NfxError, NfxResult, Sample};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

/// Number of upload slots
pub const SLOT_COUNT: usize = 16;

/// Name reported for slot indices below zero
pub const SYNTHETIC_NAME: &str = "Synthetic";
/// Name reported for slots nothing was uploaded to
pub const UNSET_NAME: &str = "Not set";

/// One uploaded impulse response
#[derive(Debug, Clone, PartialEq)]
pub struct IrSample {
    /// Interleaved samples, `frames * channels` long
    pub data: Vec<Sample>,
    pub frames: usize,
    pub channels: usize,
    pub sample_rate: u32,
    pub name: String,
}

impl IrSample {
    pub fn is_empty(&self) -> bool {
        self.frames == 0
    }

    /// Sample at `frame` of `channel`; channels past the last repeat it
    #[inline]
    pub fn get(&self, frame: usize, channel: usize) -> Sample {
        let channel = channel.min(self.channels.saturating_sub(1));
        self.data[frame * self.channels + channel]
    }
}

/// Cross-instance impulse response storage
#[derive(Debug)]
pub struct SampleBank {
    slots: Mutex<Vec<Option<IrSample>>>,
    generations: [AtomicU64; SLOT_COUNT],
    counter: AtomicU64,
}

impl Default for SampleBank {
    fn default() -> Self {
        Self::new()
    }
}

impl SampleBank {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(vec![None; SLOT_COUNT]),
            generations: std::array::from_fn(|_| AtomicU64::new(0)),
            counter: AtomicU64::new(0),
        }
    }

    /// Process-wide bank used by effects created through the factory
    pub fn global() -> Arc<SampleBank> {
        static GLOBAL: OnceLock<Arc<SampleBank>> = OnceLock::new();
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(SampleBank::new())))
    }

    /// Store an impulse response in `slot`, replacing whatever was there.
    ///
    /// `data` is interleaved; trailing values that do not fill a whole frame
    /// are ignored. An empty upload is allowed and later plays back as a
    /// unit impulse. Returns the slot's new generation.
    pub fn upload(
        &self,
        slot: usize,
        data: &[Sample],
        channels: usize,
        sample_rate: u32,
        name: &str,
    ) -> NfxResult<u64> {
        if slot >= SLOT_COUNT {
            return Err(NfxError::InvalidSlot(slot));
        }
        if channels == 0 && !data.is_empty() {
            return Err(NfxError::InvalidConfig("sample channel count must be > 0".into()));
        }
        if sample_rate == 0 {
            return Err(NfxError::InvalidConfig("sample rate must be > 0".into()));
        }

        let frames = data.len().checked_div(channels).unwrap_or(0);
        let sample = IrSample {
            data: data[..frames * channels].to_vec(),
            frames,
            channels,
            sample_rate,
            name: name.to_string(),
        };

        let mut slots = self.slots.lock();
        slots[slot] = Some(sample);
        let generation = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        self.generations[slot].store(generation, Ordering::Release);
        drop(slots);

        log::info!(
            "uploaded impulse '{name}' to slot {slot} ({frames} frames, {channels} ch, {sample_rate} Hz)"
        );
        Ok(generation)
    }

    /// Display name of `slot`; negative indices mean the synthetic impulse
    pub fn sample_name(&self, slot: i32) -> String {
        let Ok(index) = usize::try_from(slot) else {
            return SYNTHETIC_NAME.to_string();
        };
        self.slots
            .lock()
            .get(index)
            .and_then(|s| s.as_ref())
            .map_or_else(|| UNSET_NAME.to_string(), |s| s.name.clone())
    }

    /// Upload generation of `slot`, `0` if never uploaded or out of range
    #[inline]
    pub fn generation(&self, slot: usize) -> u64 {
        self.generations
            .get(slot)
            .map_or(0, |g| g.load(Ordering::Acquire))
    }

    /// Total number of uploads so far
    pub fn upload_count(&self) -> u64 {
        self.counter.load(Ordering::Relaxed)
    }

    /// Run `f` on the contents of `slot` while holding the bank lock.
    ///
    /// The lock is not reentrant: `f` must not call back into the bank.
    pub fn with_sample<R>(&self, slot: usize, f: impl FnOnce(Option<&IrSample>) -> R) -> R {
        let slots = self.slots.lock();
        f(slots.get(slot).and_then(|s| s.as_ref()))
    }
}
