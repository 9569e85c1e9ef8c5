use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::processing::processor::{AmplifyProcessor, BypassProcessor, SampleProcessor};

/// Gain applied by `start_amplification` unless the config overrides it.
pub const DEFAULT_AMPLIFICATION_GAIN: f32 = 2.0;

/// Processing applied to every captured block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum ProcessingMode {
    #[default]
    Bypass,
    Amplify { gain: f32 },
}

impl ProcessingMode {
    pub fn amplify(gain: f32) -> Self {
        Self::Amplify { gain }
    }

    pub fn is_bypass(&self) -> bool {
        matches!(self, Self::Bypass)
    }

    pub fn gain(&self) -> f32 {
        match self {
            Self::Bypass => 1.0,
            Self::Amplify { gain } => *gain,
        }
    }

    /// Run this mode's processor over `block` in place.
    #[inline]
    pub fn process(&self, block: &mut [i16]) {
        match *self {
            Self::Bypass => BypassProcessor.process(block),
            Self::Amplify { gain } => AmplifyProcessor::new(gain).process(block),
        }
    }

    // Packed as [tag:32 | gain bits:32] so a single atomic load yields a whole mode.
    fn to_bits(self) -> u64 {
        match self {
            Self::Bypass => 0,
            Self::Amplify { gain } => (1u64 << 32) | gain.to_bits() as u64,
        }
    }

    fn from_bits(bits: u64) -> Self {
        match bits >> 32 {
            0 => Self::Bypass,
            _ => Self::Amplify {
                gain: f32::from_bits(bits as u32),
            },
        }
    }
}

impl fmt::Display for ProcessingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bypass => write!(f, "bypass"),
            Self::Amplify { gain } => write!(f, "amplify x{}", gain),
        }
    }
}

/// Lock-free cell holding the active `ProcessingMode`.
///
/// The control thread stores, the callback thread loads once per block.
#[derive(Debug)]
pub struct AtomicMode(AtomicU64);

impl AtomicMode {
    pub fn new(mode: ProcessingMode) -> Self {
        Self(AtomicU64::new(mode.to_bits()))
    }

    #[inline]
    pub fn load(&self) -> ProcessingMode {
        ProcessingMode::from_bits(self.0.load(Ordering::Acquire))
    }

    pub fn store(&self, mode: ProcessingMode) {
        self.0.store(mode.to_bits(), Ordering::Release);
    }

    /// Store `mode` and return the previous one.
    pub fn swap(&self, mode: ProcessingMode) -> ProcessingMode {
        ProcessingMode::from_bits(self.0.swap(mode.to_bits(), Ordering::AcqRel))
    }
}

impl Default for AtomicMode {
    fn default() -> Self {
        Self::new(ProcessingMode::Bypass)
    }
}
