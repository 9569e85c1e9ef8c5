use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::mode::DEFAULT_AMPLIFICATION_GAIN;

/// Largest capture reservation a config may ask for (128 MiB of i16).
pub const MAX_PREALLOCATE_SAMPLES: usize = 1 << 26;

/// Largest capture cap a config may ask for (4 GiB of i16).
pub const MAX_CAPTURE_SAMPLES: usize = 1 << 31;

/// PCM sample encoding delivered to the processing stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleFormat {
    /// 16-bit signed integer, interleaved when multi-channel.
    I16,
}

impl SampleFormat {
    pub fn bits_per_sample(&self) -> u16 {
        match self {
            Self::I16 => 16,
        }
    }
}

/// Requested stream configuration for a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Requested sample rate in Hz (default: 16000). The device may coerce it.
    pub sample_rate: u32,

    /// Requested frames per hardware callback (default: 48).
    pub frames_per_callback: u32,

    /// Interleaved channel count (default: 1). Valid values: 1, 2.
    pub channels: u16,

    pub format: SampleFormat,

    /// Gain used by `start_amplification` (default: 2.0).
    pub amplification_gain: f32,

    /// Seconds of capture storage reserved before the stream starts (default: 10).
    pub preallocate_secs: f64,

    /// Stop appending after this many seconds of audio (None = unlimited).
    pub max_duration_secs: Option<f64>,
}

impl StreamConfig {
    pub fn new(sample_rate: u32, frames_per_callback: u32) -> Self {
        Self {
            sample_rate,
            frames_per_callback,
            ..Self::default()
        }
    }

    pub fn with_channels(mut self, channels: u16) -> Self {
        self.channels = channels;
        self
    }

    pub fn with_max_duration(mut self, secs: f64) -> Self {
        self.max_duration_secs = Some(secs);
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.sample_rate == 0 {
            return Err("sample rate must be positive".into());
        }
        if self.frames_per_callback == 0 {
            return Err("frames per callback must be positive".into());
        }
        if ![1, 2].contains(&self.channels) {
            return Err(format!("unsupported channel count: {}", self.channels));
        }
        if !self.amplification_gain.is_finite() || self.amplification_gain <= 0.0 {
            return Err(format!("invalid amplification gain: {}", self.amplification_gain));
        }
        if !self.preallocate_secs.is_finite() || self.preallocate_secs < 0.0 {
            return Err(format!("invalid preallocation: {}s", self.preallocate_secs));
        }
        if self.samples_at_request(self.preallocate_secs) > MAX_PREALLOCATE_SAMPLES as f64 {
            return Err(format!("preallocation too large: {}s", self.preallocate_secs));
        }
        if let Some(max) = self.max_duration_secs {
            if !max.is_finite() || max < 0.0 {
                return Err(format!("invalid max duration: {}s", max));
            }
            if self.samples_at_request(max) > MAX_CAPTURE_SAMPLES as f64 {
                return Err(format!("max duration too large: {}s", max));
            }
        }
        Ok(())
    }

    fn samples_at_request(&self, secs: f64) -> f64 {
        secs * self.sample_rate as f64 * self.channels as f64
    }

    /// Parse a config from JSON; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, String> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| format!("failed to parse stream config: {}", e))?;
        config.validate()?;
        Ok(config)
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            frames_per_callback: 48,
            channels: 1,
            format: SampleFormat::I16,
            amplification_gain: DEFAULT_AMPLIFICATION_GAIN,
            preallocate_secs: 10.0,
            max_duration_secs: None,
        }
    }
}

/// Configuration the device actually opened with.
///
/// Authoritative for everything downstream of `init`: duration math,
/// export headers, buffer sizing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActualConfig {
    pub sample_rate: u32,
    pub frames_per_callback: u32,
    pub channels: u16,
    pub format: SampleFormat,
    pub requested: StreamConfig,
}

impl ActualConfig {
    /// Actual config identical to the request.
    pub fn exact(requested: &StreamConfig) -> Self {
        Self {
            sample_rate: requested.sample_rate,
            frames_per_callback: requested.frames_per_callback,
            channels: requested.channels,
            format: requested.format,
            requested: requested.clone(),
        }
    }

    /// Whether negotiation changed the requested rate or buffer size.
    pub fn was_coerced(&self) -> bool {
        self.sample_rate != self.requested.sample_rate
            || self.frames_per_callback != self.requested.frames_per_callback
    }

    /// Interleaved samples per callback block.
    pub fn samples_per_callback(&self) -> usize {
        self.frames_per_callback as usize * self.channels as usize
    }

    /// Time between successive callbacks.
    pub fn callback_period(&self) -> Duration {
        Duration::from_secs_f64(self.frames_per_callback as f64 / self.sample_rate as f64)
    }

    /// Interleaved samples covering `secs` seconds at the actual rate.
    pub fn samples_for(&self, secs: f64) -> usize {
        sample_count(secs, self.sample_rate, self.channels)
    }
}

/// Configuration an output device opened with. Render blocks are mono.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputConfig {
    pub sample_rate: u32,
    /// Channels on the device side; the mono render block is spread across them.
    pub device_channels: u16,
}

impl OutputConfig {
    pub fn samples_for(&self, secs: f64) -> usize {
        sample_count(secs, self.sample_rate, 1)
    }
}

/// Interleaved samples covering `secs` seconds. Saturates instead of overflowing.
pub fn sample_count(secs: f64, sample_rate: u32, channels: u16) -> usize {
    // Float-to-int casts saturate and map NaN to zero.
    ((secs * sample_rate as f64) as usize).saturating_mul(channels as usize)
}
