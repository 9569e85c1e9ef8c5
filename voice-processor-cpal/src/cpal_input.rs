//! cpal input stream backend.
//!
//! Opens a host input device, negotiates the closest supported
//! configuration, and delivers interleaved i16 blocks from the host's
//! audio callback. Devices that only offer another channel count (a
//! shared-mode stereo mix format, say) are opened as-is and remapped to the
//! requested count per block. The cpal `Stream` is not `Send` on every
//! platform, so it lives on a dedicated thread for its whole lifetime.

use std::sync::Arc;
use std::time::Duration;

use cpal::traits::DeviceTrait;
use cpal::{BufferSize, SampleFormat as HostFormat, SampleRate, SizedSample, StreamError};

use voice_processor_core::models::config::{ActualConfig, SampleFormat, StreamConfig};
use voice_processor_core::models::device::{DeviceInfo, DeviceKind};
use voice_processor_core::models::error::EngineError;
use voice_processor_core::traits::audio_device::{
    AudioDevice, BlockCallback, EventCallback, StreamCallbacks, StreamEvent,
};

use crate::device_enumerator::{describe, supported_rates, DeviceEnumerator};
use crate::stream_format::{self, clamp_frames, pick_range, remap_channels, RangeCandidate};
use crate::stream_thread::StreamThread;

/// Gap between capture timestamps, in callback periods, treated as an overrun.
const OVERRUN_GAP_PERIODS: f64 = 1.5;

/// Result of negotiating a request against a device's supported ranges.
#[derive(Debug, Clone)]
struct Negotiated {
    stream_config: cpal::StreamConfig,
    host_format: HostFormat,
    /// What the session sees; channels match the request.
    actual: ActualConfig,
}

impl Negotiated {
    fn device_channels(&self) -> u16 {
        self.stream_config.channels
    }
}

/// Host input device driven through cpal.
pub struct CpalInputDevice {
    device_name: Option<String>,
    negotiated: Option<Negotiated>,
    stream: StreamThread,
}

impl CpalInputDevice {
    /// Capture from the host's default input device.
    pub fn default_device() -> Self {
        Self {
            device_name: None,
            negotiated: None,
            stream: StreamThread::new(),
        }
    }

    /// Capture from the input device with this exact name.
    pub fn with_device_name(name: impl Into<String>) -> Self {
        Self {
            device_name: Some(name.into()),
            negotiated: None,
            stream: StreamThread::new(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.stream.is_running()
    }

    fn resolve(device_name: Option<&str>) -> Result<cpal::Device, EngineError> {
        DeviceEnumerator::new().find_input_device(device_name).ok_or_else(|| {
            EngineError::DeviceUnavailable(match device_name {
                Some(name) => format!("input device '{}' not found", name),
                None => "no default input device".to_string(),
            })
        })
    }

    fn negotiate(device: &cpal::Device, requested: &StreamConfig) -> Result<Negotiated, EngineError> {
        let ranges: Vec<RangeCandidate> = device
            .supported_input_configs()
            .map_err(|e| EngineError::DeviceUnavailable(format!("failed to query input configs: {}", e)))?
            .map(|range| RangeCandidate::from(&range))
            .collect();

        let (candidate, sample_rate) = pick_range(&ranges, requested.sample_rate, requested.channels)
            .ok_or_else(|| EngineError::ConfigurationUnsupported("no i16, f32 or u16 input config".into()))?;

        let (buffer_size, frames) = match clamp_frames(&candidate, requested.frames_per_callback) {
            Some(frames) => (BufferSize::Fixed(frames), frames),
            // Host picks the period; blocks of any length are still contiguous.
            None => (BufferSize::Default, requested.frames_per_callback),
        };

        Ok(Negotiated {
            stream_config: cpal::StreamConfig {
                channels: candidate.channels,
                sample_rate: SampleRate(sample_rate),
                buffer_size,
            },
            host_format: candidate.format,
            actual: ActualConfig {
                sample_rate,
                frames_per_callback: frames,
                channels: requested.channels,
                format: SampleFormat::I16,
                requested: requested.clone(),
            },
        })
    }
}

/// Tracks capture timestamps and flags gaps longer than the expected period.
struct GapDetector {
    sample_rate: u32,
    channels: usize,
    last: Option<(cpal::StreamInstant, usize)>,
}

impl GapDetector {
    fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels: channels.max(1) as usize,
            last: None,
        }
    }

    /// Record a block; true when it arrived after a gap.
    fn observe(&mut self, info: &cpal::InputCallbackInfo, samples: usize) -> bool {
        let capture = info.timestamp().capture;
        let frames = samples / self.channels;
        let gap = match self.last {
            Some((prev, prev_frames)) if prev_frames > 0 => {
                let expected = Duration::from_secs_f64(prev_frames as f64 / self.sample_rate as f64);
                capture
                    .duration_since(&prev)
                    .map(|delta| delta > expected.mul_f64(OVERRUN_GAP_PERIODS))
                    .unwrap_or(false)
            }
            _ => false,
        };
        self.last = Some((capture, frames));
        gap
    }
}

/// Data callback for one host sample type: convert, remap to the session's
/// channel count, then hand the block to the engine.
fn block_handler<T>(
    negotiated: &Negotiated,
    convert: fn(T) -> i16,
    on_block: BlockCallback,
    on_event: EventCallback,
) -> impl FnMut(&[T], &cpal::InputCallbackInfo) + Send + 'static
where
    T: Copy + 'static,
{
    let actual = &negotiated.actual;
    let device_channels = negotiated.device_channels() as usize;
    let session_channels = actual.channels as usize;
    let capacity = actual.frames_per_callback as usize * device_channels.max(session_channels) * 4;

    let mut raw: Vec<i16> = Vec::with_capacity(capacity);
    let mut block: Vec<i16> = Vec::with_capacity(capacity);
    let mut gaps = GapDetector::new(actual.sample_rate, negotiated.device_channels());

    move |data: &[T], info: &cpal::InputCallbackInfo| {
        if gaps.observe(info, data.len()) {
            on_event(StreamEvent::Overrun);
        }
        raw.clear();
        raw.extend(data.iter().copied().map(convert));
        remap_channels(&raw, device_channels, session_channels, &mut block);
        on_block(&mut block[..]);
    }
}

fn build_typed<T>(
    device: &cpal::Device,
    negotiated: &Negotiated,
    convert: fn(T) -> i16,
    callbacks: StreamCallbacks,
) -> Result<cpal::Stream, cpal::BuildStreamError>
where
    T: SizedSample + Copy + 'static,
{
    let on_error = {
        let on_event = Arc::clone(&callbacks.on_event);
        move |err: StreamError| match err {
            StreamError::DeviceNotAvailable => on_event(StreamEvent::DeviceLost),
            other => on_event(StreamEvent::Error(other.to_string())),
        }
    };
    let handler = block_handler(negotiated, convert, callbacks.on_block, callbacks.on_event);
    device.build_input_stream(&negotiated.stream_config, handler, on_error, None)
}

fn build_stream(
    device: &cpal::Device,
    negotiated: &Negotiated,
    callbacks: StreamCallbacks,
) -> Result<cpal::Stream, EngineError> {
    let stream = match negotiated.host_format {
        HostFormat::I16 => build_typed::<i16>(device, negotiated, |s| s, callbacks),
        HostFormat::F32 => build_typed::<f32>(device, negotiated, stream_format::f32_to_i16, callbacks),
        HostFormat::U16 => build_typed::<u16>(device, negotiated, stream_format::u16_to_i16, callbacks),
        other => {
            return Err(EngineError::ConfigurationUnsupported(format!(
                "unsupported host sample format {:?}",
                other
            )))
        }
    };

    stream.map_err(|e| EngineError::StreamFailed(format!("failed to build input stream: {}", e)))
}

impl AudioDevice for CpalInputDevice {
    fn is_available(&self) -> bool {
        Self::resolve(self.device_name.as_deref()).is_ok()
    }

    fn open(&mut self, requested: &StreamConfig) -> Result<ActualConfig, EngineError> {
        self.close();
        let device = Self::resolve(self.device_name.as_deref())?;
        let negotiated = Self::negotiate(&device, requested)?;
        log::info!(
            "Opened input '{}' at {} Hz, {} frames, {} device ch ({:?})",
            device.name().unwrap_or_default(),
            negotiated.actual.sample_rate,
            negotiated.actual.frames_per_callback,
            negotiated.device_channels(),
            negotiated.host_format
        );
        if negotiated.device_channels() != requested.channels {
            log::warn!(
                "Input has {} channel(s); remapping to {}",
                negotiated.device_channels(),
                requested.channels
            );
        }
        let actual = negotiated.actual.clone();
        self.negotiated = Some(negotiated);
        Ok(actual)
    }

    fn start(&mut self, callbacks: StreamCallbacks) -> Result<(), EngineError> {
        let negotiated = self
            .negotiated
            .clone()
            .ok_or_else(|| EngineError::StreamFailed("device not open".into()))?;

        let device_name = self.device_name.clone();
        self.stream.start("cpal-input-stream", move || {
            let device = Self::resolve(device_name.as_deref())?;
            build_stream(&device, &negotiated, callbacks)
        })
    }

    fn stop(&mut self) -> Result<(), EngineError> {
        self.stream.stop()
    }

    fn close(&mut self) {
        if let Err(e) = self.stop() {
            log::warn!("Input stream stop on close failed: {}", e);
        }
        self.negotiated = None;
    }

    fn actual_config(&self) -> Option<ActualConfig> {
        self.negotiated.as_ref().map(|n| n.actual.clone())
    }

    fn device_info(&self) -> DeviceInfo {
        let enumerator = DeviceEnumerator::new();
        let default_name = enumerator.default_input_device_name();
        match enumerator.find_input_device(self.device_name.as_deref()) {
            Some(device) => {
                let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
                let is_default = default_name.as_deref() == Some(name.as_str());
                describe(&name, is_default, supported_rates(&device))
            }
            None => DeviceInfo {
                id: "cpal:unavailable".into(),
                name: self.device_name.clone().unwrap_or_else(|| "Default Input".into()),
                kind: DeviceKind::Hardware,
                is_default: self.device_name.is_none(),
                supported_sample_rates: Vec::new(),
            },
        }
    }
}

impl Drop for CpalInputDevice {
    fn drop(&mut self) {
        self.close();
    }
}
