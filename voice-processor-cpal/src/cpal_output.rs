//! cpal output stream for the reference signal.
//!
//! The session renders mono blocks; each frame is written to every device
//! channel in the host's native sample format. Like the input, the stream
//! lives on its own thread.

use std::sync::Arc;

use cpal::traits::DeviceTrait;
use cpal::{BufferSize, SampleFormat as HostFormat, SampleRate, SizedSample, StreamError};

use voice_processor_core::models::config::OutputConfig;
use voice_processor_core::models::device::{DeviceInfo, DeviceKind};
use voice_processor_core::models::error::EngineError;
use voice_processor_core::traits::audio_device::{EventCallback, StreamEvent};
use voice_processor_core::traits::output_device::{OutputDevice, RenderCallback};

use crate::device_enumerator::{describe, supported_output_rates, DeviceEnumerator};
use crate::stream_format::{self, pick_range, RangeCandidate};
use crate::stream_thread::StreamThread;

#[derive(Debug, Clone)]
struct NegotiatedOutput {
    stream_config: cpal::StreamConfig,
    host_format: HostFormat,
    config: OutputConfig,
}

/// Host output device driven through cpal.
pub struct CpalOutputDevice {
    device_name: Option<String>,
    negotiated: Option<NegotiatedOutput>,
    stream: StreamThread,
}

impl CpalOutputDevice {
    /// Play on the host's default output device.
    pub fn default_device() -> Self {
        Self {
            device_name: None,
            negotiated: None,
            stream: StreamThread::new(),
        }
    }

    /// Play on the output device with this exact name.
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
        DeviceEnumerator::new().find_output_device(device_name).ok_or_else(|| {
            EngineError::DeviceUnavailable(match device_name {
                Some(name) => format!("output device '{}' not found", name),
                None => "no default output device".to_string(),
            })
        })
    }

    fn negotiate(device: &cpal::Device, sample_rate: u32) -> Result<NegotiatedOutput, EngineError> {
        let ranges: Vec<RangeCandidate> = device
            .supported_output_configs()
            .map_err(|e| EngineError::DeviceUnavailable(format!("failed to query output configs: {}", e)))?
            .map(|range| RangeCandidate::from(&range))
            .collect();

        // Mono is preferred; anything wider gets the signal on every channel.
        let (candidate, sample_rate) = pick_range(&ranges, sample_rate, 1)
            .ok_or_else(|| EngineError::ConfigurationUnsupported("no i16, f32 or u16 output config".into()))?;

        Ok(NegotiatedOutput {
            stream_config: cpal::StreamConfig {
                channels: candidate.channels,
                sample_rate: SampleRate(sample_rate),
                buffer_size: BufferSize::Default,
            },
            host_format: candidate.format,
            config: OutputConfig {
                sample_rate,
                device_channels: candidate.channels,
            },
        })
    }
}

/// Mono render scratch, spread across the device channels on write.
struct FrameSpreader {
    channels: usize,
    mono: Vec<i16>,
}

impl FrameSpreader {
    fn new(device_channels: u16, capacity: usize) -> Self {
        Self {
            channels: device_channels.max(1) as usize,
            mono: Vec::with_capacity(capacity),
        }
    }

    fn render<T: Copy>(&mut self, data: &mut [T], render: &RenderCallback, convert: fn(i16) -> T) {
        self.mono.clear();
        self.mono.resize(data.len() / self.channels, 0);
        render(&mut self.mono[..]);
        for (frame, &sample) in data.chunks_mut(self.channels).zip(&self.mono) {
            frame.fill(convert(sample));
        }
    }
}

fn render_handler<T>(
    negotiated: &NegotiatedOutput,
    convert: fn(i16) -> T,
    render: RenderCallback,
) -> impl FnMut(&mut [T], &cpal::OutputCallbackInfo) + Send + 'static
where
    T: Copy + 'static,
{
    // About 100 ms of frames, so typical periods never grow the buffer.
    let capacity = (negotiated.config.sample_rate / 10) as usize;
    let mut spreader = FrameSpreader::new(negotiated.config.device_channels, capacity);
    move |data: &mut [T], _info: &cpal::OutputCallbackInfo| spreader.render(data, &render, convert)
}

fn build_typed<T>(
    device: &cpal::Device,
    negotiated: &NegotiatedOutput,
    convert: fn(i16) -> T,
    render: RenderCallback,
    on_event: EventCallback,
) -> Result<cpal::Stream, cpal::BuildStreamError>
where
    T: SizedSample + Copy + 'static,
{
    let on_error = move |err: StreamError| match err {
        StreamError::DeviceNotAvailable => on_event(StreamEvent::DeviceLost),
        other => on_event(StreamEvent::Error(other.to_string())),
    };
    let handler = render_handler(negotiated, convert, render);
    device.build_output_stream(&negotiated.stream_config, handler, on_error, None)
}

fn build_stream(
    device: &cpal::Device,
    negotiated: &NegotiatedOutput,
    render: RenderCallback,
    on_event: EventCallback,
) -> Result<cpal::Stream, EngineError> {
    let stream = match negotiated.host_format {
        HostFormat::I16 => build_typed::<i16>(device, negotiated, |s| s, render, on_event),
        HostFormat::F32 => build_typed::<f32>(device, negotiated, stream_format::i16_to_f32, render, on_event),
        HostFormat::U16 => build_typed::<u16>(device, negotiated, stream_format::i16_to_u16, render, on_event),
        other => {
            return Err(EngineError::ConfigurationUnsupported(format!(
                "unsupported host sample format {:?}",
                other
            )))
        }
    };

    stream.map_err(|e| EngineError::StreamFailed(format!("failed to build output stream: {}", e)))
}

impl OutputDevice for CpalOutputDevice {
    fn is_available(&self) -> bool {
        Self::resolve(self.device_name.as_deref()).is_ok()
    }

    fn open(&mut self, sample_rate: u32) -> Result<OutputConfig, EngineError> {
        self.close();
        let device = Self::resolve(self.device_name.as_deref())?;
        let negotiated = Self::negotiate(&device, sample_rate)?;
        log::info!(
            "Opened output '{}' at {} Hz, {} ch ({:?})",
            device.name().unwrap_or_default(),
            negotiated.config.sample_rate,
            negotiated.config.device_channels,
            negotiated.host_format
        );
        let config = negotiated.config;
        self.negotiated = Some(negotiated);
        Ok(config)
    }

    fn start(&mut self, render: RenderCallback, on_event: EventCallback) -> Result<(), EngineError> {
        let negotiated = self
            .negotiated
            .clone()
            .ok_or_else(|| EngineError::StreamFailed("output not open".into()))?;

        let device_name = self.device_name.clone();
        self.stream.start("cpal-output-stream", move || {
            let device = Self::resolve(device_name.as_deref())?;
            build_stream(&device, &negotiated, render, on_event)
        })
    }

    fn stop(&mut self) -> Result<(), EngineError> {
        self.stream.stop()
    }

    fn close(&mut self) {
        if let Err(e) = self.stop() {
            log::warn!("Output stream stop on close failed: {}", e);
        }
        self.negotiated = None;
    }

    fn output_config(&self) -> Option<OutputConfig> {
        self.negotiated.as_ref().map(|n| n.config)
    }

    fn device_info(&self) -> DeviceInfo {
        let enumerator = DeviceEnumerator::new();
        let default_name = enumerator.default_output_device_name();
        match enumerator.find_output_device(self.device_name.as_deref()) {
            Some(device) => {
                let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
                let is_default = default_name.as_deref() == Some(name.as_str());
                describe(&name, is_default, supported_output_rates(&device))
            }
            None => DeviceInfo {
                id: "cpal:unavailable".into(),
                name: self.device_name.clone().unwrap_or_else(|| "Default Output".into()),
                kind: DeviceKind::Hardware,
                is_default: self.device_name.is_none(),
                supported_sample_rates: Vec::new(),
            },
        }
    }
}

impl Drop for CpalOutputDevice {
    fn drop(&mut self) {
        self.close();
    }
}
