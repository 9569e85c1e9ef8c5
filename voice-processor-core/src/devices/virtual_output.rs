//! Host-free playback device.
//!
//! Renders only when pulled through a [`VirtualOutputHandle`], which keeps
//! what was played for inspection.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::models::config::OutputConfig;
use crate::models::device::{DeviceInfo, DeviceKind};
use crate::models::error::EngineError;
use crate::traits::audio_device::{EventCallback, StreamEvent};
use crate::traits::output_device::{OutputDevice, RenderCallback};

struct OutputShared {
    // Held for the whole render, so renders never overlap.
    render: Mutex<Option<(RenderCallback, EventCallback)>>,
    running: AtomicBool,
    config: Mutex<Option<OutputConfig>>,
    played: Mutex<Vec<i16>>,
}

/// Simulated output device.
pub struct VirtualOutput {
    name: String,
    supported_rates: Vec<u32>,
    device_channels: u16,
    available: bool,
    shared: Arc<OutputShared>,
}

impl VirtualOutput {
    /// A mono device that accepts any sample rate.
    pub fn new() -> Self {
        Self {
            name: "Virtual Output".into(),
            supported_rates: Vec::new(),
            device_channels: 1,
            available: true,
            shared: Arc::new(OutputShared {
                render: Mutex::new(None),
                running: AtomicBool::new(false),
                config: Mutex::new(None),
                played: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Restrict native rates; other requests fall back to the nearest one.
    pub fn with_supported_rates(mut self, rates: impl Into<Vec<u32>>) -> Self {
        self.supported_rates = rates.into();
        self
    }

    /// Report `channels` device channels. Played frames are spread across them.
    pub fn with_channels(mut self, channels: u16) -> Self {
        self.device_channels = channels.max(1);
        self
    }

    pub fn unavailable(mut self) -> Self {
        self.available = false;
        self
    }

    pub fn handle(&self) -> VirtualOutputHandle {
        VirtualOutputHandle {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl Default for VirtualOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputDevice for VirtualOutput {
    fn is_available(&self) -> bool {
        self.available
    }

    fn open(&mut self, sample_rate: u32) -> Result<OutputConfig, EngineError> {
        if !self.available {
            return Err(EngineError::DeviceUnavailable(format!("{} is not connected", self.name)));
        }
        self.close();

        let sample_rate = self
            .supported_rates
            .iter()
            .copied()
            .min_by_key(|rate| rate.abs_diff(sample_rate))
            .unwrap_or(sample_rate);
        let config = OutputConfig {
            sample_rate,
            device_channels: self.device_channels,
        };
        *self.shared.config.lock() = Some(config);
        self.shared.played.lock().clear();
        Ok(config)
    }

    fn start(&mut self, render: RenderCallback, on_event: EventCallback) -> Result<(), EngineError> {
        if self.shared.config.lock().is_none() {
            return Err(EngineError::StreamFailed("output is not open".into()));
        }
        if self.shared.running.load(Ordering::SeqCst) {
            return Err(EngineError::StreamFailed("output already running".into()));
        }
        *self.shared.render.lock() = Some((render, on_event));
        self.shared.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), EngineError> {
        self.shared.running.store(false, Ordering::SeqCst);
        *self.shared.render.lock() = None;
        Ok(())
    }

    fn close(&mut self) {
        let _ = self.stop();
        *self.shared.config.lock() = None;
    }

    fn output_config(&self) -> Option<OutputConfig> {
        *self.shared.config.lock()
    }

    fn device_info(&self) -> DeviceInfo {
        DeviceInfo {
            id: format!("virtual:{}", self.name),
            name: self.name.clone(),
            kind: DeviceKind::Virtual,
            is_default: false,
            supported_sample_rates: self.supported_rates.clone(),
        }
    }
}

impl Drop for VirtualOutput {
    fn drop(&mut self) {
        self.close();
    }
}

/// Pulls frames out of a running [`VirtualOutput`] as a sound card would.
#[derive(Clone)]
pub struct VirtualOutputHandle {
    shared: Arc<OutputShared>,
}

impl VirtualOutputHandle {
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    pub fn output_config(&self) -> Option<OutputConfig> {
        *self.shared.config.lock()
    }

    /// Render `frames` frames. Returns the interleaved device samples, or
    /// `None` if the stream is not running.
    pub fn pull(&self, frames: usize) -> Option<Vec<i16>> {
        if !self.is_running() {
            return None;
        }
        let channels = self.output_config()?.device_channels.max(1) as usize;
        let guard = self.shared.render.lock();
        let (ref render, _) = *guard.as_ref()?;

        let mut mono = vec![0i16; frames];
        render(&mut mono[..]);

        let mut device = vec![0i16; frames * channels];
        for (frame, &sample) in device.chunks_mut(channels).zip(&mono) {
            frame.fill(sample);
        }
        self.shared.played.lock().extend_from_slice(&device);
        Some(device)
    }

    /// Everything played since the last `open`, interleaved.
    pub fn played(&self) -> Vec<i16> {
        self.shared.played.lock().clone()
    }

    /// Inject a playback event. Returns `false` if no stream is attached.
    pub fn report(&self, event: StreamEvent) -> bool {
        match *self.shared.render.lock() {
            Some((_, ref on_event)) => {
                on_event(event);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn silent_event() -> EventCallback {
        Arc::new(|_event: StreamEvent| {})
    }

    #[test]
    fn open_falls_back_to_nearest_rate() {
        let mut output = VirtualOutput::new().with_supported_rates(vec![44100, 48000]);
        let config = output.open(47000).unwrap();
        assert_eq!(config.sample_rate, 48000);
        assert_eq!(output.output_config(), Some(config));
    }

    #[test]
    fn pull_spreads_render_across_channels() {
        let mut output = VirtualOutput::new().with_channels(2);
        let handle = output.handle();
        output.open(8000).unwrap();
        assert!(handle.pull(4).is_none());

        let render: RenderCallback = Arc::new(|block: &mut [i16]| {
            for (i, s) in block.iter_mut().enumerate() {
                *s = i as i16;
            }
        });
        output.start(render, silent_event()).unwrap();

        assert_eq!(handle.pull(3), Some(vec![0, 0, 1, 1, 2, 2]));
        assert_eq!(handle.played().len(), 6);

        output.stop().unwrap();
        assert!(handle.pull(3).is_none());
    }

    #[test]
    fn start_requires_open() {
        let mut output = VirtualOutput::new();
        let render: RenderCallback = Arc::new(|_block: &mut [i16]| {});
        assert!(output.start(render, silent_event()).is_err());
    }

    #[test]
    fn unavailable_output_fails_to_open() {
        let mut output = VirtualOutput::new().unavailable();
        assert!(matches!(output.open(16000), Err(EngineError::DeviceUnavailable(_))));
    }
}
