//! Host-free audio device.
//!
//! Negotiates like real hardware (nearest supported rate, clamped buffer
//! size) but delivers blocks either on demand through a
//! [`VirtualDeviceHandle`] or from a clock thread fed by a [`SignalSource`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::models::config::{ActualConfig, StreamConfig};
use crate::models::device::{DeviceInfo, DeviceKind};
use crate::models::error::EngineError;
use crate::processing::tone::SignalSource;
use crate::traits::audio_device::{AudioDevice, StreamCallbacks, StreamEvent};

const DEFAULT_MIN_FRAMES: u32 = 16;
const DEFAULT_MAX_FRAMES: u32 = 8192;

/// State shared with handles and the clock thread.
struct Shared {
    // Held for the whole delivery, which keeps callbacks strictly sequential.
    callbacks: Mutex<Option<StreamCallbacks>>,
    scratch: Mutex<Vec<i16>>,
    running: AtomicBool,
    actual: Mutex<Option<ActualConfig>>,
}

impl Shared {
    fn deliver(&self, fill: impl FnOnce(&mut Vec<i16>)) -> bool {
        if !self.running.load(Ordering::SeqCst) {
            return false;
        }
        let callbacks = self.callbacks.lock();
        let Some(ref callbacks) = *callbacks else {
            return false;
        };
        let mut scratch = self.scratch.lock();
        fill(&mut *scratch);
        (callbacks.on_block)(&mut scratch[..]);
        true
    }

    fn report(&self, event: StreamEvent) -> bool {
        let callbacks = self.callbacks.lock();
        match *callbacks {
            Some(ref callbacks) => {
                (callbacks.on_event)(event);
                true
            }
            None => false,
        }
    }
}

/// Simulated input device.
pub struct VirtualDevice {
    name: String,
    supported_rates: Vec<u32>,
    frame_range: (u32, u32),
    available: bool,
    shared: Arc<Shared>,
    source: Option<Arc<Mutex<Box<dyn SignalSource>>>>,
    clock_handle: Option<thread::JoinHandle<()>>,
}

impl VirtualDevice {
    /// A device that accepts any sample rate.
    pub fn new() -> Self {
        Self {
            name: "Virtual Input".into(),
            supported_rates: Vec::new(),
            frame_range: (DEFAULT_MIN_FRAMES, DEFAULT_MAX_FRAMES),
            available: true,
            shared: Arc::new(Shared {
                callbacks: Mutex::new(None),
                scratch: Mutex::new(Vec::new()),
                running: AtomicBool::new(false),
                actual: Mutex::new(None),
            }),
            source: None,
            clock_handle: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Restrict native rates; other requests fall back to the nearest one.
    pub fn with_supported_rates(mut self, rates: impl Into<Vec<u32>>) -> Self {
        self.supported_rates = rates.into();
        self
    }

    /// Clamp callback sizes to `min..=max` frames.
    pub fn with_frame_range(mut self, min: u32, max: u32) -> Self {
        self.frame_range = (min.max(1), max.max(min.max(1)));
        self
    }

    /// Simulate a missing device: `open` fails.
    pub fn unavailable(mut self) -> Self {
        self.available = false;
        self
    }

    /// Drive callbacks from a clock thread, one block per callback period.
    pub fn with_source(mut self, source: impl SignalSource + 'static) -> Self {
        let source: Box<dyn SignalSource> = Box::new(source);
        self.source = Some(Arc::new(Mutex::new(source)));
        self
    }

    /// Handle for feeding blocks and injecting events from a test or host.
    pub fn handle(&self) -> VirtualDeviceHandle {
        VirtualDeviceHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    fn negotiate(&self, requested: &StreamConfig) -> ActualConfig {
        let sample_rate = if self.supported_rates.is_empty() || self.supported_rates.contains(&requested.sample_rate) {
            requested.sample_rate
        } else {
            self.supported_rates
                .iter()
                .copied()
                .min_by_key(|rate| rate.abs_diff(requested.sample_rate))
                .unwrap_or(requested.sample_rate)
        };
        let (min, max) = self.frame_range;

        ActualConfig {
            sample_rate,
            frames_per_callback: requested.frames_per_callback.clamp(min, max),
            channels: requested.channels,
            format: requested.format,
            requested: requested.clone(),
        }
    }

    fn spawn_clock(&mut self, actual: &ActualConfig) -> Result<(), EngineError> {
        let Some(ref source) = self.source else {
            return Ok(());
        };

        let shared = Arc::clone(&self.shared);
        let source = Arc::clone(source);
        let period = actual.callback_period();
        let channels = actual.channels as usize;

        let handle = thread::Builder::new()
            .name("virtual-device-clock".into())
            .spawn(move || {
                let mut next = Instant::now();
                while shared.running.load(Ordering::SeqCst) {
                    let delivered = shared.deliver(|block| source.lock().fill(block, channels));
                    if !delivered {
                        break;
                    }
                    next += period;
                    let now = Instant::now();
                    if next > now {
                        thread::sleep(next - now);
                    } else if now - next > period {
                        // Fell more than a period behind the clock.
                        shared.report(StreamEvent::Overrun);
                        next = now;
                    }
                }
            })
            .map_err(|e| EngineError::StreamFailed(format!("failed to spawn clock thread: {}", e)))?;

        self.clock_handle = Some(handle);
        Ok(())
    }
}

impl Default for VirtualDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioDevice for VirtualDevice {
    fn is_available(&self) -> bool {
        self.available
    }

    fn open(&mut self, requested: &StreamConfig) -> Result<ActualConfig, EngineError> {
        if !self.available {
            return Err(EngineError::DeviceUnavailable(format!("{} is not connected", self.name)));
        }
        self.close();

        let actual = self.negotiate(requested);
        *self.shared.scratch.lock() = vec![0; actual.samples_per_callback()];
        *self.shared.actual.lock() = Some(actual.clone());
        Ok(actual)
    }

    fn start(&mut self, callbacks: StreamCallbacks) -> Result<(), EngineError> {
        let actual = self
            .actual_config()
            .ok_or_else(|| EngineError::StreamFailed("device is not open".into()))?;
        if self.shared.running.load(Ordering::SeqCst) {
            return Err(EngineError::StreamFailed("stream already running".into()));
        }

        *self.shared.callbacks.lock() = Some(callbacks);
        self.shared.running.store(true, Ordering::SeqCst);

        if let Err(e) = self.spawn_clock(&actual) {
            self.shared.running.store(false, Ordering::SeqCst);
            *self.shared.callbacks.lock() = None;
            return Err(e);
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<(), EngineError> {
        self.shared.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.clock_handle.take() {
            let _ = handle.join();
        }
        // Waits out a delivery that is already in progress.
        *self.shared.callbacks.lock() = None;
        Ok(())
    }

    fn close(&mut self) {
        let _ = self.stop();
        *self.shared.actual.lock() = None;
    }

    fn actual_config(&self) -> Option<ActualConfig> {
        self.shared.actual.lock().clone()
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

impl Drop for VirtualDevice {
    fn drop(&mut self) {
        self.close();
    }
}

/// Feeds blocks into a running [`VirtualDevice`] as if hardware delivered them.
#[derive(Clone)]
pub struct VirtualDeviceHandle {
    shared: Arc<Shared>,
}

impl VirtualDeviceHandle {
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    pub fn actual_config(&self) -> Option<ActualConfig> {
        self.shared.actual.lock().clone()
    }

    /// Deliver one block. Returns `false` if the stream is not running.
    pub fn feed(&self, block: &[i16]) -> bool {
        self.shared.deliver(|scratch| {
            if scratch.len() != block.len() {
                scratch.resize(block.len(), 0);
            }
            scratch.copy_from_slice(block);
        })
    }

    /// Deliver one callback-sized block of `value`.
    pub fn feed_constant(&self, value: i16) -> bool {
        let Some(actual) = self.actual_config() else {
            return false;
        };
        let samples = actual.samples_per_callback();
        self.shared.deliver(|scratch| {
            scratch.resize(samples, 0);
            scratch.fill(value);
        })
    }

    /// Deliver `count` callback-sized blocks of `value`; returns how many landed.
    pub fn feed_blocks(&self, count: usize, value: i16) -> usize {
        (0..count).take_while(|_| self.feed_constant(value)).count()
    }

    /// Inject a stream event. Returns `false` if no stream is attached.
    pub fn report(&self, event: StreamEvent) -> bool {
        self.shared.report(event)
    }

    /// Simulate hot-unplug: report the loss and stop delivering.
    pub fn disconnect(&self) {
        self.shared.report(StreamEvent::DeviceLost);
        self.shared.running.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::tone::ConstantSource;
    use std::sync::atomic::AtomicUsize;

    fn counting_callbacks(count: Arc<AtomicUsize>, events: Arc<AtomicUsize>) -> StreamCallbacks {
        StreamCallbacks {
            on_block: Arc::new(move |block: &mut [i16]| {
                count.fetch_add(block.len(), Ordering::SeqCst);
            }),
            on_event: Arc::new(move |_event: StreamEvent| {
                events.fetch_add(1, Ordering::SeqCst);
            }),
        }
    }

    #[test]
    fn open_uses_requested_rate_when_supported() {
        let mut device = VirtualDevice::new();
        let actual = device.open(&StreamConfig::new(16000, 48)).unwrap();
        assert_eq!(actual.sample_rate, 16000);
        assert_eq!(actual.frames_per_callback, 48);
        assert!(!actual.was_coerced());
    }

    #[test]
    fn open_falls_back_to_nearest_rate_and_clamps_frames() {
        let mut device = VirtualDevice::new()
            .with_supported_rates(vec![44100, 48000])
            .with_frame_range(64, 1024);
        let actual = device.open(&StreamConfig::new(16000, 48)).unwrap();

        assert_eq!(actual.sample_rate, 44100);
        assert_eq!(actual.frames_per_callback, 64);
        assert!(actual.was_coerced());
        assert_eq!(device.actual_config(), Some(actual));
    }

    #[test]
    fn unavailable_device_fails_to_open() {
        let mut device = VirtualDevice::new().unavailable();
        let err = device.open(&StreamConfig::default()).unwrap_err();
        assert!(matches!(err, EngineError::DeviceUnavailable(_)));
    }

    #[test]
    fn start_requires_open() {
        let mut device = VirtualDevice::new();
        let count = Arc::new(AtomicUsize::new(0));
        let events = Arc::new(AtomicUsize::new(0));
        assert!(device.start(counting_callbacks(count, events)).is_err());
    }

    #[test]
    fn handle_feeds_only_while_running() {
        let mut device = VirtualDevice::new();
        let handle = device.handle();
        device.open(&StreamConfig::new(16000, 48)).unwrap();

        assert!(!handle.feed_constant(1));

        let count = Arc::new(AtomicUsize::new(0));
        let events = Arc::new(AtomicUsize::new(0));
        device
            .start(counting_callbacks(Arc::clone(&count), Arc::clone(&events)))
            .unwrap();

        assert_eq!(handle.feed_blocks(10, 1), 10);
        assert!(handle.feed(&[1, 2, 3]));
        assert!(handle.report(StreamEvent::Overrun));
        assert_eq!(count.load(Ordering::SeqCst), 483);
        assert_eq!(events.load(Ordering::SeqCst), 1);

        device.stop().unwrap();
        assert!(!handle.feed_constant(1));
        assert!(!handle.report(StreamEvent::Overrun));
    }

    #[test]
    fn second_start_is_rejected() {
        let mut device = VirtualDevice::new();
        device.open(&StreamConfig::default()).unwrap();
        let count = Arc::new(AtomicUsize::new(0));
        let events = Arc::new(AtomicUsize::new(0));
        device
            .start(counting_callbacks(Arc::clone(&count), Arc::clone(&events)))
            .unwrap();
        assert!(device.start(counting_callbacks(count, events)).is_err());
    }

    #[test]
    fn clocked_source_delivers_until_stopped() {
        let mut device = VirtualDevice::new().with_source(ConstantSource(5));
        device.open(&StreamConfig::new(48000, 480)).unwrap();

        let count = Arc::new(AtomicUsize::new(0));
        let events = Arc::new(AtomicUsize::new(0));
        device
            .start(counting_callbacks(Arc::clone(&count), events))
            .unwrap();
        thread::sleep(Duration::from_millis(50));
        device.stop().unwrap();

        let delivered = count.load(Ordering::SeqCst);
        assert!(delivered > 0);
        assert_eq!(delivered % 480, 0);

        thread::sleep(Duration::from_millis(20));
        assert_eq!(count.load(Ordering::SeqCst), delivered);
    }

    #[test]
    fn disconnect_reports_device_lost() {
        let mut device = VirtualDevice::new();
        let handle = device.handle();
        device.open(&StreamConfig::default()).unwrap();
        let count = Arc::new(AtomicUsize::new(0));
        let events = Arc::new(AtomicUsize::new(0));
        device
            .start(counting_callbacks(Arc::clone(&count), Arc::clone(&events)))
            .unwrap();

        handle.disconnect();
        assert_eq!(events.load(Ordering::SeqCst), 1);
        assert!(!handle.is_running());
        assert!(!handle.feed_constant(1));
    }
}
