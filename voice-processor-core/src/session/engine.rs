use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::models::config::{ActualConfig, OutputConfig, MAX_PREALLOCATE_SAMPLES};
use crate::models::diagnostics::{StreamCounters, StreamDiagnostics};
use crate::models::mode::{AtomicMode, ProcessingMode};
use crate::processing::capture_buffer::CaptureBuffer;
use crate::processing::tone::SignalSource;
use crate::session::gate::CallbackGate;
use crate::traits::audio_device::{BlockCallback, EventCallback, StreamCallbacks, StreamEvent};
use crate::traits::output_device::RenderCallback;
use crate::traits::session_observer::SessionObserver;

/// Played reference signal and its recorded copy.
struct ReferencePath {
    source: Mutex<Box<dyn SignalSource>>,
    capture: Mutex<CaptureBuffer>,
}

/// State shared between the control thread and the device callback.
///
/// One engine is built per `init` and dropped when the session is torn
/// down. The callback side (`process_block`, `handle_event`) never blocks:
/// the mode is a single atomic word, the capture buffer is only `try_lock`ed,
/// and counters are relaxed atomics.
pub struct AudioEngine {
    mode: AtomicMode,
    capture: Mutex<CaptureBuffer>,
    gate: CallbackGate,
    counters: StreamCounters,
    channels: usize,
    observer: Option<Arc<dyn SessionObserver>>,
    reference: Option<ReferencePath>,
}

impl AudioEngine {
    /// Build an engine for `actual`, reserving capture storage up front.
    pub fn new(actual: &ActualConfig, observer: Option<Arc<dyn SessionObserver>>) -> Self {
        let requested = &actual.requested;
        let reserve = actual.samples_for(requested.preallocate_secs).min(MAX_PREALLOCATE_SAMPLES);
        let limit = requested.max_duration_secs.map(|secs| actual.samples_for(secs));

        let mut capture = CaptureBuffer::new();
        capture.reset(reserve, limit);

        Self {
            mode: AtomicMode::default(),
            capture: Mutex::new(capture),
            gate: CallbackGate::new(),
            counters: StreamCounters::default(),
            channels: actual.channels.max(1) as usize,
            observer,
            reference: None,
        }
    }

    /// Play `source` on a reference output and record what was played.
    ///
    /// Storage follows the input's preallocation and cap, at the output rate.
    pub fn with_reference(mut self, source: Box<dyn SignalSource>, output: &OutputConfig, actual: &ActualConfig) -> Self {
        let requested = &actual.requested;
        let reserve = output.samples_for(requested.preallocate_secs).min(MAX_PREALLOCATE_SAMPLES);
        let limit = requested.max_duration_secs.map(|secs| output.samples_for(secs));

        let mut capture = CaptureBuffer::new();
        capture.reset(reserve, limit);

        self.reference = Some(ReferencePath {
            source: Mutex::new(source),
            capture: Mutex::new(capture),
        });
        self
    }

    pub fn has_reference(&self) -> bool {
        self.reference.is_some()
    }

    /// Device callbacks bound to this engine.
    pub fn callbacks(self: &Arc<Self>) -> StreamCallbacks {
        let block_engine = Arc::clone(self);
        let on_block: BlockCallback = Arc::new(move |block: &mut [i16]| block_engine.process_block(block));

        let event_engine = Arc::clone(self);
        let on_event: EventCallback = Arc::new(move |event: StreamEvent| event_engine.handle_event(event));

        StreamCallbacks { on_block, on_event }
    }

    /// Output render callback bound to this engine.
    pub fn render_callback(self: &Arc<Self>) -> RenderCallback {
        let engine = Arc::clone(self);
        Arc::new(move |block: &mut [i16]| engine.render_block(block))
    }

    /// Real-time entry point: process one block in place and capture it.
    pub fn process_block(&self, block: &mut [i16]) {
        let Some(_pass) = self.gate.enter() else {
            return;
        };

        // One load per block: a concurrent switch lands on the next block.
        let mode = self.mode.load();
        mode.process(block);

        let frames = (block.len() / self.channels) as u64;
        match self.capture.try_lock() {
            Some(mut capture) => {
                let accepted = capture.append(block);
                self.counters
                    .record_block(frames, accepted as u64, (block.len() - accepted) as u64);
            }
            None => self.counters.record_skipped(frames, block.len() as u64),
        }
    }

    /// Real-time entry point for the output: fill a mono block with the
    /// reference signal and record it. Silence when closed or contended.
    pub fn render_block(&self, block: &mut [i16]) {
        let Some(_pass) = self.gate.enter() else {
            block.fill(0);
            return;
        };
        let Some(ref reference) = self.reference else {
            block.fill(0);
            return;
        };

        match reference.source.try_lock() {
            Some(mut source) => source.fill(block, 1),
            None => block.fill(0),
        }
        if let Some(mut capture) = reference.capture.try_lock() {
            capture.append(block);
        }
        self.counters.record_render(block.len() as u64);
    }

    /// Count and report a device event. The stream is never stopped here.
    pub fn handle_event(&self, event: StreamEvent) {
        let total = match &event {
            StreamEvent::Overrun => self.counters.record_overrun(),
            StreamEvent::Underrun => self.counters.record_underrun(),
            StreamEvent::DeviceLost | StreamEvent::Error(_) => self.counters.record_stream_error(),
        };

        // First occurrence, then every 64th.
        if total == 1 || total % 64 == 0 {
            log::warn!("Audio stream event {:?} (total {})", event, total);
        }

        if let Some(ref observer) = self.observer {
            observer.on_stream_event(&event);
        }
    }

    pub fn mode(&self) -> ProcessingMode {
        self.mode.load()
    }

    /// Set the mode a stream starts in. Not counted as a switch.
    pub fn prime_mode(&self, mode: ProcessingMode) {
        self.mode.store(mode);
    }

    /// Switch the active mode; returns the previous one.
    pub fn set_mode(&self, mode: ProcessingMode) -> ProcessingMode {
        let previous = self.mode.swap(mode);
        if previous != mode {
            self.counters.record_mode_switch();
        }
        previous
    }

    /// Let callbacks through.
    pub fn activate(&self) {
        self.gate.open();
    }

    /// Refuse new callbacks and wait for in-flight ones to finish.
    pub fn quiesce(&self, timeout: Duration) -> bool {
        self.gate.close_and_wait(timeout)
    }

    pub fn is_active(&self) -> bool {
        self.gate.is_open()
    }

    /// Take everything captured so far. Control thread only, after `quiesce`.
    pub fn drain_capture(&self) -> Vec<i16> {
        self.capture.lock().drain()
    }

    /// Take the recorded reference signal, if one was attached.
    pub fn drain_reference(&self) -> Option<Vec<i16>> {
        self.reference.as_ref().map(|r| r.capture.lock().drain())
    }

    pub fn captured_len(&self) -> usize {
        self.capture.lock().len()
    }

    pub fn diagnostics(&self) -> StreamDiagnostics {
        self.counters.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::config::StreamConfig;
    use crate::processing::tone::ConstantSource;

    fn engine(config: StreamConfig) -> Arc<AudioEngine> {
        Arc::new(AudioEngine::new(&ActualConfig::exact(&config), None))
    }

    #[test]
    fn inactive_engine_ignores_blocks() {
        let engine = engine(StreamConfig::default());
        let mut block = [1000i16; 48];
        engine.process_block(&mut block);

        assert_eq!(engine.captured_len(), 0);
        assert_eq!(engine.diagnostics().callback_count, 0);
    }

    #[test]
    fn active_engine_processes_and_captures() {
        let engine = engine(StreamConfig::default());
        engine.set_mode(ProcessingMode::amplify(2.0));
        engine.activate();

        let callbacks = engine.callbacks();
        let mut block = [1000i16; 48];
        (callbacks.on_block)(&mut block[..]);

        assert_eq!(block, [2000; 48]);
        assert_eq!(engine.drain_capture(), vec![2000; 48]);
        let diag = engine.diagnostics();
        assert_eq!(diag.callback_count, 1);
        assert_eq!(diag.frames_processed, 48);
        assert_eq!(diag.mode_switches, 1);
    }

    #[test]
    fn contended_capture_skips_block() {
        let engine = engine(StreamConfig::default());
        engine.activate();

        let guard = engine.capture.lock();
        let mut block = [7i16; 48];
        engine.process_block(&mut block);
        drop(guard);

        let diag = engine.diagnostics();
        assert_eq!(diag.skipped_blocks, 1);
        assert_eq!(diag.dropped_samples, 48);
        assert_eq!(engine.captured_len(), 0);
    }

    #[test]
    fn capture_cap_follows_actual_rate() {
        let config = StreamConfig::new(1000, 10).with_max_duration(0.05);
        let engine = engine(config);
        engine.activate();

        for _ in 0..10 {
            engine.process_block(&mut [1i16; 10]);
        }

        assert_eq!(engine.captured_len(), 50);
        assert_eq!(engine.diagnostics().dropped_samples, 50);
    }

    #[test]
    fn events_are_counted_not_fatal() {
        let engine = engine(StreamConfig::default());
        engine.activate();

        engine.handle_event(StreamEvent::Overrun);
        engine.handle_event(StreamEvent::Underrun);
        engine.handle_event(StreamEvent::Error("glitch".into()));
        engine.process_block(&mut [1i16; 48]);

        let diag = engine.diagnostics();
        assert_eq!(diag.overruns, 1);
        assert_eq!(diag.underruns, 1);
        assert_eq!(diag.stream_errors, 1);
        assert_eq!(engine.captured_len(), 48);
    }

    #[test]
    fn primed_mode_is_not_a_switch() {
        let engine = engine(StreamConfig::default());
        engine.prime_mode(ProcessingMode::amplify(2.0));
        engine.activate();
        engine.process_block(&mut [1000i16; 48]);

        assert_eq!(engine.drain_capture(), vec![2000; 48]);
        assert_eq!(engine.diagnostics().mode_switches, 0);

        engine.set_mode(ProcessingMode::Bypass);
        assert_eq!(engine.diagnostics().mode_switches, 1);
    }

    #[test]
    fn reference_is_rendered_and_recorded() {
        let config = StreamConfig::new(1000, 10);
        let actual = ActualConfig::exact(&config);
        let output = OutputConfig {
            sample_rate: 1000,
            device_channels: 2,
        };
        let engine = Arc::new(
            AudioEngine::new(&actual, None).with_reference(Box::new(ConstantSource(300)), &output, &actual),
        );
        let render = engine.render_callback();

        let mut block = [7i16; 10];
        render(&mut block[..]);
        assert_eq!(block, [0; 10]);

        engine.activate();
        render(&mut block[..]);
        assert_eq!(block, [300; 10]);
        assert_eq!(engine.diagnostics().frames_rendered, 10);

        assert!(engine.quiesce(Duration::from_millis(10)));
        assert_eq!(engine.drain_reference(), Some(vec![300; 10]));
    }

    #[test]
    fn render_without_reference_is_silent() {
        let engine = engine(StreamConfig::default());
        engine.activate();
        let mut block = [5i16; 16];
        engine.render_block(&mut block);

        assert_eq!(block, [0; 16]);
        assert_eq!(engine.drain_reference(), None);
    }

    #[test]
    fn quiesced_engine_stops_capturing() {
        let engine = engine(StreamConfig::default());
        engine.activate();
        engine.process_block(&mut [1i16; 48]);

        assert!(engine.quiesce(Duration::from_millis(10)));
        engine.process_block(&mut [1i16; 48]);

        assert_eq!(engine.captured_len(), 48);
        assert!(!engine.is_active());
    }
}
