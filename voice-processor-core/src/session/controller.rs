use std::sync::Arc;
use std::time::Duration;

use crate::models::config::{ActualConfig, OutputConfig, StreamConfig};
use crate::models::diagnostics::StreamDiagnostics;
use crate::models::error::EngineError;
use crate::models::mode::ProcessingMode;
use crate::models::recording::Recording;
use crate::models::state::SessionState;
use crate::processing::tone::{SignalSource, ToneBurst};
use crate::session::engine::AudioEngine;
use crate::traits::audio_device::AudioDevice;
use crate::traits::output_device::OutputDevice;
use crate::traits::session_observer::SessionObserver;

/// Lower bound on how long `stop_audio` waits for an in-flight callback.
const MIN_QUIESCE_TIMEOUT: Duration = Duration::from_millis(100);

/// Playback device and the signal it plays while the session runs.
struct ReferenceOutput {
    device: Box<dyn OutputDevice>,
    /// Builds the signal for the output's negotiated rate.
    make_source: Box<dyn Fn(u32) -> Box<dyn SignalSource> + Send>,
}

/// Session state machine driving one audio device.
///
/// This is the surface the UI layer talks to:
/// ```text
/// init(rate, frames) → start_bypass / start_amplification → stop_audio → recorded_data
/// ```
/// All methods run on the control thread. The device's callback thread only
/// ever touches the `AudioEngine` built at `init`.
pub struct SessionController<D: AudioDevice> {
    device: D,
    defaults: StreamConfig,
    state: SessionState,
    actual: Option<ActualConfig>,
    engine: Option<Arc<AudioEngine>>,
    observer: Option<Arc<dyn SessionObserver>>,
    mode_history: Vec<ProcessingMode>,
    recorded: Option<Vec<i16>>,
    final_diagnostics: StreamDiagnostics,
    reference: Option<ReferenceOutput>,
    output_config: Option<OutputConfig>,
    reference_recorded: Option<Vec<i16>>,
}

impl<D: AudioDevice> SessionController<D> {
    pub fn new(device: D) -> Self {
        Self::with_defaults(device, StreamConfig::default())
    }

    /// Use `defaults` for everything `init(rate, frames)` does not specify.
    pub fn with_defaults(device: D, defaults: StreamConfig) -> Self {
        Self {
            device,
            defaults,
            state: SessionState::Uninitialized,
            actual: None,
            engine: None,
            observer: None,
            mode_history: Vec::new(),
            recorded: None,
            final_diagnostics: StreamDiagnostics::default(),
            reference: None,
            output_config: None,
            reference_recorded: None,
        }
    }

    /// Play a signal on `device` while running and record what was played
    /// next to the microphone capture.
    ///
    /// `make_source` is called at each `init` with the output's negotiated
    /// rate. Valid before the first `init` or after a stop; takes effect at
    /// the next `init`.
    pub fn set_reference_output(
        &mut self,
        device: impl OutputDevice + 'static,
        make_source: impl Fn(u32) -> Box<dyn SignalSource> + Send + 'static,
    ) -> Result<(), EngineError> {
        if self.state.is_idle() || self.state.is_running() {
            return Err(EngineError::invalid_state("set_reference_output", &self.state));
        }
        if let Some(mut previous) = self.reference.take() {
            previous.device.close();
        }
        self.reference = Some(ReferenceOutput {
            device: Box::new(device),
            make_source: Box::new(make_source),
        });
        Ok(())
    }

    /// Play the test burst (1 s silence, 1.5 s of `frequency_hz`) as the reference.
    pub fn set_reference_tone(
        &mut self,
        device: impl OutputDevice + 'static,
        frequency_hz: f32,
    ) -> Result<(), EngineError> {
        self.set_reference_output(device, move |rate| -> Box<dyn SignalSource> {
            Box::new(ToneBurst::new(rate, frequency_hz))
        })
    }

    /// Takes effect at the next `init`.
    pub fn set_observer(&mut self, observer: Arc<dyn SessionObserver>) {
        self.observer = Some(observer);
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Active mode while running.
    pub fn mode(&self) -> Option<ProcessingMode> {
        self.state.mode()
    }

    pub fn actual_config(&self) -> Option<&ActualConfig> {
        self.actual.as_ref()
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    /// Negotiated reference output config, once initialized with one.
    pub fn output_config(&self) -> Option<OutputConfig> {
        self.output_config
    }

    /// Live counters while a session is active, the final ones after stop.
    pub fn diagnostics(&self) -> StreamDiagnostics {
        match self.engine {
            Some(ref engine) => engine.diagnostics(),
            None => self.final_diagnostics,
        }
    }

    /// Open the device at `sample_rate`/`buffer_frames` and move to idle.
    pub fn init(&mut self, sample_rate: u32, buffer_frames: u32) -> Result<(), EngineError> {
        let config = StreamConfig {
            sample_rate,
            frames_per_callback: buffer_frames,
            ..self.defaults.clone()
        };
        self.init_with(config)
    }

    /// Open the device with a full config. Transitions: uninitialized/idle/stopped → idle.
    ///
    /// Any previous recording is discarded.
    pub fn init_with(&mut self, config: StreamConfig) -> Result<(), EngineError> {
        if !self.state.can_init() {
            return Err(EngineError::invalid_state("init", &self.state));
        }
        config.validate().map_err(EngineError::InvalidConfiguration)?;

        if self.state.is_initialized() {
            self.device.close();
            if let Some(reference) = self.reference.as_mut() {
                reference.device.close();
            }
        }
        self.engine = None;
        self.actual = None;
        self.output_config = None;
        self.reference_recorded = None;
        self.recorded = None;
        self.mode_history.clear();
        self.final_diagnostics = StreamDiagnostics::default();

        let actual = match self.device.open(&config) {
            Ok(actual) => actual,
            Err(e) => {
                log::error!("Failed to open {}: {}", self.device.device_info().name, e);
                self.notify_error(&e);
                self.set_state(SessionState::Uninitialized);
                return Err(e);
            }
        };

        if actual.was_coerced() {
            log::warn!(
                "Device negotiated {} Hz / {} frames (requested {} Hz / {} frames)",
                actual.sample_rate,
                actual.frames_per_callback,
                config.sample_rate,
                config.frames_per_callback
            );
        }
        log::info!(
            "Session initialized: {} Hz, {} frames per callback, {} channel(s)",
            actual.sample_rate,
            actual.frames_per_callback,
            actual.channels
        );

        let opened = self.reference.as_mut().map(|reference| {
            reference
                .device
                .open(actual.sample_rate)
                .map(|output| (output, (reference.make_source)(output.sample_rate)))
        });

        let mut engine = AudioEngine::new(&actual, self.observer.clone());
        match opened {
            Some(Ok((output, source))) => {
                if output.sample_rate != actual.sample_rate {
                    log::warn!(
                        "Reference output runs at {} Hz, input at {} Hz",
                        output.sample_rate,
                        actual.sample_rate
                    );
                }
                log::info!(
                    "Reference output opened: {} Hz, {} device channel(s)",
                    output.sample_rate,
                    output.device_channels
                );
                engine = engine.with_reference(source, &output, &actual);
                self.output_config = Some(output);
            }
            Some(Err(e)) => {
                log::error!("Failed to open reference output: {}", e);
                self.device.close();
                self.notify_error(&e);
                self.set_state(SessionState::Uninitialized);
                return Err(e);
            }
            None => {}
        }

        self.engine = Some(Arc::new(engine));
        self.actual = Some(actual);
        self.set_state(SessionState::Idle);
        Ok(())
    }

    /// Start (or switch to) passthrough. Transitions: idle/running → running.
    pub fn start_bypass(&mut self) -> Result<(), EngineError> {
        self.start(ProcessingMode::Bypass)
    }

    /// Start (or switch to) fixed-gain amplification. Transitions: idle/running → running.
    pub fn start_amplification(&mut self) -> Result<(), EngineError> {
        let gain = self
            .actual
            .as_ref()
            .map_or(self.defaults.amplification_gain, |a| a.requested.amplification_gain);
        self.start(ProcessingMode::amplify(gain))
    }

    /// Run with `mode`, starting the stream if idle.
    pub fn start(&mut self, mode: ProcessingMode) -> Result<(), EngineError> {
        match self.state {
            SessionState::Idle => self.begin_stream(mode),
            SessionState::Running(_) => self.set_mode(mode),
            _ => Err(EngineError::invalid_state("start", &self.state)),
        }
    }

    /// Switch modes on a running stream without restarting it.
    ///
    /// Takes effect from the next callback block.
    pub fn set_mode(&mut self, mode: ProcessingMode) -> Result<(), EngineError> {
        let SessionState::Running(current) = self.state else {
            return Err(EngineError::invalid_state("set_mode", &self.state));
        };
        if current == mode {
            return Ok(());
        }

        let engine = self.active_engine("set_mode")?;
        engine.set_mode(mode);
        log::info!("Processing mode switched: {} → {}", current, mode);

        self.mode_history.push(mode);
        self.set_state(SessionState::Running(mode));
        Ok(())
    }

    /// Stop callbacks, wait for the in-flight one, keep the capture.
    /// Transitions: running → stopped.
    pub fn stop_audio(&mut self) -> Result<(), EngineError> {
        if !self.state.is_running() {
            return Err(EngineError::invalid_state("stop_audio", &self.state));
        }
        let engine = Arc::clone(self.active_engine("stop_audio")?);

        if let Err(e) = self.device.stop() {
            // Still quiesce and keep what was captured.
            log::error!("Device stop failed: {}", e);
            self.notify_error(&e);
        }
        self.stop_reference();

        let timeout = self
            .actual
            .as_ref()
            .map_or(MIN_QUIESCE_TIMEOUT, |a| (a.callback_period() * 2).max(MIN_QUIESCE_TIMEOUT));
        if !engine.quiesce(timeout) {
            log::warn!("Audio callback still in flight after {:?}", timeout);
        }

        self.device.close();
        if let Some(reference) = self.reference.as_mut() {
            reference.device.close();
        }

        let samples = engine.drain_capture();
        let reference = engine.drain_reference();
        let diagnostics = engine.diagnostics();
        log::info!(
            "Session stopped: {} samples captured, {} callbacks, {} dropped, {} xruns",
            samples.len(),
            diagnostics.callback_count,
            diagnostics.dropped_samples,
            diagnostics.xruns()
        );

        if let Some(ref played) = reference {
            log::info!("Reference track: {} samples played", played.len());
        }

        self.recorded = Some(samples);
        self.reference_recorded = reference;
        self.final_diagnostics = diagnostics;
        self.engine = None;
        self.set_state(SessionState::Stopped);
        Ok(())
    }

    /// Everything captured by the stopped session. Valid only when stopped.
    pub fn recorded_data(&self) -> Result<Vec<i16>, EngineError> {
        match (&self.state, &self.recorded) {
            (SessionState::Stopped, Some(samples)) => Ok(samples.clone()),
            _ => Err(EngineError::invalid_state("recorded_data", &self.state)),
        }
    }

    /// Captured samples with format and metadata. Valid only when stopped.
    pub fn recording(&self) -> Result<Recording, EngineError> {
        let samples = self.recorded_data()?;
        let actual = self
            .actual
            .as_ref()
            .ok_or_else(|| EngineError::invalid_state("recording", &self.state))?;
        let recording = Recording::new(samples, actual, self.mode_history.clone(), self.final_diagnostics);
        Ok(match (&self.reference_recorded, self.output_config) {
            (Some(played), Some(output)) => recording.with_reference(played.clone(), output.sample_rate),
            _ => recording,
        })
    }

    /// The signal played on the reference output. Valid only when stopped;
    /// `None` when the session had no reference output.
    pub fn reference_data(&self) -> Result<Option<Vec<i16>>, EngineError> {
        if !self.state.is_stopped() {
            return Err(EngineError::invalid_state("reference_data", &self.state));
        }
        Ok(self.reference_recorded.clone())
    }

    /// Negotiated sample rate. Valid from idle onward.
    pub fn sample_rate(&self) -> Result<u32, EngineError> {
        self.actual
            .as_ref()
            .map(|a| a.sample_rate)
            .ok_or_else(|| EngineError::invalid_state("sample_rate", &self.state))
    }

    // --- Internal helpers ---

    fn begin_stream(&mut self, mode: ProcessingMode) -> Result<(), EngineError> {
        let engine = Arc::clone(self.active_engine("start")?);
        engine.prime_mode(mode);
        engine.activate();
        let callbacks = engine.callbacks();

        // Output first, so the reference is already playing when input arrives.
        if let Some(reference) = self.reference.as_mut() {
            if let Err(e) = reference
                .device
                .start(engine.render_callback(), Arc::clone(&callbacks.on_event))
            {
                return Err(self.abort_start(&engine, e));
            }
        }
        if let Err(e) = self.device.start(callbacks) {
            self.stop_reference();
            return Err(self.abort_start(&engine, e));
        }

        log::info!("Stream started in {} mode", mode);
        self.mode_history.push(mode);
        self.set_state(SessionState::Running(mode));
        Ok(())
    }

    fn abort_start(&self, engine: &AudioEngine, error: EngineError) -> EngineError {
        engine.quiesce(MIN_QUIESCE_TIMEOUT);
        log::error!("Failed to start stream: {}", error);
        self.notify_error(&error);
        error
    }

    fn stop_reference(&mut self) {
        let result = self.reference.as_mut().map_or(Ok(()), |r| r.device.stop());
        if let Err(e) = result {
            log::error!("Reference output stop failed: {}", e);
            self.notify_error(&e);
        }
    }

    fn active_engine(&self, operation: &'static str) -> Result<&Arc<AudioEngine>, EngineError> {
        self.engine
            .as_ref()
            .ok_or_else(|| EngineError::invalid_state(operation, &self.state))
    }

    fn set_state(&mut self, state: SessionState) {
        self.state = state;
        if let Some(ref observer) = self.observer {
            observer.on_state_changed(&state);
        }
    }

    fn notify_error(&self, error: &EngineError) {
        if let Some(ref observer) = self.observer {
            observer.on_error(error);
        }
    }
}

impl<D: AudioDevice> Drop for SessionController<D> {
    fn drop(&mut self) {
        if self.state.is_running() {
            let _ = self.stop_audio();
        }
        self.device.close();
        if let Some(reference) = self.reference.as_mut() {
            reference.device.close();
        }
    }
}
