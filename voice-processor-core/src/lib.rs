//! # voice-processor-core
//!
//! Platform-agnostic real-time voice processing core.
//!
//! Captures microphone blocks from an [`AudioDevice`], runs them through the
//! selected processing mode (passthrough or saturating fixed gain) on the
//! device's callback thread, and accumulates the result for export once the
//! stream stops. Host backends (cpal) implement `AudioDevice` and plug into
//! the generic [`SessionController`].
//!
//! ## Architecture
//!
//! ```text
//! voice-processor-core (this crate)
//! ├── traits/       ← AudioDevice, OutputDevice, StreamCallbacks, SessionObserver
//! ├── models/       ← EngineError, SessionState, StreamConfig, ProcessingMode, Recording
//! ├── processing/   ← SampleProcessor, CaptureBuffer, ToneBurst, WAV encoding
//! ├── session/      ← SessionController (state machine), AudioEngine (real-time side), CallbackGate
//! └── devices/      ← VirtualDevice, VirtualOutput (host-free devices for tests and simulation)
//! ```
//!
//! ## Data flow
//!
//! ```text
//! [AudioDevice callback] → [ProcessingMode::process] → [CaptureBuffer]
//!          ↑                        ↑                         ↓
//!   start/stop/close          AtomicMode swap          drain after stop
//!          └──────────── SessionController ──────────────────┘
//!
//! [OutputDevice render] ← [SignalSource] → [reference CaptureBuffer]
//! ```
//!
//! The reference output is optional. When attached, the signal it plays is
//! recorded next to the microphone so the two can be exported as stereo.

pub mod devices;
pub mod models;
pub mod processing;
pub mod session;
pub mod traits;

// Re-export key types at crate root for convenience.
pub use devices::virtual_device::{VirtualDevice, VirtualDeviceHandle};
pub use devices::virtual_output::{VirtualOutput, VirtualOutputHandle};
pub use models::config::{ActualConfig, OutputConfig, SampleFormat, StreamConfig};
pub use models::device::{DeviceInfo, DeviceKind};
pub use models::diagnostics::StreamDiagnostics;
pub use models::error::EngineError;
pub use models::mode::{ProcessingMode, DEFAULT_AMPLIFICATION_GAIN};
pub use models::recording::{Recording, RecordingMetadata, ReferenceTrack};
pub use models::state::SessionState;
pub use processing::capture_buffer::CaptureBuffer;
pub use processing::processor::{AmplifyProcessor, BypassProcessor, SampleProcessor};
pub use processing::tone::{ConstantSource, SignalSource, ToneBurst};
pub use session::controller::SessionController;
pub use session::engine::AudioEngine;
pub use traits::audio_device::{AudioDevice, BlockCallback, EventCallback, StreamCallbacks, StreamEvent};
pub use traits::output_device::{OutputDevice, RenderCallback};
pub use traits::session_observer::SessionObserver;
