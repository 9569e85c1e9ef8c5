use std::sync::Arc;

use crate::models::config::{ActualConfig, StreamConfig};
use crate::models::device::DeviceInfo;
use crate::models::error::EngineError;

/// Non-fatal conditions a device reports while its stream keeps running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Input arrived faster than it was consumed; frames were lost.
    Overrun,
    /// The device ran dry before the next callback was due.
    Underrun,
    /// The device went away. No further blocks will arrive.
    DeviceLost,
    Error(String),
}

/// Callback invoked with one contiguous, interleaved block per hardware period.
///
/// The block is mutable so processing can happen in place.
pub type BlockCallback = Arc<dyn Fn(&mut [i16]) + Send + Sync + 'static>;

/// Callback invoked for stream-level events (xruns, device loss).
pub type EventCallback = Arc<dyn Fn(StreamEvent) + Send + Sync + 'static>;

/// The pair of callbacks a device drives while started.
#[derive(Clone)]
pub struct StreamCallbacks {
    pub on_block: BlockCallback,
    pub on_event: EventCallback,
}

/// Interface for audio input backends.
///
/// Implemented by:
/// - `VirtualDevice` (this crate, host-free)
/// - `CpalInputDevice` (`voice-processor-cpal`)
///
/// Contract: block callbacks for one open stream are strictly sequential,
/// never concurrent with each other. `stop` returns only once no further
/// callback will start.
pub trait AudioDevice: Send {
    /// Whether the device can currently be opened.
    fn is_available(&self) -> bool;

    /// Open the device, negotiating the closest supported configuration.
    ///
    /// An unsupported rate or buffer size is not an error: the returned
    /// `ActualConfig` carries what the device settled on.
    fn open(&mut self, requested: &StreamConfig) -> Result<ActualConfig, EngineError>;

    /// Begin delivering blocks. Requires a prior `open`.
    fn start(&mut self, callbacks: StreamCallbacks) -> Result<(), EngineError>;

    /// Stop delivering blocks. The device stays open.
    fn stop(&mut self) -> Result<(), EngineError>;

    /// Release the device. Implies `stop`.
    fn close(&mut self);

    /// The negotiated config of the open stream, if any.
    fn actual_config(&self) -> Option<ActualConfig>;

    fn device_info(&self) -> DeviceInfo;
}
