use std::sync::Arc;

use crate::models::config::OutputConfig;
use crate::models::device::DeviceInfo;
use crate::models::error::EngineError;

use super::audio_device::EventCallback;

/// Callback asked to fill one mono output block, one sample per frame.
pub type RenderCallback = Arc<dyn Fn(&mut [i16]) + Send + Sync + 'static>;

/// Interface for playback backends that emit the reference signal.
///
/// Implemented by:
/// - `VirtualOutput` (this crate, host-free)
/// - `CpalOutputDevice` (`voice-processor-cpal`)
///
/// The render callback always works in mono; backends spread each frame
/// across the device's channels. Render calls for one stream are strictly
/// sequential and `stop` returns only once no further render will start.
pub trait OutputDevice: Send {
    fn is_available(&self) -> bool;

    /// Open for playback near `sample_rate`. The device may settle elsewhere.
    fn open(&mut self, sample_rate: u32) -> Result<OutputConfig, EngineError>;

    fn start(&mut self, render: RenderCallback, on_event: EventCallback) -> Result<(), EngineError>;

    fn stop(&mut self) -> Result<(), EngineError>;

    /// Release the device. Implies `stop`.
    fn close(&mut self);

    fn output_config(&self) -> Option<OutputConfig>;

    fn device_info(&self) -> DeviceInfo;
}
