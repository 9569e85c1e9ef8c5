use crate::models::error::EngineError;
use crate::models::state::SessionState;

use super::audio_device::StreamEvent;

/// Notifications from a `SessionController`.
///
/// `on_state_changed` is called from the control thread. `on_stream_event`
/// runs on whichever thread the device reports events from, which may be the
/// real-time thread: implementations must not block.
pub trait SessionObserver: Send + Sync {
    fn on_state_changed(&self, state: &SessionState);

    fn on_stream_event(&self, event: &StreamEvent);

    fn on_error(&self, error: &EngineError);
}
