use thiserror::Error;

use super::state::SessionState;

/// Errors surfaced by the voice processing core.
///
/// Nothing here is ever raised on the real-time callback thread; callback
/// failures degrade into diagnostics counters instead.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EngineError {
    #[error("device not available: {0}")]
    DeviceUnavailable(String),

    #[error("configuration unsupported: {0}")]
    ConfigurationUnsupported(String),

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("`{operation}` is not valid in state {state}")]
    InvalidStateTransition {
        operation: &'static str,
        state: SessionState,
    },

    #[error("stream failed: {0}")]
    StreamFailed(String),
}

impl EngineError {
    pub(crate) fn invalid_state(operation: &'static str, state: &SessionState) -> Self {
        Self::InvalidStateTransition {
            operation,
            state: state.clone(),
        }
    }

    pub fn is_invalid_state(&self) -> bool {
        matches!(self, Self::InvalidStateTransition { .. })
    }
}
