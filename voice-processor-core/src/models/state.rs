use std::fmt;

use super::mode::ProcessingMode;

/// Session controller state machine.
///
/// State transitions:
/// ```text
/// uninitialized ─init→ idle ─start*→ running(mode) ─stop→ stopped
///                       ↑               ↺ set_mode          │
///                       └──────────────── init ─────────────┘
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub enum SessionState {
    #[default]
    Uninitialized,
    Idle,
    Running(ProcessingMode),
    Stopped,
}

impl SessionState {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running(_))
    }

    pub fn is_stopped(&self) -> bool {
        matches!(self, Self::Stopped)
    }

    /// Whether a device has been opened and its actual config is known.
    pub fn is_initialized(&self) -> bool {
        !matches!(self, Self::Uninitialized)
    }

    /// `init` is allowed from every state except a running stream.
    pub fn can_init(&self) -> bool {
        !self.is_running()
    }

    pub fn mode(&self) -> Option<ProcessingMode> {
        match self {
            Self::Running(mode) => Some(*mode),
            _ => None,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uninitialized => write!(f, "uninitialized"),
            Self::Idle => write!(f, "idle"),
            Self::Running(mode) => write!(f, "running({})", mode),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn running_carries_mode() {
        let state = SessionState::Running(ProcessingMode::amplify(2.0));
        assert!(state.is_running());
        assert!(!state.can_init());
        assert_eq!(state.mode(), Some(ProcessingMode::Amplify { gain: 2.0 }));
        assert_eq!(state.to_string(), "running(amplify x2)");
    }

    #[test]
    fn init_allowed_outside_running() {
        assert!(SessionState::Uninitialized.can_init());
        assert!(SessionState::Idle.can_init());
        assert!(SessionState::Stopped.can_init());
        assert!(!SessionState::Uninitialized.is_initialized());
        assert!(SessionState::Stopped.is_initialized());
    }
}
