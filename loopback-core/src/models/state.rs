use super::error::LoopbackError;

/// Loopback session state machine.
///
/// State transitions:
/// ```text
/// idle → recording → idle
///            ↓
///        failed → idle   (via stop)
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum LoopbackState {
    Idle,
    Recording,
    Failed(LoopbackError),
}

impl LoopbackState {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    pub fn is_recording(&self) -> bool {
        matches!(self, Self::Recording)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    /// Lower-case name used in logs and reports.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Recording => "recording",
            Self::Failed(_) => "failed",
        }
    }
}

/// User-visible transient notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notification {
    RecordingStarted,
    RecordingStopped,
}

impl Notification {
    pub fn message(&self) -> &'static str {
        match self {
            Self::RecordingStarted => "recording started",
            Self::RecordingStopped => "recording stopped",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predicates() {
        assert!(LoopbackState::Idle.is_idle());
        assert!(LoopbackState::Recording.is_recording());
        assert!(LoopbackState::Failed(LoopbackError::TransientIo("x".into())).is_failed());
        assert!(!LoopbackState::Recording.is_idle());
    }

    #[test]
    fn notification_messages() {
        assert_eq!(Notification::RecordingStarted.message(), "recording started");
        assert_eq!(Notification::RecordingStopped.message(), "recording stopped");
    }
}
