use thiserror::Error;

/// Coarse classification of a [`LoopbackError`].
///
/// Decides whether the duplication loop retries an operation or gives up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The device is missing, unplugged, or held by someone else.
    DeviceUnavailable,
    /// A single read/write failed; the next one may succeed.
    TransientIo,
    /// Parameters or call order are wrong; retrying cannot help.
    FatalConfig,
}

/// Errors that can occur while opening devices, running the loop, or
/// attaching the analysis tap.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LoopbackError {
    #[error("device not available: {0}")]
    DeviceUnavailable(String),

    #[error("transient I/O error: {0}")]
    TransientIo(String),

    #[error("configuration failed: {0}")]
    FatalConfig(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl LoopbackError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::DeviceUnavailable(_) => ErrorKind::DeviceUnavailable,
            Self::TransientIo(_) | Self::Storage(_) => ErrorKind::TransientIo,
            Self::FatalConfig(_) | Self::InvalidState(_) => ErrorKind::FatalConfig,
        }
    }

    /// Whether the failed operation may be retried as-is.
    pub fn is_recoverable(&self) -> bool {
        self.kind() == ErrorKind::TransientIo
    }
}
