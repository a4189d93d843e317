//! Error taxonomy shared by discovery, settings resolution and sessions.

use thiserror::Error;

/// Errors that can occur during camera operations.
///
/// End-of-stream is deliberately absent: a finished file source is reported
/// through [`FrameEvent::EndOfStream`](crate::capture::FrameEvent), not as a failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CameraError {
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),
    #[error("camera device unavailable: {0}")]
    DeviceUnavailable(String),
    #[error("backend fault: {0}")]
    BackendFault(String),
    #[error("frame request cancelled by session close")]
    Cancelled,
    #[error("camera session is not open")]
    NotOpen,
    #[error("timed out waiting for a frame")]
    Timeout,
    #[error("unknown or released handle: {0}")]
    InvalidHandle(u64),
    #[error("camera registry not initialized")]
    NotInitialized,
}

/// Coarse classification of a [`CameraError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidParameter,
    ResourceExhausted,
    DeviceUnavailable,
    BackendFault,
    Cancelled,
    NotOpen,
    Timeout,
    InvalidHandle,
    NotInitialized,
}

impl CameraError {
    /// Returns the taxonomy code of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CameraError::InvalidParameter(_) => ErrorKind::InvalidParameter,
            CameraError::ResourceExhausted(_) => ErrorKind::ResourceExhausted,
            CameraError::DeviceUnavailable(_) => ErrorKind::DeviceUnavailable,
            CameraError::BackendFault(_) => ErrorKind::BackendFault,
            CameraError::Cancelled => ErrorKind::Cancelled,
            CameraError::NotOpen => ErrorKind::NotOpen,
            CameraError::Timeout => ErrorKind::Timeout,
            CameraError::InvalidHandle(_) => ErrorKind::InvalidHandle,
            CameraError::NotInitialized => ErrorKind::NotInitialized,
        }
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        CameraError::InvalidParameter(msg.into())
    }
}
