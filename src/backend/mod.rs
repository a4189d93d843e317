//! Backend driver boundary.
//!
//! A [`Backend`] enumerates the cameras of one category and opens
//! [`FrameSource`]s for them. The core adapts whatever the backend reports
//! into the unified descriptor, session and frame shapes.
//!
//! Sources are created, read and closed on the owning session's production
//! thread, so they do not need to be `Send`.

mod file;
#[cfg(feature = "camera")]
mod native;
mod push;
mod synthetic;

pub use file::{FileBackend, FileSourceSpec};
#[cfg(feature = "camera")]
pub use native::NativeBackend;
pub use push::{PushBackend, PushFeeder};
pub use synthetic::{OpenFailure, SyntheticBackend};

use crate::capture::{
    CameraError, CameraInfo, CameraType, Image, ResolvedSettings, DEFAULT_APPROX_FOV_DEG,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors reported by backend drivers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("device busy: {0}")]
    Busy(String),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("format not supported by hardware: {0}")]
    Unsupported(String),
    #[error("device not found: {0}")]
    NotFound(String),
    #[error("device disconnected: {0}")]
    Disconnected(String),
    #[error("I/O error: {0}")]
    Io(String),
    #[error("{0}")]
    Other(String),
}

impl From<BackendError> for CameraError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Busy(_) => CameraError::ResourceExhausted(err.to_string()),
            BackendError::NotFound(_) | BackendError::PermissionDenied(_) => {
                CameraError::DeviceUnavailable(err.to_string())
            }
            BackendError::Unsupported(_) => CameraError::InvalidParameter(err.to_string()),
            BackendError::Disconnected(_)
            | BackendError::Io(_)
            | BackendError::Other(_) => CameraError::BackendFault(err.to_string()),
        }
    }
}

impl From<std::io::Error> for BackendError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => BackendError::NotFound(err.to_string()),
            std::io::ErrorKind::PermissionDenied => BackendError::PermissionDenied(err.to_string()),
            _ => BackendError::Io(err.to_string()),
        }
    }
}

/// What a session does when its consumer falls behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Overflow {
    /// Discard the oldest queued frame. The gap shows in frame numbers.
    DropOldest,
    /// Stall production until the consumer takes a frame.
    Block,
}

/// Bounded delivery queue policy of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Backpressure {
    /// Frames buffered between production and consumer.
    pub depth: usize,
    pub overflow: Overflow,
}

impl Backpressure {
    pub const fn drop_oldest(depth: usize) -> Self {
        Self {
            depth,
            overflow: Overflow::DropOldest,
        }
    }

    pub const fn block(depth: usize) -> Self {
        Self {
            depth,
            overflow: Overflow::Block,
        }
    }

    /// Default policy of each category.
    ///
    /// Live cameras favour freshness, push and file sources are lossless.
    pub fn default_for(category: CameraType) -> Self {
        match category {
            CameraType::Driver => Self::drop_oldest(2),
            CameraType::Industrial => Self::drop_oldest(4),
            CameraType::Push => Self::block(1),
            CameraType::File => Self::block(4),
        }
    }

    pub fn validate(&self) -> Result<(), CameraError> {
        if self.depth == 0 {
            return Err(CameraError::invalid("queue depth must be nonzero"));
        }
        Ok(())
    }
}

/// One image as produced by a backend.
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub image: Image,
    /// Time of exposure as reported by the backend.
    pub exposure_time: DateTime<Utc>,
    /// Frames the backend itself discarded before this one.
    pub dropped_before: u64,
}

impl RawFrame {
    pub fn new(image: Image, exposure_time: DateTime<Utc>) -> Self {
        Self {
            image,
            exposure_time,
            dropped_before: 0,
        }
    }
}

/// Result of one read on a source.
#[derive(Debug)]
pub enum SourceRead {
    Frame(RawFrame),
    /// Nothing available yet. The caller checks for cancellation and reads again.
    Idle,
    /// The source is exhausted.
    EndOfStream,
}

/// An opened backend resource producing frames.
pub trait FrameSource {
    /// Reads the next frame. Must not block much longer than one frame interval.
    fn read(&mut self) -> Result<SourceRead, BackendError>;

    /// Releases the underlying resource.
    fn close(&mut self);
}

/// A camera backend category.
pub trait Backend: Send + Sync {
    /// Category of every camera this backend reports.
    fn category(&self) -> CameraType;

    /// Probes the backend for cameras.
    fn enumerate(&self) -> Result<Vec<CameraInfo>, BackendError>;

    /// Opens `info` with the resolved settings.
    fn open(
        &self,
        info: &CameraInfo,
        settings: &ResolvedSettings,
    ) -> Result<Box<dyn FrameSource>, BackendError>;

    /// Field of view used when the caller supplies neither lens nor FOV.
    fn default_fov_deg(&self) -> f64 {
        DEFAULT_APPROX_FOV_DEG
    }

    /// Delivery queue policy for sessions of this backend.
    fn backpressure(&self) -> Backpressure {
        Backpressure::default_for(self.category())
    }
}
