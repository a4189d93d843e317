//! Camera data model.
//!
//! Formats, lens models, camera descriptors, settings and frames. These
//! types are shared by every backend category; nothing here touches
//! hardware.

mod error;
mod format;
mod frame;
mod info;
mod lens;
mod settings;

pub use error::{CameraError, ErrorKind};
pub use format::{PixelEncoding, Resolution, VideoFormat, MAX_FRAME_INTERVAL};
pub use frame::{FrameEvent, Image, VideoFrame};
pub use info::{CameraInfo, CameraInfoList, CameraKind, CameraType, DEFAULT_PUSH_FIFO_LEN};
pub use lens::{
    Coord2d, LensParams, DEFAULT_APPROX_FOV_DEG, MAX_APPROX_FOV_DEG, MIN_APPROX_FOV_DEG,
};
pub use settings::{CameraSettings, LensSource, ResolvedSettings};
