//! Image payloads and video frames with capture metadata.

use super::{CameraError, PixelEncoding, Resolution, VideoFormat};
use chrono::{DateTime, Utc};

/// Owned image memory together with its layout.
#[derive(Clone, PartialEq, Eq)]
pub struct Image {
    data: Vec<u8>,
    resolution: Resolution,
    encoding: PixelEncoding,
    upside_down: bool,
}

impl Image {
    /// Wraps `data`, checking its length against the layout.
    pub fn new(
        data: Vec<u8>,
        resolution: Resolution,
        encoding: PixelEncoding,
    ) -> Result<Self, CameraError> {
        if !resolution.is_valid() {
            return Err(CameraError::invalid(format!(
                "image resolution {resolution} has a zero dimension"
            )));
        }
        let expected = encoding.frame_len(resolution);
        if data.len() != expected {
            return Err(CameraError::invalid(format!(
                "{encoding} image at {resolution} needs {expected} bytes, got {}",
                data.len()
            )));
        }
        Ok(Self {
            data,
            resolution,
            encoding,
            upside_down: false,
        })
    }

    /// Wraps `data` laid out as `format`.
    pub fn for_format(data: Vec<u8>, format: &VideoFormat) -> Result<Self, CameraError> {
        Ok(Self::new(data, format.resolution, format.encoding)?.upside_down(format.upside_down))
    }

    pub fn upside_down(mut self, upside_down: bool) -> Self {
        self.upside_down = upside_down;
        self
    }

    /// Returns true if the layout equals `format` (frame rate aside).
    pub fn matches(&self, format: &VideoFormat) -> bool {
        self.resolution == format.resolution && self.encoding == format.encoding
    }

    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Takes ownership of the pixel memory.
    #[inline]
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    #[inline]
    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    #[inline]
    pub fn encoding(&self) -> PixelEncoding {
        self.encoding
    }

    #[inline]
    pub fn is_upside_down(&self) -> bool {
        self.upside_down
    }
}

impl std::fmt::Debug for Image {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Image")
            .field("resolution", &self.resolution)
            .field("encoding", &self.encoding)
            .field("upside_down", &self.upside_down)
            .field("bytes", &self.data.len())
            .finish()
    }
}

/// A single frame in a session's video sequence.
#[derive(Clone)]
pub struct VideoFrame {
    image: Image,
    /// Position in the sequence. Strictly increasing within a session.
    frame_num: u64,
    /// UTC time of exposure.
    time: DateTime<Utc>,
    /// Frames skipped immediately before this one.
    dropped_before: u64,
}

impl VideoFrame {
    pub(crate) fn new(image: Image, frame_num: u64, time: DateTime<Utc>) -> Self {
        Self {
            image,
            frame_num,
            time,
            dropped_before: 0,
        }
    }

    pub(crate) fn with_dropped_before(mut self, dropped: u64) -> Self {
        self.dropped_before = dropped;
        self
    }

    #[inline]
    pub fn image(&self) -> &Image {
        &self.image
    }

    /// Transfers the image to the caller.
    #[inline]
    pub fn into_image(self) -> Image {
        self.image
    }

    #[inline]
    pub fn frame_num(&self) -> u64 {
        self.frame_num
    }

    /// Exposure time.
    #[inline]
    pub fn time(&self) -> DateTime<Utc> {
        self.time
    }

    /// Number of frames dropped between the previous delivered frame and this one.
    #[inline]
    pub fn dropped_before(&self) -> u64 {
        self.dropped_before
    }
}

impl std::fmt::Debug for VideoFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoFrame")
            .field("frame_num", &self.frame_num)
            .field("time", &self.time)
            .field("dropped_before", &self.dropped_before)
            .field("image", &self.image)
            .finish()
    }
}

/// Outcome of a successful production call.
#[derive(Debug, Clone)]
pub enum FrameEvent {
    /// A new frame.
    Frame(VideoFrame),
    /// The source has no more frames. Only file sources end.
    EndOfStream,
}

impl FrameEvent {
    pub fn into_frame(self) -> Option<VideoFrame> {
        match self {
            FrameEvent::Frame(frame) => Some(frame),
            FrameEvent::EndOfStream => None,
        }
    }

    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, FrameEvent::EndOfStream)
    }
}
