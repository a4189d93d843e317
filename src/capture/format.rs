//! Video format descriptors.

use super::CameraError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Longest interval [`VideoFormat::frame_interval`] reports, whatever the frame rate.
pub const MAX_FRAME_INTERVAL: Duration = Duration::from_secs(3600);

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    /// VGA, the most widely supported webcam mode.
    pub const VGA: Resolution = Resolution {
        width: 640,
        height: 480,
    };

    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Returns true if both dimensions are nonzero.
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.width > 0 && self.height > 0
    }

    /// Total number of pixels.
    #[inline]
    pub fn pixel_count(&self) -> usize {
        (self.width as usize) * (self.height as usize)
    }

    /// Returns true if `other` has exactly the same aspect ratio.
    pub fn same_aspect(&self, other: &Resolution) -> bool {
        u64::from(self.width) * u64::from(other.height)
            == u64::from(other.width) * u64::from(self.height)
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Pixel encoding of a captured image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PixelEncoding {
    /// 8-bit grayscale.
    Gray8,
    /// Packed 8-bit R, G, B.
    Rgb24,
    /// Packed 8-bit B, G, R.
    Bgr24,
    /// Packed 8-bit R, G, B, A.
    Rgba32,
    /// Packed 8-bit B, G, R, A.
    Bgra32,
    /// Packed 4:2:2 Y0 U Y1 V.
    Yuy2,
    /// Packed 4:2:2 U Y0 V Y1.
    Uyvy,
    /// Planar 4:2:0 Y, U, V.
    I420,
}

impl PixelEncoding {
    /// Exact payload size in bytes of one image at `res`.
    pub fn frame_len(self, res: Resolution) -> usize {
        let pixels = res.pixel_count();
        match self {
            PixelEncoding::Gray8 => pixels,
            PixelEncoding::Rgb24 | PixelEncoding::Bgr24 => pixels * 3,
            PixelEncoding::Rgba32 | PixelEncoding::Bgra32 => pixels * 4,
            PixelEncoding::Yuy2 | PixelEncoding::Uyvy => pixels * 2,
            PixelEncoding::I420 => {
                let chroma_w = (res.width as usize).div_ceil(2);
                let chroma_h = (res.height as usize).div_ceil(2);
                pixels + 2 * chroma_w * chroma_h
            }
        }
    }
}

impl fmt::Display for PixelEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PixelEncoding::Gray8 => "GRAY8",
            PixelEncoding::Rgb24 => "RGB24",
            PixelEncoding::Bgr24 => "BGR24",
            PixelEncoding::Rgba32 => "RGBA32",
            PixelEncoding::Bgra32 => "BGRA32",
            PixelEncoding::Yuy2 => "YUY2",
            PixelEncoding::Uyvy => "UYVY",
            PixelEncoding::I420 => "I420",
        };
        f.write_str(name)
    }
}

/// One capturable format of a camera.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VideoFormat {
    /// Resolution of images produced in this format.
    pub resolution: Resolution,
    /// Pixel encoding of produced images.
    pub encoding: PixelEncoding,
    /// Nominal frames per second.
    pub framerate: f32,
    /// Whether rows are stored bottom-up.
    #[serde(default)]
    pub upside_down: bool,
}

impl VideoFormat {
    /// Creates a validated top-down format.
    pub fn new(
        resolution: Resolution,
        encoding: PixelEncoding,
        framerate: f32,
    ) -> Result<Self, CameraError> {
        let format = Self {
            resolution,
            encoding,
            framerate,
            upside_down: false,
        };
        format.validate()?;
        Ok(format)
    }

    /// Marks the format as bottom-up.
    pub fn upside_down(mut self, upside_down: bool) -> Self {
        self.upside_down = upside_down;
        self
    }

    /// Checks resolution and frame rate.
    pub fn validate(&self) -> Result<(), CameraError> {
        if !self.resolution.is_valid() {
            return Err(CameraError::invalid(format!(
                "format resolution {} has a zero dimension",
                self.resolution
            )));
        }
        if !self.framerate.is_finite() || self.framerate <= 0.0 {
            return Err(CameraError::invalid(format!(
                "format frame rate {} must be positive",
                self.framerate
            )));
        }
        Ok(())
    }

    /// Payload size in bytes of one image in this format.
    #[inline]
    pub fn frame_len(&self) -> usize {
        self.encoding.frame_len(self.resolution)
    }

    /// Nominal interval between frames, capped at [`MAX_FRAME_INTERVAL`].
    pub fn frame_interval(&self) -> Duration {
        Duration::try_from_secs_f64(1.0 / f64::from(self.framerate))
            .map_or(MAX_FRAME_INTERVAL, |interval| interval.min(MAX_FRAME_INTERVAL))
    }
}

impl fmt::Display for VideoFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} @ {:.1} fps{}",
            self.resolution,
            self.encoding,
            self.framerate,
            if self.upside_down { " (bottom-up)" } else { "" }
        )
    }
}
