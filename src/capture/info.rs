//! Camera descriptors and the enumeration list.

use super::{CameraError, VideoFormat};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Queue length used by push sources unless the caller asks for less.
pub const DEFAULT_PUSH_FIFO_LEN: usize = i32::MAX as usize;

/// Backend category of a camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CameraType {
    /// Operating-system driver cameras (webcams).
    Driver,
    /// Industrial machine-vision cameras. Only one may be open at a time.
    Industrial,
    /// Caller-supplied images.
    Push,
    /// Recorded video files.
    File,
}

impl CameraType {
    /// All categories in scan order.
    pub const ALL: [CameraType; 4] = [
        CameraType::Driver,
        CameraType::Industrial,
        CameraType::Push,
        CameraType::File,
    ];

    /// Returns true if at most one camera of this category may be open process-wide.
    #[inline]
    pub fn is_singleton(self) -> bool {
        matches!(self, CameraType::Industrial)
    }

    pub(crate) fn slot(self) -> usize {
        self as usize
    }
}

impl fmt::Display for CameraType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CameraType::Driver => "driver",
            CameraType::Industrial => "industrial",
            CameraType::Push => "push",
            CameraType::File => "file",
        };
        f.write_str(name)
    }
}

/// Category-specific identification of a camera.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CameraKind {
    /// Driver-based camera, identified by its OS device id.
    Driver { device_id: String },
    /// Industrial camera, optionally identified by serial number.
    Industrial { serial_number: Option<String> },
    /// Push source with the depth of its input FIFO.
    Push { fifo_len: usize },
    /// Recorded file source.
    File { path: PathBuf },
}

impl CameraKind {
    /// The category this variant belongs to.
    pub fn camera_type(&self) -> CameraType {
        match self {
            CameraKind::Driver { .. } => CameraType::Driver,
            CameraKind::Industrial { .. } => CameraType::Industrial,
            CameraKind::Push { .. } => CameraType::Push,
            CameraKind::File { .. } => CameraType::File,
        }
    }

    fn validate(&self) -> Result<(), CameraError> {
        match self {
            CameraKind::Driver { device_id } if device_id.is_empty() => {
                Err(CameraError::invalid("driver camera needs a device id"))
            }
            CameraKind::Push { fifo_len: 0 } => {
                Err(CameraError::invalid("push camera fifo length must be nonzero"))
            }
            CameraKind::File { path } if path.as_os_str().is_empty() => {
                Err(CameraError::invalid("file camera needs a path"))
            }
            _ => Ok(()),
        }
    }
}

/// Information detected about one camera.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraInfo {
    kind: CameraKind,
    model: String,
    instance_index: usize,
    formats: Vec<VideoFormat>,
    preferred_format_index: Option<usize>,
    /// Backend bookkeeping key; not part of the public contract.
    pub(crate) token: u64,
    /// Position of the producing backend in the discovery scan.
    pub(crate) origin: Option<usize>,
}

impl CameraInfo {
    /// Creates a validated descriptor.
    ///
    /// The preferred format index must address `formats` when formats exist
    /// and must be `None` when there are none.
    pub fn new(
        kind: CameraKind,
        model: impl Into<String>,
        instance_index: usize,
        formats: Vec<VideoFormat>,
        preferred_format_index: Option<usize>,
    ) -> Result<Self, CameraError> {
        kind.validate()?;
        for format in &formats {
            format.validate()?;
        }
        match preferred_format_index {
            Some(index) if index >= formats.len() => {
                return Err(CameraError::invalid(format!(
                    "preferred format index {index} outside [0, {})",
                    formats.len()
                )));
            }
            None if !formats.is_empty() => {
                return Err(CameraError::invalid(
                    "camera with formats must name a preferred format",
                ));
            }
            _ => {}
        }

        Ok(Self {
            kind,
            model: model.into(),
            instance_index,
            formats,
            preferred_format_index,
            token: 0,
            origin: None,
        })
    }

    pub(crate) fn with_token(mut self, token: u64) -> Self {
        self.token = token;
        self
    }

    pub(crate) fn with_origin(mut self, origin: usize) -> Self {
        self.origin = Some(origin);
        self
    }

    #[inline]
    pub fn camera_type(&self) -> CameraType {
        self.kind.camera_type()
    }

    #[inline]
    pub fn kind(&self) -> &CameraKind {
        &self.kind
    }

    /// Camera model name, e.g. "Logitech Quickcam Pro 5000".
    #[inline]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// The Nth camera within its category.
    #[inline]
    pub fn instance_index(&self) -> usize {
        self.instance_index
    }

    #[inline]
    pub fn formats(&self) -> &[VideoFormat] {
        &self.formats
    }

    #[inline]
    pub fn num_formats(&self) -> usize {
        self.formats.len()
    }

    /// Suggested default format, `None` when the camera reports no formats.
    #[inline]
    pub fn preferred_format_index(&self) -> Option<usize> {
        self.preferred_format_index
    }

    pub fn preferred_format(&self) -> Option<&VideoFormat> {
        self.preferred_format_index.map(|i| &self.formats[i])
    }
}

impl fmt::Display for CameraInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{} #{}] {} ({} formats)",
            self.camera_type(),
            self.instance_index,
            self.model,
            self.formats.len()
        )
    }
}

/// Snapshot of the cameras found by one discovery scan.
///
/// The list owns its descriptors; callers borrow them for as long as the
/// list is alive.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CameraInfoList {
    cameras: Vec<CameraInfo>,
}

impl CameraInfoList {
    /// Builds a list, rejecting duplicate instance indices within a category.
    pub fn new(cameras: Vec<CameraInfo>) -> Result<Self, CameraError> {
        for (i, a) in cameras.iter().enumerate() {
            let duplicate = cameras[..i].iter().any(|b| {
                b.camera_type() == a.camera_type() && b.instance_index == a.instance_index
            });
            if duplicate {
                return Err(CameraError::invalid(format!(
                    "duplicate {} camera instance {}",
                    a.camera_type(),
                    a.instance_index
                )));
            }
        }
        Ok(Self { cameras })
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Number of cameras detected.
    #[inline]
    pub fn len(&self) -> usize {
        self.cameras.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.cameras.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&CameraInfo> {
        self.cameras.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, CameraInfo> {
        self.cameras.iter()
    }

    /// Finds a camera by category and instance index.
    pub fn find(&self, camera_type: CameraType, instance_index: usize) -> Option<&CameraInfo> {
        self.cameras
            .iter()
            .find(|c| c.camera_type() == camera_type && c.instance_index == instance_index)
    }
}

impl<'a> IntoIterator for &'a CameraInfoList {
    type Item = &'a CameraInfo;
    type IntoIter = std::slice::Iter<'a, CameraInfo>;

    fn into_iter(self) -> Self::IntoIter {
        self.cameras.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{PixelEncoding, Resolution};

    fn vga() -> VideoFormat {
        VideoFormat::new(Resolution::VGA, PixelEncoding::Gray8, 30.0).unwrap()
    }

    fn driver(index: usize) -> CameraInfo {
        CameraInfo::new(
            CameraKind::Driver {
                device_id: format!("video{index}"),
            },
            "Test Webcam",
            index,
            vec![vga()],
            Some(0),
        )
        .unwrap()
    }

    #[test]
    fn test_preferred_index_out_of_range() {
        let result = CameraInfo::new(
            CameraKind::Industrial {
                serial_number: None,
            },
            "Flea",
            0,
            vec![vga()],
            Some(1),
        );
        assert!(matches!(result, Err(CameraError::InvalidParameter(_))));
    }

    #[test]
    fn test_no_formats_means_no_preference() {
        let info = CameraInfo::new(
            CameraKind::Push { fifo_len: 4 },
            "Pushed",
            0,
            Vec::new(),
            None,
        )
        .unwrap();
        assert_eq!(info.preferred_format_index(), None);
        assert!(info.preferred_format().is_none());

        let bad = CameraInfo::new(CameraKind::Push { fifo_len: 4 }, "Pushed", 0, Vec::new(), Some(0));
        assert!(bad.is_err());
    }

    #[test]
    fn test_formats_require_preference() {
        let result = CameraInfo::new(
            CameraKind::File {
                path: "clip.raw".into(),
            },
            "clip",
            0,
            vec![vga()],
            None,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_kind_validation() {
        let result = CameraInfo::new(CameraKind::Push { fifo_len: 0 }, "p", 0, Vec::new(), None);
        assert!(result.is_err());
        let result = CameraInfo::new(
            CameraKind::Driver {
                device_id: String::new(),
            },
            "w",
            0,
            Vec::new(),
            None,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_list_rejects_duplicate_instance() {
        assert!(CameraInfoList::new(vec![driver(0), driver(0)]).is_err());
        let list = CameraInfoList::new(vec![driver(0), driver(1)]).unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list.iter().count(), list.len());
        assert_eq!(list.find(CameraType::Driver, 1).unwrap().model(), "Test Webcam");
    }

    #[test]
    fn test_only_industrial_is_singleton() {
        let singletons: Vec<_> = CameraType::ALL
            .iter()
            .filter(|t| t.is_singleton())
            .collect();
        assert_eq!(singletons, vec![&CameraType::Industrial]);
    }

    #[test]
    fn test_display() {
        assert_eq!(driver(2).to_string(), "[driver #2] Test Webcam (1 formats)");
    }
}
