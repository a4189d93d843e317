//! Driver-based webcams through nokhwa.
//!
//! Images are decoded to RGB24 regardless of the device's native encoding.
//! nokhwa does not expose sensor timestamps, so exposure time is taken when
//! the buffer is received.

use super::{Backend, BackendError, FrameSource, RawFrame, SourceRead};
use crate::capture::{
    CameraInfo, CameraKind, CameraType, Image, PixelEncoding, ResolvedSettings, Resolution,
    VideoFormat,
};
use chrono::Utc;
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{
    ApiBackend, CameraFormat, CameraIndex, FrameFormat as NokhwaFrameFormat, RequestedFormat,
    RequestedFormatType,
};
use nokhwa::Camera;

/// Backend for webcams exposed by the operating system.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeBackend;

impl NativeBackend {
    pub fn new() -> Self {
        Self
    }
}

fn classify(err: nokhwa::NokhwaError) -> BackendError {
    let msg = err.to_string();
    let lower = msg.to_lowercase();
    if lower.contains("permission") || lower.contains("denied") || lower.contains("authorization")
    {
        BackendError::PermissionDenied(msg)
    } else if lower.contains("busy") || lower.contains("in use") {
        BackendError::Busy(msg)
    } else {
        BackendError::Other(msg)
    }
}

fn probe_formats(index: &CameraIndex) -> Result<Vec<VideoFormat>, BackendError> {
    let requested =
        RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestFrameRate);
    let mut camera = Camera::new(index.clone(), requested).map_err(classify)?;
    let mut formats: Vec<VideoFormat> = camera
        .compatible_camera_formats()
        .map_err(classify)?
        .into_iter()
        .filter(|f| f.frame_rate() > 0)
        .map(|f| VideoFormat {
            resolution: Resolution::new(f.resolution().width(), f.resolution().height()),
            encoding: PixelEncoding::Rgb24,
            framerate: f.frame_rate() as f32,
            upside_down: false,
        })
        .filter(|f| f.resolution.is_valid())
        .collect();
    formats.dedup_by(|a, b| a.resolution == b.resolution && a.framerate == b.framerate);
    Ok(formats)
}

/// Prefers VGA at the highest rate, else the first format.
fn preferred_index(formats: &[VideoFormat]) -> Option<usize> {
    if formats.is_empty() {
        return None;
    }
    let vga = formats
        .iter()
        .enumerate()
        .filter(|(_, f)| f.resolution == Resolution::VGA)
        .max_by(|(_, a), (_, b)| a.framerate.total_cmp(&b.framerate))
        .map(|(i, _)| i);
    Some(vga.unwrap_or(0))
}

impl Backend for NativeBackend {
    fn category(&self) -> CameraType {
        CameraType::Driver
    }

    fn enumerate(&self) -> Result<Vec<CameraInfo>, BackendError> {
        let devices = nokhwa::query(ApiBackend::Auto).map_err(classify)?;
        let mut cameras = Vec::new();

        for device in devices {
            let Ok(index) = device.index().as_index() else {
                tracing::warn!(name = %device.human_name(), "Skipping camera without numeric index");
                continue;
            };
            let formats = match probe_formats(device.index()) {
                Ok(formats) => formats,
                Err(e) => {
                    tracing::warn!(name = %device.human_name(), error = %e, "Could not list camera formats");
                    Vec::new()
                }
            };
            let preferred = preferred_index(&formats);
            let info = CameraInfo::new(
                CameraKind::Driver {
                    device_id: device.index().to_string(),
                },
                device.human_name(),
                cameras.len(),
                formats,
                preferred,
            )
            .map_err(|e| BackendError::Other(e.to_string()))?;
            cameras.push(info.with_token(u64::from(index)));
        }
        Ok(cameras)
    }

    fn open(
        &self,
        info: &CameraInfo,
        settings: &ResolvedSettings,
    ) -> Result<Box<dyn FrameSource>, BackendError> {
        let format = *settings.format();
        let index = u32::try_from(info.token)
            .map_err(|_| BackendError::NotFound(info.to_string()))?;
        let requested = RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(
            CameraFormat::new(
                nokhwa::utils::Resolution::new(format.resolution.width, format.resolution.height),
                NokhwaFrameFormat::MJPEG,
                format.framerate.round() as u32,
            ),
        ));

        let mut camera = Camera::new(CameraIndex::Index(index), requested).map_err(classify)?;
        let actual = camera.resolution();
        if actual.width() != format.resolution.width || actual.height() != format.resolution.height
        {
            return Err(BackendError::Unsupported(format!(
                "requested {} but device negotiated {}x{}",
                format.resolution,
                actual.width(),
                actual.height()
            )));
        }
        camera.open_stream().map_err(classify)?;

        tracing::info!(camera = %info, format = %format, "Webcam stream opened");
        Ok(Box::new(NativeSource { camera, format }))
    }
}

struct NativeSource {
    camera: Camera,
    format: VideoFormat,
}

impl FrameSource for NativeSource {
    fn read(&mut self) -> Result<SourceRead, BackendError> {
        let buffer = self
            .camera
            .frame()
            .map_err(|e| BackendError::Disconnected(e.to_string()))?;
        let exposure_time = Utc::now();
        let decoded = buffer
            .decode_image::<RgbFormat>()
            .map_err(|e| BackendError::Io(e.to_string()))?;
        let image = Image::for_format(decoded.into_raw(), &self.format)
            .map_err(|e| BackendError::Io(e.to_string()))?;
        Ok(SourceRead::Frame(RawFrame::new(image, exposure_time)))
    }

    fn close(&mut self) {
        if let Err(e) = self.camera.stop_stream() {
            tracing::warn!(error = %e, "Failed to stop webcam stream");
        }
    }
}
