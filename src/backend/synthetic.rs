//! Simulated driver-based and industrial cameras.
//!
//! Frames are a deterministic pattern mixed with seeded ChaCha noise, so
//! runs are reproducible. Faults can be injected at every stage of the
//! lifecycle for exercising the session state machine.

use super::{Backend, BackendError, Backpressure, FrameSource, RawFrame, SourceRead};
use crate::capture::{
    CameraError, CameraInfo, CameraKind, CameraType, Image, PixelEncoding, ResolvedSettings,
    Resolution, VideoFormat, DEFAULT_APPROX_FOV_DEG,
};
use chrono::Utc;
use rand_chacha::ChaCha8Rng;
use rand_core::{RngCore, SeedableRng};
use std::time::Duration;

/// Open failure to inject.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenFailure {
    Busy,
    PermissionDenied,
    Unsupported,
    Missing,
}

impl OpenFailure {
    fn to_error(self, model: &str) -> BackendError {
        match self {
            OpenFailure::Busy => BackendError::Busy(model.to_string()),
            OpenFailure::PermissionDenied => BackendError::PermissionDenied(model.to_string()),
            OpenFailure::Unsupported => BackendError::Unsupported(model.to_string()),
            OpenFailure::Missing => BackendError::NotFound(model.to_string()),
        }
    }
}

/// Backend of simulated cameras of one category.
#[derive(Debug, Clone)]
pub struct SyntheticBackend {
    category: CameraType,
    model: String,
    count: usize,
    formats: Vec<VideoFormat>,
    preferred: usize,
    seed: u64,
    paced: bool,
    probe_fails: bool,
    open_failure: Option<OpenFailure>,
    fault_after: Option<u64>,
    drop_every: Option<u64>,
    backpressure: Option<Backpressure>,
    default_fov_deg: f64,
}

impl SyntheticBackend {
    /// Creates `count` simulated cameras of `category`.
    ///
    /// Only driver-based and industrial categories can be simulated.
    pub fn new(category: CameraType, count: usize) -> Result<Self, CameraError> {
        let model = match category {
            CameraType::Driver => "Synthetic Webcam",
            CameraType::Industrial => "Synthetic Machine Vision",
            other => {
                return Err(CameraError::invalid(format!(
                    "cannot simulate {other} cameras"
                )));
            }
        };

        Ok(Self {
            category,
            model: model.to_string(),
            count,
            formats: default_formats(),
            preferred: 0,
            seed: 0x5eed,
            paced: true,
            probe_fails: false,
            open_failure: None,
            fault_after: None,
            drop_every: None,
            backpressure: None,
            default_fov_deg: DEFAULT_APPROX_FOV_DEG,
        })
    }

    /// Replaces the advertised formats.
    pub fn with_formats(mut self, formats: Vec<VideoFormat>, preferred: usize) -> Self {
        self.formats = formats;
        self.preferred = preferred;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Sleeps one frame interval per read when true (the default).
    pub fn paced(mut self, paced: bool) -> Self {
        self.paced = paced;
        self
    }

    /// Makes every probe fail.
    pub fn failing_probe(mut self) -> Self {
        self.probe_fails = true;
        self
    }

    pub fn failing_open(mut self, failure: OpenFailure) -> Self {
        self.open_failure = Some(failure);
        self
    }

    /// Reports a disconnect after `frames` frames.
    pub fn fault_after(mut self, frames: u64) -> Self {
        self.fault_after = Some(frames);
        self
    }

    /// Skips every `n`th frame and reports the skip.
    pub fn drop_every(mut self, n: u64) -> Self {
        self.drop_every = Some(n.max(2));
        self
    }

    pub fn with_backpressure(mut self, backpressure: Backpressure) -> Self {
        self.backpressure = Some(backpressure);
        self
    }

    pub fn with_default_fov(mut self, fov_deg: f64) -> Self {
        self.default_fov_deg = fov_deg;
        self
    }
}

fn default_formats() -> Vec<VideoFormat> {
    vec![
        VideoFormat {
            resolution: Resolution::VGA,
            encoding: PixelEncoding::Gray8,
            framerate: 30.0,
            upside_down: false,
        },
        VideoFormat {
            resolution: Resolution::new(320, 240),
            encoding: PixelEncoding::Gray8,
            framerate: 60.0,
            upside_down: false,
        },
        VideoFormat {
            resolution: Resolution::new(1280, 720),
            encoding: PixelEncoding::Rgb24,
            framerate: 30.0,
            upside_down: false,
        },
    ]
}

impl Backend for SyntheticBackend {
    fn category(&self) -> CameraType {
        self.category
    }

    fn enumerate(&self) -> Result<Vec<CameraInfo>, BackendError> {
        if self.probe_fails {
            return Err(BackendError::Other(format!(
                "{} probe failed",
                self.category
            )));
        }

        let preferred = (!self.formats.is_empty()).then_some(self.preferred);
        (0..self.count)
            .map(|index| {
                let kind = match self.category {
                    CameraType::Industrial => CameraKind::Industrial {
                        serial_number: Some(format!("SYN{:05}", index)),
                    },
                    _ => CameraKind::Driver {
                        device_id: format!("synthetic:{index}"),
                    },
                };
                CameraInfo::new(kind, &self.model, index, self.formats.clone(), preferred)
                    .map(|info| info.with_token(index as u64))
                    .map_err(|e| BackendError::Other(e.to_string()))
            })
            .collect()
    }

    fn open(
        &self,
        info: &CameraInfo,
        settings: &ResolvedSettings,
    ) -> Result<Box<dyn FrameSource>, BackendError> {
        if info.token >= self.count as u64 {
            return Err(BackendError::NotFound(info.to_string()));
        }
        if let Some(failure) = self.open_failure {
            return Err(failure.to_error(info.model()));
        }

        tracing::info!(camera = %info, format = %settings.format(), "Synthetic camera opened");
        Ok(Box::new(SyntheticSource {
            format: *settings.format(),
            rng: ChaCha8Rng::seed_from_u64(self.seed ^ info.token),
            sequence: 0,
            paced: self.paced,
            fault_after: self.fault_after,
            drop_every: self.drop_every,
        }))
    }

    fn default_fov_deg(&self) -> f64 {
        self.default_fov_deg
    }

    fn backpressure(&self) -> Backpressure {
        self.backpressure
            .unwrap_or_else(|| Backpressure::default_for(self.category))
    }
}

struct SyntheticSource {
    format: VideoFormat,
    rng: ChaCha8Rng,
    sequence: u64,
    paced: bool,
    fault_after: Option<u64>,
    drop_every: Option<u64>,
}

impl SyntheticSource {
    fn render(&mut self) -> Vec<u8> {
        let mut noise = vec![0u8; self.format.frame_len()];
        self.rng.fill_bytes(&mut noise);
        noise
            .iter()
            .enumerate()
            .map(|(i, n)| (((i as u64) ^ self.sequence) % 256) as u8 ^ (n & 0x0f))
            .collect()
    }
}

impl FrameSource for SyntheticSource {
    fn read(&mut self) -> Result<SourceRead, BackendError> {
        if self.fault_after.is_some_and(|limit| self.sequence >= limit) {
            return Err(BackendError::Disconnected(format!(
                "synthetic camera unplugged after {} frames",
                self.sequence
            )));
        }
        if self.paced {
            std::thread::sleep(self.format.frame_interval().min(Duration::from_millis(100)));
        }

        let mut dropped = 0;
        if let Some(n) = self.drop_every {
            if (self.sequence + 1) % n == 0 {
                self.sequence += 1;
                dropped = 1;
                tracing::trace!(sequence = self.sequence, "Synthetic camera skipped a frame");
            }
        }

        let exposure_time = Utc::now();
        let pixels = self.render();
        self.sequence += 1;

        let image = Image::for_format(pixels, &self.format)
            .map_err(|e| BackendError::Other(e.to_string()))?;
        Ok(SourceRead::Frame(RawFrame {
            image,
            exposure_time,
            dropped_before: dropped,
        }))
    }

    fn close(&mut self) {
        tracing::info!(frames = self.sequence, "Synthetic camera closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::CameraSettings;

    fn open_first(backend: &SyntheticBackend) -> Box<dyn FrameSource> {
        let info = backend.enumerate().unwrap().remove(0);
        let settings =
            ResolvedSettings::resolve(&info, &CameraSettings::default().with_format(1), 60.0)
                .unwrap();
        backend.open(&info, &settings).unwrap()
    }

    #[test]
    fn test_enumerate_industrial() {
        let backend = SyntheticBackend::new(CameraType::Industrial, 2).unwrap();
        let cameras = backend.enumerate().unwrap();
        assert_eq!(cameras.len(), 2);
        assert_eq!(cameras[1].instance_index(), 1);
        assert_eq!(cameras[1].camera_type(), CameraType::Industrial);
        assert_eq!(cameras[0].preferred_format_index(), Some(0));
    }

    #[test]
    fn test_cannot_simulate_file_camera() {
        assert!(SyntheticBackend::new(CameraType::File, 1).is_err());
    }

    #[test]
    fn test_source_lifecycle() {
        let backend = SyntheticBackend::new(CameraType::Driver, 1).unwrap().paced(false);
        let mut source = open_first(&backend);

        let SourceRead::Frame(frame) = source.read().unwrap() else {
            panic!("expected a frame");
        };
        assert_eq!(frame.image.resolution(), Resolution::new(320, 240));
        assert_eq!(frame.dropped_before, 0);
        source.close();
    }

    #[test]
    fn test_same_seed_same_pixels() {
        let backend = SyntheticBackend::new(CameraType::Driver, 1)
            .unwrap()
            .paced(false)
            .with_seed(42);
        let mut a = open_first(&backend);
        let mut b = open_first(&backend);
        let (SourceRead::Frame(fa), SourceRead::Frame(fb)) = (a.read().unwrap(), b.read().unwrap())
        else {
            panic!("expected frames");
        };
        assert_eq!(fa.image.data(), fb.image.data());
    }

    #[test]
    fn test_fault_after() {
        let backend = SyntheticBackend::new(CameraType::Driver, 1)
            .unwrap()
            .paced(false)
            .fault_after(1);
        let mut source = open_first(&backend);
        assert!(source.read().is_ok());
        assert!(matches!(source.read(), Err(BackendError::Disconnected(_))));
    }

    #[test]
    fn test_drop_every_reports_skip() {
        let backend = SyntheticBackend::new(CameraType::Driver, 1)
            .unwrap()
            .paced(false)
            .drop_every(3);
        let mut source = open_first(&backend);
        let dropped: Vec<u64> = (0..4)
            .map(|_| match source.read().unwrap() {
                SourceRead::Frame(f) => f.dropped_before,
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(dropped, vec![0, 0, 1, 0]);
    }

    #[test]
    fn test_injected_open_failure() {
        let backend = SyntheticBackend::new(CameraType::Driver, 1)
            .unwrap()
            .failing_open(OpenFailure::Busy);
        let info = backend.enumerate().unwrap().remove(0);
        let settings = ResolvedSettings::resolve(&info, &CameraSettings::default(), 60.0).unwrap();
        assert!(matches!(
            backend.open(&info, &settings),
            Err(BackendError::Busy(_))
        ));
    }
}
