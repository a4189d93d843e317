//! Recorded-file cameras.
//!
//! A recording is a headerless sequence of images, each exactly one frame of
//! the declared format. Playback ends with end-of-stream; a truncated
//! trailing image is a fault.

use super::{Backend, BackendError, FrameSource, RawFrame, SourceRead};
use crate::capture::{CameraInfo, CameraKind, CameraType, Image, ResolvedSettings, VideoFormat};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, ErrorKind, Read};
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// Longest single wait of a real-time source between cancellation checks.
const PACING_SLICE: Duration = Duration::from_millis(100);

/// Declares one recording available for playback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileSourceSpec {
    pub path: PathBuf,
    /// Display name; defaults to the file name.
    #[serde(default)]
    pub model: Option<String>,
    pub format: VideoFormat,
    /// Pace playback at the format's frame rate.
    #[serde(default)]
    pub realtime: bool,
}

impl FileSourceSpec {
    pub fn new(path: impl Into<PathBuf>, format: VideoFormat) -> Self {
        Self {
            path: path.into(),
            model: None,
            format,
            realtime: false,
        }
    }

    fn model_name(&self) -> String {
        self.model.clone().unwrap_or_else(|| {
            self.path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| self.path.display().to_string())
        })
    }
}

/// Backend serving a fixed set of recordings.
#[derive(Debug, Clone, Default)]
pub struct FileBackend {
    specs: Vec<FileSourceSpec>,
}

impl FileBackend {
    pub fn new(specs: Vec<FileSourceSpec>) -> Self {
        Self { specs }
    }

    pub fn add(&mut self, spec: FileSourceSpec) {
        self.specs.push(spec);
    }
}

impl Backend for FileBackend {
    fn category(&self) -> CameraType {
        CameraType::File
    }

    fn enumerate(&self) -> Result<Vec<CameraInfo>, BackendError> {
        let mut cameras = Vec::new();
        for (token, spec) in self.specs.iter().enumerate() {
            if !spec.path.is_file() {
                tracing::warn!(path = %spec.path.display(), "Recording not found, skipping");
                continue;
            }
            let info = CameraInfo::new(
                CameraKind::File {
                    path: spec.path.clone(),
                },
                spec.model_name(),
                cameras.len(),
                vec![spec.format],
                Some(0),
            )
            .map_err(|e| BackendError::Other(e.to_string()))?;
            cameras.push(info.with_token(token as u64));
        }
        Ok(cameras)
    }

    fn open(
        &self,
        info: &CameraInfo,
        settings: &ResolvedSettings,
    ) -> Result<Box<dyn FrameSource>, BackendError> {
        let spec = self
            .specs
            .get(info.token as usize)
            .ok_or_else(|| BackendError::NotFound(info.to_string()))?;
        let file = File::open(&spec.path)?;

        tracing::info!(path = %spec.path.display(), format = %settings.format(), "Recording opened");
        Ok(Box::new(FileSource {
            reader: BufReader::new(file),
            format: *settings.format(),
            start: Utc::now(),
            frames_read: 0,
            realtime: spec.realtime,
            due: None,
        }))
    }
}

struct FileSource {
    reader: BufReader<File>,
    format: VideoFormat,
    start: DateTime<Utc>,
    frames_read: u64,
    realtime: bool,
    /// When the next real-time frame may be handed out.
    due: Option<Instant>,
}

impl FileSource {
    /// Fills `buf`, returning how many bytes were available before EOF.
    fn fill(&mut self, buf: &mut [u8]) -> Result<usize, BackendError> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.reader.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(filled)
    }

    fn exposure_time(&self) -> Result<DateTime<Utc>, BackendError> {
        let out_of_range = || {
            BackendError::Other(format!(
                "exposure time of frame {} is out of range",
                self.frames_read
            ))
        };
        let secs = self.frames_read as f64 * self.format.frame_interval().as_secs_f64();
        let offset = Duration::try_from_secs_f64(secs).map_err(|_| out_of_range())?;
        let offset = chrono::Duration::from_std(offset).map_err(|_| out_of_range())?;
        self.start.checked_add_signed(offset).ok_or_else(out_of_range)
    }

    /// Waits at most one slice for the next frame to fall due.
    fn paced(&mut self) -> bool {
        let now = Instant::now();
        let due = *self
            .due
            .get_or_insert_with(|| now + self.format.frame_interval());
        if now < due {
            std::thread::sleep((due - now).min(PACING_SLICE));
            if Instant::now() < due {
                return false;
            }
        }
        self.due = None;
        true
    }
}

impl FrameSource for FileSource {
    fn read(&mut self) -> Result<SourceRead, BackendError> {
        if self.realtime && !self.paced() {
            return Ok(SourceRead::Idle);
        }

        let mut buf = vec![0u8; self.format.frame_len()];
        let filled = self.fill(&mut buf)?;
        if filled == 0 {
            tracing::debug!(frames = self.frames_read, "Recording exhausted");
            return Ok(SourceRead::EndOfStream);
        }
        if filled < buf.len() {
            return Err(BackendError::Io(format!(
                "recording truncated: last frame has {filled} of {} bytes",
                buf.len()
            )));
        }

        let exposure_time = self.exposure_time()?;
        self.frames_read += 1;
        let image =
            Image::for_format(buf, &self.format).map_err(|e| BackendError::Other(e.to_string()))?;
        Ok(SourceRead::Frame(RawFrame::new(image, exposure_time)))
    }

    fn close(&mut self) {
        tracing::debug!(frames = self.frames_read, "Recording closed");
    }
}
