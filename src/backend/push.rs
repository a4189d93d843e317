//! Push cameras: the caller supplies image memory directly.

use super::{Backend, BackendError, FrameSource, RawFrame, SourceRead};
use crate::capture::{
    CameraError, CameraInfo, CameraKind, CameraType, Image, ResolvedSettings, VideoFormat,
    DEFAULT_PUSH_FIFO_LEN,
};
use chrono::{DateTime, Utc};
use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use parking_lot::Mutex;
use std::time::Duration;

/// How long a push source waits for an image before yielding to the session.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

struct PushEndpoint {
    model: String,
    format: VideoFormat,
    fifo_len: usize,
    tx: Sender<RawFrame>,
    rx: Receiver<RawFrame>,
}

/// Backend holding the push cameras registered by the caller.
#[derive(Default)]
pub struct PushBackend {
    endpoints: Mutex<Vec<PushEndpoint>>,
}

impl PushBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a push camera producing `format` and returns its feeder.
    ///
    /// `fifo_len` bounds the images waiting to be consumed; `None` selects
    /// [`DEFAULT_PUSH_FIFO_LEN`], which is treated as unbounded.
    pub fn register(
        &self,
        model: impl Into<String>,
        format: VideoFormat,
        fifo_len: Option<usize>,
    ) -> Result<PushFeeder, CameraError> {
        format.validate()?;
        let fifo_len = fifo_len.unwrap_or(DEFAULT_PUSH_FIFO_LEN);
        if fifo_len == 0 {
            return Err(CameraError::invalid("push fifo length must be nonzero"));
        }

        let (tx, rx) = if fifo_len >= DEFAULT_PUSH_FIFO_LEN {
            unbounded()
        } else {
            bounded(fifo_len)
        };

        let mut endpoints = self.endpoints.lock();
        let instance_index = endpoints.len();
        let model = model.into();
        tracing::debug!(model = %model, instance_index, format = %format, "Registered push camera");
        endpoints.push(PushEndpoint {
            model,
            format,
            fifo_len,
            tx: tx.clone(),
            rx,
        });

        Ok(PushFeeder {
            tx,
            format,
            instance_index,
        })
    }
}

impl Backend for PushBackend {
    fn category(&self) -> CameraType {
        CameraType::Push
    }

    fn enumerate(&self) -> Result<Vec<CameraInfo>, BackendError> {
        self.endpoints
            .lock()
            .iter()
            .enumerate()
            .map(|(index, ep)| {
                CameraInfo::new(
                    CameraKind::Push {
                        fifo_len: ep.fifo_len,
                    },
                    &ep.model,
                    index,
                    vec![ep.format],
                    Some(0),
                )
                .map(|info| info.with_token(index as u64))
                .map_err(|e| BackendError::Other(e.to_string()))
            })
            .collect()
    }

    fn open(
        &self,
        info: &CameraInfo,
        _settings: &ResolvedSettings,
    ) -> Result<Box<dyn FrameSource>, BackendError> {
        let endpoints = self.endpoints.lock();
        let endpoint = endpoints
            .get(info.token as usize)
            .ok_or_else(|| BackendError::NotFound(info.to_string()))?;

        Ok(Box::new(PushSource {
            rx: endpoint.rx.clone(),
        }))
    }
}

/// Caller-side handle for supplying images to a push camera.
#[derive(Clone)]
pub struct PushFeeder {
    tx: Sender<RawFrame>,
    format: VideoFormat,
    instance_index: usize,
}

impl PushFeeder {
    /// Instance index of the push camera this feeder belongs to.
    pub fn instance_index(&self) -> usize {
        self.instance_index
    }

    pub fn format(&self) -> &VideoFormat {
        &self.format
    }

    /// Supplies one image. Ownership of the memory moves to the camera.
    ///
    /// `exposure_time` defaults to now. A full FIFO is reported as
    /// resource-exhausted rather than waited on.
    pub fn push(
        &self,
        image: Image,
        exposure_time: Option<DateTime<Utc>>,
    ) -> Result<(), CameraError> {
        if !image.matches(&self.format) {
            return Err(CameraError::invalid(format!(
                "pushed {} image at {} does not match {}",
                image.encoding(),
                image.resolution(),
                self.format
            )));
        }
        let frame = RawFrame::new(image, exposure_time.unwrap_or_else(Utc::now));
        self.tx.try_send(frame).map_err(|e| match e {
            TrySendError::Full(_) => CameraError::ResourceExhausted("push fifo full".into()),
            TrySendError::Disconnected(_) => {
                CameraError::DeviceUnavailable("push camera released".into())
            }
        })
    }

    /// Convenience wrapper building the image from raw bytes.
    pub fn push_bytes(&self, data: Vec<u8>) -> Result<(), CameraError> {
        self.push(Image::for_format(data, &self.format)?, None)
    }
}

struct PushSource {
    rx: Receiver<RawFrame>,
}

impl FrameSource for PushSource {
    fn read(&mut self) -> Result<SourceRead, BackendError> {
        match self.rx.recv_timeout(POLL_INTERVAL) {
            Ok(frame) => Ok(SourceRead::Frame(frame)),
            Err(RecvTimeoutError::Timeout) => Ok(SourceRead::Idle),
            Err(RecvTimeoutError::Disconnected) => {
                Err(BackendError::Disconnected("push feeder gone".into()))
            }
        }
    }

    fn close(&mut self) {
        tracing::debug!(pending = self.rx.len(), "Push source closed");
    }
}
