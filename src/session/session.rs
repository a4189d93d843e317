//! Live camera sessions.

use super::exclusive::ExclusiveSlot;
use super::producer::{Produced, Producer, FIRST_FRAME_NUM};
use super::state::SessionState;
use super::{SessionCounters, SessionStats};
use crate::backend::{Backend, Backpressure};
use crate::capture::{
    CameraError, CameraInfo, CameraSettings, FrameEvent, LensParams, ResolvedSettings,
    VideoFormat, VideoFrame,
};
use crossbeam_channel::{after, bounded, never, select, Receiver, RecvError, Sender, TryRecvError};
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Tracks production calls in flight so close can wait them out.
#[derive(Default)]
struct CallGate {
    inner: Mutex<GateState>,
    idle: Condvar,
}

#[derive(Default)]
struct GateState {
    shut: bool,
    active: usize,
}

struct GateGuard<'a>(&'a CallGate);

impl CallGate {
    fn enter(&self) -> Result<GateGuard<'_>, CameraError> {
        let mut inner = self.inner.lock();
        if inner.shut {
            return Err(CameraError::NotOpen);
        }
        inner.active += 1;
        Ok(GateGuard(self))
    }

    fn shut(&self) {
        self.inner.lock().shut = true;
    }

    fn wait_idle(&self) {
        let mut inner = self.inner.lock();
        while inner.active > 0 {
            self.idle.wait(&mut inner);
        }
    }
}

impl Drop for GateGuard<'_> {
    fn drop(&mut self) {
        let mut inner = self.0.inner.lock();
        inner.active -= 1;
        if inner.active == 0 {
            self.0.idle.notify_all();
        }
    }
}

/// Consumer-side delivery position.
struct Cursor {
    last_num: u64,
    ended: bool,
    fault: Option<CameraError>,
}

/// An opened camera producing frames on its own capture thread.
///
/// Frames are taken with [`next_frame`](Self::next_frame) and friends, which
/// may be called from any thread. [`close`](Self::close) interrupts pending
/// calls with [`CameraError::Cancelled`], waits for them to return, stops the
/// capture thread and releases the backend resource. A closed session cannot
/// be reopened.
pub struct CameraSession {
    info: CameraInfo,
    settings: ResolvedSettings,
    backpressure: Backpressure,
    state: Arc<Mutex<SessionState>>,
    counters: Arc<SessionCounters>,
    frames: Receiver<Produced>,
    cancel_tx: Mutex<Option<Sender<()>>>,
    cancel_rx: Receiver<()>,
    capture_thread: Mutex<Option<JoinHandle<()>>>,
    gate: CallGate,
    cursor: Mutex<Cursor>,
    /// Serializes close so a concurrent caller returns only once released.
    closing: Mutex<()>,
}

impl std::fmt::Debug for CameraSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CameraSession")
            .field("camera", &self.info.to_string())
            .field("format", &self.settings.format())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl CameraSession {
    /// Opens `info` on `backend` with the backend's queue policy.
    pub fn open(
        backend: Arc<dyn Backend>,
        info: &CameraInfo,
        settings: &CameraSettings,
    ) -> Result<Self, CameraError> {
        let backpressure = backend.backpressure();
        Self::open_with_backpressure(backend, info, settings, backpressure)
    }

    /// Opens `info` on `backend` with an explicit queue policy.
    ///
    /// Settings are resolved once here and stay fixed for the session's
    /// lifetime. The call returns after the backend resource is acquired or
    /// has failed to be; a failure leaves nothing running.
    ///
    /// # Errors
    /// * `InvalidParameter` - bad settings, wrong backend, or a format the
    ///   hardware rejects
    /// * `ResourceExhausted` - a single-instance category is already open, or
    ///   the device is busy
    /// * `DeviceUnavailable` - the device is gone or access was denied
    /// * `BackendFault` - the backend failed otherwise
    pub fn open_with_backpressure(
        backend: Arc<dyn Backend>,
        info: &CameraInfo,
        settings: &CameraSettings,
        backpressure: Backpressure,
    ) -> Result<Self, CameraError> {
        let category = info.camera_type();
        if backend.category() != category {
            return Err(CameraError::invalid(format!(
                "{category} camera cannot be opened by a {} backend",
                backend.category()
            )));
        }
        backpressure.validate()?;
        let resolved = ResolvedSettings::resolve(info, settings, backend.default_fov_deg())?;
        let slot = ExclusiveSlot::acquire(category)?;

        let state = Arc::new(Mutex::new(SessionState::Opening));
        let counters = Arc::new(SessionCounters::default());
        let (frame_tx, frame_rx) = bounded(backpressure.depth);
        let (cancel_tx, cancel_rx) = bounded::<()>(0);
        let (ready_tx, ready_rx) = bounded(1);

        tracing::info!(camera = %info, format = %resolved.format(), "Opening camera");

        let thread = {
            let info = info.clone();
            let resolved = resolved.clone();
            let evict = frame_rx.clone();
            let cancel = cancel_rx.clone();
            let state = Arc::clone(&state);
            let counters = Arc::clone(&counters);
            std::thread::Builder::new()
                .name(format!("camera-{}-{}", category, info.instance_index()))
                .spawn(move || {
                    let source = match backend.open(&info, &resolved) {
                        Ok(source) => {
                            let _ = ready_tx.send(Ok(()));
                            source
                        }
                        Err(e) => {
                            let _ = ready_tx.send(Err(e));
                            return;
                        }
                    };
                    Producer {
                        source,
                        tx: frame_tx,
                        evict,
                        cancel,
                        backpressure,
                        state,
                        counters,
                        _slot: slot,
                        next_num: FIRST_FRAME_NUM,
                        last_time: None,
                    }
                    .run();
                })
                .map_err(|e| CameraError::BackendFault(format!("cannot spawn capture thread: {e}")))?
        };

        let acquired = match ready_rx.recv() {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(CameraError::from(e)),
            Err(_) => Err(CameraError::BackendFault(
                "capture thread terminated while opening".into(),
            )),
        };
        if let Err(e) = acquired {
            *state.lock() = SessionState::Failed;
            let _ = thread.join();
            tracing::warn!(camera = %info, error = %e, "Camera failed to open");
            return Err(e);
        }

        {
            // the capture thread may already have failed
            let mut state = state.lock();
            if *state == SessionState::Opening {
                *state = SessionState::Open;
            }
        }
        tracing::info!(camera = %info, "Camera open");

        Ok(Self {
            info: info.clone(),
            settings: resolved,
            backpressure,
            state,
            counters,
            frames: frame_rx,
            cancel_tx: Mutex::new(Some(cancel_tx)),
            cancel_rx,
            capture_thread: Mutex::new(Some(thread)),
            gate: CallGate::default(),
            cursor: Mutex::new(Cursor {
                last_num: FIRST_FRAME_NUM - 1,
                ended: false,
                fault: None,
            }),
            closing: Mutex::new(()),
        })
    }

    /// Descriptor this session was opened from.
    pub fn info(&self) -> &CameraInfo {
        &self.info
    }

    /// Settings resolved at open time.
    pub fn settings(&self) -> &ResolvedSettings {
        &self.settings
    }

    /// Active video format.
    pub fn format(&self) -> &VideoFormat {
        self.settings.format()
    }

    /// Lens model in effect.
    pub fn lens(&self) -> &LensParams {
        self.settings.lens()
    }

    /// Delivery queue policy.
    pub fn backpressure(&self) -> Backpressure {
        self.backpressure
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    /// Whether frames can still be requested.
    pub fn is_open(&self) -> bool {
        self.state() == SessionState::Open
    }

    /// Frame accounting so far.
    pub fn stats(&self) -> SessionStats {
        self.counters.snapshot()
    }

    /// Blocks until the next frame, end of stream, fault or close.
    pub fn next_frame(&self) -> Result<FrameEvent, CameraError> {
        self.wait(None)
    }

    /// Like [`next_frame`](Self::next_frame), giving up with `Timeout` after `timeout`.
    pub fn next_frame_timeout(&self, timeout: Duration) -> Result<FrameEvent, CameraError> {
        self.wait(Some(timeout))
    }

    /// Returns the next queued event without waiting.
    ///
    /// Returns `Ok(None)` when nothing is queued or another consumer is
    /// currently waiting for a frame.
    pub fn try_next_frame(&self) -> Result<Option<FrameEvent>, CameraError> {
        let _call = self.gate.enter()?;
        let Some(mut cursor) = self.cursor.try_lock() else {
            return Ok(None);
        };
        if let Some(event) = self.sticky(&cursor)? {
            return Ok(Some(event));
        }
        if self.cancelled() {
            return Err(CameraError::Cancelled);
        }
        match self.frames.try_recv() {
            Ok(msg) => self.accept(&mut cursor, Ok(msg)).map(Some),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => self.accept(&mut cursor, Err(RecvError)).map(Some),
        }
    }

    /// Iterates frames until end of stream or the first error.
    pub fn frames(&self) -> Frames<'_> {
        Frames {
            session: self,
            done: false,
        }
    }

    fn wait(&self, timeout: Option<Duration>) -> Result<FrameEvent, CameraError> {
        let _call = self.gate.enter()?;
        // Serializes consumers so frame order and drop accounting hold.
        let mut cursor = self.cursor.lock();
        if let Some(event) = self.sticky(&cursor)? {
            return Ok(event);
        }
        if self.cancelled() {
            return Err(CameraError::Cancelled);
        }

        let timer = timeout.map(after).unwrap_or_else(never);
        let msg = select! {
            recv(self.frames) -> msg => msg,
            recv(self.cancel_rx) -> _ => return Err(CameraError::Cancelled),
            recv(timer) -> _ => return Err(CameraError::Timeout),
        };
        self.accept(&mut cursor, msg)
    }

    fn cancelled(&self) -> bool {
        matches!(self.cancel_rx.try_recv(), Err(TryRecvError::Disconnected))
    }

    /// Terminal outcomes repeat on every later call.
    fn sticky(&self, cursor: &Cursor) -> Result<Option<FrameEvent>, CameraError> {
        if let Some(fault) = &cursor.fault {
            return Err(fault.clone());
        }
        if cursor.ended {
            return Ok(Some(FrameEvent::EndOfStream));
        }
        Ok(None)
    }

    fn accept(
        &self,
        cursor: &mut Cursor,
        msg: Result<Produced, RecvError>,
    ) -> Result<FrameEvent, CameraError> {
        match msg {
            Ok(Produced::Frame(frame)) => Ok(FrameEvent::Frame(self.account(cursor, frame))),
            Ok(Produced::EndOfStream) => {
                cursor.ended = true;
                Ok(FrameEvent::EndOfStream)
            }
            Ok(Produced::Fault(err)) => {
                cursor.fault = Some(err.clone());
                Err(err)
            }
            Err(RecvError) => {
                if self.cancel_tx.lock().is_none() {
                    return Err(CameraError::Cancelled);
                }
                let err = CameraError::BackendFault("capture thread stopped unexpectedly".into());
                tracing::error!(camera = %self.info, "Capture thread stopped unexpectedly");
                {
                    let mut state = self.state.lock();
                    if state.can_transition_to(SessionState::Failed) {
                        *state = SessionState::Failed;
                    }
                }
                cursor.fault = Some(err.clone());
                Err(err)
            }
        }
    }

    fn account(&self, cursor: &mut Cursor, frame: VideoFrame) -> VideoFrame {
        let dropped = frame.frame_num().saturating_sub(cursor.last_num + 1);
        cursor.last_num = frame.frame_num();
        self.counters.record_delivery();
        if dropped > 0 {
            tracing::debug!(frame_num = frame.frame_num(), dropped, "Frames skipped before delivery");
        }
        frame.with_dropped_before(dropped)
    }

    /// Releases the session.
    ///
    /// Pending production calls return `Cancelled`; the capture thread is
    /// stopped and joined before the backend resource is freed. Closing an
    /// already closed session does nothing. A failed session stays `Failed`.
    pub fn close(&self) {
        let _closing = self.closing.lock();
        let Some(cancel) = self.cancel_tx.lock().take() else {
            return;
        };
        {
            let mut state = self.state.lock();
            if state.can_transition_to(SessionState::Closing) {
                *state = SessionState::Closing;
            }
        }

        self.gate.shut();
        drop(cancel);
        self.gate.wait_idle();

        if let Some(thread) = self.capture_thread.lock().take() {
            if thread.join().is_err() {
                tracing::error!(camera = %self.info, "Capture thread panicked");
            }
        }

        let mut state = self.state.lock();
        if *state == SessionState::Closing {
            *state = SessionState::Closed;
        }
        tracing::info!(camera = %self.info, state = %*state, stats = ?self.counters.snapshot(), "Camera released");
    }
}

impl Drop for CameraSession {
    fn drop(&mut self) {
        self.close();
    }
}

/// Iterator over a session's frames.
pub struct Frames<'a> {
    session: &'a CameraSession,
    done: bool,
}

impl Iterator for Frames<'_> {
    type Item = Result<VideoFrame, CameraError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.session.next_frame() {
            Ok(FrameEvent::Frame(frame)) => Some(Ok(frame)),
            Ok(FrameEvent::EndOfStream) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
