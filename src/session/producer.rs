//! Production loop run on each session's capture thread.

use super::exclusive::ExclusiveSlot;
use super::state::SessionState;
use super::SessionCounters;
use crate::backend::{Backpressure, FrameSource, Overflow, RawFrame, SourceRead};
use crate::capture::{CameraError, VideoFrame};
use chrono::{DateTime, Utc};
use crossbeam_channel::{select, Receiver, Sender, TryRecvError, TrySendError};
use parking_lot::Mutex;
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Number given to the first frame of every session.
pub const FIRST_FRAME_NUM: u64 = 1;

/// Messages from the capture thread to the consumer.
pub(crate) enum Produced {
    Frame(VideoFrame),
    EndOfStream,
    Fault(CameraError),
}

pub(crate) struct Producer {
    pub(crate) source: Box<dyn FrameSource>,
    pub(crate) tx: Sender<Produced>,
    /// Consumer-side handle used to evict the oldest frame.
    pub(crate) evict: Receiver<Produced>,
    pub(crate) cancel: Receiver<()>,
    pub(crate) backpressure: Backpressure,
    pub(crate) state: Arc<Mutex<SessionState>>,
    pub(crate) counters: Arc<SessionCounters>,
    /// Held until the source is closed.
    pub(crate) _slot: Option<ExclusiveSlot>,
    pub(crate) next_num: u64,
    pub(crate) last_time: Option<DateTime<Utc>>,
}

impl Producer {
    pub(crate) fn run(mut self) {
        loop {
            if self.cancelled() {
                break;
            }
            match self.source.read() {
                Ok(SourceRead::Idle) => {}
                Ok(SourceRead::Frame(raw)) => {
                    let frame = self.number(raw);
                    if !self.deliver(Produced::Frame(frame)) {
                        break;
                    }
                }
                Ok(SourceRead::EndOfStream) => {
                    tracing::info!(
                        frames = self.counters.produced.load(Ordering::Relaxed),
                        "Source reached end of stream"
                    );
                    self.deliver(Produced::EndOfStream);
                    break;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Backend fault during capture");
                    self.counters.faults.fetch_add(1, Ordering::Relaxed);
                    {
                        let mut state = self.state.lock();
                        if state.can_transition_to(SessionState::Failed) {
                            *state = SessionState::Failed;
                        }
                    }
                    self.deliver(Produced::Fault(CameraError::BackendFault(e.to_string())));
                    break;
                }
            }
        }
        self.source.close();
    }

    fn cancelled(&self) -> bool {
        matches!(self.cancel.try_recv(), Err(TryRecvError::Disconnected))
    }

    /// Assigns the frame number and a non-decreasing timestamp.
    fn number(&mut self, raw: RawFrame) -> VideoFrame {
        if raw.dropped_before > 0 {
            self.counters
                .dropped_by_backend
                .fetch_add(raw.dropped_before, Ordering::Relaxed);
            tracing::debug!(dropped = raw.dropped_before, "Backend dropped frames");
        }
        let num = self.next_num + raw.dropped_before;
        self.next_num = num + 1;

        let time = match self.last_time {
            Some(last) if raw.exposure_time < last => {
                tracing::warn!(
                    reported = %raw.exposure_time,
                    previous = %last,
                    "Backend timestamp went backwards, clamping"
                );
                last
            }
            _ => raw.exposure_time,
        };
        self.last_time = Some(time);

        self.counters.produced.fetch_add(1, Ordering::Relaxed);
        VideoFrame::new(raw.image, num, time)
    }

    /// Queues `msg` per the backpressure policy. Returns false once cancelled.
    fn deliver(&self, msg: Produced) -> bool {
        match self.backpressure.overflow {
            Overflow::Block => select! {
                send(self.tx, msg) -> res => res.is_ok(),
                recv(self.cancel) -> _ => false,
            },
            Overflow::DropOldest => {
                let mut msg = msg;
                loop {
                    match self.tx.try_send(msg) {
                        Ok(()) => return true,
                        Err(TrySendError::Full(back)) => {
                            msg = back;
                            if let Ok(Produced::Frame(old)) = self.evict.try_recv() {
                                self.counters.dropped_by_queue.fetch_add(1, Ordering::Relaxed);
                                tracing::trace!(frame_num = old.frame_num(), "Dropped oldest queued frame");
                            }
                        }
                        Err(TrySendError::Disconnected(_)) => return false,
                    }
                }
            }
        }
    }
}
