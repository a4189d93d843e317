//! Vision Camera Library
//!
//! A uniform layer over heterogeneous camera sources: operating-system
//! webcams, industrial machine-vision cameras, caller-supplied image feeds
//! and recorded files. Callers discover cameras, choose a video format and
//! lens model, open a session and pull timestamped, sequentially numbered
//! frames without knowing which backend produced them.
//!
//! # Architecture
//!
//! ```text
//! backend → discovery → session → frames
//!    ↓                     ↓
//!  capture (data model)   registry (integer handles)
//! ```
//!
//! # Design Principles
//!
//! - **Frozen descriptors**: a discovery result never changes after it is built
//! - **Settings fixed at open**: format and lens are resolved once per session
//! - **Observable loss**: gaps in frame numbers always mean dropped frames
//! - **Prompt close**: closing a session interrupts every pending frame request
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use vision_camera::{
//!     backend::{Backend, SyntheticBackend},
//!     capture::{CameraSettings, CameraType, FrameEvent},
//!     discovery, CameraSession,
//! };
//!
//! let backends: Vec<Arc<dyn Backend>> =
//!     vec![Arc::new(SyntheticBackend::new(CameraType::Driver, 1).unwrap())];
//!
//! let cameras = discovery::discover(&backends, None);
//! let info = cameras.get(0).unwrap();
//! let backend = discovery::backend_for(&backends, info).unwrap();
//!
//! let session = CameraSession::open(
//!     Arc::clone(backend),
//!     info,
//!     &CameraSettings::default().with_fov(70),
//! )
//! .unwrap();
//!
//! for _ in 0..10 {
//!     match session.next_frame().unwrap() {
//!         FrameEvent::Frame(frame) => println!("frame {} at {}", frame.frame_num(), frame.time()),
//!         FrameEvent::EndOfStream => break,
//!     }
//! }
//! session.close();
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod backend;
pub mod capture;
pub mod config;
pub mod discovery;
pub mod metrics;
pub mod registry;
pub mod session;

// Re-export commonly used types at crate root
pub use backend::{Backend, Backpressure, Overflow};
pub use capture::{
    CameraError, CameraInfo, CameraInfoList, CameraSettings, CameraType, FrameEvent, LensParams,
    VideoFormat, VideoFrame,
};
pub use config::FileConfig;
pub use session::{CameraSession, SessionState, SessionStats};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
