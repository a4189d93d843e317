//! Prometheus metrics exporter for camera monitoring.
//!
//! # Metrics Exposed
//!
//! ## Discovery Metrics
//! - `vision_camera_cameras_discovered{category}` - Cameras found by the latest discovery
//! - `vision_camera_probe_failures_total` - Backends skipped because their probe failed
//!
//! ## Session Metrics
//! - `vision_camera_sessions_open` - Sessions currently open
//! - `vision_camera_frames_produced_total` - Frames produced by capture threads
//! - `vision_camera_frames_delivered_total` - Frames handed to consumers
//! - `vision_camera_frames_dropped_queue_total` - Frames evicted from full queues
//! - `vision_camera_frames_dropped_backend_total` - Frames skipped by backends
//! - `vision_camera_backend_faults_total` - Sessions failed by a backend fault
//!
//! # Example
//!
//! ```no_run
//! use vision_camera::capture::CameraType;
//! use vision_camera::metrics::{MetricsRegistry, MetricsSnapshot};
//!
//! let registry = MetricsRegistry::new().expect("Failed to create registry");
//!
//! let snapshot = MetricsSnapshot {
//!     cameras_discovered: vec![(CameraType::Driver, 1)],
//!     sessions_open: 1,
//!     ..Default::default()
//! };
//!
//! registry.update(&snapshot);
//! ```

mod collector;
#[cfg(feature = "metrics")]
mod server;

pub use collector::{MetricsError, MetricsRegistry, MetricsSnapshot};
#[cfg(feature = "metrics")]
pub use server::{MetricsServer, MetricsServerConfig, MetricsState, ServerError};
