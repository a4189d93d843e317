//! Metrics collection and registry.

use crate::capture::{CameraInfoList, CameraType};
use crate::discovery::ProbeReport;
use crate::session::{CameraSession, SessionStats};
use prometheus::{Encoder, IntCounter, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder};
use thiserror::Error;

/// Errors that can occur during metrics operations.
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),
}

/// A snapshot of system state for metrics update.
#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    /// Cameras found by the latest discovery, per category.
    pub cameras_discovered: Vec<(CameraType, usize)>,
    /// Backends skipped by the latest discovery.
    pub probe_failures: u64,
    /// Sessions currently open.
    pub sessions_open: usize,
    /// Frame accounting summed over the observed sessions.
    pub totals: SessionStats,
}

/// Prometheus metrics registry for camera monitoring.
pub struct MetricsRegistry {
    registry: Registry,

    // Discovery metrics
    cameras_discovered: IntGaugeVec,
    probe_failures_total: IntCounter,

    // Session metrics
    sessions_open: IntGauge,
    frames_produced_total: IntCounter,
    frames_delivered_total: IntCounter,
    frames_dropped_queue_total: IntCounter,
    frames_dropped_backend_total: IntCounter,
    backend_faults_total: IntCounter,
}

impl MetricsRegistry {
    /// Creates a new metrics registry with all camera metrics registered.
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let cameras_discovered = IntGaugeVec::new(
            Opts::new(
                "vision_camera_cameras_discovered",
                "Cameras found by the latest discovery",
            ),
            &["category"],
        )?;
        let probe_failures_total = IntCounter::new(
            "vision_camera_probe_failures_total",
            "Backends skipped because their probe failed",
        )?;

        let sessions_open = IntGauge::new(
            "vision_camera_sessions_open",
            "Camera sessions currently open",
        )?;
        let frames_produced_total = IntCounter::new(
            "vision_camera_frames_produced_total",
            "Frames produced by capture threads",
        )?;
        let frames_delivered_total = IntCounter::new(
            "vision_camera_frames_delivered_total",
            "Frames handed to consumers",
        )?;
        let frames_dropped_queue_total = IntCounter::new(
            "vision_camera_frames_dropped_queue_total",
            "Frames evicted from full delivery queues",
        )?;
        let frames_dropped_backend_total = IntCounter::new(
            "vision_camera_frames_dropped_backend_total",
            "Frames reported as skipped by backends",
        )?;
        let backend_faults_total = IntCounter::new(
            "vision_camera_backend_faults_total",
            "Sessions failed by a backend fault",
        )?;

        registry.register(Box::new(cameras_discovered.clone()))?;
        registry.register(Box::new(probe_failures_total.clone()))?;
        registry.register(Box::new(sessions_open.clone()))?;
        registry.register(Box::new(frames_produced_total.clone()))?;
        registry.register(Box::new(frames_delivered_total.clone()))?;
        registry.register(Box::new(frames_dropped_queue_total.clone()))?;
        registry.register(Box::new(frames_dropped_backend_total.clone()))?;
        registry.register(Box::new(backend_faults_total.clone()))?;

        Ok(Self {
            registry,
            cameras_discovered,
            probe_failures_total,
            sessions_open,
            frames_produced_total,
            frames_delivered_total,
            frames_dropped_queue_total,
            frames_dropped_backend_total,
            backend_faults_total,
        })
    }

    /// Updates all metrics from a snapshot of system state.
    pub fn update(&self, snapshot: &MetricsSnapshot) {
        for (category, count) in &snapshot.cameras_discovered {
            let label = category.to_string();
            self.cameras_discovered
                .with_label_values(&[label.as_str()])
                .set(*count as i64);
        }
        self.sessions_open.set(snapshot.sessions_open as i64);

        // Counters only move forward, so apply the difference
        let totals = &snapshot.totals;
        advance(&self.probe_failures_total, snapshot.probe_failures);
        advance(&self.frames_produced_total, totals.frames_produced);
        advance(&self.frames_delivered_total, totals.frames_delivered);
        advance(&self.frames_dropped_queue_total, totals.dropped_by_queue);
        advance(&self.frames_dropped_backend_total, totals.dropped_by_backend);
        advance(&self.backend_faults_total, totals.faults);
    }

    /// Returns the underlying Prometheus registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Encodes all metrics in Prometheus text format.
    pub fn encode(&self) -> Result<String, MetricsError> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

fn advance(counter: &IntCounter, target: u64) {
    let current = counter.get();
    if target > current {
        counter.inc_by(target - current);
    }
}

impl MetricsSnapshot {
    /// Creates a snapshot from a discovery result and the sessions in use.
    pub fn from_components(
        list: &CameraInfoList,
        reports: &[ProbeReport],
        sessions: &[&CameraSession],
    ) -> Self {
        let cameras_discovered = CameraType::ALL
            .iter()
            .map(|&category| {
                let count = list.iter().filter(|c| c.camera_type() == category).count();
                (category, count)
            })
            .collect();

        let mut totals = SessionStats::default();
        for stats in sessions.iter().map(|s| s.stats()) {
            totals.frames_produced += stats.frames_produced;
            totals.frames_delivered += stats.frames_delivered;
            totals.dropped_by_queue += stats.dropped_by_queue;
            totals.dropped_by_backend += stats.dropped_by_backend;
            totals.faults += stats.faults;
        }

        Self {
            cameras_discovered,
            probe_failures: reports.iter().filter(|r| r.outcome.is_err()).count() as u64,
            sessions_open: sessions.iter().filter(|s| s.is_open()).count(),
            totals,
        }
    }
}
