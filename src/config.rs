//! Configuration file format.
//!
//! A TOML file selects which backends exist, how many simulated cameras
//! they report, which recordings are available for playback and how each
//! category queues frames:
//!
//! ```toml
//! [discovery]
//! categories = ["driver", "file"]
//!
//! [synthetic]
//! driver_cameras = 2
//! industrial_cameras = 1
//! seed = 7
//!
//! [[file_sources]]
//! path = "recordings/lab.raw"
//! format = { resolution = { width = 640, height = 480 }, encoding = "gray8", framerate = 30.0 }
//!
//! [queues.driver]
//! depth = 3
//! overflow = "drop_oldest"
//!
//! [output]
//! frame_count = 50
//! metrics_port = 0
//! ```

use crate::backend::{
    Backend, BackendError, Backpressure, FileBackend, FileSourceSpec, FrameSource,
    SyntheticBackend,
};
use crate::capture::{CameraError, CameraInfo, CameraType, ResolvedSettings};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

/// Configuration validation errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    FileReadError(String),
    #[error("failed to parse config file: {0}")]
    ParseError(String),
    #[error("category filter is empty")]
    EmptyCategories,
    #[error("invalid {category} queue: {reason}")]
    InvalidQueue { category: CameraType, reason: String },
    #[error("invalid file source {path}: {reason}")]
    InvalidFileSource { path: String, reason: String },
    #[error("failed to build backend: {0}")]
    Backend(#[from] CameraError),
}

/// Full configuration file format.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FileConfig {
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub synthetic: SyntheticConfig,
    #[serde(default)]
    pub file_sources: Vec<FileSourceSpec>,
    #[serde(default)]
    pub queues: QueuesConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Which backend categories take part in discovery.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DiscoveryConfig {
    /// Categories to build backends for. All when absent.
    #[serde(default)]
    pub categories: Option<Vec<CameraType>>,
    /// Probe the operating system's webcams instead of simulating driver cameras.
    #[serde(default)]
    pub native: bool,
}

/// Simulated cameras.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyntheticConfig {
    /// Simulated driver-based cameras.
    pub driver_cameras: usize,
    /// Simulated industrial cameras.
    pub industrial_cameras: usize,
    /// Noise seed; runs with the same seed produce identical frames.
    pub seed: u64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            driver_cameras: 1,
            industrial_cameras: 1,
            seed: 0,
        }
    }
}

/// Per-category queue overrides. Unset categories keep their backend's policy.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub struct QueuesConfig {
    #[serde(default)]
    pub driver: Option<Backpressure>,
    #[serde(default)]
    pub industrial: Option<Backpressure>,
    #[serde(default)]
    pub push: Option<Backpressure>,
    #[serde(default)]
    pub file: Option<Backpressure>,
}

impl QueuesConfig {
    /// Override configured for `category`, if any.
    pub fn for_category(&self, category: CameraType) -> Option<Backpressure> {
        match category {
            CameraType::Driver => self.driver,
            CameraType::Industrial => self.industrial,
            CameraType::Push => self.push,
            CameraType::File => self.file,
        }
    }
}

/// Output configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Run until interrupted (true) or capture a fixed number of frames (false).
    pub continuous: bool,
    /// Number of frames to capture if not continuous.
    pub frame_count: u32,
    /// Metrics server port (0 to disable).
    pub metrics_port: u16,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            continuous: false,
            frame_count: 100,
            metrics_port: 9090,
        }
    }
}

impl FileConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::FileReadError(e.to_string()))?;
        Self::from_toml(&content)
    }

    /// Parses and validates configuration text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: FileConfig =
            toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.discovery.categories.as_ref().is_some_and(Vec::is_empty) {
            return Err(ConfigError::EmptyCategories);
        }
        for category in CameraType::ALL {
            if let Some(queue) = self.queues.for_category(category) {
                queue.validate().map_err(|e| ConfigError::InvalidQueue {
                    category,
                    reason: e.to_string(),
                })?;
            }
        }
        for spec in &self.file_sources {
            spec.format
                .validate()
                .map_err(|e| ConfigError::InvalidFileSource {
                    path: spec.path.display().to_string(),
                    reason: e.to_string(),
                })?;
        }
        Ok(())
    }

    /// Returns true if `category` takes part in discovery.
    pub fn enables(&self, category: CameraType) -> bool {
        self.discovery
            .categories
            .as_ref()
            .map_or(true, |c| c.contains(&category))
    }

    /// Builds the backends this configuration describes.
    ///
    /// Push cameras are registered programmatically, so no push backend is
    /// built here.
    pub fn backends(&self) -> Result<Vec<Arc<dyn Backend>>, ConfigError> {
        let mut backends: Vec<Arc<dyn Backend>> = Vec::new();

        if self.enables(CameraType::Driver) {
            if let Some(driver) = self.driver_backend()? {
                backends.push(driver);
            }
        }
        if self.enables(CameraType::Industrial) && self.synthetic.industrial_cameras > 0 {
            let industrial =
                SyntheticBackend::new(CameraType::Industrial, self.synthetic.industrial_cameras)?
                    .with_seed(self.synthetic.seed);
            backends.push(Arc::new(industrial));
        }
        if self.enables(CameraType::File) && !self.file_sources.is_empty() {
            backends.push(Arc::new(FileBackend::new(self.file_sources.clone())));
        }

        Ok(backends
            .into_iter()
            .map(|backend| self.apply_queue_policy(backend))
            .collect())
    }

    #[cfg(feature = "camera")]
    fn driver_backend(&self) -> Result<Option<Arc<dyn Backend>>, ConfigError> {
        if self.discovery.native {
            return Ok(Some(Arc::new(crate::backend::NativeBackend::new())));
        }
        self.synthetic_driver()
    }

    #[cfg(not(feature = "camera"))]
    fn driver_backend(&self) -> Result<Option<Arc<dyn Backend>>, ConfigError> {
        if self.discovery.native {
            tracing::warn!("Native cameras requested but the `camera` feature is disabled");
        }
        self.synthetic_driver()
    }

    fn synthetic_driver(&self) -> Result<Option<Arc<dyn Backend>>, ConfigError> {
        if self.synthetic.driver_cameras == 0 {
            return Ok(None);
        }
        let driver = SyntheticBackend::new(CameraType::Driver, self.synthetic.driver_cameras)?
            .with_seed(self.synthetic.seed);
        Ok(Some(Arc::new(driver)))
    }

    fn apply_queue_policy(&self, backend: Arc<dyn Backend>) -> Arc<dyn Backend> {
        match self.queues.for_category(backend.category()) {
            Some(backpressure) => Arc::new(QueueOverride {
                inner: backend,
                backpressure,
            }),
            None => backend,
        }
    }
}

/// Replaces a backend's queue policy and forwards everything else.
struct QueueOverride {
    inner: Arc<dyn Backend>,
    backpressure: Backpressure,
}

impl Backend for QueueOverride {
    fn category(&self) -> CameraType {
        self.inner.category()
    }

    fn enumerate(&self) -> Result<Vec<CameraInfo>, BackendError> {
        self.inner.enumerate()
    }

    fn open(
        &self,
        info: &CameraInfo,
        settings: &ResolvedSettings,
    ) -> Result<Box<dyn FrameSource>, BackendError> {
        self.inner.open(info, settings)
    }

    fn default_fov_deg(&self) -> f64 {
        self.inner.default_fov_deg()
    }

    fn backpressure(&self) -> Backpressure {
        self.backpressure
    }
}
