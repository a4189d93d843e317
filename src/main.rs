//! Vision Camera CLI
//!
//! Command-line interface for listing cameras, capturing frames and
//! inspecting lens models.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing::{info, warn};
use vision_camera::{
    capture::{CameraError, CameraSettings, CameraType, FrameEvent, LensParams, Resolution},
    config::{ConfigError, FileConfig},
    discovery, registry,
};

#[derive(Debug, Parser)]
#[command(name = "vision-camera", version, about = "Discover cameras and capture frames")]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Discover cameras and print their descriptors
    List {
        /// Only scan this category
        #[arg(long)]
        category: Option<Category>,
    },
    /// Open a camera and print the frames it produces
    Capture {
        /// Position of the camera in the discovery list
        #[arg(default_value_t = 0)]
        index: usize,
        /// Frames to capture (overrides the config file)
        #[arg(short = 'n', long)]
        frames: Option<u32>,
        /// Index of the video format to use
        #[arg(long)]
        format: Option<usize>,
        /// Approximate horizontal field of view in degrees
        #[arg(long, conflicts_with = "lens")]
        fov: Option<u32>,
        /// Lens calibration file
        #[arg(long)]
        lens: Option<PathBuf>,
    },
    /// Print the lens model implied by a field of view
    Lens {
        /// Horizontal field of view in degrees
        hfov: f64,
        #[arg(long, default_value_t = 640)]
        width: u32,
        #[arg(long, default_value_t = 480)]
        height: u32,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Category {
    Driver,
    Industrial,
    Push,
    File,
}

impl From<Category> for CameraType {
    fn from(category: Category) -> Self {
        match category {
            Category::Driver => CameraType::Driver,
            Category::Industrial => CameraType::Industrial,
            Category::Push => CameraType::Push,
            Category::File => CameraType::File,
        }
    }
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Camera(#[from] CameraError),
    #[cfg(feature = "metrics")]
    #[error(transparent)]
    Metrics(#[from] vision_camera::metrics::MetricsError),
    #[cfg(feature = "metrics")]
    #[error(transparent)]
    Server(#[from] vision_camera::metrics::ServerError),
    #[error("failed to install Ctrl-C handler: {0}")]
    Signal(#[from] ctrlc::Error),
}

fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();
    info!("Vision Camera v{}", vision_camera::VERSION);

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let config = match &cli.config {
        Some(path) => FileConfig::from_file(path)?,
        None => FileConfig::default(),
    };

    match cli.command {
        Command::List { category } => list(&config, category.map(Into::into)),
        Command::Capture {
            index,
            frames,
            format,
            fov,
            lens,
        } => {
            let mut settings = CameraSettings::default();
            if let Some(format) = format {
                settings = settings.with_format(format);
            }
            if let Some(fov) = fov {
                settings = settings.with_fov(fov);
            }
            if let Some(path) = lens {
                settings = settings.with_lens(LensParams::from_file(path)?);
            }
            let count = frames.unwrap_or(config.output.frame_count);
            let continuous = frames.is_none() && config.output.continuous;
            capture(&config, index, &settings, count, continuous)
        }
        Command::Lens {
            hfov,
            width,
            height,
        } => {
            let lens = LensParams::from_hfov(hfov, Resolution::new(width, height))?;
            println!("{:#?}", lens);
            println!("hfov: {:.2} deg", lens.hfov_deg());
            Ok(())
        }
    }
}

fn list(config: &FileConfig, filter: Option<CameraType>) -> Result<(), CliError> {
    let backends = config.backends()?;
    let (cameras, reports) = discovery::discover_with_report(&backends, filter);

    for report in reports.iter().filter(|r| r.outcome.is_err()) {
        if let Err(reason) = &report.outcome {
            warn!(category = %report.category, reason = %reason, "Backend skipped");
        }
    }

    if cameras.is_empty() {
        println!("No cameras found");
        return Ok(());
    }
    for (i, camera) in cameras.iter().enumerate() {
        println!("{i}: {camera}");
        for (f, format) in camera.formats().iter().enumerate() {
            let marker = if Some(f) == camera.preferred_format_index() {
                "*"
            } else {
                " "
            };
            println!("   {marker} [{f}] {format}");
        }
    }
    Ok(())
}

fn capture(
    config: &FileConfig,
    index: usize,
    settings: &CameraSettings,
    count: u32,
    continuous: bool,
) -> Result<(), CliError> {
    registry::init(config.backends()?)?;
    let result = capture_registered(config, index, settings, count, continuous);
    registry::teardown();
    result
}

fn capture_registered(
    config: &FileConfig,
    index: usize,
    settings: &CameraSettings,
    count: u32,
    continuous: bool,
) -> Result<(), CliError> {
    let (list, reports) = registry::create_info_list_with_report(None)?;
    let cameras = registry::info_list(list)?;
    let handle = registry::create_camera(list, index, settings)?;
    registry::destroy_info_list(list)?;
    let session = registry::camera(handle)?;

    // Closing the session wakes the blocked frame request below
    ctrlc::set_handler(move || {
        let _ = registry::destroy_camera(handle);
    })?;

    #[cfg(feature = "metrics")]
    let metrics = start_metrics(config.output.metrics_port)?;
    #[cfg(not(feature = "metrics"))]
    if config.output.metrics_port != 0 {
        warn!("Metrics server requested but the `metrics` feature is disabled");
    }

    let settings = session.settings();
    info!(
        camera = %session.info(),
        discovered = cameras.len(),
        skipped_backends = reports.iter().filter(|r| r.outcome.is_err()).count(),
        format = %settings.format(),
        hfov = settings.lens().hfov_deg(),
        lens = ?settings.lens_source(),
        "Capturing"
    );

    let mut captured = 0u32;
    while continuous || captured < count {
        match session.next_frame() {
            Ok(FrameEvent::Frame(frame)) => {
                captured += 1;
                let data = frame.image().data();
                let mean = data.iter().map(|&b| b as u64).sum::<u64>() / data.len().max(1) as u64;
                println!(
                    "frame {:>6}  {}  {}  mean={:>3}  dropped_before={}",
                    frame.frame_num(),
                    frame.time().format("%H:%M:%S%.3f"),
                    frame.image().resolution(),
                    mean,
                    frame.dropped_before()
                );
            }
            Ok(FrameEvent::EndOfStream) => {
                info!("End of stream");
                break;
            }
            Err(CameraError::Cancelled) | Err(CameraError::NotOpen) => {
                info!("Interrupted");
                break;
            }
            Err(e) => return Err(e.into()),
        }

        #[cfg(feature = "metrics")]
        if let Some(state) = &metrics {
            let snapshot = vision_camera::metrics::MetricsSnapshot::from_components(
                &cameras,
                &reports,
                &[session.as_ref()],
            );
            state.update(&snapshot);
        }
    }

    let stats = session.stats();
    info!(
        captured,
        produced = stats.frames_produced,
        dropped = stats.frames_dropped(),
        "Done"
    );
    Ok(())
}

#[cfg(feature = "metrics")]
fn start_metrics(
    port: u16,
) -> Result<Option<std::sync::Arc<vision_camera::metrics::MetricsState>>, CliError> {
    use vision_camera::metrics::{MetricsRegistry, MetricsServer, MetricsServerConfig};

    if port == 0 {
        return Ok(None);
    }
    let server = MetricsServer::new(MetricsServerConfig::with_port(port), MetricsRegistry::new()?);
    let state = server.state();
    server.spawn()?;
    Ok(Some(state))
}
