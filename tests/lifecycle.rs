//! End-to-end session lifecycle across backend categories.
//!
//! Covers discovery over mixed backends, settings resolution at open,
//! playback to end-of-stream, fault propagation, queue overflow accounting
//! and push-source timestamps.

use chrono::{Duration as ChronoDuration, Utc};
use std::io::Write;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tempfile::NamedTempFile;
use vision_camera::backend::{
    Backend, BackendError, Backpressure, FileBackend, FileSourceSpec, FrameSource, PushBackend,
    SourceRead, SyntheticBackend,
};
use vision_camera::capture::{
    CameraError, CameraInfo, CameraSettings, CameraType, ErrorKind, FrameEvent, Image, LensParams,
    LensSource, PixelEncoding, Resolution, ResolvedSettings, VideoFormat,
};
use vision_camera::{discovery, CameraSession, SessionState};

fn tiny_format() -> VideoFormat {
    VideoFormat::new(Resolution::new(4, 2), PixelEncoding::Gray8, 100.0).unwrap()
}

fn recording(frames: usize, trailing: usize) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    for i in 0..frames {
        file.write_all(&[i as u8; 8]).unwrap();
    }
    file.write_all(&vec![0xff; trailing]).unwrap();
    file.flush().unwrap();
    file
}

fn open_only(backend: Arc<dyn Backend>, settings: &CameraSettings) -> CameraSession {
    let info = backend.enumerate().unwrap().remove(0);
    CameraSession::open(backend, &info, settings).unwrap()
}

#[test]
fn test_discovery_over_mixed_backends() {
    let clip = recording(2, 0);
    let push = PushBackend::new();
    push.register("feed-a", tiny_format(), None).unwrap();
    push.register("feed-b", tiny_format(), Some(4)).unwrap();

    let backends: Vec<Arc<dyn Backend>> = vec![
        Arc::new(SyntheticBackend::new(CameraType::Driver, 2).unwrap()),
        Arc::new(SyntheticBackend::new(CameraType::Industrial, 1).unwrap()),
        Arc::new(push),
        Arc::new(FileBackend::new(vec![FileSourceSpec::new(
            clip.path(),
            tiny_format(),
        )])),
        Arc::new(SyntheticBackend::new(CameraType::Driver, 1).unwrap().failing_probe()),
    ];

    let (list, reports) = discovery::discover_with_report(&backends, None);
    assert_eq!(list.len(), 6);
    assert_eq!(list.iter().count(), list.len());
    assert_eq!(reports.iter().filter(|r| r.outcome.is_err()).count(), 1);

    for info in &list {
        let found = list.find(info.camera_type(), info.instance_index()).unwrap();
        assert_eq!(found, info);
        match info.preferred_format_index() {
            Some(i) => assert!(i < info.num_formats()),
            None => assert_eq!(info.num_formats(), 0),
        }
    }

    let push_only = discovery::discover(&backends, Some(CameraType::Push));
    assert_eq!(push_only.len(), 2);
    assert!(push_only.iter().all(|c| c.camera_type() == CameraType::Push));
}

#[test]
fn test_playback_reaches_end_of_stream() {
    let clip = recording(3, 0);
    let backend: Arc<dyn Backend> = Arc::new(FileBackend::new(vec![FileSourceSpec::new(
        clip.path(),
        tiny_format(),
    )]));
    let session = open_only(backend, &CameraSettings::default());
    assert_eq!(session.state(), SessionState::Open);

    let frames: Vec<_> = session.frames().map(Result::unwrap).collect();
    assert_eq!(frames.len(), 3);
    for (i, frame) in frames.iter().enumerate() {
        assert_eq!(frame.frame_num(), i as u64 + 1);
        assert_eq!(frame.dropped_before(), 0);
        assert_eq!(frame.image().data(), &[i as u8; 8]);
    }
    assert!(frames.windows(2).all(|w| w[0].time() <= w[1].time()));

    // end of stream repeats, it is not an error
    assert!(session.next_frame().unwrap().is_end_of_stream());
    assert!(session.next_frame().unwrap().is_end_of_stream());
    assert_eq!(session.state(), SessionState::Open);

    session.close();
    assert_eq!(session.state(), SessionState::Closed);
}

#[test]
fn test_extremely_slow_format_keeps_capturing() {
    let crawl = VideoFormat::new(Resolution::new(4, 4), PixelEncoding::Gray8, 1e-30).unwrap();
    let synthetic: Arc<dyn Backend> = Arc::new(
        SyntheticBackend::new(CameraType::Driver, 1)
            .unwrap()
            .with_formats(vec![crawl], 0),
    );
    let session = open_only(synthetic, &CameraSettings::default());
    let event = session.next_frame_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(event.into_frame().unwrap().frame_num(), 1);
    assert_eq!(session.state(), SessionState::Open);
    session.close();

    // exposure times of a crawling recording stay representable
    let clip = recording(2, 0);
    let crawl = VideoFormat::new(Resolution::new(4, 2), PixelEncoding::Gray8, 1e-30).unwrap();
    let file: Arc<dyn Backend> =
        Arc::new(FileBackend::new(vec![FileSourceSpec::new(clip.path(), crawl)]));
    let session = open_only(file, &CameraSettings::default());
    let frames: Vec<_> = session.frames().map(Result::unwrap).collect();
    assert_eq!(frames.len(), 2);
    assert!(frames[1].time() > frames[0].time());
    assert_eq!(session.state(), SessionState::Open);
}

/// Driver backend whose capture thread dies on the first read.
struct Crashing(SyntheticBackend);

struct CrashingSource;

impl FrameSource for CrashingSource {
    fn read(&mut self) -> Result<SourceRead, BackendError> {
        panic!("driver crashed");
    }

    fn close(&mut self) {}
}

impl Backend for Crashing {
    fn category(&self) -> CameraType {
        CameraType::Driver
    }

    fn enumerate(&self) -> Result<Vec<CameraInfo>, BackendError> {
        self.0.enumerate()
    }

    fn open(
        &self,
        _info: &CameraInfo,
        _settings: &ResolvedSettings,
    ) -> Result<Box<dyn FrameSource>, BackendError> {
        Ok(Box::new(CrashingSource))
    }
}

#[test]
fn test_dead_capture_thread_fails_session() {
    let backend: Arc<dyn Backend> =
        Arc::new(Crashing(SyntheticBackend::new(CameraType::Driver, 1).unwrap()));
    let session = open_only(backend, &CameraSettings::default());

    let err = session.next_frame_timeout(Duration::from_secs(2)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BackendFault);
    assert_eq!(session.state(), SessionState::Failed);
    assert_eq!(session.next_frame().unwrap_err(), err);

    session.close();
    assert_eq!(session.state(), SessionState::Failed);
}

#[test]
fn test_truncated_recording_faults() {
    let clip = recording(2, 3);
    let backend: Arc<dyn Backend> = Arc::new(FileBackend::new(vec![FileSourceSpec::new(
        clip.path(),
        tiny_format(),
    )]));
    let session = open_only(backend, &CameraSettings::default());

    assert!(session.next_frame().unwrap().into_frame().is_some());
    assert!(session.next_frame().unwrap().into_frame().is_some());
    let err = session.next_frame().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BackendFault);
    assert_eq!(session.state(), SessionState::Failed);
    assert_eq!(session.stats().faults, 1);
}

#[test]
fn test_settings_fixed_at_open() {
    let backend: Arc<dyn Backend> = Arc::new(
        SyntheticBackend::new(CameraType::Driver, 1)
            .unwrap()
            .paced(false),
    );

    let session = open_only(Arc::clone(&backend), &CameraSettings::default().with_fov(90));
    assert_eq!(session.settings().lens_source(), LensSource::ApproxFov);
    assert!((session.lens().hfov_deg() - 90.0).abs() < 1e-6);
    assert_eq!(session.format().resolution, Resolution::VGA);
    session.close();

    // 1280x720 calibration applied to the 16:9 format, rescaled
    let lens = LensParams::from_hfov(70.0, Resolution::new(1280, 720)).unwrap();
    let session = open_only(
        Arc::clone(&backend),
        &CameraSettings::default().with_format(2).with_lens(lens),
    );
    assert_eq!(session.settings().lens_source(), LensSource::Override);
    assert_eq!(session.lens().calib_res, Resolution::new(1280, 720));
    let frame = session.next_frame().unwrap().into_frame().unwrap();
    assert_eq!(frame.image().resolution(), Resolution::new(1280, 720));
    assert_eq!(frame.image().encoding(), PixelEncoding::Rgb24);
    session.close();
}

#[test]
fn test_incompatible_lens_rejected_at_open() {
    let backend: Arc<dyn Backend> = Arc::new(SyntheticBackend::new(CameraType::Driver, 1).unwrap());
    let info = backend.enumerate().unwrap().remove(0);
    let widescreen = LensParams::from_hfov(70.0, Resolution::new(1280, 720)).unwrap();

    let err = CameraSession::open(
        backend,
        &info,
        &CameraSettings::default().with_format(0).with_lens(widescreen),
    )
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidParameter);
}

#[test]
fn test_bad_settings_rejected_at_open() {
    let backend: Arc<dyn Backend> = Arc::new(SyntheticBackend::new(CameraType::Driver, 1).unwrap());
    let info = backend.enumerate().unwrap().remove(0);

    for settings in [
        CameraSettings::default().with_fov(0),
        CameraSettings::default().with_fov(180),
        CameraSettings::default().with_format(3),
    ] {
        let err = CameraSession::open(Arc::clone(&backend), &info, &settings).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidParameter, "{settings:?}");
    }
}

#[test]
fn test_queue_overflow_is_observable() {
    let backend = SyntheticBackend::new(CameraType::Driver, 1)
        .unwrap()
        .paced(false)
        .with_formats(vec![tiny_format()], 0);
    let info = backend.enumerate().unwrap().remove(0);
    let session = CameraSession::open_with_backpressure(
        Arc::new(backend),
        &info,
        &CameraSettings::default(),
        Backpressure::drop_oldest(1),
    )
    .unwrap();

    thread::sleep(Duration::from_millis(100));

    let frames: Vec<_> = session.frames().take(5).map(Result::unwrap).collect();
    let last = frames.last().unwrap().frame_num();
    let skipped: u64 = frames.iter().map(|f| f.dropped_before()).sum();
    assert_eq!(skipped + frames.len() as u64, last);
    assert!(frames.windows(2).all(|w| w[0].frame_num() < w[1].frame_num()));
    assert!(session.stats().dropped_by_queue > 0);
}

#[test]
fn test_push_frames_in_order_with_clamped_time() {
    let backend = PushBackend::new();
    let feeder = backend.register("feed", tiny_format(), None).unwrap();
    let session = open_only(Arc::new(backend), &CameraSettings::default());

    let t0 = Utc::now();
    let earlier = t0 - ChronoDuration::seconds(5);
    feeder
        .push(Image::for_format(vec![1; 8], &tiny_format()).unwrap(), Some(t0))
        .unwrap();
    feeder
        .push(Image::for_format(vec![2; 8], &tiny_format()).unwrap(), Some(earlier))
        .unwrap();

    let first = session.next_frame().unwrap().into_frame().unwrap();
    let second = session.next_frame().unwrap().into_frame().unwrap();
    assert_eq!((first.frame_num(), second.frame_num()), (1, 2));
    assert_eq!(first.image().data(), &[1; 8]);
    assert_eq!(first.time(), t0);
    assert_eq!(second.time(), t0);
}

#[test]
fn test_push_rejects_bad_images_and_full_fifo() {
    let backend = PushBackend::new();
    let feeder = backend.register("feed", tiny_format(), Some(1)).unwrap();

    let wrong = Image::new(vec![0; 4], Resolution::new(2, 2), PixelEncoding::Gray8).unwrap();
    assert_eq!(
        feeder.push(wrong, None).unwrap_err().kind(),
        ErrorKind::InvalidParameter
    );

    feeder.push_bytes(vec![0; 8]).unwrap();
    assert!(matches!(
        feeder.push_bytes(vec![0; 8]),
        Err(CameraError::ResourceExhausted(_))
    ));
}

#[test]
fn test_open_failures_map_to_taxonomy() {
    use vision_camera::backend::OpenFailure;

    let cases = [
        (OpenFailure::Busy, ErrorKind::ResourceExhausted),
        (OpenFailure::PermissionDenied, ErrorKind::DeviceUnavailable),
        (OpenFailure::Missing, ErrorKind::DeviceUnavailable),
        (OpenFailure::Unsupported, ErrorKind::InvalidParameter),
    ];
    for (failure, kind) in cases {
        let backend = SyntheticBackend::new(CameraType::Driver, 1)
            .unwrap()
            .failing_open(failure);
        let info = backend.enumerate().unwrap().remove(0);
        let err = CameraSession::open(Arc::new(backend), &info, &CameraSettings::default())
            .unwrap_err();
        assert_eq!(err.kind(), kind, "{failure:?}");
    }
}
