//! Process-wide single-instance limit of industrial cameras.
//!
//! Every test here touches the same process-wide slot, so they run one at
//! a time behind `SERIAL`.

use parking_lot::Mutex;
use std::sync::{Arc, Barrier};
use std::thread;
use vision_camera::backend::{Backend, OpenFailure, SyntheticBackend};
use vision_camera::capture::{CameraInfo, CameraSettings, CameraType, ErrorKind};
use vision_camera::{CameraSession, SessionState};

static SERIAL: Mutex<()> = Mutex::new(());

fn industrial(count: usize) -> (Arc<dyn Backend>, Vec<CameraInfo>) {
    let backend: Arc<dyn Backend> =
        Arc::new(SyntheticBackend::new(CameraType::Industrial, count).unwrap());
    let infos = backend.enumerate().unwrap();
    (backend, infos)
}

#[test]
fn test_second_industrial_open_is_refused() {
    let _serial = SERIAL.lock();
    let (backend, infos) = industrial(2);

    let first = CameraSession::open(Arc::clone(&backend), &infos[0], &CameraSettings::default())
        .unwrap();
    let err = CameraSession::open(Arc::clone(&backend), &infos[1], &CameraSettings::default())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ResourceExhausted);
    // the refused attempt leaves the open session untouched
    assert_eq!(first.state(), SessionState::Open);
    assert!(first.next_frame().is_ok());

    first.close();
    let second = CameraSession::open(backend, &infos[1], &CameraSettings::default()).unwrap();
    assert!(second.is_open());
}

#[test]
fn test_drop_releases_slot() {
    let _serial = SERIAL.lock();
    let (backend, infos) = industrial(1);

    {
        let _session =
            CameraSession::open(Arc::clone(&backend), &infos[0], &CameraSettings::default())
                .unwrap();
    }
    let again = CameraSession::open(backend, &infos[0], &CameraSettings::default());
    assert!(again.is_ok());
}

#[test]
fn test_failed_open_releases_slot() {
    let _serial = SERIAL.lock();
    let failing: Arc<dyn Backend> = Arc::new(
        SyntheticBackend::new(CameraType::Industrial, 1)
            .unwrap()
            .failing_open(OpenFailure::Busy),
    );
    let info = failing.enumerate().unwrap().remove(0);
    let err = CameraSession::open(failing, &info, &CameraSettings::default()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ResourceExhausted);

    let (backend, infos) = industrial(1);
    assert!(CameraSession::open(backend, &infos[0], &CameraSettings::default()).is_ok());
}

#[test]
fn test_concurrent_opens_admit_exactly_one() {
    let _serial = SERIAL.lock();
    const CONTENDERS: usize = 8;
    let (backend, infos) = industrial(CONTENDERS);
    let barrier = Arc::new(Barrier::new(CONTENDERS));

    let handles: Vec<_> = infos
        .into_iter()
        .map(|info| {
            let backend = Arc::clone(&backend);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                CameraSession::open(backend, &info, &CameraSettings::default())
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let opened = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(opened, 1);
    for err in results.iter().filter_map(|r| r.as_ref().err()) {
        assert_eq!(err.kind(), ErrorKind::ResourceExhausted);
    }
}

#[test]
fn test_driver_cameras_open_concurrently() {
    let backend: Arc<dyn Backend> = Arc::new(SyntheticBackend::new(CameraType::Driver, 2).unwrap());
    let infos = backend.enumerate().unwrap();

    let a = CameraSession::open(Arc::clone(&backend), &infos[0], &CameraSettings::default())
        .unwrap();
    let b = CameraSession::open(Arc::clone(&backend), &infos[1], &CameraSettings::default())
        .unwrap();
    let c = CameraSession::open(backend, &infos[0], &CameraSettings::default()).unwrap();
    assert!(a.is_open() && b.is_open() && c.is_open());
}
