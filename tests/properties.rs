//! Property tests for settings resolution, discovery and frame numbering.

use proptest::prelude::*;
use std::sync::Arc;
use vision_camera::backend::{Backend, Backpressure, SyntheticBackend};
use vision_camera::capture::{
    CameraSettings, CameraType, ErrorKind, LensParams, PixelEncoding, ResolvedSettings,
    Resolution, VideoFormat, MAX_APPROX_FOV_DEG, MIN_APPROX_FOV_DEG,
};
use vision_camera::{discovery, CameraSession};

fn resolution() -> impl Strategy<Value = Resolution> {
    (1u32..4096, 1u32..4096).prop_map(|(w, h)| Resolution::new(w, h))
}

fn single_format_camera(res: Resolution) -> vision_camera::CameraInfo {
    let format = VideoFormat::new(res, PixelEncoding::Gray8, 30.0).unwrap();
    SyntheticBackend::new(CameraType::Driver, 1)
        .unwrap()
        .with_formats(vec![format], 0)
        .enumerate()
        .unwrap()
        .remove(0)
}

proptest! {
    #[test]
    fn prop_fov_in_range_resolves_to_that_fov(
        fov in MIN_APPROX_FOV_DEG..=MAX_APPROX_FOV_DEG,
        res in resolution(),
    ) {
        let info = single_format_camera(res);
        let resolved =
            ResolvedSettings::resolve(&info, &CameraSettings::default().with_fov(fov), 60.0)
                .unwrap();
        prop_assert!((resolved.lens().hfov_deg() - f64::from(fov)).abs() < 1e-6);
        prop_assert_eq!(resolved.lens().calib_res, res);
        prop_assert!(resolved.lens().is_undistorted());
    }

    #[test]
    fn prop_fov_out_of_range_rejected(
        fov in prop_oneof![Just(0u32), (MAX_APPROX_FOV_DEG + 1)..=u32::MAX],
    ) {
        let info = single_format_camera(Resolution::VGA);
        let err = ResolvedSettings::resolve(&info, &CameraSettings::default().with_fov(fov), 60.0)
            .unwrap_err();
        prop_assert_eq!(err.kind(), ErrorKind::InvalidParameter);
    }

    #[test]
    fn prop_format_index_bounds(index in 0usize..8) {
        let info = SyntheticBackend::new(CameraType::Driver, 1)
            .unwrap()
            .enumerate()
            .unwrap()
            .remove(0);
        let result =
            ResolvedSettings::resolve(&info, &CameraSettings::default().with_format(index), 60.0);
        if index < info.num_formats() {
            let resolved = result.unwrap();
            prop_assert_eq!(resolved.format_index(), index);
            prop_assert_eq!(*resolved.format(), info.formats()[index]);
        } else {
            prop_assert_eq!(result.unwrap_err().kind(), ErrorKind::InvalidParameter);
        }
    }

    #[test]
    fn prop_scaling_preserves_field_of_view(
        hfov in 10.0f64..170.0,
        base in (1u32..200, 1u32..200),
        factor in 1u32..8,
    ) {
        let calib = Resolution::new(base.0, base.1);
        let target = Resolution::new(base.0 * factor, base.1 * factor);
        let lens = LensParams::from_hfov(hfov, calib).unwrap();
        let scaled = lens.scaled_to(target).unwrap();
        prop_assert!((scaled.hfov_deg() - hfov).abs() < 1e-6);
        prop_assert_eq!(scaled.calib_res, target);
    }

    #[test]
    fn prop_discovery_count_matches_entries(
        drivers in 0usize..6,
        industrial in 0usize..4,
        filter in prop::option::of(prop_oneof![
            Just(CameraType::Driver),
            Just(CameraType::Industrial),
            Just(CameraType::Push),
        ]),
    ) {
        let backends: Vec<Arc<dyn Backend>> = vec![
            Arc::new(SyntheticBackend::new(CameraType::Driver, drivers).unwrap()),
            Arc::new(SyntheticBackend::new(CameraType::Industrial, industrial).unwrap()),
        ];
        let list = discovery::discover(&backends, filter);

        let expected = match filter {
            None => drivers + industrial,
            Some(CameraType::Driver) => drivers,
            Some(CameraType::Industrial) => industrial,
            Some(_) => 0,
        };
        prop_assert_eq!(list.len(), expected);
        prop_assert_eq!(list.iter().count(), list.len());
        for info in &list {
            prop_assert!(filter.map_or(true, |f| f == info.camera_type()));
            prop_assert!(list.find(info.camera_type(), info.instance_index()).is_some());
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(12))]

    #[test]
    fn prop_frame_numbers_account_for_every_drop(drop_every in 2u64..6, take in 1usize..20) {
        let backend = SyntheticBackend::new(CameraType::Driver, 1)
            .unwrap()
            .paced(false)
            .drop_every(drop_every)
            .with_formats(
                vec![VideoFormat::new(Resolution::new(4, 4), PixelEncoding::Gray8, 30.0).unwrap()],
                0,
            );
        let info = backend.enumerate().unwrap().remove(0);
        let session = CameraSession::open_with_backpressure(
            Arc::new(backend),
            &info,
            &CameraSettings::default(),
            Backpressure::block(2),
        )
        .unwrap();

        let frames: Vec<_> = session.frames().take(take).map(Result::unwrap).collect();
        let mut expected_next = 1;
        for frame in &frames {
            prop_assert!(frame.frame_num() >= expected_next);
            prop_assert_eq!(frame.dropped_before(), frame.frame_num() - expected_next);
            expected_next = frame.frame_num() + 1;
        }
        prop_assert!(frames.windows(2).all(|w| w[0].time() <= w[1].time()));
        session.close();
    }
}
