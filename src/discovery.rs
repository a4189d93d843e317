//! Camera discovery across backends.
//!
//! A scan probes every backend (optionally restricted to one category) and
//! collects the results into a frozen [`CameraInfoList`]. A backend whose
//! probe fails, or whose report is inconsistent, contributes nothing; the
//! other backends are unaffected.

use crate::backend::Backend;
use crate::capture::{CameraInfo, CameraInfoList, CameraType};
use std::sync::Arc;

/// Outcome of probing one backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeReport {
    pub category: CameraType,
    /// Cameras contributed, or the reason the backend was skipped.
    pub outcome: Result<usize, String>,
}

/// Scans `backends` and returns the cameras found.
pub fn discover(backends: &[Arc<dyn Backend>], filter: Option<CameraType>) -> CameraInfoList {
    discover_with_report(backends, filter).0
}

/// Like [`discover`], also reporting what each probed backend contributed.
pub fn discover_with_report(
    backends: &[Arc<dyn Backend>],
    filter: Option<CameraType>,
) -> (CameraInfoList, Vec<ProbeReport>) {
    let mut cameras: Vec<CameraInfo> = Vec::new();
    let mut reports = Vec::new();

    for (origin, backend) in backends.iter().enumerate() {
        let category = backend.category();
        if filter.is_some_and(|wanted| wanted != category) {
            continue;
        }

        let outcome = probe(backend.as_ref(), &cameras);
        match &outcome {
            Ok(found) => {
                tracing::debug!(%category, cameras = found.len(), "Backend probed");
                reports.push(ProbeReport {
                    category,
                    outcome: Ok(found.len()),
                });
            }
            Err(reason) => {
                tracing::warn!(%category, reason = %reason, "Backend probe failed, skipping");
                reports.push(ProbeReport {
                    category,
                    outcome: Err(reason.clone()),
                });
            }
        }
        if let Ok(found) = outcome {
            cameras.extend(found.into_iter().map(|info| info.with_origin(origin)));
        }
    }

    let list = match CameraInfoList::new(cameras) {
        Ok(list) => list,
        Err(e) => {
            // probe() already rejects collisions, so this is unreachable in practice
            tracing::error!(error = %e, "Discovery produced an inconsistent list");
            CameraInfoList::empty()
        }
    };
    tracing::info!(cameras = list.len(), "Discovery complete");
    (list, reports)
}

/// Enumerates one backend and checks its report against what is already collected.
fn probe(backend: &dyn Backend, collected: &[CameraInfo]) -> Result<Vec<CameraInfo>, String> {
    let category = backend.category();
    let found = backend.enumerate().map_err(|e| e.to_string())?;

    for (i, info) in found.iter().enumerate() {
        if info.camera_type() != category {
            return Err(format!(
                "reported a {} camera from a {} backend",
                info.camera_type(),
                category
            ));
        }
        let clash = found[..i]
            .iter()
            .chain(collected.iter())
            .any(|other| {
                other.camera_type() == category && other.instance_index() == info.instance_index()
            });
        if clash {
            return Err(format!(
                "duplicate {} instance index {}",
                category,
                info.instance_index()
            ));
        }
    }
    Ok(found)
}

/// Finds the backend responsible for `info`.
///
/// A descriptor from [`discover`] over the same `backends` maps back to the
/// backend that reported it. Other descriptors go to the first backend of
/// their category.
pub fn backend_for<'a>(
    backends: &'a [Arc<dyn Backend>],
    info: &CameraInfo,
) -> Option<&'a Arc<dyn Backend>> {
    let category = info.camera_type();
    match info.origin {
        Some(origin) => backends.get(origin).filter(|b| b.category() == category),
        None => backends.iter().find(|b| b.category() == category),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendError, FrameSource, SyntheticBackend};
    use crate::capture::{CameraKind, ResolvedSettings};

    /// Backend that claims to be driver-based but reports a file camera.
    struct Mislabelled;

    impl Backend for Mislabelled {
        fn category(&self) -> CameraType {
            CameraType::Driver
        }

        fn enumerate(&self) -> Result<Vec<CameraInfo>, BackendError> {
            let info = CameraInfo::new(
                CameraKind::File {
                    path: "x.raw".into(),
                },
                "x",
                0,
                Vec::new(),
                None,
            )
            .map_err(|e| BackendError::Other(e.to_string()))?;
            Ok(vec![info])
        }

        fn open(
            &self,
            info: &CameraInfo,
            _settings: &ResolvedSettings,
        ) -> Result<Box<dyn FrameSource>, BackendError> {
            Err(BackendError::NotFound(info.to_string()))
        }
    }

    fn synthetic(category: CameraType, count: usize) -> Arc<dyn Backend> {
        Arc::new(SyntheticBackend::new(category, count).unwrap())
    }

    #[test]
    fn test_no_backends_empty_list() {
        let list = discover(&[], None);
        assert!(list.is_empty());
        assert_eq!(list.len(), 0);
    }

    #[test]
    fn test_failing_backend_isolated() {
        let backends: Vec<Arc<dyn Backend>> = vec![
            Arc::new(
                SyntheticBackend::new(CameraType::Driver, 2)
                    .unwrap()
                    .failing_probe(),
            ),
            synthetic(CameraType::Industrial, 1),
        ];
        let (list, reports) = discover_with_report(&backends, None);
        assert_eq!(list.len(), 1);
        assert_eq!(list.get(0).unwrap().camera_type(), CameraType::Industrial);
        assert!(reports[0].outcome.is_err());
        assert_eq!(reports[1].outcome, Ok(1));
    }

    #[test]
    fn test_inconsistent_backend_isolated() {
        let backends: Vec<Arc<dyn Backend>> =
            vec![Arc::new(Mislabelled), synthetic(CameraType::Industrial, 2)];
        let list = discover(&backends, None);
        assert_eq!(list.len(), 2);
        assert!(list.iter().all(|c| c.camera_type() == CameraType::Industrial));
    }

    #[test]
    fn test_duplicate_category_backend_rejected() {
        let backends = vec![
            synthetic(CameraType::Driver, 1),
            synthetic(CameraType::Driver, 1),
        ];
        let (list, reports) = discover_with_report(&backends, None);
        assert_eq!(list.len(), 1);
        assert!(reports[1].outcome.is_err());
    }

    #[test]
    fn test_category_filter() {
        let backends = vec![
            synthetic(CameraType::Driver, 2),
            synthetic(CameraType::Industrial, 1),
        ];
        let list = discover(&backends, Some(CameraType::Driver));
        assert_eq!(list.len(), 2);
        assert!(list.iter().all(|c| c.camera_type() == CameraType::Driver));
    }

    #[test]
    fn test_backend_for() {
        let backends = vec![
            synthetic(CameraType::Driver, 1),
            synthetic(CameraType::Industrial, 1),
        ];
        let list = discover(&backends, None);
        let info = list.find(CameraType::Industrial, 0).unwrap();
        let backend = backend_for(&backends, info).unwrap();
        assert_eq!(backend.category(), CameraType::Industrial);
    }

    #[test]
    fn test_backend_for_skips_failed_backend_of_same_category() {
        let backends: Vec<Arc<dyn Backend>> = vec![
            Arc::new(
                SyntheticBackend::new(CameraType::Driver, 1)
                    .unwrap()
                    .failing_probe(),
            ),
            synthetic(CameraType::Driver, 1),
        ];
        let list = discover(&backends, None);
        assert_eq!(list.len(), 1);

        let info = list.get(0).unwrap();
        let backend = backend_for(&backends, info).unwrap();
        assert!(Arc::ptr_eq(backend, &backends[1]));
    }
}
