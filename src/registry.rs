//! Process-wide handle table.
//!
//! Callers that cannot hold Rust values across calls work with opaque
//! integer handles instead: an [`InfoListHandle`] names a frozen discovery
//! result and a [`CameraHandle`] names an open session. Handles are never
//! reused, so a stale handle always fails with
//! [`CameraError::InvalidHandle`] rather than aliasing a newer object.
//!
//! ```no_run
//! use std::sync::Arc;
//! use vision_camera::backend::{Backend, SyntheticBackend};
//! use vision_camera::capture::{CameraSettings, CameraType};
//! use vision_camera::registry;
//!
//! let driver: Arc<dyn Backend> = Arc::new(SyntheticBackend::new(CameraType::Driver, 1)?);
//! registry::init(vec![driver])?;
//!
//! let list = registry::create_info_list(None)?;
//! let camera = registry::create_camera(list, 0, &CameraSettings::default())?;
//! let frame = registry::camera(camera)?.next_frame()?;
//!
//! registry::destroy_camera(camera)?;
//! registry::destroy_info_list(list)?;
//! registry::teardown();
//! # Ok::<(), vision_camera::capture::CameraError>(())
//! ```

use crate::backend::Backend;
use crate::capture::{CameraError, CameraInfoList, CameraSettings, CameraType};
use crate::discovery::{self, ProbeReport};
use crate::session::CameraSession;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static REGISTRY: Mutex<Option<Registry>> = Mutex::new(None);

/// Shared by both handle kinds and never reset, not even by teardown.
static NEXT_HANDLE: AtomicU64 = AtomicU64::new(1);

/// Handle of a registered camera descriptor list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InfoListHandle(u64);

/// Handle of a registered camera session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CameraHandle(u64);

impl InfoListHandle {
    /// Integer value of the handle.
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl CameraHandle {
    /// Integer value of the handle.
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for InfoListHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "list#{}", self.0)
    }
}

impl fmt::Display for CameraHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "camera#{}", self.0)
    }
}

struct Registry {
    backends: Vec<Arc<dyn Backend>>,
    lists: HashMap<u64, Arc<CameraInfoList>>,
    cameras: HashMap<u64, Arc<CameraSession>>,
}

fn next_handle() -> u64 {
    NEXT_HANDLE.fetch_add(1, Ordering::Relaxed)
}

fn with_registry<T>(f: impl FnOnce(&mut Registry) -> Result<T, CameraError>) -> Result<T, CameraError> {
    let mut guard = REGISTRY.lock();
    let registry = guard.as_mut().ok_or(CameraError::NotInitialized)?;
    f(registry)
}

/// Installs the backends used by every later registry call.
///
/// # Errors
/// `InvalidParameter` if the registry is already initialized.
pub fn init(backends: Vec<Arc<dyn Backend>>) -> Result<(), CameraError> {
    let mut guard = REGISTRY.lock();
    if guard.is_some() {
        return Err(CameraError::invalid("camera registry already initialized"));
    }
    tracing::info!(backends = backends.len(), "Camera registry initialized");
    *guard = Some(Registry {
        backends,
        lists: HashMap::new(),
        cameras: HashMap::new(),
    });
    Ok(())
}

/// Returns true between [`init`] and [`teardown`].
pub fn is_initialized() -> bool {
    REGISTRY.lock().is_some()
}

/// Closes every registered session and releases every list.
///
/// Outstanding handles become invalid. Does nothing when not initialized.
pub fn teardown() {
    let Some(registry) = REGISTRY.lock().take() else {
        return;
    };
    let (lists, cameras) = (registry.lists.len(), registry.cameras.len());
    // sessions are closed without holding the table lock
    for (_, session) in registry.cameras {
        session.close();
    }
    tracing::info!(lists, cameras, "Camera registry torn down");
}

/// Discovers cameras and registers the resulting list.
pub fn create_info_list(filter: Option<CameraType>) -> Result<InfoListHandle, CameraError> {
    create_info_list_with_report(filter).map(|(handle, _)| handle)
}

/// Like [`create_info_list`], also returning what each backend contributed.
pub fn create_info_list_with_report(
    filter: Option<CameraType>,
) -> Result<(InfoListHandle, Vec<ProbeReport>), CameraError> {
    let backends = with_registry(|r| Ok(r.backends.clone()))?;
    let (list, reports) = discovery::discover_with_report(&backends, filter);
    with_registry(|r| {
        let handle = next_handle();
        tracing::debug!(handle, cameras = list.len(), "Registered camera list");
        r.lists.insert(handle, Arc::new(list));
        Ok((InfoListHandle(handle), reports))
    })
}

/// Runs `f` on a registered list.
pub fn with_info_list<T>(
    handle: InfoListHandle,
    f: impl FnOnce(&CameraInfoList) -> T,
) -> Result<T, CameraError> {
    let list = info_list(handle)?;
    Ok(f(&list))
}

/// Returns a shared reference to a registered list.
pub fn info_list(handle: InfoListHandle) -> Result<Arc<CameraInfoList>, CameraError> {
    with_registry(|r| {
        r.lists
            .get(&handle.0)
            .cloned()
            .ok_or(CameraError::InvalidHandle(handle.0))
    })
}

/// Releases a registered list. Sessions created from it stay open.
pub fn destroy_info_list(handle: InfoListHandle) -> Result<(), CameraError> {
    with_registry(|r| {
        r.lists
            .remove(&handle.0)
            .map(drop)
            .ok_or(CameraError::InvalidHandle(handle.0))
    })
}

/// Opens camera `index` of a registered list and registers the session.
///
/// # Errors
/// * `InvalidHandle` - `list` is not registered
/// * `InvalidParameter` - `index` is out of range, no backend serves the
///   camera, or the settings are rejected
/// * anything [`CameraSession::open`] reports
pub fn create_camera(
    list: InfoListHandle,
    index: usize,
    settings: &CameraSettings,
) -> Result<CameraHandle, CameraError> {
    let (backend, info) = with_registry(|r| {
        let infos = r
            .lists
            .get(&list.0)
            .ok_or(CameraError::InvalidHandle(list.0))?;
        let info = infos.get(index).cloned().ok_or_else(|| {
            CameraError::invalid(format!(
                "camera index {index} out of range for a list of {}",
                infos.len()
            ))
        })?;
        let backend = discovery::backend_for(&r.backends, &info)
            .cloned()
            .ok_or_else(|| CameraError::invalid(format!("no backend serves {info}")))?;
        Ok((backend, info))
    })?;

    // opening may block on the device; the table stays usable meanwhile
    let session = Arc::new(CameraSession::open(backend, &info, settings)?);

    let mut guard = REGISTRY.lock();
    let Some(registry) = guard.as_mut() else {
        drop(guard);
        session.close();
        return Err(CameraError::NotInitialized);
    };
    let handle = next_handle();
    registry.cameras.insert(handle, session);
    tracing::debug!(handle, camera = %info, "Registered camera session");
    Ok(CameraHandle(handle))
}

/// Returns the session behind a handle.
pub fn camera(handle: CameraHandle) -> Result<Arc<CameraSession>, CameraError> {
    with_registry(|r| {
        r.cameras
            .get(&handle.0)
            .cloned()
            .ok_or(CameraError::InvalidHandle(handle.0))
    })
}

/// Closes and unregisters a session.
///
/// Production calls pending on the session return `Cancelled`.
pub fn destroy_camera(handle: CameraHandle) -> Result<(), CameraError> {
    let session = with_registry(|r| {
        r.cameras
            .remove(&handle.0)
            .ok_or(CameraError::InvalidHandle(handle.0))
    })?;
    session.close();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    // The table is process-wide; registry behaviour is covered by the
    // serialized integration tests. Only stateless pieces are checked here.

    #[test]
    fn test_handles_are_unique() {
        let a = next_handle();
        let b = next_handle();
        assert!(b > a);
    }

    #[test]
    fn test_handle_display() {
        assert_eq!(InfoListHandle(7).to_string(), "list#7");
        assert_eq!(CameraHandle(9).to_string(), "camera#9");
        assert_eq!(CameraHandle(9).raw(), 9);
    }
}
