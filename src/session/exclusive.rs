//! Process-wide open slots for single-instance camera categories.

use crate::capture::{CameraError, CameraType};
use std::sync::atomic::{AtomicBool, Ordering};

static OPEN_SLOTS: [AtomicBool; CameraType::ALL.len()] = [
    AtomicBool::new(false),
    AtomicBool::new(false),
    AtomicBool::new(false),
    AtomicBool::new(false),
];

/// Holds the open slot of a singleton category until dropped.
#[derive(Debug)]
pub(crate) struct ExclusiveSlot {
    category: CameraType,
}

impl ExclusiveSlot {
    /// Claims the slot for `category`, failing fast if it is taken.
    ///
    /// Categories without the single-instance limitation never conflict and
    /// yield `None`.
    pub(crate) fn acquire(category: CameraType) -> Result<Option<Self>, CameraError> {
        if !category.is_singleton() {
            return Ok(None);
        }
        OPEN_SLOTS[category.slot()]
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| {
                CameraError::ResourceExhausted(format!(
                    "only one {category} camera may be open at a time"
                ))
            })?;
        tracing::debug!(%category, "Claimed exclusive camera slot");
        Ok(Some(Self { category }))
    }
}

impl Drop for ExclusiveSlot {
    fn drop(&mut self) {
        OPEN_SLOTS[self.category.slot()].store(false, Ordering::Release);
        tracing::debug!(category = %self.category, "Released exclusive camera slot");
    }
}
