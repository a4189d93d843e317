//! Camera settings and their resolution against a descriptor.
//!
//! Resolution is pure: it reads the descriptor and the requested settings
//! and produces an immutable [`ResolvedSettings`], or fails fast.

use super::{
    lens::{MAX_APPROX_FOV_DEG, MIN_APPROX_FOV_DEG},
    CameraError, CameraInfo, LensParams, VideoFormat,
};
use serde::{Deserialize, Serialize};

/// Requested configuration for creating a camera. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CameraSettings {
    /// Lens model override. Takes precedence over `approx_fov_deg`.
    #[serde(default)]
    pub lens_params: Option<LensParams>,
    /// Approximate horizontal field of view in degrees, within [1, 179].
    #[serde(default)]
    pub approx_fov_deg: Option<u32>,
    /// Index into the camera's formats. Defaults to the preferred format.
    #[serde(default)]
    pub format_index: Option<usize>,
}

impl CameraSettings {
    pub fn with_lens(mut self, lens: LensParams) -> Self {
        self.lens_params = Some(lens);
        self
    }

    pub fn with_fov(mut self, fov_deg: u32) -> Self {
        self.approx_fov_deg = Some(fov_deg);
        self
    }

    pub fn with_format(mut self, index: usize) -> Self {
        self.format_index = Some(index);
        self
    }
}

/// Where the resolved lens model came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LensSource {
    /// Caller-supplied calibration.
    Override,
    /// Synthesized from the caller's approximate field of view.
    ApproxFov,
    /// Synthesized from the backend default field of view.
    BackendDefault,
}

/// Fully resolved configuration of one camera session.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedSettings {
    lens: LensParams,
    lens_source: LensSource,
    format_index: usize,
    format: VideoFormat,
}

impl ResolvedSettings {
    /// Lens model expressed at the active format's resolution.
    #[inline]
    pub fn lens(&self) -> &LensParams {
        &self.lens
    }

    #[inline]
    pub fn lens_source(&self) -> LensSource {
        self.lens_source
    }

    #[inline]
    pub fn format_index(&self) -> usize {
        self.format_index
    }

    #[inline]
    pub fn format(&self) -> &VideoFormat {
        &self.format
    }

    /// Resolves `settings` against `info`.
    ///
    /// Format: the requested index if valid, else the preferred index.
    /// Lens: the override (rescaled within its aspect family), else the
    /// approximate FOV, else `default_fov_deg`.
    pub fn resolve(
        info: &CameraInfo,
        settings: &CameraSettings,
        default_fov_deg: f64,
    ) -> Result<Self, CameraError> {
        let format_index = match settings.format_index {
            Some(index) if index < info.num_formats() => index,
            Some(index) => {
                return Err(CameraError::invalid(format!(
                    "format index {index} outside [0, {}) for {}",
                    info.num_formats(),
                    info.model()
                )));
            }
            None => info.preferred_format_index().ok_or_else(|| {
                CameraError::invalid(format!(
                    "{} reports no formats and none was requested",
                    info.model()
                ))
            })?,
        };
        let format = info.formats()[format_index];
        let res = format.resolution;

        let (lens, lens_source) = match (&settings.lens_params, settings.approx_fov_deg) {
            (Some(lens), _) => {
                lens.validate()?;
                if !lens.is_compatible_with(res) {
                    return Err(CameraError::invalid(format!(
                        "lens calibrated at {} is incompatible with format resolution {}",
                        lens.calib_res, res
                    )));
                }
                (lens.scaled_to(res)?, LensSource::Override)
            }
            (None, Some(fov)) => {
                if !(MIN_APPROX_FOV_DEG..=MAX_APPROX_FOV_DEG).contains(&fov) {
                    return Err(CameraError::invalid(format!(
                        "approximate field of view {fov} deg outside [{MIN_APPROX_FOV_DEG}, {MAX_APPROX_FOV_DEG}]"
                    )));
                }
                (LensParams::from_hfov(f64::from(fov), res)?, LensSource::ApproxFov)
            }
            (None, None) => (
                LensParams::from_hfov(default_fov_deg, res)?,
                LensSource::BackendDefault,
            ),
        };

        tracing::debug!(
            model = info.model(),
            format_index,
            format = %format,
            lens_source = ?lens_source,
            "Resolved camera settings"
        );

        Ok(Self {
            lens,
            lens_source,
            format_index,
            format,
        })
    }
}
