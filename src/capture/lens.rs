//! Lens model: intrinsics and distortion coefficients.
//!
//! Focal length and principal point are expressed in pixels of the
//! calibration resolution. Skew and k1..k5 are dimensionless. The model is
//! always applied as a whole; rescaling touches every pixel-unit quantity
//! at once.

use super::{CameraError, Resolution};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Field of view used when neither a lens nor an approximate FOV is supplied.
pub const DEFAULT_APPROX_FOV_DEG: f64 = 60.0;

/// Smallest accepted approximate field of view, in degrees.
pub const MIN_APPROX_FOV_DEG: u32 = 1;

/// Largest accepted approximate field of view, in degrees.
pub const MAX_APPROX_FOV_DEG: u32 = 179;

/// A 2D point or vector in pixel units.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Coord2d {
    pub x: f64,
    pub y: f64,
}

impl Coord2d {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Camera lens parameters including field of view and distortion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LensParams {
    /// Focal length in pixels for each axis.
    pub focal_len: Coord2d,
    /// Principal point in pixels.
    pub principal_point: Coord2d,
    /// Angle between X and Y axes.
    #[serde(default)]
    pub skew: f64,
    #[serde(default)]
    pub k1: f64,
    #[serde(default)]
    pub k2: f64,
    #[serde(default)]
    pub k3: f64,
    #[serde(default)]
    pub k4: f64,
    #[serde(default)]
    pub k5: f64,
    /// Image resolution at which the parameters were calibrated.
    pub calib_res: Resolution,
}

impl LensParams {
    /// Builds an undistorted pinhole lens from a horizontal field of view.
    ///
    /// Pixels are square and the principal point sits at the image centre.
    pub fn from_hfov(hfov_deg: f64, res: Resolution) -> Result<Self, CameraError> {
        if !hfov_deg.is_finite()
            || hfov_deg < f64::from(MIN_APPROX_FOV_DEG)
            || hfov_deg > f64::from(MAX_APPROX_FOV_DEG)
        {
            return Err(CameraError::invalid(format!(
                "field of view {hfov_deg} deg outside [{MIN_APPROX_FOV_DEG}, {MAX_APPROX_FOV_DEG}]"
            )));
        }
        if !res.is_valid() {
            return Err(CameraError::invalid(format!(
                "lens resolution {res} has a zero dimension"
            )));
        }

        let half_width = f64::from(res.width) / 2.0;
        let focal = half_width / (hfov_deg.to_radians() / 2.0).tan();

        Ok(Self {
            focal_len: Coord2d::new(focal, focal),
            principal_point: Coord2d::new(half_width, f64::from(res.height) / 2.0),
            skew: 0.0,
            k1: 0.0,
            k2: 0.0,
            k3: 0.0,
            k4: 0.0,
            k5: 0.0,
            calib_res: res,
        })
    }

    /// Loads a calibration coefficient record from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CameraError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            CameraError::invalid(format!("cannot read lens file {}: {e}", path.display()))
        })?;
        let lens: LensParams = toml::from_str(&content).map_err(|e| {
            CameraError::invalid(format!("malformed lens file {}: {e}", path.display()))
        })?;
        lens.validate()?;
        tracing::debug!(path = %path.display(), calib_res = %lens.calib_res, "Loaded lens parameters");
        Ok(lens)
    }

    /// Checks that the record is usable as a whole.
    pub fn validate(&self) -> Result<(), CameraError> {
        if !self.calib_res.is_valid() {
            return Err(CameraError::invalid(
                "lens calibration resolution must be nonzero",
            ));
        }
        if !(self.focal_len.x.is_finite()
            && self.focal_len.y.is_finite()
            && self.focal_len.x > 0.0
            && self.focal_len.y > 0.0)
        {
            return Err(CameraError::invalid("lens focal length must be positive"));
        }
        let rest = [
            self.principal_point.x,
            self.principal_point.y,
            self.skew,
            self.k1,
            self.k2,
            self.k3,
            self.k4,
            self.k5,
        ];
        if rest.iter().any(|v| !v.is_finite()) {
            return Err(CameraError::invalid("lens coefficients must be finite"));
        }
        Ok(())
    }

    /// Returns true if the lens was calibrated in the same aspect-ratio family as `res`.
    pub fn is_compatible_with(&self, res: Resolution) -> bool {
        self.calib_res.is_valid() && res.is_valid() && self.calib_res.same_aspect(&res)
    }

    /// Re-expresses the model at another resolution of the same family.
    pub fn scaled_to(&self, res: Resolution) -> Result<Self, CameraError> {
        if !self.is_compatible_with(res) {
            return Err(CameraError::invalid(format!(
                "lens calibrated at {} cannot be applied to {}",
                self.calib_res, res
            )));
        }
        if res == self.calib_res {
            return Ok(*self);
        }

        let scale = f64::from(res.width) / f64::from(self.calib_res.width);
        Ok(Self {
            focal_len: Coord2d::new(self.focal_len.x * scale, self.focal_len.y * scale),
            principal_point: Coord2d::new(
                self.principal_point.x * scale,
                self.principal_point.y * scale,
            ),
            calib_res: res,
            ..*self
        })
    }

    /// Horizontal field of view implied by the focal length, in degrees.
    pub fn hfov_deg(&self) -> f64 {
        let half_width = f64::from(self.calib_res.width) / 2.0;
        2.0 * (half_width / self.focal_len.x).atan().to_degrees()
    }

    /// Returns true if every distortion coefficient is zero.
    pub fn is_undistorted(&self) -> bool {
        [self.k1, self.k2, self.k3, self.k4, self.k5]
            .iter()
            .all(|k| *k == 0.0)
    }
}
