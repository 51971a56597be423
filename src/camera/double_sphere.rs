//! Double sphere lens model.
//!
//! Closed-form projection and unprojection per Usenko, Demmel and Cremers,
//! "The Double Sphere Camera Model" (3DV 2018). A 3D point is projected
//! onto two unit spheres offset by `xi`, then through a pinhole shifted by
//! `alpha`; both directions have algebraic solutions, which is what makes
//! the model usable inside a per-pixel reprojection pass.

use nalgebra::{Vector2, Vector3};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::Path;

use crate::camera::{CameraModelError, FisheyeModelType, FisheyeSpec, LensModel};

/// Validated parameters of a double sphere fisheye camera.
///
/// `alpha` must lie in `[0, 1)` and `xi` in `[-1, 1]`; the pair jointly
/// parameterizes the two-sphere unprojection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoubleSphereSpec {
    pub spec: FisheyeSpec,
    pub alpha: f64,
    pub xi: f64,
}

impl DoubleSphereSpec {
    /// Build and validate a spec in one step.
    pub fn new(spec: FisheyeSpec, alpha: f64, xi: f64) -> Result<Self, CameraModelError> {
        let model = DoubleSphereSpec { spec, alpha, xi };
        model.sanity_check()?;
        Ok(model)
    }

    /// Load a spec from a YAML file and validate it.
    pub fn load_from_yaml<P: AsRef<Path>>(path: P) -> Result<Self, CameraModelError> {
        let contents = fs::read_to_string(path)?;
        let model: DoubleSphereSpec = serde_yaml::from_str(&contents)?;
        model.sanity_check()?;
        Ok(model)
    }

    /// Save the spec to a YAML file.
    pub fn save_to_yaml<P: AsRef<Path>>(&self, path: P) -> Result<(), CameraModelError> {
        let yaml_string = serde_yaml::to_string(self)?;
        let mut file = fs::File::create(path)?;
        file.write_all(yaml_string.as_bytes())?;
        Ok(())
    }
}

impl LensModel for DoubleSphereSpec {
    fn model_type(&self) -> FisheyeModelType {
        FisheyeModelType::DoubleSphere
    }

    fn project(&self, direction: &Vector3<f64>) -> Result<Vector2<f64>, CameraModelError> {
        const PRECISION: f64 = 1e-3;

        let x = direction.x;
        let y = direction.y;
        let z = direction.z;

        let r_squared = (x * x) + (y * y);
        let d1 = (r_squared + (z * z)).sqrt();
        let gamma = self.xi * d1 + z;
        let d2 = (r_squared + gamma * gamma).sqrt();

        let denom = self.alpha * d2 + (1.0 - self.alpha) * gamma;

        // Points behind the valid projection region have a vanishing or
        // negative denominator.
        if denom < PRECISION {
            return Err(CameraModelError::ProjectionOutsideImage);
        }

        let fx = self.spec.focal_length.x;
        let fy = self.spec.focal_length.y;
        let cx = f64::from(self.spec.principal_point_offset.x);
        let cy = f64::from(self.spec.principal_point_offset.y);

        Ok(Vector2::new(
            fx * (x / denom) + cx,
            fy * (y / denom) + cy,
        ))
    }

    fn unproject(&self, pixel: &Vector2<f64>) -> Result<Vector3<f64>, CameraModelError> {
        const PRECISION: f64 = 1e-3;

        let fx = self.spec.focal_length.x;
        let fy = self.spec.focal_length.y;
        let cx = f64::from(self.spec.principal_point_offset.x);
        let cy = f64::from(self.spec.principal_point_offset.y);
        let alpha = self.alpha;
        let xi = self.xi;

        let mx = (pixel.x - cx) / fx;
        let my = (pixel.y - cy) / fy;
        let r_squared = (mx * mx) + (my * my);

        // Outside the model's valid image disk the discriminant goes
        // negative; those pixels are masked by the caller.
        if alpha != 0.0 && (2.0 * alpha - 1.0) * r_squared >= 1.0 {
            return Err(CameraModelError::PointOutsideImageDisk);
        }

        let mz = (1.0 - alpha * alpha * r_squared)
            / (alpha * (1.0 - (2.0 * alpha - 1.0) * r_squared).sqrt() + (1.0 - alpha));
        let mz_squared = mz * mz;

        let num = mz * xi + (mz_squared + (1.0 - xi * xi) * r_squared).sqrt();
        let denom = mz_squared + r_squared;

        if denom < PRECISION * PRECISION {
            return Err(CameraModelError::PointOutsideImageDisk);
        }

        let coeff = num / denom;

        let ray = Vector3::new(coeff * mx, coeff * my, coeff * mz - xi);
        Ok(ray.normalize())
    }

    fn sanity_check(&self) -> Result<(), CameraModelError> {
        self.spec.sanity_check()?;

        if !self.alpha.is_finite() || !(0.0..1.0).contains(&self.alpha) {
            return Err(CameraModelError::InvalidParams(format!(
                "alpha must be in [0, 1), got {}",
                self.alpha
            )));
        }

        if !self.xi.is_finite() || !(-1.0..=1.0).contains(&self.xi) {
            return Err(CameraModelError::InvalidParams(format!(
                "xi must be in [-1, 1], got {}",
                self.xi
            )));
        }

        Ok(())
    }
}
