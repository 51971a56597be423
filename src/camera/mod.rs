//! Camera-model specifications for the fisheye sensor.
//!
//! A [`CameraModelSpec`] bundles the validated intrinsic parameters of a
//! wide-angle lens model together with the clip range of the auxiliary
//! cube-face captures. Only the double sphere model is implemented; the
//! dispatch enum is `#[non_exhaustive]` so further models (field-of-view,
//! Kannala-Brandt) can be added without breaking downstream matches.

use nalgebra::{Vector2, Vector3};
use serde::{Deserialize, Serialize};

pub mod double_sphere;

pub use double_sphere::DoubleSphereSpec;

/// Tag identifying the lens model of a fisheye sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum FisheyeModelType {
    /// Vladyslav Usenko, Nikolaus Demmel and Daniel Cremers: The Double
    /// Sphere Camera Model, The International Conference on 3D Vision
    /// (3DV), 2018.
    DoubleSphere,
}

impl FisheyeModelType {
    /// Stable lowercase tag, used when composing shader cache keys.
    pub fn tag(&self) -> &'static str {
        match self {
            FisheyeModelType::DoubleSphere => "double-sphere",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

#[derive(thiserror::Error, Debug)]
pub enum CameraModelError {
    #[error("Projection is outside the valid image region")]
    ProjectionOutsideImage,
    #[error("Pixel is outside the model's valid image disk")]
    PointOutsideImageDisk,
    #[error("Focal length must be positive")]
    FocalLengthMustBePositive,
    #[error("Clip planes must satisfy 0 < near < far, got near={near}, far={far}")]
    InvalidClipPlanes { near: f64, far: f64 },
    #[error("Invalid camera parameters: {0}")]
    InvalidParams(String),
    #[error("Failed to load YAML: {0}")]
    YamlError(String),
    #[error("IO Error: {0}")]
    IOError(String),
}

impl From<std::io::Error> for CameraModelError {
    fn from(err: std::io::Error) -> Self {
        CameraModelError::IOError(err.to_string())
    }
}

impl From<serde_yaml::Error> for CameraModelError {
    fn from(err: serde_yaml::Error) -> Self {
        CameraModelError::YamlError(err.to_string())
    }
}

/// Parameters shared by every fisheye lens model.
///
/// `near_clip`/`far_clip` bound the auxiliary perspective captures used to
/// build the cubemap, not the fisheye output itself (which has no single
/// projection matrix).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FisheyeSpec {
    /// Output resolution. Must be square; the cube faces are rendered at
    /// `width` x `width`.
    pub resolution: Resolution,
    /// Near clipping plane for the cube-face captures.
    pub near_clip: f64,
    /// Far clipping plane for the cube-face captures.
    pub far_clip: f64,
    /// Focal length (fx, fy), the distance between the pinhole and the
    /// image plane. fx and fy can differ for non-square pixels; see
    /// <http://ksimek.github.io/2013/08/13/intrinsic/>
    pub focal_length: Vector2<f64>,
    /// Principal point offset in pixels (cx, cy), the location of the
    /// optical axis relative to the image origin.
    pub principal_point_offset: Vector2<i32>,
}

impl FisheyeSpec {
    /// Check that the shared parameters are legal.
    ///
    /// Callable repeatedly; no state is mutated. Model-specific specs run
    /// this before adding their own constraints.
    pub fn sanity_check(&self) -> Result<(), CameraModelError> {
        validation::validate_resolution(&self.resolution)?;
        validation::validate_clip_planes(self.near_clip, self.far_clip)?;
        validation::validate_focal_length(&self.focal_length)?;
        Ok(())
    }
}

/// Trait defining the core functionality of a fisheye lens model.
pub trait LensModel {
    /// The model tag this spec belongs to.
    fn model_type(&self) -> FisheyeModelType;

    /// Project a 3D direction in sensor space to pixel coordinates.
    fn project(&self, direction: &Vector3<f64>) -> Result<Vector2<f64>, CameraModelError>;

    /// Unproject pixel coordinates to a unit 3D ray in sensor space.
    fn unproject(&self, pixel: &Vector2<f64>) -> Result<Vector3<f64>, CameraModelError>;

    /// Validate all parameters, base constraints first.
    fn sanity_check(&self) -> Result<(), CameraModelError>;
}

/// Validated parameter bundle for one of the supported lens models.
///
/// The reprojection pass dispatches on this tag rather than on a type
/// hierarchy, so adding a model means adding a variant and its arm here.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[non_exhaustive]
pub enum CameraModelSpec {
    DoubleSphere(DoubleSphereSpec),
}

impl CameraModelSpec {
    pub fn model_type(&self) -> FisheyeModelType {
        match self {
            CameraModelSpec::DoubleSphere(spec) => spec.model_type(),
        }
    }

    /// The model-independent parameters.
    pub fn common(&self) -> &FisheyeSpec {
        match self {
            CameraModelSpec::DoubleSphere(spec) => &spec.spec,
        }
    }

    pub fn sanity_check(&self) -> Result<(), CameraModelError> {
        match self {
            CameraModelSpec::DoubleSphere(spec) => spec.sanity_check(),
        }
    }

    pub fn project(&self, direction: &Vector3<f64>) -> Result<Vector2<f64>, CameraModelError> {
        match self {
            CameraModelSpec::DoubleSphere(spec) => spec.project(direction),
        }
    }

    pub fn unproject(&self, pixel: &Vector2<f64>) -> Result<Vector3<f64>, CameraModelError> {
        match self {
            CameraModelSpec::DoubleSphere(spec) => spec.unproject(pixel),
        }
    }
}

/// Common validation functions for camera parameters
pub mod validation {
    use super::*;

    pub fn validate_focal_length(focal_length: &Vector2<f64>) -> Result<(), CameraModelError> {
        if focal_length.x <= 0.0 || focal_length.y <= 0.0 {
            return Err(CameraModelError::FocalLengthMustBePositive);
        }
        Ok(())
    }

    pub fn validate_clip_planes(near: f64, far: f64) -> Result<(), CameraModelError> {
        if near <= 0.0 || far <= 0.0 || near >= far {
            return Err(CameraModelError::InvalidClipPlanes { near, far });
        }
        Ok(())
    }

    pub fn validate_resolution(resolution: &Resolution) -> Result<(), CameraModelError> {
        if resolution.width == 0 || resolution.height == 0 {
            return Err(CameraModelError::InvalidParams(
                "resolution must be non-zero".to_string(),
            ));
        }
        if resolution.width != resolution.height {
            return Err(CameraModelError::InvalidParams(format!(
                "the image width and height should be identical, got {}x{}",
                resolution.width, resolution.height
            )));
        }
        Ok(())
    }
}
