//! Fisheye Sensor Library
//!
//! A synthetic fisheye camera sensor for 3D embodied-simulation platforms.
//! The scene is captured into six perspective cube faces by an external
//! collaborator, then resampled through a calibrated wide-angle camera
//! model into a single fisheye image, with the inverse-depth parameters
//! needed to recover metric depth from the rendered buffer.
//!
//! The crate provides:
//! - Validated camera-model specifications (currently the double sphere
//!   model of Usenko, Demmel and Cremers, 3DV 2018)
//! - Cube-face selection math and the six-face capture target
//! - A cached, per-configuration reprojection program
//! - The [`FisheyeSensor`] orchestrating capture, reprojection and
//!   depth-parameter export

pub mod camera;
pub mod cubemap;
pub mod sensor;
pub mod shader;

// Re-export commonly used types
pub use camera::{
    CameraModelError, CameraModelSpec, DoubleSphereSpec, FisheyeModelType, FisheyeSpec, LensModel,
    Resolution,
};

pub use cubemap::{depth_unprojection, CubeCapture, CubeFace, CubeMap, DepthImage, DrawError};

pub use sensor::{FisheyeSensor, RenderTarget};

pub use shader::{shader_for, ReprojectionShader, ShaderFlags, ShaderKey};
