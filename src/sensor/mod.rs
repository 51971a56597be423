//! The fisheye camera sensor.
//!
//! [`FisheyeSensor`] orchestrates one observation: the external
//! [`CubeCapture`](crate::cubemap::CubeCapture) collaborator renders the
//! scene into the sensor's six-face target, the cached reprojection shader
//! resamples those faces through the lens model into the bound render
//! target, and [`FisheyeSensor::depth_unprojection`] exposes the parameters
//! needed to recover metric depth downstream.

pub mod target;

pub use target::RenderTarget;

use std::sync::Arc;

use log::{error, warn};
use nalgebra::Vector2;

use crate::camera::{CameraModelError, CameraModelSpec};
use crate::cubemap::{self, CubeCapture, CubeMap, DrawError};
use crate::shader::{shader_for, ReprojectionShader, ShaderFlags, ShaderKey};

/// Synthetic fisheye camera sensor.
///
/// Valid immediately after construction; the spec is validated before any
/// resource is allocated and is immutable afterwards. The cube-face target
/// and the draw cycle are exclusively owned, so one sensor must not be
/// drawn concurrently; the compiled shader is shared process-wide with
/// every sensor using the same `(model type, flags)` configuration.
pub struct FisheyeSensor {
    spec: CameraModelSpec,
    flags: ShaderFlags,
    cubemap: CubeMap,
    shader: Arc<ReprojectionShader>,
    depth_unprojection_parameters: Option<Vector2<f64>>,
    render_target: Option<RenderTarget>,
}

impl FisheyeSensor {
    /// Construct a sensor from a validated spec and output flags.
    ///
    /// Fails with a configuration error before allocating anything when the
    /// spec does not pass its sanity check or `flags` is empty.
    pub fn new(spec: CameraModelSpec, flags: ShaderFlags) -> Result<Self, CameraModelError> {
        spec.sanity_check()?;
        if flags.is_empty() {
            return Err(CameraModelError::InvalidParams(
                "sensor needs at least one output channel".to_string(),
            ));
        }

        let common = spec.common();
        let with_depth = flags.contains(ShaderFlags::DEPTH);
        let cubemap = CubeMap::new(common.resolution.width, with_depth);
        let shader = shader_for(ShaderKey::new(spec.model_type(), flags))?;
        let depth_unprojection_parameters =
            with_depth.then(|| cubemap::depth_unprojection(common.near_clip, common.far_clip));

        Ok(FisheyeSensor {
            spec,
            flags,
            cubemap,
            shader,
            depth_unprojection_parameters,
            render_target: None,
        })
    }

    pub fn spec(&self) -> &CameraModelSpec {
        &self.spec
    }

    pub fn flags(&self) -> ShaderFlags {
        self.flags
    }

    /// The cache key of the sensor's reprojection program.
    pub fn shader_key(&self) -> ShaderKey {
        self.shader.key()
    }

    /// Bind the output target for subsequent draws.
    pub fn bind_render_target(&mut self, target: RenderTarget) {
        self.render_target = Some(target);
    }

    pub fn render_target(&self) -> Option<&RenderTarget> {
        self.render_target.as_ref()
    }

    /// Unbind and return the output target, e.g. to read the observation.
    pub fn take_render_target(&mut self) -> Option<RenderTarget> {
        self.render_target.take()
    }

    /// Draw an observation into the bound render target.
    ///
    /// Renders the six cube faces through `capture`, then runs the
    /// reprojection pass; the whole cycle completes synchronously before
    /// returning. Returns `false` when the target is missing or
    /// incompatible or the capture fails; the failure is logged and the
    /// sensor stays usable for a subsequent draw.
    pub fn draw_observation(&mut self, capture: &mut dyn CubeCapture) -> bool {
        match self.try_draw(capture) {
            Ok(()) => true,
            Err(err @ (DrawError::MissingRenderTarget | DrawError::IncompatibleRenderTarget(_))) => {
                warn!("fisheye draw skipped: {err}");
                false
            }
            Err(err) => {
                error!("fisheye draw failed: {err}");
                false
            }
        }
    }

    fn try_draw(&mut self, capture: &mut dyn CubeCapture) -> Result<(), DrawError> {
        let common = self.spec.common();
        let target = self
            .render_target
            .as_mut()
            .ok_or(DrawError::MissingRenderTarget)?;
        // Reject a bad target before touching the cubemap.
        target.check_compatible(common.resolution.width, common.resolution.height, self.flags)?;

        capture.render(&mut self.cubemap)?;
        self.shader.draw(&self.spec, &self.cubemap, target)
    }

    /// Parameters `(a, b)` recovering linear depth `d = b / (z + a)` from a
    /// captured depth value.
    ///
    /// `None` when the sensor has no depth-capable auxiliary projection
    /// (color-only configuration); never a fabricated value.
    pub fn depth_unprojection(&self) -> Option<Vector2<f64>> {
        self.depth_unprojection_parameters
    }
}
