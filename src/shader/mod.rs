//! Reprojection programs and the process-wide shader cache.
//!
//! A [`ReprojectionShader`] is the compiled per-pixel kernel for one
//! `(model type, output flags)` configuration: it maps each output pixel to
//! a ray through the lens model's inverse projection, selects the cube face
//! that ray hits, and samples the face into the bound render target. The
//! per-sensor parameters (focal length, alpha, xi, ...) stay uniforms,
//! passed in at draw time, so one program serves every sensor sharing a
//! configuration. Programs are held in a global value-keyed cache with
//! shared ownership; an entry lives exactly as long as some sensor
//! references it.

use std::collections::HashMap;
use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::sync::{Arc, Mutex, OnceLock, PoisonError, Weak};

use image::Rgba;
use log::debug;
use nalgebra::Vector2;

use crate::camera::{CameraModelError, CameraModelSpec, FisheyeModelType};
use crate::cubemap::{CubeFace, CubeMap, DrawError};
use crate::sensor::RenderTarget;

/// Output channels a reprojection program writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ShaderFlags(u32);

impl ShaderFlags {
    pub const COLOR: ShaderFlags = ShaderFlags(1 << 0);
    pub const DEPTH: ShaderFlags = ShaderFlags(1 << 1);

    pub const fn empty() -> Self {
        ShaderFlags(0)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn contains(self, other: ShaderFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for ShaderFlags {
    type Output = ShaderFlags;

    fn bitor(self, rhs: ShaderFlags) -> ShaderFlags {
        ShaderFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for ShaderFlags {
    fn bitor_assign(&mut self, rhs: ShaderFlags) {
        self.0 |= rhs.0;
    }
}

/// Value key identifying a compiled reprojection program.
///
/// Two sensors with the same model type and flags resolve to the same
/// cached program; changing either part produces a different key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShaderKey {
    pub model_type: FisheyeModelType,
    pub flags: ShaderFlags,
}

impl ShaderKey {
    pub fn new(model_type: FisheyeModelType, flags: ShaderFlags) -> Self {
        ShaderKey { model_type, flags }
    }

    pub fn key_string(&self) -> String {
        format!(
            "fisheye-model-type={}-flags={}",
            self.model_type.tag(),
            self.flags.bits()
        )
    }
}

impl fmt::Display for ShaderKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key_string())
    }
}

/// Compiled reprojection kernel for one `(model type, flags)` pair.
pub struct ReprojectionShader {
    key: ShaderKey,
}

impl ReprojectionShader {
    fn compile(key: ShaderKey) -> Result<Self, CameraModelError> {
        if key.flags.is_empty() {
            return Err(CameraModelError::InvalidParams(
                "shader flags cannot be empty".to_string(),
            ));
        }
        Ok(ReprojectionShader { key })
    }

    pub fn key(&self) -> ShaderKey {
        self.key
    }

    pub fn flags(&self) -> ShaderFlags {
        self.key.flags
    }

    /// Run the full reprojection pass over the target viewport.
    ///
    /// Per output pixel: normalize against the spec's focal length and
    /// principal point, unproject through the lens model, select the cube
    /// face the ray hits, and sample it into the enabled channels. Pixels
    /// the inverse projection is undefined for are masked with the invalid
    /// sentinel (transparent black color, depth 1.0).
    pub fn draw(
        &self,
        spec: &CameraModelSpec,
        cubemap: &CubeMap,
        target: &mut RenderTarget,
    ) -> Result<(), DrawError> {
        let common = spec.common();
        let width = common.resolution.width;
        let height = common.resolution.height;

        target.check_compatible(width, height, self.key.flags)?;
        let write_color = self.key.flags.contains(ShaderFlags::COLOR);
        let write_depth = self.key.flags.contains(ShaderFlags::DEPTH);
        if write_depth && !cubemap.has_depth() {
            return Err(DrawError::MissingDepthFaces);
        }

        for v in 0..height {
            for u in 0..width {
                // Sample at the pixel center, like gl_FragCoord.
                let pixel = Vector2::new(f64::from(u) + 0.5, f64::from(v) + 0.5);
                match spec.unproject(&pixel) {
                    Ok(ray) => {
                        let (face, uv) = CubeFace::select(&ray);
                        if write_color {
                            target.put_color(u, v, cubemap.sample_color(face, &uv));
                        }
                        if write_depth {
                            if let Some(z) = cubemap.sample_depth(face, &uv) {
                                target.put_depth(u, v, z);
                            }
                        }
                    }
                    Err(_) => {
                        if write_color {
                            target.put_color(u, v, Rgba([0, 0, 0, 0]));
                        }
                        if write_depth {
                            target.put_depth(u, v, 1.0);
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

static SHADER_CACHE: OnceLock<Mutex<HashMap<ShaderKey, Weak<ReprojectionShader>>>> =
    OnceLock::new();

/// Look up or compile the reprojection program for `key`.
///
/// At most one program is compiled per distinct key while any reference to
/// it is alive; concurrent callers racing on the same key all receive the
/// same instance. Entries whose last sensor dropped are pruned lazily.
pub fn shader_for(key: ShaderKey) -> Result<Arc<ReprojectionShader>, CameraModelError> {
    let cache = SHADER_CACHE.get_or_init(|| Mutex::new(HashMap::new()));
    let mut programs = cache.lock().unwrap_or_else(PoisonError::into_inner);

    if let Some(existing) = programs.get(&key).and_then(Weak::upgrade) {
        return Ok(existing);
    }

    let shader = Arc::new(ReprojectionShader::compile(key)?);
    debug!("compiled reprojection shader for {}", key.key_string());
    programs.retain(|_, entry| entry.strong_count() > 0);
    programs.insert(key, Arc::downgrade(&shader));
    Ok(shader)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::{DoubleSphereSpec, FisheyeSpec, Resolution};

    fn test_spec(alpha: f64, focal: f64, size: u32) -> CameraModelSpec {
        let half = (size / 2) as i32;
        CameraModelSpec::DoubleSphere(DoubleSphereSpec {
            spec: FisheyeSpec {
                resolution: Resolution {
                    width: size,
                    height: size,
                },
                near_clip: 0.01,
                far_clip: 100.0,
                focal_length: Vector2::new(focal, focal),
                principal_point_offset: Vector2::new(half, half),
            },
            alpha,
            xi: 0.0,
        })
    }

    fn painted_cubemap(size: u32, with_depth: bool) -> CubeMap {
        let mut cubemap = CubeMap::new(size, with_depth);
        for &face in &CubeFace::ALL {
            let shade = 40 * (face.index() as u8 + 1);
            let img = cubemap.color_face_mut(face);
            for pixel in img.pixels_mut() {
                *pixel = Rgba([shade, shade, shade, 255]);
            }
            if with_depth {
                let depth = cubemap.depth_face_mut(face).unwrap();
                for pixel in depth.pixels_mut() {
                    *pixel = image::Luma([0.5]);
                }
            }
        }
        cubemap
    }

    #[test]
    fn test_flags_bit_operations() {
        let flags = ShaderFlags::COLOR | ShaderFlags::DEPTH;
        assert!(flags.contains(ShaderFlags::COLOR));
        assert!(flags.contains(ShaderFlags::DEPTH));
        assert!(!ShaderFlags::COLOR.contains(ShaderFlags::DEPTH));
        assert!(ShaderFlags::empty().is_empty());
        assert_eq!(flags.bits(), 3);
    }

    #[test]
    fn test_key_string_encodes_model_and_flags() {
        let color = ShaderKey::new(FisheyeModelType::DoubleSphere, ShaderFlags::COLOR);
        let both = ShaderKey::new(
            FisheyeModelType::DoubleSphere,
            ShaderFlags::COLOR | ShaderFlags::DEPTH,
        );
        assert_eq!(color.key_string(), "fisheye-model-type=double-sphere-flags=1");
        assert_ne!(color.key_string(), both.key_string());
        assert_ne!(color, both);
    }

    #[test]
    fn test_cache_shares_programs_by_key() {
        let key = ShaderKey::new(FisheyeModelType::DoubleSphere, ShaderFlags::COLOR);
        let first = shader_for(key).unwrap();
        let second = shader_for(key).unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        let other = shader_for(ShaderKey::new(
            FisheyeModelType::DoubleSphere,
            ShaderFlags::COLOR | ShaderFlags::DEPTH,
        ))
        .unwrap();
        assert!(!Arc::ptr_eq(&first, &other));
        assert_ne!(first.key(), other.key());
    }

    #[test]
    fn test_empty_flags_fail_compilation() {
        let key = ShaderKey::new(FisheyeModelType::DoubleSphere, ShaderFlags::empty());
        assert!(shader_for(key).is_err());
    }

    #[test]
    fn test_draw_samples_forward_face_at_principal_point() {
        let size = 64;
        let spec = test_spec(0.5, 32.0, size);
        let cubemap = painted_cubemap(size, false);
        let shader = shader_for(ShaderKey::new(spec.model_type(), ShaderFlags::COLOR)).unwrap();
        let mut target = RenderTarget::new(size, size, ShaderFlags::COLOR);

        shader.draw(&spec, &cubemap, &mut target).unwrap();

        // The principal point looks straight down +Z.
        let forward_shade = 40 * (CubeFace::PositiveZ.index() as u8 + 1);
        let center = target.color.as_ref().unwrap().get_pixel(size / 2, size / 2);
        assert_eq!(center[0], forward_shade);
        assert_eq!(center[3], 255);
    }

    #[test]
    fn test_draw_masks_pixels_outside_image_disk() {
        // alpha = 0.9 with a short focal length leaves the image corners
        // outside the valid disk.
        let size = 64;
        let spec = test_spec(0.9, 10.0, size);
        let cubemap = painted_cubemap(size, true);
        let flags = ShaderFlags::COLOR | ShaderFlags::DEPTH;
        let shader = shader_for(ShaderKey::new(spec.model_type(), flags)).unwrap();
        let mut target = RenderTarget::new(size, size, flags);

        shader.draw(&spec, &cubemap, &mut target).unwrap();

        let corner = target.color.as_ref().unwrap().get_pixel(0, 0);
        assert_eq!(*corner, Rgba([0, 0, 0, 0]));
        assert_eq!(target.depth.as_ref().unwrap().get_pixel(0, 0)[0], 1.0);

        // The center stays valid and carries the captured depth.
        let center = target.color.as_ref().unwrap().get_pixel(size / 2, size / 2);
        assert_eq!(center[3], 255);
        assert_eq!(
            target.depth.as_ref().unwrap().get_pixel(size / 2, size / 2)[0],
            0.5
        );
    }

    #[test]
    fn test_draw_rejects_mismatched_target() {
        let size = 64;
        let spec = test_spec(0.5, 32.0, size);
        let cubemap = painted_cubemap(size, false);
        let shader = shader_for(ShaderKey::new(spec.model_type(), ShaderFlags::COLOR)).unwrap();

        let mut wrong_size = RenderTarget::new(32, 32, ShaderFlags::COLOR);
        assert!(matches!(
            shader.draw(&spec, &cubemap, &mut wrong_size),
            Err(DrawError::IncompatibleRenderTarget(_))
        ));

        let mut missing_color = RenderTarget::new(size, size, ShaderFlags::DEPTH);
        assert!(matches!(
            shader.draw(&spec, &cubemap, &mut missing_color),
            Err(DrawError::IncompatibleRenderTarget(_))
        ));
    }

    #[test]
    fn test_draw_requires_depth_faces_for_depth_output() {
        let size = 64;
        let spec = test_spec(0.5, 32.0, size);
        let cubemap = painted_cubemap(size, false);
        let flags = ShaderFlags::COLOR | ShaderFlags::DEPTH;
        let shader = shader_for(ShaderKey::new(spec.model_type(), flags)).unwrap();
        let mut target = RenderTarget::new(size, size, flags);

        assert!(matches!(
            shader.draw(&spec, &cubemap, &mut target),
            Err(DrawError::MissingDepthFaces)
        ));
    }
}
