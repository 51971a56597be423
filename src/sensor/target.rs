//! External render target the sensor draws into.

use image::{Luma, RgbaImage};

use crate::cubemap::{DepthImage, DrawError};
use crate::shader::ShaderFlags;

/// Output buffers for one fisheye observation.
///
/// Created and owned by the caller; the sensor only holds it while bound
/// and never resizes or reallocates the channels. Which channels must be
/// present is fixed by the sensor's flags, checked at draw time.
#[derive(Debug, Default)]
pub struct RenderTarget {
    pub color: Option<RgbaImage>,
    pub depth: Option<DepthImage>,
}

impl RenderTarget {
    /// Allocate a target with the channels `flags` asks for.
    pub fn new(width: u32, height: u32, flags: ShaderFlags) -> Self {
        RenderTarget {
            color: flags
                .contains(ShaderFlags::COLOR)
                .then(|| RgbaImage::new(width, height)),
            depth: flags
                .contains(ShaderFlags::DEPTH)
                .then(|| DepthImage::from_pixel(width, height, Luma([1.0]))),
        }
    }

    /// Verify the target carries every channel `flags` needs at the
    /// expected dimensions.
    pub(crate) fn check_compatible(
        &self,
        width: u32,
        height: u32,
        flags: ShaderFlags,
    ) -> Result<(), DrawError> {
        if flags.contains(ShaderFlags::COLOR) {
            match &self.color {
                None => {
                    return Err(DrawError::IncompatibleRenderTarget(
                        "color output enabled but target has no color channel".to_string(),
                    ))
                }
                Some(img) if img.dimensions() != (width, height) => {
                    return Err(DrawError::IncompatibleRenderTarget(format!(
                        "color channel is {}x{}, expected {}x{}",
                        img.width(),
                        img.height(),
                        width,
                        height
                    )))
                }
                _ => {}
            }
        }
        if flags.contains(ShaderFlags::DEPTH) {
            match &self.depth {
                None => {
                    return Err(DrawError::IncompatibleRenderTarget(
                        "depth output enabled but target has no depth channel".to_string(),
                    ))
                }
                Some(img) if img.dimensions() != (width, height) => {
                    return Err(DrawError::IncompatibleRenderTarget(format!(
                        "depth channel is {}x{}, expected {}x{}",
                        img.width(),
                        img.height(),
                        width,
                        height
                    )))
                }
                _ => {}
            }
        }
        Ok(())
    }

    pub(crate) fn put_color(&mut self, x: u32, y: u32, pixel: image::Rgba<u8>) {
        if let Some(img) = &mut self.color {
            img.put_pixel(x, y, pixel);
        }
    }

    pub(crate) fn put_depth(&mut self, x: u32, y: u32, depth: f32) {
        if let Some(img) = &mut self.depth {
            img.put_pixel(x, y, Luma([depth]));
        }
    }
}
