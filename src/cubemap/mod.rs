//! Cube-face capture target and face-selection math.
//!
//! The scene is rendered into six square perspective faces (one per
//! principal axis direction, 90 degree fov, shared clip range) by an
//! external [`CubeCapture`] collaborator; the reprojection pass then looks
//! rays up against those faces. This module owns the face storage, the
//! dominant-axis face selection, and the derivation of the auxiliary
//! projection's depth-unprojection parameters.

use image::{ImageBuffer, Luma, Rgba, RgbaImage};
use nalgebra::{Matrix4, Vector2, Vector3};

/// Single-channel `f32` buffer used for depth faces and depth outputs.
pub type DepthImage = ImageBuffer<Luma<f32>, Vec<f32>>;

/// Failures of the capture/reprojection draw cycle.
///
/// These are per-call and recoverable; the sensor stays usable for a
/// subsequent, correctly configured draw.
#[derive(thiserror::Error, Debug)]
pub enum DrawError {
    #[error("No render target is bound")]
    MissingRenderTarget,
    #[error("Render target is incompatible: {0}")]
    IncompatibleRenderTarget(String),
    #[error("Cubemap has no depth faces but depth output was requested")]
    MissingDepthFaces,
    #[error("Cube-face capture failed: {0}")]
    CaptureFailed(String),
}

/// The six cube faces, in the usual cubemap order.
///
/// +Y is top:
/// ```text
///           +----+
///           | -Y |
/// +----+----+----+----+
/// | -Z | -X | +Z | +X |
/// +----+----+----+----+
///           | +Y |
///           +----+
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CubeFace {
    PositiveX,
    NegativeX,
    PositiveY,
    NegativeY,
    PositiveZ,
    NegativeZ,
}

impl CubeFace {
    pub const ALL: [CubeFace; 6] = [
        CubeFace::PositiveX,
        CubeFace::NegativeX,
        CubeFace::PositiveY,
        CubeFace::NegativeY,
        CubeFace::PositiveZ,
        CubeFace::NegativeZ,
    ];

    pub fn index(self) -> usize {
        match self {
            CubeFace::PositiveX => 0,
            CubeFace::NegativeX => 1,
            CubeFace::PositiveY => 2,
            CubeFace::NegativeY => 3,
            CubeFace::PositiveZ => 4,
            CubeFace::NegativeZ => 5,
        }
    }

    /// Select the face a ray direction intersects and the face-local
    /// texture coordinate in `[0, 1] x [0, 1]`.
    ///
    /// Dominant-axis test with a fixed precedence (X before Y before Z,
    /// positive before negative) so rays exactly on a face boundary resolve
    /// to the same face every frame. `direction` must be nonzero; it does
    /// not need to be normalized.
    pub fn select(direction: &Vector3<f64>) -> (CubeFace, Vector2<f64>) {
        debug_assert!(direction.norm_squared() > 0.0);

        let ax = direction.x.abs();
        let ay = direction.y.abs();
        let az = direction.z.abs();

        let (face, sc, tc, ma) = if ax >= ay && ax >= az {
            if direction.x >= 0.0 {
                (CubeFace::PositiveX, -direction.z, -direction.y, ax)
            } else {
                (CubeFace::NegativeX, direction.z, -direction.y, ax)
            }
        } else if ay >= az {
            if direction.y >= 0.0 {
                (CubeFace::PositiveY, direction.x, direction.z, ay)
            } else {
                (CubeFace::NegativeY, direction.x, -direction.z, ay)
            }
        } else if direction.z >= 0.0 {
            (CubeFace::PositiveZ, direction.x, -direction.y, az)
        } else {
            (CubeFace::NegativeZ, -direction.x, -direction.y, az)
        };

        let uv = Vector2::new(0.5 * (sc / ma + 1.0), 0.5 * (tc / ma + 1.0));
        (face, uv)
    }
}

/// Six-face capture target owned by a fisheye sensor.
///
/// Color faces are always present; depth faces exist only when the sensor
/// was configured with depth output. Face images are square.
pub struct CubeMap {
    size: u32,
    color: [RgbaImage; 6],
    depth: Option<[DepthImage; 6]>,
}

impl CubeMap {
    /// Allocate a cubemap with `size` x `size` faces.
    pub fn new(size: u32, with_depth: bool) -> Self {
        let color = std::array::from_fn(|_| RgbaImage::new(size, size));
        let depth =
            with_depth.then(|| std::array::from_fn(|_| DepthImage::from_pixel(size, size, Luma([1.0]))));
        CubeMap { size, color, depth }
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn has_depth(&self) -> bool {
        self.depth.is_some()
    }

    pub fn color_face(&self, face: CubeFace) -> &RgbaImage {
        &self.color[face.index()]
    }

    pub fn color_face_mut(&mut self, face: CubeFace) -> &mut RgbaImage {
        &mut self.color[face.index()]
    }

    pub fn depth_face(&self, face: CubeFace) -> Option<&DepthImage> {
        self.depth.as_ref().map(|faces| &faces[face.index()])
    }

    pub fn depth_face_mut(&mut self, face: CubeFace) -> Option<&mut DepthImage> {
        self.depth.as_mut().map(|faces| &mut faces[face.index()])
    }

    /// Bilinear color sample with clamp-to-edge addressing.
    pub fn sample_color(&self, face: CubeFace, uv: &Vector2<f64>) -> Rgba<u8> {
        let img = &self.color[face.index()];
        let n = f64::from(self.size);

        let x = (uv.x * n - 0.5).clamp(0.0, n - 1.0);
        let y = (uv.y * n - 0.5).clamp(0.0, n - 1.0);
        let x0 = x.floor() as u32;
        let y0 = y.floor() as u32;
        let x1 = (x0 + 1).min(self.size - 1);
        let y1 = (y0 + 1).min(self.size - 1);
        let fx = x - f64::from(x0);
        let fy = y - f64::from(y0);

        let p00 = img.get_pixel(x0, y0);
        let p10 = img.get_pixel(x1, y0);
        let p01 = img.get_pixel(x0, y1);
        let p11 = img.get_pixel(x1, y1);

        let mut out = [0u8; 4];
        for (c, channel) in out.iter_mut().enumerate() {
            let value = f64::from(p00[c]) * (1.0 - fx) * (1.0 - fy)
                + f64::from(p10[c]) * fx * (1.0 - fy)
                + f64::from(p01[c]) * (1.0 - fx) * fy
                + f64::from(p11[c]) * fx * fy;
            *channel = value.round() as u8;
        }
        Rgba(out)
    }

    /// Nearest-neighbor depth sample; `None` when the cubemap carries no
    /// depth faces.
    pub fn sample_depth(&self, face: CubeFace, uv: &Vector2<f64>) -> Option<f32> {
        let img = self.depth_face(face)?;
        let n = f64::from(self.size);
        let x = ((uv.x * n) as i64).clamp(0, i64::from(self.size) - 1) as u32;
        let y = ((uv.y * n) as i64).clamp(0, i64::from(self.size) - 1) as u32;
        Some(img.get_pixel(x, y)[0])
    }
}

/// External collaborator that renders the scene into all six cube faces.
///
/// Implemented by the surrounding simulator. Each face is a square
/// perspective render with 90 degree fov and the spec's clip range; depth
/// faces, when present, hold window-space depth in `[0, 1]`.
pub trait CubeCapture {
    fn render(&mut self, target: &mut CubeMap) -> Result<(), DrawError>;
}

/// Projection matrix of one auxiliary cube-face capture: symmetric
/// frustum, 90 degree vertical fov, aspect 1, GL clip conventions.
pub fn face_projection(near: f64, far: f64) -> Matrix4<f64> {
    Matrix4::new_perspective(1.0, std::f64::consts::FRAC_PI_2, near, far)
}

/// Depth-unprojection parameters `(a, b)` of the auxiliary projection.
///
/// The two projection-matrix entries tied to depth are `P[2][2]` and
/// `P[3][2]` (0-indexed, column major): `-(f+n)/(f-n)` and `-2fn/(f-n)`.
/// With `a = 0.5 * (P[2][2] - 1)` and `b = 0.5 * P[3][2]`, a window-space
/// depth `z` in `[0, 1]` linearizes as `d = b / (z + a)`.
pub fn depth_unprojection(near: f64, far: f64) -> Vector2<f64> {
    let proj = face_projection(near, far);
    Vector2::new(0.5 * (proj[(2, 2)] - 1.0), 0.5 * proj[(2, 3)])
}
