//! Desktop-to-clip-space transform
//!
//! The desktop mesh is expressed in desktop pixels. Each frame the window
//! layer supplies a centre offset and half-extents in clip space, plus a
//! rotation; this module folds them into the column-major 3x2 matrix consumed
//! by the desktop vertex shader.

use cgmath::{Matrix3, Vector2, Vector3};

/// Output rotation requested by the window layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Rotation {
    #[default]
    Rotate0,
    Rotate90,
    Rotate180,
    Rotate270,
}

/// Column-major 3x2 affine matrix: `[a, b, c, d, tx, ty]`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DesktopTransform(pub [f32; 6]);

impl DesktopTransform {
    /// Build the transform for a `width` x `height` desktop placed at
    /// (`x`, `y`) with half-extents (`scale_x`, `scale_y`).
    pub fn build(
        width: u32,
        height: u32,
        x: f32,
        y: f32,
        scale_x: f32,
        scale_y: f32,
        rotate: Rotation,
    ) -> Self {
        let w = width.max(1) as f32;
        let h = height.max(1) as f32;

        let m = match rotate {
            Rotation::Rotate0 => [
                2.0 * scale_x / w,
                0.0,
                0.0,
                -2.0 * scale_y / h,
                x - scale_x,
                y + scale_y,
            ],
            Rotation::Rotate90 => [
                0.0,
                -2.0 * scale_y / w,
                -2.0 * scale_x / h,
                0.0,
                x + scale_x,
                y + scale_y,
            ],
            Rotation::Rotate180 => [
                -2.0 * scale_x / w,
                0.0,
                0.0,
                2.0 * scale_y / h,
                x + scale_x,
                y - scale_y,
            ],
            Rotation::Rotate270 => [
                0.0,
                2.0 * scale_y / w,
                2.0 * scale_x / h,
                0.0,
                x - scale_x,
                y - scale_y,
            ],
        };

        Self(m)
    }

    pub fn as_array(&self) -> &[f32; 6] {
        &self.0
    }

    /// Map a desktop pixel position into clip space
    pub fn apply(&self, px: f32, py: f32) -> Vector2<f32> {
        let [a, b, c, d, tx, ty] = self.0;
        let m = Matrix3::new(a, b, 0.0, c, d, 0.0, tx, ty, 1.0);
        let v = m * Vector3::new(px, py, 1.0);
        Vector2::new(v.x, v.y)
    }
}
