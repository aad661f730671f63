//! Whole-image affine warping and warp matrix constructors.

use crate::sample::sample_bilinear;
use crate::{GrayImageF, Result, TrackError};
use nalgebra::Matrix3;
use rayon::prelude::*;

/// Translation by `(dx, dy)` as a homogeneous 3x3 matrix.
pub fn translation(dx: f64, dy: f64) -> Matrix3<f64> {
    Matrix3::new(1.0, 0.0, dx, 0.0, 1.0, dy, 0.0, 0.0, 1.0)
}

/// Rotation by `angle` radians about `(cx, cy)`. Positive angles turn the
/// x-axis toward the y-axis, which reads clockwise with y pointing down.
pub fn rotation_about(cx: f64, cy: f64, angle: f64) -> Matrix3<f64> {
    let (s, c) = angle.sin_cos();
    Matrix3::new(
        c,
        -s,
        cx - c * cx + s * cy,
        s,
        c,
        cy - s * cx - c * cy,
        0.0,
        0.0,
        1.0,
    )
}

/// Warps `src` by `m`, where `m` maps source coordinates to destination
/// coordinates. The inverse is applied at each destination pixel and the
/// source is sampled bilinearly with reflected borders.
pub fn warp_affine(src: &GrayImageF, m: &Matrix3<f64>) -> Result<GrayImageF> {
    let inv = m.try_inverse().ok_or(TrackError::Singular)?;
    Ok(warp_affine_inv(src, &inv))
}

/// Warps `src` by a matrix already expressed as the destination-to-source
/// map: output pixel `(x, y)` is `src` sampled at `m * [x, y, 1]`. This is
/// the entry point for callers that hold the inverse map, and skips the
/// inversion [`warp_affine`] performs.
pub fn warp_affine_inv(src: &GrayImageF, m: &Matrix3<f64>) -> GrayImageF {
    let w = src.width() as usize;
    let h = src.height() as usize;
    assert!(w > 0 && h > 0, "cannot warp an empty image");

    let mut out = vec![0.0f32; w * h];
    out.par_chunks_mut(w).enumerate().for_each(|(y, row)| {
        let yf = y as f64;
        for (x, px) in row.iter_mut().enumerate() {
            let xf = x as f64;
            let (sx, sy) = apply_homogeneous(m, xf, yf);
            *px = sample_bilinear(src, sx, sy) as f32;
        }
    });

    GrayImageF::from_raw(src.width(), src.height(), out)
        .expect("warp buffer matches image dimensions")
}

#[inline]
fn apply_homogeneous(m: &Matrix3<f64>, x: f64, y: f64) -> (f64, f64) {
    let d = m[(2, 0)] * x + m[(2, 1)] * y + m[(2, 2)];
    let nx = m[(0, 0)] * x + m[(0, 1)] * y + m[(0, 2)];
    let ny = m[(1, 0)] * x + m[(1, 1)] * y + m[(1, 2)];
    if d.abs() > 1e-10 {
        (nx / d, ny / d)
    } else {
        (nx, ny)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn checker(w: u32, h: u32) -> GrayImageF {
        GrayImageF::from_fn(w, h, |x, y| {
            image::Luma([if (x / 4 + y / 4) % 2 == 0 { 200.0 } else { 40.0 }])
        })
    }

    #[test]
    fn identity_warp_is_a_copy() {
        let img = checker(24, 16);
        let out = warp_affine(&img, &Matrix3::identity()).unwrap();
        assert_eq!(img.as_raw(), out.as_raw());
    }

    #[test]
    fn translation_moves_content_forward() {
        // m maps source to destination, so content appears shifted by +dx.
        let img = GrayImageF::from_fn(16, 16, |x, y| {
            image::Luma([if x == 5 && y == 5 { 100.0 } else { 0.0 }])
        });
        let out = warp_affine(&img, &translation(3.0, 2.0)).unwrap();
        assert_eq!(out.get_pixel(8, 7)[0], 100.0);
        assert_eq!(out.get_pixel(5, 5)[0], 0.0);
    }

    #[test]
    fn inverse_entry_point_matches_inverted_matrix() {
        let img = checker(20, 20);
        let m = translation(1.5, -0.5);
        let a = warp_affine(&img, &m).unwrap();
        let b = warp_affine_inv(&img, &m.try_inverse().unwrap());
        assert_eq!(a.as_raw(), b.as_raw());
    }

    #[test]
    fn rotation_fixes_its_center() {
        let m = rotation_about(10.0, 7.0, 0.3);
        let (x, y) = apply_homogeneous(&m, 10.0, 7.0);
        assert_relative_eq!(x, 10.0, epsilon = 1e-12);
        assert_relative_eq!(y, 7.0, epsilon = 1e-12);
    }

    #[test]
    fn singular_matrix_is_rejected() {
        let img = checker(8, 8);
        let err = warp_affine(&img, &Matrix3::zeros()).unwrap_err();
        assert!(matches!(err, TrackError::Singular));
    }
}
