//! Sub-pixel sampling with symmetric border reflection.

use crate::bbox::SampleGrid;
use image::{ImageBuffer, Luma, Primitive};
use nalgebra::DMatrix;

/// Maps a possibly out-of-range coordinate into `[0, len)` by reflecting
/// about the outermost pixels without repeating them: the index sequence
/// continues `..., 2, 1, 0, 1, 2, ...` past either edge.
#[inline]
pub(crate) fn reflect_coord(coord: isize, len: usize) -> usize {
    let n = len as isize;
    if n == 1 {
        return 0;
    }
    let period = 2 * n - 2;
    let mut c = coord % period;
    if c < 0 {
        c += period;
    }
    if c >= n {
        c = period - c;
    }
    c as usize
}

/// Bilinearly interpolated intensity at real coordinates `(x, y)`.
///
/// Accepts any single-channel pixel primitive and promotes it to `f64`
/// before the weighted sum. Coordinates outside the image are resolved by
/// symmetric reflection (see [`reflect_coord`]).
///
/// # Panics
/// Panics if the image is zero-sized; sampling an empty image is a
/// programming error, not a runtime condition.
pub fn sample_bilinear<P: Primitive>(
    img: &ImageBuffer<Luma<P>, Vec<P>>,
    x: f64,
    y: f64,
) -> f64 {
    let w = img.width() as usize;
    let h = img.height() as usize;
    assert!(w > 0 && h > 0, "cannot sample an empty image");

    let xf = x.floor();
    let yf = y.floor();
    let fx = x - xf;
    let fy = y - yf;
    let xi = xf as isize;
    let yi = yf as isize;

    let x0 = reflect_coord(xi, w) as u32;
    let x1 = reflect_coord(xi + 1, w) as u32;
    let y0 = reflect_coord(yi, h) as u32;
    let y1 = reflect_coord(yi + 1, h) as u32;

    let v00 = img.get_pixel(x0, y0)[0].to_f64().unwrap_or(0.0);
    let v10 = img.get_pixel(x1, y0)[0].to_f64().unwrap_or(0.0);
    let v01 = img.get_pixel(x0, y1)[0].to_f64().unwrap_or(0.0);
    let v11 = img.get_pixel(x1, y1)[0].to_f64().unwrap_or(0.0);

    (1.0 - fx) * (1.0 - fy) * v00
        + fx * (1.0 - fy) * v10
        + (1.0 - fx) * fy * v01
        + fx * fy * v11
}

/// Extracts the `ny x nx` patch of bilinear samples on `grid`.
///
/// Pure: the input image is untouched and the patch is freshly allocated.
pub fn sample_rect<P: Primitive>(
    img: &ImageBuffer<Luma<P>, Vec<P>>,
    grid: &SampleGrid,
) -> DMatrix<f64> {
    let mut patch = DMatrix::zeros(grid.ny, grid.nx);
    for i in 0..grid.ny {
        let y = grid.y0 + i as f64 * grid.dy;
        for j in 0..grid.nx {
            let x = grid.x0 + j as f64 * grid.dx;
            patch[(i, j)] = sample_bilinear(img, x, y);
        }
    }
    patch
}
