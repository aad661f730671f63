//! Steepest-descent matrix for the inverse compositional update.

use crate::bbox::SampleGrid;
use crate::gradient::sobel_gradients;
use crate::sample::sample_bilinear;
use crate::GrayImageF;
use nalgebra::DMatrix;

/// Builds the `N x 6` steepest-descent matrix from the template image.
///
/// Gradients are taken over the whole template and sub-pixel-sampled at
/// each grid point `(x, y)`; row `k` is
/// `[gx*x, gy*x, gx*y, gy*y, gx, gy]`, matching the parameter layout of
/// [`crate::tracker::incremental_warp`]. Only the template and the grid
/// enter, which is what lets the caller reuse the matrix (and its
/// transpose) across every inner iteration of a frame.
pub fn steepest_descent(template: &GrayImageF, grid: &SampleGrid) -> DMatrix<f64> {
    let (gx_img, gy_img) = sobel_gradients(template);

    let mut jac = DMatrix::zeros(grid.len(), 6);
    for (k, (x, y)) in grid.points().enumerate() {
        let gx = sample_bilinear(&gx_img, x, y);
        let gy = sample_bilinear(&gy_img, x, y);
        jac[(k, 0)] = gx * x;
        jac[(k, 1)] = gy * x;
        jac[(k, 2)] = gx * y;
        jac[(k, 3)] = gy * y;
        jac[(k, 4)] = gx;
        jac[(k, 5)] = gy;
    }
    jac
}
