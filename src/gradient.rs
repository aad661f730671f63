//! Image gradients via the 3x3 Sobel operator.

use crate::sample::reflect_coord;
use crate::GrayImageF;
use rayon::prelude::*;

const SOBEL_X: [f32; 9] = [-1.0, 0.0, 1.0, -2.0, 0.0, 2.0, -1.0, 0.0, 1.0];
const SOBEL_Y: [f32; 9] = [-1.0, -2.0, -1.0, 0.0, 0.0, 0.0, 1.0, 2.0, 1.0];

/// Computes the horizontal and vertical Sobel responses of a float image.
///
/// Outputs match the input resolution and element type; borders are
/// resolved by symmetric reflection, the same policy the sub-pixel sampler
/// uses. The kernels are the plain unnormalized 3x3 taps.
pub fn sobel_gradients(img: &GrayImageF) -> (GrayImageF, GrayImageF) {
    (convolve_3x3(img, &SOBEL_X), convolve_3x3(img, &SOBEL_Y))
}

fn convolve_3x3(img: &GrayImageF, kernel: &[f32; 9]) -> GrayImageF {
    let w = img.width() as usize;
    let h = img.height() as usize;
    assert!(w > 0 && h > 0, "cannot convolve an empty image");

    let src = img.as_raw();
    let mut out = vec![0.0f32; w * h];

    out.par_chunks_mut(w).enumerate().for_each(|(y, row)| {
        for x in 0..w {
            let mut sum = 0.0f32;
            for ky in 0..3isize {
                let sy = reflect_coord(y as isize + ky - 1, h);
                for kx in 0..3isize {
                    let sx = reflect_coord(x as isize + kx - 1, w);
                    sum += src[sy * w + sx] * kernel[(ky * 3 + kx) as usize];
                }
            }
            row[x] = sum;
        }
    });

    GrayImageF::from_raw(img.width(), img.height(), out)
        .expect("gradient buffer matches image dimensions")
}
