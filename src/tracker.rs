//! Tracker facade and the inverse compositional iteration driver.

use crate::bbox::{BBox, SampleGrid};
use crate::jacobian::steepest_descent;
use crate::sample::sample_rect;
use crate::warp::warp_affine_inv;
use crate::{GrayImageF, Result, TrackError};
use image::{ImageBuffer, Pixel};
use log::{debug, warn};
use nalgebra::{Cholesky, DMatrix, DVector, Dyn, Matrix3};
use num_traits::ToPrimitive;

/// Per-pixel weight hook: given the current residual vector, produce the
/// diagonal of the weight matrix applied to the normal equations. Reserved
/// for robust M-estimators; when absent the identity is used and the
/// Gauss-Newton system is factored once per frame.
pub type WeightFn = Box<dyn Fn(&DVector<f64>) -> DVector<f64> + Send + Sync>;

/// Knobs for one [`AffineTracker::track`] call.
#[derive(Debug, Clone, Copy)]
pub struct TrackParams {
    /// Convergence threshold on the L2 norm of the parameter update.
    pub threshold: f64,
    /// Inner iteration cap; reaching it is normal termination, not an error.
    pub max_iters: usize,
}

impl Default for TrackParams {
    fn default() -> Self {
        Self {
            threshold: 0.01875,
            max_iters: 100,
        }
    }
}

impl TrackParams {
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_max_iters(mut self, max_iters: usize) -> Self {
        self.max_iters = max_iters;
        self
    }
}

/// What one `track` call did. All state is already committed to the
/// tracker when this is returned; the report is informational.
#[derive(Debug, Clone)]
pub struct TrackReport {
    /// Final warp, mapping template coordinates into the new frame.
    pub warp: Matrix3<f64>,
    /// The propagated bounding box, identical to the stored one.
    pub bbox: BBox,
    /// Inner iterations actually performed.
    pub iterations: usize,
    /// Whether the update norm dropped below the threshold.
    pub converged: bool,
    /// RMS of the last evaluated residual vector.
    pub residual: f64,
}

/// Single-object tracker: holds the bounding box plus the template
/// (previous) and current frames, and advances one frame per
/// [`track`](AffineTracker::track) call.
///
/// Frames are accepted from any single-channel `image` buffer (u8, u16,
/// f32, ...) and converted to f32 internally. The tracker is not
/// `Sync`-aware beyond what its fields imply; one instance, one caller.
#[derive(Default)]
pub struct AffineTracker {
    bbox: Option<BBox>,
    template_image: Option<GrayImageF>,
    current_image: Option<GrayImageF>,
    weight_fn: Option<WeightFn>,
}

impl AffineTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`set_bbox`](AffineTracker::set_bbox).
    pub fn with_bbox(mut self, bbox: BBox) -> Self {
        self.bbox = Some(bbox);
        self
    }

    /// Builder form of [`set_current_image`](AffineTracker::set_current_image).
    pub fn with_frame<Px: Pixel>(
        mut self,
        frame: &ImageBuffer<Px, Vec<Px::Subpixel>>,
    ) -> Result<Self> {
        self.set_current_image(frame)?;
        Ok(self)
    }

    /// Installs the per-pixel weight hook (e.g. Huber or Tukey weights).
    pub fn with_weight_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(&DVector<f64>) -> DVector<f64> + Send + Sync + 'static,
    {
        self.weight_fn = Some(Box::new(f));
        self
    }

    /// Replaces the bounding box. No validation happens here; a degenerate
    /// box is reported by the next `track` call, which leaves it in place.
    pub fn set_bbox(&mut self, bbox: BBox) {
        self.bbox = Some(bbox);
    }

    pub fn bbox(&self) -> Option<BBox> {
        self.bbox
    }

    pub fn set_current_image<Px: Pixel>(
        &mut self,
        frame: &ImageBuffer<Px, Vec<Px::Subpixel>>,
    ) -> Result<()> {
        self.current_image = Some(to_gray_f32(frame)?);
        Ok(())
    }

    pub fn current_image(&self) -> Option<&GrayImageF> {
        self.current_image.as_ref()
    }

    pub fn set_template_image<Px: Pixel>(
        &mut self,
        frame: &ImageBuffer<Px, Vec<Px::Subpixel>>,
    ) -> Result<()> {
        self.template_image = Some(to_gray_f32(frame)?);
        Ok(())
    }

    pub fn template_image(&self) -> Option<&GrayImageF> {
        self.template_image.as_ref()
    }

    /// Advances the tracker by one frame.
    ///
    /// The stored current frame becomes the template, `new_frame` becomes
    /// the current frame, and the bounding box is moved to where the
    /// template patch best aligns in the new frame under an affine warp.
    ///
    /// Preconditions (checked before any state changes): a bounding box
    /// must be set and valid, a previous frame must be present, and
    /// `new_frame` must be non-empty and single-channel. A singular
    /// Gauss-Newton system mid-iteration is not an error: the driver logs
    /// a warning and commits the warp estimated so far.
    pub fn track<Px: Pixel>(
        &mut self,
        new_frame: &ImageBuffer<Px, Vec<Px::Subpixel>>,
        params: TrackParams,
    ) -> Result<TrackReport> {
        let bbox = self
            .bbox
            .ok_or_else(|| TrackError::BadBbox("no bounding box set".into()))?;
        bbox.validate()?;
        let new_gray = to_gray_f32(new_frame)?;
        let template = self.current_image.take().ok_or(TrackError::EmptyImage)?;

        // Everything below is derived from the template alone and stays
        // fixed for the whole inner loop.
        let grid = SampleGrid::from_bbox(&bbox);
        let t_patch = sample_rect(&template, &grid);
        let jac = steepest_descent(&template, &grid);
        let jt = jac.transpose();
        let fixed_solver = if self.weight_fn.is_none() {
            Solver::build(&jt * &jac)
        } else {
            None
        };

        let mut warp = Matrix3::<f64>::identity();
        let mut iterations = 0usize;
        let mut converged = false;
        let mut residual = 0.0f64;

        for _ in 0..params.max_iters {
            let warped = warp_affine_inv(&new_gray, &warp);
            let c_patch = sample_rect(&warped, &grid);
            let e = residual_vector(&c_patch, &t_patch);
            residual = (e.norm_squared() / e.len() as f64).sqrt();

            let step = match &self.weight_fn {
                None => fixed_solver.as_ref().map(|s| {
                    let b = &jt * &e;
                    s.solve(&b)
                }),
                Some(f) => {
                    let d = f(&e);
                    let mut jw = jac.clone();
                    for (k, mut row) in jw.row_iter_mut().enumerate() {
                        row *= d[k];
                    }
                    let b = &jt * &e.component_mul(&d);
                    Solver::build(&jt * &jw).map(|s| s.solve(&b))
                }
            };

            let Some(dp) = step else {
                warn!("Gauss-Newton system is singular; keeping current warp");
                break;
            };
            let Some(inc_inv) = incremental_warp(&dp).try_inverse() else {
                warn!("incremental warp is non-invertible; keeping current warp");
                break;
            };
            warp *= inc_inv;
            iterations += 1;

            let norm = dp.norm();
            debug!("iteration {iterations}: |dp| = {norm:.3e}, rms residual = {residual:.3e}");
            if norm < params.threshold {
                converged = true;
                break;
            }
        }

        let bbox = bbox.transformed(&warp);
        self.bbox = Some(bbox);
        self.template_image = Some(template);
        self.current_image = Some(new_gray);

        Ok(TrackReport {
            warp,
            bbox,
            iterations,
            converged,
            residual,
        })
    }
}

/// Incremental warp `M(dp)` for the six-parameter update
/// `p = (p1..p6)`: `[[1 + p1, p3, p5], [p2, 1 + p4, p6], [0, 0, 1]]`.
pub fn incremental_warp(dp: &DVector<f64>) -> Matrix3<f64> {
    Matrix3::new(
        1.0 + dp[0],
        dp[2],
        dp[4],
        dp[1],
        1.0 + dp[3],
        dp[5],
        0.0,
        0.0,
        1.0,
    )
}

/// Normal-equation solver: Cholesky while the system is positive definite,
/// explicit inverse as a fallback, `None` once both give up.
enum Solver {
    Factored(Cholesky<f64, Dyn>),
    Inverse(DMatrix<f64>),
}

impl Solver {
    fn build(h: DMatrix<f64>) -> Option<Self> {
        match Cholesky::new(h.clone()) {
            Some(c) => Some(Solver::Factored(c)),
            None => h.try_inverse().map(Solver::Inverse),
        }
    }

    fn solve(&self, b: &DVector<f64>) -> DVector<f64> {
        match self {
            Solver::Factored(c) => c.solve(b),
            Solver::Inverse(hi) => hi * b,
        }
    }
}

/// Flattens `current - template` in the row-major order shared with the
/// sample grid enumeration.
fn residual_vector(current: &DMatrix<f64>, template: &DMatrix<f64>) -> DVector<f64> {
    let (ny, nx) = current.shape();
    let mut e = DVector::zeros(ny * nx);
    let mut k = 0;
    for i in 0..ny {
        for j in 0..nx {
            e[k] = current[(i, j)] - template[(i, j)];
            k += 1;
        }
    }
    e
}

fn to_gray_f32<Px: Pixel>(img: &ImageBuffer<Px, Vec<Px::Subpixel>>) -> Result<GrayImageF> {
    if Px::CHANNEL_COUNT != 1 {
        return Err(TrackError::ChannelMismatch(Px::CHANNEL_COUNT));
    }
    if img.width() == 0 || img.height() == 0 {
        return Err(TrackError::EmptyImage);
    }
    let data: Vec<f32> = img
        .as_raw()
        .iter()
        .map(|v| v.to_f64().unwrap_or(0.0) as f32)
        .collect();
    Ok(GrayImageF::from_raw(img.width(), img.height(), data)
        .expect("pixel buffer matches image dimensions"))
}
