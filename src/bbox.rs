//! Bounding box state and the sub-pixel sample grid derived from it.

use crate::{Result, TrackError};
use nalgebra::{Matrix3, Matrix3x2};

/// Axis-aligned rectangle `(left, top, right, bottom)` in image pixel
/// coordinates. Width and height are non-integer in general; this is the
/// persistent tracking state carried between frames.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BBox {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl BBox {
    pub fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    #[inline]
    pub fn width(&self) -> f32 {
        self.x1 - self.x0
    }

    #[inline]
    pub fn height(&self) -> f32 {
        self.y1 - self.y0
    }

    /// Checks the invariants required before a box can seed a sample grid:
    /// finite coordinates, `x0 < x1`, `y0 < y1`, both sides above 2 px.
    pub fn validate(&self) -> Result<()> {
        let coords = [self.x0, self.y0, self.x1, self.y1];
        if coords.iter().any(|c| !c.is_finite()) {
            return Err(TrackError::BadBbox("non-finite coordinate".into()));
        }
        if self.x1 <= self.x0 || self.y1 <= self.y0 {
            return Err(TrackError::BadBbox(format!(
                "inverted or empty box ({}, {}, {}, {})",
                self.x0, self.y0, self.x1, self.y1
            )));
        }
        if self.width() <= 2.0 || self.height() <= 2.0 {
            return Err(TrackError::BadBbox(format!(
                "sides must exceed 2 px, got {}x{}",
                self.width(),
                self.height()
            )));
        }
        Ok(())
    }

    /// The two defining corners as homogeneous columns
    /// `[[x0, x1], [y0, y1], [1, 1]]`.
    pub fn corners(&self) -> Matrix3x2<f64> {
        Matrix3x2::new(
            self.x0 as f64,
            self.x1 as f64,
            self.y0 as f64,
            self.y1 as f64,
            1.0,
            1.0,
        )
    }

    /// Maps both corners through `warp` and reassembles the box from the
    /// transformed columns.
    pub fn transformed(&self, warp: &Matrix3<f64>) -> BBox {
        let c = warp * self.corners();
        BBox::new(
            c[(0, 0)] as f32,
            c[(1, 0)] as f32,
            c[(0, 1)] as f32,
            c[(1, 1)] as f32,
        )
    }
}

/// Regular grid of sub-pixel sample coordinates spanning a [`BBox`], both
/// edges inclusive: `nx = floor(w)` columns spaced `w / (nx - 1)` apart,
/// rows likewise.
#[derive(Debug, Clone, Copy)]
pub struct SampleGrid {
    pub x0: f64,
    pub y0: f64,
    pub nx: usize,
    pub ny: usize,
    pub dx: f64,
    pub dy: f64,
}

impl SampleGrid {
    /// Derives the grid for a box. The box must be valid (see
    /// [`BBox::validate`]); a degenerate box would collapse the grid.
    pub fn from_bbox(bbox: &BBox) -> Self {
        let w = bbox.width() as f64;
        let h = bbox.height() as f64;
        let nx = w.floor() as usize;
        let ny = h.floor() as usize;
        debug_assert!(nx >= 2 && ny >= 2, "sample grid collapsed: {nx}x{ny}");
        Self {
            x0: bbox.x0 as f64,
            y0: bbox.y0 as f64,
            nx,
            ny,
            dx: w / (nx - 1) as f64,
            dy: h / (ny - 1) as f64,
        }
    }

    /// Number of observations contributed by this grid.
    #[inline]
    pub fn len(&self) -> usize {
        self.nx * self.ny
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sample coordinates in row-major order, the enumeration every fit in
    /// this crate shares.
    pub fn points(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        (0..self.ny).flat_map(move |i| {
            (0..self.nx).map(move |j| {
                (
                    self.x0 + j as f64 * self.dx,
                    self.y0 + i as f64 * self.dy,
                )
            })
        })
    }
}
