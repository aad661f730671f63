//! Inverse compositional affine template tracking.
//!
//! Follows a rectangular template across consecutive grayscale frames by
//! estimating, per frame, the affine warp that aligns the patch in the new
//! frame with the patch in the previous frame (Baker-Matthews inverse
//! compositional alignment). The steepest-descent matrix and Gauss-Newton
//! Hessian are precomputed from the template and stay fixed across the
//! inner iterations of a single [`AffineTracker::track`] call.

pub mod bbox;
pub mod gradient;
pub mod jacobian;
pub mod sample;
pub mod tracker;
pub mod warp;

pub use bbox::*;
pub use gradient::*;
pub use jacobian::*;
pub use sample::*;
pub use tracker::*;
pub use warp::*;

use image::{ImageBuffer, Luma};

/// Single-channel f32 frame used for all internal computation.
pub type GrayImageF = ImageBuffer<Luma<f32>, Vec<f32>>;

pub type Result<T> = std::result::Result<T, TrackError>;

#[derive(Debug, thiserror::Error)]
pub enum TrackError {
    #[error("Required image is missing or zero-sized")]
    EmptyImage,

    #[error("Invalid bounding box: {0}")]
    BadBbox(String),

    #[error("Expected a single-channel image, got {0} channels")]
    ChannelMismatch(u8),

    #[error("Matrix is singular to working precision")]
    Singular,
}
