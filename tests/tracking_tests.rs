//! End-to-end tracking scenarios on synthetic frames.

use affine_track::{
    rotation_about, translation, warp_affine, AffineTracker, BBox, GrayImageF, TrackParams,
};
use approx::assert_relative_eq;
use image::{GrayImage, Luma};

/// Sawtooth texture used by the identity scenarios.
fn textured(width: u32, height: u32) -> GrayImage {
    GrayImage::from_fn(width, height, |x, y| Luma([((x + 2 * y) % 17) as u8]))
}

/// Smooth two-dimensional pattern with gradients in every direction;
/// friendly to Gauss-Newton and free of aperture problems.
fn smooth(width: u32, height: u32) -> GrayImageF {
    GrayImageF::from_fn(width, height, |x, y| {
        let v = 127.5 + 100.0 * (0.35 * x as f32).sin() * (0.28 * y as f32).cos();
        Luma([v])
    })
}

/// Black frame with a bright axis-aligned square.
fn square_frame(width: u32, height: u32, left: u32, top: u32, size: u32) -> GrayImage {
    GrayImage::from_fn(width, height, |x, y| {
        let inside = x >= left && x < left + size && y >= top && y < top + size;
        Luma([if inside { 255 } else { 0 }])
    })
}

fn assert_bbox_close(actual: BBox, expected: BBox, tol: f32) {
    for (a, e) in [
        (actual.x0, expected.x0),
        (actual.y0, expected.y0),
        (actual.x1, expected.x1),
        (actual.y1, expected.y1),
    ] {
        assert!(
            (a - e).abs() <= tol,
            "bbox {actual:?} deviates from {expected:?} by more than {tol}"
        );
    }
}

#[test]
fn identity_frame_converges_immediately() {
    let frame = textured(100, 100);
    let bbox = BBox::new(20.0, 20.0, 80.0, 80.0);
    let mut tracker = AffineTracker::new().with_bbox(bbox).with_frame(&frame).unwrap();

    let report = tracker
        .track(&frame, TrackParams::default().with_threshold(0.01).with_max_iters(50))
        .unwrap();

    assert!(report.iterations <= 3, "took {} iterations", report.iterations);
    assert_bbox_close(tracker.bbox().unwrap(), bbox, 0.05);
}

#[test]
fn zero_motion_is_a_fixed_point() {
    let frame = smooth(160, 160);
    let bbox = BBox::new(40.0, 40.0, 120.0, 120.0);
    let mut tracker = AffineTracker::new().with_bbox(bbox).with_frame(&frame).unwrap();

    let params = TrackParams::default();
    let report = tracker.track(&frame, params).unwrap();

    assert!(report.converged);
    let dev = (report.warp - nalgebra::Matrix3::identity()).norm();
    assert!(dev < 1e-6, "warp deviates from identity by {dev}");
    let tol = (2.0f32).sqrt() * params.threshold as f32;
    assert_bbox_close(tracker.bbox().unwrap(), bbox, tol);
}

#[test]
fn integer_translation_is_recovered() {
    let frame1 = square_frame(100, 100, 40, 40, 20);
    let frame2 = square_frame(100, 100, 45, 42, 20);
    let mut tracker = AffineTracker::new()
        .with_bbox(BBox::new(38.0, 38.0, 62.0, 62.0))
        .with_frame(&frame1)
        .unwrap();

    tracker.track(&frame2, TrackParams::default()).unwrap();

    let bbox = tracker.bbox().unwrap();
    let cx = (bbox.x0 + bbox.x1) / 2.0;
    let cy = (bbox.y0 + bbox.y1) / 2.0;
    assert!((cx - 55.0).abs() <= 0.5, "center x = {cx}");
    assert!((cy - 52.0).abs() <= 0.5, "center y = {cy}");
    assert_bbox_close(bbox, BBox::new(43.0, 40.0, 67.0, 64.0), 1.0);
}

#[test]
fn subpixel_translation_is_recovered() {
    let frame1 = square_frame(100, 100, 40, 40, 20);
    let mut tracker = AffineTracker::new()
        .with_bbox(BBox::new(38.0, 38.0, 62.0, 62.0))
        .with_frame(&frame1)
        .unwrap();

    // Shift by (1.5, 0.7) through bilinear resampling.
    let gray_f = tracker.current_image().unwrap().clone();
    let frame2 = warp_affine(&gray_f, &translation(1.5, 0.7)).unwrap();

    tracker.track(&frame2, TrackParams::default()).unwrap();

    assert_bbox_close(
        tracker.bbox().unwrap(),
        BBox::new(39.5, 38.7, 63.5, 62.7),
        0.3,
    );
}

#[test]
fn small_rotation_is_recovered() {
    let frame1 = smooth(200, 200);
    let angle = 3.0f64.to_radians();
    let rot = rotation_about(100.0, 100.0, angle);
    let frame2 = warp_affine(&frame1, &rot).unwrap();

    let mut tracker = AffineTracker::new()
        .with_bbox(BBox::new(70.0, 70.0, 130.0, 130.0))
        .with_frame(&frame1)
        .unwrap();
    let report = tracker.track(&frame2, TrackParams::default()).unwrap();

    let mut dev = 0.0f64;
    for i in 0..2 {
        for j in 0..2 {
            dev += (report.warp[(i, j)] - rot[(i, j)]).powi(2);
        }
    }
    assert!(
        dev.sqrt() < 0.02,
        "linear block deviates from the rotation by {}",
        dev.sqrt()
    );
}

#[test]
fn iteration_cap_of_one_is_honored() {
    let frame1 = smooth(120, 120);
    let frame2 = warp_affine(&frame1, &translation(2.0, 1.0)).unwrap();
    let mut tracker = AffineTracker::new()
        .with_bbox(BBox::new(30.0, 30.0, 90.0, 90.0))
        .with_frame(&frame1)
        .unwrap();

    let report = tracker
        .track(&frame2, TrackParams::default().with_threshold(0.0).with_max_iters(1))
        .unwrap();

    assert_eq!(report.iterations, 1);
    assert!(!report.converged);
    // The box moved; one Gauss-Newton step is a coarse estimate, no more.
    assert!(tracker.bbox().unwrap() != BBox::new(30.0, 30.0, 90.0, 90.0));
}

#[test]
fn tracking_follows_a_drifting_sequence() {
    let base = smooth(160, 160);
    let mut tracker = AffineTracker::new()
        .with_bbox(BBox::new(40.0, 40.0, 110.0, 110.0))
        .with_frame(&base)
        .unwrap();

    for step in 1..=3 {
        let shifted = warp_affine(&base, &translation(2.0 * step as f64, 0.0)).unwrap();
        let report = tracker.track(&shifted, TrackParams::default()).unwrap();
        assert!(report.converged, "step {step} did not converge");
    }

    let bbox = tracker.bbox().unwrap();
    assert_relative_eq!(bbox.x0, 46.0, epsilon = 0.5);
    assert_relative_eq!(bbox.x1, 116.0, epsilon = 0.5);
    assert_relative_eq!(bbox.y0, 40.0, epsilon = 0.5);
    assert_relative_eq!(bbox.y1, 110.0, epsilon = 0.5);
}

#[test]
fn frames_shift_through_the_slots_each_call() {
    let frame1 = textured(64, 64);
    let frame2 = square_frame(64, 64, 20, 20, 10);
    let mut tracker = AffineTracker::new()
        .with_bbox(BBox::new(16.0, 16.0, 40.0, 40.0))
        .with_frame(&frame1)
        .unwrap();

    tracker.track(&frame2, TrackParams::default().with_max_iters(2)).unwrap();

    // Previous current frame became the template, the new frame is current.
    let template = tracker.template_image().unwrap();
    assert_eq!(template.get_pixel(3, 1)[0], ((3 + 2) % 17) as f32);
    let current = tracker.current_image().unwrap();
    assert_eq!(current.get_pixel(21, 21)[0], 255.0);
}
