mod common;

use common::{geometry, max_corner_error, template};
use rdtscan::synthetic;
use rdtscan::{LocalizeConfig, Localizer};

#[test]
fn perspective_warp_round_trips_to_ground_truth_corners() {
    let g = geometry();
    // Mild keystone plus a few degrees of roll around the frame center.
    let truth = [[92.0, 178.0], [566.0, 196.0], [560.0, 318.0], [86.0, 300.0]];
    let h = synthetic::onto_quad(&g, &truth).expect("homography");
    let frame = synthetic::render_frame(&g, [true, false, false], &h, 640, 480);

    let localizer = Localizer::new(template(), LocalizeConfig::default());
    let b = localizer.locate(&frame).expect("strip should be located");

    let err = max_corner_error(&b.corners, &truth);
    assert!(err < 3.0, "max corner error {err:.2}px, corners {:?}", b.corners);
    assert!(b.confidence >= LocalizeConfig::default().min_confidence);
    assert!(b.n_inliers >= 12);
    assert!(b.angle_deg > 1.0 && b.angle_deg < 3.0, "angle {}", b.angle_deg);
}

#[test]
fn rotated_and_scaled_strip_is_located() {
    let g = geometry();
    for (scale, angle) in [(0.7, -6.0), (1.2, 8.0), (1.0, 12.0)] {
        let h = synthetic::similarity(&g, scale, angle, [330.0, 250.0]);
        let frame = synthetic::render_frame(&g, [false; 3], &h, 800, 600);
        let localizer = Localizer::new(template(), LocalizeConfig::default());
        let b = localizer
            .locate(&frame)
            .unwrap_or_else(|| panic!("scale {scale} angle {angle}: not located"));
        let truth = synthetic::ground_truth_corners(&g, &h);
        let err = max_corner_error(&b.corners, &truth);
        assert!(err < 4.0, "scale {scale} angle {angle}: corner error {err:.2}px");
        assert!((b.angle_deg - angle).abs() < 1.0);
    }
}

#[test]
fn featureless_frames_never_locate() {
    let localizer = Localizer::new(template(), LocalizeConfig::default());
    for seed in 0..10 {
        let frame = synthetic::noise_frame(640, 480, 40 + 20 * seed as u8, 3, seed);
        assert!(localizer.locate(&frame).is_none(), "seed {seed}");
    }
}

#[test]
fn location_is_deterministic() {
    let g = geometry();
    let h = synthetic::similarity(&g, 0.9, 3.0, [320.0, 240.0]);
    let frame = synthetic::render_frame(&g, [false; 3], &h, 640, 480);
    let localizer = Localizer::new(template(), LocalizeConfig::default());
    let a = localizer.locate(&frame).expect("located");
    let b = localizer.locate(&frame).expect("located");
    assert_eq!(a, b);
}
