#![allow(dead_code)]

use std::sync::{Arc, OnceLock};

use image::GrayImage;
use nalgebra::Matrix3;
use rdtscan::synthetic;
use rdtscan::{builtin_template, FrameProcessor, ReferenceTemplate, ScanConfig, StripGeometry};

/// Built-in template, built once per test binary.
pub fn template() -> Arc<ReferenceTemplate> {
    static TEMPLATE: OnceLock<Arc<ReferenceTemplate>> = OnceLock::new();
    TEMPLATE
        .get_or_init(|| Arc::new(builtin_template().expect("builtin template")))
        .clone()
}

pub fn processor() -> FrameProcessor {
    FrameProcessor::new(template(), ScanConfig::default())
}

pub fn geometry() -> StripGeometry {
    template().geometry().clone()
}

/// Strip centered in a `w x h` frame at `scale`, rotated by `angle_deg`.
pub fn placed_frame(
    lines: [bool; 3],
    scale: f64,
    angle_deg: f64,
    w: u32,
    h: u32,
) -> (GrayImage, Matrix3<f64>) {
    let g = geometry();
    let hmat = synthetic::similarity(&g, scale, angle_deg, [w as f64 * 0.5, h as f64 * 0.5]);
    (synthetic::render_frame(&g, lines, &hmat, w, h), hmat)
}

pub fn max_corner_error(a: &[[f64; 2]; 4], b: &[[f64; 2]; 4]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(p, q)| ((p[0] - q[0]).powi(2) + (p[1] - q[1]).powi(2)).sqrt())
        .fold(0.0, f64::max)
}
