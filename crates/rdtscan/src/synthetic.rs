//! Synthetic strip and frame rendering for tests, benchmarks and demos.
//!
//! A synthetic strip is a field of random 8x8 gray blocks (the feature-rich
//! cassette texture) with a bright, flat result window. Present result lines
//! are drawn as dark vertical bands inside their line regions. Frames are
//! produced by forward-warping the canonical strip with a known homography.

use image::{GrayImage, Luma};
use nalgebra::Matrix3;
use rand::prelude::*;

use crate::homography::{homography_from_rect, project, HomographyError};
use crate::quad::Quad;
use crate::template::StripGeometry;

/// Texture seed used for the built-in reference strip.
pub const DEFAULT_TEXTURE_SEED: u64 = 7;

const BLOCK: u32 = 8;
const WINDOW_LEVEL: u8 = 230;
const LINE_LEVEL: u8 = 70;
const LINE_HALF_WIDTH: f64 = 4.0;
const LINE_INSET: f64 = 4.0;

/// Frame background outside the strip.
pub const BACKGROUND_LEVEL: u8 = 60;

/// Render a canonical strip. `lines` flags control, test A and test B.
pub fn render_strip(geometry: &StripGeometry, lines: [bool; 3], seed: u64) -> GrayImage {
    let mut rng = StdRng::seed_from_u64(seed);
    let bw = geometry.width.div_ceil(BLOCK);
    let bh = geometry.height.div_ceil(BLOCK);
    let blocks: Vec<u8> = (0..bw * bh).map(|_| rng.gen_range(20..=235)).collect();

    let win = &geometry.result_window;
    let mut img = GrayImage::from_fn(geometry.width, geometry.height, |x, y| {
        let in_window =
            x >= win.x && x < win.x + win.width && y >= win.y && y < win.y + win.height;
        if in_window {
            Luma([WINDOW_LEVEL])
        } else {
            Luma([blocks[((y / BLOCK) * bw + x / BLOCK) as usize]])
        }
    });

    for (line, present) in geometry.lines().into_iter().zip(lines) {
        if !present {
            continue;
        }
        let x0 = (line.center_x - LINE_HALF_WIDTH).round().max(0.0) as u32;
        let x1 = (line.center_x + LINE_HALF_WIDTH).round() as u32;
        let y0 = (line.y_span[0] + LINE_INSET).round().max(0.0) as u32;
        let y1 = (line.y_span[1] - LINE_INSET).round() as u32;
        for y in y0..y1.min(geometry.height) {
            for x in x0..x1.min(geometry.width) {
                img.put_pixel(x, y, Luma([LINE_LEVEL]));
            }
        }
    }
    img
}

/// Homography placing the strip center at `center`, scaled by `scale` and
/// rotated by `angle_deg` (clockwise on screen).
pub fn similarity(geometry: &StripGeometry, scale: f64, angle_deg: f64, center: [f64; 2]) -> Matrix3<f64> {
    let (s, c) = angle_deg.to_radians().sin_cos();
    let cx = geometry.width as f64 * 0.5;
    let cy = geometry.height as f64 * 0.5;
    let a = scale * c;
    let b = scale * s;
    Matrix3::new(
        a, -b, center[0] - (a * cx - b * cy), //
        b, a, center[1] - (b * cx + a * cy), //
        0.0, 0.0, 1.0,
    )
}

/// Homography mapping the canonical rectangle onto `quad` (TL, TR, BR, BL).
pub fn onto_quad(geometry: &StripGeometry, quad: &Quad) -> Result<Matrix3<f64>, HomographyError> {
    homography_from_rect([geometry.width as f64, geometry.height as f64], quad)
}

/// Frame-space corners of the strip under `h`.
pub fn ground_truth_corners(geometry: &StripGeometry, h: &Matrix3<f64>) -> Quad {
    geometry.canonical_corners().map(|p| project(h, p))
}

/// Forward-warp `strip` into a `width x height` frame with canonical-to-frame
/// homography `h`. Each frame pixel averages a 2x2 supersample; samples that
/// miss the strip take `background`.
pub fn warp_into_frame(
    strip: &GrayImage,
    h: &Matrix3<f64>,
    width: u32,
    height: u32,
    background: u8,
) -> GrayImage {
    let Some(h_inv) = h.try_inverse() else {
        return GrayImage::from_pixel(width, height, Luma([background]));
    };
    let (sw, sh) = (strip.width() as f64, strip.height() as f64);
    const OFFSETS: [f64; 2] = [-0.25, 0.25];

    GrayImage::from_fn(width, height, |x, y| {
        let mut acc = 0.0f64;
        for oy in OFFSETS {
            for ox in OFFSETS {
                let p = project(&h_inv, [x as f64 + ox, y as f64 + oy]);
                let inside = p[0] >= -0.5 && p[1] >= -0.5 && p[0] < sw - 0.5 && p[1] < sh - 0.5;
                acc += if inside {
                    sample_clamped(strip, p[0], p[1])
                } else {
                    background as f64
                };
            }
        }
        Luma([(acc / 4.0).round().clamp(0.0, 255.0) as u8])
    })
}

fn sample_clamped(img: &GrayImage, x: f64, y: f64) -> f64 {
    let (w, h) = img.dimensions();
    let x = x.clamp(0.0, (w - 1) as f64);
    let y = y.clamp(0.0, (h - 1) as f64);
    let x0 = (x.floor() as u32).min(w.saturating_sub(2));
    let y0 = (y.floor() as u32).min(h.saturating_sub(2));
    let x1 = (x0 + 1).min(w - 1);
    let y1 = (y0 + 1).min(h - 1);
    let fx = x - x0 as f64;
    let fy = y - y0 as f64;
    let p = |xx: u32, yy: u32| img.get_pixel(xx, yy)[0] as f64;
    (1.0 - fx) * (1.0 - fy) * p(x0, y0)
        + fx * (1.0 - fy) * p(x1, y0)
        + (1.0 - fx) * fy * p(x0, y1)
        + fx * fy * p(x1, y1)
}

/// Render a strip and place it in a frame in one step.
pub fn render_frame(
    geometry: &StripGeometry,
    lines: [bool; 3],
    h: &Matrix3<f64>,
    width: u32,
    height: u32,
) -> GrayImage {
    let strip = render_strip(geometry, lines, DEFAULT_TEXTURE_SEED);
    warp_into_frame(&strip, h, width, height, BACKGROUND_LEVEL)
}

/// Featureless frame: `mean` plus uniform noise of at most `amplitude`.
pub fn noise_frame(width: u32, height: u32, mean: u8, amplitude: u8, seed: u64) -> GrayImage {
    let mut rng = StdRng::seed_from_u64(seed);
    let a = amplitude as i16;
    GrayImage::from_fn(width, height, |_, _| {
        let v = mean as i16 + rng.gen_range(-a..=a);
        Luma([v.clamp(0, 255) as u8])
    })
}

/// Gaussian-blur a `GrayImage` via `imageproc`.
pub fn blur_gray(img: &GrayImage, sigma: f32) -> GrayImage {
    imageproc::filter::gaussian_blur_f32(img, sigma)
}

/// Multiply every pixel by `gain`, saturating at 255.
pub fn scale_brightness(img: &GrayImage, gain: f32) -> GrayImage {
    GrayImage::from_fn(img.width(), img.height(), |x, y| {
        let v = img.get_pixel(x, y)[0] as f32 * gain;
        Luma([v.round().clamp(0.0, 255.0) as u8])
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn strip_has_flat_window_and_dark_lines() {
        let g = StripGeometry::default();
        let img = render_strip(&g, [true, false, false], DEFAULT_TEXTURE_SEED);
        assert_eq!(img.dimensions(), (480, 120));
        assert_eq!(img.get_pixel(325, 60)[0], LINE_LEVEL);
        assert_eq!(img.get_pixel(370, 60)[0], WINDOW_LEVEL);
        assert_eq!(img.get_pixel(310, 40)[0], WINDOW_LEVEL);
    }

    #[test]
    fn same_seed_renders_same_strip() {
        let g = StripGeometry::default();
        let a = render_strip(&g, [false; 3], 3);
        let b = render_strip(&g, [false; 3], 3);
        assert_eq!(a, b);
    }

    #[test]
    fn similarity_maps_center_and_scales_corners() {
        let g = StripGeometry::default();
        let h = similarity(&g, 0.5, 0.0, [320.0, 240.0]);
        assert_eq!(project(&h, [240.0, 60.0]), [320.0, 240.0]);
        let q = ground_truth_corners(&g, &h);
        assert_relative_eq!(q[0][0], 200.0, epsilon = 1e-9);
        assert_relative_eq!(q[2][1], 270.0, epsilon = 1e-9);
    }

    #[test]
    fn identity_warp_reproduces_interior() {
        let g = StripGeometry::default();
        let strip = render_strip(&g, [false; 3], 1);
        let frame = warp_into_frame(&strip, &Matrix3::identity(), 480, 120, 0);
        assert_eq!(frame.get_pixel(100, 60), strip.get_pixel(100, 60));
    }

    #[test]
    fn noise_frame_stays_within_amplitude() {
        let img = noise_frame(32, 32, 128, 3, 5);
        assert!(img.pixels().all(|p| (125..=131).contains(&p[0])));
    }
}
