//! Photometric measurements over the located boundary.

use image::GrayImage;

use crate::quad::{self, Quad};
use crate::sample::QuadSampler;

/// Pixel statistics over the boundary polygon.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub(crate) struct RegionStats {
    /// Pixels inside the polygon.
    pub n: usize,
    pub mean: f64,
    /// Fraction of pixels at 255.
    pub clipped_fraction: f64,
    /// Variance of the 3x3 Laplacian over interior pixels.
    pub laplacian_var: f64,
}

/// Single pass over the polygon's bounding box, one pixel away from the frame
/// border so the Laplacian stencil stays in bounds.
pub(crate) fn region_stats(gray: &GrayImage, q: &Quad) -> RegionStats {
    let (w, h) = gray.dimensions();
    if w < 3 || h < 3 {
        return RegionStats::default();
    }
    let b = quad::bounds(q);
    let x0 = b[0].floor().max(1.0) as u32;
    let y0 = b[1].floor().max(1.0) as u32;
    let x1 = (b[2].ceil().max(0.0) as u32).min(w - 2);
    let y1 = (b[3].ceil().max(0.0) as u32).min(h - 2);
    if x0 > x1 || y0 > y1 {
        return RegionStats::default();
    }

    let raw = gray.as_raw();
    let stride = w as usize;
    let mut n = 0usize;
    let mut sum = 0.0f64;
    let mut clipped = 0usize;
    let mut lap_sum = 0.0f64;
    let mut lap_sq = 0.0f64;

    for y in y0..=y1 {
        for x in x0..=x1 {
            if !quad::contains(q, [x as f64, y as f64]) {
                continue;
            }
            let i = y as usize * stride + x as usize;
            let v = raw[i];
            n += 1;
            sum += v as f64;
            if v == u8::MAX {
                clipped += 1;
            }
            let lap = raw[i - 1] as f64 + raw[i + 1] as f64 + raw[i - stride] as f64
                + raw[i + stride] as f64
                - 4.0 * v as f64;
            lap_sum += lap;
            lap_sq += lap * lap;
        }
    }
    if n == 0 {
        return RegionStats::default();
    }
    let nf = n as f64;
    let lap_mean = lap_sum / nf;
    RegionStats {
        n,
        mean: sum / nf,
        clipped_fraction: clipped as f64 / nf,
        laplacian_var: (lap_sq / nf - lap_mean * lap_mean).max(0.0),
    }
}

/// Relative spread `(max - min) / max` of per-cell bright-level estimates.
///
/// The boundary is split into `grid[0] x grid[1]` cells in quad coordinates;
/// each cell is sampled on a `samples x samples` lattice and summarized by the
/// `percentile` of its samples. Cells with fewer than half their samples in the
/// frame are skipped. Returns `None` when the quad is unusable or no cell
/// survives.
pub(crate) fn shadow_spread(
    gray: &GrayImage,
    q: &Quad,
    grid: [u32; 2],
    samples: u32,
    percentile: f64,
) -> Option<f64> {
    let sampler = QuadSampler::new(gray, q).ok()?;
    let (gx, gy) = (grid[0].max(1), grid[1].max(1));
    let k = samples.max(1);
    let mut levels = Vec::with_capacity((gx * gy) as usize);
    let mut buf = Vec::with_capacity((k * k) as usize);

    for cy in 0..gy {
        for cx in 0..gx {
            buf.clear();
            for sy in 0..k {
                for sx in 0..k {
                    let u = (cx as f64 + (sx as f64 + 0.5) / k as f64) / gx as f64;
                    let v = (cy as f64 + (sy as f64 + 0.5) / k as f64) / gy as f64;
                    if let Some(s) = sampler.sample(u, v) {
                        buf.push(s);
                    }
                }
            }
            if buf.len() * 2 < (k * k) as usize {
                continue;
            }
            buf.sort_by(|a, b| a.total_cmp(b));
            let idx = ((buf.len() - 1) as f64 * percentile.clamp(0.0, 1.0)).round() as usize;
            levels.push(buf[idx] as f64);
        }
    }

    let max = levels.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let min = levels.iter().copied().fold(f64::INFINITY, f64::min);
    if levels.is_empty() {
        return None;
    }
    if max <= 0.0 {
        return Some(1.0);
    }
    Some((max - min) / max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use image::Luma;

    const Q: Quad = [[10.0, 10.0], [50.0, 10.0], [50.0, 30.0], [10.0, 30.0]];

    #[test]
    fn flat_region_has_zero_laplacian_variance() {
        let img = GrayImage::from_pixel(64, 40, Luma([120]));
        let s = region_stats(&img, &Q);
        assert_eq!(s.n, 41 * 21);
        assert_relative_eq!(s.mean, 120.0);
        assert_eq!(s.laplacian_var, 0.0);
        assert_eq!(s.clipped_fraction, 0.0);
    }

    #[test]
    fn clipped_pixels_are_counted() {
        let img = GrayImage::from_fn(64, 40, |x, _| Luma([if x < 30 { 255 } else { 100 }]));
        let s = region_stats(&img, &Q);
        assert_relative_eq!(s.clipped_fraction, 20.0 / 41.0, epsilon = 1e-12);
    }

    #[test]
    fn texture_is_sharper_than_flat() {
        let img = GrayImage::from_fn(64, 40, |x, y| Luma([if (x + y) % 2 == 0 { 40 } else { 200 }]));
        assert!(region_stats(&img, &Q).laplacian_var > 1000.0);
    }

    #[test]
    fn quad_outside_frame_has_no_pixels() {
        let img = GrayImage::from_pixel(64, 40, Luma([120]));
        let far = Q.map(|p| [p[0] + 500.0, p[1]]);
        assert_eq!(region_stats(&img, &far).n, 0);
    }

    #[test]
    fn uniform_region_has_no_shadow() {
        let img = GrayImage::from_pixel(64, 40, Luma([200]));
        let spread = shadow_spread(&img, &Q, [8, 2], 8, 0.9).unwrap();
        assert!(spread.abs() < 1e-6);
    }

    #[test]
    fn illumination_ramp_is_detected() {
        let img = GrayImage::from_fn(64, 40, |x, _| Luma([(60 + 3 * x).min(255) as u8]));
        let spread = shadow_spread(&img, &Q, [8, 2], 8, 0.9).unwrap();
        assert!(spread > 0.35, "spread {spread}");
    }
}
