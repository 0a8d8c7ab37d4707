//! Sub-pixel image sampling.

use image::GrayImage;
use nalgebra::Matrix3;

use crate::homography::{homography_from_rect, project, HomographyError};
use crate::quad::Quad;

/// Bilinear sample at `(x, y)` in gray levels `[0, 255]`.
///
/// Pixel centers sit on integer coordinates, so the valid domain is
/// `[0, w-1] x [0, h-1]`. Returns `None` outside it.
#[inline]
pub fn bilinear_sample(img: &GrayImage, x: f64, y: f64) -> Option<f32> {
    let (w, h) = img.dimensions();
    if w < 2 || h < 2 || !(x >= 0.0 && y >= 0.0) {
        return None;
    }
    if x > (w - 1) as f64 || y > (h - 1) as f64 {
        return None;
    }
    // Clamp the base tap so the last row/column interpolates with weight 1.
    let x0 = (x.floor() as u32).min(w - 2);
    let y0 = (y.floor() as u32).min(h - 2);

    let fx = (x - x0 as f64) as f32;
    let fy = (y - y0 as f64) as f32;
    let stride = w as usize;
    let idx00 = y0 as usize * stride + x0 as usize;
    let idx01 = idx00 + stride;

    let raw = img.as_raw();
    let p00 = raw[idx00] as f32;
    let p10 = raw[idx00 + 1] as f32;
    let p01 = raw[idx01] as f32;
    let p11 = raw[idx01 + 1] as f32;

    Some(
        (1.0 - fx) * (1.0 - fy) * p00
            + fx * (1.0 - fy) * p10
            + (1.0 - fx) * fy * p01
            + fx * fy * p11,
    )
}

/// Maps normalized quad coordinates `(u, v) ∈ [0, 1]²` into the image through
/// the homography of the unit square onto a boundary quad.
pub struct QuadSampler<'a> {
    img: &'a GrayImage,
    h: Matrix3<f64>,
}

impl<'a> QuadSampler<'a> {
    pub fn new(img: &'a GrayImage, quad: &Quad) -> Result<Self, HomographyError> {
        let h = homography_from_rect([1.0, 1.0], quad)?;
        Ok(Self { img, h })
    }

    /// Image position of normalized quad coordinate `(u, v)`.
    #[inline]
    pub fn to_image(&self, u: f64, v: f64) -> [f64; 2] {
        project(&self.h, [u, v])
    }

    #[inline]
    pub fn sample(&self, u: f64, v: f64) -> Option<f32> {
        let p = self.to_image(u, v);
        bilinear_sample(self.img, p[0], p[1])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn ramp(w: u32, h: u32) -> GrayImage {
        GrayImage::from_fn(w, h, |x, _| Luma([(x * 10) as u8]))
    }

    #[test]
    fn interpolates_between_pixel_centers() {
        let img = ramp(8, 4);
        assert_eq!(bilinear_sample(&img, 2.5, 1.0), Some(25.0));
        assert_eq!(bilinear_sample(&img, 0.0, 0.0), Some(0.0));
    }

    #[test]
    fn last_column_is_sampled_exactly() {
        let img = ramp(8, 4);
        assert_eq!(bilinear_sample(&img, 7.0, 1.5), Some(70.0));
        assert_eq!(bilinear_sample(&img, 7.0, 3.0), Some(70.0));
    }

    #[test]
    fn out_of_bounds_is_none() {
        let img = ramp(8, 4);
        assert_eq!(bilinear_sample(&img, -0.1, 1.0), None);
        assert_eq!(bilinear_sample(&img, 7.5, 1.0), None);
        assert_eq!(bilinear_sample(&img, 1.0, f64::NAN), None);
    }

    #[test]
    fn quad_sampler_hits_quad_corners() {
        let img = ramp(64, 32);
        let quad = [[4.0, 2.0], [40.0, 4.0], [38.0, 20.0], [6.0, 18.0]];
        let s = QuadSampler::new(&img, &quad).unwrap();
        let p = s.to_image(1.0, 1.0);
        assert!((p[0] - 38.0).abs() < 1e-6 && (p[1] - 20.0).abs() < 1e-6);
        let v = s.sample(0.0, 0.0).unwrap();
        assert!((v - 40.0).abs() < 1e-3);
    }
}
