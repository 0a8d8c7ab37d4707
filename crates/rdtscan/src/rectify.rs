//! Perspective rectification of a located strip into canonical geometry.

use image::{GrayImage, Luma};

use crate::homography::{homography_from_rect, project, HomographyError};
use crate::quad::{self, Quad};
use crate::sample::bilinear_sample;
use crate::template::StripGeometry;

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct RectifyConfig {
    /// Value for output pixels that map outside the frame.
    pub fill: u8,
    /// Boundaries with a smaller area (frame pixels) are degenerate.
    pub min_area_px: f64,
}

impl Default for RectifyConfig {
    fn default() -> Self {
        Self {
            fill: 0,
            min_area_px: 16.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RectifyError {
    /// Near-zero area, non-convex or mirrored boundary.
    Degenerate,
    /// The canonical-to-frame homography could not be estimated or inverted.
    Numerical(HomographyError),
}

impl std::fmt::Display for RectifyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Degenerate => write!(f, "boundary is degenerate"),
            Self::Numerical(e) => write!(f, "rectifying homography failed: {e}"),
        }
    }
}

impl std::error::Error for RectifyError {}

/// Strip resampled into canonical coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct RectifiedStrip {
    /// Full strip, `geometry.width x geometry.height`.
    pub image: GrayImage,
    /// Result-window crop of `image`.
    pub window: GrayImage,
    pub geometry: StripGeometry,
}

/// Resample the quadrilateral `corners` of `gray` onto the canonical strip
/// rectangle with bilinear interpolation.
pub fn rectify(
    gray: &GrayImage,
    corners: &Quad,
    geometry: &StripGeometry,
    config: &RectifyConfig,
) -> Result<RectifiedStrip, RectifyError> {
    if !quad::is_convex(corners) || quad::signed_area(corners) < config.min_area_px {
        return Err(RectifyError::Degenerate);
    }
    let size = [geometry.width as f64, geometry.height as f64];
    let h = homography_from_rect(size, corners).map_err(RectifyError::Numerical)?;
    if !h.determinant().is_finite() || h.determinant().abs() < 1e-12 {
        return Err(RectifyError::Numerical(HomographyError::NumericalFailure(
            "singular rectifying homography",
        )));
    }

    let image = GrayImage::from_fn(geometry.width, geometry.height, |x, y| {
        let p = project(&h, [x as f64, y as f64]);
        let v = bilinear_sample(gray, p[0], p[1])
            .map(|v| v.round().clamp(0.0, 255.0) as u8)
            .unwrap_or(config.fill);
        Luma([v])
    });
    let win = &geometry.result_window;
    let window = image::imageops::crop_imm(&image, win.x, win.y, win.width, win.height).to_image();
    tracing::trace!(w = geometry.width, h = geometry.height, "rectified strip");

    Ok(RectifiedStrip {
        image,
        window,
        geometry: geometry.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic;

    #[test]
    fn rectify_inverts_a_known_placement() {
        let g = StripGeometry::default();
        let strip = synthetic::render_strip(&g, [true, false, true], 11);
        let h = synthetic::similarity(&g, 1.2, 4.0, [320.0, 240.0]);
        let frame = synthetic::warp_into_frame(&strip, &h, 640, 480, 60);
        let corners = synthetic::ground_truth_corners(&g, &h);

        let r = rectify(&frame, &corners, &g, &RectifyConfig::default()).expect("rectify");
        assert_eq!(r.image.dimensions(), (480, 120));
        assert_eq!(r.window.dimensions(), (140, 60));
        // Interior of the control line and of the empty test A region.
        assert!(r.image.get_pixel(325, 60)[0] < 100);
        assert!(r.image.get_pixel(370, 60)[0] > 200);
        assert_eq!(r.window.get_pixel(25, 30), r.image.get_pixel(325, 60));
    }

    #[test]
    fn mirrored_boundary_is_degenerate() {
        let g = StripGeometry::default();
        let img = GrayImage::new(100, 100);
        let q = [[80.0, 10.0], [10.0, 10.0], [10.0, 40.0], [80.0, 40.0]];
        assert_eq!(
            rectify(&img, &q, &g, &RectifyConfig::default()),
            Err(RectifyError::Degenerate)
        );
    }

    #[test]
    fn tiny_boundary_is_degenerate() {
        let g = StripGeometry::default();
        let img = GrayImage::new(100, 100);
        let q = [[10.0, 10.0], [12.0, 10.0], [12.0, 11.0], [10.0, 11.0]];
        assert_eq!(
            rectify(&img, &q, &g, &RectifyConfig::default()),
            Err(RectifyError::Degenerate)
        );
    }

    #[test]
    fn samples_outside_frame_take_fill() {
        let g = StripGeometry::default();
        let img = GrayImage::from_pixel(100, 50, Luma([200]));
        let q = [[-50.0, 0.0], [99.0, 0.0], [99.0, 49.0], [-50.0, 49.0]];
        let cfg = RectifyConfig {
            fill: 7,
            ..RectifyConfig::default()
        };
        let r = rectify(&img, &q, &g, &cfg).expect("rectify");
        assert_eq!(r.image.get_pixel(0, 60)[0], 7);
        assert_eq!(r.image.get_pixel(470, 60)[0], 200);
    }

    #[test]
    fn rectify_is_deterministic() {
        let g = StripGeometry::default();
        let strip = synthetic::render_strip(&g, [true; 3], 2);
        let h = synthetic::similarity(&g, 0.9, -3.0, [300.0, 200.0]);
        let frame = synthetic::warp_into_frame(&strip, &h, 640, 480, 60);
        let corners = synthetic::ground_truth_corners(&g, &h);
        let a = rectify(&frame, &corners, &g, &RectifyConfig::default()).unwrap();
        let b = rectify(&frame, &corners, &g, &RectifyConfig::default()).unwrap();
        assert_eq!(a, b);
    }
}
