//! Viewfinder edge-density signal, independent of feature matching.

use image::GrayImage;
use imageproc::gradients::sobel_gradients;

/// Viewfinder fiducial check.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct FiducialConfig {
    /// Viewfinder size as `[width, height]` fractions of the frame, centered.
    pub viewfinder: [f64; 2],
    /// Sobel magnitude above which a pixel counts as an edge.
    pub edge_threshold: u16,
    /// Accepted edge-pixel fraction inside the viewfinder.
    pub min_edge_density: f64,
    pub max_edge_density: f64,
}

impl Default for FiducialConfig {
    fn default() -> Self {
        Self {
            viewfinder: [0.8, 0.6],
            edge_threshold: 64,
            min_edge_density: 0.01,
            max_edge_density: 0.6,
        }
    }
}

/// Viewfinder rectangle `(x, y, w, h)` in frame pixels.
pub fn viewfinder_rect(width: u32, height: u32, config: &FiducialConfig) -> (u32, u32, u32, u32) {
    let fw = config.viewfinder[0].clamp(0.0, 1.0);
    let fh = config.viewfinder[1].clamp(0.0, 1.0);
    let w = ((width as f64 * fw).round() as u32).min(width);
    let h = ((height as f64 * fh).round() as u32).min(height);
    ((width - w) / 2, (height - h) / 2, w, h)
}

/// Fraction of viewfinder pixels whose Sobel magnitude exceeds the threshold.
pub fn edge_density(gray: &GrayImage, config: &FiducialConfig) -> f64 {
    let (x, y, w, h) = viewfinder_rect(gray.width(), gray.height(), config);
    if w < 3 || h < 3 {
        return 0.0;
    }
    let crop = image::imageops::crop_imm(gray, x, y, w, h).to_image();
    let grad = sobel_gradients(&crop);
    // Skip the one-pixel border where the kernel sees replicated pixels.
    let mut edges = 0usize;
    for yy in 1..h - 1 {
        for xx in 1..w - 1 {
            if grad.get_pixel(xx, yy)[0] > config.edge_threshold {
                edges += 1;
            }
        }
    }
    edges as f64 / ((w - 2) as f64 * (h - 2) as f64)
}

pub fn is_present(density: f64, config: &FiducialConfig) -> bool {
    density >= config.min_edge_density && density <= config.max_edge_density
}
