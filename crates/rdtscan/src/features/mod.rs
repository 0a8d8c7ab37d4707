//! Keypoint detection, steered binary descriptors, and descriptor matching.
//!
//! Keypoints are FAST-9 corners thinned by radius suppression and capped to
//! the strongest `max_keypoints`. Each keypoint gets an intensity-centroid
//! orientation and a 256-bit descriptor sampled on a Gaussian-smoothed copy
//! of the image with the pair pattern rotated by that orientation.

mod brief;
mod matcher;

pub use brief::{BriefPattern, Descriptor, DescriptorParams, DESCRIPTOR_BITS};
pub use matcher::{match_descriptors, Match, MatchConfig};

use image::GrayImage;
use imageproc::corners::{corners_fast9, Corner};
use imageproc::filter::gaussian_blur_f32;

/// Detected keypoint in image pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Keypoint {
    pub x: f32,
    pub y: f32,
    /// Orientation in radians.
    pub angle: f32,
    /// FAST corner score.
    pub score: f32,
}

/// Keypoint detector settings.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    /// FAST intensity threshold.
    pub fast_threshold: u8,
    /// Keep at most this many keypoints (strongest first).
    pub max_keypoints: usize,
    /// Suppression radius in pixels; weaker corners closer than this to an
    /// accepted corner are discarded.
    pub nms_radius: f32,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            fast_threshold: 20,
            max_keypoints: 1500,
            nms_radius: 3.0,
        }
    }
}

/// Keypoints with their descriptors, index-aligned.
#[derive(Debug, Clone, Default)]
pub struct FeatureSet {
    pub keypoints: Vec<Keypoint>,
    pub descriptors: Vec<Descriptor>,
}

impl FeatureSet {
    pub fn len(&self) -> usize {
        self.keypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keypoints.is_empty()
    }
}

/// FAST-9 corners at least `margin` pixels from the border, thinned by radius
/// suppression and capped to `config.max_keypoints`.
///
/// Output order is deterministic: descending score, ties broken by position.
pub fn detect_corners(gray: &GrayImage, config: &FeatureConfig, margin: u32) -> Vec<Corner> {
    let (w, h) = gray.dimensions();
    if w <= 2 * margin || h <= 2 * margin {
        return Vec::new();
    }
    let mut corners: Vec<Corner> = corners_fast9(gray, config.fast_threshold)
        .into_iter()
        .filter(|c| c.x >= margin && c.y >= margin && c.x < w - margin && c.y < h - margin)
        .collect();
    corners.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then(a.y.cmp(&b.y))
            .then(a.x.cmp(&b.x))
    });
    suppress_by_radius(corners, config.nms_radius, config.max_keypoints, w, h)
}

fn suppress_by_radius(
    sorted: Vec<Corner>,
    radius: f32,
    max_keep: usize,
    w: u32,
    h: u32,
) -> Vec<Corner> {
    if radius <= 0.0 {
        return sorted.into_iter().take(max_keep).collect();
    }
    let cell = radius.ceil().max(1.0) as u32;
    let gw = (w / cell + 1) as usize;
    let gh = (h / cell + 1) as usize;
    let mut grid: Vec<Vec<usize>> = vec![Vec::new(); gw * gh];
    let mut kept: Vec<Corner> = Vec::new();
    let r2 = radius * radius;

    for c in sorted {
        if kept.len() >= max_keep {
            break;
        }
        let gx = (c.x / cell) as usize;
        let gy = (c.y / cell) as usize;
        let mut blocked = false;
        'scan: for ny in gy.saturating_sub(1)..=(gy + 1).min(gh - 1) {
            for nx in gx.saturating_sub(1)..=(gx + 1).min(gw - 1) {
                for &k in &grid[ny * gw + nx] {
                    let other = &kept[k];
                    let dx = other.x as f32 - c.x as f32;
                    let dy = other.y as f32 - c.y as f32;
                    if dx * dx + dy * dy < r2 {
                        blocked = true;
                        break 'scan;
                    }
                }
            }
        }
        if !blocked {
            grid[gy * gw + gx].push(kept.len());
            kept.push(c);
        }
    }
    kept
}

/// Smoothed copy of `gray` used for orientation and pair tests.
pub fn smooth_for_descriptors(gray: &GrayImage, params: &DescriptorParams) -> GrayImage {
    if params.blur_sigma > 0.0 {
        gaussian_blur_f32(gray, params.blur_sigma)
    } else {
        gray.clone()
    }
}

/// Detect keypoints and compute their descriptors.
pub fn extract_features(gray: &GrayImage, config: &FeatureConfig, pattern: &BriefPattern) -> FeatureSet {
    let corners = detect_corners(gray, config, pattern.margin());
    if corners.is_empty() {
        return FeatureSet::default();
    }
    let smoothed = smooth_for_descriptors(gray, pattern.params());

    let mut set = FeatureSet {
        keypoints: Vec::with_capacity(corners.len()),
        descriptors: Vec::with_capacity(corners.len()),
    };
    for c in corners {
        let angle = pattern.orientation(&smoothed, c.x, c.y);
        set.descriptors
            .push(pattern.describe(&smoothed, c.x, c.y, angle));
        set.keypoints.push(Keypoint {
            x: c.x as f32,
            y: c.y as f32,
            angle,
            score: c.score,
        });
    }
    tracing::trace!(n = set.len(), "extracted features");
    set
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    /// Bright squares on a dark background; every square corner is a FAST corner.
    fn squares(w: u32, h: u32) -> GrayImage {
        GrayImage::from_fn(w, h, |x, y| {
            let on = x % 24 < 10 && y % 24 < 10;
            Luma([if on { 220 } else { 30 }])
        })
    }

    #[test]
    fn flat_image_has_no_features() {
        let img = GrayImage::from_pixel(96, 96, Luma([128]));
        let pattern = BriefPattern::new(DescriptorParams::default());
        let set = extract_features(&img, &FeatureConfig::default(), &pattern);
        assert!(set.is_empty());
    }

    #[test]
    fn corners_respect_margin_and_cap() {
        let img = squares(128, 128);
        let config = FeatureConfig {
            max_keypoints: 10,
            ..FeatureConfig::default()
        };
        let corners = detect_corners(&img, &config, 15);
        assert!(corners.len() <= 10);
        assert!(!corners.is_empty());
        for c in &corners {
            assert!(c.x >= 15 && c.y >= 15 && c.x < 113 && c.y < 113);
        }
    }

    #[test]
    fn suppression_keeps_corners_apart() {
        let img = squares(128, 128);
        let config = FeatureConfig {
            nms_radius: 5.0,
            ..FeatureConfig::default()
        };
        let corners = detect_corners(&img, &config, 4);
        for (i, a) in corners.iter().enumerate() {
            for b in &corners[i + 1..] {
                let dx = a.x as f32 - b.x as f32;
                let dy = a.y as f32 - b.y as f32;
                assert!(dx * dx + dy * dy >= 25.0);
            }
        }
    }

    #[test]
    fn descriptors_align_with_keypoints() {
        let img = squares(128, 128);
        let pattern = BriefPattern::new(DescriptorParams::default());
        let set = extract_features(&img, &FeatureConfig::default(), &pattern);
        assert_eq!(set.keypoints.len(), set.descriptors.len());
        assert!(!set.is_empty());
    }
}
