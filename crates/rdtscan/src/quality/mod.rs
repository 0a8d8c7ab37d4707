//! Per-frame quality battery.
//!
//! Every frame is graded independently on seven axes: size, centering,
//! orientation, sharpness, exposure, shadow and the viewfinder fiducial.
//! Without a boundary the report is `Size = INVALID` and every other axis is
//! left in its neutral state.

mod checks;
pub mod fiducial;

pub use fiducial::FiducialConfig;

use image::GrayImage;

use crate::localize::BoundaryEstimate;
use crate::quad;

/// Boundary size relative to the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SizeResult {
    RightSize,
    Large,
    Small,
    /// No boundary was located.
    Invalid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExposureResult {
    UnderExposed,
    Normal,
    OverExposed,
}

/// Quality axis, used to enumerate failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityAxis {
    Size,
    Centering,
    Orientation,
    Sharpness,
    Exposure,
    Shadow,
    Fiducial,
}

impl QualityAxis {
    pub const ALL: [QualityAxis; 7] = [
        QualityAxis::Size,
        QualityAxis::Centering,
        QualityAxis::Orientation,
        QualityAxis::Sharpness,
        QualityAxis::Exposure,
        QualityAxis::Shadow,
        QualityAxis::Fiducial,
    ];
}

/// Scalar measurements behind the per-axis verdicts.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct QualityMetrics {
    /// Boundary area over frame area.
    pub area_ratio: f64,
    /// Boundary centroid minus frame center, as fractions of frame width/height.
    pub center_offset: [f64; 2],
    /// Every boundary corner lies inside the frame.
    pub boundary_in_frame: bool,
    /// Laplacian variance inside the boundary.
    pub sharpness: f64,
    /// Threshold the sharpness was compared against.
    pub sharpness_threshold: f64,
    pub mean_luminance: f64,
    pub clipped_fraction: f64,
    /// `(max - min) / max` of per-cell bright levels; 1.0 when unmeasurable.
    pub shadow_spread: f64,
    /// Viewfinder edge density.
    pub edge_density: f64,
    /// Ambient brightness reported by the platform, informational only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brightness_hint: Option<f32>,
}

/// Result of grading one frame.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct QualityReport {
    pub size: SizeResult,
    pub centered: bool,
    pub correct_orientation: bool,
    pub sharp: bool,
    pub exposure: ExposureResult,
    pub shadow_free: bool,
    pub fiducial_present: bool,
    /// Measured rotation in degrees (0 when no boundary).
    pub angle_deg: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<QualityMetrics>,
}

impl QualityReport {
    /// Report for a frame without a boundary: `INVALID` size, neutral axes.
    pub fn invalid() -> Self {
        Self {
            size: SizeResult::Invalid,
            centered: false,
            correct_orientation: false,
            sharp: false,
            exposure: ExposureResult::Normal,
            shadow_free: false,
            fiducial_present: false,
            angle_deg: 0.0,
            metrics: None,
        }
    }

    /// Report with every axis in its passing state.
    pub fn all_pass(angle_deg: f64) -> Self {
        Self {
            size: SizeResult::RightSize,
            centered: true,
            correct_orientation: true,
            sharp: true,
            exposure: ExposureResult::Normal,
            shadow_free: true,
            fiducial_present: true,
            angle_deg,
            metrics: None,
        }
    }

    pub fn axis_passed(&self, axis: QualityAxis) -> bool {
        match axis {
            QualityAxis::Size => self.size == SizeResult::RightSize,
            QualityAxis::Centering => self.centered,
            QualityAxis::Orientation => self.correct_orientation,
            QualityAxis::Sharpness => self.sharp,
            QualityAxis::Exposure => self.exposure == ExposureResult::Normal,
            QualityAxis::Shadow => self.shadow_free,
            QualityAxis::Fiducial => self.fiducial_present,
        }
    }

    /// Copy of this report with `axis` forced into a failing state.
    pub fn with_failed(mut self, axis: QualityAxis) -> Self {
        match axis {
            QualityAxis::Size => self.size = SizeResult::Small,
            QualityAxis::Centering => self.centered = false,
            QualityAxis::Orientation => self.correct_orientation = false,
            QualityAxis::Sharpness => self.sharp = false,
            QualityAxis::Exposure => self.exposure = ExposureResult::UnderExposed,
            QualityAxis::Shadow => self.shadow_free = false,
            QualityAxis::Fiducial => self.fiducial_present = false,
        }
        self
    }

    /// The quality gate: every axis passes.
    pub fn all_passed(&self) -> bool {
        QualityAxis::ALL.iter().all(|&a| self.axis_passed(a))
    }

    pub fn failing_axes(&self) -> Vec<QualityAxis> {
        QualityAxis::ALL
            .into_iter()
            .filter(|&a| !self.axis_passed(a))
            .collect()
    }
}

/// Quality thresholds.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    /// Area ratio below this is `SMALL` (the threshold itself is `RIGHT_SIZE`).
    pub min_area_ratio: f64,
    /// Area ratio above this is `LARGE` (the threshold itself is `RIGHT_SIZE`).
    pub max_area_ratio: f64,
    /// Maximum centroid offset per axis, as a fraction of the frame dimension.
    pub center_tolerance: f64,
    /// Maximum absolute rotation in degrees.
    pub max_angle_deg: f64,
    /// Minimum Laplacian variance.
    pub min_sharpness: f64,
    /// Minimum Laplacian variance for frames above `high_res_pixels`.
    pub min_sharpness_high_res: f64,
    pub high_res_pixels: u64,
    /// Mean luminance below this is `UNDER_EXPOSED`.
    pub min_luminance: f64,
    /// Mean luminance above this is `OVER_EXPOSED`.
    pub max_luminance: f64,
    /// Clipped (255) pixel fraction above this is `OVER_EXPOSED`.
    pub max_clipped_fraction: f64,
    /// Shadow grid `[along, across]` the strip.
    pub shadow_grid: [u32; 2],
    /// Samples per cell side.
    pub shadow_samples: u32,
    /// Percentile summarizing each cell.
    pub shadow_percentile: f64,
    /// Maximum accepted bright-level spread.
    pub max_shadow_spread: f64,
    pub fiducial: FiducialConfig,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            min_area_ratio: 0.08,
            max_area_ratio: 0.6,
            center_tolerance: 0.15,
            max_angle_deg: 10.0,
            min_sharpness: 10.0,
            min_sharpness_high_res: 100.0,
            high_res_pixels: 1920 * 1080,
            min_luminance: 70.0,
            max_luminance: 230.0,
            max_clipped_fraction: 0.05,
            shadow_grid: [8, 2],
            shadow_samples: 8,
            shadow_percentile: 0.9,
            max_shadow_spread: 0.35,
            fiducial: FiducialConfig::default(),
        }
    }
}

/// Size class for an area ratio. Both thresholds are inclusive on the
/// `RIGHT_SIZE` side.
pub fn classify_size(area_ratio: f64, config: &QualityConfig) -> SizeResult {
    if !area_ratio.is_finite() {
        SizeResult::Invalid
    } else if area_ratio < config.min_area_ratio {
        SizeResult::Small
    } else if area_ratio > config.max_area_ratio {
        SizeResult::Large
    } else {
        SizeResult::RightSize
    }
}

pub fn classify_exposure(mean: f64, clipped_fraction: f64, config: &QualityConfig) -> ExposureResult {
    if mean < config.min_luminance {
        ExposureResult::UnderExposed
    } else if mean > config.max_luminance || clipped_fraction > config.max_clipped_fraction {
        ExposureResult::OverExposed
    } else {
        ExposureResult::Normal
    }
}

/// Grade one frame. Pure: no state is kept between calls.
pub fn assess(gray: &GrayImage, boundary: Option<&BoundaryEstimate>, config: &QualityConfig) -> QualityReport {
    let Some(boundary) = boundary else {
        return QualityReport::invalid();
    };
    let (w, h) = gray.dimensions();
    let frame_area = w as f64 * h as f64;
    if frame_area <= 0.0 {
        return QualityReport::invalid();
    }
    let q = &boundary.corners;

    let area_ratio = quad::signed_area(q).abs() / frame_area;
    let size = classify_size(area_ratio, config);

    let c = quad::centroid(q);
    let center_offset = [(c[0] - w as f64 * 0.5) / w as f64, (c[1] - h as f64 * 0.5) / h as f64];
    let boundary_in_frame = q
        .iter()
        .all(|p| p[0] >= 0.0 && p[1] >= 0.0 && p[0] <= (w - 1) as f64 && p[1] <= (h - 1) as f64);
    let centered = boundary_in_frame
        && center_offset[0].abs() <= config.center_tolerance
        && center_offset[1].abs() <= config.center_tolerance;

    let angle_deg = boundary.angle_deg;
    let correct_orientation = angle_deg.abs() <= config.max_angle_deg;

    let stats = checks::region_stats(gray, q);
    let sharpness_threshold = if w as u64 * h as u64 > config.high_res_pixels {
        config.min_sharpness_high_res
    } else {
        config.min_sharpness
    };
    let sharp = stats.n > 0 && stats.laplacian_var >= sharpness_threshold;
    let exposure = classify_exposure(stats.mean, stats.clipped_fraction, config);

    let shadow_spread = checks::shadow_spread(
        gray,
        q,
        config.shadow_grid,
        config.shadow_samples,
        config.shadow_percentile,
    )
    .unwrap_or(1.0);
    let shadow_free = shadow_spread <= config.max_shadow_spread;

    let edge_density = fiducial::edge_density(gray, &config.fiducial);
    let fiducial_present = fiducial::is_present(edge_density, &config.fiducial);

    let report = QualityReport {
        size,
        centered,
        correct_orientation,
        sharp,
        exposure,
        shadow_free,
        fiducial_present,
        angle_deg,
        metrics: Some(QualityMetrics {
            area_ratio,
            center_offset,
            boundary_in_frame,
            sharpness: stats.laplacian_var,
            sharpness_threshold,
            mean_luminance: stats.mean,
            clipped_fraction: stats.clipped_fraction,
            shadow_spread,
            edge_density,
            brightness_hint: None,
        }),
    };
    tracing::debug!(
        size = ?report.size,
        area_ratio,
        sharpness = stats.laplacian_var,
        mean = stats.mean,
        shadow_spread,
        edge_density,
        "graded frame"
    );
    report
}
