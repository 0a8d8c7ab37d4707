//! Strip localization: feature matching against the reference template and a
//! robust homography fit.

use std::sync::Arc;

use image::GrayImage;

use crate::features::{extract_features, match_descriptors, FeatureConfig, FeatureSet, MatchConfig};
use crate::homography::{
    fit_homography_ransac, matrix3_to_array, project, HomographyError, RansacHomographyConfig,
    RansacStats,
};
use crate::quad::{self, Quad};
use crate::template::ReferenceTemplate;

/// Localizer thresholds.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct LocalizeConfig {
    /// Keypoint detector settings for live frames.
    pub features: FeatureConfig,
    /// Ratio test and distance gate.
    pub matching: MatchConfig,
    /// Robust homography fit.
    pub ransac: RansacHomographyConfig,
    /// Minimum matches surviving the ratio test.
    pub min_matches: usize,
    /// Minimum `inliers / matches`.
    pub min_confidence: f64,
    /// Minimum projected boundary area in frame pixels.
    pub min_area_px: f64,
}

impl Default for LocalizeConfig {
    fn default() -> Self {
        Self {
            features: FeatureConfig {
                max_keypoints: 1000,
                ..FeatureConfig::default()
            },
            matching: MatchConfig::default(),
            ransac: RansacHomographyConfig::default(),
            min_matches: 15,
            min_confidence: 0.3,
            min_area_px: 100.0,
        }
    }
}

/// Located strip boundary in frame coordinates.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct BoundaryEstimate {
    /// Corners ordered top-left, top-right, bottom-right, bottom-left.
    pub corners: Quad,
    /// RANSAC inliers over matches surviving the ratio test, in `[0, 1]`.
    pub confidence: f64,
    /// Rotation of the strip's long axis in degrees, positive clockwise.
    pub angle_deg: f64,
    /// Canonical-to-frame homography (row-major).
    pub homography: [[f64; 3]; 3],
    pub n_matches: usize,
    pub n_inliers: usize,
    pub ransac: RansacStats,
}

/// Why a frame produced no boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum LocateFailure {
    TooFewMatches { found: usize, needed: usize },
    Homography(HomographyError),
    LowConfidence { confidence: f64, needed: f64 },
    DegenerateBoundary,
}

impl std::fmt::Display for LocateFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TooFewMatches { found, needed } => {
                write!(f, "too few matches: {found} < {needed}")
            }
            Self::Homography(e) => write!(f, "homography fit failed: {e}"),
            Self::LowConfidence { confidence, needed } => {
                write!(f, "match confidence {confidence:.3} < {needed:.3}")
            }
            Self::DegenerateBoundary => write!(f, "projected boundary is degenerate"),
        }
    }
}

impl std::error::Error for LocateFailure {}

/// Locates the reference strip in live frames.
#[derive(Debug, Clone)]
pub struct Localizer {
    template: Arc<ReferenceTemplate>,
    config: LocalizeConfig,
}

impl Localizer {
    pub fn new(template: Arc<ReferenceTemplate>, config: LocalizeConfig) -> Self {
        Self { template, config }
    }

    pub fn template(&self) -> &ReferenceTemplate {
        &self.template
    }

    pub fn config(&self) -> &LocalizeConfig {
        &self.config
    }

    /// Boundary of the strip in `gray`, or `None` when no confident match exists.
    pub fn locate(&self, gray: &GrayImage) -> Option<BoundaryEstimate> {
        match self.locate_detailed(gray) {
            Ok(b) => Some(b),
            Err(reason) => {
                tracing::debug!(%reason, "no boundary");
                None
            }
        }
    }

    /// Like [`Localizer::locate`] but reports why localization failed.
    pub fn locate_detailed(&self, gray: &GrayImage) -> Result<BoundaryEstimate, LocateFailure> {
        let features = extract_features(gray, &self.config.features, self.template.pattern());
        self.locate_features(&features)
    }

    /// Localize from already extracted frame features.
    pub fn locate_features(&self, features: &FeatureSet) -> Result<BoundaryEstimate, LocateFailure> {
        let cfg = &self.config;
        let matches = match_descriptors(
            &features.descriptors,
            self.template.descriptors(),
            self.template.keypoint_xy(),
            &cfg.matching,
        );
        tracing::debug!(
            n_keypoints = features.len(),
            n_matches = matches.len(),
            "matched frame features"
        );

        let needed = cfg.min_matches.max(4);
        if matches.len() < needed {
            return Err(LocateFailure::TooFewMatches {
                found: matches.len(),
                needed,
            });
        }

        let txy = self.template.keypoint_xy();
        let src: Vec<[f64; 2]> = matches
            .iter()
            .map(|m| [txy[m.train][0] as f64, txy[m.train][1] as f64])
            .collect();
        let dst: Vec<[f64; 2]> = matches
            .iter()
            .map(|m| {
                let kp = &features.keypoints[m.query];
                [kp.x as f64, kp.y as f64]
            })
            .collect();

        let fit = fit_homography_ransac(&src, &dst, &cfg.ransac).map_err(LocateFailure::Homography)?;
        let confidence = fit.n_inliers as f64 / matches.len() as f64;
        tracing::debug!(n_inliers = fit.n_inliers, confidence, "homography fit");
        if confidence < cfg.min_confidence {
            return Err(LocateFailure::LowConfidence {
                confidence,
                needed: cfg.min_confidence,
            });
        }

        let corners = self.template.canonical_corners().map(|p| project(&fit.h, p));
        if !quad::is_convex(&corners) || quad::signed_area(&corners) < cfg.min_area_px {
            return Err(LocateFailure::DegenerateBoundary);
        }

        Ok(BoundaryEstimate {
            corners,
            confidence,
            angle_deg: quad::rotation_deg(&corners),
            homography: matrix3_to_array(&fit.h),
            n_matches: matches.len(),
            n_inliers: fit.n_inliers,
            ransac: RansacStats::from_result(&fit, cfg.ransac.inlier_threshold),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic;
    use crate::template::{StripGeometry, TemplateBuildConfig};

    fn localizer() -> Localizer {
        let g = StripGeometry::default();
        let strip = synthetic::render_strip(&g, [false; 3], synthetic::DEFAULT_TEXTURE_SEED);
        let t = ReferenceTemplate::build("t", &strip, g, &TemplateBuildConfig::default())
            .expect("template");
        Localizer::new(Arc::new(t), LocalizeConfig::default())
    }

    #[test]
    fn blank_frame_has_too_few_matches() {
        let loc = localizer();
        let frame = GrayImage::from_pixel(320, 240, image::Luma([128]));
        let err = loc.locate_detailed(&frame).expect_err("expected failure");
        assert!(matches!(err, LocateFailure::TooFewMatches { found: 0, .. }));
        assert!(loc.locate(&frame).is_none());
    }

    #[test]
    fn identity_placement_recovers_canonical_corners() {
        let loc = localizer();
        let g = loc.template().geometry().clone();
        let h = synthetic::similarity(&g, 1.0, 0.0, [320.0, 240.0]);
        let frame = synthetic::render_frame(&g, [false; 3], &h, 640, 480);
        let b = loc.locate(&frame).expect("boundary");
        let truth = synthetic::ground_truth_corners(&g, &h);
        for (c, t) in b.corners.iter().zip(&truth) {
            assert!((c[0] - t[0]).abs() < 3.0 && (c[1] - t[1]).abs() < 3.0, "{c:?} vs {t:?}");
        }
        assert!(b.confidence >= 0.3 && b.confidence <= 1.0);
        assert!(b.angle_deg.abs() < 1.0);
        assert!(b.n_inliers <= b.n_matches);
    }
}
