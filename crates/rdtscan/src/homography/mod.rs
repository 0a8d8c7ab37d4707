//! Homography estimation, projection, and fit statistics.

mod core;

pub use self::core::{
    estimate_homography_dlt, fit_homography_ransac, homography_from_rect, project,
    reprojection_error, HomographyError, RansacHomographyConfig, RansacHomographyResult,
};

use nalgebra::Matrix3;

/// Summary of a RANSAC homography fit, reported with every located boundary.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RansacStats {
    /// Correspondences fed to RANSAC (matches surviving the ratio test).
    pub n_candidates: usize,
    /// Inliers under the final model.
    pub n_inliers: usize,
    /// Inlier threshold in frame pixels.
    pub threshold_px: f64,
    /// Mean reprojection error of inliers (frame pixels).
    pub mean_err_px: f64,
    /// 95th percentile reprojection error of inliers (frame pixels).
    pub p95_err_px: f64,
}

impl RansacStats {
    pub(crate) fn from_result(result: &RansacHomographyResult, threshold_px: f64) -> Self {
        let mut inlier_errors: Vec<f64> = result
            .inlier_mask
            .iter()
            .zip(&result.errors)
            .filter_map(|(&is_inlier, &err)| is_inlier.then_some(err))
            .collect();
        let (mean_err_px, p95_err_px) = mean_and_p95(&mut inlier_errors);
        Self {
            n_candidates: result.errors.len(),
            n_inliers: result.n_inliers,
            threshold_px,
            mean_err_px,
            p95_err_px,
        }
    }
}

pub(crate) fn mean_and_p95(errors: &mut [f64]) -> (f64, f64) {
    if errors.is_empty() {
        return (0.0, 0.0);
    }
    errors.sort_by(|a, b| a.total_cmp(b));
    let mean = errors.iter().sum::<f64>() / errors.len() as f64;
    let idx = ((errors.len() as f64 * 0.95) as usize).min(errors.len() - 1);
    (mean, errors[idx])
}

pub(crate) fn matrix3_to_array(m: &Matrix3<f64>) -> [[f64; 3]; 3] {
    [
        [m[(0, 0)], m[(0, 1)], m[(0, 2)]],
        [m[(1, 0)], m[(1, 1)], m[(1, 2)]],
        [m[(2, 0)], m[(2, 1)], m[(2, 2)]],
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mean_and_p95_handles_empty_and_non_empty_errors() {
        let mut empty = Vec::<f64>::new();
        assert_eq!(mean_and_p95(&mut empty), (0.0, 0.0));

        let mut values = vec![0.4, 0.1, 0.2, 0.3, 0.5];
        let (mean, p95) = mean_and_p95(&mut values);
        assert!((mean - 0.3).abs() < 1e-12);
        assert!((p95 - 0.5).abs() < 1e-12);
    }

    #[test]
    fn matrix_array_conversion_is_row_major() {
        let m = Matrix3::new(1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0);
        let a = matrix3_to_array(&m);
        assert_eq!(a[0], [1.0, 2.0, 3.0]);
        assert_eq!(a[1], [4.0, 5.0, 6.0]);
        assert_eq!(a[2], [7.0, 8.0, 9.0]);
    }
}
