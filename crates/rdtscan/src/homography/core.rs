//! Planar homography estimation: Hartley-normalized DLT and a RANSAC wrapper.
//!
//! Conventions: `src` points live in canonical strip coordinates, `dst`
//! points in frame pixels, and the fitted `H` maps `src -> dst`.

use nalgebra::{DMatrix, Matrix3, Vector3};
use rand::prelude::*;

#[derive(Debug, Clone, PartialEq)]
pub enum HomographyError {
    TooFewPoints { needed: usize, got: usize },
    LengthMismatch { src: usize, dst: usize },
    NumericalFailure(&'static str),
    InsufficientInliers { needed: usize, found: usize },
}

impl std::fmt::Display for HomographyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TooFewPoints { needed, got } => {
                write!(f, "too few correspondences: need {}, got {}", needed, got)
            }
            Self::LengthMismatch { src, dst } => {
                write!(f, "src/dst length mismatch: {} vs {}", src, dst)
            }
            Self::NumericalFailure(msg) => write!(f, "numerical failure: {}", msg),
            Self::InsufficientInliers { needed, found } => {
                write!(f, "insufficient inliers: need {}, found {}", needed, found)
            }
        }
    }
}

impl std::error::Error for HomographyError {}

/// Project a point through `H`. Returns NaNs when the point maps to infinity.
#[inline]
pub fn project(h: &Matrix3<f64>, p: [f64; 2]) -> [f64; 2] {
    let v = h * Vector3::new(p[0], p[1], 1.0);
    if v[2].abs() < 1e-12 {
        return [f64::NAN, f64::NAN];
    }
    [v[0] / v[2], v[1] / v[2]]
}

/// Euclidean distance between `project(H, src)` and `dst`.
#[inline]
pub fn reprojection_error(h: &Matrix3<f64>, src: [f64; 2], dst: [f64; 2]) -> f64 {
    let p = project(h, src);
    let dx = p[0] - dst[0];
    let dy = p[1] - dst[1];
    (dx * dx + dy * dy).sqrt()
}

/// Translate the centroid to the origin and scale the mean radius to sqrt(2).
fn normalize_points(pts: &[[f64; 2]]) -> (Matrix3<f64>, Vec<[f64; 2]>) {
    let n = pts.len() as f64;
    let cx = pts.iter().map(|p| p[0]).sum::<f64>() / n;
    let cy = pts.iter().map(|p| p[1]).sum::<f64>() / n;
    let mean_dist = pts
        .iter()
        .map(|p| ((p[0] - cx).powi(2) + (p[1] - cy).powi(2)).sqrt())
        .sum::<f64>()
        / n;

    let s = if mean_dist > 1e-12 {
        std::f64::consts::SQRT_2 / mean_dist
    } else {
        1.0
    };

    let t = Matrix3::new(s, 0.0, -s * cx, 0.0, s, -s * cy, 0.0, 0.0, 1.0);
    let normalized = pts
        .iter()
        .map(|p| [s * (p[0] - cx), s * (p[1] - cy)])
        .collect();
    (t, normalized)
}

/// Estimate `H` from four or more correspondences with the normalized DLT.
///
/// The null vector is taken as the eigenvector of `AᵀA` with the smallest
/// eigenvalue, which keeps the 9×9 system well-shaped for exactly four points.
pub fn estimate_homography_dlt(
    src: &[[f64; 2]],
    dst: &[[f64; 2]],
) -> Result<Matrix3<f64>, HomographyError> {
    if src.len() != dst.len() {
        return Err(HomographyError::LengthMismatch {
            src: src.len(),
            dst: dst.len(),
        });
    }
    let n = src.len();
    if n < 4 {
        return Err(HomographyError::TooFewPoints { needed: 4, got: n });
    }

    let (t_src, src_n) = normalize_points(src);
    let (t_dst, dst_n) = normalize_points(dst);

    let mut a = DMatrix::<f64>::zeros(2 * n, 9);
    for (i, (s, d)) in src_n.iter().zip(&dst_n).enumerate() {
        let (sx, sy) = (s[0], s[1]);
        let (dx, dy) = (d[0], d[1]);

        a[(2 * i, 3)] = -sx;
        a[(2 * i, 4)] = -sy;
        a[(2 * i, 5)] = -1.0;
        a[(2 * i, 6)] = dy * sx;
        a[(2 * i, 7)] = dy * sy;
        a[(2 * i, 8)] = dy;

        a[(2 * i + 1, 0)] = sx;
        a[(2 * i + 1, 1)] = sy;
        a[(2 * i + 1, 2)] = 1.0;
        a[(2 * i + 1, 6)] = -dx * sx;
        a[(2 * i + 1, 7)] = -dx * sy;
        a[(2 * i + 1, 8)] = -dx;
    }

    let ata = a.transpose() * &a;
    let eig = nalgebra::SymmetricEigen::new(ata);
    let min_idx = eig
        .eigenvalues
        .iter()
        .enumerate()
        .min_by(|x, y| x.1.abs().total_cmp(&y.1.abs()))
        .map(|(i, _)| i)
        .ok_or(HomographyError::NumericalFailure("empty eigen decomposition"))?;
    let v = eig.eigenvectors.column(min_idx);
    let h_norm = Matrix3::new(v[0], v[1], v[2], v[3], v[4], v[5], v[6], v[7], v[8]);

    let t_dst_inv = t_dst
        .try_inverse()
        .ok_or(HomographyError::NumericalFailure("destination normalization is singular"))?;
    let h = t_dst_inv * h_norm * t_src;

    if h.iter().any(|x| !x.is_finite()) {
        return Err(HomographyError::NumericalFailure("non-finite homography"));
    }
    let scale = h[(2, 2)];
    if scale.abs() < 1e-12 {
        Ok(h)
    } else {
        Ok(h / scale)
    }
}

/// Homography mapping the axis-aligned rectangle `[0, w] x [0, h]` onto `quad`
/// (corners ordered top-left, top-right, bottom-right, bottom-left).
pub fn homography_from_rect(
    size: [f64; 2],
    quad: &[[f64; 2]; 4],
) -> Result<Matrix3<f64>, HomographyError> {
    let rect = [[0.0, 0.0], [size[0], 0.0], [size[0], size[1]], [0.0, size[1]]];
    estimate_homography_dlt(&rect, quad)
}

/// RANSAC configuration for homography fitting.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct RansacHomographyConfig {
    /// Maximum number of minimal-sample iterations.
    pub max_iters: usize,
    /// Inlier threshold on reprojection error, in frame pixels.
    pub inlier_threshold: f64,
    /// Minimum inlier count for an accepted model.
    pub min_inliers: usize,
    /// Seed for the sampling RNG. Fixed so a frame always grades the same way.
    pub seed: u64,
}

impl Default for RansacHomographyConfig {
    fn default() -> Self {
        Self {
            max_iters: 1000,
            inlier_threshold: 3.0,
            min_inliers: 12,
            seed: 0,
        }
    }
}

/// Result of RANSAC homography fitting.
#[derive(Debug, Clone)]
pub struct RansacHomographyResult {
    /// Refitted homography (all inliers).
    pub h: Matrix3<f64>,
    /// Per-correspondence inlier flag under the refitted model.
    pub inlier_mask: Vec<bool>,
    /// Number of inliers under the refitted model.
    pub n_inliers: usize,
    /// Per-correspondence reprojection error under the refitted model.
    pub errors: Vec<f64>,
}

fn sample_indices<R: Rng>(rng: &mut R, n: usize, out: &mut [usize; 4]) {
    let mut filled = 0;
    while filled < 4 {
        let idx = rng.gen_range(0..n);
        if !out[..filled].contains(&idx) {
            out[filled] = idx;
            filled += 1;
        }
    }
}

/// Minimal samples with three (near-)collinear points give a rank-deficient DLT.
fn sample_is_degenerate(pts: &[[f64; 2]; 4]) -> bool {
    const MIN_TWICE_AREA: f64 = 1e-3;
    for i in 0..4 {
        for j in (i + 1)..4 {
            for k in (j + 1)..4 {
                let (a, b, c) = (pts[i], pts[j], pts[k]);
                let cross = (b[0] - a[0]) * (c[1] - a[1]) - (b[1] - a[1]) * (c[0] - a[0]);
                if cross.abs() < MIN_TWICE_AREA {
                    return true;
                }
            }
        }
    }
    false
}

fn score_model(
    h: &Matrix3<f64>,
    src: &[[f64; 2]],
    dst: &[[f64; 2]],
    threshold: f64,
) -> (usize, Vec<bool>) {
    let mut mask = vec![false; src.len()];
    let mut count = 0usize;
    for (i, (&s, &d)) in src.iter().zip(dst).enumerate() {
        let err = reprojection_error(h, s, d);
        if err < threshold {
            mask[i] = true;
            count += 1;
        }
    }
    (count, mask)
}

/// Fit `H: src -> dst` robustly.
///
/// Samples 4-point subsets, keeps the model with the most inliers, then
/// refits on the full inlier set and recomputes the mask.
pub fn fit_homography_ransac(
    src: &[[f64; 2]],
    dst: &[[f64; 2]],
    config: &RansacHomographyConfig,
) -> Result<RansacHomographyResult, HomographyError> {
    if src.len() != dst.len() {
        return Err(HomographyError::LengthMismatch {
            src: src.len(),
            dst: dst.len(),
        });
    }
    let n = src.len();
    if n < 4 {
        return Err(HomographyError::TooFewPoints { needed: 4, got: n });
    }

    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut best_inliers = 0usize;
    let mut best_mask = vec![false; n];
    let mut best_h: Option<Matrix3<f64>> = None;
    let mut idx = [0usize; 4];

    for _ in 0..config.max_iters {
        sample_indices(&mut rng, n, &mut idx);
        let s4 = idx.map(|i| src[i]);
        let d4 = idx.map(|i| dst[i]);
        if sample_is_degenerate(&s4) || sample_is_degenerate(&d4) {
            continue;
        }

        let Ok(h) = estimate_homography_dlt(&s4, &d4) else {
            continue;
        };

        let (count, mask) = score_model(&h, src, dst, config.inlier_threshold);
        if count > best_inliers {
            best_inliers = count;
            best_mask = mask;
            best_h = Some(h);

            if best_inliers * 10 > n * 9 {
                break;
            }
        }
    }

    let Some(best_h) = best_h else {
        return Err(HomographyError::InsufficientInliers {
            needed: config.min_inliers,
            found: 0,
        });
    };
    if best_inliers < config.min_inliers.max(4) {
        return Err(HomographyError::InsufficientInliers {
            needed: config.min_inliers,
            found: best_inliers,
        });
    }

    let inlier_src: Vec<[f64; 2]> = (0..n).filter(|&i| best_mask[i]).map(|i| src[i]).collect();
    let inlier_dst: Vec<[f64; 2]> = (0..n).filter(|&i| best_mask[i]).map(|i| dst[i]).collect();
    let h_refit = estimate_homography_dlt(&inlier_src, &inlier_dst).unwrap_or(best_h);

    let errors: Vec<f64> = src
        .iter()
        .zip(dst)
        .map(|(&s, &d)| reprojection_error(&h_refit, s, d))
        .collect();
    let inlier_mask: Vec<bool> = errors
        .iter()
        .map(|&e| e < config.inlier_threshold)
        .collect();
    let n_inliers = inlier_mask.iter().filter(|&&m| m).count();

    // The refit can drift on a marginal inlier set; keep whichever model
    // explains more correspondences.
    if n_inliers < best_inliers {
        let errors: Vec<f64> = src
            .iter()
            .zip(dst)
            .map(|(&s, &d)| reprojection_error(&best_h, s, d))
            .collect();
        return Ok(RansacHomographyResult {
            h: best_h,
            inlier_mask: best_mask,
            n_inliers: best_inliers,
            errors,
        });
    }

    Ok(RansacHomographyResult {
        h: h_refit,
        inlier_mask,
        n_inliers,
        errors,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn tilted_homography() -> Matrix3<f64> {
        Matrix3::new(
            1.1, 0.05, 80.0, //
            -0.03, 1.05, 140.0, //
            0.0002, -0.0001, 1.0,
        )
    }

    #[test]
    fn dlt_recovers_exact_four_point_mapping() {
        let h_true = tilted_homography();
        let src = [[0.0, 0.0], [480.0, 0.0], [480.0, 120.0], [0.0, 120.0]];
        let dst: Vec<[f64; 2]> = src.iter().map(|&s| project(&h_true, s)).collect();

        let h = estimate_homography_dlt(&src, &dst).unwrap();
        for (&s, &d) in src.iter().zip(&dst) {
            assert!(reprojection_error(&h, s, d) < 1e-6);
        }
    }

    #[test]
    fn rect_homography_maps_corners_onto_quad() {
        let quad = [[10.0, 20.0], [300.0, 35.0], [290.0, 110.0], [15.0, 95.0]];
        let h = homography_from_rect([480.0, 120.0], &quad).unwrap();
        let p = project(&h, [480.0, 120.0]);
        assert_relative_eq!(p[0], 290.0, epsilon = 1e-6);
        assert_relative_eq!(p[1], 110.0, epsilon = 1e-6);
    }

    #[test]
    fn ransac_rejects_gross_outliers() {
        let h_true = tilted_homography();
        let mut rng = StdRng::seed_from_u64(7);
        let mut src = Vec::new();
        let mut dst = Vec::new();
        for i in 0..40 {
            let s = [(i % 8) as f64 * 60.0, (i / 8) as f64 * 30.0];
            let d = project(&h_true, s);
            src.push(s);
            dst.push([
                d[0] + rng.gen_range(-0.4..0.4),
                d[1] + rng.gen_range(-0.4..0.4),
            ]);
        }
        for _ in 0..15 {
            src.push([rng.gen_range(0.0..480.0), rng.gen_range(0.0..120.0)]);
            dst.push([rng.gen_range(0.0..640.0), rng.gen_range(0.0..480.0)]);
        }

        let result = fit_homography_ransac(&src, &dst, &RansacHomographyConfig::default()).unwrap();
        assert!(result.n_inliers >= 38, "only {} inliers", result.n_inliers);
        for i in 0..40 {
            assert!(reprojection_error(&result.h, src[i], dst[i]) < 2.0);
        }
    }

    #[test]
    fn ransac_fails_on_pure_noise() {
        let mut rng = StdRng::seed_from_u64(3);
        let src: Vec<[f64; 2]> = (0..30)
            .map(|_| [rng.gen_range(0.0..480.0), rng.gen_range(0.0..120.0)])
            .collect();
        let dst: Vec<[f64; 2]> = (0..30)
            .map(|_| [rng.gen_range(0.0..640.0), rng.gen_range(0.0..480.0)])
            .collect();
        let err = fit_homography_ransac(&src, &dst, &RansacHomographyConfig::default()).unwrap_err();
        assert!(matches!(err, HomographyError::InsufficientInliers { .. }));
    }

    #[test]
    fn too_few_points_is_an_error() {
        let pts = [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0]];
        assert_eq!(
            estimate_homography_dlt(&pts, &pts).unwrap_err(),
            HomographyError::TooFewPoints { needed: 4, got: 3 }
        );
    }
}
