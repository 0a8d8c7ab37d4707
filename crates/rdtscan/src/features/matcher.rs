//! Brute-force Hamming matching with a nearest-neighbor ratio test.

use super::Descriptor;

/// Matching thresholds.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct MatchConfig {
    /// Accept a match only when `best < ratio * second_best`.
    pub ratio: f32,
    /// Reject matches with a Hamming distance above this.
    pub max_distance: u32,
    /// Train keypoints closer than this (train coordinates) to the best
    /// candidate are treated as the same physical point and skipped when
    /// looking for the second-best candidate.
    pub duplicate_radius: f32,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            ratio: 0.8,
            max_distance: 80,
            duplicate_radius: 6.0,
        }
    }
}

/// Accepted correspondence between a query and a train descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Match {
    pub query: usize,
    pub train: usize,
    pub distance: u32,
}

/// Match every query descriptor against `train`, keeping only unambiguous
/// nearest neighbors.
///
/// `train_xy` holds the position of each train descriptor and is used to skip
/// near-duplicates of the best candidate in the ratio test. A query whose only
/// candidates are duplicates of the best is compared against the maximum
/// possible distance instead.
pub fn match_descriptors(
    query: &[Descriptor],
    train: &[Descriptor],
    train_xy: &[[f32; 2]],
    config: &MatchConfig,
) -> Vec<Match> {
    debug_assert_eq!(train.len(), train_xy.len());
    let mut out = Vec::new();
    if train.is_empty() {
        return out;
    }
    let dup_r2 = config.duplicate_radius * config.duplicate_radius;

    for (qi, q) in query.iter().enumerate() {
        let mut best = u32::MAX;
        let mut best_idx = 0usize;
        for (ti, t) in train.iter().enumerate() {
            let d = q.distance(t);
            if d < best {
                best = d;
                best_idx = ti;
            }
        }
        if best > config.max_distance {
            continue;
        }

        let anchor = train_xy[best_idx];
        let mut second = super::DESCRIPTOR_BITS as u32;
        for (ti, t) in train.iter().enumerate() {
            if ti == best_idx {
                continue;
            }
            let dx = train_xy[ti][0] - anchor[0];
            let dy = train_xy[ti][1] - anchor[1];
            if dx * dx + dy * dy <= dup_r2 {
                continue;
            }
            second = second.min(q.distance(t));
        }

        if (best as f32) < config.ratio * second as f32 {
            out.push(Match {
                query: qi,
                train: best_idx,
                distance: best,
            });
        }
    }
    out
}
