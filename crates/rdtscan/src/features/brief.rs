//! Steered binary descriptors (BRIEF pair tests rotated by the keypoint angle).

use image::GrayImage;
use rand::prelude::*;

/// Number of pair tests per descriptor.
pub const DESCRIPTOR_BITS: usize = 256;

/// 256-bit binary descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub struct Descriptor(pub [u64; 4]);

impl Descriptor {
    /// Hamming distance.
    #[inline]
    pub fn distance(&self, other: &Descriptor) -> u32 {
        self.0
            .iter()
            .zip(&other.0)
            .map(|(a, b)| (a ^ b).count_ones())
            .sum()
    }
}

/// Parameters that must be identical between template and live frames.
///
/// They travel inside the template file so a frame is always described with
/// the pattern its template was built with.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct DescriptorParams {
    /// Seed of the pair-test sampling pattern.
    pub pattern_seed: u64,
    /// Radius (pixels) of the disc the pair tests are drawn from.
    pub pattern_radius: u32,
    /// Radius (pixels) of the intensity-centroid orientation window.
    pub orientation_radius: u32,
    /// Gaussian sigma applied before pair tests.
    pub blur_sigma: f32,
    /// Skip orientation estimation and describe every keypoint at angle 0.
    pub upright: bool,
}

impl Default for DescriptorParams {
    fn default() -> Self {
        Self {
            pattern_seed: 0x0007_2d75_ca11,
            pattern_radius: 13,
            orientation_radius: 12,
            blur_sigma: 2.0,
            upright: false,
        }
    }
}

/// Sampling pattern of `DESCRIPTOR_BITS` point pairs inside a disc.
#[derive(Debug, Clone)]
pub struct BriefPattern {
    params: DescriptorParams,
    /// `[x1, y1, x2, y2]` offsets relative to the keypoint.
    pairs: Vec<[f32; 4]>,
}

impl BriefPattern {
    pub fn new(params: DescriptorParams) -> Self {
        let mut rng = StdRng::seed_from_u64(params.pattern_seed);
        let r = params.pattern_radius.max(1) as f32;
        let mut point = || loop {
            let x = rng.gen_range(-r..=r);
            let y = rng.gen_range(-r..=r);
            if x * x + y * y <= r * r {
                return [x, y];
            }
        };
        let pairs = (0..DESCRIPTOR_BITS)
            .map(|_| {
                let a = point();
                let b = point();
                [a[0], a[1], b[0], b[1]]
            })
            .collect();
        Self { params, pairs }
    }

    pub fn params(&self) -> &DescriptorParams {
        &self.params
    }

    /// Minimum distance from the image border for a describable keypoint.
    pub fn margin(&self) -> u32 {
        self.params.pattern_radius.max(self.params.orientation_radius) + 2
    }

    /// Intensity-centroid orientation (radians) of the patch around `(x, y)`.
    pub fn orientation(&self, smoothed: &GrayImage, x: u32, y: u32) -> f32 {
        if self.params.upright {
            return 0.0;
        }
        let r = self.params.orientation_radius as i64;
        let (w, h) = smoothed.dimensions();
        let raw = smoothed.as_raw();
        let stride = w as usize;
        let mut m10 = 0.0f64;
        let mut m01 = 0.0f64;
        for dy in -r..=r {
            let yy = y as i64 + dy;
            if yy < 0 || yy >= h as i64 {
                continue;
            }
            for dx in -r..=r {
                if dx * dx + dy * dy > r * r {
                    continue;
                }
                let xx = x as i64 + dx;
                if xx < 0 || xx >= w as i64 {
                    continue;
                }
                let v = raw[yy as usize * stride + xx as usize] as f64;
                m10 += dx as f64 * v;
                m01 += dy as f64 * v;
            }
        }
        m01.atan2(m10) as f32
    }

    /// Binary descriptor of the keypoint at `(x, y)`, pattern rotated by `angle`.
    pub fn describe(&self, smoothed: &GrayImage, x: u32, y: u32, angle: f32) -> Descriptor {
        let (w, h) = smoothed.dimensions();
        let raw = smoothed.as_raw();
        let stride = w as usize;
        let (s, c) = angle.sin_cos();
        let fetch = |ox: f32, oy: f32| -> u8 {
            let rx = c * ox - s * oy;
            let ry = s * ox + c * oy;
            let xx = (x as f32 + rx).round().clamp(0.0, (w - 1) as f32) as usize;
            let yy = (y as f32 + ry).round().clamp(0.0, (h - 1) as f32) as usize;
            raw[yy * stride + xx]
        };

        let mut bits = [0u64; 4];
        for (i, p) in self.pairs.iter().enumerate() {
            if fetch(p[0], p[1]) < fetch(p[2], p[3]) {
                bits[i / 64] |= 1u64 << (i % 64);
            }
        }
        Descriptor(bits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn blobs() -> GrayImage {
        GrayImage::from_fn(64, 64, |x, y| {
            let v = ((x / 6) * 37 + (y / 5) * 91) % 200;
            Luma([(v + 30) as u8])
        })
    }

    #[test]
    fn pattern_is_deterministic_per_seed() {
        let a = BriefPattern::new(DescriptorParams::default());
        let b = BriefPattern::new(DescriptorParams::default());
        assert_eq!(a.pairs, b.pairs);

        let c = BriefPattern::new(DescriptorParams {
            pattern_seed: 1,
            ..DescriptorParams::default()
        });
        assert_ne!(a.pairs, c.pairs);
    }

    #[test]
    fn hamming_distance_counts_differing_bits() {
        let a = Descriptor([0b1011, 0, 0, u64::MAX]);
        let b = Descriptor([0b0001, 0, 0, 0]);
        assert_eq!(a.distance(&b), 2 + 64);
        assert_eq!(a.distance(&a), 0);
    }

    #[test]
    fn orientation_points_toward_bright_side() {
        let img = GrayImage::from_fn(41, 41, |x, _| Luma([if x > 20 { 200 } else { 20 }]));
        let pattern = BriefPattern::new(DescriptorParams::default());
        let angle = pattern.orientation(&img, 20, 20);
        assert!(angle.abs() < 1e-3, "angle {}", angle);
    }

    #[test]
    fn describing_the_same_patch_twice_is_identical() {
        let img = blobs();
        let pattern = BriefPattern::new(DescriptorParams::default());
        let a = pattern.describe(&img, 32, 32, 0.3);
        let b = pattern.describe(&img, 32, 32, 0.3);
        assert_eq!(a, b);
        assert_ne!(a, Descriptor::default());
    }
}
