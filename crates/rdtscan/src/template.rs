//! Reference template: canonical strip geometry plus precomputed features.
//!
//! Template JSON follows the `rdtscan.template.v1` schema. Keypoint
//! coordinates are stored in canonical strip pixels (pixel centers on integer
//! coordinates) regardless of the pyramid level they were detected on.

use std::path::Path;

use image::imageops::{self, FilterType};
use image::GrayImage;

use crate::features::{extract_features, BriefPattern, Descriptor, DescriptorParams, FeatureConfig};
use crate::quad::Quad;

const TEMPLATE_SCHEMA_V1: &str = "rdtscan.template.v1";

/// Errors from building, loading or validating a reference template.
#[derive(Debug)]
pub enum TemplateError {
    Io(std::io::Error),
    Json(serde_json::Error),
    UnsupportedSchema { found: String },
    InvalidGeometry(String),
    ImageSizeMismatch { expected: [u32; 2], got: [u32; 2] },
    NoFeatures,
    Inconsistent(String),
}

impl std::fmt::Display for TemplateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "template io error: {e}"),
            Self::Json(e) => write!(f, "template json error: {e}"),
            Self::UnsupportedSchema { found } => write!(
                f,
                "unsupported template schema '{found}' (expected '{TEMPLATE_SCHEMA_V1}')"
            ),
            Self::InvalidGeometry(msg) => write!(f, "invalid strip geometry: {msg}"),
            Self::ImageSizeMismatch { expected, got } => write!(
                f,
                "canonical image is {}x{}, geometry expects {}x{}",
                got[0], got[1], expected[0], expected[1]
            ),
            Self::NoFeatures => write!(f, "canonical image produced no usable features"),
            Self::Inconsistent(msg) => write!(f, "inconsistent template: {msg}"),
        }
    }
}

impl std::error::Error for TemplateError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for TemplateError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<serde_json::Error> for TemplateError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e)
    }
}

/// Axis-aligned result window in canonical pixels.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ResultWindow {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// One expected line position in canonical pixels.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct LineRegion {
    /// Line center along the strip's long axis.
    pub center_x: f64,
    /// Half of the expected line width.
    pub half_width: f64,
    /// Vertical span `[y_min, y_max]` the line covers.
    pub y_span: [f64; 2],
}

/// Canonical strip layout: strip size, result window and line regions.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct StripGeometry {
    pub width: u32,
    pub height: u32,
    pub result_window: ResultWindow,
    pub control: LineRegion,
    pub test_a: LineRegion,
    pub test_b: LineRegion,
}

impl Default for StripGeometry {
    fn default() -> Self {
        let line = |center_x| LineRegion {
            center_x,
            half_width: 6.0,
            y_span: [30.0, 90.0],
        };
        Self {
            width: 480,
            height: 120,
            result_window: ResultWindow {
                x: 300,
                y: 30,
                width: 140,
                height: 60,
            },
            control: line(325.0),
            test_a: line(370.0),
            test_b: line(415.0),
        }
    }
}

impl StripGeometry {
    /// Line regions in decode order: control, test A, test B.
    pub fn lines(&self) -> [&LineRegion; 3] {
        [&self.control, &self.test_a, &self.test_b]
    }

    /// Canonical rectangle corners: TL, TR, BR, BL.
    pub fn canonical_corners(&self) -> Quad {
        let (w, h) = (self.width as f64, self.height as f64);
        [[0.0, 0.0], [w, 0.0], [w, h], [0.0, h]]
    }

    pub fn validate(&self) -> Result<(), TemplateError> {
        let bad = |msg: String| Err(TemplateError::InvalidGeometry(msg));
        if self.width == 0 || self.height == 0 {
            return bad("strip width and height must be > 0".to_string());
        }
        let win = &self.result_window;
        if win.width == 0 || win.height == 0 {
            return bad("result window must be non-empty".to_string());
        }
        if win.x as u64 + win.width as u64 > self.width as u64
            || win.y as u64 + win.height as u64 > self.height as u64
        {
            return bad("result window must lie inside the strip".to_string());
        }
        let (wx0, wx1) = (win.x as f64, (win.x + win.width) as f64);
        let (wy0, wy1) = (win.y as f64, (win.y + win.height) as f64);
        for (name, line) in ["control", "test_a", "test_b"].iter().zip(self.lines()) {
            if !line.half_width.is_finite() || line.half_width <= 0.0 {
                return bad(format!("{name}: half_width must be finite and > 0"));
            }
            if !line.center_x.is_finite()
                || line.center_x - line.half_width < wx0
                || line.center_x + line.half_width > wx1
            {
                return bad(format!("{name}: line region must lie inside the result window"));
            }
            let [y0, y1] = line.y_span;
            if !(y0 < y1) || y0 < wy0 || y1 > wy1 {
                return bad(format!("{name}: y_span must be increasing and inside the result window"));
            }
        }
        Ok(())
    }
}

/// Template build settings.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct TemplateBuildConfig {
    /// Pyramid scales of the canonical image used for feature extraction.
    pub scales: Vec<f64>,
    /// Per-scale keypoint detector settings.
    pub features: FeatureConfig,
    pub descriptor: DescriptorParams,
}

impl Default for TemplateBuildConfig {
    fn default() -> Self {
        Self {
            scales: vec![0.5, 0.6, 0.7, 0.85, 1.0, 1.2, 1.45, 1.75, 2.0],
            features: FeatureConfig {
                max_keypoints: 400,
                ..FeatureConfig::default()
            },
            descriptor: DescriptorParams::default(),
        }
    }
}

/// Template keypoint in canonical strip pixels.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TemplateKeypoint {
    pub x: f32,
    pub y: f32,
    /// Pyramid scale the keypoint was detected at.
    pub scale: f32,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct TemplateSpecV1 {
    schema: String,
    name: String,
    geometry: StripGeometry,
    descriptor: DescriptorParams,
    scales: Vec<f64>,
    keypoints: Vec<TemplateKeypoint>,
    descriptors: Vec<Descriptor>,
}

/// Immutable reference template shared by every frame.
#[derive(Debug, Clone)]
pub struct ReferenceTemplate {
    name: String,
    geometry: StripGeometry,
    scales: Vec<f64>,
    keypoints: Vec<TemplateKeypoint>,
    descriptors: Vec<Descriptor>,
    pattern: BriefPattern,
    /// Keypoint positions, index-aligned with `descriptors`.
    xy: Vec<[f32; 2]>,
}

impl ReferenceTemplate {
    /// Build a template from a canonical strip image whose pixel grid is the
    /// canonical coordinate frame.
    pub fn build(
        name: &str,
        canonical: &GrayImage,
        geometry: StripGeometry,
        config: &TemplateBuildConfig,
    ) -> Result<Self, TemplateError> {
        geometry.validate()?;
        let got = [canonical.width(), canonical.height()];
        let expected = [geometry.width, geometry.height];
        if got != expected {
            return Err(TemplateError::ImageSizeMismatch { expected, got });
        }

        let pattern = BriefPattern::new(config.descriptor);
        let min_side = 2 * pattern.margin() + 1;
        let mut keypoints = Vec::new();
        let mut descriptors = Vec::new();

        for &scale in &config.scales {
            if !scale.is_finite() || scale <= 0.0 {
                continue;
            }
            let sw = (geometry.width as f64 * scale).round() as u32;
            let sh = (geometry.height as f64 * scale).round() as u32;
            if sw < min_side || sh < min_side {
                tracing::debug!(scale, sw, sh, "skipping pyramid level smaller than descriptor patch");
                continue;
            }
            let level = if sw == geometry.width && sh == geometry.height {
                canonical.clone()
            } else {
                imageops::resize(canonical, sw, sh, FilterType::Triangle)
            };
            let fx = geometry.width as f32 / sw as f32;
            let fy = geometry.height as f32 / sh as f32;

            let set = extract_features(&level, &config.features, &pattern);
            tracing::debug!(scale, n = set.len(), "template pyramid level");
            for (kp, desc) in set.keypoints.iter().zip(set.descriptors) {
                keypoints.push(TemplateKeypoint {
                    x: (kp.x + 0.5) * fx - 0.5,
                    y: (kp.y + 0.5) * fy - 0.5,
                    scale: scale as f32,
                });
                descriptors.push(desc);
            }
        }

        if keypoints.len() < 4 {
            return Err(TemplateError::NoFeatures);
        }
        tracing::info!(name, n_keypoints = keypoints.len(), "built reference template");
        Ok(Self::assemble(
            name.to_string(),
            geometry,
            config.scales.clone(),
            keypoints,
            descriptors,
            pattern,
        ))
    }

    fn assemble(
        name: String,
        geometry: StripGeometry,
        scales: Vec<f64>,
        keypoints: Vec<TemplateKeypoint>,
        descriptors: Vec<Descriptor>,
        pattern: BriefPattern,
    ) -> Self {
        let xy = keypoints.iter().map(|k| [k.x, k.y]).collect();
        Self {
            name,
            geometry,
            scales,
            keypoints,
            descriptors,
            pattern,
            xy,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn geometry(&self) -> &StripGeometry {
        &self.geometry
    }

    pub fn scales(&self) -> &[f64] {
        &self.scales
    }

    pub fn keypoints(&self) -> &[TemplateKeypoint] {
        &self.keypoints
    }

    pub fn descriptors(&self) -> &[Descriptor] {
        &self.descriptors
    }

    /// Keypoint positions in canonical pixels, index-aligned with `descriptors()`.
    pub fn keypoint_xy(&self) -> &[[f32; 2]] {
        &self.xy
    }

    /// Descriptor pattern live frames must be described with.
    pub fn pattern(&self) -> &BriefPattern {
        &self.pattern
    }

    pub fn n_keypoints(&self) -> usize {
        self.keypoints.len()
    }

    /// Canonical rectangle corners: TL, TR, BR, BL.
    pub fn canonical_corners(&self) -> Quad {
        self.geometry.canonical_corners()
    }

    pub fn to_json_string(&self) -> Result<String, TemplateError> {
        let spec = TemplateSpecV1 {
            schema: TEMPLATE_SCHEMA_V1.to_string(),
            name: self.name.clone(),
            geometry: self.geometry.clone(),
            descriptor: *self.pattern.params(),
            scales: self.scales.clone(),
            keypoints: self.keypoints.clone(),
            descriptors: self.descriptors.clone(),
        };
        Ok(serde_json::to_string(&spec)?)
    }

    pub fn from_json_str(data: &str) -> Result<Self, TemplateError> {
        let spec: TemplateSpecV1 = serde_json::from_str(data)?;
        Self::from_spec(spec)
    }

    /// Write the template as JSON.
    pub fn to_json_file(&self, path: &Path) -> Result<(), TemplateError> {
        std::fs::write(path, self.to_json_string()?)?;
        Ok(())
    }

    /// Load a template from a JSON file.
    pub fn from_json_file(path: &Path) -> Result<Self, TemplateError> {
        let data = std::fs::read_to_string(path)?;
        Self::from_json_str(&data)
    }

    fn from_spec(spec: TemplateSpecV1) -> Result<Self, TemplateError> {
        if spec.schema != TEMPLATE_SCHEMA_V1 {
            return Err(TemplateError::UnsupportedSchema { found: spec.schema });
        }
        spec.geometry.validate()?;
        if spec.descriptors.is_empty() {
            return Err(TemplateError::NoFeatures);
        }
        if spec.descriptors.len() != spec.keypoints.len() {
            return Err(TemplateError::Inconsistent(format!(
                "{} keypoints but {} descriptors",
                spec.keypoints.len(),
                spec.descriptors.len()
            )));
        }
        let (w, h) = (spec.geometry.width as f32, spec.geometry.height as f32);
        if spec
            .keypoints
            .iter()
            .any(|k| !(k.x >= -1.0 && k.y >= -1.0 && k.x <= w && k.y <= h))
        {
            return Err(TemplateError::Inconsistent(
                "keypoint outside the canonical strip".to_string(),
            ));
        }
        let pattern = BriefPattern::new(spec.descriptor);
        Ok(Self::assemble(
            spec.name,
            spec.geometry,
            spec.scales,
            spec.keypoints,
            spec.descriptors,
            pattern,
        ))
    }
}
