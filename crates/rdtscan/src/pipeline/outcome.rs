//! Per-frame pipeline outcomes and their host-facing record.

use std::io::Cursor;
use std::time::Duration;

use image::{GrayImage, ImageFormat};

use super::instruction::Instruction;
use crate::decode::ResultReading;
use crate::localize::BoundaryEstimate;
use crate::quad::Quad;
use crate::quality::{ExposureResult, QualityReport, SizeResult};
use crate::rectify::RectifiedStrip;

/// Wall-clock time spent in each stage of one frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct StageTiming {
    pub localize: Duration,
    pub grade: Duration,
    pub rectify: Duration,
    pub decode: Duration,
    pub total: Duration,
}

/// A frame that did not pass every quality gate.
#[derive(Debug, Clone, PartialEq)]
pub struct QualityFeedback {
    pub report: QualityReport,
    pub boundary: Option<BoundaryEstimate>,
    pub instruction: Instruction,
    pub timing: StageTiming,
    pub timestamp: Duration,
}

/// A frame that passed every gate and was decoded.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub report: QualityReport,
    pub boundary: BoundaryEstimate,
    pub reading: ResultReading,
    pub strip: RectifiedStrip,
    pub timing: StageTiming,
    pub timestamp: Duration,
}

/// Exactly one outcome is produced per input frame.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineOutcome {
    QualityFeedback(QualityFeedback),
    Detection(Box<Detection>),
}

impl PipelineOutcome {
    pub fn report(&self) -> &QualityReport {
        match self {
            Self::QualityFeedback(f) => &f.report,
            Self::Detection(d) => &d.report,
        }
    }

    pub fn boundary(&self) -> Option<&BoundaryEstimate> {
        match self {
            Self::QualityFeedback(f) => f.boundary.as_ref(),
            Self::Detection(d) => Some(&d.boundary),
        }
    }

    pub fn timing(&self) -> &StageTiming {
        match self {
            Self::QualityFeedback(f) => &f.timing,
            Self::Detection(d) => &d.timing,
        }
    }

    pub fn timestamp(&self) -> Duration {
        match self {
            Self::QualityFeedback(f) => f.timestamp,
            Self::Detection(d) => d.timestamp,
        }
    }

    pub fn instruction(&self) -> Instruction {
        match self {
            Self::QualityFeedback(f) => f.instruction,
            Self::Detection(_) => Instruction::Reading,
        }
    }

    pub fn is_detection(&self) -> bool {
        matches!(self, Self::Detection(_))
    }

    pub fn detection(&self) -> Option<&Detection> {
        match self {
            Self::Detection(d) => Some(d),
            Self::QualityFeedback(_) => None,
        }
    }

    /// Flatten into the serializable record handed to the host application.
    ///
    /// Rectified images are PNG-encoded; pass `include_images = false` to
    /// leave them out.
    pub fn to_host_record(&self, include_images: bool) -> Result<HostRecord, image::ImageError> {
        let report = self.report();
        let boundary = self.boundary();
        let (reading, images) = match self {
            Self::Detection(d) if include_images => (
                Some(d.reading),
                Some(HostImages {
                    rectified_png: encode_png(&d.strip.image)?,
                    result_window_png: encode_png(&d.strip.window)?,
                }),
            ),
            Self::Detection(d) => (Some(d.reading), None),
            Self::QualityFeedback(_) => (None, None),
        };
        let instruction = self.instruction();

        Ok(HostRecord {
            passed: self.is_detection(),
            timestamp_ms: as_ms(self.timestamp()),
            size: report.size,
            centered: report.centered,
            correct_orientation: report.correct_orientation,
            sharp: report.sharp,
            exposure: report.exposure,
            shadow_free: report.shadow_free,
            fiducial_present: report.fiducial_present,
            angle_deg: report.angle_deg,
            instruction,
            instruction_message: instruction.message().to_string(),
            boundary: boundary.map(|b| b.corners),
            confidence: boundary.map(|b| b.confidence),
            control: reading.map(|r| r.control),
            test_a: reading.map(|r| r.test_a),
            test_b: reading.map(|r| r.test_b),
            timing_ms: TimingMs::from(self.timing()),
            images,
        })
    }
}

fn as_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1e3
}

fn encode_png(img: &GrayImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)?;
    Ok(buf)
}

/// Stage durations in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TimingMs {
    pub localize: f64,
    pub grade: f64,
    pub rectify: f64,
    pub decode: f64,
    pub total: f64,
}

impl From<&StageTiming> for TimingMs {
    fn from(t: &StageTiming) -> Self {
        Self {
            localize: as_ms(t.localize),
            grade: as_ms(t.grade),
            rectify: as_ms(t.rectify),
            decode: as_ms(t.decode),
            total: as_ms(t.total),
        }
    }
}

/// PNG-encoded rectified images.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct HostImages {
    pub rectified_png: Vec<u8>,
    pub result_window_png: Vec<u8>,
}

/// Flat, serializable view of one outcome for the host application.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct HostRecord {
    /// Every gate passed and the strip was decoded.
    pub passed: bool,
    pub timestamp_ms: f64,
    pub size: SizeResult,
    pub centered: bool,
    pub correct_orientation: bool,
    pub sharp: bool,
    pub exposure: ExposureResult,
    pub shadow_free: bool,
    pub fiducial_present: bool,
    pub angle_deg: f64,
    pub instruction: Instruction,
    pub instruction_message: String,
    pub boundary: Option<Quad>,
    pub confidence: Option<f64>,
    pub control: Option<bool>,
    pub test_a: Option<bool>,
    pub test_b: Option<bool>,
    pub timing_ms: TimingMs,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub images: Option<HostImages>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feedback_record_has_no_reading() {
        let outcome = PipelineOutcome::QualityFeedback(QualityFeedback {
            report: QualityReport::invalid(),
            boundary: None,
            instruction: Instruction::CenterStrip,
            timing: StageTiming::default(),
            timestamp: Duration::from_millis(40),
        });
        let rec = outcome.to_host_record(true).unwrap();
        assert!(!rec.passed);
        assert_eq!(rec.size, SizeResult::Invalid);
        assert_eq!(rec.instruction, Instruction::CenterStrip);
        assert_eq!(rec.boundary, None);
        assert_eq!(rec.control, None);
        assert!(rec.images.is_none());
        assert!((rec.timestamp_ms - 40.0).abs() < 1e-9);

        let json = serde_json::to_value(&rec).unwrap();
        for key in ["size", "exposure", "angle_deg", "boundary", "test_a", "timing_ms"] {
            assert!(json.get(key).is_some(), "missing {key}");
        }
    }
}
