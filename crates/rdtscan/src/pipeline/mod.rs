//! Per-frame orchestration: localize → grade → (rectify → decode) → emit.
//!
//! [`FrameProcessor`] walks one frame through the state machine and always
//! returns a [`PipelineOutcome`]; no error escapes it. Stage failures degrade
//! to quality feedback:
//!
//! - unreadable frame buffer: `INVALID` feedback, frame skipped
//! - no boundary: `INVALID` feedback
//! - any failing gate: feedback with the graded report
//! - rectification failure after a full pass: logged as an invariant
//!   violation, `INVALID` feedback

mod instruction;
mod outcome;

pub use instruction::Instruction;
pub use outcome::{
    Detection, HostImages, HostRecord, PipelineOutcome, QualityFeedback, StageTiming, TimingMs,
};

use std::sync::Arc;
use std::time::{Duration, Instant};

use image::GrayImage;

use crate::config::ScanConfig;
use crate::decode::decode;
use crate::frame::Frame;
use crate::localize::{BoundaryEstimate, Localizer};
use crate::quality::{assess, QualityReport};
use crate::rectify::rectify;
use crate::template::ReferenceTemplate;

/// Orchestrator states. A frame always starts and ends in `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Idle,
    Localizing,
    Grading,
    PassedGate,
    FailedGate,
    Rectifying,
    Decoding,
    Emitting,
}

/// Runs the full per-frame pipeline against one reference template.
#[derive(Debug)]
pub struct FrameProcessor {
    template: Arc<ReferenceTemplate>,
    localizer: Localizer,
    config: ScanConfig,
    state: PipelineState,
    /// States visited by the most recent frame, `Idle` to `Idle`.
    path: Vec<PipelineState>,
}

impl FrameProcessor {
    pub fn new(template: Arc<ReferenceTemplate>, config: ScanConfig) -> Self {
        let localizer = Localizer::new(Arc::clone(&template), config.localize.clone());
        Self {
            template,
            localizer,
            config,
            state: PipelineState::Idle,
            path: Vec::new(),
        }
    }

    pub fn template(&self) -> &Arc<ReferenceTemplate> {
        &self.template
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Current state; `Idle` between frames.
    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// States visited while processing the most recent frame.
    pub fn last_path(&self) -> &[PipelineState] {
        &self.path
    }

    fn enter(&mut self, next: PipelineState) {
        tracing::trace!(from = ?self.state, to = ?next, "pipeline transition");
        self.state = next;
        self.path.push(next);
    }

    fn begin_frame(&mut self) {
        self.path.clear();
        self.state = PipelineState::Idle;
        self.path.push(PipelineState::Idle);
    }

    /// Process one camera frame.
    pub fn process(&mut self, frame: &Frame) -> PipelineOutcome {
        let t0 = Instant::now();
        self.begin_frame();

        let gray = match frame.to_luma() {
            Ok(g) => g,
            Err(e) => {
                tracing::warn!(error = %e, "skipping unreadable frame");
                let timing = StageTiming {
                    total: t0.elapsed(),
                    ..StageTiming::default()
                };
                return self.emit_feedback(QualityReport::invalid(), None, timing, frame.timestamp);
            }
        };

        self.enter(PipelineState::Localizing);
        let t = Instant::now();
        let boundary = self.localizer.locate(&gray);
        let localize = t.elapsed();

        self.enter(PipelineState::Grading);
        let t = Instant::now();
        let mut report = assess(&gray, boundary.as_ref(), &self.config.quality);
        if let Some(m) = report.metrics.as_mut() {
            m.brightness_hint = frame.brightness_hint;
        }
        let grade = t.elapsed();

        let timing = StageTiming {
            localize,
            grade,
            ..StageTiming::default()
        };
        self.finish(&gray, report, boundary, timing, t0, frame.timestamp)
    }

    /// Run the post-grading stages for an externally graded frame.
    ///
    /// Rectification happens if and only if `report.all_passed()`.
    pub fn process_graded(
        &mut self,
        gray: &GrayImage,
        report: QualityReport,
        boundary: Option<BoundaryEstimate>,
        timestamp: Duration,
    ) -> PipelineOutcome {
        let t0 = Instant::now();
        self.begin_frame();
        self.enter(PipelineState::Grading);
        self.finish(gray, report, boundary, StageTiming::default(), t0, timestamp)
    }

    fn finish(
        &mut self,
        gray: &GrayImage,
        report: QualityReport,
        boundary: Option<BoundaryEstimate>,
        mut timing: StageTiming,
        t0: Instant,
        timestamp: Duration,
    ) -> PipelineOutcome {
        if !report.all_passed() {
            self.enter(PipelineState::FailedGate);
            tracing::debug!(failing = ?report.failing_axes(), "quality gate failed");
            timing.total = t0.elapsed();
            return self.emit_feedback(report, boundary, timing, timestamp);
        }
        self.enter(PipelineState::PassedGate);

        let Some(boundary) = boundary else {
            tracing::warn!("quality gate passed without a boundary; discarding frame");
            timing.total = t0.elapsed();
            return self.emit_feedback(QualityReport::invalid(), None, timing, timestamp);
        };

        self.enter(PipelineState::Rectifying);
        let t = Instant::now();
        let strip = match rectify(
            gray,
            &boundary.corners,
            self.template.geometry(),
            &self.config.rectify,
        ) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(error = %e, "rectification failed after passing the gate; discarding frame");
                timing.rectify = t.elapsed();
                timing.total = t0.elapsed();
                return self.emit_feedback(QualityReport::invalid(), None, timing, timestamp);
            }
        };
        timing.rectify = t.elapsed();

        self.enter(PipelineState::Decoding);
        let t = Instant::now();
        let reading = decode(&strip, &self.config.decode);
        timing.decode = t.elapsed();
        timing.total = t0.elapsed();

        self.enter(PipelineState::Emitting);
        tracing::info!(
            control = reading.control,
            test_a = reading.test_a,
            test_b = reading.test_b,
            total_ms = timing.total.as_secs_f64() * 1e3,
            "strip decoded"
        );
        let outcome = PipelineOutcome::Detection(Box::new(Detection {
            report,
            boundary,
            reading,
            strip,
            timing,
            timestamp,
        }));
        self.enter(PipelineState::Idle);
        outcome
    }

    fn emit_feedback(
        &mut self,
        report: QualityReport,
        boundary: Option<BoundaryEstimate>,
        timing: StageTiming,
        timestamp: Duration,
    ) -> PipelineOutcome {
        self.enter(PipelineState::Emitting);
        let instruction = Instruction::from_report(&report);
        let outcome = PipelineOutcome::QualityFeedback(QualityFeedback {
            report,
            boundary,
            instruction,
            timing,
            timestamp,
        });
        self.enter(PipelineState::Idle);
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic;
    use crate::template::{StripGeometry, TemplateBuildConfig};
    use PipelineState::*;

    fn processor() -> FrameProcessor {
        let g = StripGeometry::default();
        let strip = synthetic::render_strip(&g, [false; 3], synthetic::DEFAULT_TEXTURE_SEED);
        let t = ReferenceTemplate::build("t", &strip, g, &TemplateBuildConfig::default())
            .expect("template");
        FrameProcessor::new(Arc::new(t), ScanConfig::default())
    }

    #[test]
    fn blank_frame_walks_the_failed_gate_path() {
        let mut p = processor();
        let frame = Frame::from_gray(GrayImage::from_pixel(320, 240, image::Luma([128])));
        let out = p.process(&frame);
        assert!(!out.is_detection());
        assert_eq!(out.report(), &QualityReport::invalid());
        assert_eq!(out.instruction(), Instruction::CenterStrip);
        assert_eq!(p.last_path(), &[Idle, Localizing, Grading, FailedGate, Emitting, Idle]);
        assert_eq!(p.state(), Idle);
    }

    #[test]
    fn unreadable_frame_is_skipped_as_invalid() {
        let mut p = processor();
        let frame = Frame::new(vec![0; 3], 10, 10, crate::frame::PixelFormat::Gray8);
        let out = p.process(&frame);
        assert_eq!(out.report().size, crate::quality::SizeResult::Invalid);
        assert_eq!(p.last_path(), &[Idle, Emitting, Idle]);
    }

    #[test]
    fn passing_report_without_boundary_is_discarded() {
        let mut p = processor();
        let gray = GrayImage::new(64, 64);
        let out = p.process_graded(&gray, QualityReport::all_pass(0.0), None, Duration::ZERO);
        assert!(!out.is_detection());
        assert_eq!(out.report().size, crate::quality::SizeResult::Invalid);
    }

    #[test]
    fn passing_report_reaches_decoding() {
        let mut p = processor();
        let g = p.template().geometry().clone();
        let h = synthetic::similarity(&g, 1.0, 0.0, [320.0, 240.0]);
        let gray = synthetic::render_frame(&g, [true, false, false], &h, 640, 480);
        let boundary = p.localizer.locate(&gray).expect("boundary");
        let out = p.process_graded(&gray, QualityReport::all_pass(0.0), Some(boundary), Duration::ZERO);
        let d = out.detection().expect("detection");
        assert!(d.reading.control && !d.reading.test_a && !d.reading.test_b);
        assert_eq!(
            p.last_path(),
            &[Idle, Grading, PassedGate, Rectifying, Decoding, Emitting, Idle]
        );
    }
}
