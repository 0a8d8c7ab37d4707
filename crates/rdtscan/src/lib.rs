//! rdtscan — frame-quality gating and result-line reading for rapid diagnostic
//! test strips.
//!
//! Every camera frame goes through the same stages:
//!
//! 1. **Localize** – FAST keypoints and steered binary descriptors are matched
//!    against a [`ReferenceTemplate`]; a RANSAC homography projects the
//!    canonical strip rectangle into the frame.
//! 2. **Grade** – size, centering, orientation, sharpness, exposure, shadow
//!    and a viewfinder fiducial are checked independently.
//! 3. **Rectify** – only when every gate passes, the strip is resampled into
//!    canonical geometry.
//! 4. **Decode** – control, test A and test B line regions are read from
//!    column profiles of the rectified strip.
//!
//! # Public API
//! - [`FrameProcessor`] runs one frame synchronously and returns a
//!   [`PipelineOutcome`].
//! - [`CaptureSession`] wraps a processor in a worker thread and drops frames
//!   that arrive while another frame is in flight.
//! - [`ScanConfig`] aggregates every threshold; [`ReferenceTemplate`] is built
//!   once and shared read-only.

pub mod config;
pub mod decode;
pub mod features;
pub mod frame;
pub mod homography;
pub mod localize;
pub mod pipeline;
pub mod quad;
pub mod quality;
pub mod rectify;
pub mod sample;
pub mod session;
pub mod synthetic;
pub mod template;

pub use config::ScanConfig;
pub use decode::{DecodeConfig, LinePolarity, LineReading, ResultReading};
pub use frame::{Frame, FrameError, PixelFormat};
pub use homography::{RansacHomographyConfig, RansacStats};
pub use localize::{BoundaryEstimate, LocalizeConfig, Localizer};
pub use pipeline::{
    Detection, FrameProcessor, HostRecord, Instruction, PipelineOutcome, PipelineState,
    QualityFeedback, StageTiming,
};
pub use quality::{ExposureResult, QualityAxis, QualityConfig, QualityReport, SizeResult};
pub use rectify::{RectifiedStrip, RectifyConfig, RectifyError};
pub use session::{CaptureSession, SessionStats, SubmitStatus};
pub use template::{
    LineRegion, ReferenceTemplate, ResultWindow, StripGeometry, TemplateBuildConfig, TemplateError,
};

/// Template built from the synthetic reference strip with default settings.
///
/// Used by the CLI when no template file is given, and by tests and benches.
pub fn builtin_template() -> Result<ReferenceTemplate, TemplateError> {
    let geometry = StripGeometry::default();
    let strip = synthetic::render_strip(&geometry, [false; 3], synthetic::DEFAULT_TEXTURE_SEED);
    ReferenceTemplate::build("builtin", &strip, geometry, &TemplateBuildConfig::default())
}
