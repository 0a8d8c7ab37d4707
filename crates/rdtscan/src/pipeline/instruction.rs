//! User guidance derived from a quality report.

use crate::quality::{ExposureResult, QualityReport, SizeResult};

/// One instruction for the capture UI, chosen by fixed priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Instruction {
    /// No strip located, or the strip is off center.
    CenterStrip,
    SizeResultSmall,
    SizeResultLarge,
    /// Strip rotated clockwise beyond the limit.
    BadOrientationPos,
    /// Strip rotated counterclockwise beyond the limit.
    BadOrientationNeg,
    UnderExposed,
    OverExposed,
    Shadow,
    /// Blurry frame or missing fiducial.
    HoldSteady,
    /// Every gate passed.
    Reading,
}

impl Instruction {
    /// Pick the highest-priority instruction for `report`.
    pub fn from_report(report: &QualityReport) -> Self {
        match report.size {
            SizeResult::Invalid => return Self::CenterStrip,
            SizeResult::Small => return Self::SizeResultSmall,
            SizeResult::Large => return Self::SizeResultLarge,
            SizeResult::RightSize => {}
        }
        if !report.centered {
            return Self::CenterStrip;
        }
        if !report.correct_orientation {
            return if report.angle_deg >= 0.0 {
                Self::BadOrientationPos
            } else {
                Self::BadOrientationNeg
            };
        }
        match report.exposure {
            ExposureResult::UnderExposed => return Self::UnderExposed,
            ExposureResult::OverExposed => return Self::OverExposed,
            ExposureResult::Normal => {}
        }
        if !report.shadow_free {
            return Self::Shadow;
        }
        if !report.sharp || !report.fiducial_present {
            return Self::HoldSteady;
        }
        Self::Reading
    }

    /// Stable identifier for localization tables.
    pub fn key(self) -> &'static str {
        match self {
            Self::CenterStrip => "centerStrip",
            Self::SizeResultSmall => "sizeResultSmall",
            Self::SizeResultLarge => "sizeResultLarge",
            Self::BadOrientationPos => "badOrientationPos",
            Self::BadOrientationNeg => "badOrientationNeg",
            Self::UnderExposed => "underExposed",
            Self::OverExposed => "overExposed",
            Self::Shadow => "shadow",
            Self::HoldSteady => "holdSteady",
            Self::Reading => "reading",
        }
    }

    /// Default English text.
    pub fn message(self) -> &'static str {
        match self {
            Self::CenterStrip => "Center the test strip in the frame",
            Self::SizeResultSmall => "Move closer to the test strip",
            Self::SizeResultLarge => "Move farther from the test strip",
            Self::BadOrientationPos => "Turn the phone counterclockwise to line up the strip",
            Self::BadOrientationNeg => "Turn the phone clockwise to line up the strip",
            Self::UnderExposed => "Find a brighter spot or turn on the light",
            Self::OverExposed => "Too bright; avoid direct light on the strip",
            Self::Shadow => "Move so no shadow falls on the strip",
            Self::HoldSteady => "Hold the camera steady",
            Self::Reading => "Hold still, reading the strip",
        }
    }
}

impl std::fmt::Display for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quality::QualityAxis;

    #[test]
    fn invalid_report_asks_to_center() {
        assert_eq!(
            Instruction::from_report(&QualityReport::invalid()),
            Instruction::CenterStrip
        );
    }

    #[test]
    fn all_pass_reads() {
        let i = Instruction::from_report(&QualityReport::all_pass(0.0));
        assert_eq!(i, Instruction::Reading);
        assert_eq!(i.key(), "reading");
    }

    #[test]
    fn single_failures_map_to_their_instruction() {
        let pass = QualityReport::all_pass(12.0);
        let expect = [
            (QualityAxis::Size, Instruction::SizeResultSmall),
            (QualityAxis::Centering, Instruction::CenterStrip),
            (QualityAxis::Orientation, Instruction::BadOrientationPos),
            (QualityAxis::Sharpness, Instruction::HoldSteady),
            (QualityAxis::Exposure, Instruction::UnderExposed),
            (QualityAxis::Shadow, Instruction::Shadow),
            (QualityAxis::Fiducial, Instruction::HoldSteady),
        ];
        for (axis, instruction) in expect {
            let r = pass.clone().with_failed(axis);
            assert_eq!(Instruction::from_report(&r), instruction, "{axis:?}");
        }
    }

    #[test]
    fn size_outranks_exposure_and_negative_angle_turns_clockwise() {
        let mut r = QualityReport::all_pass(-14.0)
            .with_failed(QualityAxis::Orientation)
            .with_failed(QualityAxis::Exposure);
        assert_eq!(Instruction::from_report(&r), Instruction::BadOrientationNeg);
        r.size = SizeResult::Large;
        assert_eq!(Instruction::from_report(&r), Instruction::SizeResultLarge);
    }

    #[test]
    fn keys_serialize_as_camel_case() {
        let json = serde_json::to_string(&Instruction::BadOrientationPos).unwrap();
        assert_eq!(json, "\"badOrientationPos\"");
        assert_eq!(Instruction::BadOrientationPos.key(), "badOrientationPos");
    }
}
