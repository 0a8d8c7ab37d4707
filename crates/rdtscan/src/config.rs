//! Aggregate scan configuration.

use std::path::Path;

use crate::decode::DecodeConfig;
use crate::localize::LocalizeConfig;
use crate::quality::QualityConfig;
use crate::rectify::RectifyConfig;

/// Every calibratable threshold of the per-frame pipeline.
///
/// Partial JSON files overlay the defaults: missing sections and fields keep
/// their default values.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub localize: LocalizeConfig,
    pub quality: QualityConfig,
    pub rectify: RectifyConfig,
    pub decode: DecodeConfig,
}

impl ScanConfig {
    /// Load a configuration from a JSON file.
    pub fn from_json_file(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let data = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&data)?)
    }

    /// Write the configuration as pretty-printed JSON.
    pub fn to_json_file(&self, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}
