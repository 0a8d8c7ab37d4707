//! Photometric result-line decoding on the rectified strip.
//!
//! Each line region is read independently: a column profile across the result
//! window is compared with a baseline taken from flanks on both sides of the
//! region. A line is present when the profile departs from the baseline by at
//! least `min_contrast` and stays beyond half that contrast over at least
//! `min_width` consecutive columns.

pub mod profile;

use crate::rectify::RectifiedStrip;
use crate::template::{LineRegion, ResultWindow};

/// Whether lines appear darker or lighter than the strip background.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinePolarity {
    Dark,
    Light,
}

/// Decoding configuration.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct DecodeConfig {
    pub polarity: LinePolarity,
    /// Minimum peak departure from the baseline (gray levels).
    pub min_contrast: f32,
    /// Minimum consecutive columns beyond `min_contrast / 2`.
    pub min_width: usize,
    /// Columns skipped between the region edge and its flanks.
    pub flank_gap: u32,
    /// Columns per flank used for the baseline.
    pub flank_width: u32,
    /// Fraction of the line's vertical span trimmed from each end.
    pub vertical_margin: f64,
    /// Apply 3-point smoothing to the profile.
    pub smooth: bool,
}

impl Default for DecodeConfig {
    fn default() -> Self {
        Self {
            polarity: LinePolarity::Dark,
            min_contrast: 20.0,
            min_width: 2,
            flank_gap: 4,
            flank_width: 10,
            vertical_margin: 0.15,
            smooth: true,
        }
    }
}

/// Decoding diagnostics for one line region.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct LineReading {
    pub present: bool,
    /// Median flank intensity.
    pub baseline: f32,
    /// Largest departure from the baseline inside the region, signed by polarity.
    pub depth: f32,
    /// Longest run of columns beyond half the contrast threshold.
    pub run_width: usize,
}

impl LineReading {
    fn absent() -> Self {
        Self {
            present: false,
            baseline: 0.0,
            depth: 0.0,
            run_width: 0,
        }
    }
}

/// Control and test line verdicts.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ResultReading {
    pub control: bool,
    pub test_a: bool,
    pub test_b: bool,
    /// Diagnostics in order control, test A, test B.
    pub lines: [LineReading; 3],
}

/// Decode all three line regions of a rectified strip.
pub fn decode(strip: &RectifiedStrip, config: &DecodeConfig) -> ResultReading {
    let g = &strip.geometry;
    let lines = g
        .lines()
        .map(|region| decode_line(&strip.image, &g.result_window, region, config));
    tracing::debug!(
        control = lines[0].present,
        test_a = lines[1].present,
        test_b = lines[2].present,
        "decoded result lines"
    );
    ResultReading {
        control: lines[0].present,
        test_a: lines[1].present,
        test_b: lines[2].present,
        lines,
    }
}

/// Decode one line region of the canonical strip image.
pub fn decode_line(
    image: &image::GrayImage,
    window: &ResultWindow,
    region: &LineRegion,
    config: &DecodeConfig,
) -> LineReading {
    let span = region.y_span[1] - region.y_span[0];
    let margin = span * config.vertical_margin.clamp(0.0, 0.49);
    let y0 = (region.y_span[0] + margin).round().max(0.0) as u32;
    let y1 = (region.y_span[1] - margin).round().max(0.0) as u32;
    let x0 = window.x;
    let mut prof = profile::column_profile(image, x0, window.x + window.width, y0, y1);
    if prof.is_empty() {
        return LineReading::absent();
    }
    if config.smooth {
        profile::smooth_3point(&mut prof);
    }

    let n = prof.len() as i64;
    let to_idx = |x: f64| x.round() as i64 - x0 as i64;
    let lo = to_idx(region.center_x - region.half_width).clamp(0, n - 1);
    let hi = to_idx(region.center_x + region.half_width).clamp(0, n - 1);
    let gap = config.flank_gap as i64;
    let fw = config.flank_width as i64;

    let mut flanks: Vec<f32> = ((lo - gap - fw)..(lo - gap))
        .chain((hi + gap + 1)..=(hi + gap + fw))
        .filter(|&i| i >= 0 && i < n)
        .map(|i| prof[i as usize])
        .collect();
    if flanks.is_empty() {
        flanks = prof.clone();
    }
    let Some(baseline) = profile::median(&mut flanks) else {
        return LineReading::absent();
    };

    let signal = |v: f32| match config.polarity {
        LinePolarity::Dark => baseline - v,
        LinePolarity::Light => v - baseline,
    };
    let inside = &prof[lo as usize..=hi as usize];
    let depth = inside.iter().map(|&v| signal(v)).fold(f32::NEG_INFINITY, f32::max);
    let half = config.min_contrast * 0.5;
    let run_width = profile::longest_run(inside.iter().map(|&v| signal(v) >= half));

    LineReading {
        present: depth >= config.min_contrast && run_width >= config.min_width,
        baseline,
        depth,
        run_width,
    }
}
