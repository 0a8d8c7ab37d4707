//! 1-D column profiles across the result window.

use image::GrayImage;

/// Mean intensity of each column `x0..x1` over rows `y0..y1` (half-open).
pub fn column_profile(img: &GrayImage, x0: u32, x1: u32, y0: u32, y1: u32) -> Vec<f32> {
    let (w, h) = img.dimensions();
    let (x1, y1) = (x1.min(w), y1.min(h));
    if x0 >= x1 || y0 >= y1 {
        return Vec::new();
    }
    let raw = img.as_raw();
    let stride = w as usize;
    let rows = (y1 - y0) as f32;
    (x0..x1)
        .map(|x| {
            let sum: u32 = (y0..y1)
                .map(|y| raw[y as usize * stride + x as usize] as u32)
                .sum();
            sum as f32 / rows
        })
        .collect()
}

/// In-place 3-point moving average; endpoints are left untouched.
pub fn smooth_3point(d: &mut [f32]) {
    let n = d.len();
    if n < 5 {
        return;
    }
    let mut left = d[0];
    let mut mid = d[1];
    for ri in 1..(n - 1) {
        let right = d[ri + 1];
        d[ri] = (left + mid + right) / 3.0;
        left = mid;
        mid = right;
    }
}

/// Median of a non-empty slice (upper median for even lengths).
pub fn median(values: &mut [f32]) -> Option<f32> {
    if values.is_empty() {
        return None;
    }
    let mid = values.len() / 2;
    let (_, m, _) = values.select_nth_unstable_by(mid, |a, b| a.total_cmp(b));
    Some(*m)
}

/// Length of the longest run of consecutive `true` values.
pub fn longest_run(flags: impl IntoIterator<Item = bool>) -> usize {
    let mut best = 0;
    let mut cur = 0;
    for f in flags {
        if f {
            cur += 1;
            best = best.max(cur);
        } else {
            cur = 0;
        }
    }
    best
}
