//! Quadrilateral helpers shared by the localizer, quality battery and rectifier.
//!
//! Corners are always ordered top-left, top-right, bottom-right, bottom-left in
//! image coordinates (y down). With that ordering an unmirrored quad has a
//! positive signed area.

pub type Quad = [[f64; 2]; 4];

/// Signed shoelace area. Positive for TL, TR, BR, BL ordering in y-down space.
pub fn signed_area(q: &Quad) -> f64 {
    let mut acc = 0.0;
    for i in 0..4 {
        let a = q[i];
        let b = q[(i + 1) % 4];
        acc += a[0] * b[1] - b[0] * a[1];
    }
    0.5 * acc
}

/// Area centroid, falling back to the vertex mean for degenerate quads.
pub fn centroid(q: &Quad) -> [f64; 2] {
    let area = signed_area(q);
    if area.abs() < 1e-9 {
        let sx: f64 = q.iter().map(|p| p[0]).sum();
        let sy: f64 = q.iter().map(|p| p[1]).sum();
        return [sx / 4.0, sy / 4.0];
    }
    let mut cx = 0.0;
    let mut cy = 0.0;
    for i in 0..4 {
        let a = q[i];
        let b = q[(i + 1) % 4];
        let cross = a[0] * b[1] - b[0] * a[1];
        cx += (a[0] + b[0]) * cross;
        cy += (a[1] + b[1]) * cross;
    }
    [cx / (6.0 * area), cy / (6.0 * area)]
}

fn turn(a: [f64; 2], b: [f64; 2], c: [f64; 2]) -> f64 {
    (b[0] - a[0]) * (c[1] - b[1]) - (b[1] - a[1]) * (c[0] - b[0])
}

/// `true` when all four turns share the positive orientation.
pub fn is_convex(q: &Quad) -> bool {
    if q.iter().flatten().any(|v| !v.is_finite()) {
        return false;
    }
    (0..4).all(|i| turn(q[i], q[(i + 1) % 4], q[(i + 2) % 4]) > 0.0)
}

/// Point-in-quad test for a convex, positively oriented quad.
pub fn contains(q: &Quad, p: [f64; 2]) -> bool {
    (0..4).all(|i| {
        let a = q[i];
        let b = q[(i + 1) % 4];
        (b[0] - a[0]) * (p[1] - a[1]) - (b[1] - a[1]) * (p[0] - a[0]) >= 0.0
    })
}

/// Axis-aligned bounds `[min_x, min_y, max_x, max_y]`.
pub fn bounds(q: &Quad) -> [f64; 4] {
    let mut b = [q[0][0], q[0][1], q[0][0], q[0][1]];
    for p in &q[1..] {
        b[0] = b[0].min(p[0]);
        b[1] = b[1].min(p[1]);
        b[2] = b[2].max(p[0]);
        b[3] = b[3].max(p[1]);
    }
    b
}

/// Rotation of the long axis in degrees, positive when the strip appears
/// rotated clockwise on screen. Averages the top and bottom edge directions.
pub fn rotation_deg(q: &Quad) -> f64 {
    let top = [q[1][0] - q[0][0], q[1][1] - q[0][1]];
    let bottom = [q[2][0] - q[3][0], q[2][1] - q[3][1]];
    let norm = |v: [f64; 2]| {
        let n = (v[0] * v[0] + v[1] * v[1]).sqrt().max(1e-12);
        [v[0] / n, v[1] / n]
    };
    let (t, b) = (norm(top), norm(bottom));
    (t[1] + b[1]).atan2(t[0] + b[0]).to_degrees()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const RECT: Quad = [[0.0, 0.0], [40.0, 0.0], [40.0, 20.0], [0.0, 20.0]];

    #[test]
    fn rect_area_centroid_and_bounds() {
        assert_relative_eq!(signed_area(&RECT), 800.0);
        assert_eq!(centroid(&RECT), [20.0, 10.0]);
        assert_eq!(bounds(&RECT), [0.0, 0.0, 40.0, 20.0]);
        assert!(is_convex(&RECT));
    }

    #[test]
    fn mirrored_and_bowtie_quads_are_not_convex() {
        let mirrored = [RECT[1], RECT[0], RECT[3], RECT[2]];
        assert!(signed_area(&mirrored) < 0.0);
        assert!(!is_convex(&mirrored));

        let bowtie = [RECT[0], RECT[2], RECT[1], RECT[3]];
        assert!(!is_convex(&bowtie));
    }

    #[test]
    fn containment_is_inclusive_on_edges() {
        assert!(contains(&RECT, [20.0, 10.0]));
        assert!(contains(&RECT, [0.0, 5.0]));
        assert!(!contains(&RECT, [41.0, 5.0]));
    }

    #[test]
    fn rotation_sign_follows_screen_clockwise() {
        let a = 5f64.to_radians();
        let rot = |p: [f64; 2]| [p[0] * a.cos() - p[1] * a.sin(), p[0] * a.sin() + p[1] * a.cos()];
        let q = RECT.map(rot);
        assert_relative_eq!(rotation_deg(&q), 5.0, epsilon = 1e-9);
        assert_relative_eq!(rotation_deg(&RECT), 0.0);
    }
}
