//! 2D joint angles from keypoint triplets.
//!
//! Vectors run from the vertex to its neighbours: `v1 = p1 - p2`, `v2 = p3 - p2`.
//! The reported angle is the supplement of the interior angle, so a straight
//! limb reads 0° and a fully folded one approaches 180°.

use crate::pose::Keypoint;

/// Below this vector length the angle is undefined.
pub const DEGENERATE_LENGTH: f64 = 1e-6;

type Point = (f64, f64);

fn vectors(p1: Point, p2: Point, p3: Point) -> Option<(Point, Point)> {
    let v1 = (p1.0 - p2.0, p1.1 - p2.1);
    let v2 = (p3.0 - p2.0, p3.1 - p2.1);
    let len1 = v1.0.hypot(v1.1);
    let len2 = v2.0.hypot(v2.1);
    if !len1.is_finite() || !len2.is_finite() {
        return None;
    }
    if len1 < DEGENERATE_LENGTH || len2 < DEGENERATE_LENGTH {
        return None;
    }
    Some((v1, v2))
}

fn flexion(v1: Point, v2: Point) -> f64 {
    let len = v1.0.hypot(v1.1) * v2.0.hypot(v2.1);
    let cos_angle = ((v1.0 * v2.0 + v1.1 * v2.1) / len).clamp(-1.0, 1.0);
    180.0 - cos_angle.acos().to_degrees()
}

/// Unsigned vertex angle at `p2` in degrees, 0..=180. `None` for coincident points.
pub fn joint_angle(p1: Point, p2: Point, p3: Point) -> Option<f64> {
    let (v1, v2) = vectors(p1, p2, p3)?;
    Some(flexion(v1, v2))
}

/// Same magnitude as [`joint_angle`], negative when `v1 × v2 < 0`.
pub fn signed_joint_angle(p1: Point, p2: Point, p3: Point) -> Option<f64> {
    let (v1, v2) = vectors(p1, p2, p3)?;
    let angle = flexion(v1, v2);
    let cross = v1.0 * v2.1 - v1.1 * v2.0;
    Some(if cross < 0.0 { -angle } else { angle })
}

/// Confidence-gated angle over three keypoints.
pub fn keypoint_angle(
    proximal: &Keypoint,
    vertex: &Keypoint,
    distal: &Keypoint,
    threshold: f32,
    signed: bool,
) -> Option<f64> {
    if !proximal.is_valid(threshold) || !vertex.is_valid(threshold) || !distal.is_valid(threshold) {
        return None;
    }
    let (p1, p2, p3) = (proximal.position(), vertex.position(), distal.position());
    if signed {
        signed_joint_angle(p1, p2, p3)
    } else {
        joint_angle(p1, p2, p3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    const EPS: f64 = 1e-9;

    #[test]
    fn test_straight_joint_is_zero() {
        let angle = joint_angle((0.0, 0.0), (1.0, 0.0), (2.0, 0.0)).unwrap();
        assert_abs_diff_eq!(angle, 0.0, epsilon = EPS);

        let angle = joint_angle((3.0, -1.0), (3.0, 5.0), (3.0, 40.0)).unwrap();
        assert_abs_diff_eq!(angle, 0.0, epsilon = EPS);
    }

    #[test]
    fn test_full_flexion_approaches_180() {
        let angle = joint_angle((2.0, 0.0), (0.0, 0.0), (2.0, 1e-4)).unwrap();
        assert_abs_diff_eq!(angle, 180.0, epsilon = 0.01);
    }

    #[test]
    fn test_right_angle() {
        let angle = joint_angle((0.0, 0.0), (1.0, 0.0), (1.0, 1.0)).unwrap();
        assert_abs_diff_eq!(angle, 90.0, epsilon = EPS);
    }

    #[test]
    fn test_degenerate_is_none() {
        assert!(joint_angle((1.0, 1.0), (1.0, 1.0), (2.0, 3.0)).is_none());
        assert!(joint_angle((0.0, 0.0), (1.0, 1.0), (1.0, 1.0)).is_none());
        assert!(signed_joint_angle((5.0, 5.0), (5.0, 5.0), (5.0, 5.0)).is_none());
        assert!(joint_angle((f64::NAN, 0.0), (1.0, 1.0), (2.0, 2.0)).is_none());
    }

    #[test]
    fn test_signed_magnitude_matches_unsigned() {
        for i in 0..36 {
            let theta = (i as f64 * 10.0 + 3.0).to_radians();
            let p3 = (theta.cos() * 2.0, theta.sin() * 2.0);
            let p1 = (-1.5, 0.25);
            let unsigned = joint_angle(p1, (0.0, 0.0), p3).unwrap();
            let signed = signed_joint_angle(p1, (0.0, 0.0), p3).unwrap();
            assert_abs_diff_eq!(signed.abs(), unsigned, epsilon = EPS);
            assert!((0.0..=180.0).contains(&unsigned));
        }
    }

    #[test]
    fn test_sign_flips_with_orientation() {
        // Mirroring p3 across the p1-p2 axis reverses the winding of (v1, v2)
        let p1 = (0.0, -1.0);
        let p2 = (0.0, 0.0);
        let a = signed_joint_angle(p1, p2, (0.5, 1.0)).unwrap();
        let b = signed_joint_angle(p1, p2, (-0.5, 1.0)).unwrap();
        assert!(a > 0.0);
        assert!(b < 0.0);
        assert_abs_diff_eq!(a, -b, epsilon = EPS);
    }

    #[test]
    fn test_low_confidence_is_none_for_any_threshold() {
        let geometry = [(0.0, 0.0), (10.0, 0.0), (10.0, 10.0)];
        for t in 1..=10 {
            let threshold = t as f32 / 10.0;
            for weak in 0..3 {
                let kps: Vec<Keypoint> = geometry
                    .iter()
                    .enumerate()
                    .map(|(i, &(x, y))| {
                        let c = if i == weak { threshold - 0.05 } else { 1.0 };
                        Keypoint::new(x, y, c)
                    })
                    .collect();
                assert!(keypoint_angle(&kps[0], &kps[1], &kps[2], threshold, false).is_none());
                assert!(keypoint_angle(&kps[0], &kps[1], &kps[2], threshold, true).is_none());
            }
        }
    }

    #[test]
    fn test_confident_keypoints_produce_angle() {
        let a = Keypoint::new(0.0, 0.0, 0.9);
        let b = Keypoint::new(10.0, 0.0, 0.9);
        let c = Keypoint::new(10.0, 10.0, 0.5);
        let angle = keypoint_angle(&a, &b, &c, 0.5, false).unwrap();
        assert_abs_diff_eq!(angle, 90.0, epsilon = 1e-4);
    }
}
