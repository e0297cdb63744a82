//! Similarity contrast curve.

/// Symmetric S-curve over [0, 1].
///
/// Values below 0.5 are pushed toward 0 and values above toward 1; the
/// exponent sets the steepness. An exponent of 1 is the identity and 0.5 is
/// a fixed point for every exponent. Inputs are clamped into [0, 1].
pub fn contrast_curve(similarity: f32, exponent: f32) -> f32 {
    let s = if similarity.is_nan() {
        0.0
    } else {
        similarity.clamp(0.0, 1.0)
    };
    let k = exponent.max(f32::EPSILON);
    if s < 0.5 {
        0.5 * (2.0 * s).powf(k)
    } else {
        1.0 - 0.5 * (2.0 * (1.0 - s)).powf(k)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_midpoint_is_fixed() {
        for k in [0.3, 1.0, 2.0, 3.5, 8.0] {
            assert!((contrast_curve(0.5, k) - 0.5).abs() < 1e-6, "k = {k}");
        }
    }

    #[test]
    fn test_monotonic_increasing() {
        for k in [0.5, 1.0, 2.0, 4.0] {
            let mut prev = contrast_curve(0.0, k);
            for i in 1..=100 {
                let v = contrast_curve(i as f32 / 100.0, k);
                assert!(v >= prev, "k = {k}, step {i}: {v} < {prev}");
                prev = v;
            }
        }
    }

    #[test]
    fn test_pushes_away_from_middle() {
        assert!(contrast_curve(0.3, 2.0) < 0.3);
        assert!(contrast_curve(0.7, 2.0) > 0.7);
        assert!((contrast_curve(0.3, 1.0) - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_endpoints_and_clamping() {
        assert_eq!(contrast_curve(0.0, 2.0), 0.0);
        assert_eq!(contrast_curve(1.0, 2.0), 1.0);
        assert_eq!(contrast_curve(-3.0, 2.0), 0.0);
        assert_eq!(contrast_curve(7.0, 2.0), 1.0);
        assert_eq!(contrast_curve(f32::NAN, 2.0), 0.0);
    }
}
