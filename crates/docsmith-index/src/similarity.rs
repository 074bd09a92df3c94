//! Cosine similarity with an explicit "irrelevant" sentinel.

/// Score given to pairs that cannot be compared (empty input or zero norm).
///
/// It is the minimum of the cosine range, so it always sorts last.
pub const IRRELEVANT: f32 = -1.0;

/// Cosine similarity of `a` and `b` over their common prefix.
///
/// Vectors of different lengths are truncated to the shorter one; callers
/// that care about dimension drift should compare lengths first (see
/// [`dimensions_match`]). Returns [`IRRELEVANT`] when either slice is empty,
/// either truncated norm is zero, or a component is not finite.
///
/// Sums are accumulated in `f64`, so components near the ends of the `f32`
/// range neither overflow nor underflow the norms.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let len = a.len().min(b.len());
    if len == 0 {
        return IRRELEVANT;
    }
    let (a, b) = (&a[..len], &b[..len]);

    let (mut dot, mut sum_a, mut sum_b) = (0.0f64, 0.0f64, 0.0f64);
    for (&x, &y) in a.iter().zip(b) {
        let (x, y) = (f64::from(x), f64::from(y));
        dot += x * y;
        sum_a += x * x;
        sum_b += y * y;
    }
    if sum_a == 0.0 || sum_b == 0.0 {
        return IRRELEVANT;
    }
    let score = dot / (sum_a.sqrt() * sum_b.sqrt());
    if !score.is_finite() {
        return IRRELEVANT;
    }
    (score as f32).clamp(-1.0, 1.0)
}

/// True when both vectors have the same dimensionality.
#[must_use]
pub fn dimensions_match(a: &[f32], b: &[f32]) -> bool {
    a.len() == b.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn identical_vectors_score_one() {
        let v = [0.3, -0.4, 0.5];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn opposite_vectors_score_minus_one() {
        let s = cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]);
        assert!((s + 1.0).abs() < 1e-6);
    }

    #[test]
    fn orthogonal_vectors_score_zero() {
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
    }

    #[test]
    fn empty_vector_is_sentinel() {
        assert_eq!(cosine_similarity(&[], &[1.0]), IRRELEVANT);
        assert_eq!(cosine_similarity(&[1.0], &[]), IRRELEVANT);
    }

    #[test]
    fn zero_vector_is_sentinel() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), IRRELEVANT);
    }

    #[test]
    fn mismatched_lengths_truncate_to_shorter() {
        let s = cosine_similarity(&[1.0, 0.0, 5.0], &[1.0, 0.0]);
        assert!((s - 1.0).abs() < 1e-6);
        assert!(!dimensions_match(&[1.0, 0.0, 5.0], &[1.0, 0.0]));
    }

    #[test]
    fn tiny_and_huge_components_keep_their_direction() {
        let tiny = [1e-30f32, 2e-30];
        assert!((cosine_similarity(&tiny, &tiny) - 1.0).abs() < 1e-6);
        let huge = [3e30f32, -1e30];
        assert!((cosine_similarity(&huge, &huge) - 1.0).abs() < 1e-6);
        assert!((cosine_similarity(&huge, &[-3e30, 1e30]) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn non_finite_component_is_sentinel() {
        assert_eq!(cosine_similarity(&[f32::NAN, 1.0], &[1.0, 1.0]), IRRELEVANT);
        assert_eq!(cosine_similarity(&[f32::INFINITY, 1.0], &[1.0, 1.0]), IRRELEVANT);
    }

    #[test]
    fn truncated_prefix_of_zeros_is_sentinel() {
        assert_eq!(cosine_similarity(&[0.0, 1.0], &[1.0]), IRRELEVANT);
    }

    proptest! {
        #[test]
        fn bounded_for_nonzero_vectors(
            pair in (1usize..32).prop_flat_map(|n| (
                proptest::collection::vec(-100.0f32..100.0, n),
                proptest::collection::vec(-100.0f32..100.0, n),
            ))
        ) {
            let (a, b) = pair;
            let s = cosine_similarity(&a, &b);
            prop_assert!((-1.0..=1.0).contains(&s));
        }

        #[test]
        fn self_similarity_is_one(v in proptest::collection::vec(0.5f32..10.0, 1..32)) {
            prop_assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-4);
        }

        #[test]
        fn extreme_magnitudes_stay_bounded_and_self_similar(
            pair in (1usize..32).prop_flat_map(|n| (
                proptest::collection::vec(0.5f32..10.0, n),
                proptest::collection::vec(-10.0f32..10.0, n),
            )),
            exponent in -35i32..=35,
        ) {
            let scale = 10f32.powi(exponent);
            let a: Vec<f32> = pair.0.iter().map(|x| x * scale).collect();
            let b: Vec<f32> = pair.1.iter().map(|x| x * scale).collect();
            prop_assert!((cosine_similarity(&a, &a) - 1.0).abs() < 1e-4);
            let s = cosine_similarity(&a, &b);
            prop_assert!(s.is_finite());
            prop_assert!((-1.0..=1.0).contains(&s));
        }
    }
}
