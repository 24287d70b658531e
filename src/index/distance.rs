//! Vector distance functions

/// Cosine distance `1 - cos(a, b)`.
///
/// Returns `1.0` (maximal for the index's purposes) when the dimensions
/// differ or either vector has zero norm.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 1.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    let chunks = a.len() / 4;
    for c in 0..chunks {
        let i = c * 4;
        dot += a[i] * b[i] + a[i + 1] * b[i + 1] + a[i + 2] * b[i + 2] + a[i + 3] * b[i + 3];
        norm_a += a[i] * a[i] + a[i + 1] * a[i + 1] + a[i + 2] * a[i + 2] + a[i + 3] * a[i + 3];
        norm_b += b[i] * b[i] + b[i + 1] * b[i + 1] + b[i + 2] * b[i + 2] + b[i + 3] * b[i + 3];
    }
    for i in chunks * 4..a.len() {
        dot += a[i] * b[i];
        norm_a += a[i] * a[i];
        norm_b += b[i] * b[i];
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 || !denom.is_finite() {
        return 1.0;
    }

    1.0 - dot / denom
}

/// Cosine similarity derived from [`cosine_distance`]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    1.0 - cosine_distance(a, b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_vectors() {
        let v = vec![0.3, -1.2, 4.0, 0.5, 2.0];
        assert!(cosine_distance(&v, &v).abs() < 1e-6);
    }

    #[test]
    fn test_orthogonal_vectors() {
        assert!((cosine_distance(&[1.0, 0.0], &[0.0, 1.0]) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_opposite_vectors() {
        assert!((cosine_distance(&[1.0, 2.0, 3.0, 4.0], &[-1.0, -2.0, -3.0, -4.0]) - 2.0).abs() < 1e-5);
    }

    #[test]
    fn test_unrolled_matches_naive() {
        let a: Vec<f32> = (0..13).map(|i| (i as f32 * 0.37).sin()).collect();
        let b: Vec<f32> = (0..13).map(|i| (i as f32 * 0.91).cos()).collect();
        let dot: f32 = a.iter().zip(&b).map(|(x, y)| x * y).sum();
        let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
        let expected = 1.0 - dot / (na * nb);
        assert!((cosine_distance(&a, &b) - expected).abs() < 1e-5);
    }

    #[test]
    fn test_degenerate_inputs_are_maximal() {
        assert_eq!(cosine_distance(&[0.0, 0.0], &[1.0, 0.0]), 1.0);
        assert_eq!(cosine_distance(&[1.0, 0.0, 0.0], &[1.0, 0.0]), 1.0);
        assert_eq!(cosine_distance(&[], &[]), 1.0);
    }
}
