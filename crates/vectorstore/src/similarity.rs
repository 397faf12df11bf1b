//! Vector similarity utilities.

/// Cosine similarity of two embeddings, in `[-1, 1]`.
///
/// This is the ranking score of every collection query: results are sorted
/// by it, highest first, and it is reported back as `SearchResult::score`.
/// Mismatched lengths, empty vectors and zero vectors score 0.0; the
/// collection rejects mismatched query dimensions before ranking.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }

    let (dot, sq_a, sq_b) = a.iter().zip(b).fold((0.0f64, 0.0f64, 0.0f64), |(dot, sq_a, sq_b), (&x, &y)| {
        let (x, y) = (f64::from(x), f64::from(y));
        (dot + x * y, sq_a + x * x, sq_b + y * y)
    });

    let denom = sq_a.sqrt() * sq_b.sqrt();
    if denom < 1e-10 {
        0.0
    } else {
        (dot / denom) as f32
    }
}

/// Scale a vector to unit length in place. Zero vectors are left untouched.
pub fn normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| (*x as f64) * (*x as f64)).sum::<f64>().sqrt();
    if norm < 1e-10 {
        return;
    }
    for x in v.iter_mut() {
        *x = (*x as f64 / norm) as f32;
    }
}
