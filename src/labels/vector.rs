//! Embedding vector helpers.

/// Cosine similarity between two embeddings.
///
/// Returns 0.0 for mismatched lengths, empty vectors, or zero norms.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (&x, &y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// L2-normalized mean of a set of embeddings.
///
/// Vectors whose length differs from the first are skipped. Returns None
/// when there is nothing to average or the mean is the zero vector.
pub fn centroid<'a>(embeddings: impl IntoIterator<Item = &'a [f32]>) -> Option<Vec<f32>> {
    let mut iter = embeddings.into_iter();
    let first = iter.next()?;
    if first.is_empty() {
        return None;
    }

    let mut sum = first.to_vec();
    let mut count = 1usize;
    for embedding in iter {
        if embedding.len() != sum.len() {
            continue;
        }
        for (acc, &v) in sum.iter_mut().zip(embedding) {
            *acc += v;
        }
        count += 1;
    }

    let n = count as f32;
    for v in &mut sum {
        *v /= n;
    }

    let norm = sum.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm <= 1e-10 {
        return None;
    }
    for v in &mut sum {
        *v /= norm;
    }
    Some(sum)
}
