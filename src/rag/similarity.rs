/// Cosine similarity clamped to [0, 1]. Vectors of different dimensionality,
/// empty vectors and zero vectors score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let (mut dot, mut norm_a, mut norm_b) = (0.0f64, 0.0f64, 0.0f64);
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    let similarity = dot / (norm_a.sqrt() * norm_b.sqrt());
    if similarity.is_nan() {
        return 0.0;
    }
    similarity.clamp(0.0, 1.0) as f32
}

/// Map a similarity through a piecewise-linear table of `[similarity, confidence]`
/// points sorted by similarity. Values outside the table clamp to its ends.
pub fn confidence_from_table(table: &[[f32; 2]], similarity: f32) -> f32 {
    let (Some(first), Some(last)) = (table.first(), table.last()) else {
        return similarity.clamp(0.0, 1.0);
    };
    if similarity <= first[0] {
        return first[1];
    }
    if similarity >= last[0] {
        return last[1];
    }
    for pair in table.windows(2) {
        let ([x0, y0], [x1, y1]) = (pair[0], pair[1]);
        if similarity >= x0 && similarity <= x1 {
            if x1 <= x0 {
                return y1;
            }
            let t = (similarity - x0) / (x1 - x0);
            return (y0 + t * (y1 - y0)).clamp(0.0, 1.0);
        }
    }
    last[1]
}
