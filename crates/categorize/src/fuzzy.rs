use std::cmp::Ordering;

/// Similarity threshold below which a candidate merchant is not considered
/// a plausible alternate spelling.
pub const DEFAULT_MIN_SIMILARITY: f32 = 0.85;

/// At most this many candidates are kept per queried merchant.
pub const MAX_MATCHES: usize = 5;

/// Normalized Levenshtein similarity in [0.0, 1.0]: identical strings score
/// 1.0, strings with nothing in common approach 0.0. Computed over Unicode
/// scalar values, since merchant names here are routinely accented.
pub fn calculate_similarity(a: &str, b: &str) -> f32 {
    if a == b {
        return 1.0;
    }

    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let max_len = a.len().max(b.len());
    if max_len == 0 {
        return 1.0;
    }

    1.0 - (edit_distance(&a, &b) as f32 / max_len as f32)
}

/// Levenshtein distance over one working row, updated in place. `row[k]`
/// holds the distance from `query[..i]` to `target[..k]`; the value the
/// update overwrites is carried along as the diagonal for the next cell.
fn edit_distance(query: &[char], target: &[char]) -> usize {
    let mut row: Vec<usize> = (0..=target.len()).collect();

    for (i, &qc) in query.iter().enumerate() {
        let mut diagonal = row[0];
        row[0] = i + 1;

        for (k, &tc) in target.iter().enumerate() {
            let replace = if qc == tc { diagonal } else { diagonal + 1 };
            let insert = row[k] + 1;
            let delete = row[k + 1] + 1;
            diagonal = row[k + 1];
            row[k + 1] = replace.min(insert).min(delete);
        }
    }

    row[target.len()]
}

/// Score `query` against every candidate, keep those at or above
/// `min_similarity`, best first. Ties keep candidate order (stable sort),
/// and the result is capped at [`MAX_MATCHES`].
pub fn find_similar_merchants(
    query: &str,
    candidates: &[String],
    min_similarity: f32,
) -> Vec<(String, f32)> {
    let mut scored: Vec<(String, f32)> = candidates
        .iter()
        .map(|candidate| (candidate.clone(), calculate_similarity(query, candidate)))
        .filter(|(_, score)| *score >= min_similarity)
        .collect();

    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
    scored.truncate(MAX_MATCHES);
    scored
}
