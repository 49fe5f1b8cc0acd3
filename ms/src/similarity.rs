//! Similarity scoring
//!
//! Lexical cosine over term frequencies stands in for a dense embedding model.
//! When both sides carry an embedding of the same dimension, the embedding
//! cosine is used instead.

use std::collections::HashMap;

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "i", "in", "is", "it", "me", "my", "of", "on",
    "or", "our", "so", "that", "the", "this", "to", "we", "with", "you",
];

/// Lowercased alphanumeric tokens with stopwords removed
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .filter(|t| !STOPWORDS.contains(&t.as_str()))
        .collect()
}

fn term_frequencies(text: &str) -> HashMap<String, f32> {
    let mut tf = HashMap::new();
    for token in tokenize(text) {
        *tf.entry(token).or_insert(0.0) += 1.0;
    }
    tf
}

/// Cosine similarity of the two texts' term-frequency vectors, in `[0, 1]`
pub fn lexical_cosine(a: &str, b: &str) -> f32 {
    let ta = term_frequencies(a);
    let tb = term_frequencies(b);
    if ta.is_empty() || tb.is_empty() {
        return 0.0;
    }

    let dot: f32 = ta.iter().filter_map(|(term, wa)| tb.get(term).map(|wb| wa * wb)).sum();
    let norm_a = ta.values().map(|w| w * w).sum::<f32>().sqrt();
    let norm_b = tb.values().map(|w| w * w).sum::<f32>().sqrt();
    dot / (norm_a * norm_b)
}

/// Cosine similarity of two embeddings, `None` when dimensions differ or a
/// vector is all zeros
pub fn embedding_cosine(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return None;
    }
    Some(dot / (norm_a * norm_b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_drops_stopwords_and_punctuation() {
        assert_eq!(tokenize("Drive to Big Sur, then camp!"), vec!["drive", "big", "sur", "then", "camp"]);
    }

    #[test]
    fn test_identical_text_scores_one() {
        let score = lexical_cosine("camping near Big Sur", "camping near Big Sur");
        assert!((score - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_disjoint_text_scores_zero() {
        assert_eq!(lexical_cosine("wine tasting", "desert hiking"), 0.0);
        assert_eq!(lexical_cosine("", "desert hiking"), 0.0);
    }

    #[test]
    fn test_partial_overlap_ranks_between() {
        let close = lexical_cosine("big sur camping", "camping in big sur with dogs");
        let far = lexical_cosine("big sur camping", "napa wine tasting with friends");
        assert!(close > far);
        assert!(close < 1.0);
    }

    #[test]
    fn test_embedding_cosine_dimension_mismatch() {
        assert_eq!(embedding_cosine(&[1.0, 0.0], &[1.0]), None);
        assert_eq!(embedding_cosine(&[0.0, 0.0], &[1.0, 0.0]), None);
        let same = embedding_cosine(&[0.5, 0.5], &[1.0, 1.0]).unwrap();
        assert!((same - 1.0).abs() < 1e-5);
    }
}
