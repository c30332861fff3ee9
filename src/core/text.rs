//! Pairwise TF-IDF text similarity.
//!
//! The vector space is built from the two compared strings alone, so a pair's
//! score never depends on the rest of the dataset.

use std::collections::{BTreeMap, BTreeSet};

/// Shortest token kept by the tokenizer.
const MIN_TOKEN_LEN: usize = 2;

/// Similarity of two free-text fields as a percentage in `[0, 100]`.
///
/// Returns 0 when both strings are blank, or when neither contains a usable
/// token. Symmetric in its arguments.
pub fn text_similarity(a: &str, b: &str) -> f64 {
    let a = a.trim();
    let b = b.trim();

    if a.is_empty() && b.is_empty() {
        return 0.0;
    }

    match TfIdfPair::fit(a, b) {
        Some(pair) => (pair.cosine() * 100.0).clamp(0.0, 100.0),
        None => {
            log::debug!(
                "No vocabulary to vectorize text1: '{}', text2: '{}'",
                a,
                b
            );
            0.0
        }
    }
}

/// Lowercased word tokens of at least two characters.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|token| token.chars().count() >= MIN_TOKEN_LEN)
        .map(str::to_string)
        .collect()
}

/// L2-normalised TF-IDF vectors of two documents over their shared vocabulary.
struct TfIdfPair {
    left: Vec<f64>,
    right: Vec<f64>,
}

impl TfIdfPair {
    fn fit(a: &str, b: &str) -> Option<Self> {
        let left_counts = term_counts(a);
        let right_counts = term_counts(b);

        // sorted so both argument orders walk the same dimensions
        let vocabulary: BTreeSet<&str> = left_counts
            .keys()
            .chain(right_counts.keys())
            .map(String::as_str)
            .collect();
        if vocabulary.is_empty() {
            return None;
        }

        let n_docs = 2.0_f64;
        let mut left = Vec::with_capacity(vocabulary.len());
        let mut right = Vec::with_capacity(vocabulary.len());

        for term in vocabulary {
            let tf_left = left_counts.get(term).copied().unwrap_or(0) as f64;
            let tf_right = right_counts.get(term).copied().unwrap_or(0) as f64;
            let df = [tf_left, tf_right].iter().filter(|tf| **tf > 0.0).count() as f64;
            // smoothed idf, as if one extra document contained every term
            let idf = ((1.0 + n_docs) / (1.0 + df)).ln() + 1.0;

            left.push(tf_left * idf);
            right.push(tf_right * idf);
        }

        normalize(&mut left);
        normalize(&mut right);
        Some(Self { left, right })
    }

    fn cosine(&self) -> f64 {
        // both sides are unit length (or all zero), so the dot product is the cosine
        self.left
            .iter()
            .zip(&self.right)
            .map(|(l, r)| l * r)
            .sum()
    }
}

fn term_counts(text: &str) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for token in tokenize(text) {
        *counts.entry(token).or_insert(0) += 1;
    }
    counts
}

fn normalize(vector: &mut [f64]) {
    let norm = vector.iter().map(|v| v * v).sum::<f64>().sqrt();
    if norm > 0.0 {
        vector.iter_mut().for_each(|v| *v /= norm);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_inputs_score_zero() {
        assert_eq!(text_similarity("", ""), 0.0);
        assert_eq!(text_similarity("   ", "\n\t"), 0.0);
        assert_eq!(text_similarity("", "hello"), 0.0);
        assert_eq!(text_similarity("hello", ""), 0.0);
    }

    #[test]
    fn test_no_vocabulary_scores_zero() {
        // single characters and punctuation never become tokens
        assert_eq!(text_similarity("a b c", "! ? x"), 0.0);
    }

    #[test]
    fn test_identical_text_scores_hundred() {
        let score = text_similarity("iPhone 13 Pro Max", "  iphone 13 pro max ");
        assert!((score - 100.0).abs() < 1e-9, "score = {}", score);
    }

    #[test]
    fn test_disjoint_text_scores_zero() {
        assert_eq!(text_similarity("red bicycle", "wooden table"), 0.0);
    }

    #[test]
    fn test_symmetry() {
        let samples = [
            ("Brand new Nintendo Switch OLED", "Nintendo Switch OLED, used twice"),
            ("IKEA desk", "ikea desk white desk"),
            ("", "something"),
            ("baby stroller", "Baby Stroller for sale"),
        ];
        for (a, b) in samples {
            assert_eq!(text_similarity(a, b), text_similarity(b, a), "{} / {}", a, b);
        }
    }

    #[test]
    fn test_partial_overlap_matches_reference_weights() {
        // vocabulary {pro, iphone, max}: idf(shared) = 1, idf(max) = ln(1.5) + 1
        let score = text_similarity("iphone pro", "iphone pro max");
        let idf_max = 1.5_f64.ln() + 1.0;
        let expected = 2.0 / (2.0_f64.sqrt() * (2.0 + idf_max * idf_max).sqrt()) * 100.0;
        assert!((score - expected).abs() < 1e-9, "{} vs {}", score, expected);
        assert!(score > 50.0 && score < 100.0);
    }

    #[test]
    fn test_tokenize_keeps_combining_vowel_signs_inside_words() {
        assert_eq!(tokenize("सोनी टीवी"), vec!["सोनी", "टीवी"]);
        assert_eq!(tokenize("ソニー テレビ"), vec!["ソニー", "テレビ"]);

        let same = text_similarity("सोनी टीवी 55", "सोनी टीवी 55");
        assert!((same - 100.0).abs() < 1e-9);
        assert_eq!(text_similarity("सोनी", "टीवी"), 0.0);
    }

    #[test]
    fn test_tokenize_drops_single_characters() {
        assert_eq!(
            tokenize("A 4K TV, size: 55\"  x_y"),
            vec!["4k", "tv", "size", "55", "x_y"]
        );
    }
}
