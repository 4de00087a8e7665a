//! Content-addressed similarity for the reference store: plain token
//! overlap rather than an embedding model, since the real vector store is
//! out of scope for this core. Good enough to rank a handful of candidate
//! memories/conversation turns by relevance to a query.

use std::collections::HashSet;

fn tokenize(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_ascii_lowercase())
        .collect()
}

/// Jaccard similarity between the token sets of `query` and `candidate`,
/// in `[0, 1]`. Two empty token sets are defined as dissimilar (`0.0`)
/// rather than vacuously similar, so an empty query never "matches"
/// everything.
pub fn overlap_score(query: &str, candidate: &str) -> f32 {
    let q = tokenize(query);
    let c = tokenize(candidate);
    if q.is_empty() || c.is_empty() {
        return 0.0;
    }
    let intersection = q.intersection(&c).count();
    let union = q.union(&c).count();
    intersection as f32 / union as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_text_scores_one() {
        assert_eq!(overlap_score("write a parser", "write a parser"), 1.0);
    }

    #[test]
    fn disjoint_text_scores_zero() {
        assert_eq!(overlap_score("write a parser", "bake a cake"), 0.0);
    }

    #[test]
    fn empty_query_never_matches() {
        assert_eq!(overlap_score("", "anything"), 0.0);
    }

    #[test]
    fn partial_overlap_is_between_zero_and_one() {
        let score = overlap_score("write a python scraper", "write a rust parser");
        assert!(score > 0.0 && score < 1.0);
    }
}
