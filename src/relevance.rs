use serde::Serialize;

/// Coarse relevance tier of a hit.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Relevance {
    Low,
    Medium,
    High,
}

impl Relevance {
    pub fn as_str(self) -> &'static str {
        match self {
            Relevance::Low => "low",
            Relevance::Medium => "medium",
            Relevance::High => "high",
        }
    }
}

impl std::fmt::Display for Relevance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// Tier thresholds of one query batch.
///
/// `medium = max / 3` and `high = 2 * max / 3`. A score must be strictly
/// greater than a threshold to reach the tier above it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RelevanceThresholds {
    pub max_score: f32,
    pub medium: f32,
    pub high: f32,
}

impl RelevanceThresholds {
    pub fn from_max(max_score: f32) -> Self {
        Self {
            max_score,
            medium: max_score / 3.0,
            high: 2.0 * max_score / 3.0,
        }
    }

    /// Thresholds for a batch; an empty batch has a max score of zero.
    pub fn from_scores<I>(scores: I) -> Self
    where
        I: IntoIterator<Item = f32>,
    {
        let max = scores.into_iter().fold(0.0_f32, f32::max);
        Self::from_max(max)
    }

    pub fn classify(&self, score: f32) -> Relevance {
        if score > self.high {
            Relevance::High
        } else if score > self.medium {
            Relevance::Medium
        } else {
            Relevance::Low
        }
    }
}

/// Classify a whole batch, computing the thresholds once.
pub fn classify_all(scores: &[f32]) -> Vec<Relevance> {
    let thresholds = RelevanceThresholds::from_scores(scores.iter().copied());
    scores.iter().map(|&s| thresholds.classify(s)).collect()
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn boundary_score_stays_in_lower_tier() {
        let t = RelevanceThresholds::from_scores([9.0, 6.0, 1.0]);
        assert_eq!(t.medium, 3.0);
        assert_eq!(t.high, 6.0);
        assert_eq!(
            classify_all(&[9.0, 6.0, 1.0]),
            vec![Relevance::High, Relevance::Medium, Relevance::Low]
        );
    }

    #[test]
    fn medium_boundary_is_low() {
        let t = RelevanceThresholds::from_max(9.0);
        assert_eq!(t.classify(3.0), Relevance::Low);
        assert_eq!(t.classify(3.5), Relevance::Medium);
    }

    #[test]
    fn single_hit_is_high() {
        assert_eq!(classify_all(&[5.0]), vec![Relevance::High]);
    }

    #[test]
    fn zero_max_is_all_low() {
        assert_eq!(
            classify_all(&[0.0, 0.0]),
            vec![Relevance::Low, Relevance::Low]
        );
    }

    #[test]
    fn empty_batch() {
        let t = RelevanceThresholds::from_scores(std::iter::empty());
        assert_eq!(t.max_score, 0.0);
        assert!(classify_all(&[]).is_empty());
    }

    #[test]
    fn display_matches_serialized_name() {
        for tier in [Relevance::Low, Relevance::Medium, Relevance::High] {
            let json = serde_json::to_string(&tier).unwrap();
            assert_eq!(json, format!("\"{tier}\""));
        }
        assert_eq!(format!("[{:<6}]", Relevance::High), "[high  ]");
    }

    proptest! {
        #[test]
        fn top_score_is_high(scores in prop::collection::vec(0.001f32..1000.0, 1..50)) {
            let t = RelevanceThresholds::from_scores(scores.iter().copied());
            prop_assert_eq!(t.classify(t.max_score), Relevance::High);
        }

        #[test]
        fn tier_is_monotonic(max in 0.0f32..1000.0, a in 0.0f32..1000.0, b in 0.0f32..1000.0) {
            let t = RelevanceThresholds::from_max(max);
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(t.classify(lo) <= t.classify(hi));
        }
    }
}
