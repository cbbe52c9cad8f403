//! Relevance scoring of article themes against a user's interest cloud.
//!
//! The scoring constants are hand-tuned and deliberately live here as named
//! values so boundary behavior can be asserted exactly in tests.

use serde::Serialize;

use super::dedup::scoring_match;
use super::synonyms::SynonymTable;
use crate::store::models::InterestTag;

/// Weight of the matched-theme ratio in the base score.
pub const ARTICLE_RATIO_WEIGHT: f64 = 80.0;

/// Weight of the matched-tag-weight ratio in the base score.
pub const WEIGHT_RATIO_WEIGHT: f64 = 20.0;

/// Score floors by absolute matched-theme count, highest threshold first.
/// Corrects the base formula under-rewarding large, diffuse clouds where the
/// weight ratio dilutes true matches.
pub const MATCH_COUNT_FLOORS: &[(usize, u8)] = &[(8, 60), (5, 45), (3, 30)];

/// Matched-ratio threshold for the high-overlap floor.
pub const HIGH_OVERLAP_RATIO: f64 = 0.6;

/// Minimum matched-theme count for the high-overlap floor.
pub const HIGH_OVERLAP_MIN_MATCHES: usize = 5;

/// Bounded score adjustment contributed by one matched theme with prior
/// explicit feedback.
pub const FEEDBACK_ADJUST_PER_THEME: f64 = 0.25;

/// One article theme that matched a cloud entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchedTheme {
    pub theme: String,
    pub matched_tag: String,
    pub tag_weight: f64,
}

/// Outcome of scoring one document against one cloud. Produced fresh per
/// call; never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonResult {
    pub match_percentage: u8,
    pub matched_themes: Vec<MatchedTheme>,
    pub unmatched_themes: Vec<String>,
    pub has_no_tags: bool,
}

impl ComparisonResult {
    fn empty(has_no_tags: bool, unmatched: Vec<String>) -> Self {
        Self {
            match_percentage: 0,
            matched_themes: Vec::new(),
            unmatched_themes: unmatched,
            has_no_tags,
        }
    }
}

/// Prior explicit reaction to a document, correlated by theme overlap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Negative,
    Neutral,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
pub struct FeedbackSignal {
    pub themes: Vec<String>,
    pub sentiment: Sentiment,
}

pub struct RelevanceMatcher {
    synonyms: std::sync::Arc<SynonymTable>,
}

impl RelevanceMatcher {
    #[must_use]
    pub fn new(synonyms: std::sync::Arc<SynonymTable>) -> Self {
        Self { synonyms }
    }

    /// Score article themes against a user's tags.
    ///
    /// Deterministic and pure; the optional feedback slice is the only
    /// external signal, and the function is fully testable without it.
    #[must_use]
    pub fn score(
        &self,
        article_themes: &[String],
        user_tags: &[InterestTag],
        feedback: Option<&[FeedbackSignal]>,
    ) -> ComparisonResult {
        if article_themes.is_empty() {
            return ComparisonResult::empty(false, Vec::new());
        }

        // An empty cloud is a distinct caller-significant state: invite the
        // user to build one instead of reporting "irrelevant".
        if user_tags.is_empty() {
            return ComparisonResult::empty(true, article_themes.to_vec());
        }

        let mut matched_themes = Vec::new();
        let mut unmatched_themes = Vec::new();

        for theme in article_themes {
            let hit = user_tags
                .iter()
                .find(|tag| scoring_match(theme, &tag.label, &self.synonyms));
            match hit {
                Some(tag) => matched_themes.push(MatchedTheme {
                    theme: theme.clone(),
                    matched_tag: tag.label.clone(),
                    tag_weight: tag.weight,
                }),
                None => unmatched_themes.push(theme.clone()),
            }
        }

        let matched_count = matched_themes.len();
        let article_ratio = matched_count as f64 / article_themes.len() as f64;

        let total_weight: f64 = user_tags.iter().map(|tag| tag.weight).sum();
        let matched_weight: f64 = matched_themes.iter().map(|m| m.tag_weight).sum();
        let weight_ratio = if total_weight > 0.0 {
            matched_weight / total_weight
        } else {
            0.0
        };

        let base =
            (article_ratio * ARTICLE_RATIO_WEIGHT + weight_ratio * WEIGHT_RATIO_WEIGHT).round();

        let mut score = base;

        // Step-function floors by absolute match count.
        for &(min_matches, floor) in MATCH_COUNT_FLOORS {
            if matched_count >= min_matches {
                score = score.max(f64::from(floor));
                break;
            }
        }

        // High-overlap floor for documents that land most of their themes.
        if article_ratio >= HIGH_OVERLAP_RATIO && matched_count >= HIGH_OVERLAP_MIN_MATCHES {
            score = score.max((article_ratio * 100.0).round());
        }

        if let Some(signals) = feedback {
            score += feedback_adjustment(&matched_themes, signals);
        }

        let match_percentage = score.round().clamp(0.0, 100.0) as u8;

        ComparisonResult {
            match_percentage,
            matched_themes,
            unmatched_themes,
            has_no_tags: false,
        }
    }
}

/// Bounded adjustment from prior explicit reactions: ±0.25 per matched theme
/// that overlaps a feedback signal's themes.
fn feedback_adjustment(matched: &[MatchedTheme], signals: &[FeedbackSignal]) -> f64 {
    use super::normalize::normalize_label;

    let mut adjustment = 0.0;
    for matched_theme in matched {
        let theme = normalize_label(&matched_theme.theme);
        for signal in signals {
            let overlaps = signal
                .themes
                .iter()
                .any(|candidate| normalize_label(candidate) == theme);
            if !overlaps {
                continue;
            }
            match signal.sentiment {
                Sentiment::Positive => adjustment += FEEDBACK_ADJUST_PER_THEME,
                Sentiment::Negative => adjustment -= FEEDBACK_ADJUST_PER_THEME,
                Sentiment::Neutral => {}
            }
            break;
        }
    }
    adjustment
}
