//! Fuzzy duplicate detection over interest labels.
//!
//! The cascade runs rule by rule over the whole tag set, first match wins:
//! exact, synonym table, containment, edit-distance similarity. It is a
//! read-only decision function; "no duplicate" is an expected outcome, not an
//! error.

use strsim::normalized_levenshtein;
use unicode_segmentation::UnicodeSegmentation;

use super::normalize::normalize_label;
use super::synonyms::SynonymTable;
use crate::store::models::InterestTag;

/// Normalized Levenshtein similarity at or above this ratio merges two labels.
pub const EDIT_SIMILARITY_THRESHOLD: f64 = 0.85;

/// Shortest shared word that counts as overlap in the scoring cascade.
/// Filters out incidental shared particles ("of", "the").
pub const MIN_OVERLAP_WORD_LEN: usize = 4;

/// Find the existing tag a candidate label should merge into, if any.
///
/// Containment merges only toward the *shorter* (more general) label: a
/// candidate longer than an existing entry merges into it, while an existing
/// entry longer than the candidate never forces a merge. A short acronym can
/// therefore still be captured by an unrelated longer phrase it happens to
/// contain; see the tests for the observed behavior.
#[must_use]
pub fn find_duplicate<'a>(
    candidate: &str,
    existing: &'a [InterestTag],
    synonyms: &SynonymTable,
) -> Option<&'a InterestTag> {
    let candidate = normalize_label(candidate);
    if candidate.is_empty() {
        return None;
    }

    // 1. Exact match on the normalized form.
    if let Some(tag) = existing
        .iter()
        .find(|tag| normalize_label(&tag.label) == candidate)
    {
        return Some(tag);
    }

    // 2. Same synonym equivalence class.
    if let Some(tag) = existing
        .iter()
        .find(|tag| synonyms.same_group(&candidate, &tag.label))
    {
        return Some(tag);
    }

    // 3. Containment, merging into the shorter existing label only.
    if let Some(tag) = existing.iter().find(|tag| {
        let label = normalize_label(&tag.label);
        !label.is_empty() && candidate.len() > label.len() && candidate.contains(&label)
    }) {
        return Some(tag);
    }

    // 4. Edit-distance similarity.
    existing.iter().find(|tag| {
        normalized_levenshtein(&candidate, &normalize_label(&tag.label))
            >= EDIT_SIMILARITY_THRESHOLD
    })
}

/// Whether an article theme counts as matching a tag label for scoring.
///
/// Looser than [`find_duplicate`]: containment applies in either direction
/// and a significant shared word also counts, since scoring compares two
/// freshly extracted vocabularies rather than deciding a merge.
#[must_use]
pub fn scoring_match(theme: &str, label: &str, synonyms: &SynonymTable) -> bool {
    let theme = normalize_label(theme);
    let label = normalize_label(label);
    if theme.is_empty() || label.is_empty() {
        return false;
    }

    if theme == label || synonyms.same_group(&theme, &label) {
        return true;
    }

    if theme.contains(&label) || label.contains(&theme) {
        return true;
    }

    if shares_significant_word(&theme, &label) {
        return true;
    }

    normalized_levenshtein(&theme, &label) >= EDIT_SIMILARITY_THRESHOLD
}

fn shares_significant_word(a: &str, b: &str) -> bool {
    a.unicode_words()
        .filter(|word| word.chars().count() >= MIN_OVERLAP_WORD_LEN)
        .any(|word| b.unicode_words().any(|other| other == word))
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::*;

    fn tag(label: &str) -> InterestTag {
        InterestTag {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            label: label.to_string(),
            weight: 1.0,
            last_used_at: Utc::now(),
        }
    }

    #[test]
    fn exact_match_wins_over_later_rules() {
        let synonyms = SynonymTable::with_defaults();
        let tags = vec![tag("machine learning"), tag("ml")];

        let found = find_duplicate("Machine  Learning", &tags, &synonyms).expect("match");
        assert_eq!(found.label, "machine learning");
    }

    #[test]
    fn synonym_match_is_symmetric() {
        let synonyms = SynonymTable::with_defaults();
        let a = vec![tag("artificial intelligence")];
        let b = vec![tag("ai")];

        assert!(find_duplicate("ai", &a, &synonyms).is_some());
        assert!(find_duplicate("artificial intelligence", &b, &synonyms).is_some());
    }

    #[test]
    fn longer_candidate_merges_into_shorter_existing() {
        let synonyms = SynonymTable::with_defaults();
        let tags = vec![tag("rust")];

        let found = find_duplicate("rust programming", &tags, &synonyms).expect("match");
        assert_eq!(found.label, "rust");
    }

    #[test]
    fn shorter_candidate_does_not_merge_into_longer_existing() {
        let synonyms = SynonymTable::with_defaults();
        let tags = vec![tag("rust programming")];

        assert!(find_duplicate("rust", &tags, &synonyms).is_none());
    }

    #[test]
    fn acronym_candidate_can_be_captured_by_containing_phrase() {
        // Observed behavior of the containment rule: a short acronym that is
        // a substring of nothing stays unmerged, but a long candidate that
        // happens to contain a short unrelated entry merges into it.
        let synonyms = SynonymTable::with_defaults();
        let tags = vec![tag("go")];

        let found = find_duplicate("google cloud", &tags, &synonyms);
        assert!(found.is_some());
    }

    #[test]
    fn near_identical_labels_merge_by_edit_distance() {
        let synonyms = SynonymTable::with_defaults();
        let tags = vec![tag("kubernetes")];

        let found = find_duplicate("kubernets", &tags, &synonyms).expect("match");
        assert_eq!(found.label, "kubernetes");
    }

    #[test]
    fn dissimilar_labels_do_not_merge() {
        let synonyms = SynonymTable::with_defaults();
        let tags = vec![tag("gardening")];

        assert!(find_duplicate("rust", &tags, &synonyms).is_none());
    }

    #[test]
    fn threshold_boundary_is_inclusive() {
        let synonyms = SynonymTable::with_defaults();
        // "abcdefghij" vs "abcdefghiX": distance 1 over max_len 10 = 0.9.
        let tags = vec![tag("abcdefghij")];
        assert!(find_duplicate("abcdefghix", &tags, &synonyms).is_some());

        // Distance 2 over max_len 10 = 0.8, below the 0.85 threshold.
        assert!(find_duplicate("abcdefghxx", &tags, &synonyms).is_none());
    }

    #[test]
    fn scoring_match_allows_either_direction_containment_and_word_overlap() {
        let synonyms = SynonymTable::with_defaults();

        assert!(scoring_match("rust", "rust programming", &synonyms));
        assert!(scoring_match("rust programming", "rust", &synonyms));
        assert!(scoring_match("quantum computing", "cloud computing", &synonyms));
        assert!(!scoring_match("art of war", "state of mind", &synonyms));
    }
}
