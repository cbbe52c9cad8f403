use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// One weighted entry in a user's interest cloud.
///
/// `(user_id, label)` is unique after normalization; the weight accumulates
/// and is only ever decreased through an explicit adjustment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InterestTag {
    pub id: Uuid,
    pub user_id: Uuid,
    pub label: String,
    pub weight: f64,
    pub last_used_at: DateTime<Utc>,
}

/// Sort order for interest cloud reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagOrder {
    Weight,
    Date,
}

impl TagOrder {
    #[must_use]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "weight" => Some(TagOrder::Weight),
            "date" => Some(TagOrder::Date),
            _ => None,
        }
    }
}

/// Append-only timing sample for one completed pipeline stage.
#[derive(Debug, Clone, PartialEq)]
pub struct NewStageSample {
    pub stage_id: String,
    pub stage_name: String,
    pub item_type: String,
    pub duration_ms: i64,
}

/// Aggregate timing view over [`NewStageSample`] rows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageStats {
    pub stage_name: String,
    pub item_type: String,
    pub sample_count: i64,
    pub avg_duration_ms: f64,
}

/// A previously analyzed document close to a query vector.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimilarDocument {
    pub id: Uuid,
    pub summary: String,
    pub similarity: f64,
}
