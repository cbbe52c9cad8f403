//! Nearest-neighbor context for relevance verdicts.
//!
//! Wraps the vector store's cosine search: distances come back converted to
//! a `[0, 1]` similarity and re-filtered client-side, guarding against
//! boundary rounding at the store layer. No neighbor above the threshold is
//! a valid empty result.

use std::sync::Arc;

use anyhow::Result;
use uuid::Uuid;

use crate::store::dao::VectorDao;
use crate::store::models::SimilarDocument;

/// Default similarity cutoff for "documents like this you engaged with".
pub const DEFAULT_MIN_SIMILARITY: f64 = 0.55;

/// Default neighbor count attached to a verdict.
pub const DEFAULT_NEIGHBOR_LIMIT: i64 = 5;

pub struct SimilarityAugmentor {
    vectors: Arc<VectorDao>,
}

impl SimilarityAugmentor {
    #[must_use]
    pub fn new(vectors: Arc<VectorDao>) -> Self {
        Self { vectors }
    }

    /// Retrieve prior documents close to the query vector.
    pub async fn find_similar(
        &self,
        query: &[f32],
        owner: Option<Uuid>,
        exclude: Option<Uuid>,
        limit: i64,
        min_similarity: f64,
    ) -> Result<Vec<SimilarDocument>> {
        if query.is_empty() {
            return Ok(Vec::new());
        }

        let neighbors = self
            .vectors
            .similarity_search(query, owner, exclude, limit)
            .await?;

        Ok(neighbors
            .into_iter()
            .map(|row| SimilarDocument {
                id: row.id,
                summary: row.summary,
                similarity: distance_to_similarity(row.distance),
            })
            .filter(|doc| doc.similarity >= min_similarity)
            .collect())
    }
}

/// Convert a cosine distance to a `[0, 1]` similarity.
fn distance_to_similarity(distance: f64) -> f64 {
    (1.0 - distance).clamp(0.0, 1.0)
}
