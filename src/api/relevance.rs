use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::{
    app::AppState,
    interest::cloud::TagQuery,
    interest::matcher::{ComparisonResult, FeedbackSignal},
    interest::similarity::{DEFAULT_MIN_SIMILARITY, DEFAULT_NEIGHBOR_LIMIT},
    store::models::SimilarDocument,
};

#[derive(Debug, Deserialize)]
pub(crate) struct ScoreRelevanceRequest {
    user_id: Uuid,
    themes: Vec<String>,
    /// Embedding of the candidate document; enables the similar-context
    /// enrichment when present.
    #[serde(default)]
    vector: Option<Vec<f32>>,
    /// Exclude this document from the neighbor lookup (typically the
    /// candidate itself when it was already stored).
    #[serde(default)]
    exclude_document_id: Option<Uuid>,
    /// Prior explicit reactions correlated by theme overlap.
    #[serde(default)]
    feedback: Option<Vec<FeedbackSignal>>,
}

#[derive(Debug, Serialize)]
struct ScoreRelevanceResponse {
    user_id: Uuid,
    #[serde(flatten)]
    comparison: ComparisonResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    similar_documents: Option<Vec<SimilarDocument>>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

pub(crate) async fn score(
    State(state): State<AppState>,
    Json(payload): Json<ScoreRelevanceRequest>,
) -> impl IntoResponse {
    let tags = match state
        .cloud()
        .get_tags(payload.user_id, TagQuery::default())
        .await
    {
        Ok(tags) => tags,
        Err(error) => {
            let body = Json(ErrorResponse {
                error: format!("failed to read interest cloud: {error:#}"),
            });
            return (StatusCode::INTERNAL_SERVER_ERROR, body).into_response();
        }
    };

    let comparison = state
        .matcher()
        .score(&payload.themes, &tags, payload.feedback.as_deref());
    state.telemetry().metrics().relevance_scored.inc();

    // Optional enrichment; a degraded lookup never fails the scoring call.
    let similar_documents = match &payload.vector {
        Some(vector) => {
            match state
                .augmentor()
                .find_similar(
                    vector,
                    Some(payload.user_id),
                    payload.exclude_document_id,
                    DEFAULT_NEIGHBOR_LIMIT,
                    DEFAULT_MIN_SIMILARITY,
                )
                .await
            {
                Ok(similar) => Some(similar),
                Err(error) => {
                    state.telemetry().metrics().augmentation_skipped.inc();
                    warn!(user_id = %payload.user_id, error = %error, "similarity context skipped");
                    None
                }
            }
        }
        None => None,
    };

    let body = Json(ScoreRelevanceResponse {
        user_id: payload.user_id,
        comparison,
        similar_documents,
    });

    (StatusCode::OK, body).into_response()
}
