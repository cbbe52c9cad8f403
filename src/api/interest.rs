use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::{
    app::AppState,
    interest::cloud::{TagQuery, UpsertOptions},
    store::models::{InterestTag, TagOrder},
};

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RecordInterestRequest {
    user_id: Uuid,
    themes: Vec<String>,
    /// Explicit comments and other high-signal sources carry a larger
    /// weight increment than passively analyzed documents.
    #[serde(default)]
    high_signal: bool,
}

pub(crate) async fn record(
    State(state): State<AppState>,
    Json(payload): Json<RecordInterestRequest>,
) -> impl IntoResponse {
    if payload.themes.is_empty() {
        let body = Json(ErrorResponse {
            error: "themes array must include at least one value".into(),
        });
        return (StatusCode::BAD_REQUEST, body).into_response();
    }

    let options = if payload.high_signal {
        UpsertOptions::high_signal()
    } else {
        UpsertOptions::default()
    };

    let summary = state
        .cloud()
        .upsert_batch(payload.user_id, &payload.themes, options)
        .await;

    info!(
        user_id = %payload.user_id,
        created = summary.created,
        merged = summary.merged,
        "interest recorded"
    );

    (StatusCode::OK, Json(summary)).into_response()
}

#[derive(Debug, Deserialize)]
pub(crate) struct CloudQuery {
    user_id: Uuid,
    #[serde(default)]
    limit: Option<usize>,
    #[serde(default)]
    sort_by: Option<String>,
}

#[derive(Debug, Serialize)]
struct CloudResponse {
    user_id: Uuid,
    tags: Vec<InterestTag>,
}

pub(crate) async fn get_cloud(
    State(state): State<AppState>,
    Query(query): Query<CloudQuery>,
) -> impl IntoResponse {
    let order = match query.sort_by.as_deref() {
        None => TagOrder::Weight,
        Some(raw) => match TagOrder::from_str(raw) {
            Some(order) => order,
            None => {
                let body = Json(ErrorResponse {
                    error: format!("unknown sort_by value: {raw}"),
                });
                return (StatusCode::BAD_REQUEST, body).into_response();
            }
        },
    };

    let tag_query = TagQuery {
        limit: query.limit.unwrap_or(TagQuery::default().limit),
        order,
    };

    match state.cloud().get_tags(query.user_id, tag_query).await {
        Ok(tags) => (
            StatusCode::OK,
            Json(CloudResponse {
                user_id: query.user_id,
                tags,
            }),
        )
            .into_response(),
        Err(error) => {
            let body = Json(ErrorResponse {
                error: format!("failed to read interest cloud: {error:#}"),
            });
            (StatusCode::INTERNAL_SERVER_ERROR, body).into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct OwnerQuery {
    user_id: Uuid,
}

#[derive(Debug, Serialize)]
struct DeleteResponse {
    deleted: bool,
}

pub(crate) async fn delete_tag(
    State(state): State<AppState>,
    Path(tag_id): Path<Uuid>,
    Query(query): Query<OwnerQuery>,
) -> impl IntoResponse {
    match state.cloud().delete_tag(query.user_id, tag_id).await {
        Ok(deleted) => (StatusCode::OK, Json(DeleteResponse { deleted })).into_response(),
        Err(error) => {
            let body = Json(ErrorResponse {
                error: format!("failed to delete tag: {error:#}"),
            });
            (StatusCode::INTERNAL_SERVER_ERROR, body).into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct AdjustTagRequest {
    user_id: Uuid,
    delta: f64,
}

#[derive(Debug, Serialize)]
struct AdjustResponse {
    adjusted: bool,
}

/// External negative-feedback signal: the only path that may lower a weight.
pub(crate) async fn adjust_tag(
    State(state): State<AppState>,
    Path(tag_id): Path<Uuid>,
    Json(payload): Json<AdjustTagRequest>,
) -> impl IntoResponse {
    match state
        .cloud()
        .adjust_weight(payload.user_id, tag_id, payload.delta)
        .await
    {
        Ok(adjusted) => (StatusCode::OK, Json(AdjustResponse { adjusted })).into_response(),
        Err(error) => {
            let body = Json(ErrorResponse {
                error: format!("failed to adjust tag: {error:#}"),
            });
            (StatusCode::INTERNAL_SERVER_ERROR, body).into_response()
        }
    }
}
