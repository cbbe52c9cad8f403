use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::{app::AppState, scheduler::pipeline::AnalysisRequest};

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Debug, Serialize)]
struct SubmitJobResponse {
    job_id: Uuid,
    items: usize,
    status: &'static str,
}

/// Accept an analysis job and return its id immediately.
///
/// The pipeline runs as a detached task; progress is retrieved by polling.
/// This avoids holding a client connection open across a minutes-long batch.
pub(crate) async fn submit(
    State(state): State<AppState>,
    Json(payload): Json<AnalysisRequest>,
) -> impl IntoResponse {
    state.telemetry().record_job_submission();

    if payload.items.is_empty() {
        let body = Json(ErrorResponse {
            error: "items array must include at least one document".into(),
        });
        return (StatusCode::BAD_REQUEST, body).into_response();
    }

    let job_id = state.jobs().create(&payload.item_type).await;
    let item_count = payload.items.len();
    let pipeline = state.pipeline();

    tokio::spawn(async move {
        pipeline.run(job_id, payload).await;
    });

    info!(%job_id, items = item_count, "analysis job accepted");

    let body = Json(SubmitJobResponse {
        job_id,
        items: item_count,
        status: "accepted",
    });

    (StatusCode::ACCEPTED, body).into_response()
}

pub(crate) async fn poll(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> impl IntoResponse {
    match state.jobs().snapshot(job_id).await {
        Some(snapshot) => (StatusCode::OK, Json(snapshot)).into_response(),
        None => {
            let body = Json(ErrorResponse {
                error: format!("job {job_id} not found or expired"),
            });
            (StatusCode::NOT_FOUND, body).into_response()
        }
    }
}

/// Aggregate stage timing analytics from persisted samples.
pub(crate) async fn stage_stats(State(state): State<AppState>) -> impl IntoResponse {
    match state.stage_samples().stage_stats().await {
        Ok(stats) => (StatusCode::OK, Json(stats)).into_response(),
        Err(error) => {
            let body = Json(ErrorResponse {
                error: format!("failed to aggregate stage samples: {error:#}"),
            });
            (StatusCode::INTERNAL_SERVER_ERROR, body).into_response()
        }
    }
}
