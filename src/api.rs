pub(crate) mod health;
pub(crate) mod interest;
pub(crate) mod jobs;
pub(crate) mod metrics;
pub(crate) mod relevance;

use axum::{
    Router,
    routing::{delete, get, post},
};
use tower_http::trace::TraceLayer;

use crate::app::AppState;

pub(crate) fn router(state: AppState) -> Router {
    Router::new()
        .route("/health/ready", get(health::ready))
        .route("/health/live", get(health::live))
        .route("/metrics", get(metrics::exporter))
        .route("/v1/interest/record", post(interest::record))
        .route("/v1/interest/cloud", get(interest::get_cloud))
        .route("/v1/interest/tags/{tag_id}", delete(interest::delete_tag))
        .route(
            "/v1/interest/tags/{tag_id}/adjust",
            post(interest::adjust_tag),
        )
        .route("/v1/relevance/score", post(relevance::score))
        .route("/v1/analysis/jobs", post(jobs::submit))
        .route("/v1/analysis/jobs/{job_id}", get(jobs::poll))
        .route("/v1/analysis/stages", get(jobs::stage_stats))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
