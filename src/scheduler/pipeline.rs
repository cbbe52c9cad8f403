//! Multi-document analysis pipeline.
//!
//! Per document, stages run strictly in order: theme extraction through the
//! call scheduler, then either the interest write path ("I liked this") or
//! relevance scoring ("should I read this"), optionally followed by
//! nearest-neighbor context. Documents run sequentially with a deliberate
//! delay between them; one bad document records an error result and never
//! aborts the batch.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio::time::sleep;
use tracing::{info, warn};
use uuid::Uuid;

use crate::clients::{InferenceError, ThemeExtractorClient};
use crate::interest::cloud::{InterestCloudStore, TagQuery, UpsertOptions};
use crate::interest::matcher::RelevanceMatcher;
use crate::interest::similarity::{
    DEFAULT_MIN_SIMILARITY, DEFAULT_NEIGHBOR_LIMIT, SimilarityAugmentor,
};
use crate::observability::metrics::Metrics;
use crate::scheduler::jobs::{ItemStatus, JobItemResult, JobRegistry};
use crate::scheduler::limiter::CallScheduler;
use crate::store::dao::StageSampleDao;
use crate::store::models::NewStageSample;

/// Stage identifiers; also the `stage_id` recorded in timing samples.
pub const STAGE_EXTRACT: &str = "extract_themes";
pub const STAGE_RECORD: &str = "record_interest";
pub const STAGE_SCORE: &str = "score_relevance";
pub const STAGE_CONTEXT: &str = "similar_context";

/// What the pipeline does with each document's themes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisMode {
    /// Write path: fold the themes into the user's interest cloud.
    Record,
    /// Read path: score the themes against the cached cloud.
    Score,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisItem {
    pub item_id: String,
    pub text: String,
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisRequest {
    pub user_id: Uuid,
    pub mode: AnalysisMode,
    pub item_type: String,
    pub items: Vec<AnalysisItem>,
    #[serde(default)]
    pub high_signal: bool,
}

pub struct AnalysisPipeline {
    extractor: Arc<ThemeExtractorClient>,
    limiter: Arc<CallScheduler>,
    cloud: Arc<InterestCloudStore>,
    matcher: Arc<RelevanceMatcher>,
    augmentor: Arc<SimilarityAugmentor>,
    jobs: Arc<JobRegistry>,
    stage_samples: Arc<StageSampleDao>,
    metrics: Arc<Metrics>,
    item_delay: Duration,
}

impl AnalysisPipeline {
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        extractor: Arc<ThemeExtractorClient>,
        limiter: Arc<CallScheduler>,
        cloud: Arc<InterestCloudStore>,
        matcher: Arc<RelevanceMatcher>,
        augmentor: Arc<SimilarityAugmentor>,
        jobs: Arc<JobRegistry>,
        stage_samples: Arc<StageSampleDao>,
        metrics: Arc<Metrics>,
        item_delay: Duration,
    ) -> Self {
        Self {
            extractor,
            limiter,
            cloud,
            matcher,
            augmentor,
            jobs,
            stage_samples,
            metrics,
            item_delay,
        }
    }

    /// Run one job to completion. The job record is updated as stages
    /// progress; every item lands in the results list with its own status.
    pub async fn run(&self, job_id: Uuid, request: AnalysisRequest) {
        let job_timer = std::time::Instant::now();
        self.jobs.mark_in_progress(job_id).await;
        self.metrics.active_jobs.inc();

        info!(
            %job_id,
            user_id = %request.user_id,
            mode = ?request.mode,
            items = request.items.len(),
            "analysis job started"
        );

        let item_count = request.items.len();
        let mut errored = 0_usize;
        for (index, item) in request.items.iter().enumerate() {
            let result = self.process_item(job_id, &request, item).await;
            if result.status == ItemStatus::Error {
                errored += 1;
            }
            self.jobs.push_result(job_id, result).await;

            // Deliberate inter-document pacing against the inference service.
            if index + 1 < item_count && !self.item_delay.is_zero() {
                sleep(self.item_delay).await;
            }
        }

        // Partial failure still completes the job; only a batch with no
        // surviving item at all is reported as failed.
        if item_count > 0 && errored == item_count {
            self.jobs.fail(job_id, "every item in the batch failed").await;
            self.metrics.jobs_failed.inc();
        } else {
            self.jobs.complete(job_id).await;
            self.metrics.jobs_completed.inc();
        }
        self.metrics.active_jobs.dec();
        self.metrics
            .job_duration
            .observe(job_timer.elapsed().as_secs_f64());

        info!(%job_id, errored, items = item_count, "analysis job finished");
    }

    async fn process_item(
        &self,
        job_id: Uuid,
        request: &AnalysisRequest,
        item: &AnalysisItem,
    ) -> JobItemResult {
        let themes = match self.extract_stage(job_id, request, item).await {
            Ok(themes) => themes,
            Err(result) => return result,
        };

        if themes.is_empty() {
            self.metrics.items_skipped.inc();
            return JobItemResult {
                item_id: item.item_id.clone(),
                status: ItemStatus::Skipped,
                match_percentage: None,
                detail: Some("no extractable signal".to_string()),
            };
        }

        match request.mode {
            AnalysisMode::Record => self.record_stage(job_id, request, item, &themes).await,
            AnalysisMode::Score => self.score_stage(job_id, request, item, &themes).await,
        }
    }

    async fn extract_stage(
        &self,
        job_id: Uuid,
        request: &AnalysisRequest,
        item: &AnalysisItem,
    ) -> Result<Vec<String>, JobItemResult> {
        self.jobs.set_stage(job_id, STAGE_EXTRACT).await;
        self.jobs.stage_started(job_id, STAGE_EXTRACT).await;

        let extraction = self
            .limiter
            .execute(STAGE_EXTRACT, |_| self.extractor.extract_themes(&item.text))
            .await;

        self.finish_stage(job_id, STAGE_EXTRACT, "Extract themes", &request.item_type)
            .await;

        match extraction {
            Ok(themes) => {
                self.metrics.themes_extracted.inc_by(themes.len() as f64);
                Ok(themes)
            }
            Err(error) => {
                if error.downcast_ref::<InferenceError>().is_some_and(|e| {
                    matches!(e, InferenceError::QuotaExhausted)
                }) {
                    self.metrics.quota_exhausted.inc();
                }
                warn!(%job_id, item = %item.item_id, error = %error, "theme extraction failed");
                Err(JobItemResult {
                    item_id: item.item_id.clone(),
                    status: ItemStatus::Error,
                    match_percentage: None,
                    detail: Some(format!("theme extraction failed: {error:#}")),
                })
            }
        }
    }

    async fn record_stage(
        &self,
        job_id: Uuid,
        request: &AnalysisRequest,
        item: &AnalysisItem,
        themes: &[String],
    ) -> JobItemResult {
        self.jobs.set_stage(job_id, STAGE_RECORD).await;
        self.jobs.stage_started(job_id, STAGE_RECORD).await;

        let options = if request.high_signal {
            UpsertOptions::high_signal()
        } else {
            UpsertOptions::default()
        };
        let summary = self
            .cloud
            .upsert_batch(request.user_id, themes, options)
            .await;

        self.finish_stage(job_id, STAGE_RECORD, "Record interest", &request.item_type)
            .await;

        self.metrics.tags_created.inc_by(summary.created as f64);
        self.metrics.tags_merged.inc_by(summary.merged as f64);

        JobItemResult {
            item_id: item.item_id.clone(),
            status: ItemStatus::Completed,
            match_percentage: None,
            detail: Some(format!(
                "created {} merged {} skipped {} errors {}",
                summary.created, summary.merged, summary.skipped, summary.errors
            )),
        }
    }

    async fn score_stage(
        &self,
        job_id: Uuid,
        request: &AnalysisRequest,
        item: &AnalysisItem,
        themes: &[String],
    ) -> JobItemResult {
        self.jobs.set_stage(job_id, STAGE_SCORE).await;
        self.jobs.stage_started(job_id, STAGE_SCORE).await;

        let tags = match self
            .cloud
            .get_tags(request.user_id, TagQuery::default())
            .await
        {
            Ok(tags) => tags,
            Err(error) => {
                self.finish_stage(job_id, STAGE_SCORE, "Score relevance", &request.item_type)
                    .await;
                warn!(%job_id, item = %item.item_id, error = %error, "cloud read failed");
                return JobItemResult {
                    item_id: item.item_id.clone(),
                    status: ItemStatus::Error,
                    match_percentage: None,
                    detail: Some(format!("cloud read failed: {error:#}")),
                };
            }
        };

        let comparison = self.matcher.score(themes, &tags, None);
        self.metrics.relevance_scored.inc();

        self.finish_stage(job_id, STAGE_SCORE, "Score relevance", &request.item_type)
            .await;

        let mut detail = None;

        // Optional enrichment: prior documents close to this one. A degraded
        // lookup downgrades the verdict instead of failing the item.
        if let Some(embedding) = &item.embedding {
            self.jobs.set_stage(job_id, STAGE_CONTEXT).await;
            self.jobs.stage_started(job_id, STAGE_CONTEXT).await;

            match self
                .augmentor
                .find_similar(
                    embedding,
                    Some(request.user_id),
                    None,
                    DEFAULT_NEIGHBOR_LIMIT,
                    DEFAULT_MIN_SIMILARITY,
                )
                .await
            {
                Ok(similar) => {
                    detail = Some(format!("{} similar prior documents", similar.len()));
                }
                Err(error) => {
                    self.metrics.augmentation_skipped.inc();
                    warn!(%job_id, item = %item.item_id, error = %error, "similarity context skipped");
                    detail = Some("similarity context unavailable".to_string());
                }
            }

            self.finish_stage(job_id, STAGE_CONTEXT, "Similar context", &request.item_type)
                .await;
        }

        JobItemResult {
            item_id: item.item_id.clone(),
            status: ItemStatus::Completed,
            match_percentage: Some(comparison.match_percentage),
            detail,
        }
    }

    /// Close a stage: compute its duration and append the timing sample.
    /// Sample persistence is best-effort analytics, never a pipeline error.
    async fn finish_stage(&self, job_id: Uuid, stage_id: &str, stage_name: &str, item_type: &str) {
        let Some(duration) = self.jobs.stage_finished(job_id, stage_id).await else {
            return;
        };

        match stage_id {
            STAGE_EXTRACT => self.metrics.extract_duration.observe(duration.as_secs_f64()),
            STAGE_RECORD => self.metrics.record_duration.observe(duration.as_secs_f64()),
            STAGE_SCORE => self.metrics.score_duration.observe(duration.as_secs_f64()),
            _ => {}
        }

        let sample = NewStageSample {
            stage_id: stage_id.to_string(),
            stage_name: stage_name.to_string(),
            item_type: item_type.to_string(),
            duration_ms: i64::try_from(duration.as_millis()).unwrap_or(i64::MAX),
        };

        if let Err(error) = self.stage_samples.insert_sample(&sample).await {
            warn!(%job_id, stage = stage_id, error = %error, "failed to persist stage sample");
        }
    }
}
