/// Prometheusメトリクス定義。
use prometheus::{
    Counter, Gauge, Histogram, Registry, register_counter_with_registry,
    register_gauge_with_registry, register_histogram_with_registry,
};

/// メトリクスコレクター。
#[derive(Debug, Clone)]
pub struct Metrics {
    // カウンター
    pub themes_extracted: Counter,
    pub tags_created: Counter,
    pub tags_merged: Counter,
    pub relevance_scored: Counter,
    pub augmentation_skipped: Counter,
    pub quota_exhausted: Counter,
    pub items_skipped: Counter,
    pub jobs_completed: Counter,
    pub jobs_failed: Counter,
    pub jobs_swept: Counter,

    // ヒストグラム
    pub extract_duration: Histogram,
    pub record_duration: Histogram,
    pub score_duration: Histogram,
    pub job_duration: Histogram,

    // ゲージ
    pub active_jobs: Gauge,
}

impl Metrics {
    /// 新しいメトリクスコレクターを作成する。
    pub fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        Ok(Self {
            themes_extracted: register_counter_with_registry!(
                "interest_themes_extracted_total",
                "Total number of themes extracted from documents",
                registry
            )?,
            tags_created: register_counter_with_registry!(
                "interest_tags_created_total",
                "Total number of interest tags created",
                registry
            )?,
            tags_merged: register_counter_with_registry!(
                "interest_tags_merged_total",
                "Total number of themes merged into existing tags",
                registry
            )?,
            relevance_scored: register_counter_with_registry!(
                "interest_relevance_scored_total",
                "Total number of relevance scoring calls",
                registry
            )?,
            augmentation_skipped: register_counter_with_registry!(
                "interest_augmentation_skipped_total",
                "Similarity augmentations skipped after degraded lookups",
                registry
            )?,
            quota_exhausted: register_counter_with_registry!(
                "interest_quota_exhausted_total",
                "Inference calls aborted on quota exhaustion",
                registry
            )?,
            items_skipped: register_counter_with_registry!(
                "interest_items_skipped_total",
                "Analysis items skipped for lack of extractable signal",
                registry
            )?,
            jobs_completed: register_counter_with_registry!(
                "interest_jobs_completed_total",
                "Total number of analysis jobs completed",
                registry
            )?,
            jobs_failed: register_counter_with_registry!(
                "interest_jobs_failed_total",
                "Total number of analysis jobs failed",
                registry
            )?,
            jobs_swept: register_counter_with_registry!(
                "interest_jobs_swept_total",
                "Expired jobs reaped from the in-memory registry",
                registry
            )?,
            extract_duration: register_histogram_with_registry!(
                "interest_extract_stage_duration_seconds",
                "Duration of the theme extraction stage",
                registry
            )?,
            record_duration: register_histogram_with_registry!(
                "interest_record_stage_duration_seconds",
                "Duration of the interest recording stage",
                registry
            )?,
            score_duration: register_histogram_with_registry!(
                "interest_score_stage_duration_seconds",
                "Duration of the relevance scoring stage",
                registry
            )?,
            job_duration: register_histogram_with_registry!(
                "interest_job_duration_seconds",
                "End-to-end duration of analysis jobs",
                registry
            )?,
            active_jobs: register_gauge_with_registry!(
                "interest_active_jobs",
                "Number of jobs currently running",
                registry
            )?,
        })
    }
}
