//! Database-backed tests for the interest cloud write path.
//!
//! These run only when DATABASE_URL points at a reachable Postgres; without
//! it each test returns early, mirroring how the rest of the suite stays
//! runnable on a laptop with no database.

use std::sync::Arc;
use std::time::Duration;

use sqlx::Executor;
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

use interest_worker::interest::cloud::{InterestCloudStore, TagQuery, UpsertOptions};
use interest_worker::interest::matcher::RelevanceMatcher;
use interest_worker::interest::similarity::SimilarityAugmentor;
use interest_worker::interest::synonyms::SynonymTable;
use interest_worker::store::dao::{StageSampleDao, TagDao, VectorDao};
use interest_worker::store::models::{NewStageSample, TagOrder};

async fn setup_test_database() -> Option<sqlx::PgPool> {
    let database_url = std::env::var("DATABASE_URL").ok()?;
    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&database_url)
        .await
        .ok()?;
    setup_schema(&pool).await.ok()?;
    Some(pool)
}

async fn setup_schema(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    pool.execute(
        r#"
        CREATE TABLE IF NOT EXISTS interest_tags (
            id UUID PRIMARY KEY,
            user_id UUID NOT NULL,
            label TEXT NOT NULL,
            weight DOUBLE PRECISION NOT NULL,
            last_used_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            UNIQUE (user_id, label)
        );
        CREATE TABLE IF NOT EXISTS stage_samples (
            id BIGSERIAL PRIMARY KEY,
            stage_id TEXT NOT NULL,
            stage_name TEXT NOT NULL,
            item_type TEXT NOT NULL,
            duration_ms BIGINT NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        );
        "#,
    )
    .await?;
    Ok(())
}

fn cloud_store(pool: sqlx::PgPool) -> InterestCloudStore {
    InterestCloudStore::new(
        Arc::new(TagDao::new(pool)),
        Arc::new(SynonymTable::with_defaults()),
        Duration::from_secs(60),
    )
}

#[tokio::test]
async fn case_and_whitespace_variants_merge_into_one_tag() {
    let Some(pool) = setup_test_database().await else {
        return;
    };
    let store = cloud_store(pool);
    let user_id = Uuid::new_v4();

    let first = store
        .upsert_batch(
            user_id,
            &["Машинное обучение".to_string()],
            UpsertOptions::default(),
        )
        .await;
    assert_eq!(first.created, 1);

    let second = store
        .upsert_batch(
            user_id,
            &["машинное обучение  ".to_string()],
            UpsertOptions::default(),
        )
        .await;
    assert_eq!(second.merged, 1);
    assert_eq!(second.created, 0);

    let tags = store
        .get_tags(user_id, TagQuery::default())
        .await
        .expect("read succeeds");
    assert_eq!(tags.len(), 1);
    assert!((tags[0].weight - 1.5).abs() < 1e-9);
}

#[tokio::test]
async fn weight_accumulation_is_order_independent_in_aggregate() {
    let Some(pool) = setup_test_database().await else {
        return;
    };
    let store = cloud_store(pool.clone());

    let forward = Uuid::new_v4();
    let reverse = Uuid::new_v4();
    let a = "rust".to_string();
    let b = "Rust ".to_string();

    store
        .upsert_batch(forward, &[a.clone(), b.clone()], UpsertOptions::default())
        .await;
    store
        .upsert_batch(reverse, &[b, a], UpsertOptions::default())
        .await;

    let forward_tags = store
        .get_tags(forward, TagQuery::default())
        .await
        .expect("read succeeds");
    let reverse_tags = store
        .get_tags(reverse, TagQuery::default())
        .await
        .expect("read succeeds");

    assert_eq!(forward_tags.len(), 1);
    assert_eq!(reverse_tags.len(), 1);
    assert!((forward_tags[0].weight - reverse_tags[0].weight).abs() < 1e-9);
}

#[tokio::test]
async fn deleted_tag_recreates_at_initial_weight() {
    let Some(pool) = setup_test_database().await else {
        return;
    };
    let store = cloud_store(pool);
    let user_id = Uuid::new_v4();

    store
        .upsert_batch(
            user_id,
            &vec!["quantum computing".to_string(); 3],
            UpsertOptions::default(),
        )
        .await;

    let tags = store
        .get_tags(user_id, TagQuery::default())
        .await
        .expect("read succeeds");
    assert_eq!(tags.len(), 1);
    assert!(tags[0].weight > 1.5);

    let deleted = store
        .delete_tag(user_id, tags[0].id)
        .await
        .expect("delete succeeds");
    assert!(deleted);

    // Idempotent: second delete reports false.
    let deleted_again = store
        .delete_tag(user_id, tags[0].id)
        .await
        .expect("delete succeeds");
    assert!(!deleted_again);

    store
        .upsert_batch(
            user_id,
            &["quantum computing".to_string()],
            UpsertOptions::default(),
        )
        .await;

    let tags = store
        .get_tags(user_id, TagQuery::default())
        .await
        .expect("read succeeds");
    assert_eq!(tags.len(), 1);
    assert_ne!(tags[0].id, Uuid::nil());
    assert!((tags[0].weight - 1.0).abs() < 1e-9, "fresh tag, not a resurrected merge");
}

#[tokio::test]
async fn reads_after_write_never_observe_stale_cache() {
    let Some(pool) = setup_test_database().await else {
        return;
    };
    let store = cloud_store(pool);
    let user_id = Uuid::new_v4();

    store
        .upsert_batch(user_id, &["devtools".to_string()], UpsertOptions::default())
        .await;

    // Prime the cache.
    let before = store
        .get_tags(user_id, TagQuery::default())
        .await
        .expect("read succeeds");
    assert_eq!(before.len(), 1);

    store
        .upsert_batch(user_id, &["compilers".to_string()], UpsertOptions::default())
        .await;

    let after = store
        .get_tags(user_id, TagQuery::default())
        .await
        .expect("read succeeds");
    assert_eq!(after.len(), 2, "write must invalidate the cached cloud");
}

#[tokio::test]
async fn negative_adjustment_lowers_weight_but_not_below_zero() {
    let Some(pool) = setup_test_database().await else {
        return;
    };
    let store = cloud_store(pool);
    let user_id = Uuid::new_v4();

    store
        .upsert_batch(user_id, &["paywalls".to_string()], UpsertOptions::default())
        .await;
    let tags = store
        .get_tags(user_id, TagQuery::default())
        .await
        .expect("read succeeds");

    let adjusted = store
        .adjust_weight(user_id, tags[0].id, -5.0)
        .await
        .expect("adjust succeeds");
    assert!(adjusted);

    let tags = store
        .get_tags(user_id, TagQuery::default())
        .await
        .expect("read succeeds");
    assert!(tags[0].weight >= 0.0);
}

#[tokio::test]
async fn date_ordered_reads_bypass_the_weight_cache() {
    let Some(pool) = setup_test_database().await else {
        return;
    };
    let store = cloud_store(pool);
    let user_id = Uuid::new_v4();

    store
        .upsert_batch(
            user_id,
            &["embedded".to_string(), "firmware".to_string()],
            UpsertOptions::default(),
        )
        .await;

    let by_date = store
        .get_tags(
            user_id,
            TagQuery {
                limit: 10,
                order: TagOrder::Date,
            },
        )
        .await
        .expect("read succeeds");
    assert_eq!(by_date.len(), 2);
}

#[tokio::test]
async fn analysis_job_completes_with_per_item_results_and_stage_samples() {
    use interest_worker::clients::theme_extractor::{ThemeExtractorClient, ThemeExtractorConfig};
    use interest_worker::observability::Telemetry;
    use interest_worker::scheduler::jobs::{JobRegistry, JobStatus};
    use interest_worker::scheduler::limiter::{CallScheduler, CallSchedulerConfig};
    use interest_worker::scheduler::pipeline::{
        AnalysisItem, AnalysisMode, AnalysisPipeline, AnalysisRequest,
    };
    use interest_worker::util::retry::RetryConfig;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    let Some(pool) = setup_test_database().await else {
        return;
    };

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/themes/extract"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "success": true,
            "themes": ["formal verification", "model checking"]
        })))
        .mount(&server)
        .await;

    let extractor = Arc::new(
        ThemeExtractorClient::new(ThemeExtractorConfig {
            base_url: server.uri(),
            connect_timeout: Duration::from_secs(2),
            total_timeout: Duration::from_secs(5),
            service_token: None,
            max_themes: 5,
        })
        .expect("client builds"),
    );

    let limiter = Arc::new(CallScheduler::new(CallSchedulerConfig {
        max_concurrency: 2,
        inter_call_delay: Duration::from_millis(0),
        retry: RetryConfig::new(2, 1, 0, 10),
    }));

    let synonyms = Arc::new(SynonymTable::with_defaults());
    let cloud = Arc::new(InterestCloudStore::new(
        Arc::new(TagDao::new(pool.clone())),
        Arc::clone(&synonyms),
        Duration::from_secs(60),
    ));
    let matcher = Arc::new(RelevanceMatcher::new(synonyms));
    let augmentor = Arc::new(SimilarityAugmentor::new(Arc::new(VectorDao::new(
        pool.clone(),
    ))));
    let jobs = Arc::new(JobRegistry::new(Duration::from_secs(3600)));
    let stage_samples = Arc::new(StageSampleDao::new(pool.clone()));
    let telemetry = Telemetry::new().expect("telemetry builds");

    let pipeline = AnalysisPipeline::new(
        extractor,
        limiter,
        Arc::clone(&cloud),
        matcher,
        augmentor,
        Arc::clone(&jobs),
        stage_samples,
        telemetry.metrics_arc(),
        Duration::from_millis(0),
    );

    let user_id = Uuid::new_v4();
    let item_type = format!("e2e-{}", Uuid::new_v4());
    let job_id = jobs.create(&item_type).await;

    // Pollable in a non-terminal state before any stage completes.
    let early = jobs.snapshot(job_id).await.expect("pollable");
    assert!(!matches!(early.status, JobStatus::Completed | JobStatus::Error));

    pipeline
        .run(
            job_id,
            AnalysisRequest {
                user_id,
                mode: AnalysisMode::Record,
                item_type: item_type.clone(),
                items: vec![
                    AnalysisItem {
                        item_id: "doc-1".to_string(),
                        text: "an article about proving software correct".to_string(),
                        embedding: None,
                    },
                    AnalysisItem {
                        item_id: "doc-2".to_string(),
                        text: "another article on verification tooling".to_string(),
                        embedding: None,
                    },
                ],
                high_signal: false,
            },
        )
        .await;

    let snapshot = jobs.snapshot(job_id).await.expect("pollable");
    assert_eq!(snapshot.status, JobStatus::Completed);
    assert_eq!(snapshot.results.len(), 2);

    // Both documents folded their themes into one cloud.
    let tags = cloud
        .get_tags(user_id, TagQuery::default())
        .await
        .expect("read succeeds");
    assert_eq!(tags.len(), 2);

    // Completion implies the stage samples were recorded first.
    let stats = StageSampleDao::new(pool)
        .stage_stats()
        .await
        .expect("aggregate succeeds");
    assert!(
        stats
            .iter()
            .any(|row| row.item_type == item_type && row.stage_name == "Extract themes"),
        "extract stage sample must be persisted"
    );
    assert!(
        stats
            .iter()
            .any(|row| row.item_type == item_type && row.stage_name == "Record interest"),
        "record stage sample must be persisted"
    );
}

#[tokio::test]
async fn vector_search_filters_by_similarity_threshold() {
    let Some(pool) = setup_test_database().await else {
        return;
    };
    // Requires the pgvector extension; skip quietly where unavailable.
    if pool
        .execute("CREATE EXTENSION IF NOT EXISTS vector")
        .await
        .is_err()
    {
        return;
    }
    if pool
        .execute(
            r"
            CREATE TABLE IF NOT EXISTS analyzed_documents (
                id UUID PRIMARY KEY,
                user_id UUID NOT NULL,
                summary TEXT NOT NULL,
                embedding vector(3)
            )
            ",
        )
        .await
        .is_err()
    {
        return;
    }

    let dao = Arc::new(VectorDao::new(pool.clone()));
    let user_id = Uuid::new_v4();
    let close_id = Uuid::new_v4();
    let far_id = Uuid::new_v4();

    for (id, summary) in [(close_id, "close document"), (far_id, "opposed document")] {
        sqlx::query("INSERT INTO analyzed_documents (id, user_id, summary) VALUES ($1, $2, $3)")
            .bind(id)
            .bind(user_id)
            .bind(summary)
            .execute(&pool)
            .await
            .expect("insert succeeds");
    }

    dao.upsert_embedding(user_id, close_id, &[1.0, 0.0, 0.0])
        .await
        .expect("embed succeeds");
    dao.upsert_embedding(user_id, far_id, &[-1.0, 0.0, 0.0])
        .await
        .expect("embed succeeds");

    let augmentor = SimilarityAugmentor::new(dao);
    let similar = augmentor
        .find_similar(&[1.0, 0.0, 0.0], Some(user_id), None, 10, 0.5)
        .await
        .expect("search succeeds");

    assert_eq!(similar.len(), 1);
    assert_eq!(similar[0].id, close_id);
    assert!(similar[0].similarity > 0.99);
}

#[tokio::test]
async fn stage_samples_aggregate_by_stage_and_item_type() {
    let Some(pool) = setup_test_database().await else {
        return;
    };
    let dao = StageSampleDao::new(pool);

    for duration_ms in [100, 200, 300] {
        dao.insert_sample(&NewStageSample {
            stage_id: "extract_themes".to_string(),
            stage_name: "Extract themes".to_string(),
            item_type: "integration-test".to_string(),
            duration_ms,
        })
        .await
        .expect("insert succeeds");
    }

    let stats = dao.stage_stats().await.expect("aggregate succeeds");
    let row = stats
        .iter()
        .find(|s| s.item_type == "integration-test" && s.stage_name == "Extract themes")
        .expect("aggregated row present");

    assert!(row.sample_count >= 3);
    assert!(row.avg_duration_ms > 0.0);
}
