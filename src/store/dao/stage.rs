use anyhow::{Context, Result};
use sqlx::{PgPool, Row};

use crate::store::models::{NewStageSample, StageStats};

/// Data access for the append-only `stage_samples` table.
///
/// Rows are written once per completed pipeline stage and only ever read in
/// aggregate; nothing here updates or deletes.
pub struct StageSampleDao {
    pool: PgPool,
}

impl StageSampleDao {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// ステージ完了のタイミングサンプルを記録する。
    pub async fn insert_sample(&self, sample: &NewStageSample) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO stage_samples (stage_id, stage_name, item_type, duration_ms)
            VALUES ($1, $2, $3, $4)
            ",
        )
        .bind(&sample.stage_id)
        .bind(&sample.stage_name)
        .bind(&sample.item_type)
        .bind(sample.duration_ms)
        .execute(&self.pool)
        .await
        .context("failed to insert stage sample")?;

        Ok(())
    }

    /// ステージ別・アイテム種別ごとの平均所要時間を集計する。
    pub async fn stage_stats(&self) -> Result<Vec<StageStats>> {
        let rows = sqlx::query(
            r"
            SELECT stage_name, item_type,
                   COUNT(*) as sample_count,
                   AVG(duration_ms)::float8 as avg_duration_ms
            FROM stage_samples
            GROUP BY stage_name, item_type
            ORDER BY stage_name, item_type
            ",
        )
        .fetch_all(&self.pool)
        .await
        .context("failed to aggregate stage samples")?;

        let mut stats = Vec::with_capacity(rows.len());
        for row in rows {
            let stage_name: String = row.try_get("stage_name")?;
            let item_type: String = row.try_get("item_type")?;
            let sample_count: i64 = row.try_get("sample_count")?;
            let avg_duration_ms: f64 = row.try_get("avg_duration_ms")?;
            stats.push(StageStats {
                stage_name,
                item_type,
                sample_count,
                avg_duration_ms,
            });
        }

        Ok(stats)
    }
}
