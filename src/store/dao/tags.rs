use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::store::models::{InterestTag, TagOrder};

/// Data access for the `interest_tags` table.
pub struct TagDao {
    pool: PgPool,
}

impl TagDao {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Fetch a user's tags, ordered as requested.
    pub async fn fetch_tags(
        &self,
        user_id: Uuid,
        order: TagOrder,
        limit: i64,
    ) -> Result<Vec<InterestTag>> {
        let order_clause = match order {
            TagOrder::Weight => "weight DESC, last_used_at DESC",
            TagOrder::Date => "last_used_at DESC, weight DESC",
        };

        let query = format!(
            "SELECT id, user_id, label, weight, last_used_at
             FROM interest_tags
             WHERE user_id = $1
             ORDER BY {order_clause}
             LIMIT $2"
        );

        let rows = sqlx::query(&query)
            .bind(user_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .context("failed to fetch interest tags")?;

        let mut tags = Vec::with_capacity(rows.len());
        for row in rows {
            tags.push(parse_tag_row(&row)?);
        }

        Ok(tags)
    }

    /// Insert a tag, or absorb the occurrence into an existing row when the
    /// `(user_id, label)` key already exists. The conflict arm is the atomic
    /// fallback for concurrent writers racing on first insert; it must never
    /// surface a duplicate-key error to the caller.
    pub async fn upsert_tag(
        &self,
        user_id: Uuid,
        label: &str,
        initial_weight: f64,
        weight_increment: f64,
    ) -> Result<InterestTag> {
        let row = sqlx::query(
            r"
            INSERT INTO interest_tags (id, user_id, label, weight, last_used_at)
            VALUES ($1, $2, $3, $4, NOW())
            ON CONFLICT (user_id, label) DO UPDATE SET
                weight = interest_tags.weight + $5,
                last_used_at = NOW()
            RETURNING id, user_id, label, weight, last_used_at
            ",
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(label)
        .bind(initial_weight)
        .bind(weight_increment)
        .fetch_one(&self.pool)
        .await
        .context("failed to upsert interest tag")?;

        parse_tag_row(&row)
    }

    /// Accumulate weight on an existing tag and refresh its recency.
    pub async fn bump_weight(&self, tag_id: Uuid, weight_increment: f64) -> Result<()> {
        sqlx::query(
            r"
            UPDATE interest_tags
            SET weight = weight + $2, last_used_at = NOW()
            WHERE id = $1
            ",
        )
        .bind(tag_id)
        .bind(weight_increment)
        .execute(&self.pool)
        .await
        .context("failed to bump interest tag weight")?;

        Ok(())
    }

    /// Apply a signed adjustment (the negative-feedback path). The weight is
    /// clamped at zero so a burst of negative signals cannot go below it.
    pub async fn adjust_weight(&self, user_id: Uuid, tag_id: Uuid, delta: f64) -> Result<bool> {
        let result = sqlx::query(
            r"
            UPDATE interest_tags
            SET weight = GREATEST(weight + $3, 0)
            WHERE id = $1 AND user_id = $2
            ",
        )
        .bind(tag_id)
        .bind(user_id)
        .bind(delta)
        .execute(&self.pool)
        .await
        .context("failed to adjust interest tag weight")?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete a tag owned by the user. Idempotent: deleting a missing or
    /// foreign tag reports `false`.
    pub async fn delete_tag(&self, user_id: Uuid, tag_id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            r"
            DELETE FROM interest_tags
            WHERE id = $1 AND user_id = $2
            ",
        )
        .bind(tag_id)
        .bind(user_id)
        .execute(&self.pool)
        .await
        .context("failed to delete interest tag")?;

        Ok(result.rows_affected() > 0)
    }
}

fn parse_tag_row(row: &sqlx::postgres::PgRow) -> Result<InterestTag> {
    let id: Uuid = row.try_get("id")?;
    let user_id: Uuid = row.try_get("user_id")?;
    let label: String = row.try_get("label")?;
    let weight: f64 = row.try_get("weight")?;
    let last_used_at: DateTime<Utc> = row.try_get("last_used_at")?;

    Ok(InterestTag {
        id,
        user_id,
        label,
        weight,
        last_used_at,
    })
}
