use anyhow::{Context, Result};
use sqlx::{PgPool, Row};
use uuid::Uuid;

/// Nearest-neighbor access over the externally-owned `analyzed_documents`
/// table (pgvector). The engine reads and annotates; it never creates or
/// deletes documents.
pub struct VectorDao {
    pool: PgPool,
}

/// One raw neighbor row: `(document id, summary, cosine distance)`.
#[derive(Debug, Clone, PartialEq)]
pub struct NeighborRow {
    pub id: Uuid,
    pub summary: String,
    pub distance: f64,
}

impl VectorDao {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Cosine nearest-neighbor search, optionally scoped to one owner and
    /// excluding the query document itself.
    pub async fn similarity_search(
        &self,
        query: &[f32],
        owner: Option<Uuid>,
        exclude: Option<Uuid>,
        limit: i64,
    ) -> Result<Vec<NeighborRow>> {
        let rows = sqlx::query(
            r"
            SELECT id, summary, (embedding <=> $1::vector)::float8 AS distance
            FROM analyzed_documents
            WHERE embedding IS NOT NULL
              AND ($2::uuid IS NULL OR user_id = $2)
              AND ($3::uuid IS NULL OR id <> $3)
            ORDER BY embedding <=> $1::vector
            LIMIT $4
            ",
        )
        .bind(vector_literal(query))
        .bind(owner)
        .bind(exclude)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("failed to run similarity search")?;

        let mut neighbors = Vec::with_capacity(rows.len());
        for row in rows {
            let id: Uuid = row.try_get("id")?;
            let summary: String = row.try_get("summary")?;
            let distance: f64 = row.try_get("distance")?;
            neighbors.push(NeighborRow {
                id,
                summary,
                distance,
            });
        }

        Ok(neighbors)
    }

    /// Attach an embedding to a document the owner already analyzed.
    pub async fn upsert_embedding(
        &self,
        owner: Uuid,
        document_id: Uuid,
        embedding: &[f32],
    ) -> Result<bool> {
        let result = sqlx::query(
            r"
            UPDATE analyzed_documents
            SET embedding = $3::vector
            WHERE id = $1 AND user_id = $2
            ",
        )
        .bind(document_id)
        .bind(owner)
        .bind(vector_literal(embedding))
        .execute(&self.pool)
        .await
        .context("failed to upsert document embedding")?;

        Ok(result.rows_affected() > 0)
    }
}

/// pgvector text literal: `[0.1,0.2,...]`.
fn vector_literal(values: &[f32]) -> String {
    let mut literal = String::with_capacity(values.len() * 8 + 2);
    literal.push('[');
    for (i, value) in values.iter().enumerate() {
        if i > 0 {
            literal.push(',');
        }
        literal.push_str(&value.to_string());
    }
    literal.push(']');
    literal
}
