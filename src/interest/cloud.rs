//! Per-user interest cloud: a weighted, deduplicating store of theme labels.
//!
//! Writes go through a per-user lock so concurrent merges into the same tag
//! never read a stale weight; the SQL upsert absorbs first-insert races
//! between processes. Reads may be served from a short-TTL cache, and
//! every successful write invalidates that cache before returning, so a
//! reader in the same process never observes state older than its own write.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use super::dedup::find_duplicate;
use super::normalize::normalize_label;
use super::synonyms::SynonymTable;
use crate::store::dao::TagDao;
use crate::store::models::{InterestTag, TagOrder};

/// Longest label accepted into a cloud; longer input is truncated, not dropped.
pub const MAX_LABEL_CHARS: usize = 50;

/// Default read cap, bounding matcher cost for very large clouds.
pub const DEFAULT_READ_LIMIT: usize = 100;

/// Tags scanned when deciding whether an incoming theme duplicates one.
const DEDUP_SCAN_LIMIT: i64 = 1000;

/// Default weight added when a theme merges into an existing tag.
pub const DEFAULT_WEIGHT_INCREMENT: f64 = 0.5;

/// Weight a freshly created tag starts at.
pub const DEFAULT_INITIAL_WEIGHT: f64 = 1.0;

#[derive(Debug, Clone, Copy)]
pub struct UpsertOptions {
    pub weight_increment: f64,
    pub initial_weight: f64,
}

impl Default for UpsertOptions {
    fn default() -> Self {
        Self {
            weight_increment: DEFAULT_WEIGHT_INCREMENT,
            initial_weight: DEFAULT_INITIAL_WEIGHT,
        }
    }
}

impl UpsertOptions {
    /// Increment used for high-signal sources (explicit comments).
    #[must_use]
    pub fn high_signal() -> Self {
        Self {
            weight_increment: 1.0,
            initial_weight: DEFAULT_INITIAL_WEIGHT,
        }
    }
}

/// Per-call outcome summary; one failing theme never blocks the rest.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UpsertSummary {
    pub created: usize,
    pub merged: usize,
    pub skipped: usize,
    pub errors: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct TagQuery {
    pub limit: usize,
    pub order: TagOrder,
}

impl Default for TagQuery {
    fn default() -> Self {
        Self {
            limit: DEFAULT_READ_LIMIT,
            order: TagOrder::Weight,
        }
    }
}

struct CacheEntry {
    tags: Vec<InterestTag>,
    fetched_at: Instant,
}

pub struct InterestCloudStore {
    dao: Arc<TagDao>,
    synonyms: Arc<SynonymTable>,
    cache: Mutex<HashMap<Uuid, CacheEntry>>,
    user_locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
    cache_ttl: Duration,
}

impl InterestCloudStore {
    #[must_use]
    pub fn new(dao: Arc<TagDao>, synonyms: Arc<SynonymTable>, cache_ttl: Duration) -> Self {
        Self {
            dao,
            synonyms,
            cache: Mutex::new(HashMap::new()),
            user_locks: Mutex::new(HashMap::new()),
            cache_ttl,
        }
    }

    /// Record a batch of themes for one user.
    ///
    /// Each theme is normalized, checked against the current tag set, and
    /// either merged (weight accumulates, recency refreshed) or created at
    /// the initial weight. The read-decide-write sequence is serialized per
    /// user for the whole batch.
    pub async fn upsert_batch(
        &self,
        user_id: Uuid,
        themes: &[String],
        options: UpsertOptions,
    ) -> UpsertSummary {
        let mut summary = UpsertSummary::default();
        if themes.is_empty() {
            return summary;
        }

        let lock = self.user_lock(user_id).await;
        let _guard = lock.lock().await;

        let mut current = match self
            .dao
            .fetch_tags(user_id, TagOrder::Weight, DEDUP_SCAN_LIMIT)
            .await
        {
            Ok(tags) => tags,
            Err(error) => {
                warn!(%user_id, error = %error, "failed to load tag set for upsert");
                summary.errors = themes.len();
                return summary;
            }
        };

        for theme in themes {
            let label = match prepare_label(theme) {
                Some(label) => label,
                None => {
                    summary.skipped += 1;
                    continue;
                }
            };

            let duplicate_id = find_duplicate(&label, &current, &self.synonyms).map(|tag| tag.id);

            match duplicate_id {
                Some(tag_id) => {
                    match self.dao.bump_weight(tag_id, options.weight_increment).await {
                        Ok(()) => {
                            summary.merged += 1;
                            if let Some(tag) = current.iter_mut().find(|t| t.id == tag_id) {
                                tag.weight += options.weight_increment;
                            }
                        }
                        Err(error) => {
                            warn!(%user_id, theme = %label, error = %error, "tag merge failed");
                            summary.errors += 1;
                        }
                    }
                }
                None => {
                    match self
                        .dao
                        .upsert_tag(
                            user_id,
                            &label,
                            options.initial_weight,
                            options.weight_increment,
                        )
                        .await
                    {
                        Ok(tag) => {
                            summary.created += 1;
                            current.push(tag);
                        }
                        Err(error) => {
                            warn!(%user_id, theme = %label, error = %error, "tag create failed");
                            summary.errors += 1;
                        }
                    }
                }
            }
        }

        // Read-your-writes: drop the cached cloud before the caller returns.
        self.invalidate(user_id).await;

        debug!(
            %user_id,
            created = summary.created,
            merged = summary.merged,
            skipped = summary.skipped,
            errors = summary.errors,
            "interest batch recorded"
        );

        summary
    }

    /// Read a user's cloud. Weight-ordered reads within the default cap may
    /// be served from the per-user cache; date-ordered reads always hit the
    /// store.
    pub async fn get_tags(&self, user_id: Uuid, query: TagQuery) -> Result<Vec<InterestTag>> {
        let limit = query.limit.min(DEFAULT_READ_LIMIT);

        if query.order == TagOrder::Weight {
            if let Some(tags) = self.cached_tags(user_id, limit).await {
                return Ok(tags);
            }

            let tags = self
                .dao
                .fetch_tags(user_id, TagOrder::Weight, DEFAULT_READ_LIMIT as i64)
                .await?;
            self.cache.lock().await.insert(
                user_id,
                CacheEntry {
                    tags: tags.clone(),
                    fetched_at: Instant::now(),
                },
            );
            return Ok(tags.into_iter().take(limit).collect());
        }

        self.dao
            .fetch_tags(user_id, query.order, limit as i64)
            .await
    }

    /// Force the next read for this user to bypass the cache.
    pub async fn invalidate(&self, user_id: Uuid) {
        self.cache.lock().await.remove(&user_id);
    }

    /// Explicit removal. Idempotent; re-recording the same theme afterwards
    /// creates a fresh tag at the initial weight.
    pub async fn delete_tag(&self, user_id: Uuid, tag_id: Uuid) -> Result<bool> {
        let deleted = self.dao.delete_tag(user_id, tag_id).await?;
        self.invalidate(user_id).await;
        Ok(deleted)
    }

    /// Signed adjustment from an external feedback signal; the only path
    /// that may lower a weight.
    pub async fn adjust_weight(&self, user_id: Uuid, tag_id: Uuid, delta: f64) -> Result<bool> {
        let adjusted = self.dao.adjust_weight(user_id, tag_id, delta).await?;
        self.invalidate(user_id).await;
        Ok(adjusted)
    }

    async fn cached_tags(&self, user_id: Uuid, limit: usize) -> Option<Vec<InterestTag>> {
        let cache = self.cache.lock().await;
        let entry = cache.get(&user_id)?;
        if entry.fetched_at.elapsed() > self.cache_ttl {
            return None;
        }
        Some(entry.tags.iter().take(limit).cloned().collect())
    }

    async fn user_lock(&self, user_id: Uuid) -> Arc<Mutex<()>> {
        let mut locks = self.user_locks.lock().await;
        Arc::clone(locks.entry(user_id).or_default())
    }
}

/// Validate and canonicalize one incoming theme. Over-long labels are
/// truncated at a character boundary rather than rejected.
fn prepare_label(theme: &str) -> Option<String> {
    let trimmed = theme.trim();
    if trimmed.is_empty() {
        return None;
    }

    let bounded: String = if trimmed.chars().count() > MAX_LABEL_CHARS {
        warn!(chars = trimmed.chars().count(), "truncating over-long theme label");
        trimmed.chars().take(MAX_LABEL_CHARS).collect()
    } else {
        trimmed.to_string()
    };

    let normalized = normalize_label(&bounded);
    if normalized.is_empty() {
        return None;
    }

    Some(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prepare_label_skips_empty_and_stopword_only_input() {
        assert_eq!(prepare_label("   "), None);
        assert_eq!(prepare_label("and the"), None);
        assert_eq!(prepare_label(" Rust "), Some("rust".to_string()));
    }

    #[test]
    fn prepare_label_truncates_at_char_boundary() {
        let long = "я".repeat(MAX_LABEL_CHARS + 10);
        let prepared = prepare_label(&long).expect("label survives");
        assert_eq!(prepared.chars().count(), MAX_LABEL_CHARS);
    }

    #[test]
    fn default_options_match_documented_increments() {
        let options = UpsertOptions::default();
        assert!((options.weight_increment - 0.5).abs() < f64::EPSILON);
        assert!((options.initial_weight - 1.0).abs() < f64::EPSILON);
    }
}
