//! Manifestation count cache.
//!
//! `collections.manifestations_count` caches the number of manifestation
//! leaves below a collection, expanded through nested collections. The cache
//! is recomputed from the leaves (never incrementally) for the collection a
//! change touched and then for every ancestor found through the reverse
//! containment index.

use crate::db::begin_write;
use crate::error::Result;
use crate::models::ITEM_TYPE_COLLECTION;
use crate::models::ITEM_TYPE_MANIFESTATION;
use crate::store;
use serde::{Deserialize, Serialize};
use sqlx::{query_as, SqliteConnection, SqlitePool};
use std::collections::{HashSet, VecDeque};
use tracing::{debug, info, warn};

/// Count manifestation leaves below `collection_id`.
///
/// Uses an explicit stack. A sub-collection reached along two paths is
/// expanded (and counted) twice. Slots pointing at missing manifestations or
/// collections contribute nothing.
pub(crate) async fn count_subtree(conn: &mut SqliteConnection, collection_id: &str) -> Result<i64> {
    let mut total = 0i64;
    let mut stack = vec![collection_id.to_string()];

    while let Some(current) = stack.pop() {
        let (manifestations,): (i64,) = query_as(
            r#"
            SELECT COUNT(*) FROM collection_items ci
            JOIN manifestations m ON m.id = ci.item_id
            WHERE ci.collection_id = ? AND ci.item_type = ?
            "#,
        )
        .bind(&current)
        .bind(ITEM_TYPE_MANIFESTATION)
        .fetch_one(&mut *conn)
        .await?;
        total += manifestations;

        let children: Vec<(String,)> = query_as(
            r#"
            SELECT c.id FROM collection_items ci
            JOIN collections c ON c.id = ci.item_id
            WHERE ci.collection_id = ? AND ci.item_type = ?
            "#,
        )
        .bind(&current)
        .bind(ITEM_TYPE_COLLECTION)
        .fetch_all(&mut *conn)
        .await?;
        stack.extend(children.into_iter().map(|(id,)| id));
    }

    Ok(total)
}

/// Recount one collection and store the result if it changed.
///
/// Returns `(cached, actual)`.
pub(crate) async fn refresh_count(
    conn: &mut SqliteConnection,
    collection_id: &str,
) -> Result<(i64, i64)> {
    let (cached,): (i64,) = query_as("SELECT manifestations_count FROM collections WHERE id = ?")
        .bind(collection_id)
        .fetch_one(&mut *conn)
        .await?;

    let actual = count_subtree(&mut *conn, collection_id).await?;
    if actual != cached {
        store::store_count(&mut *conn, collection_id, actual).await?;
    }

    Ok((cached, actual))
}

/// Refresh `collection_id` and then every ancestor, each exactly once.
///
/// Ancestors are discovered breadth first through the reverse containment
/// index. Returns the number of collections refreshed.
pub(crate) async fn propagate_from(conn: &mut SqliteConnection, collection_id: &str) -> Result<usize> {
    let mut visited: HashSet<String> = HashSet::new();
    let mut queue = VecDeque::from([collection_id.to_string()]);

    while let Some(current) = queue.pop_front() {
        if !visited.insert(current.clone()) {
            continue;
        }

        let (cached, actual) = refresh_count(&mut *conn, &current).await?;
        if cached != actual {
            debug!(collection_id = %current, from = cached, to = actual, "Updated manifestations count");
        }

        for parent in store::parent_collection_ids(&mut *conn, &current).await? {
            if !visited.contains(&parent) {
                queue.push_back(parent);
            }
        }
    }

    Ok(visited.len())
}

/// Totals from a bulk recount
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecalculateSummary {
    /// Collections recounted
    pub checked: usize,
    /// Collections whose cached count was wrong
    pub corrected: usize,
}

/// Manual repair of the manifestation count cache
#[derive(Clone)]
pub struct CountPropagator {
    pool: SqlitePool,
}

impl CountPropagator {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Recount a collection from its leaves and store the corrected value.
    ///
    /// A mismatch with the cached value is logged as cache drift.
    pub async fn recalculate(&self, collection_id: &str) -> Result<i64> {
        let mut tx = begin_write(&self.pool).await?;
        store::require_collection(&mut *tx, collection_id).await?;

        let (cached, actual) = refresh_count(&mut tx, collection_id).await?;
        if cached != actual {
            warn!(
                collection_id,
                cached,
                actual,
                "Manifestations count drift corrected"
            );
        }

        tx.commit().await?;
        Ok(actual)
    }

    /// Recount every collection, for use after bulk imports or backfills
    pub async fn recalculate_all(&self) -> Result<RecalculateSummary> {
        let ids: Vec<(String,)> = query_as("SELECT id FROM collections ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        let mut summary = RecalculateSummary::default();
        let mut tx = begin_write(&self.pool).await?;

        for (id,) in &ids {
            let (cached, actual) = refresh_count(&mut tx, id).await?;
            summary.checked += 1;
            if cached != actual {
                warn!(collection_id = %id, cached, actual, "Manifestations count drift corrected");
                summary.corrected += 1;
            }
        }

        tx.commit().await?;

        info!(
            checked = summary.checked,
            corrected = summary.corrected,
            "Recalculated all manifestation counts"
        );
        Ok(summary)
    }
}
