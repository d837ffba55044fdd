//! Row-level SQL shared by the repositories and the engine services.
//!
//! Single-statement helpers are generic over the executor so they run equally
//! against the pool or inside a transaction (`&mut **tx`).

use crate::error::{CatalogError, Result};
use crate::models::{
    Collection, CollectionItem, CollectionItemRow, CollectionRow, ItemRef, Manifestation,
    ITEM_TYPE_COLLECTION, ITEM_TYPE_MANIFESTATION,
};
use sqlx::{query, query_as, Executor, Sqlite, SqliteConnection};
use tracing::trace;

/// Upper bound on bind parameters per `IN (...)` batch
pub(crate) const BATCH_SIZE: usize = 500;

/// `?, ?, ?` for an `IN` list of `n` parameters
pub(crate) fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

pub(crate) fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

// =============================================================================
// Collections
// =============================================================================

pub(crate) async fn fetch_collection<'e, E>(executor: E, id: &str) -> Result<Option<Collection>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = query_as::<_, CollectionRow>("SELECT * FROM collections WHERE id = ?")
        .bind(id)
        .fetch_optional(executor)
        .await?;

    row.map(Collection::try_from).transpose()
}

pub(crate) async fn require_collection<'e, E>(executor: E, id: &str) -> Result<Collection>
where
    E: Executor<'e, Database = Sqlite>,
{
    fetch_collection(executor, id)
        .await?
        .ok_or_else(|| CatalogError::not_found("Collection", id))
}

/// Insert without the type checks applied to editor-created collections.
pub(crate) async fn insert_collection<'e, E>(executor: E, collection: &Collection) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    collection
        .validate()
        .map_err(|e| CatalogError::invalid("Collection", e))?;

    query(
        r#"
        INSERT INTO collections (
            id, title, subtitle, description, collection_type,
            manifestations_count, created_at, updated_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&collection.id)
    .bind(&collection.title)
    .bind(&collection.subtitle)
    .bind(&collection.description)
    .bind(collection.collection_type.as_str())
    .bind(collection.manifestations_count)
    .bind(collection.created_at)
    .bind(collection.updated_at)
    .execute(executor)
    .await?;

    Ok(())
}

pub(crate) async fn store_count<'e, E>(executor: E, collection_id: &str, count: i64) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    query("UPDATE collections SET manifestations_count = ?, updated_at = ? WHERE id = ?")
        .bind(count)
        .bind(now())
        .bind(collection_id)
        .execute(executor)
        .await?;

    Ok(())
}

pub(crate) async fn delete_collection_row<'e, E>(executor: E, collection_id: &str) -> Result<bool>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = query("DELETE FROM collections WHERE id = ?")
        .bind(collection_id)
        .execute(executor)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Collections holding a slot that references `collection_id`
pub(crate) async fn parent_collection_ids<'e, E>(executor: E, collection_id: &str) -> Result<Vec<String>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let rows = query_as::<_, (String,)>(
        "SELECT DISTINCT collection_id FROM collection_items \
         WHERE item_type = ? AND item_id = ? ORDER BY collection_id",
    )
    .bind(ITEM_TYPE_COLLECTION)
    .bind(collection_id)
    .fetch_all(executor)
    .await?;

    Ok(rows.into_iter().map(|(id,)| id).collect())
}

/// Collections holding a slot that references manifestation `manifestation_id`
pub(crate) async fn containing_collection_ids<'e, E>(
    executor: E,
    manifestation_id: &str,
) -> Result<Vec<String>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let rows = query_as::<_, (String,)>(
        "SELECT DISTINCT collection_id FROM collection_items \
         WHERE item_type = ? AND item_id = ? ORDER BY collection_id",
    )
    .bind(ITEM_TYPE_MANIFESTATION)
    .bind(manifestation_id)
    .fetch_all(executor)
    .await?;

    Ok(rows.into_iter().map(|(id,)| id).collect())
}

/// Collection ids referenced directly from `collection_id`'s slots
pub(crate) async fn child_collection_ids<'e, E>(executor: E, collection_id: &str) -> Result<Vec<String>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let rows = query_as::<_, (String,)>(
        "SELECT item_id FROM collection_items \
         WHERE collection_id = ? AND item_type = ? ORDER BY seqno, id",
    )
    .bind(collection_id)
    .bind(ITEM_TYPE_COLLECTION)
    .fetch_all(executor)
    .await?;

    Ok(rows.into_iter().map(|(id,)| id).collect())
}

/// Load collections by id, preserving the order of `ids`
pub(crate) async fn fetch_collections_by_ids(
    conn: &mut SqliteConnection,
    ids: &[String],
) -> Result<Vec<Collection>> {
    let mut found = std::collections::HashMap::with_capacity(ids.len());

    for chunk in ids.chunks(BATCH_SIZE) {
        let sql = format!(
            "SELECT * FROM collections WHERE id IN ({})",
            placeholders(chunk.len())
        );
        let mut q = query_as::<_, CollectionRow>(&sql);
        for id in chunk {
            q = q.bind(id);
        }
        for row in q.fetch_all(&mut *conn).await? {
            let collection = Collection::try_from(row)?;
            found.insert(collection.id.clone(), collection);
        }
    }

    Ok(ids.iter().filter_map(|id| found.remove(id)).collect())
}

/// Load manifestations by id, preserving the order of `ids`
pub(crate) async fn fetch_manifestations_by_ids(
    conn: &mut SqliteConnection,
    ids: &[String],
) -> Result<Vec<Manifestation>> {
    let mut found = std::collections::HashMap::with_capacity(ids.len());

    for chunk in ids.chunks(BATCH_SIZE) {
        let sql = format!(
            "SELECT * FROM manifestations WHERE id IN ({})",
            placeholders(chunk.len())
        );
        let mut q = query_as::<_, Manifestation>(&sql);
        for id in chunk {
            q = q.bind(id);
        }
        for manifestation in q.fetch_all(&mut *conn).await? {
            found.insert(manifestation.id.clone(), manifestation);
        }
    }

    Ok(ids.iter().filter_map(|id| found.remove(id)).collect())
}

// =============================================================================
// Collection items
// =============================================================================

pub(crate) async fn fetch_item<'e, E>(executor: E, id: &str) -> Result<Option<CollectionItem>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = query_as::<_, CollectionItemRow>("SELECT * FROM collection_items WHERE id = ?")
        .bind(id)
        .fetch_optional(executor)
        .await?;

    row.map(CollectionItem::try_from).transpose()
}

pub(crate) async fn require_item<'e, E>(executor: E, id: &str) -> Result<CollectionItem>
where
    E: Executor<'e, Database = Sqlite>,
{
    fetch_item(executor, id)
        .await?
        .ok_or_else(|| CatalogError::not_found("CollectionItem", id))
}

/// Items of a collection in `(seqno, id)` order
pub(crate) async fn ordered_items<'e, E>(executor: E, collection_id: &str) -> Result<Vec<CollectionItem>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let rows = query_as::<_, CollectionItemRow>(
        "SELECT * FROM collection_items WHERE collection_id = ? ORDER BY seqno, id",
    )
    .bind(collection_id)
    .fetch_all(executor)
    .await?;

    rows.into_iter().map(CollectionItem::try_from).collect()
}

/// Highest seqno in the collection, 0 when empty
pub(crate) async fn max_seqno<'e, E>(executor: E, collection_id: &str) -> Result<i64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let (max,): (Option<i64>,) =
        query_as("SELECT MAX(seqno) FROM collection_items WHERE collection_id = ?")
            .bind(collection_id)
            .fetch_one(executor)
            .await?;

    Ok(max.unwrap_or(0))
}

pub(crate) async fn insert_item<'e, E>(executor: E, item: &CollectionItem) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    item.validate()
        .map_err(|e| CatalogError::invalid("CollectionItem", e))?;

    let (item_type, item_id) = item.item.to_parts();

    query(
        r#"
        INSERT INTO collection_items (
            id, collection_id, seqno, item_type, item_id,
            alt_title, markdown, created_at, updated_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&item.id)
    .bind(&item.collection_id)
    .bind(item.seqno)
    .bind(item_type)
    .bind(item_id)
    .bind(&item.alt_title)
    .bind(&item.markdown)
    .bind(item.created_at)
    .bind(item.updated_at)
    .execute(executor)
    .await?;

    Ok(())
}

pub(crate) async fn set_seqno<'e, E>(executor: E, item_id: &str, seqno: i64) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    query("UPDATE collection_items SET seqno = ?, updated_at = ? WHERE id = ?")
        .bind(seqno)
        .bind(now())
        .bind(item_id)
        .execute(executor)
        .await?;

    Ok(())
}

pub(crate) async fn delete_item_row<'e, E>(executor: E, item_id: &str) -> Result<bool>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = query("DELETE FROM collection_items WHERE id = ?")
        .bind(item_id)
        .execute(executor)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Assign `seqno = position + 1` along `items`, skipping rows already in place.
///
/// Returns the renumbered items and the number of rows written.
pub(crate) async fn renumber_densely(
    conn: &mut SqliteConnection,
    items: Vec<CollectionItem>,
) -> Result<(Vec<CollectionItem>, usize)> {
    let mut written = 0;
    let mut renumbered = Vec::with_capacity(items.len());

    for (index, mut item) in items.into_iter().enumerate() {
        let seqno = index as i64 + 1;
        if item.seqno != seqno {
            set_seqno(&mut *conn, &item.id, seqno).await?;
            trace!(item_id = %item.id, from = item.seqno, to = seqno, "Renumbered item");
            item.seqno = seqno;
            written += 1;
        }
        renumbered.push(item);
    }

    Ok((renumbered, written))
}

/// Fail with `NotFound` when a non-empty reference points at nothing
pub(crate) async fn ensure_target_exists(conn: &mut SqliteConnection, item: &ItemRef) -> Result<()> {
    match item {
        ItemRef::Empty => Ok(()),
        ItemRef::Collection(id) => require_collection(&mut *conn, id).await.map(|_| ()),
        ItemRef::Manifestation(id) => {
            let exists: Option<(String,)> = query_as("SELECT id FROM manifestations WHERE id = ?")
                .bind(id)
                .fetch_optional(&mut *conn)
                .await?;
            exists
                .map(|_| ())
                .ok_or_else(|| CatalogError::not_found("Manifestation", id.as_str()))
        }
    }
}
