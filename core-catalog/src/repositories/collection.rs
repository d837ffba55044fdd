//! Collection repository trait and implementation

use crate::counts;
use crate::db::begin_write;
use crate::error::{CatalogError, Result};
use crate::models::{Collection, CollectionRow, CollectionType, ITEM_TYPE_COLLECTION};
use crate::repositories::{Page, PageRequest};
use crate::store;
use async_trait::async_trait;
use sqlx::{query, query_as, SqliteConnection, SqlitePool};
use tracing::{debug, info};

/// Collection repository interface
///
/// Editor-facing: the `uncollected` type can be neither assigned nor removed
/// through this interface. The manifestation count is owned by the count
/// propagator and is never written from here.
#[async_trait]
pub trait CollectionRepository: Send + Sync {
    /// Find a collection by its ID
    async fn find_by_id(&self, id: &str) -> Result<Option<Collection>>;

    /// Insert a new collection
    ///
    /// # Errors
    /// Returns `InvalidInput` for validation failures or the `uncollected` type.
    async fn insert(&self, collection: &Collection) -> Result<()>;

    /// Update title, subtitle, description and type
    ///
    /// # Errors
    /// Returns `InvalidInput` when the type would change to or from
    /// `uncollected`, `NotFound` when the collection does not exist.
    async fn update(&self, collection: &Collection) -> Result<()>;

    /// Delete a collection, its own items, and every slot elsewhere that
    /// referenced it. Counts of the affected parents are refreshed.
    ///
    /// # Returns
    /// - `Ok(true)` if the collection was deleted
    /// - `Ok(false)` if it was not found
    async fn delete(&self, id: &str) -> Result<bool>;

    /// Query collections of one type, ordered by title
    async fn query_by_type(
        &self,
        collection_type: CollectionType,
        page_request: PageRequest,
    ) -> Result<Page<Collection>>;

    /// Collections that directly contain `id`
    async fn parent_collections(&self, id: &str) -> Result<Vec<Collection>>;

    /// Count total collections
    async fn count(&self) -> Result<i64>;
}

/// SQLite implementation of CollectionRepository
#[derive(Clone)]
pub struct SqliteCollectionRepository {
    pool: SqlitePool,
}

impl SqliteCollectionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CollectionRepository for SqliteCollectionRepository {
    async fn find_by_id(&self, id: &str) -> Result<Option<Collection>> {
        store::fetch_collection(&self.pool, id).await
    }

    async fn insert(&self, collection: &Collection) -> Result<()> {
        if collection.is_uncollected() {
            return Err(CatalogError::invalid(
                "collection_type",
                "uncollected collections are maintained automatically",
            ));
        }

        store::insert_collection(&self.pool, collection).await?;

        debug!(collection_id = %collection.id, collection_type = %collection.collection_type, "Inserted collection");
        Ok(())
    }

    async fn update(&self, collection: &Collection) -> Result<()> {
        collection
            .validate()
            .map_err(|e| CatalogError::invalid("Collection", e))?;

        let mut tx = begin_write(&self.pool).await?;
        let existing = store::require_collection(&mut *tx, &collection.id).await?;

        if existing.collection_type != collection.collection_type
            && (existing.is_uncollected() || collection.is_uncollected())
        {
            return Err(CatalogError::invalid(
                "collection_type",
                format!(
                    "cannot change type from {} to {}",
                    existing.collection_type, collection.collection_type
                ),
            ));
        }

        query(
            r#"
            UPDATE collections
            SET title = ?, subtitle = ?, description = ?, collection_type = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&collection.title)
        .bind(&collection.subtitle)
        .bind(&collection.description)
        .bind(collection.collection_type.as_str())
        .bind(store::now())
        .bind(&collection.id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let mut tx = begin_write(&self.pool).await?;
        let deleted = delete_detached(&mut tx, id).await?;
        tx.commit().await?;

        Ok(deleted)
    }

    async fn query_by_type(
        &self,
        collection_type: CollectionType,
        page_request: PageRequest,
    ) -> Result<Page<Collection>> {
        let (total,): (i64,) = query_as("SELECT COUNT(*) FROM collections WHERE collection_type = ?")
            .bind(collection_type.as_str())
            .fetch_one(&self.pool)
            .await?;

        let rows = query_as::<_, CollectionRow>(
            "SELECT * FROM collections WHERE collection_type = ? \
             ORDER BY title ASC, id ASC LIMIT ? OFFSET ?",
        )
        .bind(collection_type.as_str())
        .bind(page_request.limit())
        .bind(page_request.offset())
        .fetch_all(&self.pool)
        .await?;

        let collections = rows
            .into_iter()
            .map(Collection::try_from)
            .collect::<Result<Vec<_>>>()?;

        Ok(Page::new(collections, total as u64, page_request))
    }

    async fn parent_collections(&self, id: &str) -> Result<Vec<Collection>> {
        let rows = query_as::<_, CollectionRow>(
            r#"
            SELECT c.* FROM collections c
            WHERE c.id IN (
                SELECT collection_id FROM collection_items
                WHERE item_type = ? AND item_id = ?
            )
            ORDER BY c.title ASC, c.id ASC
            "#,
        )
        .bind(ITEM_TYPE_COLLECTION)
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Collection::try_from).collect()
    }

    async fn count(&self) -> Result<i64> {
        let (count,): (i64,) = query_as("SELECT COUNT(*) FROM collections")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

/// Delete a collection after removing every slot that references it, then
/// refresh the counts of the former parents.
pub(crate) async fn delete_detached(conn: &mut SqliteConnection, id: &str) -> Result<bool> {
    if store::fetch_collection(&mut *conn, id).await?.is_none() {
        return Ok(false);
    }

    let parents = store::parent_collection_ids(&mut *conn, id).await?;
    let detached = query("DELETE FROM collection_items WHERE item_type = ? AND item_id = ?")
        .bind(ITEM_TYPE_COLLECTION)
        .bind(id)
        .execute(&mut *conn)
        .await?
        .rows_affected();

    // Own items go with the collection (ON DELETE CASCADE).
    store::delete_collection_row(&mut *conn, id).await?;

    for parent in &parents {
        counts::propagate_from(&mut *conn, parent).await?;
    }

    info!(collection_id = id, detached, parents = parents.len(), "Deleted collection");
    Ok(true)
}
