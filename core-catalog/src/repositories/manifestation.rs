//! Manifestation repository trait and implementation
//!
//! Manifestations are owned by the works subsystem; this repository keeps the
//! minimal record the collection engine needs and keeps counts correct when a
//! manifestation disappears.

use crate::counts;
use crate::db::begin_write;
use crate::error::{CatalogError, Result};
use crate::models::Manifestation;
use crate::repositories::{Page, PageRequest};
use crate::store;
use async_trait::async_trait;
use sqlx::{query, query_as, SqlitePool};
use tracing::debug;

#[async_trait]
pub trait ManifestationRepository: Send + Sync {
    async fn find_by_id(&self, id: &str) -> Result<Option<Manifestation>>;

    async fn insert(&self, manifestation: &Manifestation) -> Result<()>;

    /// Update title and status
    async fn update(&self, manifestation: &Manifestation) -> Result<()>;

    /// Delete a manifestation. Slots referencing it stay in place (as
    /// dangling references) and the counts of their collections and
    /// ancestors are refreshed.
    async fn delete(&self, id: &str) -> Result<bool>;

    /// Query manifestations ordered by title
    async fn query(&self, page_request: PageRequest) -> Result<Page<Manifestation>>;

    async fn count(&self) -> Result<i64>;
}

#[derive(Clone)]
pub struct SqliteManifestationRepository {
    pool: SqlitePool,
}

impl SqliteManifestationRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ManifestationRepository for SqliteManifestationRepository {
    async fn find_by_id(&self, id: &str) -> Result<Option<Manifestation>> {
        let manifestation = query_as::<_, Manifestation>("SELECT * FROM manifestations WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(manifestation)
    }

    async fn insert(&self, manifestation: &Manifestation) -> Result<()> {
        manifestation
            .validate()
            .map_err(|e| CatalogError::invalid("Manifestation", e))?;

        query(
            "INSERT INTO manifestations (id, title, status, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&manifestation.id)
        .bind(&manifestation.title)
        .bind(&manifestation.status)
        .bind(manifestation.created_at)
        .bind(manifestation.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update(&self, manifestation: &Manifestation) -> Result<()> {
        manifestation
            .validate()
            .map_err(|e| CatalogError::invalid("Manifestation", e))?;

        let result = query("UPDATE manifestations SET title = ?, status = ?, updated_at = ? WHERE id = ?")
            .bind(&manifestation.title)
            .bind(&manifestation.status)
            .bind(store::now())
            .bind(&manifestation.id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(CatalogError::not_found("Manifestation", manifestation.id.as_str()));
        }

        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let mut tx = begin_write(&self.pool).await?;

        let holders = store::containing_collection_ids(&mut *tx, id).await?;
        let result = query("DELETE FROM manifestations WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Ok(false);
        }

        for collection_id in &holders {
            counts::propagate_from(&mut tx, collection_id).await?;
        }

        tx.commit().await?;

        debug!(manifestation_id = id, collections = holders.len(), "Deleted manifestation");
        Ok(true)
    }

    async fn query(&self, page_request: PageRequest) -> Result<Page<Manifestation>> {
        let total = self.count().await?;

        let manifestations = query_as::<_, Manifestation>(
            "SELECT * FROM manifestations ORDER BY title ASC, id ASC LIMIT ? OFFSET ?",
        )
        .bind(page_request.limit())
        .bind(page_request.offset())
        .fetch_all(&self.pool)
        .await?;

        Ok(Page::new(manifestations, total as u64, page_request))
    }

    async fn count(&self) -> Result<i64> {
        let (count,): (i64,) = query_as("SELECT COUNT(*) FROM manifestations")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;
    use crate::models::{Collection, CollectionItem, CollectionType, ItemRef};

    #[tokio::test]
    async fn test_insert_update_find() {
        let pool = create_test_pool().await.unwrap();
        let repo = SqliteManifestationRepository::new(pool);

        let mut m = Manifestation::unpublished("Draft");
        repo.insert(&m).await.unwrap();

        m.status = "published".to_string();
        m.title = "Final".to_string();
        repo.update(&m).await.unwrap();

        let found = repo.find_by_id(&m.id).await.unwrap().unwrap();
        assert_eq!(found.title, "Final");
        assert!(found.is_published());

        let page = repo.query(PageRequest::default()).await.unwrap();
        assert_eq!(page.total, 1);
    }

    #[tokio::test]
    async fn test_invalid_status_rejected() {
        let pool = create_test_pool().await.unwrap();
        let repo = SqliteManifestationRepository::new(pool);

        let mut m = Manifestation::new("Poem");
        m.status = "archived".to_string();
        assert!(repo.insert(&m).await.is_err());
        assert_eq!(repo.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_delete_refreshes_counts() {
        let pool = create_test_pool().await.unwrap();
        let repo = SqliteManifestationRepository::new(pool.clone());

        let parent = Collection::new("Parent", CollectionType::Series);
        let child = Collection::new("Child", CollectionType::Volume);
        store::insert_collection(&pool, &parent).await.unwrap();
        store::insert_collection(&pool, &child).await.unwrap();

        let m = Manifestation::new("Poem");
        repo.insert(&m).await.unwrap();
        store::insert_item(&pool, &CollectionItem::new(&child.id, ItemRef::Manifestation(m.id.clone()), 1))
            .await
            .unwrap();
        store::insert_item(&pool, &CollectionItem::new(&parent.id, ItemRef::Collection(child.id.clone()), 1))
            .await
            .unwrap();
        let mut conn = pool.acquire().await.unwrap();
        counts::propagate_from(&mut conn, &child.id).await.unwrap();
        drop(conn);

        assert!(repo.delete(&m.id).await.unwrap());
        assert!(!repo.delete(&m.id).await.unwrap());

        let parent = store::require_collection(&pool, &parent.id).await.unwrap();
        assert_eq!(parent.manifestations_count, 0);
        // The slot survives as a dangling reference.
        assert_eq!(store::ordered_items(&pool, &child.id).await.unwrap().len(), 1);
    }
}
