//! Read access to collection slots
//!
//! Writes go through [`crate::sequencer::Sequencer`], which keeps ordering,
//! acyclicity and counts consistent.

use crate::error::Result;
use crate::models::{CollectionItem, CollectionItemRow, ItemRef};
use crate::store;
use async_trait::async_trait;
use sqlx::{query_as, SqlitePool};

#[async_trait]
pub trait CollectionItemRepository: Send + Sync {
    async fn find_by_id(&self, id: &str) -> Result<Option<CollectionItem>>;

    /// Items of a collection in `(seqno, id)` order
    async fn find_by_collection(&self, collection_id: &str) -> Result<Vec<CollectionItem>>;

    /// Every slot pointing at `item`, across all collections
    async fn find_referencing(&self, item: &ItemRef) -> Result<Vec<CollectionItem>>;

    /// Display title: `alt_title` for empty slots, otherwise the referenced
    /// record's title. `None` when nothing is available.
    async fn resolve_title(&self, item: &CollectionItem) -> Result<Option<String>>;

    async fn count_by_collection(&self, collection_id: &str) -> Result<i64>;
}

#[derive(Clone)]
pub struct SqliteCollectionItemRepository {
    pool: SqlitePool,
}

impl SqliteCollectionItemRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CollectionItemRepository for SqliteCollectionItemRepository {
    async fn find_by_id(&self, id: &str) -> Result<Option<CollectionItem>> {
        store::fetch_item(&self.pool, id).await
    }

    async fn find_by_collection(&self, collection_id: &str) -> Result<Vec<CollectionItem>> {
        store::ordered_items(&self.pool, collection_id).await
    }

    async fn find_referencing(&self, item: &ItemRef) -> Result<Vec<CollectionItem>> {
        let (Some(item_type), Some(item_id)) = item.to_parts() else {
            return Ok(Vec::new());
        };

        let rows = query_as::<_, CollectionItemRow>(
            "SELECT * FROM collection_items WHERE item_type = ? AND item_id = ? \
             ORDER BY collection_id, seqno, id",
        )
        .bind(item_type)
        .bind(item_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(CollectionItem::try_from).collect()
    }

    async fn resolve_title(&self, item: &CollectionItem) -> Result<Option<String>> {
        let title = match &item.item {
            ItemRef::Empty => item.placeholder_title().map(str::to_string),
            ItemRef::Manifestation(id) => {
                query_as::<_, (String,)>("SELECT title FROM manifestations WHERE id = ?")
                    .bind(id)
                    .fetch_optional(&self.pool)
                    .await?
                    .map(|(title,)| title)
            }
            ItemRef::Collection(id) => {
                query_as::<_, (String,)>("SELECT title FROM collections WHERE id = ?")
                    .bind(id)
                    .fetch_optional(&self.pool)
                    .await?
                    .map(|(title,)| title)
            }
        };

        Ok(title)
    }

    async fn count_by_collection(&self, collection_id: &str) -> Result<i64> {
        let (count,): (i64,) =
            query_as("SELECT COUNT(*) FROM collection_items WHERE collection_id = ?")
                .bind(collection_id)
                .fetch_one(&self.pool)
                .await?;

        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;
    use crate::models::{Collection, CollectionType, Manifestation};
    use crate::repositories::{ManifestationRepository, SqliteManifestationRepository};

    #[tokio::test]
    async fn test_titles_and_reverse_lookup() {
        let pool = create_test_pool().await.unwrap();
        let repo = SqliteCollectionItemRepository::new(pool.clone());

        let outer = Collection::new("Outer", CollectionType::Series);
        let inner = Collection::new("Inner", CollectionType::Volume);
        store::insert_collection(&pool, &outer).await.unwrap();
        store::insert_collection(&pool, &inner).await.unwrap();
        let poem = Manifestation::new("The Raven");
        SqliteManifestationRepository::new(pool.clone())
            .insert(&poem)
            .await
            .unwrap();

        let mut placeholder = CollectionItem::new(&outer.id, ItemRef::Empty, 1);
        placeholder.alt_title = Some("Lost poem".to_string());
        let nested = CollectionItem::new(&outer.id, ItemRef::Collection(inner.id.clone()), 2);
        let work = CollectionItem::new(&inner.id, ItemRef::Manifestation(poem.id.clone()), 1);
        let dangling = CollectionItem::new(&inner.id, ItemRef::Manifestation("gone".to_string()), 2);
        for item in [&placeholder, &nested, &work, &dangling] {
            store::insert_item(&pool, item).await.unwrap();
        }

        assert_eq!(repo.resolve_title(&placeholder).await.unwrap().as_deref(), Some("Lost poem"));
        assert_eq!(repo.resolve_title(&nested).await.unwrap().as_deref(), Some("Inner"));
        assert_eq!(repo.resolve_title(&work).await.unwrap().as_deref(), Some("The Raven"));
        assert_eq!(repo.resolve_title(&dangling).await.unwrap(), None);

        let referencing = repo
            .find_referencing(&ItemRef::Collection(inner.id.clone()))
            .await
            .unwrap();
        assert_eq!(referencing.len(), 1);
        assert_eq!(referencing[0].collection_id, outer.id);
        assert!(repo.find_referencing(&ItemRef::Empty).await.unwrap().is_empty());

        assert_eq!(repo.count_by_collection(&outer.id).await.unwrap(), 2);
        let items = repo.find_by_collection(&outer.id).await.unwrap();
        assert_eq!(items[0].id, placeholder.id);
        assert_eq!(repo.find_by_id(&work.id).await.unwrap().unwrap().seqno, 1);
    }
}
