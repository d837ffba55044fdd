//! Creating collections in place inside their parents.
//!
//! Editors build periodicals issue by issue and often create a sub-collection
//! straight from the parent's item list. Each operation inserts the new
//! collection rows and the linking slot in one transaction, through the same
//! guard and count propagation as the sequencer.

use crate::counts;
use crate::db::begin_write;
use crate::error::{CatalogError, Result};
use crate::models::{
    Collection, CollectionItem, CollectionRow, CollectionType, ItemRef, ITEM_TYPE_COLLECTION,
};
use crate::sequencer::append_refs;
use crate::store;
use serde::{Deserialize, Serialize};
use sqlx::{query_as, SqliteConnection, SqlitePool};
use tracing::info;

/// A collection created inside a parent, with the slot that links them
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlacedCollection {
    pub collection: Collection,
    pub slot: CollectionItem,
}

/// A new periodical together with its first issue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeriodicalWithIssue {
    pub periodical: Collection,
    pub issue: Collection,
    pub slot: CollectionItem,
}

#[derive(Clone)]
pub struct Composer {
    pool: SqlitePool,
}

impl Composer {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a `periodical_issue` titled `title` and append it to `periodical_id`.
    ///
    /// # Errors
    /// - `NotFound` if the periodical does not exist
    /// - `InvalidInput` for a blank title
    pub async fn add_periodical_issue(&self, periodical_id: &str, title: &str) -> Result<PlacedCollection> {
        let mut tx = begin_write(&self.pool).await?;
        store::require_collection(&mut *tx, periodical_id).await?;

        let issue = Collection::new(title, CollectionType::PeriodicalIssue);
        let placed = place(&mut tx, periodical_id, issue).await?;

        tx.commit().await?;

        info!(periodical_id, issue_id = %placed.collection.id, seqno = placed.slot.seqno, "Added periodical issue");
        Ok(placed)
    }

    /// Create a periodical and its first issue atomically.
    ///
    /// # Errors
    /// Returns `InvalidInput` when either title is blank; nothing is written.
    pub async fn create_periodical_with_issue(
        &self,
        periodical_title: &str,
        issue_title: &str,
    ) -> Result<PeriodicalWithIssue> {
        if periodical_title.trim().is_empty() {
            return Err(CatalogError::invalid("periodical_title", "cannot be blank"));
        }
        if issue_title.trim().is_empty() {
            return Err(CatalogError::invalid("issue_title", "cannot be blank"));
        }

        let mut tx = begin_write(&self.pool).await?;

        let periodical = Collection::new(periodical_title, CollectionType::Periodical);
        store::insert_collection(&mut *tx, &periodical).await?;

        let issue = Collection::new(issue_title, CollectionType::PeriodicalIssue);
        let PlacedCollection { collection: issue, slot } = place(&mut tx, &periodical.id, issue).await?;

        tx.commit().await?;

        info!(periodical_id = %periodical.id, issue_id = %issue.id, "Created periodical with first issue");
        Ok(PeriodicalWithIssue {
            periodical,
            issue,
            slot,
        })
    }

    /// Direct child collections of type `periodical_issue`, in slot order
    pub async fn periodical_issues(&self, collection_id: &str) -> Result<Vec<Collection>> {
        store::require_collection(&self.pool, collection_id).await?;

        let rows = query_as::<_, CollectionRow>(
            r#"
            SELECT c.* FROM collection_items ci
            JOIN collections c ON c.id = ci.item_id
            WHERE ci.collection_id = ? AND ci.item_type = ? AND c.collection_type = ?
            ORDER BY ci.seqno, ci.id
            "#,
        )
        .bind(collection_id)
        .bind(ITEM_TYPE_COLLECTION)
        .bind(CollectionType::PeriodicalIssue.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Collection::try_from).collect()
    }

    /// Create a collection of `collection_type` and append it to `parent_id`.
    ///
    /// # Errors
    /// - `NotFound` if the parent does not exist
    /// - `InvalidInput` for a blank title or the `uncollected` type
    pub async fn create_sub_collection(
        &self,
        parent_id: &str,
        title: &str,
        collection_type: CollectionType,
    ) -> Result<PlacedCollection> {
        if collection_type.is_uncollected() {
            return Err(CatalogError::invalid(
                "collection_type",
                "uncollected collections are maintained automatically",
            ));
        }

        let mut tx = begin_write(&self.pool).await?;
        store::require_collection(&mut *tx, parent_id).await?;

        let placed = place(&mut tx, parent_id, Collection::new(title, collection_type)).await?;

        tx.commit().await?;

        info!(
            parent_id,
            collection_id = %placed.collection.id,
            collection_type = %placed.collection.collection_type,
            "Created sub-collection"
        );
        Ok(placed)
    }
}

/// Insert `collection` and append it as the last slot of `parent_id`
async fn place(conn: &mut SqliteConnection, parent_id: &str, collection: Collection) -> Result<PlacedCollection> {
    store::insert_collection(&mut *conn, &collection).await?;

    let mut created = append_refs(conn, parent_id, vec![ItemRef::Collection(collection.id.clone())]).await?;
    let slot = created
        .pop()
        .ok_or_else(|| CatalogError::not_found("CollectionItem", &collection.id))?;

    counts::propagate_from(conn, parent_id).await?;

    Ok(PlacedCollection { collection, slot })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;
    use crate::models::{ItemAttrs, Manifestation};
    use crate::repositories::{
        CollectionRepository, ManifestationRepository, SqliteCollectionRepository,
        SqliteManifestationRepository,
    };
    use crate::sequencer::Sequencer;

    struct Fixture {
        pool: SqlitePool,
        composer: Composer,
        sequencer: Sequencer,
        collections: SqliteCollectionRepository,
    }

    impl Fixture {
        async fn new() -> Self {
            let pool = create_test_pool().await.unwrap();
            Self {
                composer: Composer::new(pool.clone()),
                sequencer: Sequencer::new(pool.clone()),
                collections: SqliteCollectionRepository::new(pool.clone()),
                pool,
            }
        }

        async fn collection(&self, title: &str, kind: CollectionType) -> String {
            let c = Collection::new(title, kind);
            self.collections.insert(&c).await.unwrap();
            c.id
        }

        async fn count(&self, id: &str) -> i64 {
            self.collections
                .find_by_id(id)
                .await
                .unwrap()
                .unwrap()
                .manifestations_count
        }
    }

    #[tokio::test]
    async fn test_add_periodical_issue_appends_after_existing_slots() {
        let f = Fixture::new().await;
        let periodical = f.collection("The Dial", CollectionType::Periodical).await;
        f.sequencer
            .add_item(&periodical, ItemRef::Empty, ItemAttrs::placeholder("Masthead"))
            .await
            .unwrap();

        let placed = f
            .composer
            .add_periodical_issue(&periodical, "July 1922")
            .await
            .unwrap();

        assert_eq!(placed.collection.collection_type, CollectionType::PeriodicalIssue);
        assert_eq!(placed.slot.seqno, 2);
        assert_eq!(placed.slot.collection_id, periodical);
        assert_eq!(placed.slot.item, ItemRef::Collection(placed.collection.id.clone()));
        assert!(f.collections.find_by_id(&placed.collection.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_add_periodical_issue_to_missing_periodical_writes_nothing() {
        let f = Fixture::new().await;

        let err = f
            .composer
            .add_periodical_issue("no-such-periodical", "Issue 1")
            .await
            .unwrap_err();

        assert!(matches!(err, CatalogError::NotFound { .. }));
        assert_eq!(f.collections.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_create_periodical_with_issue() {
        let f = Fixture::new().await;

        let created = f
            .composer
            .create_periodical_with_issue("Orpheu", "Issue 1")
            .await
            .unwrap();

        assert_eq!(created.periodical.collection_type, CollectionType::Periodical);
        assert_eq!(created.slot.collection_id, created.periodical.id);
        assert_eq!(created.slot.seqno, 1);

        let issues = f.composer.periodical_issues(&created.periodical.id).await.unwrap();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].id, created.issue.id);
        assert_eq!(f.collections.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_create_periodical_with_blank_title_writes_nothing() {
        let f = Fixture::new().await;

        for (periodical, issue) in [("", "Issue 1"), ("Orpheu", "   ")] {
            let err = f
                .composer
                .create_periodical_with_issue(periodical, issue)
                .await
                .unwrap_err();
            assert!(matches!(err, CatalogError::InvalidInput { .. }));
        }

        assert_eq!(f.collections.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_periodical_issues_in_slot_order_only() {
        let f = Fixture::new().await;
        let periodical = f.collection("Presença", CollectionType::Periodical).await;

        let second = f.composer.add_periodical_issue(&periodical, "No. 2").await.unwrap();
        let supplement = f
            .composer
            .create_sub_collection(&periodical, "Supplement", CollectionType::Volume)
            .await
            .unwrap();
        let first = f.composer.add_periodical_issue(&periodical, "No. 1").await.unwrap();

        // Move "No. 1" to the front.
        f.sequencer.reorder(&periodical, &first.slot.id, 2, 0).await.unwrap();

        let issues = f.composer.periodical_issues(&periodical).await.unwrap();
        let ids: Vec<&str> = issues.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec![first.collection.id.as_str(), second.collection.id.as_str()]);
        assert!(!ids.contains(&supplement.collection.id.as_str()));

        assert!(matches!(
            f.composer.periodical_issues("missing").await.unwrap_err(),
            CatalogError::NotFound { .. }
        ));
    }

    #[tokio::test]
    async fn test_create_sub_collection_feeds_parent_counts() {
        let f = Fixture::new().await;
        let series = f.collection("Collected Works", CollectionType::Series).await;

        let placed = f
            .composer
            .create_sub_collection(&series, "Poems", CollectionType::Volume)
            .await
            .unwrap();
        assert_eq!(f.count(&series).await, 0);

        let m = Manifestation::new("Ode");
        SqliteManifestationRepository::new(f.pool.clone())
            .insert(&m)
            .await
            .unwrap();
        f.sequencer
            .append_item(&placed.collection.id, ItemRef::Manifestation(m.id))
            .await
            .unwrap();

        assert_eq!(f.count(&placed.collection.id).await, 1);
        assert_eq!(f.count(&series).await, 1);
    }

    #[tokio::test]
    async fn test_create_sub_collection_rejects_uncollected_and_blank_titles() {
        let f = Fixture::new().await;
        let parent = f.collection("Volume", CollectionType::Volume).await;

        let err = f
            .composer
            .create_sub_collection(&parent, "Bucket", CollectionType::Uncollected)
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::InvalidInput { ref field, .. } if field == "collection_type"));

        let err = f
            .composer
            .create_sub_collection(&parent, " ", CollectionType::Other)
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::InvalidInput { .. }));

        assert_eq!(f.collections.count().await.unwrap(), 1);
    }
}
