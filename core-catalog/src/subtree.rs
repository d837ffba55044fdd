//! Bulk loading of collection subtrees.
//!
//! Both directions walk breadth first one level at a time, issuing one batched
//! query per level instead of one per collection. Every record appears once in
//! the result no matter how many paths reach it.

use crate::error::Result;
use crate::models::{Collection, Manifestation, ITEM_TYPE_COLLECTION, ITEM_TYPE_MANIFESTATION};
use crate::store::{self, placeholders, BATCH_SIZE};
use serde::{Deserialize, Serialize};
use sqlx::{query_as, SqliteConnection, SqlitePool};
use std::collections::HashSet;
use tracing::debug;

/// Everything below a root collection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subtree {
    /// Manifestations referenced anywhere in the subtree
    pub manifestations: Vec<Manifestation>,
    /// The root followed by every nested collection, in breadth-first order
    pub collections: Vec<Collection>,
}

/// A root's descendants together with its ancestors
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionTree {
    pub descendants: Subtree,
    pub ancestors: Vec<Collection>,
}

#[derive(Clone)]
pub struct SubtreeFetcher {
    pool: SqlitePool,
}

impl SubtreeFetcher {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Load the root, every nested collection and every referenced
    /// manifestation.
    ///
    /// # Errors
    /// `NotFound` if the root does not exist.
    pub async fn fetch_descendants(&self, root_id: &str) -> Result<Subtree> {
        let mut conn = self.pool.acquire().await?;
        let root = store::require_collection(&mut *conn, root_id).await?;

        let mut seen_collections: HashSet<String> = HashSet::from([root.id.clone()]);
        let mut seen_manifestations: HashSet<String> = HashSet::new();
        let mut manifestation_ids = Vec::new();
        let mut collections = vec![root];
        let mut level = vec![root_id.to_string()];
        let mut depth = 0usize;

        while !level.is_empty() {
            let mut next = Vec::new();

            for (item_type, item_id) in child_refs(&mut conn, &level).await? {
                if item_type == ITEM_TYPE_COLLECTION {
                    if seen_collections.insert(item_id.clone()) {
                        next.push(item_id);
                    }
                } else if item_type == ITEM_TYPE_MANIFESTATION
                    && seen_manifestations.insert(item_id.clone())
                {
                    manifestation_ids.push(item_id);
                }
            }

            let loaded = store::fetch_collections_by_ids(&mut conn, &next).await?;
            // Dangling collection references are skipped, not descended into.
            level = loaded.iter().map(|c| c.id.clone()).collect();
            collections.extend(loaded);
            depth += 1;
        }

        let manifestations = store::fetch_manifestations_by_ids(&mut conn, &manifestation_ids).await?;

        debug!(
            root_id,
            depth,
            collections = collections.len(),
            manifestations = manifestations.len(),
            "Fetched descendants"
        );
        Ok(Subtree {
            manifestations,
            collections,
        })
    }

    /// Load every collection that (transitively) contains the root, nearest
    /// first. The root itself is not included.
    pub async fn fetch_ancestors(&self, root_id: &str) -> Result<Vec<Collection>> {
        let mut conn = self.pool.acquire().await?;
        store::require_collection(&mut *conn, root_id).await?;

        let mut seen: HashSet<String> = HashSet::from([root_id.to_string()]);
        let mut ancestors = Vec::new();
        let mut level = vec![root_id.to_string()];

        while !level.is_empty() {
            let parents: Vec<String> = parent_ids(&mut conn, &level)
                .await?
                .into_iter()
                .filter(|id| seen.insert(id.clone()))
                .collect();

            let loaded = store::fetch_collections_by_ids(&mut conn, &parents).await?;
            level = loaded.iter().map(|c| c.id.clone()).collect();
            ancestors.extend(loaded);
        }

        debug!(root_id, ancestors = ancestors.len(), "Fetched ancestors");
        Ok(ancestors)
    }

    /// Descendants and ancestors of a root in one call
    pub async fn fetch(&self, root_id: &str) -> Result<CollectionTree> {
        Ok(CollectionTree {
            descendants: self.fetch_descendants(root_id).await?,
            ancestors: self.fetch_ancestors(root_id).await?,
        })
    }
}

/// `(item_type, item_id)` of every non-empty slot in `collection_ids`
async fn child_refs(
    conn: &mut SqliteConnection,
    collection_ids: &[String],
) -> Result<Vec<(String, String)>> {
    let mut refs = Vec::new();

    for chunk in collection_ids.chunks(BATCH_SIZE) {
        let sql = format!(
            "SELECT item_type, item_id FROM collection_items \
             WHERE collection_id IN ({}) AND item_type IS NOT NULL \
             ORDER BY seqno, id",
            placeholders(chunk.len())
        );
        let mut q = query_as::<_, (String, String)>(&sql);
        for id in chunk {
            q = q.bind(id);
        }
        refs.extend(q.fetch_all(&mut *conn).await?);
    }

    Ok(refs)
}

/// Distinct collections holding a slot that references any of `collection_ids`
async fn parent_ids(conn: &mut SqliteConnection, collection_ids: &[String]) -> Result<Vec<String>> {
    let mut parents = Vec::new();

    for chunk in collection_ids.chunks(BATCH_SIZE) {
        let sql = format!(
            "SELECT DISTINCT collection_id FROM collection_items \
             WHERE item_type = ? AND item_id IN ({}) ORDER BY collection_id",
            placeholders(chunk.len())
        );
        let mut q = query_as::<_, (String,)>(&sql).bind(ITEM_TYPE_COLLECTION);
        for id in chunk {
            q = q.bind(id);
        }
        parents.extend(q.fetch_all(&mut *conn).await?.into_iter().map(|(id,)| id));
    }

    Ok(parents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;
    use crate::error::CatalogError;
    use crate::models::{CollectionType, ItemRef};
    use crate::repositories::{ManifestationRepository, SqliteManifestationRepository};
    use crate::sequencer::Sequencer;

    async fn collection(pool: &SqlitePool, title: &str) -> String {
        let c = Collection::new(title, CollectionType::Series);
        store::insert_collection(pool, &c).await.unwrap();
        c.id
    }

    async fn work(pool: &SqlitePool, title: &str) -> String {
        let m = Manifestation::new(title);
        SqliteManifestationRepository::new(pool.clone())
            .insert(&m)
            .await
            .unwrap();
        m.id
    }

    /// top -> {left, right}; left -> {shared, m1}; right -> {shared, m1}; shared -> {m2}
    async fn diamond(pool: &SqlitePool) -> (String, String, String, String, String, String) {
        let seq = Sequencer::new(pool.clone());
        let top = collection(pool, "Top").await;
        let left = collection(pool, "Left").await;
        let right = collection(pool, "Right").await;
        let shared = collection(pool, "Shared").await;
        let m1 = work(pool, "m1").await;
        let m2 = work(pool, "m2").await;

        for (parent, child) in [(&top, &left), (&top, &right), (&left, &shared), (&right, &shared)] {
            seq.append_item(parent, ItemRef::Collection(child.clone())).await.unwrap();
        }
        seq.append_item(&left, ItemRef::Manifestation(m1.clone())).await.unwrap();
        seq.append_item(&right, ItemRef::Manifestation(m1.clone())).await.unwrap();
        seq.append_item(&shared, ItemRef::Manifestation(m2.clone())).await.unwrap();
        seq.append_item(&top, ItemRef::Empty).await.unwrap();

        (top, left, right, shared, m1, m2)
    }

    #[tokio::test]
    async fn test_descendants_deduplicated() {
        let pool = create_test_pool().await.unwrap();
        let (top, left, right, shared, m1, m2) = diamond(&pool).await;

        let subtree = SubtreeFetcher::new(pool).fetch_descendants(&top).await.unwrap();

        let collections: Vec<_> = subtree.collections.iter().map(|c| c.id.clone()).collect();
        assert_eq!(collections, vec![top, left, right, shared]);

        let mut manifestations: Vec<_> = subtree.manifestations.iter().map(|m| m.id.clone()).collect();
        manifestations.sort();
        let mut expected = vec![m1, m2];
        expected.sort();
        assert_eq!(manifestations, expected);
    }

    #[tokio::test]
    async fn test_ancestors_deduplicated() {
        let pool = create_test_pool().await.unwrap();
        let (top, left, right, shared, _, _) = diamond(&pool).await;
        let fetcher = SubtreeFetcher::new(pool);

        let ancestors: Vec<_> = fetcher
            .fetch_ancestors(&shared)
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ancestors.len(), 3);
        assert!(ancestors.contains(&left) && ancestors.contains(&right));
        assert_eq!(ancestors.last(), Some(&top));

        assert!(fetcher.fetch_ancestors(&top).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fetch_both_directions() {
        let pool = create_test_pool().await.unwrap();
        let (top, left, _, shared, _, m2) = diamond(&pool).await;

        let tree = SubtreeFetcher::new(pool).fetch(&left).await.unwrap();
        assert_eq!(tree.descendants.collections.len(), 2);
        assert_eq!(tree.descendants.collections[1].id, shared);
        assert!(tree.descendants.manifestations.iter().any(|m| m.id == m2));
        assert_eq!(tree.ancestors.len(), 1);
        assert_eq!(tree.ancestors[0].id, top);
    }

    #[tokio::test]
    async fn test_missing_root() {
        let pool = create_test_pool().await.unwrap();
        let fetcher = SubtreeFetcher::new(pool);
        assert!(matches!(
            fetcher.fetch_descendants("nope").await,
            Err(CatalogError::NotFound { .. })
        ));
    }
}
