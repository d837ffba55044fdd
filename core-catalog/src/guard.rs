//! Acyclicity guard for collection containment.
//!
//! A collection may hold another collection only if the inserted collection
//! does not already (transitively) contain the target. The walk runs on the
//! caller's connection so it sees the same snapshot as the write it protects.

use crate::error::{CatalogError, Result};
use crate::models::ItemRef;
use crate::store;
use sqlx::SqliteConnection;
use std::collections::HashSet;
use tracing::debug;

/// Reject `item` if placing it in `target_collection_id` would form a cycle.
///
/// Non-collection references always pass. The walk is depth-first over child
/// collections with a visited set, so diamonds terminate and depth is
/// unbounded.
pub async fn validate_insertion(
    conn: &mut SqliteConnection,
    target_collection_id: &str,
    item: &ItemRef,
) -> Result<()> {
    let Some(child_id) = item.collection_id() else {
        return Ok(());
    };

    let cycle = || CatalogError::Cycle {
        field: "item".to_string(),
        collection_id: target_collection_id.to_string(),
        item_id: child_id.to_string(),
    };

    if child_id == target_collection_id {
        return Err(cycle());
    }

    let mut visited: HashSet<String> = HashSet::new();
    let mut stack = vec![child_id.to_string()];

    while let Some(current) = stack.pop() {
        if !visited.insert(current.clone()) {
            continue;
        }

        for grandchild in store::child_collection_ids(&mut *conn, &current).await? {
            if grandchild == target_collection_id {
                debug!(
                    target = target_collection_id,
                    item = child_id,
                    via = %current,
                    "Rejected insertion that would form a cycle"
                );
                return Err(cycle());
            }
            if !visited.contains(&grandchild) {
                stack.push(grandchild);
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;
    use crate::models::{Collection, CollectionItem, CollectionType};
    use sqlx::SqlitePool;

    async fn collection(pool: &SqlitePool, title: &str) -> String {
        let c = Collection::new(title, CollectionType::Series);
        store::insert_collection(pool, &c).await.unwrap();
        c.id
    }

    async fn nest(pool: &SqlitePool, parent: &str, child: &str) {
        let seqno = store::max_seqno(pool, parent).await.unwrap() + 1;
        let item = CollectionItem::new(parent, ItemRef::Collection(child.to_string()), seqno);
        store::insert_item(pool, &item).await.unwrap();
    }

    #[tokio::test]
    async fn test_non_collection_refs_pass() {
        let pool = create_test_pool().await.unwrap();
        let a = collection(&pool, "A").await;
        let mut conn = pool.acquire().await.unwrap();

        assert!(validate_insertion(&mut conn, &a, &ItemRef::Empty).await.is_ok());
        let m = ItemRef::Manifestation("m-1".to_string());
        assert!(validate_insertion(&mut conn, &a, &m).await.is_ok());
    }

    #[tokio::test]
    async fn test_self_reference_rejected() {
        let pool = create_test_pool().await.unwrap();
        let a = collection(&pool, "A").await;
        let mut conn = pool.acquire().await.unwrap();

        let err = validate_insertion(&mut conn, &a, &ItemRef::Collection(a.clone()))
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::Cycle { ref field, .. } if field == "item"));
    }

    #[tokio::test]
    async fn test_deep_cycle_rejected() {
        let pool = create_test_pool().await.unwrap();
        let a = collection(&pool, "A").await;
        let b = collection(&pool, "B").await;
        let c = collection(&pool, "C").await;
        let d = collection(&pool, "D").await;
        nest(&pool, &a, &b).await;
        nest(&pool, &b, &c).await;
        nest(&pool, &c, &d).await;

        let mut conn = pool.acquire().await.unwrap();
        let result = validate_insertion(&mut conn, &d, &ItemRef::Collection(a.clone())).await;
        assert!(matches!(result, Err(CatalogError::Cycle { .. })));

        // The other direction is just deeper nesting.
        let e = collection(&pool, "E").await;
        assert!(validate_insertion(&mut conn, &a, &ItemRef::Collection(e)).await.is_ok());
    }

    #[tokio::test]
    async fn test_diamond_terminates() {
        let pool = create_test_pool().await.unwrap();
        let top = collection(&pool, "Top").await;
        let left = collection(&pool, "Left").await;
        let right = collection(&pool, "Right").await;
        let bottom = collection(&pool, "Bottom").await;
        nest(&pool, &top, &left).await;
        nest(&pool, &top, &right).await;
        nest(&pool, &left, &bottom).await;
        nest(&pool, &right, &bottom).await;

        let other = collection(&pool, "Other").await;
        let mut conn = pool.acquire().await.unwrap();
        assert!(validate_insertion(&mut conn, &other, &ItemRef::Collection(top.clone()))
            .await
            .is_ok());
        assert!(validate_insertion(&mut conn, &bottom, &ItemRef::Collection(top))
            .await
            .is_err());
    }
}
