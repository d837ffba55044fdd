//! Positional editing of collection slots.
//!
//! Every operation runs in one transaction: the acyclicity guard, the slot
//! writes and the count refresh commit together or not at all.
//!
//! Ordering is by `(seqno, id)`. Local reorders and moves renumber the
//! collection densely (`1..=N`); transplants only shift the destination, so the
//! source may be left with gaps.

use crate::counts;
use crate::db::begin_write;
use crate::error::{CatalogError, Result};
use crate::guard;
use crate::models::{CollectionItem, ItemAttrs, ItemRef};
use crate::store;
use sqlx::{query, SqliteConnection, SqlitePool};
use tracing::{debug, info};

/// Append `items` after the current maximum seqno without refreshing counts.
///
/// Each reference is checked against the guard and must exist. Callers
/// refresh counts once when the batch is complete.
pub(crate) async fn append_refs(
    conn: &mut SqliteConnection,
    collection_id: &str,
    items: Vec<ItemRef>,
) -> Result<Vec<CollectionItem>> {
    let mut next = store::max_seqno(&mut *conn, collection_id).await? + 1;
    let mut created = Vec::with_capacity(items.len());

    for item in items {
        store::ensure_target_exists(&mut *conn, &item).await?;
        guard::validate_insertion(&mut *conn, collection_id, &item).await?;

        let slot = CollectionItem::new(collection_id, item, next);
        store::insert_item(&mut *conn, &slot).await?;
        created.push(slot);
        next += 1;
    }

    Ok(created)
}

#[derive(Clone)]
pub struct Sequencer {
    pool: SqlitePool,
}

impl Sequencer {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Add a slot to a collection.
    ///
    /// Without an explicit `attrs.seqno` the slot is appended after the
    /// current maximum.
    ///
    /// # Errors
    /// - `NotFound` if the collection or the referenced record is missing
    /// - `Cycle` if a collection reference would contain the target
    /// - `InvalidInput` for a non-positive seqno
    pub async fn add_item(
        &self,
        collection_id: &str,
        item: ItemRef,
        attrs: ItemAttrs,
    ) -> Result<CollectionItem> {
        let mut tx = begin_write(&self.pool).await?;

        store::require_collection(&mut *tx, collection_id).await?;
        store::ensure_target_exists(&mut tx, &item).await?;
        guard::validate_insertion(&mut tx, collection_id, &item).await?;

        let seqno = match attrs.seqno {
            Some(seqno) if seqno <= 0 => {
                return Err(CatalogError::invalid("seqno", "must be positive"));
            }
            Some(seqno) => seqno,
            None => store::max_seqno(&mut *tx, collection_id).await? + 1,
        };

        let mut slot = CollectionItem::new(collection_id, item, seqno);
        slot.alt_title = attrs.alt_title;
        slot.markdown = attrs.markdown;
        store::insert_item(&mut *tx, &slot).await?;

        if slot.item.affects_count() {
            counts::propagate_from(&mut tx, collection_id).await?;
        }

        tx.commit().await?;

        info!(collection_id, item_id = %slot.id, seqno, "Added collection item");
        Ok(slot)
    }

    /// Add a slot after the current maximum seqno
    pub async fn append_item(&self, collection_id: &str, item: ItemRef) -> Result<CollectionItem> {
        self.add_item(collection_id, item, ItemAttrs::default()).await
    }

    /// Append many references with a single count refresh at the end
    pub async fn append_many(
        &self,
        collection_id: &str,
        items: Vec<ItemRef>,
    ) -> Result<Vec<CollectionItem>> {
        let mut tx = begin_write(&self.pool).await?;
        store::require_collection(&mut *tx, collection_id).await?;

        let created = append_refs(&mut tx, collection_id, items).await?;
        if created.iter().any(|slot| slot.item.affects_count()) {
            counts::propagate_from(&mut tx, collection_id).await?;
        }

        tx.commit().await?;

        info!(collection_id, added = created.len(), "Appended collection items");
        Ok(created)
    }

    /// Replace a slot's inline content. `attrs.seqno`, when present, moves
    /// the slot to that seqno without renumbering its neighbours.
    pub async fn update_item(&self, item_id: &str, attrs: ItemAttrs) -> Result<CollectionItem> {
        let mut tx = begin_write(&self.pool).await?;
        let mut slot = store::require_item(&mut *tx, item_id).await?;

        if let Some(seqno) = attrs.seqno {
            if seqno <= 0 {
                return Err(CatalogError::invalid("seqno", "must be positive"));
            }
            slot.seqno = seqno;
        }
        slot.alt_title = attrs.alt_title;
        slot.markdown = attrs.markdown;
        slot.updated_at = store::now();

        query(
            "UPDATE collection_items SET seqno = ?, alt_title = ?, markdown = ?, updated_at = ? \
             WHERE id = ?",
        )
        .bind(slot.seqno)
        .bind(&slot.alt_title)
        .bind(&slot.markdown)
        .bind(slot.updated_at)
        .bind(&slot.id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        debug!(item_id, "Updated collection item");
        Ok(slot)
    }

    /// Point an existing slot at a different record, keeping its position
    pub async fn retarget_item(&self, item_id: &str, item: ItemRef) -> Result<CollectionItem> {
        let mut tx = begin_write(&self.pool).await?;
        let mut slot = store::require_item(&mut *tx, item_id).await?;

        store::ensure_target_exists(&mut tx, &item).await?;
        guard::validate_insertion(&mut tx, &slot.collection_id, &item).await?;

        let affects_count = slot.item.affects_count() || item.affects_count();
        let (item_type, target_id) = item.to_parts();
        slot.updated_at = store::now();

        query("UPDATE collection_items SET item_type = ?, item_id = ?, updated_at = ? WHERE id = ?")
            .bind(item_type)
            .bind(target_id)
            .bind(slot.updated_at)
            .bind(&slot.id)
            .execute(&mut *tx)
            .await?;
        slot.item = item;

        if affects_count {
            counts::propagate_from(&mut tx, &slot.collection_id).await?;
        }

        tx.commit().await?;

        info!(item_id, collection_id = %slot.collection_id, "Retargeted collection item");
        Ok(slot)
    }

    /// Remove a slot. Neighbours keep their seqnos.
    ///
    /// # Returns
    /// - `Ok(true)` if the slot was removed
    /// - `Ok(false)` if it did not exist
    pub async fn remove_item(&self, item_id: &str) -> Result<bool> {
        let mut tx = begin_write(&self.pool).await?;

        let Some(slot) = store::fetch_item(&mut *tx, item_id).await? else {
            return Ok(false);
        };

        store::delete_item_row(&mut *tx, item_id).await?;
        if slot.item.affects_count() {
            counts::propagate_from(&mut tx, &slot.collection_id).await?;
        }

        tx.commit().await?;

        info!(item_id, collection_id = %slot.collection_id, "Removed collection item");
        Ok(true)
    }

    /// Drag-and-drop reorder within one collection.
    ///
    /// Indices are zero-based positions in `(seqno, id)` order. The slot's
    /// actual position is used as the origin; `new_index` is clamped to the
    /// end of the list. The whole collection is then renumbered `1..=N`,
    /// skipping rows already in place. Returns the resulting order.
    pub async fn reorder(
        &self,
        collection_id: &str,
        item_id: &str,
        old_index: usize,
        new_index: usize,
    ) -> Result<Vec<CollectionItem>> {
        let mut tx = begin_write(&self.pool).await?;
        store::require_collection(&mut *tx, collection_id).await?;

        let mut items = store::ordered_items(&mut *tx, collection_id).await?;
        let position = position_of(&items, collection_id, item_id)?;

        if old_index == new_index {
            return Ok(items);
        }
        if position != old_index {
            debug!(item_id, old_index, position, "Stale reorder origin, using actual position");
        }

        let target = new_index.min(items.len() - 1);
        let moved = items.remove(position);
        items.insert(target, moved);

        let (items, written) = store::renumber_densely(&mut tx, items).await?;
        tx.commit().await?;

        info!(collection_id, item_id, from = position, to = target, written, "Reordered collection");
        Ok(items)
    }

    /// Swap a slot with its predecessor; no-op for the first slot
    pub async fn move_item_up(&self, collection_id: &str, item_id: &str) -> Result<Vec<CollectionItem>> {
        self.swap_with_neighbour(collection_id, item_id, Direction::Up).await
    }

    /// Swap a slot with its successor; no-op for the last slot
    pub async fn move_item_down(&self, collection_id: &str, item_id: &str) -> Result<Vec<CollectionItem>> {
        self.swap_with_neighbour(collection_id, item_id, Direction::Down).await
    }

    async fn swap_with_neighbour(
        &self,
        collection_id: &str,
        item_id: &str,
        direction: Direction,
    ) -> Result<Vec<CollectionItem>> {
        let mut tx = begin_write(&self.pool).await?;
        store::require_collection(&mut *tx, collection_id).await?;

        let mut items = store::ordered_items(&mut *tx, collection_id).await?;
        let position = position_of(&items, collection_id, item_id)?;

        let neighbour = match direction {
            Direction::Up => position.checked_sub(1),
            Direction::Down => Some(position + 1).filter(|&n| n < items.len()),
        };
        let Some(neighbour) = neighbour else {
            return Ok(items);
        };

        items.swap(position, neighbour);
        let (items, written) = store::renumber_densely(&mut tx, items).await?;
        tx.commit().await?;

        debug!(collection_id, item_id, ?direction, written, "Moved collection item");
        Ok(items)
    }

    /// Move a slot into `dest_collection_id` at 1-based rank `new_position`.
    ///
    /// A rank `<= 1` inserts first, a rank past the end appends. Destination
    /// slots at or after the chosen seqno shift up by one. The source
    /// collection is not renumbered. Counts of both collections and their
    /// ancestors are refreshed in the same transaction.
    pub async fn transplant(
        &self,
        item_id: &str,
        dest_collection_id: &str,
        new_position: i64,
    ) -> Result<CollectionItem> {
        let mut tx = begin_write(&self.pool).await?;

        let mut slot = store::require_item(&mut *tx, item_id).await?;
        store::require_collection(&mut *tx, dest_collection_id).await?;
        guard::validate_insertion(&mut tx, dest_collection_id, &slot.item).await?;

        let dest_items = store::ordered_items(&mut *tx, dest_collection_id).await?;
        let new_seqno = if new_position <= 1 {
            1
        } else if new_position as usize > dest_items.len() {
            dest_items.last().map(|last| last.seqno).unwrap_or(0) + 1
        } else {
            dest_items[new_position as usize - 1].seqno
        };

        let shifted = query(
            "UPDATE collection_items SET seqno = seqno + 1, updated_at = ? \
             WHERE collection_id = ? AND seqno >= ? AND id != ?",
        )
        .bind(store::now())
        .bind(dest_collection_id)
        .bind(new_seqno)
        .bind(&slot.id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let source_collection_id = std::mem::replace(&mut slot.collection_id, dest_collection_id.to_string());
        slot.seqno = new_seqno;
        slot.updated_at = store::now();

        query("UPDATE collection_items SET collection_id = ?, seqno = ?, updated_at = ? WHERE id = ?")
            .bind(&slot.collection_id)
            .bind(slot.seqno)
            .bind(slot.updated_at)
            .bind(&slot.id)
            .execute(&mut *tx)
            .await?;

        if slot.item.affects_count() && source_collection_id != slot.collection_id {
            counts::propagate_from(&mut tx, &source_collection_id).await?;
            counts::propagate_from(&mut tx, &slot.collection_id).await?;
        }

        tx.commit().await?;

        info!(
            item_id,
            from = %source_collection_id,
            to = dest_collection_id,
            seqno = new_seqno,
            shifted,
            "Transplanted collection item"
        );
        Ok(slot)
    }
}

#[derive(Debug, Clone, Copy)]
enum Direction {
    Up,
    Down,
}

fn position_of(items: &[CollectionItem], collection_id: &str, item_id: &str) -> Result<usize> {
    items.iter().position(|i| i.id == item_id).ok_or_else(|| {
        CatalogError::NotFound {
            entity_type: "CollectionItem".to_string(),
            id: format!("{} in collection {}", item_id, collection_id),
        }
    })
}
