//! Per-authority "uncollected works" collections.
//!
//! Each authority may own one collection of type `uncollected` holding its
//! published works (as author, translator or editor) that no real collection
//! contains. [`UncollectedMaintainer::refresh`] reconciles that collection
//! idempotently under an exclusive per-authority lock.
//!
//! SQLite has no row locks. The refresh transaction begins `IMMEDIATE`,
//! taking the database write lock until commit, and its first statement bumps
//! `authorities.lock_version`, so refreshes run one at a time.

use crate::counts;
use crate::db::begin_write;
use crate::error::{is_busy, CatalogError, Result};
use crate::models::{
    Authority, Collection, CollectionRow, CollectionType, ItemRef, Manifestation, Role,
    ITEM_TYPE_MANIFESTATION, STATUS_PUBLISHED,
};
use crate::repositories::collection::delete_detached;
use crate::sequencer::append_refs;
use crate::store::{self, placeholders};
use serde::{Deserialize, Serialize};
use sqlx::{query, query_as, SqliteConnection, SqlitePool};
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Title given to newly created uncollected-works collections
pub const UNCOLLECTED_TITLE: &str = "Uncollected works";

/// Result of one refresh
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshOutcome {
    pub authority_id: String,
    pub collection_id: String,
    /// Whether the collection was created by this refresh
    pub created: bool,
    /// Slots pruned because their work is now collected or gone
    pub removed: usize,
    /// Works newly appended
    pub added: usize,
    pub manifestations_count: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CleanupMode {
    /// Report what would change without writing
    DryRun,
    Execute,
}

/// Counts from an orphan cleanup run.
///
/// In dry-run mode the action counters describe what an execute run would do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupReport {
    pub mode: CleanupMode,
    pub orphans_found: usize,
    pub deleted_empty: usize,
    pub linked: usize,
    pub deleted_duplicate: usize,
    pub deleted_unfixable: usize,
}

impl CleanupReport {
    fn new(mode: CleanupMode) -> Self {
        Self {
            mode,
            orphans_found: 0,
            deleted_empty: 0,
            linked: 0,
            deleted_duplicate: 0,
            deleted_unfixable: 0,
        }
    }
}

enum OrphanAction {
    DeleteEmpty,
    Link(String),
    DeleteDuplicate(String),
    DeleteUnfixable(usize),
}

#[derive(Clone)]
pub struct UncollectedMaintainer {
    pool: SqlitePool,
}

impl UncollectedMaintainer {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Reconcile the authority's uncollected-works collection.
    ///
    /// Prunes slots whose work is now in a real collection (or no longer
    /// exists), creates and links the collection when missing, and appends
    /// qualifying works that no real collection contains. A work sitting in
    /// another authority's uncollected collection still qualifies.
    ///
    /// # Errors
    /// - `NotFound` if the authority does not exist
    /// - `LockContention` if another refresh held the lock past the busy timeout
    pub async fn refresh(&self, authority_id: &str) -> Result<RefreshOutcome> {
        let mut tx = begin_write(&self.pool)
            .await
            .map_err(|e| contention(authority_id, e))?;

        lock_authority(&mut tx, authority_id).await?;
        let authority = query_as::<_, Authority>("SELECT * FROM authorities WHERE id = ?")
            .bind(authority_id)
            .fetch_one(&mut *tx)
            .await?;

        let existing = match &authority.uncollected_works_collection_id {
            Some(id) => store::fetch_collection(&mut *tx, id).await?,
            None => None,
        };

        let (collection, created) = match existing {
            Some(collection) if collection.is_uncollected() => (collection, false),
            Some(collection) => {
                return Err(CatalogError::invalid(
                    "uncollected_works_collection_id",
                    format!(
                        "linked collection {} has type {}",
                        collection.id, collection.collection_type
                    ),
                ));
            }
            None => {
                let collection = Collection::new(UNCOLLECTED_TITLE, CollectionType::Uncollected);
                store::insert_collection(&mut *tx, &collection).await?;
                link(&mut tx, authority_id, &collection.id).await?;
                (collection, true)
            }
        };

        let removed = if created {
            0
        } else {
            prune_collected(&mut tx, &collection.id).await?
        };

        let candidates = candidate_ids(&mut tx, authority_id, &collection.id).await?;
        let added = append_refs(
            &mut tx,
            &collection.id,
            candidates.into_iter().map(ItemRef::Manifestation).collect(),
        )
        .await?
        .len();

        counts::propagate_from(&mut tx, &collection.id).await?;
        let (manifestations_count,): (i64,) =
            query_as("SELECT manifestations_count FROM collections WHERE id = ?")
                .bind(&collection.id)
                .fetch_one(&mut *tx)
                .await?;

        tx.commit().await?;

        info!(
            authority_id,
            collection_id = %collection.id,
            created,
            removed,
            added,
            manifestations_count,
            "Refreshed uncollected works"
        );

        Ok(RefreshOutcome {
            authority_id: authority_id.to_string(),
            collection_id: collection.id,
            created,
            removed,
            added,
            manifestations_count,
        })
    }

    /// Find uncollected collections no authority links to and repair them.
    ///
    /// Empty orphans are deleted. An orphan whose works share exactly one
    /// qualifying authority is linked to it, or deleted as a duplicate when
    /// that authority already has a collection. Orphans with no single owner
    /// are deleted with a warning.
    pub async fn cleanup_orphaned(&self, mode: CleanupMode) -> Result<CleanupReport> {
        let mut tx = begin_write(&self.pool).await?;
        let mut report = CleanupReport::new(mode);

        let orphans = query_as::<_, CollectionRow>(
            r#"
            SELECT c.* FROM collections c
            WHERE c.collection_type = ?
              AND NOT EXISTS (
                  SELECT 1 FROM authorities a WHERE a.uncollected_works_collection_id = c.id
              )
            ORDER BY c.created_at, c.id
            "#,
        )
        .bind(CollectionType::Uncollected.as_str())
        .fetch_all(&mut *tx)
        .await?
        .into_iter()
        .map(Collection::try_from)
        .collect::<Result<Vec<_>>>()?;

        report.orphans_found = orphans.len();
        info!(?mode, orphans = orphans.len(), "Found orphaned uncollected collections");

        // Authorities linked during this run count as already owning one.
        let mut linked_now: HashSet<String> = HashSet::new();

        for orphan in &orphans {
            let action = classify_orphan(&mut tx, &orphan.id, &linked_now).await?;

            match &action {
                OrphanAction::DeleteEmpty => report.deleted_empty += 1,
                OrphanAction::Link(authority_id) => {
                    report.linked += 1;
                    linked_now.insert(authority_id.clone());
                }
                OrphanAction::DeleteDuplicate(_) => report.deleted_duplicate += 1,
                OrphanAction::DeleteUnfixable(owners) => {
                    warn!(
                        collection_id = %orphan.id,
                        candidate_owners = owners,
                        "Cannot determine owning authority of orphaned uncollected collection"
                    );
                    report.deleted_unfixable += 1;
                }
            }

            if mode == CleanupMode::DryRun {
                continue;
            }

            match action {
                OrphanAction::Link(authority_id) => {
                    link(&mut tx, &authority_id, &orphan.id).await?;
                    counts::propagate_from(&mut tx, &orphan.id).await?;
                    debug!(collection_id = %orphan.id, %authority_id, "Linked orphaned collection");
                }
                OrphanAction::DeleteDuplicate(authority_id) => {
                    delete_detached(&mut tx, &orphan.id).await?;
                    debug!(collection_id = %orphan.id, %authority_id, "Deleted duplicate collection");
                }
                OrphanAction::DeleteEmpty | OrphanAction::DeleteUnfixable(_) => {
                    delete_detached(&mut tx, &orphan.id).await?;
                }
            }
        }

        if mode == CleanupMode::Execute {
            tx.commit().await?;
        }

        info!(
            ?mode,
            orphans_found = report.orphans_found,
            deleted_empty = report.deleted_empty,
            linked = report.linked,
            deleted_duplicate = report.deleted_duplicate,
            deleted_unfixable = report.deleted_unfixable,
            "Orphaned uncollected cleanup finished"
        );
        Ok(report)
    }

    /// Manifestations present in two or more uncollected collections
    pub async fn uncollected_more_than_once(&self) -> Result<Vec<Manifestation>> {
        let manifestations = query_as::<_, Manifestation>(
            r#"
            SELECT m.* FROM manifestations m
            WHERE m.id IN (
                SELECT ci.item_id FROM collection_items ci
                JOIN collections c ON c.id = ci.collection_id
                WHERE ci.item_type = ? AND c.collection_type = ?
                GROUP BY ci.item_id
                HAVING COUNT(DISTINCT ci.collection_id) > 1
            )
            ORDER BY m.title, m.id
            "#,
        )
        .bind(ITEM_TYPE_MANIFESTATION)
        .bind(CollectionType::Uncollected.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(manifestations)
    }
}

async fn lock_authority(conn: &mut SqliteConnection, authority_id: &str) -> Result<()> {
    let result = query(
        "UPDATE authorities SET lock_version = lock_version + 1, updated_at = ? WHERE id = ?",
    )
    .bind(store::now())
    .bind(authority_id)
    .execute(&mut *conn)
    .await
    .map_err(|e| contention(authority_id, e))?;

    if result.rows_affected() == 0 {
        return Err(CatalogError::not_found("Authority", authority_id));
    }

    Ok(())
}

fn contention(authority_id: &str, err: sqlx::Error) -> CatalogError {
    if is_busy(&err) {
        CatalogError::LockContention {
            authority_id: authority_id.to_string(),
        }
    } else {
        CatalogError::Database(err)
    }
}

async fn link(conn: &mut SqliteConnection, authority_id: &str, collection_id: &str) -> Result<()> {
    query("UPDATE authorities SET uncollected_works_collection_id = ?, updated_at = ? WHERE id = ?")
        .bind(collection_id)
        .bind(store::now())
        .bind(authority_id)
        .execute(&mut *conn)
        .await?;

    Ok(())
}

/// Drop slots that are not a present manifestation, or whose manifestation
/// sits in some non-uncollected collection.
async fn prune_collected(conn: &mut SqliteConnection, collection_id: &str) -> Result<usize> {
    let result = query(
        r#"
        DELETE FROM collection_items
        WHERE collection_id = ?
          AND (
              item_type IS NULL
              OR item_type != ?
              OR item_id NOT IN (SELECT id FROM manifestations)
              OR item_id IN (
                  SELECT ci.item_id FROM collection_items ci
                  JOIN collections c ON c.id = ci.collection_id
                  WHERE ci.item_type = ? AND c.collection_type != ?
              )
          )
        "#,
    )
    .bind(collection_id)
    .bind(ITEM_TYPE_MANIFESTATION)
    .bind(ITEM_TYPE_MANIFESTATION)
    .bind(CollectionType::Uncollected.as_str())
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() as usize)
}

/// Published works the authority qualifies for that no real collection and
/// not this collection already holds
async fn candidate_ids(
    conn: &mut SqliteConnection,
    authority_id: &str,
    collection_id: &str,
) -> Result<Vec<String>> {
    let sql = format!(
        r#"
        SELECT DISTINCT m.id, m.title FROM manifestations m
        JOIN involvements i ON i.manifestation_id = m.id
        WHERE i.authority_id = ?
          AND i.role IN ({})
          AND m.status = ?
          AND NOT EXISTS (
              SELECT 1 FROM collection_items ci
              JOIN collections c ON c.id = ci.collection_id
              WHERE ci.item_type = ? AND ci.item_id = m.id
                AND (c.collection_type != ? OR c.id = ?)
          )
        ORDER BY m.title, m.id
        "#,
        placeholders(Role::UNCOLLECTED_ROLES.len())
    );

    let mut q = query_as::<_, (String, String)>(&sql).bind(authority_id);
    for role in Role::UNCOLLECTED_ROLES {
        q = q.bind(role.as_str());
    }
    let rows = q
        .bind(STATUS_PUBLISHED)
        .bind(ITEM_TYPE_MANIFESTATION)
        .bind(CollectionType::Uncollected.as_str())
        .bind(collection_id)
        .fetch_all(&mut *conn)
        .await?;

    Ok(rows.into_iter().map(|(id, _)| id).collect())
}

async fn classify_orphan(
    conn: &mut SqliteConnection,
    collection_id: &str,
    linked_now: &HashSet<String>,
) -> Result<OrphanAction> {
    let (works,): (i64,) = query_as(
        r#"
        SELECT COUNT(DISTINCT ci.item_id) FROM collection_items ci
        JOIN manifestations m ON m.id = ci.item_id
        WHERE ci.collection_id = ? AND ci.item_type = ?
        "#,
    )
    .bind(collection_id)
    .bind(ITEM_TYPE_MANIFESTATION)
    .fetch_one(&mut *conn)
    .await?;

    if works == 0 {
        return Ok(OrphanAction::DeleteEmpty);
    }

    // Authorities credited (in a qualifying role) on every work in the orphan.
    let sql = format!(
        r#"
        SELECT a.id, a.uncollected_works_collection_id FROM authorities a
        JOIN involvements i ON i.authority_id = a.id
        WHERE i.role IN ({})
          AND i.manifestation_id IN (
              SELECT item_id FROM collection_items WHERE collection_id = ? AND item_type = ?
          )
        GROUP BY a.id, a.uncollected_works_collection_id
        HAVING COUNT(DISTINCT i.manifestation_id) = ?
        "#,
        placeholders(Role::UNCOLLECTED_ROLES.len())
    );

    let mut q = query_as::<_, (String, Option<String>)>(&sql);
    for role in Role::UNCOLLECTED_ROLES {
        q = q.bind(role.as_str());
    }
    let owners = q
        .bind(collection_id)
        .bind(ITEM_TYPE_MANIFESTATION)
        .bind(works)
        .fetch_all(&mut *conn)
        .await?;

    match owners.as_slice() {
        [(authority_id, existing)] => {
            if existing.is_some() || linked_now.contains(authority_id) {
                Ok(OrphanAction::DeleteDuplicate(authority_id.clone()))
            } else {
                Ok(OrphanAction::Link(authority_id.clone()))
            }
        }
        _ => Ok(OrphanAction::DeleteUnfixable(owners.len())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;
    use crate::models::Involvement;
    use crate::repositories::{
        AuthorityRepository, CollectionRepository, ManifestationRepository,
        SqliteAuthorityRepository, SqliteCollectionRepository, SqliteManifestationRepository,
    };
    use crate::sequencer::Sequencer;

    struct Fixture {
        pool: SqlitePool,
        maintainer: UncollectedMaintainer,
        authorities: SqliteAuthorityRepository,
        manifestations: SqliteManifestationRepository,
        collections: SqliteCollectionRepository,
        sequencer: Sequencer,
    }

    impl Fixture {
        async fn new() -> Self {
            let pool = create_test_pool().await.unwrap();
            Self {
                maintainer: UncollectedMaintainer::new(pool.clone()),
                authorities: SqliteAuthorityRepository::new(pool.clone()),
                manifestations: SqliteManifestationRepository::new(pool.clone()),
                collections: SqliteCollectionRepository::new(pool.clone()),
                sequencer: Sequencer::new(pool.clone()),
                pool,
            }
        }

        async fn authority(&self, name: &str) -> String {
            let a = Authority::new(name);
            self.authorities.insert(&a).await.unwrap();
            a.id
        }

        async fn work(&self, authority_id: &str, title: &str, role: Role) -> String {
            let m = Manifestation::new(title);
            self.manifestations.insert(&m).await.unwrap();
            self.authorities
                .add_involvement(&Involvement::new(authority_id, &m.id, role))
                .await
                .unwrap();
            m.id
        }

        async fn linked(&self, authority_id: &str) -> Option<String> {
            self.authorities
                .find_by_id(authority_id)
                .await
                .unwrap()
                .unwrap()
                .uncollected_works_collection_id
        }

        async fn item_ids(&self, collection_id: &str) -> Vec<String> {
            store::ordered_items(&self.pool, collection_id)
                .await
                .unwrap()
                .into_iter()
                .filter_map(|i| i.item.manifestation_id().map(str::to_string))
                .collect()
        }

        async fn orphan(&self) -> String {
            let c = Collection::new(UNCOLLECTED_TITLE, CollectionType::Uncollected);
            store::insert_collection(&self.pool, &c).await.unwrap();
            c.id
        }

        async fn uncollected_total(&self) -> i64 {
            let (n,): (i64,) = query_as("SELECT COUNT(*) FROM collections WHERE collection_type = 'uncollected'")
                .fetch_one(&self.pool)
                .await
                .unwrap();
            n
        }
    }

    #[tokio::test]
    async fn test_refresh_creates_and_fills() {
        let f = Fixture::new().await;
        let a = f.authority("Author").await;
        let poem = f.work(&a, "A poem", Role::Author).await;
        let translation = f.work(&a, "B translation", Role::Translator).await;
        f.work(&a, "C illustration", Role::Illustrator).await;

        let draft = Manifestation::unpublished("D draft");
        f.manifestations.insert(&draft).await.unwrap();
        f.authorities
            .add_involvement(&Involvement::new(&a, &draft.id, Role::Author))
            .await
            .unwrap();

        let outcome = f.maintainer.refresh(&a).await.unwrap();
        assert!(outcome.created);
        assert_eq!(outcome.added, 2);
        assert_eq!(outcome.manifestations_count, 2);
        assert_eq!(f.linked(&a).await.as_deref(), Some(outcome.collection_id.as_str()));
        assert_eq!(f.item_ids(&outcome.collection_id).await, vec![poem, translation]);

        let collection = store::require_collection(&f.pool, &outcome.collection_id).await.unwrap();
        assert_eq!(collection.collection_type, CollectionType::Uncollected);
        assert_eq!(collection.title, UNCOLLECTED_TITLE);
    }

    #[tokio::test]
    async fn test_refresh_is_idempotent() {
        let f = Fixture::new().await;
        let a = f.authority("Author").await;
        f.work(&a, "Poem", Role::Author).await;

        let first = f.maintainer.refresh(&a).await.unwrap();
        let second = f.maintainer.refresh(&a).await.unwrap();

        assert_eq!(first.collection_id, second.collection_id);
        assert!(!second.created);
        assert_eq!((second.added, second.removed), (0, 0));
        assert_eq!(f.item_ids(&first.collection_id).await.len(), 1);
        assert_eq!(f.uncollected_total().await, 1);

        let authority = f.authorities.find_by_id(&a).await.unwrap().unwrap();
        assert_eq!(authority.lock_version, 2);
    }

    #[tokio::test]
    async fn test_refresh_prunes_collected_works() {
        let f = Fixture::new().await;
        let a = f.authority("Author").await;
        let keep = f.work(&a, "Keep", Role::Author).await;
        let collected = f.work(&a, "Collected", Role::Author).await;
        let gone = f.work(&a, "Gone", Role::Editor).await;

        let first = f.maintainer.refresh(&a).await.unwrap();
        assert_eq!(first.added, 3);

        let volume = Collection::new("Volume", CollectionType::Volume);
        f.collections.insert(&volume).await.unwrap();
        f.sequencer
            .append_item(&volume.id, ItemRef::Manifestation(collected.clone()))
            .await
            .unwrap();
        f.manifestations.delete(&gone).await.unwrap();

        let second = f.maintainer.refresh(&a).await.unwrap();
        assert_eq!(second.removed, 2);
        assert_eq!(second.added, 0);
        assert_eq!(second.manifestations_count, 1);
        assert_eq!(f.item_ids(&second.collection_id).await, vec![keep]);
    }

    #[tokio::test]
    async fn test_other_authoritys_uncollected_does_not_disqualify() {
        let f = Fixture::new().await;
        let author = f.authority("Author").await;
        let translator = f.authority("Translator").await;
        let shared = f.work(&author, "Shared", Role::Author).await;
        f.authorities
            .add_involvement(&Involvement::new(&translator, &shared, Role::Translator))
            .await
            .unwrap();

        let a = f.maintainer.refresh(&author).await.unwrap();
        let t = f.maintainer.refresh(&translator).await.unwrap();
        assert_ne!(a.collection_id, t.collection_id);
        assert_eq!(t.added, 1);

        let dupes = f.maintainer.uncollected_more_than_once().await.unwrap();
        assert_eq!(dupes.len(), 1);
        assert_eq!(dupes[0].id, shared);
    }

    #[tokio::test]
    async fn test_refresh_missing_authority() {
        let f = Fixture::new().await;
        assert!(matches!(
            f.maintainer.refresh("nobody").await,
            Err(CatalogError::NotFound { .. })
        ));
        assert_eq!(f.uncollected_total().await, 0);
    }

    #[tokio::test]
    async fn test_concurrent_refreshes_link_one_collection() {
        let f = Fixture::new().await;
        let a = f.authority("Author").await;
        f.work(&a, "Poem", Role::Author).await;

        let (first, second) = tokio::join!(f.maintainer.refresh(&a), f.maintainer.refresh(&a));
        let (first, second) = (first.unwrap(), second.unwrap());

        assert_eq!(first.collection_id, second.collection_id);
        assert_ne!(first.created, second.created);
        assert_eq!(f.uncollected_total().await, 1);
        assert_eq!(f.item_ids(&first.collection_id).await.len(), 1);
    }

    #[tokio::test]
    async fn test_cleanup_dry_run_changes_nothing() {
        let f = Fixture::new().await;
        let orphan = f.orphan().await;

        let report = f.maintainer.cleanup_orphaned(CleanupMode::DryRun).await.unwrap();
        assert_eq!(report.orphans_found, 1);
        assert_eq!(report.deleted_empty, 1);
        assert!(store::fetch_collection(&f.pool, &orphan).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_cleanup_deletes_empty_and_links_single_owner() {
        let f = Fixture::new().await;
        let empty = f.orphan().await;

        let a = f.authority("Author").await;
        let m = f.work(&a, "Poem", Role::Author).await;
        let orphan = f.orphan().await;
        store::insert_item(&f.pool, &crate::models::CollectionItem::new(&orphan, ItemRef::Manifestation(m), 1))
            .await
            .unwrap();

        let report = f.maintainer.cleanup_orphaned(CleanupMode::Execute).await.unwrap();
        assert_eq!(report.orphans_found, 2);
        assert_eq!(report.deleted_empty, 1);
        assert_eq!(report.linked, 1);

        assert!(store::fetch_collection(&f.pool, &empty).await.unwrap().is_none());
        assert_eq!(f.linked(&a).await.as_deref(), Some(orphan.as_str()));
        let linked = store::require_collection(&f.pool, &orphan).await.unwrap();
        assert_eq!(linked.manifestations_count, 1);

        let again = f.maintainer.cleanup_orphaned(CleanupMode::Execute).await.unwrap();
        assert_eq!(again.orphans_found, 0);
    }

    #[tokio::test]
    async fn test_cleanup_deletes_duplicates_and_ambiguous() {
        let f = Fixture::new().await;
        let owner = f.authority("Owner").await;
        f.work(&owner, "Listed", Role::Author).await;
        let existing = f.maintainer.refresh(&owner).await.unwrap().collection_id;

        let duplicate = f.orphan().await;
        let m = f.work(&owner, "Also by owner", Role::Author).await;
        store::insert_item(&f.pool, &crate::models::CollectionItem::new(&duplicate, ItemRef::Manifestation(m), 1))
            .await
            .unwrap();

        let first = f.authority("First").await;
        let second = f.authority("Second").await;
        let ambiguous = f.orphan().await;
        let m1 = f.work(&first, "One", Role::Author).await;
        let m2 = f.work(&second, "Two", Role::Author).await;
        for (seqno, m) in [(1, m1), (2, m2)] {
            store::insert_item(&f.pool, &crate::models::CollectionItem::new(&ambiguous, ItemRef::Manifestation(m), seqno))
                .await
                .unwrap();
        }

        let report = f.maintainer.cleanup_orphaned(CleanupMode::Execute).await.unwrap();
        assert_eq!(report.orphans_found, 2);
        assert_eq!(report.deleted_duplicate, 1);
        assert_eq!(report.deleted_unfixable, 1);

        assert!(store::fetch_collection(&f.pool, &duplicate).await.unwrap().is_none());
        assert!(store::fetch_collection(&f.pool, &ambiguous).await.unwrap().is_none());
        assert_eq!(f.linked(&owner).await, Some(existing));
    }
}
