//! Catalog service façade.
//!
//! [`CatalogService`] owns the connection pool, the event bus and the
//! background [`UncollectedWorker`], and exposes every collection operation
//! host applications use. Each mutation publishes a [`CoreEvent`] after it
//! commits.

use crate::error::{CoreError, Result};
use crate::worker::{UncollectedWorker, WorkerHandle};
use core_catalog::db::{create_pool, DatabaseConfig};
use core_catalog::repositories::{
    AuthorityRepository, CollectionItemRepository, CollectionRepository, ManifestationRepository,
    Page, PageRequest, SqliteAuthorityRepository, SqliteCollectionItemRepository,
    SqliteCollectionRepository, SqliteManifestationRepository,
};
use core_catalog::{
    Authority, CleanupMode, CleanupReport, Collection, CollectionItem, CollectionTree,
    CollectionType, Composer, CountPropagator, Involvement, ItemAttrs, ItemRef, Manifestation,
    PeriodicalWithIssue, PlacedCollection, RecalculateSummary, RefreshOutcome, Role, Sequencer, Subtree, SubtreeFetcher,
    UncollectedMaintainer,
};
use core_runtime::config::{CoreConfig, DatabaseLocation};
use core_runtime::events::{AuthorityEvent, CollectionEvent, CoreEvent, EventBus, EventStream};
use core_runtime::logging::strip_path;
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, instrument};

/// Pool settings derived from the core configuration
pub fn database_config(config: &CoreConfig) -> DatabaseConfig {
    let base = match &config.database {
        DatabaseLocation::File(path) => DatabaseConfig::new(path.clone()),
        DatabaseLocation::InMemory => DatabaseConfig::in_memory(),
    };

    base.min_connections(config.min_connections)
        .max_connections(config.max_connections)
        .acquire_timeout(config.acquire_timeout)
        .busy_timeout(config.busy_timeout)
}

/// Primary façade exposed to host applications.
#[derive(Clone)]
pub struct CatalogService {
    config: CoreConfig,
    pool: SqlitePool,
    event_bus: EventBus,
    collections: Arc<SqliteCollectionRepository>,
    items: Arc<SqliteCollectionItemRepository>,
    manifestations: Arc<SqliteManifestationRepository>,
    authorities: Arc<SqliteAuthorityRepository>,
    sequencer: Sequencer,
    composer: Composer,
    counts: CountPropagator,
    subtrees: SubtreeFetcher,
    maintainer: UncollectedMaintainer,
    worker: UncollectedWorker,
    worker_handle: Arc<Mutex<Option<WorkerHandle>>>,
}

impl CatalogService {
    /// Open the database, run migrations and, when enabled, start the
    /// uncollected worker.
    ///
    /// # Errors
    ///
    /// `InitializationFailed` if the pool cannot be created.
    pub async fn new(config: CoreConfig) -> Result<Self> {
        config.validate()?;

        let database = match &config.database {
            DatabaseLocation::File(path) => strip_path(&path.to_string_lossy()).to_string(),
            DatabaseLocation::InMemory => ":memory:".to_string(),
        };
        info!(%database, maintainer = config.maintainer.enabled, "Starting catalog service");

        let pool = create_pool(database_config(&config))
            .await
            .map_err(|e| CoreError::InitializationFailed(e.to_string()))?;

        let service = Self::with_pool(config, pool);
        if service.config.maintainer.enabled {
            service.start_worker().await;
        }

        Ok(service)
    }

    /// Build the service over an existing pool without starting the worker.
    pub fn with_pool(config: CoreConfig, pool: SqlitePool) -> Self {
        let event_bus = EventBus::new(config.event_buffer_size);
        let maintainer = UncollectedMaintainer::new(pool.clone());
        let worker = UncollectedWorker::new(
            Arc::new(maintainer.clone()),
            event_bus.clone(),
            config.maintainer,
        );

        Self {
            collections: Arc::new(SqliteCollectionRepository::new(pool.clone())),
            items: Arc::new(SqliteCollectionItemRepository::new(pool.clone())),
            manifestations: Arc::new(SqliteManifestationRepository::new(pool.clone())),
            authorities: Arc::new(SqliteAuthorityRepository::new(pool.clone())),
            sequencer: Sequencer::new(pool.clone()),
            composer: Composer::new(pool.clone()),
            counts: CountPropagator::new(pool.clone()),
            subtrees: SubtreeFetcher::new(pool.clone()),
            maintainer,
            worker,
            worker_handle: Arc::new(Mutex::new(None)),
            event_bus,
            pool,
            config,
        }
    }

    /// Start the background worker if it is not already running.
    pub async fn start_worker(&self) {
        let mut handle = self.worker_handle.lock().await;
        if handle.as_ref().map_or(true, |h| h.is_finished()) {
            *handle = Some(self.worker.clone().spawn());
        }
    }

    /// Stop the background worker and close the pool.
    pub async fn shutdown(&self) {
        if let Some(handle) = self.worker_handle.lock().await.take() {
            handle.shutdown().await;
        }
        self.pool.close().await;
        info!("Catalog service stopped");
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    /// Stream of every event published from now on
    pub fn subscribe(&self) -> EventStream {
        self.event_bus.stream()
    }

    pub fn manifestations(&self) -> &dyn ManifestationRepository {
        self.manifestations.as_ref()
    }

    pub fn authorities(&self) -> &dyn AuthorityRepository {
        self.authorities.as_ref()
    }

    fn emit(&self, event: CoreEvent) {
        self.event_bus.emit(event).ok();
    }

    fn created(&self, collection: &Collection) {
        self.emit(CoreEvent::Collection(CollectionEvent::Created {
            collection_id: collection.id.clone(),
            title: collection.title.clone(),
        }));
    }

    fn items_changed(&self, collection_id: &str) {
        self.emit(CoreEvent::Collection(CollectionEvent::ItemsChanged {
            collection_id: collection_id.to_string(),
        }));
    }

    // ------------------------------------------------------------------
    // Collections
    // ------------------------------------------------------------------

    #[instrument(skip(self, collection), fields(title = %collection.title))]
    pub async fn create_collection(&self, collection: Collection) -> Result<Collection> {
        self.collections.insert(&collection).await?;
        self.created(&collection);
        Ok(collection)
    }

    #[instrument(skip(self, collection), fields(collection_id = %collection.id))]
    pub async fn update_collection(&self, collection: &Collection) -> Result<()> {
        self.collections.update(collection).await?;
        self.emit(CoreEvent::Collection(CollectionEvent::Updated {
            collection_id: collection.id.clone(),
        }));
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn delete_collection(&self, collection_id: &str) -> Result<bool> {
        let deleted = self.collections.delete(collection_id).await?;
        if deleted {
            self.emit(CoreEvent::Collection(CollectionEvent::Deleted {
                collection_id: collection_id.to_string(),
            }));
        }
        Ok(deleted)
    }

    pub async fn get_collection(&self, collection_id: &str) -> Result<Option<Collection>> {
        Ok(self.collections.find_by_id(collection_id).await?)
    }

    pub async fn list_collections_by_type(
        &self,
        collection_type: CollectionType,
        page_request: PageRequest,
    ) -> Result<Page<Collection>> {
        Ok(self
            .collections
            .query_by_type(collection_type, page_request)
            .await?)
    }

    /// Slots of a collection in `(seqno, id)` order
    pub async fn collection_items(&self, collection_id: &str) -> Result<Vec<CollectionItem>> {
        Ok(self.items.find_by_collection(collection_id).await?)
    }

    /// Collections holding a slot that references `collection_id`
    pub async fn parent_collections(&self, collection_id: &str) -> Result<Vec<Collection>> {
        Ok(self.collections.parent_collections(collection_id).await?)
    }

    /// Display title of a slot: its alt title, or the referenced record's title
    pub async fn item_title(&self, item: &CollectionItem) -> Result<Option<String>> {
        Ok(self.items.resolve_title(item).await?)
    }

    // ------------------------------------------------------------------
    // Items
    // ------------------------------------------------------------------

    #[instrument(skip(self, attrs))]
    pub async fn add_item(
        &self,
        collection_id: &str,
        item: ItemRef,
        attrs: ItemAttrs,
    ) -> Result<CollectionItem> {
        let created = self.sequencer.add_item(collection_id, item, attrs).await?;
        self.items_changed(collection_id);
        Ok(created)
    }

    #[instrument(skip(self))]
    pub async fn append_item(&self, collection_id: &str, item: ItemRef) -> Result<CollectionItem> {
        let created = self.sequencer.append_item(collection_id, item).await?;
        self.items_changed(collection_id);
        Ok(created)
    }

    #[instrument(skip(self, attrs))]
    pub async fn update_item(&self, item_id: &str, attrs: ItemAttrs) -> Result<CollectionItem> {
        let updated = self.sequencer.update_item(item_id, attrs).await?;
        self.items_changed(&updated.collection_id);
        Ok(updated)
    }

    #[instrument(skip(self))]
    pub async fn retarget_item(&self, item_id: &str, item: ItemRef) -> Result<CollectionItem> {
        let updated = self.sequencer.retarget_item(item_id, item).await?;
        self.items_changed(&updated.collection_id);
        Ok(updated)
    }

    #[instrument(skip(self))]
    pub async fn remove_item(&self, item_id: &str) -> Result<bool> {
        let Some(existing) = self.items.find_by_id(item_id).await? else {
            return Ok(false);
        };

        let removed = self.sequencer.remove_item(item_id).await?;
        if removed {
            self.items_changed(&existing.collection_id);
        }
        Ok(removed)
    }

    #[instrument(skip(self))]
    pub async fn reorder(
        &self,
        collection_id: &str,
        item_id: &str,
        old_index: usize,
        new_index: usize,
    ) -> Result<Vec<CollectionItem>> {
        let items = self
            .sequencer
            .reorder(collection_id, item_id, old_index, new_index)
            .await?;
        if old_index != new_index {
            self.items_changed(collection_id);
        }
        Ok(items)
    }

    #[instrument(skip(self))]
    pub async fn move_item_up(&self, collection_id: &str, item_id: &str) -> Result<Vec<CollectionItem>> {
        let items = self.sequencer.move_item_up(collection_id, item_id).await?;
        self.items_changed(collection_id);
        Ok(items)
    }

    #[instrument(skip(self))]
    pub async fn move_item_down(&self, collection_id: &str, item_id: &str) -> Result<Vec<CollectionItem>> {
        let items = self.sequencer.move_item_down(collection_id, item_id).await?;
        self.items_changed(collection_id);
        Ok(items)
    }

    #[instrument(skip(self))]
    pub async fn transplant(
        &self,
        item_id: &str,
        dest_collection_id: &str,
        new_position: i64,
    ) -> Result<CollectionItem> {
        let source = self
            .items
            .find_by_id(item_id)
            .await?
            .map(|item| item.collection_id);

        let moved = self
            .sequencer
            .transplant(item_id, dest_collection_id, new_position)
            .await?;

        self.emit(CoreEvent::Collection(CollectionEvent::ItemTransplanted {
            item_id: moved.id.clone(),
            from_collection_id: source.unwrap_or_else(|| moved.collection_id.clone()),
            to_collection_id: moved.collection_id.clone(),
        }));
        Ok(moved)
    }

    // ------------------------------------------------------------------
    // Periodicals and in-place sub-collections
    // ------------------------------------------------------------------

    #[instrument(skip(self))]
    pub async fn add_periodical_issue(&self, periodical_id: &str, title: &str) -> Result<PlacedCollection> {
        let placed = self.composer.add_periodical_issue(periodical_id, title).await?;
        self.created(&placed.collection);
        self.items_changed(periodical_id);
        Ok(placed)
    }

    #[instrument(skip(self))]
    pub async fn create_periodical_with_issue(
        &self,
        periodical_title: &str,
        issue_title: &str,
    ) -> Result<PeriodicalWithIssue> {
        let created = self
            .composer
            .create_periodical_with_issue(periodical_title, issue_title)
            .await?;
        self.created(&created.periodical);
        self.created(&created.issue);
        self.items_changed(&created.periodical.id);
        Ok(created)
    }

    /// Issues of a periodical in slot order
    pub async fn periodical_issues(&self, collection_id: &str) -> Result<Vec<Collection>> {
        Ok(self.composer.periodical_issues(collection_id).await?)
    }

    #[instrument(skip(self))]
    pub async fn create_sub_collection(
        &self,
        parent_id: &str,
        title: &str,
        collection_type: CollectionType,
    ) -> Result<PlacedCollection> {
        let placed = self
            .composer
            .create_sub_collection(parent_id, title, collection_type)
            .await?;
        self.created(&placed.collection);
        self.items_changed(parent_id);
        Ok(placed)
    }

    // ------------------------------------------------------------------
    // Counts and subtrees
    // ------------------------------------------------------------------

    #[instrument(skip(self))]
    pub async fn recalculate(&self, collection_id: &str) -> Result<i64> {
        let count = self.counts.recalculate(collection_id).await?;
        self.emit(CoreEvent::Collection(CollectionEvent::CountRecalculated {
            collection_id: collection_id.to_string(),
            manifestations_count: count,
        }));
        Ok(count)
    }

    #[instrument(skip(self))]
    pub async fn recalculate_all(&self) -> Result<RecalculateSummary> {
        Ok(self.counts.recalculate_all().await?)
    }

    pub async fn fetch_descendants(&self, root_id: &str) -> Result<Subtree> {
        Ok(self.subtrees.fetch_descendants(root_id).await?)
    }

    pub async fn fetch_ancestors(&self, root_id: &str) -> Result<Vec<Collection>> {
        Ok(self.subtrees.fetch_ancestors(root_id).await?)
    }

    pub async fn fetch_tree(&self, root_id: &str) -> Result<CollectionTree> {
        Ok(self.subtrees.fetch(root_id).await?)
    }

    // ------------------------------------------------------------------
    // Works, authorities and uncollected maintenance
    // ------------------------------------------------------------------

    pub async fn create_manifestation(&self, manifestation: Manifestation) -> Result<Manifestation> {
        self.manifestations.insert(&manifestation).await?;
        Ok(manifestation)
    }

    /// Update a manifestation; credited authorities are notified so a
    /// publication change reaches their uncollected works.
    #[instrument(skip(self, manifestation), fields(manifestation_id = %manifestation.id))]
    pub async fn update_manifestation(&self, manifestation: &Manifestation) -> Result<()> {
        self.manifestations.update(manifestation).await?;
        for authority_id in self.authorities.credited_authorities(&manifestation.id).await? {
            self.notify_involvement_changed(&authority_id);
        }
        Ok(())
    }

    pub async fn create_authority(&self, authority: Authority) -> Result<Authority> {
        self.authorities.insert(&authority).await?;
        Ok(authority)
    }

    /// Credit an authority on a work and schedule its uncollected refresh
    #[instrument(skip(self, involvement), fields(authority_id = %involvement.authority_id))]
    pub async fn add_involvement(&self, involvement: &Involvement) -> Result<()> {
        self.authorities.add_involvement(involvement).await?;
        self.notify_involvement_changed(&involvement.authority_id);
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn remove_involvement(
        &self,
        authority_id: &str,
        manifestation_id: &str,
        role: Role,
    ) -> Result<bool> {
        let removed = self
            .authorities
            .remove_involvement(authority_id, manifestation_id, role)
            .await?;
        if removed {
            self.notify_involvement_changed(authority_id);
        }
        Ok(removed)
    }

    /// Publish the trigger the uncollected worker reacts to.
    pub fn notify_involvement_changed(&self, authority_id: &str) {
        self.emit(CoreEvent::Authority(AuthorityEvent::InvolvementChanged {
            authority_id: authority_id.to_string(),
        }));
    }

    /// Refresh one authority's uncollected works now, without retries.
    #[instrument(skip(self))]
    pub async fn refresh_uncollected(&self, authority_id: &str) -> Result<RefreshOutcome> {
        let outcome = self.maintainer.refresh(authority_id).await?;
        self.emit(CoreEvent::Authority(AuthorityEvent::UncollectedRefreshed {
            authority_id: outcome.authority_id.clone(),
            collection_id: outcome.collection_id.clone(),
            added: outcome.added as u64,
            removed: outcome.removed as u64,
        }));
        Ok(outcome)
    }

    /// Refresh several authorities with the worker's retry policy.
    pub async fn refresh_uncollected_many(&self, authority_ids: &[String]) -> Vec<RefreshOutcome> {
        self.worker.refresh_many(authority_ids).await
    }

    #[instrument(skip(self))]
    pub async fn cleanup_orphaned_uncollected(&self, mode: CleanupMode) -> Result<CleanupReport> {
        Ok(self.maintainer.cleanup_orphaned(mode).await?)
    }

    pub async fn uncollected_more_than_once(&self) -> Result<Vec<Manifestation>> {
        Ok(self.maintainer.uncollected_more_than_once().await?)
    }
}
