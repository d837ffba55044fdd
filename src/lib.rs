//! Folio library catalog.
//!
//! Umbrella crate over the workspace: hosts depend on `folio` and reach the
//! service façade, the catalog model and the runtime utilities from one place.
//!
//! ```ignore
//! use folio::runtime::config::CoreConfig;
//! use folio::CatalogService;
//!
//! let config = CoreConfig::builder().database_path("catalog.db").build()?;
//! let service = CatalogService::new(config).await?;
//! ```

pub use core_catalog as catalog;
pub use core_runtime as runtime;
pub use core_service as service;

pub use core_catalog::{
    CatalogError, CleanupMode, CleanupReport, Collection, CollectionItem, CollectionType,
    ItemAttrs, ItemRef, PeriodicalWithIssue, PlacedCollection, RefreshOutcome,
};
pub use core_service::{CatalogService, CoreError, Result};
