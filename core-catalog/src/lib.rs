//! # Collection Catalog
//!
//! Owns the collection store and the engine that keeps it consistent.
//!
//! ## Overview
//!
//! A literary work (manifestation) can sit in any number of hierarchical
//! collections: volumes, periodical issues, series, and per-authority
//! "uncollected works" buckets. Each collection is an ordered list of slots
//! that reference a manifestation, another collection, or nothing
//! (placeholders and paratext).
//!
//! - [`guard`] - rejects slots that would make containment cyclic
//! - [`sequencer`] - reorder, move, transplant, add, retarget and remove slots
//! - [`composer`] - periodical issues and sub-collections created in place
//! - [`counts`] - recursive manifestation count cache and its repair
//! - [`subtree`] - batched descendant and ancestor loading
//! - [`uncollected`] - per-authority uncollected-works reconciliation
//! - [`repositories`] - async repository traits over SQLite
//!
//! All multi-row changes run in a single `sqlx` transaction.

pub mod composer;
pub mod counts;
pub mod db;
pub mod error;
pub mod guard;
pub mod models;
pub mod repositories;
pub mod sequencer;
pub mod subtree;
pub mod uncollected;

mod store;

pub use composer::{Composer, PeriodicalWithIssue, PlacedCollection};
pub use counts::{CountPropagator, RecalculateSummary};
pub use error::{CatalogError, Result};
pub use models::{
    Authority, Collection, CollectionItem, CollectionType, Involvement, ItemAttrs, ItemRef,
    Manifestation, Role,
};
pub use sequencer::Sequencer;
pub use subtree::{CollectionTree, Subtree, SubtreeFetcher};
pub use uncollected::{CleanupMode, CleanupReport, RefreshOutcome, UncollectedMaintainer};
