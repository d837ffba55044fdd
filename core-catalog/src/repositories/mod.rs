//! # Repository Layer
//!
//! Async repository traits with SQLite implementations over `sqlx`.
//!
//! - `CollectionRepository` - collections, with the uncollected type guarded
//! - `CollectionItemRepository` - ordered slot reads and reverse lookup
//! - `ManifestationRepository` - the minimal work record collections count
//! - `AuthorityRepository` - authorities and their involvements
//!
//! Mutations of collection slots live in [`crate::sequencer`].

pub mod authority;
pub mod collection;
pub mod collection_item;
pub mod manifestation;
pub mod pagination;

pub use authority::{AuthorityRepository, SqliteAuthorityRepository};
pub use collection::{CollectionRepository, SqliteCollectionRepository};
pub use collection_item::{CollectionItemRepository, SqliteCollectionItemRepository};
pub use manifestation::{ManifestationRepository, SqliteManifestationRepository};
pub use pagination::{Page, PageRequest};
