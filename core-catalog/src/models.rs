//! Domain models for the collection catalog
//!
//! This module contains the catalog's rich domain models with validation and
//! database mapping. Rows whose columns need parsing (closed enums, the
//! polymorphic item reference) are read into private `*Row` structs first and
//! converted with `TryFrom`.

use crate::error::{CatalogError, Result};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Polymorphic type tag for manifestation references
pub const ITEM_TYPE_MANIFESTATION: &str = "Manifestation";
/// Polymorphic type tag for nested collection references
pub const ITEM_TYPE_COLLECTION: &str = "Collection";

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

// =============================================================================
// Collection
// =============================================================================

/// Closed set of collection kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionType {
    Volume,
    Periodical,
    PeriodicalIssue,
    Series,
    VolumeSeries,
    Other,
    /// Derived per-authority bucket; only the uncollected-works maintainer
    /// may create collections of this type.
    Uncollected,
}

impl CollectionType {
    pub const ALL: [CollectionType; 7] = [
        Self::Volume,
        Self::Periodical,
        Self::PeriodicalIssue,
        Self::Series,
        Self::VolumeSeries,
        Self::Other,
        Self::Uncollected,
    ];

    /// Database string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Volume => "volume",
            Self::Periodical => "periodical",
            Self::PeriodicalIssue => "periodical_issue",
            Self::Series => "series",
            Self::VolumeSeries => "volume_series",
            Self::Other => "other",
            Self::Uncollected => "uncollected",
        }
    }

    pub fn is_uncollected(&self) -> bool {
        matches!(self, Self::Uncollected)
    }
}

impl Default for CollectionType {
    fn default() -> Self {
        Self::Other
    }
}

impl fmt::Display for CollectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CollectionType {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| CatalogError::invalid("collection_type", format!("unknown type '{}'", s)))
    }
}

/// An ordered, named container of works, sub-collections and placeholders
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collection {
    /// Unique identifier
    pub id: String,
    /// Display title
    pub title: String,
    pub subtitle: Option<String>,
    pub description: Option<String>,
    pub collection_type: CollectionType,
    /// Cached number of manifestation leaves in the whole subtree
    pub manifestations_count: i64,
    /// Timestamps
    pub created_at: i64,
    pub updated_at: i64,
}

impl Collection {
    /// Create a new, empty collection
    pub fn new(title: impl Into<String>, collection_type: CollectionType) -> Self {
        let ts = now();
        Self {
            id: Uuid::new_v4().to_string(),
            title: title.into(),
            subtitle: None,
            description: None,
            collection_type,
            manifestations_count: 0,
            created_at: ts,
            updated_at: ts,
        }
    }

    /// Validate collection data
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.title.trim().is_empty() {
            return Err("Collection title cannot be empty".to_string());
        }

        if self.manifestations_count < 0 {
            return Err("Manifestations count cannot be negative".to_string());
        }

        Ok(())
    }

    pub fn is_uncollected(&self) -> bool {
        self.collection_type.is_uncollected()
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct CollectionRow {
    id: String,
    title: String,
    subtitle: Option<String>,
    description: Option<String>,
    collection_type: String,
    manifestations_count: i64,
    created_at: i64,
    updated_at: i64,
}

impl TryFrom<CollectionRow> for Collection {
    type Error = CatalogError;

    fn try_from(row: CollectionRow) -> Result<Self> {
        Ok(Collection {
            collection_type: row.collection_type.parse()?,
            id: row.id,
            title: row.title,
            subtitle: row.subtitle,
            description: row.description,
            manifestations_count: row.manifestations_count,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

// =============================================================================
// Item reference & collection items
// =============================================================================

/// What a collection slot points at
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id")]
pub enum ItemRef {
    /// Placeholder or paratext slot; contributes nothing to counts
    Empty,
    /// A literary work
    Manifestation(String),
    /// A nested collection
    Collection(String),
}

impl ItemRef {
    /// Rebuild a reference from its polymorphic `(item_type, item_id)` columns
    pub fn from_parts(item_type: Option<&str>, item_id: Option<&str>) -> Result<Self> {
        match (item_type, item_id) {
            (None, None) => Ok(Self::Empty),
            (Some(ITEM_TYPE_MANIFESTATION), Some(id)) => Ok(Self::Manifestation(id.to_string())),
            (Some(ITEM_TYPE_COLLECTION), Some(id)) => Ok(Self::Collection(id.to_string())),
            (Some(other), Some(_)) => Err(CatalogError::invalid(
                "item_type",
                format!("unsupported item type '{}'", other),
            )),
            _ => Err(CatalogError::invalid(
                "item",
                "item_type and item_id must be set together",
            )),
        }
    }

    /// Split into the polymorphic `(item_type, item_id)` columns
    pub fn to_parts(&self) -> (Option<&'static str>, Option<&str>) {
        match self {
            Self::Empty => (None, None),
            Self::Manifestation(id) => (Some(ITEM_TYPE_MANIFESTATION), Some(id.as_str())),
            Self::Collection(id) => (Some(ITEM_TYPE_COLLECTION), Some(id.as_str())),
        }
    }

    pub fn collection_id(&self) -> Option<&str> {
        match self {
            Self::Collection(id) => Some(id),
            _ => None,
        }
    }

    pub fn manifestation_id(&self) -> Option<&str> {
        match self {
            Self::Manifestation(id) => Some(id),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// Placeholders never change a manifestation count.
    pub fn affects_count(&self) -> bool {
        !self.is_empty()
    }
}

impl Default for ItemRef {
    fn default() -> Self {
        Self::Empty
    }
}

/// One positioned slot inside a collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionItem {
    pub id: String,
    /// Owning collection
    pub collection_id: String,
    /// Manual ordering key; ties are broken by `id`
    pub seqno: i64,
    pub item: ItemRef,
    /// Placeholder label (empty references only)
    pub alt_title: Option<String>,
    /// Inline paratext (empty references only)
    pub markdown: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl CollectionItem {
    pub fn new(collection_id: impl Into<String>, item: ItemRef, seqno: i64) -> Self {
        let ts = now();
        Self {
            id: Uuid::new_v4().to_string(),
            collection_id: collection_id.into(),
            seqno,
            item,
            alt_title: None,
            markdown: None,
            created_at: ts,
            updated_at: ts,
        }
    }

    /// Validate item data
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.seqno <= 0 {
            return Err("Seqno must be positive".to_string());
        }

        if self.collection_id.trim().is_empty() {
            return Err("Collection item must belong to a collection".to_string());
        }

        Ok(())
    }

    pub fn is_collection(&self) -> bool {
        matches!(self.item, ItemRef::Collection(_))
    }

    /// Empty reference without paratext
    pub fn is_placeholder(&self) -> bool {
        self.item.is_empty() && !self.is_paratext()
    }

    /// Empty reference carrying inline content
    pub fn is_paratext(&self) -> bool {
        self.item.is_empty()
            && self
                .markdown
                .as_deref()
                .map(|m| !m.trim().is_empty())
                .unwrap_or(false)
    }

    /// Label for an empty slot; referenced items take their title from the
    /// referenced record instead.
    pub fn placeholder_title(&self) -> Option<&str> {
        if !self.item.is_empty() {
            return None;
        }
        self.alt_title.as_deref().filter(|t| !t.trim().is_empty())
    }

    /// First non-blank line of the paratext
    pub fn first_contentful_markdown(&self) -> &str {
        self.markdown
            .as_deref()
            .and_then(|md| md.lines().find(|line| !line.trim().is_empty()))
            .unwrap_or("")
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct CollectionItemRow {
    id: String,
    collection_id: String,
    seqno: i64,
    item_type: Option<String>,
    item_id: Option<String>,
    alt_title: Option<String>,
    markdown: Option<String>,
    created_at: i64,
    updated_at: i64,
}

impl TryFrom<CollectionItemRow> for CollectionItem {
    type Error = CatalogError;

    fn try_from(row: CollectionItemRow) -> Result<Self> {
        Ok(CollectionItem {
            item: ItemRef::from_parts(row.item_type.as_deref(), row.item_id.as_deref())?,
            id: row.id,
            collection_id: row.collection_id,
            seqno: row.seqno,
            alt_title: row.alt_title,
            markdown: row.markdown,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Editable attributes supplied when adding or editing a slot
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemAttrs {
    /// Explicit position; `None` appends after the current maximum
    pub seqno: Option<i64>,
    pub alt_title: Option<String>,
    pub markdown: Option<String>,
}

impl ItemAttrs {
    pub fn placeholder(alt_title: impl Into<String>) -> Self {
        Self {
            alt_title: Some(alt_title.into()),
            ..Default::default()
        }
    }

    pub fn paratext(markdown: impl Into<String>) -> Self {
        Self {
            markdown: Some(markdown.into()),
            ..Default::default()
        }
    }

    pub fn at(mut self, seqno: i64) -> Self {
        self.seqno = Some(seqno);
        self
    }
}

// =============================================================================
// Manifestations, authorities & involvement
// =============================================================================

/// Publication status of a manifestation
pub const STATUS_PUBLISHED: &str = "published";
pub const STATUS_UNPUBLISHED: &str = "unpublished";

/// A literary work instance; the leaf unit counted by collections
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Manifestation {
    pub id: String,
    pub title: String,
    /// "published" or "unpublished"
    pub status: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Manifestation {
    /// Create a new published manifestation
    pub fn new(title: impl Into<String>) -> Self {
        let ts = now();
        Self {
            id: Uuid::new_v4().to_string(),
            title: title.into(),
            status: STATUS_PUBLISHED.to_string(),
            created_at: ts,
            updated_at: ts,
        }
    }

    pub fn unpublished(title: impl Into<String>) -> Self {
        Self {
            status: STATUS_UNPUBLISHED.to_string(),
            ..Self::new(title)
        }
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.title.trim().is_empty() {
            return Err("Manifestation title cannot be empty".to_string());
        }

        if self.status != STATUS_PUBLISHED && self.status != STATUS_UNPUBLISHED {
            return Err(format!("Invalid manifestation status: {}", self.status));
        }

        Ok(())
    }

    pub fn is_published(&self) -> bool {
        self.status == STATUS_PUBLISHED
    }
}

/// A person or body that can be credited on works
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Authority {
    pub id: String,
    pub name: String,
    /// Derived collection of works not placed in any real collection
    pub uncollected_works_collection_id: Option<String>,
    /// Bumped each time the uncollected-works lock is taken
    pub lock_version: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Authority {
    pub fn new(name: impl Into<String>) -> Self {
        let ts = now();
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            uncollected_works_collection_id: None,
            lock_version: 0,
            created_at: ts,
            updated_at: ts,
        }
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("Authority name cannot be empty".to_string());
        }
        Ok(())
    }
}

/// Role an authority plays on a manifestation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Author,
    Translator,
    Editor,
    Illustrator,
    Other,
}

impl Role {
    /// Roles that place a work in an authority's uncollected works
    pub const UNCOLLECTED_ROLES: [Role; 3] = [Self::Author, Self::Translator, Self::Editor];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Author => "author",
            Self::Translator => "translator",
            Self::Editor => "editor",
            Self::Illustrator => "illustrator",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "author" => Ok(Self::Author),
            "translator" => Ok(Self::Translator),
            "editor" => Ok(Self::Editor),
            "illustrator" => Ok(Self::Illustrator),
            "other" => Ok(Self::Other),
            _ => Err(CatalogError::invalid("role", format!("unknown role '{}'", s))),
        }
    }
}

/// Credit of an authority on a manifestation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Involvement {
    pub authority_id: String,
    pub manifestation_id: String,
    pub role: Role,
    pub created_at: i64,
}

impl Involvement {
    pub fn new(
        authority_id: impl Into<String>,
        manifestation_id: impl Into<String>,
        role: Role,
    ) -> Self {
        Self {
            authority_id: authority_id.into(),
            manifestation_id: manifestation_id.into(),
            role,
            created_at: now(),
        }
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct InvolvementRow {
    authority_id: String,
    manifestation_id: String,
    role: String,
    created_at: i64,
}

impl TryFrom<InvolvementRow> for Involvement {
    type Error = CatalogError;

    fn try_from(row: InvolvementRow) -> Result<Self> {
        Ok(Involvement {
            role: row.role.parse()?,
            authority_id: row.authority_id,
            manifestation_id: row.manifestation_id,
            created_at: row.created_at,
        })
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collection_type_round_trip() {
        for t in CollectionType::ALL {
            assert_eq!(t.as_str().parse::<CollectionType>().unwrap(), t);
        }
        assert!("made_up".parse::<CollectionType>().is_err());
        assert_eq!(CollectionType::default(), CollectionType::Other);
    }

    #[test]
    fn test_collection_validation() {
        let mut collection = Collection::new("Poems", CollectionType::Volume);
        assert!(collection.validate().is_ok());
        assert_eq!(collection.manifestations_count, 0);

        collection.title = "   ".to_string();
        assert!(collection.validate().is_err());

        collection.title = "Poems".to_string();
        collection.manifestations_count = -1;
        assert!(collection.validate().is_err());
    }

    #[test]
    fn test_item_ref_parts() {
        let m = ItemRef::Manifestation("m-1".to_string());
        assert_eq!(m.to_parts(), (Some("Manifestation"), Some("m-1")));
        assert_eq!(
            ItemRef::from_parts(Some("Collection"), Some("c-1")).unwrap(),
            ItemRef::Collection("c-1".to_string())
        );
        assert_eq!(ItemRef::from_parts(None, None).unwrap(), ItemRef::Empty);
        assert!(ItemRef::from_parts(Some("Person"), Some("p-1")).is_err());
        assert!(ItemRef::from_parts(Some("Collection"), None).is_err());
        assert!(!ItemRef::Empty.affects_count());
        assert!(m.affects_count());
    }

    #[test]
    fn test_item_slot_kinds() {
        let mut item = CollectionItem::new("c-1", ItemRef::Empty, 1);
        assert!(item.is_placeholder());
        assert!(!item.is_paratext());

        item.alt_title = Some("To be announced".to_string());
        assert_eq!(item.placeholder_title(), Some("To be announced"));

        item.markdown = Some("\n\n  \nForeword\nmore".to_string());
        assert!(item.is_paratext());
        assert!(!item.is_placeholder());
        assert_eq!(item.first_contentful_markdown(), "Foreword");

        item.item = ItemRef::Collection("c-2".to_string());
        assert!(item.is_collection());
        assert_eq!(item.placeholder_title(), None);
    }

    #[test]
    fn test_item_validation() {
        let mut item = CollectionItem::new("c-1", ItemRef::Empty, 1);
        assert!(item.validate().is_ok());
        item.seqno = 0;
        assert!(item.validate().is_err());
    }

    #[test]
    fn test_manifestation_status() {
        let m = Manifestation::new("A Poem");
        assert!(m.is_published());
        assert!(m.validate().is_ok());

        let mut u = Manifestation::unpublished("Draft");
        assert!(!u.is_published());
        u.status = "lost".to_string();
        assert!(u.validate().is_err());
    }

    #[test]
    fn test_role_parse() {
        assert_eq!("translator".parse::<Role>().unwrap(), Role::Translator);
        assert!("critic".parse::<Role>().is_err());
        assert!(Role::UNCOLLECTED_ROLES.contains(&Role::Editor));
        assert!(!Role::UNCOLLECTED_ROLES.contains(&Role::Illustrator));
    }
}
