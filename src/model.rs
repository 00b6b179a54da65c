//! Domain model — lists, embedded items, and the summary projection.
//!
//! DESIGN
//! ======
//! Lists are identified by a UUID assigned by the collection on insert.
//! Items carry their own id, minted when the item is added, in the 32-char
//! simple hex form so the two id spaces never look alike. Items are only
//! unique within their owning list.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// IDENTITY
// =============================================================================

/// Identity of a stored list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ListId(Uuid);

/// The provided string is not a well-formed list identity.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid list id: {0:?}")]
pub struct InvalidListId(pub String);

impl ListId {
    #[must_use]
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    #[must_use]
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }

    /// Parse the external string form of a list id.
    ///
    /// # Errors
    ///
    /// Returns `InvalidListId` unless the string is a UUID in the
    /// lowercase or uppercase hyphenated form. Braced, `urn:uuid:`, simple
    /// and whitespace-padded forms are rejected.
    pub fn parse(raw: &str) -> Result<Self, InvalidListId> {
        if raw.len() != uuid::fmt::Hyphenated::LENGTH {
            return Err(InvalidListId(raw.to_owned()));
        }
        Uuid::try_parse(raw)
            .map(Self)
            .map_err(|_| InvalidListId(raw.to_owned()))
    }
}

impl fmt::Display for ListId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for ListId {
    type Err = InvalidListId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<Uuid> for ListId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

/// Anything a caller may hand the store as a list identity.
pub trait ToListId {
    /// # Errors
    ///
    /// Returns `InvalidListId` when the value cannot be parsed.
    fn to_list_id(&self) -> Result<ListId, InvalidListId>;
}

impl ToListId for ListId {
    fn to_list_id(&self) -> Result<ListId, InvalidListId> {
        Ok(*self)
    }
}

impl ToListId for str {
    fn to_list_id(&self) -> Result<ListId, InvalidListId> {
        ListId::parse(self)
    }
}

impl ToListId for String {
    fn to_list_id(&self) -> Result<ListId, InvalidListId> {
        ListId::parse(self)
    }
}

impl<T: ToListId + ?Sized> ToListId for &T {
    fn to_list_id(&self) -> Result<ListId, InvalidListId> {
        (**self).to_list_id()
    }
}

/// Mint a fresh item id (random v4, simple hex form).
#[must_use]
pub fn new_item_id() -> String {
    Uuid::new_v4().simple().to_string()
}

// =============================================================================
// ENTITIES
// =============================================================================

/// A single checkable entry embedded in a list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoItem {
    pub id: String,
    pub label: String,
    pub checked: bool,
}

impl TodoItem {
    /// A freshly added item: new id, unchecked.
    #[must_use]
    pub fn new(label: &str) -> Self {
        Self { id: new_item_id(), label: label.to_owned(), checked: false }
    }
}

/// A named list with its items in stored order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoList {
    pub id: ListId,
    pub name: String,
    pub items: Vec<TodoItem>,
}

impl TodoList {
    #[must_use]
    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn item(&self, item_id: &str) -> Option<&TodoItem> {
        self.items.iter().find(|item| item.id == item_id)
    }
}

/// Read-only projection used when enumerating lists. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListSummary {
    pub id: ListId,
    pub name: String,
    pub item_count: u64,
}

impl From<&TodoList> for ListSummary {
    fn from(list: &TodoList) -> Self {
        Self { id: list.id, name: list.name.clone(), item_count: list.items.len() as u64 }
    }
}

#[cfg(test)]
#[path = "model_test.rs"]
mod tests;
