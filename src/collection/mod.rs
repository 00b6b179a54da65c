//! Document collection seam — the narrow storage contract the list store needs.
//!
//! ARCHITECTURE
//! ============
//! The store never talks to a database directly. It asks a
//! `DocumentCollection` for five things: a projected + sorted scan, insert,
//! lookup by id, delete by id, and an atomic find-and-modify that returns the
//! post-update document. Filters and updates are closed enums covering the
//! list/item shapes only; this is not a general query language.
//!
//! TRANSACTIONS
//! ============
//! Every call takes a `TxContext`. `Detached` runs the call on its own.
//! `Session` routes it through a caller-owned session so several calls
//! commit or abort together. Opening and ending sessions is the caller's
//! job (`begin` / `commit` / `abort` on each backend).

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use futures::stream::BoxStream;
use uuid::Uuid;

use crate::document::Document;

pub use memory::{MemoryCollection, MemorySession};
pub use postgres::{PgCollection, PgSession};

// =============================================================================
// ERRORS
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum CollectionError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("session belongs to a different collection")]
    ForeignSession,
    #[error("positional update requires a filter that matches an item")]
    PositionalWithoutMatch,
    #[error("field `items` is not an array")]
    ItemsNotArray,
    #[error("stored document is not a JSON object")]
    NotAnObject,
}

impl CollectionError {
    /// Transient failures where the same call may succeed later.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Database(sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) | sqlx::Error::PoolClosed)
        )
    }
}

// =============================================================================
// TRANSACTION CONTEXT
// =============================================================================

/// Transaction context threaded through every collection call.
#[derive(Debug)]
pub enum TxContext<'s, S> {
    /// No session; the call stands alone.
    Detached,
    /// Run inside the caller's session.
    Session(&'s S),
}

impl<S> Default for TxContext<'_, S> {
    fn default() -> Self {
        Self::Detached
    }
}

impl<S> Clone for TxContext<'_, S> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S> Copy for TxContext<'_, S> {}

impl<'s, S> From<&'s S> for TxContext<'s, S> {
    fn from(session: &'s S) -> Self {
        Self::Session(session)
    }
}

impl<'s, S> From<Option<&'s S>> for TxContext<'s, S> {
    fn from(session: Option<&'s S>) -> Self {
        session.map_or(Self::Detached, Self::Session)
    }
}

// =============================================================================
// QUERY SHAPES
// =============================================================================

/// Which fields a scan returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Projection {
    /// The whole document.
    Full,
    /// `_id`, `name`, and a server-computed `item_count` in place of `items`.
    Summary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sort {
    Name(Direction),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FindOptions {
    pub projection: Projection,
    pub sort: Sort,
}

impl FindOptions {
    /// Summary projection ordered by name, ascending.
    #[must_use]
    pub fn summaries_by_name() -> Self {
        Self { projection: Projection::Summary, sort: Sort::Name(Direction::Ascending) }
    }
}

/// Which document a find-and-modify targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    /// Match on `_id` only.
    Id(Uuid),
    /// Match on `_id` and require an element of `items` with this `id`.
    IdAndItem { id: Uuid, item_id: String },
}

impl Filter {
    #[must_use]
    pub fn id(&self) -> Uuid {
        match self {
            Self::Id(id) | Self::IdAndItem { id, .. } => *id,
        }
    }
}

/// The mutation a find-and-modify applies.
#[derive(Debug, Clone, PartialEq)]
pub enum Update {
    /// Append an element to `items`.
    PushItem(Document),
    /// Remove every element of `items` whose `id` equals `item_id`.
    PullItem { item_id: String },
    /// Set `checked` on the element matched by `Filter::IdAndItem`.
    SetMatchedItemChecked(bool),
}

pub type DocumentStream<'a> = BoxStream<'a, Result<Document, CollectionError>>;

// =============================================================================
// TRAIT
// =============================================================================

#[async_trait]
pub trait DocumentCollection: Send + Sync {
    /// Caller-owned session for grouping calls atomically.
    type Session: Send + Sync;

    /// Scan all documents with the given projection and order. The stream is
    /// lazy: nothing is read until it is polled, and each call re-queries.
    fn find<'a>(&'a self, options: FindOptions, tx: TxContext<'a, Self::Session>) -> DocumentStream<'a>;

    /// Insert a document and return the identity the collection assigned.
    async fn insert_one(&self, doc: Document, tx: TxContext<'_, Self::Session>) -> Result<Uuid, CollectionError>;

    async fn find_one(&self, id: Uuid, tx: TxContext<'_, Self::Session>) -> Result<Option<Document>, CollectionError>;

    /// Delete by identity; returns how many documents were removed (0 or 1).
    async fn delete_one(&self, id: Uuid, tx: TxContext<'_, Self::Session>) -> Result<u64, CollectionError>;

    /// Atomically locate one document and apply `update`, returning the
    /// post-update document, or `None` when the filter matched nothing.
    async fn find_one_and_update(
        &self,
        filter: Filter,
        update: Update,
        tx: TxContext<'_, Self::Session>,
    ) -> Result<Option<Document>, CollectionError>;

    /// Round-trip to the backing store.
    async fn ping(&self) -> Result<(), CollectionError>;
}
