//! List store — every read and write of lists and their embedded items.
//!
//! DESIGN
//! ======
//! `ListStore` is the only component that touches the document collection.
//! It is built once at startup and handed to whoever serves requests; it is
//! cheap to clone and safe to share across tasks. Item mutations are each a
//! single atomic find-and-modify, so concurrent edits to one list serialize
//! in the collection rather than racing a read-modify-write here.
//!
//! ERROR HANDLING
//! ==============
//! Direct lookups fail with `NotFound`; malformed ids fail with `InvalidId`
//! before any I/O. A conditional mutation that matches nothing is an
//! expected outcome and comes back as `Ok(None)`, not an error.
//!
//! Nothing here retries. Every operation is safe for the caller to retry
//! except `create_list` and `add_item`, which insert again on each call.

use futures::{Stream, StreamExt};
use tracing::{debug, info};

use crate::collection::{CollectionError, DocumentCollection, Filter, FindOptions, TxContext, Update};
use crate::document::{self, DecodeError};
use crate::error::ErrorCode;
use crate::model::{InvalidListId, ListId, ListSummary, ToListId, TodoItem, TodoList};

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("list not found: {0}")]
    NotFound(ListId),
    #[error(transparent)]
    InvalidId(#[from] InvalidListId),
    #[error("malformed document: {0}")]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Collection(#[from] CollectionError),
}

impl ErrorCode for StoreError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "E_LIST_NOT_FOUND",
            Self::InvalidId(_) => "E_INVALID_ID",
            Self::Decode(_) => "E_DECODE",
            Self::Collection(CollectionError::ForeignSession) => "E_SESSION",
            Self::Collection(_) => "E_DATABASE",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Collection(e) if e.is_transient())
    }
}

/// Persistence for lists and items over any `DocumentCollection`.
#[derive(Debug, Clone)]
pub struct ListStore<C> {
    collection: C,
}

// =============================================================================
// LISTS
// =============================================================================

impl<C: DocumentCollection> ListStore<C> {
    #[must_use]
    pub fn new(collection: C) -> Self {
        Self { collection }
    }

    #[must_use]
    pub fn collection(&self) -> &C {
        &self.collection
    }

    /// Check that the backing collection answers.
    ///
    /// # Errors
    ///
    /// Returns a collection error if the round-trip fails.
    pub async fn ping(&self) -> Result<(), StoreError> {
        self.collection.ping().await?;
        Ok(())
    }

    /// Stream a summary of every list, ordered by name ascending.
    ///
    /// Only `name` and a server-side item count are read, never the items
    /// themselves. The stream is lazy; calling this again re-queries.
    pub fn list_summaries<'a>(
        &'a self,
        tx: TxContext<'a, C::Session>,
    ) -> impl Stream<Item = Result<ListSummary, StoreError>> + Send + 'a {
        self.collection
            .find(FindOptions::summaries_by_name(), tx)
            .map(|doc| -> Result<ListSummary, StoreError> { Ok(document::decode_summary(&doc?)?) })
    }

    /// Create an empty list and return its new id.
    ///
    /// The name is stored as given; empty names are accepted. Not
    /// idempotent: each call creates another list.
    ///
    /// # Errors
    ///
    /// Returns a collection error if the insert fails.
    pub async fn create_list(&self, name: &str, tx: TxContext<'_, C::Session>) -> Result<String, StoreError> {
        let id = ListId::from_uuid(
            self.collection
                .insert_one(document::new_list_document(name), tx)
                .await?,
        );
        info!(%id, list_name = name, "created list");
        Ok(id.to_string())
    }

    /// Fetch a list with all its items in stored order.
    ///
    /// # Errors
    ///
    /// Returns `InvalidId` for a malformed id and `NotFound` if no list has it.
    pub async fn get_list(
        &self,
        id: impl ToListId + Send,
        tx: TxContext<'_, C::Session>,
    ) -> Result<TodoList, StoreError> {
        let id = id.to_list_id()?;
        let doc = self
            .collection
            .find_one(id.as_uuid(), tx)
            .await?
            .ok_or(StoreError::NotFound(id))?;
        Ok(document::decode_list(&doc)?)
    }

    /// Delete a list and, with it, all of its items.
    ///
    /// Returns whether exactly one list was removed; a missing list is
    /// `Ok(false)`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidId` for a malformed id, or a collection error.
    pub async fn delete_list(&self, id: impl ToListId + Send, tx: TxContext<'_, C::Session>) -> Result<bool, StoreError> {
        let id = id.to_list_id()?;
        let deleted = self.collection.delete_one(id.as_uuid(), tx).await?;
        info!(%id, deleted, "deleted list");
        Ok(deleted == 1)
    }

    // =========================================================================
    // ITEMS
    // =========================================================================

    /// Append a new unchecked item and return the list as it is afterwards,
    /// or `None` if no list has this id.
    ///
    /// Not idempotent: each call appends another item.
    ///
    /// # Errors
    ///
    /// Returns `InvalidId` for a malformed id, or a collection/decode error.
    pub async fn add_item(
        &self,
        list_id: impl ToListId + Send,
        label: &str,
        tx: TxContext<'_, C::Session>,
    ) -> Result<Option<TodoList>, StoreError> {
        let list_id = list_id.to_list_id()?;
        let item = TodoItem::new(label);
        let item_id = item.id.clone();
        let updated = self
            .modify(
                Filter::Id(list_id.as_uuid()),
                Update::PushItem(document::item_document(&item)),
                tx,
            )
            .await?;

        match &updated {
            Some(_) => info!(%list_id, %item_id, "added item"),
            None => debug!(%list_id, "add item: no such list"),
        }
        Ok(updated)
    }

    /// Set the checked flag of one item and return the list afterwards.
    ///
    /// Returns `None` when nothing matched, whether the list is missing or the
    /// item is not in it; the two cases are not told apart.
    ///
    /// # Errors
    ///
    /// Returns `InvalidId` for a malformed id, or a collection/decode error.
    pub async fn set_item_checked(
        &self,
        list_id: impl ToListId + Send,
        item_id: &str,
        checked: bool,
        tx: TxContext<'_, C::Session>,
    ) -> Result<Option<TodoList>, StoreError> {
        let list_id = list_id.to_list_id()?;
        let updated = self
            .modify(
                Filter::IdAndItem { id: list_id.as_uuid(), item_id: item_id.to_owned() },
                Update::SetMatchedItemChecked(checked),
                tx,
            )
            .await?;

        if updated.is_none() {
            debug!(%list_id, item_id, "set checked: no matching list/item");
        }
        Ok(updated)
    }

    /// Remove an item and return the list afterwards, or `None` if the list
    /// does not exist.
    ///
    /// Removing an item id the list does not contain is a no-op that still
    /// returns the (unchanged) list.
    ///
    /// # Errors
    ///
    /// Returns `InvalidId` for a malformed id, or a collection/decode error.
    pub async fn remove_item(
        &self,
        list_id: impl ToListId + Send,
        item_id: &str,
        tx: TxContext<'_, C::Session>,
    ) -> Result<Option<TodoList>, StoreError> {
        let list_id = list_id.to_list_id()?;
        let updated = self
            .modify(
                Filter::Id(list_id.as_uuid()),
                Update::PullItem { item_id: item_id.to_owned() },
                tx,
            )
            .await?;

        if updated.is_none() {
            debug!(%list_id, item_id, "remove item: no such list");
        }
        Ok(updated)
    }

    async fn modify(
        &self,
        filter: Filter,
        update: Update,
        tx: TxContext<'_, C::Session>,
    ) -> Result<Option<TodoList>, StoreError> {
        self.collection
            .find_one_and_update(filter, update, tx)
            .await?
            .map(|doc| document::decode_list(&doc))
            .transpose()
            .map_err(StoreError::from)
    }
}

#[cfg(test)]
#[path = "store_test.rs"]
mod tests;
