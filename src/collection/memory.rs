//! In-memory document collection.
//!
//! DESIGN
//! ======
//! Documents live in a `HashMap` behind a tokio `RwLock`, keyed by the
//! identity the collection assigns on insert. Each find-and-modify runs
//! entirely under the write lock, which is what makes it atomic per call.
//!
//! A `MemorySession` owns the write lock for its whole lifetime and keeps a
//! snapshot taken at `begin`. `commit` discards the snapshot and releases the
//! lock. A session ended any other way, through `abort` or by being dropped,
//! restores the snapshot first, matching a rolled-back Postgres transaction.
//! Detached calls on the same collection wait until an open session ends.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream;
use serde_json::Value;
use tokio::sync::{Mutex, OwnedRwLockWriteGuard, RwLock};
use uuid::Uuid;

use super::{
    CollectionError, DocumentCollection, DocumentStream, Direction, Filter, FindOptions, Projection, Sort, TxContext,
    Update,
};
use crate::document::{
    Document, FIELD_ID, FIELD_ITEM_CHECKED, FIELD_ITEM_COUNT, FIELD_ITEM_ID, FIELD_ITEMS, FIELD_NAME,
};

type Docs = HashMap<Uuid, Document>;

// =============================================================================
// COLLECTION
// =============================================================================

/// Process-local collection. Clones share the same documents.
#[derive(Debug, Clone, Default)]
pub struct MemoryCollection {
    docs: Arc<RwLock<Docs>>,
}

/// Exclusive session over a `MemoryCollection`. Dropping it without
/// `commit` rolls back.
pub struct MemorySession {
    owner: Arc<RwLock<Docs>>,
    docs: Mutex<OwnedRwLockWriteGuard<Docs>>,
    snapshot: Option<Docs>,
}

impl MemoryCollection {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a session. Waits for any in-flight call or other session.
    ///
    /// The session holds the collection's write lock until it ends. Every
    /// call made on this collection while it is open must pass
    /// `TxContext::Session`; a `Detached` call from the task that holds the
    /// session waits on the lock forever.
    pub async fn begin(&self) -> MemorySession {
        let guard = Arc::clone(&self.docs).write_owned().await;
        let snapshot = Some(guard.clone());
        MemorySession { owner: Arc::clone(&self.docs), docs: Mutex::new(guard), snapshot }
    }

    /// Number of stored documents.
    pub async fn len(&self) -> usize {
        self.docs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.docs.read().await.is_empty()
    }

    async fn read<R, F>(&self, tx: TxContext<'_, MemorySession>, f: F) -> Result<R, CollectionError>
    where
        F: FnOnce(&Docs) -> R + Send,
    {
        match tx {
            TxContext::Detached => {
                let docs = self.docs.read().await;
                Ok(f(&docs))
            }
            TxContext::Session(session) => {
                self.check_owner(session)?;
                let docs = session.docs.lock().await;
                Ok(f(&docs))
            }
        }
    }

    async fn write<R, F>(&self, tx: TxContext<'_, MemorySession>, f: F) -> Result<R, CollectionError>
    where
        F: FnOnce(&mut Docs) -> R + Send,
    {
        match tx {
            TxContext::Detached => {
                let mut docs = self.docs.write().await;
                Ok(f(&mut docs))
            }
            TxContext::Session(session) => {
                self.check_owner(session)?;
                let mut docs = session.docs.lock().await;
                Ok(f(&mut docs))
            }
        }
    }

    fn check_owner(&self, session: &MemorySession) -> Result<(), CollectionError> {
        if Arc::ptr_eq(&session.owner, &self.docs) {
            Ok(())
        } else {
            Err(CollectionError::ForeignSession)
        }
    }
}

impl MemorySession {
    /// Keep every write made through this session.
    pub fn commit(mut self) {
        self.snapshot = None;
    }

    /// Discard every write made through this session.
    pub fn abort(self) {
        drop(self);
    }
}

impl Drop for MemorySession {
    fn drop(&mut self) {
        if let Some(snapshot) = self.snapshot.take() {
            **self.docs.get_mut() = snapshot;
        }
    }
}

// =============================================================================
// TRAIT IMPL
// =============================================================================

#[async_trait]
impl DocumentCollection for MemoryCollection {
    type Session = MemorySession;

    fn find<'a>(&'a self, options: FindOptions, tx: TxContext<'a, MemorySession>) -> DocumentStream<'a> {
        stream::once(async move {
            match self.read(tx, |docs| scan(docs, options)).await {
                Ok(found) => found.into_iter().map(Ok).collect::<Vec<_>>(),
                Err(e) => vec![Err(e)],
            }
        })
        .flat_map(stream::iter)
        .boxed()
    }

    async fn insert_one(&self, mut doc: Document, tx: TxContext<'_, MemorySession>) -> Result<Uuid, CollectionError> {
        doc.remove(FIELD_ID);
        let id = Uuid::new_v4();
        self.write(tx, move |docs| {
            docs.insert(id, doc);
        })
        .await?;
        Ok(id)
    }

    async fn find_one(&self, id: Uuid, tx: TxContext<'_, MemorySession>) -> Result<Option<Document>, CollectionError> {
        self.read(tx, |docs| docs.get(&id).map(|doc| with_id(id, doc.clone())))
            .await
    }

    async fn delete_one(&self, id: Uuid, tx: TxContext<'_, MemorySession>) -> Result<u64, CollectionError> {
        self.write(tx, |docs| u64::from(docs.remove(&id).is_some()))
            .await
    }

    async fn find_one_and_update(
        &self,
        filter: Filter,
        update: Update,
        tx: TxContext<'_, MemorySession>,
    ) -> Result<Option<Document>, CollectionError> {
        self.write(tx, move |docs| {
            let id = filter.id();
            let Some(doc) = docs.get_mut(&id) else {
                return Ok(None);
            };
            if let Filter::IdAndItem { item_id, .. } = &filter {
                if item_position(doc, item_id).is_none() {
                    return Ok(None);
                }
            }
            apply_update(doc, &filter, update)?;
            Ok(Some(with_id(id, doc.clone())))
        })
        .await?
    }

    async fn ping(&self) -> Result<(), CollectionError> {
        Ok(())
    }
}

// =============================================================================
// HELPERS
// =============================================================================

fn with_id(id: Uuid, mut doc: Document) -> Document {
    doc.insert(FIELD_ID.into(), Value::String(id.to_string()));
    doc
}

fn name_of(doc: &Document) -> Option<&str> {
    doc.get(FIELD_NAME).and_then(Value::as_str)
}

fn scan(docs: &Docs, options: FindOptions) -> Vec<Document> {
    let mut entries: Vec<(&Uuid, &Document)> = docs.iter().collect();
    let Sort::Name(direction) = options.sort;
    entries.sort_by(|(a_id, a), (b_id, b)| {
        let by_name = name_of(a).cmp(&name_of(b));
        let by_name = match direction {
            Direction::Ascending => by_name,
            Direction::Descending => by_name.reverse(),
        };
        by_name.then_with(|| a_id.cmp(b_id))
    });

    entries
        .into_iter()
        .map(|(id, doc)| match options.projection {
            Projection::Full => with_id(*id, doc.clone()),
            Projection::Summary => summarize(*id, doc),
        })
        .collect()
}

fn summarize(id: Uuid, doc: &Document) -> Document {
    let mut out = Document::new();
    out.insert(FIELD_ID.into(), Value::String(id.to_string()));
    if let Some(name) = doc.get(FIELD_NAME) {
        out.insert(FIELD_NAME.into(), name.clone());
    }
    if let Some(items) = doc.get(FIELD_ITEMS).and_then(Value::as_array) {
        out.insert(FIELD_ITEM_COUNT.into(), Value::from(items.len()));
    }
    out
}

fn item_position(doc: &Document, item_id: &str) -> Option<usize> {
    doc.get(FIELD_ITEMS)?
        .as_array()?
        .iter()
        .position(|item| item.get(FIELD_ITEM_ID).and_then(Value::as_str) == Some(item_id))
}

fn apply_update(doc: &mut Document, filter: &Filter, update: Update) -> Result<(), CollectionError> {
    match update {
        Update::PushItem(item) => {
            let items = doc
                .entry(FIELD_ITEMS)
                .or_insert_with(|| Value::Array(Vec::new()));
            let Value::Array(items) = items else {
                return Err(CollectionError::ItemsNotArray);
            };
            items.push(Value::Object(item));
        }
        Update::PullItem { item_id } => {
            if let Some(Value::Array(items)) = doc.get_mut(FIELD_ITEMS) {
                items.retain(|item| item.get(FIELD_ITEM_ID).and_then(Value::as_str) != Some(item_id.as_str()));
            }
        }
        Update::SetMatchedItemChecked(checked) => {
            let Filter::IdAndItem { item_id, .. } = filter else {
                return Err(CollectionError::PositionalWithoutMatch);
            };
            let position = item_position(doc, item_id).ok_or(CollectionError::PositionalWithoutMatch)?;
            if let Some(Value::Object(item)) = doc
                .get_mut(FIELD_ITEMS)
                .and_then(|items| items.get_mut(position))
            {
                item.insert(FIELD_ITEM_CHECKED.into(), Value::Bool(checked));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "memory_test.rs"]
mod tests;
