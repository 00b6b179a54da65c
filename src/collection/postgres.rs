//! PostgreSQL document collection — one `JSONB` document per row.
//!
//! DESIGN
//! ======
//! Lists are stored in `todo_lists (id UUID, doc JSONB)`. The `_id` field is
//! never written into `doc`; it is attached from the `id` column on the way
//! out. Every find-and-modify is a single `UPDATE ... RETURNING` statement,
//! so Postgres row locking serializes concurrent item mutations on the same
//! list without any in-process locking.
//!
//! The summary projection computes `jsonb_array_length(doc->'items')` in SQL
//! so enumerating lists never ships item arrays over the wire. Names sort
//! with `COLLATE "C"` (byte order), missing names first when ascending.

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream;
use serde_json::Value;
use sqlx::{PgPool, Postgres, Transaction};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{
    CollectionError, DocumentCollection, DocumentStream, Direction, Filter, FindOptions, Projection, Sort, TxContext,
    Update,
};
use crate::document::{Document, FIELD_ID};

const FIND_FULL_ASC: &str = r#"SELECT id, doc FROM todo_lists
     ORDER BY doc->>'name' COLLATE "C" ASC NULLS FIRST, id ASC"#;
const FIND_FULL_DESC: &str = r#"SELECT id, doc FROM todo_lists
     ORDER BY doc->>'name' COLLATE "C" DESC NULLS LAST, id ASC"#;
const FIND_SUMMARY_ASC: &str = r#"SELECT id,
            jsonb_build_object('name', doc->'name', 'item_count', jsonb_array_length(doc->'items')) AS summary
     FROM todo_lists
     ORDER BY doc->>'name' COLLATE "C" ASC NULLS FIRST, id ASC"#;
const FIND_SUMMARY_DESC: &str = r#"SELECT id,
            jsonb_build_object('name', doc->'name', 'item_count', jsonb_array_length(doc->'items')) AS summary
     FROM todo_lists
     ORDER BY doc->>'name' COLLATE "C" DESC NULLS LAST, id ASC"#;

const SET_PUSH_ITEM: &str = "jsonb_set(doc, '{items}', COALESCE(doc->'items', '[]'::jsonb) || jsonb_build_array($2::jsonb))";
const SET_PULL_ITEM: &str = "jsonb_set(doc, '{items}', COALESCE(
        (SELECT jsonb_agg(elem ORDER BY ord)
         FROM jsonb_array_elements(doc->'items') WITH ORDINALITY AS t(elem, ord)
         WHERE elem->>'id' IS DISTINCT FROM $2::text),
        '[]'::jsonb))";
const SET_MATCHED_CHECKED: &str = "jsonb_set(doc, ARRAY['items', (
        SELECT (ord - 1)::text
        FROM jsonb_array_elements(doc->'items') WITH ORDINALITY AS t(elem, ord)
        WHERE elem->>'id' = $3::text
        ORDER BY ord
        LIMIT 1), 'checked'], to_jsonb($2::boolean))";
const WHERE_HAS_ITEM: &str = " AND doc->'items' @> jsonb_build_array(jsonb_build_object('id', $3::text))";

/// Run `$body` against the pool, or against the session's open transaction.
macro_rules! with_executor {
    ($self:ident, $tx:expr, |$conn:ident| $body:expr) => {
        match $tx {
            TxContext::Detached => {
                let $conn = &$self.pool;
                $body
            }
            TxContext::Session(session) => {
                let mut guard = session.tx.lock().await;
                let $conn = &mut **guard;
                $body
            }
        }
    };
}

// =============================================================================
// COLLECTION
// =============================================================================

#[derive(Debug, Clone)]
pub struct PgCollection {
    pool: PgPool,
}

/// An open Postgres transaction. Must be ended with `commit` or `abort`;
/// dropping it rolls back.
pub struct PgSession {
    tx: Mutex<Transaction<'static, Postgres>>,
}

impl PgCollection {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Open a transaction for grouping several calls.
    ///
    /// # Errors
    ///
    /// Returns a database error if a connection cannot be acquired.
    pub async fn begin(&self) -> Result<PgSession, CollectionError> {
        let tx = self.pool.begin().await?;
        Ok(PgSession { tx: Mutex::new(tx) })
    }
}

impl PgSession {
    /// # Errors
    ///
    /// Returns a database error if the commit fails.
    pub async fn commit(self) -> Result<(), CollectionError> {
        self.tx.into_inner().commit().await?;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns a database error if the rollback fails.
    pub async fn abort(self) -> Result<(), CollectionError> {
        self.tx.into_inner().rollback().await?;
        Ok(())
    }
}

// =============================================================================
// TRAIT IMPL
// =============================================================================

#[async_trait]
impl DocumentCollection for PgCollection {
    type Session = PgSession;

    fn find<'a>(&'a self, options: FindOptions, tx: TxContext<'a, PgSession>) -> DocumentStream<'a> {
        let sql = find_sql(options);
        match tx {
            TxContext::Detached => sqlx::query_as::<_, (Uuid, Value)>(sql)
                .fetch(&self.pool)
                .map(|row| {
                    let (id, doc) = row?;
                    into_document(id, doc)
                })
                .boxed(),
            // A streaming cursor cannot outlive the session lock, so rows are
            // buffered when running inside a transaction.
            TxContext::Session(session) => stream::once(async move {
                let mut guard = session.tx.lock().await;
                match sqlx::query_as::<_, (Uuid, Value)>(sql)
                    .fetch_all(&mut **guard)
                    .await
                {
                    Ok(rows) => rows
                        .into_iter()
                        .map(|(id, doc)| into_document(id, doc))
                        .collect::<Vec<_>>(),
                    Err(e) => vec![Err(e.into())],
                }
            })
            .flat_map(stream::iter)
            .boxed(),
        }
    }

    async fn insert_one(&self, mut doc: Document, tx: TxContext<'_, PgSession>) -> Result<Uuid, CollectionError> {
        doc.remove(FIELD_ID);
        let id = Uuid::new_v4();
        let query = sqlx::query("INSERT INTO todo_lists (id, doc) VALUES ($1, $2)")
            .bind(id)
            .bind(Value::Object(doc));
        with_executor!(self, tx, |conn| query.execute(conn).await?);
        Ok(id)
    }

    async fn find_one(&self, id: Uuid, tx: TxContext<'_, PgSession>) -> Result<Option<Document>, CollectionError> {
        let query = sqlx::query_as::<_, (Uuid, Value)>("SELECT id, doc FROM todo_lists WHERE id = $1").bind(id);
        let row = with_executor!(self, tx, |conn| query.fetch_optional(conn).await?);
        row.map(|(id, doc)| into_document(id, doc)).transpose()
    }

    async fn delete_one(&self, id: Uuid, tx: TxContext<'_, PgSession>) -> Result<u64, CollectionError> {
        let query = sqlx::query("DELETE FROM todo_lists WHERE id = $1").bind(id);
        let result = with_executor!(self, tx, |conn| query.execute(conn).await?);
        Ok(result.rows_affected())
    }

    async fn find_one_and_update(
        &self,
        filter: Filter,
        update: Update,
        tx: TxContext<'_, PgSession>,
    ) -> Result<Option<Document>, CollectionError> {
        let set = match (&update, &filter) {
            (Update::PushItem(_), _) => SET_PUSH_ITEM,
            (Update::PullItem { .. }, _) => SET_PULL_ITEM,
            (Update::SetMatchedItemChecked(_), Filter::IdAndItem { .. }) => SET_MATCHED_CHECKED,
            (Update::SetMatchedItemChecked(_), Filter::Id(_)) => {
                return Err(CollectionError::PositionalWithoutMatch);
            }
        };
        let condition = match filter {
            Filter::Id(_) => "",
            Filter::IdAndItem { .. } => WHERE_HAS_ITEM,
        };
        let sql = format!("UPDATE todo_lists SET doc = {set} WHERE id = $1{condition} RETURNING id, doc");

        let mut query = sqlx::query_as::<_, (Uuid, Value)>(&sql).bind(filter.id());
        query = match update {
            Update::PushItem(item) => query.bind(Value::Object(item)),
            Update::PullItem { item_id } => query.bind(item_id),
            Update::SetMatchedItemChecked(checked) => query.bind(checked),
        };
        if let Filter::IdAndItem { item_id, .. } = filter {
            query = query.bind(item_id);
        }

        let row = with_executor!(self, tx, |conn| query.fetch_optional(conn).await?);
        row.map(|(id, doc)| into_document(id, doc)).transpose()
    }

    async fn ping(&self) -> Result<(), CollectionError> {
        crate::db::ping(&self.pool).await?;
        Ok(())
    }
}

// =============================================================================
// HELPERS
// =============================================================================

fn find_sql(options: FindOptions) -> &'static str {
    let Sort::Name(direction) = options.sort;
    match (options.projection, direction) {
        (Projection::Full, Direction::Ascending) => FIND_FULL_ASC,
        (Projection::Full, Direction::Descending) => FIND_FULL_DESC,
        (Projection::Summary, Direction::Ascending) => FIND_SUMMARY_ASC,
        (Projection::Summary, Direction::Descending) => FIND_SUMMARY_DESC,
    }
}

fn into_document(id: Uuid, doc: Value) -> Result<Document, CollectionError> {
    let Value::Object(mut doc) = doc else {
        return Err(CollectionError::NotAnObject);
    };
    doc.insert(FIELD_ID.into(), Value::String(id.to_string()));
    Ok(doc)
}

#[cfg(test)]
#[path = "postgres_test.rs"]
mod tests;
