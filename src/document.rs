//! Document codec — explicit conversion between stored documents and models.
//!
//! DESIGN
//! ======
//! Collections hand back schemaless JSON objects. Each entity has its own
//! decoder that checks every required field and its type, so a malformed
//! document surfaces as a `DecodeError` naming the entity and field instead
//! of a panic deep inside the caller.
//!
//! Stored list shape:
//!
//! ```json
//! { "_id": "<uuid>", "name": "...", "items": [ { "id": "...", "label": "...", "checked": false } ] }
//! ```
//!
//! Summary projections replace `items` with a server-computed `item_count`.

use serde_json::{Map, Value};

use crate::model::{ListId, ListSummary, TodoItem, TodoList};

/// A stored document: one JSON object.
pub type Document = Map<String, Value>;

pub const FIELD_ID: &str = "_id";
pub const FIELD_NAME: &str = "name";
pub const FIELD_ITEMS: &str = "items";
pub const FIELD_ITEM_COUNT: &str = "item_count";
pub const FIELD_ITEM_ID: &str = "id";
pub const FIELD_ITEM_LABEL: &str = "label";
pub const FIELD_ITEM_CHECKED: &str = "checked";

// =============================================================================
// ERRORS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("{entity} document is missing field `{field}`")]
    MissingField { entity: &'static str, field: &'static str },
    #[error("{entity} field `{field}` should be {expected}")]
    WrongType { entity: &'static str, field: &'static str, expected: &'static str },
    #[error("{entity} document has malformed id {value:?}")]
    MalformedId { entity: &'static str, value: String },
    #[error("item at index {index}: {source}")]
    Item {
        index: usize,
        #[source]
        source: Box<DecodeError>,
    },
}

// =============================================================================
// ENCODE
// =============================================================================

/// Document inserted by "create list": a name and no items.
#[must_use]
pub fn new_list_document(name: &str) -> Document {
    let mut doc = Document::new();
    doc.insert(FIELD_NAME.into(), Value::String(name.to_owned()));
    doc.insert(FIELD_ITEMS.into(), Value::Array(Vec::new()));
    doc
}

/// Embedded item document, as pushed onto a list's `items` array.
#[must_use]
pub fn item_document(item: &TodoItem) -> Document {
    let mut doc = Document::new();
    doc.insert(FIELD_ITEM_ID.into(), Value::String(item.id.clone()));
    doc.insert(FIELD_ITEM_LABEL.into(), Value::String(item.label.clone()));
    doc.insert(FIELD_ITEM_CHECKED.into(), Value::Bool(item.checked));
    doc
}

// =============================================================================
// DECODE
// =============================================================================

/// Decode a full list document, items included in stored order.
///
/// # Errors
///
/// Returns `DecodeError` if any required field is missing or mistyped.
pub fn decode_list(doc: &Document) -> Result<TodoList, DecodeError> {
    const ENTITY: &str = "list";
    let id = decode_list_id(ENTITY, doc)?;
    let name = require_str(ENTITY, doc, FIELD_NAME)?.to_owned();
    let raw_items = require(ENTITY, doc, FIELD_ITEMS)?
        .as_array()
        .ok_or(DecodeError::WrongType { entity: ENTITY, field: FIELD_ITEMS, expected: "an array" })?;

    let mut items = Vec::with_capacity(raw_items.len());
    for (index, raw) in raw_items.iter().enumerate() {
        let item = decode_item(raw).map_err(|e| DecodeError::Item { index, source: Box::new(e) })?;
        items.push(item);
    }

    Ok(TodoList { id, name, items })
}

/// Decode one embedded item.
///
/// # Errors
///
/// Returns `DecodeError` if the value is not an object or lacks a field.
pub fn decode_item(value: &Value) -> Result<TodoItem, DecodeError> {
    const ENTITY: &str = "item";
    let doc = value
        .as_object()
        .ok_or(DecodeError::WrongType { entity: ENTITY, field: FIELD_ITEMS, expected: "an object" })?;

    let id = require_str(ENTITY, doc, FIELD_ITEM_ID)?.to_owned();
    let label = require_str(ENTITY, doc, FIELD_ITEM_LABEL)?.to_owned();
    let checked = require(ENTITY, doc, FIELD_ITEM_CHECKED)?.as_bool().ok_or(DecodeError::WrongType {
        entity: ENTITY,
        field: FIELD_ITEM_CHECKED,
        expected: "a boolean",
    })?;

    Ok(TodoItem { id, label, checked })
}

/// Decode a summary projection (`_id`, `name`, `item_count`).
///
/// # Errors
///
/// Returns `DecodeError` if any projected field is missing or mistyped.
pub fn decode_summary(doc: &Document) -> Result<ListSummary, DecodeError> {
    const ENTITY: &str = "list summary";
    let id = decode_list_id(ENTITY, doc)?;
    let name = require_str(ENTITY, doc, FIELD_NAME)?.to_owned();
    let item_count = require(ENTITY, doc, FIELD_ITEM_COUNT)?.as_u64().ok_or(DecodeError::WrongType {
        entity: ENTITY,
        field: FIELD_ITEM_COUNT,
        expected: "a non-negative integer",
    })?;

    Ok(ListSummary { id, name, item_count })
}

// =============================================================================
// HELPERS
// =============================================================================

fn require<'d>(entity: &'static str, doc: &'d Document, field: &'static str) -> Result<&'d Value, DecodeError> {
    doc.get(field)
        .ok_or(DecodeError::MissingField { entity, field })
}

fn require_str<'d>(entity: &'static str, doc: &'d Document, field: &'static str) -> Result<&'d str, DecodeError> {
    require(entity, doc, field)?
        .as_str()
        .ok_or(DecodeError::WrongType { entity, field, expected: "a string" })
}

fn decode_list_id(entity: &'static str, doc: &Document) -> Result<ListId, DecodeError> {
    let raw = require_str(entity, doc, FIELD_ID)?;
    ListId::parse(raw).map_err(|_| DecodeError::MalformedId { entity, value: raw.to_owned() })
}

#[cfg(test)]
#[path = "document_test.rs"]
mod tests;
