//! Persistence core for a small to-do list service.
//!
//! ARCHITECTURE
//! ============
//! `ListStore` owns every read and write of lists and their embedded items.
//! It sits on a `DocumentCollection`, backed either by Postgres `JSONB`
//! rows or by an in-memory map. Request handlers receive a `ListStore`
//! handle at startup and call it directly; nothing here is global.

pub mod collection;
pub mod config;
pub mod db;
pub mod document;
pub mod error;
pub mod model;
pub mod store;

pub use collection::{DocumentCollection, MemoryCollection, PgCollection, TxContext};
pub use model::{ListId, ListSummary, TodoItem, TodoList};
pub use store::{ListStore, StoreError};
