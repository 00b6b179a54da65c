use super::*;
use futures::TryStreamExt;
use serde_json::json;

use crate::document::{item_document, new_list_document};
use crate::model::TodoItem;

async fn seed(collection: &MemoryCollection, name: &str, labels: &[&str]) -> Uuid {
    let id = collection
        .insert_one(new_list_document(name), TxContext::Detached)
        .await
        .unwrap();
    for label in labels {
        collection
            .find_one_and_update(
                Filter::Id(id),
                Update::PushItem(item_document(&TodoItem::new(label))),
                TxContext::Detached,
            )
            .await
            .unwrap()
            .expect("seeded list should exist");
    }
    id
}

fn item_ids(doc: &Document) -> Vec<String> {
    doc[FIELD_ITEMS]
        .as_array()
        .unwrap()
        .iter()
        .map(|item| item[FIELD_ITEM_ID].as_str().unwrap().to_owned())
        .collect()
}

#[tokio::test]
async fn insert_assigns_id_and_find_one_returns_it() {
    let collection = MemoryCollection::new();
    let mut doc = new_list_document("Groceries");
    doc.insert(FIELD_ID.into(), json!("ignored"));

    let id = collection.insert_one(doc, TxContext::Detached).await.unwrap();
    let found = collection
        .find_one(id, TxContext::Detached)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(found[FIELD_ID], json!(id.to_string()));
    assert_eq!(found[FIELD_NAME], json!("Groceries"));
    assert_eq!(found[FIELD_ITEMS], json!([]));
}

#[tokio::test]
async fn find_summaries_sorts_by_name_and_counts_items() {
    let collection = MemoryCollection::new();
    seed(&collection, "b", &["x", "y"]).await;
    seed(&collection, "a", &[]).await;
    seed(&collection, "c", &["z"]).await;

    let docs: Vec<Document> = collection
        .find(FindOptions::summaries_by_name(), TxContext::Detached)
        .try_collect()
        .await
        .unwrap();

    let names: Vec<&str> = docs.iter().map(|d| d[FIELD_NAME].as_str().unwrap()).collect();
    assert_eq!(names, ["a", "b", "c"]);
    let counts: Vec<u64> = docs.iter().map(|d| d[FIELD_ITEM_COUNT].as_u64().unwrap()).collect();
    assert_eq!(counts, [0, 2, 1]);
    assert!(docs.iter().all(|d| !d.contains_key(FIELD_ITEMS)));
}

#[tokio::test]
async fn find_full_descending_returns_items() {
    let collection = MemoryCollection::new();
    seed(&collection, "a", &["one"]).await;
    seed(&collection, "b", &[]).await;

    let options = FindOptions { projection: Projection::Full, sort: Sort::Name(Direction::Descending) };
    let docs: Vec<Document> = collection
        .find(options, TxContext::Detached)
        .try_collect()
        .await
        .unwrap();

    assert_eq!(docs[0][FIELD_NAME], json!("b"));
    assert_eq!(docs[1][FIELD_ITEMS].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn delete_one_reports_count() {
    let collection = MemoryCollection::new();
    let id = seed(&collection, "gone", &[]).await;

    assert_eq!(collection.delete_one(id, TxContext::Detached).await.unwrap(), 1);
    assert_eq!(collection.delete_one(id, TxContext::Detached).await.unwrap(), 0);
    assert!(collection.is_empty().await);
}

#[tokio::test]
async fn update_on_missing_document_returns_none() {
    let collection = MemoryCollection::new();
    let result = collection
        .find_one_and_update(Filter::Id(Uuid::new_v4()), Update::PullItem { item_id: "x".into() }, TxContext::Detached)
        .await
        .unwrap();
    assert!(result.is_none());
}

#[tokio::test]
async fn positional_set_requires_matching_item() {
    let collection = MemoryCollection::new();
    let id = seed(&collection, "list", &["a"]).await;

    let missing = collection
        .find_one_and_update(
            Filter::IdAndItem { id, item_id: "nope".into() },
            Update::SetMatchedItemChecked(true),
            TxContext::Detached,
        )
        .await
        .unwrap();
    assert!(missing.is_none());

    let err = collection
        .find_one_and_update(Filter::Id(id), Update::SetMatchedItemChecked(true), TxContext::Detached)
        .await
        .unwrap_err();
    assert!(matches!(err, CollectionError::PositionalWithoutMatch));
}

#[tokio::test]
async fn positional_set_touches_only_matched_item() {
    let collection = MemoryCollection::new();
    let id = seed(&collection, "list", &["a", "b"]).await;
    let doc = collection.find_one(id, TxContext::Detached).await.unwrap().unwrap();
    let ids = item_ids(&doc);

    let updated = collection
        .find_one_and_update(
            Filter::IdAndItem { id, item_id: ids[1].clone() },
            Update::SetMatchedItemChecked(true),
            TxContext::Detached,
        )
        .await
        .unwrap()
        .unwrap();

    assert_eq!(updated[FIELD_ITEMS][0][FIELD_ITEM_CHECKED], json!(false));
    assert_eq!(updated[FIELD_ITEMS][1][FIELD_ITEM_CHECKED], json!(true));
}

#[tokio::test]
async fn pull_of_unknown_item_leaves_document_unchanged() {
    let collection = MemoryCollection::new();
    let id = seed(&collection, "list", &["a"]).await;
    let before = collection.find_one(id, TxContext::Detached).await.unwrap().unwrap();

    let after = collection
        .find_one_and_update(Filter::Id(id), Update::PullItem { item_id: "nope".into() }, TxContext::Detached)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(before, after);
}

#[tokio::test]
async fn push_onto_non_array_items_fails_without_mutating() {
    let collection = MemoryCollection::new();
    let mut doc = new_list_document("broken");
    doc.insert(FIELD_ITEMS.into(), json!("oops"));
    let id = collection.insert_one(doc, TxContext::Detached).await.unwrap();

    let err = collection
        .find_one_and_update(
            Filter::Id(id),
            Update::PushItem(item_document(&TodoItem::new("x"))),
            TxContext::Detached,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, CollectionError::ItemsNotArray));

    let stored = collection.find_one(id, TxContext::Detached).await.unwrap().unwrap();
    assert_eq!(stored[FIELD_ITEMS], json!("oops"));
}

#[tokio::test]
async fn aborted_session_discards_writes() {
    let collection = MemoryCollection::new();
    let kept = seed(&collection, "kept", &[]).await;

    let session = collection.begin().await;
    let tx = TxContext::Session(&session);
    let added = collection
        .insert_one(new_list_document("temp"), tx)
        .await
        .unwrap();
    assert_eq!(collection.delete_one(kept, tx).await.unwrap(), 1);
    assert!(collection.find_one(added, tx).await.unwrap().is_some());
    session.abort();

    assert_eq!(collection.len().await, 1);
    assert!(collection.find_one(kept, TxContext::Detached).await.unwrap().is_some());
    assert!(collection.find_one(added, TxContext::Detached).await.unwrap().is_none());
}

#[tokio::test]
async fn committed_session_keeps_writes() {
    let collection = MemoryCollection::new();

    let session = collection.begin().await;
    let id = collection
        .insert_one(new_list_document("kept"), TxContext::Session(&session))
        .await
        .unwrap();
    session.commit();

    assert!(collection.find_one(id, TxContext::Detached).await.unwrap().is_some());
}

#[tokio::test]
async fn dropped_session_rolls_back() {
    let collection = MemoryCollection::new();

    let id = {
        let session = collection.begin().await;
        collection
            .insert_one(new_list_document("dropped"), TxContext::Session(&session))
            .await
            .unwrap()
    };

    assert!(collection.find_one(id, TxContext::Detached).await.unwrap().is_none());
    assert!(collection.is_empty().await);
}

#[tokio::test]
async fn session_dropped_by_early_return_rolls_back() {
    async fn grouped(collection: &MemoryCollection) -> Result<(), CollectionError> {
        let session = collection.begin().await;
        let tx = TxContext::Session(&session);
        let id = collection.insert_one(new_list_document("half"), tx).await?;
        collection
            .find_one_and_update(Filter::Id(id), Update::SetMatchedItemChecked(true), tx)
            .await?;
        session.commit();
        Ok(())
    }

    let collection = MemoryCollection::new();
    assert!(matches!(grouped(&collection).await, Err(CollectionError::PositionalWithoutMatch)));
    assert!(collection.is_empty().await);
}

#[tokio::test]
async fn detached_call_from_another_task_waits_for_session() {
    let collection = MemoryCollection::new();
    let session = collection.begin().await;

    let other = collection.clone();
    let waiter = tokio::spawn(async move { other.insert_one(new_list_document("after"), TxContext::Detached).await });
    tokio::task::yield_now().await;
    assert!(!waiter.is_finished());

    session.commit();
    let id = waiter.await.unwrap().unwrap();
    assert!(collection.find_one(id, TxContext::Detached).await.unwrap().is_some());
}

#[tokio::test]
async fn foreign_session_is_rejected() {
    let ours = MemoryCollection::new();
    let theirs = MemoryCollection::new();
    let session = theirs.begin().await;

    let err = ours
        .insert_one(new_list_document("x"), TxContext::Session(&session))
        .await
        .unwrap_err();
    assert!(matches!(err, CollectionError::ForeignSession));
    session.commit();
}

#[tokio::test]
async fn clones_share_documents() {
    let collection = MemoryCollection::new();
    let clone = collection.clone();
    let id = seed(&collection, "shared", &[]).await;
    assert!(clone.find_one(id, TxContext::Detached).await.unwrap().is_some());
}
