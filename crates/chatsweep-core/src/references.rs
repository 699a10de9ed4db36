//! Referenced-set extraction
//!
//! Computes the file ids and collection names still in use by surviving
//! chats, knowledge bases, files and memories.

use crate::db::{MainStore, RawDocument};
use crate::document::{collect_anywhere, collect_at, collect_list, COLLECTION_NAME, FILE_DOT_ID, FILE_ID};
use crate::error::Result;
use crate::observe::{report_set, ItemKind, SetKind, SweepEvent, SweepObserver};
use serde_json::Value;
use std::collections::BTreeSet;

/// Key holding a knowledge base's attached file ids
pub const KNOWLEDGE_FILE_IDS: &str = "file_ids";

/// File ids referenced from any chat (`file_id`, `file.id` at any depth)
/// or listed in any knowledge base
pub fn referenced_file_ids(
    store: &MainStore,
    observer: &dyn SweepObserver,
) -> Result<BTreeSet<String>> {
    let mut ids = BTreeSet::new();

    for doc in store.chat_documents()? {
        if let Some(chat) = parse_document("chat", &doc, observer) {
            collect_anywhere(&chat, FILE_ID, &mut ids);
            collect_anywhere(&chat, FILE_DOT_ID, &mut ids);
        }
    }
    observer.observe(counted(ItemKind::File, "chats", &ids));

    for doc in store.knowledge_documents()? {
        if let Some(data) = parse_document("knowledge", &doc, observer) {
            collect_list(&data, KNOWLEDGE_FILE_IDS, &mut ids);
        }
    }
    report_set(observer, ItemKind::File, SetKind::Referenced, "chats and knowledge", &ids);

    Ok(ids)
}

/// Collection names referenced from any chat, any file's metadata, or
/// implied by a user's memories (`prefix + user_id`)
pub fn referenced_collections(
    store: &MainStore,
    memory_prefix: &str,
    observer: &dyn SweepObserver,
) -> Result<BTreeSet<String>> {
    let mut collections = BTreeSet::new();

    for doc in store.chat_documents()? {
        if let Some(chat) = parse_document("chat", &doc, observer) {
            collect_anywhere(&chat, COLLECTION_NAME, &mut collections);
        }
    }
    observer.observe(counted(ItemKind::Collection, "chats", &collections));

    for doc in store.file_metas()? {
        if let Some(meta) = parse_document("file", &doc, observer) {
            collect_at(&meta, COLLECTION_NAME, &mut collections);
        }
    }
    observer.observe(counted(ItemKind::Collection, "chats and files", &collections));

    collections.extend(
        store
            .memory_user_ids()?
            .into_iter()
            .map(|user_id| format!("{}{}", memory_prefix, user_id)),
    );
    report_set(
        observer,
        ItemKind::Collection,
        SetKind::Referenced,
        "chats, files and memory",
        &collections,
    );

    Ok(collections)
}

fn counted(kind: ItemKind, scope: &'static str, items: &BTreeSet<String>) -> SweepEvent {
    SweepEvent::Counted {
        kind,
        set: SetKind::Referenced,
        scope,
        count: items.len(),
    }
}

/// NULL columns contribute nothing; unparsable ones are reported and skipped.
fn parse_document(
    table: &'static str,
    doc: &RawDocument,
    observer: &dyn SweepObserver,
) -> Option<Value> {
    let body = doc.body.as_deref()?;
    match serde_json::from_str(body) {
        Ok(value) => Some(value),
        Err(err) => {
            observer.observe(SweepEvent::MalformedDocument {
                table,
                id: doc.id.clone(),
                reason: err.to_string(),
            });
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::main_store::fixtures::*;
    use crate::observe::RecordingObserver;
    use proptest::prelude::*;
    use serde_json::{json, Value};

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_file_ids_from_chats_and_knowledge() {
        let store = store();
        add_chat(&store, "c1", Some(r#"{"messages":[{"file_id":"f1"}]}"#), false, 0);
        add_chat(
            &store,
            "c2",
            Some(r#"{"history":{"m":{"files":[{"file":{"id":"f2"}}]}}}"#),
            true,
            0,
        );
        add_knowledge(&store, "k1", Some(r#"{"file_ids":["f3","f1"]}"#));
        add_knowledge(&store, "k2", Some(r#"{"description":"no files"}"#));
        add_knowledge(&store, "k3", None);

        let observer = RecordingObserver::new();
        let ids = referenced_file_ids(&store, &observer).unwrap();
        assert_eq!(ids, set(&["f1", "f2", "f3"]));
        assert_eq!(observer.count(ItemKind::File, SetKind::Referenced), Some(3));
    }

    #[test]
    fn test_malformed_chat_contributes_nothing() {
        let store = store();
        add_chat(&store, "broken", Some(r#"{"messages":[{"file_id":"f1""#), false, 0);
        add_chat(&store, "empty", None, false, 0);
        add_chat(&store, "ok", Some(r#"{"file_id":"f2"}"#), false, 0);

        let observer = RecordingObserver::new();
        let ids = referenced_file_ids(&store, &observer).unwrap();
        assert_eq!(ids, set(&["f2"]));

        let malformed: Vec<_> = observer
            .events()
            .into_iter()
            .filter_map(|event| match event {
                SweepEvent::MalformedDocument { table, id, .. } => Some((table, id)),
                _ => None,
            })
            .collect();
        assert_eq!(malformed, vec![("chat", "broken".to_string())]);
    }

    #[test]
    fn test_query_failure_surfaces() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        let store = MainStore::from_connection(conn).unwrap();
        assert!(referenced_file_ids(&store, &RecordingObserver::new()).is_err());
    }

    #[test]
    fn test_memory_collection_synthesized() {
        let store = store();
        add_memory(&store, "m1", "42");

        let collections =
            referenced_collections(&store, "user-memory-", &RecordingObserver::new()).unwrap();
        assert_eq!(collections, set(&["user-memory-42"]));
    }

    #[test]
    fn test_collections_from_chats_and_file_meta() {
        let store = store();
        add_chat(
            &store,
            "c1",
            Some(r#"{"messages":[{"files":[{"collection_name":"kb-1"}]}]}"#),
            false,
            0,
        );
        add_file(&store, "f1", Some("/u/a"), Some(r#"{"collection_name":"file-f1"}"#));
        add_file(&store, "f2", Some("/u/b"), Some(r#"{"data":{"collection_name":"nested"}}"#));
        add_file(&store, "f3", Some("/u/c"), None);

        let observer = RecordingObserver::new();
        let collections = referenced_collections(&store, "user-memory-", &observer).unwrap();
        assert_eq!(collections, set(&["file-f1", "kb-1"]));
    }

    /// A chat carrying `file_ids` as `file_id` leaves and `dot_ids` as
    /// `file: {id}` objects, the latter buried `depth` levels down.
    fn chat_document(file_ids: &[String], dot_ids: &[String], depth: usize) -> Value {
        let messages: Vec<Value> = file_ids.iter().map(|id| json!({"file_id": id})).collect();
        let mut files = json!({
            "files": dot_ids.iter().map(|id| json!({"type": "file", "file": {"id": id}})).collect::<Vec<_>>()
        });
        for level in 0..depth {
            let mut wrapper = serde_json::Map::new();
            wrapper.insert(format!("m{level}"), files);
            files = Value::Object(wrapper);
        }
        json!({"messages": messages, "history": files})
    }

    fn ids() -> impl Strategy<Value = Vec<String>> {
        proptest::collection::vec("[a-z0-9]{1,8}", 0..4)
    }

    proptest! {
        #[test]
        fn prop_referenced_ids_are_the_union_of_every_source(
            chats in proptest::collection::vec((ids(), ids(), 0usize..4), 0..5),
            knowledge in proptest::collection::vec(ids(), 0..4),
        ) {
            let store = store();
            let mut expected = BTreeSet::new();

            for (i, (file_ids, dot_ids, depth)) in chats.iter().enumerate() {
                let doc = chat_document(file_ids, dot_ids, *depth).to_string();
                add_chat(&store, &format!("c{i}"), Some(&doc), i % 2 == 0, 0);
                expected.extend(file_ids.iter().cloned());
                expected.extend(dot_ids.iter().cloned());
            }
            for (i, file_ids) in knowledge.iter().enumerate() {
                let doc = json!({"name": "kb", "file_ids": file_ids}).to_string();
                add_knowledge(&store, &format!("k{i}"), Some(&doc));
                expected.extend(file_ids.iter().cloned());
            }

            let observer = RecordingObserver::new();
            let found = referenced_file_ids(&store, &observer).unwrap();
            prop_assert_eq!(observer.count(ItemKind::File, SetKind::Referenced), Some(found.len()));
            prop_assert_eq!(found, expected);
        }
    }
}
