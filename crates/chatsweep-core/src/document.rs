//! Key-path matching over semi-structured JSON documents
//!
//! Chat and file documents are heterogeneous trees. References are found by
//! walking the tree and matching a dotted key path either at the root only
//! (`$.a.b`) or starting from every node (`$.**.a.b`). Arrays met along a
//! path are unwrapped, so `{"file": [{"id": "x"}, {"id": "y"}]}` matches
//! `file.id` twice. Only string leaves are collected.

use serde_json::Value;
use std::collections::BTreeSet;

/// A dotted key path such as `file.id`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyPath<'a> {
    segments: &'a [&'a str],
}

impl<'a> KeyPath<'a> {
    pub const fn new(segments: &'a [&'a str]) -> Self {
        Self { segments }
    }

    pub fn segments(&self) -> &'a [&'a str] {
        self.segments
    }
}

/// `file_id` keys in chat messages
pub const FILE_ID: KeyPath<'static> = KeyPath::new(&["file_id"]);

/// `file: {id}` objects attached to chat messages
pub const FILE_DOT_ID: KeyPath<'static> = KeyPath::new(&["file", "id"]);

pub const COLLECTION_NAME: KeyPath<'static> = KeyPath::new(&["collection_name"]);

/// Collect every string reachable at `path` from any node of `doc`
pub fn collect_anywhere(doc: &Value, path: KeyPath<'_>, out: &mut BTreeSet<String>) {
    follow(doc, path.segments, out);
    match doc {
        Value::Object(map) => {
            for child in map.values() {
                collect_anywhere(child, path, out);
            }
        }
        Value::Array(items) => {
            for child in items {
                collect_anywhere(child, path, out);
            }
        }
        _ => {}
    }
}

/// Collect strings at `path` relative to the root of `doc` only
pub fn collect_at(doc: &Value, path: KeyPath<'_>, out: &mut BTreeSet<String>) {
    follow(doc, path.segments, out);
}

/// Collect the string members of the array stored under `key` at the root
pub fn collect_list(doc: &Value, key: &str, out: &mut BTreeSet<String>) {
    if let Some(Value::Array(items)) = doc.get(key) {
        out.extend(items.iter().filter_map(|item| item.as_str().map(String::from)));
    }
}

fn follow(node: &Value, segments: &[&str], out: &mut BTreeSet<String>) {
    let Some((key, rest)) = segments.split_first() else {
        if let Value::String(s) = node {
            out.insert(s.clone());
        }
        return;
    };

    match node {
        Value::Object(map) => {
            if let Some(child) = map.get(*key) {
                follow(child, rest, out);
            }
        }
        Value::Array(items) => {
            for item in items {
                follow(item, segments, out);
            }
        }
        _ => {}
    }
}
