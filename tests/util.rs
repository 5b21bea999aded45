#![allow(clippy::unwrap_used, clippy::expect_used)]
#![allow(dead_code)]

use launchtree_lib::{NodeKind, NodeStore, Payload, SpecialMode};

pub async fn temp_store() -> NodeStore {
    NodeStore::open_in_memory()
        .await
        .expect("open in-memory store")
}

pub async fn home_id(store: &NodeStore) -> i64 {
    store
        .get_or_create_special(SpecialMode::Home)
        .await
        .expect("resolve home directory")
        .id
}

/// Append a child of `kind` as the last entry under `parent_id`.
pub async fn append(store: &NodeStore, parent_id: i64, kind: NodeKind, label: &str) -> i64 {
    store
        .create_node_with_payload(parent_id, kind, label, |_| {}, |_| {})
        .await
        .expect("append child node")
}

pub fn expect_directory(payload: Payload) -> launchtree_lib::model::DirectoryPayload {
    match payload {
        Payload::Directory(dir) => dir,
        other => panic!("expected a directory payload, got {:?}", other.kind()),
    }
}
