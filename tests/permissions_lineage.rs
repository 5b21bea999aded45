use anyhow::Result;
use launchtree_lib::{
    NodeKind, Payload, PermissionKind, PermissionScope, SpecialMode, ROOT_NODE_ID,
};

#[path = "util.rs"]
mod util;

#[tokio::test]
async fn lineage_runs_root_to_node() -> Result<()> {
    let store = util::temp_store().await;
    let home = util::home_id(&store).await;
    let dir = util::append(&store, home, NodeKind::Directory, "projects").await;
    let note = util::append(&store, dir, NodeKind::Note, "todo").await;

    let lineage = store.node_lineage(note).await?;
    let ids: Vec<i64> = lineage.iter().map(|n| n.id).collect();
    assert_eq!(ids, vec![ROOT_NODE_ID, home, dir, note]);
    Ok(())
}

#[tokio::test]
async fn upward_traversal_can_stop_early() -> Result<()> {
    let store = util::temp_store().await;
    let home = util::home_id(&store).await;
    let dir = util::append(&store, home, NodeKind::Directory, "projects").await;
    let note = util::append(&store, dir, NodeKind::Note, "todo").await;

    let mut seen: Vec<i64> = Vec::new();
    store
        .traverse_upward(note, true, |node| {
            seen.push(node.id);
            node.id != dir
        })
        .await?;
    assert_eq!(seen, vec![note, dir]);
    Ok(())
}

#[tokio::test]
async fn parent_cycle_aborts_the_walk() -> Result<()> {
    let store = util::temp_store().await;
    let home = util::home_id(&store).await;
    let a = util::append(&store, home, NodeKind::Directory, "a").await;
    let b = util::append(&store, a, NodeKind::Directory, "b").await;

    // Corrupt the parent chain directly: a -> b -> a.
    sqlx::query("UPDATE nodes SET parent_id = ? WHERE id = ?")
        .bind(b)
        .bind(a)
        .execute(store.pool())
        .await?;

    let err = store.node_lineage(a).await.unwrap_err();
    assert_eq!(err.code(), "TREE/INVARIANT");
    Ok(())
}

#[tokio::test]
async fn unset_permissions_allow_everything() -> Result<()> {
    let store = util::temp_store().await;
    let home = util::home_id(&store).await;
    let note = util::append(&store, home, NodeKind::Note, "n").await;

    for kind in [
        PermissionKind::Create,
        PermissionKind::Edit,
        PermissionKind::Delete,
        PermissionKind::Move,
    ] {
        assert!(
            store
                .check_permission(kind, PermissionScope::SelfOnly, note)
                .await?
        );
    }
    Ok(())
}

#[tokio::test]
async fn recursive_deny_on_ancestor_gates_descendants() -> Result<()> {
    let store = util::temp_store().await;
    let home = util::home_id(&store).await;
    let dir = util::append(&store, home, NodeKind::Directory, "locked").await;
    let note = util::append(&store, dir, NodeKind::Note, "n").await;

    let mut payload = util::expect_directory(store.get_payload(home).await?);
    payload
        .permissions
        .set(PermissionKind::Delete, PermissionScope::Recursive, false);
    store.update_payload(&Payload::Directory(payload)).await?;

    assert!(
        !store
            .check_permission(PermissionKind::Delete, PermissionScope::SelfOnly, note)
            .await?
    );
    // The deny is scoped to descendants; the directory's own self scope and
    // unrelated operations stay allowed.
    assert!(
        store
            .check_permission(PermissionKind::Delete, PermissionScope::SelfOnly, home)
            .await?
    );
    assert!(
        !store
            .check_permission(PermissionKind::Delete, PermissionScope::Recursive, home)
            .await?
    );
    assert!(
        store
            .check_permission(PermissionKind::Edit, PermissionScope::SelfOnly, note)
            .await?
    );
    Ok(())
}

#[tokio::test]
async fn self_deny_does_not_leak_to_children() -> Result<()> {
    let store = util::temp_store().await;
    let home = util::home_id(&store).await;
    let dir = util::append(&store, home, NodeKind::Directory, "d").await;
    let note = util::append(&store, dir, NodeKind::Note, "n").await;

    let mut payload = util::expect_directory(store.get_payload(dir).await?);
    payload
        .permissions
        .set(PermissionKind::Edit, PermissionScope::SelfOnly, false);
    store.update_payload(&Payload::Directory(payload)).await?;

    assert!(
        !store
            .check_permission(PermissionKind::Edit, PermissionScope::SelfOnly, dir)
            .await?
    );
    assert!(
        store
            .check_permission(PermissionKind::Edit, PermissionScope::SelfOnly, note)
            .await?
    );
    Ok(())
}

#[tokio::test]
async fn special_trash_can_lock_down_creation() -> Result<()> {
    let store = util::temp_store().await;
    let trash = store.get_or_create_special(SpecialMode::Trash).await?;
    let item = util::append(&store, trash.id, NodeKind::Note, "deleted").await;

    let mut payload = util::expect_directory(store.get_payload(trash.id).await?);
    payload
        .permissions
        .set(PermissionKind::Create, PermissionScope::Recursive, false);
    store.update_payload(&Payload::Directory(payload)).await?;

    assert!(
        !store
            .check_permission(PermissionKind::Create, PermissionScope::SelfOnly, item)
            .await?
    );
    Ok(())
}
