use anyhow::Result;
use launchtree_lib::{SpecialMode, ROOT_NODE_ID};

#[path = "util.rs"]
mod util;

#[tokio::test]
async fn root_uses_the_sentinel_id() -> Result<()> {
    let store = util::temp_store().await;
    let root = store.get_or_create_special(SpecialMode::Root).await?;
    assert_eq!(root.id, ROOT_NODE_ID);
    assert_eq!(root.parent_id, None);
    assert_eq!(root.position, 0);
    Ok(())
}

#[tokio::test]
async fn get_or_create_is_idempotent() -> Result<()> {
    let store = util::temp_store().await;
    let first = store.get_or_create_special(SpecialMode::Home).await?;
    let second = store.get_or_create_special(SpecialMode::Home).await?;
    assert_eq!(first.id, second.id);

    // Resolving a non-root mode implicitly creates the root.
    let root = store.get_or_create_special(SpecialMode::Root).await?;
    assert_eq!(root.id, ROOT_NODE_ID);
    assert_eq!(first.parent_id, Some(ROOT_NODE_ID));
    Ok(())
}

#[tokio::test]
async fn modes_append_under_root_in_creation_order() -> Result<()> {
    let store = util::temp_store().await;
    for mode in [
        SpecialMode::Home,
        SpecialMode::Trash,
        SpecialMode::Applications,
        SpecialMode::NewApplications,
    ] {
        store.get_or_create_special(mode).await?;
    }

    let children = store.children(Some(ROOT_NODE_ID)).await?;
    let labels: Vec<&str> = children.iter().map(|n| n.label.as_str()).collect();
    assert_eq!(
        labels,
        vec!["Home", "Trash", "Applications", "New Applications"]
    );
    let positions: Vec<i64> = children.iter().map(|n| n.position).collect();
    assert_eq!(positions, vec![0, 1, 2, 3]);
    Ok(())
}

#[tokio::test]
async fn duplicate_mode_rows_fail_hard() -> Result<()> {
    let store = util::temp_store().await;
    store.get_or_create_special(SpecialMode::Trash).await?;

    // Plant a second trash directory behind the resolver's back.
    let rogue = sqlx::query(
        "INSERT INTO nodes (parent_id, kind, position, label) VALUES (-1, 'directory', 9, 'Rogue')",
    )
    .execute(store.pool())
    .await?
    .last_insert_rowid();
    sqlx::query(
        "INSERT INTO directory_payloads \
         (node_id, special_mode, collapsed, initially_visible, permissions) \
         VALUES (?, 'trash', 0, 1, '{}')",
    )
    .bind(rogue)
    .execute(store.pool())
    .await?;

    let err = store
        .get_or_create_special(SpecialMode::Trash)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "TREE/INVARIANT");
    Ok(())
}
