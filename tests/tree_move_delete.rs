use anyhow::Result;
use launchtree_lib::{NodeKind, SpecialMode, TreeEvent};

#[path = "util.rs"]
mod util;

#[tokio::test]
async fn move_keeps_both_sibling_sets_dense() -> Result<()> {
    let store = util::temp_store().await;
    let home = util::home_id(&store).await;
    let trash = store.get_or_create_special(SpecialMode::Trash).await?.id;
    let a = util::append(&store, home, NodeKind::Note, "a").await;
    let b = util::append(&store, home, NodeKind::Note, "b").await;
    let c = util::append(&store, home, NodeKind::Note, "c").await;

    let mut rx = store.subscribe();
    store.move_node(b, trash).await?;

    let home_children: Vec<(i64, i64)> = store
        .children(Some(home))
        .await?
        .iter()
        .map(|n| (n.id, n.position))
        .collect();
    assert_eq!(home_children, vec![(a, 0), (c, 1)]);

    let trash_children: Vec<(i64, i64)> = store
        .children(Some(trash))
        .await?
        .iter()
        .map(|n| (n.id, n.position))
        .collect();
    assert_eq!(trash_children, vec![(b, 0)]);

    assert_eq!(
        rx.try_recv()?,
        TreeEvent::NodeMoved {
            node_id: b,
            from_parent_id: Some(home),
            to_parent_id: Some(trash),
        }
    );
    Ok(())
}

#[tokio::test]
async fn move_many_prepends_in_input_order() -> Result<()> {
    let store = util::temp_store().await;
    let home = util::home_id(&store).await;
    let trash = store.get_or_create_special(SpecialMode::Trash).await?.id;
    let a = util::append(&store, home, NodeKind::Note, "a").await;
    let b = util::append(&store, home, NodeKind::Note, "b").await;
    let c = util::append(&store, home, NodeKind::Note, "c").await;
    store.move_node(b, trash).await?;

    store.move_nodes(&[c, a], trash).await?;

    let trash_ids: Vec<i64> = store
        .children(Some(trash))
        .await?
        .iter()
        .map(|n| n.id)
        .collect();
    // Moved nodes land ahead of the destination's existing children, in
    // input order.
    assert_eq!(trash_ids, vec![c, a, b]);
    assert!(store.children(Some(home)).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn duplicate_move_ids_collapse_to_one_move() -> Result<()> {
    let store = util::temp_store().await;
    let home = util::home_id(&store).await;
    let trash = store.get_or_create_special(SpecialMode::Trash).await?.id;
    let a = util::append(&store, home, NodeKind::Note, "a").await;
    let b = util::append(&store, home, NodeKind::Note, "b").await;

    let mut rx = store.subscribe();
    store.move_nodes(&[a, a, b, a], trash).await?;

    let trash_children: Vec<(i64, i64)> = store
        .children(Some(trash))
        .await?
        .iter()
        .map(|n| (n.id, n.position))
        .collect();
    assert_eq!(trash_children, vec![(a, 0), (b, 1)]);

    // One notification per distinct node, nothing more.
    for id in [a, b] {
        assert_eq!(
            rx.try_recv()?,
            TreeEvent::NodeMoved {
                node_id: id,
                from_parent_id: Some(home),
                to_parent_id: Some(trash),
            }
        );
    }
    assert!(rx.try_recv().is_err());
    Ok(())
}

#[tokio::test]
async fn move_into_own_subtree_is_rejected() -> Result<()> {
    let store = util::temp_store().await;
    let home = util::home_id(&store).await;
    let outer = util::append(&store, home, NodeKind::Directory, "outer").await;
    let inner = util::append(&store, outer, NodeKind::Directory, "inner").await;

    let err = store.move_node(outer, inner).await.unwrap_err();
    assert_eq!(err.code(), "TREE/INVARIANT");

    let err = store.move_node(outer, outer).await.unwrap_err();
    assert_eq!(err.code(), "TREE/INVARIANT");

    // The rejected moves must not have touched the tree.
    assert_eq!(store.get_node(outer).await?.parent_id, Some(home));
    assert_eq!(store.get_node(inner).await?.parent_id, Some(outer));
    Ok(())
}

#[tokio::test]
async fn move_to_missing_parent_fails() {
    let store = util::temp_store().await;
    let home = util::home_id(&store).await;

    let err = store.move_node(home, 4242).await.unwrap_err();
    assert_eq!(err.code(), "NODE/NOT_FOUND");
}

#[tokio::test]
async fn delete_removes_subtree_and_every_payload_row() -> Result<()> {
    let store = util::temp_store().await;
    let home = util::home_id(&store).await;
    let before = util::append(&store, home, NodeKind::Note, "before").await;
    let dir = util::append(&store, home, NodeKind::Directory, "doomed").await;
    let after = util::append(&store, home, NodeKind::Note, "after").await;
    let child_note = util::append(&store, dir, NodeKind::Note, "x").await;
    let child_box = util::append(&store, dir, NodeKind::Checkbox, "y").await;

    let mut rx = store.subscribe();
    store.delete_recursively(dir).await?;

    for id in [dir, child_note, child_box] {
        let err = store.get_node(id).await.unwrap_err();
        assert_eq!(err.code(), "NODE/NOT_FOUND");
        let mut conn = store.pool().acquire().await?;
        let rows = launchtree_lib::payload::payload_row_count(&mut conn, id).await?;
        assert_eq!(rows, 0);
    }

    let home_children: Vec<(i64, i64)> = store
        .children(Some(home))
        .await?
        .iter()
        .map(|n| (n.id, n.position))
        .collect();
    assert_eq!(home_children, vec![(before, 0), (after, 1)]);

    assert_eq!(
        rx.try_recv()?,
        TreeEvent::NodeDeleted {
            node_id: dir,
            parent_id: Some(home),
        }
    );
    Ok(())
}

#[tokio::test]
async fn delete_missing_node_fails() {
    let store = util::temp_store().await;
    util::home_id(&store).await;

    let err = store.delete_recursively(31337).await.unwrap_err();
    assert_eq!(err.code(), "NODE/NOT_FOUND");
}
