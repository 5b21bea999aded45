//! Get-or-create resolution for fixed-role directories (Root, Home, Trash,
//! Applications, New Applications). At most one directory per role may exist;
//! two is data corruption and fails hard.

use sqlx::SqliteConnection;

use crate::events::TreeEvent;
use crate::model::{
    DirectoryPayload, Node, NodeKind, Payload, PermissionMap, SpecialMode, ROOT_NODE_ID,
};
use crate::order::fix_order_for_parent;
use crate::payload::{self, directory_nodes_with_mode};
use crate::store::{ensure_dense_order, fetch_node, insert_node, max_position, NodeStore};
use crate::{AppError, AppResult};

impl NodeStore {
    /// Return the directory carrying `mode`, creating it if absent.
    /// Idempotent: repeated calls return the same node.
    pub async fn get_or_create_special(&self, mode: SpecialMode) -> AppResult<Node> {
        let mut tx = self.pool().begin().await.map_err(AppError::from)?;

        let existing = directory_nodes_with_mode(&mut tx, mode).await?;
        match existing.len() {
            1 => {
                let node = fetch_node(&mut tx, existing[0]).await?;
                tx.commit().await.map_err(AppError::from)?;
                return Ok(node);
            }
            0 => {}
            n => {
                return Err(AppError::invariant("Duplicate singleton directory")
                    .with_context("special_mode", mode.as_str())
                    .with_context("count", n.to_string()));
            }
        }

        let node_id = if mode == SpecialMode::Root {
            create_root(&mut tx).await?
        } else {
            let root_id = ensure_root(&mut tx).await?;
            let position = max_position(&mut tx, Some(root_id)).await?.map_or(0, |p| p + 1);
            let node = Node {
                id: 0,
                parent_id: Some(root_id),
                kind: NodeKind::Directory,
                position,
                label: mode.label().to_string(),
            };
            let node_id = insert_node(&mut tx, &node).await?;
            insert_directory_payload(&mut tx, node_id, mode).await?;
            fix_order_for_parent(&mut tx, Some(root_id)).await?;
            ensure_dense_order(&mut tx, Some(root_id)).await?;
            node_id
        };

        let node = fetch_node(&mut tx, node_id).await?;
        tx.commit().await.map_err(AppError::from)?;
        tracing::info!(
            target: "launchtree",
            event = "special_directory_created",
            special_mode = mode.as_str(),
            node_id,
        );
        self.emit(TreeEvent::NodeCreated {
            node_id,
            parent_id: node.parent_id,
        });
        Ok(node)
    }
}

/// The sentinel root row: fixed id, no parent.
async fn create_root(conn: &mut SqliteConnection) -> AppResult<i64> {
    let node = Node {
        id: ROOT_NODE_ID,
        parent_id: None,
        kind: NodeKind::Directory,
        position: 0,
        label: SpecialMode::Root.label().to_string(),
    };
    let node_id = insert_node(conn, &node).await?;
    insert_directory_payload(conn, node_id, SpecialMode::Root).await?;
    Ok(node_id)
}

async fn ensure_root(conn: &mut SqliteConnection) -> AppResult<i64> {
    let existing = directory_nodes_with_mode(conn, SpecialMode::Root).await?;
    match existing.len() {
        0 => create_root(conn).await,
        1 => Ok(existing[0]),
        n => Err(AppError::invariant("Duplicate singleton directory")
            .with_context("special_mode", SpecialMode::Root.as_str())
            .with_context("count", n.to_string())),
    }
}

async fn insert_directory_payload(
    conn: &mut SqliteConnection,
    node_id: i64,
    mode: SpecialMode,
) -> AppResult<()> {
    payload::insert_payload(
        conn,
        &Payload::Directory(DirectoryPayload {
            node_id,
            special_mode: Some(mode),
            collapsed: false,
            initially_visible: true,
            permissions: PermissionMap::default(),
        }),
    )
    .await
}
