//! Structural mutations: create, move, recursive delete. Every operation is
//! one exclusive transaction; on success exactly one change notification is
//! emitted per input node, after commit.

use std::collections::HashSet;

use sqlx::SqliteConnection;

use crate::events::TreeEvent;
use crate::model::{Node, NodeKind, Payload};
use crate::order::fix_order_for_parent;
use crate::payload;
use crate::store::{
    children_of, delete_node_row, ensure_dense_order, fetch_node, insert_node, max_position,
    set_parent_and_position, NodeStore,
};
use crate::{AppError, AppResult};

/// Placement of a new node relative to an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offset {
    Above,
    Within,
    Below,
}

#[derive(Debug, Clone, Copy)]
pub struct NodePosition {
    pub relative_to: i64,
    pub offset: Offset,
}

impl NodePosition {
    pub fn above(node_id: i64) -> Self {
        Self {
            relative_to: node_id,
            offset: Offset::Above,
        }
    }

    pub fn within(node_id: i64) -> Self {
        Self {
            relative_to: node_id,
            offset: Offset::Within,
        }
    }

    pub fn below(node_id: i64) -> Self {
        Self {
            relative_to: node_id,
            offset: Offset::Below,
        }
    }
}

impl NodeStore {
    /// Create a node of `kind` relative to an existing node, with a default
    /// payload and the kind's default label. Returns the new node's id.
    pub async fn create_node(&self, position: NodePosition, kind: NodeKind) -> AppResult<i64> {
        let mut tx = self.pool().begin().await.map_err(AppError::from)?;

        let reference = fetch_node(&mut tx, position.relative_to).await?;
        // A sibling of the parentless sentinel would be a second root.
        if reference.parent_id.is_none() && position.offset != Offset::Within {
            return Err(
                AppError::invariant("Cannot create a sibling of the root node")
                    .with_context("relative_to", reference.id.to_string()),
            );
        }
        let (target_parent, target_position) = match position.offset {
            Offset::Within => (Some(reference.id), 0),
            Offset::Above => (reference.parent_id, reference.position),
            Offset::Below => (reference.parent_id, reference.position + 1),
        };

        // Make room, then let fix_order close any remaining gap.
        sqlx::query("UPDATE nodes SET position = position + 1 WHERE parent_id IS ? AND position >= ?")
            .bind(target_parent)
            .bind(target_position)
            .execute(&mut *tx)
            .await
            .map_err(AppError::from)?;

        let node = Node {
            id: 0,
            parent_id: target_parent,
            kind,
            position: target_position,
            label: kind.default_label(),
        };
        let node_id = insert_node(&mut tx, &node).await?;
        payload::insert_payload(&mut tx, &Payload::default_for(kind, node_id)).await?;

        fix_order_for_parent(&mut tx, target_parent).await?;
        ensure_dense_order(&mut tx, target_parent).await?;

        tx.commit().await.map_err(AppError::from)?;
        tracing::debug!(
            target: "launchtree",
            event = "node_created",
            node_id,
            kind = %kind,
        );
        self.emit(TreeEvent::NodeCreated {
            node_id,
            parent_id: target_parent,
        });
        Ok(node_id)
    }

    /// Append a node as the last child of `parent_id`, applying mutation
    /// closures to the node row and its payload before insert.
    pub async fn create_node_with_payload(
        &self,
        parent_id: i64,
        kind: NodeKind,
        label: &str,
        node_fn: impl FnOnce(&mut Node),
        payload_fn: impl FnOnce(&mut Payload),
    ) -> AppResult<i64> {
        let mut tx = self.pool().begin().await.map_err(AppError::from)?;

        fetch_node(&mut tx, parent_id).await?;
        let next_position = max_position(&mut tx, Some(parent_id)).await?.map_or(0, |p| p + 1);

        let mut node = Node {
            id: 0,
            parent_id: Some(parent_id),
            kind,
            position: next_position,
            label: label.to_string(),
        };
        node_fn(&mut node);
        // The callback may adjust the label or kind-agnostic fields; placement
        // is owned by this operation.
        node.parent_id = Some(parent_id);
        node.position = next_position;
        node.kind = kind;

        let node_id = insert_node(&mut tx, &node).await?;
        let mut payload = Payload::default_for(kind, node_id);
        payload_fn(&mut payload);
        payload::insert_payload(&mut tx, &payload).await?;

        ensure_dense_order(&mut tx, Some(parent_id)).await?;

        tx.commit().await.map_err(AppError::from)?;
        self.emit(TreeEvent::NodeCreated {
            node_id,
            parent_id: Some(parent_id),
        });
        Ok(node_id)
    }

    /// Reparent one node under `new_parent_id`. The moved node lands ahead of
    /// the destination's existing children.
    pub async fn move_node(&self, node_id: i64, new_parent_id: i64) -> AppResult<()> {
        self.move_nodes(&[node_id], new_parent_id).await
    }

    /// Reparent several nodes at once, preserving their relative input order.
    /// All source parents are re-indexed once each, inside one transaction.
    pub async fn move_nodes(&self, node_ids: &[i64], new_parent_id: i64) -> AppResult<()> {
        if node_ids.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool().begin().await.map_err(AppError::from)?;

        fetch_node(&mut tx, new_parent_id).await?;

        // First occurrence wins; a repeated id is still one move and one
        // notification.
        let mut seen: HashSet<i64> = HashSet::new();
        let mut moved: Vec<Node> = Vec::with_capacity(node_ids.len());
        for &id in node_ids {
            if !seen.insert(id) {
                continue;
            }
            let node = fetch_node(&mut tx, id).await?;
            ensure_not_in_subtree(&mut tx, node.id, new_parent_id).await?;
            moved.push(node);
        }

        // Temporary negative positions: fix_order then slots the moved nodes
        // ahead of the destination's existing children, in input order.
        let count = moved.len() as i64;
        for (index, node) in moved.iter().enumerate() {
            set_parent_and_position(&mut tx, node.id, Some(new_parent_id), index as i64 - count)
                .await?;
        }

        // Group the source parents so each sibling set is re-ordered once.
        let source_parents: HashSet<Option<i64>> =
            moved.iter().map(|node| node.parent_id).collect();
        for parent in &source_parents {
            if *parent == Some(new_parent_id) {
                continue;
            }
            fix_order_for_parent(&mut tx, *parent).await?;
        }
        fix_order_for_parent(&mut tx, Some(new_parent_id)).await?;

        for parent in &source_parents {
            ensure_dense_order(&mut tx, *parent).await?;
        }
        ensure_dense_order(&mut tx, Some(new_parent_id)).await?;

        tx.commit().await.map_err(AppError::from)?;
        for node in &moved {
            self.emit(TreeEvent::NodeMoved {
                node_id: node.id,
                from_parent_id: node.parent_id,
                to_parent_id: Some(new_parent_id),
            });
        }
        Ok(())
    }

    /// Delete a node, its entire subtree and every payload row, then repair
    /// the former parent's sibling order.
    pub async fn delete_recursively(&self, node_id: i64) -> AppResult<()> {
        let mut tx = self.pool().begin().await.map_err(AppError::from)?;

        let node = fetch_node(&mut tx, node_id).await?;
        let doomed = collect_subtree(&mut tx, &node).await?;

        // Leaves first so the parent FK never dangles mid-delete.
        for entry in doomed.iter().rev() {
            payload::delete_payload(&mut tx, entry.kind, entry.id).await?;
            delete_node_row(&mut tx, entry.id).await?;
        }

        fix_order_for_parent(&mut tx, node.parent_id).await?;
        ensure_dense_order(&mut tx, node.parent_id).await?;

        tx.commit().await.map_err(AppError::from)?;
        tracing::debug!(
            target: "launchtree",
            event = "subtree_deleted",
            node_id,
            removed = doomed.len(),
        );
        self.emit(TreeEvent::NodeDeleted {
            node_id,
            parent_id: node.parent_id,
        });
        Ok(())
    }
}

/// Iterative subtree collection with a visited guard; a parent cycle is
/// data corruption, not a traversal to follow. Parents precede descendants
/// in the returned order.
async fn collect_subtree(conn: &mut SqliteConnection, root: &Node) -> AppResult<Vec<Node>> {
    let mut visited: HashSet<i64> = HashSet::new();
    let mut ordered: Vec<Node> = Vec::new();
    let mut queue: Vec<Node> = vec![root.clone()];

    while let Some(node) = queue.pop() {
        if !visited.insert(node.id) {
            return Err(AppError::invariant("Cycle detected in parent chain")
                .with_context("node_id", node.id.to_string()));
        }
        let children = children_of(conn, Some(node.id)).await?;
        ordered.push(node);
        queue.extend(children);
    }
    Ok(ordered)
}

/// Reject a move that would place a node inside its own subtree.
async fn ensure_not_in_subtree(
    conn: &mut SqliteConnection,
    node_id: i64,
    candidate_parent: i64,
) -> AppResult<()> {
    if node_id == candidate_parent {
        return Err(AppError::invariant("Cannot move a node into itself")
            .with_context("node_id", node_id.to_string()));
    }
    let mut current = candidate_parent;
    let mut visited: HashSet<i64> = HashSet::new();
    loop {
        if !visited.insert(current) {
            return Err(AppError::invariant("Cycle detected in parent chain")
                .with_context("node_id", current.to_string()));
        }
        let node = fetch_node(conn, current).await?;
        match node.parent_id {
            Some(parent) if parent == node_id => {
                return Err(
                    AppError::invariant("Cannot move a node into its own subtree")
                        .with_context("node_id", node_id.to_string())
                        .with_context("new_parent_id", candidate_parent.to_string()),
                );
            }
            Some(parent) => current = parent,
            None => return Ok(()),
        }
    }
}
