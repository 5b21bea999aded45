//! Dense sibling-order maintenance. After any structural change the caller
//! re-normalizes the affected sibling sets inside the same transaction.

use sqlx::SqliteConnection;

use crate::model::Node;
use crate::store::children_of;
use crate::{AppError, AppResult};

/// Sort by `(position, id)` and reassign `position = index`. Idempotent; the
/// id tiebreak makes the result deterministic for any input permutation.
pub fn fix_order(siblings: &mut [Node]) {
    siblings.sort_by_key(|node| (node.position, node.id));
    for (index, node) in siblings.iter_mut().enumerate() {
        node.position = index as i64;
    }
}

/// Normalize one parent's sibling set in the caller's transaction, rewriting
/// only rows whose position actually changed.
pub async fn fix_order_for_parent(
    conn: &mut SqliteConnection,
    parent_id: Option<i64>,
) -> AppResult<()> {
    let mut siblings = children_of(conn, parent_id).await?;
    let before: Vec<(i64, i64)> = siblings.iter().map(|n| (n.id, n.position)).collect();
    fix_order(&mut siblings);

    for (node, (id, old_position)) in siblings.iter().zip(before) {
        debug_assert_eq!(node.id, id);
        if node.position == old_position {
            continue;
        }
        sqlx::query("UPDATE nodes SET position = ? WHERE id = ?")
            .bind(node.position)
            .bind(node.id)
            .execute(&mut *conn)
            .await
            .map_err(AppError::from)?;
    }
    Ok(())
}
