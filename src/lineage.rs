//! Root-to-node path resolution and upward traversal. Walks are explicit
//! bounded loops; a malformed parent cycle aborts with a corruption error
//! instead of looping forever.

use std::collections::HashSet;

use crate::model::Node;
use crate::store::NodeStore;
use crate::{AppError, AppResult};

impl NodeStore {
    /// Ordered root-to-node path, the node itself last.
    pub async fn node_lineage(&self, node_id: i64) -> AppResult<Vec<Node>> {
        let mut lineage: Vec<Node> = Vec::new();
        self.traverse_upward(node_id, true, |node| {
            lineage.push(node.clone());
            true
        })
        .await?;
        lineage.reverse();
        Ok(lineage)
    }

    /// Call `visit` on the node (when `include_first`) and then on each
    /// ancestor in turn, stopping early when `visit` returns false or the
    /// root is reached.
    pub async fn traverse_upward(
        &self,
        node_id: i64,
        include_first: bool,
        mut visit: impl FnMut(&Node) -> bool,
    ) -> AppResult<()> {
        let mut visited: HashSet<i64> = HashSet::new();
        let mut current = self.get_node(node_id).await?;

        if include_first {
            visited.insert(current.id);
            if !visit(&current) {
                return Ok(());
            }
        } else {
            visited.insert(current.id);
        }

        while let Some(parent_id) = current.parent_id {
            if !visited.insert(parent_id) {
                return Err(AppError::invariant("Cycle detected in parent chain")
                    .with_context("node_id", node_id.to_string())
                    .with_context("repeated_id", parent_id.to_string()));
            }
            current = self.get_node(parent_id).await?;
            if !visit(&current) {
                return Ok(());
            }
        }
        Ok(())
    }
}
