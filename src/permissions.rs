//! Recursive permission evaluation over directory payloads. A node's own
//! directory payload gates the requested scope; strict ancestors gate only
//! through their Recursive entries. The first denial found wins.

use crate::model::{NodeKind, Payload, PermissionKind, PermissionScope};
use crate::payload::fetch_payload;
use crate::store::NodeStore;
use crate::{AppError, AppResult};

impl NodeStore {
    /// `true` when neither the node itself nor any strict ancestor directory
    /// denies `kind` for the relevant scope.
    pub async fn check_permission(
        &self,
        kind: PermissionKind,
        scope: PermissionScope,
        node_id: i64,
    ) -> AppResult<bool> {
        let node = self.get_node(node_id).await?;

        if node.kind == NodeKind::Directory {
            let payload = {
                let mut conn = self.pool().acquire().await.map_err(AppError::from)?;
                fetch_payload(&mut conn, NodeKind::Directory, node.id).await?
            };
            if let Payload::Directory(dir) = payload {
                if !dir.permissions.allows(kind, scope) {
                    return Ok(false);
                }
            }
        }

        // Ancestors gate all descendants via Recursive, regardless of the
        // requested scope; this mirrors the literal evaluation order of the
        // directory tree, not an AND/override generalization.
        let ancestors = {
            let mut lineage = self.node_lineage(node_id).await?;
            lineage.pop();
            lineage
        };

        for ancestor in ancestors.iter().rev() {
            if ancestor.kind != NodeKind::Directory {
                continue;
            }
            let payload = {
                let mut conn = self.pool().acquire().await.map_err(AppError::from)?;
                fetch_payload(&mut conn, NodeKind::Directory, ancestor.id).await?
            };
            if let Payload::Directory(dir) = payload {
                if !dir.permissions.allows(kind, PermissionScope::Recursive) {
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }
}
