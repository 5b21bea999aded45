//! Node-table CRUD and the store handle itself. Row helpers take a
//! `&mut SqliteConnection` so callers can compose them inside one transaction.

use std::path::Path;

use sqlx::{SqliteConnection, SqlitePool};
use tokio::sync::broadcast;

use crate::events::{TreeEvent, TreeEvents};
use crate::model::Node;
use crate::payload;
use crate::{db, migrate, AppError, AppResult};

/// Single shared store instance per process: pool plus the change channel.
#[derive(Debug)]
pub struct NodeStore {
    pool: SqlitePool,
    events: TreeEvents,
}

impl NodeStore {
    /// Open (creating if missing) the store at `db_path` and bring the schema
    /// up to date.
    pub async fn open(db_path: &Path) -> anyhow::Result<Self> {
        let pool = db::open_sqlite_pool(db_path).await?;
        migrate::apply_migrations(&pool).await?;
        Ok(Self {
            pool,
            events: TreeEvents::new(),
        })
    }

    /// In-memory store, used by tests and throwaway tooling.
    pub async fn open_in_memory() -> anyhow::Result<Self> {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        sqlx::query("PRAGMA foreign_keys=ON;").execute(&pool).await?;
        migrate::apply_migrations(&pool).await?;
        Ok(Self {
            pool,
            events: TreeEvents::new(),
        })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TreeEvent> {
        self.events.subscribe()
    }

    pub(crate) fn emit(&self, event: TreeEvent) {
        self.events.emit(event);
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Fetch one node, failing with `NODE/NOT_FOUND` when absent.
    pub async fn get_node(&self, node_id: i64) -> AppResult<Node> {
        let mut conn = self.pool.acquire().await.map_err(AppError::from)?;
        fetch_node(&mut conn, node_id).await
    }

    /// Ordered children of a parent (`None` selects the root level).
    pub async fn children(&self, parent_id: Option<i64>) -> AppResult<Vec<Node>> {
        let mut conn = self.pool.acquire().await.map_err(AppError::from)?;
        children_of(&mut conn, parent_id).await
    }

    /// Persist a label change and notify subscribers.
    pub async fn update_label(&self, node_id: i64, label: &str) -> AppResult<()> {
        let node = self.get_node(node_id).await?;
        let affected = sqlx::query("UPDATE nodes SET label = ? WHERE id = ?")
            .bind(label)
            .bind(node_id)
            .execute(&self.pool)
            .await
            .map_err(AppError::from)?
            .rows_affected();
        if affected == 0 {
            return Err(AppError::node_not_found(node_id));
        }
        self.emit(TreeEvent::NodeUpdated {
            node_id,
            parent_id: node.parent_id,
        });
        Ok(())
    }

    /// Persist payload field changes and notify subscribers.
    pub async fn update_payload(&self, updated: &crate::model::Payload) -> AppResult<()> {
        let node = self.get_node(updated.node_id()).await?;
        let mut tx = self.pool.begin().await.map_err(AppError::from)?;
        payload::update_payload(&mut *tx, updated).await?;
        tx.commit().await.map_err(AppError::from)?;
        self.emit(TreeEvent::NodeUpdated {
            node_id: node.id,
            parent_id: node.parent_id,
        });
        Ok(())
    }

    /// Fetch the payload for a node, dispatched by the node's declared kind.
    pub async fn get_payload(&self, node_id: i64) -> AppResult<crate::model::Payload> {
        let node = self.get_node(node_id).await?;
        let mut conn = self.pool.acquire().await.map_err(AppError::from)?;
        payload::fetch_payload(&mut conn, node.kind, node_id).await
    }
}

pub async fn fetch_node(conn: &mut SqliteConnection, node_id: i64) -> AppResult<Node> {
    fetch_node_optional(conn, node_id)
        .await?
        .ok_or_else(|| AppError::node_not_found(node_id))
}

pub async fn fetch_node_optional(
    conn: &mut SqliteConnection,
    node_id: i64,
) -> AppResult<Option<Node>> {
    let row = sqlx::query("SELECT id, parent_id, kind, position, label FROM nodes WHERE id = ?")
        .bind(node_id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(AppError::from)?;
    row.as_ref().map(Node::try_from).transpose()
}

/// Siblings ordered by `(position, id)`; the id tiebreak keeps reads
/// deterministic even while the dense-order invariant is being repaired.
pub async fn children_of(
    conn: &mut SqliteConnection,
    parent_id: Option<i64>,
) -> AppResult<Vec<Node>> {
    let rows = sqlx::query(
        "SELECT id, parent_id, kind, position, label FROM nodes \
         WHERE parent_id IS ? ORDER BY position, id",
    )
    .bind(parent_id)
    .fetch_all(&mut *conn)
    .await
    .map_err(AppError::from)?;
    rows.iter().map(Node::try_from).collect()
}

pub async fn max_position(
    conn: &mut SqliteConnection,
    parent_id: Option<i64>,
) -> AppResult<Option<i64>> {
    sqlx::query_scalar("SELECT MAX(position) FROM nodes WHERE parent_id IS ?")
        .bind(parent_id)
        .fetch_one(&mut *conn)
        .await
        .map_err(AppError::from)
}

/// Insert a node row. A non-negative `node.id` is ignored and SQLite assigns
/// the rowid; the sentinel root id `-1` is inserted explicitly.
pub async fn insert_node(conn: &mut SqliteConnection, node: &Node) -> AppResult<i64> {
    if node.id < 0 {
        sqlx::query("INSERT INTO nodes (id, parent_id, kind, position, label) VALUES (?, ?, ?, ?, ?)")
            .bind(node.id)
            .bind(node.parent_id)
            .bind(node.kind.as_str())
            .bind(node.position)
            .bind(&node.label)
            .execute(&mut *conn)
            .await
            .map_err(AppError::from)?;
        Ok(node.id)
    } else {
        let result = sqlx::query(
            "INSERT INTO nodes (parent_id, kind, position, label) VALUES (?, ?, ?, ?)",
        )
        .bind(node.parent_id)
        .bind(node.kind.as_str())
        .bind(node.position)
        .bind(&node.label)
        .execute(&mut *conn)
        .await
        .map_err(AppError::from)?;
        Ok(result.last_insert_rowid())
    }
}

pub async fn set_parent_and_position(
    conn: &mut SqliteConnection,
    node_id: i64,
    parent_id: Option<i64>,
    position: i64,
) -> AppResult<()> {
    let affected = sqlx::query("UPDATE nodes SET parent_id = ?, position = ? WHERE id = ?")
        .bind(parent_id)
        .bind(position)
        .bind(node_id)
        .execute(&mut *conn)
        .await
        .map_err(AppError::from)?
        .rows_affected();
    if affected == 0 {
        return Err(AppError::node_not_found(node_id));
    }
    Ok(())
}

pub async fn delete_node_row(conn: &mut SqliteConnection, node_id: i64) -> AppResult<()> {
    sqlx::query("DELETE FROM nodes WHERE id = ?")
        .bind(node_id)
        .execute(&mut *conn)
        .await
        .map_err(AppError::from)?;
    Ok(())
}

/// Postcondition check for structural mutations: sibling positions must be
/// exactly `{0, …, n-1}`.
pub async fn ensure_dense_order(
    conn: &mut SqliteConnection,
    parent_id: Option<i64>,
) -> AppResult<()> {
    let siblings = children_of(conn, parent_id).await?;
    for (index, node) in siblings.iter().enumerate() {
        if node.position != index as i64 {
            return Err(AppError::invariant("Sibling order is not dense")
                .with_context(
                    "parent_id",
                    parent_id.map_or_else(|| "null".into(), |id| id.to_string()),
                )
                .with_context("node_id", node.id.to_string())
                .with_context("position", node.position.to_string())
                .with_context("expected", index.to_string()));
        }
    }
    Ok(())
}
