//! Per-kind payload storage. Every node owns exactly one row in the payload
//! table matching its kind; all dispatch is an exhaustive match over
//! [`NodeKind`], never runtime type inspection.

use sqlx::{Row, SqliteConnection};

use crate::model::{
    ApplicationPayload, CheckboxPayload, DirectoryPayload, FilePayload, LocationPayload, NodeKind,
    NotePayload, Payload, PermissionMap, ReferencePayload, ReminderPayload, SettingPayload,
    SpecialMode, WebLinkPayload,
};
use crate::{AppError, AppResult};

/// Payload table for a kind, used by recursive deletes and integrity checks.
pub fn table_for(kind: NodeKind) -> &'static str {
    match kind {
        NodeKind::Directory => "directory_payloads",
        NodeKind::Application => "application_payloads",
        NodeKind::Checkbox => "checkbox_payloads",
        NodeKind::File => "file_payloads",
        NodeKind::Location => "location_payloads",
        NodeKind::Note => "note_payloads",
        NodeKind::Reference => "reference_payloads",
        NodeKind::Reminder => "reminder_payloads",
        NodeKind::Setting => "setting_payloads",
        NodeKind::WebLink => "web_link_payloads",
    }
}

async fn declared_kind(conn: &mut SqliteConnection, node_id: i64) -> AppResult<NodeKind> {
    let kind: Option<String> = sqlx::query_scalar("SELECT kind FROM nodes WHERE id = ?")
        .bind(node_id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(AppError::from)?;
    match kind {
        Some(kind) => kind.parse(),
        None => Err(AppError::node_not_found(node_id)),
    }
}

/// Reject a payload whose runtime variant disagrees with the node row's kind.
async fn ensure_kind_matches(conn: &mut SqliteConnection, payload: &Payload) -> AppResult<()> {
    let declared = declared_kind(conn, payload.node_id()).await?;
    if declared != payload.kind() {
        return Err(AppError::new(
            AppError::INVALID_KIND,
            "Payload variant does not match the node's declared kind",
        )
        .with_context("node_id", payload.node_id().to_string())
        .with_context("declared", declared.as_str())
        .with_context("payload", payload.kind().as_str()));
    }
    Ok(())
}

pub async fn insert_payload(conn: &mut SqliteConnection, payload: &Payload) -> AppResult<()> {
    ensure_kind_matches(conn, payload).await?;
    write_payload(conn, payload, WriteMode::Insert).await
}

pub async fn update_payload(conn: &mut SqliteConnection, payload: &Payload) -> AppResult<()> {
    ensure_kind_matches(conn, payload).await?;
    write_payload(conn, payload, WriteMode::Update).await
}

#[derive(Clone, Copy)]
enum WriteMode {
    Insert,
    Update,
}

async fn write_payload(
    conn: &mut SqliteConnection,
    payload: &Payload,
    mode: WriteMode,
) -> AppResult<()> {
    let affected = match payload {
        Payload::Directory(p) => {
            let mode_str = p.special_mode.map(SpecialMode::as_str);
            let permissions = p.permissions.to_json()?;
            let sql = match mode {
                WriteMode::Insert => {
                    "INSERT INTO directory_payloads \
                     (node_id, special_mode, collapsed, initially_visible, permissions) \
                     VALUES (?, ?, ?, ?, ?)"
                }
                WriteMode::Update => {
                    "UPDATE directory_payloads SET special_mode = ?2, collapsed = ?3, \
                     initially_visible = ?4, permissions = ?5 WHERE node_id = ?1"
                }
            };
            sqlx::query(sql)
                .bind(p.node_id)
                .bind(mode_str)
                .bind(p.collapsed as i64)
                .bind(p.initially_visible as i64)
                .bind(permissions)
                .execute(&mut *conn)
                .await
                .map_err(AppError::from)?
                .rows_affected()
        }
        Payload::Application(p) => {
            let sql = match mode {
                WriteMode::Insert => {
                    "INSERT INTO application_payloads (node_id, package, activity) VALUES (?, ?, ?)"
                }
                WriteMode::Update => {
                    "UPDATE application_payloads SET package = ?2, activity = ?3 WHERE node_id = ?1"
                }
            };
            sqlx::query(sql)
                .bind(p.node_id)
                .bind(&p.package)
                .bind(&p.activity)
                .execute(&mut *conn)
                .await
                .map_err(AppError::from)?
                .rows_affected()
        }
        Payload::Checkbox(p) => {
            let sql = match mode {
                WriteMode::Insert => {
                    "INSERT INTO checkbox_payloads (node_id, checked) VALUES (?, ?)"
                }
                WriteMode::Update => "UPDATE checkbox_payloads SET checked = ?2 WHERE node_id = ?1",
            };
            sqlx::query(sql)
                .bind(p.node_id)
                .bind(p.checked as i64)
                .execute(&mut *conn)
                .await
                .map_err(AppError::from)?
                .rows_affected()
        }
        Payload::File(p) => {
            let sql = match mode {
                WriteMode::Insert => "INSERT INTO file_payloads (node_id, path) VALUES (?, ?)",
                WriteMode::Update => "UPDATE file_payloads SET path = ?2 WHERE node_id = ?1",
            };
            sqlx::query(sql)
                .bind(p.node_id)
                .bind(&p.path)
                .execute(&mut *conn)
                .await
                .map_err(AppError::from)?
                .rows_affected()
        }
        Payload::Location(p) => {
            let sql = match mode {
                WriteMode::Insert => {
                    "INSERT INTO location_payloads (node_id, latitude, longitude) VALUES (?, ?, ?)"
                }
                WriteMode::Update => {
                    "UPDATE location_payloads SET latitude = ?2, longitude = ?3 WHERE node_id = ?1"
                }
            };
            sqlx::query(sql)
                .bind(p.node_id)
                .bind(p.latitude)
                .bind(p.longitude)
                .execute(&mut *conn)
                .await
                .map_err(AppError::from)?
                .rows_affected()
        }
        Payload::Note(p) => {
            let sql = match mode {
                WriteMode::Insert => "INSERT INTO note_payloads (node_id, body) VALUES (?, ?)",
                WriteMode::Update => "UPDATE note_payloads SET body = ?2 WHERE node_id = ?1",
            };
            sqlx::query(sql)
                .bind(p.node_id)
                .bind(&p.body)
                .execute(&mut *conn)
                .await
                .map_err(AppError::from)?
                .rows_affected()
        }
        Payload::Reference(p) => {
            let sql = match mode {
                WriteMode::Insert => {
                    "INSERT INTO reference_payloads (node_id, target_id) VALUES (?, ?)"
                }
                WriteMode::Update => {
                    "UPDATE reference_payloads SET target_id = ?2 WHERE node_id = ?1"
                }
            };
            sqlx::query(sql)
                .bind(p.node_id)
                .bind(p.target_id)
                .execute(&mut *conn)
                .await
                .map_err(AppError::from)?
                .rows_affected()
        }
        Payload::Reminder(p) => {
            let sql = match mode {
                WriteMode::Insert => {
                    "INSERT INTO reminder_payloads (node_id, due_at, fired) VALUES (?, ?, ?)"
                }
                WriteMode::Update => {
                    "UPDATE reminder_payloads SET due_at = ?2, fired = ?3 WHERE node_id = ?1"
                }
            };
            sqlx::query(sql)
                .bind(p.node_id)
                .bind(p.due_at)
                .bind(p.fired as i64)
                .execute(&mut *conn)
                .await
                .map_err(AppError::from)?
                .rows_affected()
        }
        Payload::Setting(p) => {
            let sql = match mode {
                WriteMode::Insert => {
                    "INSERT INTO setting_payloads (node_id, setting_key) VALUES (?, ?)"
                }
                WriteMode::Update => {
                    "UPDATE setting_payloads SET setting_key = ?2 WHERE node_id = ?1"
                }
            };
            sqlx::query(sql)
                .bind(p.node_id)
                .bind(&p.setting_key)
                .execute(&mut *conn)
                .await
                .map_err(AppError::from)?
                .rows_affected()
        }
        Payload::WebLink(p) => {
            let sql = match mode {
                WriteMode::Insert => "INSERT INTO web_link_payloads (node_id, url) VALUES (?, ?)",
                WriteMode::Update => "UPDATE web_link_payloads SET url = ?2 WHERE node_id = ?1",
            };
            sqlx::query(sql)
                .bind(p.node_id)
                .bind(&p.url)
                .execute(&mut *conn)
                .await
                .map_err(AppError::from)?
                .rows_affected()
        }
    };

    if matches!(mode, WriteMode::Update) && affected == 0 {
        return Err(AppError::node_not_found(payload.node_id())
            .with_context("operation", "update_payload"));
    }
    Ok(())
}

pub async fn delete_payload(
    conn: &mut SqliteConnection,
    kind: NodeKind,
    node_id: i64,
) -> AppResult<()> {
    let sql = format!("DELETE FROM {} WHERE node_id = ?", table_for(kind));
    sqlx::query(&sql)
        .bind(node_id)
        .execute(&mut *conn)
        .await
        .map_err(AppError::from)?;
    Ok(())
}

pub async fn fetch_payload(
    conn: &mut SqliteConnection,
    kind: NodeKind,
    node_id: i64,
) -> AppResult<Payload> {
    let sql = format!("SELECT * FROM {} WHERE node_id = ?", table_for(kind));
    let row = sqlx::query(&sql)
        .bind(node_id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(AppError::from)?
        .ok_or_else(|| {
            AppError::node_not_found(node_id)
                .with_context("operation", "fetch_payload")
                .with_context("kind", kind.as_str())
        })?;

    let payload = match kind {
        NodeKind::Directory => {
            let mode: Option<String> = row.try_get("special_mode").map_err(AppError::from)?;
            let raw_permissions: String = row.try_get("permissions").map_err(AppError::from)?;
            Payload::Directory(DirectoryPayload {
                node_id,
                special_mode: mode.as_deref().map(str::parse).transpose()?,
                collapsed: row.try_get::<i64, _>("collapsed").map_err(AppError::from)? != 0,
                initially_visible: row
                    .try_get::<i64, _>("initially_visible")
                    .map_err(AppError::from)?
                    != 0,
                permissions: PermissionMap::from_json(&raw_permissions)?,
            })
        }
        NodeKind::Application => Payload::Application(ApplicationPayload {
            node_id,
            package: row.try_get("package").map_err(AppError::from)?,
            activity: row.try_get("activity").map_err(AppError::from)?,
        }),
        NodeKind::Checkbox => Payload::Checkbox(CheckboxPayload {
            node_id,
            checked: row.try_get::<i64, _>("checked").map_err(AppError::from)? != 0,
        }),
        NodeKind::File => Payload::File(FilePayload {
            node_id,
            path: row.try_get("path").map_err(AppError::from)?,
        }),
        NodeKind::Location => Payload::Location(LocationPayload {
            node_id,
            latitude: row.try_get("latitude").map_err(AppError::from)?,
            longitude: row.try_get("longitude").map_err(AppError::from)?,
        }),
        NodeKind::Note => Payload::Note(NotePayload {
            node_id,
            body: row.try_get("body").map_err(AppError::from)?,
        }),
        NodeKind::Reference => Payload::Reference(ReferencePayload {
            node_id,
            target_id: row
                .try_get::<Option<i64>, _>("target_id")
                .map_err(AppError::from)?,
        }),
        NodeKind::Reminder => Payload::Reminder(ReminderPayload {
            node_id,
            due_at: row
                .try_get::<Option<i64>, _>("due_at")
                .map_err(AppError::from)?,
            fired: row.try_get::<i64, _>("fired").map_err(AppError::from)? != 0,
        }),
        NodeKind::Setting => Payload::Setting(SettingPayload {
            node_id,
            setting_key: row.try_get("setting_key").map_err(AppError::from)?,
        }),
        NodeKind::WebLink => Payload::WebLink(WebLinkPayload {
            node_id,
            url: row.try_get("url").map_err(AppError::from)?,
        }),
    };
    Ok(payload)
}

/// Node ids of directory payloads carrying `mode`, ordered for determinism.
pub async fn directory_nodes_with_mode(
    conn: &mut SqliteConnection,
    mode: SpecialMode,
) -> AppResult<Vec<i64>> {
    sqlx::query_scalar(
        "SELECT node_id FROM directory_payloads WHERE special_mode = ? ORDER BY node_id",
    )
    .bind(mode.as_str())
    .fetch_all(&mut *conn)
    .await
    .map_err(AppError::from)
}

/// Total payload rows across all kind tables for one node. The one-payload
/// invariant requires this to be exactly 1 for every live node.
pub async fn payload_row_count(conn: &mut SqliteConnection, node_id: i64) -> AppResult<i64> {
    let mut total = 0_i64;
    for kind in NodeKind::ALL {
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE node_id = ?",
            table_for(kind)
        );
        let count: i64 = sqlx::query_scalar(&sql)
            .bind(node_id)
            .fetch_one(&mut *conn)
            .await
            .map_err(AppError::from)?;
        total += count;
    }
    Ok(total)
}
