//! Append-only change history for client records.
//!
//! One row per changed field, written inside the same transaction as
//! the update that produced it, so an update and its audit trail
//! commit or roll back together.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{SqliteConnection, SqlitePool};

use crate::client::ClientKind;
use crate::error::Result;

/// A single recorded field change.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ChangeHistoryEntry {
    pub id: i64,
    pub client_id: i64,
    pub client_kind: ClientKind,
    pub field: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub actor: String,
    pub changed_at: DateTime<Utc>,
}

/// Append one change row on the caller's transaction.
pub(crate) async fn append(
    conn: &mut SqliteConnection,
    client_id: i64,
    client_kind: ClientKind,
    field: &str,
    old_value: Option<&str>,
    new_value: Option<&str>,
    actor: &str,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO change_history
            (client_id, client_kind, field, old_value, new_value, actor, changed_at)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(client_id)
    .bind(client_kind)
    .bind(field)
    .bind(old_value)
    .bind(new_value)
    .bind(actor)
    .bind(Utc::now())
    .execute(conn)
    .await?;
    Ok(())
}

/// Change history for one client, newest first.
pub async fn for_client(
    pool: &SqlitePool,
    client_id: i64,
    client_kind: ClientKind,
) -> Result<Vec<ChangeHistoryEntry>> {
    let entries = sqlx::query_as(
        "SELECT * FROM change_history
         WHERE client_id = ? AND client_kind = ?
         ORDER BY changed_at DESC, id DESC",
    )
    .bind(client_id)
    .bind(client_kind)
    .fetch_all(pool)
    .await?;
    Ok(entries)
}
