//! SQLite persistent store: schema creation, in-place migration and
//! orphan cleanup.

mod schema;

pub use schema::{init_schema, migrate, purge_orphans, PurgeReport};

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

use crate::error::Result;

/// Open a pool against the given SQLite URL and bring the schema up to date.
pub async fn connect(url: &str, max_connections: u32) -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect(url)
        .await?;
    init_schema(&pool).await?;
    migrate(&pool).await?;
    Ok(pool)
}
