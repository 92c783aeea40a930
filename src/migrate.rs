use sqlx::SqlitePool;

use crate::error::Result;

/// Drop and recreate the index schema.
///
/// `entries` holds one row per chunk; its implicit `rowid` is the insertion
/// order and breaks score ties at query time. `meta` is a key/value table
/// describing the build. The `ready` key is written last.
pub async fn reset_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query("DROP TABLE IF EXISTS entries")
        .execute(pool)
        .await?;
    sqlx::query("DROP TABLE IF EXISTS meta").execute(pool).await?;

    sqlx::query(
        r#"
        CREATE TABLE entries (
            id TEXT NOT NULL UNIQUE,
            source_path TEXT NOT NULL,
            char_offset INTEGER NOT NULL,
            char_length INTEGER NOT NULL,
            text TEXT NOT NULL,
            hash TEXT NOT NULL,
            embedding BLOB NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX idx_entries_source_path ON entries(source_path)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Whether the schema exists at all (an interrupted build may leave an
/// empty file behind).
pub async fn has_schema(pool: &SqlitePool) -> Result<bool> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name IN ('entries', 'meta')",
    )
    .fetch_one(pool)
    .await?;
    Ok(count == 2)
}
