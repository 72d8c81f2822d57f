use sqlx::SqlitePool;

use crate::error::IndexError;

pub async fn run_migrations(pool: &SqlitePool) -> Result<(), IndexError> {
    // One row per chunk; the embedding is stored as little-endian f32 bytes
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunks (
            id TEXT PRIMARY KEY,
            seq INTEGER NOT NULL,
            source_path TEXT NOT NULL,
            chunk_index INTEGER NOT NULL,
            language TEXT NOT NULL,
            start_line INTEGER,
            end_line INTEGER,
            text TEXT NOT NULL,
            embedding BLOB NOT NULL,
            dims INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS index_meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_seq ON chunks(seq)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_source_path ON chunks(source_path)")
        .execute(pool)
        .await?;

    Ok(())
}
