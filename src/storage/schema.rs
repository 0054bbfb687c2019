use anyhow::{Context, Result};
use rusqlite::Connection;

pub fn apply(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS kv_store (
            key TEXT PRIMARY KEY NOT NULL,
            value TEXT NOT NULL,
            updated_at INTEGER NOT NULL
        );

        CREATE TRIGGER IF NOT EXISTS kv_store_touch_updated AFTER UPDATE OF value ON kv_store
        BEGIN
            UPDATE kv_store SET updated_at = strftime('%s', 'now') WHERE key = new.key;
        END;
        "#,
    )
    .context("applying key-value schema")?;
    Ok(())
}
