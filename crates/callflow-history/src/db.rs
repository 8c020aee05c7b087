use rusqlite::Connection;

use crate::error::Result;

/// Initialise the transcript archive table.
///
/// Safe to call on every startup; uses `IF NOT EXISTS` throughout.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS transcripts (
            id               TEXT PRIMARY KEY,
            call_id          TEXT NOT NULL,
            tenant_id        TEXT NOT NULL,
            from_number      TEXT NOT NULL,
            handoff_occurred INTEGER NOT NULL DEFAULT 0,
            entry_count      INTEGER NOT NULL DEFAULT 0,
            payload_json     TEXT NOT NULL,
            created_at       TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_transcripts_call
            ON transcripts(call_id, created_at);",
    )?;
    Ok(())
}
