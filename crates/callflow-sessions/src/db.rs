use rusqlite::Connection;

use crate::error::Result;

/// Initialise the call state table and its index.
///
/// Safe to call on every startup; uses `IF NOT EXISTS` throughout.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS call_states (
            call_id          TEXT PRIMARY KEY,
            tenant_id        TEXT NOT NULL,
            from_number      TEXT NOT NULL,
            turn_index       INTEGER NOT NULL DEFAULT 0,
            handoff_occurred INTEGER NOT NULL DEFAULT 0,
            state_json       TEXT NOT NULL,
            created_at       TEXT NOT NULL,
            updated_at       TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_call_states_updated
            ON call_states(updated_at DESC);",
    )?;
    Ok(())
}
