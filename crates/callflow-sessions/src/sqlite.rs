use std::sync::Mutex;

use async_trait::async_trait;
use callflow_core::{CallId, ConversationState, TenantId};
use rusqlite::Connection;
use tracing::{debug, instrument};

use crate::error::{Result, SessionError};
use crate::store::{CallSummary, SaveOutcome, SessionStore};

/// SQLite-backed conversation state store.
///
/// The whole state is kept as JSON in `state_json`; the columns next to it
/// exist for the turn-index guard and for `list_recent`.
pub struct SqliteSessionStore {
    db: Mutex<Connection>,
}

impl SqliteSessionStore {
    /// Wrap an already-open (and `init_db`-initialised) connection.
    pub fn new(conn: Connection) -> Self {
        Self {
            db: Mutex::new(conn),
        }
    }

    fn save_sync(&self, state: &ConversationState) -> Result<SaveOutcome> {
        let json = serde_json::to_string(state)?;
        let now = chrono::Utc::now().to_rfc3339();
        let updated_at = state.last_updated_at.to_rfc3339();

        let db = self.db.lock().unwrap();
        let changed = db.execute(
            "INSERT INTO call_states
             (call_id, tenant_id, from_number, turn_index, handoff_occurred,
              state_json, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(call_id) DO UPDATE SET
                 turn_index       = excluded.turn_index,
                 handoff_occurred = excluded.handoff_occurred,
                 state_json       = excluded.state_json,
                 updated_at       = excluded.updated_at
             WHERE excluded.turn_index > call_states.turn_index",
            rusqlite::params![
                state.call_id.as_str(),
                state.tenant_id.as_str(),
                state.from_number,
                state.turn_index as i64,
                state.handoff_occurred,
                json,
                now,
                updated_at,
            ],
        )?;
        if changed > 0 {
            return Ok(SaveOutcome::Applied);
        }

        // Guard rejected the write; still holding the lock, so this read sees
        // the row that won.
        let stored: i64 = db.query_row(
            "SELECT turn_index FROM call_states WHERE call_id = ?1",
            rusqlite::params![state.call_id.as_str()],
            |row| row.get(0),
        )?;
        let stored = stored as u32;
        if stored == state.turn_index {
            Ok(SaveOutcome::Unchanged)
        } else {
            Err(SessionError::Conflict {
                call_id: state.call_id.to_string(),
                stored,
                attempted: state.turn_index,
            })
        }
    }
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    #[instrument(skip(self), fields(call_id = %call_id))]
    async fn load(&self, call_id: &CallId) -> Result<Option<ConversationState>> {
        let db = self.db.lock().unwrap();
        match db.query_row(
            "SELECT state_json FROM call_states WHERE call_id = ?1",
            rusqlite::params![call_id.as_str()],
            |row| row.get::<_, String>(0),
        ) {
            Ok(json) => Ok(Some(serde_json::from_str(&json)?)),
            Err(rusqlite::Error::QueryReturnedNoRows) => {
                debug!("no stored state");
                Ok(None)
            }
            Err(e) => Err(SessionError::Database(e)),
        }
    }

    #[instrument(
        skip(self, state),
        fields(call_id = %state.call_id, turn_index = state.turn_index)
    )]
    async fn save(&self, state: &ConversationState) -> Result<SaveOutcome> {
        let outcome = self.save_sync(state)?;
        debug!(?outcome, "state saved");
        Ok(outcome)
    }

    #[instrument(skip(self))]
    async fn list_recent(&self, limit: usize) -> Result<Vec<CallSummary>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT call_id, tenant_id, from_number, turn_index, handoff_occurred, updated_at
             FROM call_states
             ORDER BY updated_at DESC
             LIMIT ?1",
        )?;
        let rows = stmt.query_map(rusqlite::params![limit as i64], row_to_summary)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

fn row_to_summary(row: &rusqlite::Row<'_>) -> rusqlite::Result<CallSummary> {
    Ok(CallSummary {
        call_id: CallId::new(row.get::<_, String>(0)?),
        tenant_id: TenantId::new(row.get::<_, String>(1)?),
        from_number: row.get(2)?,
        turn_index: row.get::<_, i64>(3)? as u32,
        handoff_occurred: row.get(4)?,
        updated_at: row.get(5)?,
    })
}
