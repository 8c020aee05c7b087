use std::sync::Mutex;

use callflow_core::{CallId, FullTranscriptPayload};
use rusqlite::Connection;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::error::Result;

/// Receiving end of the history forwarder: stores every snapshot it is given.
///
/// Snapshots are append-only; a call that produced several turns has several
/// rows, the latest being the most complete.
pub struct TranscriptArchive {
    db: Mutex<Connection>,
}

impl TranscriptArchive {
    /// Wrap an already-open (and `init_db`-initialised) connection.
    pub fn new(conn: Connection) -> Self {
        Self {
            db: Mutex::new(conn),
        }
    }

    /// Store one snapshot and return its archive id.
    #[instrument(skip(self, payload), fields(call_id = %payload.call_id))]
    pub fn ingest(&self, payload: &FullTranscriptPayload) -> Result<String> {
        let id = Uuid::now_v7().to_string();
        let json = serde_json::to_string(payload)?;

        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO transcripts
             (id, call_id, tenant_id, from_number, handoff_occurred, entry_count,
              payload_json, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            rusqlite::params![
                id,
                payload.call_id.as_str(),
                payload.tenant_id.as_str(),
                payload.from_number,
                payload.handoff_occurred,
                payload.transcript_entries.len() as i64,
                json,
                payload.created_at.to_rfc3339(),
            ],
        )?;

        info!(
            archive_id = %id,
            entries = payload.transcript_entries.len(),
            handoff = payload.handoff_occurred,
            "transcript archived"
        );
        Ok(id)
    }

    /// All snapshots of a call, oldest first.
    #[instrument(skip(self), fields(call_id = %call_id))]
    pub fn list_for_call(&self, call_id: &CallId) -> Result<Vec<FullTranscriptPayload>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT payload_json FROM transcripts
             WHERE call_id = ?1
             ORDER BY created_at ASC, id ASC",
        )?;
        let rows = stmt.query_map(rusqlite::params![call_id.as_str()], |row| {
            row.get::<_, String>(0)
        })?;

        let mut out = Vec::new();
        for json in rows {
            out.push(serde_json::from_str(&json?)?);
        }
        Ok(out)
    }

    pub fn count(&self) -> Result<u64> {
        let db = self.db.lock().unwrap();
        let n: i64 = db.query_row("SELECT COUNT(*) FROM transcripts", [], |row| row.get(0))?;
        Ok(n as u64)
    }
}
