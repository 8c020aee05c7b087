use async_trait::async_trait;
use callflow_core::{CallId, ConversationState, TenantId};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Result of a successful `save`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// The state was written.
    Applied,
    /// A state with the same turn index was already stored; nothing changed.
    Unchanged,
}

/// One row of the diagnostics listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallSummary {
    pub call_id: CallId,
    pub tenant_id: TenantId,
    pub from_number: String,
    pub turn_index: u32,
    pub handoff_occurred: bool,
    /// RFC 3339.
    pub updated_at: String,
}

impl CallSummary {
    pub(crate) fn of(state: &ConversationState) -> Self {
        Self {
            call_id: state.call_id.clone(),
            tenant_id: state.tenant_id.clone(),
            from_number: state.from_number.clone(),
            turn_index: state.turn_index,
            handoff_occurred: state.handoff_occurred,
            updated_at: state.last_updated_at.to_rfc3339(),
        }
    }
}

/// Persistence of per-call conversation state between turn events.
///
/// `save` is guarded by the turn index: a higher index replaces the stored
/// state, an equal index is a no-op (`Unchanged`) and a lower index fails
/// with `SessionError::Conflict`. The compare and the write happen
/// atomically, so duplicate webhook deliveries never regress a call.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Store backend name for logs.
    fn name(&self) -> &str;

    async fn load(&self, call_id: &CallId) -> Result<Option<ConversationState>>;

    async fn save(&self, state: &ConversationState) -> Result<SaveOutcome>;

    /// Most recently updated calls, newest first.
    async fn list_recent(&self, limit: usize) -> Result<Vec<CallSummary>>;
}
