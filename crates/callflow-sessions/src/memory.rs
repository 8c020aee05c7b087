use async_trait::async_trait;
use callflow_core::{CallId, ConversationState};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::error::{Result, SessionError};
use crate::store::{CallSummary, SaveOutcome, SessionStore};

/// Process-local store for tests and single-replica deployments without a
/// database. State is lost on restart.
#[derive(Default)]
pub struct InMemorySessionStore {
    states: DashMap<CallId, ConversationState>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn load(&self, call_id: &CallId) -> Result<Option<ConversationState>> {
        Ok(self.states.get(call_id).map(|s| s.value().clone()))
    }

    async fn save(&self, state: &ConversationState) -> Result<SaveOutcome> {
        // The entry holds the shard lock across compare and write.
        match self.states.entry(state.call_id.clone()) {
            Entry::Vacant(slot) => {
                slot.insert(state.clone());
                Ok(SaveOutcome::Applied)
            }
            Entry::Occupied(mut slot) => {
                let stored = slot.get().turn_index;
                if state.turn_index > stored {
                    slot.insert(state.clone());
                    Ok(SaveOutcome::Applied)
                } else if state.turn_index == stored {
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
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<CallSummary>> {
        let mut states: Vec<ConversationState> =
            self.states.iter().map(|s| s.value().clone()).collect();
        states.sort_by(|a, b| b.last_updated_at.cmp(&a.last_updated_at));
        Ok(states.iter().take(limit).map(CallSummary::of).collect())
    }
}
