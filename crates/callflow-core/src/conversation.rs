//! Per-call conversation state and the records derived from it.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{CallId, SessionId, TenantId};

/// Confidence recorded when the recogniser reports none.
pub const MAX_CONFIDENCE: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    User,
    Agent,
}

impl fmt::Display for Speaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Speaker::User => write!(f, "user"),
            Speaker::Agent => write!(f, "agent"),
        }
    }
}

/// One utterance in a call. Never modified after it is appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub speaker: Speaker,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    /// Recogniser confidence in 0.0..=1.0.
    pub confidence: f64,
    /// Absent when embedding generation failed or is disabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

impl TranscriptEntry {
    pub fn new(speaker: Speaker, text: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            speaker,
            text: text.into(),
            timestamp,
            confidence: MAX_CONFIDENCE,
            embedding: None,
        }
    }

    /// Clamp into the valid range; NaN falls back to full confidence.
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = if confidence.is_nan() {
            MAX_CONFIDENCE
        } else {
            confidence.clamp(0.0, MAX_CONFIDENCE)
        };
        self
    }

    pub fn with_embedding(mut self, embedding: Option<Vec<f32>>) -> Self {
        self.embedding = embedding;
        self
    }
}

/// Everything the service remembers about one call between turn events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    pub call_id: CallId,
    pub tenant_id: TenantId,
    pub from_number: String,
    pub to_number: String,
    pub started_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
    pub session_id: SessionId,
    /// Number of caller turns answered so far.
    pub turn_index: u32,
    /// Chronological, append-only.
    #[serde(default)]
    pub recent_turns: Vec<TranscriptEntry>,
    #[serde(default)]
    pub handoff_occurred: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handoff_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handoff_at: Option<DateTime<Utc>>,
}

impl ConversationState {
    /// Fresh state for a call seen for the first time.
    pub fn new(
        call_id: CallId,
        tenant_id: TenantId,
        from_number: impl Into<String>,
        to_number: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        let session_id = SessionId::for_call(&call_id);
        Self {
            call_id,
            tenant_id,
            from_number: from_number.into(),
            to_number: to_number.into(),
            started_at: now,
            last_updated_at: now,
            session_id,
            turn_index: 0,
            recent_turns: Vec::new(),
            handoff_occurred: false,
            handoff_reason: None,
            handoff_at: None,
        }
    }

    pub fn push_entry(&mut self, entry: TranscriptEntry) {
        self.recent_turns.push(entry);
    }

    /// Close out a caller turn: one more turn consumed, clock bumped.
    pub fn complete_turn(&mut self, now: DateTime<Utc>) {
        self.turn_index += 1;
        self.last_updated_at = now;
    }

    /// Record the transfer to a human. One-way: returns `false` and leaves the
    /// state untouched if a handoff was already recorded.
    pub fn mark_handoff(&mut self, reason: impl Into<String>, at: DateTime<Utc>) -> bool {
        if self.handoff_occurred {
            return false;
        }
        self.handoff_occurred = true;
        self.handoff_reason = Some(reason.into());
        self.handoff_at = Some(at);
        true
    }
}

/// One detect-intent answer from the NLU engine.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NluResult {
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent_confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<BTreeMap<String, Value>>,
    /// The NLU engine's current conversation page, when it reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_id: Option<String>,
    pub response_text: String,
    /// Out-of-band signals such as handoff requests.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_payload: Option<BTreeMap<String, Value>>,
}

/// Instructions for transferring a call to a human agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandoffDirective {
    pub transfer_target: String,
    pub reason: String,
    pub preserve_context: bool,
}

/// Archive record: a snapshot of the call plus the latest NLU answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FullTranscriptPayload {
    pub call_id: CallId,
    pub tenant_id: TenantId,
    pub from_number: String,
    pub to_number: String,
    pub start_timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<i64>,
    pub transcript_entries: Vec<TranscriptEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nlu_metadata: Option<NluResult>,
    pub handoff_occurred: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handoff_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handoff_timestamp: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl FullTranscriptPayload {
    /// Snapshot `state`. The call counts as ended once it was handed off; only
    /// then are the end timestamp and duration filled in.
    pub fn snapshot(
        state: &ConversationState,
        nlu: Option<&NluResult>,
        created_at: DateTime<Utc>,
    ) -> Self {
        let end_timestamp = if state.handoff_occurred {
            state.handoff_at
        } else {
            None
        };
        let duration_seconds = end_timestamp.map(|end| (end - state.started_at).num_seconds());

        Self {
            call_id: state.call_id.clone(),
            tenant_id: state.tenant_id.clone(),
            from_number: state.from_number.clone(),
            to_number: state.to_number.clone(),
            start_timestamp: state.started_at,
            end_timestamp,
            duration_seconds,
            transcript_entries: state.recent_turns.clone(),
            nlu_metadata: nlu.cloned(),
            handoff_occurred: state.handoff_occurred,
            handoff_reason: state.handoff_reason.clone(),
            handoff_timestamp: state.handoff_at,
            created_at,
        }
    }
}
