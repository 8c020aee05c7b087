use std::sync::Arc;
use std::time::Duration;

use callflow_agent::{
    build_context_block, ContextQuery, ContextRetriever, Embedder, EmbeddingError, NluClient,
    NluError, NluRequest,
};
use callflow_core::{
    CallflowConfig, ConversationState, FullTranscriptPayload, HandoffDirective, NluResult,
    Speaker, TenantId, TranscriptEntry,
};
use callflow_history::HistoryForwarder;
use callflow_script::{Decision, ResponseScript, ScriptBuilder};
use callflow_sessions::{SaveOutcome, SessionError, SessionStore};
use chrono::Utc;
use tokio::time::timeout;
use tracing::{debug, error, info, instrument, warn};

use crate::event::TurnEvent;
use crate::handoff::detect_handoff;
use crate::phase::CallPhase;

/// Result of handling one event.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    /// Phase the call rests in after this event.
    pub phase: CallPhase,
    pub decision: Decision,
    pub script: ResponseScript,
    /// The call's state after the event; `None` when it could not be loaded.
    pub state: Option<ConversationState>,
    pub handoff: Option<HandoffDirective>,
}

/// Drives one call event through load, NLU, state update, persistence and
/// script generation.
///
/// Only a store failure on load or creation and an NLU failure abort a turn;
/// the caller still gets a valid script in both cases. Embedding, retrieval,
/// persistence of a processed turn and history forwarding are best-effort.
pub struct TurnProcessor {
    config: Arc<CallflowConfig>,
    store: Arc<dyn SessionStore>,
    nlu: Arc<dyn NluClient>,
    embedder: Arc<dyn Embedder>,
    retriever: Arc<dyn ContextRetriever>,
    history: Arc<HistoryForwarder>,
    scripts: ScriptBuilder,
}

/// Tracks the phase of the call being handled and logs each move.
struct PhaseCursor<'a> {
    call_id: &'a str,
    phase: CallPhase,
}

impl<'a> PhaseCursor<'a> {
    fn new(call_id: &'a str, phase: CallPhase) -> Self {
        Self { call_id, phase }
    }

    fn advance(&mut self, next: CallPhase) {
        debug_assert!(
            self.phase.can_transition_to(next),
            "illegal phase transition {} -> {}",
            self.phase,
            next
        );
        debug!(call_id = self.call_id, from = %self.phase, to = %next, "phase transition");
        self.phase = next;
    }
}

impl TurnProcessor {
    pub fn new(
        config: Arc<CallflowConfig>,
        store: Arc<dyn SessionStore>,
        nlu: Arc<dyn NluClient>,
        embedder: Arc<dyn Embedder>,
        retriever: Arc<dyn ContextRetriever>,
        history: Arc<HistoryForwarder>,
    ) -> Self {
        let scripts = ScriptBuilder::from_config(&config);
        Self {
            config,
            store,
            nlu,
            embedder,
            retriever,
            history,
            scripts,
        }
    }

    pub fn scripts(&self) -> &ScriptBuilder {
        &self.scripts
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    pub fn history(&self) -> &Arc<HistoryForwarder> {
        &self.history
    }

    /// Handle one inbound event. Never fails: every error path yields a
    /// script the caller can hear.
    #[instrument(skip(self, event), fields(call_id = %event.call_id))]
    pub async fn handle(&self, event: &TurnEvent) -> TurnOutcome {
        let call_id = event.call_id.as_str();

        let loaded = match self.store.load(&event.call_id).await {
            Ok(s) => s,
            Err(e) => {
                error!(call_id, error = %e, "failed to load conversation state");
                let mut cursor = PhaseCursor::new(call_id, CallPhase::New);
                cursor.advance(CallPhase::Errored);
                return self.errored(cursor.phase, None);
            }
        };

        let state = match loaded {
            Some(state) => state,
            None => return self.start_call(event).await,
        };

        if state.handoff_occurred {
            info!(
                call_id,
                turn_index = state.turn_index,
                phase = %CallPhase::HandedOff,
                "event for handed-off call ignored"
            );
            return TurnOutcome {
                phase: CallPhase::HandedOff,
                decision: Decision::End,
                script: self.scripts.end(),
                state: Some(state),
                handoff: None,
            };
        }

        self.process_turn(event, state).await
    }

    /// First event of a call: create and persist the state, then greet.
    async fn start_call(&self, event: &TurnEvent) -> TurnOutcome {
        let call_id = event.call_id.as_str();
        let mut cursor = PhaseCursor::new(call_id, CallPhase::New);

        let tenant = event
            .tenant_id
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or(&self.config.tenant.default_id);
        let state = ConversationState::new(
            event.call_id.clone(),
            TenantId::new(tenant),
            event.from.clone(),
            event.to.clone(),
            Utc::now(),
        );

        match self.store.save(&state).await {
            Ok(SaveOutcome::Applied) => {}
            Ok(SaveOutcome::Unchanged) => {
                debug!(call_id, "call created concurrently by a duplicate delivery");
            }
            Err(e) => {
                error!(call_id, error = %e, "failed to create conversation state");
                cursor.advance(CallPhase::Errored);
                return self.errored(cursor.phase, None);
            }
        }

        cursor.advance(CallPhase::AwaitingInput);
        info!(
            call_id,
            turn_index = state.turn_index,
            phase = %cursor.phase,
            tenant = %state.tenant_id,
            "call started"
        );
        TurnOutcome {
            phase: cursor.phase,
            decision: Decision::Greet,
            script: self.scripts.greeting(),
            state: Some(state),
            handoff: None,
        }
    }

    async fn process_turn(&self, event: &TurnEvent, state: ConversationState) -> TurnOutcome {
        let call_id = event.call_id.as_str();
        let mut cursor = PhaseCursor::new(call_id, CallPhase::AwaitingInput);
        cursor.advance(CallPhase::ProcessingTurn);

        let Some(utterance) = event.utterance(self.scripts.prompts()) else {
            cursor.advance(CallPhase::AwaitingInput);
            info!(
                call_id,
                turn_index = state.turn_index,
                phase = %cursor.phase,
                "no caller input, re-prompting"
            );
            return TurnOutcome {
                phase: cursor.phase,
                decision: Decision::Reprompt,
                script: self.scripts.no_input(),
                state: Some(state),
                handoff: None,
            };
        };

        // Work on a copy so a failed turn leaves `state` untouched.
        let mut next = state.clone();

        let user_embedding = self.embed(call_id, &utterance.text).await;
        let context = match user_embedding.as_deref() {
            Some(embedding) => self.retrieve_context(&next, embedding).await,
            None => String::new(),
        };
        next.push_entry(
            TranscriptEntry::new(Speaker::User, utterance.text.clone(), Utc::now())
                .with_confidence(utterance.confidence)
                .with_embedding(user_embedding),
        );

        let request = NluRequest {
            session_id: next.session_id.to_string(),
            text: utterance.text.clone(),
            language_code: self.config.nlu.language_code.clone(),
            context: (!context.is_empty()).then_some(context),
        };
        let nlu = match self.query_nlu(&request).await {
            Ok(nlu) => nlu,
            Err(e) => {
                error!(
                    call_id,
                    turn_index = state.turn_index,
                    nlu = self.nlu.name(),
                    error = %e,
                    "NLU query failed"
                );
                cursor.advance(CallPhase::Errored);
                return self.errored(cursor.phase, Some(state));
            }
        };

        let agent_embedding = if nlu.response_text.trim().is_empty() {
            None
        } else {
            self.embed(call_id, &nlu.response_text).await
        };
        let now = Utc::now();
        next.push_entry(
            TranscriptEntry::new(Speaker::Agent, nlu.response_text.clone(), now)
                .with_embedding(agent_embedding),
        );
        next.complete_turn(now);
        cursor.advance(CallPhase::Responding);

        let handoff = detect_handoff(&nlu, &self.config.handoff);
        if let Some(directive) = &handoff {
            next.mark_handoff(directive.reason.clone(), now);
            cursor.advance(CallPhase::HandedOff);
        } else {
            cursor.advance(CallPhase::AwaitingInput);
        }

        if self.persist(&next).await {
            self.history
                .submit(FullTranscriptPayload::snapshot(&next, Some(&nlu), Utc::now()));
        }

        let decision = if handoff.is_some() {
            Decision::Handoff
        } else {
            Decision::Continue
        };
        let script = self
            .scripts
            .build(decision, &nlu.response_text, handoff.as_ref());

        info!(
            call_id,
            turn_index = next.turn_index,
            phase = %cursor.phase,
            intent = nlu.intent_name.as_deref().unwrap_or(""),
            source = ?utterance.source,
            handoff = handoff.is_some(),
            "turn processed"
        );

        TurnOutcome {
            phase: cursor.phase,
            decision,
            script,
            state: Some(next),
            handoff,
        }
    }

    // ── Collaborators ────────────────────────────────────────────────────────

    async fn embed(&self, call_id: &str, text: &str) -> Option<Vec<f32>> {
        let budget = self.config.embedding.timeout_ms;
        let embedder = self.embedder.name();
        match timeout(Duration::from_millis(budget), self.embedder.embed(text)).await {
            Ok(Ok(v)) => Some(v),
            Ok(Err(EmbeddingError::Disabled)) => None,
            Ok(Err(e)) => {
                warn!(call_id, embedder, error = %e, "embedding failed");
                None
            }
            Err(_) => {
                warn!(call_id, embedder, timeout_ms = budget, "embedding timed out");
                None
            }
        }
    }

    async fn retrieve_context(&self, state: &ConversationState, embedding: &[f32]) -> String {
        let call_id = state.call_id.as_str();
        let query = ContextQuery {
            embedding,
            tenant_id: state.tenant_id.as_str(),
            from_number: &state.from_number,
            max_results: self.config.retrieval.neighbors,
        };
        let budget = self.config.retrieval.timeout_ms;
        let retriever = self.retriever.name();
        let lookup = timeout(Duration::from_millis(budget), self.retriever.retrieve(&query));
        let snippets = match lookup.await {
            Ok(Ok(snippets)) => snippets,
            Ok(Err(e)) => {
                warn!(call_id, retriever, error = %e, "context retrieval failed");
                return String::new();
            }
            Err(_) => {
                warn!(call_id, retriever, timeout_ms = budget, "context retrieval timed out");
                return String::new();
            }
        };
        debug!(call_id, hits = snippets.len(), "context retrieved");
        build_context_block(&self.config.prompts.context_header, &snippets)
    }

    async fn query_nlu(&self, request: &NluRequest) -> Result<NluResult, NluError> {
        let budget = self.config.nlu.timeout_ms;
        timeout(Duration::from_millis(budget), self.nlu.detect_intent(request))
            .await
            .unwrap_or(Err(NluError::Timeout { ms: budget }))
    }

    /// Saves the turn and reports whether its snapshot belongs in history.
    ///
    /// Turns another delivery already stored or superseded are not forwarded.
    /// A store error still forwards.
    async fn persist(&self, state: &ConversationState) -> bool {
        let call_id = state.call_id.as_str();
        match self.store.save(state).await {
            Ok(SaveOutcome::Applied) => true,
            Ok(SaveOutcome::Unchanged) => {
                let turn_index = state.turn_index;
                warn!(call_id, turn_index, "turn already stored by a duplicate delivery");
                false
            }
            Err(e @ SessionError::Conflict { .. }) => {
                warn!(call_id, error = %e, "stale turn not persisted");
                false
            }
            Err(e) => {
                let store = self.store.name();
                warn!(call_id, store, error = %e, "failed to persist conversation state");
                true
            }
        }
    }

    fn errored(&self, phase: CallPhase, state: Option<ConversationState>) -> TurnOutcome {
        TurnOutcome {
            phase,
            decision: Decision::Error,
            script: self.scripts.error(),
            state,
            handoff: None,
        }
    }
}
