use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use callflow_agent::{
    ContextQuery, ContextRetriever, ContextSnippet, Embedder, EmbeddingError, NluClient,
    NluError, NluRequest, RetrievalError,
};
use callflow_core::{
    CallId, CallflowConfig, ConversationState, FullTranscriptPayload, NluResult, Speaker,
};
use callflow_history::{HistoryForwarder, HistorySink};
use callflow_script::{Decision, ScriptNode};
use callflow_sessions::{
    CallSummary, InMemorySessionStore, SaveOutcome, SessionError, SessionStore,
};
use callflow_turn::{CallPhase, TurnEvent, TurnProcessor};

// ── Fakes ────────────────────────────────────────────────────────────────────

enum Reply {
    Text(&'static str),
    Payload(&'static str, serde_json::Value),
    Hang,
}

#[derive(Default)]
struct FakeNlu {
    script: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<NluRequest>>,
    gate: Option<Arc<tokio::sync::Barrier>>,
}

impl FakeNlu {
    fn replying(replies: Vec<Reply>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(replies.into()),
            ..Self::default()
        })
    }

    fn gated(barrier: Arc<tokio::sync::Barrier>) -> Arc<Self> {
        Arc::new(Self {
            gate: Some(barrier),
            ..Self::default()
        })
    }

    fn requests(&self) -> Vec<NluRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl NluClient for FakeNlu {
    fn name(&self) -> &str {
        "fake"
    }

    async fn detect_intent(&self, req: &NluRequest) -> Result<NluResult, NluError> {
        self.requests.lock().unwrap().push(req.clone());
        if let Some(gate) = &self.gate {
            gate.wait().await;
        }

        let reply = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Reply::Text("De acuerdo."));
        let (text, payload) = match reply {
            Reply::Text(text) => (text, None),
            Reply::Payload(text, payload) => {
                let map: BTreeMap<String, serde_json::Value> =
                    serde_json::from_value(payload).unwrap();
                (text, Some(map))
            }
            Reply::Hang => {
                tokio::time::sleep(Duration::from_secs(5)).await;
                ("too late", None)
            }
        };

        Ok(NluResult {
            session_id: req.session_id.clone(),
            intent_name: Some("test.intent".into()),
            intent_confidence: Some(0.9),
            response_text: text.to_string(),
            custom_payload: payload,
            ..NluResult::default()
        })
    }
}

struct FakeEmbedder {
    fail: bool,
}

#[async_trait]
impl Embedder for FakeEmbedder {
    fn name(&self) -> &str {
        "fake"
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if self.fail {
            Err(EmbeddingError::Api {
                status: 503,
                message: "model overloaded".into(),
            })
        } else {
            Ok(vec![0.1, 0.2, 0.3])
        }
    }
}

#[derive(Default)]
struct FakeRetriever {
    snippets: Vec<&'static str>,
    fail: bool,
    delay: Option<Duration>,
    queries: Mutex<Vec<(String, String, usize)>>,
}

#[async_trait]
impl ContextRetriever for FakeRetriever {
    fn name(&self) -> &str {
        "fake"
    }

    async fn retrieve(
        &self,
        query: &ContextQuery<'_>,
    ) -> Result<Vec<ContextSnippet>, RetrievalError> {
        self.queries.lock().unwrap().push((
            query.tenant_id.to_string(),
            query.from_number.to_string(),
            query.max_results,
        ));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(RetrievalError::Unavailable("index offline".into()));
        }
        Ok(self
            .snippets
            .iter()
            .map(|t| ContextSnippet {
                id: None,
                text: t.to_string(),
                score: 0.9,
                metadata: BTreeMap::new(),
            })
            .collect())
    }
}

#[derive(Default)]
struct RecordingSink {
    payloads: Mutex<Vec<FullTranscriptPayload>>,
}

#[async_trait]
impl HistorySink for RecordingSink {
    fn name(&self) -> &str {
        "recording"
    }

    async fn send(&self, payload: &FullTranscriptPayload) -> callflow_history::Result<()> {
        self.payloads.lock().unwrap().push(payload.clone());
        Ok(())
    }
}

struct BrokenStore;

#[async_trait]
impl SessionStore for BrokenStore {
    fn name(&self) -> &str {
        "broken"
    }

    async fn load(&self, _call_id: &CallId) -> Result<Option<ConversationState>, SessionError> {
        Err(SessionError::Serialization(
            serde_json::from_str::<u8>("not json").unwrap_err(),
        ))
    }

    async fn save(&self, _state: &ConversationState) -> Result<SaveOutcome, SessionError> {
        unreachable!("nothing is saved after a failed load")
    }

    async fn list_recent(&self, _limit: usize) -> Result<Vec<CallSummary>, SessionError> {
        Ok(Vec::new())
    }
}

/// Accepts the first `healthy_saves` writes, then fails every later one.
struct FlakyStore {
    inner: InMemorySessionStore,
    healthy_saves: usize,
    saves: AtomicUsize,
    conflict: bool,
}

impl FlakyStore {
    fn new(healthy_saves: usize, conflict: bool) -> Self {
        Self {
            inner: InMemorySessionStore::new(),
            healthy_saves,
            saves: AtomicUsize::new(0),
            conflict,
        }
    }
}

#[async_trait]
impl SessionStore for FlakyStore {
    fn name(&self) -> &str {
        "flaky"
    }

    async fn load(&self, call_id: &CallId) -> Result<Option<ConversationState>, SessionError> {
        self.inner.load(call_id).await
    }

    async fn save(&self, state: &ConversationState) -> Result<SaveOutcome, SessionError> {
        if self.saves.fetch_add(1, Ordering::SeqCst) < self.healthy_saves {
            return self.inner.save(state).await;
        }
        if self.conflict {
            Err(SessionError::Conflict {
                call_id: state.call_id.to_string(),
                stored: state.turn_index + 1,
                attempted: state.turn_index,
            })
        } else {
            Err(SessionError::Serialization(
                serde_json::from_str::<u8>("not json").unwrap_err(),
            ))
        }
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<CallSummary>, SessionError> {
        self.inner.list_recent(limit).await
    }
}

// ── Harness ──────────────────────────────────────────────────────────────────

struct Harness {
    processor: TurnProcessor,
    store: Arc<InMemorySessionStore>,
    nlu: Arc<FakeNlu>,
    retriever: Arc<FakeRetriever>,
    sink: Arc<RecordingSink>,
}

impl Harness {
    fn new(nlu: Arc<FakeNlu>, embed_fails: bool, retriever: FakeRetriever) -> Self {
        let mut config = CallflowConfig::default();
        config.nlu.timeout_ms = 100;
        config.retrieval.timeout_ms = 50;

        let store = Arc::new(InMemorySessionStore::new());
        let retriever = Arc::new(retriever);
        let sink = Arc::new(RecordingSink::default());
        let history = Arc::new(HistoryForwarder::spawn(sink.clone(), 2, 32));

        let processor = TurnProcessor::new(
            Arc::new(config),
            store.clone(),
            nlu.clone(),
            Arc::new(FakeEmbedder { fail: embed_fails }),
            retriever.clone(),
            history,
        );
        Self {
            processor,
            store,
            nlu,
            retriever,
            sink,
        }
    }

    fn simple(nlu: Arc<FakeNlu>) -> Self {
        Self::new(nlu, false, FakeRetriever::default())
    }

    async fn stored(&self, call: &str) -> ConversationState {
        self.store.load(&CallId::from(call)).await.unwrap().unwrap()
    }

    async fn flush_history(&self) -> Vec<FullTranscriptPayload> {
        self.processor.history().shutdown().await;
        self.sink.payloads.lock().unwrap().clone()
    }
}

fn event(call: &str) -> TurnEvent {
    TurnEvent::new(call, "+56911111111", "+56222222222")
}

fn say(call: &str, text: &str) -> TurnEvent {
    event(call).with_speech(text, Some(0.93))
}

// ── Scenarios ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn new_call_is_greeted_without_nlu() {
    let h = Harness::simple(FakeNlu::replying(vec![]));

    let out = h.processor.handle(&event("C1")).await;

    assert_eq!(out.decision, Decision::Greet);
    assert_eq!(out.phase, CallPhase::AwaitingInput);
    assert!(out.script.listens());
    let state = h.stored("C1").await;
    assert_eq!(state.turn_index, 0);
    assert!(!state.handoff_occurred);
    assert!(state.recent_turns.is_empty());
    assert!(h.nlu.requests().is_empty());
}

#[tokio::test]
async fn handoff_payload_transfers_the_call() {
    let h = Harness::simple(FakeNlu::replying(vec![Reply::Payload(
        "Claro, le comunico con un ejecutivo.",
        serde_json::json!({ "action": "LiveAgentHandoff", "transferNumber": "+56 9 8765 4321" }),
    )]));
    h.processor.handle(&event("C1")).await;

    let out = h.processor.handle(&say("C1", "quiero hablar con un agente")).await;

    assert_eq!(out.decision, Decision::Handoff);
    assert_eq!(out.phase, CallPhase::HandedOff);
    assert_eq!(out.script.transfer().unwrap().target, "+56987654321");
    assert!(!out.script.listens());
    let state = h.stored("C1").await;
    assert!(state.handoff_occurred);
    assert_eq!(
        state.handoff_reason.as_deref(),
        Some("El cliente ha solicitado hablar con un agente humano")
    );
    assert!(state.handoff_at.is_some());
    assert_eq!(state.turn_index, 1);
}

#[tokio::test]
async fn handed_off_call_is_not_processed_again() {
    let h = Harness::simple(FakeNlu::replying(vec![Reply::Payload(
        "Le comunico.",
        serde_json::json!({ "action": "LiveAgentHandoff" }),
    )]));
    h.processor.handle(&event("C1")).await;
    h.processor.handle(&say("C1", "un agente por favor")).await;
    let before = h.stored("C1").await;

    let out = h.processor.handle(&say("C1", "¿aló?")).await;

    assert_eq!(out.decision, Decision::End);
    assert_eq!(out.phase, CallPhase::HandedOff);
    assert_eq!(out.script.nodes, vec![ScriptNode::End]);
    assert_eq!(h.nlu.requests().len(), 1);
    assert_eq!(h.stored("C1").await, before);
}

#[tokio::test]
async fn embedding_failure_skips_retrieval() {
    let retriever = FakeRetriever {
        snippets: vec!["never used"],
        ..FakeRetriever::default()
    };
    let h = Harness::new(FakeNlu::replying(vec![]), true, retriever);
    h.processor.handle(&event("C2")).await;

    let out = h.processor.handle(&say("C2", "¿cuál es mi saldo?")).await;

    assert_eq!(out.decision, Decision::Continue);
    assert_eq!(out.phase, CallPhase::AwaitingInput);
    let state = h.stored("C2").await;
    assert_eq!(state.turn_index, 1);
    assert_eq!(state.recent_turns.len(), 2);
    assert!(state.recent_turns.iter().all(|e| e.embedding.is_none()));
    assert!(h.retriever.queries.lock().unwrap().is_empty());
    assert_eq!(h.nlu.requests()[0].context, None);
}

#[tokio::test]
async fn nlu_timeout_leaves_state_untouched_and_redelivery_succeeds() {
    let h = Harness::simple(FakeNlu::replying(vec![Reply::Hang]));
    h.processor.handle(&event("C3")).await;

    let out = h.processor.handle(&say("C3", "hola")).await;

    assert_eq!(out.decision, Decision::Error);
    assert_eq!(out.phase, CallPhase::Errored);
    assert!(out.script.listens());
    assert_eq!(
        out.script.spoken(),
        vec!["Lo siento, ha ocurrido un error. Por favor, inténtelo de nuevo más tarde."]
    );
    let state = h.stored("C3").await;
    assert_eq!(state.turn_index, 0);
    assert!(state.recent_turns.is_empty());

    let retry = h.processor.handle(&say("C3", "hola")).await;
    assert_eq!(retry.decision, Decision::Continue);
    assert_eq!(h.stored("C3").await.turn_index, 1);
}

// ── Properties ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn retrieved_context_is_scoped_and_sent_to_nlu() {
    let retriever = FakeRetriever {
        snippets: vec!["llamó por una boleta duplicada"],
        ..FakeRetriever::default()
    };
    let h = Harness::new(FakeNlu::replying(vec![]), false, retriever);
    h.processor.handle(&event("C4")).await;
    h.processor.handle(&say("C4", "sigo con el problema")).await;

    let queries = h.retriever.queries.lock().unwrap().clone();
    assert_eq!(
        queries,
        vec![("default".to_string(), "+56911111111".to_string(), 5)]
    );
    let sent = h.nlu.requests()[0].clone();
    assert_eq!(sent.session_id, "twilio-C4");
    assert_eq!(sent.language_code, "es-CL");
    assert_eq!(
        sent.context.as_deref(),
        Some(
            "Contexto adicional de conversaciones anteriores:\n\
             - llamó por una boleta duplicada\n"
        )
    );
    let state = h.stored("C4").await;
    assert!(state.recent_turns.iter().all(|e| e.embedding.is_some()));
    assert_eq!(state.recent_turns[0].confidence, 0.93);
}

#[tokio::test]
async fn missing_input_reprompts_without_consuming_a_turn() {
    let h = Harness::simple(FakeNlu::replying(vec![]));
    h.processor.handle(&event("C5")).await;

    let out = h.processor.handle(&event("C5")).await;

    assert_eq!(out.decision, Decision::Reprompt);
    assert_eq!(out.phase, CallPhase::AwaitingInput);
    assert_eq!(
        out.script.spoken(),
        vec!["No se detectó ninguna entrada. Por favor, inténtelo de nuevo."]
    );
    assert_eq!(h.stored("C5").await.turn_index, 0);
    assert!(h.nlu.requests().is_empty());
}

#[tokio::test]
async fn keypress_is_described_to_nlu() {
    let h = Harness::simple(FakeNlu::replying(vec![]));
    h.processor.handle(&event("C6")).await;

    h.processor.handle(&event("C6").with_digits("2")).await;

    assert_eq!(h.nlu.requests()[0].text, "Presionó 2");
    let state = h.stored("C6").await;
    assert_eq!(state.recent_turns[0].text, "Presionó 2");
    assert_eq!(state.recent_turns[0].confidence, 1.0);
}

#[tokio::test]
async fn transcript_grows_by_two_entries_per_turn() {
    let h = Harness::simple(FakeNlu::replying(vec![
        Reply::Text("Uno."),
        Reply::Text("Dos."),
        Reply::Text("Tres."),
    ]));
    h.processor.handle(&event("C7")).await;
    for text in ["a", "b", "c"] {
        h.processor.handle(&say("C7", text)).await;
    }

    let state = h.stored("C7").await;
    assert_eq!(state.turn_index, 3);
    assert_eq!(state.recent_turns.len(), 2 * state.turn_index as usize);
    let speakers: Vec<Speaker> = state.recent_turns.iter().map(|e| e.speaker).collect();
    assert_eq!(
        speakers,
        vec![
            Speaker::User,
            Speaker::Agent,
            Speaker::User,
            Speaker::Agent,
            Speaker::User,
            Speaker::Agent
        ]
    );
    assert_eq!(state.recent_turns[5].text, "Tres.");
}

#[tokio::test]
async fn duplicate_delivery_does_not_duplicate_the_turn() {
    let barrier = Arc::new(tokio::sync::Barrier::new(2));
    let h = Harness::simple(FakeNlu::gated(barrier));
    h.processor.handle(&event("C8")).await;

    // Both deliveries load turn 0 before either reaches the store.
    let ev = say("C8", "hola");
    let (a, b) = tokio::join!(h.processor.handle(&ev), h.processor.handle(&ev));

    assert_eq!(a.decision, Decision::Continue);
    assert_eq!(b.decision, Decision::Continue);
    let state = h.stored("C8").await;
    assert_eq!(state.turn_index, 1);
    assert_eq!(state.recent_turns.len(), 2);
    // Only the delivery that stored the turn forwards it.
    assert_eq!(h.flush_history().await.len(), 1);
}

#[tokio::test]
async fn every_processed_turn_is_forwarded_to_history() {
    let h = Harness::simple(FakeNlu::replying(vec![
        Reply::Text("Hola."),
        Reply::Payload("Le transfiero.", serde_json::json!({ "action": "LiveAgentHandoff" })),
    ]));
    h.processor.handle(&event("C9")).await;
    h.processor.handle(&say("C9", "hola")).await;
    h.processor.handle(&say("C9", "un agente")).await;

    let mut payloads = h.flush_history().await;
    payloads.sort_by_key(|p| p.transcript_entries.len());

    assert_eq!(payloads.len(), 2);
    assert!(payloads[0].end_timestamp.is_none());
    assert_eq!(
        payloads[0].nlu_metadata.as_ref().map(|n| n.response_text.as_str()),
        Some("Hola.")
    );
    let last = &payloads[1];
    assert!(last.handoff_occurred);
    assert_eq!(last.transcript_entries.len(), 4);
    assert!(last.end_timestamp.is_some());
    assert!(last.duration_seconds.is_some());
}

#[tokio::test]
async fn store_failure_yields_an_apology() {
    let sink = Arc::new(RecordingSink::default());
    let processor = TurnProcessor::new(
        Arc::new(CallflowConfig::default()),
        Arc::new(BrokenStore),
        FakeNlu::replying(vec![]),
        Arc::new(FakeEmbedder { fail: false }),
        Arc::new(FakeRetriever::default()),
        Arc::new(HistoryForwarder::spawn(sink, 1, 4)),
    );

    let out = processor.handle(&say("C10", "hola")).await;

    assert_eq!(out.decision, Decision::Error);
    assert_eq!(out.phase, CallPhase::Errored);
    assert!(out.state.is_none());
    assert!(out.script.listens());
}

#[tokio::test]
async fn retrieval_failure_continues_without_context() {
    let retriever = FakeRetriever {
        snippets: vec!["never delivered"],
        fail: true,
        ..FakeRetriever::default()
    };
    let h = Harness::new(FakeNlu::replying(vec![]), false, retriever);
    h.processor.handle(&event("C11")).await;

    let out = h.processor.handle(&say("C11", "¿cuál es mi saldo?")).await;

    assert_eq!(out.decision, Decision::Continue);
    assert_eq!(h.retriever.queries.lock().unwrap().len(), 1);
    assert_eq!(h.nlu.requests()[0].context, None);
    assert_eq!(h.stored("C11").await.turn_index, 1);
}

#[tokio::test]
async fn retrieval_timeout_continues_without_context() {
    let retriever = FakeRetriever {
        snippets: vec!["too late"],
        delay: Some(Duration::from_secs(5)),
        ..FakeRetriever::default()
    };
    let h = Harness::new(FakeNlu::replying(vec![]), false, retriever);
    h.processor.handle(&event("C12")).await;

    let out = h.processor.handle(&say("C12", "¿cuál es mi saldo?")).await;

    assert_eq!(out.decision, Decision::Continue);
    assert_eq!(h.nlu.requests()[0].context, None);
    assert_eq!(h.stored("C12").await.turn_index, 1);
}

fn flaky_processor(store: Arc<FlakyStore>, sink: Arc<RecordingSink>) -> TurnProcessor {
    TurnProcessor::new(
        Arc::new(CallflowConfig::default()),
        store,
        FakeNlu::replying(vec![Reply::Text("Su saldo es cero.")]),
        Arc::new(FakeEmbedder { fail: false }),
        Arc::new(FakeRetriever::default()),
        Arc::new(HistoryForwarder::spawn(sink, 1, 4)),
    )
}

#[tokio::test]
async fn failed_save_still_answers_the_caller() {
    let store = Arc::new(FlakyStore::new(1, false));
    let sink = Arc::new(RecordingSink::default());
    let processor = flaky_processor(store.clone(), sink.clone());
    processor.handle(&event("C13")).await;

    let out = processor.handle(&say("C13", "¿cuál es mi saldo?")).await;

    assert_eq!(out.decision, Decision::Continue);
    assert_eq!(out.phase, CallPhase::AwaitingInput);
    assert!(out.script.listens());
    assert_eq!(out.state.as_ref().map(|s| s.turn_index), Some(1));
    let stored = store.load(&CallId::from("C13")).await.unwrap().unwrap();
    assert_eq!(stored.turn_index, 0);

    processor.history().shutdown().await;
    let payloads = sink.payloads.lock().unwrap().clone();
    assert_eq!(payloads.len(), 1);
    assert_eq!(payloads[0].transcript_entries.len(), 2);
}

#[tokio::test]
async fn conflicting_save_is_not_forwarded_to_history() {
    let store = Arc::new(FlakyStore::new(1, true));
    let sink = Arc::new(RecordingSink::default());
    let processor = flaky_processor(store.clone(), sink.clone());
    processor.handle(&event("C14")).await;

    let out = processor.handle(&say("C14", "¿cuál es mi saldo?")).await;

    assert_eq!(out.decision, Decision::Continue);
    assert!(out.script.listens());
    let stored = store.load(&CallId::from("C14")).await.unwrap().unwrap();
    assert_eq!(stored.turn_index, 0);

    processor.history().shutdown().await;
    assert!(sink.payloads.lock().unwrap().is_empty());
}
