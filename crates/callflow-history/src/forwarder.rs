//! Bounded, fire-and-forget transcript forwarding.
//!
//! `submit` never waits: the snapshot goes onto a bounded queue and a
//! dispatcher task hands it to a pool of at most `workers` concurrent
//! deliveries. Anything that cannot be delivered ends up in the dead-letter
//! log (`callflow::dead_letter` target) and is not retried.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use callflow_core::FullTranscriptPayload;
use serde::Serialize;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::sink::HistorySink;

pub const DEAD_LETTER_TARGET: &str = "callflow::dead_letter";

/// Snapshot of the forwarder counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ForwarderStats {
    pub enabled: bool,
    /// Accepted onto the queue.
    pub submitted: u64,
    pub delivered: u64,
    /// Accepted but the sink failed.
    pub failed: u64,
    /// Never queued: queue full or forwarder shut down.
    pub dropped: u64,
}

#[derive(Default)]
struct Counters {
    submitted: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

pub struct HistoryForwarder {
    enabled: bool,
    tx: Mutex<Option<mpsc::Sender<FullTranscriptPayload>>>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
    counters: Arc<Counters>,
}

impl HistoryForwarder {
    /// Start the dispatcher. Must be called inside a tokio runtime.
    pub fn spawn(sink: Arc<dyn HistorySink>, workers: usize, queue_capacity: usize) -> Self {
        let workers = workers.max(1);
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let counters = Arc::new(Counters::default());

        info!(sink = sink.name(), workers, queue_capacity, "history forwarder started");
        let dispatcher = tokio::spawn(dispatch(rx, sink, workers, counters.clone()));

        Self {
            enabled: true,
            tx: Mutex::new(Some(tx)),
            dispatcher: Mutex::new(Some(dispatcher)),
            counters,
        }
    }

    /// A forwarder with nowhere to send: submissions are ignored.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            tx: Mutex::new(None),
            dispatcher: Mutex::new(None),
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Queue `payload` for delivery without waiting.
    pub fn submit(&self, payload: FullTranscriptPayload) {
        if !self.enabled {
            debug!(call_id = %payload.call_id, "history forwarding disabled, snapshot skipped");
            return;
        }

        let tx = self.tx.lock().unwrap().clone();
        let Some(tx) = tx else {
            self.counters.dropped.fetch_add(1, Ordering::Relaxed);
            dead_letter(&payload, "forwarder shut down");
            return;
        };

        match tx.try_send(payload) {
            Ok(()) => {
                self.counters.submitted.fetch_add(1, Ordering::Relaxed);
            }
            Err(mpsc::error::TrySendError::Full(payload)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                dead_letter(&payload, "queue full");
            }
            Err(mpsc::error::TrySendError::Closed(payload)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                dead_letter(&payload, "queue closed");
            }
        }
    }

    pub fn stats(&self) -> ForwarderStats {
        ForwarderStats {
            enabled: self.enabled,
            submitted: self.counters.submitted.load(Ordering::Relaxed),
            delivered: self.counters.delivered.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
        }
    }

    /// Stop accepting snapshots, then wait until everything already queued
    /// has been attempted. Later `submit` calls are dead-lettered.
    pub async fn shutdown(&self) {
        drop(self.tx.lock().unwrap().take());
        let handle = self.dispatcher.lock().unwrap().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!(error = %e, "history dispatcher panicked");
            }
            let stats = self.stats();
            info!(
                delivered = stats.delivered,
                failed = stats.failed,
                dropped = stats.dropped,
                "history forwarder stopped"
            );
        }
    }
}

async fn dispatch(
    mut rx: mpsc::Receiver<FullTranscriptPayload>,
    sink: Arc<dyn HistorySink>,
    workers: usize,
    counters: Arc<Counters>,
) {
    let permits = Arc::new(Semaphore::new(workers));

    while let Some(payload) = rx.recv().await {
        let Ok(permit) = permits.clone().acquire_owned().await else {
            break;
        };
        let sink = sink.clone();
        let counters = counters.clone();
        tokio::spawn(async move {
            let _permit = permit;
            match sink.send(&payload).await {
                Ok(()) => {
                    counters.delivered.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    counters.failed.fetch_add(1, Ordering::Relaxed);
                    dead_letter(&payload, &e.to_string());
                }
            }
        });
    }

    // Queue closed; wait for in-flight deliveries to give their permits back.
    let _ = permits.acquire_many(workers as u32).await;
}

fn dead_letter(payload: &FullTranscriptPayload, reason: &str) {
    let body = serde_json::to_string(payload).unwrap_or_default();
    error!(
        target: DEAD_LETTER_TARGET,
        call_id = %payload.call_id,
        reason,
        payload = %body,
        "transcript not delivered"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HistoryError;
    use async_trait::async_trait;
    use callflow_core::{CallId, ConversationState, TenantId};
    use chrono::Utc;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    struct FakeSink {
        calls: AtomicUsize,
        fail: bool,
        delay: Duration,
    }

    impl FakeSink {
        fn new(fail: bool, delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail,
                delay,
            })
        }
    }

    #[async_trait]
    impl HistorySink for FakeSink {
        fn name(&self) -> &str {
            "fake"
        }

        async fn send(&self, _payload: &FullTranscriptPayload) -> crate::error::Result<()> {
            tokio::time::sleep(self.delay).await;
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(HistoryError::Status {
                    status: 500,
                    message: "boom".into(),
                })
            } else {
                Ok(())
            }
        }
    }

    fn payload(call: &str) -> FullTranscriptPayload {
        let state = ConversationState::new(
            CallId::from(call),
            TenantId::from("default"),
            "+56911111111",
            "+56222222222",
            Utc::now(),
        );
        FullTranscriptPayload::snapshot(&state, None, Utc::now())
    }

    #[tokio::test]
    async fn shutdown_waits_for_queued_deliveries() {
        let sink = FakeSink::new(false, Duration::from_millis(20));
        let fwd = HistoryForwarder::spawn(sink.clone(), 2, 16);
        for i in 0..5 {
            fwd.submit(payload(&format!("CA{i}")));
        }
        fwd.shutdown().await;

        assert_eq!(sink.calls.load(Ordering::SeqCst), 5);
        let stats = fwd.stats();
        assert_eq!(stats.submitted, 5);
        assert_eq!(stats.delivered, 5);
        assert_eq!(stats.failed, 0);
    }

    #[tokio::test]
    async fn sink_failures_are_counted_not_retried() {
        let sink = FakeSink::new(true, Duration::ZERO);
        let fwd = HistoryForwarder::spawn(sink.clone(), 1, 4);
        fwd.submit(payload("CA1"));
        fwd.submit(payload("CA2"));
        fwd.shutdown().await;

        assert_eq!(sink.calls.load(Ordering::SeqCst), 2);
        assert_eq!(fwd.stats().failed, 2);
        assert_eq!(fwd.stats().delivered, 0);
    }

    #[tokio::test]
    async fn submit_after_shutdown_is_dropped() {
        let fwd = HistoryForwarder::spawn(FakeSink::new(false, Duration::ZERO), 1, 4);
        fwd.shutdown().await;
        fwd.submit(payload("CA1"));
        assert_eq!(fwd.stats().dropped, 1);
        assert_eq!(fwd.stats().submitted, 0);
    }

    #[tokio::test]
    async fn disabled_forwarder_ignores_submissions() {
        let fwd = HistoryForwarder::disabled();
        fwd.submit(payload("CA1"));
        fwd.shutdown().await;
        assert_eq!(
            fwd.stats(),
            ForwarderStats {
                enabled: false,
                ..ForwarderStats::default()
            }
        );
    }
}
