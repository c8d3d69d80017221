//! End-to-end worker behavior against a scripted bridge provider.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use alloy_primitives::{Address, U256};
use b402::ChainId;
use b402_bridge::events::{BridgeEventType, EventSink, RecordingEventSink};
use b402_bridge::{
    BridgeError, BridgeJob, BridgeJobStatus, BridgeJobStore, BridgeProvider, BridgeRequest,
    BridgeResult, BridgeWorker, BridgeWorkerConfig, InMemoryJobStore,
};

/// Scripted outcome for one `bridge()` call.
enum BurnOutcome {
    Complete,
    BurnOnly,
    Fail(BridgeError),
}

/// Scripted outcome for one `reconcile()` call.
enum ReconcileOutcome {
    Done,
    NotYet,
}

#[derive(Default)]
struct ScriptedProvider {
    burns: Mutex<VecDeque<BurnOutcome>>,
    reconciles: Mutex<VecDeque<ReconcileOutcome>>,
    burn_calls: AtomicU32,
    reconcile_calls: AtomicU32,
}

impl ScriptedProvider {
    fn with_burns(outcomes: Vec<BurnOutcome>) -> Self {
        Self {
            burns: Mutex::new(outcomes.into()),
            ..Self::default()
        }
    }

    fn burn_calls(&self) -> u32 {
        self.burn_calls.load(Ordering::SeqCst)
    }

    fn reconcile_calls(&self) -> u32 {
        self.reconcile_calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl BridgeProvider for ScriptedProvider {
    fn supports_chain(&self, _network: &ChainId) -> bool {
        true
    }

    fn is_usdc(&self, _network: &ChainId, _asset: Address) -> bool {
        true
    }

    async fn check_liquidity(
        &self,
        _source: &ChainId,
        _destination: &ChainId,
        _asset: Address,
        _amount: U256,
    ) -> Result<bool, BridgeError> {
        Ok(true)
    }

    fn exchange_rate(
        &self,
        _source: &ChainId,
        _destination: &ChainId,
        _source_asset: Address,
        _destination_asset: Address,
    ) -> f64 {
        1.0
    }

    async fn await_source_confirmation(
        &self,
        _network: &ChainId,
        _tx_hash: &str,
    ) -> Result<(), BridgeError> {
        Ok(())
    }

    async fn bridge(&self, request: &BridgeRequest) -> Result<BridgeResult, BridgeError> {
        self.burn_calls.fetch_add(1, Ordering::SeqCst);
        let outcome = self
            .burns
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(BurnOutcome::Complete);
        match outcome {
            BurnOutcome::Complete => Ok(BridgeResult {
                bridge_tx_hash: "0xburn".into(),
                destination_tx_hash: Some("0xmint".into()),
                message_id: Some("0xmessage".into()),
                source_network: request.source_network.clone(),
                destination_network: request.destination_network.clone(),
            }),
            BurnOutcome::BurnOnly => Ok(BridgeResult {
                bridge_tx_hash: "0xburn".into(),
                destination_tx_hash: None,
                message_id: Some("0xmessage".into()),
                source_network: request.source_network.clone(),
                destination_network: request.destination_network.clone(),
            }),
            BurnOutcome::Fail(e) => Err(e),
        }
    }

    async fn reconcile(&self, job: &BridgeJob) -> Result<Option<BridgeResult>, BridgeError> {
        self.reconcile_calls.fetch_add(1, Ordering::SeqCst);
        let outcome = self
            .reconciles
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(ReconcileOutcome::Done);
        match outcome {
            ReconcileOutcome::Done => Ok(Some(BridgeResult {
                bridge_tx_hash: job.bridge_tx_hash.clone().unwrap_or_default(),
                destination_tx_hash: Some("0xmint".into()),
                message_id: job.message_id.clone(),
                source_network: job.source_network.clone(),
                destination_network: job.destination_network.clone(),
            })),
            ReconcileOutcome::NotYet => Ok(None),
        }
    }
}

fn job() -> BridgeJob {
    BridgeJob::new(
        ChainId::eip155(84_532),
        ChainId::eip155(11_155_111),
        format!("0x{}", uuid::Uuid::new_v4().simple()),
        "10000".into(),
        Address::repeat_byte(0x33),
        Address::repeat_byte(0x44),
    )
}

fn fast_config() -> BridgeWorkerConfig {
    BridgeWorkerConfig {
        max_attempts: 3,
        backoff_base: Duration::from_millis(1),
        backoff_jitter: Duration::ZERO,
        staleness_threshold: Duration::ZERO,
        recovery_interval: Duration::from_secs(3600),
    }
}

async fn wait_terminal(store: &Arc<dyn BridgeJobStore>, id: &str) -> BridgeJob {
    for _ in 0..500 {
        if let Some(job) = store.get_by_id(id).await.unwrap() {
            if job.status.is_terminal() {
                return job;
            }
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("job {id} never reached a terminal state");
}

#[tokio::test]
async fn happy_path_completes_with_destination_tx() {
    let store: Arc<dyn BridgeJobStore> = Arc::new(InMemoryJobStore::new());
    let provider = Arc::new(ScriptedProvider::with_burns(vec![BurnOutcome::Complete]));
    let sink = Arc::new(RecordingEventSink::new());
    let worker = BridgeWorker::with_sink(
        Arc::clone(&store),
        Arc::clone(&provider) as Arc<dyn BridgeProvider>,
        Arc::clone(&sink) as Arc<dyn EventSink>,
        fast_config(),
    );

    let enqueued = worker.enqueue(job()).await.unwrap();
    let done = wait_terminal(&store, &enqueued.id).await;

    assert_eq!(done.status, BridgeJobStatus::Completed);
    assert_eq!(done.destination_tx_hash.as_deref(), Some("0xmint"));
    assert_eq!(done.bridge_tx_hash.as_deref(), Some("0xburn"));
    assert_eq!(done.attempts, 1);
    assert!(done.last_error.is_none());

    let kinds: Vec<_> = sink.events().iter().map(|e| e.event_type).collect();
    assert_eq!(
        kinds,
        vec![
            BridgeEventType::BridgeStart,
            BridgeEventType::BridgeAttempt,
            BridgeEventType::BridgeSuccess,
        ]
    );
}

#[tokio::test]
async fn enqueue_is_idempotent_per_key() {
    let store: Arc<dyn BridgeJobStore> = Arc::new(InMemoryJobStore::new());
    let provider = Arc::new(ScriptedProvider::default());
    let worker = BridgeWorker::with_sink(
        Arc::clone(&store),
        Arc::clone(&provider) as Arc<dyn BridgeProvider>,
        Arc::new(RecordingEventSink::new()),
        fast_config(),
    );

    let first = worker.enqueue(job()).await.unwrap();
    let mut duplicate = job();
    duplicate.source_tx_hash = first.source_tx_hash.clone();
    duplicate.idempotency_key = first.idempotency_key.clone();
    let second = worker.enqueue(duplicate).await.unwrap();

    assert_eq!(first.id, second.id);
    let stored = store
        .get_by_idempotency_key(&first.idempotency_key)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.id, first.id);
}

#[tokio::test]
async fn transient_failure_retries_then_succeeds() {
    let store: Arc<dyn BridgeJobStore> = Arc::new(InMemoryJobStore::new());
    let provider = Arc::new(ScriptedProvider::with_burns(vec![
        BurnOutcome::Fail(BridgeError::transient("gateway timeout")),
        BurnOutcome::Complete,
    ]));
    let sink = Arc::new(RecordingEventSink::new());
    let worker = BridgeWorker::with_sink(
        Arc::clone(&store),
        Arc::clone(&provider) as Arc<dyn BridgeProvider>,
        Arc::clone(&sink) as Arc<dyn EventSink>,
        fast_config(),
    );

    let enqueued = worker.enqueue(job()).await.unwrap();
    let done = wait_terminal(&store, &enqueued.id).await;

    assert_eq!(done.status, BridgeJobStatus::Completed);
    assert_eq!(done.attempts, 2);
    assert_eq!(provider.burn_calls(), 2);

    let failures = sink
        .events()
        .iter()
        .filter(|e| e.event_type == BridgeEventType::BridgeFailure)
        .count();
    assert_eq!(failures, 1);
}

#[tokio::test]
async fn permanent_failure_does_not_retry() {
    let store: Arc<dyn BridgeJobStore> = Arc::new(InMemoryJobStore::new());
    let provider = Arc::new(ScriptedProvider::with_burns(vec![BurnOutcome::Fail(
        BridgeError::fatal("insufficient balance"),
    )]));
    let worker = BridgeWorker::with_sink(
        Arc::clone(&store),
        Arc::clone(&provider) as Arc<dyn BridgeProvider>,
        Arc::new(RecordingEventSink::new()),
        fast_config(),
    );

    let enqueued = worker.enqueue(job()).await.unwrap();
    let done = wait_terminal(&store, &enqueued.id).await;

    assert_eq!(done.status, BridgeJobStatus::Failed);
    assert_eq!(done.attempts, 1);
    assert_eq!(done.last_error.as_deref(), Some("insufficient balance"));
    assert_eq!(provider.burn_calls(), 1);
    assert!(done.destination_tx_hash.is_none());
}

#[tokio::test]
async fn transient_failures_exhaust_max_attempts() {
    let store: Arc<dyn BridgeJobStore> = Arc::new(InMemoryJobStore::new());
    let provider = Arc::new(ScriptedProvider::with_burns(vec![
        BurnOutcome::Fail(BridgeError::transient("nonce too low")),
        BurnOutcome::Fail(BridgeError::transient("failed to fetch")),
        BurnOutcome::Fail(BridgeError::transient("gateway timeout")),
    ]));
    let worker = BridgeWorker::with_sink(
        Arc::clone(&store),
        Arc::clone(&provider) as Arc<dyn BridgeProvider>,
        Arc::new(RecordingEventSink::new()),
        fast_config(),
    );

    let enqueued = worker.enqueue(job()).await.unwrap();
    let done = wait_terminal(&store, &enqueued.id).await;

    assert_eq!(done.status, BridgeJobStatus::Failed);
    assert_eq!(done.attempts, 3);
    assert_eq!(provider.burn_calls(), 3);
}

#[tokio::test]
async fn burn_without_mint_reconciles_without_second_burn() {
    let store: Arc<dyn BridgeJobStore> = Arc::new(InMemoryJobStore::new());
    let provider = Arc::new(ScriptedProvider {
        burns: Mutex::new(vec![BurnOutcome::BurnOnly].into()),
        reconciles: Mutex::new(vec![ReconcileOutcome::NotYet, ReconcileOutcome::Done].into()),
        ..ScriptedProvider::default()
    });
    let worker = BridgeWorker::with_sink(
        Arc::clone(&store),
        Arc::clone(&provider) as Arc<dyn BridgeProvider>,
        Arc::new(RecordingEventSink::new()),
        fast_config(),
    );

    let enqueued = worker.enqueue(job()).await.unwrap();
    let done = wait_terminal(&store, &enqueued.id).await;

    assert_eq!(done.status, BridgeJobStatus::Completed);
    assert_eq!(done.destination_tx_hash.as_deref(), Some("0xmint"));
    // The burn happened exactly once; completion came from reconciliation.
    assert_eq!(provider.burn_calls(), 1);
    assert!(provider.reconcile_calls() >= 2);
}

#[tokio::test]
async fn recovery_scan_resumes_stale_bridging_job() {
    let store: Arc<dyn BridgeJobStore> = Arc::new(InMemoryJobStore::new());
    let provider = Arc::new(ScriptedProvider {
        reconciles: Mutex::new(vec![ReconcileOutcome::Done].into()),
        ..ScriptedProvider::default()
    });
    let worker = BridgeWorker::with_sink(
        Arc::clone(&store),
        Arc::clone(&provider) as Arc<dyn BridgeProvider>,
        Arc::new(RecordingEventSink::new()),
        fast_config(),
    );

    // Simulate a crash after the burn: a bridging job with a recorded burn
    // hash, persisted but with no live task.
    let mut stranded = job();
    stranded.transition(BridgeJobStatus::Bridging).unwrap();
    stranded.bridge_tx_hash = Some("0xburn".into());
    stranded.updated_at -= 3600;
    store.create(&stranded).await.unwrap();

    let resumed = worker.recover().await.unwrap();
    assert_eq!(resumed, 1);

    let done = wait_terminal(&store, &stranded.id).await;
    assert_eq!(done.status, BridgeJobStatus::Completed);
    // Resume went through reconcile, never a second burn.
    assert_eq!(provider.burn_calls(), 0);
}

#[tokio::test]
async fn cancel_pending_job_only() {
    let store: Arc<dyn BridgeJobStore> = Arc::new(InMemoryJobStore::new());
    let provider = Arc::new(ScriptedProvider::default());
    let worker = BridgeWorker::with_sink(
        Arc::clone(&store),
        Arc::clone(&provider) as Arc<dyn BridgeProvider>,
        Arc::new(RecordingEventSink::new()),
        fast_config(),
    );

    // A pending job with no live task can be cancelled.
    let pending = job();
    store.create(&pending).await.unwrap();
    let cancelled = worker.cancel(&pending.id).await.unwrap();
    assert_eq!(cancelled.status, BridgeJobStatus::Cancelled);

    // A completed job cannot.
    let enqueued = worker.enqueue(job()).await.unwrap();
    let done = wait_terminal(&store, &enqueued.id).await;
    assert_eq!(done.status, BridgeJobStatus::Completed);
    assert!(worker.cancel(&done.id).await.is_err());
}
