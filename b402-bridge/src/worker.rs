//! The durable bridge job processor.
//!
//! The worker owns every job transition after enqueue: it waits for source
//! confirmation, drives the bridge provider, classifies failures, retries
//! transient ones with linear backoff plus jitter, and reconciles jobs whose
//! burn landed but whose mint had not confirmed yet — including jobs found
//! by the recovery scan after a restart.
//!
//! Per idempotency key at most one attempt is in flight (an in-process
//! claim set); across keys processing is unordered and parallel.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use alloy_primitives::U256;
use rand::Rng;
use tracing::{error, info, warn};

use crate::events::{BridgeEvent, BridgeEventType, EventSink, FailureDetails, TracingEventSink};
use crate::job::{BridgeJob, BridgeJobStatus};
use crate::provider::{BridgeError, BridgeProvider, BridgeRequest, Recoverability};
use crate::store::{BridgeJobStore, StoreError};

/// Tuning knobs for the worker.
#[derive(Debug, Clone)]
pub struct BridgeWorkerConfig {
    /// Attempts before a transient failure parks the job as `failed`.
    pub max_attempts: u32,
    /// Base unit of the linear backoff: attempt `n` sleeps `n * base`.
    pub backoff_base: Duration,
    /// Random jitter added on top of each backoff sleep.
    pub backoff_jitter: Duration,
    /// Jobs untouched for this long are picked up by the recovery scan.
    pub staleness_threshold: Duration,
    /// Interval between recovery scans.
    pub recovery_interval: Duration,
}

impl Default for BridgeWorkerConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: Duration::from_millis(1000),
            backoff_jitter: Duration::from_millis(250),
            staleness_threshold: Duration::from_secs(300),
            recovery_interval: Duration::from_secs(60),
        }
    }
}

/// Errors from the admin cancel operation.
#[derive(Debug, thiserror::Error)]
pub enum CancelError {
    /// No such job.
    #[error("bridge job {0:?} not found")]
    NotFound(String),
    /// Only `pending` jobs can be cancelled; a `bridging` job may already
    /// have burned on the source chain.
    #[error("bridge job {id:?} is {status} and cannot be cancelled")]
    NotCancellable {
        /// The job id.
        id: String,
        /// Its current status.
        status: BridgeJobStatus,
    },
    /// Storage failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Background processor for bridge jobs.
pub struct BridgeWorker {
    store: Arc<dyn BridgeJobStore>,
    provider: Arc<dyn BridgeProvider>,
    sink: Arc<dyn EventSink>,
    config: BridgeWorkerConfig,
    in_flight: Mutex<HashSet<String>>,
}

impl std::fmt::Debug for BridgeWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeWorker")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl BridgeWorker {
    /// Creates a worker with the default tracing event sink.
    #[must_use]
    pub fn new(
        store: Arc<dyn BridgeJobStore>,
        provider: Arc<dyn BridgeProvider>,
        config: BridgeWorkerConfig,
    ) -> Arc<Self> {
        Self::with_sink(store, provider, Arc::new(TracingEventSink), config)
    }

    /// Creates a worker with an explicit event sink.
    #[must_use]
    pub fn with_sink(
        store: Arc<dyn BridgeJobStore>,
        provider: Arc<dyn BridgeProvider>,
        sink: Arc<dyn EventSink>,
        config: BridgeWorkerConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            provider,
            sink,
            config,
            in_flight: Mutex::new(HashSet::new()),
        })
    }

    /// Returns the provider this worker drives.
    #[must_use]
    pub fn provider(&self) -> &Arc<dyn BridgeProvider> {
        &self.provider
    }

    /// Returns the job store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn BridgeJobStore> {
        &self.store
    }

    /// Accepts a settled cross-chain payment for bridging.
    ///
    /// Idempotent: a job already recorded under the same
    /// `source:sourceTx:destination` key is returned as-is. A new job is
    /// persisted as `pending` and handed to a background task.
    ///
    /// # Errors
    ///
    /// Returns storage errors only; a lost race on the unique key resolves
    /// to the winner's job.
    pub async fn enqueue(self: &Arc<Self>, job: BridgeJob) -> Result<BridgeJob, StoreError> {
        if let Some(existing) = self
            .store
            .get_by_idempotency_key(&job.idempotency_key)
            .await?
        {
            info!(
                job_id = %existing.id,
                idempotency_key = %existing.idempotency_key,
                "bridge job already enqueued"
            );
            return Ok(existing);
        }

        match self.store.create(&job).await {
            Ok(()) => {}
            // Lost a create race: another task persisted the same key first.
            Err(StoreError::Conflict(_)) => {
                if let Some(existing) = self
                    .store
                    .get_by_idempotency_key(&job.idempotency_key)
                    .await?
                {
                    return Ok(existing);
                }
                return Err(StoreError::Conflict(job.idempotency_key));
            }
            Err(e) => return Err(e),
        }

        self.sink.emit(BridgeEvent::for_job(
            BridgeEventType::BridgeStart,
            &job,
            self.config.max_attempts,
            None,
        ));
        self.spawn(job.clone());
        Ok(job)
    }

    /// Spawns background processing for a job.
    pub fn spawn(self: &Arc<Self>, job: BridgeJob) {
        let worker = Arc::clone(self);
        tokio::spawn(async move {
            worker.process(job).await;
        });
    }

    /// Cancels a `pending` job.
    ///
    /// # Errors
    ///
    /// [`CancelError::NotCancellable`] for any other state — once bridging
    /// starts the source burn may already be irreversible.
    pub async fn cancel(&self, job_id: &str) -> Result<BridgeJob, CancelError> {
        let mut job = self
            .store
            .get_by_id(job_id)
            .await?
            .ok_or_else(|| CancelError::NotFound(job_id.to_owned()))?;
        if job.status != BridgeJobStatus::Pending {
            return Err(CancelError::NotCancellable {
                id: job.id,
                status: job.status,
            });
        }
        job.transition(BridgeJobStatus::Cancelled)
            .map_err(|e| StoreError::Storage(e.to_string()))?;
        self.store.update(&job).await?;
        info!(job_id = %job.id, "bridge job cancelled");
        Ok(job)
    }

    /// Re-processes non-terminal jobs older than the staleness threshold.
    ///
    /// Run once at boot and then on an interval; the claim set keeps a scan
    /// from doubling up on a job a live task still owns, and
    /// [`BridgeProvider::reconcile`] keeps resumed jobs from re-burning.
    ///
    /// # Errors
    ///
    /// Propagates storage failures from the listing query.
    pub async fn recover(self: &Arc<Self>) -> Result<usize, StoreError> {
        let stale = self
            .store
            .list_unfinished(self.config.staleness_threshold.as_secs())
            .await?;
        let count = stale.len();
        if count > 0 {
            info!(count, "recovery scan found unfinished bridge jobs");
        }
        for job in stale {
            self.spawn(job);
        }
        Ok(count)
    }

    /// Starts the periodic recovery loop.
    pub fn start_recovery_loop(self: &Arc<Self>) {
        let worker = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(worker.config.recovery_interval);
            // The immediate first tick doubles as the boot-time scan.
            loop {
                ticker.tick().await;
                if let Err(e) = worker.recover().await {
                    error!(error = %e, "bridge recovery scan failed");
                }
            }
        });
    }

    /// Drives one job to a terminal state (or leaves it `bridging` if the
    /// claim is held elsewhere).
    async fn process(self: Arc<Self>, mut job: BridgeJob) {
        if !self.claim(&job.idempotency_key) {
            return;
        }

        loop {
            if job.status.is_terminal() {
                break;
            }
            job.attempts += 1;
            if job.transition(BridgeJobStatus::Bridging).is_err() {
                break;
            }
            if !self.persist(&job).await {
                break;
            }
            self.sink.emit(BridgeEvent::for_job(
                BridgeEventType::BridgeAttempt,
                &job,
                self.config.max_attempts,
                None,
            ));

            match self.run_attempt(&mut job).await {
                Ok(()) => {
                    if job.transition(BridgeJobStatus::Completed).is_ok() {
                        job.last_error = None;
                        self.persist(&job).await;
                        self.sink.emit(BridgeEvent::for_job(
                            BridgeEventType::BridgeSuccess,
                            &job,
                            self.config.max_attempts,
                            None,
                        ));
                        info!(
                            job_id = %job.id,
                            destination_tx = ?job.destination_tx_hash,
                            "bridge job completed"
                        );
                    }
                    break;
                }
                Err(e) => {
                    job.last_error = Some(e.message.clone());
                    let exhausted = job.attempts >= self.config.max_attempts;
                    let fatal = e.recoverability == Recoverability::Fatal;
                    self.sink.emit(BridgeEvent::for_job(
                        BridgeEventType::BridgeFailure,
                        &job,
                        self.config.max_attempts,
                        Some(&FailureDetails {
                            error: e.message.clone(),
                            code: e.code.clone(),
                            recoverability: Some(e.recoverability),
                        }),
                    ));

                    if fatal || exhausted {
                        if job.transition(BridgeJobStatus::Failed).is_ok() {
                            self.persist(&job).await;
                        }
                        warn!(
                            job_id = %job.id,
                            attempts = job.attempts,
                            fatal,
                            error = %e.message,
                            "bridge job failed"
                        );
                        break;
                    }

                    self.persist(&job).await;
                    tokio::time::sleep(self.backoff(job.attempts)).await;
                }
            }
        }

        self.release(&job.idempotency_key);
    }

    /// One attempt: burn (if not yet burned) or reconcile (if it was).
    ///
    /// The burn/reconcile split is the double-burn guard: once
    /// `bridge_tx_hash` is persisted, no path calls
    /// [`BridgeProvider::bridge`] again for this job.
    async fn run_attempt(&self, job: &mut BridgeJob) -> Result<(), BridgeError> {
        if job.bridge_tx_hash.is_none() {
            self.provider
                .await_source_confirmation(&job.source_network, &job.source_tx_hash)
                .await?;

            let amount = U256::from_str_radix(&job.amount, 10)
                .map_err(|e| BridgeError::fatal(format!("unparseable job amount: {e}")))?;
            let request = BridgeRequest {
                source_network: job.source_network.clone(),
                source_tx_hash: job.source_tx_hash.clone(),
                destination_network: job.destination_network.clone(),
                destination_asset: job.destination_asset,
                amount,
                recipient: job.destination_pay_to,
            };
            let result = self.provider.bridge(&request).await?;
            job.bridge_tx_hash = Some(result.bridge_tx_hash);
            job.message_id = result.message_id;
            job.touch();
            // Persist the burn before anything else can fail: a crash here
            // must resume via reconcile, not a second burn.
            self.persist(job).await;

            if let Some(destination_tx) = result.destination_tx_hash {
                job.destination_tx_hash = Some(destination_tx);
                return Ok(());
            }
        }

        match self.provider.reconcile(job).await? {
            Some(result) => match result.destination_tx_hash {
                Some(destination_tx) => {
                    job.destination_tx_hash = Some(destination_tx);
                    Ok(())
                }
                None => Err(BridgeError::transient(
                    "bridge reported completion without a destination transaction",
                )),
            },
            None => Err(BridgeError::transient(
                "bridge transfer not yet finalized on destination",
            )),
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let base = self.config.backoff_base.saturating_mul(attempt);
        let jitter_max = self.config.backoff_jitter.as_millis() as u64;
        let jitter = if jitter_max == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..jitter_max)
        };
        base + Duration::from_millis(jitter)
    }

    fn claim(&self, key: &str) -> bool {
        self.in_flight
            .lock()
            .map(|mut set| set.insert(key.to_owned()))
            .unwrap_or(false)
    }

    fn release(&self, key: &str) {
        if let Ok(mut set) = self.in_flight.lock() {
            set.remove(key);
        }
    }

    async fn persist(&self, job: &BridgeJob) -> bool {
        match self.store.update(job).await {
            Ok(()) => true,
            Err(StoreError::Terminal(_)) => {
                // Another path (admin cancel) terminalized the row first.
                warn!(job_id = %job.id, "job reached a terminal state elsewhere");
                false
            }
            Err(e) => {
                error!(job_id = %job.id, error = %e, "failed to persist bridge job");
                false
            }
        }
    }
}
