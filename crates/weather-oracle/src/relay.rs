//! The relay loop: ledger events in, weather lookups out, completions back.
//!
//! For every `NewRequest` the relay fetches the temperature with a fixed
//! number of attempts, falls back to the sentinel when all of them fail, and
//! submits exactly one completion. A failed submission is logged and not
//! retried. The ledger rejects duplicate completions.

use oracle_ledger::{LedgerEvent, RequestId};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch, Semaphore};
use tokio::task::{JoinError, JoinSet};

use crate::chain::LedgerClient;
use crate::config::RelayConfig;
use crate::error::Result;
use crate::fetcher::{FetchFailed, WeatherSource};

/// Attempt bound and pause between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &RelayConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            delay: config.retry_delay(),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RelayConfig::default())
    }
}

/// Fetch with up to `policy.max_attempts` tries and a fixed pause between them.
///
/// Returns the value and the attempt that produced it, or the last failure.
pub async fn fetch_with_retry<W: WeatherSource + ?Sized>(
    source: &W,
    lat: i64,
    lon: i64,
    policy: RetryPolicy,
) -> std::result::Result<(String, u32), FetchFailed> {
    let mut last_error = FetchFailed::new("no attempt made");
    for attempt in 1..=policy.max_attempts {
        match source.fetch(lat, lon).await {
            Ok(value) => return Ok((value, attempt)),
            Err(e) => {
                log::warn!(
                    "[Relay] fetch attempt {}/{} for ({}, {}) failed: {}",
                    attempt,
                    policy.max_attempts,
                    lat,
                    lon,
                    e
                );
                last_error = e;
                if attempt < policy.max_attempts && !policy.delay.is_zero() {
                    tokio::time::sleep(policy.delay).await;
                }
            }
        }
    }
    Err(last_error)
}

/// What happened to one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Fetched value submitted
    Completed { value: String, attempts: u32 },
    /// Every attempt failed; the sentinel was submitted
    Fallback { value: String, attempts: u32 },
    /// The ledger did not accept the completion
    SubmitFailed { value: String, error: String },
}

/// Processes single requests; cheap to clone into tasks.
pub struct Worker<L, W> {
    ledger: Arc<L>,
    source: Arc<W>,
    policy: RetryPolicy,
    sentinel: String,
}

impl<L, W> Clone for Worker<L, W> {
    fn clone(&self) -> Self {
        Self {
            ledger: self.ledger.clone(),
            source: self.source.clone(),
            policy: self.policy,
            sentinel: self.sentinel.clone(),
        }
    }
}

impl<L: LedgerClient, W: WeatherSource> Worker<L, W> {
    pub fn new(ledger: Arc<L>, source: Arc<W>, config: &RelayConfig) -> Self {
        Self {
            ledger,
            source,
            policy: RetryPolicy::from_config(config),
            sentinel: config.sentinel.clone(),
        }
    }

    /// Fetch, fall back if needed, and complete one request.
    pub async fn process(&self, request_id: RequestId, lat: i64, lon: i64) -> Outcome {
        let (value, fetched, attempts) =
            match fetch_with_retry(self.source.as_ref(), lat, lon, self.policy).await {
                Ok((value, attempt)) => (value, true, attempt),
                Err(e) => {
                    log::error!(
                        "[Relay] {} giving up after {} attempts ({}), submitting sentinel {:?}",
                        request_id,
                        self.policy.max_attempts,
                        e,
                        self.sentinel
                    );
                    (self.sentinel.clone(), false, self.policy.max_attempts)
                }
            };

        match self.ledger.complete(request_id, value.clone()).await {
            Ok(index) => {
                log::info!(
                    "[Relay] completed request #{} {} with {}",
                    index,
                    request_id,
                    value
                );
                if fetched {
                    Outcome::Completed { value, attempts }
                } else {
                    Outcome::Fallback { value, attempts }
                }
            }
            Err(e) => {
                log::error!("[Relay] completion of {} failed: {}", request_id, e);
                Outcome::SubmitFailed {
                    value,
                    error: e.to_string(),
                }
            }
        }
    }
}

/// Pause before retrying a failed read of pending requests.
const SWEEP_RETRY: Duration = Duration::from_secs(1);

/// Whether the loop should keep going after a dispatch or a sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

/// Requests handed to tasks and not yet reaped.
struct InFlight {
    permits: Arc<Semaphore>,
    tasks: JoinSet<(RequestId, Outcome)>,
    ids: HashSet<RequestId>,
}

impl InFlight {
    fn new(max_in_flight: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max_in_flight)),
            tasks: JoinSet::new(),
            ids: HashSet::new(),
        }
    }

    fn contains(&self, request_id: &RequestId) -> bool {
        self.ids.contains(request_id)
    }

    fn len(&self) -> usize {
        self.ids.len()
    }

    /// Collect finished tasks without waiting.
    fn reap(&mut self) {
        while let Some(joined) = self.tasks.try_join_next() {
            self.finish(joined);
        }
    }

    /// Wait for every task still running.
    async fn drain(&mut self) {
        while let Some(joined) = self.tasks.join_next().await {
            self.finish(joined);
        }
    }

    fn finish(&mut self, joined: std::result::Result<(RequestId, Outcome), JoinError>) {
        match joined {
            Ok((request_id, outcome)) => {
                self.ids.remove(&request_id);
                log::debug!("[Relay] {} {:?}", request_id, outcome);
            }
            Err(e) => log::error!("[Relay] request task failed: {}", e),
        }
    }
}

/// The long-running relay.
pub struct Relay<L, W> {
    worker: Worker<L, W>,
    max_in_flight: usize,
    sweep_pending: bool,
}

impl<L: LedgerClient, W: WeatherSource> Relay<L, W> {
    pub fn new(ledger: Arc<L>, source: Arc<W>, config: &RelayConfig) -> Self {
        Self {
            worker: Worker::new(ledger, source, config),
            max_in_flight: config.max_in_flight.max(1),
            sweep_pending: config.sweep_pending,
        }
    }

    pub fn worker(&self) -> &Worker<L, W> {
        &self.worker
    }

    /// Run until the shutdown signal fires or the event stream closes.
    ///
    /// Requests already running when shutdown fires are allowed to finish;
    /// queued ones are left Pending for the next start. A failed read of
    /// pending requests is retried and never stops the loop.
    pub async fn run(self, mut shutdown: watch::Receiver<()>) -> Result<()> {
        // Subscribe before sweeping so nothing emitted in between is missed.
        let mut events = self.worker.ledger.subscribe();
        let mut in_flight = InFlight::new(self.max_in_flight);
        let mut sweep_due = self.sweep_pending;

        log::info!(
            "[Relay] starting (max_in_flight={}, attempts={}, retry_delay={:?})",
            self.max_in_flight,
            self.worker.policy.max_attempts,
            self.worker.policy.delay
        );

        loop {
            if sweep_due {
                match self.sweep(&mut in_flight, &mut shutdown).await {
                    Ok(Flow::Continue) => sweep_due = false,
                    Ok(Flow::Stop) => break,
                    Err(e) => log::warn!(
                        "[Relay] reading pending requests failed, retrying in {:?}: {}",
                        SWEEP_RETRY,
                        e
                    ),
                }
            }
            in_flight.reap();

            tokio::select! {
                biased;
                _ = shutdown.changed() => {
                    log::info!("[Relay] shutdown signal received");
                    break;
                }
                _ = tokio::time::sleep(SWEEP_RETRY), if sweep_due => {}
                received = events.recv() => match received {
                    Ok(LedgerEvent::NewRequest { request_id, lat, lon, .. }) => {
                        let flow = self
                            .dispatch(&mut in_flight, &mut shutdown, request_id, lat, lon)
                            .await;
                        if flow == Flow::Stop {
                            break;
                        }
                    }
                    Ok(LedgerEvent::RequestCompleted { .. }) => {}
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        log::warn!("[Relay] missed {} events, re-reading pending requests", missed);
                        sweep_due = true;
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        log::info!("[Relay] event stream closed");
                        break;
                    }
                }
            }
        }

        if in_flight.len() > 0 {
            log::info!("[Relay] waiting for {} in-flight requests", in_flight.len());
        }
        in_flight.drain().await;
        log::info!("[Relay] stopped");
        Ok(())
    }

    /// Dispatch every Pending request that is not already running.
    async fn sweep(
        &self,
        in_flight: &mut InFlight,
        shutdown: &mut watch::Receiver<()>,
    ) -> Result<Flow> {
        let pending = tokio::select! {
            biased;
            _ = shutdown.changed() => return Ok(Flow::Stop),
            pending = self.worker.ledger.pending_requests() => pending?,
        };
        let fresh: Vec<_> = pending
            .into_iter()
            .filter(|(_, r)| !in_flight.contains(&r.request_id))
            .collect();
        if !fresh.is_empty() {
            log::info!("[Relay] picking up {} pending requests", fresh.len());
        }
        for (_, request) in fresh {
            let flow = self
                .dispatch(in_flight, shutdown, request.request_id, request.lat, request.lon)
                .await;
            if flow == Flow::Stop {
                return Ok(Flow::Stop);
            }
        }
        Ok(Flow::Continue)
    }

    /// Wait for a free slot, then process the request on its own task.
    ///
    /// Ids already running are skipped. Stops waiting when shutdown fires.
    async fn dispatch(
        &self,
        in_flight: &mut InFlight,
        shutdown: &mut watch::Receiver<()>,
        request_id: RequestId,
        lat: i64,
        lon: i64,
    ) -> Flow {
        if in_flight.contains(&request_id) {
            return Flow::Continue;
        }
        let permits = in_flight.permits.clone();
        let permit = tokio::select! {
            biased;
            _ = shutdown.changed() => return Flow::Stop,
            acquired = permits.acquire_owned() => match acquired {
                Ok(permit) => permit,
                Err(_) => return Flow::Stop,
            },
        };
        log::info!("[Relay] new request {} at ({}, {})", request_id, lat, lon);

        in_flight.ids.insert(request_id);
        let worker = self.worker.clone();
        in_flight.tasks.spawn(async move {
            let outcome = worker.process(request_id, lat, lon).await;
            drop(permit);
            (request_id, outcome)
        });
        Flow::Continue
    }
}
