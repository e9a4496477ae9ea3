use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::DastConfig;
use crate::errors::{with_retry, ApiProbeError, RetryConfig};
use crate::models::{
    EndpointKey, Finding, Probe, ProbeOutcome, ProbeRecord, ProbeResponse, ProbeState, RequestDescriptor,
};
use super::classifier::FindingClassifier;
use super::transport::ProbeTransport;

const MAX_BACKOFF: Duration = Duration::from_secs(5);

/// Baseline responses keyed by endpoint.
pub type Baselines = DashMap<EndpointKey, ProbeResponse>;

#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    pub max_concurrent: usize,
    /// Enforced per attempt.
    pub timeout: Duration,
    pub retry: RetryConfig,
}

impl ExecutorSettings {
    pub fn from_config(config: &DastConfig) -> Self {
        Self {
            max_concurrent: config.max_concurrent.max(1),
            timeout: Duration::from_millis(config.timeout),
            retry: RetryConfig {
                max_retries: config.max_retries,
                base_delay: Duration::from_millis(config.retry_backoff_ms),
                max_delay: MAX_BACKOFF,
            },
        }
    }
}

/// Counts probes currently in flight and the highest count seen.
#[derive(Debug, Default)]
pub struct InFlightGauge {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl InFlightGauge {
    pub fn enter(self: &Arc<Self>) -> InFlightGuard {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        InFlightGuard(Arc::clone(self))
    }

    pub fn current(&self) -> usize {
        self.current.load(Ordering::SeqCst)
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

pub struct InFlightGuard(Arc<InFlightGauge>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.current.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Receives every probe that reached a terminal state, from whichever worker ran it.
pub trait ProbeHandler: Send + Sync {
    fn handle(&self, record: ProbeRecord);
}

/// Keeps completed baseline responses.
#[derive(Default)]
pub struct BaselineStore {
    baselines: Arc<Baselines>,
}

impl BaselineStore {
    pub fn baselines(&self) -> Arc<Baselines> {
        Arc::clone(&self.baselines)
    }
}

impl ProbeHandler for BaselineStore {
    fn handle(&self, record: ProbeRecord) {
        match record.outcome {
            ProbeOutcome::Completed { response } => {
                self.baselines.insert(record.probe.endpoint.key().clone(), response);
            }
            other => warn!(
                endpoint = %record.probe.endpoint.key(),
                state = %other.state(),
                "Baseline probe did not complete"
            ),
        }
    }
}

/// A terminal attack probe and what the classifier made of it.
#[derive(Debug, Clone)]
pub struct ProbeResult {
    pub record: ProbeRecord,
    pub finding: Option<Finding>,
}

/// Classifies each attack probe against its baseline and forwards it to the results sink.
pub struct ClassifyingSink {
    classifier: FindingClassifier,
    baselines: Arc<Baselines>,
    sink: mpsc::UnboundedSender<ProbeResult>,
}

impl ClassifyingSink {
    pub fn new(
        classifier: FindingClassifier,
        baselines: Arc<Baselines>,
        sink: mpsc::UnboundedSender<ProbeResult>,
    ) -> Self {
        Self { classifier, baselines, sink }
    }
}

impl ProbeHandler for ClassifyingSink {
    fn handle(&self, record: ProbeRecord) {
        let baseline = self.baselines.get(record.probe.endpoint.key());
        let finding = self.classifier.classify(&record, baseline.as_deref());
        drop(baseline);
        if let Some(f) = &finding {
            info!(endpoint = %f.endpoint, class = %f.class, confidence = f.confidence, "Finding");
        }
        if self.sink.send(ProbeResult { record, finding }).is_err() {
            warn!("Results sink closed; dropping probe result");
        }
    }
}

/// Terminal-state counts for one pool run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub submitted: usize,
    pub completed: usize,
    pub failed: usize,
    pub timed_out: usize,
    pub dropped: usize,
}

#[derive(Default)]
struct Counters {
    completed: AtomicUsize,
    failed: AtomicUsize,
    timed_out: AtomicUsize,
}

impl Counters {
    fn record(&self, state: ProbeState) {
        let counter = match state {
            ProbeState::Completed => &self.completed,
            ProbeState::Failed => &self.failed,
            ProbeState::TimedOut => &self.timed_out,
            ProbeState::Pending | ProbeState::InFlight => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Runs probes through a fixed pool of `max_concurrent` workers sharing one queue.
pub struct ProbeExecutor {
    transport: Arc<dyn ProbeTransport>,
    settings: ExecutorSettings,
    gauge: Arc<InFlightGauge>,
    cancel: CancellationToken,
}

impl ProbeExecutor {
    pub fn new(transport: Arc<dyn ProbeTransport>, settings: ExecutorSettings, cancel: CancellationToken) -> Self {
        Self {
            transport,
            settings,
            gauge: Arc::new(InFlightGauge::default()),
            cancel,
        }
    }

    /// Shared across every run of this executor, so `peak` covers baselines and attacks.
    pub fn gauge(&self) -> &InFlightGauge {
        &self.gauge
    }

    /// Run `probes` to completion or cancellation. On cancellation, probes not
    /// yet started are dropped and in-flight ones finish first.
    pub async fn run(&self, probes: Vec<Probe>, handler: Arc<dyn ProbeHandler>) -> PoolStats {
        let submitted = probes.len();
        if submitted == 0 {
            return PoolStats::default();
        }

        let queue = Arc::new(Mutex::new(VecDeque::from(probes)));
        let counters = Arc::new(Counters::default());
        let workers = self.settings.max_concurrent.min(submitted);
        debug!(submitted, workers, "Starting probe pool");

        let handles: Vec<_> = (0..workers).map(|worker_id| {
            let queue = Arc::clone(&queue);
            let counters = Arc::clone(&counters);
            let handler = Arc::clone(&handler);
            let transport = Arc::clone(&self.transport);
            let gauge = Arc::clone(&self.gauge);
            let settings = self.settings.clone();
            let cancel = self.cancel.clone();

            tokio::spawn(async move {
                loop {
                    if cancel.is_cancelled() {
                        break;
                    }
                    let next = queue.lock().await.pop_front();
                    let Some(mut probe) = next else { break };

                    let _in_flight = gauge.enter();
                    if let Err(e) = probe.advance(ProbeState::InFlight) {
                        error!(probe = probe.id, error = %e, "Probe dequeued in unexpected state");
                        continue;
                    }

                    let outcome = execute(transport.as_ref(), &settings, &probe.request).await;
                    if let Err(e) = probe.advance(outcome.state()) {
                        error!(probe = probe.id, error = %e, "Probe state transition rejected");
                    }
                    debug!(worker = worker_id, probe = probe.id, state = %outcome.state(), "Probe finished");
                    counters.record(outcome.state());
                    handler.handle(ProbeRecord { probe, outcome });
                }
            })
        }).collect();

        let results = futures::future::join_all(handles).await;
        for (i, result) in results.iter().enumerate() {
            if let Err(e) = result {
                error!(worker = i, error = %e, "Probe worker panicked");
            }
        }

        let dropped = {
            let mut remaining = queue.lock().await;
            let n = remaining.len();
            remaining.clear();
            n
        };
        if dropped > 0 {
            info!(dropped, "Cancelled; pending probes dropped");
        }

        PoolStats {
            submitted,
            completed: counters.completed.load(Ordering::Relaxed),
            failed: counters.failed.load(Ordering::Relaxed),
            timed_out: counters.timed_out.load(Ordering::Relaxed),
            dropped,
        }
    }

    /// Run one benign probe per endpoint and keep the completed responses.
    pub async fn run_baselines(&self, probes: Vec<Probe>) -> (Arc<Baselines>, PoolStats) {
        let store = Arc::new(BaselineStore::default());
        let stats = self.run(probes, store.clone()).await;
        (store.baselines(), stats)
    }
}

/// One probe: per-attempt timeout, transient failures retried with backoff.
async fn execute(
    transport: &dyn ProbeTransport,
    settings: &ExecutorSettings,
    request: &RequestDescriptor,
) -> ProbeOutcome {
    let timeout = settings.timeout;
    let result = with_retry("probe", &settings.retry, move || async move {
        match tokio::time::timeout(timeout, transport.send(request)).await {
            Ok(sent) => sent.map_err(ApiProbeError::from),
            Err(_) => Err(ApiProbeError::ProbeTimeout(format!("{} {}", request.method, request.url))),
        }
    })
    .await;

    match result {
        Ok(response) => ProbeOutcome::Completed { response },
        Err((ApiProbeError::ProbeTimeout(_), _)) => ProbeOutcome::TimedOut { timeout_ms: timeout.as_millis() as u64 },
        Err((e, attempts)) => ProbeOutcome::Failed { error: e.to_string(), attempts },
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::atomic::AtomicU32;

    use async_trait::async_trait;

    use super::*;
    use crate::dast::transport::TransportError;
    use crate::models::{Endpoint, HttpMethod, SourceFormat};

    /// Answers after a fixed delay and tracks its own concurrency.
    struct SlowTransport {
        delay: Duration,
        active: AtomicUsize,
        max_active: AtomicUsize,
        calls: AtomicU32,
    }

    impl SlowTransport {
        fn new(delay: Duration) -> Self {
            Self { delay, active: AtomicUsize::new(0), max_active: AtomicUsize::new(0), calls: AtomicU32::new(0) }
        }
    }

    #[async_trait]
    impl ProbeTransport for SlowTransport {
        async fn send(&self, _request: &RequestDescriptor) -> Result<ProbeResponse, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(ProbeResponse {
                status: 200,
                headers: BTreeMap::new(),
                body: "ok".into(),
                elapsed_ms: self.delay.as_millis() as u64,
            })
        }
    }

    /// Fails transiently `failures` times, then answers.
    struct FlakyTransport {
        failures: u32,
        calls: AtomicU32,
        error: TransportError,
    }

    #[async_trait]
    impl ProbeTransport for FlakyTransport {
        async fn send(&self, _request: &RequestDescriptor) -> Result<ProbeResponse, TransportError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) < self.failures {
                return Err(self.error.clone());
            }
            Ok(ProbeResponse { status: 200, headers: BTreeMap::new(), body: String::new(), elapsed_ms: 1 })
        }
    }

    struct Collect(std::sync::Mutex<Vec<ProbeRecord>>);

    impl ProbeHandler for Collect {
        fn handle(&self, record: ProbeRecord) {
            self.0.lock().unwrap().push(record);
        }
    }

    fn probes(n: usize) -> Vec<Probe> {
        (0..n).map(|i| {
            let path = format!("/items/{}", i);
            let endpoint = Arc::new(Endpoint::new(HttpMethod::Get, path, SourceFormat::OpenApi, "openapi"));
            let request = RequestDescriptor {
                method: HttpMethod::Get,
                url: format!("http://localhost/items/{}", i),
                headers: BTreeMap::new(),
                body: None,
            };
            Probe::new(i, endpoint, None, request)
        }).collect()
    }

    fn settings(max_concurrent: usize, timeout_ms: u64, max_retries: u32) -> ExecutorSettings {
        ExecutorSettings {
            max_concurrent,
            timeout: Duration::from_millis(timeout_ms),
            retry: RetryConfig {
                max_retries,
                base_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(5),
            },
        }
    }

    #[tokio::test]
    async fn test_concurrency_bound_respected() {
        let transport = Arc::new(SlowTransport::new(Duration::from_millis(50)));
        let executor = ProbeExecutor::new(transport.clone(), settings(2, 1_000, 0), CancellationToken::new());
        let collected = Arc::new(Collect(std::sync::Mutex::new(Vec::new())));

        let stats = executor.run(probes(5), collected.clone()).await;

        assert_eq!(stats.submitted, 5);
        assert_eq!(stats.completed, 5);
        assert!(executor.gauge().peak() <= 2);
        assert!(transport.max_active.load(Ordering::SeqCst) <= 2);
        assert_eq!(executor.gauge().current(), 0);

        let records = collected.0.lock().unwrap();
        assert_eq!(records.len(), 5);
        assert!(records.iter().all(|r| r.probe.state().is_terminal()));
    }

    #[tokio::test]
    async fn test_transient_failures_retried() {
        let transport = Arc::new(FlakyTransport {
            failures: 2,
            calls: AtomicU32::new(0),
            error: TransportError::Transient("connection reset".into()),
        });
        let executor = ProbeExecutor::new(transport.clone(), settings(1, 1_000, 2), CancellationToken::new());
        let collected = Arc::new(Collect(std::sync::Mutex::new(Vec::new())));
        let stats = executor.run(probes(1), collected.clone()).await;
        assert_eq!(stats.completed, 1);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retries_exhausted_is_failed() {
        let transport = Arc::new(FlakyTransport {
            failures: 10,
            calls: AtomicU32::new(0),
            error: TransportError::Transient("dns failure".into()),
        });
        let executor = ProbeExecutor::new(transport.clone(), settings(1, 1_000, 2), CancellationToken::new());
        let collected = Arc::new(Collect(std::sync::Mutex::new(Vec::new())));
        let stats = executor.run(probes(1), collected.clone()).await;
        assert_eq!(stats.failed, 1);
        let records = collected.0.lock().unwrap();
        match &records[0].outcome {
            ProbeOutcome::Failed { error, attempts } => {
                assert_eq!(*attempts, 3);
                assert!(error.contains("dns failure"));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_non_transient_error_fails_immediately() {
        let transport = Arc::new(FlakyTransport {
            failures: 10,
            calls: AtomicU32::new(0),
            error: TransportError::Request("invalid header".into()),
        });
        let executor = ProbeExecutor::new(transport.clone(), settings(1, 1_000, 2), CancellationToken::new());
        let stats = executor.run(probes(1), Arc::new(Collect(std::sync::Mutex::new(Vec::new())))).await;
        assert_eq!(stats.failed, 1);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_timeout_not_retried() {
        let transport = Arc::new(SlowTransport::new(Duration::from_millis(500)));
        let executor = ProbeExecutor::new(transport.clone(), settings(1, 20, 2), CancellationToken::new());
        let collected = Arc::new(Collect(std::sync::Mutex::new(Vec::new())));
        let stats = executor.run(probes(1), collected.clone()).await;
        assert_eq!(stats.timed_out, 1);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
        let records = collected.0.lock().unwrap();
        assert_eq!(records[0].outcome, ProbeOutcome::TimedOut { timeout_ms: 20 });
        assert_eq!(records[0].probe.state(), ProbeState::TimedOut);
    }

    #[tokio::test]
    async fn test_cancellation_drops_pending_and_finishes_in_flight() {
        let transport = Arc::new(SlowTransport::new(Duration::from_millis(100)));
        let cancel = CancellationToken::new();
        let executor = ProbeExecutor::new(transport.clone(), settings(2, 1_000, 0), cancel.clone());
        let collected = Arc::new(Collect(std::sync::Mutex::new(Vec::new())));

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            trigger.cancel();
        });
        let stats = executor.run(probes(6), collected.clone()).await;

        assert_eq!(stats.completed, 2);
        assert_eq!(stats.dropped, 4);
        assert_eq!(collected.0.lock().unwrap().len(), 2);
        assert_eq!(executor.gauge().current(), 0);
    }

    #[tokio::test]
    async fn test_baselines_stored_by_endpoint() {
        let transport = Arc::new(SlowTransport::new(Duration::from_millis(1)));
        let executor = ProbeExecutor::new(transport, settings(4, 1_000, 0), CancellationToken::new());
        let batch = probes(3);
        let key = batch[1].endpoint.key().clone();
        let (baselines, stats) = executor.run_baselines(batch).await;
        assert_eq!(stats.completed, 3);
        assert_eq!(baselines.len(), 3);
        assert_eq!(baselines.get(&key).map(|r| r.status), Some(200));
    }
}
