use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::ValidatedConfig;
use crate::dast::{
    ClassifyingSink, ExecutorSettings, FindingClassifier, PoolStats, ProbeExecutor, ProbeResult, ProbeTransport,
    RequestBuilder,
};
use crate::enrichment::EnrichmentPipeline;
use crate::errors::ApiProbeError;
use crate::ingest::{IngestSource, IngestorRegistry};
use crate::models::{
    group_findings, DocumentationSummary, Endpoint, Finding, Probe, ProbeStats, RunMetadata, RunReport, SourceFailure,
    SourceSuccess,
};
use crate::payloads::PayloadGenerator;
use crate::rag::{load_sources, DocumentationMatcher, EmbeddingProvider};
use super::events::ScanEvent;
use super::phase::ScanPhase;

/// Drives one scan: ingestion, enrichment, documentation matching, then
/// baseline and attack probes against the target.
pub struct ScanPipeline {
    config: ValidatedConfig,
    registry: IngestorRegistry,
    transport: Arc<dyn ProbeTransport>,
    embedder: Arc<dyn EmbeddingProvider>,
    target: Option<String>,
    cancel_token: CancellationToken,
    event_tx: Option<mpsc::UnboundedSender<ScanEvent>>,
    /// Sources that failed before reaching the registry, e.g. unreadable files.
    prior_failures: Vec<SourceFailure>,
}

impl ScanPipeline {
    pub fn new(
        config: ValidatedConfig,
        transport: Arc<dyn ProbeTransport>,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Self {
        let registry = IngestorRegistry::from_config(&config.ingestors);
        Self {
            config,
            registry,
            transport,
            embedder,
            target: None,
            cancel_token: CancellationToken::new(),
            event_tx: None,
            prior_failures: Vec::new(),
        }
    }

    /// Base URL to probe. Without one the run stops after documentation matching.
    pub fn with_target(mut self, base_url: impl Into<String>) -> Self {
        self.target = Some(base_url.into());
        self
    }

    /// Replace the pipeline's cancel token with an external one (e.g. a Ctrl-C handler).
    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel_token = token;
        self
    }

    /// Attach an event channel for progress reporting.
    pub fn with_event_channel(mut self, tx: mpsc::UnboundedSender<ScanEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    /// Record sources that could not be read. They are reported alongside
    /// sources that failed to parse.
    pub fn with_source_failures(mut self, failures: Vec<SourceFailure>) -> Self {
        self.prior_failures.extend(failures);
        self
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    fn emit(&self, event: ScanEvent) {
        if let Some(ref tx) = self.event_tx {
            let _ = tx.send(event);
        }
    }

    fn emit_phase_started(&self, phase: ScanPhase) {
        info!(phase = phase.display_name(), "Phase started");
        self.emit(ScanEvent::PhaseStarted { phase, display_name: phase.display_name().to_string() });
    }

    fn emit_phase_completed(&self, phase: ScanPhase) {
        self.emit(ScanEvent::PhaseCompleted { phase, display_name: phase.display_name().to_string() });
    }

    fn warn_all(&self, warnings: &mut Vec<String>, new: impl IntoIterator<Item = String>) {
        for message in new {
            warn!(message = %message, "Scan warning");
            self.emit(ScanEvent::Warning { message: message.clone() });
            warnings.push(message);
        }
    }

    fn check_cancelled(&self) -> Result<(), ApiProbeError> {
        if self.cancel_token.is_cancelled() {
            info!("Scan cancelled before probing");
            self.emit(ScanEvent::ScanFailed { error: "scan cancelled".into() });
            Err(ApiProbeError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Run the scan. Fails only when no source yields endpoints, when
    /// cancelled before probing starts, or when the target URL is unusable.
    pub async fn run(&self, sources: Vec<IngestSource>) -> Result<RunReport, ApiProbeError> {
        let run_id = uuid::Uuid::new_v4().to_string();
        let started_at = Utc::now();
        let clock = Instant::now();
        let mut warnings = Vec::new();

        info!(run_id = %run_id, sources = sources.len(), target = ?self.target, "Starting scan");
        self.emit(ScanEvent::ScanStarted { run_id: run_id.clone(), target: self.target.clone() });

        // Ingestion
        self.emit_phase_started(ScanPhase::Ingestion);
        let (mut endpoints, successes, failures) = self.ingest_all(&sources, &mut warnings);
        self.emit_phase_completed(ScanPhase::Ingestion);
        if endpoints.is_empty() {
            self.emit(ScanEvent::ScanFailed { error: ApiProbeError::NoEndpoints.to_string() });
            return Err(ApiProbeError::NoEndpoints);
        }
        self.check_cancelled()?;

        // Enrichment
        self.emit_phase_started(ScanPhase::Enrichment);
        let enrichment = EnrichmentPipeline::from_config(&self.config.enrichment);
        let enrichment_warnings = enrichment.run(&mut endpoints).await;
        let enrichment_warnings = enrichment_warnings.into_iter().map(|w| ApiProbeError::from(w).to_string());
        self.warn_all(&mut warnings, enrichment_warnings);
        self.emit_phase_completed(ScanPhase::Enrichment);
        self.check_cancelled()?;

        // Documentation matching
        self.emit_phase_started(ScanPhase::DocumentationMatching);
        let documentation = self.match_documentation(&mut endpoints, &mut warnings).await;
        self.emit_phase_completed(ScanPhase::DocumentationMatching);

        let endpoint_order: Vec<_> = endpoints.iter().map(|e| (e.key().clone(), e.is_documented())).collect();
        let endpoint_count = endpoints.len();

        let (probes, findings) = match &self.target {
            Some(target) => {
                self.check_cancelled()?;
                self.probe(target, endpoints).await?
            }
            None => {
                info!("No target; skipping probes");
                (ProbeStats::default(), Vec::new())
            }
        };

        let cancelled = self.cancel_token.is_cancelled();
        let findings = group_findings(findings, &endpoint_order);
        let report = RunReport {
            metadata: RunMetadata {
                run_id,
                target: self.target.clone(),
                started_at,
                finished_at: Utc::now(),
                tool_version: env!("CARGO_PKG_VERSION").to_string(),
                build: build_label(),
                cancelled,
            },
            sources: successes,
            ingestion_failures: failures,
            warnings,
            endpoint_count,
            documentation,
            probes,
            findings,
        };

        info!(
            endpoints = report.endpoint_count,
            findings = report.total_findings(),
            cancelled,
            "Scan complete"
        );
        self.emit(ScanEvent::ScanCompleted {
            total_findings: report.total_findings(),
            total_duration_ms: clock.elapsed().as_millis() as u64,
            cancelled,
        });
        Ok(report)
    }

    /// Ingest every source independently. Later sources never replace an
    /// endpoint identity an earlier source produced.
    fn ingest_all(
        &self,
        sources: &[IngestSource],
        warnings: &mut Vec<String>,
    ) -> (Vec<Endpoint>, Vec<SourceSuccess>, Vec<SourceFailure>) {
        let mut endpoints: Vec<Endpoint> = Vec::new();
        let mut seen = HashSet::new();
        let mut successes = Vec::new();
        let mut failures = Vec::new();

        for failure in &self.prior_failures {
            self.emit(ScanEvent::SourceFailed {
                identifier: failure.identifier.clone(),
                error: failure.message.clone(),
            });
            failures.push(failure.clone());
        }

        for source in sources {
            let result = self.registry.ingest(source).and_then(|(ingestor, ingested)| {
                match ingested.first().map(|e| e.source_format()) {
                    Some(format) => Ok((ingestor, format, ingested)),
                    None => Err(ApiProbeError::ingestion("no operations found", &source.content)),
                }
            });
            match result {
                Ok((ingestor, format, ingested)) => {
                    let count = ingested.len();
                    let mut duplicates = 0;
                    for endpoint in ingested {
                        if seen.insert(endpoint.key().clone()) {
                            endpoints.push(endpoint);
                        } else {
                            duplicates += 1;
                        }
                    }
                    if duplicates > 0 {
                        self.warn_all(warnings, [format!(
                            "{} endpoint(s) from {} already ingested from an earlier source",
                            duplicates, source.identifier
                        )]);
                    }
                    info!(source = %source.identifier, ingestor, endpoints = count, "Source ingested");
                    self.emit(ScanEvent::SourceIngested {
                        identifier: source.identifier.clone(),
                        ingestor: ingestor.to_string(),
                        endpoints: count,
                    });
                    successes.push(SourceSuccess {
                        identifier: source.identifier.clone(),
                        ingestor: ingestor.to_string(),
                        format,
                        endpoints: count,
                    });
                }
                Err(e) => {
                    warn!(source = %source.identifier, error = %e, "Source could not be ingested");
                    self.emit(ScanEvent::SourceFailed { identifier: source.identifier.clone(), error: e.to_string() });
                    failures.push(SourceFailure::from_error(&source.identifier, &e));
                }
            }
        }
        (endpoints, successes, failures)
    }

    async fn match_documentation(
        &self,
        endpoints: &mut [Endpoint],
        warnings: &mut Vec<String>,
    ) -> Vec<DocumentationSummary> {
        let rag = &self.config.rag;
        let loaded = load_sources(&rag.documentation_sources, rag.chunk_size).await;
        self.warn_all(warnings, loaded.warnings);

        let matcher = DocumentationMatcher::new(Arc::clone(&self.embedder), rag);
        let set = matcher.match_endpoints(endpoints, loaded.chunks).await;
        self.warn_all(warnings, set.warnings.iter().cloned());
        set.summaries(endpoints)
    }

    async fn probe(&self, target: &str, endpoints: Vec<Endpoint>) -> Result<(ProbeStats, Vec<Finding>), ApiProbeError> {
        let dast = &self.config.dast;
        let builder = RequestBuilder::new(target, &dast.custom_headers)?;
        let generator = PayloadGenerator::from_config(dast);
        let endpoints: Vec<Arc<Endpoint>> = endpoints.into_iter().map(Arc::new).collect();

        let mut next_id = 0;
        let mut baseline_probes = Vec::with_capacity(endpoints.len());
        let mut attack_probes = Vec::new();
        for endpoint in &endpoints {
            baseline_probes.push(Probe::new(next_id, Arc::clone(endpoint), None, builder.baseline(endpoint)?));
            next_id += 1;
        }
        for endpoint in &endpoints {
            for payload in generator.generate(endpoint) {
                let request = builder.attack(endpoint, &payload)?;
                attack_probes.push(Probe::new(next_id, Arc::clone(endpoint), Some(Arc::new(payload)), request));
                next_id += 1;
            }
        }

        let executor = ProbeExecutor::new(
            Arc::clone(&self.transport),
            ExecutorSettings::from_config(dast),
            self.cancel_token.clone(),
        );

        self.emit_phase_started(ScanPhase::Baseline);
        self.emit(ScanEvent::ProbesScheduled { phase: ScanPhase::Baseline, count: baseline_probes.len() });
        let (baselines, baseline_stats) = executor.run_baselines(baseline_probes).await;
        self.emit_phase_completed(ScanPhase::Baseline);
        info!(baselines = baselines.len(), "Baselines recorded");

        self.emit_phase_started(ScanPhase::Probing);
        self.emit(ScanEvent::ProbesScheduled { phase: ScanPhase::Probing, count: attack_probes.len() });
        let (tx, mut rx) = mpsc::unbounded_channel::<ProbeResult>();
        let sink = ClassifyingSink::new(FindingClassifier::new(dast), baselines, tx);

        let collect = async {
            let mut findings = Vec::new();
            while let Some(result) = rx.recv().await {
                self.emit(ScanEvent::ProbeFinished {
                    probe_id: result.record.probe.id,
                    state: result.record.outcome.state(),
                });
                if let Some(finding) = result.finding {
                    self.emit(ScanEvent::FindingDiscovered {
                        title: finding.title(),
                        severity: finding.severity,
                        class: finding.class,
                    });
                    findings.push(finding);
                }
            }
            findings
        };
        let (attack_stats, findings) = tokio::join!(executor.run(attack_probes, Arc::new(sink)), collect);
        self.emit_phase_completed(ScanPhase::Probing);

        let stats = merge_stats(&baseline_stats, &attack_stats, executor.gauge().peak());
        info!(
            submitted = stats.submitted,
            completed = stats.completed,
            failed = stats.failed,
            timed_out = stats.timed_out,
            dropped = stats.dropped,
            peak_in_flight = stats.peak_in_flight,
            "Probing finished"
        );
        Ok((stats, findings))
    }
}

fn merge_stats(baselines: &PoolStats, attacks: &PoolStats, peak_in_flight: usize) -> ProbeStats {
    ProbeStats {
        submitted: baselines.submitted + attacks.submitted,
        completed: baselines.completed + attacks.completed,
        failed: baselines.failed + attacks.failed,
        timed_out: baselines.timed_out + attacks.timed_out,
        dropped: baselines.dropped + attacks.dropped,
        baselines: baselines.submitted,
        peak_in_flight,
    }
}

fn build_label() -> Option<String> {
    let timestamp = option_env!("BUILD_TIMESTAMP")?;
    Some(match option_env!("GIT_HASH") {
        Some(hash) => format!("{} ({})", hash, timestamp),
        None => timestamp.to_string(),
    })
}
