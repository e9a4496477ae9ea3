use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use console::style;

use crate::models::Severity;
use crate::pipeline::{ScanEvent, ScanPhase, PHASES};

/// Indicatif progress display fed by `ScanEvent`s.
pub struct ScanProgress {
    multi: MultiProgress,
    phase_bar: Option<ProgressBar>,
    probe_bar: Option<ProgressBar>,
    status_bar: ProgressBar,
    findings_count: usize,
    warnings_count: usize,
    start_time: std::time::Instant,
}

impl ScanProgress {
    pub fn new() -> Self {
        Self::with_target(ProgressDrawTarget::stderr())
    }

    /// Draws nothing; used with `--quiet`.
    pub fn hidden() -> Self {
        Self::with_target(ProgressDrawTarget::hidden())
    }

    fn with_target(target: ProgressDrawTarget) -> Self {
        let multi = MultiProgress::with_draw_target(target);

        let status_bar = multi.add(ProgressBar::new_spinner());
        status_bar.set_style(
            ProgressStyle::default_spinner()
                .template("  {spinner:.cyan} {msg}")
                .unwrap()
        );
        status_bar.set_message("Initializing scan...");
        status_bar.enable_steady_tick(std::time::Duration::from_millis(120));

        Self {
            multi,
            phase_bar: None,
            probe_bar: None,
            status_bar,
            findings_count: 0,
            warnings_count: 0,
            start_time: std::time::Instant::now(),
        }
    }

    pub fn handle_event(&mut self, event: &ScanEvent) {
        match event {
            ScanEvent::ScanStarted { target, .. } => {
                let bar = self.multi.insert_before(&self.status_bar, ProgressBar::new(PHASES.len() as u64));
                bar.set_style(
                    ProgressStyle::default_bar()
                        .template("  {bar:30.cyan/dark_gray} {pos}/{len} phases | {msg}")
                        .unwrap()
                        .progress_chars("█▓░")
                );
                bar.set_message(match target {
                    Some(t) => format!("Scanning {}", t),
                    None => "Analyzing sources".to_string(),
                });
                self.phase_bar = Some(bar);
                self.update_status();
            }
            ScanEvent::PhaseStarted { display_name, .. } => {
                if let Some(bar) = &self.phase_bar {
                    bar.set_message(display_name.clone());
                }
                self.update_status();
            }
            ScanEvent::PhaseCompleted { phase, .. } => {
                if let Some(bar) = &self.phase_bar {
                    bar.inc(1);
                }
                if matches!(phase, ScanPhase::Baseline | ScanPhase::Probing) {
                    if let Some(bar) = self.probe_bar.take() {
                        bar.finish_and_clear();
                    }
                }
            }
            ScanEvent::SourceIngested { identifier, ingestor, endpoints } => {
                self.println(&format!(
                    "  {} {} ({}, {} endpoints)",
                    style("✓").green(), identifier, ingestor, endpoints
                ));
            }
            ScanEvent::SourceFailed { identifier, error } => {
                self.println(&format!("  {} {}: {}", style("✗").red(), identifier, error));
            }
            ScanEvent::ProbesScheduled { phase, count } => {
                let bar = self.multi.insert_before(&self.status_bar, ProgressBar::new(*count as u64));
                bar.set_style(
                    ProgressStyle::default_bar()
                        .template("    {bar:30.yellow/dark_gray} {pos}/{len} {msg}")
                        .unwrap()
                        .progress_chars("█▓░")
                );
                bar.set_message(phase.display_name().to_lowercase());
                self.probe_bar = Some(bar);
            }
            ScanEvent::ProbeFinished { .. } => {
                if let Some(bar) = &self.probe_bar {
                    bar.inc(1);
                }
            }
            ScanEvent::FindingDiscovered { title, severity, .. } => {
                self.findings_count += 1;
                self.println(&format!("  {} {}", severity_badge(*severity), title));
                self.update_status();
            }
            ScanEvent::Warning { .. } => {
                self.warnings_count += 1;
                self.update_status();
            }
            ScanEvent::ScanCompleted { total_findings, total_duration_ms, cancelled } => {
                if let Some(bar) = self.probe_bar.take() {
                    bar.finish_and_clear();
                }
                if let Some(bar) = self.phase_bar.take() {
                    bar.finish_with_message(if *cancelled { "Cancelled" } else { "All phases complete" });
                }
                self.status_bar.finish_with_message(format!(
                    "Scan {}: {} findings | {}",
                    if *cancelled { "cancelled" } else { "complete" },
                    total_findings,
                    format_elapsed(*total_duration_ms),
                ));
            }
            ScanEvent::ScanFailed { error } => {
                if let Some(bar) = self.probe_bar.take() {
                    bar.finish_and_clear();
                }
                if let Some(bar) = self.phase_bar.take() {
                    bar.abandon_with_message("Failed");
                }
                self.status_bar.finish_with_message(format!("Scan failed: {}", error));
            }
        }
    }

    fn update_status(&self) {
        let elapsed = self.start_time.elapsed();
        self.status_bar.set_message(format!(
            "{} | {} findings | {} warnings",
            format_elapsed(elapsed.as_millis() as u64),
            self.findings_count,
            self.warnings_count,
        ));
    }

    /// Print a line through the multi-progress (won't interfere with bars).
    pub fn println(&self, msg: &str) {
        let _ = self.multi.println(msg);
    }
}

impl Default for ScanProgress {
    fn default() -> Self {
        Self::new()
    }
}

pub fn severity_badge(severity: Severity) -> console::StyledObject<&'static str> {
    let label = match severity {
        Severity::Critical => "CRITICAL",
        Severity::High => "HIGH",
        Severity::Medium => "MEDIUM",
        Severity::Low => "LOW",
        Severity::Info => "INFO",
    };
    match severity {
        Severity::Critical => style(label).red().bold(),
        Severity::High => style(label).red(),
        Severity::Medium => style(label).yellow(),
        Severity::Low => style(label).blue(),
        Severity::Info => style(label).dim(),
    }
}

pub fn format_elapsed(ms: u64) -> String {
    let secs = ms / 1000;
    let mins = secs / 60;
    let remaining_secs = secs % 60;
    if mins > 0 {
        format!("{}m{}s", mins, remaining_secs)
    } else {
        format!("{}s", secs)
    }
}
