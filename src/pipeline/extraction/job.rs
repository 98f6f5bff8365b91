//! Mutable per-document extraction state owned by the orchestrator.
//!
//! A page's recorded result only ever improves: a recovered text replaces the
//! stored one only when it scores at least as well.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::aggregate::build_document_report;
use super::quality::{analyze_page_quality_with, QualityPolicy};
use super::types::{DocumentQualityReport, ExtractionTier, JobStatus, PageQualityReport};

pub const NO_IMPROVEMENT_ISSUE: &str = "Recovered text did not improve quality";

/// Best-known text for one page and the report it earned.
#[derive(Debug, Clone)]
pub struct PageResult {
    pub text: String,
    pub report: PageQualityReport,
    pub tier: ExtractionTier,
    /// Recovery failure or rejection notes, appended to the final report.
    pub notes: Vec<String>,
}

#[derive(Debug)]
pub struct ExtractionJob {
    pub job_id: Uuid,
    pub document_id: Uuid,
    /// Highest tier reached so far; `None` while pending.
    pub tier_attempted: Option<ExtractionTier>,
    pub page_results: BTreeMap<usize, PageResult>,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    policy: QualityPolicy,
}

impl ExtractionJob {
    pub fn new(document_id: Uuid, policy: QualityPolicy) -> Self {
        Self {
            job_id: Uuid::new_v4(),
            document_id,
            tier_attempted: None,
            page_results: BTreeMap::new(),
            status: JobStatus::Pending,
            created_at: Utc::now(),
            finished_at: None,
            policy,
        }
    }

    /// Record tier-1 text and move to `InProgress`.
    pub fn start(&mut self, initial_report: &DocumentQualityReport, initial_texts: Vec<String>) {
        if self.status != JobStatus::Pending {
            tracing::warn!(job_id = %self.job_id, status = ?self.status, "Job already started");
            return;
        }

        for (text, report) in initial_texts.into_iter().zip(initial_report.page_reports.iter()) {
            self.page_results.insert(
                report.page_number,
                PageResult {
                    text,
                    report: report.clone(),
                    tier: ExtractionTier::TextLayer,
                    notes: Vec::new(),
                },
            );
        }
        self.tier_attempted = Some(ExtractionTier::TextLayer);
        self.status = JobStatus::InProgress;
    }

    /// Note that a higher tier has been dispatched.
    pub fn escalate(&mut self, tier: ExtractionTier) {
        if self.tier_attempted.map_or(true, |current| tier > current) {
            self.tier_attempted = Some(tier);
        }
    }

    /// Offer recovered text for a page. Returns true if it was accepted.
    ///
    /// Pages unknown to the job are adopted outright (no prior text exists).
    pub fn offer(&mut self, page_number: usize, text: String, tier: ExtractionTier) -> bool {
        let report = analyze_page_quality_with(&text, page_number, &self.policy);

        match self.page_results.get_mut(&page_number) {
            Some(existing) if report.quality_score < existing.report.quality_score => {
                tracing::debug!(
                    page = page_number,
                    tier = %tier,
                    previous = existing.report.quality_score,
                    recovered = report.quality_score,
                    "Recovered text scored worse, keeping previous"
                );
                existing.notes.push(NO_IMPROVEMENT_ISSUE.to_string());
                false
            }
            Some(existing) => {
                tracing::debug!(
                    page = page_number,
                    tier = %tier,
                    previous = existing.report.quality_score,
                    recovered = report.quality_score,
                    "Recovered text accepted"
                );
                existing.text = text;
                existing.report = report;
                existing.tier = tier;
                existing.notes.clear();
                true
            }
            None => {
                self.page_results.insert(
                    page_number,
                    PageResult {
                        text,
                        report,
                        tier,
                        notes: Vec::new(),
                    },
                );
                true
            }
        }
    }

    /// Attach a failure note to a page that could not be recovered.
    pub fn record_failure(&mut self, page_number: usize, tier: ExtractionTier, reason: &str) {
        if let Some(result) = self.page_results.get_mut(&page_number) {
            result.notes.push(format!("Recovery failed ({tier}): {reason}"));
        }
    }

    /// Pages that still need recovery, ascending.
    pub fn failing_pages(&self) -> Vec<usize> {
        self.page_results
            .iter()
            .filter(|(_, r)| r.report.needs_vision_fallback)
            .map(|(page, _)| *page)
            .collect()
    }

    /// Best-known text per page, in page order.
    pub fn page_texts(&self) -> Vec<String> {
        self.page_results.values().map(|r| r.text.clone()).collect()
    }

    /// Fresh document report from the current best results, with recovery
    /// notes appended to each page's issues.
    pub fn current_report(&self) -> DocumentQualityReport {
        let page_reports = self
            .page_results
            .values()
            .map(|r| {
                let mut report = r.report.clone();
                report.issues.extend(r.notes.iter().cloned());
                report
            })
            .collect();
        build_document_report(page_reports, &self.policy)
    }

    /// Move to a terminal status.
    pub fn finish(&mut self, status: JobStatus) {
        if self.status.is_terminal() {
            tracing::warn!(job_id = %self.job_id, status = ?self.status, "Job already finished");
            return;
        }
        self.status = status;
        self.finished_at = Some(Utc::now());
    }
}
