//! Tiered extraction: text layer, then vision OCR on failing pages, or full
//! OCR when the text layer is unusable.
//!
//! Page recoveries run as spawned tasks gated by a semaphore. Their results
//! come back over a channel to a single writer that owns the job, so only
//! one place ever mutates page results.

use std::collections::BTreeSet;
use std::sync::Arc;

use tokio::sync::{mpsc, Semaphore};
use tokio::time::Instant;

use super::aggregate::analyze_document_quality_with;
use super::job::ExtractionJob;
use super::report::identify_problematic_pages;
use super::retry::call_with_retry;
use super::store::ReportStore;
use super::types::{
    DocumentRecognizer, DocumentRef, ExtractionMethod, ExtractionOutcome, ExtractionTier,
    JobStatus, PageRecognizer, TextLayerExtractor,
};
use super::vision_ocr::{PageRenderer, VisionClient, VisionPageRecognizer};
use super::{ExtractionError, RecoveryError};
use crate::pipeline_config::PipelineConfig;

const DEADLINE_ISSUE: &str = "deadline exceeded before recovery finished";

/// Counters for one recovery pass, used to settle the job status.
#[derive(Debug, Default)]
struct RecoveryTally {
    dispatched: usize,
    recovered: usize,
    rejected: usize,
    configuration_failures: usize,
    other_failures: usize,
}

impl RecoveryTally {
    /// Every dispatched call failed because the collaborator is not usable.
    fn is_outage(&self) -> bool {
        self.dispatched > 0 && self.configuration_failures == self.dispatched
    }
}

pub struct ExtractionOrchestrator {
    config: PipelineConfig,
    page_recognizer: Option<Arc<dyn PageRecognizer>>,
    document_recognizer: Option<Arc<dyn DocumentRecognizer>>,
    report_store: Option<Arc<dyn ReportStore>>,
}

impl ExtractionOrchestrator {
    pub fn new(config: PipelineConfig) -> Result<Self, ExtractionError> {
        config.validate()?;
        Ok(Self {
            config,
            page_recognizer: None,
            document_recognizer: None,
            report_store: None,
        })
    }

    pub fn with_page_recognizer(mut self, recognizer: Arc<dyn PageRecognizer>) -> Self {
        self.page_recognizer = Some(recognizer);
        self
    }

    /// Vision OCR through a renderer and a vision model, rendering at the
    /// configured DPI.
    pub fn with_vision(
        self,
        renderer: Arc<dyn PageRenderer>,
        client: Arc<dyn VisionClient>,
        model_name: impl Into<String>,
    ) -> Self {
        let dpi = self.config.render_dpi;
        let recognizer = VisionPageRecognizer::new(renderer, client, model_name).with_dpi(dpi);
        self.with_page_recognizer(Arc::new(recognizer))
    }

    pub fn with_document_recognizer(mut self, recognizer: Arc<dyn DocumentRecognizer>) -> Self {
        self.document_recognizer = Some(recognizer);
        self
    }

    pub fn with_report_store(mut self, store: Arc<dyn ReportStore>) -> Self {
        self.report_store = Some(store);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Pull tier-1 text from the text-layer extractor, then orchestrate.
    pub async fn extract_document(
        &self,
        document: &DocumentRef,
        extractor: &dyn TextLayerExtractor,
    ) -> ExtractionOutcome {
        let initial_texts = extractor.extract_page_texts(document);
        self.run_extraction(document, initial_texts).await
    }

    /// Orchestrate recovery using the configured deadline, if any.
    pub async fn run_extraction(
        &self,
        document: &DocumentRef,
        initial_texts: Vec<String>,
    ) -> ExtractionOutcome {
        let deadline = self.config.deadline().map(|d| Instant::now() + d);
        self.run_extraction_with_deadline(document, initial_texts, deadline)
            .await
    }

    /// Orchestrate recovery, abandoning outstanding recovery calls at
    /// `deadline`. Always returns one text per page.
    pub async fn run_extraction_with_deadline(
        &self,
        document: &DocumentRef,
        initial_texts: Vec<String>,
        deadline: Option<Instant>,
    ) -> ExtractionOutcome {
        let start = std::time::Instant::now();
        let initial_report = analyze_document_quality_with(&initial_texts, &self.config.quality);

        let mut job = ExtractionJob::new(document.document_id, self.config.quality.clone());
        job.start(&initial_report, initial_texts);

        tracing::info!(
            document_id = %document.document_id,
            job_id = %job.job_id,
            pages = initial_report.total_pages,
            score = initial_report.overall_score,
            method = %initial_report.extraction_method,
            "Extraction job started"
        );

        let status = match initial_report.extraction_method {
            ExtractionMethod::TextLayer => JobStatus::Completed,
            ExtractionMethod::Hybrid => {
                let pages = identify_problematic_pages(&initial_report);
                self.recover_pages(document, &mut job, pages, deadline).await
            }
            ExtractionMethod::Ocr => self.recover_document(document, &mut job, deadline).await,
        };
        job.finish(status);

        let report = job.current_report();
        if let Some(store) = &self.report_store {
            store.put(document.document_id, report.clone());
        }

        tracing::info!(
            document_id = %document.document_id,
            job_id = %job.job_id,
            status = ?job.status,
            tier = ?job.tier_attempted,
            score = report.overall_score,
            failed_pages = report.summary.failed_pages,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Extraction job finished"
        );

        ExtractionOutcome {
            job_id: job.job_id,
            document_id: job.document_id,
            pages: job.page_texts(),
            initial_report,
            report,
            status: job.status,
            tier_attempted: job.tier_attempted,
        }
    }

    // ── Tier 2: per-page vision OCR ─────────────────────────

    async fn recover_pages(
        &self,
        document: &DocumentRef,
        job: &mut ExtractionJob,
        pages: Vec<usize>,
        deadline: Option<Instant>,
    ) -> JobStatus {
        let recognizer = match &self.page_recognizer {
            Some(r) if r.is_available().await => Arc::clone(r),
            Some(_) => return fail_unavailable(job, &pages, ExtractionTier::VisionOcr, "vision OCR is unavailable"),
            None => return fail_unavailable(job, &pages, ExtractionTier::VisionOcr, "no vision OCR configured"),
        };
        job.escalate(ExtractionTier::VisionOcr);

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_recoveries));
        let (tx, mut rx) = mpsc::channel::<(usize, Result<String, RecoveryError>)>(pages.len().max(1));
        let shared_document = Arc::new(document.clone());

        let mut handles = Vec::with_capacity(pages.len());
        for &page in &pages {
            let semaphore = Arc::clone(&semaphore);
            let recognizer = Arc::clone(&recognizer);
            let document = Arc::clone(&shared_document);
            let retry = self.config.retry.clone();
            let tx = tx.clone();

            handles.push(tokio::spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return;
                };
                let label = format!("vision_ocr page {page}");
                let result =
                    call_with_retry(&retry, &label, || recognizer.recognize_page(&document, page)).await;
                // The writer is gone once the deadline passes.
                let _ = tx.send((page, result)).await;
            }));
        }
        drop(tx);

        let mut tally = RecoveryTally {
            dispatched: pages.len(),
            ..RecoveryTally::default()
        };
        let mut outstanding: BTreeSet<usize> = pages.iter().copied().collect();

        let collect = async {
            while let Some((page, result)) = rx.recv().await {
                outstanding.remove(&page);
                match result {
                    Ok(text) => {
                        if job.offer(page, text, ExtractionTier::VisionOcr) {
                            tally.recovered += 1;
                        } else {
                            tally.rejected += 1;
                        }
                    }
                    Err(e) => {
                        tracing::warn!(
                            document_id = %document.document_id,
                            page,
                            error = %e,
                            "Page could not be recovered"
                        );
                        if e.is_configuration() {
                            tally.configuration_failures += 1;
                        } else {
                            tally.other_failures += 1;
                        }
                        job.record_failure(page, ExtractionTier::VisionOcr, &e.to_string());
                    }
                }
            }
        };

        let timed_out = match deadline {
            Some(at) => tokio::time::timeout_at(at, collect).await.is_err(),
            None => {
                collect.await;
                false
            }
        };

        if timed_out {
            for handle in &handles {
                handle.abort();
            }
            tracing::warn!(
                document_id = %document.document_id,
                outstanding = outstanding.len(),
                "Recovery deadline reached, abandoning outstanding pages"
            );
            for &page in &outstanding {
                job.record_failure(page, ExtractionTier::VisionOcr, DEADLINE_ISSUE);
            }
        }

        for joined in futures_util::future::join_all(handles).await {
            if let Err(e) = joined {
                if e.is_panic() {
                    tracing::error!(document_id = %document.document_id, error = %e, "Recovery task panicked");
                }
            }
        }

        tracing::debug!(
            document_id = %document.document_id,
            dispatched = tally.dispatched,
            recovered = tally.recovered,
            rejected = tally.rejected,
            failed = tally.configuration_failures + tally.other_failures,
            timed_out,
            "Vision OCR pass complete"
        );

        if !timed_out && tally.is_outage() {
            JobStatus::Failed
        } else {
            settle_status(job)
        }
    }

    // ── Tier 3: whole-document OCR ──────────────────────────

    async fn recover_document(
        &self,
        document: &DocumentRef,
        job: &mut ExtractionJob,
        deadline: Option<Instant>,
    ) -> JobStatus {
        let failing = job.failing_pages();
        let recognizer = match &self.document_recognizer {
            Some(r) if r.is_available().await => Arc::clone(r),
            Some(_) => return fail_unavailable(job, &failing, ExtractionTier::FullOcr, "full OCR is unavailable"),
            None => return fail_unavailable(job, &failing, ExtractionTier::FullOcr, "no full OCR configured"),
        };
        job.escalate(ExtractionTier::FullOcr);

        let call = call_with_retry(&self.config.retry, "full_ocr", || {
            recognizer.recognize_document(document)
        });
        let result = match deadline {
            Some(at) => tokio::time::timeout_at(at, call).await.ok(),
            None => Some(call.await),
        };

        let recovered = match result {
            Some(Ok(pages)) => pages,
            Some(Err(e)) => {
                tracing::warn!(document_id = %document.document_id, error = %e, "Full OCR failed");
                let reason = e.to_string();
                for &page in &failing {
                    job.record_failure(page, ExtractionTier::FullOcr, &reason);
                }
                return if e.is_configuration() {
                    JobStatus::Failed
                } else {
                    settle_status(job)
                };
            }
            None => {
                tracing::warn!(document_id = %document.document_id, "Full OCR deadline reached");
                for &page in &failing {
                    job.record_failure(page, ExtractionTier::FullOcr, DEADLINE_ISSUE);
                }
                return settle_status(job);
            }
        };

        let known_pages = job.page_results.len();
        if known_pages > 0 && recovered.len() != known_pages {
            tracing::warn!(
                document_id = %document.document_id,
                expected = known_pages,
                received = recovered.len(),
                "Full OCR page count differs from text layer"
            );
        }

        let returned = recovered.len();
        for (idx, text) in recovered.into_iter().enumerate() {
            let page = idx + 1;
            if known_pages > 0 && page > known_pages {
                break;
            }
            job.offer(page, text, ExtractionTier::FullOcr);
        }
        for page in failing.into_iter().filter(|p| *p > returned) {
            job.record_failure(page, ExtractionTier::FullOcr, "no text returned for this page");
        }

        settle_status(job)
    }
}

/// Final status once recovery has run: any page still failing (or no pages
/// at all) means the document is only partially extracted.
fn settle_status(job: &ExtractionJob) -> JobStatus {
    if job.page_results.is_empty() || !job.failing_pages().is_empty() {
        JobStatus::CompletedWithFailures
    } else {
        JobStatus::Completed
    }
}

fn fail_unavailable(
    job: &mut ExtractionJob,
    pages: &[usize],
    tier: ExtractionTier,
    reason: &str,
) -> JobStatus {
    tracing::warn!(document_id = %job.document_id, tier = %tier, reason, "Recovery collaborator unavailable");
    for &page in pages {
        job.record_failure(page, tier, reason);
    }
    JobStatus::Failed
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
