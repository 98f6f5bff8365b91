use rayon::prelude::*;

use super::quality::{analyze_page_quality_with, QualityPolicy};
use super::types::{DocumentQualityReport, ExtractionMethod, PageQualityReport, QualitySummary};

/// Score every page and aggregate with the default policy.
pub fn analyze_document_quality<S>(pages: &[S]) -> DocumentQualityReport
where
    S: AsRef<str> + Sync,
{
    analyze_document_quality_with(pages, &QualityPolicy::default())
}

/// Score every page in parallel, then aggregate. Page numbers follow input order.
pub fn analyze_document_quality_with<S>(pages: &[S], policy: &QualityPolicy) -> DocumentQualityReport
where
    S: AsRef<str> + Sync,
{
    let page_reports: Vec<PageQualityReport> = pages
        .par_iter()
        .enumerate()
        .map(|(idx, text)| analyze_page_quality_with(text.as_ref(), idx + 1, policy))
        .collect();

    build_document_report(page_reports, policy)
}

/// Aggregate already-computed page reports into a document report.
pub fn build_document_report(
    page_reports: Vec<PageQualityReport>,
    policy: &QualityPolicy,
) -> DocumentQualityReport {
    let total_pages = page_reports.len();
    let successful_pages = page_reports
        .iter()
        .filter(|p| !p.needs_vision_fallback)
        .count();
    let failed_pages = total_pages - successful_pages;

    let overall_score = if total_pages == 0 {
        0
    } else {
        let sum: u64 = page_reports.iter().map(|p| u64::from(p.quality_score)).sum();
        (sum as f64 / total_pages as f64).round() as u8
    };

    let extraction_method =
        recommend_extraction_method(total_pages, failed_pages, overall_score, policy);

    tracing::debug!(
        total_pages,
        failed_pages,
        overall_score,
        method = %extraction_method,
        "Document quality aggregated"
    );

    DocumentQualityReport {
        total_pages,
        page_reports,
        overall_score,
        extraction_method,
        summary: QualitySummary {
            successful_pages,
            failed_pages,
        },
    }
}

/// Pick the extraction strategy for a document.
///
/// A document with no pages at all has nothing usable, so it goes to full OCR.
pub fn recommend_extraction_method(
    total_pages: usize,
    failed_pages: usize,
    overall_score: u8,
    policy: &QualityPolicy,
) -> ExtractionMethod {
    if total_pages == 0 {
        return ExtractionMethod::Ocr;
    }
    if failed_pages == 0 {
        return ExtractionMethod::TextLayer;
    }
    if failed_pages == total_pages || overall_score < policy.ocr_score_cutoff {
        return ExtractionMethod::Ocr;
    }
    ExtractionMethod::Hybrid
}
