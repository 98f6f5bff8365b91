//! Actionable views over a [`DocumentQualityReport`].

use super::types::{DocumentQualityReport, ExtractionMethod};

/// Page numbers that need a recovery tier, ascending.
pub fn identify_problematic_pages(report: &DocumentQualityReport) -> Vec<usize> {
    let mut pages: Vec<usize> = report
        .page_reports
        .iter()
        .filter(|p| p.needs_vision_fallback)
        .map(|p| p.page_number)
        .collect();
    pages.sort_unstable();
    pages
}

/// The whole document should be re-extracted with full OCR.
pub fn needs_full_ocr(report: &DocumentQualityReport) -> bool {
    report.extraction_method == ExtractionMethod::Ocr
}

/// Targeted per-page recovery is needed. False when nothing is needed and
/// when full OCR is already recommended.
pub fn needs_vision_fallback(report: &DocumentQualityReport) -> bool {
    report.extraction_method == ExtractionMethod::Hybrid
}

/// One-line status for display.
pub fn generate_quality_summary(report: &DocumentQualityReport) -> String {
    let mut summary = format!(
        "{} of {} pages extracted successfully. Overall quality: {}/100.",
        report.summary.successful_pages, report.total_pages, report.overall_score
    );

    let problematic = identify_problematic_pages(report);
    if !problematic.is_empty() {
        let list = problematic
            .iter()
            .map(|p| p.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        summary.push_str(&format!(" Pages needing recovery: {list}."));
    }

    summary
}

/// Pages whose score rose between two reports of the same document.
pub fn improved_pages(before: &DocumentQualityReport, after: &DocumentQualityReport) -> Vec<usize> {
    before
        .page_reports
        .iter()
        .zip(after.page_reports.iter())
        .filter(|(b, a)| a.quality_score > b.quality_score)
        .map(|(_, a)| a.page_number)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::extraction::aggregate::analyze_document_quality;

    const GOOD: &str = "Section two reviews prior work on sparse retrieval, \
        contrasting lexical matching with learned dense representations.";

    #[test]
    fn problematic_pages_match_failures() {
        let pages = [GOOD, "", GOOD, "a b c d", GOOD, "§†‡", GOOD];
        let report = analyze_document_quality(&pages);
        let problematic = identify_problematic_pages(&report);
        assert_eq!(problematic, vec![2, 4, 6]);
        assert_eq!(problematic.len(), report.summary.failed_pages);
    }

    #[test]
    fn clean_document_has_no_problematic_pages() {
        let report = analyze_document_quality(&[GOOD, GOOD, GOOD]);
        assert!(identify_problematic_pages(&report).is_empty());
        assert!(!needs_full_ocr(&report));
        assert!(!needs_vision_fallback(&report));
    }

    #[test]
    fn hybrid_needs_vision_only() {
        let report = analyze_document_quality(&[GOOD, "", GOOD]);
        assert!(needs_vision_fallback(&report));
        assert!(!needs_full_ocr(&report));
    }

    #[test]
    fn ocr_needs_full_ocr_only() {
        let report = analyze_document_quality(&["", "", "", ""]);
        assert!(needs_full_ocr(&report));
        assert!(!needs_vision_fallback(&report));
    }

    #[test]
    fn summary_mentions_counts_and_score() {
        let report = analyze_document_quality(&[GOOD, "", GOOD]);
        let summary = generate_quality_summary(&report);
        assert!(summary.contains("2 of 3 pages"), "{summary}");
        assert!(summary.contains(&format!("{}/100", report.overall_score)), "{summary}");
        assert!(summary.contains("recovery: 2"), "{summary}");
    }

    #[test]
    fn summary_for_clean_document_omits_page_list() {
        let report = analyze_document_quality(&[GOOD]);
        let summary = generate_quality_summary(&report);
        assert!(summary.contains("1 of 1 pages"));
        assert!(!summary.contains("recovery"));
    }

    #[test]
    fn improved_pages_lists_only_gains() {
        let before = analyze_document_quality(&[GOOD, "", "abc"]);
        let after = analyze_document_quality(&[GOOD, GOOD, "abc"]);
        assert_eq!(improved_pages(&before, &after), vec![2]);
    }
}
