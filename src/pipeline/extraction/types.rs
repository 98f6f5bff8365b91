use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::RecoveryError;

/// Quality assessment of one page's extracted text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageQualityReport {
    /// 1-indexed.
    pub page_number: usize,
    pub char_count: usize,
    pub special_char_ratio: f64,
    pub single_char_word_ratio: f64,
    /// 0-100, higher is better.
    pub quality_score: u8,
    /// In detection order.
    pub issues: Vec<String>,
    pub needs_vision_fallback: bool,
}

/// Page counts behind a document report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct QualitySummary {
    pub successful_pages: usize,
    pub failed_pages: usize,
}

/// Document-level aggregate of page reports plus the recommended strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentQualityReport {
    pub total_pages: usize,
    pub page_reports: Vec<PageQualityReport>,
    pub overall_score: u8,
    pub extraction_method: ExtractionMethod,
    pub summary: QualitySummary,
}

/// Recommended extraction strategy for a whole document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExtractionMethod {
    /// Text layer is good everywhere.
    #[serde(rename = "pdfjs")]
    TextLayer,
    /// Some pages need targeted vision recovery.
    #[serde(rename = "hybrid")]
    Hybrid,
    /// Nothing salvageable; re-extract the whole document.
    #[serde(rename = "ocr")]
    Ocr,
}

impl ExtractionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionMethod::TextLayer => "pdfjs",
            ExtractionMethod::Hybrid => "hybrid",
            ExtractionMethod::Ocr => "ocr",
        }
    }
}

impl std::fmt::Display for ExtractionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Escalating extraction tiers, cheapest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionTier {
    TextLayer,
    VisionOcr,
    FullOcr,
}

impl ExtractionTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionTier::TextLayer => "text_layer",
            ExtractionTier::VisionOcr => "vision_ocr",
            ExtractionTier::FullOcr => "full_ocr",
        }
    }
}

impl std::fmt::Display for ExtractionTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of an extraction job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    InProgress,
    Completed,
    CompletedWithFailures,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::CompletedWithFailures | JobStatus::Failed
        )
    }
}

/// Caller-owned handle to a document. The core never opens it; it only passes
/// it through to collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentRef {
    pub document_id: Uuid,
    pub location: String,
}

impl DocumentRef {
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            document_id: Uuid::new_v4(),
            location: location.into(),
        }
    }

    pub fn with_id(document_id: Uuid, location: impl Into<String>) -> Self {
        Self {
            document_id,
            location: location.into(),
        }
    }
}

/// Final result of an orchestration run. Always carries one text per page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionOutcome {
    pub job_id: Uuid,
    pub document_id: Uuid,
    /// Best-known text per page, in page order.
    pub pages: Vec<String>,
    /// Report on the text-layer input, before any recovery.
    pub initial_report: DocumentQualityReport,
    pub report: DocumentQualityReport,
    pub status: JobStatus,
    pub tier_attempted: Option<ExtractionTier>,
}

/// Text-layer extraction collaborator. Unreadable pages come back as empty
/// strings, never as errors.
pub trait TextLayerExtractor: Send + Sync {
    fn extract_page_texts(&self, document: &DocumentRef) -> Vec<String>;
}

/// Per-page recovery collaborator (vision OCR).
#[async_trait]
pub trait PageRecognizer: Send + Sync {
    async fn recognize_page(
        &self,
        document: &DocumentRef,
        page_number: usize,
    ) -> Result<String, RecoveryError>;

    /// Startup reachability check.
    async fn is_available(&self) -> bool {
        true
    }
}

/// Whole-document recovery collaborator (full OCR). Pages come back in order.
#[async_trait]
pub trait DocumentRecognizer: Send + Sync {
    async fn recognize_document(&self, document: &DocumentRef) -> Result<Vec<String>, RecoveryError>;

    async fn is_available(&self) -> bool {
        true
    }
}
