//! Vision OCR recovery tier: re-derives a page's text from a rendered image.
//!
//! Bridges a `VisionClient` (any vision-capable model endpoint) and a
//! `PageRenderer` to the `PageRecognizer` trait the orchestrator consumes.
//! Also provides scripted recognizers for tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;

use super::sanitize::sanitize_recovered_text;
use super::types::{DocumentRecognizer, DocumentRef, PageRecognizer};
use super::RecoveryError;

// ──────────────────────────────────────────────
// Constants
// ──────────────────────────────────────────────

pub const DEFAULT_RENDER_DPI: u32 = 300;

const VISION_SYSTEM_PROMPT: &str = "\
You are a document text extractor for academic papers. Extract ALL visible text \
from the page image exactly as written. Preserve paragraph breaks, headings and \
reading order. Do not summarize, translate or correct the text.";

const VISION_USER_PROMPT: &str = "\
Extract the full text of this page. Output plain text only, without commentary.";

// ──────────────────────────────────────────────
// Collaborator traits
// ──────────────────────────────────────────────

/// Renders one page of a document to an encoded image (PNG).
#[async_trait]
pub trait PageRenderer: Send + Sync {
    async fn render_page(
        &self,
        document: &DocumentRef,
        page_number: usize,
        dpi: u32,
    ) -> Result<Vec<u8>, RecoveryError>;
}

/// Chat endpoint of a vision-capable model. Images are base64-encoded.
#[async_trait]
pub trait VisionClient: Send + Sync {
    async fn chat_with_images(
        &self,
        model: &str,
        prompt: &str,
        images: &[String],
        system: Option<&str>,
    ) -> Result<String, RecoveryError>;

    async fn is_reachable(&self) -> bool {
        true
    }
}

// ──────────────────────────────────────────────
// VisionPageRecognizer
// ──────────────────────────────────────────────

/// Production per-page recognizer: render, encode, ask the model, clean up.
pub struct VisionPageRecognizer {
    renderer: Arc<dyn PageRenderer>,
    client: Arc<dyn VisionClient>,
    model_name: String,
    dpi: u32,
}

impl VisionPageRecognizer {
    pub fn new(
        renderer: Arc<dyn PageRenderer>,
        client: Arc<dyn VisionClient>,
        model_name: impl Into<String>,
    ) -> Self {
        Self {
            renderer,
            client,
            model_name: model_name.into(),
            dpi: DEFAULT_RENDER_DPI,
        }
    }

    pub fn with_dpi(mut self, dpi: u32) -> Self {
        self.dpi = dpi;
        self
    }
}

#[async_trait]
impl PageRecognizer for VisionPageRecognizer {
    async fn recognize_page(
        &self,
        document: &DocumentRef,
        page_number: usize,
    ) -> Result<String, RecoveryError> {
        let start = std::time::Instant::now();

        let image = self
            .renderer
            .render_page(document, page_number, self.dpi)
            .await?;
        if image.is_empty() {
            return Err(RecoveryError::Permanent(format!(
                "Renderer produced an empty image for page {page_number}"
            )));
        }

        let images = vec![base64::engine::general_purpose::STANDARD.encode(&image)];
        let raw = self
            .client
            .chat_with_images(
                &self.model_name,
                VISION_USER_PROMPT,
                &images,
                Some(VISION_SYSTEM_PROMPT),
            )
            .await?;

        let text = sanitize_recovered_text(&raw);

        tracing::debug!(
            document_id = %document.document_id,
            page = page_number,
            model = %self.model_name,
            image_size = image.len(),
            text_len = text.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Vision OCR page complete"
        );

        Ok(text)
    }

    async fn is_available(&self) -> bool {
        self.client.is_reachable().await
    }
}

// ──────────────────────────────────────────────
// MockPageRecognizer (testing)
// ──────────────────────────────────────────────

/// Scripted per-page recognizer.
///
/// Each page replays its queued responses in order; once a queue is empty
/// the default response is used. Tracks call counts and peak concurrency.
pub struct MockPageRecognizer {
    default_response: Result<String, RecoveryError>,
    scripts: Mutex<HashMap<usize, VecDeque<Result<String, RecoveryError>>>>,
    delays: HashMap<usize, Duration>,
    available: bool,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl MockPageRecognizer {
    pub fn new(default_text: &str) -> Self {
        Self {
            default_response: Ok(default_text.to_string()),
            scripts: Mutex::new(HashMap::new()),
            delays: HashMap::new(),
            available: true,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn failing(error: RecoveryError) -> Self {
        Self {
            default_response: Err(error),
            ..Self::new("")
        }
    }

    /// Queue responses for one page, replayed one per call.
    pub fn with_script(self, page_number: usize, responses: Vec<Result<String, RecoveryError>>) -> Self {
        if let Ok(mut scripts) = self.scripts.lock() {
            scripts.insert(page_number, responses.into());
        }
        self
    }

    /// Delay every call for one page.
    pub fn with_delay(mut self, page_number: usize, delay: Duration) -> Self {
        self.delays.insert(page_number, delay);
        self
    }

    pub fn unavailable(mut self) -> Self {
        self.available = false;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    fn next_response(&self, page_number: usize) -> Result<String, RecoveryError> {
        self.scripts
            .lock()
            .ok()
            .and_then(|mut scripts| scripts.get_mut(&page_number).and_then(|q| q.pop_front()))
            .unwrap_or_else(|| self.default_response.clone())
    }
}

#[async_trait]
impl PageRecognizer for MockPageRecognizer {
    async fn recognize_page(
        &self,
        _document: &DocumentRef,
        page_number: usize,
    ) -> Result<String, RecoveryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(delay) = self.delays.get(&page_number) {
            tokio::time::sleep(*delay).await;
        } else {
            tokio::task::yield_now().await;
        }

        let response = self.next_response(page_number);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        response
    }

    async fn is_available(&self) -> bool {
        self.available
    }
}

// ──────────────────────────────────────────────
// MockDocumentRecognizer (testing)
// ──────────────────────────────────────────────

/// Scripted whole-document recognizer.
pub struct MockDocumentRecognizer {
    responses: Mutex<VecDeque<Result<Vec<String>, RecoveryError>>>,
    fallback: Result<Vec<String>, RecoveryError>,
    delay: Option<Duration>,
    available: bool,
    calls: AtomicUsize,
}

impl MockDocumentRecognizer {
    pub fn new(pages: Vec<String>) -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            fallback: Ok(pages),
            delay: None,
            available: true,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(error: RecoveryError) -> Self {
        Self {
            fallback: Err(error),
            ..Self::new(Vec::new())
        }
    }

    /// Responses replayed before the fallback is used.
    pub fn with_responses(self, responses: Vec<Result<Vec<String>, RecoveryError>>) -> Self {
        if let Ok(mut queue) = self.responses.lock() {
            queue.extend(responses);
        }
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn unavailable(mut self) -> Self {
        self.available = false;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentRecognizer for MockDocumentRecognizer {
    async fn recognize_document(&self, _document: &DocumentRef) -> Result<Vec<String>, RecoveryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.responses
            .lock()
            .ok()
            .and_then(|mut queue| queue.pop_front())
            .unwrap_or_else(|| self.fallback.clone())
    }

    async fn is_available(&self) -> bool {
        self.available
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    struct StubRenderer {
        image: Vec<u8>,
    }

    #[async_trait]
    impl PageRenderer for StubRenderer {
        async fn render_page(
            &self,
            _document: &DocumentRef,
            _page_number: usize,
            dpi: u32,
        ) -> Result<Vec<u8>, RecoveryError> {
            assert_eq!(dpi, 150);
            Ok(self.image.clone())
        }
    }

    struct RecordingClient {
        reply: Result<String, RecoveryError>,
        seen_images: Mutex<Vec<String>>,
        reachable: bool,
    }

    impl RecordingClient {
        fn replying(reply: Result<String, RecoveryError>) -> Self {
            Self {
                reply,
                seen_images: Mutex::new(Vec::new()),
                reachable: true,
            }
        }
    }

    #[async_trait]
    impl VisionClient for RecordingClient {
        async fn chat_with_images(
            &self,
            model: &str,
            _prompt: &str,
            images: &[String],
            system: Option<&str>,
        ) -> Result<String, RecoveryError> {
            assert_eq!(model, "vision-test");
            assert!(system.is_some());
            self.seen_images.lock().unwrap().extend(images.iter().cloned());
            self.reply.clone()
        }

        async fn is_reachable(&self) -> bool {
            self.reachable
        }
    }

    fn recognizer(image: Vec<u8>, client: Arc<RecordingClient>) -> VisionPageRecognizer {
        VisionPageRecognizer::new(Arc::new(StubRenderer { image }), client, "vision-test")
            .with_dpi(150)
    }

    #[tokio::test]
    async fn sends_base64_image_and_cleans_reply() {
        let client = Arc::new(RecordingClient::replying(Ok(
            "```\nRecovered abstract text.\n```".into(),
        )));
        let text = recognizer(vec![1, 2, 3], client.clone())
            .recognize_page(&DocumentRef::new("paper.pdf"), 2)
            .await
            .unwrap();

        assert_eq!(text, "Recovered abstract text.");
        assert_eq!(client.seen_images.lock().unwrap().as_slice(), ["AQID".to_string()]);
    }

    #[tokio::test]
    async fn empty_render_is_permanent() {
        let client = Arc::new(RecordingClient::replying(Ok("unused".into())));
        let err = recognizer(Vec::new(), client)
            .recognize_page(&DocumentRef::new("paper.pdf"), 1)
            .await
            .unwrap_err();
        assert!(matches!(err, RecoveryError::Permanent(_)));
    }

    #[tokio::test]
    async fn client_errors_propagate() {
        let client = Arc::new(RecordingClient::replying(Err(RecoveryError::from_status(
            503, "overloaded",
        ))));
        let err = recognizer(vec![9], client)
            .recognize_page(&DocumentRef::new("paper.pdf"), 1)
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn availability_follows_client() {
        let client = Arc::new(RecordingClient {
            reachable: false,
            ..RecordingClient::replying(Ok(String::new()))
        });
        assert!(!recognizer(vec![1], client).is_available().await);
    }

    #[tokio::test]
    async fn mock_replays_script_then_default() {
        let mock = MockPageRecognizer::new("default").with_script(
            3,
            vec![Err(RecoveryError::Timeout(5)), Ok("scripted".into())],
        );
        let doc = DocumentRef::new("paper.pdf");
        assert_eq!(mock.recognize_page(&doc, 3).await, Err(RecoveryError::Timeout(5)));
        assert_eq!(mock.recognize_page(&doc, 3).await, Ok("scripted".into()));
        assert_eq!(mock.recognize_page(&doc, 3).await, Ok("default".into()));
        assert_eq!(mock.calls(), 3);
    }

    #[tokio::test]
    async fn document_mock_replays_responses() {
        let mock = MockDocumentRecognizer::new(vec!["page".into()])
            .with_responses(vec![Err(RecoveryError::Transient("flaky".into()))]);
        let doc = DocumentRef::new("paper.pdf");
        assert!(mock.recognize_document(&doc).await.is_err());
        assert_eq!(mock.recognize_document(&doc).await, Ok(vec!["page".to_string()]));
    }
}
