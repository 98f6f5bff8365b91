//! Extraction quality assessment and tiered fallback orchestration.
//!
//! Scores text-layer output page by page, aggregates a document-level
//! recommendation, and escalates unreliable pages to vision OCR or the whole
//! document to full OCR.

pub mod config;
pub mod pipeline;
pub mod pipeline_config;

pub use pipeline::extraction::*;
pub use pipeline_config::PipelineConfig;

use tracing_subscriber::EnvFilter;

/// Install the global `tracing` subscriber.
///
/// Honors `RUST_LOG`, falling back to [`config::default_log_filter`].
/// Safe to call more than once; later calls are ignored.
pub fn init_tracing() {
    let result = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .try_init();

    if result.is_ok() {
        tracing::info!("{} extraction core v{}", config::APP_NAME, config::APP_VERSION);
    }
}
