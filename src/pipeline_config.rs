//! Orchestration configuration.
//!
//! Bounds the recovery worker pool, sets the render resolution for vision
//! OCR, the optional deadline, and carries the retry and quality policies.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::pipeline::extraction::{ExtractionError, QualityPolicy, RetryPolicy, DEFAULT_RENDER_DPI};

// ═══════════════════════════════════════════════════════════
// Types
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Maximum recovery calls in flight at once for one document.
    pub max_concurrent_recoveries: usize,
    /// Resolution pages are rendered at for vision OCR.
    pub render_dpi: u32,
    /// Wall-clock budget for all recovery work; `None` waits indefinitely.
    pub deadline_secs: Option<u64>,
    pub retry: RetryPolicy,
    pub quality: QualityPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_recoveries: 4,
            render_dpi: DEFAULT_RENDER_DPI,
            deadline_secs: None,
            retry: RetryPolicy::default(),
            quality: QualityPolicy::default(),
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Loading & validation
// ═══════════════════════════════════════════════════════════

impl PipelineConfig {
    /// Parse from JSON; missing fields take their defaults. The result is
    /// validated before it is returned.
    pub fn from_json(json: &str) -> Result<Self, ExtractionError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ExtractionError> {
        if self.max_concurrent_recoveries == 0 {
            return Err(ExtractionError::InvalidConfig(
                "max_concurrent_recoveries must be at least 1".into(),
            ));
        }
        if self.render_dpi == 0 {
            return Err(ExtractionError::InvalidConfig("render_dpi must be positive".into()));
        }
        if self.retry.max_attempts == 0 {
            return Err(ExtractionError::InvalidConfig(
                "retry.max_attempts must be at least 1".into(),
            ));
        }
        if self.retry.initial_backoff_ms > self.retry.max_backoff_ms {
            return Err(ExtractionError::InvalidConfig(format!(
                "retry.initial_backoff_ms ({}) exceeds retry.max_backoff_ms ({})",
                self.retry.initial_backoff_ms, self.retry.max_backoff_ms
            )));
        }
        self.quality.validate()
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_secs.map(Duration::from_secs)
    }
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════
