use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::sanitize::is_standard_char;
use super::types::PageQualityReport;
use super::ExtractionError;

/// Default scoring thresholds. Calibrated against observed extraction
/// failures; tune through [`QualityPolicy`] rather than editing these.
pub mod thresholds {
    /// Pages shorter than this are penalized in proportion to the shortfall.
    pub const MIN_CHAR_COUNT: usize = 50;

    /// Penalty for a page with a single character. Scales down to 0 at `MIN_CHAR_COUNT`.
    pub const SHORT_TEXT_MAX_PENALTY: u32 = 50;

    /// Above this special character ratio the page is treated as gibberish.
    pub const SPECIAL_CHAR_CUTOFF: f64 = 0.5;
    pub const SPECIAL_CHAR_PENALTY: u32 = 50;

    /// Above this ratio (and below the cutoff) the page gets a warning.
    pub const SPECIAL_CHAR_WARNING: f64 = 0.3;
    pub const SPECIAL_CHAR_WARNING_PENALTY: u32 = 15;

    /// Above this ratio of one-character tokens, word spacing is broken.
    pub const SINGLE_CHAR_WORD_CUTOFF: f64 = 0.4;
    /// Fewer tokens than this never trigger the single-character check.
    pub const SINGLE_CHAR_MIN_TOKENS: usize = 3;
    pub const SINGLE_CHAR_PENALTY: u32 = 30;

    /// Score ceiling for pages containing decode-failure artifacts.
    pub const SUSPICIOUS_SCORE_CAP: u8 = 79;

    /// Pages scoring below this need a recovery tier.
    pub const LOW_SCORE_CUTOFF: u8 = 60;

    /// Documents averaging below this go straight to full OCR.
    pub const OCR_SCORE_CUTOFF: u8 = 50;
}

pub const EMPTY_PAGE_ISSUE: &str = "Empty page - no text extracted";

/// Tunable scoring policy. Defaults come from [`thresholds`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityPolicy {
    pub min_char_count: usize,
    pub short_text_max_penalty: u32,
    pub special_char_cutoff: f64,
    pub special_char_penalty: u32,
    pub special_char_warning: f64,
    pub special_char_warning_penalty: u32,
    pub single_char_word_cutoff: f64,
    pub single_char_min_tokens: usize,
    pub single_char_penalty: u32,
    pub suspicious_score_cap: u8,
    pub low_score_cutoff: u8,
    pub ocr_score_cutoff: u8,
}

impl Default for QualityPolicy {
    fn default() -> Self {
        Self {
            min_char_count: thresholds::MIN_CHAR_COUNT,
            short_text_max_penalty: thresholds::SHORT_TEXT_MAX_PENALTY,
            special_char_cutoff: thresholds::SPECIAL_CHAR_CUTOFF,
            special_char_penalty: thresholds::SPECIAL_CHAR_PENALTY,
            special_char_warning: thresholds::SPECIAL_CHAR_WARNING,
            special_char_warning_penalty: thresholds::SPECIAL_CHAR_WARNING_PENALTY,
            single_char_word_cutoff: thresholds::SINGLE_CHAR_WORD_CUTOFF,
            single_char_min_tokens: thresholds::SINGLE_CHAR_MIN_TOKENS,
            single_char_penalty: thresholds::SINGLE_CHAR_PENALTY,
            suspicious_score_cap: thresholds::SUSPICIOUS_SCORE_CAP,
            low_score_cutoff: thresholds::LOW_SCORE_CUTOFF,
            ocr_score_cutoff: thresholds::OCR_SCORE_CUTOFF,
        }
    }
}

impl QualityPolicy {
    pub fn validate(&self) -> Result<(), ExtractionError> {
        let ratios = [
            ("special_char_cutoff", self.special_char_cutoff),
            ("special_char_warning", self.special_char_warning),
            ("single_char_word_cutoff", self.single_char_word_cutoff),
        ];
        for (name, value) in ratios {
            if !(0.0..=1.0).contains(&value) {
                return Err(ExtractionError::InvalidConfig(format!(
                    "{name} must be within [0, 1], got {value}"
                )));
            }
        }
        if self.special_char_warning > self.special_char_cutoff {
            return Err(ExtractionError::InvalidConfig(
                "special_char_warning must not exceed special_char_cutoff".into(),
            ));
        }
        if self.low_score_cutoff > 100 || self.suspicious_score_cap > 100 {
            return Err(ExtractionError::InvalidConfig(
                "score cutoffs must be within [0, 100]".into(),
            ));
        }
        if self.ocr_score_cutoff > self.low_score_cutoff {
            return Err(ExtractionError::InvalidConfig(
                "ocr_score_cutoff must not exceed low_score_cutoff".into(),
            ));
        }
        Ok(())
    }
}

/// Score one page's extracted text with the default policy.
pub fn analyze_page_quality(text: &str, page_number: usize) -> PageQualityReport {
    analyze_page_quality_with(text, page_number, &QualityPolicy::default())
}

/// Score one page's extracted text.
///
/// Checks run in order and accumulate penalties. An empty page, dominant
/// special characters, or dominant single-character tokens each force
/// fallback on their own, whatever the final score.
pub fn analyze_page_quality_with(
    text: &str,
    page_number: usize,
    policy: &QualityPolicy,
) -> PageQualityReport {
    let char_count = text.chars().count();

    if text.trim().is_empty() {
        return PageQualityReport {
            page_number,
            char_count,
            special_char_ratio: 0.0,
            single_char_word_ratio: 0.0,
            quality_score: 0,
            issues: vec![EMPTY_PAGE_ISSUE.to_string()],
            needs_vision_fallback: true,
        };
    }

    let mut score: i64 = 100;
    let mut issues = Vec::new();
    let mut critical = false;

    if char_count < policy.min_char_count {
        score -= short_text_penalty(char_count, policy);
        issues.push(format!(
            "Very little text extracted ({char_count} characters)"
        ));
    }

    let special_count = text.chars().filter(|c| !is_standard_char(*c)).count();
    let special_char_ratio = special_count as f64 / char_count as f64;
    if special_char_ratio > policy.special_char_cutoff {
        score -= i64::from(policy.special_char_penalty);
        critical = true;
        issues.push(format!(
            "High special character ratio ({:.0}%) - likely gibberish",
            special_char_ratio * 100.0
        ));
    } else if special_char_ratio > policy.special_char_warning {
        score -= i64::from(policy.special_char_warning_penalty);
        issues.push(format!(
            "Elevated special character ratio ({:.0}%)",
            special_char_ratio * 100.0
        ));
    }

    let tokens: Vec<&str> = text.split_whitespace().collect();
    let single_count = tokens.iter().filter(|t| t.chars().count() == 1).count();
    let single_char_word_ratio = if tokens.is_empty() {
        0.0
    } else {
        single_count as f64 / tokens.len() as f64
    };
    if tokens.len() >= policy.single_char_min_tokens
        && single_char_word_ratio > policy.single_char_word_cutoff
    {
        score -= i64::from(policy.single_char_penalty);
        critical = true;
        issues.push(format!(
            "High ratio of single-character words ({:.0}%) - word spacing likely broken",
            single_char_word_ratio * 100.0
        ));
    }

    let suspicious = count_suspicious_patterns(text);
    if suspicious > 0 {
        score = score.min(i64::from(policy.suspicious_score_cap));
        issues.push(format!(
            "Suspicious character patterns detected ({suspicious} occurrences)"
        ));
    }

    let quality_score = score.clamp(0, 100) as u8;
    let needs_vision_fallback = critical || quality_score < policy.low_score_cutoff;

    PageQualityReport {
        page_number,
        char_count,
        special_char_ratio,
        single_char_word_ratio,
        quality_score,
        issues,
        needs_vision_fallback,
    }
}

/// Penalty proportional to how far short of `min_char_count` the page is, rounded up.
fn short_text_penalty(char_count: usize, policy: &QualityPolicy) -> i64 {
    if policy.min_char_count == 0 {
        return 0;
    }
    let shortfall = policy.min_char_count.saturating_sub(char_count) as u64;
    let min = policy.min_char_count as u64;
    let penalty = (shortfall * u64::from(policy.short_text_max_penalty)).div_ceil(min);
    penalty as i64
}

/// Count decode-failure artifacts: replacement characters, private-use code
/// points from broken font maps, non-whitespace control characters and
/// `(cid:N)` markers. Layout controls such as form feeds are not counted.
pub fn count_suspicious_patterns(text: &str) -> usize {
    let char_hits = text
        .chars()
        .filter(|c| {
            *c == '\u{FFFD}'
                || ('\u{E000}'..='\u{F8FF}').contains(c)
                || (c.is_control() && !c.is_whitespace())
        })
        .count();

    char_hits + count_cid_markers(text)
}

/// Glyph-id placeholders emitted when a font has no Unicode mapping.
static CID_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(cid:\d+\)").expect("cid marker pattern is valid"));

fn count_cid_markers(text: &str) -> usize {
    CID_MARKER.find_iter(text).count()
}
