//! GalleryNavigator (C7): landmark-based DOM extraction — selectors
//! derived from semantic anchors ("Image to video", "Creation Time",
//! aria-describedby prompts), not styling classes.

use crate::driver::BrowserDriver;
use crate::error::RuntimeError;
use regex::Regex;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

/// JS landmark walker the driver evaluates; DOM tree traversal itself is
/// naturally expressed client-side (see design notes on coroutines/async
/// drivers), the scoring/cascade logic below is pure Rust and is what the
/// test suite exercises directly with synthetic candidate lists.
const EXTRACT_LANDMARKS_JS: &str = r#"
(() => {
  const byText = (txt) => Array.from(document.querySelectorAll('span'))
    .filter(el => el.textContent.trim() === txt);
  const creationTimeLabels = byText('Creation Time');
  const candidates = creationTimeLabels.map(label => {
    const rect = label.getBoundingClientRect();
    const valueEl = label.nextElementSibling;
    return {
      value: valueEl ? valueEl.textContent.trim() : '',
      visible: rect.width > 0 && rect.height > 0,
      position_top: rect.top,
      size: rect.width * rect.height,
      active: label.closest('.active,[aria-selected="true"]') !== null,
    };
  });
  return JSON.stringify(candidates);
})()
"#;

#[derive(Debug, Clone, Deserialize)]
pub struct CreationTimeCandidate {
    pub value: String,
    pub visible: bool,
    pub position_top: f64,
    pub size: f64,
    pub active: bool,
}

/// Highest-scoring candidate wins: visibility (0/0.5) + position bonus
/// (0/0.3, higher on page scores higher) + size bonus (0/0.1) +
/// active-state bonus (+1.0).
pub fn select_best_creation_time(candidates: &[CreationTimeCandidate]) -> Option<&CreationTimeCandidate> {
    if candidates.is_empty() {
        return None;
    }
    let min_top = candidates.iter().map(|c| c.position_top).fold(f64::INFINITY, f64::min);
    let max_top = candidates.iter().map(|c| c.position_top).fold(f64::NEG_INFINITY, f64::max);
    let span = (max_top - min_top).max(1.0);
    let max_size = candidates.iter().map(|c| c.size).fold(0.0_f64, f64::max).max(1.0);

    candidates
        .iter()
        .map(|c| {
            let visibility = if c.visible { 0.5 } else { 0.0 };
            let position = 0.3 * (1.0 - (c.position_top - min_top) / span);
            let size = 0.1 * (c.size / max_size);
            let active = if c.active { 1.0 } else { 0.0 };
            (c, visibility + position + size + active)
        })
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(c, _)| c)
}

#[derive(Debug, Clone, Default)]
pub struct PromptSource {
    pub text: String,
    pub has_aria_describedby: bool,
    pub has_ellipsis_trailer: bool,
    pub is_anchor_sibling: bool,
}

const MIN_PROMPT_LEN: usize = 12;
const KNOWN_METADATA_LABELS: &[&str] = &["Creation Time", "Resolution", "Seed", "Duration", "Model"];

fn date_regex() -> &'static Regex {
    static RE: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d{1,2}\s+\w{3}\s+\d{4}").unwrap())
}

/// Sanity filter the cascade applies after each strategy: reject text that
/// looks like a date, a known metadata label, or is too short to be a
/// genuine prompt.
pub fn looks_like_metadata(text: &str) -> bool {
    let trimmed = text.trim();
    if trimmed.len() < MIN_PROMPT_LEN {
        return true;
    }
    if date_regex().is_match(trimmed) {
        return true;
    }
    KNOWN_METADATA_LABELS.iter().any(|label| trimmed == *label)
}

/// Three-strategy cascade: anchor-sibling, ellipsis-pattern, then
/// length-ranking among all aria-describedby spans. Must not short-circuit
/// after a strategy whose result fails the sanity filter.
pub fn extract_prompt(candidates: &[PromptSource]) -> Option<String> {
    if let Some(c) = candidates
        .iter()
        .find(|c| c.is_anchor_sibling && !looks_like_metadata(&c.text))
    {
        return Some(c.text.clone());
    }

    if let Some(c) = candidates
        .iter()
        .find(|c| c.has_ellipsis_trailer && c.has_aria_describedby && !looks_like_metadata(&c.text))
    {
        return Some(c.text.clone());
    }

    candidates
        .iter()
        .filter(|c| c.has_aria_describedby && !looks_like_metadata(&c.text))
        .max_by_key(|c| c.text.len())
        .map(|c| c.text.clone())
}

#[derive(Debug, Clone)]
pub struct GenerationMetadata {
    pub creation_time: Option<String>,
    pub prompt: String,
}

/// Priority-ordered download-button discovery selectors; tried in order
/// until one resolves.
const DOWNLOAD_BUTTON_SELECTORS: &[&str] = &[
    "span:has-text('Image to video') ~ * >> nth=2",
    "button:has(svg[data-icon='download'])",
    "[data-action='download-generation']",
];

pub struct GalleryNavigator {
    driver: Arc<dyn BrowserDriver>,
}

impl GalleryNavigator {
    pub fn new(driver: Arc<dyn BrowserDriver>) -> Self {
        Self { driver }
    }

    pub async fn find_download_button(&self) -> Result<String, RuntimeError> {
        let mut last_err = None;
        for selector in DOWNLOAD_BUTTON_SELECTORS {
            match self.driver.query(selector, DEFAULT_TIMEOUT).await {
                Ok(el) => return Ok(el.id),
                Err(e) => last_err = Some(e),
            }
        }
        Err(last_err.unwrap_or_else(|| RuntimeError::ElementNotFound("download button".into())))
    }

    /// Runs the landmark JS, then applies the Rust-side scoring/cascade
    /// logic to produce one metadata record for the active thumbnail.
    pub async fn extract_metadata(&self) -> Result<Option<GenerationMetadata>, RuntimeError> {
        let raw = self.driver.evaluate(EXTRACT_LANDMARKS_JS).await?;
        let candidates: Vec<CreationTimeCandidate> = serde_json::from_str(&raw).unwrap_or_default();
        let best_time = select_best_creation_time(&candidates).map(|c| c.value.clone());

        if best_time.is_none() {
            warn!("no Creation Time landmark found on active thumbnail");
        }

        let prompt_raw = self.driver.evaluate(PROMPT_CANDIDATES_JS).await?;
        let prompt_sources: Vec<PromptSource> = serde_json::from_str(&prompt_raw).unwrap_or_default();
        let prompt = extract_prompt(&prompt_sources).unwrap_or_default();

        if prompt.is_empty() {
            return Ok(None);
        }

        Ok(Some(GenerationMetadata {
            creation_time: best_time,
            prompt,
        }))
    }

    pub async fn download_without_watermark(&self) -> Result<(), RuntimeError> {
        let button = self.find_download_button().await?;
        self.driver.click(&button).await?;
        let submenu_item = self
            .driver
            .query("span:has-text('Download without Watermark')", DEFAULT_TIMEOUT)
            .await?;
        self.driver.click(&submenu_item.id).await
    }
}

const PROMPT_CANDIDATES_JS: &str = r#"
(() => {
  const spans = Array.from(document.querySelectorAll('span[aria-describedby]'));
  return JSON.stringify(spans.map(s => ({
    text: s.getAttribute('aria-describedby') ? (s.textContent || '') : '',
    has_aria_describedby: true,
    has_ellipsis_trailer: s.outerHTML.includes('</span>...'),
    is_anchor_sibling: s.closest('[data-creation-time]') !== null,
  })));
})()
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scoring_prefers_active_visible_candidate() {
        let candidates = vec![
            CreationTimeCandidate {
                value: "01 Jan 2025 00:00:00".into(),
                visible: true,
                position_top: 500.0,
                size: 10.0,
                active: false,
            },
            CreationTimeCandidate {
                value: "02 Jan 2025 00:00:00".into(),
                visible: true,
                position_top: 100.0,
                size: 50.0,
                active: true,
            },
        ];
        let best = select_best_creation_time(&candidates).unwrap();
        assert_eq!(best.value, "02 Jan 2025 00:00:00");
    }

    #[test]
    fn invisible_candidate_loses_to_visible() {
        let candidates = vec![
            CreationTimeCandidate {
                value: "hidden".into(),
                visible: false,
                position_top: 0.0,
                size: 100.0,
                active: false,
            },
            CreationTimeCandidate {
                value: "shown".into(),
                visible: true,
                position_top: 400.0,
                size: 10.0,
                active: false,
            },
        ];
        let best = select_best_creation_time(&candidates).unwrap();
        assert_eq!(best.value, "shown");
    }

    #[test]
    fn prompt_cascade_skips_anchor_that_looks_like_metadata() {
        let candidates = vec![
            PromptSource {
                text: "Creation Time".into(),
                has_aria_describedby: true,
                has_ellipsis_trailer: false,
                is_anchor_sibling: true,
            },
            PromptSource {
                text: "a beautiful sunrise over mountains".into(),
                has_aria_describedby: true,
                has_ellipsis_trailer: false,
                is_anchor_sibling: false,
            },
        ];
        assert_eq!(
            extract_prompt(&candidates),
            Some("a beautiful sunrise over mountains".to_string())
        );
    }

    #[test]
    fn prompt_cascade_falls_back_to_length_ranking() {
        let candidates = vec![
            PromptSource {
                text: "short one".into(),
                has_aria_describedby: true,
                has_ellipsis_trailer: false,
                is_anchor_sibling: false,
            },
            PromptSource {
                text: "a much longer descriptive generation prompt text".into(),
                has_aria_describedby: true,
                has_ellipsis_trailer: false,
                is_anchor_sibling: false,
            },
        ];
        assert_eq!(
            extract_prompt(&candidates),
            Some("a much longer descriptive generation prompt text".to_string())
        );
    }

    #[test]
    fn looks_like_metadata_rejects_dates_and_short_text() {
        assert!(looks_like_metadata("03 Sep 2025 12:00:00"));
        assert!(looks_like_metadata("short"));
        assert!(!looks_like_metadata("a reasonably long generation prompt"));
    }
}
