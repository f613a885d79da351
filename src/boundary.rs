//! BoundaryScanner (C8): incremental scan-as-you-scroll algorithm that
//! locates a specific `(creation_time, prompt-prefix)` — or, in seek mode,
//! an exact target datetime — in the gallery containers on the generate
//! page, without rescanning containers already visited.

use crate::download_log::DownloadLog;
use crate::driver::BrowserDriver;
use crate::error::RuntimeError;
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

const MAX_SCROLL_STALLS: usize = 5;
const SCROLL_WAIT_MS: u64 = 1500;
const SCROLL_MULTIPLE_OF_VIEWPORT: f64 = 2.0;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ContainerCandidate {
    pub id: String,
    pub creation_time: String,
    pub prompt_prefix: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoundaryOutcome {
    Found(ContainerCandidate),
    NotFound,
}

/// One round over a freshly-queried container list: every container not
/// already in `scanned_ids` is visited in DOM order; the first one
/// satisfying `is_boundary` is returned without being marked scanned
/// (matching the pseudocode, which returns before the bookkeeping insert);
/// every other visited container is added to `scanned_ids` so later rounds
/// never revisit it.
pub fn scan_round(
    containers: &[ContainerCandidate],
    scanned_ids: &mut HashSet<String>,
    is_boundary: impl Fn(&ContainerCandidate) -> bool,
) -> Option<ContainerCandidate> {
    for c in containers {
        if scanned_ids.contains(&c.id) {
            continue;
        }
        if is_boundary(c) {
            return Some(c.clone());
        }
        scanned_ids.insert(c.id.clone());
    }
    None
}

const CONTAINER_SCAN_JS: &str = r#"
(() => {
  const containers = Array.from(document.querySelectorAll('[data-generation-container]'));
  return JSON.stringify(containers.map(c => ({
    id: c.getAttribute('data-id') || '',
    creation_time: (c.querySelector('[data-creation-time]') || {}).textContent || '',
    prompt_prefix: ((c.querySelector('[aria-describedby]') || {}).textContent || '').slice(0, 100),
  })));
})()
"#;

pub struct BoundaryScanner {
    driver: Arc<dyn BrowserDriver>,
    viewport_height: f64,
}

impl BoundaryScanner {
    pub fn new(driver: Arc<dyn BrowserDriver>, viewport_height: f64) -> Self {
        Self {
            driver,
            viewport_height,
        }
    }

    async fn query_containers(&self) -> Result<Vec<ContainerCandidate>, RuntimeError> {
        let raw = self.driver.evaluate(CONTAINER_SCAN_JS).await?;
        Ok(serde_json::from_str(&raw).unwrap_or_default())
    }

    async fn scroll_and_wait(&self) -> Result<(), RuntimeError> {
        self.driver
            .scroll_by(0.0, self.viewport_height * SCROLL_MULTIPLE_OF_VIEWPORT)
            .await?;
        tokio::time::sleep(Duration::from_millis(SCROLL_WAIT_MS)).await;
        Ok(())
    }

    /// Finds the first container whose `(creation_time, prompt_prefix)` is
    /// not already in the log's duplicate index — the boundary past which
    /// the SKIP-mode harvest can resume.
    pub async fn scan_for_boundary(&self, log: &DownloadLog) -> Result<BoundaryOutcome, RuntimeError> {
        let mut scanned_ids = HashSet::new();
        let mut stalls = 0usize;

        loop {
            if stalls >= MAX_SCROLL_STALLS {
                return Ok(BoundaryOutcome::NotFound);
            }

            let containers = self.query_containers().await?;
            let new_count = containers.iter().filter(|c| !scanned_ids.contains(&c.id)).count();

            if new_count == 0 {
                stalls += 1;
                self.scroll_and_wait().await?;
                continue;
            }
            stalls = 0;

            if let Some(found) = scan_round(&containers, &mut scanned_ids, |c| {
                !log.is_duplicate(&c.creation_time, &c.prompt_prefix)
            }) {
                return Ok(BoundaryOutcome::Found(found));
            }

            self.scroll_and_wait().await?;
        }
    }

    /// Start-from seek: same loop, but the match predicate is an exact
    /// `creation_time` equality; on match the container is clicked to open
    /// the gallery at that position. Per the design notes, the engine must
    /// never silently fall back to thumbnail navigation if this reports
    /// `NotFound`.
    pub async fn seek(&self, target_datetime: &str) -> Result<BoundaryOutcome, RuntimeError> {
        let mut scanned_ids = HashSet::new();
        let mut stalls = 0usize;

        loop {
            if stalls >= MAX_SCROLL_STALLS {
                warn!("start-from target '{}' not found after exhausting scroll stalls", target_datetime);
                return Ok(BoundaryOutcome::NotFound);
            }

            let containers = self.query_containers().await?;
            let new_count = containers.iter().filter(|c| !scanned_ids.contains(&c.id)).count();

            if new_count == 0 {
                stalls += 1;
                self.scroll_and_wait().await?;
                continue;
            }
            stalls = 0;

            if let Some(found) = scan_round(&containers, &mut scanned_ids, |c| c.creation_time == target_datetime) {
                self.driver.click(&found.id).await?;
                return Ok(BoundaryOutcome::Found(found));
            }

            self.scroll_and_wait().await?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(id: &str, time: &str) -> ContainerCandidate {
        ContainerCandidate {
            id: id.to_string(),
            creation_time: time.to_string(),
            prompt_prefix: format!("prompt-{id}"),
        }
    }

    #[test]
    fn s5_boundary_scanner_success() {
        // [d1@T1, d2@T2, d3@T3, fresh@T4, fresh@T5] where T1..T3 are known.
        let known = ["T1", "T2", "T3"];
        let containers = vec![
            candidate("d1", "T1"),
            candidate("d2", "T2"),
            candidate("d3", "T3"),
            candidate("fresh1", "T4"),
            candidate("fresh2", "T5"),
        ];
        let mut scanned = HashSet::new();
        let found = scan_round(&containers, &mut scanned, |c| !known.contains(&c.creation_time.as_str()));
        assert_eq!(found, Some(candidate("fresh1", "T4")));
        // d1..d3 were marked scanned; the boundary itself was not.
        assert!(scanned.contains("d1"));
        assert!(scanned.contains("d2"));
        assert!(scanned.contains("d3"));
        assert!(!scanned.contains("fresh1"));
    }

    #[test]
    fn property_each_container_scanned_at_most_once_across_rounds() {
        let round1 = vec![candidate("a", "T1"), candidate("b", "T2")];
        let round2 = vec![candidate("a", "T1"), candidate("b", "T2"), candidate("c", "T3")];
        let known = ["T1", "T2", "T3"];

        let mut scanned = HashSet::new();
        let first = scan_round(&round1, &mut scanned, |c| !known.contains(&c.creation_time.as_str()));
        assert_eq!(first, None);
        assert_eq!(scanned.len(), 2);

        let second = scan_round(&round2, &mut scanned, |c| !known.contains(&c.creation_time.as_str()));
        assert_eq!(second, None);
        // only "c" was newly visited and scanned this round.
        assert_eq!(scanned.len(), 3);
    }

    #[test]
    fn no_new_containers_signals_stall_not_found() {
        let containers = vec![candidate("a", "T1")];
        let known = ["T1"];
        let mut scanned = HashSet::new();
        scan_round(&containers, &mut scanned, |c| !known.contains(&c.creation_time.as_str()));

        // Re-querying the same containers yields zero new entries, which
        // the caller interprets as a stall.
        let new_count = containers.iter().filter(|c| !scanned.contains(&c.id)).count();
        assert_eq!(new_count, 0);
    }
}
