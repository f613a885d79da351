//! GenerationDownloader (C9): orchestrates the driver, GalleryNavigator,
//! BoundaryScanner, and DownloadLog to harvest items from the generate page
//! thumbnail by thumbnail.

use crate::boundary::BoundaryOutcome;
use crate::boundary::BoundaryScanner;
use crate::config::{DownloaderConfig, DuplicateMode};
use crate::controller::Controller;
use crate::download_log::{format_canonical, DownloadLog, DownloadLogEntry, PLACEHOLDER_ID};
use crate::driver::BrowserDriver;
use crate::error::{CircuitBreaker, RuntimeError};
use crate::gallery::GalleryNavigator;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const DOWNLOAD_VISIBLE_TIMEOUT: Duration = Duration::from_secs(3);
const VERIFY_TIMEOUT: Duration = Duration::from_secs(4);
const THUMBNAIL_ACTIVATION_TIMEOUT: Duration = Duration::from_millis(1500);
const METADATA_EXTRACTION_TIMEOUT: Duration = Duration::from_secs(1);
const RETRIES_PER_OPERATION: u32 = 1;
const NEXT_THUMBNAIL_SELECTOR: &str = "[data-generation-container].active ~ [data-generation-container]";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    MaxDownloadsReached,
    BoundaryFound,
    BoundaryNotFound,
    Stopped,
    GalleryExhausted,
}

#[derive(Debug, Clone)]
pub struct DownloadSummary {
    pub downloaded: u64,
    pub skipped_duplicates: u64,
    pub stopped_reason: StopReason,
}

pub struct GenerationDownloader {
    driver: Arc<dyn BrowserDriver>,
    gallery: GalleryNavigator,
    boundary: BoundaryScanner,
    log: DownloadLog,
    config: DownloaderConfig,
    controller: Arc<Controller>,
    circuit: CircuitBreaker,
}

impl GenerationDownloader {
    pub fn new(
        driver: Arc<dyn BrowserDriver>,
        config: DownloaderConfig,
        controller: Arc<Controller>,
        viewport_height: f64,
    ) -> Result<Self, RuntimeError> {
        let log = DownloadLog::load(config.downloads_folder.join("download_log.txt"))?;
        Ok(Self {
            gallery: GalleryNavigator::new(driver.clone()),
            boundary: BoundaryScanner::new(driver.clone(), viewport_height),
            driver,
            log,
            config,
            controller,
            circuit: CircuitBreaker::new(5, Duration::from_secs(60)),
        })
    }

    fn summary(&self, downloaded: u64, skipped: u64, reason: StopReason) -> DownloadSummary {
        DownloadSummary {
            downloaded,
            skipped_duplicates: skipped,
            stopped_reason: reason,
        }
    }

    pub async fn run(&mut self) -> Result<DownloadSummary, RuntimeError> {
        if let Some(target) = self.config.start_from.clone() {
            match self.boundary.seek(&target).await? {
                BoundaryOutcome::Found(_) => {
                    info!("seeked to start-from target '{}'", target);
                }
                BoundaryOutcome::NotFound => {
                    return Err(RuntimeError::Validation(format!(
                        "start-from target '{target}' was not found in the gallery; refusing to fall back to the thumbnail gallery"
                    )));
                }
            }
        }

        let mut downloaded = 0u64;
        let mut skipped = 0u64;

        loop {
            if self.controller.check_should_stop() {
                return Ok(self.summary(downloaded, skipped, StopReason::Stopped));
            }
            if downloaded >= self.config.max_downloads {
                return Ok(self.summary(downloaded, skipped, StopReason::MaxDownloadsReached));
            }
            if !self.circuit.can_execute() {
                return Err(RuntimeError::BrowserUnavailable(
                    "circuit breaker open after repeated extraction failures".into(),
                ));
            }

            let metadata = match self.extract_with_retry().await {
                Ok(Some(m)) => {
                    self.circuit.record_success();
                    m
                }
                Ok(None) => return Ok(self.summary(downloaded, skipped, StopReason::GalleryExhausted)),
                Err(e) => {
                    self.circuit.record_failure();
                    return Err(e);
                }
            };

            let creation_time = metadata.creation_time.clone().unwrap_or_default();

            if self.log.is_duplicate(&creation_time, &metadata.prompt) {
                match self.config.duplicate_mode {
                    DuplicateMode::Finish => {
                        return Ok(self.summary(downloaded, skipped, StopReason::BoundaryFound));
                    }
                    DuplicateMode::Skip => {
                        skipped += 1;
                        match self.boundary.scan_for_boundary(&self.log).await? {
                            BoundaryOutcome::Found(container) => {
                                self.driver.click(&container.id).await?;
                                continue;
                            }
                            BoundaryOutcome::NotFound => {
                                return Ok(self.summary(downloaded, skipped, StopReason::BoundaryNotFound));
                            }
                        }
                    }
                }
            }

            self.download_and_log(&creation_time, &metadata.prompt).await?;
            downloaded += 1;

            if !self.advance_to_next_thumbnail().await? {
                return Ok(self.summary(downloaded, skipped, StopReason::GalleryExhausted));
            }
        }
    }

    async fn extract_with_retry(&self) -> Result<Option<crate::gallery::GenerationMetadata>, RuntimeError> {
        let mut last_err = None;
        for attempt in 0..=RETRIES_PER_OPERATION {
            match tokio::time::timeout(METADATA_EXTRACTION_TIMEOUT, self.gallery.extract_metadata()).await {
                Ok(Ok(Some(metadata))) => return Ok(Some(metadata)),
                Ok(Ok(None)) => return Ok(None),
                Ok(Err(e)) => last_err = Some(e),
                Err(_) => last_err = Some(RuntimeError::Timeout(METADATA_EXTRACTION_TIMEOUT)),
            }
            if attempt < RETRIES_PER_OPERATION {
                warn!("metadata extraction attempt {} failed, retrying", attempt + 1);
            }
        }
        Err(last_err.unwrap_or_else(|| RuntimeError::ScriptError("metadata extraction failed".into())))
    }

    async fn download_and_log(&mut self, creation_time: &str, prompt: &str) -> Result<(), RuntimeError> {
        let before = self.driver.list_download_dir(self.config.downloads_folder.to_str().unwrap_or(".")).await?;

        self.gallery.download_without_watermark().await?;

        let downloaded_name = tokio::time::timeout(DOWNLOAD_VISIBLE_TIMEOUT + VERIFY_TIMEOUT, async {
            loop {
                let after = self
                    .driver
                    .list_download_dir(self.config.downloads_folder.to_str().unwrap_or("."))
                    .await?;
                if let Some(new_file) = after.iter().find(|f| !before.contains(f)) {
                    return Ok::<String, RuntimeError>(new_file.clone());
                }
                tokio::time::sleep(Duration::from_millis(200)).await;
            }
        })
        .await
        .map_err(|_| RuntimeError::DownloadFailed("downloaded file did not appear in time".into()))??;

        let entry = DownloadLogEntry {
            file_id: PLACEHOLDER_ID.to_string(),
            creation_time: creation_time.to_string(),
            prompt: prompt.to_string(),
            download_timestamp: Some(format_canonical(&chrono::Utc::now().naive_utc())),
            file_path: Some(downloaded_name.clone()),
        };
        self.log.insert(entry)?;
        info!("downloaded '{}' ({})", downloaded_name, creation_time);
        Ok(())
    }

    /// Returns `false` when no further thumbnail is available (end of
    /// gallery reached while paging forward).
    async fn advance_to_next_thumbnail(&self) -> Result<bool, RuntimeError> {
        match tokio::time::timeout(
            THUMBNAIL_ACTIVATION_TIMEOUT,
            self.driver.wait_for_selector(NEXT_THUMBNAIL_SELECTOR, THUMBNAIL_ACTIVATION_TIMEOUT),
        )
        .await
        {
            Ok(Ok(())) => {
                let next = self.driver.query(NEXT_THUMBNAIL_SELECTOR, THUMBNAIL_ACTIVATION_TIMEOUT).await?;
                self.driver.click(&next.id).await?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::ElementSnapshot;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct ScriptedDriver {
        evaluate_responses: Mutex<Vec<String>>,
        download_dir: Mutex<Vec<String>>,
        clicks: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl BrowserDriver for ScriptedDriver {
        async fn navigate(&self, _url: &str, _timeout: Duration) -> Result<(), RuntimeError> {
            Ok(())
        }
        async fn query(&self, selector: &str, _timeout: Duration) -> Result<ElementSnapshot, RuntimeError> {
            Ok(ElementSnapshot {
                id: selector.to_string(),
                text: String::new(),
                html: String::new(),
                visible: true,
                bounding_top: 0.0,
                bounding_area: 0.0,
            })
        }
        async fn query_all(&self, _selector: &str) -> Result<Vec<ElementSnapshot>, RuntimeError> {
            Ok(vec![])
        }
        async fn click(&self, element: &str) -> Result<(), RuntimeError> {
            self.clicks.lock().unwrap().push(element.to_string());
            Ok(())
        }
        async fn fill(&self, _element: &str, _text: &str) -> Result<(), RuntimeError> {
            Ok(())
        }
        async fn read_attribute(&self, _element: &str, _attribute: &str) -> Result<String, RuntimeError> {
            Ok(String::new())
        }
        async fn wait_for_selector(&self, _selector: &str, _timeout: Duration) -> Result<(), RuntimeError> {
            Err(RuntimeError::ElementNotFound("no more thumbnails".into()))
        }
        async fn scroll_by(&self, _dx: f64, _dy: f64) -> Result<(), RuntimeError> {
            Ok(())
        }
        async fn evaluate(&self, _script: &str) -> Result<String, RuntimeError> {
            let mut responses = self.evaluate_responses.lock().unwrap();
            if responses.is_empty() {
                Ok("[]".to_string())
            } else {
                Ok(responses.remove(0))
            }
        }
        async fn refresh(&self, _timeout: Duration) -> Result<(), RuntimeError> {
            Ok(())
        }
        async fn upload_file(&self, _element: &str, _path: &str) -> Result<(), RuntimeError> {
            Ok(())
        }
        async fn list_download_dir(&self, _dir: &str) -> Result<Vec<String>, RuntimeError> {
            Ok(self.download_dir.lock().unwrap().clone())
        }
        async fn close(&self) -> Result<(), RuntimeError> {
            Ok(())
        }
    }

    fn config(dir: &std::path::Path) -> DownloaderConfig {
        DownloaderConfig {
            config: std::path::PathBuf::from("wf.json"),
            max_downloads: 5,
            downloads_folder: dir.to_path_buf(),
            duplicate_mode: DuplicateMode::Finish,
            start_from: None,
        }
    }

    #[tokio::test]
    async fn stops_immediately_when_max_downloads_is_zero() {
        let dir = tempfile::tempdir().unwrap();
        let driver = Arc::new(ScriptedDriver {
            evaluate_responses: Mutex::new(vec![]),
            download_dir: Mutex::new(vec![]),
            clicks: Mutex::new(vec![]),
        });
        let mut cfg = config(dir.path());
        cfg.max_downloads = 0;
        let mut downloader = GenerationDownloader::new(driver, cfg, Arc::new(Controller::new()), 800.0).unwrap();
        let summary = downloader.run().await.unwrap();
        assert_eq!(summary.stopped_reason, StopReason::MaxDownloadsReached);
        assert_eq!(summary.downloaded, 0);
    }

    #[tokio::test]
    async fn controller_stop_is_observed_before_first_extraction() {
        let dir = tempfile::tempdir().unwrap();
        let driver = Arc::new(ScriptedDriver {
            evaluate_responses: Mutex::new(vec![]),
            download_dir: Mutex::new(vec![]),
            clicks: Mutex::new(vec![]),
        });
        let controller = Arc::new(Controller::new());
        controller.request_stop(false);
        let mut downloader =
            GenerationDownloader::new(driver, config(dir.path()), controller, 800.0).unwrap();
        let summary = downloader.run().await.unwrap();
        assert_eq!(summary.stopped_reason, StopReason::Stopped);
    }

    #[test]
    fn circuit_breaker_guards_repeated_extraction_failure() {
        let cb = CircuitBreaker::new(2, Duration::from_secs(60));
        cb.record_failure();
        cb.record_failure();
        assert!(!cb.can_execute());
    }
}
