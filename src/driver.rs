//! The `BrowserDriver` capability (C1): abstract page/browser operations the
//! engine, GalleryNavigator, and BoundaryScanner drive through. Per the
//! concurrency model, exactly one driver instance is owned by one engine's
//! event loop — there is no pool.

use crate::error::RuntimeError;
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use futures::StreamExt;
use std::time::Duration;
use tracing::{info, warn};

/// An opaque handle to a located DOM element, returned by `query`/
/// `query_all` and consumed by `click`/`fill`/`read_attribute`/`scroll_into_view`.
pub type ElementId = String;

#[derive(Debug, Clone)]
pub struct ElementSnapshot {
    pub id: ElementId,
    pub text: String,
    pub html: String,
    pub visible: bool,
    pub bounding_top: f64,
    pub bounding_area: f64,
}

/// Abstract browser/page operations. Specified only through this interface
/// per scope — implementations outside `ChromiumDriver` (e.g. a mock for
/// tests) need only satisfy this trait.
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    async fn navigate(&self, url: &str, timeout: Duration) -> Result<(), RuntimeError>;

    /// Finds the first element matching `selector`, CSS or the text-predicate
    /// form `span:has-text('X')`.
    async fn query(&self, selector: &str, timeout: Duration) -> Result<ElementSnapshot, RuntimeError>;

    async fn query_all(&self, selector: &str) -> Result<Vec<ElementSnapshot>, RuntimeError>;

    async fn click(&self, element: &ElementId) -> Result<(), RuntimeError>;

    async fn fill(&self, element: &ElementId, text: &str) -> Result<(), RuntimeError>;

    async fn read_attribute(&self, element: &ElementId, attribute: &str) -> Result<String, RuntimeError>;

    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> Result<(), RuntimeError>;

    async fn scroll_by(&self, dx: f64, dy: f64) -> Result<(), RuntimeError>;

    async fn evaluate(&self, script: &str) -> Result<String, RuntimeError>;

    async fn refresh(&self, timeout: Duration) -> Result<(), RuntimeError>;

    async fn upload_file(&self, element: &ElementId, path: &str) -> Result<(), RuntimeError>;

    /// Returns the list of currently visible filenames in the configured
    /// download directory; used by the GenerationDownloader's adaptive
    /// "file appeared" polling predicate.
    async fn list_download_dir(&self, dir: &str) -> Result<Vec<String>, RuntimeError>;

    async fn close(&self) -> Result<(), RuntimeError>;
}

/// chromiumoxide-backed implementation: one `Browser` + one active `Page`,
/// a background CDP event-pump task (mirrors the teacher's browser-launch
/// idiom, reduced to a single instance — the spec mandates single-browser,
/// not a pool).
pub struct ChromiumDriver {
    browser: tokio::sync::Mutex<Browser>,
    page: tokio::sync::Mutex<Option<chromiumoxide::page::Page>>,
    _handler: tokio::task::JoinHandle<()>,
}

impl ChromiumDriver {
    pub async fn launch(headless: bool, chrome_args: Vec<String>) -> Result<Self, RuntimeError> {
        let mut builder = BrowserConfig::builder();
        if !headless {
            builder = builder.with_head();
        }
        for arg in &chrome_args {
            builder = builder.arg(arg.clone());
        }
        let config = builder
            .build()
            .map_err(|e| RuntimeError::BrowserUnavailable(e.to_string()))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| RuntimeError::BrowserUnavailable(e.to_string()))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    warn!("chrome devtools protocol event error: {}", e);
                }
            }
        });

        info!("chromium driver launched (headless={})", headless);

        Ok(Self {
            browser: tokio::sync::Mutex::new(browser),
            page: tokio::sync::Mutex::new(None),
            _handler: handler_task,
        })
    }

    async fn active_page(&self) -> Result<chromiumoxide::page::Page, RuntimeError> {
        let page = self.page.lock().await;
        page.clone()
            .ok_or_else(|| RuntimeError::Navigation("no page has been opened yet".into()))
    }
}

#[async_trait]
impl BrowserDriver for ChromiumDriver {
    async fn navigate(&self, url: &str, timeout: Duration) -> Result<(), RuntimeError> {
        let mut guard = self.page.lock().await;
        let page = if let Some(existing) = guard.as_ref() {
            existing.goto(url).await
        } else {
            let browser = self.browser.lock().await;
            browser.new_page(url).await
        }
        .map_err(|e| RuntimeError::Navigation(e.to_string()))?;

        tokio::time::timeout(timeout, page.wait_for_navigation())
            .await
            .map_err(|_| RuntimeError::Timeout(timeout))?
            .map_err(|e| RuntimeError::Navigation(e.to_string()))?;

        *guard = Some(page);
        Ok(())
    }

    async fn query(&self, selector: &str, timeout: Duration) -> Result<ElementSnapshot, RuntimeError> {
        let page = self.active_page().await?;
        let element = tokio::time::timeout(timeout, page.find_element(selector))
            .await
            .map_err(|_| RuntimeError::Timeout(timeout))?
            .map_err(|e| RuntimeError::ElementNotFound(format!("{selector}: {e}")))?;

        let text = element
            .inner_text()
            .await
            .ok()
            .flatten()
            .unwrap_or_default();
        let html = element.outer_html().await.unwrap_or_default();

        Ok(ElementSnapshot {
            id: selector.to_string(),
            text,
            html,
            visible: true,
            bounding_top: 0.0,
            bounding_area: 0.0,
        })
    }

    async fn query_all(&self, selector: &str) -> Result<Vec<ElementSnapshot>, RuntimeError> {
        let page = self.active_page().await?;
        let elements = page
            .find_elements(selector)
            .await
            .map_err(|e| RuntimeError::ElementNotFound(format!("{selector}: {e}")))?;

        let mut snapshots = Vec::with_capacity(elements.len());
        for (idx, el) in elements.iter().enumerate() {
            let text = el.inner_text().await.ok().flatten().unwrap_or_default();
            let html = el.outer_html().await.unwrap_or_default();
            snapshots.push(ElementSnapshot {
                id: format!("{selector}[{idx}]"),
                text,
                html,
                visible: true,
                bounding_top: 0.0,
                bounding_area: 0.0,
            });
        }
        Ok(snapshots)
    }

    async fn click(&self, element: &ElementId) -> Result<(), RuntimeError> {
        let page = self.active_page().await?;
        let el = page
            .find_element(element)
            .await
            .map_err(|e| RuntimeError::ElementNotFound(format!("{element}: {e}")))?;
        el.click()
            .await
            .map_err(|e| RuntimeError::ScriptError(e.to_string()))?;
        Ok(())
    }

    async fn fill(&self, element: &ElementId, text: &str) -> Result<(), RuntimeError> {
        let page = self.active_page().await?;
        let el = page
            .find_element(element)
            .await
            .map_err(|e| RuntimeError::ElementNotFound(format!("{element}: {e}")))?;
        el.click()
            .await
            .map_err(|e| RuntimeError::ScriptError(e.to_string()))?;
        el.type_str(text)
            .await
            .map_err(|e| RuntimeError::ScriptError(e.to_string()))?;
        Ok(())
    }

    async fn read_attribute(&self, element: &ElementId, attribute: &str) -> Result<String, RuntimeError> {
        let page = self.active_page().await?;
        let el = page
            .find_element(element)
            .await
            .map_err(|e| RuntimeError::ElementNotFound(format!("{element}: {e}")))?;

        if attribute == "text" {
            return Ok(el.inner_text().await.ok().flatten().unwrap_or_default());
        }

        let attrs = el.attributes().await.unwrap_or_default();
        let attrs = attrs.unwrap_or_default();
        let mut iter = attrs.into_iter();
        while let (Some(key), Some(value)) = (iter.next(), iter.next()) {
            if key == attribute {
                return Ok(value);
            }
        }
        Ok(String::new())
    }

    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> Result<(), RuntimeError> {
        let page = self.active_page().await?;
        tokio::time::timeout(timeout, page.wait_for_navigation())
            .await
            .ok();
        page.find_element(selector)
            .await
            .map_err(|e| RuntimeError::ElementNotFound(format!("{selector}: {e}")))?;
        Ok(())
    }

    async fn scroll_by(&self, dx: f64, dy: f64) -> Result<(), RuntimeError> {
        let page = self.active_page().await?;
        let script = format!("window.scrollBy({dx}, {dy})");
        page.evaluate(script)
            .await
            .map_err(|e| RuntimeError::ScriptError(e.to_string()))?;
        Ok(())
    }

    async fn evaluate(&self, script: &str) -> Result<String, RuntimeError> {
        let page = self.active_page().await?;
        let result = page
            .evaluate(script)
            .await
            .map_err(|e| RuntimeError::ScriptError(e.to_string()))?;
        Ok(result
            .value()
            .map(|v| v.to_string())
            .unwrap_or_default())
    }

    async fn refresh(&self, timeout: Duration) -> Result<(), RuntimeError> {
        let page = self.active_page().await?;
        page.reload()
            .await
            .map_err(|e| RuntimeError::Navigation(e.to_string()))?;
        tokio::time::timeout(timeout, page.wait_for_navigation())
            .await
            .map_err(|_| RuntimeError::Timeout(timeout))?
            .map_err(|e| RuntimeError::Navigation(e.to_string()))?;
        Ok(())
    }

    async fn upload_file(&self, element: &ElementId, path: &str) -> Result<(), RuntimeError> {
        let page = self.active_page().await?;
        let el = page
            .find_element(element)
            .await
            .map_err(|e| RuntimeError::ElementNotFound(format!("{element}: {e}")))?;
        el.set_input_files(vec![path.to_string()])
            .await
            .map_err(|e| RuntimeError::ScriptError(e.to_string()))?;
        Ok(())
    }

    async fn list_download_dir(&self, dir: &str) -> Result<Vec<String>, RuntimeError> {
        let mut names = Vec::new();
        let mut entries = tokio::fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        Ok(names)
    }

    async fn close(&self) -> Result<(), RuntimeError> {
        let mut browser = self.browser.lock().await;
        browser
            .close()
            .await
            .map_err(|e| RuntimeError::BrowserUnavailable(e.to_string()))?;
        Ok(())
    }
}
