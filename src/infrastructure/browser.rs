use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::error::CdpError;
use chromiumoxide::page::Page;
use futures::StreamExt;
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};

const ELEMENT_POLL_INTERVAL: Duration = Duration::from_millis(250);
const HISTORY_SETTLE_DELAY: Duration = Duration::from_millis(300);
const MAX_LINKS: usize = 80;

#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("failed to launch browser: {0}")]
    Launch(String),
    #[error("browser error: {0}")]
    Cdp(#[from] CdpError),
    #[error("no element matches selector '{selector}'")]
    NotFound { selector: String },
    #[error("timed out after {seconds}s waiting for {what}")]
    Timeout { what: String, seconds: u64 },
    #[error("script evaluation failed: {0}")]
    Script(String),
    #[error("browser is already closed")]
    Closed,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PageLink {
    pub text: String,
    pub href: String,
}

/// Capability surface the tool registry drives. One method per browser
/// action; implementations must resolve every failure into `BrowserError`.
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    /// Navigates to `url` and returns a short textual summary of the page.
    async fn navigate(&self, url: &str) -> Result<String, BrowserError>;
    async fn click(&self, selector: &str) -> Result<(), BrowserError>;
    async fn type_text(&self, selector: &str, text: &str) -> Result<(), BrowserError>;
    async fn press_key(&self, selector: &str, key: &str) -> Result<(), BrowserError>;
    /// Visible text of the page, or of the first element matching `selector`.
    async fn read_text(&self, selector: Option<&str>) -> Result<String, BrowserError>;
    async fn list_links(&self) -> Result<Vec<PageLink>, BrowserError>;
    async fn scroll_by(&self, pixels: i64) -> Result<(), BrowserError>;
    async fn go_back(&self) -> Result<String, BrowserError>;
    async fn current_url(&self) -> Result<String, BrowserError>;
    async fn wait_for(&self, selector: &str, timeout: Duration) -> Result<(), BrowserError>;
    async fn close(&self) -> Result<(), BrowserError>;
}

struct DriverState {
    browser: Browser,
    page: Page,
    handler_task: JoinHandle<()>,
}

/// One Chromium process and one page for the whole process.
///
/// Every operation acquires the state mutex for its duration, so tool
/// invocations from all sessions are serialized against the single page.
/// `close` takes the state out, making later calls fail with `Closed`.
pub struct ChromiumDriver {
    state: Mutex<Option<DriverState>>,
}

impl ChromiumDriver {
    pub async fn launch(headless: bool) -> Result<Self, BrowserError> {
        let mut builder = BrowserConfig::builder();
        if !headless {
            builder = builder.with_head();
        }
        let config = builder.build().map_err(BrowserError::Launch)?;

        info!(headless, "Launching browser");
        let (browser, mut handler) = Browser::launch(config).await?;
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
            debug!("Browser event handler finished");
        });

        let page = browser.new_page("about:blank").await?;
        info!("Browser ready");

        Ok(Self {
            state: Mutex::new(Some(DriverState {
                browser,
                page,
                handler_task,
            })),
        })
    }
}

#[async_trait]
impl BrowserDriver for ChromiumDriver {
    async fn navigate(&self, url: &str) -> Result<String, BrowserError> {
        let guard = self.state.lock().await;
        let state = guard.as_ref().ok_or(BrowserError::Closed)?;
        debug!(url, "Navigating");
        state.page.goto(url).await?;
        state.page.wait_for_navigation().await?;

        let landed = state
            .page
            .url()
            .await?
            .unwrap_or_else(|| url.to_string());
        let title = state.page.get_title().await?.unwrap_or_default();
        if title.is_empty() {
            Ok(format!("Loaded {landed}"))
        } else {
            Ok(format!("Loaded {landed} ({title})"))
        }
    }

    async fn click(&self, selector: &str) -> Result<(), BrowserError> {
        let guard = self.state.lock().await;
        let state = guard.as_ref().ok_or(BrowserError::Closed)?;
        let element = state
            .page
            .find_element(selector)
            .await
            .map_err(|_| BrowserError::NotFound {
                selector: selector.to_string(),
            })?;
        element.click().await?;
        Ok(())
    }

    async fn type_text(&self, selector: &str, text: &str) -> Result<(), BrowserError> {
        let guard = self.state.lock().await;
        let state = guard.as_ref().ok_or(BrowserError::Closed)?;
        let element = state
            .page
            .find_element(selector)
            .await
            .map_err(|_| BrowserError::NotFound {
                selector: selector.to_string(),
            })?;
        element.click().await?.type_str(text).await?;
        Ok(())
    }

    async fn press_key(&self, selector: &str, key: &str) -> Result<(), BrowserError> {
        let guard = self.state.lock().await;
        let state = guard.as_ref().ok_or(BrowserError::Closed)?;
        let element = state
            .page
            .find_element(selector)
            .await
            .map_err(|_| BrowserError::NotFound {
                selector: selector.to_string(),
            })?;
        element.press_key(key).await?;
        Ok(())
    }

    async fn read_text(&self, selector: Option<&str>) -> Result<String, BrowserError> {
        let guard = self.state.lock().await;
        let state = guard.as_ref().ok_or(BrowserError::Closed)?;
        match selector {
            Some(selector) => {
                let element = state.page.find_element(selector).await.map_err(|_| {
                    BrowserError::NotFound {
                        selector: selector.to_string(),
                    }
                })?;
                let text = element.inner_text().await?.unwrap_or_default();
                Ok(text)
            }
            None => {
                let text: String = state
                    .page
                    .evaluate("document.body ? document.body.innerText : ''")
                    .await?
                    .into_value()
                    .map_err(|err| BrowserError::Script(err.to_string()))?;
                Ok(text)
            }
        }
    }

    async fn list_links(&self) -> Result<Vec<PageLink>, BrowserError> {
        let guard = self.state.lock().await;
        let state = guard.as_ref().ok_or(BrowserError::Closed)?;
        let script = format!(
            r#"Array.from(document.querySelectorAll('a[href]'))
                .filter(a => a.innerText.trim().length > 0)
                .slice(0, {MAX_LINKS})
                .map(a => ({{ text: a.innerText.trim().replace(/\s+/g, ' ').slice(0, 120), href: a.href }}))"#
        );
        let links: Vec<PageLink> = state
            .page
            .evaluate(script)
            .await?
            .into_value()
            .map_err(|err| BrowserError::Script(err.to_string()))?;
        Ok(links)
    }

    async fn scroll_by(&self, pixels: i64) -> Result<(), BrowserError> {
        let guard = self.state.lock().await;
        let state = guard.as_ref().ok_or(BrowserError::Closed)?;
        state
            .page
            .evaluate(format!("window.scrollBy(0, {pixels});"))
            .await?;
        Ok(())
    }

    async fn go_back(&self) -> Result<String, BrowserError> {
        let guard = self.state.lock().await;
        let state = guard.as_ref().ok_or(BrowserError::Closed)?;
        state.page.evaluate("history.back();").await?;
        // history.back only schedules the navigation; give it a moment.
        sleep(HISTORY_SETTLE_DELAY).await;
        let url = state
            .page
            .url()
            .await?
            .unwrap_or_else(|| "about:blank".to_string());
        Ok(url)
    }

    async fn current_url(&self) -> Result<String, BrowserError> {
        let guard = self.state.lock().await;
        let state = guard.as_ref().ok_or(BrowserError::Closed)?;
        let url = state
            .page
            .url()
            .await?
            .unwrap_or_else(|| "about:blank".to_string());
        Ok(url)
    }

    async fn wait_for(&self, selector: &str, timeout: Duration) -> Result<(), BrowserError> {
        let guard = self.state.lock().await;
        let state = guard.as_ref().ok_or(BrowserError::Closed)?;
        let deadline = Instant::now() + timeout;
        loop {
            if state.page.find_element(selector).await.is_ok() {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(BrowserError::Timeout {
                    what: format!("selector '{selector}'"),
                    seconds: timeout.as_secs(),
                });
            }
            sleep(ELEMENT_POLL_INTERVAL).await;
        }
    }

    async fn close(&self) -> Result<(), BrowserError> {
        let mut guard = self.state.lock().await;
        let Some(mut state) = guard.take() else {
            return Ok(());
        };
        info!("Closing browser");
        if let Err(err) = state.browser.close().await {
            warn!(%err, "Failed to close browser cleanly");
        }
        if let Err(err) = state.browser.wait().await {
            debug!(%err, "Browser process did not report a clean exit");
        }
        state.handler_task.abort();
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Driver stub for tests whose tools never reach a real browser.
    pub(crate) struct NoopDriver;

    #[async_trait]
    impl BrowserDriver for NoopDriver {
        async fn navigate(&self, url: &str) -> Result<String, BrowserError> {
            Ok(format!("Loaded {url}"))
        }

        async fn click(&self, _selector: &str) -> Result<(), BrowserError> {
            Ok(())
        }

        async fn type_text(&self, _selector: &str, _text: &str) -> Result<(), BrowserError> {
            Ok(())
        }

        async fn press_key(&self, _selector: &str, _key: &str) -> Result<(), BrowserError> {
            Ok(())
        }

        async fn read_text(&self, _selector: Option<&str>) -> Result<String, BrowserError> {
            Ok(String::new())
        }

        async fn list_links(&self) -> Result<Vec<PageLink>, BrowserError> {
            Ok(Vec::new())
        }

        async fn scroll_by(&self, _pixels: i64) -> Result<(), BrowserError> {
            Ok(())
        }

        async fn go_back(&self) -> Result<String, BrowserError> {
            Ok("about:blank".to_string())
        }

        async fn current_url(&self) -> Result<String, BrowserError> {
            Ok("about:blank".to_string())
        }

        async fn wait_for(&self, _selector: &str, _timeout: Duration) -> Result<(), BrowserError> {
            Ok(())
        }

        async fn close(&self) -> Result<(), BrowserError> {
            Ok(())
        }
    }
}
