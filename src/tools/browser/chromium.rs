//! Chromium engine - wraps chromiumoxide
//!
//! Provides the async page primitives the browser tools are built on.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::emulation::{
    SetDeviceMetricsOverrideParams, SetLocaleOverrideParams, SetTimezoneOverrideParams,
};
use chromiumoxide::error::CdpError;
use chromiumoxide::{Browser, BrowserConfig as CdpBrowserConfig, Page};
use futures::StreamExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::core::config::BrowserConfig;
use crate::tools::browser::engine::{
    BrowserEngine, ElementLocator, EngineLauncher, PageHandle, Viewport,
};
use crate::tools::browser::error::BrowserError;
use crate::tools::browser::host::HostEnvironment;

/// Attribute used to pin an element found by its text
const TARGET_ATTR: &str = "data-agent-target";

/// A dead page stays [`BrowserError::PageUnavailable`] so the caller can
/// replace it; anything else is a failed navigation.
fn navigation_error(err: CdpError) -> BrowserError {
    match BrowserError::from(err) {
        dead @ BrowserError::PageUnavailable(_) => dead,
        other => BrowserError::NavigationFailed(other.to_string()),
    }
}

/// Hands `page` back if its setup succeeded; otherwise closes it so no
/// half-configured tab is left open, and returns the setup error.
async fn keep_if_ready<P, F, Fut>(
    page: P,
    setup: Result<(), BrowserError>,
    close: F,
) -> Result<P, BrowserError>
where
    F: FnOnce(P) -> Fut,
    Fut: Future<Output = Result<(), BrowserError>>,
{
    match setup {
        Ok(()) => Ok(page),
        Err(e) => {
            if let Err(close_err) = close(page).await {
                warn!(error = %close_err, "failed to close page after setup error");
            }
            Err(e)
        }
    }
}

/// Launches a local Chrome/Chromium over CDP
#[derive(Debug, Clone, Copy, Default)]
pub struct ChromiumLauncher;

#[async_trait]
impl EngineLauncher for ChromiumLauncher {
    async fn launch(
        &self,
        config: &BrowserConfig,
        host: &HostEnvironment,
    ) -> Result<Box<dyn BrowserEngine>, BrowserError> {
        let mut builder = CdpBrowserConfig::builder();

        // chromiumoxide runs headless unless asked otherwise
        if !config.headless {
            builder = builder.with_head();
        }

        builder = builder
            .viewport(chromiumoxide::handler::viewport::Viewport {
                width: config.viewport_width,
                height: config.viewport_height,
                device_scale_factor: None,
                emulating_mobile: false,
                is_landscape: false,
                has_touch: false,
            })
            .request_timeout(Duration::from_millis(config.navigation_timeout_ms))
            .port(config.remote_debugging_port)
            .arg("--no-sandbox")
            .arg("--disable-setuid-sandbox")
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-web-security")
            .arg("--allow-running-insecure-content")
            .arg(format!("--display={}", config.display))
            .arg(format!("--lang={}", host.locale));

        if let Some(ref path) = config.chrome_path {
            builder = builder.chrome_executable(path);
        }

        let cdp_config = builder.build().map_err(|e| {
            BrowserError::LaunchFailed(format!("failed to build browser config: {e}"))
        })?;

        info!(
            headless = config.headless,
            port = config.remote_debugging_port,
            locale = %host.locale,
            timezone = %host.timezone,
            "launching chromium"
        );

        let (browser, mut handler) = Browser::launch(cdp_config)
            .await
            .map_err(|e| BrowserError::LaunchFailed(e.to_string()))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!(error = %e, "browser handler event error");
                }
            }
            debug!("browser event handler exited");
        });

        Ok(Box::new(ChromiumEngine {
            browser: Mutex::new(browser),
            handler: Mutex::new(Some(handler_task)),
            host: host.clone(),
            timeout: Duration::from_millis(config.navigation_timeout_ms),
            next_page_id: AtomicU64::new(1),
            shut_down: AtomicBool::new(false),
        }))
    }
}

/// A launched Chromium process
pub struct ChromiumEngine {
    browser: Mutex<Browser>,
    handler: Mutex<Option<JoinHandle<()>>>,
    host: HostEnvironment,
    timeout: Duration,
    next_page_id: AtomicU64,
    shut_down: AtomicBool,
}

impl ChromiumEngine {
    /// Apply viewport, locale and timezone to a fresh page.
    /// Emulation failures are logged; the page stays usable.
    async fn prepare_page(&self, page: &Page, viewport: Viewport) -> Result<(), BrowserError> {
        let metrics = SetDeviceMetricsOverrideParams::new(
            i64::from(viewport.width),
            i64::from(viewport.height),
            1.0,
            false,
        );
        page.execute(metrics).await?;

        let locale = SetLocaleOverrideParams {
            locale: Some(self.host.locale.clone()),
        };
        if let Err(e) = page.execute(locale).await {
            warn!(error = %e, locale = %self.host.locale, "failed to set page locale");
        }

        let timezone = SetTimezoneOverrideParams::new(self.host.timezone.clone());
        if let Err(e) = page.execute(timezone).await {
            warn!(error = %e, timezone = %self.host.timezone, "failed to set page timezone");
        }

        Ok(())
    }
}

#[async_trait]
impl BrowserEngine for ChromiumEngine {
    async fn open_page(&self, viewport: Viewport) -> Result<Arc<dyn PageHandle>, BrowserError> {
        if self.shut_down.load(Ordering::SeqCst) {
            return Err(BrowserError::SessionClosed);
        }

        let page = {
            let browser = self.browser.lock().await;
            browser.new_page("about:blank").await?
        };
        let setup = self.prepare_page(&page, viewport).await;
        let page = keep_if_ready(page, setup, |page| async move {
            page.close().await.map_err(BrowserError::from)
        })
        .await?;

        let id = self.next_page_id.fetch_add(1, Ordering::SeqCst);
        debug!(page_id = id, width = viewport.width, height = viewport.height, "opened page");

        Ok(Arc::new(ChromiumPage {
            id,
            page,
            viewport,
            timeout: self.timeout,
            closed: AtomicBool::new(false),
            next_target: AtomicU64::new(1),
        }))
    }

    async fn shutdown(&self) -> Result<(), BrowserError> {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let mut browser = self.browser.lock().await;
        let closed = browser.close().await;
        if let Err(e) = browser.wait().await {
            warn!(error = %e, "failed waiting for browser process exit");
        }
        if let Some(handler) = self.handler.lock().await.take() {
            handler.abort();
        }

        closed.map(|_| ()).map_err(BrowserError::from)
    }
}

/// A chromiumoxide page
pub struct ChromiumPage {
    id: u64,
    page: Page,
    viewport: Viewport,
    timeout: Duration,
    closed: AtomicBool,
    next_target: AtomicU64,
}

impl ChromiumPage {
    fn ensure_open(&self) -> Result<(), BrowserError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BrowserError::PageUnavailable(format!(
                "page {} is closed",
                self.id
            )));
        }
        Ok(())
    }

    /// Run `fut` within the page timeout
    async fn bounded<T, F>(&self, what: &str, fut: F) -> Result<T, BrowserError>
    where
        F: std::future::Future<Output = Result<T, BrowserError>>,
    {
        tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| BrowserError::Timeout(format!("{} exceeded {:?}", what, self.timeout)))?
    }

    async fn eval<T: serde::de::DeserializeOwned>(&self, js: &str) -> Result<T, BrowserError> {
        self.ensure_open()?;
        let result = self.page.evaluate(js).await?;
        result
            .into_value::<T>()
            .map_err(|e| BrowserError::Cdp(format!("unexpected evaluation result: {e}")))
    }

    /// CSS selector for `locator`; text locators are pinned with an attribute.
    async fn resolve(&self, locator: &ElementLocator) -> Result<String, BrowserError> {
        match locator {
            ElementLocator::Css(selector) => Ok(selector.clone()),
            ElementLocator::Text(text) => {
                let marker = self.next_target.fetch_add(1, Ordering::SeqCst).to_string();
                let js = format!(
                    r#"(() => {{
                        const wanted = {text}.trim().toLowerCase();
                        const candidates = Array.from(document.querySelectorAll(
                            'a, button, input, textarea, select, label, summary, [role="button"], [role="link"], [role="tab"], [onclick], [contenteditable="true"]'
                        ));
                        const label = (el) => (el.innerText || el.value || el.getAttribute('aria-label') || el.getAttribute('placeholder') || el.getAttribute('title') || '').trim().toLowerCase();
                        const hit = candidates.find((el) => label(el) === wanted)
                            || candidates.find((el) => label(el).includes(wanted));
                        if (!hit) return false;
                        hit.setAttribute({attr}, {marker});
                        return true;
                    }})()"#,
                    text = serde_json::to_string(text)
                        .map_err(|e| BrowserError::InvalidAction(e.to_string()))?,
                    attr = serde_json::to_string(TARGET_ATTR)
                        .map_err(|e| BrowserError::InvalidAction(e.to_string()))?,
                    marker = serde_json::to_string(&marker)
                        .map_err(|e| BrowserError::InvalidAction(e.to_string()))?,
                );

                let found: bool = self.eval(&js).await?;
                if !found {
                    return Err(BrowserError::ElementNotFound(locator.to_string()));
                }
                Ok(format!(r#"[{}="{}"]"#, TARGET_ATTR, marker))
            }
        }
    }

    async fn find(&self, locator: &ElementLocator) -> Result<chromiumoxide::Element, BrowserError> {
        let selector = self.resolve(locator).await?;
        self.page.find_element(selector).await.map_err(|e| {
            match BrowserError::from(e) {
                dead @ BrowserError::PageUnavailable(_) => dead,
                _ => BrowserError::ElementNotFound(locator.to_string()),
            }
        })
    }
}

#[async_trait]
impl PageHandle for ChromiumPage {
    fn id(&self) -> u64 {
        self.id
    }

    fn viewport(&self) -> Viewport {
        self.viewport
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn navigate(&self, url: &str) -> Result<String, BrowserError> {
        self.ensure_open()?;
        self.bounded("navigation", async {
            self.page.goto(url).await.map_err(navigation_error)?;
            self.page.wait_for_navigation().await.map_err(navigation_error)?;
            Ok::<(), BrowserError>(())
        })
        .await?;
        self.current_url().await
    }

    async fn current_url(&self) -> Result<String, BrowserError> {
        self.ensure_open()?;
        Ok(self.page.url().await?.unwrap_or_default())
    }

    async fn title(&self) -> Result<String, BrowserError> {
        self.ensure_open()?;
        Ok(self.page.get_title().await?.unwrap_or_default())
    }

    async fn text_content(&self) -> Result<String, BrowserError> {
        self.eval("document.body ? document.body.innerText : ''").await
    }

    async fn scroll_by(&self, dx: i64, dy: i64) -> Result<(), BrowserError> {
        let _: bool = self
            .eval(&format!("window.scrollBy({dx}, {dy}); true"))
            .await?;
        Ok(())
    }

    async fn go_back(&self) -> Result<String, BrowserError> {
        let _: bool = self.eval("history.back(); true").await?;
        self.bounded("history navigation", async {
            self.page.wait_for_navigation().await.map_err(navigation_error)?;
            Ok::<(), BrowserError>(())
        })
        .await?;
        self.current_url().await
    }

    async fn click(&self, locator: &ElementLocator) -> Result<(), BrowserError> {
        self.ensure_open()?;
        self.bounded("click", async {
            let element = self.find(locator).await?;
            element.scroll_into_view().await?;
            element.click().await?;
            debug!(page_id = self.id, %locator, "clicked element");
            Ok::<(), BrowserError>(())
        })
        .await
    }

    async fn type_text(
        &self,
        locator: &ElementLocator,
        text: &str,
        submit: bool,
    ) -> Result<(), BrowserError> {
        self.ensure_open()?;
        self.bounded("typing", async {
            let element = self.find(locator).await?;
            element.scroll_into_view().await?;
            element.click().await?;
            element
                .call_js_fn("function() { if ('value' in this) { this.value = ''; } }", false)
                .await?;
            element.type_str(text).await?;
            if submit {
                element.press_key("Enter").await?;
            }
            debug!(page_id = self.id, %locator, chars = text.len(), "typed text");
            Ok::<(), BrowserError>(())
        })
        .await
    }

    async fn close(&self) -> Result<(), BrowserError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        match self.page.clone().close().await.map_err(BrowserError::from) {
            Ok(()) | Err(BrowserError::PageUnavailable(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }
}
