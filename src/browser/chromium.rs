//! Chromium (CDP) implementation of the browser seams.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::browser::BrowserContextId;
use chromiumoxide::cdp::browser_protocol::emulation::{
    SetDeviceMetricsOverrideParams, SetGeolocationOverrideParams, SetLocaleOverrideParams,
};
use chromiumoxide::cdp::browser_protocol::network::SetUserAgentOverrideParams;
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::cdp::browser_protocol::target::{
    CreateBrowserContextParams, CreateTargetParams, DisposeBrowserContextParams,
};
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

use super::{stealth, BrowserEngineConfig, BrowserSession, PageHandle, PageTimeouts, SessionFactory};
use crate::error::{ScrapeError, ScrapeResult};

/// Common Chrome executable paths to check.
const CHROME_PATHS: &[&str] = &[
    // Linux
    "/usr/bin/google-chrome",
    "/usr/bin/google-chrome-stable",
    "/usr/bin/chromium",
    "/usr/bin/chromium-browser",
    "/snap/bin/chromium",
    // macOS
    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
    "/Applications/Chromium.app/Contents/MacOS/Chromium",
    // Common install locations
    "/opt/google/chrome/google-chrome",
];

const CHROME_COMMANDS: &[&str] = &[
    "google-chrome",
    "google-chrome-stable",
    "chromium",
    "chromium-browser",
];

/// Flags that hide the usual automation tells.
const STEALTH_ARGS: &[&str] = &[
    "--disable-blink-features=AutomationControlled",
    "--disable-infobars",
    "--disable-dev-shm-usage",
    "--no-first-run",
    "--no-default-browser-check",
    "--disable-background-networking",
    "--disable-sync",
    "--disable-translate",
    "--metrics-recording-only",
    "--safebrowsing-disable-auto-update",
    "--no-sandbox",
    "--disable-gpu",
    "--disable-software-rasterizer",
];

/// Resolves once the document is interactive.
const READY_STATE_SCRIPT: &str = r#"
    new Promise((resolve) => {
        if (document.readyState === 'complete' || document.readyState === 'interactive') {
            resolve(document.readyState);
        } else {
            document.addEventListener('DOMContentLoaded', () => resolve(document.readyState));
            setTimeout(() => resolve('timeout'), 10000);
        }
    })
"#;

const SELECTOR_POLL: Duration = Duration::from_millis(250);

/// Find a Chrome executable: the configured path, then common install
/// locations, then `PATH`.
pub fn find_chrome(configured: Option<&Path>) -> ScrapeResult<PathBuf> {
    if let Some(path) = configured {
        if path.exists() {
            return Ok(path.to_path_buf());
        }
        warn!("Configured Chrome {} does not exist", path.display());
    }

    for path in CHROME_PATHS {
        let p = Path::new(path);
        if p.exists() {
            info!("Found Chrome at: {}", path);
            return Ok(p.to_path_buf());
        }
    }

    for cmd in CHROME_COMMANDS {
        if let Ok(path) = which::which(cmd) {
            info!("Found Chrome in PATH: {}", path.display());
            return Ok(path);
        }
    }

    Err(ScrapeError::LaunchFailure(
        "Chrome/Chromium not found. Please install it:\n\
         - Arch/Manjaro: sudo pacman -S chromium\n\
         - Ubuntu/Debian: sudo apt install chromium-browser\n\
         - Fedora: sudo dnf install chromium\n\
         - Or set CHROME_PATH / browser.chromeExecutable"
            .to_string(),
    ))
}

fn spawn_handler(mut handler: chromiumoxide::Handler) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(h) = handler.next().await {
            if h.is_err() {
                break;
            }
        }
    })
}

/// DevTools websocket for a remote endpoint. `ws://.../devtools/browser/..`
/// URLs are used as-is; anything else is resolved through `/json/version`.
async fn resolve_ws_url(url: &str, timeout: Duration) -> ScrapeResult<String> {
    if url.starts_with("ws") && url.contains("/devtools/browser/") {
        return Ok(url.to_string());
    }
    let mut version_url = Url::parse(url).map_err(|e| {
        ScrapeError::LaunchFailure(format!("invalid remote browser URL '{}': {}", url, e))
    })?;
    let scheme = match version_url.scheme() {
        "ws" => "http",
        "wss" => "https",
        other => other,
    }
    .to_string();
    version_url
        .set_scheme(&scheme)
        .map_err(|_| ScrapeError::LaunchFailure(format!("unsupported scheme in '{}'", url)))?;
    version_url.set_path("/json/version");

    let client = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| ScrapeError::LaunchFailure(e.to_string()))?;
    let resp: serde_json::Value = client
        .get(version_url)
        .send()
        .await
        .map_err(|e| ScrapeError::LaunchFailure(format!("remote browser unreachable: {}", e)))?
        .json()
        .await
        .map_err(|e| ScrapeError::LaunchFailure(format!("bad browser version info: {}", e)))?;

    resp.get("webSocketDebuggerUrl")
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| ScrapeError::LaunchFailure("no webSocketDebuggerUrl in response".into()))
}

struct Running {
    browser: Browser,
    handler: JoinHandle<()>,
    context: Option<BrowserContextId>,
    remote: bool,
}

/// One Chrome process (or remote connection) plus an isolated browser
/// context.
pub struct ChromiumSession {
    config: BrowserEngineConfig,
    timeouts: PageTimeouts,
    running: Option<Running>,
    headless: bool,
}

impl ChromiumSession {
    pub fn new(config: BrowserEngineConfig, timeouts: PageTimeouts) -> Self {
        Self {
            config,
            timeouts,
            running: None,
            headless: true,
        }
    }

    async fn launch(&self, headless: bool) -> ScrapeResult<(Browser, JoinHandle<()>)> {
        let chrome_path = find_chrome(self.config.chrome_executable.as_deref())?;
        info!("Launching browser (headless={})", headless);

        let viewport = self.config.viewport;
        let mut builder = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .request_timeout(self.timeouts.operation)
            .window_size(viewport.width, viewport.height);

        // with_head means NOT headless
        if !headless {
            builder = builder.with_head();
        }
        if let Some(ref proxy) = self.config.proxy {
            builder = builder.arg(format!("--proxy-server={}", proxy));
        }
        builder = builder.arg(format!("--lang={}", self.config.locale));
        for arg in STEALTH_ARGS {
            builder = builder.arg(*arg);
        }
        for arg in &self.config.chrome_args {
            builder = builder.arg(arg.clone());
        }

        let config = builder.build().map_err(ScrapeError::LaunchFailure)?;
        let (browser, handler) = Browser::launch(config)
            .await
            .map_err(|e| ScrapeError::LaunchFailure(e.to_string()))?;
        Ok((browser, spawn_handler(handler)))
    }

    async fn connect_remote(&self, url: &str) -> ScrapeResult<(Browser, JoinHandle<()>)> {
        info!(
            "Connecting to remote browser at {} (timeout: {:?})",
            url, self.timeouts.operation
        );
        let ws_url = resolve_ws_url(url, self.timeouts.operation).await?;
        debug!("Connecting to WebSocket: {}", ws_url);

        let handler_config = chromiumoxide::handler::HandlerConfig {
            request_timeout: self.timeouts.operation,
            ..Default::default()
        };
        let (browser, handler) = Browser::connect_with_config(ws_url, handler_config)
            .await
            .map_err(|e| ScrapeError::LaunchFailure(e.to_string()))?;
        Ok((browser, spawn_handler(handler)))
    }

    async fn prepare_page(&self, page: &Page) -> ScrapeResult<()> {
        let script = stealth::init_script(&self.config.languages());
        page.execute(AddScriptToEvaluateOnNewDocumentParams::new(script))
            .await
            .map_err(ScrapeError::browser)?;

        let user_agent = SetUserAgentOverrideParams::builder()
            .user_agent(self.config.user_agent.clone())
            .accept_language(self.config.accept_language())
            .build()
            .map_err(ScrapeError::Browser)?;
        page.execute(user_agent).await.map_err(ScrapeError::browser)?;

        let viewport = self.config.viewport;
        let metrics = SetDeviceMetricsOverrideParams::builder()
            .width(i64::from(viewport.width))
            .height(i64::from(viewport.height))
            .device_scale_factor(1.0)
            .mobile(false)
            .build()
            .map_err(ScrapeError::Browser)?;
        page.execute(metrics).await.map_err(ScrapeError::browser)?;

        let locale = SetLocaleOverrideParams::builder()
            .locale(self.config.locale.clone())
            .build();
        if let Err(e) = page.execute(locale).await {
            // Fails when another page already set it.
            debug!("Locale override skipped: {}", e);
        }

        let geo = self.config.geolocation;
        let geolocation = SetGeolocationOverrideParams::builder()
            .latitude(geo.latitude)
            .longitude(geo.longitude)
            .accuracy(geo.accuracy)
            .build();
        page.execute(geolocation).await.map_err(ScrapeError::browser)?;

        Ok(())
    }
}

#[async_trait]
impl BrowserSession for ChromiumSession {
    async fn open(&mut self, headless: bool) -> ScrapeResult<()> {
        if self.running.is_some() {
            self.close().await;
        }

        let (browser, handler, remote) = match self.config.remote_url.clone() {
            Some(url) => {
                if !headless {
                    warn!("Remote browser mode is fixed; visible mode is only recorded");
                }
                let (browser, handler) = self.connect_remote(&url).await?;
                (browser, handler, true)
            }
            None => {
                let (browser, handler) = self.launch(headless).await?;
                (browser, handler, false)
            }
        };

        let context = match browser.execute(CreateBrowserContextParams::default()).await {
            Ok(resp) => Some(resp.result.browser_context_id.clone()),
            Err(e) => {
                debug!("Using the default browser context: {}", e);
                None
            }
        };

        self.running = Some(Running {
            browser,
            handler,
            context,
            remote,
        });
        self.headless = headless;
        Ok(())
    }

    async fn new_page(&mut self) -> ScrapeResult<Box<dyn PageHandle>> {
        let running = self
            .running
            .as_ref()
            .ok_or_else(|| ScrapeError::browser("browser session is not open"))?;

        let mut target = CreateTargetParams::builder().url("about:blank");
        if let Some(ref context) = running.context {
            target = target.browser_context_id(context.clone());
        }
        let target = target.build().map_err(ScrapeError::Browser)?;

        let page = tokio::time::timeout(self.timeouts.operation, running.browser.new_page(target))
            .await
            .map_err(|_| ScrapeError::Timeout {
                operation: "new page".into(),
                timeout: self.timeouts.operation,
            })?
            .map_err(ScrapeError::browser)?;

        if let Err(e) = self.prepare_page(&page).await {
            let _ = page.close().await;
            return Err(e);
        }

        Ok(Box::new(ChromiumPage::new(page, self.timeouts)))
    }

    async fn close(&mut self) {
        let Some(mut running) = self.running.take() else {
            return;
        };
        let grace = self.timeouts.operation;

        if let Some(context) = running.context.take() {
            let dispose = running
                .browser
                .execute(DisposeBrowserContextParams::new(context));
            match tokio::time::timeout(grace, dispose).await {
                Ok(Ok(_)) => debug!("Browser context disposed"),
                Ok(Err(e)) => debug!("Browser context dispose failed: {}", e),
                Err(_) => debug!("Browser context dispose timed out"),
            }
        }

        if !running.remote {
            match tokio::time::timeout(grace, running.browser.close()).await {
                Ok(Ok(_)) => {
                    let _ = tokio::time::timeout(grace, running.browser.wait()).await;
                }
                Ok(Err(e)) => warn!("Browser close failed: {}", e),
                Err(_) => warn!("Browser close timed out"),
            }
        }

        running.handler.abort();
        info!("Browser session closed");
    }

    fn is_open(&self) -> bool {
        self.running.is_some()
    }

    fn is_headless(&self) -> bool {
        self.headless
    }
}

/// A CDP page with per-operation timeouts.
pub struct ChromiumPage {
    page: Page,
    timeouts: PageTimeouts,
    closed: AtomicBool,
}

impl ChromiumPage {
    fn new(page: Page, timeouts: PageTimeouts) -> Self {
        Self {
            page,
            timeouts,
            closed: AtomicBool::new(false),
        }
    }

    async fn bounded<T, E, F>(&self, operation: &str, fut: F) -> ScrapeResult<T>
    where
        F: std::future::Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        match tokio::time::timeout(self.timeouts.operation, fut).await {
            Ok(result) => result.map_err(ScrapeError::browser),
            Err(_) => Err(ScrapeError::Timeout {
                operation: operation.to_string(),
                timeout: self.timeouts.operation,
            }),
        }
    }

    async fn element(&self, selector: &str) -> ScrapeResult<chromiumoxide::Element> {
        match tokio::time::timeout(self.timeouts.operation, self.page.find_element(selector)).await
        {
            Ok(Ok(el)) => Ok(el),
            Ok(Err(_)) | Err(_) => Err(ScrapeError::SelectorNotFound(selector.to_string())),
        }
    }
}

#[async_trait]
impl PageHandle for ChromiumPage {
    async fn goto(&self, url: &str) -> ScrapeResult<()> {
        let nav_timeout = self.timeouts.navigation;
        match tokio::time::timeout(nav_timeout, self.page.goto(url)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => return Err(ScrapeError::browser(e)),
            Err(_) => {
                return Err(ScrapeError::NavigationTimeout {
                    url: url.to_string(),
                    timeout: nav_timeout,
                })
            }
        }

        match tokio::time::timeout(
            self.timeouts.operation,
            self.page.evaluate(READY_STATE_SCRIPT.to_string()),
        )
        .await
        {
            Ok(Ok(result)) => {
                let state: String = result.into_value().unwrap_or_else(|_| "unknown".to_string());
                debug!("Page ready state: {}", state);
            }
            Ok(Err(e)) => debug!("Could not check ready state: {}", e),
            Err(_) => warn!("Timeout waiting for page ready state"),
        }

        // Late-loading scripts.
        tokio::time::sleep(Duration::from_millis(500)).await;
        Ok(())
    }

    async fn current_url(&self) -> ScrapeResult<String> {
        let url = self.bounded("current url", self.page.url()).await?;
        url.ok_or_else(|| ScrapeError::browser("page has no URL"))
    }

    async fn content(&self) -> ScrapeResult<String> {
        self.bounded("page content", self.page.content()).await
    }

    async fn evaluate(&self, script: &str) -> ScrapeResult<serde_json::Value> {
        let result = self
            .bounded("script evaluation", self.page.evaluate(script.to_string()))
            .await?;
        Ok(result.value().cloned().unwrap_or(serde_json::Value::Null))
    }

    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> ScrapeResult<()> {
        let started = Instant::now();
        loop {
            if self.page.find_element(selector).await.is_ok() {
                return Ok(());
            }
            if started.elapsed() >= timeout {
                return Err(ScrapeError::SelectorNotFound(selector.to_string()));
            }
            tokio::time::sleep(SELECTOR_POLL.min(timeout)).await;
        }
    }

    async fn click(&self, selector: &str) -> ScrapeResult<()> {
        let el = self.element(selector).await?;
        self.bounded("click", el.click()).await?;
        Ok(())
    }

    async fn type_text(&self, selector: &str, text: &str) -> ScrapeResult<()> {
        let el = self.element(selector).await?;
        self.bounded("focus", el.click()).await?;
        self.bounded("typing", el.type_str(text)).await?;
        Ok(())
    }

    async fn press_enter(&self, selector: &str) -> ScrapeResult<()> {
        let el = self.element(selector).await?;
        self.bounded("key press", el.press_key("Enter")).await?;
        Ok(())
    }

    async fn close(&self) -> ScrapeResult<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.bounded("page close", self.page.clone().close()).await
    }
}

/// Creates one [`ChromiumSession`] per orchestration run.
#[derive(Debug, Clone)]
pub struct ChromiumSessionFactory {
    config: BrowserEngineConfig,
    timeouts: PageTimeouts,
}

impl ChromiumSessionFactory {
    pub fn new(config: BrowserEngineConfig, timeouts: PageTimeouts) -> Self {
        Self { config, timeouts }
    }
}

impl SessionFactory for ChromiumSessionFactory {
    fn create(&self) -> Box<dyn BrowserSession> {
        Box::new(ChromiumSession::new(self.config.clone(), self.timeouts))
    }
}
