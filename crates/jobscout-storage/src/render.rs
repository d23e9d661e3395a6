//! Headless browser rendering for portals whose listings need client-side script.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use futures::StreamExt;
use tracing::{debug, info_span, Instrument};

use crate::http::FetchError;

/// Hides the `navigator.webdriver` automation marker before any page script runs.
const HIDE_WEBDRIVER_SCRIPT: &str =
    "Object.defineProperty(navigator, 'webdriver', {get: () => undefined})";

/// Launch flags replacing chromiumoxide's defaults, which include `--enable-automation`.
const CHROME_ARGS: &[&str] = &[
    "--disable-background-networking",
    "--disable-background-timer-throttling",
    "--disable-backgrounding-occluded-windows",
    "--disable-breakpad",
    "--disable-client-side-phishing-detection",
    "--disable-component-extensions-with-background-pages",
    "--disable-default-apps",
    "--disable-dev-shm-usage",
    "--disable-extensions",
    "--disable-features=TranslateUI",
    "--disable-hang-monitor",
    "--disable-ipc-flooding-protection",
    "--disable-popup-blocking",
    "--disable-prompt-on-repost",
    "--disable-renderer-backgrounding",
    "--disable-sync",
    "--disable-gpu",
    "--force-color-profile=srgb",
    "--metrics-recording-only",
    "--no-first-run",
    "--password-store=basic",
    "--use-mock-keychain",
    "--disable-blink-features=AutomationControlled",
];

/// One render attempt; retries and caching live in [`crate::Fetcher`].
#[async_trait]
pub trait PageRenderer: Send + Sync {
    async fn render(&self, url: &str, user_agent: &str) -> Result<String, FetchError>;
}

#[derive(Debug, Clone)]
pub struct RenderSettings {
    pub page_timeout: Duration,
    /// Page source length past which the document counts as rendered.
    pub min_content_bytes: usize,
    pub max_wait: Duration,
    pub settle: Duration,
    pub poll_interval: Duration,
    pub chrome_executable: Option<PathBuf>,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            page_timeout: Duration::from_secs(30),
            min_content_bytes: 5000,
            max_wait: Duration::from_secs(10),
            settle: Duration::from_secs(3),
            poll_interval: Duration::from_millis(250),
            chrome_executable: None,
        }
    }
}

/// Launches a fresh Chrome session per call and tears it down afterwards.
#[derive(Debug, Clone, Default)]
pub struct ChromeRenderer {
    settings: RenderSettings,
}

impl ChromeRenderer {
    pub fn new(settings: RenderSettings) -> Self {
        Self { settings }
    }

    fn browser_config(&self, user_agent: &str, url: &str) -> Result<BrowserConfig, FetchError> {
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .window_size(1920, 1080)
            .request_timeout(self.settings.page_timeout)
            .disable_default_args()
            .args(CHROME_ARGS.iter().copied())
            .arg(format!("--user-agent={user_agent}"));
        if let Some(path) = &self.settings.chrome_executable {
            builder = builder.chrome_executable(path);
        }
        builder.build().map_err(|message| FetchError::Render {
            url: url.to_string(),
            message,
        })
    }

    async fn render_in_session(&self, browser: &Browser, url: &str) -> Result<String, FetchError> {
        let render_err = |message: String| FetchError::Render {
            url: url.to_string(),
            message,
        };

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| render_err(format!("opening page: {e}")))?;
        page.evaluate_on_new_document(AddScriptToEvaluateOnNewDocumentParams::new(
            HIDE_WEBDRIVER_SCRIPT,
        ))
        .await
        .map_err(|e| render_err(format!("injecting stealth script: {e}")))?;

        tokio::time::timeout(self.settings.page_timeout, page.goto(url))
            .await
            .map_err(|_| render_err(format!("navigation timed out after {:?}", self.settings.page_timeout)))?
            .map_err(|e| render_err(format!("navigating: {e}")))?;

        let deadline = Instant::now() + self.settings.max_wait;
        loop {
            let html = page
                .content()
                .await
                .map_err(|e| render_err(format!("reading content: {e}")))?;
            if html.len() > self.settings.min_content_bytes {
                break;
            }
            if Instant::now() >= deadline {
                debug!(url, bytes = html.len(), "render wait elapsed below content threshold");
                break;
            }
            tokio::time::sleep(self.settings.poll_interval).await;
        }

        tokio::time::sleep(self.settings.settle).await;
        page.content()
            .await
            .map_err(|e| render_err(format!("reading content: {e}")))
    }
}

#[async_trait]
impl PageRenderer for ChromeRenderer {
    async fn render(&self, url: &str, user_agent: &str) -> Result<String, FetchError> {
        let span = info_span!("headless_render", url);
        async {
            let config = self.browser_config(user_agent, url)?;
            let (mut browser, mut handler) =
                Browser::launch(config)
                    .await
                    .map_err(|e| FetchError::Render {
                        url: url.to_string(),
                        message: format!("launching browser: {e}"),
                    })?;
            let handler_task = tokio::spawn(async move {
                while let Some(event) = handler.next().await {
                    if event.is_err() {
                        break;
                    }
                }
            });

            let result = self.render_in_session(&browser, url).await;

            if let Err(err) = browser.close().await {
                debug!(url, error = %err, "closing browser failed");
            }
            let _ = browser.wait().await;
            handler_task.abort();
            result
        }
        .instrument(span)
        .await
    }
}
