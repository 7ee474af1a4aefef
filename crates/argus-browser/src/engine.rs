use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::fetch::{
    self, ContinueRequestParams, EventRequestPaused, FailRequestParams,
};
use chromiumoxide::cdp::browser_protocol::network::{
    ErrorReason, EventLoadingFailed, EventLoadingFinished, EventRequestWillBeSent,
    EventResponseReceived, RequestId, ResourceType, SetUserAgentOverrideParams,
};
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;

use argus_core::engine::{PageEngine, PageFetch, WaitStrategy};
use argus_core::error::AppError;
use argus_core::ScraperConfig;

/// Quiet period the network must hold below the idle threshold before a
/// `moderate`/`comprehensive` wait resolves.
const IDLE_QUIET_MS: u64 = 500;

/// Headless-Chromium page engine over the Chrome DevTools Protocol.
///
/// A single Chromium process is shared across all clones; each
/// [`PageEngine::fetch`] call opens a fresh tab, drives one navigation, and
/// closes the tab on every exit path. Redirect hops and the main document
/// response are observed through CDP network events.
#[derive(Clone)]
pub struct ChromiumEngine {
    browser: Arc<Browser>,
    config: ScraperConfig,
}

impl ChromiumEngine {
    /// Launch a headless Chromium configured for scraping.
    ///
    /// Requires a Chromium / Chrome binary reachable via `$PATH`, the
    /// well-known install locations, or an explicit `CHROME_BIN` override.
    pub async fn launch(config: ScraperConfig) -> Result<Self, AppError> {
        let mut builder = BrowserConfig::builder();
        builder = builder.no_sandbox().window_size(1920, 1080);

        if let Some(bin) = Self::find_chrome_binary() {
            tracing::info!("Using Chrome binary: {}", bin.display());
            builder = builder.chrome_executable(bin);
        }

        let browser_config = builder
            .arg("--headless=new")
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--disable-popup-blocking")
            .arg("--disable-translate")
            .arg("--no-first-run")
            .build()
            .map_err(|e| AppError::Config(format!("Browser config error: {e}")))?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| AppError::Browser(format!("Failed to launch browser: {e}")))?;

        // The CDP handler must be polled continuously for the connection to work.
        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    tracing::warn!("Browser CDP handler error: {event:?}");
                    break;
                }
            }
        });

        Ok(Self {
            browser: Arc::new(browser),
            config,
        })
    }

    /// Tries to locate the real Chrome/Chromium binary.
    ///
    /// On systems where Chromium is installed via snap, the wrapper at
    /// `/snap/bin/chromium` strips unknown CLI flags, breaking headless
    /// mode. Look for the real binary inside the snap first, then fall back
    /// to well-known system paths. `None` lets chromiumoxide do its own
    /// lookup.
    fn find_chrome_binary() -> Option<PathBuf> {
        if let Ok(p) = std::env::var("CHROME_BIN") {
            let path = PathBuf::from(&p);
            if path.exists() {
                return Some(path);
            }
        }

        let candidates: &[&str] = &[
            "/snap/chromium/current/usr/lib/chromium-browser/chrome",
            "/var/lib/flatpak/exports/bin/org.chromium.Chromium",
            "/usr/bin/google-chrome-stable",
            "/usr/bin/google-chrome",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
        ];
        candidates.iter().map(PathBuf::from).find(|p| p.exists())
    }

    /// Resource types aborted by the request interceptor.
    fn blocked_types(&self) -> Vec<ResourceType> {
        let mut blocked = Vec::new();
        if self.config.disable_images {
            blocked.extend([ResourceType::Image, ResourceType::Stylesheet, ResourceType::Font]);
        }
        if self.config.disable_css && !blocked.contains(&ResourceType::Stylesheet) {
            blocked.push(ResourceType::Stylesheet);
        }
        blocked
    }

    async fn drive(&self, page: &Page, url: &str) -> Result<PageFetch, AppError> {
        page.execute(SetUserAgentOverrideParams::new(
            self.config.user_agent.clone(),
        ))
        .await
        .map_err(|e| AppError::Browser(format!("Failed to set user agent: {e}")))?;

        page.execute(SetDeviceMetricsOverrideParams::new(1920, 1080, 1.0, false))
            .await
            .map_err(|e| AppError::Browser(format!("Failed to set viewport: {e}")))?;

        let observer = NavObserver::attach(page).await?;

        let blocked = self.blocked_types();
        let _interceptor = if blocked.is_empty() {
            None
        } else {
            Some(install_interceptor(page, blocked).await?)
        };

        let timeout = Duration::from_millis(self.config.nav_timeout_ms);
        let deadline = tokio::time::Instant::now() + timeout;

        let navigation = async {
            page.goto(url)
                .await
                .map_err(|e| AppError::Browser(e.to_string()))?;

            match self.config.wait_strategy {
                WaitStrategy::Fast => {}
                WaitStrategy::Basic => {
                    page.wait_for_navigation()
                        .await
                        .map_err(|e| AppError::Browser(e.to_string()))?;
                }
                WaitStrategy::Moderate | WaitStrategy::Comprehensive => {
                    page.wait_for_navigation()
                        .await
                        .map_err(|e| AppError::Browser(e.to_string()))?;
                    let threshold = self
                        .config
                        .wait_strategy
                        .idle_threshold()
                        .unwrap_or_default();
                    observer.wait_for_idle(threshold).await;
                }
            }
            Ok::<(), AppError>(())
        };

        match tokio::time::timeout_at(deadline, navigation).await {
            Ok(result) => result?,
            Err(_) => return Err(AppError::NavigationTimeout(self.config.nav_timeout_ms)),
        }

        if self.config.dynamic_wait_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.config.dynamic_wait_ms)).await;
        }

        let content = page
            .content()
            .await
            .map_err(|e| AppError::Browser(format!("Failed to read page content: {e}")))?;

        let document = observer.document();
        let final_url = match &document {
            Some(doc) => doc.url.clone(),
            None => page
                .url()
                .await
                .ok()
                .flatten()
                .unwrap_or_else(|| url.to_string()),
        };

        Ok(PageFetch {
            http_status: document.as_ref().map(|d| d.status),
            status_text: document.as_ref().map(|d| d.status_text.clone()),
            content_type: document.as_ref().map(|d| d.mime_type.clone()),
            content,
            final_url,
            redirect_chain: observer.redirect_chain(),
        })
    }
}

impl PageEngine for ChromiumEngine {
    async fn fetch(&self, url: &str) -> Result<PageFetch, AppError> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| AppError::Browser(format!("Failed to open page: {e}")))?;

        let result = self.drive(&page, url).await;

        // Close the tab on every exit path to free browser resources.
        if let Err(e) = page.close().await {
            tracing::warn!(error = %e, "Failed to close page");
        }

        result
    }
}

/// Main-document response as observed on the wire.
#[derive(Debug, Clone)]
struct DocumentResponse {
    url: String,
    status: u16,
    status_text: String,
    mime_type: String,
}

#[derive(Default)]
struct NavState {
    /// Redirecting URLs in navigation order (the final URL is excluded —
    /// it never appears as a `redirect_response`).
    redirect_chain: Vec<String>,
    /// Last document response wins: after redirects that is the final one.
    document: Option<DocumentResponse>,
    inflight: HashSet<RequestId>,
}

/// Watches CDP network events for one page: redirect hops, the main
/// document response, and the in-flight request count for idle waits.
struct NavObserver {
    state: Arc<Mutex<NavState>>,
    tasks: Vec<tokio::task::JoinHandle<()>>,
}

impl NavObserver {
    async fn attach(page: &Page) -> Result<Self, AppError> {
        let state = Arc::new(Mutex::new(NavState::default()));
        let mut tasks = Vec::new();

        let mut requests = page
            .event_listener::<EventRequestWillBeSent>()
            .await
            .map_err(|e| AppError::Browser(format!("Failed to listen for requests: {e}")))?;
        let request_state = state.clone();
        tasks.push(tokio::spawn(async move {
            while let Some(event) = requests.next().await {
                let mut state = request_state.lock().unwrap();
                state.inflight.insert(event.request_id.clone());
                if event.r#type == Some(ResourceType::Document) {
                    if let Some(redirect) = &event.redirect_response {
                        state.redirect_chain.push(redirect.url.clone());
                    }
                }
            }
        }));

        let mut responses = page
            .event_listener::<EventResponseReceived>()
            .await
            .map_err(|e| AppError::Browser(format!("Failed to listen for responses: {e}")))?;
        let response_state = state.clone();
        tasks.push(tokio::spawn(async move {
            while let Some(event) = responses.next().await {
                // TODO: filter by main frame id so an iframe document cannot
                // shadow the top response.
                if event.r#type == ResourceType::Document {
                    let mut state = response_state.lock().unwrap();
                    state.document = Some(DocumentResponse {
                        url: event.response.url.clone(),
                        status: event.response.status as u16,
                        status_text: event.response.status_text.clone(),
                        mime_type: event.response.mime_type.clone(),
                    });
                }
            }
        }));

        let mut finished = page
            .event_listener::<EventLoadingFinished>()
            .await
            .map_err(|e| AppError::Browser(format!("Failed to listen for load events: {e}")))?;
        let finished_state = state.clone();
        tasks.push(tokio::spawn(async move {
            while let Some(event) = finished.next().await {
                finished_state.lock().unwrap().inflight.remove(&event.request_id);
            }
        }));

        let mut failed = page
            .event_listener::<EventLoadingFailed>()
            .await
            .map_err(|e| AppError::Browser(format!("Failed to listen for load events: {e}")))?;
        let failed_state = state.clone();
        tasks.push(tokio::spawn(async move {
            while let Some(event) = failed.next().await {
                failed_state.lock().unwrap().inflight.remove(&event.request_id);
            }
        }));

        Ok(Self { state, tasks })
    }

    /// Block until at most `threshold` requests are in flight for a
    /// sustained quiet period. The caller bounds the total wait.
    async fn wait_for_idle(&self, threshold: usize) {
        let quiet = Duration::from_millis(IDLE_QUIET_MS);
        let mut quiet_since: Option<tokio::time::Instant> = None;
        loop {
            let inflight = self.state.lock().unwrap().inflight.len();
            if inflight <= threshold {
                let now = tokio::time::Instant::now();
                let since = *quiet_since.get_or_insert(now);
                if now.duration_since(since) >= quiet {
                    return;
                }
            } else {
                quiet_since = None;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    fn document(&self) -> Option<DocumentResponse> {
        self.state.lock().unwrap().document.clone()
    }

    fn redirect_chain(&self) -> Vec<String> {
        self.state.lock().unwrap().redirect_chain.clone()
    }
}

impl Drop for NavObserver {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

/// Enable the CDP fetch domain and abort requests for the blocked resource
/// types, continuing everything else. Returns the interceptor task handle;
/// dropping it stops interception decisions, so hold it for the duration of
/// the navigation.
async fn install_interceptor(
    page: &Page,
    blocked: Vec<ResourceType>,
) -> Result<InterceptorGuard, AppError> {
    page.execute(fetch::EnableParams::default())
        .await
        .map_err(|e| AppError::Browser(format!("Failed to enable interception: {e}")))?;

    let mut paused = page
        .event_listener::<EventRequestPaused>()
        .await
        .map_err(|e| AppError::Browser(format!("Failed to listen for paused requests: {e}")))?;

    let page = page.clone();
    let task = tokio::spawn(async move {
        while let Some(event) = paused.next().await {
            let request_id = event.request_id.clone();
            let decision = if blocked.contains(&event.resource_type) {
                page.execute(FailRequestParams::new(request_id, ErrorReason::Aborted))
                    .await
                    .map(|_| ())
            } else {
                page.execute(ContinueRequestParams::new(request_id))
                    .await
                    .map(|_| ())
            };
            if let Err(e) = decision {
                tracing::debug!(error = %e, "Interception decision failed");
            }
        }
    });

    Ok(InterceptorGuard { task })
}

struct InterceptorGuard {
    task: tokio::task::JoinHandle<()>,
}

impl Drop for InterceptorGuard {
    fn drop(&mut self) {
        self.task.abort();
    }
}
