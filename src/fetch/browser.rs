//! Tier 2: headless-browser fetcher.
//!
//! Renders the page over CDP with stealth evasion patches, semantically
//! clicks age-verification controls, and hands any session cookies it earns
//! back to the router so the direct tier can reuse them.

use std::time::Duration;
#[cfg(feature = "browser")]
use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
#[cfg(feature = "browser")]
use tokio::sync::Mutex;
#[cfg(feature = "browser")]
use tracing::{debug, info, warn};

#[cfg(feature = "browser")]
use chromiumoxide::cdp::browser_protocol::network::{
    CookieParam, GetCookiesParams, SetUserAgentOverrideParams,
};
#[cfg(feature = "browser")]
use chromiumoxide::cdp::browser_protocol::page::NavigateParams;
#[cfg(feature = "browser")]
use chromiumoxide::{Browser, BrowserConfig, Page};
#[cfg(feature = "browser")]
use futures::StreamExt;

#[cfg(feature = "browser")]
use crate::models::DomainCookie;
use crate::models::{Tier, TransportError, TransportResponse};

use super::{DomainContext, TierFetcher};

/// Browser tier configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrowserTierConfig {
    /// Run in headless mode (default: true).
    #[serde(default = "default_headless")]
    pub headless: bool,

    /// Proxy server URL (e.g., "socks5://127.0.0.1:1080").
    #[serde(default)]
    pub proxy: Option<String>,

    /// Remote Chrome DevTools URL (e.g., "ws://localhost:9222").
    /// If set, connects to an existing browser instead of launching one.
    #[serde(default)]
    pub remote_url: Option<String>,

    /// Apply stealth evasion scripts (default: true).
    #[serde(default = "default_stealth")]
    pub stealth: bool,

    /// Additional Chrome arguments.
    #[serde(default)]
    pub chrome_args: Vec<String>,
}

fn default_headless() -> bool {
    true
}

fn default_stealth() -> bool {
    true
}

impl Default for BrowserTierConfig {
    fn default() -> Self {
        Self {
            headless: true,
            proxy: None,
            remote_url: None,
            stealth: true,
            chrome_args: Vec::new(),
        }
    }
}

#[cfg(feature = "browser")]
const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// Stealth evasion JavaScript injected after navigation.
/// Based on puppeteer-extra-plugin-stealth techniques.
#[cfg(feature = "browser")]
const STEALTH_SCRIPTS: &[&str] = &[
    // Remove webdriver property
    r#"
    Object.defineProperty(navigator, 'webdriver', {
        get: () => undefined,
        configurable: true
    });
    "#,
    // Fix chrome object
    r#"
    window.chrome = {
        runtime: {},
        loadTimes: function() {},
        csi: function() {},
        app: {}
    };
    "#,
    // Fix languages
    r#"
    Object.defineProperty(navigator, 'languages', {
        get: () => ['en-US', 'en'],
        configurable: true
    });
    "#,
    // Fix plugins (make it look like regular Chrome)
    r#"
    Object.defineProperty(navigator, 'plugins', {
        get: () => [
            { name: 'Chrome PDF Plugin', filename: 'internal-pdf-viewer', description: 'Portable Document Format' },
            { name: 'Chrome PDF Viewer', filename: 'mhjfbmdgcfjbbpaeojofohoefgiehjai', description: '' }
        ],
        configurable: true
    });
    "#,
    // Remove automation-related properties
    r#"
    delete window.cdc_adoQpoasnfa76pfcZLmcfl_Array;
    delete window.cdc_adoQpoasnfa76pfcZLmcfl_Promise;
    delete window.cdc_adoQpoasnfa76pfcZLmcfl_Symbol;
    "#,
];

/// Browser-based fetcher with stealth and age-gate handling.
#[cfg(feature = "browser")]
pub struct BrowserFetcher {
    config: BrowserTierConfig,
    age_gate_buttons: Vec<String>,
    browser: Mutex<Option<Browser>>,
}

#[cfg(feature = "browser")]
impl BrowserFetcher {
    /// Common Chrome executable paths to check.
    const CHROME_PATHS: &'static [&'static str] = &[
        // Linux
        "/usr/bin/google-chrome",
        "/usr/bin/google-chrome-stable",
        "/usr/bin/chromium",
        "/usr/bin/chromium-browser",
        "/snap/bin/chromium",
        // macOS
        "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
        "/Applications/Chromium.app/Contents/MacOS/Chromium",
    ];

    pub fn new(config: BrowserTierConfig, age_gate_buttons: Vec<String>) -> Self {
        Self {
            config,
            age_gate_buttons,
            browser: Mutex::new(None),
        }
    }

    /// Find a Chrome executable on this machine.
    fn find_chrome() -> Result<std::path::PathBuf, TransportError> {
        for path in Self::CHROME_PATHS {
            let p = std::path::Path::new(path);
            if p.exists() {
                info!("Found Chrome at: {}", path);
                return Ok(p.to_path_buf());
            }
        }

        for cmd in &["google-chrome", "google-chrome-stable", "chromium", "chromium-browser"] {
            if let Ok(output) = std::process::Command::new("which").arg(cmd).output() {
                if output.status.success() {
                    let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
                    if !path.is_empty() {
                        info!("Found Chrome in PATH: {}", path);
                        return Ok(std::path::PathBuf::from(path));
                    }
                }
            }
        }

        Err(TransportError::Unavailable(
            "Chrome/Chromium not found; install it or set a remote browser URL".to_string(),
        ))
    }

    /// Launch or connect to the browser if not already running.
    async fn ensure_browser(
        &self,
        slot: &mut Option<Browser>,
    ) -> Result<(), TransportError> {
        if slot.is_some() {
            return Ok(());
        }

        if let Some(remote_url) = self.config.remote_url.clone() {
            *slot = Some(Self::connect_remote(&remote_url).await?);
            return Ok(());
        }

        info!("Launching browser (headless={})", self.config.headless);

        let chrome_path = Self::find_chrome()?;

        let mut builder = BrowserConfig::builder().chrome_executable(chrome_path);

        // with_head means NOT headless, confusingly
        if !self.config.headless {
            builder = builder.with_head();
        }

        if let Some(ref proxy) = self.config.proxy {
            builder = builder.arg(format!("--proxy-server={}", proxy));
        }

        builder = builder
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-infobars")
            .arg("--disable-dev-shm-usage")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--disable-background-networking")
            .arg("--no-sandbox")
            .arg("--disable-gpu");

        for arg in &self.config.chrome_args {
            builder = builder.arg(arg);
        }

        let config = builder
            .build()
            .map_err(|e| TransportError::Unavailable(format!("browser config: {e}")))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| TransportError::Unavailable(format!("browser launch: {e}")))?;

        tokio::spawn(async move {
            while let Some(h) = handler.next().await {
                if h.is_err() {
                    break;
                }
            }
        });

        *slot = Some(browser);
        Ok(())
    }

    /// Connect to a remote Chrome instance via its DevTools endpoint.
    async fn connect_remote(url: &str) -> Result<Browser, TransportError> {
        info!("Connecting to remote browser at {}", url);

        let http_url = url.replace("ws://", "http://").replace("wss://", "https://");
        let version_url = format!("{}/json/version", http_url.trim_end_matches('/'));

        let client = reqwest::Client::new();
        let resp: serde_json::Value = client
            .get(&version_url)
            .send()
            .await
            .map_err(|e| TransportError::Network(format!("remote browser: {e}")))?
            .json()
            .await
            .map_err(|e| TransportError::Protocol(format!("browser version info: {e}")))?;

        let ws_url = resp
            .get("webSocketDebuggerUrl")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                TransportError::Protocol("no webSocketDebuggerUrl in response".to_string())
            })?;

        let (browser, mut handler) = Browser::connect(ws_url)
            .await
            .map_err(|e| TransportError::Network(format!("remote browser connect: {e}")))?;

        tokio::spawn(async move {
            while let Some(h) = handler.next().await {
                if h.is_err() {
                    break;
                }
            }
        });

        Ok(browser)
    }

    /// Wait until the document is interactive, bounded by `timeout`.
    async fn wait_for_ready(page: &Page, timeout: Duration) {
        let wait_script = r#"
            new Promise((resolve) => {
                if (document.readyState === 'complete' || document.readyState === 'interactive') {
                    resolve(document.readyState);
                } else {
                    document.addEventListener('DOMContentLoaded', () => resolve(document.readyState));
                    setTimeout(() => resolve('timeout'), 10000);
                }
            })
        "#;

        match tokio::time::timeout(timeout, page.evaluate(wait_script.to_string())).await {
            Ok(Ok(result)) => {
                let state: String = result.into_value().unwrap_or_else(|_| "unknown".to_string());
                debug!("Page ready state: {}", state);
            }
            Ok(Err(e)) => debug!("Could not check ready state: {}", e),
            Err(_) => warn!("Timeout waiting for page ready state"),
        }
    }

    /// Apply stealth evasion scripts to a page. Best effort: failures are
    /// expected on non-HTML pages and mid-transition frames.
    async fn apply_stealth(page: &Page) {
        debug!("Applying stealth scripts");
        for script in STEALTH_SCRIPTS {
            if let Err(e) = page.evaluate(script.to_string()).await {
                debug!("Stealth script injection skipped: {}", e);
            }
        }
    }

    /// Look for an age-verification control matching the configured
    /// affirmative texts and click the first one. Returns the clicked
    /// control's text, if any.
    async fn click_age_gate(&self, page: &Page) -> Option<String> {
        let words = serde_json::to_string(
            &self
                .age_gate_buttons
                .iter()
                .map(|w| w.to_lowercase())
                .collect::<Vec<_>>(),
        )
        .ok()?;

        let script = format!(
            r#"
            (() => {{
                const words = {words};
                const els = document.querySelectorAll(
                    'button, a, input[type="button"], input[type="submit"], [role="button"]');
                for (const el of els) {{
                    const text = ((el.innerText || el.value || '') + ' ' +
                        (el.getAttribute('aria-label') || '')).trim().toLowerCase();
                    if (!text || text.length > 48) continue;
                    if (words.some(w => text === w || text.includes(w))) {{
                        el.click();
                        return text;
                    }}
                }}
                return null;
            }})()
            "#
        );

        match page.evaluate(script).await {
            Ok(result) => result.into_value::<Option<String>>().ok().flatten(),
            Err(e) => {
                debug!("Age gate probe failed: {}", e);
                None
            }
        }
    }

    /// Inject cookie hints before navigation so known bypass cookies apply.
    async fn inject_cookies(page: &Page, ctx: &DomainContext) {
        for cookie in &ctx.cookies {
            let param = CookieParam::builder()
                .name(&cookie.name)
                .value(&cookie.value)
                .domain(&cookie.domain)
                .build();
            match param {
                Ok(param) => {
                    if let Err(e) = page.set_cookie(param).await {
                        warn!("Failed to set cookie {}: {}", cookie.name, e);
                    }
                }
                Err(e) => warn!("Failed to build cookie {}: {}", cookie.name, e),
            }
        }
    }

    /// Pull the session cookies out of the page for reuse by the direct tier.
    async fn harvest_cookies(page: &Page, final_url: &str) -> Vec<DomainCookie> {
        let params = GetCookiesParams::builder()
            .urls(vec![final_url.to_string()])
            .build();
        let cookies = match page.execute(params).await {
            Ok(result) => result.result.cookies,
            Err(e) => {
                warn!("Failed to get cookies via CDP: {}, trying page.get_cookies()", e);
                page.get_cookies().await.unwrap_or_default()
            }
        };
        debug!("Got {} cookies from browser", cookies.len());
        cookies
            .iter()
            .map(|c| DomainCookie {
                name: c.name.clone(),
                value: c.value.clone(),
                domain: c.domain.clone(),
                path: c.path.clone(),
                secure: c.secure,
                http_only: c.http_only,
            })
            .collect()
    }
}

#[cfg(feature = "browser")]
#[async_trait]
impl TierFetcher for BrowserFetcher {
    async fn fetch(
        &self,
        url: &str,
        timeout: Duration,
        ctx: &DomainContext,
    ) -> Result<TransportResponse, TransportError> {
        let start = Instant::now();

        let mut slot = self.browser.lock().await;
        self.ensure_browser(&mut slot).await?;
        let browser = slot.as_ref().expect("browser just ensured");

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| TransportError::Network(format!("new page: {e}")))?;

        let result = self.render(&page, url, timeout, ctx).await;

        // Close the page to prevent tab accumulation, even on failure.
        let _ = page.close().await;

        let mut resp = result?;
        resp.elapsed_ms = start.elapsed().as_millis() as u64;
        Ok(resp)
    }

    fn tier(&self) -> Tier {
        Tier::Browser
    }
}

#[cfg(feature = "browser")]
impl BrowserFetcher {
    async fn render(
        &self,
        page: &Page,
        url: &str,
        timeout: Duration,
        ctx: &DomainContext,
    ) -> Result<TransportResponse, TransportError> {
        page.execute(SetUserAgentOverrideParams::new(BROWSER_USER_AGENT.to_string()))
            .await
            .map_err(|e| TransportError::Network(format!("set user agent: {e}")))?;

        Self::inject_cookies(page, ctx).await;

        info!("Navigating to {}", url);
        let nav_params = NavigateParams::builder()
            .url(url)
            .build()
            .map_err(|e| TransportError::Protocol(format!("invalid URL: {e}")))?;
        page.execute(nav_params)
            .await
            .map_err(|e| TransportError::Network(format!("navigate: {e}")))?;

        Self::wait_for_ready(page, timeout).await;

        // Late-loading scripts get a moment before we interfere.
        tokio::time::sleep(Duration::from_millis(500)).await;

        if self.config.stealth {
            Self::apply_stealth(page).await;
        }

        if let Some(clicked) = self.click_age_gate(page).await {
            info!(url, button = %clicked, "Clicked age verification control");
            tokio::time::sleep(Duration::from_millis(1_000)).await;
            Self::wait_for_ready(page, timeout).await;
        }

        let final_url = page
            .url()
            .await
            .map_err(|e| TransportError::Network(format!("page url: {e}")))?
            .map(|u| u.to_string())
            .unwrap_or_else(|| url.to_string());

        let content = page
            .content()
            .await
            .map_err(|e| TransportError::Network(format!("page content: {e}")))?;

        let cookies = Self::harvest_cookies(page, &final_url).await;

        Ok(TransportResponse {
            // CDP does not surface the main-frame HTTP status cheaply; the
            // classifier judges the rendered content instead.
            status: 200,
            final_url,
            content,
            elapsed_ms: 0,
            retry_after_secs: None,
            cookies,
        })
    }
}

// Stub for when browser feature is disabled.
#[cfg(not(feature = "browser"))]
pub struct BrowserFetcher {
    _config: BrowserTierConfig,
}

#[cfg(not(feature = "browser"))]
impl BrowserFetcher {
    pub fn new(config: BrowserTierConfig, _age_gate_buttons: Vec<String>) -> Self {
        Self { _config: config }
    }
}

#[cfg(not(feature = "browser"))]
#[async_trait]
impl TierFetcher for BrowserFetcher {
    async fn fetch(
        &self,
        _url: &str,
        _timeout: Duration,
        _ctx: &DomainContext,
    ) -> Result<TransportResponse, TransportError> {
        Err(TransportError::Unavailable(
            "Browser support not compiled. Rebuild with: cargo build --features browser".to_string(),
        ))
    }

    fn tier(&self) -> Tier {
        Tier::Browser
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = BrowserTierConfig::default();
        assert!(config.headless);
        assert!(config.stealth);
        assert!(config.remote_url.is_none());
    }

    #[test]
    fn test_config_deserializes_with_partial_fields() {
        let config: BrowserTierConfig =
            serde_json::from_str(r#"{"remote_url": "ws://localhost:9222"}"#).unwrap();
        assert!(config.headless);
        assert_eq!(config.remote_url.as_deref(), Some("ws://localhost:9222"));
    }
}
