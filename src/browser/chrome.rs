use crate::browser::scripts;
use crate::browser::session::{CookieData, OriginState, StorageState};
use crate::core::config::BrowserConfig;
use crate::core::{BrowserDriver, ElementState, FrameInfo, Scope, TabId};
use crate::errors::{CheckoutError, Result};
use crate::locator::Locator;
use async_trait::async_trait;
use headless_chrome::protocol::cdp::Network::CookieParam;
use headless_chrome::protocol::cdp::Page::CaptureScreenshotFormatOption;
use headless_chrome::{Browser, LaunchOptions, Tab};
use serde::Deserialize;
use serde_json::{json, Value};
use std::ffi::OsStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Deserialize)]
struct EngineReply {
    ok: bool,
    #[serde(default)]
    value: Value,
    #[serde(default)]
    kind: String,
    #[serde(default)]
    message: String,
}

/// [`BrowserDriver`] backed by a local Chrome over the DevTools protocol.
pub struct ChromeDriver {
    browser: Browser,
    default_timeout: Duration,
}

impl ChromeDriver {
    pub fn launch(config: &BrowserConfig) -> Result<Self> {
        let window_size_arg = format!("--window-size={},{}", config.viewport.width, config.viewport.height);
        let scale_arg = format!("--force-device-scale-factor={}", config.viewport.device_scale_factor);
        let user_agent_arg = config.user_agent.as_ref().map(|ua| format!("--user-agent={}", ua));

        let mut args = vec![
            OsStr::new("--no-sandbox"),
            OsStr::new("--disable-dev-shm-usage"),
            OsStr::new(&window_size_arg),
            OsStr::new(&scale_arg),
        ];

        if let Some(ref ua_arg) = user_agent_arg {
            args.push(OsStr::new(ua_arg));
        }

        if config.disable_images {
            args.push(OsStr::new("--blink-settings=imagesEnabled=false"));
        }

        // Frames from other origins have to share the page's process for the
        // locator engine to reach into them
        if config.disable_site_isolation {
            args.push(OsStr::new("--disable-web-security"));
            args.push(OsStr::new("--disable-site-isolation-trials"));
            args.push(OsStr::new("--disable-features=IsolateOrigins,site-per-process"));
        }

        if config.ignore_https_errors {
            args.push(OsStr::new("--ignore-certificate-errors"));
        }

        for arg in &config.args {
            args.push(OsStr::new(arg));
        }

        let launch_options = LaunchOptions::default_builder()
            .headless(config.headless)
            .idle_browser_timeout(Duration::from_secs(600))
            .args(args)
            .build()
            .map_err(|e| CheckoutError::LaunchFailed(e.to_string()))?;

        let browser = Browser::new(launch_options).map_err(|e| CheckoutError::LaunchFailed(e.to_string()))?;
        info!("Launched Chrome (headless: {})", config.headless);

        Ok(Self {
            browser,
            default_timeout: Duration::from_millis(config.timeout_ms),
        })
    }

    fn tab(&self, id: &TabId) -> Result<Arc<Tab>> {
        let tabs = self
            .browser
            .get_tabs()
            .lock()
            .map_err(|e| CheckoutError::ChromeError(e.to_string()))?;
        tabs.iter()
            .find(|tab| *tab.get_target_id() == id.0)
            .cloned()
            .ok_or_else(|| CheckoutError::TabClosed(id.to_string()))
    }

    /// Evaluate a script that returns a JSON string and parse it.
    fn evaluate_json(&self, tab: &Tab, script: &str) -> Result<Value> {
        let result = tab
            .evaluate(script, false)
            .map_err(|e| CheckoutError::JavaScriptFailed(e.to_string()))?;
        match result.value {
            Some(Value::String(json)) => Ok(serde_json::from_str(&json)?),
            other => Err(CheckoutError::JavaScriptFailed(format!(
                "expected a JSON string, got {:?}",
                other
            ))),
        }
    }

    fn run_engine(&self, scope: &Scope, op: &str, locator: Option<&Locator>, extra: Value) -> Result<Value> {
        let tab = self.tab(&scope.tab)?;
        let script = scripts::engine_call(op, &scope.frame, locator, extra)?;
        let reply: EngineReply = serde_json::from_value(self.evaluate_json(&tab, &script)?)?;
        if reply.ok {
            return Ok(reply.value);
        }

        let target = locator.map(|l| l.to_string()).unwrap_or_else(|| "page".to_string());
        Err(match reply.kind.as_str() {
            "frame" => CheckoutError::FrameNotFound(reply.message),
            "notfound" => CheckoutError::not_found(target, Duration::ZERO),
            "notinteractable" => CheckoutError::NotInteractable(format!("{}: {}", target, reply.message)),
            _ => CheckoutError::JavaScriptFailed(reply.message),
        })
    }

    fn origin_state(&self, tab: &Tab) -> Result<Option<OriginState>> {
        let origin: OriginState = serde_json::from_value(self.evaluate_json(tab, scripts::read_local_storage())?)?;
        if origin.origin == "null" || origin.origin.is_empty() {
            return Ok(None);
        }
        Ok(Some(origin))
    }
}

fn host_of(origin: &str) -> Option<String> {
    url::Url::parse(origin).ok()?.host_str().map(str::to_string)
}

/// CDP cookie for `Network.setCookies`, which unlike `document.cookie` can
/// set httpOnly cookies. Session cookies (no expiry) stay session cookies.
fn cookie_param(cookie: &CookieData) -> Result<CookieParam> {
    let mut param = json!({
        "name": cookie.name,
        "value": cookie.value,
        "domain": cookie.domain,
        "path": cookie.path,
        "secure": cookie.secure,
        "httpOnly": cookie.http_only,
    });
    if cookie.expires > 0.0 {
        param["expires"] = json!(cookie.expires);
    }
    let same_site = cookie
        .same_site
        .as_deref()
        .and_then(|s| match s.to_ascii_lowercase().as_str() {
            "strict" => Some("Strict"),
            "lax" => Some("Lax"),
            "none" => Some("None"),
            _ => None,
        });
    if let Some(same_site) = same_site {
        param["sameSite"] = json!(same_site);
    }
    Ok(serde_json::from_value(param)?)
}

#[async_trait]
impl BrowserDriver for ChromeDriver {
    async fn new_tab(&self) -> Result<TabId> {
        let tab = self
            .browser
            .new_tab()
            .map_err(|e| CheckoutError::TabCreationFailed(e.to_string()))?;
        tab.set_default_timeout(self.default_timeout);
        Ok(TabId::new(tab.get_target_id().clone()))
    }

    async fn new_isolated_tab(&self) -> Result<TabId> {
        let context = self
            .browser
            .new_context()
            .map_err(|e| CheckoutError::TabCreationFailed(e.to_string()))?;
        let tab = context
            .new_tab()
            .map_err(|e| CheckoutError::TabCreationFailed(e.to_string()))?;
        tab.set_default_timeout(self.default_timeout);
        debug!("Opened tab {} in a fresh browser context", tab.get_target_id());
        Ok(TabId::new(tab.get_target_id().clone()))
    }

    async fn tabs(&self) -> Result<Vec<TabId>> {
        let tabs = self
            .browser
            .get_tabs()
            .lock()
            .map_err(|e| CheckoutError::ChromeError(e.to_string()))?;
        Ok(tabs.iter().map(|tab| TabId::new(tab.get_target_id().clone())).collect())
    }

    async fn close_tab(&self, tab: &TabId) -> Result<()> {
        self.tab(tab)?.close(true)?;
        Ok(())
    }

    async fn navigate(&self, tab: &TabId, url: &str) -> Result<()> {
        let tab = self.tab(tab)?;
        tab.navigate_to(url)
            .map_err(|e| CheckoutError::NavigationFailed(e.to_string()))?;

        tab.wait_until_navigated()
            .map_err(|e| CheckoutError::NavigationFailed(e.to_string()))?;

        Ok(())
    }

    async fn url(&self, tab: &TabId) -> Result<String> {
        Ok(self.tab(tab)?.get_url())
    }

    async fn ready_state(&self, tab: &TabId) -> Result<String> {
        let result = self
            .tab(tab)?
            .evaluate("document.readyState", false)
            .map_err(|e| CheckoutError::JavaScriptFailed(e.to_string()))?;
        Ok(result
            .value
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default())
    }

    async fn frames(&self, tab: &TabId) -> Result<Vec<FrameInfo>> {
        let tab = self.tab(tab)?;
        Ok(serde_json::from_value(self.evaluate_json(&tab, scripts::list_frames())?)?)
    }

    async fn query(&self, scope: &Scope, locator: &Locator) -> Result<ElementState> {
        let value = self.run_engine(scope, "query", Some(locator), json!({}))?;
        Ok(serde_json::from_value(value)?)
    }

    async fn click(&self, scope: &Scope, locator: &Locator, force: bool) -> Result<()> {
        debug!("click {} (force: {})", locator, force);
        self.run_engine(scope, "click", Some(locator), json!({ "force": force }))?;
        Ok(())
    }

    async fn fill(&self, scope: &Scope, locator: &Locator, value: &str) -> Result<()> {
        self.run_engine(scope, "focus", Some(locator), json!({ "clear": true }))?;
        self.tab(&scope.tab)?.type_str(value)?;
        Ok(())
    }

    async fn check(&self, scope: &Scope, locator: &Locator) -> Result<()> {
        self.run_engine(scope, "check", Some(locator), json!({}))?;
        Ok(())
    }

    async fn press(&self, scope: &Scope, locator: &Locator, key: &str) -> Result<()> {
        self.run_engine(scope, "focus", Some(locator), json!({ "clear": false }))?;
        self.tab(&scope.tab)?.press_key(key)?;
        Ok(())
    }

    async fn inner_text(&self, scope: &Scope) -> Result<String> {
        let value = self.run_engine(scope, "text", None, json!({}))?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn screenshot(&self, tab: &TabId) -> Result<Vec<u8>> {
        let screenshot = self
            .tab(tab)?
            .capture_screenshot(CaptureScreenshotFormatOption::Png, None, None, true)
            .map_err(|e| CheckoutError::ChromeError(format!("screenshot failed: {}", e)))?;

        Ok(screenshot)
    }

    async fn storage_state(&self, tab: &TabId) -> Result<StorageState> {
        let tab = self.tab(tab)?;
        let cookies = tab
            .get_cookies()?
            .into_iter()
            .map(|c| CookieData {
                name: c.name,
                value: c.value,
                domain: c.domain,
                path: c.path,
                expires: c.expires,
                http_only: c.http_only,
                secure: c.secure,
                same_site: c.same_site.map(|s| format!("{:?}", s)),
            })
            .collect();

        Ok(StorageState {
            cookies,
            origins: self.origin_state(&tab)?.into_iter().collect(),
        })
    }

    /// Cookies go in over CDP; localStorage is seeded by visiting each origin,
    /// so the tab ends up on the last one.
    async fn apply_storage_state(&self, tab: &TabId, state: &StorageState) -> Result<()> {
        let chrome_tab = self.tab(tab)?;
        if !state.cookies.is_empty() {
            let params = state.cookies.iter().map(cookie_param).collect::<Result<Vec<_>>>()?;
            chrome_tab.set_cookies(params)?;
            debug!("Set {} cookie(s)", state.cookies.len());
        }

        for origin in state.origins.iter().filter(|o| !o.local_storage.is_empty()) {
            if host_of(&origin.origin).is_none() {
                debug!("Skipping storage for unparsable origin {}", origin.origin);
                continue;
            }
            self.navigate(tab, &origin.origin).await?;
            let script = scripts::seed_local_storage(&origin.local_storage)?;
            let seeded = self.evaluate_json(&chrome_tab, &script)?;
            debug!("Seeded {}: {}", origin.origin, seeded);
        }
        Ok(())
    }

    async fn clear_storage(&self, tab: &TabId) -> Result<()> {
        let tab = self.tab(tab)?;
        let cleared = self.evaluate_json(&tab, scripts::clear_storage())?;
        debug!("Cleared {} cookie(s)", cleared);
        Ok(())
    }
}
