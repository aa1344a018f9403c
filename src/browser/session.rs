use crate::core::{BrowserDriver, TabId};
use crate::errors::{CheckoutError, Result};
use crate::locator::TextPattern;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Cookies and per-origin localStorage, in the same JSON layout browser test
/// tools use for `auth.json` files.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageState {
    #[serde(default)]
    pub cookies: Vec<CookieData>,
    #[serde(default)]
    pub origins: Vec<OriginState>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CookieData {
    pub name: String,
    pub value: String,
    pub domain: String,
    #[serde(default = "default_path")]
    pub path: String,
    /// Unix seconds, -1 for session cookies
    #[serde(default = "session_expiry")]
    pub expires: f64,
    #[serde(default)]
    pub http_only: bool,
    #[serde(default)]
    pub secure: bool,
    #[serde(default)]
    pub same_site: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OriginState {
    pub origin: String,
    #[serde(default)]
    pub local_storage: Vec<StorageEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageEntry {
    pub name: String,
    pub value: String,
}

fn default_path() -> String {
    "/".to_string()
}

fn session_expiry() -> f64 {
    -1.0
}

impl StorageState {
    /// `Ok(None)` when the file does not exist; a present but malformed file
    /// is an error.
    pub async fn load(path: &Path) -> Result<Option<Self>> {
        match tokio::fs::read_to_string(path).await {
            Ok(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, serde_json::to_vec_pretty(self)?).await?;
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty() && self.origins.iter().all(|o| o.local_storage.is_empty())
    }

}

/// One scenario's slice of the browser: a home tab, optionally pre-seeded
/// with stored authentication state. Closing it clears storage and closes
/// every tab opened since it started, popups included.
pub struct ScenarioSession {
    id: String,
    driver: Arc<dyn BrowserDriver>,
    home: TabId,
    preexisting: Vec<TabId>,
}

impl ScenarioSession {
    pub async fn open(driver: Arc<dyn BrowserDriver>, storage_state: Option<&Path>) -> Result<Self> {
        let id = uuid::Uuid::new_v4().to_string();
        let preexisting = driver.tabs().await?;
        let home = driver.new_isolated_tab().await?;
        info!(session = %id, tab = %home, "Opened scenario session");

        if let Some(path) = storage_state {
            if let Err(e) = seed_storage_state(driver.as_ref(), &home, path).await {
                warn!("Could not inject storage state from {}: {}", path.display(), e);
                if let Err(close_err) = driver.close_tab(&home).await {
                    warn!("Failed to close tab {}: {}", home, close_err);
                }
                return Err(e);
            }
        }

        Ok(Self {
            id,
            driver,
            home,
            preexisting,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn home(&self) -> &TabId {
        &self.home
    }

    pub fn driver(&self) -> &Arc<dyn BrowserDriver> {
        &self.driver
    }

    /// Teardown. Every step is attempted; the first error is reported.
    pub async fn close(self) -> Result<()> {
        let mut first_error = None;

        if let Err(e) = self.driver.clear_storage(&self.home).await {
            warn!("Failed to clear storage for session {}: {}", self.id, e);
            first_error.get_or_insert(e);
        }

        let tabs = match self.driver.tabs().await {
            Ok(tabs) => tabs,
            Err(e) => {
                warn!("Could not list tabs during teardown: {}", e);
                return Err(first_error.unwrap_or(e));
            }
        };

        for tab in tabs.iter().filter(|t| !self.preexisting.contains(t)) {
            if let Err(e) = self.driver.close_tab(tab).await {
                warn!("Failed to close tab {}: {}", tab, e);
                first_error.get_or_insert(e);
            }
        }

        info!(session = %self.id, "Closed scenario session");
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

async fn seed_storage_state(driver: &dyn BrowserDriver, tab: &TabId, path: &Path) -> Result<()> {
    match StorageState::load(path).await? {
        Some(state) if state.is_empty() => {
            info!("Storage state at {} is empty, starting logged out", path.display())
        }
        Some(state) => {
            driver.apply_storage_state(tab, &state).await?;
            info!(
                "Injected storage state from {} ({} cookies, {} origins)",
                path.display(),
                state.cookies.len(),
                state.origins.len()
            );
        }
        None => info!("No storage state at {}, starting logged out", path.display()),
    }
    Ok(())
}

/// Wait for a manual login to reach a URL matching `success_url`, then write
/// the tab's storage state to `output`. On timeout the state is saved anyway.
pub async fn capture_login_state(
    driver: &dyn BrowserDriver,
    tab: &TabId,
    success_url: &TextPattern,
    timeout: Duration,
    output: &Path,
) -> Result<StorageState> {
    match crate::wait::wait_for_url(driver, tab, success_url, timeout).await {
        Ok(url) => info!("Login detected at {}", url),
        Err(CheckoutError::Timeout { .. }) => {
            warn!("Timeout reached or navigation differed; saving state anyway")
        }
        Err(e) => return Err(e),
    }

    let state = driver.storage_state(tab).await?;
    state.save(output).await?;
    info!(
        "Login session saved to {} ({} cookies)",
        output.display(),
        state.cookies.len()
    );
    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeBrowser, FakePage};

    #[tokio::test]
    async fn storage_state_reads_browser_tool_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("auth.json");
        tokio::fs::write(
            &path,
            r#"{
                "cookies": [
                    { "name": "sid", "value": "abc", "domain": ".accounts.example.com",
                      "path": "/", "expires": -1, "httpOnly": true, "secure": true, "sameSite": "Lax" }
                ],
                "origins": [
                    { "origin": "https://accounts.example.com",
                      "localStorage": [ { "name": "token", "value": "t0k" } ] }
                ]
            }"#,
        )
        .await
        .unwrap();

        let state = StorageState::load(&path).await.unwrap().unwrap();
        assert_eq!(state.cookies[0].name, "sid");
        assert!(state.cookies[0].http_only);
        assert_eq!(state.origins[0].local_storage[0].value, "t0k");
        assert!(!state.is_empty());
    }

    #[tokio::test]
    async fn missing_state_file_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = StorageState::load(&dir.path().join("absent.json")).await.unwrap();
        assert!(loaded.is_none());
    }

    #[tokio::test]
    async fn save_then_load_preserves_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("auth.json");
        let state = StorageState {
            cookies: vec![CookieData {
                name: "sid".into(),
                value: "1".into(),
                domain: "shop.test".into(),
                path: "/".into(),
                expires: -1.0,
                http_only: false,
                secure: false,
                same_site: None,
            }],
            origins: vec![],
        };
        state.save(&path).await.unwrap();
        assert_eq!(StorageState::load(&path).await.unwrap(), Some(state));
    }

    #[tokio::test(start_paused = true)]
    async fn session_seeds_state_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("auth.json");
        let state = StorageState {
            cookies: vec![],
            origins: vec![OriginState {
                origin: "https://shop.test".into(),
                local_storage: vec![StorageEntry {
                    name: "basket".into(),
                    value: "42".into(),
                }],
            }],
        };
        state.save(&path).await.unwrap();

        let browser = Arc::new(FakeBrowser::new());
        let session = ScenarioSession::open(browser.clone(), Some(&path)).await.unwrap();
        let home = session.home().clone();
        browser.new_tab().await.unwrap();

        assert_eq!(browser.isolated_tabs().await, vec![home.clone()]);
        assert_eq!(browser.applied_states().await, vec![(home.clone(), state)]);
        session.close().await.unwrap();
        assert_eq!(browser.cleared_tabs().await, vec![home]);
        assert!(browser.tab_ids().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn login_state_is_saved_even_on_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("auth.json");
        let browser = FakeBrowser::new();
        let stored = StorageState {
            cookies: vec![CookieData {
                name: "SID".into(),
                value: "x".into(),
                domain: ".google.com".into(),
                path: "/".into(),
                expires: -1.0,
                http_only: true,
                secure: true,
                same_site: None,
            }],
            origins: vec![],
        };
        browser.set_stored_state(stored.clone()).await;
        let tab = browser
            .open_page(FakePage::new("https://accounts.google.com/signin"))
            .await;

        let saved = capture_login_state(
            &browser,
            &tab,
            &TextPattern::new(r"^https://myaccount\.google\.com/").unwrap(),
            Duration::from_secs(5),
            &output,
        )
        .await
        .unwrap();
        assert_eq!(saved, stored);
        assert_eq!(StorageState::load(&output).await.unwrap(), Some(stored));
    }

    #[tokio::test(start_paused = true)]
    async fn unreadable_state_file_leaves_no_tab_behind() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("auth.json");
        tokio::fs::write(&path, "{ not json").await.unwrap();

        let browser = Arc::new(FakeBrowser::new());
        let opened = ScenarioSession::open(browser.clone(), Some(&path)).await;

        assert!(opened.is_err());
        assert!(browser.tab_ids().await.is_empty());
    }
}
