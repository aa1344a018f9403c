use crate::errors::{CheckoutError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub browser: BrowserConfig,
    pub storefront: StorefrontConfig,
    pub session: SessionConfig,
    pub detection: DetectionConfig,
    pub paths: PathConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    pub headless: bool,
    pub viewport: Viewport,
    pub user_agent: Option<String>,
    pub disable_images: bool,
    /// Lets the locator engine reach into cross-origin checkout iframes.
    pub disable_site_isolation: bool,
    pub ignore_https_errors: bool,
    pub args: Vec<String>,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
    pub device_scale_factor: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorefrontConfig {
    /// Creator panel / login site
    pub base_url: String,
    /// Public webstore home page
    pub webstore_url: String,
    /// Fragment identifying the main checkout tab
    pub checkout_url_fragment: String,
    /// Fragment identifying the sandbox "test payment" tab
    pub test_payment_url_fragment: String,
    /// Path of the packages category the sidebar link leads to
    pub packages_category_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub navigation_timeout_ms: u64,
    pub element_timeout_ms: u64,
    pub step_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    pub per_strategy_timeout_ms: u64,
    pub overall_timeout_ms: u64,
    pub retry_delay_ms: u64,
    pub capture_on_success: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathConfig {
    pub data_dir: PathBuf,
    pub screenshot_dir: PathBuf,
    pub report_dir: PathBuf,
    pub storage_state: Option<PathBuf>,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            viewport: Viewport::default(),
            user_agent: None,
            disable_images: false,
            disable_site_isolation: true,
            ignore_https_errors: true,
            args: vec![],
            timeout_ms: 30000,
        }
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            device_scale_factor: 1.0,
        }
    }
}

impl Default for StorefrontConfig {
    fn default() -> Self {
        Self {
            base_url: "https://example.com".to_string(),
            webstore_url: "https://example.com".to_string(),
            checkout_url_fragment: "/checkout/basket".to_string(),
            test_payment_url_fragment: "checkout.tbxstage.net/testmethod".to_string(),
            packages_category_path: "/category/129".to_string(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            navigation_timeout_ms: 30000,
            element_timeout_ms: 10000,
            step_timeout_ms: 60000,
        }
    }
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            per_strategy_timeout_ms: 250,
            overall_timeout_ms: 12000,
            retry_delay_ms: 2000,
            capture_on_success: false,
        }
    }
}

impl Default for PathConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            screenshot_dir: PathBuf::from("screenshots"),
            report_dir: PathBuf::from("reports"),
            storage_state: Some(PathBuf::from("auth.json")),
        }
    }
}

impl Config {
    /// Defaults, overlaid with a JSON file when given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|e| {
                    CheckoutError::ConfigurationError(format!("{}: {}", path.display(), e))
                })?;
                Ok(serde_json::from_str(&raw)?)
            }
            None => Ok(Self::default()),
        }
    }

    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("BASE_URL") {
            self.storefront.base_url = url;
        }
        if let Some(url) = lookup("WEBSTORE_URL") {
            self.storefront.webstore_url = url;
        }
        if let Some(value) = lookup("HEADLESS") {
            self.browser.headless = parse_bool("HEADLESS", &value)?;
        }
        if let Some(dir) = lookup("CHECKOUT_DATA_DIR") {
            self.paths.data_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup("SCREENSHOT_DIR") {
            self.paths.screenshot_dir = PathBuf::from(dir);
        }
        if let Some(path) = lookup("AUTH_STATE") {
            self.paths.storage_state = if path.trim().is_empty() {
                None
            } else {
                Some(PathBuf::from(path))
            };
        }
        Ok(())
    }

    pub fn element_timeout(&self) -> Duration {
        Duration::from_millis(self.session.element_timeout_ms)
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_millis(self.session.navigation_timeout_ms)
    }

    pub fn step_timeout(&self) -> Duration {
        Duration::from_millis(self.session.step_timeout_ms)
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(CheckoutError::ConfigurationError(format!(
            "{} must be a boolean, got {:?}",
            key, other
        ))),
    }
}

/// A credential that never shows up in logs.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretString(String);

impl SecretString {
    pub fn new(value: impl Into<String>) -> Self {
        SecretString(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretString(***)")
    }
}

/// Credentials resolved from the process environment.
#[derive(Debug, Clone, Default)]
pub struct Secrets {
    values: HashMap<String, SecretString>,
}

impl Secrets {
    pub const USERNAME: &'static str = "USERNAME";
    pub const PASSWORD: &'static str = "PASSWORD";
    pub const PAYPAL_LOGIN: &'static str = "PAYPAL_LOGIN";
    pub const PAYPAL_PASSWORD: &'static str = "PAYPAL_PASSWORD";

    const KNOWN: [&'static str; 4] = [
        Self::USERNAME,
        Self::PASSWORD,
        Self::PAYPAL_LOGIN,
        Self::PAYPAL_PASSWORD,
    ];

    pub fn from_env() -> Self {
        let values = Self::KNOWN
            .iter()
            .filter_map(|key| {
                std::env::var(key)
                    .ok()
                    .filter(|v| !v.is_empty())
                    .map(|v| (key.to_string(), SecretString::new(v)))
            })
            .collect();
        Self { values }
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            values: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), SecretString::new(v)))
                .collect(),
        }
    }

    pub fn get(&self, key: &str) -> Result<&SecretString> {
        self.values
            .get(key)
            .ok_or_else(|| CheckoutError::MissingSecret(key.to_string()))
    }
}
