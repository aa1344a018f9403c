//! Page objects for the storefront, the creator panel and the checkout
//! widget. Each page is a thin, short-lived view over a shared
//! [`PageContext`]; the tab it works on is always explicit.

pub mod checkout;
pub mod flow;
pub mod login;
pub mod providers;
pub mod webstore;

pub use checkout::CheckoutPage;
pub use flow::{FlowState, PaymentFlow};
pub use login::LoginPage;
pub use providers::{ProviderId, ProviderProfile};
pub use webstore::{PackageKind, WebstorePage};

use crate::core::config::Secrets;
use crate::core::{BrowserDriver, Config, Scope};
use crate::detector::{DetectionPolicy, Detector};
use crate::errors::{CheckoutError, Result};
use crate::fixtures::FixtureStore;
use crate::locator::Locator;
use crate::utils::ArtifactStore;
use crate::wait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Everything a page object needs besides the tab it works on.
#[derive(Clone)]
pub struct PageContext {
    pub driver: Arc<dyn BrowserDriver>,
    pub config: Arc<Config>,
    pub secrets: Arc<Secrets>,
    pub fixtures: FixtureStore,
    pub artifacts: ArtifactStore,
}

impl PageContext {
    pub fn new(driver: Arc<dyn BrowserDriver>, config: Arc<Config>, secrets: Arc<Secrets>) -> Self {
        Self {
            fixtures: FixtureStore::new(&config.paths.data_dir),
            artifacts: ArtifactStore::new(&config.paths.screenshot_dir),
            driver,
            config,
            secrets,
        }
    }

    pub fn driver(&self) -> &dyn BrowserDriver {
        self.driver.as_ref()
    }

    pub fn detector(&self) -> Detector<'_> {
        Detector::new(
            self.driver(),
            &self.artifacts,
            DetectionPolicy::from(&self.config.detection),
        )
    }
}

/// Wait for the element, then fill it.
pub(crate) async fn fill_visible(
    driver: &dyn BrowserDriver,
    scope: &Scope,
    locator: &Locator,
    value: &str,
    timeout: Duration,
) -> Result<()> {
    wait::wait_for_visible(driver, scope, locator, timeout).await?;
    driver.fill(scope, locator, value).await
}

/// Wait for the element and click it; an intercepted click is retried once
/// with `force`.
pub(crate) async fn click_visible(
    driver: &dyn BrowserDriver,
    scope: &Scope,
    locator: &Locator,
    timeout: Duration,
) -> Result<()> {
    wait::wait_for_visible(driver, scope, locator, timeout).await?;
    match driver.click(scope, locator, false).await {
        Ok(()) => Ok(()),
        Err(CheckoutError::NotInteractable(reason)) => {
            warn!("Normal click failed ({}), retrying with force", reason);
            driver.click(scope, locator, true).await
        }
        Err(e) => Err(e),
    }
}

/// Tick a checkbox only when it is unchecked. A checkbox that never shows up
/// is logged and skipped. Returns whether it ends up checked.
pub(crate) async fn ensure_checked(
    driver: &dyn BrowserDriver,
    scope: &Scope,
    locator: &Locator,
    timeout: Duration,
) -> Result<bool> {
    if !wait::visible_within(driver, scope, locator, timeout).await? {
        warn!("Checkbox {} not visible, skipping", locator);
        return Ok(false);
    }
    let state = wait::inspect(driver, scope, locator).await?;
    if state.checked == Some(true) {
        info!("Checkbox {} already checked", locator);
        return Ok(true);
    }
    driver.check(scope, locator).await?;
    info!("Checked {}", locator);
    Ok(true)
}
