//! Bounded waits.
//!
//! Every wait polls the driver until its condition holds or its deadline
//! passes; nothing here blocks without an upper bound. Deadlines use
//! `tokio::time::Instant` so tests can run on a paused clock.

use crate::core::{BrowserDriver, ElementState, Scope, TabId};
use crate::errors::{CheckoutError, Result};
use crate::locator::{Locator, TextPattern};
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::debug;

pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Query once, treating transient failures (detached frame, closed popup,
/// cross-origin access) as "nothing there".
pub async fn inspect(driver: &dyn BrowserDriver, scope: &Scope, locator: &Locator) -> Result<ElementState> {
    match driver.query(scope, locator).await {
        Ok(state) => Ok(state),
        Err(e) if e.is_transient() => {
            debug!("inspecting {} failed: {}", locator, e);
            Ok(ElementState::default())
        }
        Err(e) => Err(e),
    }
}

pub async fn is_visible(driver: &dyn BrowserDriver, scope: &Scope, locator: &Locator) -> Result<bool> {
    Ok(inspect(driver, scope, locator).await?.visible)
}

/// Poll until visible; `false` once `timeout` elapses. A zero timeout checks once.
pub async fn visible_within(
    driver: &dyn BrowserDriver,
    scope: &Scope,
    locator: &Locator,
    timeout: Duration,
) -> Result<bool> {
    let deadline = Instant::now() + timeout;
    loop {
        if is_visible(driver, scope, locator).await? {
            return Ok(true);
        }
        if !pause_until(deadline).await {
            return Ok(false);
        }
    }
}

pub async fn wait_for_visible(
    driver: &dyn BrowserDriver,
    scope: &Scope,
    locator: &Locator,
    timeout: Duration,
) -> Result<()> {
    if visible_within(driver, scope, locator, timeout).await? {
        Ok(())
    } else {
        Err(CheckoutError::not_found(locator.to_string(), timeout))
    }
}

pub async fn wait_for_attached(
    driver: &dyn BrowserDriver,
    scope: &Scope,
    locator: &Locator,
    timeout: Duration,
) -> Result<ElementState> {
    let deadline = Instant::now() + timeout;
    loop {
        let state = inspect(driver, scope, locator).await?;
        if state.attached() {
            return Ok(state);
        }
        if !pause_until(deadline).await {
            return Err(CheckoutError::not_found(locator.to_string(), timeout));
        }
    }
}

pub async fn wait_for_detached(
    driver: &dyn BrowserDriver,
    scope: &Scope,
    locator: &Locator,
    timeout: Duration,
) -> Result<()> {
    let deadline = Instant::now() + timeout;
    loop {
        if !inspect(driver, scope, locator).await?.attached() {
            return Ok(());
        }
        if !pause_until(deadline).await {
            return Err(CheckoutError::Timeout {
                what: format!("{} to detach", locator),
                timeout,
            });
        }
    }
}

pub async fn wait_for_url(
    driver: &dyn BrowserDriver,
    tab: &TabId,
    pattern: &TextPattern,
    timeout: Duration,
) -> Result<String> {
    let deadline = Instant::now() + timeout;
    loop {
        let url = driver.url(tab).await?;
        if pattern.is_match(&url) {
            return Ok(url);
        }
        if !pause_until(deadline).await {
            return Err(CheckoutError::Timeout {
                what: format!("URL matching /{}/ (last: {})", pattern.source(), url),
                timeout,
            });
        }
    }
}

/// One arm of a [`first_of`] race.
#[derive(Debug, Clone)]
pub enum Condition {
    Visible { scope: Scope, locator: Locator },
    UrlMatches { tab: TabId, pattern: TextPattern },
}

impl Condition {
    async fn holds(&self, driver: &dyn BrowserDriver) -> Result<bool> {
        match self {
            Condition::Visible { scope, locator } => is_visible(driver, scope, locator).await,
            Condition::UrlMatches { tab, pattern } => match driver.url(tab).await {
                Ok(url) => Ok(pattern.is_match(&url)),
                Err(e) if e.is_transient() => Ok(false),
                Err(e) => Err(e),
            },
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Condition::Visible { locator, .. } => format!("{} visible", locator),
            Condition::UrlMatches { pattern, .. } => format!("URL /{}/", pattern.source()),
        }
    }
}

/// Logical OR over several waits: resolves with the index of the first
/// condition observed to hold.
pub async fn first_of(
    driver: &dyn BrowserDriver,
    conditions: &[Condition],
    timeout: Duration,
) -> Result<usize> {
    let deadline = Instant::now() + timeout;
    loop {
        for (index, condition) in conditions.iter().enumerate() {
            if condition.holds(driver).await? {
                debug!("race won by {}", condition.describe());
                return Ok(index);
            }
        }
        if !pause_until(deadline).await {
            let names: Vec<String> = conditions.iter().map(Condition::describe).collect();
            return Err(CheckoutError::Timeout {
                what: format!("any of [{}]", names.join(" | ")),
                timeout,
            });
        }
    }
}

/// Wait for exactly one tab that is not in `known` to appear.
pub async fn wait_for_new_tab(
    driver: &dyn BrowserDriver,
    known: &[TabId],
    timeout: Duration,
) -> Result<TabId> {
    let deadline = Instant::now() + timeout;
    loop {
        let mut fresh: Vec<TabId> = driver
            .tabs()
            .await?
            .into_iter()
            .filter(|t| !known.contains(t))
            .collect();
        match fresh.len() {
            0 => {}
            1 => return Ok(fresh.remove(0)),
            n => return Err(CheckoutError::UnexpectedTabCount(n)),
        }
        if !pause_until(deadline).await {
            return Err(CheckoutError::PopupNotOpened(timeout));
        }
    }
}

pub async fn wait_for_tab_closed(driver: &dyn BrowserDriver, tab: &TabId, timeout: Duration) -> Result<()> {
    let deadline = Instant::now() + timeout;
    loop {
        if !driver.tabs().await?.contains(tab) {
            return Ok(());
        }
        if !pause_until(deadline).await {
            return Err(CheckoutError::Timeout {
                what: format!("tab {} to close", tab),
                timeout,
            });
        }
    }
}

/// Sleep one poll interval, capped at the deadline. `false` once the deadline
/// has already passed.
async fn pause_until(deadline: Instant) -> bool {
    let now = Instant::now();
    if now >= deadline {
        return false;
    }
    sleep(POLL_INTERVAL.min(deadline - now)).await;
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locator::TextMatch;
    use crate::testing::{Effect, FakeBrowser, FakeElement, FakePage};

    #[tokio::test(start_paused = true)]
    async fn race_reports_the_condition_that_holds() {
        let browser = FakeBrowser::new();
        let tab = browser
            .open_page(
                FakePage::new("https://shop.test/checkout")
                    .with(FakeElement::new("done").text("Complete").appears_after(3)),
            )
            .await;
        let conditions = [
            Condition::UrlMatches {
                tab: tab.clone(),
                pattern: TextPattern::new("thankyou").unwrap(),
            },
            Condition::Visible {
                scope: Scope::page(&tab),
                locator: Locator::text(TextMatch::exact("Complete")),
            },
        ];

        let winner = first_of(&browser, &conditions, Duration::from_secs(5)).await.unwrap();
        assert_eq!(winner, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn race_times_out_naming_every_arm() {
        let browser = FakeBrowser::new();
        let tab = browser.open_page(FakePage::new("https://shop.test")).await;
        let conditions = [Condition::UrlMatches {
            tab,
            pattern: TextPattern::new("success").unwrap(),
        }];

        match first_of(&browser, &conditions, Duration::from_secs(2)).await {
            Err(CheckoutError::Timeout { what, .. }) => assert!(what.contains("/success/")),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn new_tab_is_detected_once_opened() {
        let browser = FakeBrowser::new();
        let popup = FakePage::new("https://pay.test");
        let tab = browser
            .open_page(
                FakePage::new("https://shop.test").with(
                    FakeElement::new("go")
                        .role("button", "Continue")
                        .on_click(Effect::OpenPopup(popup)),
                ),
            )
            .await;
        let known = browser.tab_ids().await;

        assert!(matches!(
            wait_for_new_tab(&browser, &known, Duration::from_secs(1)).await,
            Err(CheckoutError::PopupNotOpened(_))
        ));

        browser
            .click(&Scope::page(&tab), &Locator::role("button", TextMatch::exact("Continue")), false)
            .await
            .unwrap();
        let popup = wait_for_new_tab(&browser, &known, Duration::from_secs(1)).await.unwrap();
        assert_ne!(popup, tab);

        browser.close_tab(&popup).await.unwrap();
        wait_for_tab_closed(&browser, &popup, Duration::from_secs(1)).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn two_new_tabs_are_not_mistaken_for_a_popup() {
        let browser = FakeBrowser::new();
        let tab = browser
            .open_page(
                FakePage::new("https://shop.test").with(
                    FakeElement::new("go")
                        .role("button", "Continue")
                        .on_click(Effect::OpenPopup(FakePage::new("https://pay.test")))
                        .on_click(Effect::OpenPopup(FakePage::new("https://ads.test"))),
                ),
            )
            .await;
        let known = browser.tab_ids().await;

        browser
            .click(&Scope::page(&tab), &Locator::role("button", TextMatch::exact("Continue")), false)
            .await
            .unwrap();
        assert!(matches!(
            wait_for_new_tab(&browser, &known, Duration::from_secs(1)).await,
            Err(CheckoutError::UnexpectedTabCount(2))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn detach_wait_sees_removed_elements() {
        let browser = FakeBrowser::new();
        let tab = browser
            .open_page(
                FakePage::new("https://shop.test")
                    .with(FakeElement::new("modal").css(".popup"))
                    .with(
                        FakeElement::new("close")
                            .role("button", "Close")
                            .on_click(Effect::Remove("modal".to_string())),
                    ),
            )
            .await;
        let page = Scope::page(&tab);
        let modal = Locator::css(".popup");

        assert!(wait_for_detached(&browser, &page, &modal, Duration::from_secs(1)).await.is_err());
        browser
            .click(&page, &Locator::role("button", TextMatch::exact("Close")), false)
            .await
            .unwrap();
        wait_for_detached(&browser, &page, &modal, Duration::from_secs(1)).await.unwrap();
    }
}
