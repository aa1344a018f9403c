//! Best-effort multi-strategy state detection.
//!
//! A [`Detector`] looks for evidence that a page reached some state (an order
//! confirmation, a discount line) by trying an ordered list of [`Strategy`]s
//! against the tab's main document and then every child frame. Frames are
//! re-enumerated on each pass because checkout widgets attach and replace
//! their iframes while the flow runs. When the time budget runs out, exactly
//! one screenshot is captured and the detection fails.

use crate::core::config::DetectionConfig;
use crate::core::{BrowserDriver, FramePath, Scope, TabId};
use crate::errors::{CheckoutError, Result};
use crate::locator::{Locator, TextPattern};
use crate::utils::ArtifactStore;
use crate::wait;
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub enum Check {
    /// Some element matching the locator is visible
    Visible(Locator),
    /// The scope's rendered text matches
    TextScan(TextPattern),
}

#[derive(Debug, Clone)]
pub struct Strategy {
    pub label: String,
    pub check: Check,
}

impl Strategy {
    pub fn visible(label: impl Into<String>, locator: Locator) -> Self {
        Self {
            label: label.into(),
            check: Check::Visible(locator),
        }
    }

    pub fn text_scan(label: impl Into<String>, pattern: TextPattern) -> Self {
        Self {
            label: label.into(),
            check: Check::TextScan(pattern),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DetectionPolicy {
    /// Upper bound for a single strategy in a single scope
    pub per_strategy_timeout: Duration,
    pub overall_timeout: Duration,
    /// Pause between passes
    pub retry_delay: Duration,
    pub capture_on_success: bool,
}

impl From<&DetectionConfig> for DetectionPolicy {
    fn from(config: &DetectionConfig) -> Self {
        Self {
            per_strategy_timeout: Duration::from_millis(config.per_strategy_timeout_ms),
            overall_timeout: Duration::from_millis(config.overall_timeout_ms),
            retry_delay: Duration::from_millis(config.retry_delay_ms),
            capture_on_success: config.capture_on_success,
        }
    }
}

impl Default for DetectionPolicy {
    fn default() -> Self {
        Self::from(&DetectionConfig::default())
    }
}

/// A successful detection.
#[derive(Debug, Clone)]
pub struct Detection {
    pub strategy: String,
    /// "main page" or "frame <url>"
    pub scope: String,
    pub frame: FramePath,
    /// Text pulled out of the matching scope by the extractor, e.g. an order number
    pub extracted: Option<String>,
    pub passes: u32,
    pub screenshot: Option<PathBuf>,
}

pub struct Detector<'a> {
    driver: &'a dyn BrowserDriver,
    artifacts: &'a ArtifactStore,
    policy: DetectionPolicy,
    extractor: Option<TextPattern>,
}

struct Hit {
    strategy: String,
    scope: String,
    frame: FramePath,
}

impl<'a> Detector<'a> {
    pub fn new(driver: &'a dyn BrowserDriver, artifacts: &'a ArtifactStore, policy: DetectionPolicy) -> Self {
        Self {
            driver,
            artifacts,
            policy,
            extractor: None,
        }
    }

    pub fn with_extractor(mut self, pattern: TextPattern) -> Self {
        self.extractor = Some(pattern);
        self
    }

    /// Scan `tab` until a strategy hits or the budget is spent. `operation`
    /// names the failure screenshot (`<operation>-missing-<ts>.png`).
    pub async fn detect(&self, tab: &TabId, operation: &str, strategies: &[Strategy]) -> Result<Detection> {
        let deadline = Instant::now() + self.policy.overall_timeout;
        let mut passes = 0;

        loop {
            passes += 1;
            debug!("{}: detection pass {}", operation, passes);

            if let Some(hit) = self.scan(tab, strategies, deadline).await? {
                return self.succeed(tab, operation, hit, passes).await;
            }

            if Instant::now() + self.policy.retry_delay >= deadline {
                break;
            }
            tokio::time::sleep(self.policy.retry_delay).await;
        }

        warn!("{}: no strategy matched after {} pass(es)", operation, passes);
        let screenshot = match self
            .artifacts
            .capture(self.driver, tab, &format!("{}-missing", operation))
            .await
        {
            Ok(path) => Some(path),
            Err(e) => {
                warn!("Could not capture failure screenshot: {}", e);
                None
            }
        };

        Err(CheckoutError::DetectionExhausted {
            operation: operation.to_string(),
            passes,
            screenshot,
        })
    }

    async fn scan(&self, tab: &TabId, strategies: &[Strategy], deadline: Instant) -> Result<Option<Hit>> {
        let mut scopes = vec![("main page".to_string(), FramePath::main())];
        match self.driver.frames(tab).await {
            Ok(frames) => {
                debug!("Searching {} frame(s)", frames.len());
                scopes.extend(frames.into_iter().map(|f| {
                    let label = if f.url.is_empty() || f.url == "about:blank" {
                        "frame (blank)".to_string()
                    } else {
                        format!("frame {}", f.url)
                    };
                    (label, f.path)
                }));
            }
            Err(e) if e.is_transient() => debug!("Frame enumeration failed: {}", e),
            Err(e) => return Err(e),
        }

        for (label, frame) in scopes {
            let scope = Scope::frame(tab, frame);
            for strategy in strategies {
                if self.check(&scope, strategy, deadline).await? {
                    return Ok(Some(Hit {
                        strategy: strategy.label.clone(),
                        scope: label,
                        frame: scope.frame,
                    }));
                }
            }
        }
        Ok(None)
    }

    async fn check(&self, scope: &Scope, strategy: &Strategy, deadline: Instant) -> Result<bool> {
        match &strategy.check {
            Check::Visible(locator) => {
                let window = self
                    .policy
                    .per_strategy_timeout
                    .min(deadline.saturating_duration_since(Instant::now()));
                wait::visible_within(self.driver, scope, locator, window).await
            }
            Check::TextScan(pattern) => match self.driver.inner_text(scope).await {
                Ok(text) => Ok(pattern.is_match(&text)),
                Err(e) if e.is_transient() => Ok(false),
                Err(e) => Err(e),
            },
        }
    }

    async fn succeed(&self, tab: &TabId, operation: &str, hit: Hit, passes: u32) -> Result<Detection> {
        info!("{}: matched \"{}\" in {}", operation, hit.strategy, hit.scope);

        let mut extracted = None;
        if let Some(pattern) = &self.extractor {
            match self.driver.inner_text(&Scope::frame(tab, hit.frame.clone())).await {
                Ok(text) => {
                    extracted = pattern.find(&text).map(str::to_string);
                    if let Some(value) = &extracted {
                        info!("Detected {}", value);
                    }
                }
                Err(e) => warn!("Could not extract text from {}: {}", hit.scope, e),
            }
        }

        let screenshot = if self.policy.capture_on_success {
            self.artifacts
                .capture(self.driver, tab, &format!("{}-success", operation))
                .await
                .map_err(|e| warn!("Could not capture success screenshot: {}", e))
                .ok()
        } else {
            None
        };

        Ok(Detection {
            strategy: hit.strategy,
            scope: hit.scope,
            frame: hit.frame,
            extracted,
            passes,
            screenshot,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locator::TextMatch;
    use crate::testing::{FakeBrowser, FakeElement, FakeFrame, FakePage};

    fn strategies() -> Vec<Strategy> {
        vec![
            Strategy::visible(
                "heading",
                Locator::role("heading", TextMatch::pattern("order complete")),
            ),
            Strategy::visible(
                "continue button",
                Locator::css("button").with_text(TextMatch::contains("Continue")),
            ),
            Strategy::text_scan("inner text", TextPattern::new("order complete").unwrap()),
        ]
    }

    fn policy() -> DetectionPolicy {
        DetectionPolicy {
            per_strategy_timeout: Duration::from_millis(200),
            overall_timeout: Duration::from_secs(5),
            retry_delay: Duration::from_secs(1),
            capture_on_success: false,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn attributes_hit_to_the_frame_that_has_it() {
        let dir = tempfile::tempdir().unwrap();
        let artifacts = ArtifactStore::new(dir.path());
        let browser = FakeBrowser::new();
        let tab = browser
            .open_page(
                FakePage::new("https://shop.test/checkout/basket")
                    .with_frame(FakeFrame::new("iframe.ads", "https://ads.test"))
                    .with_frame(
                        FakeFrame::new("iframe.widget", "https://pay.test/widget")
                            .with(FakeElement::new("done").role("heading", "Order Complete"))
                            .with_text("Order tbx-12ab-34cd"),
                    ),
            )
            .await;

        let detection = Detector::new(&browser, &artifacts, policy())
            .with_extractor(TextPattern::new(r"tbx-[a-z0-9-]+").unwrap())
            .detect(&tab, "order-complete", &strategies())
            .await
            .unwrap();

        assert_eq!(detection.strategy, "heading");
        assert_eq!(detection.scope, "frame https://pay.test/widget");
        assert_eq!(detection.extracted.as_deref(), Some("tbx-12ab-34cd"));
        assert_eq!(detection.passes, 1);
        assert_eq!(browser.screenshot_count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn earlier_strategy_wins_within_a_scope() {
        let dir = tempfile::tempdir().unwrap();
        let artifacts = ArtifactStore::new(dir.path());
        let browser = FakeBrowser::new();
        let tab = browser
            .open_page(
                FakePage::new("https://shop.test")
                    .with(FakeElement::new("continue").css("button").text("Continue"))
                    .with_text("Order complete, thanks"),
            )
            .await;

        let detection = Detector::new(&browser, &artifacts, policy())
            .detect(&tab, "order-complete", &strategies())
            .await
            .unwrap();
        assert_eq!(detection.strategy, "continue button");
        assert_eq!(detection.scope, "main page");
    }

    #[tokio::test(start_paused = true)]
    async fn late_frame_is_found_on_a_later_pass() {
        let dir = tempfile::tempdir().unwrap();
        let artifacts = ArtifactStore::new(dir.path());
        let browser = FakeBrowser::new();
        let tab = browser
            .open_page(FakePage::new("https://shop.test").with_frame(
                FakeFrame::new("iframe.modal", "")
                    .with_text("ORDER COMPLETE")
                    .appears_after(1),
            ))
            .await;

        let detection = Detector::new(&browser, &artifacts, policy())
            .detect(&tab, "order-complete", &strategies())
            .await
            .unwrap();
        assert_eq!(detection.strategy, "inner text");
        assert_eq!(detection.scope, "frame (blank)");
        assert!(detection.passes >= 2);
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_takes_exactly_one_screenshot() {
        let dir = tempfile::tempdir().unwrap();
        let artifacts = ArtifactStore::new(dir.path());
        let browser = FakeBrowser::new();
        let tab = browser
            .open_page(
                FakePage::new("https://shop.test")
                    .with_frame(FakeFrame::new("iframe.widget", "https://pay.test").with_text("Processing")),
            )
            .await;

        let err = Detector::new(&browser, &artifacts, policy())
            .detect(&tab, "order-complete", &strategies())
            .await
            .unwrap_err();

        match err {
            CheckoutError::DetectionExhausted {
                operation,
                passes,
                screenshot,
            } => {
                assert_eq!(operation, "order-complete");
                assert!(passes > 1);
                let path = screenshot.unwrap();
                assert!(path
                    .file_name()
                    .unwrap()
                    .to_string_lossy()
                    .starts_with("order-complete-missing-"));
            }
            other => panic!("unexpected error: {}", other),
        }
        assert_eq!(browser.screenshot_count().await, 1);
    }
}
