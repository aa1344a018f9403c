use super::flow::PaymentFlow;
use super::providers::{ProviderId, ProviderProfile, ADVANCED_URL_PATTERN, GPAY_TILE};
use super::{click_visible, ensure_checked, fill_visible, PageContext};
use crate::browser::navigation::{wait_for_load_state, LoadState};
use crate::core::{Scope, TabId};
use crate::detector::{Detection, Strategy};
use crate::errors::{CheckoutError, Result};
use crate::locator::{Locator, TextMatch, TextPattern};
use crate::target::ActiveTarget;
use crate::wait::{self, Condition};
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{info, warn};

/// The embedded checkout component.
pub const WIDGET_FRAME: &str = r#"iframe[name^="__zoid__tebex_js_checkout_component__"]"#;
pub const MORE_PAYMENT_METHODS: &str = "More Payment Methods";
pub const TERMS_CHECKBOX_NAME: &str = "I agree to Tebex's Terms";

pub const CREATOR_CODE_INPUT: &str = "#creator_code";
pub const CREATOR_CODE_SUCCESS: &str = "#app > div > div > nav > div > div > div > div.v-skeleton-loader.bg-background.py-6.mt-auto.align-end > div > div.creator-code-success.text-success";
pub const COUPON_INPUT_NAME: &str = "Coupon/Gift Card";
pub const DISCOUNTS_LABEL: &str = "Discounts:";

pub const COMPLETE_PAYMENT_BUTTON: &str = ".btn.btn-success";
pub const ORDER_NUMBER_PATTERN: &str = r"tbx-[a-z0-9-]+";

const TERMS_TIMEOUT: Duration = Duration::from_secs(5);
const CREATOR_INPUT_MAIN_TIMEOUT: Duration = Duration::from_secs(4);
const CREATOR_INPUT_FRAME_TIMEOUT: Duration = Duration::from_secs(2);
const APPLY_TIMEOUT: Duration = Duration::from_secs(15);
const TEST_PAYMENT_TIMEOUT: Duration = Duration::from_secs(20);

/// Locators that show the order went through, most reliable first.
pub fn order_complete_strategies() -> Vec<Strategy> {
    vec![
        Strategy::visible(
            "Order Complete heading",
            Locator::role("heading", TextMatch::pattern("order complete")),
        ),
        Strategy::visible(
            "Continue button",
            Locator::css("button").with_text(TextMatch::contains("Continue")),
        ),
        Strategy::visible(
            "Order Complete text",
            Locator::text(TextMatch::contains("Order Complete")),
        ),
        Strategy::visible(
            "thank-you text",
            Locator::text(TextMatch::contains("Thank you for your purchase")),
        ),
        Strategy::visible("order-complete test id", Locator::test_id("order-complete")),
        Strategy::visible("order-complete title", Locator::css(".order-complete-title")),
        Strategy::text_scan("inner text scan", TextPattern::literal("order complete")),
    ]
}

pub fn terms_checkbox() -> Locator {
    Locator::role("checkbox", TextMatch::pattern(TERMS_CHECKBOX_NAME))
}

/// Checkout page object. Borrows the scenario's active target so popups it
/// follows and hands back are visible to later steps.
pub struct CheckoutPage<'a> {
    pub(crate) ctx: &'a PageContext,
    pub(crate) target: &'a mut ActiveTarget,
}

impl<'a> CheckoutPage<'a> {
    pub fn new(ctx: &'a PageContext, target: &'a mut ActiveTarget) -> Self {
        Self { ctx, target }
    }

    pub fn target(&self) -> &ActiveTarget {
        self.target
    }

    /// Scope of the checkout widget on the scenario's home tab.
    pub fn widget(&self) -> Scope {
        Scope::page(self.target.home()).descend(WIDGET_FRAME)
    }

    /// Run the full payment flow for `provider` up to submission.
    pub async fn pay_with(&mut self, provider: ProviderId) -> Result<PaymentFlow> {
        let mut flow = PaymentFlow::new(ProviderProfile::for_provider(provider));
        flow.submit(self).await?;
        Ok(flow)
    }

    pub async fn ensure_terms_accepted(&self) -> Result<bool> {
        ensure_checked(self.ctx.driver(), &self.widget(), &terms_checkbox(), TERMS_TIMEOUT).await
    }

    /// Complete a sandbox payment in the already open test-payment tab (or
    /// the current tab when there is none).
    pub async fn confirm_test_payment(&mut self) -> Result<()> {
        info!("Confirming test payment");
        let fragment = self.ctx.config.storefront.test_payment_url_fragment.clone();
        match self.find_tab(&fragment).await? {
            Some(tab) => {
                info!("Found open test payment tab");
                self.target.switch_to(tab);
            }
            None => warn!("No open test payment tab found, staying on current page"),
        }

        let driver = self.ctx.driver();
        let tab = self.target.current().clone();
        wait_for_load_state(driver, &tab, LoadState::DomContentLoaded, TEST_PAYMENT_TIMEOUT).await?;
        info!("Active page URL: {}", driver.url(&tab).await?);

        let page = Scope::page(&tab);
        let complete = Locator::any_of(vec![
            Locator::css("button").with_text(TextMatch::contains("Complete Payment")),
            Locator::css(COMPLETE_PAYMENT_BUTTON),
        ]);
        click_visible(driver, &page, &complete, TEST_PAYMENT_TIMEOUT).await?;
        info!("Clicked Complete Payment");

        let markers = [
            Condition::UrlMatches {
                tab: tab.clone(),
                pattern: TextPattern::literal(ADVANCED_URL_PATTERN),
            },
            Condition::Visible {
                scope: page.clone(),
                locator: Locator::text(TextMatch::contains("Payment Complete")),
            },
            Condition::Visible {
                scope: page,
                locator: Locator::text(TextMatch::contains("Test Payment Complete")),
            },
        ];
        match wait::first_of(driver, &markers, TEST_PAYMENT_TIMEOUT).await {
            Ok(_) => info!("Test payment confirmed"),
            Err(CheckoutError::Timeout { .. }) => {
                warn!("Payment confirmation not detected, may remain on sandbox page")
            }
            Err(e) => return Err(e),
        }
        Ok(())
    }

    /// Return to the checkout tab and detect the order confirmation across
    /// the page and all of its frames.
    pub async fn verify_order_confirmation(&mut self) -> Result<Detection> {
        info!("Checking for purchase confirmation message");
        sleep(Duration::from_millis(1500)).await;

        let fragment = self.ctx.config.storefront.checkout_url_fragment.clone();
        match self.find_tab(&fragment).await? {
            Some(tab) => self.target.switch_to(tab),
            None => warn!("Could not find the checkout tab, staying on current page"),
        }
        // modal animations
        sleep(Duration::from_secs(2)).await;

        let detection = self
            .ctx
            .detector()
            .with_extractor(TextPattern::literal(ORDER_NUMBER_PATTERN))
            .detect(self.target.current(), "order-complete", &order_complete_strategies())
            .await?;
        info!("Order confirmation verified ({})", detection.scope);
        Ok(detection)
    }

    /// Enter the creator code from fixtures wherever its input lives (main
    /// page first, then every frame) and wait for the success marker.
    pub async fn enter_creator_code(&mut self) -> Result<Detection> {
        let code = self.ctx.fixtures.creator_code().await?;
        let driver = self.ctx.driver();
        let tab = self.target.current().clone();
        let input = Locator::css(CREATOR_CODE_INPUT);

        let scope = match self.locate_in_any_frame(&tab, &input).await? {
            Some(scope) => scope,
            None => {
                return Err(CheckoutError::not_found(
                    "creator code input on any page or frame",
                    CREATOR_INPUT_MAIN_TIMEOUT,
                ))
            }
        };

        driver.fill(&scope, &input, "").await?;
        driver.fill(&scope, &input, &code).await?;
        info!("Entered creator code: {}", code);

        // blur so the widget reveals its apply button
        driver.press(&scope, &input, "Tab").await?;
        sleep(Duration::from_secs(1)).await;

        let apply = Locator::role("button", TextMatch::pattern("apply|confirm"));
        wait::wait_for_visible(driver, &scope, &apply, APPLY_TIMEOUT).await?;
        sleep(Duration::from_millis(600)).await;
        click_visible(driver, &scope, &apply, Duration::from_secs(5)).await?;
        info!("Clicked Confirm/Apply");

        let detection = self
            .ctx
            .detector()
            .detect(
                &tab,
                "creator-code",
                &[
                    Strategy::visible("creator code success", Locator::css(CREATOR_CODE_SUCCESS)),
                    Strategy::visible(
                        "creator code success class",
                        Locator::css(".creator-code-success"),
                    ),
                ],
            )
            .await?;
        info!("Creator code applied ({})", detection.scope);
        Ok(detection)
    }

    /// Enter the coupon from fixtures in the widget and wait for the
    /// discount line.
    pub async fn enter_coupon(&mut self) -> Result<Detection> {
        let code = self.ctx.fixtures.coupon_code().await?;
        let driver = self.ctx.driver();
        let tab = self.target.home().clone();

        wait::wait_for_visible(driver, &Scope::page(&tab), &Locator::css(WIDGET_FRAME), APPLY_TIMEOUT)
            .await?;
        let widget = self.widget();

        let coupon = Locator::role("textbox", TextMatch::exact(COUPON_INPUT_NAME));
        fill_visible(driver, &widget, &coupon, &code, APPLY_TIMEOUT).await?;
        info!("Entered coupon: {}", code);

        let confirm = Locator::role("button", TextMatch::pattern("confirm|apply"));
        click_visible(driver, &widget, &confirm, APPLY_TIMEOUT).await?;

        let detection = self
            .ctx
            .detector()
            .detect(
                &tab,
                "coupon-discount",
                &[Strategy::visible(
                    "Discounts label",
                    Locator::text(TextMatch::contains(DISCOUNTS_LABEL)),
                )],
            )
            .await?;
        info!("Discounts label visible ({})", detection.scope);
        Ok(detection)
    }

    /// Make sure the Google Pay tile is the selected payment method,
    /// selecting it when it is not.
    pub async fn confirm_google_pay_selected(&mut self) -> Result<()> {
        let driver = self.ctx.driver();
        let widget = self.widget();
        let timeout = self.ctx.config.element_timeout();
        let tile = Locator::css(GPAY_TILE);

        if !wait::visible_within(driver, &widget, &tile, Duration::ZERO).await? {
            let more = Locator::text(TextMatch::exact(MORE_PAYMENT_METHODS));
            if wait::visible_within(driver, &widget, &more, timeout).await? {
                driver.click(&widget, &more, false).await?;
            }
            wait::wait_for_visible(driver, &widget, &tile, timeout).await?;
        }

        if wait::inspect(driver, &widget, &tile).await?.checked == Some(true) {
            info!("Google Pay already selected");
            return Ok(());
        }

        driver.click(&widget, &tile, false).await?;
        let deadline = Instant::now() + timeout;
        loop {
            if wait::inspect(driver, &widget, &tile).await?.checked == Some(true) {
                info!("Google Pay selected");
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(CheckoutError::MethodNotSelected(ProviderId::GooglePay.to_string()));
            }
            sleep(wait::POLL_INTERVAL).await;
        }
    }

    /// First tab whose URL contains `fragment`, preferring the home tab.
    async fn find_tab(&self, fragment: &str) -> Result<Option<TabId>> {
        let driver = self.ctx.driver();
        let mut tabs = driver.tabs().await?;
        if let Some(pos) = tabs.iter().position(|t| t == self.target.home()) {
            let home = tabs.remove(pos);
            tabs.insert(0, home);
        }
        for tab in tabs {
            match driver.url(&tab).await {
                Ok(url) if url.contains(fragment) => return Ok(Some(tab)),
                Ok(_) => {}
                Err(e) if e.is_transient() => {}
                Err(e) => return Err(e),
            }
        }
        Ok(None)
    }

    async fn locate_in_any_frame(&self, tab: &TabId, locator: &Locator) -> Result<Option<Scope>> {
        let driver = self.ctx.driver();
        let main = Scope::page(tab);
        if wait::visible_within(driver, &main, locator, CREATOR_INPUT_MAIN_TIMEOUT).await? {
            return Ok(Some(main));
        }

        warn!("{} not on main page, scanning frames", locator);
        let frames = match driver.frames(tab).await {
            Ok(frames) => frames,
            Err(e) if e.is_transient() => Vec::new(),
            Err(e) => return Err(e),
        };
        for frame in frames {
            let scope = Scope::frame(tab, frame.path);
            if wait::visible_within(driver, &scope, locator, CREATOR_INPUT_FRAME_TIMEOUT).await? {
                info!("Found {} inside frame {}", locator, frame.url);
                return Ok(Some(scope));
            }
        }
        Ok(None)
    }
}
