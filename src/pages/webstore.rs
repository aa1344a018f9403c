use super::{click_visible, fill_visible, PageContext};
use crate::core::{Scope, TabId};
use crate::errors::{CheckoutError, Result};
use crate::locator::{Locator, TextMatch, TextPattern};
use crate::wait;
use std::fmt;
use std::time::Duration;
use tracing::{info, warn};

pub const SIDEBAR_PACKAGES_LINK: &str = "#site-navigation > ul > li:nth-child(2) > a";

pub const GIFT_CARD_MODAL: &str = "div.popup.product-options-popup";
pub const GIFT_CARD_EMAIL_INPUT: &str =
    r#"div.popup.product-options-popup input[type="email"], input[placeholder*="email" i]"#;
pub const GIFT_CARD_CONTINUE: &str =
    "body > div.popup.product-options-popup > div > div > form > div.actions > button";

pub const BASKET_DRAWER: &str = ".v-navigation-drawer--active";
pub const BASKET_TRIGGER: &str = r##"a[href*="#basket"], button:has(.mdi-basket)"##;
pub const EMPTY_BASKET_TEXT: &str = "Your basket is empty";

const TILE_TIMEOUT: Duration = Duration::from_secs(10);
const CHECKOUT_BUTTON_TIMEOUT: Duration = Duration::from_secs(15);

/// Package tiles on the packages category listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageKind {
    FullPrice,
    Subscription,
    GiftCard,
    Sale,
}

impl PackageKind {
    fn position(self) -> usize {
        match self {
            PackageKind::FullPrice => 1,
            PackageKind::Subscription => 2,
            PackageKind::GiftCard => 3,
            PackageKind::Sale => 5,
        }
    }

    pub fn tile_selector(self) -> String {
        format!(
            "body > div.site > div > main > div > article:nth-child({}) > div > a",
            self.position()
        )
    }

    pub fn from_phrase(phrase: &str) -> Option<Self> {
        match phrase.trim().to_ascii_lowercase().as_str() {
            "full price" => Some(PackageKind::FullPrice),
            "subscription" => Some(PackageKind::Subscription),
            "giftcard" | "gift card" => Some(PackageKind::GiftCard),
            "sale" => Some(PackageKind::Sale),
            _ => None,
        }
    }
}

impl fmt::Display for PackageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PackageKind::FullPrice => "Full Price",
            PackageKind::Subscription => "Subscription",
            PackageKind::GiftCard => "Gift Card",
            PackageKind::Sale => "Sale",
        };
        f.write_str(name)
    }
}

pub fn proceed_to_checkout_button() -> Locator {
    Locator::role("button", TextMatch::pattern("proceed to checkout"))
}

/// Public webstore: category listing and basket drawer.
pub struct WebstorePage<'a> {
    ctx: &'a PageContext,
    tab: TabId,
}

impl<'a> WebstorePage<'a> {
    pub fn new(ctx: &'a PageContext, tab: &TabId) -> Self {
        Self {
            ctx,
            tab: tab.clone(),
        }
    }

    fn page(&self) -> Scope {
        Scope::page(&self.tab)
    }

    /// Navigate to `url`; the page must end up exactly there.
    pub async fn goto_home(&self, url: &str) -> Result<()> {
        let driver = self.ctx.driver();
        driver.navigate(&self.tab, url).await?;
        let actual = driver.url(&self.tab).await?;
        if !same_url(&actual, url) {
            return Err(CheckoutError::UnexpectedUrl {
                expected: url.to_string(),
                actual,
            });
        }
        info!("On webstore home {}", actual);
        Ok(())
    }

    pub async fn select_sidebar_packages(&self) -> Result<()> {
        let driver = self.ctx.driver();
        click_visible(
            driver,
            &self.page(),
            &Locator::css(SIDEBAR_PACKAGES_LINK),
            self.ctx.config.element_timeout(),
        )
        .await?;

        let category = &self.ctx.config.storefront.packages_category_path;
        let pattern = TextPattern::new(&regex::escape(category))?;
        let url = wait::wait_for_url(driver, &self.tab, &pattern, self.ctx.config.element_timeout())
            .await?;
        info!("Packages category open at {}", url);
        Ok(())
    }

    pub async fn add_package(&self, kind: PackageKind) -> Result<()> {
        let tile = Locator::css(kind.tile_selector());
        click_visible(self.ctx.driver(), &self.page(), &tile, TILE_TIMEOUT).await?;
        info!("Added {} package to basket", kind);
        if kind == PackageKind::GiftCard {
            self.complete_gift_card_modal().await?;
        }
        Ok(())
    }

    /// The gift card options modal is optional; when it shows up the
    /// recipient email is filled and the modal dismissed.
    async fn complete_gift_card_modal(&self) -> Result<()> {
        let driver = self.ctx.driver();
        let page = self.page();
        let modal = Locator::css(GIFT_CARD_MODAL);

        if !wait::visible_within(driver, &page, &modal, Duration::from_secs(7)).await? {
            info!("No gift card modal after adding package");
            return Ok(());
        }

        let email = self.ctx.fixtures.gift_card_email().await?;
        let input = Locator::css(GIFT_CARD_EMAIL_INPUT);
        fill_visible(driver, &page, &input, &email, Duration::from_secs(7)).await?;
        info!("Filled gift card email {}", email);

        let continue_button = Locator::css(GIFT_CARD_CONTINUE);
        click_visible(driver, &page, &continue_button, Duration::from_secs(5)).await?;

        match wait::wait_for_detached(driver, &page, &modal, Duration::from_secs(8)).await {
            Ok(()) => info!("Gift card modal closed"),
            Err(CheckoutError::Timeout { .. }) => {
                warn!("Gift card modal still open, retrying Continue once");
                if wait::is_visible(driver, &page, &continue_button).await? {
                    driver.click(&page, &continue_button, false).await?;
                    if wait::wait_for_detached(driver, &page, &modal, Duration::from_secs(5))
                        .await
                        .is_err()
                    {
                        warn!("Gift card modal did not close after retry");
                    }
                }
            }
            Err(e) => return Err(e),
        }
        Ok(())
    }

    /// Open the basket drawer if needed and click "Proceed to checkout".
    pub async fn proceed_to_checkout(&self) -> Result<()> {
        let driver = self.ctx.driver();
        let page = self.page();

        if !wait::is_visible(driver, &page, &Locator::css(BASKET_DRAWER)).await? {
            warn!("Basket drawer not open, trying to open it");
            let trigger = Locator::css(BASKET_TRIGGER);
            if wait::is_visible(driver, &page, &trigger).await? {
                driver.click(&page, &trigger, false).await?;
            } else {
                warn!("Basket trigger not found, waiting for the drawer animation");
            }
        }

        // the drawer exposes no animation-end signal; its checkout button is
        // the readiness marker
        let button = proceed_to_checkout_button();
        if !wait::visible_within(driver, &page, &button, CHECKOUT_BUTTON_TIMEOUT).await? {
            let empty = Locator::text(TextMatch::contains(EMPTY_BASKET_TEXT));
            if wait::is_visible(driver, &page, &empty).await? {
                return Err(CheckoutError::BasketEmpty);
            }
            return Err(CheckoutError::not_found(button.to_string(), CHECKOUT_BUTTON_TIMEOUT));
        }

        // the drawer may still be animating, which intercepts normal clicks
        driver.click(&page, &button, true).await?;
        info!("Clicked Proceed to checkout");
        Ok(())
    }
}

/// URLs equal up to a trailing slash on the path.
fn same_url(actual: &str, expected: &str) -> bool {
    match (url::Url::parse(actual), url::Url::parse(expected)) {
        (Ok(mut a), Ok(mut b)) => {
            for u in [&mut a, &mut b] {
                let path = u.path().trim_end_matches('/').to_string();
                u.set_path(&path);
            }
            a == b
        }
        _ => actual.trim_end_matches('/') == expected.trim_end_matches('/'),
    }
}
