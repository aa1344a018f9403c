use super::{click_visible, fill_visible, PageContext};
use crate::browser::navigation::{wait_for_load_state, LoadState};
use crate::core::{Scope, TabId};
use crate::errors::Result;
use crate::locator::{Locator, TextMatch};
use crate::wait;
use std::time::Duration;
use tracing::info;

pub const USERNAME_INPUT: &str = "#email";
pub const PASSWORD_INPUT: &str = "#password";
pub const LOGIN_BUTTON: &str = "#guest-container > div > div.card.border-0 > div > form > div.d-flex.justify-content-between.align-items-center.mt-3 > button.btn.btn-primary";
pub const PROJECTS_LINK: &str = "#sidebar > div > ul > div > div > li:nth-child(2) > a";
pub const REVENUE_REPORT_TEXT: &str = "Revenue Report";

const PANEL_TIMEOUT: Duration = Duration::from_secs(10);

/// Creator panel login.
pub struct LoginPage<'a> {
    ctx: &'a PageContext,
    tab: TabId,
}

impl<'a> LoginPage<'a> {
    pub fn new(ctx: &'a PageContext, tab: &TabId) -> Self {
        Self {
            ctx,
            tab: tab.clone(),
        }
    }

    fn page(&self) -> Scope {
        Scope::page(&self.tab)
    }

    pub async fn goto(&self) -> Result<()> {
        let url = &self.ctx.config.storefront.base_url;
        info!("Opening login page {}", url);
        self.ctx.driver().navigate(&self.tab, url).await
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<()> {
        let driver = self.ctx.driver();
        let timeout = self.ctx.config.element_timeout();
        fill_visible(driver, &self.page(), &Locator::css(USERNAME_INPUT), username, timeout).await?;
        fill_visible(driver, &self.page(), &Locator::css(PASSWORD_INPUT), password, timeout).await?;
        click_visible(driver, &self.page(), &Locator::css(LOGIN_BUTTON), timeout).await?;
        info!("Submitted login form");
        Ok(())
    }

    pub async fn navigate_to_creator_panel(&self) -> Result<()> {
        let driver = self.ctx.driver();
        click_visible(driver, &self.page(), &Locator::css(PROJECTS_LINK), PANEL_TIMEOUT).await?;
        wait_for_load_state(driver, &self.tab, LoadState::NetworkIdle, self.ctx.config.navigation_timeout())
            .await?;
        Ok(())
    }

    pub async fn is_revenue_report_visible(&self) -> Result<bool> {
        wait::visible_within(
            self.ctx.driver(),
            &self.page(),
            &Locator::text(TextMatch::contains(REVENUE_REPORT_TEXT)),
            PANEL_TIMEOUT,
        )
        .await
    }
}
