use super::checkout::{terms_checkbox, CheckoutPage, MORE_PAYMENT_METHODS, WIDGET_FRAME};
use super::providers::{
    PopupFlow, PopupStep, ProviderProfile, Submission, ADVANCED_URL_PATTERN, CARD_FRAME,
    COMPLETE_ACTION_BUTTON,
};
use super::{click_visible, ensure_checked, fill_visible, PageContext};
use crate::browser::navigation::wait_for_load_state;
use crate::core::{Scope, TabId};
use crate::detector::Detection;
use crate::errors::{CheckoutError, Result};
use crate::locator::{Locator, TextMatch, TextPattern};
use crate::wait::{self, Condition};
use std::time::Duration;
use tracing::{info, warn};

const CARD_FIELD_TIMEOUT: Duration = Duration::from_secs(10);
const TERMS_TIMEOUT: Duration = Duration::from_secs(5);
const IN_PLACE_SUBMIT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub enum FlowState {
    Idle,
    WidgetLocated,
    FieldsFilled,
    Submitted,
    /// A provider popup is the active target
    ExternalRedirect(TabId),
    Confirmed(Detection),
    Failed(String),
}

impl FlowState {
    pub fn name(&self) -> &'static str {
        match self {
            FlowState::Idle => "idle",
            FlowState::WidgetLocated => "widget-located",
            FlowState::FieldsFilled => "fields-filled",
            FlowState::Submitted => "submitted",
            FlowState::ExternalRedirect(_) => "external-redirect",
            FlowState::Confirmed(_) => "confirmed",
            FlowState::Failed(_) => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, FlowState::Confirmed(_) | FlowState::Failed(_))
    }
}

/// One payment attempt, driven by a [`ProviderProfile`].
#[derive(Debug)]
pub struct PaymentFlow {
    profile: ProviderProfile,
    state: FlowState,
    history: Vec<&'static str>,
}

impl PaymentFlow {
    pub fn new(profile: ProviderProfile) -> Self {
        Self {
            profile,
            state: FlowState::Idle,
            history: vec![FlowState::Idle.name()],
        }
    }

    pub fn profile(&self) -> &ProviderProfile {
        &self.profile
    }

    pub fn state(&self) -> &FlowState {
        &self.state
    }

    /// Names of every state visited, in order.
    pub fn history(&self) -> &[&'static str] {
        &self.history
    }

    fn transition(&mut self, next: FlowState) {
        info!(
            "{} flow: {} -> {}",
            self.profile.id,
            self.state.name(),
            next.name()
        );
        self.history.push(next.name());
        self.state = next;
    }

    /// Locate the widget, fill it, accept the terms and submit, following a
    /// provider popup until it closes.
    pub async fn submit(&mut self, page: &mut CheckoutPage<'_>) -> Result<()> {
        let result = self.drive(page).await;
        if let Err(e) = &result {
            self.transition(FlowState::Failed(e.to_string()));
        }
        result
    }

    /// Detect the order confirmation and settle the flow.
    pub async fn confirm(&mut self, page: &mut CheckoutPage<'_>) -> Result<Detection> {
        match page.verify_order_confirmation().await {
            Ok(detection) => {
                self.transition(FlowState::Confirmed(detection.clone()));
                Ok(detection)
            }
            Err(e) => {
                self.transition(FlowState::Failed(e.to_string()));
                Err(e)
            }
        }
    }

    async fn drive(&mut self, page: &mut CheckoutPage<'_>) -> Result<()> {
        let ctx = page.ctx;
        let driver = ctx.driver();
        let home = page.target.home().clone();
        info!("Starting {} payment", self.profile.id);

        wait::wait_for_attached(
            driver,
            &Scope::page(&home),
            &Locator::css(WIDGET_FRAME),
            self.profile.widget_timeout,
        )
        .await?;
        self.transition(FlowState::WidgetLocated);

        let widget = page.widget();
        if let Some(tile) = &self.profile.method_tile {
            let more = Locator::text(TextMatch::exact(MORE_PAYMENT_METHODS));
            click_visible(driver, &widget, &more, ctx.config.element_timeout()).await?;
            click_visible(driver, &widget, tile, ctx.config.element_timeout()).await?;
            info!("Selected {} payment method", self.profile.id);
        }

        let data = ctx.fixtures.checkout_data().await?;
        for field in &self.profile.fields {
            fill_visible(
                driver,
                &widget,
                &field.locator,
                data.value(field.key),
                ctx.config.element_timeout(),
            )
            .await?;
        }
        if !self.profile.card_fields.is_empty() {
            let card = widget.descend(CARD_FRAME);
            for field in &self.profile.card_fields {
                fill_visible(driver, &card, &field.locator, data.value(field.key), CARD_FIELD_TIMEOUT)
                    .await?;
            }
        }
        self.transition(FlowState::FieldsFilled);

        ensure_checked(driver, &widget, &terms_checkbox(), TERMS_TIMEOUT).await?;

        match self.profile.submission.clone() {
            Submission::InPlace { advance_timeout } => {
                click_visible(driver, &widget, &self.profile.submit_button, IN_PLACE_SUBMIT_TIMEOUT).await?;
                info!("Clicked Pay");
                self.transition(FlowState::Submitted);
                wait_for_advance(ctx, &home, advance_timeout).await?;
            }
            Submission::Popup(popup) => {
                let known = driver.tabs().await?;
                click_visible(driver, &widget, &self.profile.submit_button, ctx.config.element_timeout())
                    .await?;
                self.transition(FlowState::Submitted);

                let popup_tab = wait::wait_for_new_tab(driver, &known, popup.open_timeout).await?;
                info!("{} popup opened", self.profile.id);
                page.target.switch_to(popup_tab.clone());
                self.transition(FlowState::ExternalRedirect(popup_tab.clone()));

                // control returns home whether or not the popup flow finished
                let outcome = run_popup(ctx, &popup_tab, &popup).await;
                page.target.restore();
                outcome?;
            }
        }
        Ok(())
    }
}

/// Soft race between the "complete" action button and a confirmation URL.
async fn wait_for_advance(ctx: &PageContext, tab: &TabId, timeout: Duration) -> Result<()> {
    let conditions = [
        Condition::Visible {
            scope: Scope::page(tab),
            locator: Locator::css(COMPLETE_ACTION_BUTTON),
        },
        Condition::UrlMatches {
            tab: tab.clone(),
            pattern: TextPattern::literal(ADVANCED_URL_PATTERN),
        },
    ];
    match wait::first_of(ctx.driver(), &conditions, timeout).await {
        Ok(_) => info!("Checkout flow advanced"),
        Err(CheckoutError::Timeout { .. }) => {
            warn!("Nothing detected after Pay (likely still loading), proceeding anyway")
        }
        Err(e) => return Err(e),
    }
    Ok(())
}

async fn run_popup(ctx: &PageContext, popup: &TabId, flow: &PopupFlow) -> Result<()> {
    for step in &flow.steps {
        if let Err(e) = run_popup_step(ctx, popup, step).await {
            if let Ok(text) = ctx.driver().inner_text(&Scope::page(popup)).await {
                warn!("Popup step failed; page text was:\n{}", text);
            }
            return Err(e);
        }
    }

    info!("Waiting for popup to close");
    match wait::wait_for_tab_closed(ctx.driver(), popup, flow.close_timeout).await {
        Ok(()) => info!("Popup closed"),
        Err(e @ CheckoutError::Timeout { .. }) if flow.close_required => return Err(e),
        Err(CheckoutError::Timeout { .. }) => info!("Popup did not close within {:?}", flow.close_timeout),
        Err(e) => return Err(e),
    }
    Ok(())
}

async fn run_popup_step(ctx: &PageContext, popup: &TabId, step: &PopupStep) -> Result<()> {
    let driver = ctx.driver();
    let scope = Scope::page(popup);
    match step {
        PopupStep::WaitForLoad(state) => {
            wait_for_load_state(driver, popup, *state, ctx.config.navigation_timeout()).await?;
        }
        PopupStep::Click {
            locator,
            timeout,
            required,
            force,
        } => {
            if !wait::visible_within(driver, &scope, locator, *timeout).await? {
                if *required {
                    return Err(CheckoutError::not_found(locator.to_string(), *timeout));
                }
                warn!("{} not found, checking next screen", locator);
                return Ok(());
            }
            driver.click(&scope, locator, *force).await?;
            info!("Clicked {}", locator);
        }
        PopupStep::Fill {
            locator,
            secret,
            timeout,
        } => {
            let value = ctx.secrets.get(secret)?;
            fill_visible(driver, &scope, locator, value.expose(), *timeout).await?;
            info!("Filled {}", locator);
        }
        PopupStep::ClickFirstOf {
            candidates,
            frame_url_contains,
            attempts,
            delay,
            failure_screenshot,
        } => {
            for attempt in 1..=*attempts {
                if click_candidate(ctx, popup, candidates, frame_url_contains).await? {
                    return Ok(());
                }
                info!("Pay button attempt {}/{} found nothing", attempt, attempts);
                if attempt < *attempts {
                    tokio::time::sleep(*delay).await;
                }
            }
            if let Err(e) = ctx.artifacts.capture(driver, popup, failure_screenshot).await {
                warn!("Could not capture screenshot: {}", e);
            }
            return Err(CheckoutError::not_found(
                format!("pay button inside {} frame", frame_url_contains),
                *delay * *attempts,
            ));
        }
        PopupStep::Pause(duration) => tokio::time::sleep(*duration).await,
    }
    Ok(())
}

async fn click_candidate(
    ctx: &PageContext,
    popup: &TabId,
    candidates: &[Locator],
    frame_url_contains: &str,
) -> Result<bool> {
    let driver = ctx.driver();
    let frames = match driver.frames(popup).await {
        Ok(frames) => frames,
        Err(e) if e.is_transient() => return Ok(false),
        Err(e) => return Err(e),
    };
    let Some(frame) = frames.into_iter().find(|f| f.url.contains(frame_url_contains)) else {
        info!("{} frame not found yet", frame_url_contains);
        return Ok(false);
    };

    let scope = Scope::frame(popup, frame.path);
    for candidate in candidates {
        if wait::is_visible(driver, &scope, candidate).await? {
            match driver.click(&scope, candidate, false).await {
                Ok(()) => {
                    info!("Clicked {}", candidate);
                    return Ok(true);
                }
                Err(e) if e.is_transient() || matches!(e, CheckoutError::NotInteractable(_)) => {
                    warn!("Click on {} failed: {}", candidate, e)
                }
                Err(e) => return Err(e),
            }
        }
    }
    Ok(false)
}
