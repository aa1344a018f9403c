use checkout_e2e::core::BrowserDriver;
use checkout_e2e::errors::CheckoutError;
use checkout_e2e::pages::checkout::{MORE_PAYMENT_METHODS, WIDGET_FRAME};
use checkout_e2e::pages::providers::{self, PAYPAL_TILE};
use checkout_e2e::pages::{CheckoutPage, FlowState, PageContext, PaymentFlow, ProviderId, ProviderProfile};
use checkout_e2e::target::ActiveTarget;
use checkout_e2e::testing::{scenes, Effect, FakeBrowser, FakeElement, FakeFrame, FakePage, InteractionKind};
use std::sync::Arc;
use tempfile::TempDir;

struct Harness {
    browser: Arc<FakeBrowser>,
    ctx: PageContext,
    target: ActiveTarget,
    _dir: TempDir,
}

async fn harness(page: FakePage) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let browser = Arc::new(FakeBrowser::new());
    let home = browser.open_page(page).await;
    let ctx = scenes::context(browser.clone(), dir.path());
    Harness {
        browser,
        ctx,
        target: ActiveTarget::new(home),
        _dir: dir,
    }
}

#[tokio::test(start_paused = true)]
async fn card_payment_through_test_method_is_confirmed() {
    let mut h = harness(scenes::checkout_page(ProviderId::Card)).await;
    let home = h.target.home().clone();
    let mut page = CheckoutPage::new(&h.ctx, &mut h.target);

    let mut flow = page.pay_with(ProviderId::Card).await.unwrap();
    assert_eq!(
        flow.history(),
        ["idle", "widget-located", "fields-filled", "submitted"]
    );

    page.confirm_test_payment().await.unwrap();
    assert!(!page.target().is_on_home());

    let detection = flow.confirm(&mut page).await.unwrap();
    assert_eq!(detection.extracted.as_deref(), Some(scenes::ORDER_NUMBER));
    assert_eq!(detection.scope, format!("frame {}", scenes::WIDGET_URL));
    assert!(matches!(flow.state(), FlowState::Confirmed(_)));
    assert_eq!(page.target().current(), &home);

    // card inputs live two frames deep
    let card_fill = h
        .browser
        .interactions()
        .await
        .into_iter()
        .find(|i| i.kind == InteractionKind::Fill && i.value.as_deref() == Some("4242 4242 4242 4242"))
        .expect("card number filled");
    assert_eq!(card_fill.frame.0.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn wallet_popup_hands_control_back_to_home() {
    for provider in [
        ProviderId::GooglePay,
        ProviderId::PayPal,
        ProviderId::PayPalSubscription,
        ProviderId::NaverPay,
    ] {
        let mut h = harness(scenes::checkout_page(provider)).await;
        let home = h.target.home().clone();
        let mut page = CheckoutPage::new(&h.ctx, &mut h.target);

        let mut flow = page.pay_with(provider).await.unwrap();
        assert_eq!(
            &flow.history()[flow.history().len() - 2..],
            ["submitted", "external-redirect"],
            "{}",
            provider
        );
        assert!(matches!(flow.state(), FlowState::ExternalRedirect(_)));
        assert!(page.target().is_on_home());

        // the popup closed itself once payment went through
        assert_eq!(h.browser.tab_ids().await, vec![home.clone()]);

        let detection = flow.confirm(&mut page).await.unwrap();
        assert_eq!(detection.extracted.as_deref(), Some(scenes::ORDER_NUMBER), "{}", provider);
    }
}

#[tokio::test(start_paused = true)]
async fn paypal_credentials_come_from_secrets() {
    let mut h = harness(scenes::checkout_page(ProviderId::PayPalSubscription)).await;
    let mut page = CheckoutPage::new(&h.ctx, &mut h.target);
    page.pay_with(ProviderId::PayPalSubscription).await.unwrap();

    let filled: Vec<String> = h
        .browser
        .interactions()
        .await
        .into_iter()
        .filter(|i| i.kind == InteractionKind::Fill)
        .filter_map(|i| i.value)
        .collect();
    assert!(filled.contains(&"buyer@paypal.test".to_string()));
    assert!(filled.contains(&"sandbox-password".to_string()));
    // billing fields of the subscription form
    assert!(filled.contains(&"1 Test Street".to_string()));
    assert!(filled.contains(&"07000000000".to_string()));
}

#[tokio::test(start_paused = true)]
async fn bancontact_submits_in_place() {
    let mut h = harness(scenes::checkout_page(ProviderId::Bancontact)).await;
    let mut page = CheckoutPage::new(&h.ctx, &mut h.target);

    let mut flow = page.pay_with(ProviderId::Bancontact).await.unwrap();
    assert!(!flow.profile().opens_popup());
    assert_eq!(h.browser.tab_ids().await.len(), 1);
    assert!(h.browser.element("method-tile").await.unwrap().checked == Some(true));

    let detection = flow.confirm(&mut page).await.unwrap();
    assert_eq!(detection.strategy, "Order Complete heading");
}

#[tokio::test(start_paused = true)]
async fn terms_are_accepted_exactly_once() {
    let mut h = harness(scenes::checkout_page(ProviderId::Card)).await;
    let page = CheckoutPage::new(&h.ctx, &mut h.target);

    assert!(page.ensure_terms_accepted().await.unwrap());
    assert!(page.ensure_terms_accepted().await.unwrap());
    assert_eq!(h.browser.element("terms").await.unwrap().checked, Some(true));
}

#[tokio::test(start_paused = true)]
async fn missing_widget_fails_the_flow() {
    let mut h = harness(FakePage::new(scenes::CHECKOUT_URL)).await;
    let mut page = CheckoutPage::new(&h.ctx, &mut h.target);

    let err = page.pay_with(ProviderId::Card).await.unwrap_err();
    assert!(matches!(err, CheckoutError::ElementNotFound { .. }));
}

fn paypal_widget(continue_button: FakeElement) -> FakePage {
    FakePage::new(scenes::CHECKOUT_URL).with_frame(
        FakeFrame::new(WIDGET_FRAME, scenes::WIDGET_URL)
            .with(FakeElement::new("email").css(providers::EMAIL_INPUT))
            .with(FakeElement::new("name").css(providers::NAME_INPUT))
            .with(FakeElement::new("zip").css(providers::ZIP_INPUT))
            .with(FakeElement::new("more").text(MORE_PAYMENT_METHODS))
            .with(FakeElement::new("tile").css(PAYPAL_TILE).with_checked(false))
            .with(continue_button),
    )
}

fn widget_with_dead_continue() -> FakePage {
    paypal_widget(FakeElement::new("continue").role("button", "Continue"))
}

#[tokio::test(start_paused = true)]
async fn popup_that_never_opens_is_reported() {
    let mut h = harness(widget_with_dead_continue()).await;
    let mut page = CheckoutPage::new(&h.ctx, &mut h.target);

    let mut flow = PaymentFlow::new(ProviderProfile::for_provider(ProviderId::PayPal));
    let err = flow.submit(&mut page).await.unwrap_err();
    assert!(matches!(err, CheckoutError::PopupNotOpened(_)));
    assert!(matches!(flow.state(), FlowState::Failed(_)));
    assert!(page.target().is_on_home());
}

#[tokio::test(start_paused = true)]
async fn popup_closing_early_returns_control_home() {
    // the provider window disappears after the login name, before any password prompt
    let popup = FakePage::new("https://www.paypal.test/checkoutnow")
        .with(FakeElement::new("paypal-email").role("textbox", "Email or mobile number"))
        .with(FakeElement::new("paypal-next").role("button", "Next").on_click(Effect::CloseTab));
    let continue_button = FakeElement::new("continue")
        .role("button", "Continue")
        .on_click(Effect::OpenPopup(popup));
    let mut h = harness(paypal_widget(continue_button)).await;
    let mut page = CheckoutPage::new(&h.ctx, &mut h.target);

    let mut flow = PaymentFlow::new(ProviderProfile::for_provider(ProviderId::PayPal));
    assert!(flow.submit(&mut page).await.is_err());
    assert!(matches!(flow.state(), FlowState::Failed(_)));
    assert!(flow.history().contains(&"external-redirect"));

    // the failure screenshot is taken from a tab that still exists
    assert!(page.target().is_on_home());
    let current = page.target().current().clone();
    assert!(h.browser.screenshot(&current).await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn missing_confirmation_leaves_one_screenshot() {
    // Pay reveals nothing, so no strategy ever matches
    let page = FakePage::new(scenes::CHECKOUT_URL).with_frame(
        FakeFrame::new(WIDGET_FRAME, scenes::WIDGET_URL).with_text("Processing your payment"),
    );
    let mut h = harness(page).await;
    let mut checkout = CheckoutPage::new(&h.ctx, &mut h.target);

    let err = checkout.verify_order_confirmation().await.unwrap_err();
    match err {
        CheckoutError::DetectionExhausted { screenshot, .. } => {
            let path = screenshot.expect("screenshot path");
            assert!(path.exists());
            assert!(path
                .file_name()
                .unwrap()
                .to_string_lossy()
                .starts_with("order-complete-missing-"));
        }
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(h.browser.screenshot_count().await, 1);
}

#[tokio::test(start_paused = true)]
async fn google_pay_tile_gets_selected() {
    let mut h = harness(scenes::checkout_page(ProviderId::GooglePay)).await;
    let mut page = CheckoutPage::new(&h.ctx, &mut h.target);

    page.confirm_google_pay_selected().await.unwrap();
    assert_eq!(h.browser.element("method-tile").await.unwrap().checked, Some(true));

    // already selected: no further click
    let clicks_before = h.browser.interactions().await.len();
    page.confirm_google_pay_selected().await.unwrap();
    let clicks: Vec<_> = h.browser.interactions().await[clicks_before..]
        .iter()
        .filter(|i| i.kind == InteractionKind::Click)
        .cloned()
        .collect();
    assert!(clicks.is_empty());
}
