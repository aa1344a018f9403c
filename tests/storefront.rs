use checkout_e2e::core::BrowserDriver;
use checkout_e2e::errors::CheckoutError;
use checkout_e2e::pages::{CheckoutPage, LoginPage, PackageKind, WebstorePage};
use checkout_e2e::target::ActiveTarget;
use checkout_e2e::testing::{scenes, FakeBrowser, FakePage, InteractionKind};
use std::sync::Arc;

async fn storefront() -> Arc<FakeBrowser> {
    let browser = Arc::new(FakeBrowser::new());
    browser.route(scenes::WEBSTORE_URL, scenes::webstore_home()).await;
    browser.route(scenes::CATEGORY_URL, scenes::category_page()).await;
    browser.route(scenes::LOGIN_URL, scenes::login_page()).await;
    browser.route(scenes::DASHBOARD_URL, scenes::dashboard_page()).await;
    browser.route(scenes::PROJECTS_URL, scenes::projects_page()).await;
    browser
}

#[tokio::test(start_paused = true)]
async fn browse_to_checkout_with_each_package() {
    for kind in [
        PackageKind::FullPrice,
        PackageKind::Subscription,
        PackageKind::GiftCard,
        PackageKind::Sale,
    ] {
        let dir = tempfile::tempdir().unwrap();
        let browser = storefront().await;
        let ctx = scenes::context(browser.clone(), dir.path());
        let tab = browser.new_tab().await.unwrap();
        let store = WebstorePage::new(&ctx, &tab);

        store.goto_home(scenes::WEBSTORE_URL).await.unwrap();
        store.select_sidebar_packages().await.unwrap();
        store.add_package(kind).await.unwrap();
        store.proceed_to_checkout().await.unwrap();

        assert_eq!(browser.url(&tab).await.unwrap(), scenes::CHECKOUT_URL, "{}", kind);
    }
}

#[tokio::test(start_paused = true)]
async fn gift_card_recipient_comes_from_fixture() {
    let dir = tempfile::tempdir().unwrap();
    let browser = storefront().await;
    let ctx = scenes::context(browser.clone(), dir.path());
    tokio::fs::create_dir_all(ctx.fixtures.dir()).await.unwrap();
    tokio::fs::write(
        ctx.fixtures.dir().join("giftCardEmail.json"),
        r#"{ "giftCardEmail": "friend@shop.test" }"#,
    )
    .await
    .unwrap();

    let tab = browser.new_tab().await.unwrap();
    browser.navigate(&tab, scenes::CATEGORY_URL).await.unwrap();
    WebstorePage::new(&ctx, &tab)
        .add_package(PackageKind::GiftCard)
        .await
        .unwrap();

    let fills: Vec<_> = browser
        .interactions()
        .await
        .into_iter()
        .filter(|i| i.kind == InteractionKind::Fill)
        .collect();
    assert_eq!(fills.len(), 1);
    assert_eq!(fills[0].value.as_deref(), Some("friend@shop.test"));
    assert!(browser.element("gift-modal").await.is_none());
}

#[tokio::test(start_paused = true)]
async fn empty_basket_is_its_own_error() {
    let dir = tempfile::tempdir().unwrap();
    let browser = Arc::new(FakeBrowser::new());
    let ctx = scenes::context(browser.clone(), dir.path());
    let tab = browser.open_page(scenes::empty_basket_page()).await;

    let err = WebstorePage::new(&ctx, &tab).proceed_to_checkout().await.unwrap_err();
    assert!(matches!(err, CheckoutError::BasketEmpty));
}

#[tokio::test(start_paused = true)]
async fn missing_sidebar_link_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let browser = Arc::new(FakeBrowser::new());
    browser.route(scenes::WEBSTORE_URL, FakePage::new(scenes::WEBSTORE_URL)).await;
    let ctx = scenes::context(browser.clone(), dir.path());
    let tab = browser.new_tab().await.unwrap();
    let store = WebstorePage::new(&ctx, &tab);

    store.goto_home(scenes::WEBSTORE_URL).await.unwrap();
    let err = store.select_sidebar_packages().await.unwrap_err();
    assert!(matches!(err, CheckoutError::ElementNotFound { .. }));
}

#[tokio::test(start_paused = true)]
async fn creator_code_is_found_inside_the_widget_frame() {
    let dir = tempfile::tempdir().unwrap();
    let browser = Arc::new(FakeBrowser::new());
    let ctx = scenes::context(browser.clone(), dir.path());
    tokio::fs::create_dir_all(ctx.fixtures.dir()).await.unwrap();
    tokio::fs::write(ctx.fixtures.dir().join("creatorCode.json"), r#"{ "creatorCode": "STREAMER10" }"#)
        .await
        .unwrap();
    let home = browser.open_page(scenes::creator_code_page()).await;
    let mut target = ActiveTarget::new(home);

    let detection = CheckoutPage::new(&ctx, &mut target)
        .enter_creator_code()
        .await
        .unwrap();
    assert!(detection.scope.starts_with("frame "));

    let interactions = browser.interactions().await;
    assert!(interactions
        .iter()
        .any(|i| i.kind == InteractionKind::Fill && i.value.as_deref() == Some("STREAMER10")));
    assert!(interactions.iter().any(|i| i.kind == InteractionKind::Press));
}

#[tokio::test(start_paused = true)]
async fn coupon_falls_back_to_default_code() {
    let dir = tempfile::tempdir().unwrap();
    let browser = Arc::new(FakeBrowser::new());
    let ctx = scenes::context(browser.clone(), dir.path());
    let home = browser.open_page(scenes::coupon_page()).await;
    let mut target = ActiveTarget::new(home);

    let detection = CheckoutPage::new(&ctx, &mut target).enter_coupon().await.unwrap();
    assert_eq!(detection.strategy, "Discounts label");

    let filled: Vec<_> = browser
        .interactions()
        .await
        .into_iter()
        .filter_map(|i| (i.kind == InteractionKind::Fill).then_some(i.value).flatten())
        .collect();
    assert_eq!(filled, vec!["DEFAULTCODE".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn login_reaches_revenue_report() {
    let dir = tempfile::tempdir().unwrap();
    let browser = storefront().await;
    let ctx = scenes::context(browser.clone(), dir.path());
    let tab = browser.new_tab().await.unwrap();
    let login = LoginPage::new(&ctx, &tab);

    login.goto().await.unwrap();
    login.login("creator@shop.test", "panel-password").await.unwrap();
    assert_eq!(browser.url(&tab).await.unwrap(), scenes::DASHBOARD_URL);

    login.navigate_to_creator_panel().await.unwrap();
    assert!(login.is_revenue_report_visible().await.unwrap());
}
