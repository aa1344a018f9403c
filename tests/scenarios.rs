use base64::Engine as _;
use checkout_e2e::pages::ProviderId;
use checkout_e2e::steps::{feature, RunReport, Runner, Status, StepRegistry, TagFilter};
use checkout_e2e::testing::{scenes, FakeBrowser};
use std::sync::Arc;

const PURCHASES: &str = r#"
@checkout
Feature: Checkout

  Background:
    Given I am on the Universal Webstore Homepage
    When I select Packages from the sidebar

  @card
  Scenario: Buy a package by card
    And I add a Full Price Package to the basket
    And I proceed to checkout
    And I complete the package payment details and click Pay
    And confirm Test Payment
    Then I am displayed a purchase confirmation message

  @paypal
  Scenario: Buy a subscription with PayPal
    And I add a Subscription Package to the basket
    And I proceed to checkout
    And I complete the PayPal subscription package payment details and click Pay
    Then I am displayed a purchase confirmation message

  @wip
  Scenario: Confirmation without paying
    And I add a Sale Package to the basket
    And I proceed to checkout
    Then I am displayed a purchase confirmation message
"#;

const LOGIN: &str = r#"
Feature: Creator panel

  Scenario: Reach the dashboard
    Given I am on the login page
    When I login with valid credentials
    Then I am able to navigate to the creator panel dashboard
"#;

async fn storefront(checkout: ProviderId) -> Arc<FakeBrowser> {
    let browser = Arc::new(FakeBrowser::new());
    browser.route(scenes::WEBSTORE_URL, scenes::webstore_home()).await;
    browser.route(scenes::CATEGORY_URL, scenes::category_page()).await;
    browser.route(scenes::CHECKOUT_URL, scenes::checkout_page(checkout)).await;
    browser.route(scenes::LOGIN_URL, scenes::login_page()).await;
    browser.route(scenes::DASHBOARD_URL, scenes::dashboard_page()).await;
    browser.route(scenes::PROJECTS_URL, scenes::projects_page()).await;
    browser
}

async fn run(browser: Arc<FakeBrowser>, root: &std::path::Path, source: &str, tags: &str) -> RunReport {
    let ctx = scenes::context(browser, root);
    let runner = Runner::new(ctx, StepRegistry::storefront().unwrap())
        .with_filter(TagFilter::parse(tags).unwrap());
    runner.run(&[feature::parse(source).unwrap()]).await
}

#[tokio::test(start_paused = true)]
async fn card_purchase_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let browser = storefront(ProviderId::Card).await;

    let report = run(browser.clone(), dir.path(), PURCHASES, "@card").await;
    assert_eq!(report.scenarios.len(), 1);
    let scenario = &report.scenarios[0];
    assert_eq!(scenario.status, Status::Passed, "{:?}", scenario.failed_step());
    assert_eq!(scenario.steps.len(), 7);
    assert_eq!(scenario.tags, vec!["@checkout".to_string(), "@card".to_string()]);
    assert!(scenario.screenshot.is_none());
    assert_eq!(browser.screenshot_count().await, 0);
    assert!(browser.tab_ids().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn paypal_subscription_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let browser = storefront(ProviderId::PayPalSubscription).await;

    let report = run(browser, dir.path(), PURCHASES, "@paypal").await;
    assert!(report.success(), "{}", report.summary());
}

#[tokio::test(start_paused = true)]
async fn unconfirmed_order_fails_with_screenshot_in_report() {
    let dir = tempfile::tempdir().unwrap();
    let browser = storefront(ProviderId::Card).await;

    let report = run(browser.clone(), dir.path(), PURCHASES, "@wip").await;
    assert!(!report.success());
    let scenario = &report.scenarios[0];
    assert_eq!(scenario.status, Status::Failed);
    let failed = scenario.failed_step().unwrap();
    assert_eq!(failed.text, "I am displayed a purchase confirmation message");
    assert!(failed.error.as_deref().unwrap_or_default().contains("order-complete"));

    // one from the detector, one FAILED capture from the runner
    assert_eq!(browser.screenshot_count().await, 2);
    let attachment = &scenario.attachments[0];
    assert_eq!(attachment.mime_type, "image/png");
    assert!(base64::engine::general_purpose::STANDARD.decode(&attachment.data).is_ok());

    let path = dir.path().join("report.json");
    tokio_test::assert_ok!(report.save(&path).await);
    let saved: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(saved["scenarios"][0]["status"], "failed");
    assert_eq!(saved["scenarios"][0]["attachments"][0]["mimeType"], "image/png");
}

#[tokio::test(start_paused = true)]
async fn creator_panel_login() {
    let dir = tempfile::tempdir().unwrap();
    let browser = storefront(ProviderId::Card).await;

    let report = run(browser.clone(), dir.path(), LOGIN, "").await;
    assert!(report.success(), "{}", report.summary());
    let login_fills: Vec<_> = browser
        .interactions()
        .await
        .into_iter()
        .filter_map(|i| i.value)
        .filter(|v| v == "creator@shop.test" || v == "panel-password")
        .collect();
    assert_eq!(login_fills.len(), 2);
}
