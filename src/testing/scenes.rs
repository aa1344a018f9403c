//! Ready-made fake storefront pages: webstore listing, checkout widget and
//! the third-party popups each provider opens.

use super::{Effect, FakeElement, FakeFrame, FakePage};
use crate::core::config::{Config, Secrets};
use crate::core::BrowserDriver;
use crate::pages::checkout::{CREATOR_CODE_INPUT, CREATOR_CODE_SUCCESS, MORE_PAYMENT_METHODS, WIDGET_FRAME};
use crate::pages::login::{LOGIN_BUTTON, PASSWORD_INPUT, PROJECTS_LINK, USERNAME_INPUT};
use crate::pages::providers::{self, ProviderId, CARD_FRAME};
use crate::pages::webstore::{
    PackageKind, BASKET_DRAWER, GIFT_CARD_CONTINUE, GIFT_CARD_EMAIL_INPUT, GIFT_CARD_MODAL,
    SIDEBAR_PACKAGES_LINK,
};
use crate::pages::PageContext;
use std::path::Path;
use std::sync::Arc;

pub const LOGIN_URL: &str = "https://creator.test/login";
pub const DASHBOARD_URL: &str = "https://creator.test/dashboard";
pub const PROJECTS_URL: &str = "https://creator.test/projects";
pub const WEBSTORE_URL: &str = "https://shop.test/";
pub const CATEGORY_URL: &str = "https://shop.test/category/129";
pub const CHECKOUT_URL: &str = "https://shop.test/checkout/basket";
pub const TEST_PAYMENT_URL: &str = "https://checkout.tbxstage.net/testmethod/42";
pub const WIDGET_URL: &str = "https://pay.test/checkout/widget";
pub const ORDER_NUMBER: &str = "tbx-5c1f-77a2";

/// Key of the hidden confirmation heading revealed once payment completes.
pub const ORDER_COMPLETE: &str = "order-complete";

/// Page context wired to `driver`, with data and screenshots under `root`
/// and fake panel and PayPal credentials.
pub fn context(driver: Arc<dyn BrowserDriver>, root: &Path) -> PageContext {
    let mut config = Config::default();
    config.paths.data_dir = root.join("data");
    config.paths.screenshot_dir = root.join("screenshots");
    config.paths.storage_state = None;
    config.storefront.webstore_url = WEBSTORE_URL.to_string();
    config.storefront.base_url = LOGIN_URL.to_string();
    let secrets = Secrets::from_pairs([
        (Secrets::USERNAME, "creator@shop.test"),
        (Secrets::PASSWORD, "panel-password"),
        (Secrets::PAYPAL_LOGIN, "buyer@paypal.test"),
        (Secrets::PAYPAL_PASSWORD, "sandbox-password"),
    ]);
    PageContext::new(driver, Arc::new(config), Arc::new(secrets))
}

fn completes_order() -> Vec<Effect> {
    vec![
        Effect::Reveal(ORDER_COMPLETE.to_string()),
        Effect::Reveal("order-number".to_string()),
    ]
}

fn tile_selector(provider: ProviderId) -> Option<&'static str> {
    match provider {
        ProviderId::Card => None,
        ProviderId::GooglePay => Some(providers::GPAY_TILE),
        ProviderId::PayPal | ProviderId::PayPalSubscription => Some(providers::PAYPAL_TILE),
        ProviderId::NaverPay => Some(providers::NAVERPAY_TILE),
        ProviderId::Bancontact => Some(providers::BANCONTACT_TILE),
    }
}

/// Checkout widget frame for `provider`, with the confirmation hidden.
pub fn checkout_widget(provider: ProviderId) -> FakeFrame {
    let mut widget = FakeFrame::new(WIDGET_FRAME, WIDGET_URL)
        .with(FakeElement::new("email").css(providers::EMAIL_INPUT))
        .with(FakeElement::new("name").css(providers::NAME_INPUT))
        .with(FakeElement::new("zip").css(providers::ZIP_INPUT))
        .with(FakeElement::new("terms").checkbox("I agree to Tebex's Terms & Conditions", false))
        .with(
            FakeElement::new(ORDER_COMPLETE)
                .role("heading", "Order Complete")
                .hidden(),
        )
        .with(
            FakeElement::new("order-number")
                .text(format!("Order number {}", ORDER_NUMBER))
                .hidden(),
        );

    if let Some(tile) = tile_selector(provider) {
        widget = widget
            .with(FakeElement::new("more-methods").text(MORE_PAYMENT_METHODS))
            .with(FakeElement::new("method-tile").css(tile).text(provider.to_string()).with_checked(false));
    }
    if provider == ProviderId::PayPalSubscription {
        widget = widget
            .with(FakeElement::new("address").css(providers::ADDRESS_INPUT))
            .with(FakeElement::new("city").css(providers::CITY_INPUT))
            .with(FakeElement::new("state").css(providers::STATE_INPUT))
            .with(FakeElement::new("phone").css(providers::PHONE_INPUT));
    }

    match provider {
        ProviderId::Card => widget
            .with(
                FakeElement::new("pay")
                    .role("button", "Pay")
                    .on_click(Effect::Reveal("advance".to_string()))
                    .on_click(Effect::OpenPopup(test_payment_page())),
            )
            .with_frame(
                FakeFrame::new(CARD_FRAME, "https://cards.test/fields")
                    .with(FakeElement::new("card-number").role("textbox", "Card number"))
                    .with(FakeElement::new("expiry").role("textbox", "Expiry date"))
                    .with(FakeElement::new("cvc").role("textbox", "CVV / CVC")),
            ),
        ProviderId::Bancontact => widget.with(
            FakeElement::new("pay")
                .role("button", "Pay")
                .on_click(Effect::Reveal("advance".to_string()))
                .on_click(Effect::Reveal(ORDER_COMPLETE.to_string())),
        ),
        ProviderId::GooglePay => widget.with(continue_button(google_pay_popup())),
        ProviderId::PayPal | ProviderId::PayPalSubscription => {
            widget.with(continue_button(paypal_popup()))
        }
        ProviderId::NaverPay => widget.with(continue_button(naver_pay_popup())),
    }
}

fn continue_button(popup: FakePage) -> FakeElement {
    FakeElement::new("continue")
        .role("button", "Continue")
        .on_click(Effect::OpenPopup(popup))
}

/// Basket page hosting the checkout widget for `provider`.
pub fn checkout_page(provider: ProviderId) -> FakePage {
    FakePage::new(CHECKOUT_URL)
        .with(
            FakeElement::new("advance")
                .css(providers::COMPLETE_ACTION_BUTTON)
                .hidden(),
        )
        .with_frame(checkout_widget(provider))
}

/// Sandbox page that completes a card payment.
pub fn test_payment_page() -> FakePage {
    let mut complete = FakeElement::new("complete-payment")
        .css("button")
        .css(".btn.btn-success")
        .text("Complete Payment")
        .on_click(Effect::Reveal("payment-complete".to_string()));
    for effect in completes_order() {
        complete = complete.on_click(effect);
    }
    FakePage::new(TEST_PAYMENT_URL)
        .with(complete)
        .with(FakeElement::new("payment-complete").text("Test Payment Complete").hidden())
}

fn finishing(element: FakeElement) -> FakeElement {
    completes_order()
        .into_iter()
        .fold(element, FakeElement::on_click)
        .on_click(Effect::CloseTab)
}

pub fn google_pay_popup() -> FakePage {
    FakePage::new("https://pay.google.test/gp/checkout")
        .with(FakeElement::new("buy-with").role("button", "Buy with GPay"))
        .with_frame(
            FakeFrame::new("iframe", "https://pay.google.com/gp/p/ui/pay")
                .with(finishing(FakeElement::new("gpay-pay").css(".VfPpkd-RLmnJb").text("Pay"))),
        )
}

pub fn paypal_popup() -> FakePage {
    FakePage::new("https://www.paypal.test/checkoutnow")
        .with(FakeElement::new("paypal-email").role("textbox", "Email or mobile number"))
        .with(FakeElement::new("paypal-next").role("button", "Next"))
        .with(FakeElement::new("paypal-password").role("textbox", "Password").appears_after(2))
        .with(FakeElement::new("paypal-login").role("button", "Log In"))
        .with(finishing(
            FakeElement::new("paypal-submit")
                .test_id("submit-button-initial")
                .text("Complete Purchase"),
        ))
}

pub fn naver_pay_popup() -> FakePage {
    FakePage::new("https://naver.test/pay/confirm").with(finishing(
        FakeElement::new("naver-confirm")
            .css(r#"button, [role="button"]"#)
            .text("Confirm & Pay"),
    ))
}

/// Page with the creator code input inside a nested frame.
pub fn creator_code_page() -> FakePage {
    FakePage::new(CHECKOUT_URL).with_frame(
        FakeFrame::new(WIDGET_FRAME, WIDGET_URL)
            .with(FakeElement::new("creator-code").css(CREATOR_CODE_INPUT))
            .with(FakeElement::new("creator-apply").role("button", "Apply").rejects_clicks(1).on_click(
                Effect::Reveal("creator-success".to_string()),
            ))
            .with(
                FakeElement::new("creator-success")
                    .css(CREATOR_CODE_SUCCESS)
                    .css(".creator-code-success")
                    .text("Creator code applied")
                    .hidden(),
            ),
    )
}

/// Checkout page whose widget supports coupons.
pub fn coupon_page() -> FakePage {
    FakePage::new(CHECKOUT_URL).with_frame(
        FakeFrame::new(WIDGET_FRAME, WIDGET_URL)
            .with(FakeElement::new("coupon").role("textbox", "Coupon/Gift Card"))
            .with(
                FakeElement::new("coupon-confirm")
                    .role("button", "Confirm")
                    .on_click(Effect::Reveal("discounts".to_string())),
            )
            .with(FakeElement::new("discounts").text("Discounts: -10%").hidden()),
    )
}

/// Webstore home with the sidebar link to the packages category.
pub fn webstore_home() -> FakePage {
    FakePage::new(WEBSTORE_URL).with(
        FakeElement::new("sidebar-packages")
            .css(SIDEBAR_PACKAGES_LINK)
            .text("Packages")
            .on_click(Effect::Navigate(CATEGORY_URL.to_string())),
    )
}

fn basket_ready() -> Vec<Effect> {
    vec![
        Effect::Reveal("drawer".to_string()),
        Effect::Reveal("proceed".to_string()),
    ]
}

/// Category listing; adding any package opens the basket drawer. The gift
/// card tile first asks for a recipient email.
pub fn category_page() -> FakePage {
    let mut page = FakePage::new(CATEGORY_URL)
        .with(FakeElement::new("drawer").css(BASKET_DRAWER).hidden())
        .with(
            FakeElement::new("proceed")
                .role("button", "Proceed to checkout")
                .hidden()
                .on_click(Effect::Navigate(CHECKOUT_URL.to_string())),
        );

    for kind in [PackageKind::FullPrice, PackageKind::Subscription, PackageKind::Sale] {
        let tile = basket_ready().into_iter().fold(
            FakeElement::new(format!("tile-{}", kind)).css(kind.tile_selector()),
            FakeElement::on_click,
        );
        page = page.with(tile);
    }

    let gift_continue = basket_ready().into_iter().fold(
        FakeElement::new("gift-continue")
            .css(GIFT_CARD_CONTINUE)
            .text("Continue")
            .hidden()
            .on_click(Effect::Remove("gift-modal".to_string())),
        FakeElement::on_click,
    );
    page.with(
        FakeElement::new("tile-gift")
            .css(PackageKind::GiftCard.tile_selector())
            .on_click(Effect::Reveal("gift-modal".to_string()))
            .on_click(Effect::Reveal("gift-email".to_string()))
            .on_click(Effect::Reveal("gift-continue".to_string())),
    )
    .with(FakeElement::new("gift-modal").css(GIFT_CARD_MODAL).hidden())
    .with(FakeElement::new("gift-email").css(GIFT_CARD_EMAIL_INPUT).hidden())
    .with(gift_continue)
}

/// Category page whose basket drawer is open but empty.
pub fn empty_basket_page() -> FakePage {
    FakePage::new(CATEGORY_URL)
        .with(FakeElement::new("drawer").css(BASKET_DRAWER))
        .with(FakeElement::new("empty").text("Your basket is empty"))
}

/// Creator panel login form; submitting it lands on the dashboard.
pub fn login_page() -> FakePage {
    FakePage::new(LOGIN_URL)
        .with(FakeElement::new("username").css(USERNAME_INPUT))
        .with(FakeElement::new("password").css(PASSWORD_INPUT))
        .with(
            FakeElement::new("login")
                .css(LOGIN_BUTTON)
                .text("Login")
                .on_click(Effect::Navigate(DASHBOARD_URL.to_string())),
        )
}

/// Dashboard whose sidebar Projects link opens the revenue overview.
pub fn dashboard_page() -> FakePage {
    FakePage::new(DASHBOARD_URL).with(
        FakeElement::new("projects")
            .css(PROJECTS_LINK)
            .text("Projects")
            .on_click(Effect::Navigate(PROJECTS_URL.to_string())),
    )
}

pub fn projects_page() -> FakePage {
    FakePage::new(PROJECTS_URL).with(FakeElement::new("revenue").role("heading", "Revenue Report"))
}
