//! Per-provider configuration records for the payment flow.
//!
//! Every payment method runs through the same [`super::flow::PaymentFlow`];
//! what differs (method tile, form fields, how submission completes, what to
//! do inside a popup) is data in a [`ProviderProfile`].

use crate::browser::navigation::LoadState;
use crate::core::config::Secrets;
use crate::fixtures::FieldKey;
use crate::locator::{Locator, TextMatch};
use std::fmt;
use std::time::Duration;

pub const EMAIL_INPUT: &str = "#email";
pub const NAME_INPUT: &str = r#"input[name*="name" i]"#;
pub const ZIP_INPUT: &str = r#"input[name*="zip" i], input[name*="postal" i]"#;
pub const ADDRESS_INPUT: &str = r#"input[name*="sender_address_line1" i]"#;
pub const CITY_INPUT: &str = r#"input[name*="city" i]"#;
pub const STATE_INPUT: &str = r#"input[name*="state" i]"#;
pub const PHONE_INPUT: &str = r#"input[name*="phone" i]"#;

/// Frame inside the widget that hosts the card inputs.
pub const CARD_FRAME: &str = "#app iframe";

pub const GPAY_TILE: &str = r#"div.payment-methods .v-card:has(img[src*="gpay"])"#;
pub const PAYPAL_TILE: &str = r#"div.payment-methods .v-card:has(img[src*="paypal"])"#;
pub const NAVERPAY_TILE: &str = r#"div.payment-methods .v-card:has(img[src*="naverpay"])"#;
pub const BANCONTACT_TILE: &str = r#"div.payment-methods .v-card:has(img[src*="bancontact"])"#;

/// Marker that the checkout page moved on after an in-place submission.
pub const COMPLETE_ACTION_BUTTON: &str = r#"button.btn.btn-success[name="action"][value="complete"]"#;
pub const ADVANCED_URL_PATTERN: &str = "confirmation|success|thankyou";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderId {
    Card,
    GooglePay,
    PayPal,
    PayPalSubscription,
    NaverPay,
    Bancontact,
}

impl ProviderId {
    pub const ALL: [ProviderId; 6] = [
        ProviderId::Card,
        ProviderId::GooglePay,
        ProviderId::PayPal,
        ProviderId::PayPalSubscription,
        ProviderId::NaverPay,
        ProviderId::Bancontact,
    ];

    /// Name used in scenario phrases ("I complete the <name> payment details").
    pub fn phrase(self) -> &'static str {
        match self {
            ProviderId::Card => "package",
            ProviderId::GooglePay => "Google Pay package",
            ProviderId::PayPal => "PayPal package",
            ProviderId::PayPalSubscription => "PayPal subscription package",
            ProviderId::NaverPay => "Naver Pay package",
            ProviderId::Bancontact => "BanContact package",
        }
    }

    pub fn from_phrase(phrase: &str) -> Option<Self> {
        let phrase = phrase.trim();
        Self::ALL
            .into_iter()
            .find(|id| id.phrase().eq_ignore_ascii_case(phrase))
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProviderId::Card => "card",
            ProviderId::GooglePay => "Google Pay",
            ProviderId::PayPal => "PayPal",
            ProviderId::PayPalSubscription => "PayPal subscription",
            ProviderId::NaverPay => "Naver Pay",
            ProviderId::Bancontact => "Bancontact",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub key: FieldKey,
    pub locator: Locator,
}

impl FieldSpec {
    fn css(key: FieldKey, selector: &str) -> Self {
        Self {
            key,
            locator: Locator::css(selector),
        }
    }

    fn textbox(key: FieldKey, name: &str) -> Self {
        Self {
            key,
            locator: Locator::role("textbox", TextMatch::exact(name)),
        }
    }
}

/// One action inside a third-party popup.
#[derive(Debug, Clone)]
pub enum PopupStep {
    WaitForLoad(LoadState),
    Click {
        locator: Locator,
        timeout: Duration,
        /// Optional clicks are skipped when the element never shows up
        required: bool,
        force: bool,
    },
    Fill {
        locator: Locator,
        /// Key in [`Secrets`]
        secret: &'static str,
        timeout: Duration,
    },
    /// Retry a list of candidate buttons inside the popup frame whose URL
    /// contains `frame_url_contains`, clicking the first visible one.
    ClickFirstOf {
        candidates: Vec<Locator>,
        frame_url_contains: String,
        attempts: u32,
        delay: Duration,
        failure_screenshot: String,
    },
    Pause(Duration),
}

#[derive(Debug, Clone)]
pub struct PopupFlow {
    pub open_timeout: Duration,
    pub steps: Vec<PopupStep>,
    pub close_timeout: Duration,
    /// Whether a popup that stays open fails the flow
    pub close_required: bool,
}

#[derive(Debug, Clone)]
pub enum Submission {
    /// Submit in the widget, then race the "moved on" markers (soft).
    InPlace { advance_timeout: Duration },
    Popup(PopupFlow),
}

#[derive(Debug, Clone)]
pub struct ProviderProfile {
    pub id: ProviderId,
    /// Bound for the checkout widget iframe to attach
    pub widget_timeout: Duration,
    pub method_tile: Option<Locator>,
    pub fields: Vec<FieldSpec>,
    /// Fields inside the nested card frame
    pub card_fields: Vec<FieldSpec>,
    pub submit_button: Locator,
    pub submission: Submission,
}

fn pay_button() -> Locator {
    Locator::role("button", TextMatch::pattern("pay"))
}

fn continue_button() -> Locator {
    Locator::role("button", TextMatch::pattern("continue|pay"))
}

fn customer_fields() -> Vec<FieldSpec> {
    vec![
        FieldSpec::css(FieldKey::Email, EMAIL_INPUT),
        FieldSpec::css(FieldKey::FullName, NAME_INPUT),
        FieldSpec::css(FieldKey::ZipCode, ZIP_INPUT),
    ]
}

fn in_place() -> Submission {
    Submission::InPlace {
        advance_timeout: Duration::from_secs(15),
    }
}

fn paypal_popup() -> PopupFlow {
    let element = Duration::from_secs(10);
    PopupFlow {
        open_timeout: Duration::from_secs(30),
        steps: vec![
            PopupStep::WaitForLoad(LoadState::DomContentLoaded),
            PopupStep::Fill {
                locator: Locator::role("textbox", TextMatch::pattern("email|mobile")),
                secret: Secrets::PAYPAL_LOGIN,
                timeout: element,
            },
            PopupStep::Click {
                locator: Locator::role("button", TextMatch::pattern("next")),
                timeout: element,
                required: true,
                force: false,
            },
            PopupStep::Fill {
                locator: Locator::role("textbox", TextMatch::pattern("password")),
                secret: Secrets::PAYPAL_PASSWORD,
                timeout: element,
            },
            PopupStep::Click {
                locator: Locator::role("button", TextMatch::pattern("log in")),
                timeout: element,
                required: true,
                force: false,
            },
            PopupStep::Click {
                locator: Locator::test_id("submit-button-initial"),
                timeout: Duration::from_secs(15),
                required: true,
                force: false,
            },
        ],
        close_timeout: Duration::from_secs(30),
        close_required: true,
    }
}

fn google_pay_candidates() -> Vec<Locator> {
    let pay_text = TextMatch::pattern("Pay|Subscribe");
    let not_entry = TextMatch::contains("Buy with");
    vec![
        Locator::css(".VfPpkd-RLmnJb"),
        Locator::css(r#"div[role="button"]"#)
            .with_text(pay_text.clone())
            .without_text(not_entry.clone()),
        Locator::css("button").with_text(pay_text).without_text(not_entry),
    ]
}

impl ProviderProfile {
    pub fn for_provider(id: ProviderId) -> Self {
        match id {
            ProviderId::Card => Self {
                id,
                widget_timeout: Duration::from_secs(5),
                method_tile: None,
                fields: customer_fields(),
                card_fields: vec![
                    FieldSpec::textbox(FieldKey::CardNumber, "Card number"),
                    FieldSpec::textbox(FieldKey::ExpiryDate, "Expiry date"),
                    FieldSpec::textbox(FieldKey::Cvc, "CVV / CVC"),
                ],
                submit_button: pay_button(),
                submission: in_place(),
            },
            ProviderId::Bancontact => Self {
                id,
                widget_timeout: Duration::from_secs(20),
                method_tile: Some(Locator::css(BANCONTACT_TILE)),
                fields: customer_fields(),
                card_fields: vec![],
                submit_button: pay_button(),
                submission: in_place(),
            },
            ProviderId::GooglePay => Self {
                id,
                widget_timeout: Duration::from_secs(20),
                method_tile: Some(Locator::css(GPAY_TILE)),
                fields: customer_fields(),
                card_fields: vec![],
                submit_button: continue_button(),
                submission: Submission::Popup(PopupFlow {
                    open_timeout: Duration::from_secs(30),
                    steps: vec![
                        PopupStep::WaitForLoad(LoadState::Load),
                        PopupStep::Click {
                            locator: Locator::role("button", TextMatch::pattern("buy with")),
                            timeout: Duration::from_secs(15),
                            required: false,
                            force: true,
                        },
                        PopupStep::Pause(Duration::from_secs(5)),
                        PopupStep::ClickFirstOf {
                            candidates: google_pay_candidates(),
                            frame_url_contains: "pay.google.com".to_string(),
                            attempts: 10,
                            delay: Duration::from_secs(2),
                            failure_screenshot: "gpay_js_fail".to_string(),
                        },
                    ],
                    close_timeout: Duration::from_secs(30),
                    close_required: false,
                }),
            },
            ProviderId::PayPal => Self {
                id,
                widget_timeout: Duration::from_secs(20),
                method_tile: Some(Locator::css(PAYPAL_TILE)),
                fields: customer_fields(),
                card_fields: vec![],
                submit_button: continue_button(),
                submission: Submission::Popup(paypal_popup()),
            },
            ProviderId::PayPalSubscription => {
                let mut fields = customer_fields();
                fields.extend([
                    FieldSpec::css(FieldKey::BillingAddress, ADDRESS_INPUT),
                    FieldSpec::css(FieldKey::City, CITY_INPUT),
                    FieldSpec::css(FieldKey::State, STATE_INPUT),
                    FieldSpec::css(FieldKey::Phone, PHONE_INPUT),
                ]);
                Self {
                    id,
                    widget_timeout: Duration::from_secs(20),
                    method_tile: Some(Locator::css(PAYPAL_TILE)),
                    fields,
                    card_fields: vec![],
                    submit_button: continue_button(),
                    submission: Submission::Popup(paypal_popup()),
                }
            }
            ProviderId::NaverPay => Self {
                id,
                widget_timeout: Duration::from_secs(20),
                method_tile: Some(Locator::css(NAVERPAY_TILE)),
                fields: customer_fields(),
                card_fields: vec![],
                submit_button: continue_button(),
                submission: Submission::Popup(PopupFlow {
                    open_timeout: Duration::from_secs(30),
                    steps: vec![
                        // the popup redirects several times before settling
                        PopupStep::WaitForLoad(LoadState::NetworkIdle),
                        PopupStep::Click {
                            locator: Locator::css(r#"button, [role="button"]"#)
                                .with_text(TextMatch::pattern("confirm.*pay")),
                            timeout: Duration::from_secs(20),
                            required: true,
                            force: false,
                        },
                    ],
                    close_timeout: Duration::from_secs(30),
                    close_required: true,
                }),
            },
        }
    }

    pub fn opens_popup(&self) -> bool {
        matches!(self.submission, Submission::Popup(_))
    }
}
