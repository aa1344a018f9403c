use super::world::ScenarioWorld;
use crate::core::config::Secrets;
use crate::errors::{CheckoutError, Result};
use crate::pages::{CheckoutPage, PackageKind, PaymentFlow, ProviderId, ProviderProfile};
use regex::{Captures, Regex};
use tracing::info;

/// What a scenario step asks the page objects to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepAction {
    OpenLoginPage,
    LoginWithValidCredentials,
    NavigateToCreatorPanel,
    OpenWebstoreHome,
    SelectSidebarPackages,
    AddPackage(PackageKind),
    ProceedToCheckout,
    CompletePayment(ProviderId),
    ConfirmTestPayment,
    VerifyOrderConfirmation,
    EnterCreatorCode,
    EnterCoupon,
    ConfirmGooglePaySelected,
}

type Builder = fn(&Captures) -> Option<StepAction>;

pub struct StepDefinition {
    pattern: Regex,
    description: &'static str,
    build: Builder,
}

impl StepDefinition {
    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    pub fn description(&self) -> &'static str {
        self.description
    }
}

/// Maps step phrases to [`StepAction`]s.
pub struct StepRegistry {
    definitions: Vec<StepDefinition>,
}

impl StepRegistry {
    pub fn new() -> Self {
        Self {
            definitions: Vec::new(),
        }
    }

    pub fn register(&mut self, pattern: &str, description: &'static str, build: Builder) -> Result<()> {
        self.definitions.push(StepDefinition {
            pattern: Regex::new(pattern)?,
            description,
            build,
        });
        Ok(())
    }

    /// Registry with every storefront step.
    pub fn storefront() -> Result<Self> {
        let mut registry = Self::new();
        registry.register(r"^I am on the login page$", "Open the creator panel login page", |_| {
            Some(StepAction::OpenLoginPage)
        })?;
        registry.register(
            r"^I login with valid credentials$",
            "Log in with USERNAME / PASSWORD",
            |_| Some(StepAction::LoginWithValidCredentials),
        )?;
        registry.register(
            r"^I am able to navigate to the creator panel dashboard$",
            "Open Projects and expect the Revenue Report",
            |_| Some(StepAction::NavigateToCreatorPanel),
        )?;
        registry.register(
            r"^I am on the Universal Webstore Homepage$",
            "Open WEBSTORE_URL",
            |_| Some(StepAction::OpenWebstoreHome),
        )?;
        registry.register(
            r"^I select Packages from the sidebar$",
            "Open the packages category",
            |_| Some(StepAction::SelectSidebarPackages),
        )?;
        registry.register(
            r"^I add an? (.+) Package to the basket$",
            "Add a Full Price, Subscription, GiftCard or Sale package",
            |caps| PackageKind::from_phrase(&caps[1]).map(StepAction::AddPackage),
        )?;
        registry.register(r"^I proceed to checkout$", "Open the basket and check out", |_| {
            Some(StepAction::ProceedToCheckout)
        })?;
        registry.register(
            r"^I complete the (.+) payment details and click Pay$",
            "Fill the checkout widget for a provider and submit",
            |caps| ProviderId::from_phrase(&caps[1]).map(StepAction::CompletePayment),
        )?;
        registry.register(r"^confirm Test Payment$", "Complete the sandbox payment", |_| {
            Some(StepAction::ConfirmTestPayment)
        })?;
        registry.register(
            r"^I am displayed a purchase confirmation message$",
            "Detect the order confirmation",
            |_| Some(StepAction::VerifyOrderConfirmation),
        )?;
        registry.register(r"^I enter a valid creator code$", "Apply the creator code", |_| {
            Some(StepAction::EnterCreatorCode)
        })?;
        registry.register(r"^I enter a valid coupon$", "Apply the coupon", |_| {
            Some(StepAction::EnterCoupon)
        })?;
        registry.register(
            r"^confirm Google Pay is selected$",
            "Ensure Google Pay is the selected method",
            |_| Some(StepAction::ConfirmGooglePaySelected),
        )?;
        Ok(registry)
    }

    pub fn resolve(&self, text: &str) -> Result<StepAction> {
        let text = text.trim();
        self.definitions
            .iter()
            .find_map(|def| def.pattern.captures(text).and_then(|caps| (def.build)(&caps)))
            .ok_or_else(|| CheckoutError::UndefinedStep(text.to_string()))
    }

    pub fn definitions(&self) -> &[StepDefinition] {
        &self.definitions
    }
}

impl Default for StepRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl StepAction {
    pub async fn run(&self, world: &mut ScenarioWorld) -> Result<()> {
        match self {
            StepAction::OpenLoginPage => world.login().goto().await,
            StepAction::LoginWithValidCredentials => {
                let username = world.ctx.secrets.get(Secrets::USERNAME)?.clone();
                let password = world.ctx.secrets.get(Secrets::PASSWORD)?.clone();
                world.login().login(username.expose(), password.expose()).await
            }
            StepAction::NavigateToCreatorPanel => {
                let login = world.login();
                login.navigate_to_creator_panel().await?;
                if !login.is_revenue_report_visible().await? {
                    return Err(CheckoutError::AssertionFailed(
                        "navigation failed, \"Revenue Report\" not visible on page".to_string(),
                    ));
                }
                Ok(())
            }
            StepAction::OpenWebstoreHome => {
                let url = world.ctx.config.storefront.webstore_url.clone();
                world.webstore().goto_home(&url).await
            }
            StepAction::SelectSidebarPackages => world.webstore().select_sidebar_packages().await,
            StepAction::AddPackage(kind) => world.webstore().add_package(*kind).await,
            StepAction::ProceedToCheckout => world.webstore().proceed_to_checkout().await,
            StepAction::CompletePayment(provider) => {
                let mut flow = PaymentFlow::new(ProviderProfile::for_provider(*provider));
                let result = {
                    let mut page = CheckoutPage::new(&world.ctx, &mut world.target);
                    flow.submit(&mut page).await
                };
                info!("{} flow ended in {}", provider, flow.state().name());
                world.flow = Some(flow);
                result
            }
            StepAction::ConfirmTestPayment => world.checkout().confirm_test_payment().await,
            StepAction::VerifyOrderConfirmation => {
                let detection = match world.flow.take() {
                    Some(mut flow) => {
                        let result = {
                            let mut page = CheckoutPage::new(&world.ctx, &mut world.target);
                            flow.confirm(&mut page).await
                        };
                        world.flow = Some(flow);
                        result?
                    }
                    None => world.checkout().verify_order_confirmation().await?,
                };
                if let Some(order) = &detection.extracted {
                    info!("Order number {}", order);
                }
                world.last_detection = Some(detection);
                Ok(())
            }
            StepAction::EnterCreatorCode => {
                world.last_detection = Some(world.checkout().enter_creator_code().await?);
                Ok(())
            }
            StepAction::EnterCoupon => {
                world.last_detection = Some(world.checkout().enter_coupon().await?);
                Ok(())
            }
            StepAction::ConfirmGooglePaySelected => world.checkout().confirm_google_pay_selected().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_every_storefront_phrase() {
        let registry = StepRegistry::storefront().unwrap();
        let cases = [
            ("I am on the login page", StepAction::OpenLoginPage),
            ("I add a GiftCard Package to the basket", StepAction::AddPackage(PackageKind::GiftCard)),
            ("I add a Full Price Package to the basket", StepAction::AddPackage(PackageKind::FullPrice)),
            (
                "I complete the package payment details and click Pay",
                StepAction::CompletePayment(ProviderId::Card),
            ),
            (
                "I complete the PayPal subscription package payment details and click Pay",
                StepAction::CompletePayment(ProviderId::PayPalSubscription),
            ),
            (
                "I complete the BanContact package payment details and click Pay",
                StepAction::CompletePayment(ProviderId::Bancontact),
            ),
            ("confirm Google Pay is selected", StepAction::ConfirmGooglePaySelected),
            ("  I am displayed a purchase confirmation message ", StepAction::VerifyOrderConfirmation),
        ];
        for (phrase, expected) in cases {
            assert_eq!(registry.resolve(phrase).unwrap(), expected, "{}", phrase);
        }
    }

    #[test]
    fn unknown_phrases_are_undefined() {
        let registry = StepRegistry::storefront().unwrap();
        for phrase in [
            "I complete the Klarna package payment details and click Pay",
            "I add a Bundle Package to the basket",
            "I dance",
        ] {
            assert!(matches!(
                registry.resolve(phrase),
                Err(CheckoutError::UndefinedStep(_))
            ));
        }
    }
}
