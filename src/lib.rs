pub mod browser;
pub mod core;
pub mod detector;
pub mod errors;
pub mod fixtures;
pub mod locator;
pub mod pages;
pub mod steps;
pub mod target;
pub mod testing;
pub mod utils;
pub mod wait;

pub use crate::core::{BrowserDriver, Config, Scope, TabId};
pub use detector::{Detection, Detector, Strategy};
pub use errors::{CheckoutError, Result};
pub use locator::{Locator, TextMatch, TextPattern};
pub use pages::{CheckoutPage, PageContext, PaymentFlow, ProviderId};
pub use steps::{RunReport, Runner, StepRegistry};
pub use target::ActiveTarget;
