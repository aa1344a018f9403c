use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CheckoutError {
    #[error("Browser launch failed: {0}")]
    LaunchFailed(String),

    #[error("Tab creation failed: {0}")]
    TabCreationFailed(String),

    #[error("Tab {0} is closed or unknown")]
    TabClosed(String),

    #[error("Frame not reachable: {0}")]
    FrameNotFound(String),

    #[error("Navigation failed: {0}")]
    NavigationFailed(String),

    #[error("Unexpected URL: expected {expected}, got {actual}")]
    UnexpectedUrl { expected: String, actual: String },

    #[error("JavaScript execution failed: {0}")]
    JavaScriptFailed(String),

    #[error("Element not found: {element} (waited {timeout:?})")]
    ElementNotFound { element: String, timeout: Duration },

    #[error("Element not interactable: {0}")]
    NotInteractable(String),

    #[error("Timed out after {timeout:?} waiting for {what}")]
    Timeout { what: String, timeout: Duration },

    #[error("Could not detect {operation} after {passes} pass(es); screenshot: {}", screenshot_label(.screenshot))]
    DetectionExhausted {
        operation: String,
        passes: u32,
        screenshot: Option<PathBuf>,
    },

    #[error("The basket is empty; adding to the basket likely failed")]
    BasketEmpty,

    #[error("No popup tab opened within {0:?}")]
    PopupNotOpened(Duration),

    #[error("Expected exactly one new tab, found {0}")]
    UnexpectedTabCount(usize),

    #[error("Payment method not selected: {0}")]
    MethodNotSelected(String),

    #[error("Missing secret: {0} is not set")]
    MissingSecret(String),

    #[error("Invalid fixture {file}: {message}")]
    InvalidFixture { file: String, message: String },

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Undefined step: {0}")]
    UndefinedStep(String),

    #[error("Step timed out after {timeout:?}: {step}")]
    StepTimeout { step: String, timeout: Duration },

    #[error("Feature parse error at line {line}: {message}")]
    FeatureParse { line: usize, message: String },

    #[error("Assertion failed: {0}")]
    AssertionFailed(String),

    #[error("Invalid pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Chrome error: {0}")]
    ChromeError(String),
}

pub type Result<T> = std::result::Result<T, CheckoutError>;

fn screenshot_label(path: &Option<PathBuf>) -> String {
    path.as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "<not captured>".to_string())
}

// headless_chrome reports everything as anyhow::Error
impl From<anyhow::Error> for CheckoutError {
    fn from(err: anyhow::Error) -> Self {
        CheckoutError::ChromeError(err.to_string())
    }
}

impl CheckoutError {
    pub fn not_found(element: impl Into<String>, timeout: Duration) -> Self {
        CheckoutError::ElementNotFound {
            element: element.into(),
            timeout,
        }
    }

    /// Errors raised while probing a scope that may have gone away underneath
    /// us (frame detached, popup closed). Detection treats these as a miss.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CheckoutError::FrameNotFound(_)
                | CheckoutError::TabClosed(_)
                | CheckoutError::JavaScriptFailed(_)
                | CheckoutError::ChromeError(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detection_exhausted_names_screenshot() {
        let err = CheckoutError::DetectionExhausted {
            operation: "order-complete".to_string(),
            passes: 3,
            screenshot: Some(PathBuf::from("screenshots/order-complete-missing.png")),
        };
        let message = err.to_string();
        assert!(message.contains("order-complete"));
        assert!(message.contains("screenshots/order-complete-missing.png"));

        let err = CheckoutError::DetectionExhausted {
            operation: "discount".to_string(),
            passes: 1,
            screenshot: None,
        };
        assert!(err.to_string().contains("<not captured>"));
    }

    #[test]
    fn basket_empty_is_distinct_from_timeouts() {
        let err = CheckoutError::BasketEmpty;
        assert!(!matches!(err, CheckoutError::ElementNotFound { .. }));
        assert!(err.to_string().contains("basket is empty"));
    }
}
