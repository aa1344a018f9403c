//! Test data read from JSON files in the data directory.
//!
//! Every value has a documented default. A missing file, a missing field, or
//! a blank field falls back to that default (with a warning); a file that is
//! present but not valid JSON is an error.

use crate::errors::{CheckoutError, Result};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const CHECKOUT_DATA_FILE: &str = "checkoutData.json";
pub const CREATOR_CODE_FILE: &str = "creatorCode.json";
pub const COUPON_CODE_FILE: &str = "couponCode.json";
pub const GIFT_CARD_EMAIL_FILE: &str = "giftCardEmail.json";

pub const DEFAULT_CODE: &str = "DEFAULTCODE";
pub const DEFAULT_GIFT_CARD_EMAIL: &str = "fallback@example.com";

/// Fields of the checkout form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKey {
    Email,
    FullName,
    ZipCode,
    CardNumber,
    ExpiryDate,
    Cvc,
    BillingAddress,
    City,
    State,
    Phone,
}

impl FieldKey {
    pub const ALL: [FieldKey; 10] = [
        FieldKey::Email,
        FieldKey::FullName,
        FieldKey::ZipCode,
        FieldKey::CardNumber,
        FieldKey::ExpiryDate,
        FieldKey::Cvc,
        FieldKey::BillingAddress,
        FieldKey::City,
        FieldKey::State,
        FieldKey::Phone,
    ];

    pub fn json_key(self) -> &'static str {
        match self {
            FieldKey::Email => "email",
            FieldKey::FullName => "fullName",
            FieldKey::ZipCode => "zipCode",
            FieldKey::CardNumber => "cardNumber",
            FieldKey::ExpiryDate => "expiryDate",
            FieldKey::Cvc => "cvc",
            FieldKey::BillingAddress => "billingAddress",
            FieldKey::City => "city",
            FieldKey::State => "state",
            FieldKey::Phone => "phone",
        }
    }

    pub fn default_value(self) -> &'static str {
        match self {
            FieldKey::Email => "test@example.com",
            FieldKey::FullName => "Test User",
            FieldKey::ZipCode => "10001",
            FieldKey::CardNumber => "4242 4242 4242 4242",
            FieldKey::ExpiryDate => "12/34",
            FieldKey::Cvc => "123",
            FieldKey::BillingAddress => "1 Test Street",
            FieldKey::City => "London",
            FieldKey::State => "London",
            FieldKey::Phone => "07000000000",
        }
    }
}

/// Resolved checkout form values; never blank.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutData {
    values: Vec<(FieldKey, String)>,
}

impl Default for CheckoutData {
    fn default() -> Self {
        Self {
            values: FieldKey::ALL
                .iter()
                .map(|k| (*k, k.default_value().to_string()))
                .collect(),
        }
    }
}

impl CheckoutData {
    pub fn value(&self, key: FieldKey) -> &str {
        self.values
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
            .unwrap_or_else(|| key.default_value())
    }

    fn from_json(file: &str, json: &Value) -> Self {
        let values = FieldKey::ALL
            .iter()
            .map(|key| {
                let value = string_field(json, key.json_key()).unwrap_or_else(|| {
                    warn!(
                        "{}: {} missing or blank, using default",
                        file,
                        key.json_key()
                    );
                    key.default_value().to_string()
                });
                (*key, value)
            })
            .collect();
        Self { values }
    }
}

/// Trimmed, non-empty string (numbers are accepted and stringified).
fn string_field(json: &Value, key: &str) -> Option<String> {
    match json.get(key)? {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[derive(Debug, Clone)]
pub struct FixtureStore {
    dir: PathBuf,
}

impl FixtureStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn checkout_data(&self) -> Result<CheckoutData> {
        match self.read(CHECKOUT_DATA_FILE).await? {
            Some(json) => Ok(CheckoutData::from_json(CHECKOUT_DATA_FILE, &json)),
            None => Ok(CheckoutData::default()),
        }
    }

    pub async fn creator_code(&self) -> Result<String> {
        self.single(CREATOR_CODE_FILE, "creatorCode", DEFAULT_CODE).await
    }

    pub async fn coupon_code(&self) -> Result<String> {
        self.single(COUPON_CODE_FILE, "couponCode", DEFAULT_CODE).await
    }

    pub async fn gift_card_email(&self) -> Result<String> {
        self.single(GIFT_CARD_EMAIL_FILE, "giftCardEmail", DEFAULT_GIFT_CARD_EMAIL)
            .await
    }

    async fn single(&self, file: &str, key: &str, default: &str) -> Result<String> {
        let value = self
            .read(file)
            .await?
            .and_then(|json| string_field(&json, key));
        match value {
            Some(value) => {
                info!("Loaded {} from {}", key, file);
                Ok(value)
            }
            None => {
                warn!("{}: no usable {}, using fallback {}", file, key, default);
                Ok(default.to_string())
            }
        }
    }

    async fn read(&self, file: &str) -> Result<Option<Value>> {
        let path = self.dir.join(file);
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Fixture {} not found", path.display());
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| CheckoutError::InvalidFixture {
                file: path.display().to_string(),
                message: e.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store_with(files: &[(&str, &str)]) -> (tempfile::TempDir, FixtureStore) {
        let dir = tempfile::tempdir().unwrap();
        for (name, body) in files {
            tokio::fs::write(dir.path().join(name), body).await.unwrap();
        }
        let store = FixtureStore::new(dir.path());
        (dir, store)
    }

    #[tokio::test]
    async fn blank_and_missing_fields_fall_back() {
        let (_dir, store) = store_with(&[(
            CHECKOUT_DATA_FILE,
            r#"{ "email": "buyer@shop.test", "fullName": "   ", "zipCode": 90210 }"#,
        )])
        .await;

        let data = store.checkout_data().await.unwrap();
        assert_eq!(data.value(FieldKey::Email), "buyer@shop.test");
        assert_eq!(data.value(FieldKey::FullName), "Test User");
        assert_eq!(data.value(FieldKey::ZipCode), "90210");
        assert_eq!(data.value(FieldKey::CardNumber), "4242 4242 4242 4242");
        for key in FieldKey::ALL {
            assert!(!data.value(key).trim().is_empty(), "{:?} is blank", key);
        }
    }

    #[tokio::test]
    async fn missing_files_use_defaults() {
        let (_dir, store) = store_with(&[]).await;
        assert_eq!(store.checkout_data().await.unwrap(), CheckoutData::default());
        assert_eq!(store.creator_code().await.unwrap(), "DEFAULTCODE");
        assert_eq!(store.coupon_code().await.unwrap(), "DEFAULTCODE");
        assert_eq!(store.gift_card_email().await.unwrap(), "fallback@example.com");
    }

    #[tokio::test]
    async fn codes_are_trimmed_and_blank_codes_fall_back() {
        let (_dir, store) = store_with(&[
            (CREATOR_CODE_FILE, r#"{ "creatorCode": "  STREAMER10 " }"#),
            (COUPON_CODE_FILE, r#"{ "couponCode": "" }"#),
        ])
        .await;
        assert_eq!(store.creator_code().await.unwrap(), "STREAMER10");
        assert_eq!(store.coupon_code().await.unwrap(), "DEFAULTCODE");
    }

    #[tokio::test]
    async fn malformed_json_is_reported() {
        let (_dir, store) = store_with(&[(GIFT_CARD_EMAIL_FILE, "{ giftCardEmail: ")]).await;
        let err = store.gift_card_email().await.unwrap_err();
        assert!(matches!(err, CheckoutError::InvalidFixture { .. }));
    }
}
