//! Element locators.
//!
//! A [`Locator`] describes *how* to find an element inside a scope without
//! binding to a particular driver. The Chrome driver compiles locators into an
//! in-page query (see `browser::scripts`); the in-memory test browser matches
//! them directly against its element model.

use crate::errors::Result;
use regex::{Regex, RegexBuilder};
use serde_json::{json, Value};
use std::fmt;

/// How an element's text or accessible name is compared.
#[derive(Debug, Clone)]
pub enum TextMatch {
    /// Whitespace-normalised equality.
    Exact(String),
    /// Case-insensitive substring.
    Contains(String),
    /// Case-insensitive regular expression.
    Pattern(TextPattern),
}

impl TextMatch {
    pub fn exact(text: impl Into<String>) -> Self {
        TextMatch::Exact(text.into())
    }

    pub fn contains(text: impl Into<String>) -> Self {
        TextMatch::Contains(text.into())
    }

    /// Panics on an invalid pattern; only for the literal patterns baked into
    /// page objects. Use [`TextPattern::new`] for user input.
    pub fn pattern(source: &str) -> Self {
        TextMatch::Pattern(TextPattern::literal(source))
    }

    pub fn matches(&self, candidate: &str) -> bool {
        match self {
            TextMatch::Exact(expected) => normalize(candidate) == normalize(expected),
            TextMatch::Contains(needle) => candidate
                .to_lowercase()
                .contains(&needle.to_lowercase()),
            TextMatch::Pattern(pattern) => pattern.is_match(candidate),
        }
    }

    pub(crate) fn descriptor(&self) -> Value {
        match self {
            TextMatch::Exact(value) => json!({ "kind": "exact", "value": value }),
            TextMatch::Contains(value) => json!({ "kind": "contains", "value": value }),
            TextMatch::Pattern(pattern) => {
                json!({ "kind": "pattern", "source": pattern.source(), "flags": "i" })
            }
        }
    }
}

impl fmt::Display for TextMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TextMatch::Exact(value) => write!(f, "\"{}\"", value),
            TextMatch::Contains(value) => write!(f, "*{}*", value),
            TextMatch::Pattern(pattern) => write!(f, "/{}/i", pattern.source()),
        }
    }
}

/// A case-insensitive regex that remembers its source so it can be shipped to
/// the page as a JavaScript `RegExp` as well.
#[derive(Debug, Clone)]
pub struct TextPattern {
    source: String,
    regex: Regex,
}

impl TextPattern {
    pub fn new(source: &str) -> Result<Self> {
        let regex = RegexBuilder::new(source).case_insensitive(true).build()?;
        Ok(Self {
            source: source.to_string(),
            regex,
        })
    }

    pub(crate) fn literal(source: &str) -> Self {
        match Self::new(source) {
            Ok(pattern) => pattern,
            Err(err) => panic!("invalid built-in pattern {:?}: {}", source, err),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }

    pub fn find<'t>(&self, text: &'t str) -> Option<&'t str> {
        self.regex.find(text).map(|m| m.as_str())
    }
}

#[derive(Debug, Clone)]
pub enum Locator {
    /// Plain CSS selector.
    Css(String),
    /// ARIA role, optionally narrowed by accessible name.
    Role {
        role: String,
        name: Option<TextMatch>,
    },
    /// Any element whose visible text matches.
    Text(TextMatch),
    /// `data-testid` attribute.
    TestId(String),
    /// Base locator filtered by the element's own text.
    Filtered {
        base: Box<Locator>,
        has_text: Option<TextMatch>,
        has_not_text: Option<TextMatch>,
    },
    /// Union, in order.
    AnyOf(Vec<Locator>),
}

impl Locator {
    pub fn css(selector: impl Into<String>) -> Self {
        Locator::Css(selector.into())
    }

    pub fn role(role: impl Into<String>, name: TextMatch) -> Self {
        Locator::Role {
            role: role.into(),
            name: Some(name),
        }
    }

    pub fn any_role(role: impl Into<String>) -> Self {
        Locator::Role {
            role: role.into(),
            name: None,
        }
    }

    pub fn text(text: TextMatch) -> Self {
        Locator::Text(text)
    }

    pub fn test_id(id: impl Into<String>) -> Self {
        Locator::TestId(id.into())
    }

    pub fn any_of(locators: Vec<Locator>) -> Self {
        Locator::AnyOf(locators)
    }

    pub fn with_text(self, text: TextMatch) -> Self {
        match self {
            Locator::Filtered {
                base,
                has_not_text,
                ..
            } => Locator::Filtered {
                base,
                has_text: Some(text),
                has_not_text,
            },
            other => Locator::Filtered {
                base: Box::new(other),
                has_text: Some(text),
                has_not_text: None,
            },
        }
    }

    pub fn without_text(self, text: TextMatch) -> Self {
        match self {
            Locator::Filtered { base, has_text, .. } => Locator::Filtered {
                base,
                has_text,
                has_not_text: Some(text),
            },
            other => Locator::Filtered {
                base: Box::new(other),
                has_text: None,
                has_not_text: Some(text),
            },
        }
    }

    /// JSON shape consumed by the in-page locator engine.
    pub(crate) fn descriptor(&self) -> Value {
        match self {
            Locator::Css(selector) => json!({ "kind": "css", "selector": selector }),
            Locator::Role { role, name } => json!({
                "kind": "role",
                "role": role,
                "name": name.as_ref().map(TextMatch::descriptor),
            }),
            Locator::Text(text) => json!({ "kind": "text", "text": text.descriptor() }),
            Locator::TestId(id) => json!({ "kind": "testid", "id": id }),
            Locator::Filtered {
                base,
                has_text,
                has_not_text,
            } => json!({
                "kind": "filtered",
                "base": base.descriptor(),
                "hasText": has_text.as_ref().map(TextMatch::descriptor),
                "hasNotText": has_not_text.as_ref().map(TextMatch::descriptor),
            }),
            Locator::AnyOf(locators) => json!({
                "kind": "any",
                "locators": locators.iter().map(Locator::descriptor).collect::<Vec<_>>(),
            }),
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Css(selector) => write!(f, "{}", selector),
            Locator::Role { role, name: None } => write!(f, "role={}", role),
            Locator::Role {
                role,
                name: Some(name),
            } => write!(f, "role={}[name={}]", role, name),
            Locator::Text(text) => write!(f, "text={}", text),
            Locator::TestId(id) => write!(f, "testid={}", id),
            Locator::Filtered {
                base,
                has_text,
                has_not_text,
            } => {
                write!(f, "{}", base)?;
                if let Some(text) = has_text {
                    write!(f, " >> has-text={}", text)?;
                }
                if let Some(text) = has_not_text {
                    write!(f, " >> has-not-text={}", text)?;
                }
                Ok(())
            }
            Locator::AnyOf(locators) => {
                let parts: Vec<String> = locators.iter().map(|l| l.to_string()).collect();
                write!(f, "{}", parts.join(", "))
            }
        }
    }
}

fn normalize(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_match_modes() {
        assert!(TextMatch::exact("More Payment Methods").matches("  More   Payment Methods "));
        assert!(!TextMatch::exact("More Payment Methods").matches("More payment methods"));
        assert!(TextMatch::contains("order complete").matches("Your Order Complete!"));
        assert!(TextMatch::pattern("proceed to checkout").matches("PROCEED TO CHECKOUT"));
        assert!(TextMatch::pattern("confirm.*pay").matches("Confirm & Pay"));
        assert!(!TextMatch::pattern("^pay$").matches("Buy with GPay"));
    }

    #[test]
    fn invalid_user_pattern_is_an_error() {
        assert!(TextPattern::new("(unclosed").is_err());
    }

    #[test]
    fn filters_compose_on_the_same_base() {
        let locator = Locator::css("div[role=\"button\"]")
            .with_text(TextMatch::pattern("pay|subscribe"))
            .without_text(TextMatch::contains("buy with"));
        match &locator {
            Locator::Filtered {
                base,
                has_text,
                has_not_text,
            } => {
                assert!(matches!(**base, Locator::Css(_)));
                assert!(has_text.is_some());
                assert!(has_not_text.is_some());
            }
            other => panic!("unexpected locator {:?}", other),
        }
        assert_eq!(
            locator.to_string(),
            "div[role=\"button\"] >> has-text=/pay|subscribe/i >> has-not-text=*buy with*"
        );
    }

    #[test]
    fn descriptor_carries_pattern_source() {
        let descriptor = Locator::role("button", TextMatch::pattern("apply|confirm")).descriptor();
        assert_eq!(descriptor["kind"], "role");
        assert_eq!(descriptor["name"]["source"], "apply|confirm");
        assert_eq!(descriptor["name"]["flags"], "i");
    }
}
