//! Parser for the subset of Gherkin the checkout features use: `Feature`,
//! `Background`, `Scenario`, tags, `#` comments and the five step keywords.

use crate::errors::{CheckoutError, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    Given,
    When,
    Then,
    And,
    But,
}

impl Keyword {
    const ALL: [Keyword; 5] = [Keyword::Given, Keyword::When, Keyword::Then, Keyword::And, Keyword::But];

    pub fn as_str(self) -> &'static str {
        match self {
            Keyword::Given => "Given",
            Keyword::When => "When",
            Keyword::Then => "Then",
            Keyword::And => "And",
            Keyword::But => "But",
        }
    }
}

impl fmt::Display for Keyword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub keyword: Keyword,
    pub text: String,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Scenario {
    pub name: String,
    pub tags: Vec<String>,
    pub steps: Vec<Step>,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub name: String,
    pub tags: Vec<String>,
    pub background: Vec<Step>,
    pub scenarios: Vec<Scenario>,
    pub path: Option<PathBuf>,
}

impl Feature {
    /// Tags of `scenario` including the ones inherited from the feature.
    pub fn effective_tags<'a>(&'a self, scenario: &'a Scenario) -> impl Iterator<Item = &'a str> {
        self.tags.iter().chain(scenario.tags.iter()).map(String::as_str)
    }
}

enum Section {
    Description,
    Background,
    Scenario,
}

fn parse_error(line: usize, message: impl Into<String>) -> CheckoutError {
    CheckoutError::FeatureParse {
        line,
        message: message.into(),
    }
}

fn header<'a>(line: &'a str, keyword: &str) -> Option<&'a str> {
    line.strip_prefix(keyword)
        .and_then(|rest| rest.strip_prefix(':'))
        .map(str::trim)
}

fn step_line(line: &str) -> Option<(Keyword, &str)> {
    Keyword::ALL.iter().find_map(|keyword| {
        line.strip_prefix(keyword.as_str())
            .filter(|rest| rest.starts_with(char::is_whitespace))
            .map(|rest| (*keyword, rest.trim()))
    })
}

pub fn parse(source: &str) -> Result<Feature> {
    let mut feature: Option<Feature> = None;
    let mut pending_tags: Vec<String> = Vec::new();
    let mut section = Section::Description;

    for (index, raw) in source.lines().enumerate() {
        let line_no = index + 1;
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if line.starts_with('@') {
            for tag in line.split_whitespace() {
                if !tag.starts_with('@') || tag.len() == 1 {
                    return Err(parse_error(line_no, format!("invalid tag '{}'", tag)));
                }
                pending_tags.push(tag.to_string());
            }
            continue;
        }

        if let Some(name) = header(line, "Feature") {
            if feature.is_some() {
                return Err(parse_error(line_no, "only one Feature per file"));
            }
            feature = Some(Feature {
                name: name.to_string(),
                tags: std::mem::take(&mut pending_tags),
                background: Vec::new(),
                scenarios: Vec::new(),
                path: None,
            });
            continue;
        }

        let current = feature
            .as_mut()
            .ok_or_else(|| parse_error(line_no, "expected 'Feature:' before any other content"))?;

        if header(line, "Scenario Outline").is_some() || header(line, "Examples").is_some() {
            return Err(parse_error(line_no, "scenario outlines are not supported"));
        }

        if header(line, "Background").is_some() {
            if !current.scenarios.is_empty() || !current.background.is_empty() {
                return Err(parse_error(line_no, "Background must come once, before any Scenario"));
            }
            if !pending_tags.is_empty() {
                return Err(parse_error(line_no, "tags are not allowed on Background"));
            }
            section = Section::Background;
            continue;
        }

        if let Some(name) = header(line, "Scenario") {
            current.scenarios.push(Scenario {
                name: name.to_string(),
                tags: std::mem::take(&mut pending_tags),
                steps: Vec::new(),
                line: line_no,
            });
            section = Section::Scenario;
            continue;
        }

        if !pending_tags.is_empty() {
            return Err(parse_error(line_no, "tags must precede a Feature or Scenario"));
        }

        match (step_line(line), &section) {
            (Some((keyword, text)), Section::Background) => current.background.push(Step {
                keyword,
                text: text.to_string(),
                line: line_no,
            }),
            (Some((keyword, text)), Section::Scenario) => {
                if let Some(scenario) = current.scenarios.last_mut() {
                    scenario.steps.push(Step {
                        keyword,
                        text: text.to_string(),
                        line: line_no,
                    });
                }
            }
            (Some(_), Section::Description) => {
                return Err(parse_error(line_no, "step outside of a Background or Scenario"))
            }
            // Free-form description under the Feature header
            (None, Section::Description) => {}
            (None, _) => return Err(parse_error(line_no, format!("unexpected line '{}'", line))),
        }
    }

    if !pending_tags.is_empty() {
        return Err(parse_error(source.lines().count(), "dangling tags at end of file"));
    }
    feature.ok_or_else(|| parse_error(1, "no Feature found"))
}

pub async fn load_file(path: &Path) -> Result<Feature> {
    let source = tokio::fs::read_to_string(path).await?;
    let mut feature = parse(&source).map_err(|e| match e {
        CheckoutError::FeatureParse { line, message } => CheckoutError::FeatureParse {
            line,
            message: format!("{}: {}", path.display(), message),
        },
        other => other,
    })?;
    feature.path = Some(path.to_path_buf());
    Ok(feature)
}

/// Load `path` itself if it is a file, otherwise every `*.feature` file in
/// the directory, sorted by name.
pub async fn load(path: &Path) -> Result<Vec<Feature>> {
    if tokio::fs::metadata(path).await?.is_file() {
        return Ok(vec![load_file(path).await?]);
    }

    let mut files = Vec::new();
    let mut entries = tokio::fs::read_dir(path).await?;
    while let Some(entry) = entries.next_entry().await? {
        let file = entry.path();
        if file.extension().is_some_and(|ext| ext == "feature") {
            files.push(file);
        }
    }
    files.sort();
    debug!("Found {} feature file(s) in {}", files.len(), path.display());

    let mut features = Vec::with_capacity(files.len());
    for file in files {
        features.push(load_file(&file).await?);
    }
    Ok(features)
}

/// Cucumber-style tag expression restricted to `@a or @b` alternatives and
/// `not @c` exclusions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TagFilter {
    include: Vec<String>,
    exclude: Vec<String>,
}

impl TagFilter {
    pub fn parse(expression: &str) -> Result<Self> {
        let mut filter = Self::default();
        let mut negate = false;
        for token in expression.split(|c: char| c.is_whitespace() || c == ',') {
            match token {
                "" | "or" => {}
                "not" => negate = true,
                tag if tag.starts_with('@') && tag.len() > 1 => {
                    if std::mem::take(&mut negate) {
                        filter.exclude.push(tag.to_string());
                    } else {
                        filter.include.push(tag.to_string());
                    }
                }
                other => {
                    return Err(CheckoutError::ConfigurationError(format!(
                        "invalid tag expression '{}' near '{}'",
                        expression, other
                    )))
                }
            }
        }
        if negate {
            return Err(CheckoutError::ConfigurationError(format!(
                "tag expression '{}' ends with 'not'",
                expression
            )));
        }
        Ok(filter)
    }

    pub fn matches<'a>(&self, tags: impl IntoIterator<Item = &'a str>) -> bool {
        let tags: Vec<&str> = tags.into_iter().collect();
        let included = self.include.is_empty() || self.include.iter().any(|t| tags.contains(&t.as_str()));
        included && !self.exclude.iter().any(|t| tags.contains(&t.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHECKOUT: &str = r#"
# Purchases through the universal webstore
@checkout
Feature: Checkout
  Buying packages with every supported provider.

  Background:
    Given I am on the Universal Webstore Homepage
    And I select Packages from the sidebar

  @card @smoke
  Scenario: Card payment
    When I add a Full Price Package to the basket
    And I proceed to checkout
    And I complete the package payment details and click Pay
    Then I am displayed a purchase confirmation message

  Scenario: Coupon
    When I enter a valid coupon
"#;

    #[test]
    fn parses_background_scenarios_and_tags() {
        let feature = parse(CHECKOUT).unwrap();
        assert_eq!(feature.name, "Checkout");
        assert_eq!(feature.tags, vec!["@checkout"]);
        assert_eq!(feature.background.len(), 2);
        assert_eq!(feature.background[1].keyword, Keyword::And);
        assert_eq!(feature.scenarios.len(), 2);

        let card = &feature.scenarios[0];
        assert_eq!(card.name, "Card payment");
        assert_eq!(card.tags, vec!["@card", "@smoke"]);
        assert_eq!(card.steps.len(), 4);
        assert_eq!(card.steps[3].keyword, Keyword::Then);
        assert_eq!(card.steps[3].text, "I am displayed a purchase confirmation message");
        assert!(feature.scenarios[1].tags.is_empty());
    }

    #[test]
    fn reports_the_offending_line() {
        let err = parse("Feature: x\n  Scenario: y\n    Whenever something\n").unwrap_err();
        match err {
            CheckoutError::FeatureParse { line, .. } => assert_eq!(line, 3),
            other => panic!("unexpected error: {}", other),
        }
        assert!(parse("Given a step\n").is_err());
        assert!(parse("Feature: x\n  Scenario Outline: y\n").is_err());
        assert!(parse("# nothing here\n").is_err());
    }

    #[test]
    fn tag_filter_includes_and_excludes() {
        let filter = TagFilter::parse("@card or @paypal not @wip").unwrap();
        assert!(filter.matches(["@checkout", "@card"]));
        assert!(!filter.matches(["@card", "@wip"]));
        assert!(!filter.matches(["@naver"]));

        let everything = TagFilter::default();
        assert!(everything.matches(Vec::<&str>::new()));
        assert!(TagFilter::parse("card").is_err());
        assert!(TagFilter::parse("@a not").is_err());
    }

    #[test]
    fn scenario_inherits_feature_tags() {
        let feature = parse(CHECKOUT).unwrap();
        let filter = TagFilter::parse("@checkout").unwrap();
        assert!(filter.matches(feature.effective_tags(&feature.scenarios[1])));
    }
}
