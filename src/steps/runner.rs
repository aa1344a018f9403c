use super::feature::{Feature, Scenario, Step, TagFilter};
use super::registry::StepRegistry;
use super::report::{Attachment, RunReport, ScenarioReport, Status, StepReport};
use super::world::ScenarioWorld;
use crate::errors::{CheckoutError, Result};
use crate::pages::PageContext;
use chrono::Utc;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Runs scenarios one after another against a shared browser. Each scenario
/// gets its own session; a failing step skips the rest of its scenario and
/// leaves a `FAILED-<ts>.png` screenshot of the active tab.
pub struct Runner {
    ctx: PageContext,
    registry: StepRegistry,
    step_timeout: Duration,
    filter: TagFilter,
}

impl Runner {
    pub fn new(ctx: PageContext, registry: StepRegistry) -> Self {
        Self {
            step_timeout: ctx.config.step_timeout(),
            ctx,
            registry,
            filter: TagFilter::default(),
        }
    }

    pub fn with_filter(mut self, filter: TagFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_step_timeout(mut self, timeout: Duration) -> Self {
        self.step_timeout = timeout;
        self
    }

    pub async fn run(&self, features: &[Feature]) -> RunReport {
        let started_at = Utc::now();
        let mut scenarios = Vec::new();

        for feature in features {
            for scenario in &feature.scenarios {
                if !self.filter.matches(feature.effective_tags(scenario)) {
                    info!("Skipping '{}' (tag filter)", scenario.name);
                    continue;
                }
                scenarios.push(self.run_scenario(feature, scenario).await);
            }
        }

        RunReport {
            started_at,
            finished_at: Utc::now(),
            scenarios,
        }
    }

    pub async fn run_scenario(&self, feature: &Feature, scenario: &Scenario) -> ScenarioReport {
        let start = Instant::now();
        info!("Scenario: {}", scenario.name);
        let steps: Vec<&Step> = feature.background.iter().chain(&scenario.steps).collect();

        let mut report = ScenarioReport {
            feature: feature.name.clone(),
            name: scenario.name.clone(),
            tags: feature.effective_tags(scenario).map(str::to_string).collect(),
            session_id: None,
            status: Status::Passed,
            duration_ms: 0,
            steps: Vec::with_capacity(steps.len()),
            screenshot: None,
            attachments: Vec::new(),
        };

        let mut world = match ScenarioWorld::open(self.ctx.clone()).await {
            Ok(world) => world,
            Err(e) => {
                error!("Could not open a session for '{}': {}", scenario.name, e);
                report.status = Status::Failed;
                report.steps = steps
                    .iter()
                    .map(|s| StepReport::skipped(s.keyword.as_str(), &s.text, s.line))
                    .collect();
                if let Some(first) = report.steps.first_mut() {
                    first.status = Status::Failed;
                    first.error = Some(e.to_string());
                }
                report.duration_ms = start.elapsed().as_millis() as u64;
                return report;
            }
        };
        report.session_id = Some(world.session_id().to_string());

        for step in steps {
            if report.status != Status::Passed {
                report
                    .steps
                    .push(StepReport::skipped(step.keyword.as_str(), &step.text, step.line));
                continue;
            }
            let step_report = self.run_step(&mut world, step).await;
            if step_report.status != Status::Passed {
                report.status = Status::Failed;
            }
            report.steps.push(step_report);
        }

        if report.status == Status::Failed {
            match self.failure_screenshot(&world).await {
                Ok((path, attachment)) => {
                    report.screenshot = Some(path);
                    report.attachments.push(attachment);
                }
                Err(e) => warn!("Could not capture failure screenshot: {}", e),
            }
        }

        if let Err(e) = world.close().await {
            warn!("Session teardown for '{}' failed: {}", scenario.name, e);
        }

        report.duration_ms = start.elapsed().as_millis() as u64;
        info!(
            "Scenario '{}' {} in {}ms",
            scenario.name,
            if report.status == Status::Passed { "passed" } else { "failed" },
            report.duration_ms
        );
        report
    }

    async fn run_step(&self, world: &mut ScenarioWorld, step: &Step) -> StepReport {
        let start = Instant::now();
        let label = format!("{} {}", step.keyword, step.text);
        info!("  {}", label);

        let (status, error) = match self.registry.resolve(&step.text) {
            Err(e) => (Status::Undefined, Some(e)),
            Ok(action) => match tokio::time::timeout(self.step_timeout, action.run(world)).await {
                Ok(Ok(())) => (Status::Passed, None),
                Ok(Err(e)) => (Status::Failed, Some(e)),
                Err(_) => (
                    Status::Failed,
                    Some(CheckoutError::StepTimeout {
                        step: label.clone(),
                        timeout: self.step_timeout,
                    }),
                ),
            },
        };

        if let Some(e) = &error {
            error!("  {} failed: {}", label, e);
        }
        StepReport {
            keyword: step.keyword.to_string(),
            text: step.text.clone(),
            line: step.line,
            status,
            duration_ms: start.elapsed().as_millis() as u64,
            error: error.map(|e| e.to_string()),
        }
    }

    async fn failure_screenshot(&self, world: &ScenarioWorld) -> Result<(PathBuf, Attachment)> {
        let path = self
            .ctx
            .artifacts
            .capture(self.ctx.driver(), world.current_tab(), "FAILED")
            .await?;
        let bytes = tokio::fs::read(&path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "FAILED.png".to_string());
        Ok((path, Attachment::png(name, &bytes)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::steps::feature;
    use crate::testing::{scenes, FakeBrowser, FakeElement, FakePage};
    use std::sync::Arc;

    const FEATURE: &str = r#"
Feature: Storefront
  Background:
    Given I am on the Universal Webstore Homepage

  @smoke
  Scenario: Browse packages
    When I select Packages from the sidebar
    And I add a Full Price Package to the basket

  Scenario: Unknown step
    When I teleport to checkout
    Then I am displayed a purchase confirmation message
"#;

    async fn storefront() -> Arc<FakeBrowser> {
        let browser = Arc::new(FakeBrowser::new());
        browser.route(scenes::WEBSTORE_URL, scenes::webstore_home()).await;
        browser.route(scenes::CATEGORY_URL, scenes::category_page()).await;
        browser
    }

    #[tokio::test(start_paused = true)]
    async fn passing_and_undefined_scenarios() {
        let dir = tempfile::tempdir().unwrap();
        let browser = storefront().await;
        let ctx = scenes::context(browser.clone(), dir.path());
        let runner = Runner::new(ctx, StepRegistry::storefront().unwrap());

        let report = runner.run(&[feature::parse(FEATURE).unwrap()]).await;
        assert_eq!(report.scenarios.len(), 2);

        let browse = &report.scenarios[0];
        assert_eq!(browse.status, Status::Passed, "{:?}", browse.failed_step());
        assert_eq!(browse.steps.len(), 3);
        assert!(browse.attachments.is_empty());

        let unknown = &report.scenarios[1];
        assert_eq!(unknown.status, Status::Failed);
        assert_eq!(unknown.steps[1].status, Status::Undefined);
        assert_eq!(unknown.steps[2].status, Status::Skipped);
        assert_eq!(unknown.attachments.len(), 1);
        assert!(unknown.attachments[0].name.starts_with("FAILED-"));
        assert_eq!(browser.screenshot_count().await, 1);

        // every scenario tab was closed again
        assert!(browser.tab_ids().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn tag_filter_selects_scenarios() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = scenes::context(storefront().await, dir.path());
        let runner = Runner::new(ctx, StepRegistry::storefront().unwrap())
            .with_filter(TagFilter::parse("@smoke").unwrap());

        let report = runner.run(&[feature::parse(FEATURE).unwrap()]).await;
        assert_eq!(report.scenarios.len(), 1);
        assert_eq!(report.scenarios[0].name, "Browse packages");
        assert!(report.success());
    }

    #[tokio::test(start_paused = true)]
    async fn hung_step_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let browser = Arc::new(FakeBrowser::new());
        // The sidebar link never appears, so the step waits on its element timeout
        browser
            .route(
                scenes::WEBSTORE_URL,
                FakePage::new(scenes::WEBSTORE_URL).with(FakeElement::new("banner").text("Welcome")),
            )
            .await;
        let ctx = scenes::context(browser.clone(), dir.path());
        let runner = Runner::new(ctx, StepRegistry::storefront().unwrap())
            .with_step_timeout(Duration::from_secs(2));

        let feature = feature::parse(
            "Feature: Hang\n  Scenario: Sidebar missing\n    Given I am on the Universal Webstore Homepage\n    When I select Packages from the sidebar\n",
        )
        .unwrap();
        let report = runner.run(&[feature]).await;

        let step = &report.scenarios[0].steps[1];
        assert_eq!(step.status, Status::Failed);
        assert!(step.error.as_deref().unwrap().contains("Step timed out"));
    }
}
