//! Scenario execution: feature files, the step vocabulary, per-scenario
//! state and the JSON run report.

pub mod feature;
pub mod registry;
pub mod report;
pub mod runner;
pub mod world;

pub use feature::{Feature, Keyword, Scenario, Step, TagFilter};
pub use registry::{StepAction, StepRegistry};
pub use report::{RunReport, ScenarioReport, Status};
pub use runner::Runner;
pub use world::ScenarioWorld;
