use crate::errors::Result;
use crate::utils::encode_png;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Passed,
    Failed,
    Skipped,
    Undefined,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepReport {
    pub keyword: String,
    pub text: String,
    pub line: usize,
    pub status: Status,
    pub duration_ms: u64,
    pub error: Option<String>,
}

impl StepReport {
    pub fn skipped(keyword: &str, text: &str, line: usize) -> Self {
        Self {
            keyword: keyword.to_string(),
            text: text.to_string(),
            line,
            status: Status::Skipped,
            duration_ms: 0,
            error: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub name: String,
    pub mime_type: String,
    /// Base64-encoded body
    pub data: String,
}

impl Attachment {
    pub fn png(name: impl Into<String>, bytes: &[u8]) -> Self {
        Self {
            name: name.into(),
            mime_type: "image/png".to_string(),
            data: encode_png(bytes),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioReport {
    pub feature: String,
    pub name: String,
    pub tags: Vec<String>,
    pub session_id: Option<String>,
    pub status: Status,
    pub duration_ms: u64,
    pub steps: Vec<StepReport>,
    pub screenshot: Option<PathBuf>,
    pub attachments: Vec<Attachment>,
}

impl ScenarioReport {
    pub fn failed_step(&self) -> Option<&StepReport> {
        self.steps
            .iter()
            .find(|s| matches!(s.status, Status::Failed | Status::Undefined))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub scenarios: Vec<ScenarioReport>,
}

impl RunReport {
    pub fn passed(&self) -> usize {
        self.count(Status::Passed)
    }

    pub fn failed(&self) -> usize {
        self.scenarios.len() - self.passed()
    }

    fn count(&self, status: Status) -> usize {
        self.scenarios.iter().filter(|s| s.status == status).count()
    }

    pub fn success(&self) -> bool {
        self.failed() == 0
    }

    pub fn summary(&self) -> String {
        let steps: Vec<&StepReport> = self.scenarios.iter().flat_map(|s| &s.steps).collect();
        let steps_with = |status| steps.iter().filter(|s| s.status == status).count();
        format!(
            "{} scenarios ({} passed, {} failed)\n{} steps ({} passed, {} failed, {} undefined, {} skipped)",
            self.scenarios.len(),
            self.passed(),
            self.failed(),
            steps.len(),
            steps_with(Status::Passed),
            steps_with(Status::Failed),
            steps_with(Status::Undefined),
            steps_with(Status::Skipped),
        )
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, serde_json::to_string_pretty(self)?).await?;
        info!("Run report written to {}", path.display());
        Ok(())
    }
}
