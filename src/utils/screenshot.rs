use crate::core::{BrowserDriver, TabId};
use crate::errors::Result;
use base64::Engine;
use chrono::Utc;
use std::path::{Path, PathBuf};
use tracing::info;

/// Writes failure and diagnostic screenshots into one directory.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Screenshot `tab` to `<dir>/<name>-<timestamp>.png`.
    pub async fn capture(&self, driver: &dyn BrowserDriver, tab: &TabId, name: &str) -> Result<PathBuf> {
        let bytes = driver.screenshot(tab).await?;
        let path = self.dir.join(file_name(name));
        tokio::fs::create_dir_all(&self.dir).await?;
        tokio::fs::write(&path, bytes).await?;
        info!("Screenshot saved: {}", path.display());
        Ok(path)
    }
}

fn file_name(name: &str) -> String {
    format!("{}-{}.png", name, Utc::now().format("%Y-%m-%dT%H-%M-%S-%3fZ"))
}

/// Base64 of a PNG, as embedded in run reports.
pub fn encode_png(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}
